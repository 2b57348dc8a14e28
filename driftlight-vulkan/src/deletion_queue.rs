//! FIFO of GPU resources awaiting destruction. Vulkan forbids destroying a
//! resource still referenced by an in-flight command buffer, so everything
//! torn down mid-session (a removed texture, a replaced BLAS) is queued here
//! with the frame it was enqueued on and only actually destroyed once that
//! many frames have definitely completed.

use ash::vk;
use std::sync::Arc;

use crate::context::GpuContext;

/// The resource kinds the deletion queue knows how to destroy. Grouped as a
/// "triple" for acceleration structures since the AS handle, its backing
/// buffer, and build scratch all share a lifetime.
pub enum DeletionEntry {
    Buffer(vk::Buffer),
    Image { image: vk::Image, view: Option<vk::ImageView>, sampler: Option<vk::Sampler> },
    AccelerationStructure { accel: vk::AccelerationStructureKHR, buffer: vk::Buffer, scratch: Option<vk::Buffer> },
    DescriptorPool(vk::DescriptorPool),
}

struct QueuedDeletion {
    entry: DeletionEntry,
    frame_of_enqueue: u64,
}

pub struct DeletionQueue {
    ctx: Arc<GpuContext>,
    multi_buffer_count: u64,
    entries: Vec<QueuedDeletion>,
    accel_structure_loader: ash::khr::acceleration_structure::Device,
}

impl DeletionQueue {
    pub fn new(ctx: Arc<GpuContext>, multi_buffer_count: u64, accel_structure_loader: ash::khr::acceleration_structure::Device) -> Self {
        Self { ctx, multi_buffer_count, entries: Vec::new(), accel_structure_loader }
    }

    pub fn enqueue(&mut self, entry: DeletionEntry, current_frame: u64) {
        self.entries.push(QueuedDeletion { entry, frame_of_enqueue: current_frame });
    }

    /// Destroy everything older than `multi_buffer_count` frames. Run at the
    /// start of each frame, before the staging ring is reset, so anything
    /// freed this tick can't alias a buffer still mid-copy.
    pub fn execute(&mut self, current_frame: u64) {
        let cutoff = current_frame.saturating_sub(self.multi_buffer_count);
        let (ready, pending): (Vec<_>, Vec<_>) =
            self.entries.drain(..).partition(|e| e.frame_of_enqueue <= cutoff);
        self.entries = pending;

        for queued in ready {
            self.destroy(queued.entry);
        }
    }

    fn destroy(&self, entry: DeletionEntry) {
        unsafe {
            match entry {
                DeletionEntry::Buffer(buffer) => self.ctx.device.destroy_buffer(buffer, None),
                DeletionEntry::Image { image, view, sampler } => {
                    if let Some(view) = view {
                        self.ctx.device.destroy_image_view(view, None);
                    }
                    if let Some(sampler) = sampler {
                        self.ctx.device.destroy_sampler(sampler, None);
                    }
                    self.ctx.device.destroy_image(image, None);
                }
                DeletionEntry::AccelerationStructure { accel, buffer, scratch } => {
                    self.accel_structure_loader.destroy_acceleration_structure(accel, None);
                    self.ctx.device.destroy_buffer(buffer, None);
                    if let Some(scratch) = scratch {
                        self.ctx.device.destroy_buffer(scratch, None);
                    }
                }
                DeletionEntry::DescriptorPool(pool) => self.ctx.device.destroy_descriptor_pool(pool, None),
            }
        }
    }

    /// Number of entries still waiting out their grace period. Exposed for
    /// orchestrator shutdown, which must flush this to zero before the
    /// device is destroyed.
    pub fn pending_count(&self) -> usize {
        self.entries.len()
    }

    /// Force-destroy everything regardless of frame age. Only valid once the
    /// device is idle (orchestrator calls this after `device_wait_idle`).
    pub fn flush_all(&mut self) {
        for queued in self.entries.drain(..) {
            self.destroy(queued.entry);
        }
    }
}

#[cfg(test)]
mod tests {
    // `DeletionEntry`'s destroy path needs a live `ash::Device`, so the
    // timing logic (what counts as "older than multi_buffer_count") is
    // covered directly rather than through `execute`.
    #[test]
    fn cutoff_arithmetic_does_not_underflow_on_early_frames() {
        let multi_buffer_count: u64 = 2;
        let current_frame: u64 = 0;
        assert_eq!(current_frame.saturating_sub(multi_buffer_count), 0);
    }
}
