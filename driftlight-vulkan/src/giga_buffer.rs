//! Giga-buffer: one large device-local buffer sub-allocated by a free-list
//! (`driftlight_core::utils::RangeAllocator`) rather than one `vk::Buffer`
//! per mesh. Vertex and index giga-buffers default to 512 MiB each; both are
//! usable as transfer destinations, storage buffers (for the cull/compact
//! passes), vertex/index binding points, and acceleration-structure build
//! inputs.

use ash::vk;
use std::sync::Arc;

use driftlight_core::utils::{Allocation, RangeAllocator};

use crate::buffer::Buffer;
use crate::context::GpuContext;
use crate::error::{Error, Result};

pub const DEFAULT_GIGA_BUFFER_SIZE: u64 = 512 * 1024 * 1024;

pub struct GigaBuffer {
    buffer: Buffer,
    allocator: RangeAllocator,
}

impl GigaBuffer {
    pub fn new(ctx: Arc<GpuContext>, capacity: u64, extra_usage: vk::BufferUsageFlags, label: &str) -> Result<Self> {
        let usage = extra_usage
            | vk::BufferUsageFlags::TRANSFER_DST
            | vk::BufferUsageFlags::STORAGE_BUFFER
            | vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR;
        let buffer = Buffer::new(ctx, capacity, usage, gpu_allocator::MemoryLocation::GpuOnly, label)?;
        Ok(Self { buffer, allocator: RangeAllocator::new(capacity) })
    }

    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    pub fn device_address(&self) -> u64 {
        self.buffer.device_address()
    }

    /// Reserve `size` bytes. Returns `Error::OutOfMemory`-equivalent (wrapped
    /// as `Core`) when the free-list has nothing large enough — callers
    /// treat this as back-pressure on the upload queue, not a fatal error.
    pub fn reserve(&mut self, size: u64) -> Result<Allocation> {
        self.allocator
            .alloc(size)
            .ok_or(Error::Core(driftlight_core::Error::OutOfMemory))
    }

    pub fn release(&mut self, allocation: Allocation) {
        self.allocator.free(allocation);
    }

    pub fn free_bytes(&self) -> u64 {
        self.allocator.free_bytes()
    }

    pub fn largest_free_range(&self) -> u64 {
        self.allocator.largest_free_range()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_allocator_tracks_giga_buffer_capacity() {
        let allocator = RangeAllocator::new(DEFAULT_GIGA_BUFFER_SIZE);
        assert_eq!(allocator.free_bytes(), DEFAULT_GIGA_BUFFER_SIZE);
    }
}
