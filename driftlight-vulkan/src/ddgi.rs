//! DDGI probe atlas translator + baker (C12). Probes form a regular 3D grid
//! with step `{1, 2, 1}` m; the translator keeps the atlas centered on the
//! camera by shifting whole probe rows as the camera crosses a probe
//! boundary, and the baker can pin the camera and read the atlas back to a
//! CPU-side texture asset for tools/editor use.

use ash::vk;
use std::sync::Arc;

use driftlight_core::catalogue::Texture;
use driftlight_core::ids::AssetId;

use crate::buffer::Buffer;
use crate::context::GpuContext;
use crate::error::{Error, Result};

pub const PROBE_STEP_METERS: [f32; 3] = [1.0, 2.0, 1.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeGridIndex {
    pub x: i32,
    pub z: i32,
}

impl ProbeGridIndex {
    pub fn from_world_xz(x: f32, z: f32) -> Self {
        Self { x: (x / PROBE_STEP_METERS[0]).floor() as i32, z: (z / PROBE_STEP_METERS[2]).floor() as i32 }
    }
}

pub struct DdgiAtlas {
    ctx: Arc<GpuContext>,
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub probe_pixel: u32,
    pub probes_xz: u32,
    current_probe_index: ProbeGridIndex,
    baking: Option<BakeState>,
}

struct BakeState {
    pinned_tile_center: (f32, f32),
    previous_camera_position: glam::Vec3,
    frames_since_stop_requested: Option<u32>,
}

pub struct BakeResult {
    pub texture: Texture,
}

impl DdgiAtlas {
    pub fn new(ctx: Arc<GpuContext>, image: vk::Image, view: vk::ImageView, probe_pixel: u32, probes_xz: u32) -> Self {
        Self { ctx, image, view, probe_pixel, probes_xz, current_probe_index: ProbeGridIndex { x: 0, z: 0 }, baking: None }
    }

    /// Compute the integer probe-index delta for the camera's new position.
    /// Returns `None` when the camera hasn't crossed a probe boundary, in
    /// which case the translator pass is skipped entirely this frame.
    pub fn translation_delta(&mut self, camera_x: f32, camera_z: f32) -> Option<(i32, i32)> {
        let new_index = ProbeGridIndex::from_world_xz(camera_x, camera_z);
        let delta = (new_index.x - self.current_probe_index.x, new_index.z - self.current_probe_index.z);
        if delta == (0, 0) {
            return None;
        }
        self.current_probe_index = new_index;
        Some(delta)
    }

    /// Record the copy-atlas-to-temp, shift-with-pixel-offset, copy-back
    /// sequence described in §4.12. The temp image is caller-owned (the
    /// frame graph's transient-resource pool) since its lifetime is exactly
    /// one frame.
    pub fn record_translation(&self, cmd: vk::CommandBuffer, temp_image: vk::Image, delta: (i32, i32)) {
        let pixel = self.probe_pixel as i32;
        let slab_width = pixel * self.probes_xz as i32;
        let offset_x = delta.0 * pixel;
        let offset_z = delta.1 * pixel;

        transition(&self.ctx, cmd, self.image, vk::ImageLayout::TRANSFER_SRC_OPTIMAL, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
        transition(&self.ctx, cmd, temp_image, vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL);

        let copy_to_temp = vk::ImageCopy::default()
            .src_subresource(color_subresource())
            .dst_subresource(color_subresource())
            .extent(vk::Extent3D { width: slab_width as u32, height: slab_width as u32, depth: 1 });
        unsafe {
            self.ctx.device.cmd_copy_image(
                cmd,
                self.image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                temp_image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[copy_to_temp],
            )
        };

        transition(&self.ctx, cmd, temp_image, vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
        transition(&self.ctx, cmd, self.image, vk::ImageLayout::TRANSFER_SRC_OPTIMAL, vk::ImageLayout::TRANSFER_DST_OPTIMAL);

        let copy_back = vk::ImageCopy::default()
            .src_subresource(color_subresource())
            .dst_subresource(color_subresource())
            .dst_offset(vk::Offset3D { x: offset_x, y: 0, z: offset_z })
            .extent(vk::Extent3D { width: slab_width as u32, height: slab_width as u32, depth: 1 });
        unsafe {
            self.ctx.device.cmd_copy_image(
                cmd,
                temp_image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                self.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[copy_back],
            )
        };

        // Restore the layout passes in the rest of the graph expect. The
        // strip of probes left stale along the newly exposed edge is
        // refreshed by the subsequent ray-tracing pass, not by this copy.
        transition(&self.ctx, cmd, self.image, vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::GENERAL);
    }

    /// Pin the camera to the tile center and set `BAKE_MODE` so DDGI rays
    /// accumulate without the usual temporal hysteresis.
    pub fn start_bake(&mut self, tile_center: (f32, f32), current_camera_position: glam::Vec3) {
        self.baking = Some(BakeState {
            pinned_tile_center: tile_center,
            previous_camera_position: current_camera_position,
            frames_since_stop_requested: None,
        });
    }

    pub fn is_baking(&self) -> bool {
        self.baking.is_some()
    }

    pub fn pinned_camera_position(&self) -> Option<glam::Vec3> {
        self.baking.as_ref().map(|b| glam::Vec3::new(b.pinned_tile_center.0, 0.0, b.pinned_tile_center.1))
    }

    /// Request the bake stop. The actual readback defers one frame so the
    /// in-flight ray-tracing pass finishes writing the last probes.
    pub fn request_stop_bake(&mut self) {
        if let Some(bake) = &mut self.baking {
            bake.frames_since_stop_requested = Some(0);
        }
    }

    /// Called once per frame; returns `Some(restore_position)` the first
    /// time a full frame has elapsed since `request_stop_bake`, at which
    /// point the caller performs the device-idle wait and staging readback.
    pub fn poll_stop_bake(&mut self) -> Option<glam::Vec3> {
        let Some(bake) = &mut self.baking else { return None };
        match bake.frames_since_stop_requested {
            Some(n) if n >= 1 => {
                let restore = bake.previous_camera_position;
                self.baking = None;
                Some(restore)
            }
            Some(n) => {
                bake.frames_since_stop_requested = Some(n + 1);
                None
            }
            None => None,
        }
    }

    /// Download the atlas image into a CPU-side texture asset via a staging
    /// buffer. Only valid to call once the device is idle, i.e. after
    /// `poll_stop_bake` has returned `Some`.
    pub fn readback_to_texture(&self, id: AssetId, width: u32, height: u32) -> Result<BakeResult> {
        unsafe { self.ctx.device.device_wait_idle().map_err(Error::Vulkan)? };

        let size = (width as u64) * (height as u64) * 16;
        let staging = Buffer::new(self.ctx.clone(), size, vk::BufferUsageFlags::TRANSFER_DST, gpu_allocator::MemoryLocation::GpuToCpu, "ddgi-bake-readback")?;

        let cmd = one_shot_command_buffer(&self.ctx)?;
        let region = vk::BufferImageCopy::default()
            .image_subresource(color_subresource())
            .image_extent(vk::Extent3D { width, height, depth: 1 });
        unsafe {
            self.ctx.device.cmd_copy_image_to_buffer(cmd, self.image, vk::ImageLayout::TRANSFER_SRC_OPTIMAL, staging.handle(), &[region])
        };
        submit_and_wait_one_shot(&self.ctx, cmd)?;

        // The resulting blob is a single RGBA16F mip; downstream tools
        // treat it like any other imported texture asset.
        let mips = vec![staging.read(0, size)?];
        Ok(BakeResult { texture: Texture::new(id, driftlight_core::catalogue::TextureFormat::RGBA16F, width, height, mips, true) })
    }
}

fn color_subresource() -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers { aspect_mask: vk::ImageAspectFlags::COLOR, mip_level: 0, base_array_layer: 0, layer_count: 1 }
}

fn transition(ctx: &Arc<GpuContext>, cmd: vk::CommandBuffer, image: vk::Image, old: vk::ImageLayout, new: vk::ImageLayout) {
    let barrier = vk::ImageMemoryBarrier2::default()
        .old_layout(old)
        .new_layout(new)
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
        .src_stage_mask(vk::PipelineStageFlags2::TRANSFER)
        .dst_stage_mask(vk::PipelineStageFlags2::TRANSFER)
        .src_access_mask(vk::AccessFlags2::TRANSFER_WRITE)
        .dst_access_mask(vk::AccessFlags2::TRANSFER_READ | vk::AccessFlags2::TRANSFER_WRITE);
    let barriers = [barrier];
    let dep_info = vk::DependencyInfo::default().image_memory_barriers(&barriers);
    unsafe { ctx.device.cmd_pipeline_barrier2(cmd, &dep_info) };
}

fn one_shot_command_buffer(ctx: &Arc<GpuContext>) -> Result<vk::CommandBuffer> {
    let pool = ctx.upload_command_pool.lock().map_err(|_| Error::DeviceLost("upload pool mutex poisoned".into()))?;
    let alloc_info = vk::CommandBufferAllocateInfo::default().command_pool(*pool).level(vk::CommandBufferLevel::PRIMARY).command_buffer_count(1);
    let cmd = unsafe { ctx.device.allocate_command_buffers(&alloc_info).map_err(Error::Vulkan)? }[0];
    let begin_info = vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    unsafe { ctx.device.begin_command_buffer(cmd, &begin_info).map_err(Error::Vulkan)? };
    Ok(cmd)
}

fn submit_and_wait_one_shot(ctx: &Arc<GpuContext>, cmd: vk::CommandBuffer) -> Result<()> {
    unsafe { ctx.device.end_command_buffer(cmd).map_err(Error::Vulkan)? };
    let cmds = [cmd];
    let submit_info = vk::SubmitInfo::default().command_buffers(&cmds);
    unsafe {
        ctx.device.queue_submit(ctx.graphics_queue, &[submit_info], vk::Fence::null()).map_err(Error::Vulkan)?;
        ctx.device.queue_wait_idle(ctx.graphics_queue).map_err(Error::Vulkan)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_grid_index_uses_the_one_two_one_meter_step() {
        assert_eq!(ProbeGridIndex::from_world_xz(0.5, 1.5), ProbeGridIndex { x: 0, z: 0 });
        assert_eq!(ProbeGridIndex::from_world_xz(1.5, 2.5), ProbeGridIndex { x: 1, z: 1 });
        assert_eq!(ProbeGridIndex::from_world_xz(-0.5, -0.5), ProbeGridIndex { x: -1, z: -1 });
    }
}
