//! Per-frame-graph-resource image/buffer pool: turns the names `passes.rs`
//! declares in its `ResourceUsage`s into real `vk::Image`/`vk::Buffer`
//! handles, so the barriers the graph computes (§4.9) bind an actual
//! resource instead of a content-free global memory barrier, and pass bodies
//! have something to bind as a descriptor or render target. Images are sized
//! at swapchain extent and rebuilt whenever it resizes; buffers are a fixed
//! capacity, independent of extent.

use ash::vk;
use std::collections::HashMap;
use std::sync::Arc;

use crate::context::GpuContext;
use crate::error::{Error, Result};
use crate::frame_graph::ResourceType;

const DEFAULT_SSBO_CAPACITY: u64 = 4 * 1024 * 1024;

struct PooledImage {
    image: vk::Image,
    view: vk::ImageView,
    format: vk::Format,
}

struct PooledBuffer {
    buffer: vk::Buffer,
    allocation: Option<gpu_allocator::vulkan::Allocation>,
}

pub struct TransientResourcePool {
    ctx: Arc<GpuContext>,
    images: HashMap<String, PooledImage>,
    buffers: HashMap<String, PooledBuffer>,
    extent: vk::Extent2D,
}

impl TransientResourcePool {
    pub fn new(ctx: Arc<GpuContext>) -> Self {
        Self { ctx, images: HashMap::new(), buffers: HashMap::new(), extent: vk::Extent2D { width: 0, height: 0 } }
    }

    pub fn image(&self, name: &str) -> Option<vk::Image> {
        self.images.get(name).map(|i| i.image)
    }

    pub fn image_view(&self, name: &str) -> Option<vk::ImageView> {
        self.images.get(name).map(|i| i.view)
    }

    pub fn format(&self, name: &str) -> Option<vk::Format> {
        self.images.get(name).map(|i| i.format)
    }

    pub fn buffer(&self, name: &str) -> Option<vk::Buffer> {
        self.buffers.get(name).map(|b| b.buffer)
    }

    /// Ensure every named resource in `usages` has a backing handle sized
    /// for `extent`. Idempotent for unchanged names/extent; called once at
    /// init and again whenever the swapchain recreates.
    pub fn rebuild(&mut self, usages: &[(String, ResourceType)], extent: vk::Extent2D) -> Result<()> {
        let extent_changed = self.extent != extent;
        self.extent = extent;

        for (name, ty) in usages {
            match ty {
                ResourceType::Ssbo | ResourceType::Ubo => {
                    if !self.buffers.contains_key(name) {
                        self.create_buffer(name, *ty)?;
                    }
                }
                _ => {
                    if extent_changed || !self.images.contains_key(name) {
                        self.create_image(name, *ty, extent)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn create_buffer(&mut self, name: &str, ty: ResourceType) -> Result<()> {
        let usage = if ty == ResourceType::Ubo { vk::BufferUsageFlags::UNIFORM_BUFFER } else { vk::BufferUsageFlags::STORAGE_BUFFER };
        let create_info = vk::BufferCreateInfo::default()
            .size(DEFAULT_SSBO_CAPACITY)
            .usage(usage | vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::TRANSFER_SRC)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { self.ctx.device.create_buffer(&create_info, None).map_err(Error::Vulkan)? };
        let requirements = unsafe { self.ctx.device.get_buffer_memory_requirements(buffer) };

        let allocation = {
            let mut allocator = self.ctx.allocator.lock().map_err(|_| Error::DeviceLost("allocator mutex poisoned".into()))?;
            allocator
                .allocate(&gpu_allocator::vulkan::AllocationCreateDesc {
                    name,
                    requirements,
                    location: gpu_allocator::MemoryLocation::GpuOnly,
                    linear: true,
                    allocation_scheme: gpu_allocator::vulkan::AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(|e| Error::DeviceLost(e.to_string()))?
        };
        unsafe { self.ctx.device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()).map_err(Error::Vulkan)? };

        self.buffers.insert(name.to_string(), PooledBuffer { buffer, allocation: Some(allocation) });
        Ok(())
    }

    fn create_image(&mut self, name: &str, ty: ResourceType, extent: vk::Extent2D) -> Result<()> {
        if let Some(existing) = self.images.remove(name) {
            unsafe {
                self.ctx.device.destroy_image_view(existing.view, None);
                self.ctx.device.destroy_image(existing.image, None);
            }
        }

        let format = image_format_for(ty);
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D { width: extent.width.max(1), height: extent.height.max(1), depth: 1 })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(image_usage_for(ty))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let image = unsafe { self.ctx.device.create_image(&image_info, None).map_err(Error::Vulkan)? };

        let requirements = unsafe { self.ctx.device.get_image_memory_requirements(image) };
        let allocation = {
            let mut allocator = self.ctx.allocator.lock().map_err(|_| Error::DeviceLost("allocator mutex poisoned".into()))?;
            allocator
                .allocate(&gpu_allocator::vulkan::AllocationCreateDesc {
                    name,
                    requirements,
                    location: gpu_allocator::MemoryLocation::GpuOnly,
                    linear: false,
                    allocation_scheme: gpu_allocator::vulkan::AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(|e| Error::DeviceLost(e.to_string()))?
        };
        unsafe { self.ctx.device.bind_image_memory(image, allocation.memory(), allocation.offset()).map_err(Error::Vulkan)? };
        std::mem::forget(allocation);

        let aspect = if matches!(ty, ResourceType::DepthAttachment | ResourceType::SampledDepthTexture) {
            vk::ImageAspectFlags::DEPTH
        } else {
            vk::ImageAspectFlags::COLOR
        };
        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        let view = unsafe { self.ctx.device.create_image_view(&view_info, None).map_err(Error::Vulkan)? };

        self.images.insert(name.to_string(), PooledImage { image, view, format });
        Ok(())
    }
}

fn image_format_for(ty: ResourceType) -> vk::Format {
    match ty {
        ResourceType::DepthAttachment | ResourceType::SampledDepthTexture => vk::Format::D32_SFLOAT,
        ResourceType::ImageStorage => vk::Format::R16G16B16A16_SFLOAT,
        _ => vk::Format::R8G8B8A8_UNORM,
    }
}

fn image_usage_for(ty: ResourceType) -> vk::ImageUsageFlags {
    use vk::ImageUsageFlags as U;
    match ty {
        ResourceType::ColorAttachment => U::COLOR_ATTACHMENT | U::SAMPLED | U::TRANSFER_SRC,
        ResourceType::DepthAttachment => U::DEPTH_STENCIL_ATTACHMENT | U::SAMPLED,
        ResourceType::SampledTexture | ResourceType::SampledDepthTexture => U::SAMPLED | U::STORAGE,
        ResourceType::ImageStorage => U::STORAGE | U::SAMPLED | U::TRANSFER_SRC | U::TRANSFER_DST,
        ResourceType::ImageTransferSrc => U::TRANSFER_SRC | U::SAMPLED,
        ResourceType::ImageTransferDst => U::TRANSFER_DST | U::SAMPLED,
        ResourceType::Ssbo | ResourceType::Ubo => unreachable!("buffer resource types never reach image_usage_for"),
    }
}

impl Drop for TransientResourcePool {
    fn drop(&mut self) {
        unsafe {
            for image in self.images.values() {
                self.ctx.device.destroy_image_view(image.view, None);
                self.ctx.device.destroy_image(image.image, None);
            }
            for buffer in self.buffers.values_mut() {
                if let Some(allocation) = buffer.allocation.take() {
                    if let Ok(mut allocator) = self.ctx.allocator.lock() {
                        allocator.free(allocation).ok();
                    }
                }
                self.ctx.device.destroy_buffer(buffer.buffer, None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_resources_pick_a_depth_format() {
        assert_eq!(image_format_for(ResourceType::DepthAttachment), vk::Format::D32_SFLOAT);
        assert_eq!(image_format_for(ResourceType::SampledDepthTexture), vk::Format::D32_SFLOAT);
    }

    #[test]
    fn color_attachment_usage_includes_sampled_for_later_read_passes() {
        assert!(image_usage_for(ResourceType::ColorAttachment).contains(vk::ImageUsageFlags::SAMPLED));
    }
}
