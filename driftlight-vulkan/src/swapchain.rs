//! Swapchain wrapper: creation, per-image views, and resize/suboptimal
//! recreation. Recreating the swapchain implies the frame graph's
//! swapchain-sized resources (G-buffer, depth, HDR target) must also be
//! rebuilt — the orchestrator drives that from `Orchestrator::draw_frame`'s
//! step 5 (§4.13).

use ash::vk;
use std::sync::Arc;

use crate::context::GpuContext;
use crate::error::{Error, Result};

pub struct Swapchain {
    ctx: Arc<GpuContext>,
    loader: ash::khr::swapchain::Device,
    surface_loader: ash::khr::surface::Instance,
    pub surface: vk::SurfaceKHR,
    pub handle: vk::SwapchainKHR,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
}

impl Swapchain {
    pub fn new(
        ctx: Arc<GpuContext>,
        entry: &ash::Entry,
        instance: &ash::Instance,
        surface: vk::SurfaceKHR,
        requested_extent: vk::Extent2D,
    ) -> Result<Self> {
        let loader = ash::khr::swapchain::Device::new(instance, &ctx.device);
        let surface_loader = ash::khr::surface::Instance::new(entry, instance);

        let (handle, format, extent, images, image_views) =
            Self::create(&ctx, &loader, &surface_loader, surface, requested_extent, None)?;

        Ok(Self { ctx, loader, surface_loader, surface, handle, format, extent, images, image_views })
    }

    /// Tear down and rebuild at a new extent. Old per-image views are
    /// destroyed; the old swapchain handle is passed as `old_swapchain` so
    /// the driver can hand resources back cleanly.
    pub fn recreate(&mut self, requested_extent: vk::Extent2D) -> Result<()> {
        unsafe { self.ctx.device.device_wait_idle().map_err(Error::Vulkan)? };

        for &view in &self.image_views {
            unsafe { self.ctx.device.destroy_image_view(view, None) };
        }
        let old_handle = self.handle;

        let (handle, format, extent, images, image_views) =
            Self::create(&self.ctx, &self.loader, &self.surface_loader, self.surface, requested_extent, Some(old_handle))?;

        unsafe { self.loader.destroy_swapchain(old_handle, None) };

        self.handle = handle;
        self.format = format;
        self.extent = extent;
        self.images = images;
        self.image_views = image_views;
        Ok(())
    }

    fn create(
        ctx: &Arc<GpuContext>,
        loader: &ash::khr::swapchain::Device,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
        requested_extent: vk::Extent2D,
        old_swapchain: Option<vk::SwapchainKHR>,
    ) -> Result<(vk::SwapchainKHR, vk::Format, vk::Extent2D, Vec<vk::Image>, Vec<vk::ImageView>)> {
        let capabilities =
            unsafe { surface_loader.get_physical_device_surface_capabilities(ctx.physical_device(), surface).map_err(Error::Vulkan)? };
        let formats =
            unsafe { surface_loader.get_physical_device_surface_formats(ctx.physical_device(), surface).map_err(Error::Vulkan)? };
        let present_modes =
            unsafe { surface_loader.get_physical_device_surface_present_modes(ctx.physical_device(), surface).map_err(Error::Vulkan)? };

        let surface_format = formats
            .iter()
            .find(|f| f.format == vk::Format::B8G8R8A8_UNORM && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
            .copied()
            .unwrap_or(formats[0]);

        let present_mode = present_modes
            .iter()
            .copied()
            .find(|&m| m == vk::PresentModeKHR::MAILBOX)
            .unwrap_or(vk::PresentModeKHR::FIFO);

        let extent = if capabilities.current_extent.width != u32::MAX {
            capabilities.current_extent
        } else {
            vk::Extent2D {
                width: requested_extent.width.clamp(capabilities.min_image_extent.width, capabilities.max_image_extent.width),
                height: requested_extent.height.clamp(capabilities.min_image_extent.height, capabilities.max_image_extent.height),
            }
        };

        let mut image_count = capabilities.min_image_count + 1;
        if capabilities.max_image_count > 0 {
            image_count = image_count.min(capabilities.max_image_count);
        }

        let mut create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);
        if let Some(old) = old_swapchain {
            create_info = create_info.old_swapchain(old);
        }

        let handle = unsafe { loader.create_swapchain(&create_info, None).map_err(Error::Vulkan)? };
        let images = unsafe { loader.get_swapchain_images(handle).map_err(Error::Vulkan)? };

        let image_views = images
            .iter()
            .map(|&image| {
                let view_info = vk::ImageViewCreateInfo::default()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(surface_format.format)
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    });
                unsafe { ctx.device.create_image_view(&view_info, None).map_err(Error::Vulkan) }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok((handle, surface_format.format, extent, images, image_views))
    }

    /// Returns `Ok(None)` when the result is `SUBOPTIMAL_KHR` so the caller
    /// can still present this frame before recreating on the next one, and
    /// `Err(Error::SwapchainOutOfDate)` when the image genuinely can't be
    /// acquired.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<Option<u32>> {
        let result = unsafe { self.loader.acquire_next_image(self.handle, u64::MAX, semaphore, vk::Fence::null()) };
        match result {
            Ok((index, false)) => Ok(Some(index)),
            Ok((index, true)) => Ok(Some(index)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(Error::SwapchainOutOfDate),
            Err(e) => Err(Error::Vulkan(e)),
        }
    }

    pub fn present(&self, queue: vk::Queue, wait_semaphore: vk::Semaphore, image_index: u32) -> Result<bool> {
        let wait_semaphores = [wait_semaphore];
        let swapchains = [self.handle];
        let indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&indices);

        match unsafe { self.loader.queue_present(queue, &present_info) } {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(Error::SwapchainOutOfDate),
            Err(e) => Err(Error::Vulkan(e)),
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.ctx.device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.handle, None);
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}
