//! `GpuContext` — shared GPU resources for every Vulkan object in the
//! backend: device, allocator, the four queue slots, and the one-shot
//! upload command pool. Shared via `Arc` by giga-buffers, textures, and the
//! acceleration-structure manager to avoid duplicating device handles.
//!
//! Device and instance destruction is deferred to `Orchestrator::drop()` so
//! teardown order is controlled explicitly rather than left to field-order
//! drop glue, which matters on platforms whose debug-messenger callback can
//! run during instance destruction.

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use std::ffi::{CStr, CString};
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};

/// Features the orchestrator requires of the chosen physical device (§4.13).
struct RequiredFeatures;

impl RequiredFeatures {
    fn supported(
        features12: &vk::PhysicalDeviceVulkan12Features,
        features11: &vk::PhysicalDeviceVulkan11Features,
        features10: &vk::PhysicalDeviceFeatures,
        atomic_float: &vk::PhysicalDeviceShaderAtomicFloatFeaturesEXT,
    ) -> bool {
        features12.sampler_filter_minmax == vk::TRUE
            && features12.descriptor_binding_partially_bound == vk::TRUE
            && features12.runtime_descriptor_array == vk::TRUE
            && features12.buffer_device_address == vk::TRUE
            && features12.host_query_reset == vk::TRUE
            && features11.multiview == vk::TRUE
            && features10.geometry_shader == vk::TRUE
            && features10.sampler_anisotropy == vk::TRUE
            && atomic_float.shader_buffer_float32_atomic_add == vk::TRUE
    }
}

pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
    pub compute: u32,
    /// Dedicated DMA-only transfer queue, when the device exposes one;
    /// falls back to the graphics family otherwise.
    pub transfer: u32,
}

pub struct GpuContext {
    pub device: ash::Device,
    pub allocator: ManuallyDrop<Arc<Mutex<Allocator>>>,

    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub compute_queue: vk::Queue,
    pub transfer_queue: vk::Queue,
    pub queue_families: QueueFamilies,

    /// Whether the physical device supports ray tracing (RT pipeline +
    /// acceleration structures); `AccelStructureManager` checks this before
    /// attempting any BLAS/TLAS build.
    pub raytracing_supported: bool,

    pub upload_command_pool: Mutex<vk::CommandPool>,

    pub instance: ash::Instance,
    entry: ash::Entry,
    physical_device: vk::PhysicalDevice,

    pub(crate) debug_utils_loader: Option<ash::ext::debug_utils::Instance>,
    pub(crate) debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl GpuContext {
    /// Enumerate instance extensions for the window system, create the
    /// instance (with validation layers under the `vulkan-validation`
    /// feature), pick a discrete GPU meeting the required feature set, and
    /// create the logical device with its four queue slots.
    pub fn init(window: &dyn raw_window_handle::HasWindowHandle, display: &dyn raw_window_handle::HasDisplayHandle) -> Result<Self> {
        let entry = unsafe { ash::Entry::load().map_err(|e| Error::DeviceLost(e.to_string()))? };

        let app_name = CString::new("driftlight").unwrap();
        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(&app_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);

        let mut extension_names =
            ash_window::enumerate_required_extensions(display.display_handle().map_err(|e| Error::DeviceLost(e.to_string()))?.as_raw())
                .map_err(Error::Vulkan)?
                .to_vec();

        #[cfg(feature = "vulkan-validation")]
        extension_names.push(ash::ext::debug_utils::NAME.as_ptr());

        let layer_names: Vec<CString> = {
            #[cfg(feature = "vulkan-validation")]
            {
                vec![CString::new("VK_LAYER_KHRONOS_validation").unwrap()]
            }
            #[cfg(not(feature = "vulkan-validation"))]
            {
                vec![]
            }
        };
        let layer_ptrs: Vec<*const i8> = layer_names.iter().map(|l| l.as_ptr()).collect();

        let instance_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extension_names)
            .enabled_layer_names(&layer_ptrs);

        let instance = unsafe { entry.create_instance(&instance_info, None).map_err(Error::Vulkan)? };

        let (debug_utils_loader, debug_messenger) = Self::init_debug_messenger(&entry, &instance);

        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);
        let surface = unsafe {
            ash_window::create_surface(
                &entry,
                &instance,
                display.display_handle().map_err(|e| Error::DeviceLost(e.to_string()))?.as_raw(),
                window.window_handle().map_err(|e| Error::DeviceLost(e.to_string()))?.as_raw(),
                None,
            )
            .map_err(Error::Vulkan)?
        };

        let (physical_device, queue_families, raytracing_supported) =
            Self::pick_physical_device(&instance, &surface_loader, surface)?;

        let device = Self::create_logical_device(&instance, physical_device, &queue_families, raytracing_supported)?;

        let graphics_queue = unsafe { device.get_device_queue(queue_families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(queue_families.present, 0) };
        let compute_queue = unsafe { device.get_device_queue(queue_families.compute, 0) };
        let transfer_queue = unsafe { device.get_device_queue(queue_families.transfer, 0) };

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: true,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| Error::DeviceLost(e.to_string()))?;

        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_families.graphics)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let upload_command_pool = unsafe { device.create_command_pool(&pool_info, None).map_err(Error::Vulkan)? };

        unsafe { surface_loader.destroy_surface(surface, None) };

        Ok(Self {
            device,
            allocator: ManuallyDrop::new(Arc::new(Mutex::new(allocator))),
            graphics_queue,
            present_queue,
            compute_queue,
            transfer_queue,
            queue_families,
            raytracing_supported,
            upload_command_pool: Mutex::new(upload_command_pool),
            instance,
            entry,
            physical_device,
            debug_utils_loader,
            debug_messenger,
        })
    }

    fn init_debug_messenger(
        entry: &ash::Entry,
        instance: &ash::Instance,
    ) -> (Option<ash::ext::debug_utils::Instance>, Option<vk::DebugUtilsMessengerEXT>) {
        if !cfg!(feature = "vulkan-validation") {
            return (None, None);
        }

        let loader = ash::ext::debug_utils::Instance::new(entry, instance);
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(crate::debug::vulkan_debug_callback));

        let messenger = unsafe { loader.create_debug_utils_messenger(&create_info, None).ok() };
        (Some(loader), messenger)
    }

    fn pick_physical_device(
        instance: &ash::Instance,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
    ) -> Result<(vk::PhysicalDevice, QueueFamilies, bool)> {
        let devices = unsafe { instance.enumerate_physical_devices().map_err(Error::Vulkan)? };

        for device in devices {
            let props = unsafe { instance.get_physical_device_properties(device) };
            if props.device_type != vk::PhysicalDeviceType::DISCRETE_GPU {
                continue;
            }

            let mut atomic_float = vk::PhysicalDeviceShaderAtomicFloatFeaturesEXT::default();
            let mut features12 = vk::PhysicalDeviceVulkan12Features::default().push_next(&mut atomic_float);
            let mut features11 = vk::PhysicalDeviceVulkan11Features::default().push_next(&mut features12);
            let mut features2 = vk::PhysicalDeviceFeatures2::default().push_next(&mut features11);
            unsafe { instance.get_physical_device_features2(device, &mut features2) };

            if !RequiredFeatures::supported(&features12, &features11, &features2.features, &atomic_float) {
                continue;
            }

            let queue_props = unsafe { instance.get_physical_device_queue_family_properties(device) };
            let graphics = queue_props.iter().position(|q| q.queue_flags.contains(vk::QueueFlags::GRAPHICS));
            let Some(graphics) = graphics else { continue };

            let present = (0..queue_props.len() as u32).find(|&i| unsafe {
                surface_loader.get_physical_device_surface_support(device, i, surface).unwrap_or(false)
            });
            let Some(present) = present else { continue };

            let compute = queue_props
                .iter()
                .position(|q| q.queue_flags.contains(vk::QueueFlags::COMPUTE))
                .unwrap_or(graphics);

            // A dedicated transfer queue exposes TRANSFER but neither
            // GRAPHICS nor COMPUTE — the DMA-only engine.
            let transfer = queue_props
                .iter()
                .position(|q| {
                    q.queue_flags.contains(vk::QueueFlags::TRANSFER)
                        && !q.queue_flags.contains(vk::QueueFlags::GRAPHICS)
                        && !q.queue_flags.contains(vk::QueueFlags::COMPUTE)
                })
                .unwrap_or(graphics);

            let raytracing_supported = Self::device_supports_raytracing(instance, device);

            return Ok((
                device,
                QueueFamilies {
                    graphics: graphics as u32,
                    present,
                    compute: compute as u32,
                    transfer: transfer as u32,
                },
                raytracing_supported,
            ));
        }

        Err(Error::NoSuitablePhysicalDevice)
    }

    fn device_supports_raytracing(instance: &ash::Instance, device: vk::PhysicalDevice) -> bool {
        let extensions = unsafe { instance.enumerate_device_extension_properties(device) };
        let Ok(extensions) = extensions else { return false };
        let wanted = [
            ash::khr::acceleration_structure::NAME,
            ash::khr::ray_tracing_pipeline::NAME,
            ash::khr::deferred_host_operations::NAME,
        ];
        wanted.iter().all(|name| {
            extensions.iter().any(|ext| {
                let ext_name = unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) };
                ext_name == *name
            })
        })
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        families: &QueueFamilies,
        raytracing_supported: bool,
    ) -> Result<ash::Device> {
        let mut unique_families = vec![families.graphics, families.present, families.compute, families.transfer];
        unique_families.sort_unstable();
        unique_families.dedup();

        let priority = [1.0f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| vk::DeviceQueueCreateInfo::default().queue_family_index(family).queue_priorities(&priority))
            .collect();

        let mut extension_names = vec![ash::khr::swapchain::NAME.as_ptr(), ash::ext::shader_atomic_float::NAME.as_ptr()];
        if raytracing_supported {
            extension_names.push(ash::khr::acceleration_structure::NAME.as_ptr());
            extension_names.push(ash::khr::ray_tracing_pipeline::NAME.as_ptr());
            extension_names.push(ash::khr::deferred_host_operations::NAME.as_ptr());
        }

        let mut features12 = vk::PhysicalDeviceVulkan12Features::default()
            .sampler_filter_minmax(true)
            .descriptor_binding_partially_bound(true)
            .descriptor_binding_variable_descriptor_count(true)
            .runtime_descriptor_array(true)
            .buffer_device_address(true)
            .host_query_reset(true)
            .shader_buffer_int64_atomics(true);
        let mut features11 = vk::PhysicalDeviceVulkan11Features::default().multiview(true);
        let features10 = vk::PhysicalDeviceFeatures::default()
            .geometry_shader(true)
            .sampler_anisotropy(true)
            .shader_int64(true)
            .fragment_stores_and_atomics(true);

        let mut accel_feature = vk::PhysicalDeviceAccelerationStructureFeaturesKHR::default().acceleration_structure(true);
        let mut rt_pipeline_feature = vk::PhysicalDeviceRayTracingPipelineFeaturesKHR::default().ray_tracing_pipeline(true);
        let mut atomic_float_feature = vk::PhysicalDeviceShaderAtomicFloatFeaturesEXT::default().shader_buffer_float32_atomic_add(true);

        let mut device_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features10)
            .push_next(&mut features11)
            .push_next(&mut features12)
            .push_next(&mut atomic_float_feature);

        if raytracing_supported {
            device_info = device_info.push_next(&mut accel_feature).push_next(&mut rt_pipeline_feature);
        }

        unsafe { instance.create_device(physical_device, &device_info, None).map_err(Error::Vulkan) }
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        // Device/instance teardown happens in Orchestrator::drop() so the
        // sequencing relative to the swapchain and debug messenger is
        // explicit rather than derived from struct field order.
    }
}
