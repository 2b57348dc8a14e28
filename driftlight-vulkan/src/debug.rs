//! Validation-layer debug messenger. Maps `VK_EXT_debug_utils` callbacks
//! onto the engine's structured logger rather than printing directly, so
//! validation output is tagged and colored the same way as the rest of the
//! engine's logs.

use ash::vk;
use driftlight_core::{engine_error, engine_info, engine_trace, engine_warn};
use std::ffi::CStr;
use std::sync::atomic::{AtomicU32, Ordering};

static ERRORS: AtomicU32 = AtomicU32::new(0);
static WARNINGS: AtomicU32 = AtomicU32::new(0);

pub fn reset_stats() {
    ERRORS.store(0, Ordering::Relaxed);
    WARNINGS.store(0, Ordering::Relaxed);
}

pub fn error_count() -> u32 {
    ERRORS.load(Ordering::Relaxed)
}

pub fn warning_count() -> u32 {
    WARNINGS.load(Ordering::Relaxed)
}

pub unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    // Validation-layer callbacks cross an FFI boundary; a panic unwinding
    // through it is undefined behaviour, so every path here is caught.
    let result = std::panic::catch_unwind(|| {
        vulkan_debug_callback_inner(message_severity, message_type, p_callback_data)
    });
    result.unwrap_or(vk::FALSE)
}

unsafe fn vulkan_debug_callback_inner(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }
    let data = *p_callback_data;
    let message = if data.p_message.is_null() {
        "<no message>"
    } else {
        CStr::from_ptr(data.p_message).to_str().unwrap_or("<invalid utf-8>")
    };

    let type_str = if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "validation"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "performance"
    } else {
        "general"
    };

    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        ERRORS.fetch_add(1, Ordering::Relaxed);
        engine_error!("driftlight::vulkan::debug", "[{type_str}] {message}");
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        WARNINGS.fetch_add(1, Ordering::Relaxed);
        engine_warn!("driftlight::vulkan::debug", "[{type_str}] {message}");
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        engine_info!("driftlight::vulkan::debug", "[{type_str}] {message}");
    } else {
        engine_trace!("driftlight::vulkan::debug", "[{type_str}] {message}");
    }

    vk::FALSE
}
