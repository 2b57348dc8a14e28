//! Vulkan-backend error type. Wraps the same taxonomy as
//! `driftlight_core::Error` plus a variant for raw `vk::Result` codes, so
//! FFI call sites can `?` straight through without losing the code.

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone)]
pub enum Error {
    Vulkan(ash::vk::Result),
    Core(driftlight_core::Error),
    /// Device lost or an allocation failed with no recoverable path —
    /// callers log and terminate per the error-handling design (fatal
    /// class), they do not retry.
    DeviceLost(String),
    NoSuitablePhysicalDevice,
    SwapchainOutOfDate,
    /// A pass's compiled SPIR-V module wasn't found on disk under the
    /// shader directory; the pass's dispatch is skipped for this frame
    /// rather than treated as fatal, since shader assets are built
    /// separately from the renderer binary.
    ShaderNotFound(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Vulkan(r) => write!(f, "vulkan error: {r}"),
            Error::Core(e) => write!(f, "{e}"),
            Error::DeviceLost(msg) => write!(f, "device lost: {msg}"),
            Error::NoSuitablePhysicalDevice => write!(f, "no physical device supports the required features"),
            Error::SwapchainOutOfDate => write!(f, "swapchain out of date"),
            Error::ShaderNotFound(path) => write!(f, "shader module not found: {path}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<ash::vk::Result> for Error {
    fn from(r: ash::vk::Result) -> Self {
        Error::Vulkan(r)
    }
}

impl From<driftlight_core::Error> for Error {
    fn from(e: driftlight_core::Error) -> Self {
        Error::Core(e)
    }
}
