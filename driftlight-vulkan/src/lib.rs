/*!
# Driftlight Vulkan backend

Vulkan 1.3 implementation of the driftlight rendering runtime: a bindless,
giga-buffer-backed, GPU-driven renderer built on `ash` and `gpu-allocator`.

Nothing here is reachable through a trait object — `Orchestrator` is the one
entry point a host application drives, matching the rest of the crate's
preference for concrete types over dynamic dispatch at the seams that don't
need it.
*/

mod error;
mod context;
mod debug;
mod buffer;
mod giga_buffer;
mod staging_ring;
mod deletion_queue;
mod upload_queue;
mod bindless;
mod accel_structure;
mod frame_graph;
mod passes;
mod pipeline;
mod resources;
mod ddgi;
mod swapchain;
mod gpu_mirror;
mod orchestrator;

#[cfg(any(test, feature = "mock-device"))]
mod mock_device;

pub use error::{Error, Result};
pub use context::GpuContext;
pub use orchestrator::Orchestrator;
pub use bindless::BINDLESS_SET_INDEX;
pub use giga_buffer::GigaBuffer;
