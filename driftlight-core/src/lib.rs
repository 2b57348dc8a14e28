/*!
# Driftlight core

Backend-agnostic types for the Driftlight renderer: the asset catalogue,
identifiers, camera/frustum math, GPU-record layouts, world paging, session
persistence, and the small allocators the GPU backend builds its arenas on.

This crate holds no GPU handles. `driftlight-vulkan` is the concrete Vulkan
runtime that turns these types into device resources and draws frames with
them.

## Layout

- [`ids`] — asset identifiers and world tile indices
- [`geometry`] — AABB
- [`camera`] — passive camera/frustum data containers
- [`catalogue`] — CPU mirror of scene assets (meshes, models, materials,
  textures, renderables, lights, skeletons, animations)
- [`gpu_records`] — `#[repr(C)]` structs mirroring the GPU-side buffer layouts
- [`pager`] — tile selection around a moving camera
- [`scene_file`] — versioned binary `.dlscene` format for catalogue assets
- [`session_config`] — small persisted session state (last scene, last camera)
- [`utils`] — index and byte-range allocators
- [`log`] — structured engine logging, forwarded to the `log` facade
- [`error`] — shared `Error`/`Result`
*/

pub mod error;
pub mod log;
pub mod ids;
pub mod geometry;
pub mod gpu_types;
pub mod camera;
pub mod catalogue;
pub mod gpu_records;
pub mod pager;
pub mod scene_file;
pub mod session_config;
pub mod utils;

pub use error::{Error, Result};

pub use glam;
