use glam::Vec3;
use crate::ids::AssetId;

/// Immutable triangle mesh: attribute layout is fixed (position, normal,
/// tangent+handedness, UV, color, 4×joint index, 4×joint weight); the
/// catalogue never inspects vertex bytes, only tracks the range they occupy
/// once uploaded.
#[derive(Debug, Clone)]
pub struct Mesh {
    pub id: AssetId,
    pub aabb_min: Vec3,
    pub aabb_max: Vec3,
    /// Set once the upload queue has copied this mesh into the giga-buffers.
    /// `None` while the mesh is still pending upload.
    pub gpu: Option<MeshGpuState>,
}

/// Where a mesh's vertex/index ranges live in the giga-buffers, and its BLAS
/// device address once one has been built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshGpuState {
    pub vertex_offset: u32,
    pub index_offset: u32,
    pub vertex_count: u32,
    pub index_count: u32,
    /// Zero until a BLAS has been built for this mesh (invariant 3).
    pub blas_device_address: u64,
}

impl Mesh {
    pub fn new(id: AssetId, aabb_min: Vec3, aabb_max: Vec3) -> Self {
        Self { id, aabb_min, aabb_max, gpu: None }
    }

    pub fn is_resident(&self) -> bool {
        self.gpu.is_some()
    }

    pub fn has_blas(&self) -> bool {
        self.gpu.map(|g| g.blas_device_address != 0).unwrap_or(false)
    }
}
