use glam::{Mat4, Vec3, Vec4};
use crate::ids::AssetId;

/// A component on a scene node: one instance of a model in the world.
#[derive(Debug, Clone)]
pub struct Renderable {
    pub id: AssetId,
    pub name: String,
    pub model: AssetId,
    pub skeleton: Option<AssetId>,
    /// One material id per mesh of `model`; duplicates allowed.
    pub materials: Vec<AssetId>,
    pub transform: Mat4,
    pub tint: Vec3,
    /// xyz = world-space center, w = radius.
    pub bounding_sphere: Vec4,
    pub visible: bool,
}

impl Renderable {
    pub fn new(id: AssetId, name: impl Into<String>, model: AssetId, materials: Vec<AssetId>) -> Self {
        Self {
            id,
            name: name.into(),
            model,
            skeleton: None,
            materials,
            transform: Mat4::IDENTITY,
            tint: Vec3::ONE,
            bounding_sphere: Vec4::new(0.0, 0.0, 0.0, 1.0),
            visible: true,
        }
    }

    pub fn is_skinned(&self) -> bool {
        self.skeleton.is_some()
    }
}

/// Runtime GPU bookkeeping for a renderable, separate from its asset data so
/// the catalogue can recompute it without mutating caller-owned fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderableGpuState {
    /// Start offset into the renderable material-index buffer.
    pub material_index_offset: u32,
    /// Start offset into the model (mesh-index) buffer.
    pub model_offset: u32,
    /// Offset into the flat skeleton joint-matrix buffer, if skinned.
    pub skeleton_offset: Option<u32>,
    /// Offset of this renderable's dynamic (animated) mesh-index run in the
    /// model buffer, set once dynamic BLAS copies exist for it.
    pub dynamic_model_offset: Option<u32>,
}
