use glam::{Vec3, Vec4};
use crate::ids::AssetId;

/// `{ base_color_factor, emissive (rgb + strength), metallic_factor,
/// roughness_factor, 4× optional texture ids }`. Mutable: updating rewrites
/// the GPU record and forces re-emission of every dependent renderable.
#[derive(Debug, Clone)]
pub struct Material {
    pub id: AssetId,
    pub base_color_factor: Vec3,
    /// rgb = emissive color, w = emissive strength.
    pub emissive: Vec4,
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub metallic_roughness_tex: Option<AssetId>,
    pub albedo_tex: Option<AssetId>,
    pub normal_tex: Option<AssetId>,
    pub emissive_tex: Option<AssetId>,
}

impl Material {
    pub fn new(id: AssetId) -> Self {
        Self {
            id,
            base_color_factor: Vec3::ONE,
            emissive: Vec4::ZERO,
            metallic_factor: 1.0,
            roughness_factor: 1.0,
            metallic_roughness_tex: None,
            albedo_tex: None,
            normal_tex: None,
            emissive_tex: None,
        }
    }

    /// The textures this material needs resident before it can be emitted
    /// to the GPU (invariant 1).
    pub fn referenced_textures(&self) -> impl Iterator<Item = AssetId> + '_ {
        [self.metallic_roughness_tex, self.albedo_tex, self.normal_tex, self.emissive_tex]
            .into_iter()
            .flatten()
    }
}
