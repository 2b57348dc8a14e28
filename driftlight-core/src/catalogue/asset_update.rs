use glam::Vec3;
use crate::ids::AssetId;
use super::animation::{Animation, Animator};
use super::light::Light;
use super::material::Material;
use super::model::Model;
use super::renderable::Renderable;
use super::skeleton::Skeleton;
use super::texture::Texture;
use super::tile::TileInfo;

/// One transactional batch of catalogue changes. Every scene-observer event
/// in a frame (renderable added, material edited, tile paged in, ...) is
/// folded into a single `AssetUpdate` and applied with
/// [`super::Catalogue::apply_update`]. An empty `AssetUpdate` is a no-op;
/// applying the same update twice in a row is equivalent to applying it
/// once.
#[derive(Debug, Clone, Default)]
pub struct AssetUpdate {
    pub added_models: Vec<(Model, Vec<(Vec3, Vec3)>)>,
    pub removed_models: Vec<AssetId>,

    pub added_textures: Vec<Texture>,
    pub removed_textures: Vec<AssetId>,

    pub added_materials: Vec<Material>,
    pub updated_materials: Vec<Material>,
    pub removed_materials: Vec<AssetId>,

    pub added_animations: Vec<Animation>,
    pub removed_animations: Vec<AssetId>,
    pub updated_animators: Vec<Animator>,

    pub added_skeletons: Vec<Skeleton>,
    pub removed_skeletons: Vec<AssetId>,

    pub added_renderables: Vec<Renderable>,
    pub updated_renderables: Vec<Renderable>,
    pub removed_renderables: Vec<AssetId>,

    pub added_lights: Vec<Light>,
    pub updated_lights: Vec<Light>,
    pub removed_lights: Vec<AssetId>,

    pub added_tile_infos: Vec<TileInfo>,
    pub updated_tile_infos: Vec<TileInfo>,
    pub removed_tile_infos: Vec<crate::ids::TileIndex>,
}

impl AssetUpdate {
    pub fn is_empty(&self) -> bool {
        self.added_models.is_empty()
            && self.removed_models.is_empty()
            && self.added_textures.is_empty()
            && self.removed_textures.is_empty()
            && self.added_materials.is_empty()
            && self.updated_materials.is_empty()
            && self.removed_materials.is_empty()
            && self.added_animations.is_empty()
            && self.removed_animations.is_empty()
            && self.updated_animators.is_empty()
            && self.added_skeletons.is_empty()
            && self.removed_skeletons.is_empty()
            && self.added_renderables.is_empty()
            && self.updated_renderables.is_empty()
            && self.removed_renderables.is_empty()
            && self.added_lights.is_empty()
            && self.updated_lights.is_empty()
            && self.removed_lights.is_empty()
            && self.added_tile_infos.is_empty()
            && self.updated_tile_infos.is_empty()
            && self.removed_tile_infos.is_empty()
    }
}
