//! CPU mirror of scene assets.
//!
//! [`Catalogue`] holds dense arrays plus id→index maps for every asset kind
//! and processes [`AssetUpdate`] batches in the fixed order the upload
//! queue and GPU mirror buffers depend on (§4.6 of the design notes): tile
//! infos, then model/mesh removal (cascading to dependent renderables),
//! then additions, then materials, then skeletons, then renderables, then
//! lights. Nothing in this module touches a GPU handle — residency is
//! tracked as `Option<...GpuState>` fields that the upload queue fills in
//! once it has actually copied bytes to the device.

mod animation;
mod asset_update;
mod light;
mod material;
mod mesh;
mod model;
mod renderable;
mod skeleton;
mod texture;
mod tile;

pub use animation::{Animation, Animator};
pub use asset_update::AssetUpdate;
pub use light::{Light, LightShadow};
pub use material::Material;
pub use mesh::{Mesh, MeshGpuState};
pub use model::Model;
pub use renderable::{Renderable, RenderableGpuState};
pub use skeleton::{Joint, Skeleton};
pub use texture::{MipBlob, Texture, TextureFormat};
pub use tile::TileInfo;

use std::collections::HashMap;
use crate::ids::{AssetId, TileIndex};
use crate::utils::SlotAllocator;

/// Default number of fixed point-light shadow-caster slots.
pub const SHADOW_CASTER_SLOTS: usize = 4;

/// Sticky per-multi-buffer-slot dirty flags. `*_changed[frame]` stays set
/// until the frame's re-emission pass has consumed it.
#[derive(Debug, Clone, Default)]
pub struct DirtyFlags {
    pub tile_infos_changed: Vec<bool>,
    pub models_changed: Vec<bool>,
    pub materials_changed: Vec<bool>,
    pub renderables_changed: Vec<bool>,
    pub lights_changed: Vec<bool>,
    pub skeletons_changed: Vec<bool>,
}

impl DirtyFlags {
    fn new(multi_buffer_count: usize) -> Self {
        Self {
            tile_infos_changed: vec![false; multi_buffer_count],
            models_changed: vec![false; multi_buffer_count],
            materials_changed: vec![false; multi_buffer_count],
            renderables_changed: vec![false; multi_buffer_count],
            lights_changed: vec![false; multi_buffer_count],
            skeletons_changed: vec![false; multi_buffer_count],
        }
    }

    fn mark_all(flags: &mut [bool]) {
        flags.iter_mut().for_each(|f| *f = true);
    }
}

/// A logical GPU resource the catalogue has finished with; the caller
/// forwards these into the deletion queue (C4) rather than destroying
/// anything immediately, so in-flight frames keep seeing valid bindings.
#[derive(Debug, Clone)]
pub enum DeletionRequest {
    MeshRange { mesh: AssetId },
    Blas { mesh: AssetId },
    DynamicMeshCopy { renderable: AssetId, mesh: AssetId },
    TextureSlot { texture: AssetId },
}

/// Everything a call to [`Catalogue::apply_update`] produced that the
/// upload queue / deletion queue / animation updater must now act on.
#[derive(Debug, Clone, Default)]
pub struct CatalogueChangeSet {
    /// Models whose meshes still need vertex/index upload.
    pub pending_model_uploads: Vec<AssetId>,
    /// Textures still needing image upload + bindless slot reservation.
    pub pending_texture_uploads: Vec<AssetId>,
    /// Renderables that now need a dynamic BLAS copy of their model's meshes.
    pub pending_dynamic_model_copies: Vec<AssetId>,
    pub deletions: Vec<DeletionRequest>,
    pub forwarded_animations_added: Vec<AssetId>,
    pub forwarded_animations_removed: Vec<AssetId>,
    pub forwarded_animators: Vec<Animator>,
}

/// CPU mirror of every scene asset kind, plus the bookkeeping the GPU
/// mirror buffers are regenerated from.
pub struct Catalogue {
    multi_buffer_count: usize,

    models: HashMap<AssetId, Model>,
    meshes: HashMap<AssetId, Mesh>,
    materials: HashMap<AssetId, Material>,
    textures: HashMap<AssetId, Texture>,
    skeletons: HashMap<AssetId, Skeleton>,
    animations: HashMap<AssetId, Animation>,
    renderables: HashMap<AssetId, Renderable>,
    renderable_gpu: HashMap<AssetId, RenderableGpuState>,
    lights: HashMap<AssetId, Light>,
    tile_infos: HashMap<TileIndex, TileInfo>,

    texture_slots: SlotAllocator,
    skeleton_slots: SlotAllocator,

    /// FCFS-assigned shadow-caster slots, `None` where empty.
    shadow_caster_slots: [Option<AssetId>; SHADOW_CASTER_SLOTS],

    dirty: DirtyFlags,
}

impl Catalogue {
    pub fn new(multi_buffer_count: usize) -> Self {
        Self {
            multi_buffer_count,
            models: HashMap::new(),
            meshes: HashMap::new(),
            materials: HashMap::new(),
            textures: HashMap::new(),
            skeletons: HashMap::new(),
            animations: HashMap::new(),
            renderables: HashMap::new(),
            renderable_gpu: HashMap::new(),
            lights: HashMap::new(),
            tile_infos: HashMap::new(),
            texture_slots: SlotAllocator::new(),
            skeleton_slots: SlotAllocator::new(),
            shadow_caster_slots: [None; SHADOW_CASTER_SLOTS],
            dirty: DirtyFlags::new(multi_buffer_count.max(1)),
        }
    }

    pub fn model(&self, id: AssetId) -> Option<&Model> {
        self.models.get(&id)
    }

    pub fn mesh(&self, id: AssetId) -> Option<&Mesh> {
        self.meshes.get(&id)
    }

    pub fn material(&self, id: AssetId) -> Option<&Material> {
        self.materials.get(&id)
    }

    pub fn texture(&self, id: AssetId) -> Option<&Texture> {
        self.textures.get(&id)
    }

    pub fn renderable(&self, id: AssetId) -> Option<&Renderable> {
        self.renderables.get(&id)
    }

    pub fn renderables(&self) -> impl Iterator<Item = &Renderable> {
        self.renderables.values()
    }

    /// All resident meshes, ordered by id so the GPU-mirror's dense
    /// `mesh_info` array has a stable index from one re-emission to the next.
    pub fn meshes(&self) -> impl Iterator<Item = &Mesh> {
        let mut ids: Vec<&AssetId> = self.meshes.keys().collect();
        ids.sort_unstable();
        ids.into_iter().map(move |id| &self.meshes[id])
    }

    /// All materials, ordered by id; see [`Catalogue::meshes`].
    pub fn materials(&self) -> impl Iterator<Item = &Material> {
        let mut ids: Vec<&AssetId> = self.materials.keys().collect();
        ids.sort_unstable();
        ids.into_iter().map(move |id| &self.materials[id])
    }

    pub fn lights(&self) -> impl Iterator<Item = &Light> {
        self.lights.values()
    }

    /// All models, ordered by id; see [`Catalogue::meshes`].
    pub fn models(&self) -> impl Iterator<Item = &Model> {
        let mut ids: Vec<&AssetId> = self.models.keys().collect();
        ids.sort_unstable();
        ids.into_iter().map(move |id| &self.models[id])
    }

    /// All textures, ordered by id; see [`Catalogue::meshes`].
    pub fn textures(&self) -> impl Iterator<Item = &Texture> {
        let mut ids: Vec<&AssetId> = self.textures.keys().collect();
        ids.sort_unstable();
        ids.into_iter().map(move |id| &self.textures[id])
    }

    pub fn tile_info(&self, index: TileIndex) -> Option<&TileInfo> {
        self.tile_infos.get(&index)
    }

    pub fn tile_infos(&self) -> impl Iterator<Item = &TileInfo> {
        self.tile_infos.values()
    }

    pub fn dirty(&self) -> &DirtyFlags {
        &self.dirty
    }

    /// Clear a frame slot's dirty flags after its re-emission has run.
    pub fn clear_frame_dirty(&mut self, frame: usize) {
        self.dirty.tile_infos_changed[frame] = false;
        self.dirty.models_changed[frame] = false;
        self.dirty.materials_changed[frame] = false;
        self.dirty.renderables_changed[frame] = false;
        self.dirty.lights_changed[frame] = false;
        self.dirty.skeletons_changed[frame] = false;
    }

    /// Record that the upload queue finished copying a mesh's vertex/index
    /// ranges into the giga-buffers.
    pub fn record_mesh_uploaded(&mut self, mesh: AssetId, state: MeshGpuState) {
        if let Some(m) = self.meshes.get_mut(&mesh) {
            m.gpu = Some(state);
        }
        DirtyFlags::mark_all(&mut self.dirty.models_changed);
    }

    pub fn record_blas_built(&mut self, mesh: AssetId, device_address: u64) {
        if let Some(m) = self.meshes.get_mut(&mesh) {
            if let Some(gpu) = &mut m.gpu {
                gpu.blas_device_address = device_address;
            }
        }
    }

    /// Reserve the next free bindless texture slot. The upload queue calls
    /// this right before it writes the descriptor, then reports the result
    /// back via [`Catalogue::record_texture_uploaded`].
    pub fn allocate_texture_slot(&mut self) -> u32 {
        self.texture_slots.alloc()
    }

    /// Record that the upload queue reserved a bindless slot for a texture.
    pub fn record_texture_uploaded(&mut self, texture: AssetId, slot: u32) {
        if let Some(t) = self.textures.get_mut(&texture) {
            t.bindless_slot = Some(slot);
        }
        DirtyFlags::mark_all(&mut self.dirty.materials_changed);
    }

    /// Whether every mesh of `model` and every texture referenced by
    /// `materials` is resident (invariant 1 / "prerequisites resident").
    pub fn renderable_prerequisites_resident(&self, renderable: &Renderable) -> bool {
        let Some(model) = self.models.get(&renderable.model) else { return false };
        let meshes_ready = model.mesh_ids.iter().all(|m| {
            self.meshes.get(m).map(|mesh| mesh.is_resident()).unwrap_or(false)
        });
        let materials_ready = renderable.materials.iter().all(|mat_id| {
            match self.materials.get(mat_id) {
                Some(mat) => mat.referenced_textures().all(|t| {
                    self.textures.get(&t).map(|tex| tex.is_resident()).unwrap_or(false)
                }),
                None => false,
            }
        });
        meshes_ready && materials_ready
    }

    /// Apply one transactional batch. See module docs for processing order.
    pub fn apply_update(&mut self, update: AssetUpdate) -> CatalogueChangeSet {
        let mut out = CatalogueChangeSet::default();

        // 1. Tile infos (add/update then remove), mark dirty.
        for tile in update.added_tile_infos.into_iter().chain(update.updated_tile_infos) {
            self.tile_infos.insert(tile.index, tile);
        }
        for index in update.removed_tile_infos {
            self.tile_infos.remove(&index);
        }
        DirtyFlags::mark_all(&mut self.dirty.tile_infos_changed);

        // 2. Removed models: release meshes, cascade-remove dependent
        //    renderables, enqueue deletions.
        for model_id in update.removed_models {
            if let Some(model) = self.models.remove(&model_id) {
                for mesh_id in &model.mesh_ids {
                    if self.meshes.remove(mesh_id).is_some() {
                        out.deletions.push(DeletionRequest::MeshRange { mesh: *mesh_id });
                        out.deletions.push(DeletionRequest::Blas { mesh: *mesh_id });
                    }
                }
                let dependents: Vec<AssetId> = self
                    .renderables
                    .values()
                    .filter(|r| r.model == model_id)
                    .map(|r| r.id)
                    .collect();
                for dep in dependents {
                    self.remove_renderable(dep, &mut out);
                }
            }
        }

        // 4. Added models enqueue for upload.
        for (model, mesh_bounds) in update.added_models {
            let model_id = model.id;
            for (mesh_id, (aabb_min, aabb_max)) in model.mesh_ids.iter().zip(mesh_bounds) {
                self.meshes.insert(*mesh_id, Mesh::new(*mesh_id, aabb_min, aabb_max));
            }
            self.models.insert(model_id, model);
            out.pending_model_uploads.push(model_id);
        }
        if !out.pending_model_uploads.is_empty() || !out.deletions.is_empty() {
            DirtyFlags::mark_all(&mut self.dirty.models_changed);
        }

        // 5. Removed textures.
        for tex_id in update.removed_textures {
            if let Some(tex) = self.textures.remove(&tex_id) {
                if let Some(slot) = tex.bindless_slot {
                    self.texture_slots.free(slot);
                }
                out.deletions.push(DeletionRequest::TextureSlot { texture: tex_id });
            }
        }

        // 6. Added textures enqueue for upload.
        for tex in update.added_textures {
            let id = tex.id;
            self.textures.insert(id, tex);
            out.pending_texture_uploads.push(id);
        }

        // 7. Materials: remove / add / update, mark dirty.
        for mat_id in update.removed_materials {
            self.materials.remove(&mat_id);
        }
        for mat in update.added_materials.into_iter().chain(update.updated_materials) {
            self.materials.insert(mat.id, mat);
        }
        DirtyFlags::mark_all(&mut self.dirty.materials_changed);

        // 8. Animations, forwarded to the external animation updater.
        for anim in update.added_animations {
            let id = anim.id;
            self.animations.insert(id, anim);
            out.forwarded_animations_added.push(id);
        }
        for id in update.removed_animations {
            self.animations.remove(&id);
            out.forwarded_animations_removed.push(id);
        }
        out.forwarded_animators = update.updated_animators;

        // 9. Skeletons: allocate/free a joint-matrix offset.
        for id in update.removed_skeletons {
            if let Some(sk) = self.skeletons.remove(&id) {
                if let Some(offset) = sk.offset {
                    self.skeleton_slots.free(offset);
                }
            }
        }
        for mut sk in update.added_skeletons {
            let size = sk.joint_count();
            sk.offset = Some(self.allocate_skeleton_range(size));
            self.skeletons.insert(sk.id, sk);
        }
        DirtyFlags::mark_all(&mut self.dirty.skeletons_changed);

        // 10. Renderables: remove first (enqueues dynamic copies for
        //     deletion), then add.
        for id in update.removed_renderables {
            self.remove_renderable(id, &mut out);
        }
        for renderable in update.added_renderables.into_iter().chain(update.updated_renderables) {
            self.add_or_update_renderable(renderable, &mut out);
        }
        DirtyFlags::mark_all(&mut self.dirty.renderables_changed);

        // 12. Lights: maintain the fixed-size shadow-caster array FCFS.
        for id in update.removed_lights {
            self.remove_light(id);
        }
        for mut light in update.added_lights.into_iter().chain(update.updated_lights) {
            light.recompute_shadow();
            self.upsert_light(light);
        }
        DirtyFlags::mark_all(&mut self.dirty.lights_changed);

        out
    }

    fn remove_renderable(&mut self, id: AssetId, out: &mut CatalogueChangeSet) {
        if let Some(renderable) = self.renderables.remove(&id) {
            if let Some(gpu) = self.renderable_gpu.remove(&id) {
                if gpu.dynamic_model_offset.is_some() {
                    if let Some(model) = self.models.get(&renderable.model) {
                        for mesh_id in &model.mesh_ids {
                            out.deletions.push(DeletionRequest::DynamicMeshCopy { renderable: id, mesh: *mesh_id });
                        }
                    }
                }
            }
            DirtyFlags::mark_all(&mut self.dirty.models_changed);
        }
    }

    fn add_or_update_renderable(&mut self, renderable: Renderable, out: &mut CatalogueChangeSet) {
        let id = renderable.id;
        let needs_dynamic_copy = renderable.is_skinned()
            && !self.renderable_gpu.get(&id).map(|g| g.dynamic_model_offset.is_some()).unwrap_or(false);
        self.renderables.insert(id, renderable);
        self.renderable_gpu.entry(id).or_default();
        if needs_dynamic_copy {
            out.pending_dynamic_model_copies.push(id);
        }
    }

    fn remove_light(&mut self, id: AssetId) {
        self.lights.remove(&id);
        for slot in &mut self.shadow_caster_slots {
            if *slot == Some(id) {
                *slot = None;
            }
        }
    }

    fn upsert_light(&mut self, mut light: Light) {
        let id = light.id;
        let wants_slot = light.shadow_caster;
        let already_has_slot = self.shadow_caster_slots.iter().any(|s| *s == Some(id));
        light.recompute_shadow();
        self.lights.insert(id, light);

        if wants_slot && !already_has_slot {
            if let Some(empty) = self.shadow_caster_slots.iter_mut().find(|s| s.is_none()) {
                *empty = Some(id);
            }
        } else if !wants_slot && already_has_slot {
            for slot in &mut self.shadow_caster_slots {
                if *slot == Some(id) {
                    *slot = None;
                }
            }
        }
    }

    pub fn shadow_caster_slot_of(&self, light: AssetId) -> Option<usize> {
        self.shadow_caster_slots.iter().position(|s| *s == Some(light))
    }

    fn allocate_skeleton_range(&mut self, size: u32) -> u32 {
        // The slot allocator hands out unit indices; a skeleton needs a
        // contiguous run of `size` joints, so reserve `size` consecutive
        // units starting at the allocator's current high-water mark. This
        // never reuses a mid-range hole, trading some fragmentation for
        // simplicity (documented design choice, not a spec requirement).
        let start = self.skeleton_slots.high_water_mark();
        for _ in 0..size.max(1) {
            self.skeleton_slots.alloc();
        }
        start
    }

    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn renderable_count(&self) -> usize {
        self.renderables.len()
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn id() -> AssetId {
        AssetId::generate()
    }

    #[test]
    fn empty_update_is_a_no_op() {
        let mut cat = Catalogue::new(2);
        let before = cat.model_count();
        cat.apply_update(AssetUpdate::default());
        assert_eq!(cat.model_count(), before);
    }

    #[test]
    fn adding_a_model_enqueues_its_upload_and_registers_meshes() {
        let mut cat = Catalogue::new(2);
        let mesh_id = id();
        let model_id = id();
        let model = Model::new(model_id, "cube", vec![mesh_id]);
        let mut update = AssetUpdate::default();
        update.added_models.push((model, vec![(Vec3::splat(-1.0), Vec3::splat(1.0))]));

        let changes = cat.apply_update(update);

        assert_eq!(changes.pending_model_uploads, vec![model_id]);
        assert!(cat.mesh(mesh_id).is_some());
        assert!(!cat.mesh(mesh_id).unwrap().is_resident());
    }

    #[test]
    fn removing_a_model_cascades_to_dependent_renderables() {
        let mut cat = Catalogue::new(2);
        let mesh_id = id();
        let model_id = id();
        let renderable_id = id();

        let mut add = AssetUpdate::default();
        add.added_models.push((Model::new(model_id, "m", vec![mesh_id]), vec![(Vec3::ZERO, Vec3::ONE)]));
        add.added_renderables.push(Renderable::new(renderable_id, "r", model_id, vec![]));
        cat.apply_update(add);
        assert!(cat.renderable(renderable_id).is_some());

        let mut remove = AssetUpdate::default();
        remove.removed_models.push(model_id);
        cat.apply_update(remove);

        assert!(cat.renderable(renderable_id).is_none());
        assert!(cat.mesh(mesh_id).is_none());
        assert!(cat.model(model_id).is_none());
    }

    #[test]
    fn prerequisites_resident_requires_mesh_and_texture_upload_to_complete() {
        let mut cat = Catalogue::new(2);
        let mesh_id = id();
        let model_id = id();
        let tex_id = id();
        let mat_id = id();
        let renderable_id = id();

        let mut material = Material::new(mat_id);
        material.albedo_tex = Some(tex_id);

        let mut update = AssetUpdate::default();
        update.added_models.push((Model::new(model_id, "m", vec![mesh_id]), vec![(Vec3::ZERO, Vec3::ONE)]));
        update.added_textures.push(Texture::new(tex_id, TextureFormat::RGBA8_UNORM, 4, 4, vec![vec![0; 64]], true));
        update.added_materials.push(material);
        update.added_renderables.push(Renderable::new(renderable_id, "r", model_id, vec![mat_id]));
        cat.apply_update(update);

        let renderable = cat.renderable(renderable_id).unwrap().clone();
        assert!(!cat.renderable_prerequisites_resident(&renderable));

        cat.record_mesh_uploaded(mesh_id, MeshGpuState {
            vertex_offset: 0,
            index_offset: 0,
            vertex_count: 36,
            index_count: 36,
            blas_device_address: 0,
        });
        assert!(!cat.renderable_prerequisites_resident(&renderable));

        cat.record_texture_uploaded(tex_id, 0);
        assert!(cat.renderable_prerequisites_resident(&renderable));
    }

    #[test]
    fn shadow_caster_slots_are_assigned_first_come_first_served_and_freed_on_removal() {
        let mut cat = Catalogue::new(2);
        let ids: Vec<AssetId> = (0..SHADOW_CASTER_SLOTS + 1).map(|_| id()).collect();

        let mut update = AssetUpdate::default();
        for light_id in &ids {
            let mut light = Light::new(*light_id, "l", Vec3::ZERO, Vec3::ONE, 10.0);
            light.shadow_caster = true;
            update.added_lights.push(light);
        }
        cat.apply_update(update);

        for light_id in &ids[..SHADOW_CASTER_SLOTS] {
            assert!(cat.shadow_caster_slot_of(*light_id).is_some());
        }
        assert!(cat.shadow_caster_slot_of(ids[SHADOW_CASTER_SLOTS]).is_none());

        let mut remove = AssetUpdate::default();
        remove.removed_lights.push(ids[0]);
        cat.apply_update(remove);
        assert!(cat.shadow_caster_slot_of(ids[0]).is_none());
    }
}
