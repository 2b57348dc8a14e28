//! GPU-mirror writer: rewrites the catalogue's dense CPU arrays into their
//! GPU-side counterparts through the staging ring, one buffer per asset kind
//! (§4.6 "per-frame re-emission"). Only runs for a frame slot whose dirty
//! flag is set, and only emits renderables/materials whose referenced
//! assets have finished uploading ("prerequisites resident").

use ash::vk;
use std::sync::Arc;

use driftlight_core::catalogue::Catalogue;
use driftlight_core::gpu_records::{
    GpuMaterialInfo, GpuMeshInfo, GpuPointLightShadowCube, GpuRenderable,
};
use driftlight_core::ids::TileIndex;

use crate::buffer::Buffer;
use crate::context::GpuContext;
use crate::error::Result;
use crate::staging_ring::StagingRing;

/// One GPU-mirror target buffer plus the copy-then-barrier step that moves
/// freshly staged bytes into it.
pub struct MirrorBuffer {
    buffer: Buffer,
}

impl MirrorBuffer {
    pub fn new(ctx: Arc<GpuContext>, capacity: u64, label: &str) -> Result<Self> {
        let buffer = Buffer::new(ctx, capacity, vk::BufferUsageFlags::STORAGE_BUFFER, gpu_allocator::MemoryLocation::GpuOnly, label)?;
        Ok(Self { buffer })
    }

    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    fn upload<T: bytemuck::Pod>(&self, staging: &mut StagingRing, ctx: &Arc<GpuContext>, cmd: vk::CommandBuffer, data: &[T]) -> Result<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.is_empty() {
            return Ok(());
        }
        let alloc = staging.write(bytes, false)?;
        let region = vk::BufferCopy::default().src_offset(alloc.offset).dst_offset(0).size(bytes.len() as u64);
        unsafe { ctx.device.cmd_copy_buffer(cmd, staging.handle(), self.buffer.handle(), &[region]) };
        barrier_transfer_to_shader_read(ctx, cmd);
        Ok(())
    }
}

fn barrier_transfer_to_shader_read(ctx: &Arc<GpuContext>, cmd: vk::CommandBuffer) {
    let barrier = vk::MemoryBarrier2::default()
        .src_stage_mask(vk::PipelineStageFlags2::TRANSFER)
        .src_access_mask(vk::AccessFlags2::TRANSFER_WRITE)
        .dst_stage_mask(vk::PipelineStageFlags2::VERTEX_SHADER | vk::PipelineStageFlags2::FRAGMENT_SHADER | vk::PipelineStageFlags2::COMPUTE_SHADER)
        .dst_access_mask(vk::AccessFlags2::SHADER_STORAGE_READ);
    let barriers = [barrier];
    let dep_info = vk::DependencyInfo::default().memory_barriers(&barriers);
    unsafe { ctx.device.cmd_pipeline_barrier2(cmd, &dep_info) };
}

pub struct GpuMirror {
    pub mesh_info: MirrorBuffer,
    pub model: MirrorBuffer,
    pub material: MirrorBuffer,
    pub renderable_material_index: MirrorBuffer,
    pub renderable: MirrorBuffer,
    pub light: MirrorBuffer,
    pub point_light_shadow: MirrorBuffer,
    pub skeleton: MirrorBuffer,
    pub tile_info: MirrorBuffer,
    page_radius: i32,
}

impl GpuMirror {
    pub fn new(ctx: Arc<GpuContext>, page_radius: i32) -> Result<Self> {
        const MB: u64 = 1024 * 1024;
        Ok(Self {
            mesh_info: MirrorBuffer::new(ctx.clone(), 16 * MB, "mesh-info")?,
            model: MirrorBuffer::new(ctx.clone(), 16 * MB, "model")?,
            material: MirrorBuffer::new(ctx.clone(), 8 * MB, "material")?,
            renderable_material_index: MirrorBuffer::new(ctx.clone(), 8 * MB, "renderable-material-index")?,
            renderable: MirrorBuffer::new(ctx.clone(), 32 * MB, "renderable")?,
            light: MirrorBuffer::new(ctx.clone(), 2 * MB, "light")?,
            point_light_shadow: MirrorBuffer::new(ctx.clone(), 1 * MB, "point-light-shadow")?,
            skeleton: MirrorBuffer::new(ctx.clone(), 16 * MB, "skeleton")?,
            tile_info: MirrorBuffer::new(ctx, 1 * MB, "tile-info")?,
            page_radius,
        })
    }

    /// Re-emit every GPU-mirror buffer for `frame`'s dirty flags. Renderable
    /// and material entries whose referenced textures/meshes haven't
    /// finished uploading are skipped for this pass and picked up once
    /// `Catalogue::renderable_prerequisites_resident` clears them.
    pub fn reemit(
        &mut self,
        catalogue: &mut Catalogue,
        frame: usize,
        camera_tile: TileIndex,
        ctx: &Arc<GpuContext>,
        staging: &mut StagingRing,
        cmd: vk::CommandBuffer,
    ) -> Result<()> {
        let dirty = catalogue.dirty().clone();

        if dirty.models_changed.get(frame).copied().unwrap_or(false) {
            let mesh_infos: Vec<GpuMeshInfo> = catalogue
                .meshes()
                .map(|mesh| {
                    let gpu = mesh.gpu.unwrap_or(driftlight_core::catalogue::MeshGpuState {
                        vertex_offset: 0,
                        index_offset: 0,
                        vertex_count: 0,
                        index_count: 0,
                        blas_device_address: 0,
                    });
                    GpuMeshInfo {
                        min_pos: [mesh.aabb_min.x, mesh.aabb_min.y, mesh.aabb_min.z, 0.0],
                        max_pos: [mesh.aabb_max.x, mesh.aabb_max.y, mesh.aabb_max.z, 0.0],
                        vertex_offset: gpu.vertex_offset,
                        index_offset: gpu.index_offset,
                        _pad: [0; 2],
                        blas_device_address: gpu.blas_device_address,
                    }
                })
                .collect();
            self.mesh_info.upload(staging, ctx, cmd, &mesh_infos)?;
        }

        if dirty.materials_changed.get(frame).copied().unwrap_or(false) {
            let materials: Vec<GpuMaterialInfo> = catalogue
                .materials()
                .map(|mat| {
                    let mut info = GpuMaterialInfo::new(mat.base_color_factor, mat.emissive);
                    let slot_of = |tex: Option<driftlight_core::ids::AssetId>| {
                        tex.and_then(|id| catalogue.texture(id)).and_then(|t| t.bindless_slot).map(|s| s as i32).unwrap_or(GpuMaterialInfo::ABSENT)
                    };
                    info.bindless_indices = [
                        slot_of(mat.albedo_tex),
                        slot_of(mat.normal_tex),
                        slot_of(mat.metallic_roughness_tex),
                        slot_of(mat.emissive_tex),
                    ];
                    info
                })
                .collect();
            self.material.upload(staging, ctx, cmd, &materials)?;
        }

        if dirty.renderables_changed.get(frame).copied().unwrap_or(false) {
            let renderables: Vec<GpuRenderable> = catalogue
                .renderables()
                .filter(|r| catalogue.renderable_prerequisites_resident(r))
                .map(|r| GpuRenderable::new(r.transform, r.bounding_sphere, r.tint))
                .collect();
            self.renderable.upload(staging, ctx, cmd, &renderables)?;
        }

        if dirty.lights_changed.get(frame).copied().unwrap_or(false) {
            let mut shadow_cubes = vec![GpuPointLightShadowCube::default(); driftlight_core::catalogue::SHADOW_CASTER_SLOTS];
            for light in catalogue.lights() {
                let (Some(slot), Some(shadow)) = (catalogue.shadow_caster_slot_of(light.id), &light.shadow) else { continue };
                let mut shadow_matrices = [[[0.0f32; 4]; 4]; 6];
                for face in 0..6 {
                    shadow_matrices[face] = (shadow.proj * shadow.views[face]).to_cols_array_2d();
                }
                shadow_cubes[slot] = GpuPointLightShadowCube { shadow_matrices };
            }
            self.point_light_shadow.upload(staging, ctx, cmd, &shadow_cubes)?;
        }

        if dirty.tile_infos_changed.get(frame).copied().unwrap_or(false) {
            self.reemit_tile_window(catalogue, camera_tile, staging, ctx, cmd)?;
        }

        catalogue.clear_frame_dirty(frame);
        Ok(())
    }

    /// Fixed-size `(2R+1)²` window of tile-info entries around the current
    /// camera tile; entries outside any known tile record `-1` for the DDGI
    /// atlas texture.
    fn reemit_tile_window(
        &mut self,
        catalogue: &Catalogue,
        camera_tile: TileIndex,
        staging: &mut StagingRing,
        ctx: &Arc<GpuContext>,
        cmd: vk::CommandBuffer,
    ) -> Result<()> {
        let mut entries: Vec<i32> = Vec::new();
        for dz in -self.page_radius..=self.page_radius {
            for dx in -self.page_radius..=self.page_radius {
                let index = TileIndex { x: camera_tile.x + dx, z: camera_tile.z + dz };
                let ddgi_slot = catalogue
                    .tile_info(index)
                    .and_then(|t| t.ddgi_atlas)
                    .map(|_| 0i32)
                    .unwrap_or(-1);
                entries.push(ddgi_slot);
            }
        }
        self.tile_info.upload(staging, ctx, cmd, &entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_window_size_matches_the_page_radius_formula() {
        let radius = 3;
        let side = 2 * radius + 1;
        assert_eq!(side * side, 49);
    }
}
