//! Deferred model/texture upload pipeline (C5). Uploads are driven from the
//! catalogue's `pending_model_uploads`/`pending_texture_uploads` queues
//! (populated by `Catalogue::apply_update`) and processed a fixed slice per
//! frame so a big asset batch never blows the frame budget. A model that
//! doesn't finish this frame remembers `current_mesh_index` and resumes
//! next frame instead of restarting.

use ash::vk;
use std::collections::VecDeque;
use std::sync::Arc;

use driftlight_core::catalogue::{Catalogue, MeshGpuState};
use driftlight_core::ids::AssetId;

use crate::context::GpuContext;
use crate::error::Error;
use crate::giga_buffer::GigaBuffer;
use crate::staging_ring::StagingRing;

/// Maximum BLAS builds issued by the model-upload path per frame; mirrors
/// the dynamic-BLAS-copy budget in the acceleration-structure manager so
/// neither subsystem dominates a frame on its own.
const MAX_MESH_UPLOADS_PER_FRAME: usize = 8;
const MAX_TEXTURE_UPLOADS_PER_FRAME: usize = 4;

struct InFlightModelUpload {
    model: AssetId,
    current_mesh_index: usize,
}

pub struct PendingTextureUpload {
    pub texture: AssetId,
}

pub struct UploadQueue {
    model_queue: VecDeque<InFlightModelUpload>,
    texture_queue: VecDeque<PendingTextureUpload>,
}

/// Vertex layout the giga-buffer's BLAS geometry description assumes:
/// tightly packed `RGB32F` positions, independent of any other per-vertex
/// attributes that may live in a separate storage buffer.
pub const VERTEX_POSITION_STRIDE: u64 = std::mem::size_of::<[f32; 3]>() as u64;
pub const INDEX_STRIDE: u64 = std::mem::size_of::<u32>() as u64;

impl UploadQueue {
    pub fn new() -> Self {
        Self { model_queue: VecDeque::new(), texture_queue: VecDeque::new() }
    }

    pub fn enqueue_models(&mut self, models: impl IntoIterator<Item = AssetId>) {
        self.model_queue.extend(models.into_iter().map(|model| InFlightModelUpload { model, current_mesh_index: 0 }));
    }

    pub fn enqueue_textures(&mut self, textures: impl IntoIterator<Item = AssetId>) {
        self.texture_queue.extend(textures.into_iter().map(|texture| PendingTextureUpload { texture }));
    }

    pub fn has_pending_work(&self) -> bool {
        !self.model_queue.is_empty() || !self.texture_queue.is_empty()
    }

    /// Copy mesh vertex/index ranges from the staging ring into the
    /// giga-buffers for as many pending meshes as fit this frame's budget.
    /// Returns the meshes that finished uploading (the acceleration-structure
    /// manager builds their static BLAS next).
    pub fn process_model_uploads(
        &mut self,
        catalogue: &mut Catalogue,
        staging: &mut StagingRing,
        vertex_giga: &mut GigaBuffer,
        index_giga: &mut GigaBuffer,
        cmd: vk::CommandBuffer,
        ctx: &Arc<GpuContext>,
        vertex_data_by_mesh: impl Fn(AssetId) -> Option<(Vec<u8>, Vec<u8>)>,
    ) -> Vec<AssetId> {
        let mut uploaded = Vec::new();
        let mut budget = MAX_MESH_UPLOADS_PER_FRAME;

        while budget > 0 {
            let Some(mut in_flight) = self.model_queue.pop_front() else { break };
            let Some(model) = catalogue.model(in_flight.model).cloned() else { continue };

            while budget > 0 && in_flight.current_mesh_index < model.mesh_ids.len() {
                let mesh_id = model.mesh_ids[in_flight.current_mesh_index];
                let Some((vertex_bytes, index_bytes)) = vertex_data_by_mesh(mesh_id) else {
                    in_flight.current_mesh_index += 1;
                    continue;
                };

                let Some(vertex_alloc) = stage_and_copy(
                    staging, vertex_giga, cmd, ctx, &vertex_bytes, vk::BufferUsageFlags::VERTEX_BUFFER,
                ) else {
                    // Out of staging-ring or giga-buffer room this frame —
                    // resume at the same mesh index next frame.
                    self.model_queue.push_front(in_flight);
                    return uploaded;
                };
                let Some(index_alloc) = stage_and_copy(
                    staging, index_giga, cmd, ctx, &index_bytes, vk::BufferUsageFlags::INDEX_BUFFER,
                ) else {
                    self.model_queue.push_front(in_flight);
                    return uploaded;
                };

                let vertex_count = (vertex_bytes.len() as u64 / VERTEX_POSITION_STRIDE) as u32;
                let index_count = (index_bytes.len() as u64 / INDEX_STRIDE) as u32;

                catalogue.record_mesh_uploaded(mesh_id, MeshGpuState {
                    vertex_offset: (vertex_alloc.offset / VERTEX_POSITION_STRIDE) as u32,
                    index_offset: (index_alloc.offset / INDEX_STRIDE) as u32,
                    vertex_count,
                    index_count,
                    blas_device_address: 0,
                });

                uploaded.push(mesh_id);
                in_flight.current_mesh_index += 1;
                budget -= 1;
            }

            if in_flight.current_mesh_index < model.mesh_ids.len() {
                self.model_queue.push_front(in_flight);
            }
        }

        uploaded
    }

    /// Process up to a fixed number of pending texture uploads. The caller
    /// (orchestrator) provides the raw mip bytes and is responsible for
    /// actually creating the `vk::Image`/view/sampler and writing the
    /// bindless descriptor, since that needs pipeline-wide state (the
    /// `BindlessLayout`) this module deliberately doesn't hold.
    pub fn drain_texture_uploads(&mut self) -> Vec<PendingTextureUpload> {
        let n = MAX_TEXTURE_UPLOADS_PER_FRAME.min(self.texture_queue.len());
        self.texture_queue.drain(..n).collect()
    }
}

impl Default for UploadQueue {
    fn default() -> Self {
        Self::new()
    }
}

fn stage_and_copy(
    staging: &mut StagingRing,
    giga: &mut GigaBuffer,
    cmd: vk::CommandBuffer,
    ctx: &Arc<GpuContext>,
    data: &[u8],
    _usage_hint: vk::BufferUsageFlags,
) -> Option<driftlight_core::utils::Allocation> {
    if !staging.can_fit(data.len() as u64, false) {
        return None;
    }
    let giga_alloc = giga.reserve(data.len() as u64).ok()?;
    let staging_alloc = staging.write(data, false).ok()?;

    let region = vk::BufferCopy::default().src_offset(staging_alloc.offset).dst_offset(giga_alloc.offset).size(data.len() as u64);
    unsafe { ctx.device.cmd_copy_buffer(cmd, staging.handle(), giga.handle(), &[region]) };

    Some(giga_alloc)
}

/// Error used by the pieces of the upload path that can legitimately fail
/// (an out-of-range mip request, a missing mesh byte source) without it
/// being a fatal device condition.
pub fn missing_mesh_data(mesh: AssetId) -> Error {
    Error::Core(driftlight_core::Error::UnknownId(mesh.to_string()))
}
