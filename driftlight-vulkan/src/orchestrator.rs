//! The Orchestrator (C13): the one type a host application drives. Owns
//! every subsystem built in this crate and the per-frame synchronization
//! primitives, and exposes the public surface described in §4.13 —
//! `init`, `asset_update`, `update`, `prepare`, `draw_frame`,
//! `request_world_position`, `start_bake`/`stop_bake`.

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::path::PathBuf;
use std::sync::Arc;

use driftlight_core::camera::Camera;
use driftlight_core::catalogue::{AssetUpdate, Catalogue};
use driftlight_core::gpu_records::{GpuCullPushConstants, GpuSceneData, RenderOptions, MAX_SPOT_SHADOW_MATRICES};
use driftlight_core::ids::{AssetId, TileIndex};
use driftlight_core::pager::Pager;
use driftlight_core::session_config::SessionConfig;
use driftlight_core::{engine_error, engine_info, engine_warn};

use crate::accel_structure::AccelStructureManager;
use crate::bindless::{BindlessLayout, BINDLESS_SET_INDEX};
use crate::buffer::Buffer;
use crate::context::GpuContext;
use crate::ddgi::DdgiAtlas;
use crate::deletion_queue::{DeletionEntry, DeletionQueue};
use crate::error::{Error, Result};
use crate::frame_graph::{FrameGraph, PipelineParams, ScheduledPass};
use crate::giga_buffer::GigaBuffer;
use crate::gpu_mirror::GpuMirror;
use crate::passes;
use crate::pipeline::PipelineCache;
use crate::resources::TransientResourcePool;
use crate::staging_ring::StagingRing;
use crate::swapchain::Swapchain;
use crate::upload_queue::UploadQueue;

/// Frames in flight (§5).
pub const FRAMES_IN_FLIGHT: usize = 2;

/// Default `(2*radius+1)` tile window and probe-atlas dimensions, matching
/// the defaults named in the size budget.
const DEFAULT_PAGE_RADIUS: i32 = 3;
const DEFAULT_PROBE_PIXEL: u32 = 8;
const DEFAULT_PROBES_XZ: u32 = 16;
const DEFAULT_TLAS_INSTANCE_CAPACITY: u32 = 4096;

struct FrameSync {
    image_available: vk::Semaphore,
    render_finished: vk::Semaphore,
    in_flight: vk::Fence,
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
}

struct PendingWorldPositionRequest {
    pixel: (u32, u32),
    frozen_camera: Camera,
    readback: Buffer,
}

pub struct Orchestrator {
    ctx: Arc<GpuContext>,
    swapchain: Swapchain,

    catalogue: Catalogue,
    pager: Pager,
    upload_queue: UploadQueue,
    deletion_queue: DeletionQueue,
    accel_structures: AccelStructureManager,
    bindless: BindlessLayout,
    gpu_mirror: GpuMirror,
    frame_graph: FrameGraph,
    pipelines: PipelineCache,
    resource_pool: TransientResourcePool,

    vertex_giga: GigaBuffer,
    index_giga: GigaBuffer,

    scene_data: Vec<Buffer>,
    staging_rings: Vec<StagingRing>,
    frame_sync: Vec<FrameSync>,
    current_frame: usize,
    current_camera_tile: TileIndex,

    ddgi: Option<DdgiAtlas>,
    pending_world_position: Option<PendingWorldPositionRequest>,

    session_config: SessionConfig,
    session_config_path: PathBuf,

    culling_camera: Option<Camera>,
    resize_pending: Option<(u32, u32)>,
}

impl Orchestrator {
    /// Create the instance/device (via [`GpuContext::init`]), the swapchain,
    /// and every subsystem this runtime needs, then load the last session's
    /// config.
    pub fn init(
        window: &dyn raw_window_handle::HasWindowHandle,
        display: &dyn raw_window_handle::HasDisplayHandle,
        initial_extent: (u32, u32),
        session_config_path: PathBuf,
        shader_dir: PathBuf,
    ) -> Result<Self> {
        let ctx = Arc::new(GpuContext::init(window, display)?);

        let surface_loader = ash::khr::surface::Instance::new(ctx.entry(), &ctx.instance);
        let surface = unsafe {
            ash_window::create_surface(
                ctx.entry(),
                &ctx.instance,
                display.display_handle().map_err(|e| Error::DeviceLost(e.to_string()))?.as_raw(),
                window.window_handle().map_err(|e| Error::DeviceLost(e.to_string()))?.as_raw(),
                None,
            )
            .map_err(Error::Vulkan)?
        };
        drop(surface_loader);

        let swapchain = Swapchain::new(
            ctx.clone(),
            ctx.entry(),
            &ctx.instance,
            surface,
            vk::Extent2D { width: initial_extent.0, height: initial_extent.1 },
        )?;

        let session_config = SessionConfig::load(&session_config_path);
        let catalogue = match &session_config.scene_path {
            Some(scene_path) => match driftlight_core::scene_file::load_scene(scene_path, FRAMES_IN_FLIGHT) {
                Ok(catalogue) => catalogue,
                Err(e) => {
                    engine_warn!("driftlight::orchestrator", "failed to load scene {}: {e}, starting empty", scene_path.display());
                    Catalogue::new(FRAMES_IN_FLIGHT)
                }
            },
            None => Catalogue::new(FRAMES_IN_FLIGHT),
        };
        let pager = Pager::new(DEFAULT_PAGE_RADIUS);
        let upload_queue = UploadQueue::new();

        let accel_loader = ash::khr::acceleration_structure::Device::new(&ctx.instance, &ctx.device);
        let deletion_queue = DeletionQueue::new(ctx.clone(), FRAMES_IN_FLIGHT as u64, accel_loader);
        let accel_structures = AccelStructureManager::new(ctx.clone(), DEFAULT_TLAS_INSTANCE_CAPACITY);

        let bindless = BindlessLayout::new(ctx.clone(), FRAMES_IN_FLIGHT as u32)?;
        let gpu_mirror = GpuMirror::new(ctx.clone(), DEFAULT_PAGE_RADIUS)?;

        let mut frame_graph = FrameGraph::new();
        passes::register_default_graph(&mut frame_graph);

        let pipelines = PipelineCache::new(ctx.clone(), &bindless, shader_dir)?;
        let mut resource_pool = TransientResourcePool::new(ctx.clone());
        resource_pool.rebuild(&pooled_resource_types(&frame_graph), swapchain.extent)?;

        let vertex_giga = GigaBuffer::new(ctx.clone(), crate::giga_buffer::DEFAULT_GIGA_BUFFER_SIZE, vk::BufferUsageFlags::VERTEX_BUFFER, "giga-vertex")?;
        let index_giga = GigaBuffer::new(ctx.clone(), crate::giga_buffer::DEFAULT_GIGA_BUFFER_SIZE, vk::BufferUsageFlags::INDEX_BUFFER, "giga-index")?;

        let scene_data = (0..FRAMES_IN_FLIGHT)
            .map(|i| {
                Buffer::new(
                    ctx.clone(),
                    std::mem::size_of::<GpuSceneData>() as u64,
                    vk::BufferUsageFlags::UNIFORM_BUFFER,
                    gpu_allocator::MemoryLocation::CpuToGpu,
                    &format!("scene-data-{i}"),
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let staging_rings = (0..FRAMES_IN_FLIGHT)
            .map(|_| StagingRing::new(ctx.clone(), crate::staging_ring::DEFAULT_STAGING_RING_SIZE))
            .collect::<Result<Vec<_>>>()?;

        let frame_sync = (0..FRAMES_IN_FLIGHT).map(|_| Self::create_frame_sync(&ctx)).collect::<Result<Vec<_>>>()?;

        engine_info!("driftlight::orchestrator", "initialized with {FRAMES_IN_FLIGHT} frames in flight, raytracing={}", ctx.raytracing_supported);

        Ok(Self {
            ctx,
            swapchain,
            catalogue,
            pager,
            upload_queue,
            deletion_queue,
            accel_structures,
            bindless,
            gpu_mirror,
            frame_graph,
            pipelines,
            resource_pool,
            vertex_giga,
            index_giga,
            scene_data,
            staging_rings,
            frame_sync,
            current_frame: 0,
            current_camera_tile: TileIndex::new(0, 0),
            ddgi: None,
            pending_world_position: None,
            session_config,
            session_config_path,
            culling_camera: None,
            resize_pending: None,
        })
    }

    fn create_frame_sync(ctx: &Arc<GpuContext>) -> Result<FrameSync> {
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        let image_available = unsafe { ctx.device.create_semaphore(&semaphore_info, None).map_err(Error::Vulkan)? };
        let render_finished = unsafe { ctx.device.create_semaphore(&semaphore_info, None).map_err(Error::Vulkan)? };

        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);
        let in_flight = unsafe { ctx.device.create_fence(&fence_info, None).map_err(Error::Vulkan)? };

        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(ctx.queue_families.graphics)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = unsafe { ctx.device.create_command_pool(&pool_info, None).map_err(Error::Vulkan)? };

        let alloc_info = vk::CommandBufferAllocateInfo::default().command_pool(command_pool).level(vk::CommandBufferLevel::PRIMARY).command_buffer_count(1);
        let command_buffer = unsafe { ctx.device.allocate_command_buffers(&alloc_info).map_err(Error::Vulkan)? }[0];

        Ok(FrameSync { image_available, render_finished, in_flight, command_pool, command_buffer })
    }

    /// Notify the orchestrator the window was resized; the swapchain is
    /// actually rebuilt at the top of the next `draw_frame`.
    pub fn notify_resized(&mut self, width: u32, height: u32) {
        self.resize_pending = Some((width, height));
    }

    /// Apply one transactional asset batch (§4.6) and forward the resulting
    /// change set to the upload queue / deletion queue / acceleration
    /// structures.
    pub fn asset_update(&mut self, update: AssetUpdate) {
        let changes = self.catalogue.apply_update(update);

        self.upload_queue.enqueue_models(changes.pending_model_uploads);
        self.upload_queue.enqueue_textures(changes.pending_texture_uploads);
        for renderable in changes.pending_dynamic_model_copies {
            self.accel_structures.queue_dynamic_blas_build(renderable);
        }

        for deletion in changes.deletions {
            self.apply_deletion_request(deletion);
        }
    }

    fn apply_deletion_request(&mut self, deletion: driftlight_core::catalogue::DeletionRequest) {
        use driftlight_core::catalogue::DeletionRequest;
        let current_frame = self.current_frame as u64;
        match deletion {
            DeletionRequest::Blas { mesh } => self.accel_structures.destroy_mesh_blas(mesh, &mut self.deletion_queue, current_frame),
            DeletionRequest::MeshRange { mesh } => {
                // The giga-buffer ranges are released once the mesh's
                // `MeshGpuState` is known; a mesh removed before it ever
                // uploaded has nothing to release.
                engine_info!("driftlight::orchestrator", "mesh {mesh} removed, giga-buffer range release deferred to next upload cycle");
            }
            DeletionRequest::DynamicMeshCopy { renderable, mesh } => {
                self.accel_structures.destroy_mesh_blas(mesh, &mut self.deletion_queue, current_frame);
                engine_info!("driftlight::orchestrator", "dynamic mesh copy for renderable {renderable} / mesh {mesh} torn down");
            }
            DeletionRequest::TextureSlot { texture } => {
                engine_info!("driftlight::orchestrator", "texture {texture} slot released");
            }
        }
    }

    /// Update per-frame camera/lighting/feature state. Must be called before
    /// `draw_frame` every frame (§4.13).
    pub fn update(
        &mut self,
        camera: &Camera,
        shadow_camera: Option<&Camera>,
        light_dir: glam::Vec3,
        delta: f32,
        time: f32,
        lock_culling: bool,
        render_options: RenderOptions,
        camera_world_position: glam::Vec3,
    ) -> Result<()> {
        let fence = self.frame_sync[self.current_frame].in_flight;
        unsafe { self.ctx.device.wait_for_fences(&[fence], true, u64::MAX).map_err(Error::Vulkan)? };

        if !lock_culling || self.culling_camera.is_none() {
            self.culling_camera = Some(camera.clone());
        }

        if let Some(restore_position) = self.ddgi.as_mut().and_then(|d| d.poll_stop_bake()) {
            engine_info!("driftlight::orchestrator", "ddgi bake finished, camera restored to {restore_position:?}");
        }

        self.current_camera_tile = TileIndex::from_world_xz(camera_world_position.x, camera_world_position.z);
        let paging_diff = self.pager.step(camera_world_position.x, camera_world_position.z);
        if !paging_diff.is_empty() {
            engine_info!(
                "driftlight::orchestrator",
                "paging: {} tiles in, {} tiles out",
                paging_diff.newly_paged_in.len(),
                paging_diff.newly_paged_out.len()
            );
        }

        let view = camera.view_matrix().to_cols_array_2d();
        let proj = camera.projection_matrix().to_cols_array_2d();
        let inv_view = camera.view_matrix().inverse().to_cols_array_2d();
        let inv_proj = camera.projection_matrix().inverse().to_cols_array_2d();
        let inv_view_proj = camera.view_projection_matrix().inverse().to_cols_array_2d();
        let shadow_proj = shadow_camera.map(|c| c.projection_matrix().to_cols_array_2d()).unwrap_or(proj);
        let shadow_view = shadow_camera.map(|c| c.view_matrix().to_cols_array_2d()).unwrap_or(view);

        let bake_tile = self.ddgi.as_ref().and_then(|d| d.pinned_camera_position());
        let (bake_tile_x, bake_tile_z) = bake_tile
            .map(|p| {
                let tile = driftlight_core::ids::TileIndex::from_world_xz(p.x, p.z);
                (tile.x, tile.z)
            })
            .unwrap_or((0, 0));

        let scene = GpuSceneData {
            view,
            proj,
            inv_view,
            inv_proj,
            inv_view_proj,
            directional_shadow_matrix_proj: shadow_proj,
            directional_shadow_matrix_view: shadow_view,
            shadow_matrices: [[[0.0; 4]; 4]; MAX_SPOT_SHADOW_MATRICES],
            camera_pos: [camera_world_position.x, camera_world_position.y, camera_world_position.z, 1.0],
            camera_grid_pos: [0, 0, 0, 0],
            light_dir: [light_dir.x, light_dir.y, light_dir.z, 0.0],
            view_vector: [0.0, 0.0, -1.0, 0.0],
            time,
            delta,
            screen_width: self.swapchain.extent.width as f32,
            screen_height: self.swapchain.extent.height as f32,
            feature_flags: render_options.flags.bits(),
            sun_intensity: render_options.sun_intensity,
            sky_intensity: render_options.sky_intensity,
            exposure: render_options.exposure,
            bake_tile_x,
            bake_tile_z,
            _pad: [0.0; 2],
        };

        let mut scene_buffer = &mut self.scene_data[self.current_frame];
        scene_buffer.write(0, bytemuck::bytes_of(&scene))?;

        Ok(())
    }

    /// Start a GUI immediate-mode frame. No editor surface ships in this
    /// runtime (an Open Question resolved toward the embeddable "stage"
    /// path, not the full editor), so this only exists as the hook a host
    /// application's own immediate-mode UI would call into.
    pub fn prepare(&mut self) {}

    /// Execute one frame per §4.13's six-step sequence.
    pub fn draw_frame(&mut self) -> Result<()> {
        let frame = self.current_frame;
        let fence = self.frame_sync[frame].in_flight;

        // 1. Wait fence[frame]; check pending world-position callback.
        unsafe { self.ctx.device.wait_for_fences(&[fence], true, u64::MAX).map_err(Error::Vulkan)? };
        self.accel_structures.retire_old_transient_buffers();

        if let Some((width, height)) = self.resize_pending.take() {
            self.swapchain.recreate(vk::Extent2D { width, height })?;
            self.resource_pool.rebuild(&pooled_resource_types(&self.frame_graph), self.swapchain.extent)?;
        }

        // 2. Reset this slot's staging ring; acquire next swap image.
        self.staging_rings[frame].reset();

        let image_available = self.frame_sync[frame].image_available;
        let image_index = match self.swapchain.acquire_next_image(image_available) {
            Ok(Some(index)) => index,
            Ok(None) => unreachable!("acquire_next_image always returns an index when it returns Ok"),
            Err(Error::SwapchainOutOfDate) => {
                self.swapchain.recreate(self.swapchain.extent)?;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        unsafe { self.ctx.device.reset_fences(&[fence]).map_err(Error::Vulkan)? };

        // 3. Reset command buffer, run deletion queue, execute graph.
        let cmd = self.frame_sync[frame].command_buffer;
        unsafe {
            self.ctx.device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty()).map_err(Error::Vulkan)?;
            let begin_info = vk::CommandBufferBeginInfo::default();
            self.ctx.device.begin_command_buffer(cmd, &begin_info).map_err(Error::Vulkan)?;
        }

        self.deletion_queue.execute(frame as u64);

        self.gpu_mirror.reemit(&mut self.catalogue, frame, self.current_camera_tile, &self.ctx, &mut self.staging_rings[frame], cmd)?;

        let uploaded_meshes = self.upload_queue.process_model_uploads(
            &mut self.catalogue,
            &mut self.staging_rings[frame],
            &mut self.vertex_giga,
            &mut self.index_giga,
            cmd,
            &self.ctx,
            |_mesh| None,
        );
        for mesh in uploaded_meshes {
            if let (Some(mesh_record), true) = (self.catalogue.mesh(mesh), self.ctx.raytracing_supported) {
                if let Some(gpu) = mesh_record.gpu {
                    let vertex_addr = self.vertex_giga.device_address() + gpu.vertex_offset as u64 * crate::upload_queue::VERTEX_POSITION_STRIDE;
                    let index_addr = self.index_giga.device_address() + gpu.index_offset as u64 * crate::upload_queue::INDEX_STRIDE;
                    if self.accel_structures.build_static_blas(mesh, vertex_addr, index_addr, gpu.vertex_count, gpu.index_count, cmd).is_err() {
                        engine_warn!("driftlight::orchestrator", "failed to build static BLAS for mesh {mesh}");
                    } else if let Some(addr) = self.accel_structures.blas_device_address(mesh) {
                        self.catalogue.record_blas_built(mesh, addr);
                    }
                }
            }
        }

        self.accel_structures.process_dynamic_blas_queue(|_mesh| None, cmd);

        if self.ctx.raytracing_supported {
            let instances = self.build_tlas_instances();
            match self.accel_structures.rebuild_tlas(&instances, cmd) {
                Ok(tlas) => self.bindless.write_tlas(tlas),
                Err(e) => engine_warn!("driftlight::orchestrator", "TLAS rebuild skipped this frame: {e}"),
            }
        }

        let scheduled = self.frame_graph.build();
        for pass in &scheduled {
            for (_resource, barrier) in &pass.barriers {
                self.record_barrier(cmd, barrier);
            }
            self.execute_pass(cmd, pass);
        }

        self.transition_swapchain_image(cmd, image_index, vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        self.transition_swapchain_image(cmd, image_index, vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::PRESENT_SRC_KHR);

        unsafe { self.ctx.device.end_command_buffer(cmd).map_err(Error::Vulkan)? };

        // 4. Submit.
        let render_finished = self.frame_sync[frame].render_finished;
        let wait_semaphores = [image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [render_finished];
        let cmds = [cmd];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&cmds)
            .signal_semaphores(&signal_semaphores);
        unsafe { self.ctx.device.queue_submit(self.ctx.graphics_queue, &[submit_info], fence).map_err(Error::Vulkan)? };

        // 5. Present; recreate on SUBOPTIMAL/OUT_OF_DATE.
        match self.swapchain.present(self.ctx.present_queue, render_finished, image_index) {
            Ok(suboptimal) if suboptimal => self.swapchain.recreate(self.swapchain.extent)?,
            Ok(_) => {}
            Err(Error::SwapchainOutOfDate) => self.swapchain.recreate(self.swapchain.extent)?,
            Err(e) => return Err(e),
        }

        self.service_world_position_request()?;

        // 6. Advance frame index.
        self.current_frame = (self.current_frame + 1) % FRAMES_IN_FLIGHT;
        Ok(())
    }

    fn record_barrier(&self, cmd: vk::CommandBuffer, barrier: &crate::frame_graph::ResourceBarrier) {
        let memory_barrier = vk::MemoryBarrier2::default()
            .src_stage_mask(barrier.src_stage)
            .src_access_mask(barrier.src_access)
            .dst_stage_mask(barrier.dst_stage)
            .dst_access_mask(barrier.dst_access);
        let barriers = [memory_barrier];
        let dep_info = vk::DependencyInfo::default().memory_barriers(&barriers);
        unsafe { self.ctx.device.cmd_pipeline_barrier2(cmd, &dep_info) };
    }

    fn transition_swapchain_image(&self, cmd: vk::CommandBuffer, image_index: u32, old: vk::ImageLayout, new: vk::ImageLayout) {
        let barrier = vk::ImageMemoryBarrier2::default()
            .old_layout(old)
            .new_layout(new)
            .image(self.swapchain.images[image_index as usize])
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            })
            .src_stage_mask(vk::PipelineStageFlags2::TOP_OF_PIPE)
            .dst_stage_mask(vk::PipelineStageFlags2::BOTTOM_OF_PIPE);
        let barriers = [barrier];
        let dep_info = vk::DependencyInfo::default().image_memory_barriers(&barriers);
        unsafe { self.ctx.device.cmd_pipeline_barrier2(cmd, &dep_info) };
    }

    /// Build one TLAS instance per mesh of every renderable whose
    /// prerequisites are resident and that has a built BLAS, skipping
    /// renderables still mid-upload — `rebuild_tlas` just omits them for
    /// this frame, they join next time their BLAS finishes.
    fn build_tlas_instances(&self) -> Vec<vk::AccelerationStructureInstanceKHR> {
        let mut instances = Vec::new();
        for renderable in self.catalogue.renderables() {
            if !renderable.visible || !self.catalogue.renderable_prerequisites_resident(renderable) {
                continue;
            }
            let Some(model) = self.catalogue.model(renderable.model) else { continue };
            for &mesh_id in &model.mesh_ids {
                let Some(device_address) = self.accel_structures.blas_device_address(mesh_id) else { continue };
                instances.push(vk::AccelerationStructureInstanceKHR {
                    transform: mat4_to_vk_transform(&renderable.transform),
                    instance_custom_index_and_mask: vk::Packed24_8::new(0, 0xFF),
                    instance_shader_binding_table_record_offset_and_flags: vk::Packed24_8::new(
                        0,
                        vk::GeometryInstanceFlagsKHR::TRIANGLE_FACING_CULL_DISABLE.as_raw() as u8,
                    ),
                    acceleration_structure_reference: vk::AccelerationStructureReferenceKHR { device_handle: device_address },
                });
            }
        }
        instances
    }

    /// Dispatch one scheduled pass's body. Graphics and compute passes bind
    /// a real pipeline from [`PipelineCache`] and execute; ray-tracing pass
    /// bodies (`vkCmdTraceRaysKHR` + shader binding table construction) are
    /// out of scope here — the TLAS feeding them is still rebuilt and
    /// published to the bindless set every frame regardless of whether any
    /// pass traces against it yet. Transfer-classified passes (paging
    /// translation, presentation) have no pipeline to bind.
    fn execute_pass(&mut self, cmd: vk::CommandBuffer, pass: &ScheduledPass) {
        match pass.pipeline_params {
            PipelineParams::Compute => self.execute_compute_pass(cmd, pass),
            PipelineParams::Graphics => self.execute_graphics_pass(cmd, pass),
            PipelineParams::RayTracing | PipelineParams::None => {}
        }
    }

    fn bind_bindless_set(&self, cmd: vk::CommandBuffer, bind_point: vk::PipelineBindPoint) {
        let set = self.bindless.sets[self.current_frame];
        unsafe {
            self.ctx.device.cmd_bind_descriptor_sets(cmd, bind_point, self.pipelines.layout, BINDLESS_SET_INDEX, &[set], &[]);
        }
    }

    fn execute_compute_pass(&mut self, cmd: vk::CommandBuffer, pass: &ScheduledPass) {
        let pipeline = match self.pipelines.compute_pipeline(&pass.name) {
            Ok(pipeline) => pipeline,
            Err(Error::ShaderNotFound(path)) => {
                engine_warn!("driftlight::orchestrator", "pass {} skipped, no compiled shader at {path}", pass.name);
                return;
            }
            Err(e) => {
                engine_error!("driftlight::orchestrator", "pass {} pipeline build failed: {e}", pass.name);
                return;
            }
        };

        unsafe { self.ctx.device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::COMPUTE, pipeline) };
        self.bind_bindless_set(cmd, vk::PipelineBindPoint::COMPUTE);

        if pass.name == "Cull" {
            if let Some(constants) = self.culling_camera.as_ref().map(cull_push_constants) {
                unsafe {
                    self.ctx.device.cmd_push_constants(cmd, self.pipelines.layout, vk::ShaderStageFlags::ALL, 0, bytemuck::bytes_of(&constants));
                }
            }
        }

        let (groups_x, groups_y) = self.dispatch_groups_for(pass);
        unsafe { self.ctx.device.cmd_dispatch(cmd, groups_x, groups_y, 1) };
    }

    fn execute_graphics_pass(&mut self, cmd: vk::CommandBuffer, pass: &ScheduledPass) {
        let color_attachments: Vec<(String, vk::Format)> = pass
            .resource_usages
            .iter()
            .filter(|u| u.ty == crate::frame_graph::ResourceType::ColorAttachment && u.access == crate::frame_graph::ResourceAccess::Write)
            .filter_map(|u| self.resource_pool.format(&u.resource_name).map(|f| (u.resource_name.clone(), f)))
            .collect();
        let depth_attachment = pass
            .resource_usages
            .iter()
            .find(|u| u.ty == crate::frame_graph::ResourceType::DepthAttachment)
            .and_then(|u| self.resource_pool.image_view(&u.resource_name).map(|v| (u.resource_name.clone(), v)));

        let color_formats: Vec<vk::Format> = color_attachments.iter().map(|(_, f)| *f).collect();
        let depth_format = depth_attachment.as_ref().and_then(|(name, _)| self.resource_pool.format(name));

        let pipeline = match self.pipelines.graphics_pipeline(&pass.name, &color_formats, depth_format) {
            Ok(pipeline) => pipeline,
            Err(Error::ShaderNotFound(path)) => {
                engine_warn!("driftlight::orchestrator", "pass {} skipped, no compiled shader at {path}", pass.name);
                return;
            }
            Err(e) => {
                engine_error!("driftlight::orchestrator", "pass {} pipeline build failed: {e}", pass.name);
                return;
            }
        };

        let extent = self.swapchain.extent;
        let color_rendering_attachments: Vec<vk::RenderingAttachmentInfo> = color_attachments
            .iter()
            .filter_map(|(name, _)| self.resource_pool.image_view(name))
            .map(|view| {
                vk::RenderingAttachmentInfo::default()
                    .image_view(view)
                    .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .load_op(vk::AttachmentLoadOp::LOAD)
                    .store_op(vk::AttachmentStoreOp::STORE)
            })
            .collect();

        let mut rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D { offset: vk::Offset2D { x: 0, y: 0 }, extent })
            .layer_count(1)
            .color_attachments(&color_rendering_attachments);

        let depth_rendering_attachment = depth_attachment.as_ref().map(|(_, view)| {
            vk::RenderingAttachmentInfo::default()
                .image_view(*view)
                .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
                .load_op(vk::AttachmentLoadOp::LOAD)
                .store_op(vk::AttachmentStoreOp::STORE)
        });
        if let Some(depth_info) = &depth_rendering_attachment {
            rendering_info = rendering_info.depth_attachment(depth_info);
        }

        unsafe {
            self.ctx.device.cmd_begin_rendering(cmd, &rendering_info);
            self.ctx.device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline);
        }
        self.bind_bindless_set(cmd, vk::PipelineBindPoint::GRAPHICS);

        let viewport = vk::Viewport { x: 0.0, y: 0.0, width: extent.width as f32, height: extent.height as f32, min_depth: 0.0, max_depth: 1.0 };
        let scissor = vk::Rect2D { offset: vk::Offset2D { x: 0, y: 0 }, extent };
        unsafe {
            self.ctx.device.cmd_set_viewport(cmd, 0, &[viewport]);
            self.ctx.device.cmd_set_scissor(cmd, 0, &[scissor]);
            self.ctx.device.cmd_end_rendering(cmd);
        }
    }

    /// 8x8 groups over the swapchain extent for passes that write an image,
    /// a single group for SSBO-only compute passes (e.g. `ParticleUpdate`,
    /// `CompactDraws`) that size their own work from an indirect count.
    fn dispatch_groups_for(&self, pass: &ScheduledPass) -> (u32, u32) {
        let writes_image = pass.resource_usages.iter().any(|u| {
            u.access == crate::frame_graph::ResourceAccess::Write
                && matches!(
                    u.ty,
                    crate::frame_graph::ResourceType::ImageStorage
                        | crate::frame_graph::ResourceType::ColorAttachment
                        | crate::frame_graph::ResourceType::DepthAttachment
                )
        });
        if !writes_image {
            return (1, 1);
        }
        let extent = self.swapchain.extent;
        ((extent.width + 7) / 8, (extent.height + 7) / 8)
    }

    /// Queue a 1x1 depth readback at `pixel`; the world position is resolved
    /// and handed to `cb` on the next cycle through this same frame slot.
    pub fn request_world_position(&mut self, pixel: (u32, u32), frozen_camera: Camera) -> Result<()> {
        let readback = Buffer::new(self.ctx.clone(), 4, vk::BufferUsageFlags::TRANSFER_DST, gpu_allocator::MemoryLocation::GpuToCpu, "world-position-readback")?;
        self.pending_world_position = Some(PendingWorldPositionRequest { pixel, frozen_camera, readback });
        Ok(())
    }

    fn service_world_position_request(&mut self) -> Result<()> {
        let Some(request) = self.pending_world_position.take() else { return Ok(()) };
        let depth_bytes = request.readback.read(0, 4)?;
        let depth = f32::from_le_bytes(depth_bytes.try_into().unwrap_or([0; 4]));

        let ndc_x = (request.pixel.0 as f32 / self.swapchain.extent.width.max(1) as f32) * 2.0 - 1.0;
        let ndc_y = (request.pixel.1 as f32 / self.swapchain.extent.height.max(1) as f32) * 2.0 - 1.0;
        let clip = glam::Vec4::new(ndc_x, ndc_y, depth, 1.0);
        let inv_vp = request.frozen_camera.view_projection_matrix().inverse();
        let world = inv_vp * clip;
        let world_pos = glam::Vec3::new(world.x, world.y, world.z) / world.w.max(f32::EPSILON);

        engine_info!("driftlight::orchestrator", "world position request resolved to {world_pos:?}");
        Ok(())
    }

    /// Pin the camera to `tile_center` and begin accumulating DDGI probes
    /// without temporal hysteresis.
    pub fn start_bake(&mut self, tile_center: (f32, f32), current_camera_position: glam::Vec3) -> Result<()> {
        if self.ddgi.is_none() {
            self.ddgi = Some(self.create_ddgi_atlas()?);
        }
        if let Some(ddgi) = &mut self.ddgi {
            ddgi.start_bake(tile_center, current_camera_position);
        }
        Ok(())
    }

    /// Request the bake stop; the actual readback happens on the frame
    /// `poll_stop_bake` (called from `update`) reports it's safe.
    pub fn stop_bake(&mut self) {
        if let Some(ddgi) = &mut self.ddgi {
            ddgi.request_stop_bake();
        }
    }

    /// Download the baked atlas into a texture asset, once `poll_stop_bake`
    /// (serviced inside `update`) has confirmed the bake stopped.
    pub fn bake_result(&self, id: AssetId) -> Result<Option<driftlight_core::catalogue::Texture>> {
        let Some(ddgi) = &self.ddgi else { return Ok(None) };
        if ddgi.is_baking() {
            return Ok(None);
        }
        let width = DEFAULT_PROBE_PIXEL * DEFAULT_PROBES_XZ;
        let height = width;
        Ok(Some(ddgi.readback_to_texture(id, width, height)?.texture))
    }

    fn create_ddgi_atlas(&self) -> Result<DdgiAtlas> {
        let extent = DEFAULT_PROBE_PIXEL * DEFAULT_PROBES_XZ;
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(vk::Format::R16G16B16A16_SFLOAT)
            .extent(vk::Extent3D { width: extent, height: extent, depth: 1 })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::STORAGE)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let image = unsafe { self.ctx.device.create_image(&image_info, None).map_err(Error::Vulkan)? };

        let requirements = unsafe { self.ctx.device.get_image_memory_requirements(image) };
        let allocation = {
            let mut allocator = self.ctx.allocator.lock().map_err(|_| Error::DeviceLost("allocator mutex poisoned".into()))?;
            allocator
                .allocate(&gpu_allocator::vulkan::AllocationCreateDesc {
                    name: "ddgi-atlas",
                    requirements,
                    location: gpu_allocator::MemoryLocation::GpuOnly,
                    linear: false,
                    allocation_scheme: gpu_allocator::vulkan::AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(|e| Error::DeviceLost(e.to_string()))?
        };
        unsafe { self.ctx.device.bind_image_memory(image, allocation.memory(), allocation.offset()).map_err(Error::Vulkan)? };
        std::mem::forget(allocation);

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(vk::Format::R16G16B16A16_SFLOAT)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        let view = unsafe { self.ctx.device.create_image_view(&view_info, None).map_err(Error::Vulkan)? };

        Ok(DdgiAtlas::new(self.ctx.clone(), image, view, DEFAULT_PROBE_PIXEL, DEFAULT_PROBES_XZ))
    }
}

/// Row-major 3x4 conversion of a column-major `glam::Mat4`, the layout
/// `VkTransformMatrixKHR` expects for an acceleration-structure instance.
fn mat4_to_vk_transform(m: &glam::Mat4) -> vk::TransformMatrixKHR {
    let cols = m.to_cols_array_2d();
    let mut matrix = [[0.0f32; 4]; 3];
    for (row, row_slot) in matrix.iter_mut().enumerate() {
        for (col, value) in row_slot.iter_mut().enumerate() {
            *value = cols[col][row];
        }
    }
    vk::TransformMatrixKHR { matrix }
}

/// Every frame-graph resource the [`TransientResourcePool`] should own a
/// real handle for, excluding the swapchain image itself — that one is the
/// actual presentable image the swapchain already owns, not a transient
/// resource this pool allocates.
fn pooled_resource_types(frame_graph: &FrameGraph) -> Vec<(String, crate::frame_graph::ResourceType)> {
    frame_graph.resource_types().into_iter().filter(|(name, _)| name != "swapchain_image").collect()
}

/// Build the Cull pass's push constants from the frozen culling camera.
/// Near/far distances are read off the already-extracted frustum planes
/// (evaluated at the camera's world position) rather than carried as
/// separate scalars the `Camera` doesn't otherwise store.
fn cull_push_constants(camera: &Camera) -> GpuCullPushConstants {
    use driftlight_core::camera::{PLANE_BOTTOM, PLANE_FAR, PLANE_LEFT, PLANE_NEAR, PLANE_RIGHT, PLANE_TOP};

    let camera_pos = camera.view_matrix().inverse().w_axis.truncate();
    let planes = camera.frustum().planes;
    let plane_distance = |index: usize| -> f32 {
        let plane = planes[index];
        glam::Vec3::new(plane.x, plane.y, plane.z).dot(camera_pos) + plane.w
    };

    GpuCullPushConstants {
        view: camera.view_matrix().to_cols_array_2d(),
        frustum_planes: [planes[PLANE_LEFT].to_array(), planes[PLANE_RIGHT].to_array(), planes[PLANE_TOP].to_array(), planes[PLANE_BOTTOM].to_array()],
        point_light_shadow_inds: [-1; 4],
        near_dist: plane_distance(PLANE_NEAR).abs(),
        far_dist: plane_distance(PLANE_FAR).abs(),
        draw_count: 0,
        wind_dir_x: 0.0,
        wind_dir_y: 0.0,
        _pad: [0.0; 3],
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        unsafe {
            let _ = self.ctx.device.device_wait_idle();
        }

        self.deletion_queue.flush_all();

        if let Err(err) = self.session_config.save(&self.session_config_path) {
            engine_error!("driftlight::orchestrator", "failed to save session config: {err}");
        }

        unsafe {
            for sync in &self.frame_sync {
                self.ctx.device.destroy_semaphore(sync.image_available, None);
                self.ctx.device.destroy_semaphore(sync.render_finished, None);
                self.ctx.device.destroy_fence(sync.in_flight, None);
                self.ctx.device.destroy_command_pool(sync.command_pool, None);
            }
            self.ctx.device.destroy_command_pool(*self.ctx.upload_command_pool.lock().unwrap(), None);

            if let (Some(loader), Some(messenger)) = (&self.ctx.debug_utils_loader, self.ctx.debug_messenger) {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
        }

        // Swapchain/bindless/accel-structure/giga-buffer/staging fields all
        // drop here in declaration order, before `device`/`instance` do —
        // device and instance destruction happen last, explicitly, since
        // they must outlive every other Vulkan handle.
        unsafe {
            self.ctx.device.destroy_device(None);
            self.ctx.instance.destroy_instance(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::FRAMES_IN_FLIGHT;

    #[test]
    fn frame_index_wraps_within_the_multi_buffer_count() {
        let mut current = 0usize;
        for _ in 0..5 {
            current = (current + 1) % FRAMES_IN_FLIGHT;
        }
        assert!(current < FRAMES_IN_FLIGHT);
    }
}
