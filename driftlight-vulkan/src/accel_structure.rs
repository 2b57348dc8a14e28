//! Acceleration-structure manager (C8): static per-mesh BLAS built once on
//! upload, dynamic per-animated-renderable BLAS copies refit every frame,
//! and one TLAS rebuilt from the live renderable set.

use ash::vk;
use std::collections::HashMap;
use std::sync::Arc;

use driftlight_core::ids::AssetId;

use crate::buffer::Buffer;
use crate::context::GpuContext;
use crate::deletion_queue::{DeletionEntry, DeletionQueue};
use crate::error::{Error, Result};

/// Dynamic-BLAS refits are budgeted so a scene with many animated
/// renderables doesn't stall a frame rebuilding all of them at once;
/// partially-processed renderables simply pick up next frame.
const MAX_DYNAMIC_BLAS_BUILDS_PER_FRAME: usize = 5;

pub struct BlasEntry {
    pub accel: vk::AccelerationStructureKHR,
    pub buffer: Buffer,
    pub device_address: u64,
}

pub struct AccelStructureManager {
    ctx: Arc<GpuContext>,
    loader: ash::khr::acceleration_structure::Device,
    static_blas: HashMap<AssetId, BlasEntry>,
    dynamic_blas: HashMap<AssetId, BlasEntry>,
    dynamic_build_queue: Vec<AssetId>,
    tlas: Option<BlasEntry>,
    tlas_instance_capacity: u32,
    min_scratch_alignment: u64,
    /// Scratch/instance buffers from builds recorded but not yet known to
    /// have completed on the GPU. Held one extra frame past the build that
    /// used them before being freed, since the device fence for that frame
    /// isn't visible at this layer.
    retiring_buffers: Vec<Buffer>,
}

impl AccelStructureManager {
    pub fn new(ctx: Arc<GpuContext>, tlas_instance_capacity: u32) -> Self {
        let loader = ash::khr::acceleration_structure::Device::new(&ctx.instance, &ctx.device);
        let props = unsafe {
            let mut as_props = vk::PhysicalDeviceAccelerationStructurePropertiesKHR::default();
            let mut props2 = vk::PhysicalDeviceProperties2::default().push_next(&mut as_props);
            ctx.instance.get_physical_device_properties2(ctx.physical_device(), &mut props2);
            as_props
        };

        Self {
            ctx,
            loader,
            static_blas: HashMap::new(),
            dynamic_blas: HashMap::new(),
            dynamic_build_queue: Vec::new(),
            tlas: None,
            tlas_instance_capacity,
            min_scratch_alignment: props.min_acceleration_structure_scratch_offset_alignment as u64,
            retiring_buffers: Vec::new(),
        }
    }

    /// Drop buffers from the previous frame's builds. Called once per frame
    /// after the orchestrator has waited on that frame's fence, so any build
    /// that referenced them has long since completed.
    pub fn retire_old_transient_buffers(&mut self) {
        self.retiring_buffers.clear();
    }

    pub fn has_static_blas(&self, mesh: AssetId) -> bool {
        self.static_blas.contains_key(&mesh)
    }

    pub fn blas_device_address(&self, mesh: AssetId) -> Option<u64> {
        self.static_blas.get(&mesh).or_else(|| self.dynamic_blas.get(&mesh)).map(|e| e.device_address)
    }

    /// Build a static BLAS for `mesh` from its giga-buffer vertex/index
    /// ranges. Geometry addresses are `giga_vtx + vertex_offset*stride` and
    /// `giga_idx + index_offset*4`; flags are `PREFER_FAST_TRACE` since
    /// static meshes are built once and traced many times.
    pub fn build_static_blas(
        &mut self,
        mesh: AssetId,
        vertex_device_address: u64,
        index_device_address: u64,
        vertex_count: u32,
        index_count: u32,
        cmd: vk::CommandBuffer,
    ) -> Result<()> {
        let entry = self.build_blas(
            vertex_device_address,
            index_device_address,
            vertex_count,
            index_count,
            vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE,
            cmd,
        )?;
        self.static_blas.insert(mesh, entry);
        self.barrier_after_build(cmd);
        Ok(())
    }

    /// Queue a dynamic BLAS copy for a skinned renderable's meshes (built
    /// `PREFER_FAST_BUILD | ALLOW_UPDATE`, refit every frame by `UpdateBlas`
    /// once the skinning compute pass has written the copied vertex range).
    pub fn queue_dynamic_blas_build(&mut self, renderable_mesh: AssetId) {
        if !self.dynamic_build_queue.contains(&renderable_mesh) {
            self.dynamic_build_queue.push(renderable_mesh);
        }
    }

    /// Build up to the per-frame budget of queued dynamic BLASes. Returns
    /// the meshes that were *not* built this tick so the caller knows to
    /// keep the entries it copied pending.
    pub fn process_dynamic_blas_queue(
        &mut self,
        vertex_device_address_of: impl Fn(AssetId) -> Option<(u64, u64, u32, u32)>,
        cmd: vk::CommandBuffer,
    ) -> Vec<AssetId> {
        let budget = MAX_DYNAMIC_BLAS_BUILDS_PER_FRAME.min(self.dynamic_build_queue.len());
        let to_build: Vec<AssetId> = self.dynamic_build_queue.drain(..budget).collect();
        let mut built = Vec::new();

        for mesh in to_build {
            let Some((vtx_addr, idx_addr, vtx_count, idx_count)) = vertex_device_address_of(mesh) else { continue };
            if let Ok(entry) = self.build_blas(
                vtx_addr,
                idx_addr,
                vtx_count,
                idx_count,
                vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_BUILD | vk::BuildAccelerationStructureFlagsKHR::ALLOW_UPDATE,
                cmd,
            ) {
                self.dynamic_blas.insert(mesh, entry);
                built.push(mesh);
            }
        }
        self.barrier_after_build(cmd);
        built
    }

    pub fn destroy_mesh_blas(&mut self, mesh: AssetId, deletions: &mut DeletionQueue, current_frame: u64) {
        if let Some(entry) = self.static_blas.remove(&mesh) {
            deletions.enqueue(
                DeletionEntry::AccelerationStructure { accel: entry.accel, buffer: entry.buffer.handle(), scratch: None },
                current_frame,
            );
            std::mem::forget(entry.buffer);
        }
        if let Some(entry) = self.dynamic_blas.remove(&mesh) {
            deletions.enqueue(
                DeletionEntry::AccelerationStructure { accel: entry.accel, buffer: entry.buffer.handle(), scratch: None },
                current_frame,
            );
            std::mem::forget(entry.buffer);
        }
        self.dynamic_build_queue.retain(|m| *m != mesh);
    }

    fn build_blas(
        &mut self,
        vertex_device_address: u64,
        index_device_address: u64,
        vertex_count: u32,
        index_count: u32,
        flags: vk::BuildAccelerationStructureFlagsKHR,
        cmd: vk::CommandBuffer,
    ) -> Result<BlasEntry> {
        let triangles = vk::AccelerationStructureGeometryTrianglesDataKHR::default()
            .vertex_format(vk::Format::R32G32B32_SFLOAT)
            .vertex_data(vk::DeviceOrHostAddressConstKHR { device_address: vertex_device_address })
            .vertex_stride(crate::upload_queue::VERTEX_POSITION_STRIDE)
            .max_vertex(vertex_count.saturating_sub(1))
            .index_type(vk::IndexType::UINT32)
            .index_data(vk::DeviceOrHostAddressConstKHR { device_address: index_device_address });

        let geometry = vk::AccelerationStructureGeometryKHR::default()
            .geometry_type(vk::GeometryTypeKHR::TRIANGLES)
            .geometry(vk::AccelerationStructureGeometryDataKHR { triangles })
            .flags(vk::GeometryFlagsKHR::OPAQUE);

        let geometries = [geometry];
        let mut build_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
            .ty(vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL)
            .flags(flags)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .geometries(&geometries);

        let primitive_count = index_count / 3;
        let size_info = unsafe {
            self.loader.get_acceleration_structure_build_sizes(
                vk::AccelerationStructureBuildTypeKHR::DEVICE,
                &build_info,
                &[primitive_count],
            )
        };

        let buffer = Buffer::new(
            self.ctx.clone(),
            size_info.acceleration_structure_size,
            vk::BufferUsageFlags::ACCELERATION_STRUCTURE_STORAGE_KHR,
            gpu_allocator::MemoryLocation::GpuOnly,
            "blas-storage",
        )?;

        let create_info = vk::AccelerationStructureCreateInfoKHR::default()
            .buffer(buffer.handle())
            .size(size_info.acceleration_structure_size)
            .ty(vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL);
        let accel = unsafe { self.loader.create_acceleration_structure(&create_info, None).map_err(Error::Vulkan)? };

        let scratch = Buffer::new(
            self.ctx.clone(),
            align_up(size_info.build_scratch_size, self.min_scratch_alignment),
            vk::BufferUsageFlags::STORAGE_BUFFER,
            gpu_allocator::MemoryLocation::GpuOnly,
            "blas-scratch",
        )?;

        build_info = build_info.dst_acceleration_structure(accel).scratch_data(vk::DeviceOrHostAddressKHR {
            device_address: scratch.device_address(),
        });

        let range = vk::AccelerationStructureBuildRangeInfoKHR::default().primitive_count(primitive_count);
        unsafe { self.loader.cmd_build_acceleration_structures(cmd, &[build_info], &[&[range]]) };

        let address_info = vk::AccelerationStructureDeviceAddressInfoKHR::default().acceleration_structure(accel);
        let device_address = unsafe { self.loader.get_acceleration_structure_device_address(&address_info) };

        // Scratch is only needed for the duration of this build; retired
        // rather than freed immediately since the build this just recorded
        // hasn't necessarily completed on the device yet.
        self.retiring_buffers.push(scratch);

        Ok(BlasEntry { accel, buffer, device_address })
    }

    /// Rebuild the TLAS from scratch every frame using the given instance
    /// list (world transform + BLAS device address per live renderable,
    /// dynamic BLAS address preferred over static when both exist). The
    /// caller writes the refreshed handle into bindless binding 12 for
    /// every frame's descriptor set after this returns.
    pub fn rebuild_tlas(&mut self, instances: &[vk::AccelerationStructureInstanceKHR], cmd: vk::CommandBuffer) -> Result<vk::AccelerationStructureKHR> {
        let instance_buffer = Buffer::new(
            self.ctx.clone(),
            (instances.len().max(1) * std::mem::size_of::<vk::AccelerationStructureInstanceKHR>()) as u64,
            vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR,
            gpu_allocator::MemoryLocation::CpuToGpu,
            "tlas-instances",
        )?;
        // SAFETY: `vk::AccelerationStructureInstanceKHR` is `#[repr(C)]` and
        // POD; this reinterprets the slice as raw bytes for the upload.
        let bytes = unsafe {
            std::slice::from_raw_parts(
                instances.as_ptr() as *const u8,
                instances.len() * std::mem::size_of::<vk::AccelerationStructureInstanceKHR>(),
            )
        };
        let mut instance_buffer = instance_buffer;
        if !bytes.is_empty() {
            instance_buffer.write(0, bytes)?;
        }

        let geometry_instances = vk::AccelerationStructureGeometryInstancesDataKHR::default()
            .data(vk::DeviceOrHostAddressConstKHR { device_address: instance_buffer.device_address() });
        let geometry = vk::AccelerationStructureGeometryKHR::default()
            .geometry_type(vk::GeometryTypeKHR::INSTANCES)
            .geometry(vk::AccelerationStructureGeometryDataKHR { instances: geometry_instances });
        let geometries = [geometry];

        let mut build_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
            .ty(vk::AccelerationStructureTypeKHR::TOP_LEVEL)
            .flags(vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_BUILD)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .geometries(&geometries);

        let size_info = unsafe {
            self.loader.get_acceleration_structure_build_sizes(
                vk::AccelerationStructureBuildTypeKHR::DEVICE,
                &build_info,
                &[self.tlas_instance_capacity],
            )
        };

        if self.tlas.is_none() {
            let buffer = Buffer::new(
                self.ctx.clone(),
                size_info.acceleration_structure_size,
                vk::BufferUsageFlags::ACCELERATION_STRUCTURE_STORAGE_KHR,
                gpu_allocator::MemoryLocation::GpuOnly,
                "tlas-storage",
            )?;
            let create_info = vk::AccelerationStructureCreateInfoKHR::default()
                .buffer(buffer.handle())
                .size(size_info.acceleration_structure_size)
                .ty(vk::AccelerationStructureTypeKHR::TOP_LEVEL);
            let accel = unsafe { self.loader.create_acceleration_structure(&create_info, None).map_err(Error::Vulkan)? };
            let address_info = vk::AccelerationStructureDeviceAddressInfoKHR::default().acceleration_structure(accel);
            let device_address = unsafe { self.loader.get_acceleration_structure_device_address(&address_info) };
            self.tlas = Some(BlasEntry { accel, buffer, device_address });
        }

        let scratch = Buffer::new(
            self.ctx.clone(),
            align_up(size_info.build_scratch_size, self.min_scratch_alignment),
            vk::BufferUsageFlags::STORAGE_BUFFER,
            gpu_allocator::MemoryLocation::GpuOnly,
            "tlas-scratch",
        )?;

        let tlas_handle = self.tlas.as_ref().unwrap().accel;
        build_info = build_info
            .dst_acceleration_structure(tlas_handle)
            .scratch_data(vk::DeviceOrHostAddressKHR { device_address: scratch.device_address() });

        let range = vk::AccelerationStructureBuildRangeInfoKHR::default().primitive_count(instances.len() as u32);
        unsafe { self.loader.cmd_build_acceleration_structures(cmd, &[build_info], &[&[range]]) };
        self.barrier_after_build(cmd);

        self.retiring_buffers.push(scratch);
        self.retiring_buffers.push(instance_buffer);

        Ok(tlas_handle)
    }

    fn barrier_after_build(&self, cmd: vk::CommandBuffer) {
        let barrier = vk::MemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR)
            .src_access_mask(vk::AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR)
            .dst_stage_mask(vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR | vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR)
            .dst_access_mask(vk::AccessFlags2::ACCELERATION_STRUCTURE_READ_KHR);
        let barriers = [barrier];
        let dep_info = vk::DependencyInfo::default().memory_barriers(&barriers);
        unsafe { self.ctx.device.cmd_pipeline_barrier2(cmd, &dep_info) };
    }
}

fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        value
    } else {
        (value + alignment - 1) / alignment * alignment
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn align_up_rounds_to_the_next_multiple() {
        assert_eq!(super::align_up(257, 256), 512);
        assert_eq!(super::align_up(256, 256), 256);
        assert_eq!(super::align_up(0, 256), 0);
    }
}
