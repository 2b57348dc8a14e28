//! The bindless descriptor set: one layout at set 1, bound to every pipeline,
//! carrying every catalogue buffer plus a variable-size texture array.
//! Binding indices are fixed so shader code and pipeline-layout code agree
//! without a lookup table.

use ash::vk;
use std::sync::Arc;

use crate::context::GpuContext;
use crate::error::{Error, Result};

pub const BINDLESS_SET_INDEX: u32 = 1;
pub const MAX_BINDLESS_RESOURCES: u32 = 16_384;
pub const PUSH_CONSTANT_RANGE_SIZE: u32 = 256;

pub const BINDING_SCENE_DATA: u32 = 0;
pub const BINDING_WIND_FORCE_IMAGE: u32 = 1;
pub const BINDING_RENDERABLE_SSBO: u32 = 2;
pub const BINDING_LIGHT_SSBO: u32 = 3;
pub const BINDING_POINT_LIGHT_SHADOW_UBO: u32 = 4;
pub const BINDING_VIEW_CLUSTER_SSBO: u32 = 5;
pub const BINDING_MATERIAL_SSBO: u32 = 6;
pub const BINDING_RENDERABLE_MATERIAL_INDEX_SSBO: u32 = 7;
pub const BINDING_MODEL_SSBO: u32 = 8;
pub const BINDING_GIGA_INDEX_SSBO: u32 = 9;
pub const BINDING_GIGA_VERTEX_SSBO: u32 = 10;
pub const BINDING_MESH_INFO_SSBO: u32 = 11;
pub const BINDING_TLAS: u32 = 12;
pub const BINDING_SKELETON_SSBO: u32 = 13;
pub const BINDING_TILE_INFO_SSBO: u32 = 14;
pub const BINDING_TERRAIN_SSBO: u32 = 15;
pub const BINDING_BINDLESS_TEXTURES: u32 = 16;

const FIXED_BINDING_COUNT: usize = 16;

pub struct BindlessLayout {
    ctx: Arc<GpuContext>,
    pub layout: vk::DescriptorSetLayout,
    pub pool: vk::DescriptorPool,
    /// One set per frame in flight; texture-slot writes target every entry
    /// so a frame never observes a half-updated bindless array.
    pub sets: Vec<vk::DescriptorSet>,
}

impl BindlessLayout {
    pub fn new(ctx: Arc<GpuContext>, frames_in_flight: u32) -> Result<Self> {
        let stage_flags = vk::ShaderStageFlags::ALL;

        let mut bindings: Vec<vk::DescriptorSetLayoutBinding> = vec![
            binding(BINDING_SCENE_DATA, vk::DescriptorType::UNIFORM_BUFFER, 1, stage_flags),
            binding(BINDING_WIND_FORCE_IMAGE, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1, stage_flags),
            binding(BINDING_RENDERABLE_SSBO, vk::DescriptorType::STORAGE_BUFFER, 1, stage_flags),
            binding(BINDING_LIGHT_SSBO, vk::DescriptorType::STORAGE_BUFFER, 1, stage_flags),
            binding(BINDING_POINT_LIGHT_SHADOW_UBO, vk::DescriptorType::UNIFORM_BUFFER, 1, stage_flags),
            binding(BINDING_VIEW_CLUSTER_SSBO, vk::DescriptorType::STORAGE_BUFFER, 1, stage_flags),
            binding(BINDING_MATERIAL_SSBO, vk::DescriptorType::STORAGE_BUFFER, 1, stage_flags),
            binding(BINDING_RENDERABLE_MATERIAL_INDEX_SSBO, vk::DescriptorType::STORAGE_BUFFER, 1, stage_flags),
            binding(BINDING_MODEL_SSBO, vk::DescriptorType::STORAGE_BUFFER, 1, stage_flags),
            binding(BINDING_GIGA_INDEX_SSBO, vk::DescriptorType::STORAGE_BUFFER, 1, stage_flags),
            binding(BINDING_GIGA_VERTEX_SSBO, vk::DescriptorType::STORAGE_BUFFER, 1, stage_flags),
            binding(BINDING_MESH_INFO_SSBO, vk::DescriptorType::STORAGE_BUFFER, 1, stage_flags),
            binding(BINDING_TLAS, vk::DescriptorType::ACCELERATION_STRUCTURE_KHR, 1, stage_flags),
            binding(BINDING_SKELETON_SSBO, vk::DescriptorType::STORAGE_BUFFER, 1, stage_flags),
            binding(BINDING_TILE_INFO_SSBO, vk::DescriptorType::STORAGE_BUFFER, 1, stage_flags),
            binding(BINDING_TERRAIN_SSBO, vk::DescriptorType::STORAGE_BUFFER, 1, stage_flags),
        ];
        debug_assert_eq!(bindings.len(), FIXED_BINDING_COUNT);
        bindings.push(binding(
            BINDING_BINDLESS_TEXTURES,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            MAX_BINDLESS_RESOURCES,
            stage_flags,
        ));

        let mut binding_flags: Vec<vk::DescriptorBindingFlags> =
            vec![vk::DescriptorBindingFlags::UPDATE_AFTER_BIND; FIXED_BINDING_COUNT];
        binding_flags.push(
            vk::DescriptorBindingFlags::PARTIALLY_BOUND
                | vk::DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT
                | vk::DescriptorBindingFlags::UPDATE_AFTER_BIND,
        );

        let mut flags_info = vk::DescriptorSetLayoutBindingFlagsCreateInfo::default().binding_flags(&binding_flags);
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default()
            .bindings(&bindings)
            .flags(vk::DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL)
            .push_next(&mut flags_info);

        let layout = unsafe { ctx.device.create_descriptor_set_layout(&layout_info, None).map_err(Error::Vulkan)? };

        let pool_sizes = [
            vk::DescriptorPoolSize { ty: vk::DescriptorType::UNIFORM_BUFFER, descriptor_count: 3 * frames_in_flight },
            vk::DescriptorPoolSize { ty: vk::DescriptorType::STORAGE_BUFFER, descriptor_count: 11 * frames_in_flight },
            vk::DescriptorPoolSize { ty: vk::DescriptorType::ACCELERATION_STRUCTURE_KHR, descriptor_count: frames_in_flight },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: (MAX_BINDLESS_RESOURCES + 1) * frames_in_flight,
            },
        ];
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .pool_sizes(&pool_sizes)
            .max_sets(frames_in_flight)
            .flags(vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND);
        let pool = unsafe { ctx.device.create_descriptor_pool(&pool_info, None).map_err(Error::Vulkan)? };

        let layouts = vec![layout; frames_in_flight as usize];
        let variable_counts = vec![MAX_BINDLESS_RESOURCES; frames_in_flight as usize];
        let mut variable_count_info =
            vk::DescriptorSetVariableDescriptorCountAllocateInfo::default().descriptor_counts(&variable_counts);
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts)
            .push_next(&mut variable_count_info);
        let sets = unsafe { ctx.device.allocate_descriptor_sets(&alloc_info).map_err(Error::Vulkan)? };

        Ok(Self { ctx, layout, pool, sets })
    }

    /// Write a texture into `slot` across every per-frame set, satisfying
    /// the upload queue's "every frame's descriptor set" requirement.
    pub fn write_texture_slot(&self, slot: u32, image_view: vk::ImageView, sampler: vk::Sampler) {
        let image_info = [vk::DescriptorImageInfo::default()
            .image_view(image_view)
            .sampler(sampler)
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)];

        let writes: Vec<vk::WriteDescriptorSet> = self
            .sets
            .iter()
            .map(|&set| {
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(BINDING_BINDLESS_TEXTURES)
                    .dst_array_element(slot)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(&image_info)
            })
            .collect();

        unsafe { self.ctx.device.update_descriptor_sets(&writes, &[]) };
    }

    /// Write the current TLAS handle into every per-frame set's binding 12,
    /// called after [`crate::accel_structure::AccelStructureManager::rebuild_tlas`]
    /// returns the refreshed handle each frame.
    pub fn write_tlas(&self, accel: vk::AccelerationStructureKHR) {
        let accels = [accel];
        let mut write_as_info = vk::WriteDescriptorSetAccelerationStructureKHR::default().acceleration_structures(&accels);

        let writes: Vec<vk::WriteDescriptorSet> = self
            .sets
            .iter()
            .map(|&set| {
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(BINDING_TLAS)
                    .descriptor_type(vk::DescriptorType::ACCELERATION_STRUCTURE_KHR)
                    .descriptor_count(1)
                    .push_next(&mut write_as_info)
            })
            .collect();

        unsafe { self.ctx.device.update_descriptor_sets(&writes, &[]) };
    }

    pub fn push_constant_range(&self, stage_flags: vk::ShaderStageFlags) -> vk::PushConstantRange {
        vk::PushConstantRange::default().stage_flags(stage_flags).offset(0).size(PUSH_CONSTANT_RANGE_SIZE)
    }
}

fn binding(index: u32, ty: vk::DescriptorType, count: u32, stages: vk::ShaderStageFlags) -> vk::DescriptorSetLayoutBinding<'static> {
    vk::DescriptorSetLayoutBinding::default()
        .binding(index)
        .descriptor_type(ty)
        .descriptor_count(count)
        .stage_flags(stages)
}

impl Drop for BindlessLayout {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_descriptor_pool(self.pool, None);
            self.ctx.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_indices_match_the_fixed_layout_order() {
        let indices = [
            BINDING_SCENE_DATA,
            BINDING_WIND_FORCE_IMAGE,
            BINDING_RENDERABLE_SSBO,
            BINDING_LIGHT_SSBO,
            BINDING_POINT_LIGHT_SHADOW_UBO,
            BINDING_VIEW_CLUSTER_SSBO,
            BINDING_MATERIAL_SSBO,
            BINDING_RENDERABLE_MATERIAL_INDEX_SSBO,
            BINDING_MODEL_SSBO,
            BINDING_GIGA_INDEX_SSBO,
            BINDING_GIGA_VERTEX_SSBO,
            BINDING_MESH_INFO_SSBO,
            BINDING_TLAS,
            BINDING_SKELETON_SSBO,
            BINDING_TILE_INFO_SSBO,
            BINDING_TERRAIN_SSBO,
            BINDING_BINDLESS_TEXTURES,
        ];
        for (i, &binding) in indices.iter().enumerate() {
            assert_eq!(binding, i as u32);
        }
    }

    #[test]
    fn bindless_texture_array_is_the_last_binding() {
        assert_eq!(BINDING_BINDLESS_TEXTURES, FIXED_BINDING_COUNT as u32);
    }
}
