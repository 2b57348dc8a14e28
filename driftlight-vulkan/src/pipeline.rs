//! Pipeline cache (C10 execution support): one shared `vk::PipelineLayout`
//! (an empty set 0 plus the bindless set at binding index 1, plus the
//! push-constant range every pass pushes through) and lazily-built
//! compute/graphics pipelines loaded from on-disk SPIR-V. Entry-point names
//! are reflected with `spirq` rather than assumed, so a module compiled with
//! a non-`main` entry point (common when one `.spv` packs several stages)
//! still resolves correctly.
//!
//! Every pipeline targets dynamic rendering (`vk::PipelineRenderingCreateInfo`)
//! — this backend never creates a `vk::RenderPass`/`vk::Framebuffer` pair,
//! matching Vulkan 1.3's core dynamic-rendering path `context.rs` already
//! requires.

use ash::vk;
use std::collections::HashMap;
use std::ffi::CString;
use std::path::PathBuf;
use std::sync::Arc;

use crate::bindless::BindlessLayout;
use crate::context::GpuContext;
use crate::error::{Error, Result};

pub struct PipelineCache {
    ctx: Arc<GpuContext>,
    shader_dir: PathBuf,
    empty_set_layout: vk::DescriptorSetLayout,
    pub layout: vk::PipelineLayout,
    compute: HashMap<String, vk::Pipeline>,
    graphics: HashMap<String, vk::Pipeline>,
    modules: Vec<vk::ShaderModule>,
}

impl PipelineCache {
    pub fn new(ctx: Arc<GpuContext>, bindless: &BindlessLayout, shader_dir: impl Into<PathBuf>) -> Result<Self> {
        let empty_info = vk::DescriptorSetLayoutCreateInfo::default();
        let empty_set_layout = unsafe { ctx.device.create_descriptor_set_layout(&empty_info, None).map_err(Error::Vulkan)? };

        let set_layouts = [empty_set_layout, bindless.layout];
        let push_constant_range = bindless.push_constant_range(vk::ShaderStageFlags::ALL);
        let ranges = [push_constant_range];
        let layout_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts).push_constant_ranges(&ranges);
        let layout = unsafe { ctx.device.create_pipeline_layout(&layout_info, None).map_err(Error::Vulkan)? };

        Ok(Self { ctx, shader_dir: shader_dir.into(), empty_set_layout, layout, compute: HashMap::new(), graphics: HashMap::new(), modules: Vec::new() })
    }

    /// Build (or return the cached) compute pipeline for `pass_name`, loaded
    /// from `<shader_dir>/<pass_name>.comp.spv`. Returns
    /// `Err(Error::ShaderNotFound)` when the module isn't on disk — the
    /// caller skips this pass's dispatch for the frame rather than treating
    /// it as fatal, since shader assets are built out-of-band.
    pub fn compute_pipeline(&mut self, pass_name: &str) -> Result<vk::Pipeline> {
        if let Some(&pipeline) = self.compute.get(pass_name) {
            return Ok(pipeline);
        }

        let path = self.shader_dir.join(format!("{pass_name}.comp.spv"));
        let bytes = std::fs::read(&path).map_err(|_| Error::ShaderNotFound(path.display().to_string()))?;
        let (module, entry_point) = self.load_module(&bytes, &path)?;

        let stage = vk::PipelineShaderStageCreateInfo::default().stage(vk::ShaderStageFlags::COMPUTE).module(module).name(&entry_point);
        let create_info = vk::ComputePipelineCreateInfo::default().stage(stage).layout(self.layout);
        let pipeline = unsafe {
            self.ctx.device.create_compute_pipelines(vk::PipelineCache::null(), &[create_info], None).map_err(|(_, e)| Error::Vulkan(e))?[0]
        };

        self.compute.insert(pass_name.to_string(), pipeline);
        Ok(pipeline)
    }

    /// Build (or return the cached) graphics pipeline for `pass_name`,
    /// loaded from `<shader_dir>/<pass_name>.{vert,frag}.spv` and built
    /// against the given dynamic-rendering attachment formats.
    pub fn graphics_pipeline(&mut self, pass_name: &str, color_formats: &[vk::Format], depth_format: Option<vk::Format>) -> Result<vk::Pipeline> {
        if let Some(&pipeline) = self.graphics.get(pass_name) {
            return Ok(pipeline);
        }

        let vert_path = self.shader_dir.join(format!("{pass_name}.vert.spv"));
        let frag_path = self.shader_dir.join(format!("{pass_name}.frag.spv"));
        let vert_bytes = std::fs::read(&vert_path).map_err(|_| Error::ShaderNotFound(vert_path.display().to_string()))?;
        let frag_bytes = std::fs::read(&frag_path).map_err(|_| Error::ShaderNotFound(frag_path.display().to_string()))?;
        let (vert_module, vert_entry) = self.load_module(&vert_bytes, &vert_path)?;
        let (frag_module, frag_entry) = self.load_module(&frag_bytes, &frag_path)?;

        let stages = [
            vk::PipelineShaderStageCreateInfo::default().stage(vk::ShaderStageFlags::VERTEX).module(vert_module).name(&vert_entry),
            vk::PipelineShaderStageCreateInfo::default().stage(vk::ShaderStageFlags::FRAGMENT).module(frag_module).name(&frag_entry),
        ];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default();
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default().topology(vk::PrimitiveTopology::TRIANGLE_LIST);
        let viewport_state = vk::PipelineViewportStateCreateInfo::default().viewport_count(1).scissor_count(1);
        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .line_width(1.0);
        let multisample = vk::PipelineMultisampleStateCreateInfo::default().rasterization_samples(vk::SampleCountFlags::TYPE_1);
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(depth_format.is_some())
            .depth_write_enable(depth_format.is_some())
            .depth_compare_op(vk::CompareOp::LESS);
        let attachments: Vec<vk::PipelineColorBlendAttachmentState> =
            color_formats.iter().map(|_| vk::PipelineColorBlendAttachmentState::default().color_write_mask(vk::ColorComponentFlags::RGBA)).collect();
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default().attachments(&attachments);
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let mut rendering_info = vk::PipelineRenderingCreateInfo::default().color_attachment_formats(color_formats);
        if let Some(format) = depth_format {
            rendering_info = rendering_info.depth_attachment_format(format);
        }

        let create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(self.layout)
            .push_next(&mut rendering_info);

        let pipeline = unsafe {
            self.ctx.device.create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None).map_err(|(_, e)| Error::Vulkan(e))?[0]
        };

        self.graphics.insert(pass_name.to_string(), pipeline);
        Ok(pipeline)
    }

    fn load_module(&mut self, bytes: &[u8], path: &std::path::Path) -> Result<(vk::ShaderModule, CString)> {
        if bytes.len() % 4 != 0 {
            return Err(Error::ShaderNotFound(path.display().to_string()));
        }
        let words: Vec<u32> = bytes.chunks_exact(4).map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect();
        let create_info = vk::ShaderModuleCreateInfo::default().code(&words);
        let module = unsafe { self.ctx.device.create_shader_module(&create_info, None).map_err(Error::Vulkan)? };
        self.modules.push(module);

        let entry_point = reflect_entry_point(bytes);
        Ok((module, entry_point))
    }
}

/// Reflect a compiled module's entry-point name via `spirq`, falling back to
/// the conventional `main` when reflection finds none (or the module
/// declares several and the pass doesn't disambiguate which one it wants).
fn reflect_entry_point(bytes: &[u8]) -> CString {
    let entry_points = spirq::ReflectConfig::new().spv(bytes).reflect().unwrap_or_default();
    match entry_points.first() {
        Some(entry) => CString::new(entry.name.clone()).unwrap_or_else(|_| CString::new("main").unwrap()),
        None => CString::new("main").unwrap(),
    }
}

impl Drop for PipelineCache {
    fn drop(&mut self) {
        unsafe {
            for &pipeline in self.compute.values() {
                self.ctx.device.destroy_pipeline(pipeline, None);
            }
            for &pipeline in self.graphics.values() {
                self.ctx.device.destroy_pipeline(pipeline, None);
            }
            for &module in &self.modules {
                self.ctx.device.destroy_shader_module(module, None);
            }
            self.ctx.device.destroy_pipeline_layout(self.layout, None);
            self.ctx.device.destroy_descriptor_set_layout(self.empty_set_layout, None);
        }
    }
}
