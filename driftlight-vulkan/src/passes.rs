//! The default render graph (§4.10). Bodies are intentionally thin —
//! the spec fixes each pass's declared I/O and position, not its internals
//! — but every pass is a real registration with real resource usages, not a
//! stub comment, so the graph's topological sort and barrier computation
//! have something honest to schedule.

use crate::frame_graph::{
    FrameGraph, PipelineParams, PipelineStageBits, RenderPassRegisterInfo, ResourceAccess, ResourceType, ResourceUsage,
};

/// Push constants for the `Cull` compute pass (§4.10). Layout mirrors
/// `driftlight_core::gpu_records::GpuCullPushConstants`; kept separate here
/// since this is the Vulkan-side view bound via `vkCmdPushConstants`, not
/// the CPU-side record the orchestrator fills in.
pub use driftlight_core::gpu_records::GpuCullPushConstants;

/// Register the default pass graph in the fixed order from §4.10:
/// `HiZ → ParticleUpdate → Cull → CompactDraws → Shadow → GrassShadow →
/// Geometry → Grass → UpdateBlas → UpdateTLAS → IrradianceProbeTranslation →
/// IrradianceProbeRayTracing → IrradianceProbeConvolve → ShadowRayTracing →
/// SpecularGI_RT → SpecularGI_Mip → SSAO → SSAOBlur → DeferredLighting →
/// LuminanceHistogram → LuminanceAverage → Bloom → FXAA → DebugBS →
/// DebugView → UI → Presentation`.
pub fn register_default_graph(graph: &mut FrameGraph) {
    let compute = |name: &str, group: &str, usages: Vec<ResourceUsage>| RenderPassRegisterInfo {
        name: name.into(),
        group: group.into(),
        resource_usages: usages,
        pipeline_params: PipelineParams::Compute,
    };
    let graphics = |name: &str, group: &str, usages: Vec<ResourceUsage>| RenderPassRegisterInfo {
        name: name.into(),
        group: group.into(),
        resource_usages: usages,
        pipeline_params: PipelineParams::Graphics,
    };
    let raytracing = |name: &str, group: &str, usages: Vec<ResourceUsage>| RenderPassRegisterInfo {
        name: name.into(),
        group: group.into(),
        resource_usages: usages,
        pipeline_params: PipelineParams::RayTracing,
    };
    let transfer = |name: &str, group: &str, usages: Vec<ResourceUsage>| RenderPassRegisterInfo {
        name: name.into(),
        group: group.into(),
        resource_usages: usages,
        pipeline_params: PipelineParams::None,
    };

    graph.register(compute(
        "HiZ",
        "culling",
        vec![
            ResourceUsage::new("depth", ResourceType::SampledDepthTexture, ResourceAccess::Read, PipelineStageBits::COMPUTE),
            ResourceUsage::new("hi_z_pyramid", ResourceType::ImageStorage, ResourceAccess::Write, PipelineStageBits::COMPUTE),
        ],
    ));

    graph.register(compute(
        "ParticleUpdate",
        "simulation",
        vec![ResourceUsage::new("particles", ResourceType::Ssbo, ResourceAccess::Write, PipelineStageBits::COMPUTE)],
    ));

    // Representative contract from §4.10: reads renderable+mesh buffers and
    // 6 HiZ mips, writes the indirect draw-command buffer, the per-instance
    // renderable/mesh translation buffer, per-light draw buffers, and a
    // bounding-sphere debug draw. Push constants carry view/frustum/near/far
    // /draw_count/wind.xy (`GpuCullPushConstants`).
    graph.register(compute(
        "Cull",
        "culling",
        vec![
            ResourceUsage::new("renderable_ssbo", ResourceType::Ssbo, ResourceAccess::Read, PipelineStageBits::COMPUTE),
            ResourceUsage::new("mesh_info_ssbo", ResourceType::Ssbo, ResourceAccess::Read, PipelineStageBits::COMPUTE),
            ResourceUsage::new("hi_z_pyramid", ResourceType::ImageStorage, ResourceAccess::Read, PipelineStageBits::COMPUTE),
            ResourceUsage::new("draw_commands", ResourceType::Ssbo, ResourceAccess::Write, PipelineStageBits::INDIRECT_DRAW),
            ResourceUsage::new("instance_translation", ResourceType::Ssbo, ResourceAccess::Write, PipelineStageBits::COMPUTE),
            ResourceUsage::new("shadow_draw_commands", ResourceType::Ssbo, ResourceAccess::Write, PipelineStageBits::INDIRECT_DRAW),
            ResourceUsage::new("bounding_sphere_debug", ResourceType::Ssbo, ResourceAccess::Write, PipelineStageBits::COMPUTE),
        ],
    ));

    graph.register(compute(
        "CompactDraws",
        "culling",
        vec![
            ResourceUsage::new("draw_commands", ResourceType::Ssbo, ResourceAccess::Read, PipelineStageBits::COMPUTE),
            ResourceUsage::new("compacted_draw_commands", ResourceType::Ssbo, ResourceAccess::Write, PipelineStageBits::INDIRECT_DRAW),
            ResourceUsage::new("compacted_draw_count", ResourceType::Ssbo, ResourceAccess::Write, PipelineStageBits::INDIRECT_DRAW),
        ],
    ));

    graph.register(graphics(
        "Shadow",
        "shadow",
        vec![
            ResourceUsage::new("shadow_draw_commands", ResourceType::Ssbo, ResourceAccess::Read, PipelineStageBits::INDIRECT_DRAW),
            ResourceUsage::new("shadow_map", ResourceType::DepthAttachment, ResourceAccess::Write, PipelineStageBits::FRAGMENT),
        ],
    ));

    graph.register(graphics(
        "GrassShadow",
        "shadow",
        vec![ResourceUsage::new("shadow_map", ResourceType::DepthAttachment, ResourceAccess::Write, PipelineStageBits::FRAGMENT)],
    ));

    // Writes G-buffer (color0..2) + depth, MRT.
    graph.register(graphics(
        "Geometry",
        "geometry",
        vec![
            ResourceUsage::new("compacted_draw_commands", ResourceType::Ssbo, ResourceAccess::Read, PipelineStageBits::INDIRECT_DRAW),
            ResourceUsage::new("gbuffer_color0", ResourceType::ColorAttachment, ResourceAccess::Write, PipelineStageBits::FRAGMENT),
            ResourceUsage::new("gbuffer_color1", ResourceType::ColorAttachment, ResourceAccess::Write, PipelineStageBits::FRAGMENT),
            ResourceUsage::new("gbuffer_color2", ResourceType::ColorAttachment, ResourceAccess::Write, PipelineStageBits::FRAGMENT),
            ResourceUsage::new("depth", ResourceType::DepthAttachment, ResourceAccess::Write, PipelineStageBits::FRAGMENT),
        ],
    ));

    graph.register(graphics(
        "Grass",
        "geometry",
        vec![
            ResourceUsage::new("gbuffer_color0", ResourceType::ColorAttachment, ResourceAccess::Write, PipelineStageBits::FRAGMENT),
            ResourceUsage::new("depth", ResourceType::DepthAttachment, ResourceAccess::Write, PipelineStageBits::FRAGMENT),
        ],
    ));

    graph.register(compute(
        "UpdateBlas",
        "raytracing",
        vec![ResourceUsage::new("dynamic_vertex_copies", ResourceType::Ssbo, ResourceAccess::Write, PipelineStageBits::RAY_TRACING)],
    ));

    graph.register(compute(
        "UpdateTLAS",
        "raytracing",
        vec![ResourceUsage::new("tlas", ResourceType::Ssbo, ResourceAccess::Write, PipelineStageBits::RAY_TRACING)],
    ));

    graph.register(transfer(
        "IrradianceProbeTranslation",
        "ddgi",
        vec![ResourceUsage::new("ddgi_atlas", ResourceType::ImageTransferDst, ResourceAccess::Write, PipelineStageBits::TRANSFER)],
    ));

    graph.register(raytracing(
        "IrradianceProbeRayTracing",
        "ddgi",
        vec![
            ResourceUsage::new("tlas", ResourceType::Ssbo, ResourceAccess::Read, PipelineStageBits::RAY_TRACING),
            ResourceUsage::new("ddgi_atlas", ResourceType::ImageStorage, ResourceAccess::Write, PipelineStageBits::RAY_TRACING),
        ],
    ));

    graph.register(compute(
        "IrradianceProbeConvolve",
        "ddgi",
        vec![ResourceUsage::new("ddgi_atlas", ResourceType::ImageStorage, ResourceAccess::Write, PipelineStageBits::COMPUTE)],
    ));

    graph.register(raytracing(
        "ShadowRayTracing",
        "raytracing",
        vec![
            ResourceUsage::new("tlas", ResourceType::Ssbo, ResourceAccess::Read, PipelineStageBits::RAY_TRACING),
            ResourceUsage::new("rt_shadow_mask", ResourceType::ImageStorage, ResourceAccess::Write, PipelineStageBits::RAY_TRACING),
        ],
    ));

    graph.register(raytracing(
        "SpecularGI_RT",
        "raytracing",
        vec![
            ResourceUsage::new("tlas", ResourceType::Ssbo, ResourceAccess::Read, PipelineStageBits::RAY_TRACING),
            ResourceUsage::new("specular_gi", ResourceType::ImageStorage, ResourceAccess::Write, PipelineStageBits::RAY_TRACING),
        ],
    ));

    graph.register(compute(
        "SpecularGI_Mip",
        "raytracing",
        vec![ResourceUsage::new("specular_gi", ResourceType::ImageStorage, ResourceAccess::Write, PipelineStageBits::COMPUTE)],
    ));

    graph.register(compute(
        "SSAO",
        "post",
        vec![
            ResourceUsage::new("depth", ResourceType::SampledDepthTexture, ResourceAccess::Read, PipelineStageBits::COMPUTE),
            ResourceUsage::new("ssao", ResourceType::ImageStorage, ResourceAccess::Write, PipelineStageBits::COMPUTE),
        ],
    ));

    graph.register(compute(
        "SSAOBlur",
        "post",
        vec![ResourceUsage::new("ssao", ResourceType::ImageStorage, ResourceAccess::Write, PipelineStageBits::COMPUTE)],
    ));

    graph.register(compute(
        "DeferredLighting",
        "post",
        vec![
            ResourceUsage::new("gbuffer_color0", ResourceType::SampledTexture, ResourceAccess::Read, PipelineStageBits::COMPUTE),
            ResourceUsage::new("gbuffer_color1", ResourceType::SampledTexture, ResourceAccess::Read, PipelineStageBits::COMPUTE),
            ResourceUsage::new("gbuffer_color2", ResourceType::SampledTexture, ResourceAccess::Read, PipelineStageBits::COMPUTE),
            ResourceUsage::new("ssao", ResourceType::SampledTexture, ResourceAccess::Read, PipelineStageBits::COMPUTE),
            ResourceUsage::new("ddgi_atlas", ResourceType::SampledTexture, ResourceAccess::Read, PipelineStageBits::COMPUTE),
            ResourceUsage::new("specular_gi", ResourceType::SampledTexture, ResourceAccess::Read, PipelineStageBits::COMPUTE),
            ResourceUsage::new("rt_shadow_mask", ResourceType::SampledTexture, ResourceAccess::Read, PipelineStageBits::COMPUTE),
            ResourceUsage::new("hdr_color", ResourceType::ImageStorage, ResourceAccess::Write, PipelineStageBits::COMPUTE),
        ],
    ));

    graph.register(compute(
        "LuminanceHistogram",
        "tonemap",
        vec![
            ResourceUsage::new("hdr_color", ResourceType::SampledTexture, ResourceAccess::Read, PipelineStageBits::COMPUTE),
            ResourceUsage::new("luminance_histogram", ResourceType::Ssbo, ResourceAccess::Write, PipelineStageBits::COMPUTE),
        ],
    ));

    graph.register(compute(
        "LuminanceAverage",
        "tonemap",
        vec![
            ResourceUsage::new("luminance_histogram", ResourceType::Ssbo, ResourceAccess::Read, PipelineStageBits::COMPUTE),
            ResourceUsage::new("average_luminance", ResourceType::Ssbo, ResourceAccess::Write, PipelineStageBits::COMPUTE),
        ],
    ));

    graph.register(compute(
        "Bloom",
        "tonemap",
        vec![
            ResourceUsage::new("hdr_color", ResourceType::SampledTexture, ResourceAccess::Read, PipelineStageBits::COMPUTE),
            ResourceUsage::new("bloom", ResourceType::ImageStorage, ResourceAccess::Write, PipelineStageBits::COMPUTE),
        ],
    ));

    graph.register(compute(
        "FXAA",
        "tonemap",
        vec![
            ResourceUsage::new("hdr_color", ResourceType::SampledTexture, ResourceAccess::Read, PipelineStageBits::COMPUTE),
            ResourceUsage::new("bloom", ResourceType::SampledTexture, ResourceAccess::Read, PipelineStageBits::COMPUTE),
            ResourceUsage::new("average_luminance", ResourceType::Ssbo, ResourceAccess::Read, PipelineStageBits::COMPUTE),
            ResourceUsage::new("final_image_pp", ResourceType::ImageStorage, ResourceAccess::Write, PipelineStageBits::COMPUTE),
        ],
    ));

    graph.register(graphics(
        "DebugBS",
        "debug",
        vec![
            ResourceUsage::new("bounding_sphere_debug", ResourceType::Ssbo, ResourceAccess::Read, PipelineStageBits::VERTEX),
            ResourceUsage::new("final_image_pp", ResourceType::ColorAttachment, ResourceAccess::Write, PipelineStageBits::FRAGMENT),
        ],
    ));

    graph.register(graphics(
        "DebugView",
        "debug",
        vec![ResourceUsage::new("final_image_pp", ResourceType::ColorAttachment, ResourceAccess::Write, PipelineStageBits::FRAGMENT)],
    ));

    graph.register(graphics(
        "UI",
        "ui",
        vec![ResourceUsage::new("final_image_pp", ResourceType::ColorAttachment, ResourceAccess::Write, PipelineStageBits::FRAGMENT)],
    ));

    // Blit/copy `FinalImagePP` to the swap image.
    graph.register(transfer(
        "Presentation",
        "present",
        vec![
            ResourceUsage::new("final_image_pp", ResourceType::ImageTransferSrc, ResourceAccess::Read, PipelineStageBits::TRANSFER),
            ResourceUsage::new("swapchain_image", ResourceType::ImageTransferDst, ResourceAccess::Write, PipelineStageBits::TRANSFER),
        ],
    ));
}

/// Ordered pass names the default graph registers, used by tests and by the
/// orchestrator to assert the graph matches §4.10 even after barrier
/// computation has reordered independent passes arbitrarily within their
/// dependency constraints.
pub const DEFAULT_GRAPH_PASS_NAMES: &[&str] = &[
    "HiZ",
    "ParticleUpdate",
    "Cull",
    "CompactDraws",
    "Shadow",
    "GrassShadow",
    "Geometry",
    "Grass",
    "UpdateBlas",
    "UpdateTLAS",
    "IrradianceProbeTranslation",
    "IrradianceProbeRayTracing",
    "IrradianceProbeConvolve",
    "ShadowRayTracing",
    "SpecularGI_RT",
    "SpecularGI_Mip",
    "SSAO",
    "SSAOBlur",
    "DeferredLighting",
    "LuminanceHistogram",
    "LuminanceAverage",
    "Bloom",
    "FXAA",
    "DebugBS",
    "DebugView",
    "UI",
    "Presentation",
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_graph::FrameGraph;

    #[test]
    fn registering_the_default_graph_produces_one_pass_per_name() {
        let mut graph = FrameGraph::new();
        register_default_graph(&mut graph);
        let scheduled = graph.build();
        assert_eq!(scheduled.len(), DEFAULT_GRAPH_PASS_NAMES.len());
        for name in DEFAULT_GRAPH_PASS_NAMES {
            assert!(scheduled.iter().any(|p| p.name == *name), "missing pass {name}");
        }
    }

    #[test]
    fn cull_runs_before_compact_draws_which_runs_before_geometry() {
        let mut graph = FrameGraph::new();
        register_default_graph(&mut graph);
        let scheduled = graph.build();
        let pos = |name: &str| scheduled.iter().position(|p| p.name == name).unwrap();
        assert!(pos("Cull") < pos("CompactDraws"));
        assert!(pos("CompactDraws") < pos("Geometry"));
    }
}
