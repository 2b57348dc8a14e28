//! Frame graph (C9): passes declare the resources they read/write up front;
//! the graph topologically orders them, computes the minimal barrier between
//! each producer/consumer edge, and drives per-frame execution. Pass bodies
//! themselves live in [`crate::passes`] — this module only owns scheduling.

use ash::vk;
use std::collections::{HashMap, HashSet};

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PipelineStageBits: u32 {
        const INDIRECT_DRAW = 1 << 0;
        const VERTEX        = 1 << 1;
        const FRAGMENT      = 1 << 2;
        const COMPUTE       = 1 << 3;
        const RAY_TRACING   = 1 << 4;
        const TRANSFER      = 1 << 5;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineParams {
    Graphics,
    Compute,
    RayTracing,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceAccess {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    ColorAttachment,
    DepthAttachment,
    Ssbo,
    Ubo,
    SampledTexture,
    SampledDepthTexture,
    ImageStorage,
    ImageTransferSrc,
    ImageTransferDst,
}

impl ResourceType {
    /// Image layout a resource of this type is expected to be in while a
    /// pass uses it, per §4.9 step 3's layout-transition rule.
    pub fn expected_layout(self) -> Option<vk::ImageLayout> {
        match self {
            ResourceType::ColorAttachment => Some(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
            ResourceType::DepthAttachment => Some(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL),
            ResourceType::SampledTexture => Some(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
            ResourceType::SampledDepthTexture => Some(vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL),
            ResourceType::ImageStorage => Some(vk::ImageLayout::GENERAL),
            ResourceType::ImageTransferSrc => Some(vk::ImageLayout::TRANSFER_SRC_OPTIMAL),
            ResourceType::ImageTransferDst => Some(vk::ImageLayout::TRANSFER_DST_OPTIMAL),
            ResourceType::Ssbo | ResourceType::Ubo => None,
        }
    }

    fn default_stage_access(self, access: ResourceAccess) -> (vk::PipelineStageFlags2, vk::AccessFlags2) {
        use vk::AccessFlags2 as A;
        use vk::PipelineStageFlags2 as S;
        match (self, access) {
            (ResourceType::ColorAttachment, _) => (S::COLOR_ATTACHMENT_OUTPUT, A::COLOR_ATTACHMENT_WRITE),
            (ResourceType::DepthAttachment, ResourceAccess::Write) => {
                (S::LATE_FRAGMENT_TESTS, A::DEPTH_STENCIL_ATTACHMENT_WRITE)
            }
            (ResourceType::DepthAttachment, ResourceAccess::Read) => {
                (S::EARLY_FRAGMENT_TESTS, A::DEPTH_STENCIL_ATTACHMENT_READ)
            }
            (ResourceType::SampledTexture | ResourceType::SampledDepthTexture, _) => {
                (S::FRAGMENT_SHADER | S::COMPUTE_SHADER, A::SHADER_READ)
            }
            (ResourceType::ImageStorage, ResourceAccess::Read) => (S::COMPUTE_SHADER, A::SHADER_STORAGE_READ),
            (ResourceType::ImageStorage, ResourceAccess::Write) => (S::COMPUTE_SHADER, A::SHADER_STORAGE_WRITE),
            (ResourceType::ImageTransferSrc, _) => (S::TRANSFER, A::TRANSFER_READ),
            (ResourceType::ImageTransferDst, _) => (S::TRANSFER, A::TRANSFER_WRITE),
            (ResourceType::Ssbo, ResourceAccess::Read) => (S::VERTEX_SHADER | S::FRAGMENT_SHADER | S::COMPUTE_SHADER, A::SHADER_STORAGE_READ),
            (ResourceType::Ssbo, ResourceAccess::Write) => (S::COMPUTE_SHADER, A::SHADER_STORAGE_WRITE),
            (ResourceType::Ubo, _) => (S::VERTEX_SHADER | S::FRAGMENT_SHADER | S::COMPUTE_SHADER, A::UNIFORM_READ),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SamplerFlags {
    pub no_filter: bool,
    pub clamp_to_edge: bool,
    pub clamp_to_border: bool,
    pub max_reduction: bool,
}

#[derive(Debug, Clone)]
pub struct ResourceUsage {
    pub resource_name: String,
    pub ty: ResourceType,
    pub access: ResourceAccess,
    pub stage: PipelineStageBits,
    pub multi_buffered: bool,
    pub bindless: bool,
    pub sampler_flags: SamplerFlags,
    pub mip_range: Option<(u32, u32)>,
    pub array_index: Option<u32>,
}

impl ResourceUsage {
    pub fn new(resource_name: impl Into<String>, ty: ResourceType, access: ResourceAccess, stage: PipelineStageBits) -> Self {
        Self {
            resource_name: resource_name.into(),
            ty,
            access,
            stage,
            multi_buffered: false,
            bindless: false,
            sampler_flags: SamplerFlags::default(),
            mip_range: None,
            array_index: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderPassRegisterInfo {
    pub name: String,
    pub group: String,
    pub resource_usages: Vec<ResourceUsage>,
    pub pipeline_params: PipelineParams,
}

/// A computed barrier between one pass's use of a resource and the next.
#[derive(Debug, Clone, Copy)]
pub struct ResourceBarrier {
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
    pub old_layout: Option<vk::ImageLayout>,
    pub new_layout: Option<vk::ImageLayout>,
}

/// One scheduled step: the pass to run, plus the barriers that must be
/// emitted immediately before it runs.
pub struct ScheduledPass {
    pub name: String,
    pub barriers: Vec<(String, ResourceBarrier)>,
    pub pipeline_params: PipelineParams,
    pub resource_usages: Vec<ResourceUsage>,
}

pub struct FrameGraph {
    passes: Vec<RenderPassRegisterInfo>,
}

impl FrameGraph {
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    pub fn register(&mut self, pass: RenderPassRegisterInfo) {
        self.passes.push(pass);
    }

    /// Topologically order passes (registration order breaks ties) and
    /// compute the minimal barrier for every producer→consumer edge.
    pub fn build(&self) -> Vec<ScheduledPass> {
        let order = self.topological_order();
        let mut last_write: HashMap<String, (usize, vk::PipelineStageFlags2, vk::AccessFlags2, Option<vk::ImageLayout>)> = HashMap::new();
        let mut scheduled = Vec::with_capacity(order.len());

        for &pass_index in &order {
            let pass = &self.passes[pass_index];
            let mut barriers = Vec::new();

            for usage in &pass.resource_usages {
                let (stage, access) = usage.ty.default_stage_access(usage.access);
                let new_layout = usage.ty.expected_layout();

                if let Some(&(_, src_stage, src_access, old_layout)) = last_write.get(&usage.resource_name) {
                    if old_layout != new_layout || usage.access == ResourceAccess::Write {
                        barriers.push((
                            usage.resource_name.clone(),
                            ResourceBarrier {
                                src_stage,
                                src_access,
                                dst_stage: stage,
                                dst_access: access,
                                old_layout,
                                new_layout,
                            },
                        ));
                    }
                }

                if usage.access == ResourceAccess::Write {
                    last_write.insert(usage.resource_name.clone(), (pass_index, stage, access, new_layout));
                }
            }

            scheduled.push(ScheduledPass {
                name: pass.name.clone(),
                barriers,
                pipeline_params: pass.pipeline_params,
                resource_usages: pass.resource_usages.clone(),
            });
        }

        scheduled
    }

    /// Every distinct resource name registered across all passes, paired
    /// with the type it's declared as the first time a pass uses it. Sizes
    /// the [`crate::resources::TransientResourcePool`] before any pass runs.
    pub fn resource_types(&self) -> Vec<(String, ResourceType)> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for pass in &self.passes {
            for usage in &pass.resource_usages {
                if seen.insert(usage.resource_name.clone()) {
                    out.push((usage.resource_name.clone(), usage.ty));
                }
            }
        }
        out
    }

    /// Kahn's algorithm over the producer/consumer dependency graph implied
    /// by shared resource names; ties (no dependency either way) break by
    /// registration order, matching the spec's ordering rule exactly.
    fn topological_order(&self) -> Vec<usize> {
        let n = self.passes.len();
        let mut last_writer: HashMap<&str, usize> = HashMap::new();
        let mut edges: Vec<HashSet<usize>> = vec![HashSet::new(); n];
        let mut indegree = vec![0usize; n];

        for (i, pass) in self.passes.iter().enumerate() {
            for usage in &pass.resource_usages {
                if usage.access == ResourceAccess::Read {
                    if let Some(&writer) = last_writer.get(usage.resource_name.as_str()) {
                        if writer != i && edges[writer].insert(i) {
                            indegree[i] += 1;
                        }
                    }
                }
            }
            for usage in &pass.resource_usages {
                if usage.access == ResourceAccess::Write {
                    last_writer.insert(usage.resource_name.as_str(), i);
                }
            }
        }

        let mut ready: std::collections::BTreeSet<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);

        while let Some(&next) = ready.iter().next() {
            ready.remove(&next);
            order.push(next);
            for &dependent in &edges[next] {
                indegree[dependent] -= 1;
                if indegree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        order
    }
}

impl Default for FrameGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(name: &str, access: ResourceAccess) -> ResourceUsage {
        ResourceUsage::new(name, ResourceType::Ssbo, access, PipelineStageBits::COMPUTE)
    }

    #[test]
    fn passes_with_no_shared_resources_keep_registration_order() {
        let mut graph = FrameGraph::new();
        graph.register(RenderPassRegisterInfo { name: "A".into(), group: "g".into(), resource_usages: vec![], pipeline_params: PipelineParams::Compute });
        graph.register(RenderPassRegisterInfo { name: "B".into(), group: "g".into(), resource_usages: vec![], pipeline_params: PipelineParams::Compute });
        let scheduled = graph.build();
        assert_eq!(scheduled.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(), vec!["A", "B"]);
    }

    #[test]
    fn a_consumer_is_ordered_after_its_producer() {
        let mut graph = FrameGraph::new();
        graph.register(RenderPassRegisterInfo {
            name: "Consumer".into(),
            group: "g".into(),
            resource_usages: vec![usage("draws", ResourceAccess::Read)],
            pipeline_params: PipelineParams::Compute,
        });
        graph.register(RenderPassRegisterInfo {
            name: "Producer".into(),
            group: "g".into(),
            resource_usages: vec![usage("draws", ResourceAccess::Write)],
            pipeline_params: PipelineParams::Compute,
        });
        let scheduled = graph.build();
        let producer_pos = scheduled.iter().position(|p| p.name == "Producer").unwrap();
        let consumer_pos = scheduled.iter().position(|p| p.name == "Consumer").unwrap();
        assert!(producer_pos < consumer_pos);
    }

    #[test]
    fn a_read_after_write_edge_emits_a_barrier() {
        let mut graph = FrameGraph::new();
        graph.register(RenderPassRegisterInfo {
            name: "Producer".into(),
            group: "g".into(),
            resource_usages: vec![usage("draws", ResourceAccess::Write)],
            pipeline_params: PipelineParams::Compute,
        });
        graph.register(RenderPassRegisterInfo {
            name: "Consumer".into(),
            group: "g".into(),
            resource_usages: vec![usage("draws", ResourceAccess::Read)],
            pipeline_params: PipelineParams::Compute,
        });
        let scheduled = graph.build();
        let consumer = scheduled.iter().find(|p| p.name == "Consumer").unwrap();
        assert_eq!(consumer.barriers.len(), 1);
        assert_eq!(consumer.barriers[0].0, "draws");
    }
}
