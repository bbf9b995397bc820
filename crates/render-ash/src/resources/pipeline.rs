use std::sync::Arc;

use ash::vk;
use forge_render::{
    descriptor::{DescriptorSetLayoutDesc, ShaderStages},
    format::TextureAspects,
    pipeline::{
        DepthStateDesc, GraphicsPipelineState, PipelineCacheFlags, PolygonMode, PrimitiveTopology,
        RasterizerStateDesc,
    },
    utils::hash::RunningHash,
    MAX_DESCRIPTOR_SETS, MAX_RENDER_TARGET_ATTACHMENTS,
};
use tracing::{debug, warn};

use super::Shader;
use crate::{
    cache::{PipelineLayoutEntry, ThreadContext},
    convert::{stencil_op_state, VkInto},
    descriptor::get_or_add_set_layout,
    device::AshDevice,
    render_pass::{get_or_add_render_pass, RenderPassKey},
    Error, Result,
};

/// Bind point of a pipeline layout used by `stages`.
pub(crate) fn bind_point_for_stages(stages: ShaderStages) -> vk::PipelineBindPoint {
    if stages.contains(ShaderStages::RAYTRACING) {
        vk::PipelineBindPoint::RAY_TRACING_KHR
    } else if stages == ShaderStages::COMPUTE {
        vk::PipelineBindPoint::COMPUTE
    } else {
        vk::PipelineBindPoint::GRAPHICS
    }
}

/// Stages and size of the single push-constant range covering all root constants.
pub(crate) fn push_constant_range<'a>(
    sets: impl IntoIterator<Item = &'a DescriptorSetLayoutDesc>,
) -> (ShaderStages, u32) {
    let mut stages = ShaderStages::empty();
    let mut size = 0;
    for set in sets {
        for constant in set.root_constants() {
            stages |= constant.stages;
            size = size.max(constant.count);
        }
    }
    (stages, size)
}

/// Pipeline layout over [`MAX_DESCRIPTOR_SETS`] sets.
///
/// Unused set indices are filled with the shared empty layout.
#[derive(Clone, Debug)]
pub struct PipelineLayout {
    entry: PipelineLayoutEntry,
    set_descs: [Option<DescriptorSetLayoutDesc>; MAX_DESCRIPTOR_SETS],
    bind_point: vk::PipelineBindPoint,
}

impl PipelineLayout {
    #[inline]
    pub fn hash(&self) -> u64 {
        self.entry.hash
    }

    #[inline]
    pub(crate) fn raw(&self) -> vk::PipelineLayout {
        self.entry.layout
    }

    #[inline]
    pub(crate) fn bind_point(&self) -> vk::PipelineBindPoint {
        self.bind_point
    }

    #[inline]
    pub fn set_desc(&self, index: usize) -> Option<&DescriptorSetLayoutDesc> {
        self.set_descs.get(index)?.as_ref()
    }

    #[inline]
    pub(crate) fn fixed_sets(&self) -> &[vk::DescriptorSet; MAX_DESCRIPTOR_SETS] {
        &self.entry.fixed_sets
    }

    #[inline]
    pub(crate) fn push_constant_stages(&self) -> vk::ShaderStageFlags {
        self.entry.push_constant_stages
    }

    #[inline]
    pub fn push_constant_size(&self) -> u32 {
        self.entry.push_constant_size
    }
}

/// Returns the cached pipeline layout for `sets`, indexed by set number.
pub(crate) fn get_or_add_pipeline_layout(
    ctx: &ThreadContext,
    sets: &[Option<&DescriptorSetLayoutDesc>],
) -> Result<PipelineLayout> {
    if sets.len() > MAX_DESCRIPTOR_SETS {
        return Err(Error::InvalidDesc("too many descriptor sets"));
    }
    let device = ctx.device();
    let empty = DescriptorSetLayoutDesc::default();
    let set_descs: [Option<DescriptorSetLayoutDesc>; MAX_DESCRIPTOR_SETS] =
        std::array::from_fn(|i| sets.get(i).copied().flatten().cloned());

    let mut set_layouts = [vk::DescriptorSetLayout::null(); MAX_DESCRIPTOR_SETS];
    let mut fixed_sets = [vk::DescriptorSet::null(); MAX_DESCRIPTOR_SETS];
    let mut hash = RunningHash::new();
    for (i, desc) in set_descs.iter().enumerate() {
        let desc = desc.as_ref().unwrap_or(&empty);
        let entry = get_or_add_set_layout(ctx, desc)?;
        set_layouts[i] = entry.layout;
        if desc.bindings().next().is_none() || desc.is_static_samplers_only() {
            fixed_sets[i] = device.internal_descriptor_set(&entry)?;
        }
        hash.add(&entry.hash);
    }

    let (constant_stages, constant_size) = push_constant_range(set_descs.iter().flatten());
    hash.add(&constant_stages).add(&constant_size);
    let push_constant_stages: vk::ShaderStageFlags = constant_stages.vk_into();
    let hash = hash.finish();

    let entry = ctx.pipeline_layout(hash, || {
        let ranges = [vk::PushConstantRange {
            stage_flags: push_constant_stages,
            offset: 0,
            size: constant_size,
        }];
        let mut create_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(&set_layouts);
        if constant_size > 0 {
            create_info = create_info.push_constant_ranges(&ranges);
        }
        let layout = unsafe { device.create::<vk::PipelineLayout>(&create_info)? };
        debug!("pipeline layout {:016x}", hash);
        Ok(PipelineLayoutEntry {
            hash,
            layout: layout.take(),
            set_layouts,
            fixed_sets,
            push_constant_stages,
            push_constant_size: constant_size,
        })
    })?;

    let stages = set_descs
        .iter()
        .flatten()
        .flat_map(|d| d.descriptors.iter())
        .fold(ShaderStages::empty(), |acc, d| acc | d.stages);
    Ok(PipelineLayout {
        entry,
        set_descs,
        bind_point: bind_point_for_stages(stages),
    })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineCacheDesc<'a> {
    /// Blob previously returned by [`PipelineCache::data`].
    pub data: Option<&'a [u8]>,
    /// `EXTERNALLY_SYNCHRONIZED` needs `VK_EXT_pipeline_creation_cache_control`
    /// and is ignored on this backend.
    pub flags: PipelineCacheFlags,
}

pub struct PipelineCache {
    device: Arc<AshDevice>,
    raw: vk::PipelineCache,
}

impl PipelineCache {
    pub(crate) fn new(device: &Arc<AshDevice>, desc: &PipelineCacheDesc<'_>) -> Result<Self> {
        let mut create_info = vk::PipelineCacheCreateInfo::builder();
        if let Some(data) = desc.data {
            create_info = create_info.initial_data(data);
        }
        let raw = unsafe { device.create::<vk::PipelineCache>(&create_info)?.take() };
        Ok(Self {
            device: device.clone(),
            raw,
        })
    }

    #[inline]
    pub(crate) fn raw(&self) -> vk::PipelineCache {
        self.raw
    }

    /// Serialized cache content, to be passed to a later [`PipelineCacheDesc`].
    pub fn data(&self) -> Result<Vec<u8>> {
        Ok(unsafe { self.device.get_pipeline_cache_data(self.raw)? })
    }
}

impl Drop for PipelineCache {
    fn drop(&mut self) {
        unsafe { self.device.destroy(self.raw) }
    }
}

pub struct GraphicsPipelineDesc<'a> {
    pub shader: &'a Shader,
    pub layout: &'a PipelineLayout,
    pub state: &'a GraphicsPipelineState,
    pub cache: Option<&'a PipelineCache>,
    pub name: Option<&'a str>,
}

pub struct ComputePipelineDesc<'a> {
    pub shader: &'a Shader,
    pub layout: &'a PipelineLayout,
    pub cache: Option<&'a PipelineCache>,
    pub name: Option<&'a str>,
}

pub enum PipelineDesc<'a> {
    Graphics(GraphicsPipelineDesc<'a>),
    Compute(ComputePipelineDesc<'a>),
}

/// Polygon mode used for `mode`; non-solid modes need `fillModeNonSolid`.
pub(crate) fn effective_polygon_mode(mode: PolygonMode, non_solid_supported: bool) -> vk::PolygonMode {
    if mode != PolygonMode::Fill && !non_solid_supported {
        warn!("fill mode {:?} not supported, falling back to solid fill", mode);
        return vk::PolygonMode::FILL;
    }
    mode.vk_into()
}

const DYNAMIC_STATES: [vk::DynamicState; 5] = [
    vk::DynamicState::VIEWPORT,
    vk::DynamicState::SCISSOR,
    vk::DynamicState::BLEND_CONSTANTS,
    vk::DynamicState::DEPTH_BOUNDS,
    vk::DynamicState::STENCIL_REFERENCE,
];

fn shader_stage_infos(
    shader: &Shader,
    spec: Option<&vk::SpecializationInfo>,
) -> Vec<vk::PipelineShaderStageCreateInfo> {
    shader
        .modules()
        .iter()
        .map(|m| {
            let mut info = vk::PipelineShaderStageCreateInfo::builder()
                .stage(m.stage)
                .module(m.module)
                .name(m.entry_point.as_c_str());
            if let Some(spec) = spec {
                info = info.specialization_info(spec);
            }
            info.build()
        })
        .collect()
}

fn rasterization_info(
    rasterizer: &RasterizerStateDesc,
    non_solid_supported: bool,
) -> vk::PipelineRasterizationStateCreateInfo {
    vk::PipelineRasterizationStateCreateInfo::builder()
        .depth_clamp_enable(rasterizer.depth_clamp)
        .rasterizer_discard_enable(false)
        .polygon_mode(effective_polygon_mode(rasterizer.fill_mode, non_solid_supported))
        .cull_mode(rasterizer.cull_mode.vk_into())
        .front_face(rasterizer.front_face.vk_into())
        .depth_bias_enable(rasterizer.depth_bias != 0 || rasterizer.slope_scaled_depth_bias != 0.0)
        .depth_bias_constant_factor(rasterizer.depth_bias as f32)
        .depth_bias_slope_factor(rasterizer.slope_scaled_depth_bias)
        .line_width(1.0)
        .build()
}

fn depth_stencil_info(depth: &DepthStateDesc) -> vk::PipelineDepthStencilStateCreateInfo {
    vk::PipelineDepthStencilStateCreateInfo::builder()
        .depth_test_enable(depth.depth_test)
        .depth_write_enable(depth.depth_write)
        .depth_compare_op(depth.depth_func.vk_into())
        .depth_bounds_test_enable(false)
        .stencil_test_enable(depth.stencil_test)
        .front(stencil_op_state(
            &depth.front,
            depth.stencil_read_mask,
            depth.stencil_write_mask,
        ))
        .back(stencil_op_state(
            &depth.back,
            depth.stencil_read_mask,
            depth.stencil_write_mask,
        ))
        .min_depth_bounds(0.0)
        .max_depth_bounds(1.0)
        .build()
}

fn blend_attachments(state: &GraphicsPipelineState) -> Vec<vk::PipelineColorBlendAttachmentState> {
    let blend = state.blend.unwrap_or_default();
    (0..state.color_formats.len())
        .map(|i| {
            let target = blend.target(i);
            let mut attachment = vk::PipelineColorBlendAttachmentState::builder()
                .color_write_mask(target.write_mask.vk_into());
            if let Some(b) = target.blend {
                attachment = attachment
                    .blend_enable(true)
                    .src_color_blend_factor(b.color.src_factor.vk_into())
                    .dst_color_blend_factor(b.color.dst_factor.vk_into())
                    .color_blend_op(b.color.operation.vk_into())
                    .src_alpha_blend_factor(b.alpha.src_factor.vk_into())
                    .dst_alpha_blend_factor(b.alpha.dst_factor.vk_into())
                    .alpha_blend_op(b.alpha.operation.vk_into());
            }
            attachment.build()
        })
        .collect()
}

fn vertex_input(
    state: &GraphicsPipelineState,
) -> (
    Vec<vk::VertexInputBindingDescription>,
    Vec<vk::VertexInputAttributeDescription>,
) {
    let Some(layout) = &state.vertex_layout else {
        return (Vec::new(), Vec::new());
    };
    let bindings = layout
        .bindings
        .iter()
        .enumerate()
        .map(|(i, b)| vk::VertexInputBindingDescription {
            binding: i as u32,
            stride: layout.stride(i as u32),
            input_rate: b.step_mode.vk_into(),
        })
        .collect();
    let attribs = layout
        .attribs
        .iter()
        .map(|a| vk::VertexInputAttributeDescription {
            location: a.location,
            binding: a.binding,
            format: a.format.vk_into(),
            offset: a.offset,
        })
        .collect();
    (bindings, attribs)
}

unsafe fn create_graphics_pipeline(
    ctx: &ThreadContext,
    desc: &GraphicsPipelineDesc<'_>,
) -> Result<vk::Pipeline> {
    let device = ctx.device();
    let state = desc.state;
    if !desc.shader.stages().contains(ShaderStages::VERTEX)
        || desc.shader.stages().contains(ShaderStages::COMPUTE)
    {
        return Err(Error::InvalidDesc("graphics pipeline needs a vertex shader"));
    }
    if state.color_formats.len() > MAX_RENDER_TARGET_ATTACHMENTS {
        return Err(Error::InvalidDesc("too many color attachments"));
    }

    let spec = desc.shader.specialization_info();
    let stages = shader_stage_infos(desc.shader, spec.as_ref());
    let (vertex_bindings, vertex_attribs) = vertex_input(state);
    let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
        .vertex_binding_descriptions(&vertex_bindings)
        .vertex_attribute_descriptions(&vertex_attribs);
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
        .topology(state.topology.vk_into())
        .primitive_restart_enable(false);
    let tessellation = vk::PipelineTessellationStateCreateInfo::builder()
        .patch_control_points(state.patch_control_points.max(1));
    let viewport = vk::PipelineViewportStateCreateInfo::builder()
        .viewport_count(1)
        .scissor_count(1);
    let rasterization = rasterization_info(
        &state.rasterizer.unwrap_or_default(),
        device.features().fill_mode_non_solid,
    );
    let blend = state.blend.unwrap_or_default();
    let multisample = vk::PipelineMultisampleStateCreateInfo::builder()
        .rasterization_samples(state.sample_count.vk_into())
        .sample_shading_enable(false)
        .alpha_to_coverage_enable(blend.alpha_to_coverage);
    let depth_stencil = depth_stencil_info(&state.depth.unwrap_or_default());
    let attachments = blend_attachments(state);
    let color_blend = vk::PipelineColorBlendStateCreateInfo::builder()
        .logic_op_enable(false)
        .attachments(&attachments);
    let dynamic = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&DYNAMIC_STATES);

    let color_formats: Vec<vk::Format> = state.color_formats.iter().map(|f| f.vk_into()).collect();
    let (depth_format, stencil_format) = match state.depth_stencil_format {
        Some(format) => {
            let aspects = format.aspects();
            let vk_format: vk::Format = format.vk_into();
            (
                if aspects.contains(TextureAspects::DEPTH) {
                    vk_format
                } else {
                    vk::Format::UNDEFINED
                },
                if aspects.contains(TextureAspects::STENCIL) {
                    vk_format
                } else {
                    vk::Format::UNDEFINED
                },
            )
        }
        None => (vk::Format::UNDEFINED, vk::Format::UNDEFINED),
    };
    let render_pass_key = RenderPassKey::for_pipeline(state);
    let mut rendering = vk::PipelineRenderingCreateInfo::builder()
        .view_mask(render_pass_key.view_mask())
        .color_attachment_formats(&color_formats)
        .depth_attachment_format(depth_format)
        .stencil_attachment_format(stencil_format);

    let mut create_info = vk::GraphicsPipelineCreateInfo::builder()
        .stages(&stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport)
        .rasterization_state(&rasterization)
        .multisample_state(&multisample)
        .depth_stencil_state(&depth_stencil)
        .color_blend_state(&color_blend)
        .dynamic_state(&dynamic)
        .layout(desc.layout.raw());
    if state.topology == PrimitiveTopology::PatchList {
        create_info = create_info.tessellation_state(&tessellation);
    }
    if device.uses_dynamic_rendering() {
        create_info = create_info.push_next(&mut rendering);
    } else {
        let render_pass = get_or_add_render_pass(ctx, &render_pass_key)?;
        create_info = create_info.render_pass(render_pass).subpass(0);
    }

    let cache = desc.cache.map_or(vk::PipelineCache::null(), PipelineCache::raw);
    let pipelines = unsafe {
        device
            .create_graphics_pipelines(cache, &[create_info.build()], None)
            .map_err(|(_, e)| e)?
    };
    pipelines
        .into_iter()
        .next()
        .ok_or(Error::VkError(vk::Result::ERROR_UNKNOWN))
}

unsafe fn create_compute_pipeline(
    device: &AshDevice,
    desc: &ComputePipelineDesc<'_>,
) -> Result<vk::Pipeline> {
    if desc.shader.stages() != ShaderStages::COMPUTE {
        return Err(Error::InvalidDesc("compute pipeline needs exactly a compute shader"));
    }
    let spec = desc.shader.specialization_info();
    let stage = shader_stage_infos(desc.shader, spec.as_ref())
        .into_iter()
        .next()
        .ok_or(Error::InvalidDesc("compute pipeline needs exactly a compute shader"))?;
    let create_info = vk::ComputePipelineCreateInfo::builder()
        .stage(stage)
        .layout(desc.layout.raw());
    let cache = desc.cache.map_or(vk::PipelineCache::null(), PipelineCache::raw);
    let pipelines = unsafe {
        device
            .create_compute_pipelines(cache, &[create_info.build()], None)
            .map_err(|(_, e)| e)?
    };
    pipelines
        .into_iter()
        .next()
        .ok_or(Error::VkError(vk::Result::ERROR_UNKNOWN))
}

pub struct Pipeline {
    device: Arc<AshDevice>,
    raw: vk::Pipeline,
    bind_point: vk::PipelineBindPoint,
    layout: PipelineLayout,
}

impl Pipeline {
    pub(crate) fn new(ctx: &ThreadContext, desc: &PipelineDesc<'_>) -> Result<Self> {
        let device = ctx.device();
        let (raw, bind_point, layout, name) = match desc {
            PipelineDesc::Graphics(d) => (
                unsafe { create_graphics_pipeline(ctx, d)? },
                vk::PipelineBindPoint::GRAPHICS,
                d.layout,
                d.name,
            ),
            PipelineDesc::Compute(d) => (
                unsafe { create_compute_pipeline(device, d)? },
                vk::PipelineBindPoint::COMPUTE,
                d.layout,
                d.name,
            ),
        };
        if let Some(name) = name {
            unsafe { device.object_name(raw, name) };
        }
        Ok(Self {
            device: device.clone(),
            raw,
            bind_point,
            layout: layout.clone(),
        })
    }

    #[inline]
    pub(crate) fn raw(&self) -> vk::Pipeline {
        self.raw
    }

    #[inline]
    pub(crate) fn bind_point(&self) -> vk::PipelineBindPoint {
        self.bind_point
    }

    #[inline]
    pub fn layout(&self) -> &PipelineLayout {
        &self.layout
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe { self.device.destroy(self.raw) }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("raw", &self.raw)
            .field("bind_point", &self.bind_point)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use forge_render::descriptor::{DescriptorInfo, DescriptorType};

    use super::*;

    #[test]
    fn test_bind_point_for_stages() {
        assert_eq!(
            vk::PipelineBindPoint::COMPUTE,
            bind_point_for_stages(ShaderStages::COMPUTE)
        );
        assert_eq!(
            vk::PipelineBindPoint::GRAPHICS,
            bind_point_for_stages(ShaderStages::VERTEX | ShaderStages::FRAGMENT)
        );
        assert_eq!(
            vk::PipelineBindPoint::GRAPHICS,
            bind_point_for_stages(ShaderStages::empty())
        );
        assert_eq!(
            vk::PipelineBindPoint::RAY_TRACING_KHR,
            bind_point_for_stages(ShaderStages::RAYTRACING | ShaderStages::COMPUTE)
        );
    }

    #[test]
    fn test_push_constant_range_spans_all_root_constants() {
        let set0 = DescriptorSetLayoutDesc::new(vec![
            DescriptorInfo::new("constants", DescriptorType::ROOT_CONSTANT, 0, ShaderStages::VERTEX)
                .with_count(16),
            DescriptorInfo::new("tex", DescriptorType::TEXTURE, 1, ShaderStages::FRAGMENT),
        ]);
        let set3 = DescriptorSetLayoutDesc::new(vec![DescriptorInfo::new(
            "more",
            DescriptorType::ROOT_CONSTANT,
            0,
            ShaderStages::FRAGMENT,
        )
        .with_count(64)]);
        let (stages, size) = push_constant_range([&set0, &set3]);
        assert_eq!(ShaderStages::VERTEX | ShaderStages::FRAGMENT, stages);
        assert_eq!(64, size);
        assert_eq!((ShaderStages::empty(), 0), push_constant_range([]));
    }

    #[test]
    fn test_non_solid_fill_falls_back() {
        assert_eq!(
            vk::PolygonMode::FILL,
            effective_polygon_mode(PolygonMode::Line, false)
        );
        assert_eq!(
            vk::PolygonMode::LINE,
            effective_polygon_mode(PolygonMode::Line, true)
        );
    }

    #[test]
    fn test_blend_attachments_follow_color_targets() {
        let state = GraphicsPipelineState {
            color_formats: vec![
                forge_render::format::TextureFormat::Rgba8Unorm,
                forge_render::format::TextureFormat::Rgba16Float,
            ],
            ..Default::default()
        };
        let attachments = blend_attachments(&state);
        assert_eq!(2, attachments.len());
        assert_eq!(vk::FALSE, attachments[1].blend_enable);
        assert_eq!(
            vk::ColorComponentFlags::R
                | vk::ColorComponentFlags::G
                | vk::ColorComponentFlags::B
                | vk::ColorComponentFlags::A,
            attachments[0].color_write_mask
        );
    }

    #[test]
    fn test_depth_bias_enables_only_when_set() {
        let info = rasterization_info(&RasterizerStateDesc::DEFAULT, true);
        assert_eq!(vk::FALSE, info.depth_bias_enable);
        let biased = RasterizerStateDesc {
            depth_bias: 2,
            ..RasterizerStateDesc::DEFAULT
        };
        assert_eq!(vk::TRUE, rasterization_info(&biased, true).depth_bias_enable);
    }
}
