use std::sync::Arc;

use ash::vk;
use crossbeam_queue::SegQueue;
use forge_render::{
    commands::{IndirectArgumentType, LoadActionsDesc, QueryType},
    format::TextureFormat,
    pipeline::IndexFormat,
    state::{CmdPoolDesc, QueueType, ResourceState},
    MAX_DESCRIPTOR_SETS, MAX_RENDER_TARGET_ATTACHMENTS,
};
use tracing::{debug, warn};

use crate::{
    barrier::{to_access_flags, to_pipeline_stage_flags, transition, StageCaps},
    cache::ThreadContext,
    convert::{plane_aspect, VkInto},
    descriptor::DescriptorSet,
    device::AshDevice,
    queue::Queue,
    render_pass::{
        framebuffer_hash, get_or_add_framebuffer, get_or_add_render_pass, store_op,
        AttachmentIdentity, ColorAttachmentKey, DepthStencilAttachmentKey, RenderPassKey,
    },
    resources::{Buffer, Pipeline, PipelineLayout, QueryPool, RenderTarget, Texture},
    Error, Result,
};

/// Maximum number of barriers recorded by one [`Cmd::resource_barrier`] call.
pub const MAX_BARRIERS: usize = 64;

/// Shape of the argument records of an indirect buffer.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct CommandSignatureDesc {
    pub argument_type: IndirectArgumentType,
    /// Byte stride between records; `0` for tightly packed records.
    pub stride: u32,
}

impl CommandSignatureDesc {
    #[inline]
    pub const fn new(argument_type: IndirectArgumentType) -> Self {
        Self {
            argument_type,
            stride: 0,
        }
    }

    #[inline]
    pub fn stride(&self) -> u32 {
        if self.stride == 0 {
            self.argument_type.stride()
        } else {
            self.stride
        }
    }
}

/// How an indirect command is recorded.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum IndirectPath {
    /// One native call for all records.
    Native,
    /// One native call reading the record count from a buffer.
    CountBuffer,
    /// One native call per record.
    Loop,
}

pub(crate) fn indirect_path(
    argument_type: IndirectArgumentType,
    max_count: u32,
    has_count_buffer: bool,
    multi_draw_indirect: bool,
    draw_indirect_count: bool,
) -> IndirectPath {
    match argument_type {
        IndirectArgumentType::Dispatch if max_count <= 1 => IndirectPath::Native,
        IndirectArgumentType::Dispatch => IndirectPath::Loop,
        _ if has_count_buffer && draw_indirect_count => IndirectPath::CountBuffer,
        _ if max_count <= 1 || multi_draw_indirect => IndirectPath::Native,
        _ => IndirectPath::Loop,
    }
}

/// Selects one mip level and array layer of a texture.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Subresource {
    pub mip_level: u32,
    pub array_layer: u32,
}

pub struct BufferBarrier<'a> {
    pub buffer: &'a Buffer,
    pub current_state: ResourceState,
    pub new_state: ResourceState,
}

pub struct TextureBarrier<'a> {
    pub texture: &'a Texture,
    pub current_state: ResourceState,
    pub new_state: ResourceState,
    /// Transitions a single subresource instead of the whole texture.
    pub subresource: Option<Subresource>,
}

pub struct RenderTargetBarrier<'a> {
    pub render_target: &'a RenderTarget,
    pub current_state: ResourceState,
    pub new_state: ResourceState,
    pub subresource: Option<Subresource>,
}

/// Native barriers of one `resource_barrier` call.
#[derive(Default)]
pub(crate) struct BarrierBatch {
    pub memory: Option<vk::MemoryBarrier>,
    pub buffers: Vec<vk::BufferMemoryBarrier>,
    pub images: Vec<vk::ImageMemoryBarrier>,
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
}

impl BarrierBatch {
    fn add_access(&mut self, src: vk::AccessFlags, dst: vk::AccessFlags) {
        self.src_access |= src;
        self.dst_access |= dst;
    }

    pub fn push_buffer(&mut self, buffer: vk::Buffer, old: ResourceState, new: ResourceState) {
        let t = transition(old, new);
        if t.is_uav_barrier() {
            // storage hazards of buffers only need a global memory dependency
            let memory = self.memory.get_or_insert_with(vk::MemoryBarrier::default);
            memory.src_access_mask |= t.src_access;
            memory.dst_access_mask |= t.dst_access;
        } else {
            self.buffers.push(
                vk::BufferMemoryBarrier::builder()
                    .buffer(buffer)
                    .offset(0)
                    .size(vk::WHOLE_SIZE)
                    .src_access_mask(t.src_access)
                    .dst_access_mask(t.dst_access)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .build(),
            );
        }
        self.add_access(t.src_access, t.dst_access);
    }

    pub fn push_image(
        &mut self,
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
        subresource: Option<Subresource>,
        old: ResourceState,
        new: ResourceState,
    ) {
        let t = transition(old, new);
        let range = match subresource {
            Some(s) => vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: s.mip_level,
                level_count: 1,
                base_array_layer: s.array_layer,
                layer_count: 1,
            },
            None => vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: vk::REMAINING_MIP_LEVELS,
                base_array_layer: 0,
                layer_count: vk::REMAINING_ARRAY_LAYERS,
            },
        };
        self.images.push(
            vk::ImageMemoryBarrier::builder()
                .image(image)
                .subresource_range(range)
                .src_access_mask(t.src_access)
                .dst_access_mask(t.dst_access)
                .old_layout(t.old_layout)
                .new_layout(t.new_layout)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .build(),
        );
        self.add_access(t.src_access, t.dst_access);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.memory.is_none() && self.buffers.is_empty() && self.images.is_empty()
    }

    pub fn stages(
        &self,
        queue_type: QueueType,
        caps: &StageCaps,
    ) -> (vk::PipelineStageFlags, vk::PipelineStageFlags) {
        (
            to_pipeline_stage_flags(self.src_access, queue_type, caps),
            to_pipeline_stage_flags(self.dst_access, queue_type, caps),
        )
    }
}

/// Layout of the source data of one texture upload or readback.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct SubresourceDataDesc {
    /// Byte offset of the data in the staging buffer.
    pub src_offset: u64,
    pub mip_level: u32,
    pub array_layer: u32,
    /// Bytes per row; `0` for tightly packed rows.
    pub row_pitch: u32,
    /// Bytes per depth slice; `0` for tightly packed slices.
    pub slice_pitch: u32,
}

/// Row length in texels of a row of `row_pitch` bytes, `0` when packed.
pub(crate) fn row_length_texels(format: TextureFormat, row_pitch: u32) -> u32 {
    if row_pitch == 0 {
        return 0;
    }
    if let Some((block_bytes, edge)) = format.block_info() {
        row_pitch / block_bytes * edge
    } else {
        format
            .bytes_per_pixel()
            .map_or(0, |bytes| row_pitch / u32::from(bytes))
    }
}

/// Copy regions between a buffer and one subresource.
///
/// Multi-planar formats get one region per plane, with the planes packed
/// one after the other.
pub(crate) fn copy_regions(
    format: TextureFormat,
    aspect: vk::ImageAspectFlags,
    extent: (u32, u32, u32),
    desc: &SubresourceDataDesc,
) -> Vec<vk::BufferImageCopy> {
    let mip = desc.mip_level;
    let width = (extent.0 >> mip).max(1);
    let height = (extent.1 >> mip).max(1);
    let depth = (extent.2 >> mip).max(1);

    if format.is_planar() {
        let mut offset = desc.src_offset;
        return (0..format.plane_count())
            .map(|plane| {
                let (plane_width, plane_height) = format.plane_extent(plane, width, height);
                let region = vk::BufferImageCopy {
                    buffer_offset: offset,
                    buffer_row_length: 0,
                    buffer_image_height: 0,
                    image_subresource: vk::ImageSubresourceLayers {
                        aspect_mask: plane_aspect(plane),
                        mip_level: mip,
                        base_array_layer: desc.array_layer,
                        layer_count: 1,
                    },
                    image_offset: vk::Offset3D::default(),
                    image_extent: vk::Extent3D {
                        width: plane_width,
                        height: plane_height,
                        depth: 1,
                    },
                };
                offset += u64::from(plane_width)
                    * u64::from(plane_height)
                    * u64::from(format.plane_bytes_per_texel(plane));
                region
            })
            .collect();
    }

    // buffer copies address depth and stencil separately
    let aspect = if aspect.contains(vk::ImageAspectFlags::DEPTH) {
        vk::ImageAspectFlags::DEPTH
    } else {
        aspect
    };
    let row_length = row_length_texels(format, desc.row_pitch);
    let image_height = if desc.row_pitch > 0 && desc.slice_pitch > 0 {
        let edge = format.block_info().map_or(1, |(_, edge)| edge);
        desc.slice_pitch / desc.row_pitch * edge
    } else {
        0
    };
    vec![vk::BufferImageCopy {
        buffer_offset: desc.src_offset,
        buffer_row_length: row_length,
        buffer_image_height: image_height,
        image_subresource: vk::ImageSubresourceLayers {
            aspect_mask: aspect,
            mip_level: mip,
            base_array_layer: desc.array_layer,
            layer_count: 1,
        },
        image_offset: vk::Offset3D::default(),
        image_extent: vk::Extent3D {
            width,
            height,
            depth,
        },
    }]
}

/// One attachment of a [`BindRenderTargetsDesc`].
#[derive(Copy, Clone)]
pub struct RenderTargetBinding<'a> {
    pub target: &'a RenderTarget,
    pub mip_slice: Option<u32>,
    pub array_slice: Option<u32>,
}

impl<'a> RenderTargetBinding<'a> {
    #[inline]
    pub fn new(target: &'a RenderTarget) -> Self {
        Self {
            target,
            mip_slice: None,
            array_slice: None,
        }
    }

    fn identity(&self) -> AttachmentIdentity {
        AttachmentIdentity {
            resource_id: self.target.id(),
            mip_slice: self.mip_slice,
            array_slice: self.array_slice,
        }
    }

    fn view(&self) -> Result<vk::ImageView> {
        self.target.attachment_view(self.mip_slice, self.array_slice)
    }

    fn resolve_view(&self) -> Result<vk::ImageView> {
        self.target
            .resolve_target()
            .ok_or(Error::InvalidDesc("resolve store action without resolve target"))?
            .attachment_view(self.mip_slice, self.array_slice)
    }
}

#[derive(Copy, Clone, Default)]
pub struct BindRenderTargetsDesc<'a> {
    pub render_targets: &'a [RenderTargetBinding<'a>],
    pub depth_stencil: Option<RenderTargetBinding<'a>>,
    pub load_actions: LoadActionsDesc,
}

impl BindRenderTargetsDesc<'_> {
    fn first(&self) -> Option<&RenderTargetBinding<'_>> {
        self.render_targets.first().or(self.depth_stencil.as_ref())
    }

    fn render_pass_key(&self) -> RenderPassKey {
        let actions = &self.load_actions;
        let first = self.first();
        let vr_multiview = first.is_some_and(|b| b.target.vr_multiview());
        RenderPassKey {
            colors: self
                .render_targets
                .iter()
                .enumerate()
                .map(|(i, b)| ColorAttachmentKey {
                    format: b.target.format(),
                    load_action: actions.load_actions_color[i],
                    store_action: actions.store_actions_color[i],
                })
                .collect(),
            depth_stencil: self.depth_stencil.map(|b| DepthStencilAttachmentKey {
                format: b.target.format(),
                load_action_depth: actions.load_action_depth,
                load_action_stencil: actions.load_action_stencil,
                store_action_depth: actions.store_action_depth,
                store_action_stencil: actions.store_action_stencil,
            }),
            sample_count: first.map(|b| b.target.sample_count()).unwrap_or_default(),
            array_size_minus_one: if vr_multiview {
                first.map_or(0, |b| b.target.layers().saturating_sub(1))
            } else {
                0
            },
            vr_multiview,
            vr_foveated_rendering: first.is_some_and(|b| b.target.vr_foveated_rendering()),
        }
    }
}

/// Size of mip `mip` of a `width` x `height` attachment.
pub(crate) fn mip_extent(extent: (u32, u32), mip: Option<u32>) -> (u32, u32) {
    let mip = mip.unwrap_or(0);
    ((extent.0 >> mip).max(1), (extent.1 >> mip).max(1))
}

/// Descriptor sets bound for the current pipeline layout.
#[derive(Debug)]
pub(crate) struct BoundSets {
    layout: vk::PipelineLayout,
    sets: [vk::DescriptorSet; MAX_DESCRIPTOR_SETS],
}

impl Default for BoundSets {
    fn default() -> Self {
        Self {
            layout: vk::PipelineLayout::null(),
            sets: [vk::DescriptorSet::null(); MAX_DESCRIPTOR_SETS],
        }
    }
}

impl BoundSets {
    /// Switches to `layout`. If the layout changed, returns the non-null
    /// `fixed_sets` with their set index, which have to be bound now.
    pub fn switch_layout(
        &mut self,
        layout: vk::PipelineLayout,
        fixed_sets: &[vk::DescriptorSet; MAX_DESCRIPTOR_SETS],
    ) -> Vec<(u32, vk::DescriptorSet)> {
        if self.layout == layout {
            return Vec::new();
        }
        self.layout = layout;
        self.sets = *fixed_sets;
        fixed_sets
            .iter()
            .enumerate()
            .filter(|(_, set)| **set != vk::DescriptorSet::null())
            .map(|(index, &set)| (index as u32, set))
            .collect()
    }

    /// Records `set` at `index`; returns `true` if it has to be bound.
    pub fn needs_bind(&mut self, index: usize, set: vk::DescriptorSet) -> bool {
        if self.sets[index] == set {
            return false;
        }
        self.sets[index] = set;
        true
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum RenderScope {
    None,
    RenderPass,
    Dynamic,
}

struct PoolShared {
    device: Arc<AshDevice>,
    raw: vk::CommandPool,
    retired: SegQueue<vk::CommandBuffer>,
}

impl PoolShared {
    fn free_retired(&self) {
        let mut buffers = Vec::new();
        while let Some(buffer) = self.retired.pop() {
            buffers.push(buffer);
        }
        if !buffers.is_empty() {
            unsafe { self.device.free_command_buffers(self.raw, &buffers) };
        }
    }
}

impl Drop for PoolShared {
    fn drop(&mut self) {
        self.free_retired();
        unsafe { self.device.destroy(self.raw) }
    }
}

/// Allocates command buffers for one queue family.
pub struct CmdPool {
    shared: Arc<PoolShared>,
    queue_type: QueueType,
    node_index: u32,
}

impl CmdPool {
    pub(crate) fn new(device: &Arc<AshDevice>, queue: &Queue, desc: &CmdPoolDesc) -> Result<Self> {
        let mut flags = vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER;
        if desc.transient {
            flags |= vk::CommandPoolCreateFlags::TRANSIENT;
        }
        let create_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(queue.family_index())
            .flags(flags);
        let raw = unsafe { device.create::<vk::CommandPool>(&create_info)?.take() };
        Ok(Self {
            shared: Arc::new(PoolShared {
                device: device.clone(),
                raw,
                retired: SegQueue::new(),
            }),
            queue_type: queue.queue_type(),
            node_index: queue.node_index(),
        })
    }

    /// Allocates a command buffer recording through the caches of `ctx`.
    pub fn add_cmd(&mut self, ctx: &ThreadContext) -> Result<Cmd> {
        let device = &self.shared.device;
        let allocate_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.shared.raw)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let raw = unsafe { device.allocate_command_buffers(&allocate_info)? }
            .into_iter()
            .next()
            .ok_or(Error::VkError(vk::Result::ERROR_UNKNOWN))?;
        Ok(Cmd {
            ctx: ctx.share(),
            pool: self.shared.clone(),
            raw,
            queue_type: self.queue_type,
            node_index: self.node_index,
            stage_caps: device.stage_caps(),
            scope: RenderScope::None,
            bound_pipeline: vk::Pipeline::null(),
            bound_sets: BoundSets::default(),
            debug_levels: 0,
        })
    }

    /// Resets every command buffer of the pool to the initial state.
    pub fn reset(&mut self) -> Result<()> {
        self.shared.free_retired();
        unsafe {
            self.shared
                .device
                .reset_command_pool(self.shared.raw, vk::CommandPoolResetFlags::empty())?
        };
        Ok(())
    }
}

impl std::fmt::Debug for CmdPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CmdPool")
            .field("raw", &self.shared.raw)
            .field("queue_type", &self.queue_type)
            .finish()
    }
}

/// A primary command buffer.
///
/// Recording is not synchronized; a `Cmd` is recorded by one thread at a time.
pub struct Cmd {
    ctx: ThreadContext,
    pool: Arc<PoolShared>,
    raw: vk::CommandBuffer,
    queue_type: QueueType,
    node_index: u32,
    stage_caps: StageCaps,
    scope: RenderScope,
    bound_pipeline: vk::Pipeline,
    bound_sets: BoundSets,
    debug_levels: usize,
}

impl Cmd {
    #[inline]
    pub(crate) fn device(&self) -> &Arc<AshDevice> {
        &self.pool.device
    }

    #[inline]
    pub(crate) fn raw(&self) -> vk::CommandBuffer {
        self.raw
    }

    #[inline]
    pub fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    #[inline]
    pub fn node_index(&self) -> u32 {
        self.node_index
    }

    pub fn begin(&mut self) -> Result<()> {
        self.scope = RenderScope::None;
        self.bound_pipeline = vk::Pipeline::null();
        self.bound_sets = BoundSets::default();
        self.debug_levels = 0;
        let mut group_info = vk::DeviceGroupCommandBufferBeginInfo::builder()
            .device_mask(1 << self.node_index);
        let mut begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        if self.device().is_linked() {
            begin_info = begin_info.push_next(&mut group_info);
        }
        unsafe { self.device().begin_command_buffer(self.raw, &begin_info)? };
        Ok(())
    }

    pub fn end(&mut self) -> Result<()> {
        self.end_render_scope()?;
        self.end_remaining_debug_markers();
        unsafe { self.device().end_command_buffer(self.raw)? };
        Ok(())
    }

    fn end_render_scope(&mut self) -> Result<()> {
        match self.scope {
            RenderScope::None => {}
            RenderScope::RenderPass => unsafe { self.device().cmd_end_render_pass(self.raw) },
            RenderScope::Dynamic => unsafe {
                self.device()
                    .ext_dynamic_rendering()?
                    .cmd_end_rendering(self.raw)
            },
        }
        self.scope = RenderScope::None;
        Ok(())
    }

    /// Ends the active render scope and begins a new one for `desc`.
    ///
    /// `None` only ends the active scope.
    pub fn bind_render_targets(&mut self, desc: Option<&BindRenderTargetsDesc<'_>>) -> Result<()> {
        self.end_render_scope()?;
        let Some(desc) = desc else {
            return Ok(());
        };
        let Some(first) = desc.first() else {
            return Ok(());
        };
        debug_assert!(desc.render_targets.len() <= MAX_RENDER_TARGET_ATTACHMENTS);
        if desc.render_targets.len() > MAX_RENDER_TARGET_ATTACHMENTS {
            return Err(Error::InvalidDesc("too many render targets"));
        }

        if desc
            .load_actions
            .any_load(desc.render_targets.len(), desc.depth_stencil.is_some())
        {
            self.attachment_load_barrier();
        }

        let extent = mip_extent(first.target.extent(), first.mip_slice);
        let key = desc.render_pass_key();
        let layers = if key.vr_multiview || first.array_slice.is_some() {
            1
        } else {
            first.target.layers()
        };
        if self.device().uses_dynamic_rendering() {
            self.begin_rendering(desc, &key, extent, layers)?;
            self.scope = RenderScope::Dynamic;
        } else {
            self.begin_render_pass(desc, &key, extent, layers)?;
            self.scope = RenderScope::RenderPass;
        }
        Ok(())
    }

    /// Makes earlier attachment writes visible to attachments loaded by the next pass.
    fn attachment_load_barrier(&self) {
        let src_access = to_access_flags(ResourceState::RENDER_TARGET | ResourceState::DEPTH_WRITE);
        let dst_access = src_access
            | to_access_flags(ResourceState::DEPTH_READ)
            | vk::AccessFlags::COLOR_ATTACHMENT_READ;
        let barrier = vk::MemoryBarrier::builder()
            .src_access_mask(src_access)
            .dst_access_mask(dst_access)
            .build();
        let src_stage = to_pipeline_stage_flags(src_access, self.queue_type, &self.stage_caps);
        let dst_stage = to_pipeline_stage_flags(dst_access, self.queue_type, &self.stage_caps);
        unsafe {
            self.device().cmd_pipeline_barrier(
                self.raw,
                src_stage,
                dst_stage,
                vk::DependencyFlags::BY_REGION,
                &[barrier],
                &[],
                &[],
            )
        };
    }

    fn begin_rendering(
        &self,
        desc: &BindRenderTargetsDesc<'_>,
        key: &RenderPassKey,
        extent: (u32, u32),
        layers: u32,
    ) -> Result<()> {
        let device = self.device();
        let store_op_none = device.extensions().ext_load_store_op_none;
        let actions = &desc.load_actions;
        let mut colors = Vec::with_capacity(desc.render_targets.len());
        for (i, binding) in desc.render_targets.iter().enumerate() {
            let store_action = actions.store_actions_color[i];
            let mut info = vk::RenderingAttachmentInfo::builder()
                .image_view(binding.view()?)
                .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .load_op(actions.load_actions_color[i].vk_into())
                .store_op(store_op(store_action, store_op_none))
                .clear_value(actions.clear_color_values[i].vk_into());
            if key.has_resolve() && store_action.is_resolve() {
                info = info
                    .resolve_mode(vk::ResolveModeFlags::AVERAGE)
                    .resolve_image_view(binding.resolve_view()?)
                    .resolve_image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
            }
            colors.push(info.build());
        }

        let mut depth = None;
        let mut stencil = None;
        if let (Some(binding), Some(depth_key)) = (&desc.depth_stencil, &key.depth_stencil) {
            let view = binding.view()?;
            let layout = depth_key.layout();
            let clear = actions.clear_depth.vk_into();
            depth = Some(
                vk::RenderingAttachmentInfo::builder()
                    .image_view(view)
                    .image_layout(layout)
                    .load_op(actions.load_action_depth.vk_into())
                    .store_op(store_op(actions.store_action_depth, store_op_none))
                    .clear_value(clear)
                    .build(),
            );
            if depth_key.format.has_stencil() {
                stencil = Some(
                    vk::RenderingAttachmentInfo::builder()
                        .image_view(view)
                        .image_layout(layout)
                        .load_op(actions.load_action_stencil.vk_into())
                        .store_op(store_op(actions.store_action_stencil, store_op_none))
                        .clear_value(clear)
                        .build(),
                );
            }
        }

        let mut rendering_info = vk::RenderingInfo::builder()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: vk::Extent2D {
                    width: extent.0,
                    height: extent.1,
                },
            })
            .layer_count(layers.max(1))
            .view_mask(key.view_mask())
            .color_attachments(&colors);
        if let Some(depth) = &depth {
            rendering_info = rendering_info.depth_attachment(depth);
        }
        if let Some(stencil) = &stencil {
            rendering_info = rendering_info.stencil_attachment(stencil);
        }
        unsafe {
            device
                .ext_dynamic_rendering()?
                .cmd_begin_rendering(self.raw, &rendering_info)
        };
        Ok(())
    }

    fn begin_render_pass(
        &self,
        desc: &BindRenderTargetsDesc<'_>,
        key: &RenderPassKey,
        extent: (u32, u32),
        layers: u32,
    ) -> Result<()> {
        let render_pass = get_or_add_render_pass(&self.ctx, key)?;

        // same order as the attachments of the render pass
        let mut identities = Vec::new();
        let mut views = Vec::new();
        let mut clear_values = Vec::new();
        for (i, binding) in desc.render_targets.iter().enumerate() {
            identities.push(binding.identity());
            views.push(binding.view()?);
            clear_values.push(desc.load_actions.clear_color_values[i].vk_into());
        }
        if let Some(binding) = &desc.depth_stencil {
            identities.push(binding.identity());
            views.push(binding.view()?);
            clear_values.push(desc.load_actions.clear_depth.vk_into());
        }
        if key.has_resolve() {
            for (i, binding) in desc.render_targets.iter().enumerate() {
                if !desc.load_actions.store_actions_color[i].is_resolve() {
                    continue;
                }
                let resolve = binding
                    .target
                    .resolve_target()
                    .ok_or(Error::InvalidDesc("resolve store action without resolve target"))?;
                identities.push(AttachmentIdentity {
                    resource_id: resolve.id(),
                    ..binding.identity()
                });
                views.push(binding.resolve_view()?);
                clear_values.push(vk::ClearValue::default());
            }
        }

        let hash = framebuffer_hash(key.hash_value(), &identities, extent, layers);
        let framebuffer =
            get_or_add_framebuffer(&self.ctx, hash, render_pass, &views, extent, layers)?;
        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: vk::Extent2D {
                    width: extent.0,
                    height: extent.1,
                },
            })
            .clear_values(&clear_values);
        unsafe {
            self.device()
                .cmd_begin_render_pass(self.raw, &begin_info, vk::SubpassContents::INLINE)
        };
        Ok(())
    }

    /// Sets the viewport with the origin in the upper left corner.
    pub fn set_viewport(
        &mut self,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        min_depth: f32,
        max_depth: f32,
    ) {
        // negative height flips y to match the other backends
        let viewport = vk::Viewport {
            x,
            y: y + height,
            width,
            height: -height,
            min_depth,
            max_depth,
        };
        unsafe { self.device().cmd_set_viewport(self.raw, 0, &[viewport]) };
    }

    pub fn set_scissor(&mut self, x: u32, y: u32, width: u32, height: u32) {
        let rect = vk::Rect2D {
            offset: vk::Offset2D {
                x: x as i32,
                y: y as i32,
            },
            extent: vk::Extent2D { width, height },
        };
        unsafe { self.device().cmd_set_scissor(self.raw, 0, &[rect]) };
    }

    pub fn set_stencil_reference_value(&mut self, value: u32) {
        unsafe {
            self.device().cmd_set_stencil_reference(
                self.raw,
                vk::StencilFaceFlags::FRONT_AND_BACK,
                value,
            )
        };
    }

    /// Switches the bound layout; the empty and static-sampler sets of a new
    /// layout are bound right away.
    fn switch_layout(
        &mut self,
        layout: vk::PipelineLayout,
        bind_point: vk::PipelineBindPoint,
        fixed_sets: &[vk::DescriptorSet; MAX_DESCRIPTOR_SETS],
    ) {
        for (index, set) in self.bound_sets.switch_layout(layout, fixed_sets) {
            unsafe {
                self.device().cmd_bind_descriptor_sets(
                    self.raw,
                    bind_point,
                    layout,
                    index,
                    &[set],
                    &[],
                )
            };
        }
    }

    pub fn bind_pipeline(&mut self, pipeline: &Pipeline) {
        if self.bound_pipeline != pipeline.raw() {
            unsafe {
                self.device()
                    .cmd_bind_pipeline(self.raw, pipeline.bind_point(), pipeline.raw())
            };
            self.bound_pipeline = pipeline.raw();
        }
        let layout = pipeline.layout();
        self.switch_layout(layout.raw(), layout.bind_point(), layout.fixed_sets());
    }

    /// Binds set `index` of `set`, skipping sets that are already bound.
    pub fn bind_descriptor_set(&mut self, index: u32, set: &DescriptorSet) -> Result<()> {
        let raw = set
            .raw(index)
            .ok_or(Error::InvalidDesc("descriptor set index out of range"))?;
        self.switch_layout(set.pipeline_layout(), set.bind_point(), set.fixed_sets());
        if self.bound_sets.needs_bind(set.set_index() as usize, raw) {
            unsafe {
                self.device().cmd_bind_descriptor_sets(
                    self.raw,
                    set.bind_point(),
                    set.pipeline_layout(),
                    set.set_index(),
                    &[raw],
                    &[],
                )
            };
        }
        Ok(())
    }

    pub fn bind_push_constants(&mut self, layout: &PipelineLayout, data: &[u8]) -> Result<()> {
        if data.len() as u32 > layout.push_constant_size() {
            return Err(Error::InvalidDesc("push constants exceed the layout's range"));
        }
        unsafe {
            self.device().cmd_push_constants(
                self.raw,
                layout.raw(),
                layout.push_constant_stages(),
                0,
                data,
            )
        };
        Ok(())
    }

    pub fn bind_index_buffer(&mut self, buffer: &Buffer, format: IndexFormat, offset: u64) {
        unsafe {
            self.device()
                .cmd_bind_index_buffer(self.raw, buffer.raw(), offset, format.vk_into())
        };
    }

    /// Binds `buffers` to consecutive bindings; missing offsets are `0`.
    pub fn bind_vertex_buffers(&mut self, buffers: &[&Buffer], offsets: Option<&[u64]>) {
        let raw: Vec<vk::Buffer> = buffers.iter().map(|b| b.raw()).collect();
        let offsets: Vec<u64> = (0..buffers.len())
            .map(|i| offsets.and_then(|o| o.get(i)).copied().unwrap_or(0))
            .collect();
        unsafe {
            self.device()
                .cmd_bind_vertex_buffers(self.raw, 0, &raw, &offsets)
        };
    }

    #[inline]
    pub fn draw(&mut self, vertex_count: u32, first_vertex: u32) {
        self.draw_instanced(vertex_count, first_vertex, 1, 0);
    }

    pub fn draw_instanced(
        &mut self,
        vertex_count: u32,
        first_vertex: u32,
        instance_count: u32,
        first_instance: u32,
    ) {
        unsafe {
            self.device().cmd_draw(
                self.raw,
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            )
        };
    }

    #[inline]
    pub fn draw_indexed(&mut self, index_count: u32, first_index: u32, first_vertex: i32) {
        self.draw_indexed_instanced(index_count, first_index, 1, 0, first_vertex);
    }

    pub fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        first_index: u32,
        instance_count: u32,
        first_instance: u32,
        first_vertex: i32,
    ) {
        unsafe {
            self.device().cmd_draw_indexed(
                self.raw,
                index_count,
                instance_count,
                first_index,
                first_vertex,
                first_instance,
            )
        };
    }

    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        unsafe { self.device().cmd_dispatch(self.raw, x, y, z) };
    }

    /// Records up to `max_count` indirect commands read from `buffer`.
    ///
    /// With a count buffer and driver support the actual count is read on
    /// the GPU; otherwise all `max_count` records are executed.
    pub fn execute_indirect(
        &mut self,
        signature: &CommandSignatureDesc,
        max_count: u32,
        buffer: &Buffer,
        offset: u64,
        count_buffer: Option<(&Buffer, u64)>,
    ) {
        let device = self.device().clone();
        let stride = signature.stride();
        let path = indirect_path(
            signature.argument_type,
            max_count,
            count_buffer.is_some(),
            device.features().multi_draw_indirect,
            device.has_draw_indirect_count(),
        );
        let (buffer, cb) = (buffer.raw(), self.raw);
        match (signature.argument_type, path) {
            (IndirectArgumentType::Dispatch, IndirectPath::Native) => unsafe {
                device.cmd_dispatch_indirect(cb, buffer, offset)
            },
            (IndirectArgumentType::Dispatch, _) => {
                for i in 0..u64::from(max_count) {
                    unsafe {
                        device.cmd_dispatch_indirect(cb, buffer, offset + i * u64::from(stride))
                    };
                }
            }
            (argument_type, IndirectPath::CountBuffer) => {
                let Some((count_buffer, count_offset)) = count_buffer else {
                    return;
                };
                let indexed = argument_type == IndirectArgumentType::DrawIndex;
                let recorded = unsafe {
                    self.draw_indirect_count(
                        indexed,
                        buffer,
                        offset,
                        count_buffer.raw(),
                        count_offset,
                        max_count,
                        stride,
                    )
                };
                if !recorded {
                    warn!("no draw indirect count loader, executing all {max_count} records");
                    self.draw_indirect_loop(indexed, buffer, offset, max_count, stride);
                }
            }
            (IndirectArgumentType::DrawIndex, IndirectPath::Native) => unsafe {
                device.cmd_draw_indexed_indirect(cb, buffer, offset, max_count, stride)
            },
            (_, IndirectPath::Native) => unsafe {
                device.cmd_draw_indirect(cb, buffer, offset, max_count, stride)
            },
            (argument_type, IndirectPath::Loop) => self.draw_indirect_loop(
                argument_type == IndirectArgumentType::DrawIndex,
                buffer,
                offset,
                max_count,
                stride,
            ),
        }
    }

    fn draw_indirect_loop(
        &self,
        indexed: bool,
        buffer: vk::Buffer,
        offset: u64,
        count: u32,
        stride: u32,
    ) {
        let device = self.device();
        for i in 0..u64::from(count) {
            let offset = offset + i * u64::from(stride);
            unsafe {
                if indexed {
                    device.cmd_draw_indexed_indirect(self.raw, buffer, offset, 1, stride);
                } else {
                    device.cmd_draw_indirect(self.raw, buffer, offset, 1, stride);
                }
            }
        }
    }

    /// Returns `false` if no count loader is available and nothing was recorded.
    #[allow(clippy::too_many_arguments)]
    unsafe fn draw_indirect_count(
        &self,
        indexed: bool,
        buffer: vk::Buffer,
        offset: u64,
        count_buffer: vk::Buffer,
        count_offset: u64,
        max_count: u32,
        stride: u32,
    ) -> bool {
        let device = self.device();
        let cb = self.raw;
        if let Some(khr) = device.ext_draw_indirect_count() {
            unsafe {
                if indexed {
                    khr.cmd_draw_indexed_indirect_count(
                        cb,
                        buffer,
                        offset,
                        count_buffer,
                        count_offset,
                        max_count,
                        stride,
                    );
                } else {
                    khr.cmd_draw_indirect_count(
                        cb,
                        buffer,
                        offset,
                        count_buffer,
                        count_offset,
                        max_count,
                        stride,
                    );
                }
            }
        } else if let Some(amd) = device.amd_draw_indirect_count() {
            unsafe {
                if indexed {
                    (amd.cmd_draw_indexed_indirect_count_amd)(
                        cb,
                        buffer,
                        offset,
                        count_buffer,
                        count_offset,
                        max_count,
                        stride,
                    );
                } else {
                    (amd.cmd_draw_indirect_count_amd)(
                        cb,
                        buffer,
                        offset,
                        count_buffer,
                        count_offset,
                        max_count,
                        stride,
                    );
                }
            }
        } else {
            return false;
        }
        true
    }

    /// Transitions buffers, textures and render targets in one native barrier.
    pub fn resource_barrier(
        &mut self,
        buffers: &[BufferBarrier<'_>],
        textures: &[TextureBarrier<'_>],
        render_targets: &[RenderTargetBarrier<'_>],
    ) {
        debug_assert!(buffers.len() + textures.len() + render_targets.len() <= MAX_BARRIERS);
        let mut batch = BarrierBatch::default();
        for b in buffers {
            batch.push_buffer(b.buffer.raw(), b.current_state, b.new_state);
        }
        for t in textures {
            batch.push_image(
                t.texture.raw(),
                t.texture.aspect(),
                t.subresource,
                t.current_state,
                t.new_state,
            );
        }
        for rt in render_targets {
            let texture = rt.render_target.texture();
            batch.push_image(
                texture.raw(),
                texture.aspect(),
                rt.subresource,
                rt.current_state,
                rt.new_state,
            );
        }
        self.record_barriers(&batch);
    }

    pub(crate) fn record_barriers(&self, batch: &BarrierBatch) {
        if batch.is_empty() {
            return;
        }
        let (src_stage, dst_stage) = batch.stages(self.queue_type, &self.stage_caps);
        let memory: &[vk::MemoryBarrier] = batch.memory.as_slice();
        unsafe {
            self.device().cmd_pipeline_barrier(
                self.raw,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                memory,
                &batch.buffers,
                &batch.images,
            )
        };
    }

    /// Copies `size` bytes from `src` into `dst`.
    pub fn update_buffer(
        &mut self,
        dst: &Buffer,
        dst_offset: u64,
        src: &Buffer,
        src_offset: u64,
        size: u64,
    ) {
        let region = vk::BufferCopy {
            src_offset,
            dst_offset,
            size,
        };
        unsafe {
            self.device()
                .cmd_copy_buffer(self.raw, src.raw(), dst.raw(), &[region])
        };
    }

    /// Uploads one subresource of `dst` from the staging buffer `src`.
    ///
    /// `dst` has to be in the `COPY_DEST` state.
    pub fn update_subresource(&mut self, dst: &Texture, src: &Buffer, desc: &SubresourceDataDesc) {
        let regions = copy_regions(dst.format(), dst.aspect(), dst.extent(), desc);
        unsafe {
            self.device().cmd_copy_buffer_to_image(
                self.raw,
                src.raw(),
                dst.raw(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &regions,
            )
        };
    }

    /// Reads one subresource of `src` back into `dst`.
    ///
    /// `src` has to be in the `COPY_SOURCE` state.
    pub fn copy_subresource(&mut self, dst: &Buffer, src: &Texture, desc: &SubresourceDataDesc) {
        let regions = copy_regions(src.format(), src.aspect(), src.extent(), desc);
        unsafe {
            self.device().cmd_copy_image_to_buffer(
                self.raw,
                src.raw(),
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                dst.raw(),
                &regions,
            )
        };
    }

    /// Starts query `index`. Timestamp pools write a timestamp.
    pub fn begin_query(&mut self, pool: &QueryPool, index: u32) {
        let device = self.device();
        unsafe {
            match pool.query_type() {
                QueryType::Timestamp => device.cmd_write_timestamp(
                    self.raw,
                    vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                    pool.raw(),
                    index,
                ),
                _ => device.cmd_begin_query(
                    self.raw,
                    pool.raw(),
                    index,
                    vk::QueryControlFlags::empty(),
                ),
            }
        }
    }

    /// Ends query `index`. Timestamp pools write another timestamp.
    pub fn end_query(&mut self, pool: &QueryPool, index: u32) {
        let device = self.device();
        unsafe {
            match pool.query_type() {
                QueryType::Timestamp => device.cmd_write_timestamp(
                    self.raw,
                    vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                    pool.raw(),
                    index,
                ),
                _ => device.cmd_end_query(self.raw, pool.raw(), index),
            }
        }
    }

    pub fn reset_query_pool(&mut self, pool: &QueryPool, first: u32, count: u32) {
        unsafe {
            self.device()
                .cmd_reset_query_pool(self.raw, pool.raw(), first, count)
        };
    }

    /// Copies the results of `count` queries into `readback` at `offset`.
    pub fn resolve_query(
        &mut self,
        pool: &QueryPool,
        readback: &Buffer,
        offset: u64,
        first: u32,
        count: u32,
    ) {
        unsafe {
            self.device().cmd_copy_query_pool_results(
                self.raw,
                pool.raw(),
                first,
                count,
                readback.raw(),
                offset,
                pool.stride(),
                vk::QueryResultFlags::TYPE_64 | vk::QueryResultFlags::WAIT,
            )
        };
    }

    pub fn begin_debug_marker(&mut self, color: [f32; 3], name: &str) {
        let device = self.device();
        unsafe { device.cmd_set_checkpoint(self.raw, name) };
        if !cfg!(feature = "debug-names") {
            return;
        }
        if let Ok(debug_utils) = device.instance().ext_debug_utils() {
            unsafe { debug_utils.begin_label(self.raw, name, color) };
            self.debug_levels += 1;
        }
    }

    pub fn end_debug_marker(&mut self) {
        if self.debug_levels == 0 {
            return;
        }
        if let Ok(debug_utils) = self.device().instance().ext_debug_utils() {
            unsafe { debug_utils.end_label(self.raw) };
        }
        self.debug_levels -= 1;
    }

    pub fn add_debug_marker(&mut self, color: [f32; 3], name: &str) {
        let device = self.device();
        unsafe { device.cmd_set_checkpoint(self.raw, name) };
        if !cfg!(feature = "debug-names") {
            return;
        }
        if let Ok(debug_utils) = device.instance().ext_debug_utils() {
            unsafe { debug_utils.insert_label(self.raw, name, color) };
        }
    }

    fn end_remaining_debug_markers(&mut self) {
        if self.debug_levels > 0 {
            debug!("closing {} unbalanced debug markers", self.debug_levels);
        }
        while self.debug_levels > 0 {
            self.end_debug_marker();
        }
    }
}

impl Drop for Cmd {
    fn drop(&mut self) {
        if self.raw != vk::CommandBuffer::null() {
            self.pool.retired.push(self.raw);
            self.raw = vk::CommandBuffer::null();
        }
    }
}

impl std::fmt::Debug for Cmd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cmd")
            .field("raw", &self.raw)
            .field("queue_type", &self.queue_type)
            .field("node_index", &self.node_index)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;

    #[test]
    fn test_indirect_path() {
        use IndirectArgumentType::*;
        assert_eq!(IndirectPath::Native, indirect_path(Draw, 8, false, true, false));
        assert_eq!(IndirectPath::Loop, indirect_path(Draw, 8, false, false, false));
        assert_eq!(IndirectPath::Native, indirect_path(DrawIndex, 1, false, false, false));
        assert_eq!(IndirectPath::CountBuffer, indirect_path(DrawIndex, 8, true, false, true));
        // without driver support the count buffer is ignored
        assert_eq!(IndirectPath::Native, indirect_path(Draw, 8, true, true, false));
        assert_eq!(IndirectPath::Loop, indirect_path(DrawIndex, 8, true, false, false));
        assert_eq!(IndirectPath::Native, indirect_path(Dispatch, 1, false, true, true));
        assert_eq!(IndirectPath::Loop, indirect_path(Dispatch, 4, true, true, true));
    }

    #[test]
    fn test_command_signature_stride() {
        let packed = CommandSignatureDesc::new(IndirectArgumentType::DrawIndex);
        assert_eq!(20, packed.stride());
        let padded = CommandSignatureDesc {
            stride: 32,
            ..packed
        };
        assert_eq!(32, padded.stride());
    }

    #[test]
    fn test_uav_buffer_barrier_is_memory_barrier() {
        let mut batch = BarrierBatch::default();
        batch.push_buffer(
            vk::Buffer::from_raw(1),
            ResourceState::UNORDERED_ACCESS,
            ResourceState::UNORDERED_ACCESS,
        );
        assert!(batch.buffers.is_empty());
        let memory = batch.memory.unwrap();
        assert_eq!(
            vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE,
            memory.dst_access_mask
        );
        assert!(!batch.is_empty());
    }

    #[test]
    fn test_image_barrier_layouts() {
        let mut batch = BarrierBatch::default();
        batch.push_image(
            vk::Image::from_raw(1),
            vk::ImageAspectFlags::COLOR,
            None,
            ResourceState::SHADER_RESOURCE,
            ResourceState::COPY_DEST,
        );
        batch.push_image(
            vk::Image::from_raw(2),
            vk::ImageAspectFlags::COLOR,
            Some(Subresource {
                mip_level: 2,
                array_layer: 1,
            }),
            ResourceState::UNORDERED_ACCESS,
            ResourceState::UNORDERED_ACCESS,
        );
        assert_eq!(2, batch.images.len());
        let whole = &batch.images[0];
        assert_eq!(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL, whole.old_layout);
        assert_eq!(vk::ImageLayout::TRANSFER_DST_OPTIMAL, whole.new_layout);
        assert_eq!(vk::REMAINING_MIP_LEVELS, whole.subresource_range.level_count);
        let single = &batch.images[1];
        assert_eq!(vk::ImageLayout::GENERAL, single.old_layout);
        assert_eq!(vk::ImageLayout::GENERAL, single.new_layout);
        assert_eq!(2, single.subresource_range.base_mip_level);
        assert_eq!(1, single.subresource_range.layer_count);
        assert!(batch.dst_access.contains(vk::AccessFlags::TRANSFER_WRITE));
    }

    #[test]
    fn test_row_length() {
        assert_eq!(0, row_length_texels(TextureFormat::Rgba8Unorm, 0));
        assert_eq!(64, row_length_texels(TextureFormat::Rgba8Unorm, 256));
        // 4x4 blocks of 8 bytes
        assert_eq!(16, row_length_texels(TextureFormat::Bc1RgbaUnorm, 32));
    }

    #[test]
    fn test_copy_regions_of_mip() {
        let desc = SubresourceDataDesc {
            src_offset: 128,
            mip_level: 1,
            array_layer: 3,
            row_pitch: 0,
            slice_pitch: 0,
        };
        let regions = copy_regions(
            TextureFormat::Depth32Float,
            vk::ImageAspectFlags::DEPTH,
            (16, 8, 1),
            &desc,
        );
        assert_eq!(1, regions.len());
        assert_eq!(128, regions[0].buffer_offset);
        assert_eq!(8, regions[0].image_extent.width);
        assert_eq!(4, regions[0].image_extent.height);
        assert_eq!(3, regions[0].image_subresource.base_array_layer);
        assert_eq!(vk::ImageAspectFlags::DEPTH, regions[0].image_subresource.aspect_mask);
    }

    #[test]
    fn test_copy_regions_of_planar_format() {
        let regions = copy_regions(
            TextureFormat::G8B8R8TwoPlane420Unorm,
            vk::ImageAspectFlags::COLOR,
            (4, 4, 1),
            &SubresourceDataDesc::default(),
        );
        assert_eq!(2, regions.len());
        assert_eq!(vk::ImageAspectFlags::PLANE_0, regions[0].image_subresource.aspect_mask);
        assert_eq!(0, regions[0].buffer_offset);
        assert_eq!(vk::ImageAspectFlags::PLANE_1, regions[1].image_subresource.aspect_mask);
        assert_eq!(16, regions[1].buffer_offset);
        assert_eq!(2, regions[1].image_extent.width);
        assert_eq!(2, regions[1].image_extent.height);
    }

    #[test]
    fn test_bound_sets_skip_rebinding() {
        let mut bound = BoundSets::default();
        let layout = vk::PipelineLayout::from_raw(1);
        let no_fixed = [vk::DescriptorSet::null(); MAX_DESCRIPTOR_SETS];
        let set = vk::DescriptorSet::from_raw(7);
        assert!(bound.switch_layout(layout, &no_fixed).is_empty());
        assert!(bound.needs_bind(1, set));
        assert!(!bound.needs_bind(1, set));
        // a new layout invalidates the bound sets
        bound.switch_layout(vk::PipelineLayout::from_raw(2), &no_fixed);
        assert!(bound.needs_bind(1, set));
    }

    #[test]
    fn test_fixed_sets_bound_once_per_layout() {
        let mut bound = BoundSets::default();
        let layout = vk::PipelineLayout::from_raw(1);
        let empty = vk::DescriptorSet::from_raw(3);
        let mut fixed = [vk::DescriptorSet::null(); MAX_DESCRIPTOR_SETS];
        fixed[0] = empty;
        fixed[2] = empty;
        let user_set = vk::DescriptorSet::from_raw(9);

        // binding a descriptor set first switches the layout
        assert_eq!(vec![(0, empty), (2, empty)], bound.switch_layout(layout, &fixed));
        assert!(bound.needs_bind(1, user_set));
        // the pipeline on the same layout has nothing left to bind
        assert!(bound.switch_layout(layout, &fixed).is_empty());
        assert!(!bound.needs_bind(0, empty));
        assert!(!bound.needs_bind(1, user_set));
        assert!(!bound.needs_bind(2, empty));
    }

    #[test]
    fn test_mip_extent() {
        assert_eq!((64, 32), mip_extent((64, 32), None));
        assert_eq!((16, 8), mip_extent((64, 32), Some(2)));
        assert_eq!((1, 1), mip_extent((64, 32), Some(8)));
    }
}
