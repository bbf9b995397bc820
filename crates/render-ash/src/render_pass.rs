//! Render passes and framebuffers for the legacy (non dynamic-rendering) path.
//!
//! A render pass is keyed by the shape of its attachments only, so one pass
//! serves every framebuffer with the same formats and actions. Framebuffers
//! are keyed by the identity of the bound views.

use ash::vk;
use forge_render::{
    commands::{LoadActionType, StoreActionType},
    format::{SampleCount, TextureFormat},
    pipeline::GraphicsPipelineState,
    utils::hash::{content_hash, RunningHash},
    MAX_RENDER_TARGET_ATTACHMENTS,
};

use crate::{cache::ThreadContext, convert::VkInto, device::AshDevice, Result};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ColorAttachmentKey {
    pub format: TextureFormat,
    pub load_action: LoadActionType,
    pub store_action: StoreActionType,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct DepthStencilAttachmentKey {
    pub format: TextureFormat,
    pub load_action_depth: LoadActionType,
    pub load_action_stencil: LoadActionType,
    pub store_action_depth: StoreActionType,
    pub store_action_stencil: StoreActionType,
}

impl DepthStencilAttachmentKey {
    /// Layout of the attachment during the pass.
    ///
    /// A loaded attachment that is neither stored nor cleared stays in the
    /// read-only layout, so it can be sampled by the same pass.
    pub fn layout(&self) -> vk::ImageLayout {
        let has_stencil = self.format.has_stencil();
        let read_only = self.load_action_depth == LoadActionType::Load
            && self.store_action_depth == StoreActionType::None
            && (!has_stencil
                || (self.load_action_stencil != LoadActionType::Clear
                    && self.store_action_stencil == StoreActionType::None));
        if read_only {
            vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
        } else {
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        }
    }
}

/// Shape of a render pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct RenderPassKey {
    pub colors: Vec<ColorAttachmentKey>,
    pub depth_stencil: Option<DepthStencilAttachmentKey>,
    pub sample_count: SampleCount,
    pub array_size_minus_one: u32,
    pub vr_multiview: bool,
    pub vr_foveated_rendering: bool,
}

impl RenderPassKey {
    /// A key compatible with every pass a pipeline of `state` can be used in.
    pub fn for_pipeline(state: &GraphicsPipelineState) -> Self {
        Self {
            colors: state
                .color_formats
                .iter()
                .map(|&format| ColorAttachmentKey {
                    format,
                    load_action: LoadActionType::DontCare,
                    store_action: StoreActionType::Store,
                })
                .collect(),
            depth_stencil: state
                .depth_stencil_format
                .map(|format| DepthStencilAttachmentKey {
                    format,
                    load_action_depth: LoadActionType::DontCare,
                    load_action_stencil: LoadActionType::DontCare,
                    store_action_depth: StoreActionType::Store,
                    store_action_stencil: StoreActionType::Store,
                }),
            sample_count: state.sample_count,
            array_size_minus_one: u32::from(state.vr_multiview),
            vr_multiview: state.vr_multiview,
            vr_foveated_rendering: state.vr_foveated_rendering,
        }
    }

    #[inline]
    pub fn hash_value(&self) -> u64 {
        content_hash(self)
    }

    /// `true` when a color attachment is resolved at the end of the pass.
    pub fn has_resolve(&self) -> bool {
        self.sample_count != SampleCount::X1
            && self.colors.iter().any(|c| c.store_action.is_resolve())
    }

    /// Multiview mask covering all layers, or `0` without multiview.
    pub fn view_mask(&self) -> u32 {
        if self.vr_multiview {
            (1u32 << (self.array_size_minus_one + 1).min(31)) - 1
        } else {
            0
        }
    }
}

pub(crate) fn store_op(action: StoreActionType, store_op_none: bool) -> vk::AttachmentStoreOp {
    match action {
        StoreActionType::None if !store_op_none => vk::AttachmentStoreOp::STORE,
        _ => action.vk_into(),
    }
}

/// Attachment descriptions and references of the single subpass.
///
/// Colors come first, then the depth/stencil attachment, then the resolve
/// targets of the colors that resolve.
#[derive(Debug, Default)]
pub(crate) struct SubpassLayout {
    pub attachments: Vec<vk::AttachmentDescription>,
    pub colors: Vec<vk::AttachmentReference>,
    pub resolves: Vec<vk::AttachmentReference>,
    pub depth_stencil: Option<vk::AttachmentReference>,
}

pub(crate) fn subpass_layout(key: &RenderPassKey, store_op_none: bool) -> SubpassLayout {
    debug_assert!(key.colors.len() <= MAX_RENDER_TARGET_ATTACHMENTS);
    let samples: vk::SampleCountFlags = key.sample_count.vk_into();
    let mut layout = SubpassLayout::default();
    for color in &key.colors {
        layout.colors.push(vk::AttachmentReference {
            attachment: layout.attachments.len() as u32,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        });
        layout.attachments.push(
            vk::AttachmentDescription::builder()
                .format(color.format.vk_into())
                .samples(samples)
                .load_op(color.load_action.vk_into())
                .store_op(store_op(color.store_action, store_op_none))
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .build(),
        );
    }
    if let Some(depth) = &key.depth_stencil {
        let depth_layout = depth.layout();
        let (stencil_load, stencil_store) = if depth.format.has_stencil() {
            (
                depth.load_action_stencil.vk_into(),
                store_op(depth.store_action_stencil, store_op_none),
            )
        } else {
            (
                vk::AttachmentLoadOp::DONT_CARE,
                vk::AttachmentStoreOp::DONT_CARE,
            )
        };
        layout.depth_stencil = Some(vk::AttachmentReference {
            attachment: layout.attachments.len() as u32,
            layout: depth_layout,
        });
        layout.attachments.push(
            vk::AttachmentDescription::builder()
                .format(depth.format.vk_into())
                .samples(samples)
                .load_op(depth.load_action_depth.vk_into())
                .store_op(store_op(depth.store_action_depth, store_op_none))
                .stencil_load_op(stencil_load)
                .stencil_store_op(stencil_store)
                .initial_layout(depth_layout)
                .final_layout(depth_layout)
                .build(),
        );
    }
    if key.has_resolve() {
        for color in &key.colors {
            if !color.store_action.is_resolve() {
                layout.resolves.push(vk::AttachmentReference {
                    attachment: vk::ATTACHMENT_UNUSED,
                    layout: vk::ImageLayout::UNDEFINED,
                });
                continue;
            }
            layout.resolves.push(vk::AttachmentReference {
                attachment: layout.attachments.len() as u32,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            });
            layout.attachments.push(
                vk::AttachmentDescription::builder()
                    .format(color.format.vk_into())
                    .samples(vk::SampleCountFlags::TYPE_1)
                    .load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .build(),
            );
        }
    }
    layout
}

unsafe fn create_render_pass(device: &AshDevice, key: &RenderPassKey) -> Result<vk::RenderPass> {
    let layout = subpass_layout(key, device.extensions().ext_load_store_op_none);
    let mut subpass = vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&layout.colors);
    if !layout.resolves.is_empty() {
        subpass = subpass.resolve_attachments(&layout.resolves);
    }
    if let Some(depth) = &layout.depth_stencil {
        subpass = subpass.depth_stencil_attachment(depth);
    }
    let subpasses = [subpass.build()];
    let view_masks = [key.view_mask()];
    let mut multiview = vk::RenderPassMultiviewCreateInfo::builder()
        .view_masks(&view_masks)
        .correlation_masks(&view_masks);
    let mut create_info = vk::RenderPassCreateInfo::builder()
        .attachments(&layout.attachments)
        .subpasses(&subpasses);
    if key.vr_multiview {
        create_info = create_info.push_next(&mut multiview);
    }
    let render_pass = unsafe { device.create::<vk::RenderPass>(&create_info)? };
    Ok(render_pass.take())
}

/// Looks up or creates the render pass of `key`.
pub(crate) fn get_or_add_render_pass(
    ctx: &ThreadContext,
    key: &RenderPassKey,
) -> Result<vk::RenderPass> {
    let device = ctx.device();
    ctx.render_pass(key.hash_value(), || unsafe {
        create_render_pass(device, key)
    })
}

/// Identity of one view bound as attachment.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct AttachmentIdentity {
    pub resource_id: u64,
    pub mip_slice: Option<u32>,
    pub array_slice: Option<u32>,
}

pub(crate) fn framebuffer_hash(
    render_pass_hash: u64,
    attachments: &[AttachmentIdentity],
    extent: (u32, u32),
    layers: u32,
) -> u64 {
    let mut hash = RunningHash::with_seed(render_pass_hash);
    hash.add(&attachments.len());
    for attachment in attachments {
        hash.add(attachment);
    }
    hash.add(&extent).add(&layers);
    hash.finish()
}

/// Looks up or creates a framebuffer for `views`, given in attachment order.
pub(crate) fn get_or_add_framebuffer(
    ctx: &ThreadContext,
    hash: u64,
    render_pass: vk::RenderPass,
    views: &[vk::ImageView],
    extent: (u32, u32),
    layers: u32,
) -> Result<vk::Framebuffer> {
    let device = ctx.device();
    ctx.framebuffer(hash, || unsafe {
        let create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(views)
            .width(extent.0)
            .height(extent.1)
            .layers(layers.max(1));
        Ok(device.create::<vk::Framebuffer>(&create_info)?.take())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn color(format: TextureFormat) -> ColorAttachmentKey {
        ColorAttachmentKey {
            format,
            load_action: LoadActionType::Clear,
            store_action: StoreActionType::Store,
        }
    }

    fn depth(load: LoadActionType, store: StoreActionType) -> DepthStencilAttachmentKey {
        DepthStencilAttachmentKey {
            format: TextureFormat::Depth24PlusStencil8,
            load_action_depth: load,
            load_action_stencil: load,
            store_action_depth: store,
            store_action_stencil: store,
        }
    }

    #[test]
    fn test_loaded_unwritten_depth_is_read_only() {
        assert_eq!(
            vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
            depth(LoadActionType::Load, StoreActionType::None).layout()
        );
        assert_eq!(
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            depth(LoadActionType::Load, StoreActionType::Store).layout()
        );
        assert_eq!(
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            depth(LoadActionType::Clear, StoreActionType::None).layout()
        );
    }

    #[test]
    fn test_read_only_depth_in_subpass() {
        let key = RenderPassKey {
            colors: vec![color(TextureFormat::Rgba8Unorm)],
            depth_stencil: Some(depth(LoadActionType::Load, StoreActionType::None)),
            ..Default::default()
        };
        let layout = subpass_layout(&key, false);
        let depth_ref = layout.depth_stencil.unwrap();
        assert_eq!(1, depth_ref.attachment);
        assert_eq!(vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL, depth_ref.layout);
        // falls back to STORE without VK_EXT_load_store_op_none
        assert_eq!(vk::AttachmentStoreOp::STORE, layout.attachments[1].store_op);
        let layout = subpass_layout(&key, true);
        assert_eq!(vk::AttachmentStoreOp::NONE, layout.attachments[1].store_op);
    }

    #[test]
    fn test_resolve_attachments_come_last() {
        let mut resolved = color(TextureFormat::Rgba8Unorm);
        resolved.store_action = StoreActionType::ResolveStore;
        let key = RenderPassKey {
            colors: vec![resolved, color(TextureFormat::Rgba16Float)],
            depth_stencil: Some(depth(LoadActionType::Clear, StoreActionType::DontCare)),
            sample_count: SampleCount::X4,
            ..Default::default()
        };
        let layout = subpass_layout(&key, true);
        assert_eq!(4, layout.attachments.len());
        assert_eq!(2, layout.resolves.len());
        assert_eq!(3, layout.resolves[0].attachment);
        assert_eq!(vk::ATTACHMENT_UNUSED, layout.resolves[1].attachment);
        assert_eq!(vk::SampleCountFlags::TYPE_1, layout.attachments[3].samples);

        let single = RenderPassKey {
            sample_count: SampleCount::X1,
            ..key
        };
        assert!(subpass_layout(&single, true).resolves.is_empty());
    }

    #[test]
    fn test_shape_shares_pass_identity_splits_framebuffer() {
        let key_a = RenderPassKey {
            colors: vec![color(TextureFormat::Bgra8Unorm)],
            ..Default::default()
        };
        let key_b = key_a.clone();
        assert_eq!(key_a.hash_value(), key_b.hash_value());

        let a = [AttachmentIdentity {
            resource_id: 1,
            mip_slice: None,
            array_slice: None,
        }];
        let b = [AttachmentIdentity {
            resource_id: 2,
            ..a[0]
        }];
        let hash = key_a.hash_value();
        assert_ne!(
            framebuffer_hash(hash, &a, (64, 64), 1),
            framebuffer_hash(hash, &b, (64, 64), 1)
        );
        assert_eq!(
            framebuffer_hash(hash, &a, (64, 64), 1),
            framebuffer_hash(hash, &a, (64, 64), 1)
        );
    }

    #[test]
    fn test_actions_change_the_pass() {
        let key_a = RenderPassKey {
            colors: vec![color(TextureFormat::Bgra8Unorm)],
            ..Default::default()
        };
        let mut key_b = key_a.clone();
        key_b.colors[0].load_action = LoadActionType::Load;
        assert_ne!(key_a.hash_value(), key_b.hash_value());
    }

    #[test]
    fn test_view_mask() {
        let mut key = RenderPassKey::default();
        assert_eq!(0, key.view_mask());
        key.vr_multiview = true;
        key.array_size_minus_one = 1;
        assert_eq!(0b11, key.view_mask());
    }
}
