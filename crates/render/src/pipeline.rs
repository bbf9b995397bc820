use std::hash::{Hash, Hasher};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::{
    format::{SampleCount, TextureFormat},
    MAX_RENDER_TARGET_ATTACHMENTS,
};

#[derive(
    Copy, Clone, Default, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    #[default]
    Always,
}

#[derive(
    Copy, Clone, Default, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
pub enum StencilOperation {
    #[default]
    Keep,
    Zero,
    Replace,
    Invert,
    IncrementClamp,
    DecrementClamp,
    IncrementWrap,
    DecrementWrap,
}

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub enum BlendOperation {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub enum BlendFactor {
    Zero,
    One,
    Src,
    OneMinusSrc,
    SrcAlpha,
    OneMinusSrcAlpha,
    Dst,
    OneMinusDst,
    DstAlpha,
    OneMinusDstAlpha,
    SrcAlphaSaturated,
    Constant,
    OneMinusConstant,
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ColorWrite: u32 {
        const RED = 1;
        const GREEN = 2;
        const BLUE = 4;
        const ALPHA = 8;

        const NONE = 0;
        const ALL = 0xF;
    }
}

impl Default for ColorWrite {
    fn default() -> Self {
        Self::ALL
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlendComponent {
    pub operation: BlendOperation,
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
}

impl BlendComponent {
    pub const REPLACE: Self = Self {
        operation: BlendOperation::Add,
        src_factor: BlendFactor::One,
        dst_factor: BlendFactor::Zero,
    };
}

impl Default for BlendComponent {
    fn default() -> Self {
        Self::REPLACE
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlendState {
    pub color: BlendComponent,
    pub alpha: BlendComponent,
}

impl BlendState {
    pub const ALPHA_BLENDING: Self = Self {
        color: BlendComponent {
            operation: BlendOperation::Add,
            src_factor: BlendFactor::SrcAlpha,
            dst_factor: BlendFactor::OneMinusSrcAlpha,
        },
        alpha: BlendComponent {
            operation: BlendOperation::Add,
            src_factor: BlendFactor::One,
            dst_factor: BlendFactor::OneMinusSrcAlpha,
        },
    };
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColorTargetBlend {
    /// `None` disables blending for the target.
    pub blend: Option<BlendState>,
    pub write_mask: ColorWrite,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlendStateDesc {
    /// Blend state per color attachment; only the first one is used unless
    /// `independent_blend` is set.
    pub targets: [ColorTargetBlend; MAX_RENDER_TARGET_ATTACHMENTS],
    pub alpha_to_coverage: bool,
    pub independent_blend: bool,
}

impl BlendStateDesc {
    #[inline]
    pub fn target(&self, index: usize) -> &ColorTargetBlend {
        if self.independent_blend {
            &self.targets[index]
        } else {
            &self.targets[0]
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StencilFaceState {
    pub compare: CompareFunction,
    pub fail_op: StencilOperation,
    pub depth_fail_op: StencilOperation,
    pub pass_op: StencilOperation,
}

impl StencilFaceState {
    pub const IGNORE: Self = Self {
        compare: CompareFunction::Always,
        fail_op: StencilOperation::Keep,
        depth_fail_op: StencilOperation::Keep,
        pass_op: StencilOperation::Keep,
    };
}

impl Default for StencilFaceState {
    fn default() -> Self {
        Self::IGNORE
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DepthStateDesc {
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_func: CompareFunction,
    pub stencil_test: bool,
    pub stencil_read_mask: u8,
    pub stencil_write_mask: u8,
    pub front: StencilFaceState,
    pub back: StencilFaceState,
}

impl DepthStateDesc {
    pub const DISABLED: Self = Self {
        depth_test: false,
        depth_write: false,
        depth_func: CompareFunction::Always,
        stencil_test: false,
        stencil_read_mask: 0xFF,
        stencil_write_mask: 0xFF,
        front: StencilFaceState::IGNORE,
        back: StencilFaceState::IGNORE,
    };

    /// Returns true if the state mutates neither depth nor stencil.
    pub fn is_read_only(&self) -> bool {
        !self.depth_write && (!self.stencil_test || self.stencil_write_mask == 0)
    }
}

impl Default for DepthStateDesc {
    fn default() -> Self {
        Self::DISABLED
    }
}

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Face {
    Front,
    Back,
}

#[derive(
    Copy, Clone, Default, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
pub enum PolygonMode {
    #[default]
    Fill,
    Line,
    Point,
}

#[derive(
    Copy, Clone, Default, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
pub enum FrontFace {
    #[default]
    CounterClockwise,
    Clockwise,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
pub struct RasterizerStateDesc {
    pub cull_mode: Option<Face>,
    pub depth_bias: i32,
    pub slope_scaled_depth_bias: f32,
    pub fill_mode: PolygonMode,
    pub front_face: FrontFace,
    pub multisample: bool,
    pub scissor: bool,
    pub depth_clamp: bool,
}

impl RasterizerStateDesc {
    pub const DEFAULT: Self = Self {
        cull_mode: None,
        depth_bias: 0,
        slope_scaled_depth_bias: 0.0,
        fill_mode: PolygonMode::Fill,
        front_face: FrontFace::CounterClockwise,
        multisample: false,
        scissor: false,
        depth_clamp: false,
    };
}

impl Default for RasterizerStateDesc {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl Eq for RasterizerStateDesc {}

impl PartialEq for RasterizerStateDesc {
    fn eq(&self, other: &Self) -> bool {
        self.cull_mode == other.cull_mode
            && self.depth_bias == other.depth_bias
            && self.slope_scaled_depth_bias.to_bits() == other.slope_scaled_depth_bias.to_bits()
            && self.fill_mode == other.fill_mode
            && self.front_face == other.front_face
            && self.multisample == other.multisample
            && self.scissor == other.scissor
            && self.depth_clamp == other.depth_clamp
    }
}

impl Hash for RasterizerStateDesc {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.cull_mode.hash(state);
        state.write_i32(self.depth_bias);
        state.write_u32(self.slope_scaled_depth_bias.to_bits());
        self.fill_mode.hash(state);
        self.front_face.hash(state);
        self.multisample.hash(state);
        self.scissor.hash(state);
        self.depth_clamp.hash(state);
    }
}

#[derive(
    Copy, Clone, Default, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
    PatchList,
}

#[derive(
    Copy, Clone, Default, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
pub enum VertexStepMode {
    #[default]
    Vertex,
    Instance,
}

#[derive(
    Copy, Clone, Default, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
pub enum VertexFormat {
    Uint8x2,
    Uint8x4,
    Sint8x2,
    Sint8x4,
    Unorm8x2,
    Unorm8x4,
    Snorm8x2,
    Snorm8x4,
    Uint16x2,
    Uint16x4,
    Sint16x2,
    Sint16x4,
    Unorm16x2,
    Unorm16x4,
    Snorm16x2,
    Snorm16x4,
    Float16x2,
    Float16x4,
    Float32,
    Float32x2,
    Float32x3,
    #[default]
    Float32x4,
    Uint32,
    Uint32x2,
    Uint32x3,
    Uint32x4,
    Sint32,
    Sint32x2,
    Sint32x3,
    Sint32x4,
}

impl VertexFormat {
    pub const fn size(self) -> u32 {
        match self {
            Self::Uint8x2 | Self::Sint8x2 | Self::Unorm8x2 | Self::Snorm8x2 => 2,
            Self::Uint8x4
            | Self::Sint8x4
            | Self::Unorm8x4
            | Self::Snorm8x4
            | Self::Uint16x2
            | Self::Sint16x2
            | Self::Unorm16x2
            | Self::Snorm16x2
            | Self::Float16x2
            | Self::Float32
            | Self::Uint32
            | Self::Sint32 => 4,
            Self::Uint16x4
            | Self::Sint16x4
            | Self::Unorm16x4
            | Self::Snorm16x4
            | Self::Float16x4
            | Self::Float32x2
            | Self::Uint32x2
            | Self::Sint32x2 => 8,
            Self::Float32x3 | Self::Uint32x3 | Self::Sint32x3 => 12,
            Self::Float32x4 | Self::Uint32x4 | Self::Sint32x4 => 16,
        }
    }
}

#[derive(
    Copy, Clone, Default, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
pub enum IndexFormat {
    Uint16,
    #[default]
    Uint32,
}

impl IndexFormat {
    #[inline]
    pub const fn size(self) -> u32 {
        match self {
            Self::Uint16 => 2,
            Self::Uint32 => 4,
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VertexBinding {
    /// `0` derives the stride from the attributes of the binding.
    pub stride: u32,
    pub step_mode: VertexStepMode,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VertexAttrib {
    pub format: VertexFormat,
    pub binding: u32,
    pub location: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VertexLayout {
    pub bindings: Vec<VertexBinding>,
    pub attribs: Vec<VertexAttrib>,
}

impl VertexLayout {
    /// Stride of `binding`, derived from its attributes when not given.
    pub fn stride(&self, binding: u32) -> u32 {
        match self.bindings.get(binding as usize) {
            Some(b) if b.stride != 0 => b.stride,
            _ => self
                .attribs
                .iter()
                .filter(|a| a.binding == binding)
                .map(|a| a.offset + a.format.size())
                .max()
                .unwrap_or(0),
        }
    }
}

/// Fixed-function state of a graphics pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphicsPipelineState {
    pub topology: PrimitiveTopology,
    pub patch_control_points: u32,
    pub vertex_layout: Option<VertexLayout>,
    pub blend: Option<BlendStateDesc>,
    pub depth: Option<DepthStateDesc>,
    pub rasterizer: Option<RasterizerStateDesc>,
    pub color_formats: Vec<TextureFormat>,
    pub depth_stencil_format: Option<TextureFormat>,
    pub sample_count: SampleCount,
    pub vr_multiview: bool,
    pub vr_foveated_rendering: bool,
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct PipelineCacheFlags: u32 {
        const NONE = 0;
        /// The cache is only accessed from one thread at a time.
        const EXTERNALLY_SYNCHRONIZED = 0x1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_stride_is_derived() {
        let layout = VertexLayout {
            bindings: vec![VertexBinding::default()],
            attribs: vec![
                VertexAttrib {
                    format: VertexFormat::Float32x3,
                    binding: 0,
                    location: 0,
                    offset: 0,
                },
                VertexAttrib {
                    format: VertexFormat::Float32x2,
                    binding: 0,
                    location: 1,
                    offset: 12,
                },
            ],
        };
        assert_eq!(20, layout.stride(0));
        assert_eq!(0, layout.stride(1));
    }

    #[test]
    fn test_blend_target_shares_first_unless_independent() {
        let mut desc = BlendStateDesc::default();
        desc.targets[0].blend = Some(BlendState::ALPHA_BLENDING);
        assert_eq!(Some(BlendState::ALPHA_BLENDING), desc.target(3).blend);
        desc.independent_blend = true;
        assert_eq!(None, desc.target(3).blend);
    }

    #[test]
    fn test_depth_state_read_only() {
        assert!(DepthStateDesc::DISABLED.is_read_only());
        let write = DepthStateDesc {
            depth_test: true,
            depth_write: true,
            ..DepthStateDesc::DISABLED
        };
        assert!(!write.is_read_only());
    }
}
