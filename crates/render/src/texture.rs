use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::{
    descriptor::DescriptorType,
    format::{SampleCount, TextureDimension, TextureFormat},
    state::ResourceState,
};

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct TextureCreationFlags: u32 {
        const NONE = 0;
        /// Request a dedicated allocation.
        const OWN_MEMORY = 0x1;
        /// Memory can be exported to another API or process.
        const EXPORT = 0x2;
        const EXPORT_ADAPTER = 0x4;
        const IMPORT = 0x8;
        const ESRAM = 0x10;
        /// Tile-local attachment; lazily allocated memory when available.
        const ON_TILE = 0x20;
        const NO_COMPRESSION = 0x40;
        const FORCE_2D = 0x80;
        const FORCE_3D = 0x100;
        const ALLOW_DISPLAY_TARGET = 0x200;
        const SRGB = 0x400;
        const NORMAL_MAP = 0x800;
        const FAST_CLEAR = 0x1000;
        const FRAG_MASK = 0x2000;
        const VR_MULTIVIEW = 0x4000;
        const VR_FOVEATED_RENDERING = 0x8000;
        /// Creates a single-sample companion target MSAA content is resolved into.
        const CREATE_RESOLVE_ATTACHMENT = 0x10000;
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

impl ClearValue {
    pub const BLACK: Self = Self::Color([0.0, 0.0, 0.0, 0.0]);
    pub const DEPTH_ONE: Self = Self::DepthStencil {
        depth: 1.0,
        stencil: 0,
    };

    pub fn default_for_format(format: TextureFormat) -> Self {
        if format.is_depth_or_stencil() {
            Self::DEPTH_ONE
        } else {
            Self::BLACK
        }
    }
}

impl Default for ClearValue {
    fn default() -> Self {
        Self::BLACK
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextureDesc {
    pub name: Option<String>,
    pub flags: TextureCreationFlags,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub array_size: u32,
    pub mip_levels: u32,
    pub sample_count: SampleCount,
    pub format: TextureFormat,
    pub clear_value: ClearValue,
    pub start_state: ResourceState,
    pub descriptors: DescriptorType,
    pub node_index: u32,
    pub shared_node_indices: Vec<u32>,
}

impl TextureDesc {
    pub fn new_2d(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            name: None,
            flags: TextureCreationFlags::NONE,
            width,
            height,
            depth: 1,
            array_size: 1,
            mip_levels: 1,
            sample_count: SampleCount::X1,
            format,
            clear_value: ClearValue::default_for_format(format),
            start_state: ResourceState::UNDEFINED,
            descriptors: DescriptorType::TEXTURE,
            node_index: 0,
            shared_node_indices: Vec::new(),
        }
    }

    /// Shader view shape implied by the size and flags.
    pub fn dimension(&self) -> TextureDimension {
        let cube = self.descriptors.contains(DescriptorType::TEXTURE_CUBE);
        let array = self.array_size > 1;
        if self.depth > 1 || self.flags.contains(TextureCreationFlags::FORCE_3D) {
            TextureDimension::D3
        } else if cube {
            if self.array_size > 6 {
                TextureDimension::CubeArray
            } else {
                TextureDimension::Cube
            }
        } else if self.height > 1 || self.flags.contains(TextureCreationFlags::FORCE_2D) {
            match (self.sample_count != SampleCount::X1, array) {
                (true, true) => TextureDimension::D2MsArray,
                (true, false) => TextureDimension::D2Ms,
                (false, true) => TextureDimension::D2Array,
                (false, false) => TextureDimension::D2,
            }
        } else if array {
            TextureDimension::D1Array
        } else {
            TextureDimension::D1
        }
    }
}

impl Default for TextureDesc {
    fn default() -> Self {
        Self::new_2d(1, 1, TextureFormat::DEFAULT)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderTargetDesc {
    pub name: Option<String>,
    pub flags: TextureCreationFlags,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub array_size: u32,
    pub mip_levels: u32,
    pub sample_count: SampleCount,
    pub format: TextureFormat,
    pub clear_value: ClearValue,
    /// Defaults to `RENDER_TARGET` or `DEPTH_WRITE` by format.
    pub start_state: ResourceState,
    /// Extra shader usages; `RENDER_TARGET_*_SLICES` request per-slice views.
    pub descriptors: DescriptorType,
    pub node_index: u32,
    pub shared_node_indices: Vec<u32>,
}

impl RenderTargetDesc {
    pub fn new(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            name: None,
            flags: TextureCreationFlags::NONE,
            width,
            height,
            depth: 1,
            array_size: 1,
            mip_levels: 1,
            sample_count: SampleCount::X1,
            format,
            clear_value: ClearValue::default_for_format(format),
            start_state: ResourceState::UNDEFINED,
            descriptors: DescriptorType::UNDEFINED,
            node_index: 0,
            shared_node_indices: Vec::new(),
        }
    }

    /// State the target is transitioned into right after creation.
    pub fn initial_state(&self) -> ResourceState {
        if !self.start_state.is_empty() {
            self.start_state
        } else if self.format.is_depth_or_stencil() {
            ResourceState::DEPTH_WRITE
        } else {
            ResourceState::RENDER_TARGET
        }
    }

    /// `true` if separate views per array (or depth) slice were requested.
    #[inline]
    pub fn wants_slice_views(&self) -> bool {
        self.descriptors.intersects(
            DescriptorType::RENDER_TARGET_ARRAY_SLICES | DescriptorType::RENDER_TARGET_DEPTH_SLICES,
        )
    }

    /// Backing texture description.
    pub fn to_texture_desc(&self) -> TextureDesc {
        TextureDesc {
            name: self.name.clone(),
            flags: self.flags,
            width: self.width,
            height: self.height,
            depth: self.depth,
            array_size: self.array_size,
            mip_levels: self.mip_levels,
            sample_count: self.sample_count,
            format: self.format,
            clear_value: self.clear_value,
            start_state: self.initial_state(),
            descriptors: self.descriptors,
            node_index: self.node_index,
            shared_node_indices: self.shared_node_indices.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_from_size() {
        let mut desc = TextureDesc::new_2d(4, 4, TextureFormat::Rgba8Unorm);
        assert_eq!(TextureDimension::D2, desc.dimension());
        desc.array_size = 3;
        assert_eq!(TextureDimension::D2Array, desc.dimension());
        desc.height = 1;
        assert_eq!(TextureDimension::D1Array, desc.dimension());
        desc.depth = 4;
        assert_eq!(TextureDimension::D3, desc.dimension());

        let mut cube = TextureDesc::new_2d(4, 4, TextureFormat::Rgba8Unorm);
        cube.descriptors |= DescriptorType::TEXTURE_CUBE;
        cube.array_size = 6;
        assert_eq!(TextureDimension::Cube, cube.dimension());
        cube.array_size = 12;
        assert_eq!(TextureDimension::CubeArray, cube.dimension());
    }

    #[test]
    fn test_render_target_initial_state() {
        let color = RenderTargetDesc::new(2, 2, TextureFormat::Rgba8Unorm);
        assert_eq!(ResourceState::RENDER_TARGET, color.initial_state());
        let depth = RenderTargetDesc::new(2, 2, TextureFormat::Depth32Float);
        assert_eq!(ResourceState::DEPTH_WRITE, depth.initial_state());
        assert_eq!(ResourceState::DEPTH_WRITE, depth.to_texture_desc().start_state);
        assert_eq!(
            ClearValue::DEPTH_ONE,
            RenderTargetDesc::new(1, 1, TextureFormat::Depth16Unorm).clear_value
        );
    }
}
