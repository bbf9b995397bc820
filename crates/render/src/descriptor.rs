use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::{format::TextureDimension, sampler::SamplerDesc, MAX_DESCRIPTOR_SETS};

bitflags! {
    /// Shader-visible usages of a resource.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct DescriptorType: u32 {
        const UNDEFINED = 0;
        const SAMPLER = 0x1;
        /// SRV read only texture
        const TEXTURE = 0x2;
        /// UAV texture
        const RW_TEXTURE = 0x4;
        /// SRV read only buffer
        const BUFFER = 0x8;
        const BUFFER_RAW = 0x8 | 0x10;
        /// UAV buffer
        const RW_BUFFER = 0x20;
        const RW_BUFFER_RAW = 0x20 | 0x40;
        const UNIFORM_BUFFER = 0x80;
        /// Push constant / root constant
        const ROOT_CONSTANT = 0x100;
        const VERTEX_BUFFER = 0x200;
        const INDEX_BUFFER = 0x400;
        const INDIRECT_BUFFER = 0x800;
        const TEXTURE_CUBE = 0x2 | 0x1000;
        const RENDER_TARGET_MIP_SLICES = 0x2000;
        const RENDER_TARGET_ARRAY_SLICES = 0x4000;
        const RENDER_TARGET_DEPTH_SLICES = 0x8000;
        const RAY_TRACING = 0x10000;
        const INDIRECT_COMMAND_BUFFER = 0x20000;
        const INPUT_ATTACHMENT = 0x40000;
        const TEXEL_BUFFER = 0x80000;
        const RW_TEXEL_BUFFER = 0x100000;
        const COMBINED_IMAGE_SAMPLER = 0x200000;
        const ACCELERATION_STRUCTURE = 0x400000;
        const ACCELERATION_STRUCTURE_BUILD_INPUT = 0x800000;
        const SHADER_DEVICE_ADDRESS = 0x1000000;
        const SHADER_BINDING_TABLE = 0x2000000;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ShaderStages: u32 {
        const NONE = 0;
        const VERTEX = 0x1;
        const TESS_CONTROL = 0x2;
        const TESS_EVALUATION = 0x4;
        const GEOMETRY = 0x8;
        const FRAGMENT = 0x10;
        const COMPUTE = 0x20;
        const RAYTRACING = 0x40;

        const ALL_GRAPHICS = 0x1 | 0x2 | 0x4 | 0x8 | 0x10;
        const ALL = 0x7F;
    }
}

/// How often a descriptor set is expected to change; doubles as the set index.
#[derive(
    Copy, Clone, Default, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum DescriptorUpdateFrequency {
    #[default]
    None = 0,
    PerFrame = 1,
    PerBatch = 2,
    PerDraw = 3,
}

impl DescriptorUpdateFrequency {
    pub const ALL: [Self; MAX_DESCRIPTOR_SETS] =
        [Self::None, Self::PerFrame, Self::PerBatch, Self::PerDraw];

    #[inline]
    pub const fn set_index(self) -> usize {
        self as usize
    }
}

/// One binding of a descriptor-set layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DescriptorInfo {
    pub name: String,
    pub descriptor_type: DescriptorType,
    pub binding: u32,
    /// Array size of the binding; size in bytes for root constants.
    pub count: u32,
    pub stages: ShaderStages,
    pub dimension: TextureDimension,
    /// Sampler baked into the layout instead of being written at update time.
    pub static_sampler: Option<SamplerDesc>,
}

impl DescriptorInfo {
    pub fn new(
        name: impl Into<String>,
        descriptor_type: DescriptorType,
        binding: u32,
        stages: ShaderStages,
    ) -> Self {
        Self {
            name: name.into(),
            descriptor_type,
            binding,
            count: 1,
            stages,
            dimension: TextureDimension::D2,
            static_sampler: None,
        }
    }

    #[inline]
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    #[inline]
    pub fn with_dimension(mut self, dimension: TextureDimension) -> Self {
        self.dimension = dimension;
        self
    }

    #[inline]
    pub fn with_static_sampler(mut self, sampler: SamplerDesc) -> Self {
        self.static_sampler = Some(sampler);
        self
    }

    #[inline]
    pub fn is_root_constant(&self) -> bool {
        self.descriptor_type.contains(DescriptorType::ROOT_CONSTANT)
    }
}

/// Shape of one descriptor set. Layouts with identical content share one native object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DescriptorSetLayoutDesc {
    pub descriptors: Vec<DescriptorInfo>,
}

impl DescriptorSetLayoutDesc {
    pub fn new(descriptors: Vec<DescriptorInfo>) -> Self {
        Self { descriptors }
    }

    pub fn find(&self, name: &str) -> Option<(usize, &DescriptorInfo)> {
        self.descriptors
            .iter()
            .enumerate()
            .find(|(_, d)| d.name == name)
    }

    /// `true` when every binding is a static sampler.
    pub fn is_static_samplers_only(&self) -> bool {
        !self.descriptors.is_empty()
            && self
                .descriptors
                .iter()
                .all(|d| d.static_sampler.is_some())
    }

    /// Bindings that end up in the native layout (root constants are push constants).
    pub fn bindings(&self) -> impl Iterator<Item = &DescriptorInfo> {
        self.descriptors.iter().filter(|d| !d.is_root_constant())
    }

    pub fn root_constants(&self) -> impl Iterator<Item = &DescriptorInfo> {
        self.descriptors.iter().filter(|d| d.is_root_constant())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::hash::content_hash;

    fn layout() -> DescriptorSetLayoutDesc {
        DescriptorSetLayoutDesc::new(vec![
            DescriptorInfo::new("uniforms", DescriptorType::UNIFORM_BUFFER, 0, ShaderStages::VERTEX),
            DescriptorInfo::new("albedo", DescriptorType::TEXTURE, 1, ShaderStages::FRAGMENT)
                .with_count(4),
            DescriptorInfo::new("smp", DescriptorType::SAMPLER, 2, ShaderStages::FRAGMENT)
                .with_static_sampler(SamplerDesc::default()),
        ])
    }

    #[test]
    fn test_identical_layouts_hash_equal() {
        assert_eq!(content_hash(&layout()), content_hash(&layout()));
        let mut other = layout();
        other.descriptors[1].count = 5;
        assert_ne!(content_hash(&layout()), content_hash(&other));
    }

    #[test]
    fn test_static_samplers_only() {
        assert!(!layout().is_static_samplers_only());
        let samplers = DescriptorSetLayoutDesc::new(vec![
            DescriptorInfo::new("smp", DescriptorType::SAMPLER, 0, ShaderStages::FRAGMENT)
                .with_static_sampler(SamplerDesc::default()),
        ]);
        assert!(samplers.is_static_samplers_only());
        assert!(!DescriptorSetLayoutDesc::default().is_static_samplers_only());
    }

    #[test]
    fn test_find_by_name() {
        let layout = layout();
        assert_eq!(Some(1), layout.find("albedo").map(|(i, _)| i));
        assert_eq!(None, layout.find("missing").map(|(i, _)| i));
    }
}
