use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::pipeline::CompareFunction;

#[derive(
    Copy, Clone, Default, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
pub enum FilterType {
    Nearest,
    #[default]
    Linear,
}

#[derive(
    Copy, Clone, Default, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
pub enum MipMapMode {
    Nearest,
    #[default]
    Linear,
}

#[derive(
    Copy, Clone, Default, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
pub enum AddressMode {
    Mirror,
    #[default]
    Repeat,
    ClampToEdge,
    ClampToBorder,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
pub struct SamplerDesc {
    pub min_filter: FilterType,
    pub mag_filter: FilterType,
    pub mip_map_mode: MipMapMode,
    pub address_u: AddressMode,
    pub address_v: AddressMode,
    pub address_w: AddressMode,
    pub mip_lod_bias: f32,
    /// Use `min_lod`/`max_lod` instead of the full mip range.
    pub set_lod_range: bool,
    pub min_lod: f32,
    pub max_lod: f32,
    /// Values above `1.0` enable anisotropic filtering.
    pub max_anisotropy: f32,
    pub compare: Option<CompareFunction>,
}

impl SamplerDesc {
    pub const DEFAULT: Self = Self {
        min_filter: FilterType::Linear,
        mag_filter: FilterType::Linear,
        mip_map_mode: MipMapMode::Linear,
        address_u: AddressMode::Repeat,
        address_v: AddressMode::Repeat,
        address_w: AddressMode::Repeat,
        mip_lod_bias: 0.0,
        set_lod_range: false,
        min_lod: 0.0,
        max_lod: 0.0,
        max_anisotropy: 0.0,
        compare: None,
    };

    pub const NEAREST_CLAMP: Self = Self {
        min_filter: FilterType::Nearest,
        mag_filter: FilterType::Nearest,
        mip_map_mode: MipMapMode::Nearest,
        address_u: AddressMode::ClampToEdge,
        address_v: AddressMode::ClampToEdge,
        address_w: AddressMode::ClampToEdge,
        ..Self::DEFAULT
    };
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl Eq for SamplerDesc {}

impl PartialEq for SamplerDesc {
    fn eq(&self, other: &Self) -> bool {
        self.min_filter == other.min_filter
            && self.mag_filter == other.mag_filter
            && self.mip_map_mode == other.mip_map_mode
            && self.address_u == other.address_u
            && self.address_v == other.address_v
            && self.address_w == other.address_w
            && self.mip_lod_bias.to_bits() == other.mip_lod_bias.to_bits()
            && self.set_lod_range == other.set_lod_range
            && self.min_lod.to_bits() == other.min_lod.to_bits()
            && self.max_lod.to_bits() == other.max_lod.to_bits()
            && self.max_anisotropy.to_bits() == other.max_anisotropy.to_bits()
            && self.compare == other.compare
    }
}

impl Hash for SamplerDesc {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.min_filter.hash(state);
        self.mag_filter.hash(state);
        self.mip_map_mode.hash(state);
        self.address_u.hash(state);
        self.address_v.hash(state);
        self.address_w.hash(state);
        state.write_u32(self.mip_lod_bias.to_bits());
        self.set_lod_range.hash(state);
        state.write_u32(self.min_lod.to_bits());
        state.write_u32(self.max_lod.to_bits());
        state.write_u32(self.max_anisotropy.to_bits());
        self.compare.hash(state);
    }
}
