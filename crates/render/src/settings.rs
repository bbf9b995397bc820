use std::cmp::Ordering;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::format::TextureFormat;

#[derive(
    Copy, Clone, Default, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
pub enum GpuMode {
    #[default]
    Single,
    /// Several GPUs driven as one device group.
    Linked,
    /// Independent renderers on separate GPUs sharing one context.
    Unlinked,
}

#[derive(
    Copy, Clone, Default, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
pub enum ShaderTarget {
    Spirv10,
    Spirv13,
    #[default]
    Spirv15,
    Spirv16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RendererContextDesc {
    pub instance_layers: Vec<String>,
    pub instance_extensions: Vec<String>,
    pub enable_gpu_based_validation: bool,
    pub debug_utils: bool,
}

impl Default for RendererContextDesc {
    fn default() -> Self {
        Self {
            instance_layers: Vec::new(),
            instance_extensions: Vec::new(),
            enable_gpu_based_validation: false,
            debug_utils: cfg!(debug_assertions),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RendererDesc {
    pub instance_layers: Vec<String>,
    pub instance_extensions: Vec<String>,
    pub device_extensions: Vec<String>,
    pub request_all_available_queues: bool,
    pub shader_target: ShaderTarget,
    pub gpu_mode: GpuMode,
    /// GPU of a shared context to use; picks the best one when `None`.
    pub gpu_index: Option<u32>,
    pub enable_gpu_based_validation: bool,
    /// Always use render-pass objects even if dynamic rendering is available.
    pub disable_dynamic_rendering: bool,
}

impl RendererDesc {
    pub fn context_desc(&self) -> RendererContextDesc {
        RendererContextDesc {
            instance_layers: self.instance_layers.clone(),
            instance_extensions: self.instance_extensions.clone(),
            enable_gpu_based_validation: self.enable_gpu_based_validation,
            ..RendererContextDesc::default()
        }
    }
}

#[derive(
    Copy, Clone, Default, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
pub enum GpuPresetLevel {
    #[default]
    None,
    Office,
    Low,
    Medium,
    High,
    Ultra,
}

#[derive(
    Copy, Clone, Default, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
pub enum GpuType {
    #[default]
    Other,
    Virtual,
    Integrated,
    Discrete,
}

impl GpuPresetLevel {
    /// Rough estimate used when no external preset table is consulted.
    pub fn estimate(gpu_type: GpuType, vram: u64) -> Self {
        const GIB: u64 = 1 << 30;
        match gpu_type {
            GpuType::Discrete if vram >= 8 * GIB => Self::High,
            GpuType::Discrete => Self::Medium,
            GpuType::Integrated => Self::Low,
            GpuType::Virtual => Self::Office,
            GpuType::Other => Self::None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuVendorPreset {
    pub vendor_id: u32,
    pub model_id: u32,
    pub revision_id: u32,
    pub preset_level: GpuPresetLevel,
    pub gpu_name: String,
    pub driver_version: String,
}

pub mod vendor {
    pub const AMD: u32 = 0x1002;
    pub const IMGTEC: u32 = 0x1010;
    pub const NVIDIA: u32 = 0x10DE;
    pub const ARM: u32 = 0x13B5;
    pub const QUALCOMM: u32 = 0x5143;
    pub const INTEL: u32 = 0x8086;
    pub const APPLE: u32 = 0x106B;
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct WaveOpsSupportFlags: u32 {
        const NONE = 0;
        const BASIC = 0x1;
        const VOTE = 0x2;
        const ARITHMETIC = 0x4;
        const BALLOT = 0x8;
        const SHUFFLE = 0x10;
        const SHUFFLE_RELATIVE = 0x20;
        const CLUSTERED = 0x40;
        const QUAD = 0x80;
        const PARTITIONED_NV = 0x100;
        const ALL = 0x7FFF_FFFF;
    }
}

/// Per-format capability bits.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FormatCaps {
    pub linear_filter: bool,
    pub shader_read: bool,
    pub shader_write: bool,
    pub render_target_write: bool,
}

/// Snapshot of one GPU's capabilities, filled in while probing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GpuSettings {
    pub gpu_type: GpuType,
    pub vendor: GpuVendorPreset,
    pub vram: u64,
    pub uniform_buffer_alignment: u64,
    pub upload_buffer_texture_alignment: u64,
    pub upload_buffer_texture_row_alignment: u64,
    pub max_vertex_input_bindings: u32,
    pub max_bound_textures: u32,
    pub max_bound_descriptor_sets: u32,
    pub max_push_constant_size: u32,
    pub max_compute_threads: [u32; 3],
    pub max_anisotropy: u32,
    /// Nanoseconds per timestamp tick.
    pub timestamp_period: f32,
    pub wave_lane_count: u32,
    pub wave_ops_support: WaveOpsSupportFlags,
    pub multi_draw_indirect: bool,
    pub indirect_draw_count: bool,
    pub indirect_root_constant: bool,
    pub built_in_draw_id: bool,
    pub rov_supported: bool,
    pub tessellation_supported: bool,
    pub geometry_shader_supported: bool,
    pub non_solid_fill: bool,
    pub sampler_anisotropy: bool,
    pub pipeline_statistics_queries: bool,
    pub timestamp_queries: bool,
    pub occlusion_queries: bool,
    pub dynamic_rendering: bool,
    pub ycbcr_conversion: bool,
    pub float16: bool,
    pub int8: bool,
    pub buffer_device_address: bool,
    pub raytracing_pipeline: bool,
    pub ray_query: bool,
    pub raytracing_supported: bool,
    pub fragment_shading_rate: bool,
    pub device_group_count: u32,
    /// Indexed by [`TextureFormat::index`].
    pub format_caps: Vec<FormatCaps>,
}

impl GpuSettings {
    pub fn format_caps(&self, format: TextureFormat) -> FormatCaps {
        self.format_caps
            .get(format.index())
            .copied()
            .unwrap_or_default()
    }

    /// Orders GPUs from worst to best: preset level, then GPU type, then VRAM.
    pub fn preference_cmp(&self, other: &Self) -> Ordering {
        self.vendor
            .preset_level
            .cmp(&other.vendor.preset_level)
            .then_with(|| self.gpu_type.cmp(&other.gpu_type))
            .then_with(|| self.vram.cmp(&other.vram))
    }
}

/// Index of the preferred GPU; the first one wins ties.
pub fn select_best_gpu(gpus: &[GpuSettings]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, gpu) in gpus.iter().enumerate() {
        match best {
            Some(b) if gpu.preference_cmp(&gpus[b]) != Ordering::Greater => {}
            _ => best = Some(i),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gpu(gpu_type: GpuType, preset_level: GpuPresetLevel, vram: u64) -> GpuSettings {
        GpuSettings {
            gpu_type,
            vram,
            vendor: GpuVendorPreset {
                preset_level,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_select_best_gpu_by_preset() {
        let gpus = [
            gpu(GpuType::Integrated, GpuPresetLevel::Low, 1 << 30),
            gpu(GpuType::Discrete, GpuPresetLevel::High, 1 << 30),
            gpu(GpuType::Discrete, GpuPresetLevel::Medium, 16 << 30),
        ];
        assert_eq!(Some(1), select_best_gpu(&gpus));
    }

    #[test]
    fn test_select_best_gpu_ties() {
        let gpus = [
            gpu(GpuType::Discrete, GpuPresetLevel::High, 1 << 30),
            gpu(GpuType::Discrete, GpuPresetLevel::High, 1 << 30),
        ];
        assert_eq!(Some(0), select_best_gpu(&gpus));
        assert_eq!(None, select_best_gpu(&[]));
    }

    #[test]
    fn test_select_best_gpu_prefers_vram() {
        let gpus = [
            gpu(GpuType::Discrete, GpuPresetLevel::High, 1 << 30),
            gpu(GpuType::Discrete, GpuPresetLevel::High, 4 << 30),
        ];
        assert_eq!(Some(1), select_best_gpu(&gpus));
    }

    #[test]
    fn test_estimate_preset() {
        assert_eq!(
            GpuPresetLevel::High,
            GpuPresetLevel::estimate(GpuType::Discrete, 8 << 30)
        );
        assert_eq!(
            GpuPresetLevel::Low,
            GpuPresetLevel::estimate(GpuType::Integrated, 8 << 30)
        );
    }
}
