use std::ffi::CStr;

use ash::vk;
use forge_render::{
    format::TextureFormat,
    settings::{
        vendor, FormatCaps, GpuPresetLevel, GpuSettings, GpuType, GpuVendorPreset,
        WaveOpsSupportFlags,
    },
};
use tracing::{debug, info, warn};

use crate::{convert::VkInto, Result};

fn check_extension(available: &[&CStr], name: &CStr) -> bool {
    if available.contains(&name) {
        debug!("Device extension ✅ YES {:?}", name);
        true
    } else {
        warn!("Device extension ❌ NO  {:?}", name);
        false
    }
}

macro_rules! device_extensions {
    ($($(#[$m:meta])* $field:ident => $name:literal,)*) => {
        /// Support of every optional device extension the backend knows about.
        #[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
        pub struct DeviceExtensions {
            $($(#[$m])* pub $field: bool,)*
        }

        impl DeviceExtensions {
            pub const WANTED: &'static [&'static CStr] = &[$($name,)*];

            /// Marks every wanted extension that is contained in `available`.
            pub fn probe(available: &[&CStr]) -> Self {
                Self {
                    $($field: check_extension(available, $name),)*
                }
            }

            /// Names of all supported extensions, in probe order.
            pub fn names(&self) -> Vec<&'static CStr> {
                let mut names = Vec::with_capacity(Self::WANTED.len());
                $(
                    if self.$field {
                        names.push($name);
                    }
                )*
                names
            }
        }
    };
}

device_extensions! {
    khr_swapchain => c"VK_KHR_swapchain",
    khr_dynamic_rendering => c"VK_KHR_dynamic_rendering",
    khr_draw_indirect_count => c"VK_KHR_draw_indirect_count",
    amd_draw_indirect_count => c"VK_AMD_draw_indirect_count",
    khr_buffer_device_address => c"VK_KHR_buffer_device_address",
    khr_acceleration_structure => c"VK_KHR_acceleration_structure",
    khr_ray_tracing_pipeline => c"VK_KHR_ray_tracing_pipeline",
    khr_ray_query => c"VK_KHR_ray_query",
    khr_deferred_host_operations => c"VK_KHR_deferred_host_operations",
    khr_pipeline_library => c"VK_KHR_pipeline_library",
    khr_spirv_1_4 => c"VK_KHR_spirv_1_4",
    khr_shader_float_controls => c"VK_KHR_shader_float_controls",
    ext_descriptor_indexing => c"VK_EXT_descriptor_indexing",
    khr_sampler_ycbcr_conversion => c"VK_KHR_sampler_ycbcr_conversion",
    khr_fragment_shading_rate => c"VK_KHR_fragment_shading_rate",
    khr_shader_float16_int8 => c"VK_KHR_shader_float16_int8",
    ext_fragment_shader_interlock => c"VK_EXT_fragment_shader_interlock",
    ext_load_store_op_none => c"VK_EXT_load_store_op_none",
    /// Driver side allocation reports, only used with `memory-tracking`.
    ext_device_memory_report => c"VK_EXT_device_memory_report",
    nv_device_diagnostic_checkpoints => c"VK_NV_device_diagnostic_checkpoints",
}

impl DeviceExtensions {
    /// Full raytracing pipelines need all five extensions.
    pub fn raytracing_pipeline(&self) -> bool {
        self.khr_acceleration_structure
            && self.khr_ray_tracing_pipeline
            && self.khr_deferred_host_operations
            && self.khr_pipeline_library
            && self.khr_spirv_1_4
    }

    pub fn ray_query(&self) -> bool {
        self.khr_acceleration_structure && self.khr_ray_query && self.khr_deferred_host_operations
    }

    #[inline]
    pub fn raytracing_supported(&self) -> bool {
        self.raytracing_pipeline() || self.ray_query()
    }

    #[inline]
    pub fn draw_indirect_count(&self) -> bool {
        self.khr_draw_indirect_count || self.amd_draw_indirect_count
    }

    /// Disables extensions known to misbehave on some drivers.
    pub fn apply_vendor_workarounds(&mut self, vendor_id: u32) {
        if vendor_id == vendor::QUALCOMM && self.ext_device_memory_report {
            warn!("disabling VK_EXT_device_memory_report on Qualcomm drivers");
            self.ext_device_memory_report = false;
        }
        if vendor_id != vendor::NVIDIA {
            self.nv_device_diagnostic_checkpoints = false;
        }
        if !cfg!(feature = "memory-tracking") {
            self.ext_device_memory_report = false;
        }
        if !self.raytracing_supported() {
            self.khr_acceleration_structure = false;
            self.khr_ray_tracing_pipeline = false;
            self.khr_ray_query = false;
        }
    }
}

/// One feature struct that is queried (and later enabled) together with the
/// core features.
enum FeatureProbe {
    DynamicRendering(vk::PhysicalDeviceDynamicRenderingFeatures),
    BufferDeviceAddress(vk::PhysicalDeviceBufferDeviceAddressFeatures),
    AccelerationStructure(vk::PhysicalDeviceAccelerationStructureFeaturesKHR),
    RayTracingPipeline(vk::PhysicalDeviceRayTracingPipelineFeaturesKHR),
    RayQuery(vk::PhysicalDeviceRayQueryFeaturesKHR),
    DescriptorIndexing(vk::PhysicalDeviceDescriptorIndexingFeatures),
    SamplerYcbcr(vk::PhysicalDeviceSamplerYcbcrConversionFeatures),
    FragmentShadingRate(vk::PhysicalDeviceFragmentShadingRateFeaturesKHR),
    Float16Int8(vk::PhysicalDeviceShaderFloat16Int8Features),
    FragmentShaderInterlock(vk::PhysicalDeviceFragmentShaderInterlockFeaturesEXT),
    DeviceMemoryReport(vk::PhysicalDeviceDeviceMemoryReportFeaturesEXT),
}

/// Feature structs of all supported extensions.
///
/// Entries are only pushed for supported extensions; the `p_next` links are
/// rebuilt from scratch every time the chain is attached to a query or a
/// create-info.
pub(crate) struct FeatureChain {
    pub core: vk::PhysicalDeviceFeatures,
    probes: Vec<FeatureProbe>,
}

macro_rules! link_probe {
    ($builder:ident, $probe:expr, [$($variant:ident),*]) => {
        match $probe {
            $(
                FeatureProbe::$variant(f) => {
                    f.p_next = std::ptr::null_mut();
                    $builder.push_next(f)
                }
            )*
        }
    };
}

impl FeatureChain {
    pub fn new(ext: &DeviceExtensions) -> Self {
        let mut probes = Vec::new();
        if ext.khr_dynamic_rendering {
            probes.push(FeatureProbe::DynamicRendering(Default::default()));
        }
        if ext.khr_buffer_device_address {
            probes.push(FeatureProbe::BufferDeviceAddress(Default::default()));
        }
        if ext.khr_acceleration_structure {
            probes.push(FeatureProbe::AccelerationStructure(Default::default()));
        }
        if ext.khr_ray_tracing_pipeline {
            probes.push(FeatureProbe::RayTracingPipeline(Default::default()));
        }
        if ext.khr_ray_query {
            probes.push(FeatureProbe::RayQuery(Default::default()));
        }
        if ext.ext_descriptor_indexing {
            probes.push(FeatureProbe::DescriptorIndexing(Default::default()));
        }
        if ext.khr_sampler_ycbcr_conversion {
            probes.push(FeatureProbe::SamplerYcbcr(Default::default()));
        }
        if ext.khr_fragment_shading_rate {
            probes.push(FeatureProbe::FragmentShadingRate(Default::default()));
        }
        if ext.khr_shader_float16_int8 {
            probes.push(FeatureProbe::Float16Int8(Default::default()));
        }
        if ext.ext_fragment_shader_interlock {
            probes.push(FeatureProbe::FragmentShaderInterlock(Default::default()));
        }
        if ext.ext_device_memory_report {
            probes.push(FeatureProbe::DeviceMemoryReport(Default::default()));
        }
        Self {
            core: vk::PhysicalDeviceFeatures::default(),
            probes,
        }
    }

    /// Links all entries behind a `PhysicalDeviceFeatures2` holding `core`.
    pub fn link(&mut self) -> vk::PhysicalDeviceFeatures2Builder<'_> {
        let mut builder = vk::PhysicalDeviceFeatures2::builder().features(self.core);
        for probe in self.probes.iter_mut() {
            builder = link_probe!(
                builder,
                probe,
                [
                    DynamicRendering,
                    BufferDeviceAddress,
                    AccelerationStructure,
                    RayTracingPipeline,
                    RayQuery,
                    DescriptorIndexing,
                    SamplerYcbcr,
                    FragmentShadingRate,
                    Float16Int8,
                    FragmentShaderInterlock,
                    DeviceMemoryReport
                ]
            );
        }
        builder
    }

    pub fn query(&mut self, instance: &ash::Instance, physical_device: vk::PhysicalDevice) {
        let core = {
            let mut features2 = self.link();
            unsafe { instance.get_physical_device_features2(physical_device, &mut features2) };
            features2.features
        };
        self.core = core;
    }

    pub fn features(&self) -> DeviceFeatures {
        let c = &self.core;
        let mut f = DeviceFeatures {
            geometry_shader: c.geometry_shader != 0,
            tessellation_shader: c.tessellation_shader != 0,
            multi_draw_indirect: c.multi_draw_indirect != 0,
            fill_mode_non_solid: c.fill_mode_non_solid != 0,
            sampler_anisotropy: c.sampler_anisotropy != 0,
            pipeline_statistics_query: c.pipeline_statistics_query != 0,
            shader_int64: c.shader_int64 != 0,
            ..Default::default()
        };
        for probe in &self.probes {
            match probe {
                FeatureProbe::DynamicRendering(p) => f.dynamic_rendering = p.dynamic_rendering != 0,
                FeatureProbe::BufferDeviceAddress(p) => {
                    f.buffer_device_address = p.buffer_device_address != 0
                }
                FeatureProbe::AccelerationStructure(p) => {
                    f.acceleration_structure = p.acceleration_structure != 0
                }
                FeatureProbe::RayTracingPipeline(p) => {
                    f.ray_tracing_pipeline = p.ray_tracing_pipeline != 0
                }
                FeatureProbe::RayQuery(p) => f.ray_query = p.ray_query != 0,
                FeatureProbe::DescriptorIndexing(p) => {
                    f.update_after_bind = p.descriptor_binding_sampled_image_update_after_bind != 0
                        && p.descriptor_binding_partially_bound != 0
                }
                FeatureProbe::SamplerYcbcr(p) => {
                    f.sampler_ycbcr_conversion = p.sampler_ycbcr_conversion != 0
                }
                FeatureProbe::FragmentShadingRate(p) => {
                    f.fragment_shading_rate = p.pipeline_fragment_shading_rate != 0
                        || p.attachment_fragment_shading_rate != 0
                }
                FeatureProbe::Float16Int8(p) => {
                    f.shader_float16 = p.shader_float16 != 0;
                    f.shader_int8 = p.shader_int8 != 0;
                }
                FeatureProbe::FragmentShaderInterlock(p) => {
                    f.fragment_shader_interlock = p.fragment_shader_pixel_interlock != 0
                }
                FeatureProbe::DeviceMemoryReport(p) => {
                    f.device_memory_report = p.device_memory_report != 0
                }
            }
        }
        f
    }
}

/// Plain copy of the feature bits the backend looks at after device creation.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct DeviceFeatures {
    pub geometry_shader: bool,
    pub tessellation_shader: bool,
    pub multi_draw_indirect: bool,
    pub fill_mode_non_solid: bool,
    pub sampler_anisotropy: bool,
    pub pipeline_statistics_query: bool,
    pub shader_int64: bool,
    pub dynamic_rendering: bool,
    pub buffer_device_address: bool,
    pub acceleration_structure: bool,
    pub ray_tracing_pipeline: bool,
    pub ray_query: bool,
    pub update_after_bind: bool,
    pub sampler_ycbcr_conversion: bool,
    pub fragment_shading_rate: bool,
    pub shader_float16: bool,
    pub shader_int8: bool,
    pub fragment_shader_interlock: bool,
    pub device_memory_report: bool,
}

/// Capabilities of one physical device (or device group in linked mode).
#[derive(Clone)]
pub struct GpuInfo {
    pub(crate) physical_device: vk::PhysicalDevice,
    /// All members of the device group; empty unless probed for linked mode.
    pub(crate) device_group: Vec<vk::PhysicalDevice>,
    pub(crate) properties: vk::PhysicalDeviceProperties,
    pub(crate) memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub(crate) queue_families: Vec<vk::QueueFamilyProperties>,
    pub(crate) extensions: DeviceExtensions,
    pub(crate) features: DeviceFeatures,
    pub(crate) settings: GpuSettings,
}

impl GpuInfo {
    /// Probes `physical_device`. Returns `None` for CPU devices and devices
    /// without a graphics queue.
    pub(crate) fn query(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device_group: Vec<vk::PhysicalDevice>,
    ) -> Result<Option<Self>> {
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

        if properties.device_type == vk::PhysicalDeviceType::CPU
            || !queue_families
                .iter()
                .any(|f| f.queue_count > 0 && f.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        {
            return Ok(None);
        }

        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        let available = unsafe { instance.enumerate_device_extension_properties(physical_device)? };
        let available: Vec<&CStr> = available
            .iter()
            .map(|e| unsafe { CStr::from_ptr(e.extension_name.as_ptr()) })
            .collect();
        let mut extensions = DeviceExtensions::probe(&available);
        extensions.apply_vendor_workarounds(properties.vendor_id);

        let mut chain = FeatureChain::new(&extensions);
        chain.query(instance, physical_device);
        let features = chain.features();

        let mut subgroup = vk::PhysicalDeviceSubgroupProperties::default();
        {
            let mut properties2 = vk::PhysicalDeviceProperties2::builder().push_next(&mut subgroup);
            unsafe { instance.get_physical_device_properties2(physical_device, &mut properties2) };
        }

        let format_caps = TextureFormat::ALL
            .iter()
            .map(|format| {
                let props = unsafe {
                    instance.get_physical_device_format_properties(
                        physical_device,
                        format.vk_into(),
                    )
                };
                format_caps_from_features(props.optimal_tiling_features)
            })
            .collect();

        let settings = build_settings(
            &properties,
            &memory_properties,
            &extensions,
            &features,
            &subgroup,
            format_caps,
            device_group.len().max(1) as u32,
        );

        Ok(Some(Self {
            physical_device,
            device_group,
            properties,
            memory_properties,
            queue_families,
            extensions,
            features,
            settings,
        }))
    }

    #[inline]
    pub fn settings(&self) -> &GpuSettings {
        &self.settings
    }

    #[inline]
    pub fn extensions(&self) -> &DeviceExtensions {
        &self.extensions
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.settings.vendor.gpu_name
    }

    pub(crate) fn log(&self, index: usize) {
        let s = &self.settings;
        info!(
            "Device #{}\tName: {:?}, type: {:?}, vendor: {:#06x}, driver: {}, VRAM: {} MiB, preset: {:?}",
            index,
            s.vendor.gpu_name,
            s.gpu_type,
            s.vendor.vendor_id,
            s.vendor.driver_version,
            s.vram >> 20,
            s.vendor.preset_level,
        );
        info!("\tQueue Families: {}", self.queue_families.len());
        for (i, queue_family) in self.queue_families.iter().enumerate() {
            info!(
                "\t  #{}:{:4} x {:?}",
                i, queue_family.queue_count, queue_family.queue_flags
            );
        }
    }
}

pub(crate) fn format_caps_from_features(features: vk::FormatFeatureFlags) -> FormatCaps {
    FormatCaps {
        linear_filter: features.contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR),
        shader_read: features.contains(vk::FormatFeatureFlags::SAMPLED_IMAGE),
        shader_write: features.contains(vk::FormatFeatureFlags::STORAGE_IMAGE),
        render_target_write: features.intersects(
            vk::FormatFeatureFlags::COLOR_ATTACHMENT
                | vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        ),
    }
}

pub(crate) fn wave_ops_from_vk(ops: vk::SubgroupFeatureFlags) -> WaveOpsSupportFlags {
    use vk::SubgroupFeatureFlags as S;
    let mut result = WaveOpsSupportFlags::NONE;
    for (vk_flag, flag) in [
        (S::BASIC, WaveOpsSupportFlags::BASIC),
        (S::VOTE, WaveOpsSupportFlags::VOTE),
        (S::ARITHMETIC, WaveOpsSupportFlags::ARITHMETIC),
        (S::BALLOT, WaveOpsSupportFlags::BALLOT),
        (S::SHUFFLE, WaveOpsSupportFlags::SHUFFLE),
        (S::SHUFFLE_RELATIVE, WaveOpsSupportFlags::SHUFFLE_RELATIVE),
        (S::CLUSTERED, WaveOpsSupportFlags::CLUSTERED),
        (S::QUAD, WaveOpsSupportFlags::QUAD),
        (S::PARTITIONED_NV, WaveOpsSupportFlags::PARTITIONED_NV),
    ] {
        if ops.contains(vk_flag) {
            result |= flag;
        }
    }
    result
}

/// Human readable driver version; NVIDIA packs it differently.
pub(crate) fn driver_version_string(vendor_id: u32, version: u32) -> String {
    if vendor_id == vendor::NVIDIA {
        format!(
            "{}.{}.{}.{}",
            (version >> 22) & 0x3ff,
            (version >> 14) & 0xff,
            (version >> 6) & 0xff,
            version & 0x3f
        )
    } else {
        format!(
            "{}.{}.{}",
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version)
        )
    }
}

pub(crate) fn device_local_memory(memory_properties: &vk::PhysicalDeviceMemoryProperties) -> u64 {
    memory_properties.memory_heaps[..memory_properties.memory_heap_count as usize]
        .iter()
        .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
        .map(|heap| heap.size)
        .sum()
}

fn gpu_type_from_vk(device_type: vk::PhysicalDeviceType) -> GpuType {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => GpuType::Discrete,
        vk::PhysicalDeviceType::INTEGRATED_GPU => GpuType::Integrated,
        vk::PhysicalDeviceType::VIRTUAL_GPU => GpuType::Virtual,
        _ => GpuType::Other,
    }
}

fn build_settings(
    properties: &vk::PhysicalDeviceProperties,
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    ext: &DeviceExtensions,
    features: &DeviceFeatures,
    subgroup: &vk::PhysicalDeviceSubgroupProperties,
    format_caps: Vec<FormatCaps>,
    device_group_count: u32,
) -> GpuSettings {
    let limits = &properties.limits;
    let gpu_type = gpu_type_from_vk(properties.device_type);
    let vram = device_local_memory(memory_properties);
    let gpu_name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
        .to_string_lossy()
        .into_owned();
    let raytracing_pipeline = ext.raytracing_pipeline() && features.ray_tracing_pipeline;
    let ray_query = ext.ray_query() && features.ray_query;

    GpuSettings {
        gpu_type,
        vendor: GpuVendorPreset {
            vendor_id: properties.vendor_id,
            model_id: properties.device_id,
            revision_id: 0,
            preset_level: GpuPresetLevel::estimate(gpu_type, vram),
            gpu_name,
            driver_version: driver_version_string(properties.vendor_id, properties.driver_version),
        },
        vram,
        uniform_buffer_alignment: limits.min_uniform_buffer_offset_alignment,
        upload_buffer_texture_alignment: limits.optimal_buffer_copy_offset_alignment,
        upload_buffer_texture_row_alignment: limits.optimal_buffer_copy_row_pitch_alignment,
        max_vertex_input_bindings: limits.max_vertex_input_bindings,
        max_bound_textures: limits.max_per_stage_descriptor_sampled_images,
        max_bound_descriptor_sets: limits.max_bound_descriptor_sets,
        max_push_constant_size: limits.max_push_constants_size,
        max_compute_threads: limits.max_compute_work_group_size,
        max_anisotropy: limits.max_sampler_anisotropy as u32,
        timestamp_period: limits.timestamp_period,
        wave_lane_count: subgroup.subgroup_size,
        wave_ops_support: wave_ops_from_vk(subgroup.supported_operations),
        multi_draw_indirect: features.multi_draw_indirect && limits.max_draw_indirect_count > 1,
        indirect_draw_count: ext.draw_indirect_count(),
        indirect_root_constant: false,
        built_in_draw_id: false,
        rov_supported: features.fragment_shader_interlock,
        tessellation_supported: features.tessellation_shader,
        geometry_shader_supported: features.geometry_shader,
        non_solid_fill: features.fill_mode_non_solid,
        sampler_anisotropy: features.sampler_anisotropy,
        pipeline_statistics_queries: features.pipeline_statistics_query,
        timestamp_queries: limits.timestamp_compute_and_graphics != 0,
        occlusion_queries: true,
        dynamic_rendering: cfg!(feature = "dynamic-rendering")
            && ext.khr_dynamic_rendering
            && features.dynamic_rendering,
        ycbcr_conversion: ext.khr_sampler_ycbcr_conversion && features.sampler_ycbcr_conversion,
        float16: features.shader_float16,
        int8: features.shader_int8,
        buffer_device_address: ext.khr_buffer_device_address && features.buffer_device_address,
        raytracing_pipeline,
        ray_query,
        raytracing_supported: raytracing_pipeline || ray_query,
        fragment_shading_rate: ext.khr_fragment_shading_rate && features.fragment_shading_rate,
        device_group_count,
        format_caps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_keep_fractional_timestamp_period() {
        let mut properties = vk::PhysicalDeviceProperties::default();
        properties.limits.timestamp_period = 0.52;
        let settings = build_settings(
            &properties,
            &vk::PhysicalDeviceMemoryProperties::default(),
            &DeviceExtensions::default(),
            &DeviceFeatures::default(),
            &vk::PhysicalDeviceSubgroupProperties::default(),
            Vec::new(),
            1,
        );
        assert_eq!(0.52, settings.timestamp_period);
    }

    #[test]
    fn test_probe_extensions() {
        let available = [
            c"VK_KHR_swapchain",
            c"VK_KHR_ray_query",
            c"VK_KHR_acceleration_structure",
            c"VK_KHR_deferred_host_operations",
            c"VK_SOMETHING_else",
        ];
        let ext = DeviceExtensions::probe(&available);
        assert!(ext.khr_swapchain);
        assert!(!ext.khr_dynamic_rendering);
        assert!(ext.ray_query());
        assert!(!ext.raytracing_pipeline());
        assert!(ext.raytracing_supported());
        assert_eq!(
            vec![
                c"VK_KHR_swapchain",
                c"VK_KHR_acceleration_structure",
                c"VK_KHR_ray_query",
                c"VK_KHR_deferred_host_operations",
            ],
            ext.names()
        );
    }

    #[test]
    fn test_raytracing_pipeline_needs_all_extensions() {
        let mut available = vec![
            c"VK_KHR_acceleration_structure",
            c"VK_KHR_ray_tracing_pipeline",
            c"VK_KHR_deferred_host_operations",
            c"VK_KHR_pipeline_library",
            c"VK_KHR_spirv_1_4",
        ];
        assert!(DeviceExtensions::probe(&available).raytracing_pipeline());
        available.pop();
        assert!(!DeviceExtensions::probe(&available).raytracing_pipeline());
    }

    #[test]
    fn test_vendor_workarounds() {
        let all = DeviceExtensions::probe(DeviceExtensions::WANTED);

        let mut qcom = all;
        qcom.apply_vendor_workarounds(vendor::QUALCOMM);
        assert!(!qcom.ext_device_memory_report);
        assert!(!qcom.nv_device_diagnostic_checkpoints);
        assert!(qcom.khr_swapchain);

        let mut nv = all;
        nv.apply_vendor_workarounds(vendor::NVIDIA);
        assert!(nv.nv_device_diagnostic_checkpoints);
        assert_eq!(
            cfg!(feature = "memory-tracking"),
            nv.ext_device_memory_report
        );
    }

    #[test]
    fn test_unsupported_raytracing_drops_partial_extensions() {
        let mut ext = DeviceExtensions::probe(&[c"VK_KHR_acceleration_structure"]);
        ext.apply_vendor_workarounds(vendor::AMD);
        assert!(!ext.khr_acceleration_structure);
    }

    #[test]
    fn test_feature_chain_only_supported_entries() {
        let ext = DeviceExtensions::probe(&[c"VK_KHR_dynamic_rendering", c"VK_KHR_ray_query"]);
        let mut chain = FeatureChain::new(&ext);
        assert_eq!(2, chain.probes.len());
        // linking twice must not create a cycle
        let _ = chain.link();
        let features2 = chain.link();
        let mut count = 0;
        let mut next = features2.p_next as *const vk::BaseOutStructure;
        while !next.is_null() {
            count += 1;
            next = unsafe { (*next).p_next };
        }
        assert_eq!(2, count);
    }

    #[test]
    fn test_wave_ops() {
        assert_eq!(
            WaveOpsSupportFlags::BASIC | WaveOpsSupportFlags::BALLOT,
            wave_ops_from_vk(vk::SubgroupFeatureFlags::BASIC | vk::SubgroupFeatureFlags::BALLOT)
        );
    }

    #[test]
    fn test_driver_version_string() {
        let nv = (535 << 22) | (98 << 14) | (1 << 6);
        assert_eq!("535.98.1.0", driver_version_string(vendor::NVIDIA, nv));
        assert_eq!(
            "23.1.4",
            driver_version_string(vendor::AMD, vk::make_api_version(0, 23, 1, 4))
        );
    }

    #[test]
    fn test_format_caps() {
        let caps = format_caps_from_features(
            vk::FormatFeatureFlags::SAMPLED_IMAGE | vk::FormatFeatureFlags::COLOR_ATTACHMENT,
        );
        assert!(caps.shader_read);
        assert!(caps.render_target_write);
        assert!(!caps.shader_write);
        assert!(!caps.linear_filter);
    }
}
