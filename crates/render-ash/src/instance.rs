use std::{
    ffi::{CStr, CString},
    ops::Deref,
    os::raw::c_char,
    sync::Arc,
};

use ash::{
    extensions::{ext, khr},
    vk,
};
use forge_render::{
    settings::{GpuMode, RendererContextDesc},
    MAX_LINKED_GPUS, MAX_MULTIPLE_GPUS,
};
use tracing::{debug, info, warn};

use crate::{capabilities::GpuInfo, debug_utils::DebugUtils, Error, ErrorNoExtension, Result};

pub const ENGINE_NAME: &[u8] = concat!(env!("CARGO_PKG_NAME"), "\0").as_bytes();
pub const ENGINE_VERSION: u32 = parse_version(env!("CARGO_PKG_VERSION"));
pub const VK_API_VERSION: u32 = vk::API_VERSION_1_2;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

pub struct AshInstance {
    instance_raw: ash::Instance,
    entry: ash::Entry,
    instance_layers: Vec<CString>,
    instance_extensions: Vec<CString>,
    ext_debug_utils: Option<DebugUtils>,
    ext_surface: Option<khr::Surface>,
}

impl Deref for AshInstance {
    type Target = ash::Instance;
    #[inline]
    fn deref(&self) -> &ash::Instance {
        &self.instance_raw
    }
}

impl AshInstance {
    pub(crate) fn new(app_name: &str, desc: &RendererContextDesc) -> Result<Self> {
        let _span = tracing::trace_span!("CreateInstance").entered();
        let entry = unsafe { ash::Entry::load()? };
        let app_name = CString::new(app_name).map_err(|_| Error::InvalidDesc("app_name"))?;

        let instance_layers = get_instance_layers(&entry, desc)?;
        let instance_extensions = get_instance_extensions(&entry, desc, &instance_layers)?;

        let layers_ptr: Vec<*const c_char> = instance_layers.iter().map(|l| l.as_ptr()).collect();
        let extensions_ptr: Vec<*const c_char> =
            instance_extensions.iter().map(|e| e.as_ptr()).collect();
        let gpu_based_validation = desc.enable_gpu_based_validation
            && instance_layers.iter().any(|l| l.as_c_str() == VALIDATION_LAYER);
        let instance_raw = create_instance(
            &entry,
            &app_name,
            &layers_ptr,
            &extensions_ptr,
            gpu_based_validation,
        )?;

        let mut instance = Self {
            entry,
            instance_raw,
            instance_layers,
            instance_extensions,
            ext_debug_utils: None,
            ext_surface: None,
        };

        if instance.has_instance_extension(DebugUtils::name()) {
            instance.ext_debug_utils = Some(DebugUtils::new(
                instance.entry(),
                &instance.instance_raw,
                cfg!(feature = "validation"),
            )?);
        }

        if instance.has_instance_extension(khr::Surface::name()) {
            instance.ext_surface = Some(khr::Surface::new(instance.entry(), &instance));
        }

        Ok(instance)
    }

    #[inline]
    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    #[inline]
    pub fn has_instance_extension(&self, name: &CStr) -> bool {
        self.instance_extensions.iter().any(|e| e.as_c_str() == name)
    }

    #[inline]
    pub fn has_instance_layer(&self, name: &CStr) -> bool {
        self.instance_layers.iter().any(|l| l.as_c_str() == name)
    }

    #[inline]
    pub(crate) fn ext_surface(&self) -> Result<&khr::Surface, ErrorNoExtension> {
        self.ext_surface
            .as_ref()
            .ok_or(ErrorNoExtension(khr::Surface::name()))
    }

    #[inline]
    pub(crate) fn ext_debug_utils(&self) -> Result<&DebugUtils, ErrorNoExtension> {
        self.ext_debug_utils
            .as_ref()
            .ok_or(ErrorNoExtension(ext::DebugUtils::name()))
    }

    /// Members of every device group; single devices form a group of one.
    fn physical_device_groups(&self) -> Result<Vec<Vec<vk::PhysicalDevice>>> {
        let count = unsafe { self.instance_raw.enumerate_physical_device_groups_len()? };
        let mut groups = vec![vk::PhysicalDeviceGroupProperties::default(); count];
        unsafe {
            self.instance_raw
                .enumerate_physical_device_groups(&mut groups)?
        };
        Ok(groups
            .iter()
            .map(|g| {
                let n = (g.physical_device_count as usize).min(MAX_LINKED_GPUS);
                g.physical_devices[..n].to_vec()
            })
            .collect())
    }
}

impl Drop for AshInstance {
    fn drop(&mut self) {
        self.ext_debug_utils = None;
        unsafe { self.instance_raw.destroy_instance(None) }
    }
}

/// Keeps the entries of `wanted` that are contained in `available`, dropping
/// duplicates.
fn negotiate(kind: &str, wanted: Vec<CString>, available: &[&CStr]) -> Vec<CString> {
    let mut result: Vec<CString> = Vec::with_capacity(wanted.len());
    for name in wanted {
        if result.contains(&name) {
            continue;
        }
        if available.contains(&name.as_c_str()) {
            debug!("Instance {} ✅ YES {:?}", kind, name);
            result.push(name);
        } else {
            warn!("Instance {} ❌ NO  {:?}", kind, name);
        }
    }
    result
}

fn to_cstrings(names: &[String]) -> Vec<CString> {
    names
        .iter()
        .filter_map(|n| CString::new(n.as_str()).ok())
        .collect()
}

fn get_instance_layers(entry: &ash::Entry, desc: &RendererContextDesc) -> Result<Vec<CString>> {
    let available = entry.enumerate_instance_layer_properties()?;
    let available: Vec<&CStr> = available
        .iter()
        .map(|l| unsafe { CStr::from_ptr(l.layer_name.as_ptr()) })
        .collect();

    let mut wanted = Vec::new();
    if cfg!(feature = "validation") || desc.enable_gpu_based_validation {
        wanted.push(VALIDATION_LAYER.to_owned());
    }
    wanted.extend(to_cstrings(&desc.instance_layers));
    Ok(negotiate("layer", wanted, &available))
}

fn get_instance_extensions(
    entry: &ash::Entry,
    desc: &RendererContextDesc,
    layers: &[CString],
) -> Result<Vec<CString>> {
    // extensions provided by the enabled layers count as available too
    let mut properties = entry.enumerate_instance_extension_properties(None)?;
    for layer in layers {
        if let Ok(layer_properties) =
            entry.enumerate_instance_extension_properties(Some(layer.as_c_str()))
        {
            properties.extend(layer_properties);
        }
    }
    let available: Vec<&CStr> = properties
        .iter()
        .map(|e| unsafe { CStr::from_ptr(e.extension_name.as_ptr()) })
        .collect();

    let mut wanted: Vec<CString> = Vec::with_capacity(8);
    wanted.push(khr::Surface::name().to_owned());
    if cfg!(target_os = "windows") {
        wanted.push(khr::Win32Surface::name().to_owned());
    } else if cfg!(target_os = "android") {
        wanted.push(khr::AndroidSurface::name().to_owned());
    } else if cfg!(unix) {
        wanted.push(khr::XlibSurface::name().to_owned());
        wanted.push(khr::XcbSurface::name().to_owned());
        wanted.push(khr::WaylandSurface::name().to_owned());
    }
    if desc.debug_utils || cfg!(feature = "validation") || cfg!(feature = "debug-names") {
        wanted.push(DebugUtils::name().to_owned());
    }
    wanted.extend(to_cstrings(&desc.instance_extensions));

    Ok(negotiate("extension", wanted, &available))
}

fn create_instance(
    entry: &ash::Entry,
    app_name: &CStr,
    layers_ptr: &[*const c_char],
    extensions_ptr: &[*const c_char],
    gpu_based_validation: bool,
) -> Result<ash::Instance> {
    let engine_name = unsafe { CStr::from_bytes_with_nul_unchecked(ENGINE_NAME) };
    let app_info = vk::ApplicationInfo::builder()
        .application_name(app_name)
        .application_version(ENGINE_VERSION)
        .engine_name(engine_name)
        .engine_version(ENGINE_VERSION)
        .api_version(VK_API_VERSION);

    let enabled_validation_features = [vk::ValidationFeatureEnableEXT::GPU_ASSISTED];
    let mut validation_features = vk::ValidationFeaturesEXT::builder()
        .enabled_validation_features(&enabled_validation_features);

    let mut create_info = vk::InstanceCreateInfo::builder()
        .application_info(&app_info)
        .enabled_layer_names(layers_ptr)
        .enabled_extension_names(extensions_ptr);
    if gpu_based_validation {
        info!("GPU based validation enabled");
        create_info = create_info.push_next(&mut validation_features);
    }

    let instance = unsafe { entry.create_instance(&create_info, None)? };
    Ok(instance)
}

/// Instance and the GPUs found on the system.
///
/// One context can be shared by several renderers (unlinked multi-GPU mode).
pub struct RendererContext {
    instance: Arc<AshInstance>,
    gpus: Vec<GpuInfo>,
}

impl RendererContext {
    pub fn new(app_name: &str, desc: &RendererContextDesc) -> Result<Arc<Self>> {
        Ok(Arc::new(Self::with_gpu_mode(app_name, desc, GpuMode::Single)?))
    }

    pub(crate) fn with_gpu_mode(
        app_name: &str,
        desc: &RendererContextDesc,
        gpu_mode: GpuMode,
    ) -> Result<Self> {
        let instance = Arc::new(AshInstance::new(app_name, desc)?);
        let gpus = enumerate_gpus(&instance, gpu_mode)?;
        if gpus.is_empty() {
            warn!("No suitable GPU found!");
            return Err(Error::NoAdapter);
        }
        Ok(Self { instance, gpus })
    }

    #[inline]
    pub fn gpus(&self) -> &[GpuInfo] {
        &self.gpus
    }

    #[inline]
    pub(crate) fn instance(&self) -> &Arc<AshInstance> {
        &self.instance
    }
}

fn enumerate_gpus(instance: &AshInstance, gpu_mode: GpuMode) -> Result<Vec<GpuInfo>> {
    let candidates: Vec<Vec<vk::PhysicalDevice>> = if gpu_mode == GpuMode::Linked {
        instance.physical_device_groups()?
    } else {
        unsafe { instance.enumerate_physical_devices()? }
            .into_iter()
            .map(|pd| vec![pd])
            .collect()
    };
    info!(
        "{} devices (GPU) found with vulkan support.",
        candidates.len()
    );

    let mut gpus = Vec::with_capacity(candidates.len());
    for group in candidates.into_iter().take(MAX_MULTIPLE_GPUS) {
        let Some(&physical_device) = group.first() else {
            continue;
        };
        let device_group = if gpu_mode == GpuMode::Linked {
            group
        } else {
            Vec::new()
        };
        if let Some(gpu) = GpuInfo::query(instance, physical_device, device_group)? {
            gpu.log(gpus.len());
            gpus.push(gpu);
        }
    }
    Ok(gpus)
}

macro_rules! parse_int_iteration {
    ($value:ident += $input:ident[$pos:expr]) => {
        if $input.len() <= $pos {
            return ($value, $pos);
        }
        $value *= 10;
        let c = $input[$pos];
        if c < '0' as u8 || c > '9' as u8 {
            if c != '.' as u8 && c != '-' as u8 {
                panic!("invalid character in version");
            }
            return ($value / 10, $pos + 1);
        }
        $value += c as u32 - '0' as u32;
    };
}

#[inline]
const fn const_parse_decimal_u32(input: &[u8], offset: usize) -> (u32, usize) {
    let mut value = 0;
    parse_int_iteration!(value += input[offset]);
    parse_int_iteration!(value += input[offset + 1]);
    parse_int_iteration!(value += input[offset + 2]);
    parse_int_iteration!(value += input[offset + 3]);
    parse_int_iteration!(value += input[offset + 4]);
    parse_int_iteration!(value += input[offset + 5]);
    (value, offset + 6)
}

const fn parse_version(version: &str) -> u32 {
    let version = version.as_bytes();
    let (major, i) = const_parse_decimal_u32(version, 0);
    let (minor, j) = const_parse_decimal_u32(version, i);
    let (patch, _) = const_parse_decimal_u32(version, j);
    vk::make_api_version(0, major, minor, patch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version() {
        assert_eq!(vk::make_api_version(0, 1, 22, 3), parse_version("1.22.3"));
        assert_eq!(vk::make_api_version(0, 0, 1, 0), parse_version("0.1.0-alpha"));
    }

    #[test]
    fn test_negotiate_filters_and_dedups() {
        let wanted = vec![
            c"VK_KHR_surface".to_owned(),
            c"VK_EXT_debug_utils".to_owned(),
            c"VK_KHR_surface".to_owned(),
            c"VK_missing".to_owned(),
        ];
        let available = [c"VK_EXT_debug_utils", c"VK_KHR_surface", c"VK_other"];
        assert_eq!(
            vec![c"VK_KHR_surface".to_owned(), c"VK_EXT_debug_utils".to_owned()],
            negotiate("extension", wanted, &available)
        );
    }

    #[test]
    fn test_to_cstrings_skips_interior_nul() {
        let names = vec!["VK_LAYER_a".to_string(), "bad\0name".to_string()];
        assert_eq!(vec![c"VK_LAYER_a".to_owned()], to_cstrings(&names));
    }
}
