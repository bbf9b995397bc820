use std::{
    ffi::{c_void, CStr, CString},
    ops::Deref,
    os::raw::c_char,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use ash::{extensions::khr, vk};
use forge_render::{
    settings::{GpuSettings, RendererDesc},
    state::QueueType,
    utils::hash::{content_hash, U64HashMap},
};
use gpu_descriptor::DescriptorAllocator;
use tracing::{debug, error, info, warn};

use crate::{
    alloc::{lock, AshAllocator},
    barrier::StageCaps,
    cache::SharedCaches,
    capabilities::{DeviceExtensions, DeviceFeatures, FeatureChain, GpuInfo},
    convert::VkInto,
    instance::AshInstance,
    renderer::DeviceLostInfo,
    Error, ErrorNoExtension, Result,
};

pub(crate) type AshDescriptorAllocator =
    DescriptorAllocator<vk::DescriptorPool, vk::DescriptorSet>;

pub(crate) type DeviceLostCallback = Box<dyn Fn(&DeviceLostInfo) + Send + Sync>;

/// Queue family and index a queue was assigned to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct QueueSlot {
    pub family_index: u32,
    pub queue_index: u32,
    pub family_flags: vk::QueueFlags,
    /// `false` for the shared fallback queue, which is not counted.
    pub counted: bool,
}

/// Picks a queue of `queue_type`.
///
/// Graphics always takes the first graphics capable family. Other types prefer
/// a family with exactly the required flags, then the least specialized
/// non-graphics family, then any family with the required flags that still
/// has unused queues. If everything is used up, queue 0 of family 0 is shared.
pub(crate) fn select_queue_family(
    families: &[vk::QueueFamilyProperties],
    available: &[u32],
    used: &[u32],
    queue_type: QueueType,
) -> QueueSlot {
    let required: vk::QueueFlags = queue_type.vk_into();
    let has_free = |i: usize| used[i] < available[i];
    let slot = |i: usize, queue_index: u32| QueueSlot {
        family_index: i as u32,
        queue_index,
        family_flags: families[i].queue_flags,
        counted: true,
    };

    let mut best: Option<(usize, u32)> = None;
    for (i, family) in families.iter().enumerate() {
        let flags = family.queue_flags;
        let graphics = flags.contains(vk::QueueFlags::GRAPHICS);
        if queue_type == QueueType::Graphics && graphics {
            return slot(i, 0);
        }
        let matching = flags & required;
        if matching.is_empty() || !has_free(i) {
            continue;
        }
        if (flags & !required).is_empty() {
            return slot(i, used[i]);
        }
        let extra = (flags.as_raw() - matching.as_raw()).count_ones();
        if !graphics && best.is_none_or(|(_, e)| extra < e) {
            best = Some((i, extra));
        }
    }
    if let Some((i, _)) = best {
        return slot(i, used[i]);
    }

    for (i, family) in families.iter().enumerate() {
        if family.queue_flags.intersects(required) && has_free(i) {
            return slot(i, used[i]);
        }
    }

    warn!(
        "Could not find queue of type {:?}. Using default queue",
        queue_type
    );
    QueueSlot {
        family_index: 0,
        queue_index: 0,
        family_flags: families.first().map_or(vk::QueueFlags::empty(), |f| f.queue_flags),
        counted: false,
    }
}

fn find_queue_lock(
    locks: &[Vec<Arc<Mutex<()>>>],
    family_index: u32,
    queue_index: u32,
) -> Option<Arc<Mutex<()>>> {
    locks
        .get(family_index as usize)?
        .get(queue_index as usize)
        .cloned()
}

struct QueueUsage {
    available: Vec<u32>,
    /// Indexed by `[node][family]`.
    used: Vec<Vec<u32>>,
}

/// Number of distinct checkpoint labels kept for the device-lost dump.
const MAX_CHECKPOINT_LABELS: usize = 1024;

/// Labels of the most recent checkpoints.
///
/// A checkpoint marker is `slot + 1`, so the null marker is never used.
/// Slots are recycled in insertion order.
#[derive(Default)]
struct CheckpointLabels {
    labels: Vec<(u64, String)>,
    slots: U64HashMap<usize>,
    next: usize,
}

impl CheckpointLabels {
    fn marker(&mut self, label: &str) -> usize {
        let hash = content_hash(label);
        if let Some(&slot) = self.slots.get(&hash) {
            return slot + 1;
        }
        let slot = self.next;
        self.next = (self.next + 1) % MAX_CHECKPOINT_LABELS;
        if let Some(entry) = self.labels.get_mut(slot) {
            let (evicted, _) = std::mem::replace(entry, (hash, label.to_owned()));
            self.slots.remove(&evicted);
        } else {
            self.labels.push((hash, label.to_owned()));
        }
        self.slots.insert(hash, slot);
        slot + 1
    }

    fn label(&self, marker: usize) -> Option<&str> {
        let slot = marker.checked_sub(1)?;
        self.labels.get(slot).map(|(_, label)| label.as_str())
    }
}

#[derive(Default)]
struct DeviceLostState {
    callback: Mutex<Option<DeviceLostCallback>>,
    reset_requested: AtomicBool,
    checkpoint_labels: Mutex<CheckpointLabels>,
}

pub struct AshDevice {
    device_raw: ash::Device,
    instance: Arc<AshInstance>,
    gpu: GpuInfo,
    device_extensions: Vec<CString>,
    ext_swapchain: Option<khr::Swapchain>,
    ext_dynamic_rendering: Option<khr::DynamicRendering>,
    ext_draw_indirect_count: Option<khr::DrawIndirectCount>,
    amd_draw_indirect_count: Option<vk::AmdDrawIndirectCountFn>,
    ext_acceleration_structure: Option<khr::AccelerationStructure>,
    ext_buffer_device_address: Option<khr::BufferDeviceAddress>,
    nv_checkpoints: Option<vk::NvDeviceDiagnosticCheckpointsFn>,
    queue_usage: Mutex<QueueUsage>,
    queue_locks: Vec<Vec<Arc<Mutex<()>>>>,
    allocator: Box<AshAllocator>,
    descriptor_allocator: Mutex<AshDescriptorAllocator>,
    internal_sets: Mutex<U64HashMap<gpu_descriptor::DescriptorSet<vk::DescriptorSet>>>,
    caches: SharedCaches,
    next_resource_id: AtomicU64,
    device_lost: DeviceLostState,
    dynamic_rendering: bool,
}

impl Deref for AshDevice {
    type Target = ash::Device;
    #[inline]
    fn deref(&self) -> &ash::Device {
        &self.device_raw
    }
}

unsafe extern "system" fn device_memory_report(
    p_callback_data: *const vk::DeviceMemoryReportCallbackDataEXT,
    p_user_data: *mut c_void,
) {
    if p_callback_data.is_null() || p_user_data.is_null() {
        return;
    }
    let data = unsafe { &*p_callback_data };
    let allocated = unsafe { &*(p_user_data as *const AtomicU64) };
    match data.ty {
        vk::DeviceMemoryReportEventTypeEXT::ALLOCATE
        | vk::DeviceMemoryReportEventTypeEXT::IMPORT => {
            allocated.fetch_add(data.size, Ordering::Relaxed);
        }
        vk::DeviceMemoryReportEventTypeEXT::FREE
        | vk::DeviceMemoryReportEventTypeEXT::UNIMPORT => {
            allocated.fetch_sub(data.size, Ordering::Relaxed);
        }
        _ => {}
    }
    tracing::trace!(
        "device memory {:?}: {} bytes, heap {}",
        data.ty,
        data.size,
        data.heap_index
    );
}

impl AshDevice {
    pub(crate) fn new(
        instance: &Arc<AshInstance>,
        gpu: &GpuInfo,
        desc: &RendererDesc,
    ) -> Result<Arc<Self>> {
        let _span = tracing::trace_span!("CreateDevice").entered();
        let physical_device = gpu.physical_device;

        let device_extensions = get_device_extensions(instance, gpu, desc)?;
        let extensions_ptr: Vec<*const c_char> =
            device_extensions.iter().map(|e| e.as_ptr()).collect();

        let (available, priorities) = queue_counts(&gpu.queue_families, desc);
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = available
            .iter()
            .enumerate()
            .filter(|&(_, &count)| count > 0)
            .map(|(family, &count)| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family as u32)
                    .queue_priorities(&priorities[..count as usize])
                    .build()
            })
            .collect();

        let mut chain = FeatureChain::new(&gpu.extensions);
        chain.query(instance, physical_device);
        let mut features2 = chain.link();

        let allocator = Box::new(AshAllocator::new(
            instance,
            physical_device,
            gpu.features.buffer_device_address,
            gpu.extensions.ext_device_memory_report,
        )?);

        let mut device_group_info =
            vk::DeviceGroupDeviceCreateInfo::builder().physical_devices(&gpu.device_group);
        let mut memory_report_info = vk::DeviceDeviceMemoryReportCreateInfoEXT::builder()
            .pfn_user_callback(Some(device_memory_report))
            .user_data(&allocator.driver_allocated_bytes as *const AtomicU64 as *mut c_void);

        let mut create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions_ptr)
            .push_next(&mut features2);
        if gpu.device_group.len() > 1 {
            info!("linked mode with {} GPUs", gpu.device_group.len());
            create_info = create_info.push_next(&mut device_group_info);
        }
        if gpu.extensions.ext_device_memory_report {
            create_info = create_info.push_next(&mut memory_report_info);
        }

        let device_raw = unsafe { instance.create_device(physical_device, &create_info, None)? };

        let queue_locks = available
            .iter()
            .map(|&count| (0..count).map(|_| Arc::new(Mutex::new(()))).collect())
            .collect();
        let node_count = gpu.device_group.len().max(1);
        let queue_usage = QueueUsage {
            used: vec![vec![0; available.len()]; node_count],
            available,
        };

        let max_update_after_bind = if gpu.features.update_after_bind {
            gpu.properties
                .limits
                .max_per_stage_descriptor_sampled_images
        } else {
            0
        };

        let has = |name: &CStr| device_extensions.iter().any(|e| e.as_c_str() == name);
        let ext_swapchain =
            has(khr::Swapchain::name()).then(|| khr::Swapchain::new(instance, &device_raw));
        let ext_dynamic_rendering = has(khr::DynamicRendering::name())
            .then(|| khr::DynamicRendering::new(instance, &device_raw));
        let ext_draw_indirect_count = has(khr::DrawIndirectCount::name())
            .then(|| khr::DrawIndirectCount::new(instance, &device_raw));
        let ext_acceleration_structure = has(khr::AccelerationStructure::name())
            .then(|| khr::AccelerationStructure::new(instance, &device_raw));
        let ext_buffer_device_address = has(khr::BufferDeviceAddress::name())
            .then(|| khr::BufferDeviceAddress::new(instance, &device_raw));
        let handle = device_raw.handle();
        let load = |name: &CStr| unsafe {
            std::mem::transmute::<vk::PFN_vkVoidFunction, *const c_void>(
                instance.get_device_proc_addr(handle, name.as_ptr()),
            )
        };
        let amd_draw_indirect_count = (gpu.extensions.amd_draw_indirect_count
            && !gpu.extensions.khr_draw_indirect_count)
            .then(|| vk::AmdDrawIndirectCountFn::load(load));
        let nv_checkpoints = gpu
            .extensions
            .nv_device_diagnostic_checkpoints
            .then(|| vk::NvDeviceDiagnosticCheckpointsFn::load(load));

        let dynamic_rendering = gpu.settings.dynamic_rendering
            && !desc.disable_dynamic_rendering
            && ext_dynamic_rendering.is_some();
        debug!("dynamic rendering: {}", dynamic_rendering);

        Ok(Arc::new(Self {
            device_raw,
            instance: instance.clone(),
            gpu: gpu.clone(),
            device_extensions,
            ext_swapchain,
            ext_dynamic_rendering,
            ext_draw_indirect_count,
            amd_draw_indirect_count,
            ext_acceleration_structure,
            ext_buffer_device_address,
            nv_checkpoints,
            queue_usage: Mutex::new(queue_usage),
            queue_locks,
            allocator,
            descriptor_allocator: Mutex::new(DescriptorAllocator::new(max_update_after_bind)),
            internal_sets: Mutex::new(U64HashMap::default()),
            caches: SharedCaches::default(),
            next_resource_id: AtomicU64::new(1),
            device_lost: DeviceLostState::default(),
            dynamic_rendering,
        }))
    }

    #[inline]
    pub fn instance(&self) -> &AshInstance {
        &self.instance
    }

    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.gpu.physical_device
    }

    #[inline]
    pub(crate) fn gpu(&self) -> &GpuInfo {
        &self.gpu
    }

    #[inline]
    pub fn settings(&self) -> &GpuSettings {
        &self.gpu.settings
    }

    #[inline]
    pub(crate) fn extensions(&self) -> &DeviceExtensions {
        &self.gpu.extensions
    }

    #[inline]
    pub(crate) fn features(&self) -> &DeviceFeatures {
        &self.gpu.features
    }

    /// Optional pipeline stages used when deriving barrier stage masks.
    pub(crate) fn stage_caps(&self) -> StageCaps {
        let features = &self.gpu.features;
        StageCaps {
            geometry_shader: features.geometry_shader,
            tessellation: features.tessellation_shader,
            raytracing: self.gpu.extensions.raytracing_supported(),
            fragment_shading_rate: features.fragment_shading_rate,
        }
    }

    #[inline]
    pub(crate) fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.gpu.properties.limits
    }

    #[inline]
    pub(crate) fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.gpu.memory_properties
    }

    /// Number of GPUs in the device group; `1` outside of linked mode.
    #[inline]
    pub fn node_count(&self) -> u32 {
        self.gpu.device_group.len().max(1) as u32
    }

    #[inline]
    pub fn is_linked(&self) -> bool {
        self.gpu.device_group.len() > 1
    }

    #[inline]
    pub fn has_device_extension(&self, name: &CStr) -> bool {
        self.device_extensions.iter().any(|e| e.as_c_str() == name)
    }

    #[inline]
    pub fn uses_dynamic_rendering(&self) -> bool {
        self.dynamic_rendering
    }

    #[inline]
    pub(crate) fn allocator(&self) -> &AshAllocator {
        &self.allocator
    }

    #[inline]
    pub(crate) fn descriptor_allocator(
        &self,
    ) -> std::sync::MutexGuard<'_, AshDescriptorAllocator> {
        lock(&self.descriptor_allocator)
    }

    #[inline]
    pub(crate) fn internal_sets(
        &self,
    ) -> &Mutex<U64HashMap<gpu_descriptor::DescriptorSet<vk::DescriptorSet>>> {
        &self.internal_sets
    }

    #[inline]
    pub(crate) fn caches(&self) -> &SharedCaches {
        &self.caches
    }

    /// Unique identity for resources, never reused during the device's lifetime.
    #[inline]
    pub(crate) fn next_resource_id(&self) -> u64 {
        self.next_resource_id.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn ext_swapchain(&self) -> Result<&khr::Swapchain, ErrorNoExtension> {
        self.ext_swapchain
            .as_ref()
            .ok_or(ErrorNoExtension(khr::Swapchain::name()))
    }

    #[inline]
    pub(crate) fn ext_dynamic_rendering(
        &self,
    ) -> Result<&khr::DynamicRendering, ErrorNoExtension> {
        self.ext_dynamic_rendering
            .as_ref()
            .ok_or(ErrorNoExtension(khr::DynamicRendering::name()))
    }

    #[inline]
    pub(crate) fn ext_draw_indirect_count(&self) -> Option<&khr::DrawIndirectCount> {
        self.ext_draw_indirect_count.as_ref()
    }

    /// `true` if a count-buffer draw can be recorded.
    #[inline]
    pub(crate) fn has_draw_indirect_count(&self) -> bool {
        self.ext_draw_indirect_count.is_some() || self.amd_draw_indirect_count.is_some()
    }

    #[inline]
    pub(crate) fn amd_draw_indirect_count(&self) -> Option<&vk::AmdDrawIndirectCountFn> {
        self.amd_draw_indirect_count.as_ref()
    }

    #[inline]
    pub(crate) fn ext_acceleration_structure(
        &self,
    ) -> Result<&khr::AccelerationStructure, ErrorNoExtension> {
        self.ext_acceleration_structure
            .as_ref()
            .ok_or(ErrorNoExtension(khr::AccelerationStructure::name()))
    }

    #[inline]
    pub(crate) fn ext_buffer_device_address(
        &self,
    ) -> Result<&khr::BufferDeviceAddress, ErrorNoExtension> {
        self.ext_buffer_device_address
            .as_ref()
            .ok_or(ErrorNoExtension(khr::BufferDeviceAddress::name()))
    }

    #[inline]
    pub unsafe fn object_name<H: vk::Handle>(&self, handle: H, name: &str) {
        if !cfg!(feature = "debug-names") {
            return;
        }
        if let Ok(debug_utils) = self.instance.ext_debug_utils() {
            unsafe { debug_utils.set_object_name(self.handle(), handle, name) }
        }
    }

    pub(crate) fn acquire_queue_slot(&self, queue_type: QueueType, node_index: u32) -> QueueSlot {
        let mut usage = lock(&self.queue_usage);
        let node = (node_index as usize).min(usage.used.len() - 1);
        let slot = select_queue_family(
            &self.gpu.queue_families,
            &usage.available,
            &usage.used[node],
            queue_type,
        );
        if slot.counted {
            usage.used[node][slot.family_index as usize] += 1;
        }
        slot
    }

    pub(crate) fn release_queue_slot(&self, slot: &QueueSlot, node_index: u32) {
        if !slot.counted {
            return;
        }
        let mut usage = lock(&self.queue_usage);
        let node = (node_index as usize).min(usage.used.len() - 1);
        let used = &mut usage.used[node][slot.family_index as usize];
        *used = used.saturating_sub(1);
    }

    /// Lock serializing submits to one native queue, `None` for a queue the
    /// device was not created with.
    pub(crate) fn queue_lock(
        &self,
        family_index: u32,
        queue_index: u32,
    ) -> Option<Arc<Mutex<()>>> {
        find_queue_lock(&self.queue_locks, family_index, queue_index)
    }

    pub(crate) fn set_device_lost_callback(&self, callback: Option<DeviceLostCallback>) {
        *lock(&self.device_lost.callback) = callback;
    }

    pub(crate) fn take_reset_request(&self) -> bool {
        self.device_lost.reset_requested.swap(false, Ordering::AcqRel)
    }

    #[inline]
    pub(crate) fn has_checkpoints(&self) -> bool {
        self.nv_checkpoints.is_some()
    }

    /// Records a checkpoint labeled `label` into `command_buffer`.
    pub(crate) unsafe fn cmd_set_checkpoint(&self, command_buffer: vk::CommandBuffer, label: &str) {
        let Some(nv) = &self.nv_checkpoints else {
            return;
        };
        let marker = lock(&self.device_lost.checkpoint_labels).marker(label);
        unsafe { (nv.cmd_set_checkpoint_nv)(command_buffer, marker as *const c_void) };
    }

    fn checkpoints(&self, queue: vk::Queue) -> Vec<String> {
        let Some(nv) = &self.nv_checkpoints else {
            return Vec::new();
        };
        let mut count = 0u32;
        unsafe { (nv.get_queue_checkpoint_data_nv)(queue, &mut count, std::ptr::null_mut()) };
        let mut data = vec![vk::CheckpointDataNV::default(); count as usize];
        unsafe { (nv.get_queue_checkpoint_data_nv)(queue, &mut count, data.as_mut_ptr()) };
        let labels = lock(&self.device_lost.checkpoint_labels);
        data.iter()
            .take(count as usize)
            .map(|d| {
                let label = labels
                    .label(d.p_checkpoint_marker as usize)
                    .unwrap_or("<unknown>");
                format!("{:?}: {}", d.stage, label)
            })
            .collect()
    }

    /// Maps a native error; device loss runs the diagnostics first.
    pub(crate) fn map_error(&self, result: vk::Result, queue: vk::Queue) -> Error {
        if result != vk::Result::ERROR_DEVICE_LOST {
            return Error::VkError(result);
        }
        let checkpoints = self.checkpoints(queue);
        error!("device lost");
        for checkpoint in &checkpoints {
            error!("  last checkpoint {}", checkpoint);
        }
        let info = DeviceLostInfo { checkpoints };
        if let Some(callback) = lock(&self.device_lost.callback).as_ref() {
            callback(&info);
        }
        self.device_lost
            .reset_requested
            .store(true, Ordering::Release);
        Error::DeviceLost
    }
}

impl Drop for AshDevice {
    fn drop(&mut self) {
        if self.device_raw.handle() == vk::Device::null() {
            return;
        }
        unsafe {
            let _ = self.device_raw.device_wait_idle();
            self.caches.destroy(&self.device_raw);
            let descriptor_device = crate::descriptor::AshDescriptorDevice::wrap(&self.device_raw);
            let mut descriptor_allocator = lock(&self.descriptor_allocator);
            descriptor_allocator.free(
                descriptor_device,
                lock(&self.internal_sets).drain().map(|(_, set)| set),
            );
            descriptor_allocator.cleanup(descriptor_device);
            drop(descriptor_allocator);
            self.allocator.cleanup(&self.device_raw);
            self.device_raw.destroy_device(None);
        }
    }
}

/// Available queues per family and a priority array long enough for all of them.
fn queue_counts(
    families: &[vk::QueueFamilyProperties],
    desc: &RendererDesc,
) -> (Vec<u32>, Vec<f32>) {
    let available: Vec<u32> = families
        .iter()
        .map(|f| {
            if desc.request_all_available_queues {
                f.queue_count
            } else {
                f.queue_count.min(1)
            }
        })
        .collect();
    let max = available.iter().copied().max().unwrap_or(0) as usize;
    (available, vec![1.0; max])
}

fn get_device_extensions(
    instance: &AshInstance,
    gpu: &GpuInfo,
    desc: &RendererDesc,
) -> Result<Vec<CString>> {
    let mut extensions: Vec<CString> = gpu
        .extensions
        .names()
        .into_iter()
        .map(CStr::to_owned)
        .collect();
    if desc.device_extensions.is_empty() {
        return Ok(extensions);
    }

    let available =
        unsafe { instance.enumerate_device_extension_properties(gpu.physical_device)? };
    for name in &desc.device_extensions {
        let Ok(name) = CString::new(name.as_str()) else {
            continue;
        };
        if extensions.contains(&name) {
            continue;
        }
        if available
            .iter()
            .any(|e| unsafe { CStr::from_ptr(e.extension_name.as_ptr()) } == name.as_c_str())
        {
            debug!("Device extension ✅ YES {:?}", name);
            extensions.push(name);
        } else {
            warn!("Device extension ❌ NO  {:?}", name);
        }
    }
    Ok(extensions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, queue_count: u32) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count,
            ..Default::default()
        }
    }

    fn families() -> Vec<vk::QueueFamilyProperties> {
        use vk::QueueFlags as F;
        vec![
            family(F::GRAPHICS | F::COMPUTE | F::TRANSFER | F::SPARSE_BINDING, 16),
            family(F::COMPUTE | F::TRANSFER | F::SPARSE_BINDING, 8),
            family(F::TRANSFER | F::SPARSE_BINDING, 2),
        ]
    }

    #[test]
    fn test_graphics_uses_first_graphics_family() {
        let families = families();
        let slot = select_queue_family(&families, &[1, 1, 1], &[1, 0, 0], QueueType::Graphics);
        assert_eq!((0, 0), (slot.family_index, slot.queue_index));
        assert!(slot.counted);
    }

    #[test]
    fn test_dedicated_families() {
        let families = families();
        let compute = select_queue_family(&families, &[1, 2, 1], &[0, 1, 0], QueueType::Compute);
        assert_eq!((1, 1), (compute.family_index, compute.queue_index));
        let transfer = select_queue_family(&families, &[1, 2, 1], &[0, 0, 0], QueueType::Transfer);
        assert_eq!(2, transfer.family_index);
    }

    #[test]
    fn test_falls_back_to_less_specialized() {
        let families = families();
        // transfer family exhausted: the compute family is less specialized than graphics
        let slot = select_queue_family(&families, &[1, 1, 1], &[0, 0, 1], QueueType::Transfer);
        assert_eq!(1, slot.family_index);
        // everything but the graphics family exhausted
        let slot = select_queue_family(&families, &[2, 1, 1], &[1, 1, 1], QueueType::Transfer);
        assert_eq!((0, 1), (slot.family_index, slot.queue_index));
    }

    #[test]
    fn test_shares_queue_zero_when_exhausted() {
        let families = families();
        let slot = select_queue_family(&families, &[1, 1, 1], &[1, 1, 1], QueueType::Compute);
        assert_eq!((0, 0), (slot.family_index, slot.queue_index));
        assert!(!slot.counted);
    }

    #[test]
    fn test_queue_counts() {
        let families = families();
        let desc = RendererDesc::default();
        assert_eq!((vec![1, 1, 1], vec![1.0]), queue_counts(&families, &desc));
        let desc = RendererDesc {
            request_all_available_queues: true,
            ..Default::default()
        };
        let (available, priorities) = queue_counts(&families, &desc);
        assert_eq!(vec![16, 8, 2], available);
        assert_eq!(16, priorities.len());
    }

    #[test]
    fn test_queue_locks_are_shared_per_queue() {
        let locks: Vec<Vec<Arc<Mutex<()>>>> = vec![
            vec![Arc::default(), Arc::default()],
            vec![Arc::default()],
        ];
        let a = find_queue_lock(&locks, 0, 1).unwrap();
        let b = find_queue_lock(&locks, 0, 1).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&locks[1][0], &find_queue_lock(&locks, 1, 0).unwrap()));
        assert!(find_queue_lock(&locks, 1, 1).is_none());
        assert!(find_queue_lock(&locks, 2, 0).is_none());
    }

    #[test]
    fn test_checkpoint_labels_reuse_markers() {
        let mut labels = CheckpointLabels::default();
        let shadow = labels.marker("shadow pass");
        let lighting = labels.marker("lighting");
        assert_eq!(1, shadow);
        assert_eq!(2, lighting);
        assert_eq!(shadow, labels.marker("shadow pass"));
        assert_eq!(Some("lighting"), labels.label(lighting));
        assert_eq!(None, labels.label(0));
        assert_eq!(None, labels.label(3));
    }

    #[test]
    fn test_checkpoint_labels_are_bounded() {
        let mut labels = CheckpointLabels::default();
        for i in 0..MAX_CHECKPOINT_LABELS + 10 {
            labels.marker(&format!("pass {i}"));
        }
        assert_eq!(MAX_CHECKPOINT_LABELS, labels.labels.len());
        assert_eq!(MAX_CHECKPOINT_LABELS, labels.slots.len());
        // the oldest labels were recycled
        assert_eq!(Some("pass 1024"), labels.label(1));
        assert_eq!(Some("pass 10"), labels.label(11));
        assert_eq!(11, labels.marker("pass 1034"));
        assert_eq!(1, labels.marker("pass 1024"));
    }
}
