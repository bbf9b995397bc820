use std::{
    mem::ManuallyDrop,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, MutexGuard, PoisonError,
    },
};

use ash::vk;
use fnv::FnvHashMap;
use gpu_alloc_ash::AshMemoryDevice;
use serde::{Deserialize, Serialize};

use crate::{
    device::AshDevice,
    instance::{AshInstance, VK_API_VERSION},
    Result,
};

type GpuAllocator = gpu_alloc::GpuAllocator<vk::DeviceMemory>;
pub type GpuMemoryBlock = gpu_alloc::MemoryBlock<vk::DeviceMemory>;

#[inline]
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Memory usage of one renderer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    /// Bytes handed out to resources.
    pub used_bytes: u64,
    /// Bytes of device memory reserved from the driver. Reported by the
    /// driver when device memory reports are enabled, otherwise the sum of
    /// all live allocations.
    pub allocated_bytes: u64,
    pub allocation_count: u64,
    /// `(memory type index, live allocations, bytes)`, sorted by index.
    pub memory_types: Vec<(u32, u64, u64)>,
}

#[derive(Default)]
struct MemoryTypeUsage {
    allocations: u64,
    bytes: u64,
}

/// Wraps the general purpose allocator together with its statistics.
pub(crate) struct AshAllocator {
    gpu_allocator: Mutex<GpuAllocator>,
    used_bytes: AtomicU64,
    allocation_count: AtomicU64,
    /// Filled by the driver's device memory report callback.
    pub(crate) driver_allocated_bytes: AtomicU64,
    driver_reports: bool,
    memory_types: Mutex<FnvHashMap<u32, MemoryTypeUsage>>,
}

impl AshAllocator {
    pub fn new(
        instance: &AshInstance,
        physical_device: vk::PhysicalDevice,
        buffer_device_address: bool,
        driver_reports: bool,
    ) -> Result<Self> {
        let mut props =
            unsafe { gpu_alloc_ash::device_properties(instance, VK_API_VERSION, physical_device)? };
        props.buffer_device_address = buffer_device_address;

        let config = gpu_alloc::Config::i_am_potato();

        Ok(Self {
            gpu_allocator: Mutex::new(GpuAllocator::new(config, props)),
            used_bytes: AtomicU64::new(0),
            allocation_count: AtomicU64::new(0),
            driver_allocated_bytes: AtomicU64::new(0),
            driver_reports,
            memory_types: Mutex::new(FnvHashMap::default()),
        })
    }

    fn record(&self, block: &GpuMemoryBlock, allocated: bool) {
        let size = block.size();
        if allocated {
            self.used_bytes.fetch_add(size, Ordering::Relaxed);
            self.allocation_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.used_bytes.fetch_sub(size, Ordering::Relaxed);
            self.allocation_count.fetch_sub(1, Ordering::Relaxed);
        }
        if cfg!(feature = "memory-tracking") {
            let mut memory_types = lock(&self.memory_types);
            let usage = memory_types.entry(block.memory_type()).or_default();
            if allocated {
                usage.allocations += 1;
                usage.bytes += size;
            } else {
                usage.allocations = usage.allocations.saturating_sub(1);
                usage.bytes = usage.bytes.saturating_sub(size);
            }
        }
    }

    pub fn stats(&self) -> MemoryStats {
        let used_bytes = self.used_bytes.load(Ordering::Relaxed);
        let allocated_bytes = if self.driver_reports {
            self.driver_allocated_bytes.load(Ordering::Relaxed)
        } else {
            used_bytes
        };
        let mut memory_types: Vec<(u32, u64, u64)> = lock(&self.memory_types)
            .iter()
            .map(|(&index, usage)| (index, usage.allocations, usage.bytes))
            .collect();
        memory_types.sort_unstable_by_key(|t| t.0);
        MemoryStats {
            used_bytes,
            allocated_bytes,
            allocation_count: self.allocation_count.load(Ordering::Relaxed),
            memory_types,
        }
    }

    pub unsafe fn cleanup(&self, device: &ash::Device) {
        unsafe { lock(&self.gpu_allocator).cleanup(AshMemoryDevice::wrap(device)) };
    }
}

impl AshDevice {
    pub(crate) unsafe fn alloc_memory(
        &self,
        request: gpu_alloc::Request,
        dedicated: Option<gpu_alloc::Dedicated>,
    ) -> Result<MemoryGuard<'_>> {
        let allocator = self.allocator();
        let block = {
            let mut gpu_allocator = lock(&allocator.gpu_allocator);
            let memory_device = AshMemoryDevice::wrap(self);
            unsafe {
                match dedicated {
                    Some(dedicated) => {
                        gpu_allocator.alloc_with_dedicated(memory_device, request, dedicated)?
                    }
                    None => gpu_allocator.alloc(memory_device, request)?,
                }
            }
        };
        allocator.record(&block, true);
        Ok(MemoryGuard {
            device: self,
            block: ManuallyDrop::new(block),
        })
    }

    pub(crate) unsafe fn dealloc_memory(&self, block: GpuMemoryBlock) {
        let allocator = self.allocator();
        allocator.record(&block, false);
        unsafe { lock(&allocator.gpu_allocator).dealloc(AshMemoryDevice::wrap(self), block) }
    }
}

/// Frees the block again unless it was taken out.
pub(crate) struct MemoryGuard<'a> {
    block: ManuallyDrop<GpuMemoryBlock>,
    device: &'a AshDevice,
}

impl MemoryGuard<'_> {
    #[inline]
    pub fn take(mut self) -> GpuMemoryBlock {
        let block = unsafe { ManuallyDrop::take(&mut self.block) };
        std::mem::forget(self);
        block
    }
}

impl Drop for MemoryGuard<'_> {
    fn drop(&mut self) {
        unsafe {
            self.device
                .dealloc_memory(ManuallyDrop::take(&mut self.block));
        }
    }
}

impl std::ops::Deref for MemoryGuard<'_> {
    type Target = GpuMemoryBlock;
    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.block
    }
}

impl std::ops::DerefMut for MemoryGuard<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.block
    }
}
