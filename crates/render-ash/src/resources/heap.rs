use std::{mem::ManuallyDrop, ptr::NonNull, sync::Arc};

use ash::vk;
use forge_render::buffer::{BufferDesc, ResourceHeapDesc};
use gpu_alloc_ash::AshMemoryDevice;
use tracing::debug;

use super::memory_request;
use crate::{
    alloc::GpuMemoryBlock,
    convert::{buffer_usage, memory_usage},
    device::AshDevice,
    Error, Result,
};

/// Memory block shared by the heap and every buffer placed into it.
pub(crate) struct HeapMemory {
    device: Arc<AshDevice>,
    block: ManuallyDrop<GpuMemoryBlock>,
    mapped: Option<NonNull<u8>>,
}

// SAFETY: the mapping is created once and never changed until drop
unsafe impl Send for HeapMemory {}
unsafe impl Sync for HeapMemory {}

/// Checks that a resource with `requirements` fits at `offset` of a heap.
pub(crate) fn check_placement(
    heap_size: u64,
    heap_memory_type: u32,
    requirements: &vk::MemoryRequirements,
    offset: u64,
) -> Result<()> {
    if requirements.memory_type_bits & (1 << heap_memory_type) == 0 {
        return Err(Error::InvalidDesc("heap memory type is not compatible"));
    }
    if requirements.alignment > 1 && offset % requirements.alignment != 0 {
        return Err(Error::InvalidDesc("placement offset is not aligned"));
    }
    if offset + requirements.size > heap_size {
        return Err(Error::InvalidDesc("placement exceeds the heap"));
    }
    Ok(())
}

impl HeapMemory {
    #[inline]
    pub fn raw_memory(&self) -> vk::DeviceMemory {
        *self.block.memory()
    }

    #[inline]
    pub fn raw_offset(&self) -> u64 {
        self.block.offset()
    }

    pub fn check_placement(&self, requirements: &vk::MemoryRequirements, offset: u64) -> Result<()> {
        check_placement(self.block.size(), self.block.memory_type(), requirements, offset)
    }

    pub fn mapped_at(&self, offset: u64) -> Result<NonNull<u8>> {
        let base = self
            .mapped
            .ok_or(Error::InvalidDesc("resource heap is not host visible"))?;
        Ok(unsafe { NonNull::new_unchecked(base.as_ptr().add(offset as usize)) })
    }
}

impl Drop for HeapMemory {
    fn drop(&mut self) {
        let mut block = unsafe { ManuallyDrop::take(&mut self.block) };
        if self.mapped.take().is_some() {
            unsafe { block.unmap(AshMemoryDevice::wrap(&self.device)) };
        }
        unsafe { self.device.dealloc_memory(block) };
    }
}

/// Pre-reserved device memory that buffers can be placed into.
pub struct ResourceHeap {
    memory: Arc<HeapMemory>,
    size: u64,
}

impl ResourceHeap {
    pub(crate) fn new(device: &Arc<AshDevice>, desc: &ResourceHeapDesc) -> Result<Self> {
        if desc.size == 0 {
            return Err(Error::InvalidDesc("resource heap size must not be zero"));
        }
        // memory requirements come from a throwaway buffer of the placed usages
        let mut probe_desc = BufferDesc::new(desc.size, desc.descriptors);
        probe_desc.flags = desc.flags;
        let create_info = vk::BufferCreateInfo::builder()
            .size(desc.size)
            .usage(buffer_usage(&probe_desc))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let mut requirements = unsafe {
            let probe = device.create::<vk::Buffer>(&create_info)?;
            device.get_buffer_memory_requirements(probe.raw())
        };
        requirements.size = requirements.size.max(desc.size);
        requirements.alignment = requirements.alignment.max(desc.alignment);

        let request = memory_request(&requirements, memory_usage(desc.memory_usage));
        let mut block = unsafe {
            device
                .alloc_memory(request, Some(gpu_alloc::Dedicated::Required))?
                .take()
        };
        let mapped = if block
            .props()
            .contains(gpu_alloc::MemoryPropertyFlags::HOST_VISIBLE)
        {
            match unsafe { block.map(AshMemoryDevice::wrap(device), 0, block.size() as usize) } {
                Ok(ptr) => Some(ptr),
                Err(e) => {
                    unsafe { device.dealloc_memory(block) };
                    return Err(e.into());
                }
            }
        } else {
            None
        };
        if let Some(name) = &desc.name {
            unsafe { device.object_name(*block.memory(), name) };
        }
        debug!(
            "resource heap: {} bytes in memory type {}",
            block.size(),
            block.memory_type()
        );
        let size = block.size();
        Ok(Self {
            memory: Arc::new(HeapMemory {
                device: device.clone(),
                block: ManuallyDrop::new(block),
                mapped,
            }),
            size,
        })
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    pub(crate) fn memory(&self) -> &Arc<HeapMemory> {
        &self.memory
    }
}

impl std::fmt::Debug for ResourceHeap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceHeap")
            .field("memory", &self.memory.raw_memory())
            .field("size", &self.size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requirements(size: u64, alignment: u64, types: u32) -> vk::MemoryRequirements {
        vk::MemoryRequirements {
            size,
            alignment,
            memory_type_bits: types,
        }
    }

    #[test]
    fn test_check_placement() {
        assert!(check_placement(1024, 1, &requirements(256, 256, 0b10), 512).is_ok());
        assert!(check_placement(1024, 1, &requirements(256, 256, 0b10), 768).is_ok());
        assert!(matches!(
            check_placement(1024, 1, &requirements(256, 256, 0b10), 1024),
            Err(Error::InvalidDesc(_))
        ));
        assert!(matches!(
            check_placement(1024, 1, &requirements(256, 256, 0b10), 100),
            Err(Error::InvalidDesc(_))
        ));
        assert!(matches!(
            check_placement(1024, 0, &requirements(256, 256, 0b10), 0),
            Err(Error::InvalidDesc(_))
        ));
    }
}
