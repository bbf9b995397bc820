use std::{ptr::NonNull, sync::Arc};

use ash::vk;
use forge_render::{
    buffer::{BufferCreationFlags, BufferDesc, ReadRange},
    descriptor::DescriptorType,
    format::TextureFormat,
};
use gpu_alloc_ash::AshMemoryDevice;
use tracing::warn;

use super::{heap::HeapMemory, memory_request};
use crate::{
    alloc::GpuMemoryBlock,
    convert::{buffer_memory_usage, buffer_usage, VkInto},
    device::AshDevice,
    Error, Result,
};

enum BufferMemory {
    Owned(GpuMemoryBlock),
    Placed { heap: Arc<HeapMemory>, offset: u64 },
}

/// A GPU buffer together with its memory and optional texel views.
pub struct Buffer {
    device: Arc<AshDevice>,
    id: u64,
    raw: vk::Buffer,
    memory: Option<BufferMemory>,
    size: u64,
    descriptors: DescriptorType,
    first_element: u64,
    element_count: u64,
    struct_stride: u64,
    uniform_texel_view: vk::BufferView,
    storage_texel_view: vk::BufferView,
    mapped: Option<NonNull<u8>>,
    persistent: bool,
    node_index: u32,
}

// SAFETY: the mapped pointer is only handed out through `&mut self`
unsafe impl Send for Buffer {}
unsafe impl Sync for Buffer {}

/// Size of a buffer after applying the uniform-buffer offset alignment.
pub(crate) fn aligned_buffer_size(desc: &BufferDesc, uniform_alignment: u64) -> u64 {
    let mut alignment = u64::from(desc.alignment).max(1);
    if desc.descriptors.contains(DescriptorType::UNIFORM_BUFFER) {
        alignment = alignment.max(uniform_alignment);
    }
    desc.size.max(1).div_ceil(alignment) * alignment
}

/// Offset and range written into a buffer descriptor.
pub(crate) fn descriptor_range(
    first_element: u64,
    element_count: u64,
    struct_stride: u64,
    structured: bool,
    offset: Option<u64>,
    size: Option<u64>,
) -> (u64, u64) {
    let mut base = 0;
    let mut range = vk::WHOLE_SIZE;
    if structured && struct_stride > 0 {
        base = first_element * struct_stride;
        if element_count > 0 {
            range = element_count * struct_stride;
        }
    }
    (
        base + offset.unwrap_or(0),
        size.filter(|&s| s > 0).unwrap_or(range),
    )
}

impl Buffer {
    pub(crate) fn new(device: &Arc<AshDevice>, desc: &BufferDesc) -> Result<Self> {
        Self::create(device, desc, None)
    }

    pub(crate) fn new_placed(
        device: &Arc<AshDevice>,
        desc: &BufferDesc,
        heap: &Arc<HeapMemory>,
        offset: u64,
    ) -> Result<Self> {
        Self::create(device, desc, Some((heap, offset)))
    }

    fn create(
        device: &Arc<AshDevice>,
        desc: &BufferDesc,
        placement: Option<(&Arc<HeapMemory>, u64)>,
    ) -> Result<Self> {
        if desc.size == 0 {
            return Err(Error::InvalidDesc("buffer size must not be zero"));
        }
        let size = aligned_buffer_size(desc, device.settings().uniform_buffer_alignment);
        let create_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(buffer_usage(desc))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let raw = unsafe { device.create::<vk::Buffer>(&create_info)? };
        let requirements = unsafe { device.get_buffer_memory_requirements(raw.raw()) };

        let memory = match placement {
            Some((heap, offset)) => {
                heap.check_placement(&requirements, offset)?;
                unsafe {
                    device.bind_buffer_memory_for_node(
                        raw.raw(),
                        heap.raw_memory(),
                        heap.raw_offset() + offset,
                        desc.node_index,
                        &desc.shared_node_indices,
                    )?
                };
                BufferMemory::Placed {
                    heap: heap.clone(),
                    offset,
                }
            }
            None => {
                let request = memory_request(&requirements, buffer_memory_usage(desc));
                let dedicated = desc
                    .flags
                    .contains(BufferCreationFlags::OWN_MEMORY)
                    .then_some(gpu_alloc::Dedicated::Required);
                let block = unsafe { device.alloc_memory(request, dedicated)? };
                unsafe {
                    device.bind_block_to_buffer(
                        raw.raw(),
                        &block,
                        desc.node_index,
                        &desc.shared_node_indices,
                    )?
                };
                BufferMemory::Owned(block.take())
            }
        };

        let mut buffer = Self {
            device: device.clone(),
            id: device.next_resource_id(),
            raw: raw.take(),
            memory: Some(memory),
            size,
            descriptors: desc.descriptors,
            first_element: desc.first_element,
            element_count: desc.element_count,
            struct_stride: desc.struct_stride,
            uniform_texel_view: vk::BufferView::null(),
            storage_texel_view: vk::BufferView::null(),
            mapped: None,
            persistent: false,
            node_index: desc.node_index,
        };

        if let Some(format) = desc.format {
            buffer.create_texel_views(desc, format)?;
        }
        if let Some(name) = &desc.name {
            unsafe { device.object_name(buffer.raw, name) };
        }
        if desc.flags.contains(BufferCreationFlags::PERSISTENT_MAP) {
            buffer.map(None)?;
            buffer.persistent = true;
        }
        Ok(buffer)
    }

    fn create_texel_views(&mut self, desc: &BufferDesc, format: TextureFormat) -> Result<()> {
        let vk_format: vk::Format = format.vk_into();
        let features = unsafe {
            self.device
                .instance()
                .get_physical_device_format_properties(self.device.physical_device(), vk_format)
        }
        .buffer_features;
        let texel_size = u64::from(format.bytes_per_pixel().unwrap_or(1));
        let offset = desc.first_element * texel_size;
        let range = if desc.element_count > 0 {
            desc.element_count * texel_size
        } else {
            vk::WHOLE_SIZE
        };
        let view_info = vk::BufferViewCreateInfo::builder()
            .buffer(self.raw)
            .format(vk_format)
            .offset(offset)
            .range(range);

        if desc.descriptors.contains(DescriptorType::TEXEL_BUFFER) {
            if features.contains(vk::FormatFeatureFlags::UNIFORM_TEXEL_BUFFER) {
                self.uniform_texel_view =
                    unsafe { self.device.create::<vk::BufferView>(&view_info)?.take() };
            } else {
                warn!("{:?} does not support uniform texel buffers, no view created", format);
            }
        }
        if desc.descriptors.contains(DescriptorType::RW_TEXEL_BUFFER) {
            if features.contains(vk::FormatFeatureFlags::STORAGE_TEXEL_BUFFER) {
                self.storage_texel_view =
                    unsafe { self.device.create::<vk::BufferView>(&view_info)?.take() };
            } else {
                warn!("{:?} does not support storage texel buffers, no view created", format);
            }
        }
        Ok(())
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    pub fn descriptors(&self) -> DescriptorType {
        self.descriptors
    }

    #[inline]
    pub fn node_index(&self) -> u32 {
        self.node_index
    }

    #[inline]
    pub(crate) fn raw(&self) -> vk::Buffer {
        self.raw
    }

    /// GPU virtual address of the first byte.
    pub(crate) fn device_address(&self) -> Result<vk::DeviceAddress> {
        let ext = self.device.ext_buffer_device_address()?;
        let info = vk::BufferDeviceAddressInfo::builder().buffer(self.raw);
        Ok(unsafe { ext.get_buffer_device_address(&info) })
    }

    #[inline]
    pub(crate) fn uniform_texel_view(&self) -> vk::BufferView {
        self.uniform_texel_view
    }

    #[inline]
    pub(crate) fn storage_texel_view(&self) -> vk::BufferView {
        self.storage_texel_view
    }

    pub(crate) fn descriptor_info(
        &self,
        ty: DescriptorType,
        offset: Option<u64>,
        size: Option<u64>,
    ) -> vk::DescriptorBufferInfo {
        let structured = ty.intersects(DescriptorType::BUFFER | DescriptorType::RW_BUFFER)
            && !ty.intersects(DescriptorType::BUFFER_RAW | DescriptorType::RW_BUFFER_RAW);
        let (offset, range) = descriptor_range(
            self.first_element,
            self.element_count,
            self.struct_stride,
            structured,
            offset,
            size,
        );
        vk::DescriptorBufferInfo {
            buffer: self.raw,
            offset,
            range,
        }
    }

    /// Pointer to the start of the mapped memory, if mapped.
    #[inline]
    pub fn mapped(&self) -> Option<NonNull<u8>> {
        self.mapped
    }

    /// Maps `range` (or the whole buffer) into host memory.
    ///
    /// Returns a pointer to the first byte of the range.
    pub fn map(&mut self, range: Option<ReadRange>) -> Result<NonNull<u8>> {
        let (offset, size) = match range {
            Some(r) if r.size > 0 => (r.offset, r.size),
            Some(r) => (r.offset, self.size.saturating_sub(r.offset)),
            None => (0, self.size),
        };
        if offset + size > self.size {
            return Err(Error::InvalidDesc("map range exceeds the buffer"));
        }
        if let Some(ptr) = self.mapped {
            return Ok(unsafe { NonNull::new_unchecked(ptr.as_ptr().add(offset as usize)) });
        }
        let base = match &mut self.memory {
            Some(BufferMemory::Owned(block)) => unsafe {
                block.map(AshMemoryDevice::wrap(&self.device), 0, self.size as usize)?
            },
            Some(BufferMemory::Placed { heap, offset }) => heap.mapped_at(*offset)?,
            None => return Err(Error::InvalidDesc("buffer has no memory")),
        };
        self.mapped = Some(base);
        Ok(unsafe { NonNull::new_unchecked(base.as_ptr().add(offset as usize)) })
    }

    /// Unmaps the buffer again. Persistently mapped buffers stay mapped.
    pub fn unmap(&mut self) {
        if self.persistent || self.mapped.is_none() {
            return;
        }
        self.mapped = None;
        if let Some(BufferMemory::Owned(block)) = &mut self.memory {
            unsafe { block.unmap(AshMemoryDevice::wrap(&self.device)) };
        }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.persistent = false;
        self.unmap();
        unsafe {
            self.device.destroy(self.uniform_texel_view);
            self.device.destroy(self.storage_texel_view);
            self.device.destroy(self.raw);
        }
        if let Some(BufferMemory::Owned(block)) = self.memory.take() {
            unsafe { self.device.dealloc_memory(block) };
        }
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id)
            .field("raw", &self.raw)
            .field("size", &self.size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_buffer_size_is_aligned() {
        let desc = BufferDesc::new(100, DescriptorType::UNIFORM_BUFFER);
        assert_eq!(256, aligned_buffer_size(&desc, 256));
        let desc = BufferDesc::new(100, DescriptorType::VERTEX_BUFFER);
        assert_eq!(100, aligned_buffer_size(&desc, 256));
        let mut desc = BufferDesc::new(100, DescriptorType::VERTEX_BUFFER);
        desc.alignment = 64;
        assert_eq!(128, aligned_buffer_size(&desc, 256));
    }

    #[test]
    fn test_descriptor_range() {
        // raw buffers ignore the element window
        assert_eq!((16, vk::WHOLE_SIZE), descriptor_range(4, 8, 16, false, Some(16), None));
        assert_eq!((64, 128), descriptor_range(4, 8, 16, true, None, None));
        assert_eq!((72, 32), descriptor_range(4, 8, 16, true, Some(8), Some(32)));
        assert_eq!((0, vk::WHOLE_SIZE), descriptor_range(0, 0, 0, true, None, None));
    }
}
