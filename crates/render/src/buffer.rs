use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::{
    descriptor::DescriptorType,
    format::TextureFormat,
    state::{QueueType, ResourceState},
};

/// Where the memory of a resource should live.
#[derive(
    Copy, Clone, Default, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
pub enum ResourceMemoryUsage {
    #[default]
    Unknown,
    /// Device local, not mappable.
    GpuOnly,
    /// Host visible staging memory.
    CpuOnly,
    /// Written by the host every frame, read by the device.
    CpuToGpu,
    /// Written by the device, read back by the host.
    GpuToCpu,
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct BufferCreationFlags: u32 {
        const NONE = 0;
        /// Request a dedicated allocation.
        const OWN_MEMORY = 0x1;
        /// Keep the buffer mapped for its whole lifetime.
        const PERSISTENT_MAP = 0x2;
        const ESRAM = 0x4;
        const NO_DESCRIPTOR_VIEW_CREATION = 0x8;
        const HOST_VISIBLE = 0x100;
        const HOST_COHERENT = 0x200;
        /// Buffer receives GPU markers; prefers device-coherent memory.
        const MARKER = 0x400;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BufferDesc {
    pub name: Option<String>,
    pub size: u64,
    pub alignment: u32,
    pub memory_usage: ResourceMemoryUsage,
    pub flags: BufferCreationFlags,
    pub queue_type: QueueType,
    pub start_state: ResourceState,
    pub descriptors: DescriptorType,
    /// Element format for typed (texel) buffer views.
    pub format: Option<TextureFormat>,
    pub first_element: u64,
    pub element_count: u64,
    pub struct_stride: u64,
    pub node_index: u32,
    pub shared_node_indices: Vec<u32>,
}

impl BufferDesc {
    pub const fn new(size: u64, descriptors: DescriptorType) -> Self {
        Self {
            name: None,
            size,
            alignment: 0,
            memory_usage: ResourceMemoryUsage::GpuOnly,
            flags: BufferCreationFlags::NONE,
            queue_type: QueueType::Graphics,
            start_state: ResourceState::UNDEFINED,
            descriptors,
            format: None,
            first_element: 0,
            element_count: 0,
            struct_stride: 0,
            node_index: 0,
            shared_node_indices: Vec::new(),
        }
    }

    #[inline]
    pub fn is_host_visible(&self) -> bool {
        !matches!(
            self.memory_usage,
            ResourceMemoryUsage::GpuOnly | ResourceMemoryUsage::Unknown
        ) || self.flags.contains(BufferCreationFlags::HOST_VISIBLE)
    }
}

impl Default for BufferDesc {
    fn default() -> Self {
        Self::new(0, DescriptorType::UNDEFINED)
    }
}

/// Pre-reserved memory buffers can be placed into.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceHeapDesc {
    pub name: Option<String>,
    pub size: u64,
    pub alignment: u64,
    pub memory_usage: ResourceMemoryUsage,
    /// Descriptor usages of the buffers that will be placed into the heap.
    pub descriptors: DescriptorType,
    pub flags: BufferCreationFlags,
    pub node_index: u32,
}

/// Byte range of a buffer to map or read back.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReadRange {
    pub offset: u64,
    pub size: u64,
}
