use ash::vk;
use gpu_alloc::UsageFlags;

use crate::{alloc::GpuMemoryBlock, device::AshDevice, Result};

mod buffer;
mod heap;
pub(crate) mod null;
mod pipeline;
mod query;
mod render_target;
pub(crate) mod sampler;
mod shader;
mod texture;

pub use self::{
    buffer::Buffer,
    heap::ResourceHeap,
    pipeline::{
        ComputePipelineDesc, GraphicsPipelineDesc, Pipeline, PipelineCache, PipelineCacheDesc,
        PipelineDesc, PipelineLayout,
    },
    query::QueryPool,
    render_target::RenderTarget,
    sampler::Sampler,
    shader::{BinaryShaderDesc, Shader, ShaderConstant, ShaderStageCode},
    texture::Texture,
};
pub(crate) use self::pipeline::get_or_add_pipeline_layout;

/// Memory instance each device of a device group binds to.
///
/// Every device uses its own instance, except the shared nodes which see the
/// instance of `node_index`.
pub(crate) fn device_group_indices(node_count: u32, node_index: u32, shared: &[u32]) -> Vec<u32> {
    let mut indices: Vec<u32> = (0..node_count).collect();
    for &shared_node in shared {
        if let Some(index) = indices.get_mut(shared_node as usize) {
            *index = node_index;
        }
    }
    indices
}

/// Index of a lazily allocated memory type among `type_bits`.
pub(crate) fn find_lazily_allocated_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
) -> Option<u32> {
    props.memory_types[..props.memory_type_count as usize]
        .iter()
        .enumerate()
        .find(|(i, t)| {
            type_bits & (1 << i) != 0
                && t.property_flags
                    .contains(vk::MemoryPropertyFlags::LAZILY_ALLOCATED)
        })
        .map(|(i, _)| i as u32)
}

pub(crate) fn memory_request(
    requirements: &vk::MemoryRequirements,
    usage: UsageFlags,
) -> gpu_alloc::Request {
    gpu_alloc::Request {
        size: requirements.size,
        align_mask: requirements.alignment.saturating_sub(1),
        usage,
        memory_types: requirements.memory_type_bits,
    }
}

impl AshDevice {
    /// Binds `memory` to `buffer`. Linked device groups bind every device index.
    pub(crate) unsafe fn bind_buffer_memory_for_node(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: u64,
        node_index: u32,
        shared_nodes: &[u32],
    ) -> Result<()> {
        if self.is_linked() {
            let indices = device_group_indices(self.node_count(), node_index, shared_nodes);
            let mut group_info =
                vk::BindBufferMemoryDeviceGroupInfo::builder().device_indices(&indices);
            let bind_info = vk::BindBufferMemoryInfo::builder()
                .buffer(buffer)
                .memory(memory)
                .memory_offset(offset)
                .push_next(&mut group_info)
                .build();
            unsafe { self.bind_buffer_memory2(&[bind_info])? };
        } else {
            unsafe { self.bind_buffer_memory(buffer, memory, offset)? };
        }
        Ok(())
    }

    pub(crate) unsafe fn bind_image_memory_for_node(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        offset: u64,
        node_index: u32,
        shared_nodes: &[u32],
    ) -> Result<()> {
        if self.is_linked() {
            let indices = device_group_indices(self.node_count(), node_index, shared_nodes);
            let mut group_info =
                vk::BindImageMemoryDeviceGroupInfo::builder().device_indices(&indices);
            let bind_info = vk::BindImageMemoryInfo::builder()
                .image(image)
                .memory(memory)
                .memory_offset(offset)
                .push_next(&mut group_info)
                .build();
            unsafe { self.bind_image_memory2(&[bind_info])? };
        } else {
            unsafe { self.bind_image_memory(image, memory, offset)? };
        }
        Ok(())
    }

    pub(crate) unsafe fn bind_block_to_buffer(
        &self,
        buffer: vk::Buffer,
        block: &GpuMemoryBlock,
        node_index: u32,
        shared_nodes: &[u32],
    ) -> Result<()> {
        unsafe {
            self.bind_buffer_memory_for_node(
                buffer,
                *block.memory(),
                block.offset(),
                node_index,
                shared_nodes,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_group_indices() {
        assert_eq!(vec![0, 1, 2], device_group_indices(3, 0, &[]));
        assert_eq!(vec![0, 1, 1, 3], device_group_indices(4, 1, &[2]));
        // out of range shared nodes are ignored
        assert_eq!(vec![0, 1], device_group_indices(2, 0, &[5]));
    }

    #[test]
    fn test_find_lazily_allocated_type() {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 3,
            ..Default::default()
        };
        props.memory_types[0].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        props.memory_types[2].property_flags =
            vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::LAZILY_ALLOCATED;
        assert_eq!(Some(2), find_lazily_allocated_type(&props, 0b111));
        assert_eq!(None, find_lazily_allocated_type(&props, 0b011));
    }
}
