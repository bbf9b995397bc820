//! Translation of abstract [`ResourceState`]s into Vulkan synchronization
//! parameters.
//!
//! All functions are pure and total over the valid combinations of
//! [`ResourceState`]. A combination of read states maps to the union of
//! their access flags; the image layout is chosen by the most specific bit.

use ash::vk;
use forge_render::state::{QueueType, ResourceState};

/// Optional pipeline stages the device exposes.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct StageCaps {
    pub geometry_shader: bool,
    pub tessellation: bool,
    pub raytracing: bool,
    pub fragment_shading_rate: bool,
}

/// Access and layout parameters of one state transition.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Transition {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
}

impl Transition {
    /// `true` for the storage read-after-write barrier between two
    /// `UNORDERED_ACCESS` states.
    #[inline]
    pub fn is_uav_barrier(&self) -> bool {
        self.old_layout == vk::ImageLayout::GENERAL
            && self.new_layout == vk::ImageLayout::GENERAL
            && self.src_access == UAV_ACCESS
            && self.dst_access == UAV_ACCESS
    }
}

const UAV_ACCESS: vk::AccessFlags = vk::AccessFlags::from_raw(
    vk::AccessFlags::SHADER_READ.as_raw() | vk::AccessFlags::SHADER_WRITE.as_raw(),
);

pub fn to_access_flags(state: ResourceState) -> vk::AccessFlags {
    if state == ResourceState::COMMON {
        return vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE;
    }
    let mut result = vk::AccessFlags::empty();
    if state.contains(ResourceState::COPY_SOURCE) {
        result |= vk::AccessFlags::TRANSFER_READ;
    }
    if state.contains(ResourceState::COPY_DEST) {
        result |= vk::AccessFlags::TRANSFER_WRITE;
    }
    if state.contains(ResourceState::VERTEX_AND_CONSTANT_BUFFER) {
        result |= vk::AccessFlags::UNIFORM_READ | vk::AccessFlags::VERTEX_ATTRIBUTE_READ;
    }
    if state.contains(ResourceState::INDEX_BUFFER) {
        result |= vk::AccessFlags::INDEX_READ;
    }
    if state.contains(ResourceState::UNORDERED_ACCESS) {
        result |= UAV_ACCESS;
    }
    if state.contains(ResourceState::INDIRECT_ARGUMENT) {
        result |= vk::AccessFlags::INDIRECT_COMMAND_READ;
    }
    if state.contains(ResourceState::RENDER_TARGET) {
        result |= vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE;
    }
    if state.contains(ResourceState::DEPTH_WRITE) {
        result |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
            | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ;
    }
    if state.contains(ResourceState::DEPTH_READ) {
        result |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ;
    }
    if state.intersects(ResourceState::SHADER_RESOURCE) {
        result |= vk::AccessFlags::SHADER_READ;
    }
    if state.contains(ResourceState::STREAM_OUT) {
        result |= vk::AccessFlags::TRANSFORM_FEEDBACK_WRITE_EXT;
    }
    if state.contains(ResourceState::PRESENT) {
        result |= vk::AccessFlags::MEMORY_READ;
    }
    if state.contains(ResourceState::COMMON) {
        result |= vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE;
    }
    if state.contains(ResourceState::RAYTRACING_ACCELERATION_STRUCTURE) {
        result |= vk::AccessFlags::ACCELERATION_STRUCTURE_READ_KHR
            | vk::AccessFlags::ACCELERATION_STRUCTURE_WRITE_KHR;
    }
    if state.contains(ResourceState::SHADING_RATE_SOURCE) {
        result |= vk::AccessFlags::FRAGMENT_SHADING_RATE_ATTACHMENT_READ_KHR;
    }
    result
}

pub fn to_image_layout(state: ResourceState) -> vk::ImageLayout {
    if state.is_empty() {
        return vk::ImageLayout::UNDEFINED;
    }
    if state.contains(ResourceState::COPY_SOURCE) {
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL
    } else if state.contains(ResourceState::COPY_DEST) {
        vk::ImageLayout::TRANSFER_DST_OPTIMAL
    } else if state.contains(ResourceState::RENDER_TARGET) {
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
    } else if state.contains(ResourceState::DEPTH_WRITE) {
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
    } else if state.contains(ResourceState::DEPTH_READ) {
        vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
    } else if state.contains(ResourceState::UNORDERED_ACCESS) {
        vk::ImageLayout::GENERAL
    } else if state.intersects(ResourceState::SHADER_RESOURCE) {
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
    } else if state.contains(ResourceState::PRESENT) {
        vk::ImageLayout::PRESENT_SRC_KHR
    } else if state.contains(ResourceState::SHADING_RATE_SOURCE) {
        vk::ImageLayout::FRAGMENT_SHADING_RATE_ATTACHMENT_OPTIMAL_KHR
    } else {
        // COMMON and buffer-only states keep the content
        vk::ImageLayout::GENERAL
    }
}

pub fn to_pipeline_stage_flags(
    access: vk::AccessFlags,
    queue_type: QueueType,
    caps: &StageCaps,
) -> vk::PipelineStageFlags {
    use vk::{AccessFlags as A, PipelineStageFlags as S};

    if access.intersects(A::MEMORY_READ | A::MEMORY_WRITE) {
        return S::ALL_COMMANDS;
    }

    let mut flags = S::empty();
    match queue_type {
        QueueType::Graphics => {
            if access.intersects(A::INDEX_READ | A::VERTEX_ATTRIBUTE_READ) {
                flags |= S::VERTEX_INPUT;
            }
            if access.intersects(A::UNIFORM_READ | A::SHADER_READ | A::SHADER_WRITE) {
                flags |= S::VERTEX_SHADER | S::FRAGMENT_SHADER | S::COMPUTE_SHADER;
                if caps.geometry_shader {
                    flags |= S::GEOMETRY_SHADER;
                }
                if caps.tessellation {
                    flags |= S::TESSELLATION_CONTROL_SHADER | S::TESSELLATION_EVALUATION_SHADER;
                }
                if caps.raytracing {
                    flags |= S::RAY_TRACING_SHADER_KHR;
                }
            }
            if access.intersects(A::INPUT_ATTACHMENT_READ) {
                flags |= S::FRAGMENT_SHADER;
            }
            if access.intersects(A::COLOR_ATTACHMENT_READ | A::COLOR_ATTACHMENT_WRITE) {
                flags |= S::COLOR_ATTACHMENT_OUTPUT;
            }
            if access.intersects(
                A::DEPTH_STENCIL_ATTACHMENT_READ | A::DEPTH_STENCIL_ATTACHMENT_WRITE,
            ) {
                flags |= S::EARLY_FRAGMENT_TESTS | S::LATE_FRAGMENT_TESTS;
            }
            if access.intersects(A::TRANSFORM_FEEDBACK_WRITE_EXT) {
                flags |= S::TRANSFORM_FEEDBACK_EXT;
            }
            if caps.fragment_shading_rate
                && access.intersects(A::FRAGMENT_SHADING_RATE_ATTACHMENT_READ_KHR)
            {
                flags |= S::FRAGMENT_SHADING_RATE_ATTACHMENT_KHR;
            }
        }
        QueueType::Compute => {
            if access.intersects(
                A::INDEX_READ
                    | A::VERTEX_ATTRIBUTE_READ
                    | A::INPUT_ATTACHMENT_READ
                    | A::COLOR_ATTACHMENT_READ
                    | A::COLOR_ATTACHMENT_WRITE
                    | A::DEPTH_STENCIL_ATTACHMENT_READ
                    | A::DEPTH_STENCIL_ATTACHMENT_WRITE,
            ) {
                return S::ALL_COMMANDS;
            }
            if access.intersects(A::UNIFORM_READ | A::SHADER_READ | A::SHADER_WRITE) {
                flags |= S::COMPUTE_SHADER;
            }
        }
        QueueType::Transfer => return S::ALL_COMMANDS,
    }

    // stages available on graphics and compute queues
    if access.intersects(A::INDIRECT_COMMAND_READ) {
        flags |= S::DRAW_INDIRECT;
    }
    if access.intersects(A::TRANSFER_READ | A::TRANSFER_WRITE) {
        flags |= S::TRANSFER;
    }
    if access.intersects(A::HOST_READ | A::HOST_WRITE) {
        flags |= S::HOST;
    }
    if caps.raytracing
        && access.intersects(
            A::ACCELERATION_STRUCTURE_READ_KHR | A::ACCELERATION_STRUCTURE_WRITE_KHR,
        )
    {
        flags |= S::ACCELERATION_STRUCTURE_BUILD_KHR | S::RAY_TRACING_SHADER_KHR;
    }

    if flags.is_empty() {
        flags = S::TOP_OF_PIPE;
    }
    flags
}

/// Access masks and layouts for a transition between two states.
pub fn transition(old: ResourceState, new: ResourceState) -> Transition {
    if old == ResourceState::UNORDERED_ACCESS && new == ResourceState::UNORDERED_ACCESS {
        return Transition {
            src_access: UAV_ACCESS,
            dst_access: UAV_ACCESS,
            old_layout: vk::ImageLayout::GENERAL,
            new_layout: vk::ImageLayout::GENERAL,
        };
    }
    Transition {
        src_access: to_access_flags(old),
        dst_access: to_access_flags(new),
        old_layout: to_image_layout(old),
        new_layout: to_image_layout(new),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_CAPS: StageCaps = StageCaps {
        geometry_shader: true,
        tessellation: true,
        raytracing: true,
        fragment_shading_rate: true,
    };

    fn single_states() -> impl Iterator<Item = ResourceState> {
        (0..16).map(|bit| ResourceState::from_bits_retain(1 << bit))
    }

    #[test]
    fn test_translation_is_total() {
        let combos = [
            ResourceState::VERTEX_AND_CONSTANT_BUFFER | ResourceState::SHADER_RESOURCE,
            ResourceState::GENERIC_READ,
            ResourceState::INDEX_BUFFER | ResourceState::INDIRECT_ARGUMENT,
            ResourceState::DEPTH_READ | ResourceState::PIXEL_SHADER_RESOURCE,
        ];
        for state in single_states().chain(combos) {
            assert!(state.is_valid_combination());
            assert_ne!(vk::ImageLayout::UNDEFINED, to_image_layout(state), "{state:?}");
            assert!(!to_access_flags(state).is_empty(), "{state:?}");
        }
    }

    #[test]
    fn test_common_is_general() {
        assert_eq!(
            vk::ImageLayout::GENERAL,
            to_image_layout(ResourceState::COMMON)
        );
        assert_eq!(
            vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
            to_access_flags(ResourceState::COMMON)
        );
        assert_eq!(
            vk::ImageLayout::UNDEFINED,
            to_image_layout(ResourceState::UNDEFINED)
        );
    }

    #[test]
    fn test_uav_self_barrier() {
        let t = transition(ResourceState::UNORDERED_ACCESS, ResourceState::UNORDERED_ACCESS);
        assert_eq!(vk::ImageLayout::GENERAL, t.old_layout);
        assert_eq!(vk::ImageLayout::GENERAL, t.new_layout);
        assert_eq!(
            vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE,
            t.src_access
        );
        assert_eq!(t.src_access, t.dst_access);
        assert!(t.is_uav_barrier());

        let t = transition(ResourceState::RENDER_TARGET, ResourceState::SHADER_RESOURCE);
        assert!(!t.is_uav_barrier());
        assert_eq!(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL, t.old_layout);
        assert_eq!(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL, t.new_layout);
    }

    #[test]
    fn test_transfer_queue_collapses_to_all_commands() {
        for state in single_states() {
            let access = to_access_flags(state);
            assert_eq!(
                vk::PipelineStageFlags::ALL_COMMANDS,
                to_pipeline_stage_flags(access, QueueType::Transfer, &ALL_CAPS)
            );
        }
    }

    #[test]
    fn test_compute_queue_has_no_graphics_stages() {
        let graphics_stages = vk::PipelineStageFlags::VERTEX_SHADER
            | vk::PipelineStageFlags::FRAGMENT_SHADER
            | vk::PipelineStageFlags::VERTEX_INPUT
            | vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
        for state in single_states() {
            let stages =
                to_pipeline_stage_flags(to_access_flags(state), QueueType::Compute, &ALL_CAPS);
            assert!(
                stages == vk::PipelineStageFlags::ALL_COMMANDS
                    || !stages.intersects(graphics_stages),
                "{state:?}"
            );
        }
        assert_eq!(
            vk::PipelineStageFlags::COMPUTE_SHADER,
            to_pipeline_stage_flags(
                to_access_flags(ResourceState::UNORDERED_ACCESS),
                QueueType::Compute,
                &ALL_CAPS
            )
        );
    }

    #[test]
    fn test_optional_stages() {
        let access = to_access_flags(ResourceState::SHADER_RESOURCE);
        let full = to_pipeline_stage_flags(access, QueueType::Graphics, &ALL_CAPS);
        let minimal = to_pipeline_stage_flags(access, QueueType::Graphics, &StageCaps::default());
        assert!(full.contains(vk::PipelineStageFlags::GEOMETRY_SHADER));
        assert!(full.contains(vk::PipelineStageFlags::RAY_TRACING_SHADER_KHR));
        assert!(!minimal.contains(vk::PipelineStageFlags::GEOMETRY_SHADER));
        assert!(!minimal.contains(vk::PipelineStageFlags::TESSELLATION_CONTROL_SHADER));

        let as_access = to_access_flags(ResourceState::RAYTRACING_ACCELERATION_STRUCTURE);
        assert!(
            to_pipeline_stage_flags(as_access, QueueType::Compute, &ALL_CAPS)
                .contains(vk::PipelineStageFlags::ACCELERATION_STRUCTURE_BUILD_KHR)
        );
        assert_eq!(
            vk::PipelineStageFlags::TOP_OF_PIPE,
            to_pipeline_stage_flags(vk::AccessFlags::empty(), QueueType::Graphics, &ALL_CAPS)
        );
    }
}
