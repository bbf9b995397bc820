use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Abstract usage state of a GPU resource.
    ///
    /// A resource may be in several read states at once (e.g.
    /// `VERTEX_AND_CONSTANT_BUFFER | SHADER_RESOURCE`), but never in more
    /// than one write state.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ResourceState: u32 {
        const UNDEFINED = 0;
        const VERTEX_AND_CONSTANT_BUFFER = 0x1;
        const INDEX_BUFFER = 0x2;
        const RENDER_TARGET = 0x4;
        const UNORDERED_ACCESS = 0x8;
        const DEPTH_WRITE = 0x10;
        const DEPTH_READ = 0x20;
        const NON_PIXEL_SHADER_RESOURCE = 0x40;
        const PIXEL_SHADER_RESOURCE = 0x80;
        const SHADER_RESOURCE = 0x40 | 0x80;
        const STREAM_OUT = 0x100;
        const INDIRECT_ARGUMENT = 0x200;
        const COPY_DEST = 0x400;
        const COPY_SOURCE = 0x800;
        const GENERIC_READ = 0x1 | 0x2 | 0x40 | 0x80 | 0x200 | 0x800;
        const PRESENT = 0x1000;
        const COMMON = 0x2000;
        const RAYTRACING_ACCELERATION_STRUCTURE = 0x4000;
        const SHADING_RATE_SOURCE = 0x8000;
    }
}

impl ResourceState {
    /// States that modify the resource.
    pub const WRITE_STATES: Self = Self::RENDER_TARGET
        .union(Self::UNORDERED_ACCESS)
        .union(Self::DEPTH_WRITE)
        .union(Self::STREAM_OUT)
        .union(Self::COPY_DEST);

    /// Returns `true` when at most one write state is set.
    #[inline]
    pub fn is_valid_combination(self) -> bool {
        self.intersection(Self::WRITE_STATES).bits().count_ones() <= 1
            && !self.contains(Self::DEPTH_READ | Self::DEPTH_WRITE)
    }
}

impl Default for ResourceState {
    #[inline]
    fn default() -> Self {
        Self::UNDEFINED
    }
}

#[derive(
    Copy, Clone, Default, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
pub enum QueueType {
    #[default]
    Graphics,
    Transfer,
    Compute,
}

impl QueueType {
    pub const ALL: [Self; 3] = [Self::Graphics, Self::Transfer, Self::Compute];
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct QueueFlag: u32 {
        const NONE = 0;
        const DISABLE_GPU_TIMEOUT = 0x1;
        const INIT_MICROPROFILE = 0x2;
    }
}

#[derive(
    Copy, Clone, Default, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
pub enum QueuePriority {
    #[default]
    Normal,
    High,
    GlobalRealtime,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueDesc {
    pub queue_type: QueueType,
    pub flags: QueueFlag,
    pub priority: QueuePriority,
    pub node_index: u32,
}

impl QueueDesc {
    #[inline]
    pub const fn new(queue_type: QueueType) -> Self {
        Self {
            queue_type,
            flags: QueueFlag::NONE,
            priority: QueuePriority::Normal,
            node_index: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CmdPoolDesc {
    /// Command buffers are short lived and reset often.
    pub transient: bool,
}

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum FenceStatus {
    Complete,
    Incomplete,
    NotSubmitted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_resource_is_both_stages() {
        assert_eq!(
            ResourceState::NON_PIXEL_SHADER_RESOURCE | ResourceState::PIXEL_SHADER_RESOURCE,
            ResourceState::SHADER_RESOURCE
        );
        assert!(ResourceState::GENERIC_READ.contains(ResourceState::COPY_SOURCE));
        assert!(!ResourceState::GENERIC_READ.intersects(ResourceState::WRITE_STATES));
    }

    #[test]
    fn test_valid_combinations() {
        assert!(
            (ResourceState::VERTEX_AND_CONSTANT_BUFFER | ResourceState::SHADER_RESOURCE)
                .is_valid_combination()
        );
        assert!(!(ResourceState::RENDER_TARGET | ResourceState::COPY_DEST).is_valid_combination());
        assert!(!(ResourceState::DEPTH_READ | ResourceState::DEPTH_WRITE).is_valid_combination());
    }
}
