use serde::{Deserialize, Serialize};

use crate::{texture::ClearValue, MAX_RENDER_TARGET_ATTACHMENTS};

#[derive(
    Copy, Clone, Default, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
pub enum LoadActionType {
    #[default]
    DontCare,
    Load,
    Clear,
}

#[derive(
    Copy, Clone, Default, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
pub enum StoreActionType {
    #[default]
    Store,
    DontCare,
    /// Content is neither read back nor written; the attachment stays untouched.
    None,
    ResolveStore,
    ResolveDontCare,
}

impl StoreActionType {
    #[inline]
    pub const fn is_resolve(self) -> bool {
        matches!(self, Self::ResolveStore | Self::ResolveDontCare)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadActionsDesc {
    pub load_actions_color: [LoadActionType; MAX_RENDER_TARGET_ATTACHMENTS],
    pub store_actions_color: [StoreActionType; MAX_RENDER_TARGET_ATTACHMENTS],
    pub clear_color_values: [ClearValue; MAX_RENDER_TARGET_ATTACHMENTS],
    pub load_action_depth: LoadActionType,
    pub load_action_stencil: LoadActionType,
    pub store_action_depth: StoreActionType,
    pub store_action_stencil: StoreActionType,
    pub clear_depth: ClearValue,
}

impl LoadActionsDesc {
    pub const DONT_CARE: Self = Self {
        load_actions_color: [LoadActionType::DontCare; MAX_RENDER_TARGET_ATTACHMENTS],
        store_actions_color: [StoreActionType::Store; MAX_RENDER_TARGET_ATTACHMENTS],
        clear_color_values: [ClearValue::BLACK; MAX_RENDER_TARGET_ATTACHMENTS],
        load_action_depth: LoadActionType::DontCare,
        load_action_stencil: LoadActionType::DontCare,
        store_action_depth: StoreActionType::Store,
        store_action_stencil: StoreActionType::Store,
        clear_depth: ClearValue::DEPTH_ONE,
    };

    /// Clears every attachment.
    pub const CLEAR: Self = Self {
        load_actions_color: [LoadActionType::Clear; MAX_RENDER_TARGET_ATTACHMENTS],
        load_action_depth: LoadActionType::Clear,
        load_action_stencil: LoadActionType::Clear,
        ..Self::DONT_CARE
    };

    /// `true` if any attachment is loaded from memory.
    pub fn any_load(&self, color_count: usize, has_depth: bool) -> bool {
        self.load_actions_color[..color_count]
            .iter()
            .any(|&a| a == LoadActionType::Load)
            || (has_depth
                && (self.load_action_depth == LoadActionType::Load
                    || self.load_action_stencil == LoadActionType::Load))
    }
}

impl Default for LoadActionsDesc {
    fn default() -> Self {
        Self::DONT_CARE
    }
}

#[derive(
    Copy, Clone, Default, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
pub enum IndirectArgumentType {
    #[default]
    Draw,
    DrawIndex,
    Dispatch,
}

impl IndirectArgumentType {
    /// Tightly packed size of one argument record.
    pub const fn stride(self) -> u32 {
        match self {
            Self::Draw => 16,
            Self::DrawIndex => 20,
            Self::Dispatch => 12,
        }
    }
}

#[derive(
    Copy, Clone, Default, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
pub enum QueryType {
    #[default]
    Timestamp,
    Occlusion,
    PipelineStatistics,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryPoolDesc {
    pub query_type: QueryType,
    pub query_count: u32,
    pub node_index: u32,
}

/// Pipeline statistics in the order they are written by a statistics query.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipelineStatistics {
    pub input_assembly_vertices: u64,
    pub input_assembly_primitives: u64,
    pub vertex_shader_invocations: u64,
    pub clipping_invocations: u64,
    pub clipping_primitives: u64,
    pub fragment_shader_invocations: u64,
    pub compute_shader_invocations: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_load() {
        let mut actions = LoadActionsDesc::CLEAR;
        assert!(!actions.any_load(2, true));
        actions.load_action_stencil = LoadActionType::Load;
        assert!(actions.any_load(2, true));
        assert!(!actions.any_load(2, false));
        actions.load_actions_color[3] = LoadActionType::Load;
        assert!(!actions.any_load(3, false));
        assert!(actions.any_load(4, false));
    }
}
