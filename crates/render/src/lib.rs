#![warn(
    // missing_docs,
    // rustdoc::missing_doc_code_examples,
    future_incompatible,
    rust_2018_idioms,
    unused,
    trivial_casts,
    trivial_numeric_casts,
    unused_lifetimes,
    unused_qualifications,
    unused_crate_dependencies,
    clippy::cargo,
    clippy::multiple_crate_versions,
    clippy::empty_line_after_outer_attr,
    clippy::fallible_impl_from,
    clippy::redundant_pub_crate,
    clippy::use_self,
    clippy::suspicious_operation_groupings,
    clippy::useless_let_if_seq,
    // clippy::missing_errors_doc,
    // clippy::missing_panics_doc,
    clippy::wildcard_imports
)]
#![doc(html_no_source)]
#![doc = include_str!("../README.md")]

pub mod buffer;
pub mod commands;
pub mod descriptor;
pub mod format;
pub mod pipeline;
pub mod sampler;
pub mod settings;
pub mod state;
pub mod swapchain;
pub mod texture;
pub mod utils;

/// Maximum number of color attachments bound at once.
pub const MAX_RENDER_TARGET_ATTACHMENTS: usize = 8;
/// Number of descriptor sets every pipeline layout is built with.
pub const MAX_DESCRIPTOR_SETS: usize = 4;
pub const MAX_VERTEX_BINDINGS: usize = 15;
pub const MAX_VERTEX_ATTRIBS: usize = 15;
/// Maximum number of GPUs in one device group (linked mode).
pub const MAX_LINKED_GPUS: usize = 4;
/// Maximum number of GPUs a context probes (unlinked mode).
pub const MAX_MULTIPLE_GPUS: usize = 4;
pub const MAX_SWAPCHAIN_IMAGES: usize = 3;

pub mod prelude {
    pub use crate::{
        buffer::{BufferCreationFlags, BufferDesc, ResourceHeapDesc, ResourceMemoryUsage},
        commands::{
            IndirectArgumentType, LoadActionType, LoadActionsDesc, QueryPoolDesc, QueryType,
            StoreActionType,
        },
        descriptor::{
            DescriptorInfo, DescriptorSetLayoutDesc, DescriptorType, DescriptorUpdateFrequency,
            ShaderStages,
        },
        format::{SampleCount, TextureAspects, TextureDimension, TextureFormat},
        pipeline::{BlendStateDesc, DepthStateDesc, RasterizerStateDesc, VertexLayout},
        sampler::SamplerDesc,
        settings::{GpuMode, GpuSettings, RendererContextDesc, RendererDesc},
        state::{FenceStatus, QueueDesc, QueueType, ResourceState},
        swapchain::SwapChainDesc,
        texture::{ClearValue, RenderTargetDesc, TextureCreationFlags, TextureDesc},
    };
}
