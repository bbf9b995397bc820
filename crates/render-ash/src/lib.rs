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

use std::ffi::CStr;

use ash::vk;
use forge_render::state::QueueType;
use thiserror::Error;

mod alloc;
pub mod barrier;
mod cache;
mod capabilities;
mod convert;
mod debug_utils;
mod descriptor;
mod device;
mod drop_guard;
mod encoder;
mod instance;
mod queue;
mod raytracing;
mod render_pass;
mod renderer;
mod resources;
mod swapchain;

pub use alloc::MemoryStats;
pub use cache::ThreadContext;
pub use capabilities::{DeviceExtensions, GpuInfo};
pub use descriptor::{DescriptorData, DescriptorResources, DescriptorSet, DescriptorSetDesc};
pub use encoder::{
    BindRenderTargetsDesc, BufferBarrier, Cmd, CmdPool, CommandSignatureDesc, RenderTargetBarrier,
    RenderTargetBinding, Subresource, SubresourceDataDesc, TextureBarrier, MAX_BARRIERS,
};
pub use forge_render as render;
pub use instance::RendererContext;
pub use queue::{Fence, PresentStatus, Queue, QueuePresentDesc, QueueSubmitDesc, Semaphore};
pub use raytracing::{
    AccelerationStructure, AccelerationStructureBuildFlags, AccelerationStructureDesc,
    AccelerationStructureGeometry, AccelerationStructureGeometryFlags,
    AccelerationStructureInstance, AccelerationStructureInstanceFlags, IDENTITY_TRANSFORM,
};
pub use render_pass::RenderPassKey;
pub use renderer::{DeviceLostInfo, Renderer};
pub use resources::{
    BinaryShaderDesc, Buffer, ComputePipelineDesc, GraphicsPipelineDesc, Pipeline, PipelineCache,
    PipelineCacheDesc, PipelineDesc, PipelineLayout, QueryPool, RenderTarget, ResourceHeap,
    Sampler, Shader, ShaderConstant, ShaderStageCode, Texture,
};
pub use swapchain::{SurfaceWindow, SwapChain};

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("library loading error")]
    LoadingError(#[from] ash::LoadingError),

    #[error("Vulkan driver does not support {0:?}")]
    ExtensionNotSupported(&'static CStr),

    #[error("The used Window-System is not supported")]
    UnsupportedWindowSystem,

    #[error("The window is not available, or it has no raw-window-handle")]
    WindowNotAvailable,

    #[error("No suitable GPU adapters found on the system!")]
    NoAdapter,

    #[error("Device doesn't have swapchain support")]
    NoSwapchainSupport,

    #[error("The surface was lost")]
    SurfaceLost,

    #[error("The device was lost")]
    DeviceLost,

    #[error("No {0:?} queue available")]
    OutOfQueues(QueueType),

    #[error("invalid description: {0}")]
    InvalidDesc(&'static str),

    #[error("not supported by this device: {0}")]
    Unsupported(&'static str),

    #[error("Vulkan Error")]
    VkError(#[from] vk::Result),

    #[error("Allocation Error")]
    AllocationError(#[from] gpu_alloc::AllocationError),

    #[error("Memory mapping Error")]
    MapError(#[from] gpu_alloc::MapError),

    #[error("Descriptor allocation Error: {0}")]
    DescriptorAllocation(String),

    #[error("unknown renderer error")]
    Unknown,
}

#[derive(Debug)]
pub struct ErrorNoExtension(pub &'static CStr);

impl From<ErrorNoExtension> for Error {
    #[inline]
    fn from(e: ErrorNoExtension) -> Self {
        Self::ExtensionNotSupported(e.0)
    }
}

impl From<&vk::Result> for Error {
    #[inline]
    fn from(e: &vk::Result) -> Self {
        Self::VkError(*e)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
