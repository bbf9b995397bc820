use std::sync::{Arc, Mutex};

use ash::vk;
use forge_render::{
    buffer::{BufferDesc, ResourceHeapDesc},
    commands::QueryPoolDesc,
    descriptor::DescriptorSetLayoutDesc,
    sampler::SamplerDesc,
    settings::{select_best_gpu, GpuSettings, RendererDesc},
    state::{CmdPoolDesc, FenceStatus, QueueDesc, QueueType, ResourceState},
    swapchain::SwapChainDesc,
    texture::{RenderTargetDesc, TextureDesc},
};
use tracing::{info, warn};

use crate::{
    alloc::{lock, MemoryStats},
    cache::ThreadContext,
    descriptor::{get_or_add_set_layout, DescriptorSet, DescriptorSetDesc},
    device::AshDevice,
    encoder::{Cmd, CmdPool, RenderTargetBarrier, TextureBarrier},
    instance::RendererContext,
    queue::{Fence, Queue, QueueSubmitDesc, Semaphore},
    raytracing::{AccelerationStructure, AccelerationStructureDesc},
    resources::{
        get_or_add_pipeline_layout, null::NullDescriptors, BinaryShaderDesc, Buffer, Pipeline,
        PipelineCache, PipelineCacheDesc, PipelineDesc, PipelineLayout, QueryPool, RenderTarget,
        ResourceHeap, Sampler, Shader, Texture,
    },
    swapchain::{SurfaceWindow, SwapChain},
    Error, Result,
};

/// Diagnostics handed to the device-lost callback.
#[derive(Debug, Clone, Default)]
pub struct DeviceLostInfo {
    /// Last checkpoints reached on the failing queue, oldest first.
    pub checkpoints: Vec<String>,
}

/// Index of the GPU to create the device on.
fn resolve_gpu_index(requested: Option<u32>, gpus: &[GpuSettings]) -> Result<usize> {
    match requested {
        Some(index) if (index as usize) < gpus.len() => Ok(index as usize),
        Some(_) => Err(Error::NoAdapter),
        None => select_best_gpu(gpus).ok_or(Error::NoAdapter),
    }
}

/// One-shot submissions moving freshly created images out of `UNDEFINED`.
struct InitialTransitions {
    ctx: ThreadContext,
    pool: CmdPool,
    fence: Fence,
    queue: Queue,
}

impl InitialTransitions {
    fn new(device: &Arc<AshDevice>) -> Result<Self> {
        let queue = Queue::new(device, &QueueDesc::new(QueueType::Graphics))?;
        let pool = CmdPool::new(device, &queue, &CmdPoolDesc { transient: true })?;
        Ok(Self {
            ctx: ThreadContext::new(device),
            pool,
            fence: Fence::new(device)?,
            queue,
        })
    }

    fn run(&mut self, device: &AshDevice, record: impl FnOnce(&mut Cmd)) -> Result<()> {
        let mut cmd = self.pool.add_cmd(&self.ctx)?;
        cmd.begin()?;
        record(&mut cmd);
        cmd.end()?;
        self.queue.submit(&QueueSubmitDesc {
            cmds: &[&cmd],
            signal_fence: Some(&self.fence),
            ..Default::default()
        })?;
        Fence::wait_all(device, &[&self.fence])?;
        drop(cmd);
        self.pool.reset()
    }
}

/// The Vulkan renderer: one logical device and everything created from it.
///
/// Resources hold their own reference to the device, so they may outlive
/// the `Renderer` value itself; the device is destroyed with the last of
/// them.
pub struct Renderer {
    device: Arc<AshDevice>,
    context: Arc<RendererContext>,
    null: NullDescriptors,
    transitions: Mutex<InitialTransitions>,
}

impl Renderer {
    /// Creates an instance, picks a GPU and creates the device on it.
    pub fn new(app_name: &str, desc: &RendererDesc) -> Result<Self> {
        let _span = tracing::trace_span!("InitRenderer").entered();
        let context =
            RendererContext::with_gpu_mode(app_name, &desc.context_desc(), desc.gpu_mode)?;
        Self::with_context(app_name, desc, Arc::new(context))
    }

    /// Creates a renderer on a GPU of a shared `context`.
    pub fn with_context(
        app_name: &str,
        desc: &RendererDesc,
        context: Arc<RendererContext>,
    ) -> Result<Self> {
        let _span = tracing::trace_span!("InitDevice").entered();
        let settings: Vec<GpuSettings> =
            context.gpus().iter().map(|g| g.settings().clone()).collect();
        let index = resolve_gpu_index(desc.gpu_index, &settings)?;
        let gpu = &context.gpus()[index];
        info!("{}: using GPU #{} {:?}", app_name, index, gpu.name());

        let device = AshDevice::new(context.instance(), gpu, desc)?;
        let null = NullDescriptors::new(&device)?;
        let transitions = InitialTransitions::new(&device)?;
        let renderer = Self {
            device,
            context,
            null,
            transitions: Mutex::new(transitions),
        };
        renderer.transition_textures(renderer.null.textures())?;
        Ok(renderer)
    }

    fn transition_textures<'a>(
        &self,
        textures: impl Iterator<Item = (&'a Texture, ResourceState)>,
    ) -> Result<()> {
        let barriers: Vec<TextureBarrier<'_>> = textures
            .filter(|(_, state)| !state.is_empty())
            .map(|(texture, new_state)| TextureBarrier {
                texture,
                current_state: ResourceState::UNDEFINED,
                new_state,
                subresource: None,
            })
            .collect();
        if barriers.is_empty() {
            return Ok(());
        }
        lock(&self.transitions).run(&self.device, |cmd| {
            for chunk in barriers.chunks(crate::encoder::MAX_BARRIERS) {
                cmd.resource_barrier(&[], chunk, &[]);
            }
        })
    }

    fn transition_render_targets(
        &self,
        targets: &[&RenderTarget],
        state: ResourceState,
    ) -> Result<()> {
        let barriers: Vec<RenderTargetBarrier<'_>> = targets
            .iter()
            .map(|&render_target| RenderTargetBarrier {
                render_target,
                current_state: ResourceState::UNDEFINED,
                new_state: state,
                subresource: None,
            })
            .collect();
        lock(&self.transitions).run(&self.device, |cmd| {
            for chunk in barriers.chunks(crate::encoder::MAX_BARRIERS) {
                cmd.resource_barrier(&[], &[], chunk);
            }
        })
    }

    #[inline]
    pub fn context(&self) -> &Arc<RendererContext> {
        &self.context
    }

    #[inline]
    pub fn gpu_settings(&self) -> &GpuSettings {
        self.device.settings()
    }

    #[inline]
    pub fn uses_dynamic_rendering(&self) -> bool {
        self.device.uses_dynamic_rendering()
    }

    /// Registers the calling thread with the object caches.
    pub fn thread_context(&self) -> ThreadContext {
        ThreadContext::new(&self.device)
    }

    pub fn memory_stats(&self) -> MemoryStats {
        self.device.allocator().stats()
    }

    /// Installs the callback run after a device loss was detected.
    pub fn set_device_lost_callback<F>(&self, callback: F)
    where
        F: Fn(&DeviceLostInfo) + Send + Sync + 'static,
    {
        self.device.set_device_lost_callback(Some(Box::new(callback)));
    }

    pub fn clear_device_lost_callback(&self) {
        self.device.set_device_lost_callback(None);
    }

    /// `true` once after a device loss; the application should recreate the renderer.
    pub fn take_reset_request(&self) -> bool {
        self.device.take_reset_request()
    }

    pub fn add_queue(&self, desc: &QueueDesc) -> Result<Queue> {
        Queue::new(&self.device, desc)
    }

    pub fn add_cmd_pool(&self, queue: &Queue, desc: &CmdPoolDesc) -> Result<CmdPool> {
        CmdPool::new(&self.device, queue, desc)
    }

    pub fn add_fence(&self) -> Result<Fence> {
        Fence::new(&self.device)
    }

    pub fn add_semaphore(&self) -> Result<Semaphore> {
        Semaphore::new(&self.device)
    }

    pub fn fence_status(&self, fence: &Fence) -> Result<FenceStatus> {
        fence.status()
    }

    pub fn wait_for_fences(&self, fences: &[&Fence]) -> Result<()> {
        Fence::wait_all(&self.device, fences)
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    pub fn add_resource_heap(&self, desc: &ResourceHeapDesc) -> Result<ResourceHeap> {
        ResourceHeap::new(&self.device, desc)
    }

    pub fn add_buffer(&self, desc: &BufferDesc) -> Result<Buffer> {
        Buffer::new(&self.device, desc)
    }

    /// Creates a buffer bound to `heap` at `offset`.
    pub fn add_placed_buffer(
        &self,
        desc: &BufferDesc,
        heap: &ResourceHeap,
        offset: u64,
    ) -> Result<Buffer> {
        Buffer::new_placed(&self.device, desc, heap.memory(), offset)
    }

    /// Creates a texture and moves it into `desc.start_state`.
    pub fn add_texture(&self, desc: &TextureDesc) -> Result<Texture> {
        let texture = Texture::new(&self.device, desc)?;
        self.transition_textures(std::iter::once((&texture, desc.start_state)))?;
        Ok(texture)
    }

    /// Creates a render target and moves it into its initial state.
    pub fn add_render_target(&self, desc: &RenderTargetDesc) -> Result<RenderTarget> {
        let target = RenderTarget::new(&self.device, desc)?;
        let state = desc.initial_state();
        match target.resolve_target() {
            Some(resolve) => self.transition_render_targets(&[&target, resolve], state)?,
            None => self.transition_render_targets(&[&target], state)?,
        }
        Ok(target)
    }

    pub fn add_sampler(&self, desc: &SamplerDesc) -> Result<Sampler> {
        Sampler::new(&self.device, desc)
    }

    pub fn add_shader(&self, desc: &BinaryShaderDesc<'_>) -> Result<Shader> {
        Shader::new(&self.device, desc)
    }

    /// Returns the content hash the layout is cached under.
    pub fn get_or_add_descriptor_set_layout(
        &self,
        ctx: &ThreadContext,
        desc: &DescriptorSetLayoutDesc,
    ) -> Result<u64> {
        Ok(get_or_add_set_layout(ctx, desc)?.hash)
    }

    /// Pipeline layout for the given sets, indexed by update frequency.
    pub fn get_or_add_pipeline_layout(
        &self,
        ctx: &ThreadContext,
        sets: &[Option<&DescriptorSetLayoutDesc>],
    ) -> Result<PipelineLayout> {
        get_or_add_pipeline_layout(ctx, sets)
    }

    pub fn add_pipeline(&self, ctx: &ThreadContext, desc: &PipelineDesc<'_>) -> Result<Pipeline> {
        Pipeline::new(ctx, desc)
    }

    pub fn add_pipeline_cache(&self, desc: &PipelineCacheDesc<'_>) -> Result<PipelineCache> {
        PipelineCache::new(&self.device, desc)
    }

    /// Allocates the sets and fills every binding with a placeholder resource.
    pub fn add_descriptor_set(
        &self,
        ctx: &ThreadContext,
        desc: &DescriptorSetDesc<'_>,
    ) -> Result<DescriptorSet> {
        DescriptorSet::new(ctx, desc, &self.null)
    }

    pub fn add_query_pool(&self, desc: &QueryPoolDesc) -> Result<QueryPool> {
        QueryPool::new(&self.device, desc)
    }

    pub fn add_acceleration_structure(
        &self,
        desc: &AccelerationStructureDesc<'_>,
    ) -> Result<AccelerationStructure> {
        AccelerationStructure::new(&self.device, desc)
    }

    /// Creates a swap chain for `window`, presentable from `queues`.
    ///
    /// The image count and color format actually used are written back into `desc`.
    pub fn add_swap_chain(
        &self,
        queues: &[&Queue],
        desc: &mut SwapChainDesc,
        window: Arc<dyn SurfaceWindow>,
    ) -> Result<SwapChain> {
        let _span = tracing::trace_span!("AddSwapChain").entered();
        let swap_chain = SwapChain::new(&self.device, queues, desc, window)?;
        self.present_transition(&swap_chain)?;
        Ok(swap_chain)
    }

    /// Recreates `swap_chain` with vsync toggled.
    pub fn toggle_vsync(&self, swap_chain: &mut SwapChain) -> Result<()> {
        let _span = tracing::trace_span!("ToggleVsync").entered();
        swap_chain.toggle_vsync()?;
        self.present_transition(swap_chain)
    }

    fn present_transition(&self, swap_chain: &SwapChain) -> Result<()> {
        let targets: Vec<&RenderTarget> = swap_chain.render_targets().iter().collect();
        self.transition_render_targets(&targets, ResourceState::PRESENT)
    }

    pub fn set_buffer_name(&self, buffer: &Buffer, name: &str) {
        unsafe { self.device.object_name(buffer.raw(), name) };
    }

    pub fn set_texture_name(&self, texture: &Texture, name: &str) {
        unsafe { self.device.object_name(texture.raw(), name) };
    }

    pub fn set_render_target_name(&self, render_target: &RenderTarget, name: &str) {
        self.set_texture_name(render_target.texture(), name);
    }

    pub fn set_pipeline_name(&self, pipeline: &Pipeline, name: &str) {
        unsafe { self.device.object_name(pipeline.raw(), name) };
    }

    /// Raw device handle, for interop.
    #[inline]
    pub fn raw_device(&self) -> vk::Device {
        self.device.handle()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = unsafe { self.device.device_wait_idle() } {
            warn!("wait idle before shutdown failed: {:?}", e);
        }
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("device", &self.device.handle())
            .field("linked", &self.device.is_linked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use forge_render::settings::{GpuPresetLevel, GpuType, GpuVendorPreset};

    use super::*;

    fn gpu(gpu_type: GpuType, preset_level: GpuPresetLevel) -> GpuSettings {
        GpuSettings {
            gpu_type,
            vendor: GpuVendorPreset {
                preset_level,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_gpu_index() {
        let gpus = [
            gpu(GpuType::Integrated, GpuPresetLevel::Low),
            gpu(GpuType::Discrete, GpuPresetLevel::High),
        ];
        assert_eq!(1, resolve_gpu_index(None, &gpus).unwrap());
        assert_eq!(0, resolve_gpu_index(Some(0), &gpus).unwrap());
        assert!(matches!(
            resolve_gpu_index(Some(2), &gpus),
            Err(Error::NoAdapter)
        ));
        assert!(matches!(resolve_gpu_index(None, &[]), Err(Error::NoAdapter)));
    }
}
