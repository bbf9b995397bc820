//! Content-hash caches for render passes, framebuffers, descriptor-set
//! layouts, pipeline layouts and static samplers.
//!
//! Every thread that records or creates pipelines registers a
//! [`ThreadContext`]. Lookups first hit the thread's own maps, which are only
//! ever touched from that thread and need no lock. A miss falls through to the
//! renderer-wide shared map, which owns the native objects, so content-equal
//! requests from different threads converge on the same native object.
//!
//! Entries live as long as the renderer; nothing is evicted.

use std::{
    cell::Cell,
    marker::PhantomData,
    sync::{Arc, Mutex},
};

use ash::vk;
use atomic_refcell::AtomicRefCell;
use forge_render::utils::hash::U64HashMap;
use slotmap::{new_key_type, SlotMap};
use tracing::trace;

use crate::{alloc::lock, device::AshDevice, Result};

new_key_type! {
    pub(crate) struct ThreadKey;
}

/// Native object owned by a shared cache map.
pub(crate) trait CachedObject: Copy {
    unsafe fn destroy(self, device: &ash::Device);
}

impl CachedObject for vk::RenderPass {
    #[inline]
    unsafe fn destroy(self, device: &ash::Device) {
        unsafe { device.destroy_render_pass(self, None) }
    }
}

impl CachedObject for vk::Framebuffer {
    #[inline]
    unsafe fn destroy(self, device: &ash::Device) {
        unsafe { device.destroy_framebuffer(self, None) }
    }
}

impl CachedObject for vk::Sampler {
    #[inline]
    unsafe fn destroy(self, device: &ash::Device) {
        unsafe { device.destroy_sampler(self, None) }
    }
}

/// Native descriptor-set layout together with what is needed to allocate sets of it.
#[derive(Copy, Clone, Debug)]
pub(crate) struct DescriptorSetLayoutEntry {
    pub hash: u64,
    pub layout: vk::DescriptorSetLayout,
    pub counts: gpu_descriptor::DescriptorTotalCount,
}

impl CachedObject for DescriptorSetLayoutEntry {
    #[inline]
    unsafe fn destroy(self, device: &ash::Device) {
        unsafe { device.destroy_descriptor_set_layout(self.layout, None) }
    }
}

/// Native pipeline layout with the per-set information needed at bind time.
#[derive(Copy, Clone, Debug)]
pub(crate) struct PipelineLayoutEntry {
    pub hash: u64,
    pub layout: vk::PipelineLayout,
    pub set_layouts: [vk::DescriptorSetLayout; forge_render::MAX_DESCRIPTOR_SETS],
    /// Sets bound together with the pipeline: the shared empty set for unused
    /// indices and the pre-allocated set of static-sampler-only layouts.
    /// Null where the application binds its own set.
    pub fixed_sets: [vk::DescriptorSet; forge_render::MAX_DESCRIPTOR_SETS],
    pub push_constant_stages: vk::ShaderStageFlags,
    pub push_constant_size: u32,
}

impl CachedObject for PipelineLayoutEntry {
    #[inline]
    unsafe fn destroy(self, device: &ash::Device) {
        unsafe { device.destroy_pipeline_layout(self.layout, None) }
    }
}

type LocalMap<V> = AtomicRefCell<U64HashMap<V>>;
type SharedMap<V> = Mutex<U64HashMap<V>>;

/// Resolves `key` through the thread-local and the shared layer, creating
/// the object when neither has it.
///
/// Creation runs under the shared lock, so `create` is called at most once
/// per key for the lifetime of the shared map.
pub(crate) fn get_or_create<V: Copy>(
    local: &LocalMap<V>,
    shared: &SharedMap<V>,
    key: u64,
    create: impl FnOnce() -> Result<V>,
) -> Result<V> {
    if let Some(value) = local.try_borrow().ok().and_then(|m| m.get(&key).copied()) {
        return Ok(value);
    }
    let value = {
        let mut shared = lock(shared);
        match shared.get(&key) {
            Some(value) => *value,
            None => {
                let value = create()?;
                trace!("cache miss {:016x}", key);
                shared.insert(key, value);
                value
            }
        }
    };
    // re-entrant lookups from `create` may still hold a borrow; skip filling then
    if let Ok(mut local) = local.try_borrow_mut() {
        local.insert(key, value);
    }
    Ok(value)
}

#[derive(Default)]
pub(crate) struct ThreadCaches {
    render_passes: LocalMap<vk::RenderPass>,
    framebuffers: LocalMap<vk::Framebuffer>,
    descriptor_set_layouts: LocalMap<DescriptorSetLayoutEntry>,
    pipeline_layouts: LocalMap<PipelineLayoutEntry>,
    static_samplers: LocalMap<vk::Sampler>,
}

#[derive(Default)]
pub(crate) struct SharedCaches {
    render_passes: SharedMap<vk::RenderPass>,
    framebuffers: SharedMap<vk::Framebuffer>,
    descriptor_set_layouts: SharedMap<DescriptorSetLayoutEntry>,
    pipeline_layouts: SharedMap<PipelineLayoutEntry>,
    static_samplers: SharedMap<vk::Sampler>,
    threads: Mutex<SlotMap<ThreadKey, Arc<ThreadCaches>>>,
}

fn destroy_all<V: CachedObject>(map: &SharedMap<V>, device: &ash::Device) {
    for (_, value) in lock(map).drain() {
        unsafe { value.destroy(device) };
    }
}

impl SharedCaches {
    /// Registers a new thread layer.
    pub(crate) fn register_thread(&self) -> (ThreadKey, Arc<ThreadCaches>) {
        let caches = Arc::new(ThreadCaches::default());
        let key = lock(&self.threads).insert(caches.clone());
        (key, caches)
    }

    pub(crate) fn unregister_thread(&self, key: ThreadKey) {
        lock(&self.threads).remove(key);
    }

    pub(crate) fn thread_count(&self) -> usize {
        lock(&self.threads).len()
    }

    /// Destroys all native objects. Thread layers only hold copies of the handles.
    pub(crate) unsafe fn destroy(&self, device: &ash::Device) {
        for caches in lock(&self.threads).values() {
            caches.clear();
        }
        destroy_all(&self.framebuffers, device);
        destroy_all(&self.render_passes, device);
        destroy_all(&self.pipeline_layouts, device);
        destroy_all(&self.descriptor_set_layouts, device);
        destroy_all(&self.static_samplers, device);
    }
}

impl ThreadCaches {
    fn clear(&self) {
        if let Ok(mut m) = self.render_passes.try_borrow_mut() {
            m.clear();
        }
        if let Ok(mut m) = self.framebuffers.try_borrow_mut() {
            m.clear();
        }
        if let Ok(mut m) = self.descriptor_set_layouts.try_borrow_mut() {
            m.clear();
        }
        if let Ok(mut m) = self.pipeline_layouts.try_borrow_mut() {
            m.clear();
        }
        if let Ok(mut m) = self.static_samplers.try_borrow_mut() {
            m.clear();
        }
    }
}

struct Registration {
    key: ThreadKey,
    caches: Arc<ThreadCaches>,
    device: Arc<AshDevice>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.device.caches().unregister_thread(self.key);
    }
}

/// Identity of a recording thread towards the renderer's caches.
///
/// Obtained from [`Renderer::thread_context`](crate::Renderer::thread_context).
/// A context can be moved to another thread, but not shared between threads.
pub struct ThreadContext {
    registration: Arc<Registration>,
    _not_sync: PhantomData<Cell<()>>,
}

impl ThreadContext {
    pub(crate) fn new(device: &Arc<AshDevice>) -> Self {
        let (key, caches) = device.caches().register_thread();
        Self {
            registration: Arc::new(Registration {
                key,
                caches,
                device: device.clone(),
            }),
            _not_sync: PhantomData,
        }
    }

    /// Second handle to the same thread layer, kept by command buffers.
    pub(crate) fn share(&self) -> Self {
        Self {
            registration: self.registration.clone(),
            _not_sync: PhantomData,
        }
    }

    #[inline]
    pub(crate) fn device(&self) -> &Arc<AshDevice> {
        &self.registration.device
    }

    #[inline]
    fn layers(&self) -> (&ThreadCaches, &SharedCaches) {
        (&self.registration.caches, self.registration.device.caches())
    }

    pub(crate) fn render_pass(
        &self,
        key: u64,
        create: impl FnOnce() -> Result<vk::RenderPass>,
    ) -> Result<vk::RenderPass> {
        let (local, shared) = self.layers();
        get_or_create(&local.render_passes, &shared.render_passes, key, create)
    }

    pub(crate) fn framebuffer(
        &self,
        key: u64,
        create: impl FnOnce() -> Result<vk::Framebuffer>,
    ) -> Result<vk::Framebuffer> {
        let (local, shared) = self.layers();
        get_or_create(&local.framebuffers, &shared.framebuffers, key, create)
    }

    pub(crate) fn descriptor_set_layout(
        &self,
        key: u64,
        create: impl FnOnce() -> Result<DescriptorSetLayoutEntry>,
    ) -> Result<DescriptorSetLayoutEntry> {
        let (local, shared) = self.layers();
        get_or_create(
            &local.descriptor_set_layouts,
            &shared.descriptor_set_layouts,
            key,
            create,
        )
    }

    pub(crate) fn pipeline_layout(
        &self,
        key: u64,
        create: impl FnOnce() -> Result<PipelineLayoutEntry>,
    ) -> Result<PipelineLayoutEntry> {
        let (local, shared) = self.layers();
        get_or_create(&local.pipeline_layouts, &shared.pipeline_layouts, key, create)
    }

    pub(crate) fn static_sampler(
        &self,
        key: u64,
        create: impl FnOnce() -> Result<vk::Sampler>,
    ) -> Result<vk::Sampler> {
        let (local, shared) = self.layers();
        get_or_create(&local.static_samplers, &shared.static_samplers, key, create)
    }
}

impl std::fmt::Debug for ThreadContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ThreadContext")
            .field(&self.registration.key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;

    #[test]
    fn test_local_hit_skips_shared() {
        let local = LocalMap::<u64>::default();
        let shared = SharedMap::<u64>::default();
        assert_eq!(7, get_or_create(&local, &shared, 1, || Ok(7)).unwrap());
        lock(&shared).clear();
        // served by the thread layer without creating again
        assert_eq!(7, get_or_create(&local, &shared, 1, || Ok(8)).unwrap());
    }

    #[test]
    fn test_threads_converge_on_one_object() {
        let shared = SharedMap::<u64>::default();
        let created = AtomicU64::new(0);
        let results: Vec<u64> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        let local = LocalMap::<u64>::default();
                        let mut seen = Vec::new();
                        for _ in 0..3 {
                            seen.push(
                                get_or_create(&local, &shared, 42, || {
                                    Ok(100 + created.fetch_add(1, Ordering::SeqCst))
                                })
                                .unwrap(),
                            );
                        }
                        assert!(seen.iter().all(|&v| v == seen[0]));
                        seen[0]
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(1, created.load(Ordering::SeqCst));
        assert!(results.iter().all(|&v| v == 100));
    }

    #[test]
    fn test_failed_creation_is_not_cached() {
        let local = LocalMap::<u64>::default();
        let shared = SharedMap::<u64>::default();
        let result = get_or_create(&local, &shared, 5, || Err(crate::Error::Unknown));
        assert!(result.is_err());
        assert_eq!(3, get_or_create(&local, &shared, 5, || Ok(3)).unwrap());
    }

    #[test]
    fn test_reentrant_lookup_does_not_panic() {
        let local = LocalMap::<u64>::default();
        let shared = SharedMap::<u64>::default();
        let _guard = local.borrow();
        assert_eq!(9, get_or_create(&local, &shared, 2, || Ok(9)).unwrap());
    }

    #[test]
    fn test_thread_registry() {
        let caches = SharedCaches::default();
        let (a, _) = caches.register_thread();
        let (b, _) = caches.register_thread();
        assert_ne!(a, b);
        assert_eq!(2, caches.thread_count());
        caches.unregister_thread(a);
        assert_eq!(1, caches.thread_count());
    }
}
