use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    Arc, Mutex,
};

use ash::vk;
use forge_render::state::{FenceStatus, QueueDesc, QueueType};
use tracing::{debug, warn};

use crate::{
    alloc::lock,
    device::{AshDevice, QueueSlot},
    encoder::Cmd,
    swapchain::SwapChain,
    Error, Result,
};

/// Signal state of a [`Semaphore`].
///
/// Waiting consumes the signal; signaling an already signaled semaphore is
/// skipped.
#[derive(Debug, Default)]
pub(crate) struct SemaphoreState {
    signaled: AtomicBool,
    node_index: AtomicU32,
}

impl SemaphoreState {
    /// Node that signaled the semaphore, or `None` if it is not signaled.
    fn pending(&self) -> Option<u32> {
        self.is_signaled()
            .then(|| self.node_index.load(Ordering::Acquire))
    }

    /// Marks the semaphore as waited on. Returns the node that signaled it,
    /// or `None` if it was not signaled.
    fn consume(&self) -> Option<u32> {
        self.signaled
            .swap(false, Ordering::AcqRel)
            .then(|| self.node_index.load(Ordering::Acquire))
    }

    /// Marks the semaphore as signaled by `node_index`. Returns `false` if
    /// it already was signaled.
    fn signal(&self, node_index: u32) -> bool {
        if self.signaled.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.node_index.store(node_index, Ordering::Release);
        true
    }

    #[inline]
    fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::Acquire)
    }
}

pub struct Semaphore {
    device: Arc<AshDevice>,
    raw: vk::Semaphore,
    state: SemaphoreState,
}

impl Semaphore {
    pub(crate) fn new(device: &Arc<AshDevice>) -> Result<Self> {
        let raw = unsafe {
            device
                .create::<vk::Semaphore>(&vk::SemaphoreCreateInfo::default())?
                .take()
        };
        Ok(Self {
            device: device.clone(),
            raw,
            state: SemaphoreState::default(),
        })
    }

    #[inline]
    pub(crate) fn raw(&self) -> vk::Semaphore {
        self.raw
    }

    /// `true` while a signal is pending that nobody waited on yet.
    #[inline]
    pub fn is_signaled(&self) -> bool {
        self.state.is_signaled()
    }

    /// Marks the semaphore as signaled by an image acquire on `node_index`.
    pub(crate) fn mark_signaled(&self, node_index: u32) {
        self.state.signal(node_index);
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe { self.device.destroy(self.raw) }
    }
}

impl std::fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Semaphore")
            .field("raw", &self.raw)
            .field("signaled", &self.is_signaled())
            .finish()
    }
}

pub struct Fence {
    device: Arc<AshDevice>,
    raw: vk::Fence,
    submitted: AtomicBool,
}

impl Fence {
    pub(crate) fn new(device: &Arc<AshDevice>) -> Result<Self> {
        let raw = unsafe {
            device
                .create::<vk::Fence>(&vk::FenceCreateInfo::default())?
                .take()
        };
        Ok(Self {
            device: device.clone(),
            raw,
            submitted: AtomicBool::new(false),
        })
    }

    #[inline]
    pub(crate) fn raw(&self) -> vk::Fence {
        self.raw
    }

    #[inline]
    pub fn is_submitted(&self) -> bool {
        self.submitted.load(Ordering::Acquire)
    }

    pub(crate) fn mark_submitted(&self) {
        self.submitted.store(true, Ordering::Release);
    }

    /// Status of the fence. A completed fence is reset and reports
    /// [`FenceStatus::NotSubmitted`] on the next query.
    pub fn status(&self) -> Result<FenceStatus> {
        if !self.is_submitted() {
            return Ok(FenceStatus::NotSubmitted);
        }
        let signaled = unsafe { self.device.get_fence_status(self.raw) }
            .map_err(|e| self.device.map_error(e, vk::Queue::null()))?;
        if !signaled {
            return Ok(FenceStatus::Incomplete);
        }
        unsafe { self.device.reset_fences(&[self.raw])? };
        self.submitted.store(false, Ordering::Release);
        Ok(FenceStatus::Complete)
    }

    /// Blocks until every submitted fence of `fences` is signaled, then resets them.
    pub(crate) fn wait_all(device: &AshDevice, fences: &[&Self]) -> Result<()> {
        let pending: Vec<vk::Fence> = fences
            .iter()
            .filter(|f| f.is_submitted())
            .map(|f| f.raw)
            .collect();
        if pending.is_empty() {
            return Ok(());
        }
        unsafe {
            device
                .wait_for_fences(&pending, true, u64::MAX)
                .map_err(|e| device.map_error(e, vk::Queue::null()))?;
            device.reset_fences(&pending)?;
        }
        for fence in fences {
            fence.submitted.store(false, Ordering::Release);
        }
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe { self.device.destroy(self.raw) }
    }
}

impl std::fmt::Debug for Fence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fence")
            .field("raw", &self.raw)
            .field("submitted", &self.is_submitted())
            .finish()
    }
}

#[derive(Default)]
pub struct QueueSubmitDesc<'a> {
    pub cmds: &'a [&'a Cmd],
    pub signal_fence: Option<&'a Fence>,
    pub wait_semaphores: &'a [&'a Semaphore],
    pub signal_semaphores: &'a [&'a Semaphore],
}

pub struct QueuePresentDesc<'a> {
    pub swap_chain: &'a SwapChain,
    pub wait_semaphores: &'a [&'a Semaphore],
    pub index: u32,
}

/// Outcome of a successful present.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PresentStatus {
    Presented,
    /// The surface changed; the swap chain has to be recreated.
    OutOfDate,
}

/// `true` if a present with this result executed its semaphore waits.
fn present_waited(result: &ash::prelude::VkResult<bool>) -> bool {
    matches!(
        result,
        Ok(_)
            | Err(vk::Result::ERROR_OUT_OF_DATE_KHR
                | vk::Result::ERROR_SURFACE_LOST_KHR
                | vk::Result::ERROR_FULL_SCREEN_EXCLUSIVE_MODE_LOST_EXT)
    )
}

/// Native parameters of one submit, after semaphore filtering.
///
/// Semaphore states are only updated by [`SubmitBatch::commit`], after the
/// native call succeeded.
#[derive(Debug, Default)]
pub(crate) struct SubmitBatch<'a> {
    pub command_buffers: Vec<vk::CommandBuffer>,
    pub device_masks: Vec<u32>,
    pub wait: Vec<vk::Semaphore>,
    pub wait_stages: Vec<vk::PipelineStageFlags>,
    pub wait_device_indices: Vec<u32>,
    pub signal: Vec<vk::Semaphore>,
    pub signal_device_indices: Vec<u32>,
    waited: Vec<&'a SemaphoreState>,
    signaled: Vec<(&'a SemaphoreState, u32)>,
}

impl<'a> SubmitBatch<'a> {
    pub fn add_command_buffer(&mut self, raw: vk::CommandBuffer, node_index: u32) {
        self.command_buffers.push(raw);
        self.device_masks.push(1 << node_index);
    }

    fn waits_on(&self, state: &SemaphoreState) -> bool {
        self.waited.iter().any(|w| std::ptr::eq(*w, state))
    }

    /// Waits on `raw` only if it carries an unconsumed signal.
    pub fn add_wait(&mut self, raw: vk::Semaphore, state: &'a SemaphoreState) {
        if self.waits_on(state) {
            return;
        }
        if let Some(node_index) = state.pending() {
            self.wait.push(raw);
            self.wait_stages.push(vk::PipelineStageFlags::ALL_COMMANDS);
            self.wait_device_indices.push(node_index);
            self.waited.push(state);
        }
    }

    /// Signals `raw` only if it is not signaled once the waits of this batch ran.
    pub fn add_signal(&mut self, raw: vk::Semaphore, state: &'a SemaphoreState, node_index: u32) {
        let signaled_here = self.signaled.iter().any(|(s, _)| std::ptr::eq(*s, state));
        if signaled_here || (state.is_signaled() && !self.waits_on(state)) {
            return;
        }
        self.signal.push(raw);
        self.signal_device_indices.push(node_index);
        self.signaled.push((state, node_index));
    }

    /// Applies the waits and signals of the batch to the semaphore states.
    pub fn commit(self) {
        for state in self.waited {
            state.consume();
        }
        for (state, node_index) in self.signaled {
            state.signal(node_index);
        }
    }
}

pub struct Queue {
    device: Arc<AshDevice>,
    raw: vk::Queue,
    slot: QueueSlot,
    queue_type: QueueType,
    node_index: u32,
    submit_lock: Arc<Mutex<()>>,
}

impl Queue {
    pub(crate) fn new(device: &Arc<AshDevice>, desc: &QueueDesc) -> Result<Self> {
        let node_index = if device.is_linked() {
            desc.node_index
        } else {
            0
        };
        let slot = device.acquire_queue_slot(desc.queue_type, node_index);
        let Some(submit_lock) = device.queue_lock(slot.family_index, slot.queue_index) else {
            device.release_queue_slot(&slot, node_index);
            return Err(Error::OutOfQueues(desc.queue_type));
        };
        let raw = unsafe { device.get_device_queue(slot.family_index, slot.queue_index) };
        if raw == vk::Queue::null() {
            device.release_queue_slot(&slot, node_index);
            return Err(Error::OutOfQueues(desc.queue_type));
        }
        debug!(
            "added {:?} queue: family={}, index={}",
            desc.queue_type, slot.family_index, slot.queue_index
        );
        Ok(Self {
            device: device.clone(),
            raw,
            slot,
            queue_type: desc.queue_type,
            node_index,
            submit_lock,
        })
    }

    #[inline]
    pub(crate) fn raw(&self) -> vk::Queue {
        self.raw
    }

    #[inline]
    pub fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    #[inline]
    pub fn family_index(&self) -> u32 {
        self.slot.family_index
    }

    #[inline]
    pub fn node_index(&self) -> u32 {
        self.node_index
    }

    /// Flags of the queue family this queue belongs to.
    #[inline]
    pub fn family_flags(&self) -> vk::QueueFlags {
        self.slot.family_flags
    }

    /// Nanoseconds per timestamp tick on this queue.
    #[inline]
    pub fn timestamp_period(&self) -> f32 {
        self.device.limits().timestamp_period
    }

    pub fn submit(&self, desc: &QueueSubmitDesc<'_>) -> Result<()> {
        if desc.cmds.is_empty() {
            return Ok(());
        }
        let mut batch = SubmitBatch::default();
        for cmd in desc.cmds {
            batch.add_command_buffer(cmd.raw(), cmd.node_index());
        }
        for semaphore in desc.wait_semaphores {
            batch.add_wait(semaphore.raw, &semaphore.state);
        }
        for semaphore in desc.signal_semaphores {
            batch.add_signal(semaphore.raw, &semaphore.state, self.node_index);
        }

        let mut group_info = vk::DeviceGroupSubmitInfo::builder()
            .wait_semaphore_device_indices(&batch.wait_device_indices)
            .command_buffer_device_masks(&batch.device_masks)
            .signal_semaphore_device_indices(&batch.signal_device_indices);
        let mut submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&batch.wait)
            .wait_dst_stage_mask(&batch.wait_stages)
            .command_buffers(&batch.command_buffers)
            .signal_semaphores(&batch.signal);
        if self.device.is_linked() {
            submit_info = submit_info.push_next(&mut group_info);
        }

        let fence = desc.signal_fence.map_or(vk::Fence::null(), |f| f.raw);
        {
            let _guard = lock(&self.submit_lock);
            unsafe { self.device.queue_submit(self.raw, &[submit_info.build()], fence) }
                .map_err(|e| self.device.map_error(e, self.raw))?;
        }
        batch.commit();
        if let Some(fence) = desc.signal_fence {
            fence.mark_submitted();
        }
        Ok(())
    }

    /// Presents image `index` of the swap chain, consuming the wait semaphores.
    pub fn present(&self, desc: &QueuePresentDesc<'_>) -> Result<PresentStatus> {
        let mut waits = SubmitBatch::default();
        for semaphore in desc.wait_semaphores {
            waits.add_wait(semaphore.raw, &semaphore.state);
        }
        let swapchains = [desc.swap_chain.raw()];
        let indices = [desc.index];
        let device_masks = [1 << self.node_index];
        let mut group_info = vk::DeviceGroupPresentInfoKHR::builder()
            .device_masks(&device_masks)
            .mode(vk::DeviceGroupPresentModeFlagsKHR::LOCAL);
        let mut present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&waits.wait)
            .swapchains(&swapchains)
            .image_indices(&indices);
        if self.device.is_linked() {
            present_info = present_info.push_next(&mut group_info);
        }

        let ext = self.device.ext_swapchain()?;
        let (queue, queue_lock) = desc
            .swap_chain
            .present_queue()
            .unwrap_or((self.raw, &self.submit_lock));
        let result = {
            let _guard = lock(queue_lock);
            unsafe { ext.queue_present(queue, &present_info) }
        };
        if present_waited(&result) {
            waits.commit();
        }
        match result {
            Ok(false) => Ok(PresentStatus::Presented),
            Ok(true) => {
                debug!("swapchain is suboptimal");
                Ok(PresentStatus::Presented)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentStatus::OutOfDate),
            Err(vk::Result::ERROR_SURFACE_LOST_KHR) => {
                warn!("surface lost while presenting");
                Err(Error::SurfaceLost)
            }
            Err(e) => Err(self.device.map_error(e, queue)),
        }
    }

    /// Blocks until all work submitted to this queue is complete.
    pub fn wait_idle(&self) -> Result<()> {
        let _guard = lock(&self.submit_lock);
        unsafe { self.device.queue_wait_idle(self.raw) }
            .map_err(|e| self.device.map_error(e, self.raw))
    }
}

impl Drop for Queue {
    fn drop(&mut self) {
        self.device.release_queue_slot(&self.slot, self.node_index);
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("raw", &self.raw)
            .field("queue_type", &self.queue_type)
            .field("family_index", &self.slot.family_index)
            .field("queue_index", &self.slot.queue_index)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;

    #[test]
    fn test_wait_skips_unsignaled_semaphores() {
        let signaled = SemaphoreState::default();
        assert!(signaled.signal(1));
        let unsignaled = SemaphoreState::default();

        let mut batch = SubmitBatch::default();
        batch.add_wait(vk::Semaphore::from_raw(1), &signaled);
        batch.add_wait(vk::Semaphore::from_raw(2), &unsignaled);
        batch.add_wait(vk::Semaphore::from_raw(1), &signaled);
        assert_eq!(vec![vk::Semaphore::from_raw(1)], batch.wait);
        assert_eq!(vec![1], batch.wait_device_indices);
        assert_eq!(vec![vk::PipelineStageFlags::ALL_COMMANDS], batch.wait_stages);
        assert!(signaled.is_signaled());
        batch.commit();
        assert!(!signaled.is_signaled());
    }

    #[test]
    fn test_signal_skips_signaled_semaphores() {
        let pending = SemaphoreState::default();
        assert!(pending.signal(0));
        let fresh = SemaphoreState::default();

        let mut batch = SubmitBatch::default();
        batch.add_signal(vk::Semaphore::from_raw(1), &pending, 2);
        batch.add_signal(vk::Semaphore::from_raw(2), &fresh, 2);
        batch.add_signal(vk::Semaphore::from_raw(2), &fresh, 2);
        assert_eq!(vec![vk::Semaphore::from_raw(2)], batch.signal);
        assert_eq!(vec![2], batch.signal_device_indices);
        assert!(!fresh.is_signaled());
        batch.commit();
        assert!(fresh.is_signaled());
        assert_eq!(Some(2), fresh.consume());
        assert_eq!(None, fresh.consume());
    }

    #[test]
    fn test_failed_submit_keeps_semaphore_states() {
        let acquired = SemaphoreState::default();
        assert!(acquired.signal(0));
        let rendered = SemaphoreState::default();

        {
            let mut batch = SubmitBatch::default();
            batch.add_wait(vk::Semaphore::from_raw(1), &acquired);
            batch.add_signal(vk::Semaphore::from_raw(2), &rendered, 0);
            // dropped without commit, as after a failed queue_submit
        }
        assert!(acquired.is_signaled());
        assert!(!rendered.is_signaled());

        let mut batch = SubmitBatch::default();
        batch.add_wait(vk::Semaphore::from_raw(1), &acquired);
        batch.add_signal(vk::Semaphore::from_raw(2), &rendered, 0);
        assert_eq!(vec![vk::Semaphore::from_raw(1)], batch.wait);
        assert_eq!(vec![vk::Semaphore::from_raw(2)], batch.signal);
        batch.commit();
        assert!(!acquired.is_signaled());
        assert!(rendered.is_signaled());
    }

    #[test]
    fn test_wait_and_signal_same_semaphore() {
        let state = SemaphoreState::default();
        assert!(state.signal(0));

        let mut batch = SubmitBatch::default();
        batch.add_wait(vk::Semaphore::from_raw(1), &state);
        batch.add_signal(vk::Semaphore::from_raw(1), &state, 1);
        assert_eq!(1, batch.wait.len());
        assert_eq!(1, batch.signal.len());
        batch.commit();
        assert_eq!(Some(1), state.consume());
    }

    #[test]
    fn test_present_consumes_wait_semaphores() {
        let rendered = SemaphoreState::default();
        assert!(rendered.signal(0));

        let results: [(ash::prelude::VkResult<bool>, bool); 2] = [
            (Err(vk::Result::ERROR_DEVICE_LOST), false),
            (Err(vk::Result::ERROR_OUT_OF_DATE_KHR), true),
        ];
        for (result, consumed) in results {
            let mut waits = SubmitBatch::default();
            waits.add_wait(vk::Semaphore::from_raw(1), &rendered);
            assert_eq!(vec![vk::Semaphore::from_raw(1)], waits.wait);
            assert_eq!(consumed, present_waited(&result));
            if present_waited(&result) {
                waits.commit();
            }
            assert_eq!(!consumed, rendered.is_signaled());
        }

        assert!(present_waited(&Ok(false)));
        assert!(present_waited(&Ok(true)));
        assert!(!present_waited(&Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY)));
    }

    #[test]
    fn test_command_buffer_device_masks() {
        let mut batch = SubmitBatch::default();
        batch.add_command_buffer(vk::CommandBuffer::from_raw(1), 0);
        batch.add_command_buffer(vk::CommandBuffer::from_raw(2), 2);
        assert_eq!(vec![0b001, 0b100], batch.device_masks);
    }
}
