use std::sync::Arc;

use ash::vk;
use forge_render::{
    descriptor::{DescriptorInfo, DescriptorSetLayoutDesc, DescriptorType, DescriptorUpdateFrequency},
    utils::hash::{content_hash, RunningHash},
};
use gpu_descriptor::{
    CreatePoolError, DescriptorDevice, DescriptorPoolCreateFlags, DescriptorSetLayoutCreateFlags,
    DescriptorTotalCount, DeviceAllocationError,
};
use tracing::{debug, warn};

use crate::{
    alloc::lock,
    cache::{DescriptorSetLayoutEntry, ThreadContext},
    convert::VkInto,
    device::AshDevice,
    raytracing::AccelerationStructure,
    resources::{
        null::NullDescriptors, sampler::create_sampler, Buffer, PipelineLayout, RenderTarget,
        Sampler, Texture,
    },
    Error, Result,
};

/// Capacity of each scratch array holding image, buffer and texel-view infos.
pub(crate) const DESCRIPTOR_SCRATCH_SIZE: usize = 1024;
/// Maximum number of write records passed to one native update.
pub(crate) const MAX_DESCRIPTOR_WRITES: usize = 256;

#[repr(transparent)]
pub(crate) struct AshDescriptorDevice(ash::Device);

impl AshDescriptorDevice {
    #[inline]
    pub fn wrap(device: &ash::Device) -> &Self {
        // SAFETY: `repr(transparent)`
        unsafe { &*(device as *const ash::Device as *const Self) }
    }
}

impl DescriptorDevice<vk::DescriptorSetLayout, vk::DescriptorPool, vk::DescriptorSet>
    for AshDescriptorDevice
{
    unsafe fn create_descriptor_pool(
        &self,
        descriptor_count: &DescriptorTotalCount,
        max_sets: u32,
        flags: DescriptorPoolCreateFlags,
    ) -> Result<vk::DescriptorPool, CreatePoolError> {
        let unfiltered_counts = [
            (vk::DescriptorType::SAMPLER, descriptor_count.sampler),
            (
                vk::DescriptorType::SAMPLED_IMAGE,
                descriptor_count.sampled_image,
            ),
            (
                vk::DescriptorType::STORAGE_IMAGE,
                descriptor_count.storage_image,
            ),
            (
                vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count.uniform_buffer,
            ),
            (
                vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                descriptor_count.uniform_buffer_dynamic,
            ),
            (
                vk::DescriptorType::STORAGE_BUFFER,
                descriptor_count.storage_buffer,
            ),
            (
                vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
                descriptor_count.storage_buffer_dynamic,
            ),
            (
                vk::DescriptorType::UNIFORM_TEXEL_BUFFER,
                descriptor_count.uniform_texel_buffer,
            ),
            (
                vk::DescriptorType::STORAGE_TEXEL_BUFFER,
                descriptor_count.storage_texel_buffer,
            ),
            (
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count.combined_image_sampler,
            ),
            (
                vk::DescriptorType::INPUT_ATTACHMENT,
                descriptor_count.input_attachment,
            ),
            (
                vk::DescriptorType::ACCELERATION_STRUCTURE_KHR,
                descriptor_count.acceleration_structure,
            ),
        ];
        let filtered_counts: Vec<vk::DescriptorPoolSize> = unfiltered_counts
            .iter()
            .filter(|&&(_, count)| count != 0)
            .map(|&(ty, descriptor_count)| vk::DescriptorPoolSize {
                ty,
                descriptor_count,
            })
            .collect();

        let mut vk_flags = vk::DescriptorPoolCreateFlags::empty();
        if flags.contains(DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET) {
            vk_flags |= vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET;
        }
        if flags.contains(DescriptorPoolCreateFlags::UPDATE_AFTER_BIND) {
            vk_flags |= vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND;
        }
        let info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(max_sets)
            .flags(vk_flags)
            .pool_sizes(&filtered_counts);

        match unsafe { self.0.create_descriptor_pool(&info, None) } {
            Ok(pool) => Ok(pool),
            Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY) => Err(CreatePoolError::OutOfHostMemory),
            Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY) => {
                Err(CreatePoolError::OutOfDeviceMemory)
            }
            Err(vk::Result::ERROR_FRAGMENTATION) => Err(CreatePoolError::Fragmentation),
            Err(other) => {
                warn!("create_descriptor_pool: {:?}", other);
                Err(CreatePoolError::OutOfHostMemory)
            }
        }
    }

    unsafe fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.0.destroy_descriptor_pool(pool, None) }
    }

    unsafe fn alloc_descriptor_sets<'a>(
        &self,
        pool: &mut vk::DescriptorPool,
        layouts: impl ExactSizeIterator<Item = &'a vk::DescriptorSetLayout>,
        sets: &mut impl Extend<vk::DescriptorSet>,
    ) -> Result<(), DeviceAllocationError> {
        let layouts: Vec<vk::DescriptorSetLayout> = layouts.copied().collect();
        let info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(*pool)
            .set_layouts(&layouts);
        match unsafe { self.0.allocate_descriptor_sets(&info) } {
            Ok(vk_sets) => {
                sets.extend(vk_sets);
                Ok(())
            }
            Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY) => Err(DeviceAllocationError::OutOfHostMemory),
            Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY) => {
                Err(DeviceAllocationError::OutOfDeviceMemory)
            }
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) => Err(DeviceAllocationError::OutOfPoolMemory),
            Err(vk::Result::ERROR_FRAGMENTED_POOL) => Err(DeviceAllocationError::FragmentedPool),
            Err(other) => {
                warn!("allocate_descriptor_sets: {:?}", other);
                Err(DeviceAllocationError::OutOfHostMemory)
            }
        }
    }

    unsafe fn dealloc_descriptor_sets(
        &self,
        pool: &mut vk::DescriptorPool,
        sets: impl Iterator<Item = vk::DescriptorSet>,
    ) {
        let sets: Vec<vk::DescriptorSet> = sets.collect();
        if let Err(e) = unsafe { self.0.free_descriptor_sets(*pool, &sets) } {
            warn!("free_descriptor_sets: {:?}", e);
        }
    }
}

type RawDescriptorSet = gpu_descriptor::DescriptorSet<vk::DescriptorSet>;

impl AshDevice {
    pub(crate) unsafe fn alloc_descriptor_sets(
        &self,
        entry: &DescriptorSetLayoutEntry,
        count: u32,
    ) -> Result<Vec<RawDescriptorSet>> {
        unsafe {
            self.descriptor_allocator().allocate(
                AshDescriptorDevice::wrap(self),
                &entry.layout,
                DescriptorSetLayoutCreateFlags::empty(),
                &entry.counts,
                count,
            )
        }
        .map_err(|e| Error::DescriptorAllocation(format!("{e:?}")))
    }

    pub(crate) unsafe fn free_descriptor_sets(&self, sets: Vec<RawDescriptorSet>) {
        unsafe {
            self.descriptor_allocator()
                .free(AshDescriptorDevice::wrap(self), sets)
        }
    }

    /// Descriptor set that is never written, shared by everything bound with `entry`.
    ///
    /// Used for unused set indices (the empty layout) and for layouts that
    /// only hold immutable samplers.
    pub(crate) fn internal_descriptor_set(
        &self,
        entry: &DescriptorSetLayoutEntry,
    ) -> Result<vk::DescriptorSet> {
        let mut sets = lock(self.internal_sets());
        if let Some(set) = sets.get(&entry.hash) {
            return Ok(*set.raw());
        }
        let mut allocated = unsafe { self.alloc_descriptor_sets(entry, 1)? };
        let set = allocated.pop().ok_or(Error::DescriptorAllocation(
            "no descriptor set returned".to_owned(),
        ))?;
        let raw = *set.raw();
        sets.insert(entry.hash, set);
        Ok(raw)
    }
}

/// Hash over everything that affects the native layout. Descriptor names do not.
pub(crate) fn layout_hash(desc: &DescriptorSetLayoutDesc) -> u64 {
    let mut hash = RunningHash::new();
    hash.add(&desc.descriptors.len());
    for d in desc.bindings() {
        hash.add(&d.binding)
            .add(&d.descriptor_type)
            .add(&d.count)
            .add(&d.stages)
            .add(&d.static_sampler);
    }
    hash.finish()
}

pub(crate) fn descriptor_total_count<'a>(
    bindings: impl IntoIterator<Item = &'a DescriptorInfo>,
) -> DescriptorTotalCount {
    let mut result = DescriptorTotalCount::default();
    for d in bindings {
        let ty: vk::DescriptorType = d.descriptor_type.vk_into();
        let count = d.count.max(1);
        match ty {
            vk::DescriptorType::SAMPLER => result.sampler += count,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER => result.combined_image_sampler += count,
            vk::DescriptorType::SAMPLED_IMAGE => result.sampled_image += count,
            vk::DescriptorType::STORAGE_IMAGE => result.storage_image += count,
            vk::DescriptorType::UNIFORM_TEXEL_BUFFER => result.uniform_texel_buffer += count,
            vk::DescriptorType::STORAGE_TEXEL_BUFFER => result.storage_texel_buffer += count,
            vk::DescriptorType::UNIFORM_BUFFER => result.uniform_buffer += count,
            vk::DescriptorType::STORAGE_BUFFER => result.storage_buffer += count,
            vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC => result.uniform_buffer_dynamic += count,
            vk::DescriptorType::STORAGE_BUFFER_DYNAMIC => result.storage_buffer_dynamic += count,
            vk::DescriptorType::INPUT_ATTACHMENT => result.input_attachment += count,
            vk::DescriptorType::ACCELERATION_STRUCTURE_KHR => {
                result.acceleration_structure += count
            }
            _ => {}
        }
    }
    result
}

/// Returns the cached native layout for `desc`, creating it on first use.
pub(crate) fn get_or_add_set_layout(
    ctx: &ThreadContext,
    desc: &DescriptorSetLayoutDesc,
) -> Result<DescriptorSetLayoutEntry> {
    let device = ctx.device();

    // immutable samplers come from their own cache, resolved before taking the layout lock
    let mut immutable_samplers = Vec::new();
    for d in desc.bindings() {
        if let Some(sampler_desc) = &d.static_sampler {
            let sampler = ctx.static_sampler(content_hash(sampler_desc), || unsafe {
                create_sampler(device, sampler_desc)
            })?;
            immutable_samplers.push((d.binding, vec![sampler; d.count.max(1) as usize]));
        }
    }

    let hash = layout_hash(desc);
    ctx.descriptor_set_layout(hash, || {
        let bindings: Vec<vk::DescriptorSetLayoutBinding> = desc
            .bindings()
            .map(|d| {
                let mut binding = vk::DescriptorSetLayoutBinding::builder()
                    .binding(d.binding)
                    .descriptor_type(d.descriptor_type.vk_into())
                    .descriptor_count(d.count.max(1))
                    .stage_flags(d.stages.vk_into());
                if let Some((_, samplers)) = immutable_samplers.iter().find(|(b, _)| *b == d.binding)
                {
                    binding = binding.immutable_samplers(samplers);
                }
                binding.build()
            })
            .collect();
        let create_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);
        let layout = unsafe { device.create::<vk::DescriptorSetLayout>(&create_info)? };
        debug!("descriptor set layout {:016x}: {} bindings", hash, bindings.len());
        Ok(DescriptorSetLayoutEntry {
            hash,
            layout: layout.take(),
            counts: descriptor_total_count(desc.bindings()),
        })
    })
}

/// One descriptor info for a write record.
#[derive(Copy, Clone, Debug)]
pub(crate) enum WriteInfo {
    Image(vk::DescriptorImageInfo),
    Buffer(vk::DescriptorBufferInfo),
    TexelBuffer(vk::BufferView),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum InfoKind {
    Image,
    Buffer,
    TexelBuffer,
}

impl WriteInfo {
    fn kind(&self) -> InfoKind {
        match self {
            Self::Image(_) => InfoKind::Image,
            Self::Buffer(_) => InfoKind::Buffer,
            Self::TexelBuffer(_) => InfoKind::TexelBuffer,
        }
    }
}

/// Receives batches of native descriptor writes.
pub(crate) trait DescriptorWriteSink {
    fn update(&mut self, writes: &[vk::WriteDescriptorSet]);
}

pub(crate) struct DeviceWriteSink<'a>(pub &'a ash::Device);

impl DescriptorWriteSink for DeviceWriteSink<'_> {
    #[inline]
    fn update(&mut self, writes: &[vk::WriteDescriptorSet]) {
        unsafe { self.0.update_descriptor_sets(writes, &[]) }
    }
}

struct PendingWrite {
    binding: u32,
    array_element: u32,
    ty: vk::DescriptorType,
    kind: InfoKind,
    start: usize,
    count: u32,
}

struct OpenEntry {
    binding: u32,
    next_element: u32,
    ty: vk::DescriptorType,
    /// A write record for this entry exists in the current batch.
    has_write: bool,
}

/// Streams descriptor writes into bounded scratch arrays.
///
/// A batch is flushed whenever one scratch array or the write list is full.
/// An entry interrupted by a flush continues in a new write record starting
/// at the next array element, so the final descriptor state does not depend
/// on where the flushes happen.
pub(crate) struct DescriptorWriteBatcher<S> {
    set: vk::DescriptorSet,
    sink: S,
    images: Vec<vk::DescriptorImageInfo>,
    buffers: Vec<vk::DescriptorBufferInfo>,
    texel_views: Vec<vk::BufferView>,
    writes: Vec<PendingWrite>,
    entry: Option<OpenEntry>,
}

impl<S: DescriptorWriteSink> DescriptorWriteBatcher<S> {
    pub fn new(set: vk::DescriptorSet, sink: S) -> Self {
        Self {
            set,
            sink,
            images: Vec::with_capacity(DESCRIPTOR_SCRATCH_SIZE),
            buffers: Vec::with_capacity(DESCRIPTOR_SCRATCH_SIZE),
            texel_views: Vec::with_capacity(DESCRIPTOR_SCRATCH_SIZE),
            writes: Vec::with_capacity(MAX_DESCRIPTOR_WRITES),
            entry: None,
        }
    }

    /// Starts a new logical entry at `binding`, beginning with `array_offset`.
    pub fn begin(&mut self, binding: u32, array_offset: u32, ty: vk::DescriptorType) {
        self.entry = Some(OpenEntry {
            binding,
            next_element: array_offset,
            ty,
            has_write: false,
        });
    }

    fn scratch_len(&self, kind: InfoKind) -> usize {
        match kind {
            InfoKind::Image => self.images.len(),
            InfoKind::Buffer => self.buffers.len(),
            InfoKind::TexelBuffer => self.texel_views.len(),
        }
    }

    /// Appends the next array element of the current entry.
    pub fn push(&mut self, info: WriteInfo) {
        let kind = info.kind();
        if self.scratch_len(kind) == DESCRIPTOR_SCRATCH_SIZE {
            self.flush();
        }
        let Some(entry) = &self.entry else {
            debug_assert!(false, "push without begin");
            return;
        };
        let needs_write = !entry.has_write
            || self
                .writes
                .last()
                .is_none_or(|w| w.kind != kind || w.binding != entry.binding);
        if needs_write {
            if self.writes.len() == MAX_DESCRIPTOR_WRITES {
                self.flush();
            }
            let start = self.scratch_len(kind);
            let Some(entry) = &mut self.entry else {
                return;
            };
            self.writes.push(PendingWrite {
                binding: entry.binding,
                array_element: entry.next_element,
                ty: entry.ty,
                kind,
                start,
                count: 0,
            });
            entry.has_write = true;
        }
        match info {
            WriteInfo::Image(i) => self.images.push(i),
            WriteInfo::Buffer(b) => self.buffers.push(b),
            WriteInfo::TexelBuffer(v) => self.texel_views.push(v),
        }
        if let Some(w) = self.writes.last_mut() {
            w.count += 1;
        }
        if let Some(entry) = &mut self.entry {
            entry.next_element += 1;
        }
    }

    /// Writes one acceleration structure immediately; these are never batched.
    pub fn write_acceleration_structure(
        &mut self,
        binding: u32,
        array_element: u32,
        acceleration_structure: vk::AccelerationStructureKHR,
    ) {
        let structures = [acceleration_structure];
        let mut info = vk::WriteDescriptorSetAccelerationStructureKHR::builder()
            .acceleration_structures(&structures);
        let mut write = vk::WriteDescriptorSet::builder()
            .dst_set(self.set)
            .dst_binding(binding)
            .dst_array_element(array_element)
            .descriptor_type(vk::DescriptorType::ACCELERATION_STRUCTURE_KHR)
            .push_next(&mut info)
            .build();
        write.descriptor_count = 1;
        self.sink.update(&[write]);
    }

    pub fn flush(&mut self) {
        if !self.writes.is_empty() {
            let writes: Vec<vk::WriteDescriptorSet> = self
                .writes
                .iter()
                .map(|w| {
                    let range = w.start..w.start + w.count as usize;
                    let builder = vk::WriteDescriptorSet::builder()
                        .dst_set(self.set)
                        .dst_binding(w.binding)
                        .dst_array_element(w.array_element)
                        .descriptor_type(w.ty);
                    match w.kind {
                        InfoKind::Image => builder.image_info(&self.images[range]).build(),
                        InfoKind::Buffer => builder.buffer_info(&self.buffers[range]).build(),
                        InfoKind::TexelBuffer => {
                            builder.texel_buffer_view(&self.texel_views[range]).build()
                        }
                    }
                })
                .collect();
            self.sink.update(&writes);
        }
        self.images.clear();
        self.buffers.clear();
        self.texel_views.clear();
        self.writes.clear();
        if let Some(entry) = &mut self.entry {
            entry.has_write = false;
        }
    }

    /// Flushes the remaining writes and returns the sink.
    pub fn finish(mut self) -> S {
        self.flush();
        self.sink
    }
}

/// Resources written into one descriptor.
#[derive(Copy, Clone)]
pub enum DescriptorResources<'a> {
    Textures(&'a [&'a Texture]),
    RenderTargets(&'a [&'a RenderTarget]),
    Buffers(&'a [&'a Buffer]),
    Samplers(&'a [&'a Sampler]),
    AccelerationStructures(&'a [&'a AccelerationStructure]),
}

impl DescriptorResources<'_> {
    fn len(&self) -> usize {
        match self {
            Self::Textures(r) => r.len(),
            Self::RenderTargets(r) => r.len(),
            Self::Buffers(r) => r.len(),
            Self::Samplers(r) => r.len(),
            Self::AccelerationStructures(r) => r.len(),
        }
    }
}

/// One descriptor update, addressed by the descriptor's name in the layout.
#[derive(Copy, Clone)]
pub struct DescriptorData<'a> {
    pub name: &'a str,
    pub resources: DescriptorResources<'a>,
    pub array_offset: u32,
    /// Byte offsets into the buffers, one per buffer.
    pub buffer_offsets: Option<&'a [u64]>,
    /// Byte ranges of the buffers, one per buffer.
    pub buffer_sizes: Option<&'a [u64]>,
    /// Mip level written for storage textures.
    pub uav_mip_slice: u32,
    /// Writes every mip level of the (single) storage texture as array elements.
    pub bind_mip_chain: bool,
    /// Uses the stencil-only view of depth/stencil textures.
    pub bind_stencil_resource: bool,
}

impl<'a> DescriptorData<'a> {
    pub fn new(name: &'a str, resources: DescriptorResources<'a>) -> Self {
        Self {
            name,
            resources,
            array_offset: 0,
            buffer_offsets: None,
            buffer_sizes: None,
            uav_mip_slice: 0,
            bind_mip_chain: false,
            bind_stencil_resource: false,
        }
    }
}

pub struct DescriptorSetDesc<'a> {
    pub pipeline_layout: &'a PipelineLayout,
    pub update_frequency: DescriptorUpdateFrequency,
    /// Number of independent sets that can be updated and bound by index.
    pub max_sets: u32,
    pub node_index: u32,
}

/// A group of `max_sets` descriptor sets of one layout.
pub struct DescriptorSet {
    device: Arc<AshDevice>,
    sets: Vec<RawDescriptorSet>,
    raw_sets: Vec<vk::DescriptorSet>,
    layout_desc: DescriptorSetLayoutDesc,
    set_index: u32,
    pipeline_layout: vk::PipelineLayout,
    bind_point: vk::PipelineBindPoint,
    fixed_sets: [vk::DescriptorSet; forge_render::MAX_DESCRIPTOR_SETS],
}

impl DescriptorSet {
    pub(crate) fn new(
        ctx: &ThreadContext,
        desc: &DescriptorSetDesc<'_>,
        null: &NullDescriptors,
    ) -> Result<Self> {
        let device = ctx.device().clone();
        let set_index = desc.update_frequency.set_index();
        let layout_desc = desc
            .pipeline_layout
            .set_desc(set_index)
            .ok_or(Error::InvalidDesc(
                "pipeline layout has no descriptors for this update frequency",
            ))?
            .clone();
        let entry = get_or_add_set_layout(ctx, &layout_desc)?;
        let sets = unsafe { device.alloc_descriptor_sets(&entry, desc.max_sets.max(1))? };
        let raw_sets: Vec<vk::DescriptorSet> = sets.iter().map(|s| *s.raw()).collect();

        let set = Self {
            device,
            sets,
            raw_sets,
            layout_desc,
            set_index: set_index as u32,
            pipeline_layout: desc.pipeline_layout.raw(),
            bind_point: desc.pipeline_layout.bind_point(),
            fixed_sets: *desc.pipeline_layout.fixed_sets(),
        };
        for &raw in &set.raw_sets {
            set.write_null_descriptors(raw, null);
        }
        Ok(set)
    }

    /// Pre-fills every binding with the null resource of its type.
    fn write_null_descriptors(&self, raw: vk::DescriptorSet, null: &NullDescriptors) {
        let mut batch = DescriptorWriteBatcher::new(raw, DeviceWriteSink(&self.device));
        for d in self.layout_desc.bindings() {
            if d.static_sampler.is_some()
                || d.descriptor_type.contains(DescriptorType::ACCELERATION_STRUCTURE)
            {
                continue;
            }
            let Some(info) = null.write_info(d.descriptor_type, d.dimension) else {
                continue;
            };
            batch.begin(d.binding, 0, d.descriptor_type.vk_into());
            for _ in 0..d.count.max(1) {
                batch.push(info);
            }
        }
        batch.finish();
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.raw_sets.len() as u32
    }

    #[inline]
    pub(crate) fn raw(&self, index: u32) -> Option<vk::DescriptorSet> {
        self.raw_sets.get(index as usize).copied()
    }

    #[inline]
    pub(crate) fn set_index(&self) -> u32 {
        self.set_index
    }

    #[inline]
    pub(crate) fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.pipeline_layout
    }

    #[inline]
    pub(crate) fn bind_point(&self) -> vk::PipelineBindPoint {
        self.bind_point
    }

    /// Sets of the root layout that are bound along with any user set.
    #[inline]
    pub(crate) fn fixed_sets(&self) -> &[vk::DescriptorSet; forge_render::MAX_DESCRIPTOR_SETS] {
        &self.fixed_sets
    }

    /// Writes `params` into the set at `index`.
    pub fn update(&self, index: u32, params: &[DescriptorData<'_>]) -> Result<()> {
        let raw = self
            .raw(index)
            .ok_or(Error::InvalidDesc("descriptor set index out of range"))?;
        let mut batch = DescriptorWriteBatcher::new(raw, DeviceWriteSink(&self.device));
        for param in params {
            let (_, info) = self
                .layout_desc
                .find(param.name)
                .ok_or(Error::InvalidDesc("unknown descriptor name"))?;
            if info.is_root_constant() {
                return Err(Error::InvalidDesc("root constants are not written to sets"));
            }
            check_array_range(param.array_offset, written_elements(param), info.count)?;
            write_descriptor(&mut batch, info, param)?;
        }
        batch.finish();
        Ok(())
    }
}

/// Number of array elements `param` writes; a mip chain writes one per mip.
fn written_elements(param: &DescriptorData<'_>) -> usize {
    match param.resources {
        DescriptorResources::Textures(textures) if param.bind_mip_chain => {
            textures.first().map_or(0, |t| t.uav_views().len())
        }
        resources => resources.len(),
    }
}

fn check_array_range(offset: u32, len: usize, count: u32) -> Result<()> {
    if offset as usize + len > count.max(1) as usize {
        return Err(Error::InvalidDesc("descriptor array overflow"));
    }
    Ok(())
}

fn write_descriptor<S: DescriptorWriteSink>(
    batch: &mut DescriptorWriteBatcher<S>,
    info: &DescriptorInfo,
    param: &DescriptorData<'_>,
) -> Result<()> {
    let ty: vk::DescriptorType = info.descriptor_type.vk_into();
    let binding = info.binding;
    let offset = param.array_offset;

    if let DescriptorResources::AccelerationStructures(structures) = param.resources {
        if ty != vk::DescriptorType::ACCELERATION_STRUCTURE_KHR {
            return Err(Error::InvalidDesc("descriptor is not an acceleration structure"));
        }
        for (i, structure) in structures.iter().enumerate() {
            batch.write_acceleration_structure(binding, offset + i as u32, structure.raw());
        }
        return Ok(());
    }

    batch.begin(binding, offset, ty);
    match (ty, param.resources) {
        (vk::DescriptorType::SAMPLER, DescriptorResources::Samplers(samplers)) => {
            if info.static_sampler.is_some() {
                return Err(Error::InvalidDesc("static samplers cannot be updated"));
            }
            for sampler in samplers {
                batch.push(WriteInfo::Image(vk::DescriptorImageInfo {
                    sampler: sampler.raw(),
                    ..Default::default()
                }));
            }
        }
        (vk::DescriptorType::STORAGE_IMAGE, DescriptorResources::Textures(textures)) => {
            if param.bind_mip_chain {
                let texture = textures
                    .first()
                    .ok_or(Error::InvalidDesc("mip chain binding needs a texture"))?;
                for &view in texture.uav_views() {
                    batch.push(image_info(view, vk::ImageLayout::GENERAL));
                }
            } else {
                for texture in textures {
                    let view = texture
                        .uav_view(param.uav_mip_slice)
                        .ok_or(Error::InvalidDesc("texture has no storage view for this mip"))?;
                    batch.push(image_info(view, vk::ImageLayout::GENERAL));
                }
            }
        }
        (
            vk::DescriptorType::SAMPLED_IMAGE
            | vk::DescriptorType::COMBINED_IMAGE_SAMPLER
            | vk::DescriptorType::INPUT_ATTACHMENT,
            DescriptorResources::Textures(textures),
        ) => {
            for texture in textures {
                let view = texture.srv_view(param.bind_stencil_resource);
                batch.push(image_info(view, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL));
            }
        }
        (
            vk::DescriptorType::SAMPLED_IMAGE
            | vk::DescriptorType::COMBINED_IMAGE_SAMPLER
            | vk::DescriptorType::INPUT_ATTACHMENT,
            DescriptorResources::RenderTargets(targets),
        ) => {
            for target in targets {
                let view = target.texture().srv_view(param.bind_stencil_resource);
                batch.push(image_info(view, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL));
            }
        }
        (vk::DescriptorType::STORAGE_IMAGE, DescriptorResources::RenderTargets(targets)) => {
            for target in targets {
                let view = target
                    .texture()
                    .uav_view(param.uav_mip_slice)
                    .ok_or(Error::InvalidDesc("render target has no storage view"))?;
                batch.push(image_info(view, vk::ImageLayout::GENERAL));
            }
        }
        (
            vk::DescriptorType::UNIFORM_BUFFER
            | vk::DescriptorType::STORAGE_BUFFER
            | vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
            | vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
            DescriptorResources::Buffers(buffers),
        ) => {
            for (i, buffer) in buffers.iter().enumerate() {
                let offset = param.buffer_offsets.and_then(|o| o.get(i)).copied();
                let range = param.buffer_sizes.and_then(|s| s.get(i)).copied();
                batch.push(WriteInfo::Buffer(buffer.descriptor_info(
                    info.descriptor_type,
                    offset,
                    range,
                )));
            }
        }
        (vk::DescriptorType::UNIFORM_TEXEL_BUFFER, DescriptorResources::Buffers(buffers)) => {
            for buffer in buffers {
                batch.push(WriteInfo::TexelBuffer(buffer.uniform_texel_view()));
            }
        }
        (vk::DescriptorType::STORAGE_TEXEL_BUFFER, DescriptorResources::Buffers(buffers)) => {
            for buffer in buffers {
                batch.push(WriteInfo::TexelBuffer(buffer.storage_texel_view()));
            }
        }
        _ => {
            return Err(Error::InvalidDesc(
                "resources do not match the descriptor type",
            ));
        }
    }
    Ok(())
}

#[inline]
fn image_info(view: vk::ImageView, layout: vk::ImageLayout) -> WriteInfo {
    WriteInfo::Image(vk::DescriptorImageInfo {
        sampler: vk::Sampler::null(),
        image_view: view,
        image_layout: layout,
    })
}

impl Drop for DescriptorSet {
    fn drop(&mut self) {
        let sets = std::mem::take(&mut self.sets);
        unsafe { self.device.free_descriptor_sets(sets) };
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use ash::vk::Handle;
    use forge_render::descriptor::ShaderStages;

    use super::*;

    /// Applies writes to a simulated set: `(binding, element) -> raw handle`.
    #[derive(Default)]
    struct RecordingSink {
        calls: Vec<Vec<(u32, u32, u32)>>,
        state: BTreeMap<(u32, u32), u64>,
    }

    impl DescriptorWriteSink for RecordingSink {
        fn update(&mut self, writes: &[vk::WriteDescriptorSet]) {
            assert!(writes.len() <= MAX_DESCRIPTOR_WRITES);
            let mut call = Vec::new();
            for w in writes {
                call.push((w.dst_binding, w.dst_array_element, w.descriptor_count));
                for i in 0..w.descriptor_count {
                    let value = unsafe {
                        if !w.p_image_info.is_null() {
                            (*w.p_image_info.add(i as usize)).image_view.as_raw()
                        } else if !w.p_buffer_info.is_null() {
                            (*w.p_buffer_info.add(i as usize)).buffer.as_raw()
                        } else if !w.p_texel_buffer_view.is_null() {
                            (*w.p_texel_buffer_view.add(i as usize)).as_raw()
                        } else {
                            u64::MAX
                        }
                    };
                    self.state.insert((w.dst_binding, w.dst_array_element + i), value);
                }
            }
            self.calls.push(call);
        }
    }

    fn view(i: u64) -> WriteInfo {
        image_info(vk::ImageView::from_raw(i + 1), vk::ImageLayout::GENERAL)
    }

    fn write_images(
        mut batch: DescriptorWriteBatcher<RecordingSink>,
        binding: u32,
        offset: u32,
        range: std::ops::Range<u64>,
    ) -> DescriptorWriteBatcher<RecordingSink> {
        batch.begin(binding, offset, vk::DescriptorType::SAMPLED_IMAGE);
        for i in range {
            batch.push(view(i));
        }
        batch
    }

    #[test]
    fn test_array_range() {
        assert!(check_array_range(0, 3, 3).is_ok());
        assert!(check_array_range(2, 1, 3).is_ok());
        // a single descriptor still takes one element
        assert!(check_array_range(0, 1, 0).is_ok());
        assert!(matches!(
            check_array_range(2, 2, 3),
            Err(Error::InvalidDesc("descriptor array overflow"))
        ));
    }

    #[test]
    fn test_mip_chain_longer_than_array_is_rejected() {
        // a storage texture with 5 mips bound to a 3 element array
        let mips = 5;
        assert!(check_array_range(0, mips, 3).is_err());
        assert!(check_array_range(0, 3, 3).is_ok());
        assert!(check_array_range(1, 3, 3).is_err());
    }

    #[test]
    fn test_array_straddling_scratch_is_split() {
        let batch = DescriptorWriteBatcher::new(vk::DescriptorSet::null(), RecordingSink::default());
        let sink = write_images(batch, 1, 3, 0..2500).finish();
        assert_eq!(
            vec![
                vec![(1, 3, 1024)],
                vec![(1, 3 + 1024, 1024)],
                vec![(1, 3 + 2048, 452)]
            ],
            sink.calls
        );
        assert_eq!(2500, sink.state.len());
        for i in 0..2500u32 {
            assert_eq!(Some(&(i as u64 + 1)), sink.state.get(&(1, i + 3)));
        }
    }

    #[test]
    fn test_split_update_matches_two_calls() {
        let batch = DescriptorWriteBatcher::new(vk::DescriptorSet::null(), RecordingSink::default());
        let single = write_images(batch, 0, 0, 0..1500).finish();

        let batch = DescriptorWriteBatcher::new(vk::DescriptorSet::null(), RecordingSink::default());
        let first = write_images(batch, 0, 0, 0..1024).finish();
        let batch = DescriptorWriteBatcher::new(vk::DescriptorSet::null(), first);
        let two = write_images(batch, 0, 1024, 1024..1500).finish();

        assert_eq!(two.state, single.state);
    }

    #[test]
    fn test_write_records_are_bounded() {
        let mut batch =
            DescriptorWriteBatcher::new(vk::DescriptorSet::null(), RecordingSink::default());
        for binding in 0..300u32 {
            batch.begin(binding, 0, vk::DescriptorType::UNIFORM_BUFFER);
            batch.push(WriteInfo::Buffer(vk::DescriptorBufferInfo {
                buffer: vk::Buffer::from_raw(binding as u64 + 1),
                offset: 0,
                range: vk::WHOLE_SIZE,
            }));
        }
        let sink = batch.finish();
        assert_eq!(2, sink.calls.len());
        assert_eq!(MAX_DESCRIPTOR_WRITES, sink.calls[0].len());
        assert_eq!(300 - MAX_DESCRIPTOR_WRITES, sink.calls[1].len());
        assert_eq!(300, sink.state.len());
    }

    #[test]
    fn test_mixed_kinds_share_a_batch() {
        let mut batch =
            DescriptorWriteBatcher::new(vk::DescriptorSet::null(), RecordingSink::default());
        batch.begin(0, 0, vk::DescriptorType::SAMPLED_IMAGE);
        batch.push(view(7));
        batch.push(view(8));
        batch.begin(1, 2, vk::DescriptorType::UNIFORM_TEXEL_BUFFER);
        batch.push(WriteInfo::TexelBuffer(vk::BufferView::from_raw(42)));
        let sink = batch.finish();
        assert_eq!(vec![vec![(0, 0, 2), (1, 2, 1)]], sink.calls);
        assert_eq!(Some(&42), sink.state.get(&(1, 2)));
    }

    #[test]
    fn test_acceleration_structures_bypass_batching() {
        let mut batch =
            DescriptorWriteBatcher::new(vk::DescriptorSet::null(), RecordingSink::default());
        batch.begin(0, 0, vk::DescriptorType::SAMPLED_IMAGE);
        batch.push(view(1));
        for i in 0..3 {
            batch.write_acceleration_structure(
                5,
                i,
                vk::AccelerationStructureKHR::from_raw(100 + i as u64),
            );
        }
        let sink = batch.finish();
        // three direct calls, then the pending image write
        assert_eq!(4, sink.calls.len());
        assert_eq!(vec![(5, 0, 1)], sink.calls[0]);
        assert_eq!(vec![(5, 2, 1)], sink.calls[2]);
        assert_eq!(vec![(0, 0, 1)], sink.calls[3]);
    }

    #[test]
    fn test_layout_hash_ignores_names() {
        let a = DescriptorSetLayoutDesc::new(vec![DescriptorInfo::new(
            "albedo",
            DescriptorType::TEXTURE,
            0,
            ShaderStages::FRAGMENT,
        )]);
        let mut b = a.clone();
        b.descriptors[0].name = "diffuse".to_owned();
        assert_eq!(layout_hash(&a), layout_hash(&b));
        b.descriptors[0].count = 2;
        assert_ne!(layout_hash(&a), layout_hash(&b));
    }

    #[test]
    fn test_descriptor_total_count() {
        let desc = DescriptorSetLayoutDesc::new(vec![
            DescriptorInfo::new("a", DescriptorType::TEXTURE, 0, ShaderStages::FRAGMENT)
                .with_count(4),
            DescriptorInfo::new("b", DescriptorType::UNIFORM_BUFFER, 1, ShaderStages::VERTEX),
            DescriptorInfo::new("c", DescriptorType::ROOT_CONSTANT, 2, ShaderStages::VERTEX)
                .with_count(16),
        ]);
        let counts = descriptor_total_count(desc.bindings());
        assert_eq!(4, counts.sampled_image);
        assert_eq!(1, counts.uniform_buffer);
        assert_eq!(0, counts.storage_buffer);
    }
}
