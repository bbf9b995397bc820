//! Acceleration structures for ray queries and ray tracing pipelines.
//!
//! An [`AccelerationStructure`] pairs a bottom level structure, built from
//! triangle geometry, with a top level structure whose instances all
//! reference that bottom level. Both share one scratch buffer and are built
//! together by [`Cmd::build_acceleration_structure`].

use std::sync::Arc;

use ash::vk;
use bitflags::bitflags;
use forge_render::{
    buffer::{BufferCreationFlags, BufferDesc, ResourceMemoryUsage},
    descriptor::DescriptorType,
    pipeline::IndexFormat,
    state::{QueueType, ResourceState},
};
use tracing::debug;

use crate::{
    convert::{VkFrom, VkInto},
    device::AshDevice,
    encoder::Cmd,
    resources::Buffer,
    Error, Result,
};

/// Tightly packed `R32G32B32_SFLOAT` positions.
const POSITION_STRIDE: u32 = 3 * std::mem::size_of::<f32>() as u32;
const SCRATCH_ALIGNMENT: u64 = 256;
const INSTANCE_SIZE: u64 = std::mem::size_of::<vk::AccelerationStructureInstanceKHR>() as u64;

/// Row-major 3x4 identity transform.
pub const IDENTITY_TRANSFORM: [f32; 12] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0,
];

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct AccelerationStructureBuildFlags: u32 {
        const NONE = 0;
        const ALLOW_UPDATE = 0x1;
        const ALLOW_COMPACTION = 0x2;
        const PREFER_FAST_TRACE = 0x4;
        const PREFER_FAST_BUILD = 0x8;
        const MINIMIZE_MEMORY = 0x10;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct AccelerationStructureGeometryFlags: u32 {
        const NONE = 0;
        const OPAQUE = 0x1;
        const NO_DUPLICATE_ANYHIT_INVOCATION = 0x2;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct AccelerationStructureInstanceFlags: u32 {
        const NONE = 0;
        const TRIANGLE_CULL_DISABLE = 0x1;
        const TRIANGLE_FRONT_COUNTERCLOCKWISE = 0x2;
        const FORCE_OPAQUE = 0x4;
        const FORCE_NON_OPAQUE = 0x8;
    }
}

impl VkFrom<AccelerationStructureBuildFlags> for vk::BuildAccelerationStructureFlagsKHR {
    fn from(val: &AccelerationStructureBuildFlags) -> Self {
        type F = AccelerationStructureBuildFlags;
        let mut result = Self::empty();
        if val.contains(F::ALLOW_UPDATE) {
            result |= Self::ALLOW_UPDATE;
        }
        if val.contains(F::ALLOW_COMPACTION) {
            result |= Self::ALLOW_COMPACTION;
        }
        if val.contains(F::PREFER_FAST_TRACE) {
            result |= Self::PREFER_FAST_TRACE;
        }
        if val.contains(F::PREFER_FAST_BUILD) {
            result |= Self::PREFER_FAST_BUILD;
        }
        if val.contains(F::MINIMIZE_MEMORY) {
            result |= Self::LOW_MEMORY;
        }
        result
    }
}

impl VkFrom<AccelerationStructureGeometryFlags> for vk::GeometryFlagsKHR {
    fn from(val: &AccelerationStructureGeometryFlags) -> Self {
        let mut result = Self::empty();
        if val.contains(AccelerationStructureGeometryFlags::OPAQUE) {
            result |= Self::OPAQUE;
        }
        if val.contains(AccelerationStructureGeometryFlags::NO_DUPLICATE_ANYHIT_INVOCATION) {
            result |= Self::NO_DUPLICATE_ANY_HIT_INVOCATION;
        }
        result
    }
}

impl VkFrom<AccelerationStructureInstanceFlags> for vk::GeometryInstanceFlagsKHR {
    fn from(val: &AccelerationStructureInstanceFlags) -> Self {
        type F = AccelerationStructureInstanceFlags;
        let mut result = Self::empty();
        if val.contains(F::TRIANGLE_CULL_DISABLE) {
            result |= Self::TRIANGLE_FACING_CULL_DISABLE;
        }
        if val.contains(F::TRIANGLE_FRONT_COUNTERCLOCKWISE) {
            result |= Self::TRIANGLE_FLIP_FACING;
        }
        if val.contains(F::FORCE_OPAQUE) {
            result |= Self::FORCE_OPAQUE;
        }
        if val.contains(F::FORCE_NON_OPAQUE) {
            result |= Self::FORCE_NO_OPAQUE;
        }
        result
    }
}

/// Triangle geometry of the bottom level structure.
///
/// Vertices are `R32G32B32_SFLOAT` positions. The buffers must have been
/// created with [`DescriptorType::ACCELERATION_STRUCTURE_BUILD_INPUT`] and
/// stay alive until the structure is built.
#[derive(Copy, Clone, Debug)]
pub struct AccelerationStructureGeometry<'a> {
    pub vertex_buffer: &'a Buffer,
    pub vertex_offset: u64,
    pub vertex_count: u32,
    /// Zero means tightly packed positions.
    pub vertex_stride: u32,
    pub index_buffer: Option<&'a Buffer>,
    pub index_offset: u64,
    pub index_count: u32,
    pub index_format: IndexFormat,
    pub flags: AccelerationStructureGeometryFlags,
}

impl<'a> AccelerationStructureGeometry<'a> {
    pub fn new(vertex_buffer: &'a Buffer, vertex_count: u32) -> Self {
        Self {
            vertex_buffer,
            vertex_offset: 0,
            vertex_count,
            vertex_stride: 0,
            index_buffer: None,
            index_offset: 0,
            index_count: 0,
            index_format: IndexFormat::Uint32,
            flags: AccelerationStructureGeometryFlags::OPAQUE,
        }
    }

    pub fn with_indices(mut self, buffer: &'a Buffer, count: u32, format: IndexFormat) -> Self {
        self.index_buffer = Some(buffer);
        self.index_count = count;
        self.index_format = format;
        self
    }

    fn resolve(&self) -> Result<Triangles> {
        if self.vertex_count == 0 {
            return Err(Error::InvalidDesc("geometry without vertices"));
        }
        let vertex_address = self.vertex_buffer.device_address()? + self.vertex_offset;
        let (index_address, index_type, index_count) = match self.index_buffer {
            Some(_) if self.index_count == 0 => {
                return Err(Error::InvalidDesc("index buffer without indices"));
            }
            Some(buffer) => (
                buffer.device_address()? + self.index_offset,
                self.index_format.vk_into(),
                Some(self.index_count),
            ),
            None => (0, vk::IndexType::NONE_KHR, None),
        };
        Ok(Triangles {
            vertex_address,
            vertex_stride: if self.vertex_stride == 0 {
                POSITION_STRIDE
            } else {
                self.vertex_stride
            },
            vertex_count: self.vertex_count,
            index_address,
            index_type,
            primitive_count: primitive_count(self.vertex_count, index_count),
            flags: self.flags.vk_into(),
        })
    }
}

/// One instance of the bottom level structure inside the top level.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AccelerationStructureInstance {
    /// Row-major 3x4 object-to-world matrix.
    pub transform: [f32; 12],
    /// 24 bit value visible to shaders as the custom instance index.
    pub instance_id: u32,
    pub mask: u8,
    /// 24 bit offset into the hit group table.
    pub hit_group_offset: u32,
    pub flags: AccelerationStructureInstanceFlags,
}

impl Default for AccelerationStructureInstance {
    fn default() -> Self {
        Self {
            transform: IDENTITY_TRANSFORM,
            instance_id: 0,
            mask: 0xff,
            hit_group_offset: 0,
            flags: AccelerationStructureInstanceFlags::NONE,
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct AccelerationStructureDesc<'a> {
    pub name: Option<&'a str>,
    pub geometries: &'a [AccelerationStructureGeometry<'a>],
    pub bottom_flags: AccelerationStructureBuildFlags,
    pub instances: &'a [AccelerationStructureInstance],
    pub top_flags: AccelerationStructureBuildFlags,
}

impl<'a> AccelerationStructureDesc<'a> {
    pub fn new(
        geometries: &'a [AccelerationStructureGeometry<'a>],
        instances: &'a [AccelerationStructureInstance],
    ) -> Self {
        Self {
            name: None,
            geometries,
            bottom_flags: AccelerationStructureBuildFlags::PREFER_FAST_TRACE,
            instances,
            top_flags: AccelerationStructureBuildFlags::PREFER_FAST_TRACE,
        }
    }
}

/// Triangle lists: three indices (or vertices) per primitive.
fn primitive_count(vertex_count: u32, index_count: Option<u32>) -> u32 {
    index_count.unwrap_or(vertex_count) / 3
}

#[inline]
fn align_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

fn instance_record(
    instance: &AccelerationStructureInstance,
    bottom_address: vk::DeviceAddress,
) -> vk::AccelerationStructureInstanceKHR {
    let flags: vk::GeometryInstanceFlagsKHR = instance.flags.vk_into();
    vk::AccelerationStructureInstanceKHR {
        transform: vk::TransformMatrixKHR {
            matrix: instance.transform,
        },
        instance_custom_index_and_mask: vk::Packed24_8::new(instance.instance_id, instance.mask),
        instance_shader_binding_table_record_offset_and_flags: vk::Packed24_8::new(
            instance.hit_group_offset,
            flags.as_raw() as u8,
        ),
        acceleration_structure_reference: vk::AccelerationStructureReferenceKHR {
            device_handle: bottom_address,
        },
    }
}

#[derive(Copy, Clone, Debug)]
struct Triangles {
    vertex_address: vk::DeviceAddress,
    vertex_stride: u32,
    vertex_count: u32,
    index_address: vk::DeviceAddress,
    index_type: vk::IndexType,
    primitive_count: u32,
    flags: vk::GeometryFlagsKHR,
}

impl Triangles {
    fn geometry(&self) -> vk::AccelerationStructureGeometryKHR {
        let triangles = vk::AccelerationStructureGeometryTrianglesDataKHR::builder()
            .vertex_format(vk::Format::R32G32B32_SFLOAT)
            .vertex_data(vk::DeviceOrHostAddressConstKHR {
                device_address: self.vertex_address,
            })
            .vertex_stride(u64::from(self.vertex_stride))
            .max_vertex(self.vertex_count.saturating_sub(1))
            .index_type(self.index_type)
            .index_data(vk::DeviceOrHostAddressConstKHR {
                device_address: self.index_address,
            })
            .build();
        vk::AccelerationStructureGeometryKHR::builder()
            .geometry_type(vk::GeometryTypeKHR::TRIANGLES)
            .geometry(vk::AccelerationStructureGeometryDataKHR { triangles })
            .flags(self.flags)
            .build()
    }

    fn range(&self) -> vk::AccelerationStructureBuildRangeInfoKHR {
        vk::AccelerationStructureBuildRangeInfoKHR {
            primitive_count: self.primitive_count,
            ..Default::default()
        }
    }
}

fn instances_geometry(address: vk::DeviceAddress) -> vk::AccelerationStructureGeometryKHR {
    let instances = vk::AccelerationStructureGeometryInstancesDataKHR::builder()
        .array_of_pointers(false)
        .data(vk::DeviceOrHostAddressConstKHR {
            device_address: address,
        })
        .build();
    vk::AccelerationStructureGeometryKHR::builder()
        .geometry_type(vk::GeometryTypeKHR::INSTANCES)
        .geometry(vk::AccelerationStructureGeometryDataKHR { instances })
        .flags(vk::GeometryFlagsKHR::OPAQUE)
        .build()
}

struct Level {
    raw: vk::AccelerationStructureKHR,
    buffer: Buffer,
    address: vk::DeviceAddress,
    flags: vk::BuildAccelerationStructureFlagsKHR,
}

impl Level {
    /// Creates the structure and returns it together with its scratch size.
    fn new(
        device: &Arc<AshDevice>,
        ty: vk::AccelerationStructureTypeKHR,
        flags: vk::BuildAccelerationStructureFlagsKHR,
        geometries: &[vk::AccelerationStructureGeometryKHR],
        primitive_counts: &[u32],
        name: Option<&str>,
    ) -> Result<(Self, u64)> {
        let ext = device.ext_acceleration_structure()?;
        let build_info = vk::AccelerationStructureBuildGeometryInfoKHR::builder()
            .ty(ty)
            .flags(flags)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .geometries(geometries);
        let sizes = unsafe {
            ext.get_acceleration_structure_build_sizes(
                vk::AccelerationStructureBuildTypeKHR::DEVICE,
                &build_info,
                primitive_counts,
            )
        };

        let mut desc = BufferDesc::new(
            sizes.acceleration_structure_size,
            DescriptorType::ACCELERATION_STRUCTURE,
        );
        desc.memory_usage = ResourceMemoryUsage::GpuOnly;
        desc.start_state = ResourceState::RAYTRACING_ACCELERATION_STRUCTURE;
        desc.name = name.map(str::to_owned);
        let buffer = Buffer::new(device, &desc)?;

        let create_info = vk::AccelerationStructureCreateInfoKHR::builder()
            .buffer(buffer.raw())
            .size(sizes.acceleration_structure_size)
            .ty(ty);
        let raw = unsafe { ext.create_acceleration_structure(&create_info, None)? };
        let address_info =
            vk::AccelerationStructureDeviceAddressInfoKHR::builder().acceleration_structure(raw);
        let address = unsafe { ext.get_acceleration_structure_device_address(&address_info) };
        if let Some(name) = name {
            unsafe { device.object_name(raw, name) };
        }
        Ok((
            Self {
                raw,
                buffer,
                address,
                flags,
            },
            sizes.build_scratch_size,
        ))
    }
}

pub struct AccelerationStructure {
    device: Arc<AshDevice>,
    bottom: Level,
    top: Level,
    triangles: Vec<Triangles>,
    instance_buffer: Buffer,
    instance_count: u32,
    scratch: Buffer,
    scratch_address: vk::DeviceAddress,
    scratch_size: u64,
}

impl AccelerationStructure {
    pub(crate) fn new(device: &Arc<AshDevice>, desc: &AccelerationStructureDesc<'_>) -> Result<Self> {
        if desc.geometries.is_empty() {
            return Err(Error::InvalidDesc("acceleration structure without geometry"));
        }
        if desc.instances.is_empty() {
            return Err(Error::InvalidDesc("acceleration structure without instances"));
        }
        if !device.features().acceleration_structure {
            return Err(Error::Unsupported("acceleration structures"));
        }

        let triangles = desc
            .geometries
            .iter()
            .map(AccelerationStructureGeometry::resolve)
            .collect::<Result<Vec<_>>>()?;
        let geometries: Vec<_> = triangles.iter().map(Triangles::geometry).collect();
        let counts: Vec<_> = triangles.iter().map(|t| t.primitive_count).collect();
        let bottom_name = desc.name.map(|n| format!("{n} (bottom)"));
        let (bottom, bottom_scratch) = Level::new(
            device,
            vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL,
            desc.bottom_flags.vk_into(),
            &geometries,
            &counts,
            bottom_name.as_deref(),
        )?;

        let instance_count = desc.instances.len() as u32;
        let mut instance_desc = BufferDesc::new(
            INSTANCE_SIZE * u64::from(instance_count),
            DescriptorType::ACCELERATION_STRUCTURE_BUILD_INPUT,
        );
        instance_desc.memory_usage = ResourceMemoryUsage::CpuToGpu;
        instance_desc.flags = BufferCreationFlags::PERSISTENT_MAP;
        instance_desc.name = desc.name.map(|n| format!("{n} (instances)"));
        let mut instance_buffer = Buffer::new(device, &instance_desc)?;
        let records: Vec<_> = desc
            .instances
            .iter()
            .map(|i| instance_record(i, bottom.address))
            .collect();
        let dst = instance_buffer.map(None)?;
        // SAFETY: the buffer holds exactly `instance_count` records
        unsafe {
            std::ptr::copy_nonoverlapping(
                records.as_ptr().cast::<u8>(),
                dst.as_ptr(),
                records.len() * INSTANCE_SIZE as usize,
            );
        }

        let (top, top_scratch) = Level::new(
            device,
            vk::AccelerationStructureTypeKHR::TOP_LEVEL,
            desc.top_flags.vk_into(),
            &[instances_geometry(instance_buffer.device_address()?)],
            &[instance_count],
            desc.name,
        )?;

        // both levels are built in sequence with a barrier in between
        let scratch_size = bottom_scratch.max(top_scratch);
        let mut scratch_desc = BufferDesc::new(
            scratch_size + SCRATCH_ALIGNMENT,
            DescriptorType::RW_BUFFER_RAW | DescriptorType::SHADER_DEVICE_ADDRESS,
        );
        scratch_desc.memory_usage = ResourceMemoryUsage::GpuOnly;
        scratch_desc.start_state = ResourceState::UNORDERED_ACCESS;
        scratch_desc.name = desc.name.map(|n| format!("{n} (scratch)"));
        let scratch = Buffer::new(device, &scratch_desc)?;
        let scratch_address = align_up(scratch.device_address()?, SCRATCH_ALIGNMENT);

        debug!(
            geometries = triangles.len(),
            instances = instance_count,
            scratch_size,
            "created acceleration structure"
        );
        Ok(Self {
            device: device.clone(),
            bottom,
            top,
            triangles,
            instance_buffer,
            instance_count,
            scratch,
            scratch_address,
            scratch_size,
        })
    }

    /// The top level structure, as bound to descriptors.
    #[inline]
    pub(crate) fn raw(&self) -> vk::AccelerationStructureKHR {
        self.top.raw
    }

    #[inline]
    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }

    #[inline]
    pub fn geometry_count(&self) -> usize {
        self.triangles.len()
    }

    #[inline]
    pub fn scratch_size(&self) -> u64 {
        self.scratch_size
    }

    /// Bytes used by both levels, the instances and the scratch memory.
    pub fn memory_size(&self) -> u64 {
        self.bottom.buffer.size()
            + self.top.buffer.size()
            + self.instance_buffer.size()
            + self.scratch.size()
    }
}

impl Drop for AccelerationStructure {
    fn drop(&mut self) {
        if let Ok(ext) = self.device.ext_acceleration_structure() {
            unsafe {
                ext.destroy_acceleration_structure(self.top.raw, None);
                ext.destroy_acceleration_structure(self.bottom.raw, None);
            }
        }
    }
}

impl std::fmt::Debug for AccelerationStructure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccelerationStructure")
            .field("top", &self.top.raw)
            .field("bottom", &self.bottom.raw)
            .field("geometries", &self.triangles.len())
            .field("instances", &self.instance_count)
            .finish()
    }
}

impl Cmd {
    /// Records the build of both levels of `structure`.
    ///
    /// The top level is ready for any later command once this returns.
    pub fn build_acceleration_structure(&mut self, structure: &AccelerationStructure) -> Result<()> {
        if self.queue_type() == QueueType::Transfer {
            return Err(Error::Unsupported("acceleration structure builds on transfer queues"));
        }
        let ext = self.device().ext_acceleration_structure()?;
        let scratch = vk::DeviceOrHostAddressKHR {
            device_address: structure.scratch_address,
        };

        let geometries: Vec<_> = structure.triangles.iter().map(Triangles::geometry).collect();
        let ranges: Vec<_> = structure.triangles.iter().map(Triangles::range).collect();
        let bottom = vk::AccelerationStructureBuildGeometryInfoKHR::builder()
            .ty(vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL)
            .flags(structure.bottom.flags)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .dst_acceleration_structure(structure.bottom.raw)
            .geometries(&geometries)
            .scratch_data(scratch)
            .build();
        unsafe { ext.cmd_build_acceleration_structures(self.raw(), &[bottom], &[&ranges]) };
        // the top level reads the bottom level and reuses the scratch memory
        self.acceleration_structure_barrier(vk::PipelineStageFlags::ACCELERATION_STRUCTURE_BUILD_KHR);

        let instances = [instances_geometry(structure.instance_buffer.device_address()?)];
        let top_range = [vk::AccelerationStructureBuildRangeInfoKHR {
            primitive_count: structure.instance_count,
            ..Default::default()
        }];
        let top = vk::AccelerationStructureBuildGeometryInfoKHR::builder()
            .ty(vk::AccelerationStructureTypeKHR::TOP_LEVEL)
            .flags(structure.top.flags)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .dst_acceleration_structure(structure.top.raw)
            .geometries(&instances)
            .scratch_data(scratch)
            .build();
        unsafe { ext.cmd_build_acceleration_structures(self.raw(), &[top], &[&top_range]) };
        self.acceleration_structure_barrier(vk::PipelineStageFlags::ALL_COMMANDS);
        Ok(())
    }

    fn acceleration_structure_barrier(&self, dst_stage: vk::PipelineStageFlags) {
        let access = vk::AccessFlags::ACCELERATION_STRUCTURE_READ_KHR
            | vk::AccessFlags::ACCELERATION_STRUCTURE_WRITE_KHR;
        let barrier = vk::MemoryBarrier::builder()
            .src_access_mask(access)
            .dst_access_mask(access)
            .build();
        unsafe {
            self.device().cmd_pipeline_barrier(
                self.raw(),
                vk::PipelineStageFlags::ACCELERATION_STRUCTURE_BUILD_KHR,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[barrier],
                &[],
                &[],
            )
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_count() {
        assert_eq!(12, primitive_count(8, Some(36)));
        assert_eq!(3, primitive_count(9, None));
        assert_eq!(0, primitive_count(2, None));
    }

    #[test]
    fn test_align_up() {
        assert_eq!(0, align_up(0, SCRATCH_ALIGNMENT));
        assert_eq!(256, align_up(1, SCRATCH_ALIGNMENT));
        assert_eq!(512, align_up(512, SCRATCH_ALIGNMENT));
    }

    #[test]
    fn test_build_flags() {
        let flags: vk::BuildAccelerationStructureFlagsKHR =
            (AccelerationStructureBuildFlags::PREFER_FAST_TRACE
                | AccelerationStructureBuildFlags::MINIMIZE_MEMORY)
                .vk_into();
        assert_eq!(
            vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE
                | vk::BuildAccelerationStructureFlagsKHR::LOW_MEMORY,
            flags
        );
        let none: vk::BuildAccelerationStructureFlagsKHR =
            AccelerationStructureBuildFlags::NONE.vk_into();
        assert_eq!(vk::BuildAccelerationStructureFlagsKHR::empty(), none);
    }

    #[test]
    fn test_instance_record() {
        let instance = AccelerationStructureInstance {
            instance_id: 7,
            mask: 0x0f,
            hit_group_offset: 2,
            flags: AccelerationStructureInstanceFlags::FORCE_OPAQUE
                | AccelerationStructureInstanceFlags::TRIANGLE_CULL_DISABLE,
            ..Default::default()
        };
        let record = instance_record(&instance, 0x1000);
        assert_eq!(7, record.instance_custom_index_and_mask.low_24());
        assert_eq!(0x0f, record.instance_custom_index_and_mask.high_8());
        assert_eq!(
            2,
            record
                .instance_shader_binding_table_record_offset_and_flags
                .low_24()
        );
        assert_eq!(
            (vk::GeometryInstanceFlagsKHR::FORCE_OPAQUE
                | vk::GeometryInstanceFlagsKHR::TRIANGLE_FACING_CULL_DISABLE)
                .as_raw() as u8,
            record
                .instance_shader_binding_table_record_offset_and_flags
                .high_8()
        );
        assert_eq!(IDENTITY_TRANSFORM, record.transform.matrix);
        assert_eq!(0x1000, unsafe { record.acceleration_structure_reference.device_handle });
        assert_eq!(64, INSTANCE_SIZE);
    }

    #[test]
    fn test_unindexed_triangles() {
        let triangles = Triangles {
            vertex_address: 0x100,
            vertex_stride: POSITION_STRIDE,
            vertex_count: 6,
            index_address: 0,
            index_type: vk::IndexType::NONE_KHR,
            primitive_count: primitive_count(6, None),
            flags: AccelerationStructureGeometryFlags::OPAQUE.vk_into(),
        };
        let geometry = triangles.geometry();
        assert_eq!(vk::GeometryTypeKHR::TRIANGLES, geometry.geometry_type);
        assert_eq!(vk::GeometryFlagsKHR::OPAQUE, geometry.flags);
        let data = unsafe { geometry.geometry.triangles };
        assert_eq!(5, data.max_vertex);
        assert_eq!(12, data.vertex_stride);
        assert_eq!(vk::IndexType::NONE_KHR, data.index_type);
        assert_eq!(2, triangles.range().primitive_count);
    }
}
