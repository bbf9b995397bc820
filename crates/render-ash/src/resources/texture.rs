use std::sync::Arc;

use ash::vk;
use forge_render::{
    descriptor::DescriptorType,
    format::{SampleCount, TextureDimension, TextureFormat},
    texture::{TextureCreationFlags, TextureDesc},
};
use gpu_alloc::UsageFlags;
use tracing::warn;

use super::{find_lazily_allocated_type, memory_request};
use crate::{
    alloc::GpuMemoryBlock,
    convert::{image_usage, VkInto},
    device::AshDevice,
    Error, Result,
};

/// Image type used for the native image of `dimension`.
pub(crate) fn image_type(dimension: TextureDimension) -> vk::ImageType {
    match dimension {
        TextureDimension::D1 | TextureDimension::D1Array => vk::ImageType::TYPE_1D,
        TextureDimension::D3 => vk::ImageType::TYPE_3D,
        _ => vk::ImageType::TYPE_2D,
    }
}

/// View type of the storage view of one mip. Cube maps are written as 2D arrays.
pub(crate) fn storage_view_type(dimension: TextureDimension) -> vk::ImageViewType {
    match dimension {
        TextureDimension::Cube | TextureDimension::CubeArray => vk::ImageViewType::TYPE_2D_ARRAY,
        other => other.vk_into(),
    }
}

pub(crate) fn image_create_flags(desc: &TextureDesc) -> vk::ImageCreateFlags {
    let dimension = desc.dimension();
    let mut flags = vk::ImageCreateFlags::empty();
    if dimension.is_cube() {
        flags |= vk::ImageCreateFlags::CUBE_COMPATIBLE;
    }
    if dimension == TextureDimension::D3
        && desc
            .descriptors
            .contains(DescriptorType::RENDER_TARGET_DEPTH_SLICES)
    {
        flags |= vk::ImageCreateFlags::TYPE_2D_ARRAY_COMPATIBLE;
    }
    if desc.format.is_planar() {
        flags |= vk::ImageCreateFlags::MUTABLE_FORMAT | vk::ImageCreateFlags::EXTENDED_USAGE;
    }
    flags
}

/// Validates the parts of a texture description no device can support.
pub(crate) fn validate_texture_desc(desc: &TextureDesc) -> Result<()> {
    if desc.width == 0 || desc.height == 0 || desc.depth == 0 {
        return Err(Error::InvalidDesc("texture extent must not be zero"));
    }
    if desc.sample_count != SampleCount::X1 && desc.mip_levels > 1 {
        return Err(Error::InvalidDesc("multisampled textures cannot have mips"));
    }
    if desc.format.is_planar() && desc.descriptors.contains(DescriptorType::RW_TEXTURE) {
        return Err(Error::InvalidDesc("multi-planar textures cannot be storage textures"));
    }
    Ok(())
}

/// A GPU image with its shader-resource and per-mip storage views.
pub struct Texture {
    device: Arc<AshDevice>,
    id: u64,
    image: vk::Image,
    memory: Option<GpuMemoryBlock>,
    owns_image: bool,
    srv: vk::ImageView,
    srv_stencil: vk::ImageView,
    uavs: Vec<vk::ImageView>,
    format: TextureFormat,
    aspect: vk::ImageAspectFlags,
    dimension: TextureDimension,
    width: u32,
    height: u32,
    depth: u32,
    array_size: u32,
    mip_levels: u32,
    sample_count: SampleCount,
    node_index: u32,
}

impl Texture {
    pub(crate) fn new(device: &Arc<AshDevice>, desc: &TextureDesc) -> Result<Self> {
        validate_texture_desc(desc)?;
        let dimension = desc.dimension();
        let format: vk::Format = desc.format.vk_into();
        let mut usage = image_usage(desc);
        let flags = image_create_flags(desc);
        let image_type = image_type(dimension);
        let tiling = vk::ImageTiling::OPTIMAL;

        let supported = unsafe {
            device
                .instance()
                .get_physical_device_image_format_properties(
                    device.physical_device(),
                    format,
                    image_type,
                    tiling,
                    usage,
                    flags,
                )
        };
        match supported {
            Ok(_) => {}
            Err(vk::Result::ERROR_FORMAT_NOT_SUPPORTED) => {
                return Err(Error::Unsupported("texture format and usage combination"));
            }
            Err(e) => return Err(e.into()),
        }
        let caps = device.settings().format_caps(desc.format);
        if usage.contains(vk::ImageUsageFlags::STORAGE) && !caps.shader_write {
            warn!("{:?} is not writable from shaders, storage usage dropped", desc.format);
            usage &= !vk::ImageUsageFlags::STORAGE;
        }

        let view_formats = [format];
        let mut format_list = vk::ImageFormatListCreateInfo::builder().view_formats(&view_formats);
        let mut create_info = vk::ImageCreateInfo::builder()
            .flags(flags)
            .image_type(image_type)
            .format(format)
            .extent(desc.vk_into())
            .mip_levels(desc.mip_levels.max(1))
            .array_layers(desc.array_size.max(1))
            .samples(desc.sample_count.vk_into())
            .tiling(tiling)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        if desc.format.is_planar() {
            create_info = create_info.push_next(&mut format_list);
        }
        let image = unsafe { device.create::<vk::Image>(&create_info)? };
        let requirements = unsafe { device.get_image_memory_requirements(image.raw()) };

        let mut request = memory_request(&requirements, UsageFlags::FAST_DEVICE_ACCESS);
        if usage.contains(vk::ImageUsageFlags::TRANSIENT_ATTACHMENT) {
            match find_lazily_allocated_type(device.memory_properties(), requirements.memory_type_bits)
            {
                Some(index) => {
                    request.usage |= UsageFlags::TRANSIENT;
                    request.memory_types = 1 << index;
                }
                None => warn!("no lazily allocated memory available, on-tile texture uses device memory"),
            }
        }
        let dedicated = desc
            .flags
            .intersects(TextureCreationFlags::OWN_MEMORY | TextureCreationFlags::EXPORT)
            .then_some(gpu_alloc::Dedicated::Required);
        let block = unsafe { device.alloc_memory(request, dedicated)? };
        unsafe {
            device.bind_image_memory_for_node(
                image.raw(),
                *block.memory(),
                block.offset(),
                desc.node_index,
                &desc.shared_node_indices,
            )?
        };

        let mut texture = Self {
            device: device.clone(),
            id: device.next_resource_id(),
            image: image.take(),
            memory: Some(block.take()),
            owns_image: true,
            srv: vk::ImageView::null(),
            srv_stencil: vk::ImageView::null(),
            uavs: Vec::new(),
            format: desc.format,
            aspect: desc.format.aspects().vk_into(),
            dimension,
            width: desc.width,
            height: desc.height,
            depth: desc.depth,
            array_size: desc.array_size.max(1),
            mip_levels: desc.mip_levels.max(1),
            sample_count: desc.sample_count,
            node_index: desc.node_index,
        };
        texture.create_views(desc.descriptors, usage)?;
        if let Some(name) = &desc.name {
            unsafe { device.object_name(texture.image, name) };
        }
        Ok(texture)
    }

    /// Wraps an image owned by a swapchain. Only views are created and destroyed.
    pub(crate) fn from_swapchain_image(
        device: &Arc<AshDevice>,
        image: vk::Image,
        desc: &TextureDesc,
    ) -> Result<Self> {
        let mut texture = Self {
            device: device.clone(),
            id: device.next_resource_id(),
            image,
            memory: None,
            owns_image: false,
            srv: vk::ImageView::null(),
            srv_stencil: vk::ImageView::null(),
            uavs: Vec::new(),
            format: desc.format,
            aspect: desc.format.aspects().vk_into(),
            dimension: TextureDimension::D2,
            width: desc.width,
            height: desc.height,
            depth: 1,
            array_size: 1,
            mip_levels: 1,
            sample_count: SampleCount::X1,
            node_index: desc.node_index,
        };
        texture.create_views(desc.descriptors, vk::ImageUsageFlags::SAMPLED)?;
        Ok(texture)
    }

    fn create_views(&mut self, descriptors: DescriptorType, usage: vk::ImageUsageFlags) -> Result<()> {
        let format: vk::Format = self.format.vk_into();
        let layers = if self.dimension == TextureDimension::D3 {
            1
        } else {
            self.array_size
        };

        if descriptors.contains(DescriptorType::TEXTURE)
            && usage.contains(vk::ImageUsageFlags::SAMPLED)
        {
            if self.format.is_planar() {
                return Err(Error::Unsupported("sampling multi-planar textures"));
            }
            // depth/stencil textures are sampled through their depth aspect
            let srv_aspect = if self.aspect.contains(vk::ImageAspectFlags::DEPTH) {
                vk::ImageAspectFlags::DEPTH
            } else {
                self.aspect
            };
            self.srv = self.create_view(
                self.dimension.vk_into(),
                format,
                srv_aspect,
                0,
                self.mip_levels,
                0,
                layers,
            )?;
            if self.format.has_stencil() {
                self.srv_stencil = self.create_view(
                    self.dimension.vk_into(),
                    format,
                    vk::ImageAspectFlags::STENCIL,
                    0,
                    self.mip_levels,
                    0,
                    layers,
                )?;
            }
        }

        if descriptors.contains(DescriptorType::RW_TEXTURE)
            && usage.contains(vk::ImageUsageFlags::STORAGE)
        {
            let view_type = storage_view_type(self.dimension);
            for mip in 0..self.mip_levels {
                let view = self.create_view(view_type, format, self.aspect, mip, 1, 0, layers)?;
                self.uavs.push(view);
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn create_view(
        &self,
        view_type: vk::ImageViewType,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
        base_mip: u32,
        mip_count: u32,
        base_layer: u32,
        layer_count: u32,
    ) -> Result<vk::ImageView> {
        let create_info = vk::ImageViewCreateInfo::builder()
            .image(self.image)
            .view_type(view_type)
            .format(format)
            .components(vk::ComponentMapping::default())
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: base_mip,
                level_count: mip_count,
                base_array_layer: base_layer,
                layer_count,
            });
        let view = unsafe { self.device.create::<vk::ImageView>(&create_info)? };
        Ok(view.take())
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn format(&self) -> TextureFormat {
        self.format
    }

    #[inline]
    pub fn dimension(&self) -> TextureDimension {
        self.dimension
    }

    #[inline]
    pub fn extent(&self) -> (u32, u32, u32) {
        (self.width, self.height, self.depth)
    }

    #[inline]
    pub fn array_size(&self) -> u32 {
        self.array_size
    }

    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    #[inline]
    pub fn sample_count(&self) -> SampleCount {
        self.sample_count
    }

    #[inline]
    pub fn node_index(&self) -> u32 {
        self.node_index
    }

    #[inline]
    pub(crate) fn raw(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub(crate) fn aspect(&self) -> vk::ImageAspectFlags {
        self.aspect
    }

    #[inline]
    pub(crate) fn srv_view(&self, stencil: bool) -> vk::ImageView {
        if stencil && self.srv_stencil != vk::ImageView::null() {
            self.srv_stencil
        } else {
            self.srv
        }
    }

    #[inline]
    pub(crate) fn uav_view(&self, mip: u32) -> Option<vk::ImageView> {
        self.uavs.get(mip as usize).copied()
    }

    /// One storage view per mip level.
    #[inline]
    pub(crate) fn uav_views(&self) -> &[vk::ImageView] {
        &self.uavs
    }

    #[inline]
    pub(crate) fn device(&self) -> &Arc<AshDevice> {
        &self.device
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            for view in self.uavs.drain(..) {
                self.device.destroy(view);
            }
            self.device.destroy(self.srv_stencil);
            self.device.destroy(self.srv);
            if self.owns_image {
                self.device.destroy(self.image);
            }
            if let Some(block) = self.memory.take() {
                self.device.dealloc_memory(block);
            }
        }
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("image", &self.image)
            .field("format", &self.format)
            .field("dimension", &self.dimension)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msaa_with_mips_is_rejected() {
        let mut desc = TextureDesc::new_2d(4, 4, TextureFormat::Rgba8Unorm);
        desc.sample_count = SampleCount::X4;
        desc.mip_levels = 2;
        assert!(matches!(validate_texture_desc(&desc), Err(Error::InvalidDesc(_))));
        desc.mip_levels = 1;
        assert!(validate_texture_desc(&desc).is_ok());
    }

    #[test]
    fn test_image_type_and_flags() {
        assert_eq!(vk::ImageType::TYPE_1D, image_type(TextureDimension::D1Array));
        assert_eq!(vk::ImageType::TYPE_2D, image_type(TextureDimension::CubeArray));
        assert_eq!(vk::ImageType::TYPE_3D, image_type(TextureDimension::D3));

        let mut desc = TextureDesc::new_2d(16, 16, TextureFormat::Rgba8Unorm);
        desc.array_size = 6;
        desc.descriptors |= DescriptorType::TEXTURE_CUBE;
        assert_eq!(vk::ImageCreateFlags::CUBE_COMPATIBLE, image_create_flags(&desc));

        let mut desc = TextureDesc::new_2d(16, 16, TextureFormat::Rgba8Unorm);
        desc.depth = 4;
        desc.descriptors |= DescriptorType::RENDER_TARGET_DEPTH_SLICES;
        assert_eq!(
            vk::ImageCreateFlags::TYPE_2D_ARRAY_COMPATIBLE,
            image_create_flags(&desc)
        );
    }

    #[test]
    fn test_cube_storage_views_are_arrays() {
        assert_eq!(
            vk::ImageViewType::TYPE_2D_ARRAY,
            storage_view_type(TextureDimension::Cube)
        );
        assert_eq!(vk::ImageViewType::TYPE_2D, storage_view_type(TextureDimension::D2));
    }
}
