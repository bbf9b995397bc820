use std::sync::Arc;

use ash::vk;
use forge_render::{
    buffer::BufferDesc,
    descriptor::DescriptorType,
    format::{SampleCount, TextureDimension, TextureFormat},
    sampler::SamplerDesc,
    state::ResourceState,
    texture::{TextureCreationFlags, TextureDesc},
};
use tracing::debug;

use super::{Buffer, Sampler, Texture};
use crate::{convert::VkInto, descriptor::WriteInfo, device::AshDevice, Result};

const NULL_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;
const NULL_BUFFER_SIZE: u64 = 16;

/// Description of the 1x1 placeholder texture of `dimension`.
pub(crate) fn null_texture_desc(dimension: TextureDimension, storage: bool) -> TextureDesc {
    let mut desc = TextureDesc::new_2d(1, 1, NULL_FORMAT);
    desc.name = Some(format!("null {dimension:?} {}", if storage { "uav" } else { "srv" }));
    if storage {
        desc.descriptors = DescriptorType::RW_TEXTURE;
        desc.start_state = ResourceState::UNORDERED_ACCESS;
    } else {
        desc.start_state = ResourceState::SHADER_RESOURCE;
    }
    match dimension {
        TextureDimension::D1 => {}
        TextureDimension::D1Array => desc.array_size = 2,
        TextureDimension::D2 => desc.flags |= TextureCreationFlags::FORCE_2D,
        TextureDimension::D2Array => {
            desc.flags |= TextureCreationFlags::FORCE_2D;
            desc.array_size = 2;
        }
        TextureDimension::D2Ms => {
            desc.flags |= TextureCreationFlags::FORCE_2D;
            desc.sample_count = SampleCount::X4;
        }
        TextureDimension::D2MsArray => {
            desc.flags |= TextureCreationFlags::FORCE_2D;
            desc.sample_count = SampleCount::X4;
            desc.array_size = 2;
        }
        TextureDimension::D3 => desc.flags |= TextureCreationFlags::FORCE_3D,
        TextureDimension::Cube => {
            desc.descriptors |= DescriptorType::TEXTURE_CUBE;
            desc.array_size = 6;
        }
        TextureDimension::CubeArray => {
            desc.descriptors |= DescriptorType::TEXTURE_CUBE;
            desc.array_size = 12;
        }
    }
    desc
}

fn dimension_index(dimension: TextureDimension) -> usize {
    TextureDimension::ALL
        .iter()
        .position(|&d| d == dimension)
        .unwrap_or(0)
}

/// Placeholder resources written into every unbound descriptor slot.
pub(crate) struct NullDescriptors {
    srv_textures: Vec<Texture>,
    uav_textures: Vec<Option<Texture>>,
    srv_buffer: Buffer,
    uav_buffer: Buffer,
    sampler: Sampler,
}

impl NullDescriptors {
    pub fn new(device: &Arc<AshDevice>) -> Result<Self> {
        let mut srv_textures = Vec::with_capacity(TextureDimension::ALL.len());
        let mut uav_textures = Vec::with_capacity(TextureDimension::ALL.len());
        for dimension in TextureDimension::ALL {
            srv_textures.push(Texture::new(device, &null_texture_desc(dimension, false))?);
            // storage images cannot be multisampled
            uav_textures.push(if dimension.is_multisampled() {
                None
            } else {
                Some(Texture::new(device, &null_texture_desc(dimension, true))?)
            });
        }

        let mut srv_desc = BufferDesc::new(
            NULL_BUFFER_SIZE,
            DescriptorType::BUFFER | DescriptorType::UNIFORM_BUFFER | DescriptorType::TEXEL_BUFFER,
        );
        srv_desc.name = Some("null srv buffer".into());
        srv_desc.format = Some(TextureFormat::R32Float);
        srv_desc.element_count = 1;
        srv_desc.struct_stride = 4;
        let srv_buffer = Buffer::new(device, &srv_desc)?;

        let mut uav_desc = BufferDesc::new(
            NULL_BUFFER_SIZE,
            DescriptorType::RW_BUFFER | DescriptorType::RW_TEXEL_BUFFER,
        );
        uav_desc.name = Some("null uav buffer".into());
        uav_desc.format = Some(TextureFormat::R32Float);
        uav_desc.element_count = 1;
        uav_desc.struct_stride = 4;
        let uav_buffer = Buffer::new(device, &uav_desc)?;

        let sampler = Sampler::new(device, &SamplerDesc::DEFAULT)?;
        debug!("created null descriptors");
        Ok(Self {
            srv_textures,
            uav_textures,
            srv_buffer,
            uav_buffer,
            sampler,
        })
    }

    /// Textures that still need their initial layout transition.
    pub fn textures(&self) -> impl Iterator<Item = (&Texture, ResourceState)> {
        self.srv_textures
            .iter()
            .map(|t| (t, ResourceState::SHADER_RESOURCE))
            .chain(
                self.uav_textures
                    .iter()
                    .flatten()
                    .map(|t| (t, ResourceState::UNORDERED_ACCESS)),
            )
    }

    #[inline]
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler.raw()
    }

    /// Descriptor info of the placeholder for a binding of `descriptor_type`.
    pub fn write_info(
        &self,
        descriptor_type: DescriptorType,
        dimension: TextureDimension,
    ) -> Option<WriteInfo> {
        let index = dimension_index(dimension);
        let image = |view: vk::ImageView, sampler: vk::Sampler, layout: vk::ImageLayout| {
            WriteInfo::Image(vk::DescriptorImageInfo {
                sampler,
                image_view: view,
                image_layout: layout,
            })
        };
        let texel = |view: vk::BufferView| {
            (view != vk::BufferView::null()).then_some(WriteInfo::TexelBuffer(view))
        };
        let vk_type: vk::DescriptorType = descriptor_type.vk_into();
        match vk_type {
            vk::DescriptorType::SAMPLER => Some(image(
                vk::ImageView::null(),
                self.sampler.raw(),
                vk::ImageLayout::UNDEFINED,
            )),
            vk::DescriptorType::SAMPLED_IMAGE => Some(image(
                self.srv_textures[index].srv_view(false),
                vk::Sampler::null(),
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )),
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER => Some(image(
                self.srv_textures[index].srv_view(false),
                self.sampler.raw(),
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )),
            vk::DescriptorType::STORAGE_IMAGE => {
                let view = self.uav_textures[index].as_ref()?.uav_view(0)?;
                Some(image(view, vk::Sampler::null(), vk::ImageLayout::GENERAL))
            }
            vk::DescriptorType::UNIFORM_BUFFER => Some(WriteInfo::Buffer(
                self.srv_buffer
                    .descriptor_info(DescriptorType::UNIFORM_BUFFER, None, None),
            )),
            vk::DescriptorType::STORAGE_BUFFER => {
                let buffer = if descriptor_type
                    .intersects(DescriptorType::RW_BUFFER | DescriptorType::RW_BUFFER_RAW)
                {
                    &self.uav_buffer
                } else {
                    &self.srv_buffer
                };
                Some(WriteInfo::Buffer(buffer.descriptor_info(descriptor_type, None, None)))
            }
            vk::DescriptorType::UNIFORM_TEXEL_BUFFER => texel(self.srv_buffer.uniform_texel_view()),
            vk::DescriptorType::STORAGE_TEXEL_BUFFER => texel(self.uav_buffer.storage_texel_view()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_texture_dimensions() {
        for dimension in TextureDimension::ALL {
            let desc = null_texture_desc(dimension, false);
            assert_eq!(dimension, desc.dimension());
            assert_eq!(dimension.is_multisampled(), desc.sample_count != SampleCount::X1);
        }
    }

    #[test]
    fn test_null_storage_texture() {
        let desc = null_texture_desc(TextureDimension::D2Array, true);
        assert_eq!(TextureDimension::D2Array, desc.dimension());
        assert!(desc.descriptors.contains(DescriptorType::RW_TEXTURE));
        assert_eq!(ResourceState::UNORDERED_ACCESS, desc.start_state);
    }

    #[test]
    fn test_dimension_index() {
        for (i, dimension) in TextureDimension::ALL.into_iter().enumerate() {
            assert_eq!(i, dimension_index(dimension));
        }
    }
}
