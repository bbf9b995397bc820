use std::sync::Arc;

use ash::vk;
use forge_render::{
    descriptor::DescriptorType,
    format::{SampleCount, TextureDimension, TextureFormat},
    texture::{ClearValue, RenderTargetDesc, TextureCreationFlags, TextureDesc},
};

use super::Texture;
use crate::{convert::VkInto, device::AshDevice, Error, Result};

/// Index into the per-slice views of a render target.
///
/// `None` selects the main view. Without per-slice views only a mip can be selected.
pub(crate) fn slice_view_index(
    mip: Option<u32>,
    slice: Option<u32>,
    mip_levels: u32,
    slices: u32,
    per_slice: bool,
) -> Result<Option<usize>> {
    if mip.is_none() && slice.is_none() {
        return Ok(None);
    }
    let mip = mip.unwrap_or(0);
    if mip >= mip_levels {
        return Err(Error::InvalidDesc("mip slice out of range"));
    }
    if per_slice {
        let slice = slice.unwrap_or(0);
        if slice >= slices {
            return Err(Error::InvalidDesc("array slice out of range"));
        }
        Ok(Some((mip * slices + slice) as usize))
    } else if slice.is_some() {
        Err(Error::InvalidDesc("render target has no per-slice views"))
    } else {
        Ok(Some(mip as usize))
    }
}

/// Attachment view type covering `layers` layers.
fn attachment_view_type(dimension: TextureDimension, layers: u32) -> vk::ImageViewType {
    match dimension {
        TextureDimension::D1 | TextureDimension::D1Array if layers > 1 => {
            vk::ImageViewType::TYPE_1D_ARRAY
        }
        TextureDimension::D1 | TextureDimension::D1Array => vk::ImageViewType::TYPE_1D,
        _ if layers > 1 => vk::ImageViewType::TYPE_2D_ARRAY,
        _ => vk::ImageViewType::TYPE_2D,
    }
}

/// A texture usable as color or depth/stencil attachment.
pub struct RenderTarget {
    texture: Texture,
    main_view: vk::ImageView,
    slice_views: Vec<vk::ImageView>,
    per_slice: bool,
    slices: u32,
    clear_value: ClearValue,
    vr_multiview: bool,
    vr_foveated_rendering: bool,
    resolve: Option<Box<RenderTarget>>,
}

impl RenderTarget {
    pub(crate) fn new(device: &Arc<AshDevice>, desc: &RenderTargetDesc) -> Result<Self> {
        let mut texture_desc = desc.to_texture_desc();
        if !desc.flags.contains(TextureCreationFlags::ON_TILE) {
            texture_desc.descriptors |= DescriptorType::TEXTURE;
        }
        let texture = Texture::new(device, &texture_desc)?;
        let mut target = Self::from_texture(texture, desc)?;

        if desc
            .flags
            .contains(TextureCreationFlags::CREATE_RESOLVE_ATTACHMENT)
            && desc.sample_count != SampleCount::X1
        {
            let mut resolve_desc = desc.clone();
            resolve_desc.sample_count = SampleCount::X1;
            resolve_desc.flags &= !(TextureCreationFlags::CREATE_RESOLVE_ATTACHMENT
                | TextureCreationFlags::ON_TILE);
            resolve_desc.name = desc.name.as_ref().map(|n| format!("{n} (resolve)"));
            target.resolve = Some(Box::new(Self::new(device, &resolve_desc)?));
        }
        Ok(target)
    }

    /// Wraps a swapchain image. `sampled` images also get a shader-resource view.
    pub(crate) fn from_swapchain_image(
        device: &Arc<AshDevice>,
        image: vk::Image,
        desc: &RenderTargetDesc,
        sampled: bool,
    ) -> Result<Self> {
        let texture_desc = TextureDesc {
            descriptors: if sampled {
                DescriptorType::TEXTURE
            } else {
                DescriptorType::UNDEFINED
            },
            ..desc.to_texture_desc()
        };
        let texture = Texture::from_swapchain_image(device, image, &texture_desc)?;
        Self::from_texture(texture, desc)
    }

    fn from_texture(texture: Texture, desc: &RenderTargetDesc) -> Result<Self> {
        let dimension = texture.dimension();
        let slices = if dimension == TextureDimension::D3 {
            desc.depth.max(1)
        } else {
            texture.array_size()
        };
        let per_slice = desc.wants_slice_views();
        let format: vk::Format = texture.format().vk_into();
        let aspect = texture.aspect();
        let mut target = Self {
            main_view: vk::ImageView::null(),
            slice_views: Vec::new(),
            per_slice,
            slices,
            clear_value: desc.clear_value,
            vr_multiview: desc.flags.contains(TextureCreationFlags::VR_MULTIVIEW),
            vr_foveated_rendering: desc
                .flags
                .contains(TextureCreationFlags::VR_FOVEATED_RENDERING),
            resolve: None,
            texture,
        };

        target.main_view = target.texture.create_view(
            attachment_view_type(dimension, slices),
            format,
            aspect,
            0,
            1,
            0,
            slices,
        )?;
        for mip in 0..target.texture.mip_levels() {
            if per_slice {
                for slice in 0..slices {
                    let view = target.texture.create_view(
                        attachment_view_type(dimension, 1),
                        format,
                        aspect,
                        mip,
                        1,
                        slice,
                        1,
                    )?;
                    target.slice_views.push(view);
                }
            } else {
                let view = target.texture.create_view(
                    attachment_view_type(dimension, slices),
                    format,
                    aspect,
                    mip,
                    1,
                    0,
                    slices,
                )?;
                target.slice_views.push(view);
            }
        }
        Ok(target)
    }

    #[inline]
    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.texture.id()
    }

    #[inline]
    pub fn format(&self) -> TextureFormat {
        self.texture.format()
    }

    #[inline]
    pub fn sample_count(&self) -> SampleCount {
        self.texture.sample_count()
    }

    #[inline]
    pub fn clear_value(&self) -> ClearValue {
        self.clear_value
    }

    #[inline]
    pub fn extent(&self) -> (u32, u32) {
        let (w, h, _) = self.texture.extent();
        (w, h)
    }

    /// Number of layers the main view spans.
    #[inline]
    pub fn layers(&self) -> u32 {
        self.slices
    }

    #[inline]
    pub fn resolve_target(&self) -> Option<&Self> {
        self.resolve.as_deref()
    }

    #[inline]
    pub(crate) fn vr_multiview(&self) -> bool {
        self.vr_multiview
    }

    #[inline]
    pub(crate) fn vr_foveated_rendering(&self) -> bool {
        self.vr_foveated_rendering
    }

    /// View used as attachment for the given mip/array selection.
    pub(crate) fn attachment_view(
        &self,
        mip: Option<u32>,
        slice: Option<u32>,
    ) -> Result<vk::ImageView> {
        match slice_view_index(
            mip,
            slice,
            self.texture.mip_levels(),
            self.slices,
            self.per_slice,
        )? {
            None => Ok(self.main_view),
            Some(index) => self
                .slice_views
                .get(index)
                .copied()
                .ok_or(Error::InvalidDesc("render target view out of range")),
        }
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        let device = self.texture.device();
        unsafe {
            for view in self.slice_views.drain(..) {
                device.destroy(view);
            }
            device.destroy(self.main_view);
        }
    }
}

impl std::fmt::Debug for RenderTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderTarget")
            .field("texture", &self.texture)
            .field("slices", &self.slices)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_main_view_without_selection() {
        assert_eq!(None, slice_view_index(None, None, 4, 6, true).unwrap());
    }

    #[test]
    fn test_per_slice_indexing() {
        // mip * slices + slice
        assert_eq!(Some(14), slice_view_index(Some(2), Some(2), 4, 6, true).unwrap());
        assert_eq!(Some(3), slice_view_index(None, Some(3), 4, 6, true).unwrap());
        assert_eq!(Some(6), slice_view_index(Some(1), None, 4, 6, true).unwrap());
    }

    #[test]
    fn test_per_mip_indexing() {
        assert_eq!(Some(2), slice_view_index(Some(2), None, 4, 6, false).unwrap());
        assert!(slice_view_index(Some(0), Some(1), 4, 6, false).is_err());
        assert!(slice_view_index(Some(4), None, 4, 6, false).is_err());
    }

    #[test]
    fn test_attachment_view_type() {
        assert_eq!(
            vk::ImageViewType::TYPE_2D_ARRAY,
            attachment_view_type(TextureDimension::Cube, 6)
        );
        assert_eq!(
            vk::ImageViewType::TYPE_2D,
            attachment_view_type(TextureDimension::D3, 1)
        );
        assert_eq!(
            vk::ImageViewType::TYPE_1D,
            attachment_view_type(TextureDimension::D1, 1)
        );
    }
}
