use std::sync::Arc;

use ash::vk;
use forge_render::sampler::SamplerDesc;

use crate::{convert::VkInto, device::AshDevice, Result};

/// Anisotropy actually used for `requested`, or `None` when it stays disabled.
pub(crate) fn effective_anisotropy(requested: f32, supported: bool, max: f32) -> Option<f32> {
    (supported && requested > 1.0).then(|| requested.min(max))
}

pub(crate) fn sampler_create_info(
    desc: &SamplerDesc,
    anisotropy: Option<f32>,
) -> vk::SamplerCreateInfo {
    let (min_lod, max_lod) = if desc.set_lod_range {
        (desc.min_lod, desc.max_lod)
    } else {
        (0.0, vk::LOD_CLAMP_NONE)
    };
    vk::SamplerCreateInfo::builder()
        .mag_filter(desc.mag_filter.vk_into())
        .min_filter(desc.min_filter.vk_into())
        .mipmap_mode(desc.mip_map_mode.vk_into())
        .address_mode_u(desc.address_u.vk_into())
        .address_mode_v(desc.address_v.vk_into())
        .address_mode_w(desc.address_w.vk_into())
        .mip_lod_bias(desc.mip_lod_bias)
        .anisotropy_enable(anisotropy.is_some())
        .max_anisotropy(anisotropy.unwrap_or(1.0))
        .compare_enable(desc.compare.is_some())
        .compare_op(
            desc.compare
                .map_or(vk::CompareOp::NEVER, |c| c.vk_into()),
        )
        .min_lod(min_lod)
        .max_lod(max_lod)
        .border_color(vk::BorderColor::FLOAT_TRANSPARENT_BLACK)
        .unnormalized_coordinates(false)
        .build()
}

/// Creates a native sampler; also used for static samplers baked into layouts.
pub(crate) unsafe fn create_sampler(device: &AshDevice, desc: &SamplerDesc) -> Result<vk::Sampler> {
    let anisotropy = effective_anisotropy(
        desc.max_anisotropy,
        device.features().sampler_anisotropy,
        device.limits().max_sampler_anisotropy,
    );
    let create_info = sampler_create_info(desc, anisotropy);
    let sampler = unsafe { device.create::<vk::Sampler>(&create_info)? };
    Ok(sampler.take())
}

pub struct Sampler {
    device: Arc<AshDevice>,
    raw: vk::Sampler,
}

impl Sampler {
    pub(crate) fn new(device: &Arc<AshDevice>, desc: &SamplerDesc) -> Result<Self> {
        let raw = unsafe { create_sampler(device, desc)? };
        Ok(Self {
            device: device.clone(),
            raw,
        })
    }

    #[inline]
    pub(crate) fn raw(&self) -> vk::Sampler {
        self.raw
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe { self.device.destroy(self.raw) }
    }
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Sampler").field(&self.raw).finish()
    }
}

#[cfg(test)]
mod tests {
    use forge_render::pipeline::CompareFunction;

    use super::*;

    #[test]
    fn test_anisotropy_is_clamped_or_disabled() {
        assert_eq!(Some(16.0), effective_anisotropy(32.0, true, 16.0));
        assert_eq!(Some(4.0), effective_anisotropy(4.0, true, 16.0));
        assert_eq!(None, effective_anisotropy(1.0, true, 16.0));
        assert_eq!(None, effective_anisotropy(8.0, false, 16.0));
    }

    #[test]
    fn test_lod_range() {
        let info = sampler_create_info(&SamplerDesc::DEFAULT, None);
        assert_eq!(vk::LOD_CLAMP_NONE, info.max_lod);
        let desc = SamplerDesc {
            set_lod_range: true,
            min_lod: 1.0,
            max_lod: 3.0,
            compare: Some(CompareFunction::Less),
            ..SamplerDesc::DEFAULT
        };
        let info = sampler_create_info(&desc, None);
        assert_eq!(3.0, info.max_lod);
        assert_eq!(vk::TRUE, info.compare_enable);
        assert_eq!(vk::CompareOp::LESS, info.compare_op);
    }
}
