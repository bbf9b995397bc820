use serde::{Deserialize, Serialize};

use crate::{format::TextureFormat, texture::ClearValue};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapChainDesc {
    pub width: u32,
    pub height: u32,
    /// Requested image count; clamped to what the surface supports and written back.
    pub image_count: u32,
    pub color_format: TextureFormat,
    pub color_clear_value: ClearValue,
    pub enable_vsync: bool,
    /// Use the HDR10 color space when the surface offers it.
    pub hdr: bool,
}

impl SwapChainDesc {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            image_count: 2,
            color_format: TextureFormat::Bgra8UnormSrgb,
            color_clear_value: ClearValue::BLACK,
            enable_vsync: true,
            hdr: false,
        }
    }
}

impl Default for SwapChainDesc {
    fn default() -> Self {
        Self::new(0, 0)
    }
}
