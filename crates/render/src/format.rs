use bitflags::bitflags;
use serde::{Deserialize, Serialize};

macro_rules! define_texture_formats {
    ($($(#[$m:meta])* $name:ident = $value:literal,)*) => {
        #[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[repr(u8)]
        pub enum TextureFormat {
            $($(#[$m])* $name = $value,)*
        }

        impl TextureFormat {
            /// Every format, ordered by [`TextureFormat::index`].
            pub const ALL: &'static [Self] = &[$(Self::$name,)*];
        }
    };
}

define_texture_formats! {
    // 8-bit formats
    R8Unorm = 0,
    R8Snorm = 1,
    R8Uint = 2,
    R8Sint = 3,

    // 16-bit formats
    R16Unorm = 4,
    R16Uint = 5,
    R16Sint = 6,
    R16Float = 7,
    Rg8Unorm = 8,
    Rg8Snorm = 9,
    Rg8Uint = 10,
    Rg8Sint = 11,

    // 32-bit formats
    R32Uint = 12,
    R32Sint = 13,
    R32Float = 14,
    Rg16Unorm = 15,
    Rg16Uint = 16,
    Rg16Sint = 17,
    Rg16Float = 18,
    Rgba8Unorm = 19,
    Rgba8UnormSrgb = 20,
    Rgba8Snorm = 21,
    Rgba8Uint = 22,
    Rgba8Sint = 23,
    Bgra8Unorm = 24,
    Bgra8UnormSrgb = 25,

    // Packed 32-bit formats
    Rgb9E5Ufloat = 26,
    Rgb10A2Unorm = 27,
    Rg11B10Float = 28,

    // 64-bit formats
    Rg32Uint = 29,
    Rg32Sint = 30,
    Rg32Float = 31,
    Rgba16Unorm = 32,
    Rgba16Uint = 33,
    Rgba16Sint = 34,
    Rgba16Float = 35,

    // 128-bit formats
    Rgba32Uint = 36,
    Rgba32Sint = 37,
    Rgba32Float = 38,

    // Block compressed formats
    Bc1RgbaUnorm = 39,
    Bc1RgbaUnormSrgb = 40,
    Bc3RgbaUnorm = 41,
    Bc3RgbaUnormSrgb = 42,
    Bc5RgUnorm = 43,
    Bc7RgbaUnorm = 44,
    Bc7RgbaUnormSrgb = 45,

    // Depth and stencil formats
    Depth16Unorm = 46,
    Depth24Plus = 47,
    Depth32Float = 48,
    Stencil8 = 49,
    Depth24PlusStencil8 = 50,
    Depth32FloatStencil8 = 51,

    // Multi-planar YCbCr formats
    /// 8-bit luma plane followed by an interleaved 2x2 subsampled chroma plane (NV12).
    G8B8R8TwoPlane420Unorm = 52,
    /// 8-bit luma plane followed by two 2x2 subsampled chroma planes.
    G8B8R8ThreePlane420Unorm = 53,
}

impl TextureFormat {
    pub const DEFAULT: Self = Self::Rgba8UnormSrgb;

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn bytes_per_pixel(self) -> Option<u8> {
        use self::TextureFormat::*;
        Some(match self {
            R8Unorm | R8Snorm | R8Uint | R8Sint | Stencil8 => 1,

            R16Unorm | R16Uint | R16Sint | R16Float | Rg8Unorm | Rg8Snorm | Rg8Uint | Rg8Sint
            | Depth16Unorm => 2,

            R32Uint | R32Sint | R32Float | Rg16Unorm | Rg16Uint | Rg16Sint | Rg16Float
            | Rgba8Unorm | Rgba8UnormSrgb | Rgba8Snorm | Rgba8Uint | Rgba8Sint | Bgra8Unorm
            | Bgra8UnormSrgb | Rgb9E5Ufloat | Rgb10A2Unorm | Rg11B10Float | Depth32Float => 4,

            Rg32Uint | Rg32Sint | Rg32Float | Rgba16Unorm | Rgba16Uint | Rgba16Sint
            | Rgba16Float => 8,

            Rgba32Uint | Rgba32Sint | Rgba32Float => 16,

            // block formats and formats with a driver chosen layout
            Bc1RgbaUnorm | Bc1RgbaUnormSrgb | Bc3RgbaUnorm | Bc3RgbaUnormSrgb | Bc5RgUnorm
            | Bc7RgbaUnorm | Bc7RgbaUnormSrgb | Depth24Plus | Depth24PlusStencil8
            | Depth32FloatStencil8 | G8B8R8TwoPlane420Unorm | G8B8R8ThreePlane420Unorm => {
                return None;
            }
        })
    }

    /// Size of one compressed block in bytes and its edge length in pixels.
    pub fn block_info(self) -> Option<(u32, u32)> {
        use self::TextureFormat::*;
        match self {
            Bc1RgbaUnorm | Bc1RgbaUnormSrgb => Some((8, 4)),
            Bc3RgbaUnorm | Bc3RgbaUnormSrgb | Bc5RgUnorm | Bc7RgbaUnorm | Bc7RgbaUnormSrgb => {
                Some((16, 4))
            }
            _ => None,
        }
    }

    pub fn aspects(self) -> TextureAspects {
        match self {
            Self::Stencil8 => TextureAspects::STENCIL,
            Self::Depth16Unorm | Self::Depth24Plus | Self::Depth32Float => TextureAspects::DEPTH,
            Self::Depth24PlusStencil8 | Self::Depth32FloatStencil8 => {
                TextureAspects::DEPTH | TextureAspects::STENCIL
            }
            _ => TextureAspects::COLOR,
        }
    }

    #[inline]
    pub fn is_depth_or_stencil(self) -> bool {
        self.aspects()
            .intersects(TextureAspects::DEPTH | TextureAspects::STENCIL)
    }

    #[inline]
    pub fn has_stencil(self) -> bool {
        self.aspects().contains(TextureAspects::STENCIL)
    }

    #[inline]
    pub fn is_srgb(self) -> bool {
        matches!(
            self,
            Self::Rgba8UnormSrgb
                | Self::Bgra8UnormSrgb
                | Self::Bc1RgbaUnormSrgb
                | Self::Bc3RgbaUnormSrgb
                | Self::Bc7RgbaUnormSrgb
        )
    }

    /// Number of memory planes; `1` for every non-planar format.
    pub fn plane_count(self) -> u32 {
        match self {
            Self::G8B8R8TwoPlane420Unorm => 2,
            Self::G8B8R8ThreePlane420Unorm => 3,
            _ => 1,
        }
    }

    #[inline]
    pub fn is_planar(self) -> bool {
        self.plane_count() > 1
    }

    /// Extent of `plane` for an image of `width` x `height` pixels.
    pub fn plane_extent(self, plane: u32, width: u32, height: u32) -> (u32, u32) {
        if self.is_planar() && plane > 0 {
            // 4:2:0 chroma planes
            (width.div_ceil(2), height.div_ceil(2))
        } else {
            (width, height)
        }
    }

    /// Bytes per texel of `plane` for planar formats.
    pub fn plane_bytes_per_texel(self, plane: u32) -> u32 {
        match (self, plane) {
            (Self::G8B8R8TwoPlane420Unorm, 1) => 2,
            (Self::G8B8R8TwoPlane420Unorm | Self::G8B8R8ThreePlane420Unorm, _) => 1,
            _ => self.bytes_per_pixel().map_or(0, u32::from),
        }
    }
}

impl Default for TextureFormat {
    #[inline]
    fn default() -> Self {
        Self::DEFAULT
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct TextureAspects: u32 {
        const COLOR = 1;
        const DEPTH = 2;
        const STENCIL = 4;

        const DEFAULT = 0;
    }
}

impl Default for TextureAspects {
    #[inline]
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Shape a texture is viewed as from a shader.
#[derive(
    Copy, Clone, Default, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
pub enum TextureDimension {
    D1,
    #[default]
    D2,
    D2Ms,
    D3,
    Cube,
    D1Array,
    D2Array,
    D2MsArray,
    CubeArray,
}

impl TextureDimension {
    pub const ALL: [Self; 9] = [
        Self::D1,
        Self::D2,
        Self::D2Ms,
        Self::D3,
        Self::Cube,
        Self::D1Array,
        Self::D2Array,
        Self::D2MsArray,
        Self::CubeArray,
    ];

    #[inline]
    pub const fn is_multisampled(self) -> bool {
        matches!(self, Self::D2Ms | Self::D2MsArray)
    }

    #[inline]
    pub const fn is_cube(self) -> bool {
        matches!(self, Self::Cube | Self::CubeArray)
    }

    #[inline]
    pub const fn is_array(self) -> bool {
        matches!(
            self,
            Self::D1Array | Self::D2Array | Self::D2MsArray | Self::CubeArray
        )
    }
}

#[derive(
    Copy, Clone, Default, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum SampleCount {
    #[default]
    X1 = 1,
    X2 = 2,
    X4 = 4,
    X8 = 8,
    X16 = 16,
}

impl SampleCount {
    #[inline]
    pub const fn count(self) -> u32 {
        self as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_is_ordered_by_index() {
        for (i, format) in TextureFormat::ALL.iter().enumerate() {
            assert_eq!(i, format.index());
        }
    }

    #[test]
    fn test_depth_stencil_aspects() {
        assert_eq!(TextureAspects::DEPTH, TextureFormat::Depth32Float.aspects());
        assert_eq!(TextureAspects::STENCIL, TextureFormat::Stencil8.aspects());
        assert_eq!(
            TextureAspects::DEPTH | TextureAspects::STENCIL,
            TextureFormat::Depth24PlusStencil8.aspects()
        );
        assert_eq!(TextureAspects::COLOR, TextureFormat::Bgra8Unorm.aspects());
        assert!(TextureFormat::Depth32FloatStencil8.has_stencil());
        assert!(!TextureFormat::Depth16Unorm.has_stencil());
    }

    #[test]
    fn test_planar_formats() {
        assert_eq!(2, TextureFormat::G8B8R8TwoPlane420Unorm.plane_count());
        assert_eq!(3, TextureFormat::G8B8R8ThreePlane420Unorm.plane_count());
        assert_eq!(1, TextureFormat::Rgba8Unorm.plane_count());
        assert_eq!(
            (3, 2),
            TextureFormat::G8B8R8TwoPlane420Unorm.plane_extent(1, 5, 4)
        );
        assert_eq!(
            (5, 4),
            TextureFormat::G8B8R8TwoPlane420Unorm.plane_extent(0, 5, 4)
        );
        assert_eq!(
            2,
            TextureFormat::G8B8R8TwoPlane420Unorm.plane_bytes_per_texel(1)
        );
    }
}
