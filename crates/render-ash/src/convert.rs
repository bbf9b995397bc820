use ash::vk;
use forge_render::{
    buffer::{BufferCreationFlags, BufferDesc, ResourceMemoryUsage},
    commands::{LoadActionType, QueryType, StoreActionType},
    descriptor::{DescriptorType, ShaderStages},
    format::{SampleCount, TextureAspects, TextureDimension, TextureFormat},
    pipeline::{
        BlendFactor, BlendOperation, ColorWrite, CompareFunction, Face, FrontFace, IndexFormat,
        PolygonMode, PrimitiveTopology, StencilFaceState, StencilOperation, VertexFormat,
        VertexStepMode,
    },
    sampler::{AddressMode, FilterType, MipMapMode},
    state::{QueueType, ResourceState},
    texture::{ClearValue, TextureCreationFlags, TextureDesc},
};
use gpu_alloc::UsageFlags;

pub trait VkFrom<T> {
    fn from(val: &T) -> Self;
}

pub trait VkInto<U> {
    fn vk_into(&self) -> U;
}

impl<T, U> VkInto<U> for T
where
    U: VkFrom<T>,
{
    #[inline]
    fn vk_into(&self) -> U {
        U::from(self)
    }
}

impl<T: VkFrom<V>, V> VkFrom<Option<V>> for Option<T> {
    #[inline]
    fn from(val: &Option<V>) -> Self {
        val.as_ref().map(T::from)
    }
}

impl VkFrom<TextureFormat> for vk::Format {
    #[inline]
    fn from(val: &TextureFormat) -> Self {
        match val {
            // 8-bit formats
            TextureFormat::R8Unorm => Self::R8_UNORM,
            TextureFormat::R8Snorm => Self::R8_SNORM,
            TextureFormat::R8Uint => Self::R8_UINT,
            TextureFormat::R8Sint => Self::R8_SINT,

            // 16-bit formats
            TextureFormat::R16Unorm => Self::R16_UNORM,
            TextureFormat::R16Uint => Self::R16_UINT,
            TextureFormat::R16Sint => Self::R16_SINT,
            TextureFormat::R16Float => Self::R16_SFLOAT,
            TextureFormat::Rg8Unorm => Self::R8G8_UNORM,
            TextureFormat::Rg8Snorm => Self::R8G8_SNORM,
            TextureFormat::Rg8Uint => Self::R8G8_UINT,
            TextureFormat::Rg8Sint => Self::R8G8_SINT,

            // 32-bit formats
            TextureFormat::R32Uint => Self::R32_UINT,
            TextureFormat::R32Sint => Self::R32_SINT,
            TextureFormat::R32Float => Self::R32_SFLOAT,
            TextureFormat::Rg16Unorm => Self::R16G16_UNORM,
            TextureFormat::Rg16Uint => Self::R16G16_UINT,
            TextureFormat::Rg16Sint => Self::R16G16_SINT,
            TextureFormat::Rg16Float => Self::R16G16_SFLOAT,
            TextureFormat::Rgba8Unorm => Self::R8G8B8A8_UNORM,
            TextureFormat::Rgba8UnormSrgb => Self::R8G8B8A8_SRGB,
            TextureFormat::Rgba8Snorm => Self::R8G8B8A8_SNORM,
            TextureFormat::Rgba8Uint => Self::R8G8B8A8_UINT,
            TextureFormat::Rgba8Sint => Self::R8G8B8A8_SINT,
            TextureFormat::Bgra8Unorm => Self::B8G8R8A8_UNORM,
            TextureFormat::Bgra8UnormSrgb => Self::B8G8R8A8_SRGB,

            // Packed 32-bit formats
            TextureFormat::Rgb9E5Ufloat => Self::E5B9G9R9_UFLOAT_PACK32,
            TextureFormat::Rgb10A2Unorm => Self::A2B10G10R10_UNORM_PACK32,
            TextureFormat::Rg11B10Float => Self::B10G11R11_UFLOAT_PACK32,

            // 64-bit formats
            TextureFormat::Rg32Uint => Self::R32G32_UINT,
            TextureFormat::Rg32Sint => Self::R32G32_SINT,
            TextureFormat::Rg32Float => Self::R32G32_SFLOAT,
            TextureFormat::Rgba16Unorm => Self::R16G16B16A16_UNORM,
            TextureFormat::Rgba16Uint => Self::R16G16B16A16_UINT,
            TextureFormat::Rgba16Sint => Self::R16G16B16A16_SINT,
            TextureFormat::Rgba16Float => Self::R16G16B16A16_SFLOAT,

            // 128-bit formats
            TextureFormat::Rgba32Uint => Self::R32G32B32A32_UINT,
            TextureFormat::Rgba32Sint => Self::R32G32B32A32_SINT,
            TextureFormat::Rgba32Float => Self::R32G32B32A32_SFLOAT,

            // Block compressed formats
            TextureFormat::Bc1RgbaUnorm => Self::BC1_RGBA_UNORM_BLOCK,
            TextureFormat::Bc1RgbaUnormSrgb => Self::BC1_RGBA_SRGB_BLOCK,
            TextureFormat::Bc3RgbaUnorm => Self::BC3_UNORM_BLOCK,
            TextureFormat::Bc3RgbaUnormSrgb => Self::BC3_SRGB_BLOCK,
            TextureFormat::Bc5RgUnorm => Self::BC5_UNORM_BLOCK,
            TextureFormat::Bc7RgbaUnorm => Self::BC7_UNORM_BLOCK,
            TextureFormat::Bc7RgbaUnormSrgb => Self::BC7_SRGB_BLOCK,

            // Depth and stencil formats
            TextureFormat::Depth16Unorm => Self::D16_UNORM,
            TextureFormat::Depth24Plus => Self::X8_D24_UNORM_PACK32,
            TextureFormat::Depth32Float => Self::D32_SFLOAT,
            TextureFormat::Stencil8 => Self::S8_UINT,
            TextureFormat::Depth24PlusStencil8 => Self::D24_UNORM_S8_UINT,
            TextureFormat::Depth32FloatStencil8 => Self::D32_SFLOAT_S8_UINT,

            // Multi-planar formats
            TextureFormat::G8B8R8TwoPlane420Unorm => Self::G8_B8R8_2PLANE_420_UNORM,
            TextureFormat::G8B8R8ThreePlane420Unorm => Self::G8_B8_R8_3PLANE_420_UNORM,
        }
    }
}

/// Reverse lookup for formats reported by the surface.
pub fn texture_format_from_vk(format: vk::Format) -> Option<TextureFormat> {
    TextureFormat::ALL
        .iter()
        .copied()
        .find(|f| VkInto::<vk::Format>::vk_into(f) == format)
}

impl VkFrom<TextureAspects> for vk::ImageAspectFlags {
    #[inline]
    fn from(val: &TextureAspects) -> Self {
        let mut result = Self::empty();
        if val.contains(TextureAspects::COLOR) {
            result |= Self::COLOR;
        }
        if val.contains(TextureAspects::DEPTH) {
            result |= Self::DEPTH;
        }
        if val.contains(TextureAspects::STENCIL) {
            result |= Self::STENCIL;
        }
        result
    }
}

/// Aspect of one memory plane of a multi-planar image.
pub fn plane_aspect(plane: u32) -> vk::ImageAspectFlags {
    match plane {
        0 => vk::ImageAspectFlags::PLANE_0,
        1 => vk::ImageAspectFlags::PLANE_1,
        _ => vk::ImageAspectFlags::PLANE_2,
    }
}

impl VkFrom<TextureDimension> for vk::ImageViewType {
    #[inline]
    fn from(val: &TextureDimension) -> Self {
        match val {
            TextureDimension::D1 => Self::TYPE_1D,
            TextureDimension::D1Array => Self::TYPE_1D_ARRAY,
            TextureDimension::D2 | TextureDimension::D2Ms => Self::TYPE_2D,
            TextureDimension::D2Array | TextureDimension::D2MsArray => Self::TYPE_2D_ARRAY,
            TextureDimension::D3 => Self::TYPE_3D,
            TextureDimension::Cube => Self::CUBE,
            TextureDimension::CubeArray => Self::CUBE_ARRAY,
        }
    }
}

impl VkFrom<TextureDimension> for vk::ImageType {
    #[inline]
    fn from(val: &TextureDimension) -> Self {
        match val {
            TextureDimension::D1 | TextureDimension::D1Array => Self::TYPE_1D,
            TextureDimension::D3 => Self::TYPE_3D,
            _ => Self::TYPE_2D,
        }
    }
}

impl VkFrom<SampleCount> for vk::SampleCountFlags {
    #[inline]
    fn from(val: &SampleCount) -> Self {
        Self::from_raw(val.count())
    }
}

impl VkFrom<TextureDesc> for vk::Extent3D {
    #[inline]
    fn from(val: &TextureDesc) -> Self {
        Self {
            width: val.width.max(1),
            height: val.height.max(1),
            depth: val.depth.max(1),
        }
    }
}

/// Usage flags of an image created for `desc`.
pub fn image_usage(desc: &TextureDesc) -> vk::ImageUsageFlags {
    let mut usage = vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::TRANSFER_DST;
    if desc.descriptors.contains(DescriptorType::TEXTURE) {
        usage |= vk::ImageUsageFlags::SAMPLED;
    }
    if desc.descriptors.contains(DescriptorType::RW_TEXTURE) {
        usage |= vk::ImageUsageFlags::STORAGE;
    }
    if desc.descriptors.contains(DescriptorType::INPUT_ATTACHMENT) {
        usage |= vk::ImageUsageFlags::INPUT_ATTACHMENT;
    }
    if desc.start_state.contains(ResourceState::RENDER_TARGET) {
        usage |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
    } else if desc
        .start_state
        .intersects(ResourceState::DEPTH_WRITE | ResourceState::DEPTH_READ)
    {
        usage |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
    }
    if desc.start_state.contains(ResourceState::SHADING_RATE_SOURCE) {
        usage |= vk::ImageUsageFlags::FRAGMENT_SHADING_RATE_ATTACHMENT_KHR;
    }
    if desc.flags.contains(TextureCreationFlags::ON_TILE)
        && usage.intersects(
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        )
    {
        // transient attachments only allow attachment usages
        usage &= vk::ImageUsageFlags::COLOR_ATTACHMENT
            | vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
            | vk::ImageUsageFlags::INPUT_ATTACHMENT;
        usage |= vk::ImageUsageFlags::TRANSIENT_ATTACHMENT;
    }
    usage
}

/// Usage flags of a buffer created for `desc`.
pub fn buffer_usage(desc: &BufferDesc) -> vk::BufferUsageFlags {
    let d = desc.descriptors;
    let mut usage = vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST;
    if d.contains(DescriptorType::UNIFORM_BUFFER) {
        usage |= vk::BufferUsageFlags::UNIFORM_BUFFER;
    }
    if d.intersects(DescriptorType::RW_BUFFER | DescriptorType::BUFFER) {
        usage |= vk::BufferUsageFlags::STORAGE_BUFFER;
    }
    if d.contains(DescriptorType::TEXEL_BUFFER) {
        usage |= vk::BufferUsageFlags::UNIFORM_TEXEL_BUFFER;
    }
    if d.contains(DescriptorType::RW_TEXEL_BUFFER) {
        usage |= vk::BufferUsageFlags::STORAGE_TEXEL_BUFFER;
    }
    if d.contains(DescriptorType::INDEX_BUFFER) {
        usage |= vk::BufferUsageFlags::INDEX_BUFFER;
    }
    if d.contains(DescriptorType::VERTEX_BUFFER) {
        usage |= vk::BufferUsageFlags::VERTEX_BUFFER;
    }
    if d.contains(DescriptorType::INDIRECT_BUFFER) {
        usage |= vk::BufferUsageFlags::INDIRECT_BUFFER;
    }
    if d.contains(DescriptorType::ACCELERATION_STRUCTURE) {
        usage |= vk::BufferUsageFlags::ACCELERATION_STRUCTURE_STORAGE_KHR;
    }
    if d.contains(DescriptorType::ACCELERATION_STRUCTURE_BUILD_INPUT) {
        usage |= vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR;
    }
    if d.contains(DescriptorType::SHADER_BINDING_TABLE) {
        usage |= vk::BufferUsageFlags::SHADER_BINDING_TABLE_KHR;
    }
    if d.intersects(
        DescriptorType::SHADER_DEVICE_ADDRESS
            | DescriptorType::ACCELERATION_STRUCTURE
            | DescriptorType::ACCELERATION_STRUCTURE_BUILD_INPUT
            | DescriptorType::SHADER_BINDING_TABLE,
    ) {
        usage |= vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS;
    }
    usage
}

/// Allocation policy flags for a buffer.
pub fn buffer_memory_usage(desc: &BufferDesc) -> UsageFlags {
    let mut usage = memory_usage(desc.memory_usage);
    if desc
        .flags
        .intersects(BufferCreationFlags::PERSISTENT_MAP | BufferCreationFlags::HOST_VISIBLE)
    {
        usage |= UsageFlags::HOST_ACCESS;
    }
    if desc.descriptors.intersects(
        DescriptorType::SHADER_DEVICE_ADDRESS
            | DescriptorType::ACCELERATION_STRUCTURE
            | DescriptorType::ACCELERATION_STRUCTURE_BUILD_INPUT
            | DescriptorType::SHADER_BINDING_TABLE,
    ) {
        usage |= UsageFlags::DEVICE_ADDRESS;
    }
    usage
}

pub fn memory_usage(usage: ResourceMemoryUsage) -> UsageFlags {
    match usage {
        ResourceMemoryUsage::Unknown | ResourceMemoryUsage::GpuOnly => UsageFlags::FAST_DEVICE_ACCESS,
        ResourceMemoryUsage::CpuOnly => UsageFlags::HOST_ACCESS | UsageFlags::UPLOAD,
        ResourceMemoryUsage::CpuToGpu => {
            UsageFlags::HOST_ACCESS | UsageFlags::UPLOAD | UsageFlags::FAST_DEVICE_ACCESS
        }
        ResourceMemoryUsage::GpuToCpu => UsageFlags::HOST_ACCESS | UsageFlags::DOWNLOAD,
    }
}

impl VkFrom<DescriptorType> for vk::DescriptorType {
    fn from(val: &DescriptorType) -> Self {
        // most specific bits first: several flags share bits
        if val.contains(DescriptorType::COMBINED_IMAGE_SAMPLER) {
            Self::COMBINED_IMAGE_SAMPLER
        } else if val.contains(DescriptorType::SAMPLER) {
            Self::SAMPLER
        } else if val.contains(DescriptorType::RW_TEXTURE) {
            Self::STORAGE_IMAGE
        } else if val.contains(DescriptorType::INPUT_ATTACHMENT) {
            Self::INPUT_ATTACHMENT
        } else if val.contains(DescriptorType::TEXTURE) {
            Self::SAMPLED_IMAGE
        } else if val.contains(DescriptorType::UNIFORM_BUFFER) {
            Self::UNIFORM_BUFFER
        } else if val.contains(DescriptorType::RW_TEXEL_BUFFER) {
            Self::STORAGE_TEXEL_BUFFER
        } else if val.contains(DescriptorType::TEXEL_BUFFER) {
            Self::UNIFORM_TEXEL_BUFFER
        } else if val.intersects(DescriptorType::RW_BUFFER | DescriptorType::BUFFER) {
            Self::STORAGE_BUFFER
        } else if val.contains(DescriptorType::ACCELERATION_STRUCTURE) {
            Self::ACCELERATION_STRUCTURE_KHR
        } else {
            Self::UNIFORM_BUFFER
        }
    }
}

impl VkFrom<ShaderStages> for vk::ShaderStageFlags {
    fn from(val: &ShaderStages) -> Self {
        if val.contains(ShaderStages::ALL) {
            return Self::ALL;
        }
        let mut result = Self::empty();
        if val.contains(ShaderStages::VERTEX) {
            result |= Self::VERTEX;
        }
        if val.contains(ShaderStages::TESS_CONTROL) {
            result |= Self::TESSELLATION_CONTROL;
        }
        if val.contains(ShaderStages::TESS_EVALUATION) {
            result |= Self::TESSELLATION_EVALUATION;
        }
        if val.contains(ShaderStages::GEOMETRY) {
            result |= Self::GEOMETRY;
        }
        if val.contains(ShaderStages::FRAGMENT) {
            result |= Self::FRAGMENT;
        }
        if val.contains(ShaderStages::COMPUTE) {
            result |= Self::COMPUTE;
        }
        if val.contains(ShaderStages::RAYTRACING) {
            result |= Self::RAYGEN_KHR
                | Self::ANY_HIT_KHR
                | Self::CLOSEST_HIT_KHR
                | Self::MISS_KHR
                | Self::INTERSECTION_KHR
                | Self::CALLABLE_KHR;
        }
        result
    }
}

impl VkFrom<VertexFormat> for vk::Format {
    #[inline]
    fn from(val: &VertexFormat) -> Self {
        match val {
            VertexFormat::Uint8x2 => Self::R8G8_UINT,
            VertexFormat::Uint8x4 => Self::R8G8B8A8_UINT,
            VertexFormat::Sint8x2 => Self::R8G8_SINT,
            VertexFormat::Sint8x4 => Self::R8G8B8A8_SINT,
            VertexFormat::Unorm8x2 => Self::R8G8_UNORM,
            VertexFormat::Unorm8x4 => Self::R8G8B8A8_UNORM,
            VertexFormat::Snorm8x2 => Self::R8G8_SNORM,
            VertexFormat::Snorm8x4 => Self::R8G8B8A8_SNORM,
            VertexFormat::Uint16x2 => Self::R16G16_UINT,
            VertexFormat::Uint16x4 => Self::R16G16B16A16_UINT,
            VertexFormat::Sint16x2 => Self::R16G16_SINT,
            VertexFormat::Sint16x4 => Self::R16G16B16A16_SINT,
            VertexFormat::Unorm16x2 => Self::R16G16_UNORM,
            VertexFormat::Unorm16x4 => Self::R16G16B16A16_UNORM,
            VertexFormat::Snorm16x2 => Self::R16G16_SNORM,
            VertexFormat::Snorm16x4 => Self::R16G16B16A16_SNORM,
            VertexFormat::Float16x2 => Self::R16G16_SFLOAT,
            VertexFormat::Float16x4 => Self::R16G16B16A16_SFLOAT,
            VertexFormat::Float32 => Self::R32_SFLOAT,
            VertexFormat::Float32x2 => Self::R32G32_SFLOAT,
            VertexFormat::Float32x3 => Self::R32G32B32_SFLOAT,
            VertexFormat::Float32x4 => Self::R32G32B32A32_SFLOAT,
            VertexFormat::Uint32 => Self::R32_UINT,
            VertexFormat::Uint32x2 => Self::R32G32_UINT,
            VertexFormat::Uint32x3 => Self::R32G32B32_UINT,
            VertexFormat::Uint32x4 => Self::R32G32B32A32_UINT,
            VertexFormat::Sint32 => Self::R32_SINT,
            VertexFormat::Sint32x2 => Self::R32G32_SINT,
            VertexFormat::Sint32x3 => Self::R32G32B32_SINT,
            VertexFormat::Sint32x4 => Self::R32G32B32A32_SINT,
        }
    }
}

impl VkFrom<VertexStepMode> for vk::VertexInputRate {
    #[inline]
    fn from(val: &VertexStepMode) -> Self {
        match val {
            VertexStepMode::Vertex => Self::VERTEX,
            VertexStepMode::Instance => Self::INSTANCE,
        }
    }
}

impl VkFrom<IndexFormat> for vk::IndexType {
    #[inline]
    fn from(val: &IndexFormat) -> Self {
        match val {
            IndexFormat::Uint16 => Self::UINT16,
            IndexFormat::Uint32 => Self::UINT32,
        }
    }
}

impl VkFrom<PrimitiveTopology> for vk::PrimitiveTopology {
    #[inline]
    fn from(val: &PrimitiveTopology) -> Self {
        match val {
            PrimitiveTopology::PointList => Self::POINT_LIST,
            PrimitiveTopology::LineList => Self::LINE_LIST,
            PrimitiveTopology::LineStrip => Self::LINE_STRIP,
            PrimitiveTopology::TriangleList => Self::TRIANGLE_LIST,
            PrimitiveTopology::TriangleStrip => Self::TRIANGLE_STRIP,
            PrimitiveTopology::PatchList => Self::PATCH_LIST,
        }
    }
}

impl VkFrom<FrontFace> for vk::FrontFace {
    #[inline]
    fn from(val: &FrontFace) -> Self {
        match val {
            FrontFace::CounterClockwise => Self::COUNTER_CLOCKWISE,
            FrontFace::Clockwise => Self::CLOCKWISE,
        }
    }
}

impl VkFrom<Option<Face>> for vk::CullModeFlags {
    #[inline]
    fn from(val: &Option<Face>) -> Self {
        match val {
            Some(Face::Front) => Self::FRONT,
            Some(Face::Back) => Self::BACK,
            None => Self::NONE,
        }
    }
}

impl VkFrom<PolygonMode> for vk::PolygonMode {
    #[inline]
    fn from(val: &PolygonMode) -> Self {
        match val {
            PolygonMode::Fill => Self::FILL,
            PolygonMode::Line => Self::LINE,
            PolygonMode::Point => Self::POINT,
        }
    }
}

impl VkFrom<CompareFunction> for vk::CompareOp {
    #[inline]
    fn from(val: &CompareFunction) -> Self {
        match val {
            CompareFunction::Never => Self::NEVER,
            CompareFunction::Less => Self::LESS,
            CompareFunction::Equal => Self::EQUAL,
            CompareFunction::LessEqual => Self::LESS_OR_EQUAL,
            CompareFunction::Greater => Self::GREATER,
            CompareFunction::NotEqual => Self::NOT_EQUAL,
            CompareFunction::GreaterEqual => Self::GREATER_OR_EQUAL,
            CompareFunction::Always => Self::ALWAYS,
        }
    }
}

impl VkFrom<StencilOperation> for vk::StencilOp {
    #[inline]
    fn from(val: &StencilOperation) -> Self {
        match val {
            StencilOperation::Keep => Self::KEEP,
            StencilOperation::Zero => Self::ZERO,
            StencilOperation::Replace => Self::REPLACE,
            StencilOperation::Invert => Self::INVERT,
            StencilOperation::IncrementClamp => Self::INCREMENT_AND_CLAMP,
            StencilOperation::DecrementClamp => Self::DECREMENT_AND_CLAMP,
            StencilOperation::IncrementWrap => Self::INCREMENT_AND_WRAP,
            StencilOperation::DecrementWrap => Self::DECREMENT_AND_WRAP,
        }
    }
}

pub fn stencil_op_state(face: &StencilFaceState, read_mask: u8, write_mask: u8) -> vk::StencilOpState {
    vk::StencilOpState {
        fail_op: face.fail_op.vk_into(),
        pass_op: face.pass_op.vk_into(),
        depth_fail_op: face.depth_fail_op.vk_into(),
        compare_op: face.compare.vk_into(),
        compare_mask: u32::from(read_mask),
        write_mask: u32::from(write_mask),
        reference: 0,
    }
}

impl VkFrom<BlendOperation> for vk::BlendOp {
    #[inline]
    fn from(val: &BlendOperation) -> Self {
        match val {
            BlendOperation::Add => Self::ADD,
            BlendOperation::Subtract => Self::SUBTRACT,
            BlendOperation::ReverseSubtract => Self::REVERSE_SUBTRACT,
            BlendOperation::Min => Self::MIN,
            BlendOperation::Max => Self::MAX,
        }
    }
}

impl VkFrom<BlendFactor> for vk::BlendFactor {
    #[inline]
    fn from(val: &BlendFactor) -> Self {
        match val {
            BlendFactor::Zero => Self::ZERO,
            BlendFactor::One => Self::ONE,
            BlendFactor::Src => Self::SRC_COLOR,
            BlendFactor::OneMinusSrc => Self::ONE_MINUS_SRC_COLOR,
            BlendFactor::SrcAlpha => Self::SRC_ALPHA,
            BlendFactor::OneMinusSrcAlpha => Self::ONE_MINUS_SRC_ALPHA,
            BlendFactor::Dst => Self::DST_COLOR,
            BlendFactor::OneMinusDst => Self::ONE_MINUS_DST_COLOR,
            BlendFactor::DstAlpha => Self::DST_ALPHA,
            BlendFactor::OneMinusDstAlpha => Self::ONE_MINUS_DST_ALPHA,
            BlendFactor::SrcAlphaSaturated => Self::SRC_ALPHA_SATURATE,
            BlendFactor::Constant => Self::CONSTANT_COLOR,
            BlendFactor::OneMinusConstant => Self::ONE_MINUS_CONSTANT_COLOR,
        }
    }
}

impl VkFrom<ColorWrite> for vk::ColorComponentFlags {
    #[inline]
    fn from(val: &ColorWrite) -> Self {
        let mut result = Self::empty();
        if val.contains(ColorWrite::RED) {
            result |= Self::R;
        }
        if val.contains(ColorWrite::GREEN) {
            result |= Self::G;
        }
        if val.contains(ColorWrite::BLUE) {
            result |= Self::B;
        }
        if val.contains(ColorWrite::ALPHA) {
            result |= Self::A;
        }
        result
    }
}

impl VkFrom<FilterType> for vk::Filter {
    #[inline]
    fn from(val: &FilterType) -> Self {
        match val {
            FilterType::Nearest => Self::NEAREST,
            FilterType::Linear => Self::LINEAR,
        }
    }
}

impl VkFrom<MipMapMode> for vk::SamplerMipmapMode {
    #[inline]
    fn from(val: &MipMapMode) -> Self {
        match val {
            MipMapMode::Nearest => Self::NEAREST,
            MipMapMode::Linear => Self::LINEAR,
        }
    }
}

impl VkFrom<AddressMode> for vk::SamplerAddressMode {
    #[inline]
    fn from(val: &AddressMode) -> Self {
        match val {
            AddressMode::Mirror => Self::MIRRORED_REPEAT,
            AddressMode::Repeat => Self::REPEAT,
            AddressMode::ClampToEdge => Self::CLAMP_TO_EDGE,
            AddressMode::ClampToBorder => Self::CLAMP_TO_BORDER,
        }
    }
}

impl VkFrom<LoadActionType> for vk::AttachmentLoadOp {
    #[inline]
    fn from(val: &LoadActionType) -> Self {
        match val {
            LoadActionType::DontCare => Self::DONT_CARE,
            LoadActionType::Load => Self::LOAD,
            LoadActionType::Clear => Self::CLEAR,
        }
    }
}

impl VkFrom<StoreActionType> for vk::AttachmentStoreOp {
    #[inline]
    fn from(val: &StoreActionType) -> Self {
        match val {
            StoreActionType::Store | StoreActionType::ResolveStore => Self::STORE,
            StoreActionType::DontCare | StoreActionType::ResolveDontCare => Self::DONT_CARE,
            StoreActionType::None => Self::NONE,
        }
    }
}

impl VkFrom<ClearValue> for vk::ClearValue {
    #[inline]
    fn from(val: &ClearValue) -> Self {
        match *val {
            ClearValue::Color(float32) => Self {
                color: vk::ClearColorValue { float32 },
            },
            ClearValue::DepthStencil { depth, stencil } => Self {
                depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
            },
        }
    }
}

impl VkFrom<QueueType> for vk::QueueFlags {
    #[inline]
    fn from(val: &QueueType) -> Self {
        match val {
            QueueType::Graphics => Self::GRAPHICS,
            QueueType::Transfer => Self::TRANSFER,
            QueueType::Compute => Self::COMPUTE,
        }
    }
}

impl VkFrom<QueryType> for vk::QueryType {
    #[inline]
    fn from(val: &QueryType) -> Self {
        match val {
            QueryType::Timestamp => Self::TIMESTAMP,
            QueryType::Occlusion => Self::OCCLUSION,
            QueryType::PipelineStatistics => Self::PIPELINE_STATISTICS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_reverse_lookup() {
        for &format in TextureFormat::ALL {
            let vk_format: vk::Format = format.vk_into();
            assert_eq!(Some(format), texture_format_from_vk(vk_format));
        }
        assert_eq!(None, texture_format_from_vk(vk::Format::R4G4_UNORM_PACK8));
    }

    #[test]
    fn test_descriptor_type_prefers_specific_bits() {
        assert_eq!(
            vk::DescriptorType::STORAGE_BUFFER,
            VkInto::<vk::DescriptorType>::vk_into(&DescriptorType::BUFFER_RAW)
        );
        assert_eq!(
            vk::DescriptorType::SAMPLED_IMAGE,
            VkInto::<vk::DescriptorType>::vk_into(&DescriptorType::TEXTURE_CUBE)
        );
        assert_eq!(
            vk::DescriptorType::STORAGE_IMAGE,
            VkInto::<vk::DescriptorType>::vk_into(&DescriptorType::RW_TEXTURE)
        );
    }

    #[test]
    fn test_buffer_usage_from_descriptors() {
        let desc = BufferDesc::new(
            64,
            DescriptorType::UNIFORM_BUFFER | DescriptorType::VERTEX_BUFFER,
        );
        let usage = buffer_usage(&desc);
        assert!(usage.contains(vk::BufferUsageFlags::UNIFORM_BUFFER));
        assert!(usage.contains(vk::BufferUsageFlags::VERTEX_BUFFER));
        assert!(!usage.contains(vk::BufferUsageFlags::STORAGE_BUFFER));
        assert!(!usage.contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS));
    }

    #[test]
    fn test_image_usage_from_state() {
        let mut desc = TextureDesc::new_2d(4, 4, TextureFormat::Depth32Float);
        desc.start_state = ResourceState::DEPTH_WRITE;
        let usage = image_usage(&desc);
        assert!(usage.contains(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT));
        assert!(usage.contains(vk::ImageUsageFlags::SAMPLED));

        desc.flags |= TextureCreationFlags::ON_TILE;
        let usage = image_usage(&desc);
        assert_eq!(
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT,
            usage
        );
    }
}
