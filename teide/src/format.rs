//! Texel and vertex element formats.

use ash::vk;

/// Element format for textures, vertex attributes and depth/stencil targets.
///
/// `Byte`/`Ushort` components are unsigned, `Short`/`Int` are signed; the
/// `Norm` variants are normalized to [0,1].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Format {
    #[default]
    Unknown,

    Byte1,
    Byte1Norm,
    Short1,
    Short1Norm,
    Ushort1,
    Ushort1Norm,
    Half1,
    Int1,
    Uint1,
    Float1,

    Byte2,
    Byte2Norm,
    Short2,
    Short2Norm,
    Ushort2,
    Ushort2Norm,
    Half2,
    Int2,
    Uint2,
    Float2,

    Byte3,
    Byte3Norm,
    Short3,
    Short3Norm,
    Ushort3,
    Ushort3Norm,
    Half3,
    Int3,
    Uint3,
    Float3,

    Byte4,
    Byte4Norm,
    Byte4Srgb,
    Byte4SrgbBGRA,
    Short4,
    Short4Norm,
    Ushort4,
    Ushort4Norm,
    Half4,
    Int4,
    Uint4,
    Float4,

    Depth16,
    Depth32,
    Depth16Stencil8,
    Depth24Stencil8,
    Depth32Stencil8,
    Stencil8,
}

pub const FORMAT_COUNT: usize = 49;

/// Size in bytes of one element (texel or vertex attribute) of the format.
pub fn get_format_element_size(format: Format) -> u32 {
    const FLOAT: u32 = 4;
    const HALF: u32 = 2;
    const INT: u32 = 4;
    const UINT: u32 = 4;
    const SHORT: u32 = 2;
    const USHORT: u32 = 2;
    const BYTE: u32 = 1;

    match format {
        Format::Unknown => 0,

        Format::Byte1 | Format::Byte1Norm => BYTE,
        Format::Short1 | Format::Short1Norm => SHORT,
        Format::Ushort1 | Format::Ushort1Norm => USHORT,
        Format::Half1 => HALF,
        Format::Int1 => INT,
        Format::Uint1 => UINT,
        Format::Float1 => FLOAT,

        Format::Byte2 | Format::Byte2Norm => BYTE * 2,
        Format::Short2 | Format::Short2Norm => SHORT * 2,
        Format::Ushort2 | Format::Ushort2Norm => USHORT * 2,
        Format::Half2 => HALF * 2,
        Format::Int2 => INT * 2,
        Format::Uint2 => UINT * 2,
        Format::Float2 => FLOAT * 2,

        Format::Byte3 | Format::Byte3Norm => BYTE * 3,
        Format::Short3 | Format::Short3Norm => SHORT * 3,
        Format::Ushort3 | Format::Ushort3Norm => USHORT * 3,
        Format::Half3 => HALF * 3,
        Format::Int3 => INT * 3,
        Format::Uint3 => UINT * 3,
        Format::Float3 => FLOAT * 3,

        Format::Byte4 | Format::Byte4Norm | Format::Byte4Srgb | Format::Byte4SrgbBGRA => BYTE * 4,
        Format::Short4 | Format::Short4Norm => SHORT * 4,
        Format::Ushort4 | Format::Ushort4Norm => USHORT * 4,
        Format::Half4 => HALF * 4,
        Format::Int4 => INT * 4,
        Format::Uint4 => UINT * 4,
        Format::Float4 => FLOAT * 4,

        Format::Depth16 => 2,
        Format::Depth32 => 4,
        Format::Depth16Stencil8 => 3,
        Format::Depth24Stencil8 => 4,
        Format::Depth32Stencil8 => 5,
        Format::Stencil8 => 1,
    }
}

pub fn has_depth_component(format: Format) -> bool {
    matches!(
        format,
        Format::Depth16
            | Format::Depth32
            | Format::Depth16Stencil8
            | Format::Depth24Stencil8
            | Format::Depth32Stencil8
    )
}

pub fn has_stencil_component(format: Format) -> bool {
    matches!(
        format,
        Format::Stencil8 | Format::Depth16Stencil8 | Format::Depth24Stencil8 | Format::Depth32Stencil8
    )
}

pub fn has_depth_or_stencil_component(format: Format) -> bool {
    has_depth_component(format) || has_stencil_component(format)
}

pub fn format_to_vk(format: Format) -> vk::Format {
    match format {
        Format::Unknown => vk::Format::UNDEFINED,

        Format::Byte1 => vk::Format::R8_UINT,
        Format::Byte1Norm => vk::Format::R8_UNORM,
        Format::Short1 => vk::Format::R16_SINT,
        Format::Short1Norm => vk::Format::R16_SNORM,
        Format::Ushort1 => vk::Format::R16_UINT,
        Format::Ushort1Norm => vk::Format::R16_UNORM,
        Format::Half1 => vk::Format::R16_SFLOAT,
        Format::Int1 => vk::Format::R32_SINT,
        Format::Uint1 => vk::Format::R32_UINT,
        Format::Float1 => vk::Format::R32_SFLOAT,

        Format::Byte2 => vk::Format::R8G8_UINT,
        Format::Byte2Norm => vk::Format::R8G8_UNORM,
        Format::Short2 => vk::Format::R16G16_SINT,
        Format::Short2Norm => vk::Format::R16G16_SNORM,
        Format::Ushort2 => vk::Format::R16G16_UINT,
        Format::Ushort2Norm => vk::Format::R16G16_UNORM,
        Format::Half2 => vk::Format::R16G16_SFLOAT,
        Format::Int2 => vk::Format::R32G32_SINT,
        Format::Uint2 => vk::Format::R32G32_UINT,
        Format::Float2 => vk::Format::R32G32_SFLOAT,

        Format::Byte3 => vk::Format::R8G8B8_UINT,
        Format::Byte3Norm => vk::Format::R8G8B8_UNORM,
        Format::Short3 => vk::Format::R16G16B16_SINT,
        Format::Short3Norm => vk::Format::R16G16B16_SNORM,
        Format::Ushort3 => vk::Format::R16G16B16_UINT,
        Format::Ushort3Norm => vk::Format::R16G16B16_UNORM,
        Format::Half3 => vk::Format::R16G16B16_SFLOAT,
        Format::Int3 => vk::Format::R32G32B32_SINT,
        Format::Uint3 => vk::Format::R32G32B32_UINT,
        Format::Float3 => vk::Format::R32G32B32_SFLOAT,

        Format::Byte4 => vk::Format::R8G8B8A8_UINT,
        Format::Byte4Norm => vk::Format::R8G8B8A8_UNORM,
        Format::Byte4Srgb => vk::Format::R8G8B8A8_SRGB,
        Format::Byte4SrgbBGRA => vk::Format::B8G8R8A8_SRGB,
        Format::Short4 => vk::Format::R16G16B16A16_SINT,
        Format::Short4Norm => vk::Format::R16G16B16A16_SNORM,
        Format::Ushort4 => vk::Format::R16G16B16A16_UINT,
        Format::Ushort4Norm => vk::Format::R16G16B16A16_UNORM,
        Format::Half4 => vk::Format::R16G16B16A16_SFLOAT,
        Format::Int4 => vk::Format::R32G32B32A32_SINT,
        Format::Uint4 => vk::Format::R32G32B32A32_UINT,
        Format::Float4 => vk::Format::R32G32B32A32_SFLOAT,

        Format::Depth16 => vk::Format::D16_UNORM,
        Format::Depth32 => vk::Format::D32_SFLOAT,
        Format::Depth16Stencil8 => vk::Format::D16_UNORM_S8_UINT,
        Format::Depth24Stencil8 => vk::Format::D24_UNORM_S8_UINT,
        Format::Depth32Stencil8 => vk::Format::D32_SFLOAT_S8_UINT,
        Format::Stencil8 => vk::Format::S8_UINT,
    }
}

/// Inverse of [`format_to_vk`] for the formats a swapchain can report.
pub fn format_from_vk(format: vk::Format) -> Format {
    match format {
        vk::Format::R8G8B8A8_UNORM => Format::Byte4Norm,
        vk::Format::R8G8B8A8_SRGB => Format::Byte4Srgb,
        vk::Format::B8G8R8A8_SRGB => Format::Byte4SrgbBGRA,
        vk::Format::D16_UNORM => Format::Depth16,
        vk::Format::D32_SFLOAT => Format::Depth32,
        vk::Format::D16_UNORM_S8_UINT => Format::Depth16Stencil8,
        vk::Format::D24_UNORM_S8_UINT => Format::Depth24Stencil8,
        vk::Format::D32_SFLOAT_S8_UINT => Format::Depth32Stencil8,
        vk::Format::S8_UINT => Format::Stencil8,
        _ => Format::Unknown,
    }
}

/// Aspect flags for image views and barriers of this format.
pub fn get_image_aspect(format: Format) -> vk::ImageAspectFlags {
    let mut aspect = vk::ImageAspectFlags::empty();
    if has_depth_component(format) {
        aspect |= vk::ImageAspectFlags::DEPTH;
    }
    if has_stencil_component(format) {
        aspect |= vk::ImageAspectFlags::STENCIL;
    }
    if aspect.is_empty() {
        aspect = vk::ImageAspectFlags::COLOR;
    }
    aspect
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_sizes_match_component_layout() {
        assert_eq!(get_format_element_size(Format::Unknown), 0);
        assert_eq!(get_format_element_size(Format::Byte1), 1);
        assert_eq!(get_format_element_size(Format::Byte4Srgb), 4);
        assert_eq!(get_format_element_size(Format::Half3), 6);
        assert_eq!(get_format_element_size(Format::Float4), 16);
        assert_eq!(get_format_element_size(Format::Depth16), 2);
        assert_eq!(get_format_element_size(Format::Depth24Stencil8), 4);
        assert_eq!(get_format_element_size(Format::Depth32Stencil8), 5);
        assert_eq!(get_format_element_size(Format::Stencil8), 1);
    }

    #[test]
    fn depth_stencil_predicates() {
        assert!(has_depth_component(Format::Depth16));
        assert!(!has_stencil_component(Format::Depth16));
        assert!(has_stencil_component(Format::Depth24Stencil8));
        assert!(has_depth_or_stencil_component(Format::Stencil8));
        assert!(!has_depth_or_stencil_component(Format::Byte4Srgb));
    }

    #[test]
    fn vk_conversion_covers_every_format() {
        let formats = [
            Format::Byte1,
            Format::Byte4Norm,
            Format::Byte4Srgb,
            Format::Byte4SrgbBGRA,
            Format::Float3,
            Format::Depth16,
            Format::Depth32Stencil8,
            Format::Stencil8,
        ];
        for format in formats {
            assert_ne!(format_to_vk(format), vk::Format::UNDEFINED, "{format:?}");
        }
        assert_eq!(format_from_vk(format_to_vk(Format::Byte4SrgbBGRA)), Format::Byte4SrgbBGRA);
    }

    #[test]
    fn image_aspects() {
        assert_eq!(get_image_aspect(Format::Byte4Srgb), vk::ImageAspectFlags::COLOR);
        assert_eq!(get_image_aspect(Format::Depth32), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            get_image_aspect(Format::Depth24Stencil8),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
    }
}
