//! Texture payloads and sampler descriptions.

use crate::format::{get_format_element_size, Format};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Filter {
    #[default]
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MipmapMode {
    #[default]
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamplerAddressMode {
    #[default]
    Repeat,
    Mirror,
    Clamp,
    Border,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    GreaterEqual,
    NotEqual,
    Always,
}

/// Sampler description attached to every texture. `compare_op` is set iff
/// the texture is sampled as a shadow map.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SamplerState {
    pub mag_filter: Filter,
    pub min_filter: Filter,
    pub mipmap_mode: MipmapMode,
    pub address_mode_u: SamplerAddressMode,
    pub address_mode_v: SamplerAddressMode,
    pub address_mode_w: SamplerAddressMode,
    pub max_anisotropy: Option<f32>,
    pub compare_op: Option<CompareOp>,
}

/// Host-side texture contents plus creation parameters. `pixels` holds mip 0
/// first, followed by the remaining mip levels tightly packed.
#[derive(Debug, Clone, Default)]
pub struct TextureData {
    pub size: (u32, u32),
    pub format: Format,
    pub mip_level_count: u32,
    pub sample_count: u32,
    pub sampler_state: SamplerState,
    pub pixels: Vec<u8>,
}

/// Total byte size of every mip level of the texture, extents halving per
/// level with a floor of 1.
pub fn get_byte_size(data: &TextureData) -> usize {
    let element_size = get_format_element_size(data.format) as usize;
    let (mut width, mut height) = (data.size.0.max(1) as usize, data.size.1.max(1) as usize);
    let mut total = 0;
    for _ in 0..data.mip_level_count.max(1) {
        total += width * height * element_size;
        width = (width / 2).max(1);
        height = (height / 2).max(1);
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_size_of_single_mip() {
        let data = TextureData {
            size: (2, 2),
            format: Format::Byte4Srgb,
            mip_level_count: 1,
            sample_count: 1,
            ..Default::default()
        };
        assert_eq!(get_byte_size(&data), 16);
    }

    #[test]
    fn byte_size_sums_mip_chain() {
        let data = TextureData {
            size: (2, 2),
            format: Format::Byte4Norm,
            mip_level_count: 2,
            sample_count: 1,
            ..Default::default()
        };
        // 2x2 + 1x1, four bytes per texel.
        assert_eq!(get_byte_size(&data), 20);
    }

    #[test]
    fn byte_size_clamps_extents_at_one() {
        let data = TextureData {
            size: (4, 1),
            format: Format::Byte1Norm,
            mip_level_count: 3,
            sample_count: 1,
            ..Default::default()
        };
        // 4x1 + 2x1 + 1x1.
        assert_eq!(get_byte_size(&data), 7);
    }
}
