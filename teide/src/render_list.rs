//! Value-type descriptions of render work.

use crate::pipeline_data::{FramebufferLayout, RenderOverrides};
use crate::texture_data::SamplerState;
use crate::{Mesh, ParameterBlock, Pipeline, Texture};

pub type Color = [f32; 4];

/// Region of the framebuffer the viewport covers, in normalized
/// coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportRegion {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Default for ViewportRegion {
    fn default() -> Self {
        Self { left: 0.0, top: 0.0, right: 1.0, bottom: 1.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScissorRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Which aspects a render pass clears, and with what values.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClearState {
    pub color_value: Option<Color>,
    pub depth_value: Option<f32>,
    pub stencil_value: Option<u32>,
}

/// Uniform bytes plus texture bindings for one parameter block.
#[derive(Debug, Clone, Default)]
pub struct ShaderParameters {
    pub uniform_data: Vec<u8>,
    pub textures: Vec<Texture>,
}

/// One indexed or non-indexed draw.
#[derive(Debug, Clone)]
pub struct RenderObject {
    pub mesh: Mesh,
    pub pipeline: Pipeline,
    pub material_parameters: Option<ParameterBlock>,
    pub object_parameters: ShaderParameters,
}

/// A value-type description of one render pass: clear state, view
/// parameters, viewport and the objects to draw, in order.
#[derive(Debug, Clone, Default)]
pub struct RenderList {
    pub name: String,
    pub clear_state: ClearState,
    pub view_parameters: ShaderParameters,
    pub render_overrides: RenderOverrides,
    pub viewport_region: ViewportRegion,
    pub scissor: Option<ScissorRect>,
    pub objects: Vec<RenderObject>,
}

/// Offscreen render target description. The framebuffer layout's capture
/// flags select which aspects survive the pass as sampleable textures.
#[derive(Debug, Clone, Default)]
pub struct RenderTargetInfo {
    pub size: (u32, u32),
    pub framebuffer_layout: FramebufferLayout,
    pub sampler_state: SamplerState,
}

#[derive(Debug, Clone, Default)]
pub struct RenderToTextureResult {
    pub color_texture: Option<Texture>,
    pub depth_stencil_texture: Option<Texture>,
}
