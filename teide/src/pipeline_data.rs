//! Render state and pipeline creation descriptors.

use std::hash::{Hash, Hasher};

use crate::format::Format;
use crate::texture_data::CompareOp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    InvSrcColor,
    SrcAlpha,
    InvSrcAlpha,
    DestAlpha,
    InvDestAlpha,
    DestColor,
    InvDestColor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendOp {
    Add,
    Subtract,
    RevSubtract,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillMode {
    #[default]
    Solid,
    Wireframe,
    Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CullMode {
    None,
    Clockwise,
    #[default]
    Anticlockwise,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendFunc {
    pub source: BlendFactor,
    pub dest: BlendFactor,
    pub op: BlendOp,
}

impl Default for BlendFunc {
    fn default() -> Self {
        Self { source: BlendFactor::One, dest: BlendFactor::Zero, op: BlendOp::Add }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BlendState {
    pub blend_func: BlendFunc,
    pub alpha_blend_func: Option<BlendFunc>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_func: CompareOp,
}

impl Default for DepthState {
    fn default() -> Self {
        Self { depth_test: true, depth_write: true, depth_func: CompareOp::Less }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorMask {
    pub red: bool,
    pub green: bool,
    pub blue: bool,
    pub alpha: bool,
}

impl Default for ColorMask {
    fn default() -> Self {
        Self { red: true, green: true, blue: true, alpha: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterState {
    pub fill_mode: FillMode,
    pub cull_mode: CullMode,
    pub depth_bias_constant: f32,
    pub depth_bias_slope: f32,
    pub line_width: f32,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            fill_mode: FillMode::Solid,
            cull_mode: CullMode::Anticlockwise,
            depth_bias_constant: 0.0,
            depth_bias_slope: 0.0,
            line_width: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RenderStates {
    pub blend_state: Option<BlendState>,
    pub color_write_mask: ColorMask,
    pub depth_state: DepthState,
    pub raster_state: RasterState,
}

/// The attachment formats and sample count a render pass targets. The
/// capture flags record whether each aspect is stored for later sampling;
/// together these fields form the render-pass compatibility key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FramebufferLayout {
    pub color_format: Option<Format>,
    pub depth_stencil_format: Option<Format>,
    pub sample_count: u32,
    pub capture_color: bool,
    pub capture_depth_stencil: bool,
}

/// Per-render-list state that participates in pipeline selection.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RenderOverrides {
    pub depth_bias_constant: Option<f32>,
    pub depth_bias_slope: Option<f32>,
}

impl Eq for RenderOverrides {}

impl Hash for RenderOverrides {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.depth_bias_constant.map(f32::to_bits).hash(state);
        self.depth_bias_slope.map(f32::to_bits).hash(state);
    }
}

/// Key under which a pipeline variant is built: one pipeline object exists
/// per render pass descriptor the pipeline was created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RenderPassDesc {
    pub framebuffer_layout: FramebufferLayout,
    pub render_overrides: RenderOverrides,
}

/// Load and store operations of a cached render pass, derived from the
/// render list's clear state and the layout's capture flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RenderPassInfo {
    pub clear_color: bool,
    pub clear_depth: bool,
    pub clear_stencil: bool,
}

