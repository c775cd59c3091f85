//! Graphics pipeline construction and per-render-pass pipeline storage.

use ash::vk;

use crate::error::Result;
use crate::format::format_to_vk;
use crate::handle::Handle;
use crate::mesh_data::{PrimitiveTopology, VertexClass, VertexLayout};
use crate::pipeline_data::{
    BlendFactor, BlendOp, CullMode, FillMode, RenderPassDesc, RenderStates,
};
use crate::vulkan::shader::VulkanShader;
use crate::vulkan::texture::compare_op_to_vk;

/// Everything needed to build a pipeline: the shader, vertex layout,
/// fixed-function state, and the render passes it will be used in.
#[derive(Debug, Clone)]
pub struct PipelineData {
    pub shader: Handle<VulkanShader>,
    pub vertex_layout: VertexLayout,
    pub render_states: RenderStates,
    pub render_passes: Vec<RenderPassDesc>,
}

/// A shader bound to fixed-function state, with one `vk::Pipeline` per
/// render pass descriptor it was built for.
pub struct VulkanPipeline {
    device: ash::Device,
    pub shader: Handle<VulkanShader>,
    pub pipeline_layout: vk::PipelineLayout,
    pipelines: Vec<(RenderPassDesc, vk::Pipeline)>,
}

impl VulkanPipeline {
    pub(crate) fn new(
        device: &ash::Device,
        shader: Handle<VulkanShader>,
        pipeline_layout: vk::PipelineLayout,
        pipelines: Vec<(RenderPassDesc, vk::Pipeline)>,
    ) -> Self {
        Self { device: device.clone(), shader, pipeline_layout, pipelines }
    }

    /// The pipeline variant built for the given render pass descriptor.
    /// Using a pipeline in a pass it was not created for is a programming
    /// error.
    pub fn pipeline_for(&self, desc: &RenderPassDesc) -> vk::Pipeline {
        self.pipelines
            .iter()
            .find(|(key, _)| key == desc)
            .map(|(_, pipeline)| *pipeline)
            .unwrap_or_else(|| panic!("pipeline was not created for render pass {desc:?}"))
    }
}

impl Drop for VulkanPipeline {
    fn drop(&mut self) {
        unsafe {
            for (_, pipeline) in self.pipelines.drain(..) {
                self.device.destroy_pipeline(pipeline, None);
            }
        }
    }
}

impl std::fmt::Debug for VulkanPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanPipeline").field("variants", &self.pipelines.len()).finish_non_exhaustive()
    }
}

fn topology_to_vk(topology: PrimitiveTopology) -> vk::PrimitiveTopology {
    match topology {
        PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
        PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveTopology::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
        PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
    }
}

fn fill_mode_to_vk(mode: FillMode) -> vk::PolygonMode {
    match mode {
        FillMode::Solid => vk::PolygonMode::FILL,
        FillMode::Wireframe => vk::PolygonMode::LINE,
        FillMode::Point => vk::PolygonMode::POINT,
    }
}

fn cull_mode_to_vk(mode: CullMode) -> vk::CullModeFlags {
    match mode {
        CullMode::None => vk::CullModeFlags::NONE,
        CullMode::Clockwise => vk::CullModeFlags::FRONT,
        CullMode::Anticlockwise => vk::CullModeFlags::BACK,
    }
}

fn blend_factor_to_vk(factor: BlendFactor) -> vk::BlendFactor {
    match factor {
        BlendFactor::Zero => vk::BlendFactor::ZERO,
        BlendFactor::One => vk::BlendFactor::ONE,
        BlendFactor::SrcColor => vk::BlendFactor::SRC_COLOR,
        BlendFactor::InvSrcColor => vk::BlendFactor::ONE_MINUS_SRC_COLOR,
        BlendFactor::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
        BlendFactor::InvSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DestAlpha => vk::BlendFactor::DST_ALPHA,
        BlendFactor::InvDestAlpha => vk::BlendFactor::ONE_MINUS_DST_ALPHA,
        BlendFactor::DestColor => vk::BlendFactor::DST_COLOR,
        BlendFactor::InvDestColor => vk::BlendFactor::ONE_MINUS_DST_COLOR,
    }
}

fn blend_op_to_vk(op: BlendOp) -> vk::BlendOp {
    match op {
        BlendOp::Add => vk::BlendOp::ADD,
        BlendOp::Subtract => vk::BlendOp::SUBTRACT,
        BlendOp::RevSubtract => vk::BlendOp::REVERSE_SUBTRACT,
        BlendOp::Min => vk::BlendOp::MIN,
        BlendOp::Max => vk::BlendOp::MAX,
    }
}

fn make_blend_state(states: &RenderStates) -> vk::PipelineColorBlendAttachmentState {
    let mut color_write_mask = vk::ColorComponentFlags::empty();
    if states.color_write_mask.red {
        color_write_mask |= vk::ColorComponentFlags::R;
    }
    if states.color_write_mask.green {
        color_write_mask |= vk::ColorComponentFlags::G;
    }
    if states.color_write_mask.blue {
        color_write_mask |= vk::ColorComponentFlags::B;
    }
    if states.color_write_mask.alpha {
        color_write_mask |= vk::ColorComponentFlags::A;
    }

    match &states.blend_state {
        Some(blend) => {
            let color = blend.blend_func;
            let alpha = blend.alpha_blend_func.unwrap_or(blend.blend_func);
            vk::PipelineColorBlendAttachmentState::default()
                .blend_enable(true)
                .src_color_blend_factor(blend_factor_to_vk(color.source))
                .dst_color_blend_factor(blend_factor_to_vk(color.dest))
                .color_blend_op(blend_op_to_vk(color.op))
                .src_alpha_blend_factor(blend_factor_to_vk(alpha.source))
                .dst_alpha_blend_factor(blend_factor_to_vk(alpha.dest))
                .alpha_blend_op(blend_op_to_vk(alpha.op))
                .color_write_mask(color_write_mask)
        }
        None => vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(false)
            .color_write_mask(color_write_mask),
    }
}

/// Builds one pipeline variant against a compatible render pass. Viewport
/// and scissor are dynamic state; depth-bias overrides from the render pass
/// descriptor take precedence over the raster state's values.
pub(crate) fn create_graphics_pipeline(
    device: &ash::Device,
    shader: &VulkanShader,
    vertex_layout: &VertexLayout,
    render_states: &RenderStates,
    render_pass_desc: &RenderPassDesc,
    render_pass: vk::RenderPass,
) -> Result<vk::Pipeline> {
    let entry_point = c"main";
    let mut stages = vec![vk::PipelineShaderStageCreateInfo::default()
        .stage(vk::ShaderStageFlags::VERTEX)
        .module(shader.vertex_shader)
        .name(entry_point)];
    if render_pass_desc.framebuffer_layout.color_format.is_some() {
        stages.push(
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(shader.pixel_shader)
                .name(entry_point),
        );
    }

    let vertex_bindings: Vec<vk::VertexInputBindingDescription> = vertex_layout
        .buffer_bindings
        .iter()
        .enumerate()
        .map(|(i, binding)| {
            vk::VertexInputBindingDescription::default()
                .binding(i as u32)
                .stride(binding.stride)
                .input_rate(match binding.vertex_class {
                    VertexClass::PerVertex => vk::VertexInputRate::VERTEX,
                    VertexClass::PerInstance => vk::VertexInputRate::INSTANCE,
                })
        })
        .collect();

    let vertex_attributes: Vec<vk::VertexInputAttributeDescription> = vertex_layout
        .attributes
        .iter()
        .map(|attribute| {
            let location = shader.attribute_location(&attribute.name).unwrap_or_else(|| {
                panic!("shader has no vertex input named {:?}", attribute.name)
            });
            vk::VertexInputAttributeDescription::default()
                .location(location)
                .binding(attribute.buffer_index)
                .format(format_to_vk(attribute.format))
                .offset(attribute.offset)
        })
        .collect();

    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&vertex_bindings)
        .vertex_attribute_descriptions(&vertex_attributes);

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(topology_to_vk(vertex_layout.topology));

    let viewport_state =
        vk::PipelineViewportStateCreateInfo::default().viewport_count(1).scissor_count(1);

    let raster = &render_states.raster_state;
    let depth_bias_constant =
        render_pass_desc.render_overrides.depth_bias_constant.unwrap_or(raster.depth_bias_constant);
    let depth_bias_slope =
        render_pass_desc.render_overrides.depth_bias_slope.unwrap_or(raster.depth_bias_slope);

    let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(fill_mode_to_vk(raster.fill_mode))
        .cull_mode(cull_mode_to_vk(raster.cull_mode))
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
        .depth_bias_enable(depth_bias_constant != 0.0 || depth_bias_slope != 0.0)
        .depth_bias_constant_factor(depth_bias_constant)
        .depth_bias_slope_factor(depth_bias_slope)
        .line_width(raster.line_width);

    let multisample = vk::PipelineMultisampleStateCreateInfo::default().rasterization_samples(
        vk::SampleCountFlags::from_raw(render_pass_desc.framebuffer_layout.sample_count.max(1)),
    );

    let depth = &render_states.depth_state;
    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(depth.depth_test)
        .depth_write_enable(depth.depth_write)
        .depth_compare_op(compare_op_to_vk(depth.depth_func))
        .depth_bounds_test_enable(false)
        .stencil_test_enable(false);

    let blend_attachments = [make_blend_state(render_states)];
    let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(false)
        .attachments(&blend_attachments);

    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let mut create_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization)
        .multisample_state(&multisample)
        .depth_stencil_state(&depth_stencil)
        .dynamic_state(&dynamic_state)
        .layout(shader.pipeline_layout)
        .render_pass(render_pass)
        .subpass(0);
    // A depth-only pass has no color attachments to blend into.
    if render_pass_desc.framebuffer_layout.color_format.is_some() {
        create_info = create_info.color_blend_state(&color_blend);
    }

    let pipelines = unsafe {
        device
            .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
            .map_err(|(_, result)| result)?
    };
    Ok(pipelines[0])
}
