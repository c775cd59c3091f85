mod common;

use common::test_device;
use teide::{
    Aabb, ClearState, DevicePtr, Format, FramebufferLayout, MeshData, Pipeline, PipelineData,
    PrimitiveTopology, RenderList, RenderObject, RenderOverrides, RenderPassDesc, RenderStates,
    RenderTargetInfo, ResourceLifetime, Shader, ShaderParameters, ShaderVariable, ShaderVariableType,
    TextureData, VertexAttribute, VertexBufferBinding, VertexClass, VertexLayout,
};
use teide_shader_compiler::compile_shader;

fn compile_simple_shader(device: &DevicePtr, position_type: ShaderVariableType) -> Shader {
    let position_expand = match position_type {
        ShaderVariableType::Vector2 => "vec4(position, 0.0, 1.0)",
        ShaderVariableType::Vector3 => "vec4(position, 1.0)",
        _ => panic!("unsupported position type"),
    };
    let source = teide::ShaderSourceData {
        language: teide::ShaderLanguage::Glsl,
        environment: Default::default(),
        material_pblock: Default::default(),
        object_pblock: Default::default(),
        vertex_shader: teide::ShaderStageDefinition {
            inputs: vec![ShaderVariable::new("position", position_type)],
            outputs: vec![ShaderVariable::new("gl_Position", ShaderVariableType::Vector4)],
            source: format!("void main() {{\n    gl_Position = {position_expand};\n}}\n"),
        },
        pixel_shader: teide::ShaderStageDefinition {
            inputs: vec![],
            outputs: vec![ShaderVariable::new("outColor", ShaderVariableType::Vector4)],
            source: "void main() {\n    outColor = vec4(1.0);\n}\n".into(),
        },
    };
    let data = compile_shader(&source).unwrap();
    device.create_shader(&data, "SimpleShader").unwrap()
}

fn fullscreen_triangle_mesh(device: &DevicePtr) -> teide::Mesh {
    let vertices: [f32; 6] = [-1.0, -1.0, 3.0, -1.0, -1.0, 3.0];
    let vertex_data: Vec<u8> = vertices.iter().flat_map(|f| f.to_le_bytes()).collect();
    device
        .create_mesh(
            MeshData {
                lifetime: ResourceLifetime::Permanent,
                vertex_layout: VertexLayout {
                    topology: PrimitiveTopology::TriangleList,
                    buffer_bindings: vec![VertexBufferBinding {
                        binding: 0,
                        stride: 8,
                        vertex_class: VertexClass::PerVertex,
                    }],
                    attributes: vec![VertexAttribute {
                        name: "position".into(),
                        format: Format::Float2,
                        buffer_index: 0,
                        offset: 0,
                    }],
                },
                vertex_data,
                index_data: Vec::new(),
                vertex_count: 3,
                aabb: Aabb::default(),
            },
            "FullscreenTriangle",
        )
        .unwrap()
}

fn simple_pipeline(device: &DevicePtr, shader: Shader, layout: FramebufferLayout) -> Pipeline {
    device
        .create_pipeline(PipelineData {
            shader,
            vertex_layout: VertexLayout {
                topology: PrimitiveTopology::TriangleList,
                buffer_bindings: vec![VertexBufferBinding {
                    binding: 0,
                    stride: 8,
                    vertex_class: VertexClass::PerVertex,
                }],
                attributes: vec![VertexAttribute {
                    name: "position".into(),
                    format: Format::Float2,
                    buffer_index: 0,
                    offset: 0,
                }],
            },
            render_states: RenderStates {
                depth_state: teide::DepthState { depth_test: false, depth_write: false, ..Default::default() },
                raster_state: teide::RasterState { cull_mode: teide::CullMode::None, ..Default::default() },
                ..Default::default()
            },
            render_passes: vec![RenderPassDesc {
                framebuffer_layout: layout,
                render_overrides: RenderOverrides::default(),
            }],
        })
        .unwrap()
}

fn capture_color_target(size: (u32, u32)) -> RenderTargetInfo {
    RenderTargetInfo {
        size,
        framebuffer_layout: FramebufferLayout {
            color_format: Some(Format::Byte4Srgb),
            depth_stencil_format: None,
            sample_count: 1,
            capture_color: true,
            capture_depth_stencil: false,
        },
        sampler_state: Default::default(),
    }
}

#[test]
fn begin_end_frame_without_rendering_is_a_no_op() {
    let Some(device) = test_device() else { return };
    let mut renderer = device.create_renderer(None).unwrap();

    for _ in 0..3 {
        renderer.begin_frame(ShaderParameters::default()).unwrap();
        renderer.end_frame().unwrap();
    }
}

#[test]
fn frame_number_cycles_through_the_frame_slots() {
    let Some(device) = test_device() else { return };
    let mut renderer = device.create_renderer(None).unwrap();

    assert_eq!(renderer.frame_number(), 0);
    renderer.begin_frame(ShaderParameters::default()).unwrap();
    assert_eq!(renderer.frame_number(), 1);
    renderer.end_frame().unwrap();
    renderer.begin_frame(ShaderParameters::default()).unwrap();
    assert_eq!(renderer.frame_number(), 0);
    renderer.end_frame().unwrap();
}

#[test]
fn texture_data_round_trips_through_the_device() {
    let Some(device) = test_device() else { return };
    let renderer = device.create_renderer(None).unwrap();

    let pixels: Vec<u8> = (0u8..16).collect();
    let texture = device
        .create_texture(
            TextureData {
                size: (2, 2),
                format: Format::Byte4Norm,
                mip_level_count: 1,
                sample_count: 1,
                sampler_state: Default::default(),
                pixels: pixels.clone(),
            },
            "RoundTrip",
        )
        .unwrap();

    let data = renderer.copy_texture_data(texture).get();
    assert_eq!(data.pixels, pixels);
}

#[test]
fn mipmap_generation_averages_the_top_level() {
    let Some(device) = test_device() else { return };
    let renderer = device.create_renderer(None).unwrap();

    let pixels = vec![
        0x80, 0x00, 0x00, 0x80, //
        0x00, 0x80, 0x00, 0x80, //
        0x80, 0x00, 0x80, 0x80, //
        0x00, 0x00, 0x80, 0x80,
    ];
    let texture = device
        .create_texture(
            TextureData {
                size: (2, 2),
                format: Format::Byte4Norm,
                mip_level_count: 2,
                sample_count: 1,
                sampler_state: Default::default(),
                pixels: pixels.clone(),
            },
            "Mipmapped",
        )
        .unwrap();

    let data = renderer.copy_texture_data(texture).get();
    let mut expected = pixels;
    expected.extend_from_slice(&[0x40, 0x20, 0x40, 0x80]);
    assert_eq!(data.pixels, expected);
}

#[test]
fn render_nothing_leaves_the_clear_color() {
    let Some(device) = test_device() else { return };
    let mut renderer = device.create_renderer(None).unwrap();

    renderer.begin_frame(ShaderParameters::default()).unwrap();
    let result = renderer
        .render_to_texture(
            &capture_color_target((2, 2)),
            RenderList {
                name: "ClearOnly".into(),
                clear_state: ClearState { color_value: Some([1.0, 0.0, 0.0, 1.0]), ..Default::default() },
                ..Default::default()
            },
        )
        .unwrap();
    renderer.end_frame().unwrap();

    let color = result.color_texture.expect("color capture requested");
    let data = renderer.copy_texture_data(color).get();
    assert_eq!(data.pixels, [0xff, 0x00, 0x00, 0xff].repeat(4));
}

#[test]
fn fullscreen_triangle_covers_every_pixel() {
    let Some(device) = test_device() else { return };
    let mut renderer = device.create_renderer(None).unwrap();

    let shader = compile_simple_shader(&device, ShaderVariableType::Vector2);
    let mesh = fullscreen_triangle_mesh(&device);
    let target = capture_color_target((2, 2));
    let pipeline = simple_pipeline(&device, shader, target.framebuffer_layout);

    renderer.begin_frame(ShaderParameters::default()).unwrap();
    let result = renderer
        .render_to_texture(
            &target,
            RenderList {
                name: "Fullscreen".into(),
                clear_state: ClearState { color_value: Some([0.0, 0.0, 0.0, 1.0]), ..Default::default() },
                objects: vec![RenderObject {
                    mesh,
                    pipeline,
                    material_parameters: None,
                    object_parameters: ShaderParameters::default(),
                }],
                ..Default::default()
            },
        )
        .unwrap();
    renderer.end_frame().unwrap();

    let color = result.color_texture.expect("color capture requested");
    let data = renderer.copy_texture_data(color).get();
    assert_eq!(data.pixels, vec![0xff; 16]);
}

#[test]
fn depth_only_pipeline_creation_succeeds() {
    let Some(device) = test_device() else { return };

    let shader = compile_simple_shader(&device, ShaderVariableType::Vector2);
    let layout = FramebufferLayout {
        color_format: None,
        depth_stencil_format: Some(Format::Depth16),
        sample_count: 1,
        capture_color: false,
        capture_depth_stencil: true,
    };
    let pipeline = simple_pipeline(&device, shader, layout);

    let desc = RenderPassDesc { framebuffer_layout: layout, render_overrides: RenderOverrides::default() };
    pipeline.with(|p| {
        assert_ne!(p.pipeline_for(&desc), ash::vk::Pipeline::null());
    });
}

#[test]
fn depth_only_render_captures_the_depth_buffer() {
    let Some(device) = test_device() else { return };
    let mut renderer = device.create_renderer(None).unwrap();

    let layout = FramebufferLayout {
        color_format: None,
        depth_stencil_format: Some(Format::Depth16),
        sample_count: 1,
        capture_color: false,
        capture_depth_stencil: true,
    };
    let shader = compile_simple_shader(&device, ShaderVariableType::Vector2);
    let mesh = fullscreen_triangle_mesh(&device);
    let pipeline = device
        .create_pipeline(PipelineData {
            shader,
            vertex_layout: VertexLayout {
                topology: PrimitiveTopology::TriangleList,
                buffer_bindings: vec![VertexBufferBinding {
                    binding: 0,
                    stride: 8,
                    vertex_class: VertexClass::PerVertex,
                }],
                attributes: vec![VertexAttribute {
                    name: "position".into(),
                    format: Format::Float2,
                    buffer_index: 0,
                    offset: 0,
                }],
            },
            render_states: RenderStates {
                raster_state: teide::RasterState { cull_mode: teide::CullMode::None, ..Default::default() },
                ..Default::default()
            },
            render_passes: vec![RenderPassDesc {
                framebuffer_layout: layout,
                render_overrides: RenderOverrides::default(),
            }],
        })
        .unwrap();

    renderer.begin_frame(ShaderParameters::default()).unwrap();
    let result = renderer
        .render_to_texture(
            &RenderTargetInfo { size: (2, 2), framebuffer_layout: layout, sampler_state: Default::default() },
            RenderList {
                name: "DepthOnly".into(),
                clear_state: ClearState { depth_value: Some(1.0), ..Default::default() },
                objects: vec![RenderObject {
                    mesh,
                    pipeline,
                    material_parameters: None,
                    object_parameters: ShaderParameters::default(),
                }],
                ..Default::default()
            },
        )
        .unwrap();
    renderer.end_frame().unwrap();

    assert!(result.color_texture.is_none());
    let depth = result.depth_stencil_texture.expect("depth capture requested");
    // The fullscreen triangle writes depth 0.0 over the 1.0 clear.
    let data = renderer.copy_texture_data(depth).get();
    assert_eq!(data.pixels, vec![0u8; 8]);
}

#[test]
fn pipeline_creation_for_multisampled_framebuffer() {
    let Some(device) = test_device() else { return };

    let shader = compile_simple_shader(&device, ShaderVariableType::Vector3);
    let layout = FramebufferLayout {
        color_format: Some(Format::Byte4Srgb),
        depth_stencil_format: Some(Format::Depth16),
        sample_count: 2,
        capture_color: false,
        capture_depth_stencil: false,
    };
    let pipeline = device
        .create_pipeline(PipelineData {
            shader,
            vertex_layout: VertexLayout {
                topology: PrimitiveTopology::TriangleList,
                buffer_bindings: vec![VertexBufferBinding {
                    binding: 0,
                    stride: 12,
                    vertex_class: VertexClass::PerVertex,
                }],
                attributes: vec![VertexAttribute {
                    name: "position".into(),
                    format: Format::Float3,
                    buffer_index: 0,
                    offset: 0,
                }],
            },
            render_states: RenderStates::default(),
            render_passes: vec![RenderPassDesc {
                framebuffer_layout: layout,
                render_overrides: RenderOverrides::default(),
            }],
        })
        .unwrap();

    let desc = RenderPassDesc { framebuffer_layout: layout, render_overrides: RenderOverrides::default() };
    pipeline.with(|p| {
        assert_ne!(p.pipeline_for(&desc), ash::vk::Pipeline::null());
    });
}
