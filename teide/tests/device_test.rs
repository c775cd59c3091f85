mod common;

use common::test_device;
use teide::{
    Aabb, BufferData, BufferUsage, ClearState, Format, FramebufferLayout, MeshData, ParameterBlockData,
    PrimitiveTopology, ResourceLifetime, ShaderParameters, TextureData, VertexAttribute,
    VertexBufferBinding, VertexClass, VertexLayout,
};

#[test]
fn create_buffer_reports_its_size() {
    let Some(device) = test_device() else { return };

    let data = BufferData::new(BufferUsage::Vertex, ResourceLifetime::Permanent, vec![1u8, 2, 3, 4]);
    let buffer = device.create_buffer(data, "TestBuffer").unwrap();
    assert_eq!(buffer.with(|b| b.size()), 4);
}

#[test]
fn created_handles_are_distinct_and_stable() {
    let Some(device) = test_device() else { return };

    let a = device
        .create_buffer(BufferData::new(BufferUsage::Generic, ResourceLifetime::Permanent, vec![0u8; 8]), "A")
        .unwrap();
    let b = device
        .create_buffer(BufferData::new(BufferUsage::Generic, ResourceLifetime::Permanent, vec![0u8; 16]), "B")
        .unwrap();
    assert_ne!(a, b);
    assert_eq!(a.with(|buffer| buffer.size()), 8);
    assert_eq!(b.with(|buffer| buffer.size()), 16);
}

#[test]
fn create_mesh_with_indices() {
    let Some(device) = test_device() else { return };

    let vertex_data: Vec<u8> =
        [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0].iter().flat_map(|f| f.to_le_bytes()).collect();
    let index_data: Vec<u8> = [0u16, 1, 2].iter().flat_map(|i| i.to_le_bytes()).collect();

    let data = MeshData {
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
        index_data,
        vertex_count: 3,
        aabb: Aabb::default(),
    };
    let mesh = device.create_mesh(data, "TestMesh").unwrap();

    mesh.with(|m| {
        assert_eq!(m.vertex_count, 3);
        assert_eq!(m.index_count, 3);
        assert!(m.index_buffer.is_some());
        assert!(m.vertex_buffer.size() > 0);
    });
}

#[test]
fn create_texture_reports_its_properties() {
    let Some(device) = test_device() else { return };

    let data = TextureData {
        size: (2, 2),
        format: Format::Byte4Srgb,
        mip_level_count: 1,
        sample_count: 1,
        sampler_state: Default::default(),
        pixels: vec![0xffu8; 16],
    };
    let texture = device.create_texture(data, "TestTexture").unwrap();
    texture.with(|t| {
        assert_eq!(t.size, (2, 2));
        assert_eq!(t.format, Format::Byte4Srgb);
        assert_eq!(t.mip_level_count, 1);
    });
}

#[test]
fn render_pass_cache_returns_the_same_object() {
    let Some(device) = test_device() else { return };

    let layout = FramebufferLayout {
        color_format: Some(Format::Byte4Srgb),
        depth_stencil_format: None,
        sample_count: 1,
        capture_color: true,
        capture_depth_stencil: false,
    };
    let clear_state = ClearState { color_value: Some([0.0, 0.0, 0.0, 1.0]), ..Default::default() };

    let first = device.create_render_pass(&layout, &clear_state).unwrap();
    let second = device.create_render_pass(&layout, &clear_state).unwrap();
    assert_eq!(first, second);

    // A different load configuration is a different render pass.
    let no_clear = device.create_render_pass(&layout, &ClearState::default()).unwrap();
    assert_ne!(first, no_clear);
}

#[test]
fn empty_parameter_block_has_no_descriptor_set() {
    let Some(device) = test_device() else { return };

    let environment = device
        .create_shader_environment(&Default::default(), "EmptyEnvironment")
        .unwrap();
    let layout = environment.with(|e| e.scene_pblock_layout.clone());
    assert!(layout.is_empty());

    let block = device
        .create_parameter_block(
            ParameterBlockData {
                layout,
                lifetime: ResourceLifetime::Permanent,
                parameters: ShaderParameters::default(),
            },
            "EmptyBlock",
        )
        .unwrap();
    block.with(|b| {
        assert!(b.descriptor_set().is_none());
        assert_eq!(b.uniform_buffer_size(), 0);
        assert_eq!(b.push_constant_size(), 0);
    });
}
