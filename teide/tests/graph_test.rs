mod common;

use common::test_device;
use teide::{
    ClearState, Format, FramebufferLayout, RenderGraph, RenderList, RenderTargetInfo, TextureData,
};

fn render_target(size: (u32, u32)) -> RenderTargetInfo {
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
fn graph_renders_and_reads_back_in_dependency_order() {
    let Some(device) = test_device() else { return };

    let texture = device
        .create_renderable_texture(
            TextureData {
                size: (2, 2),
                format: Format::Byte4Srgb,
                mip_level_count: 1,
                sample_count: 1,
                sampler_state: Default::default(),
                pixels: Vec::new(),
            },
            "GraphColor",
        )
        .unwrap();

    let mut graph = RenderGraph::new();
    let color = graph.add_texture("color", texture);
    let readback = graph.add_texture_data("readback", TextureData::default());
    graph.add_render_node(
        RenderList {
            name: "GraphClear".into(),
            clear_state: ClearState { color_value: Some([0.0, 1.0, 0.0, 1.0]), ..Default::default() },
            ..Default::default()
        },
        render_target((2, 2)),
        Some(color),
        None,
    );
    graph.add_copy_node(color, readback);

    let dot = graph.to_dot();
    assert!(dot.contains("digraph RenderGraph"));
    assert!(dot.contains("render0 -> texture0"));
    assert!(dot.contains("texture0 -> copy0"));

    let results = graph.execute(&device).unwrap();
    device.scheduler().wait_for_gpu();

    assert_eq!(results.len(), 1);
    let (name, task) = &results[0];
    assert_eq!(name, "readback");
    let data = task.get();
    assert_eq!(data.pixels, [0x00, 0xff, 0x00, 0xff].repeat(4));
}

#[test]
fn graph_visualization_lists_every_node_kind() {
    let Some(device) = test_device() else { return };

    let texture = device
        .create_renderable_texture(
            TextureData {
                size: (1, 1),
                format: Format::Byte4Srgb,
                mip_level_count: 1,
                sample_count: 1,
                sampler_state: Default::default(),
                pixels: Vec::new(),
            },
            "DotTexture",
        )
        .unwrap();

    let mut graph = RenderGraph::new();
    let color = graph.add_texture("color", texture);
    graph.add_render_node(
        RenderList { name: "DotRender".into(), ..Default::default() },
        render_target((1, 1)),
        Some(color),
        None,
    );

    let dot = graph.to_dot();
    assert!(dot.contains("texture0 [label=\"color\""));
    assert!(dot.contains("render0 [label=\"render: DotRender\""));
}
