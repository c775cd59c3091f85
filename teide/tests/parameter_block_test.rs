mod common;

use common::test_device;
use teide::{
    DevicePtr, ParameterBlockData, ResourceLifetime, Shader, ShaderParameters, ShaderVariable,
    ShaderVariableType,
};
use teide_shader_compiler::compile_shader;

fn compile_object_shader(device: &DevicePtr) -> Shader {
    let source = teide::ShaderSourceData {
        language: teide::ShaderLanguage::Glsl,
        environment: Default::default(),
        material_pblock: teide::ParameterBlockDesc {
            parameters: vec![ShaderVariable::new("tint", ShaderVariableType::Vector4)],
            ..Default::default()
        },
        object_pblock: teide::ParameterBlockDesc {
            parameters: vec![ShaderVariable::new("model", ShaderVariableType::Matrix4)],
            ..Default::default()
        },
        vertex_shader: teide::ShaderStageDefinition {
            inputs: vec![ShaderVariable::new("position", ShaderVariableType::Vector2)],
            outputs: vec![ShaderVariable::new("gl_Position", ShaderVariableType::Vector4)],
            source: "void main() {\n    gl_Position = object.model * vec4(position, 0.0, 1.0);\n}\n"
                .into(),
        },
        pixel_shader: teide::ShaderStageDefinition {
            inputs: vec![],
            outputs: vec![ShaderVariable::new("outColor", ShaderVariableType::Vector4)],
            source: "void main() {\n    outColor = material.tint;\n}\n".into(),
        },
    };
    let data = compile_shader(&source).unwrap();
    device.create_shader(&data, "ObjectShader").unwrap()
}

#[test]
fn material_blocks_are_uniform_buffer_backed() {
    let Some(device) = test_device() else { return };
    let shader = compile_object_shader(&device);

    let layout = shader.with(|s| s.material_pblock_layout());
    assert!(!layout.is_empty());

    let block = device
        .create_parameter_block(
            ParameterBlockData {
                layout,
                lifetime: ResourceLifetime::Permanent,
                parameters: ShaderParameters {
                    uniform_data: vec![0u8; 16],
                    textures: Vec::new(),
                },
            },
            "Material",
        )
        .unwrap();
    block.with(|b| {
        assert_eq!(b.uniform_buffer_size(), 16);
        assert_eq!(b.push_constant_size(), 0);
        assert!(b.descriptor_set().is_some());
    });
}

#[test]
fn small_object_blocks_are_push_constant_backed() {
    let Some(device) = test_device() else { return };
    let shader = compile_object_shader(&device);

    let layout = shader.with(|s| s.object_pblock_layout());
    assert!(layout.has_push_constants());

    let block = device
        .create_parameter_block(
            ParameterBlockData {
                layout,
                lifetime: ResourceLifetime::Transient,
                parameters: ShaderParameters {
                    uniform_data: vec![0u8; 64],
                    textures: Vec::new(),
                },
            },
            "Object",
        )
        .unwrap();
    block.with(|b| {
        assert_eq!(b.uniform_buffer_size(), 0);
        assert_eq!(b.push_constant_size(), 64);
        assert!(b.descriptor_set().is_none());
    });
}

#[test]
fn uniform_data_shorter_than_the_layout_is_zero_padded() {
    let Some(device) = test_device() else { return };
    let shader = compile_object_shader(&device);

    let layout = shader.with(|s| s.material_pblock_layout());
    let block = device
        .create_parameter_block(
            ParameterBlockData {
                layout,
                lifetime: ResourceLifetime::Permanent,
                parameters: ShaderParameters { uniform_data: vec![1u8; 4], textures: Vec::new() },
            },
            "ShortMaterial",
        )
        .unwrap();
    // Padded up to the full std430 size of the block.
    assert_eq!(block.with(|b| b.uniform_buffer_size()), 16);
}
