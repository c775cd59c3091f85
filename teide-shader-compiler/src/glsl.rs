//! GLSL source assembly from declarative shader definitions.

use std::fmt::Write as _;

use teide::{
    build_parameter_block_layout, ParameterBlockDesc, ShaderStageData, ShaderStageDefinition,
    ShaderVariableType,
};

pub(crate) const PBLOCK_NAMES: [&str; 4] = ["Scene", "View", "Material", "Object"];
const PBLOCK_NAMES_LOWER: [&str; 4] = ["scene", "view", "material", "object"];

/// Common preamble prepended to every stage: the target version and the
/// HLSL-style `mul` helpers.
pub(crate) const SHADER_COMMON: &str = "\
#version 450

vec4 mul(mat4 m, vec4 v) {
    return v * m;
}

mat4 mul(mat4 m1, mat4 m2) {
    return m2 * m1;
}
";

pub(crate) fn glsl_type_name(var_type: ShaderVariableType) -> &'static str {
    match var_type {
        ShaderVariableType::Float => "float",
        ShaderVariableType::Vector2 => "vec2",
        ShaderVariableType::Vector3 => "vec3",
        ShaderVariableType::Vector4 => "vec4",
        ShaderVariableType::Matrix4 => "mat4",
        ShaderVariableType::Texture2D => "sampler2D",
        ShaderVariableType::Texture2DShadow => "sampler2DShadow",
    }
}

fn build_uniform_block(source: &mut String, pblock: &ParameterBlockDesc, set: u32) {
    if pblock.parameters.iter().all(|p| p.var_type.is_resource()) {
        // No uniforms in this pblock.
        return;
    }

    if build_parameter_block_layout(pblock, set).is_push_constant {
        let _ = writeln!(source, "layout(push_constant) uniform {}Uniforms {{", PBLOCK_NAMES[set as usize]);
    } else {
        let _ = writeln!(
            source,
            "layout(set = {}, binding = 0) uniform {}Uniforms {{",
            set, PBLOCK_NAMES[set as usize]
        );
    }

    for variable in &pblock.parameters {
        if variable.var_type.is_resource() {
            continue;
        }
        let _ = writeln!(source, "    {} {};", glsl_type_name(variable.var_type), variable.name);
    }
    let _ = writeln!(source, "}} {};\n", PBLOCK_NAMES_LOWER[set as usize]);
}

fn build_resource_bindings(source: &mut String, pblock: &ParameterBlockDesc, set: u32) {
    if pblock.parameters.iter().all(|p| !p.var_type.is_resource()) {
        // No resources in this pblock.
        return;
    }

    let mut slot = 1;
    for parameter in &pblock.parameters {
        if parameter.var_type.is_resource() {
            let _ = writeln!(
                source,
                "layout(set = {}, binding = {}) uniform {} {};",
                set,
                slot,
                glsl_type_name(parameter.var_type),
                parameter.name
            );
            slot += 1;
        }
    }
    source.push('\n');
}

pub(crate) fn build_bindings(source: &mut String, pblock: &ParameterBlockDesc, set: u32) {
    build_uniform_block(source, pblock, set);
    build_resource_bindings(source, pblock, set);
}

/// Emits `layout(location = N)` declarations for a stage's inputs and
/// outputs, in declaration order. Identifiers beginning with `gl_` are
/// builtins: they get no declaration and are left out of the stage's input
/// list.
pub(crate) fn build_varyings(
    source: &mut String,
    data: &mut ShaderStageData,
    stage: &ShaderStageDefinition,
) {
    for (i, input) in stage.inputs.iter().enumerate() {
        if input.name.starts_with("gl_") {
            continue;
        }
        data.inputs.push(input.clone());
        let _ = writeln!(source, "layout(location = {}) in {} {};", i, glsl_type_name(input.var_type), input.name);
    }

    for (i, output) in stage.outputs.iter().enumerate() {
        if output.name.starts_with("gl_") {
            continue;
        }
        data.outputs.push(output.clone());
        let _ =
            writeln!(source, "layout(location = {}) out {} {};", i, glsl_type_name(output.var_type), output.name);
    }

    source.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use teide::{ShaderVariable, ShaderVariableType};

    fn pblock(vars: &[(&str, ShaderVariableType)]) -> ParameterBlockDesc {
        ParameterBlockDesc {
            parameters: vars.iter().map(|(name, t)| ShaderVariable::new(*name, *t)).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn uniform_block_uses_set_and_binding_zero() {
        let mut source = String::new();
        build_bindings(&mut source, &pblock(&[("lightDir", ShaderVariableType::Vector3)]), 0);
        assert!(source.contains("layout(set = 0, binding = 0) uniform SceneUniforms {"));
        assert!(source.contains("    vec3 lightDir;"));
        assert!(source.contains("} scene;"));
    }

    #[test]
    fn small_object_block_becomes_push_constant() {
        let mut source = String::new();
        build_bindings(&mut source, &pblock(&[("model", ShaderVariableType::Matrix4)]), 3);
        assert!(source.contains("layout(push_constant) uniform ObjectUniforms {"));
        assert!(!source.contains("set = 3, binding = 0"));
    }

    #[test]
    fn resources_bind_from_slot_one() {
        let mut source = String::new();
        let pblock = pblock(&[
            ("tint", ShaderVariableType::Vector4),
            ("baseColor", ShaderVariableType::Texture2D),
            ("shadowMap", ShaderVariableType::Texture2DShadow),
        ]);
        build_bindings(&mut source, &pblock, 2);
        assert!(source.contains("layout(set = 2, binding = 1) uniform sampler2D baseColor;"));
        assert!(source.contains("layout(set = 2, binding = 2) uniform sampler2DShadow shadowMap;"));
    }

    #[test]
    fn empty_pblock_emits_nothing() {
        let mut source = String::new();
        build_bindings(&mut source, &ParameterBlockDesc::default(), 1);
        assert!(source.is_empty());
    }

    #[test]
    fn varyings_skip_builtins_but_keep_locations() {
        let stage = ShaderStageDefinition {
            inputs: vec![ShaderVariable::new("position", ShaderVariableType::Vector3)],
            outputs: vec![
                ShaderVariable::new("gl_Position", ShaderVariableType::Vector4),
                ShaderVariable::new("texCoord", ShaderVariableType::Vector2),
            ],
            source: String::new(),
        };
        let mut data = ShaderStageData::default();
        let mut source = String::new();
        build_varyings(&mut source, &mut data, &stage);

        assert!(source.contains("layout(location = 0) in vec3 position;"));
        assert!(!source.contains("gl_Position"));
        // The skipped builtin still occupies its slot in the numbering.
        assert!(source.contains("layout(location = 1) out vec2 texCoord;"));
        assert_eq!(data.inputs.len(), 1);
        assert_eq!(data.outputs.len(), 1);
    }
}
