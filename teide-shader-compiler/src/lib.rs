//! The shader front-end: declarative [`ShaderSourceData`] in, SPIR-V plus
//! layout reflection out.
//!
//! Binding declarations for the four parameter blocks (sets 0..3) and the
//! per-stage varyings are generated from the declarative description and
//! prepended to the user's stage source; the result is compiled and
//! validated with naga. Reflection folds each uniform block's observed
//! stage usage back into the matching parameter-block description.

mod glsl;

use log::debug;
use teide::{
    CompileError, KernelData, ParameterBlockDesc, ShaderData, ShaderLanguage, ShaderSourceData,
    ShaderStageData, ShaderStageFlags,
};

fn parse_stage(source: &str, stage: naga::ShaderStage) -> Result<naga::Module, CompileError> {
    let mut frontend = naga::front::glsl::Frontend::default();
    let options = naga::front::glsl::Options::from(stage);
    frontend.parse(&options, source).map_err(|errors| CompileError(errors.emit_to_string(source)))
}

fn validate(module: &naga::Module, source: &str) -> Result<naga::valid::ModuleInfo, CompileError> {
    let mut validator =
        naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::all());
    validator.validate(module).map_err(|error| CompileError(error.emit_to_string(source)))
}

fn write_spirv(module: &naga::Module, info: &naga::valid::ModuleInfo) -> Result<Vec<u32>, CompileError> {
    let options = naga::back::spv::Options::default();
    naga::back::spv::write_vec(module, info, &options, None)
        .map_err(|error| CompileError(error.to_string()))
}

/// Folds the stage's usage of each parameter block's uniforms into the
/// block descriptions, mirroring what link-time reflection reports: a
/// stage counts only if its entry point actually reads the block.
fn reflect_uniform_stages(
    module: &naga::Module,
    info: &naga::valid::ModuleInfo,
    stage: ShaderStageFlags,
    pblocks: &mut [&mut ParameterBlockDesc; 4],
    used: &mut [bool; 4],
) {
    if module.entry_points.is_empty() {
        return;
    }
    let entry_info = info.get_entry_point(0);

    for (handle, variable) in module.global_variables.iter() {
        if entry_info[handle].is_empty() {
            continue;
        }
        let set = match variable.space {
            naga::AddressSpace::Immediate => 3,
            naga::AddressSpace::Uniform => match &variable.binding {
                Some(binding) if binding.binding == 0 && binding.group < 4 => binding.group,
                _ => continue,
            },
            _ => continue,
        };
        let set = set as usize;
        if !used[set] {
            // First stage seen using this block replaces the default mask.
            pblocks[set].uniforms_stages = ShaderStageFlags::empty();
            used[set] = true;
        }
        pblocks[set].uniforms_stages |= stage;
    }
}

fn compile_stages(
    data: &mut ShaderData,
    vertex_source: &str,
    pixel_source: &str,
) -> Result<(), CompileError> {
    let vertex_module = parse_stage(vertex_source, naga::ShaderStage::Vertex)?;
    let vertex_info = validate(&vertex_module, vertex_source)?;
    let pixel_module = parse_stage(pixel_source, naga::ShaderStage::Fragment)?;
    let pixel_info = validate(&pixel_module, pixel_source)?;

    data.vertex_shader.spirv = write_spirv(&vertex_module, &vertex_info)?;
    data.pixel_shader.spirv = write_spirv(&pixel_module, &pixel_info)?;

    let mut used = [false; 4];
    {
        let mut pblocks = [
            &mut data.environment.scene_pblock,
            &mut data.environment.view_pblock,
            &mut data.material_pblock,
            &mut data.object_pblock,
        ];
        reflect_uniform_stages(&vertex_module, &vertex_info, ShaderStageFlags::VERTEX, &mut pblocks, &mut used);
        reflect_uniform_stages(&pixel_module, &pixel_info, ShaderStageFlags::PIXEL, &mut pblocks, &mut used);
    }
    Ok(())
}

/// Compiles a declarative shader source into SPIR-V stages with their
/// parameter-block layouts resolved.
pub fn compile_shader(source_data: &ShaderSourceData) -> Result<ShaderData, CompileError> {
    if source_data.language == ShaderLanguage::Hlsl {
        return Err(CompileError("the HLSL front-end is not supported by this build".into()));
    }

    let mut data = ShaderData {
        environment: source_data.environment.clone(),
        material_pblock: source_data.material_pblock.clone(),
        object_pblock: source_data.object_pblock.clone(),
        vertex_shader: ShaderStageData::default(),
        pixel_shader: ShaderStageData::default(),
    };

    let mut parameters = String::new();
    glsl::build_bindings(&mut parameters, &source_data.environment.scene_pblock, 0);
    glsl::build_bindings(&mut parameters, &source_data.environment.view_pblock, 1);
    glsl::build_bindings(&mut parameters, &source_data.material_pblock, 2);
    glsl::build_bindings(&mut parameters, &source_data.object_pblock, 3);

    let mut vertex_source = format!("{}\n{}", glsl::SHADER_COMMON, parameters);
    glsl::build_varyings(&mut vertex_source, &mut data.vertex_shader, &source_data.vertex_shader);
    vertex_source.push_str(&source_data.vertex_shader.source);

    let mut pixel_source = format!("{}\n{}", glsl::SHADER_COMMON, parameters);
    glsl::build_varyings(&mut pixel_source, &mut data.pixel_shader, &source_data.pixel_shader);
    pixel_source.push_str(&source_data.pixel_shader.source);

    debug!("Compiling vertex stage:\n{vertex_source}");
    debug!("Compiling pixel stage:\n{pixel_source}");
    compile_stages(&mut data, &vertex_source, &pixel_source)?;
    Ok(data)
}

/// Compiles a compute kernel. The parameter block is bound as set 0.
pub fn compile_kernel(
    compute_source: &str,
    params_pblock: &ParameterBlockDesc,
) -> Result<KernelData, CompileError> {
    let mut source = String::from(glsl::SHADER_COMMON);
    source.push('\n');
    glsl::build_bindings(&mut source, params_pblock, 0);
    source.push_str(compute_source);

    let module = parse_stage(&source, naga::ShaderStage::Compute)?;
    let info = validate(&module, &source)?;
    let spirv = write_spirv(&module, &info)?;

    Ok(KernelData {
        compute_shader: ShaderStageData { spirv, inputs: Vec::new(), outputs: Vec::new() },
        params_pblock: params_pblock.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use teide::{
        ShaderEnvironmentData, ShaderStageDefinition, ShaderVariable, ShaderVariableType,
    };

    fn simple_shader_source() -> ShaderSourceData {
        ShaderSourceData {
            language: ShaderLanguage::Glsl,
            environment: ShaderEnvironmentData::default(),
            material_pblock: ParameterBlockDesc::default(),
            object_pblock: ParameterBlockDesc::default(),
            vertex_shader: ShaderStageDefinition {
                inputs: vec![ShaderVariable::new("position", ShaderVariableType::Vector2)],
                outputs: vec![ShaderVariable::new("gl_Position", ShaderVariableType::Vector4)],
                source: "void main() {\n    gl_Position = vec4(position, 0.0, 1.0);\n}\n".into(),
            },
            pixel_shader: ShaderStageDefinition {
                inputs: vec![],
                outputs: vec![ShaderVariable::new("outColor", ShaderVariableType::Vector4)],
                source: "void main() {\n    outColor = vec4(1.0);\n}\n".into(),
            },
        }
    }

    #[test]
    fn compiles_simple_shader_to_spirv() {
        let data = compile_shader(&simple_shader_source()).unwrap();
        const SPIRV_MAGIC: u32 = 0x0723_0203;
        assert_eq!(data.vertex_shader.spirv[0], SPIRV_MAGIC);
        assert_eq!(data.pixel_shader.spirv[0], SPIRV_MAGIC);
        assert_eq!(data.vertex_shader.inputs.len(), 1);
        assert_eq!(data.vertex_shader.inputs[0].name, "position");
        // The builtin output is not part of the varying list.
        assert!(data.vertex_shader.outputs.is_empty());
    }

    #[test]
    fn reflection_narrows_uniform_stages() {
        let mut source = simple_shader_source();
        source.environment.scene_pblock = ParameterBlockDesc {
            parameters: vec![ShaderVariable::new("tint", ShaderVariableType::Vector4)],
            ..Default::default()
        };
        source.pixel_shader.source = "void main() {\n    outColor = scene.tint;\n}\n".into();

        let data = compile_shader(&source).unwrap();
        assert_eq!(data.environment.scene_pblock.uniforms_stages, ShaderStageFlags::PIXEL);
    }

    #[test]
    fn compile_errors_carry_the_log() {
        let mut source = simple_shader_source();
        source.vertex_shader.source = "void main() {\n    gl_Position = not_a_thing;\n}\n".into();
        let error = compile_shader(&source).unwrap_err();
        assert!(!error.0.is_empty());
    }

    #[test]
    fn hlsl_is_rejected() {
        let mut source = simple_shader_source();
        source.language = ShaderLanguage::Hlsl;
        assert!(compile_shader(&source).is_err());
    }
}
