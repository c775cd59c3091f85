//! Declarative shader interfaces and parameter-block layout derivation.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStageFlags: u32 {
        const VERTEX = 1 << 0;
        const PIXEL = 1 << 1;
    }
}

impl Default for ShaderStageFlags {
    fn default() -> Self {
        ShaderStageFlags::VERTEX | ShaderStageFlags::PIXEL
    }
}

/// Type of a shader-visible variable: a uniform value or a resource binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderVariableType {
    Float,
    Vector2,
    Vector3,
    Vector4,
    Matrix4,
    Texture2D,
    Texture2DShadow,
}

impl ShaderVariableType {
    /// Resource types occupy descriptor bindings; the rest are packed into
    /// the block's uniform data.
    pub fn is_resource(self) -> bool {
        matches!(self, ShaderVariableType::Texture2D | ShaderVariableType::Texture2DShadow)
    }

    /// Size in bytes under std430 rules, with three-component vectors
    /// rounded up to a full four-component slot.
    pub fn uniform_size(self) -> u32 {
        match self {
            ShaderVariableType::Float => 4,
            ShaderVariableType::Vector2 => 8,
            ShaderVariableType::Vector3 | ShaderVariableType::Vector4 => 16,
            ShaderVariableType::Matrix4 => 64,
            ShaderVariableType::Texture2D | ShaderVariableType::Texture2DShadow => 0,
        }
    }

    fn uniform_alignment(self) -> u32 {
        match self {
            ShaderVariableType::Float => 4,
            ShaderVariableType::Vector2 => 8,
            ShaderVariableType::Vector3 | ShaderVariableType::Vector4 | ShaderVariableType::Matrix4 => 16,
            ShaderVariableType::Texture2D | ShaderVariableType::Texture2DShadow => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderVariable {
    pub name: String,
    pub var_type: ShaderVariableType,
}

impl ShaderVariable {
    pub fn new(name: impl Into<String>, var_type: ShaderVariableType) -> Self {
        Self { name: name.into(), var_type }
    }
}

/// Declarative description of one parameter block: its variables plus the
/// shader stages that read its uniform data (filled in by reflection).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterBlockDesc {
    pub parameters: Vec<ShaderVariable>,
    pub uniforms_stages: ShaderStageFlags,
}

/// Derived layout of a parameter block, before any device objects exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParameterBlockLayoutData {
    pub uniforms_size: u32,
    pub texture_count: u32,
    pub is_push_constant: bool,
    pub uniforms_stages: ShaderStageFlags,
}

/// Object parameters at or below this size are recorded as push constants
/// instead of a uniform buffer. 128 bytes is the smallest push-constant
/// capacity Vulkan guarantees.
pub const PUSH_CONSTANT_SIZE_LIMIT: u32 = 128;

/// The descriptor-set index of the object parameter block, the only set
/// eligible for push constants.
pub const OBJECT_PBLOCK_SET: u32 = 3;

fn align_to(offset: u32, alignment: u32) -> u32 {
    (offset + alignment - 1) / alignment * alignment
}

/// Derives uniform size (std430 packing), texture count and the
/// push-constant decision for the given set index.
pub fn build_parameter_block_layout(desc: &ParameterBlockDesc, set: u32) -> ParameterBlockLayoutData {
    let mut uniforms_size = 0u32;
    let mut texture_count = 0u32;

    for parameter in &desc.parameters {
        if parameter.var_type.is_resource() {
            texture_count += 1;
        } else {
            uniforms_size = align_to(uniforms_size, parameter.var_type.uniform_alignment());
            uniforms_size += parameter.var_type.uniform_size();
        }
    }

    let is_push_constant =
        set == OBJECT_PBLOCK_SET && uniforms_size > 0 && uniforms_size <= PUSH_CONSTANT_SIZE_LIMIT;

    ParameterBlockLayoutData {
        uniforms_size,
        texture_count,
        is_push_constant,
        uniforms_stages: desc.uniforms_stages,
    }
}

/// The Scene and View parameter-block layouts shared by every shader used
/// with one renderer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShaderEnvironmentData {
    pub scene_pblock: ParameterBlockDesc,
    pub view_pblock: ParameterBlockDesc,
}

/// One compiled shader stage: SPIR-V words plus its input/output variables.
#[derive(Debug, Clone, Default)]
pub struct ShaderStageData {
    pub spirv: Vec<u32>,
    pub inputs: Vec<ShaderVariable>,
    pub outputs: Vec<ShaderVariable>,
}

/// A compiled shader ready for device creation.
#[derive(Debug, Clone, Default)]
pub struct ShaderData {
    pub environment: ShaderEnvironmentData,
    pub material_pblock: ParameterBlockDesc,
    pub object_pblock: ParameterBlockDesc,
    pub vertex_shader: ShaderStageData,
    pub pixel_shader: ShaderStageData,
}

/// A compiled compute kernel.
#[derive(Debug, Clone, Default)]
pub struct KernelData {
    pub compute_shader: ShaderStageData,
    pub params_pblock: ParameterBlockDesc,
}

// --- Declarative shader sources (input to the shader compiler) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShaderLanguage {
    #[default]
    Glsl,
    Hlsl,
}

/// One stage of a shader source: varyings plus the stage's function body.
/// Outputs whose names begin with `gl_` are builtins and get no varying
/// declaration.
#[derive(Debug, Clone, Default)]
pub struct ShaderStageDefinition {
    pub inputs: Vec<ShaderVariable>,
    pub outputs: Vec<ShaderVariable>,
    pub source: String,
}

#[derive(Debug, Clone, Default)]
pub struct ShaderSourceData {
    pub language: ShaderLanguage,
    pub environment: ShaderEnvironmentData,
    pub material_pblock: ParameterBlockDesc,
    pub object_pblock: ParameterBlockDesc,
    pub vertex_shader: ShaderStageDefinition,
    pub pixel_shader: ShaderStageDefinition,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(types: &[ShaderVariableType]) -> ParameterBlockDesc {
        ParameterBlockDesc {
            parameters: types
                .iter()
                .enumerate()
                .map(|(i, &t)| ShaderVariable::new(format!("param{i}"), t))
                .collect(),
            uniforms_stages: ShaderStageFlags::default(),
        }
    }

    #[test]
    fn empty_block_has_no_uniforms_or_textures() {
        let layout = build_parameter_block_layout(&ParameterBlockDesc::default(), 2);
        assert_eq!(layout.uniforms_size, 0);
        assert_eq!(layout.texture_count, 0);
        assert!(!layout.is_push_constant);
    }

    #[test]
    fn std430_packing() {
        use ShaderVariableType::*;
        assert_eq!(build_parameter_block_layout(&desc(&[Float]), 2).uniforms_size, 4);
        assert_eq!(build_parameter_block_layout(&desc(&[Vector3]), 2).uniforms_size, 16);
        assert_eq!(build_parameter_block_layout(&desc(&[Matrix4]), 2).uniforms_size, 64);
        // float then vec4: the vec4 is aligned up to offset 16.
        assert_eq!(build_parameter_block_layout(&desc(&[Float, Vector4]), 2).uniforms_size, 32);
        // two floats pack tightly.
        assert_eq!(build_parameter_block_layout(&desc(&[Float, Float]), 2).uniforms_size, 8);
    }

    #[test]
    fn textures_count_separately_from_uniforms() {
        use ShaderVariableType::*;
        let layout = build_parameter_block_layout(&desc(&[Vector4, Texture2D, Texture2DShadow]), 2);
        assert_eq!(layout.uniforms_size, 16);
        assert_eq!(layout.texture_count, 2);
    }

    #[test]
    fn push_constants_only_for_small_object_blocks() {
        use ShaderVariableType::*;
        // 64 bytes in set 3: push constants.
        let small = build_parameter_block_layout(&desc(&[Matrix4]), OBJECT_PBLOCK_SET);
        assert!(small.is_push_constant);
        // 192 bytes exceed the limit: regular uniform buffer.
        let large = build_parameter_block_layout(&desc(&[Matrix4, Matrix4, Matrix4]), OBJECT_PBLOCK_SET);
        assert!(!large.is_push_constant);
        // Exactly at the limit still qualifies.
        let at_limit = build_parameter_block_layout(&desc(&[Matrix4, Matrix4]), OBJECT_PBLOCK_SET);
        assert_eq!(at_limit.uniforms_size, PUSH_CONSTANT_SIZE_LIMIT);
        assert!(at_limit.is_push_constant);
        // Material blocks never use push constants.
        let material = build_parameter_block_layout(&desc(&[Matrix4]), 2);
        assert!(!material.is_push_constant);
    }
}
