//! Shader modules, shader environments and compute kernels.

use std::sync::Arc;

use ash::vk;

use crate::error::Result;
use crate::shader_data::{
    build_parameter_block_layout, KernelData, ParameterBlockDesc, ShaderData, ShaderEnvironmentData,
    ShaderVariable,
};
use crate::vulkan::parameter_block::VulkanParameterBlockLayout;

fn create_shader_module(device: &ash::Device, spirv: &[u32]) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::default().code(spirv);
    Ok(unsafe { device.create_shader_module(&create_info, None)? })
}

pub(crate) fn create_pblock_layout(
    device: &ash::Device,
    desc: &ParameterBlockDesc,
    set: u32,
) -> Result<Arc<VulkanParameterBlockLayout>> {
    let data = build_parameter_block_layout(desc, set);
    Ok(Arc::new(VulkanParameterBlockLayout::new(data, device)?))
}

/// A compiled shader pair with its four parameter-block layouts and the
/// pipeline layout derived from them.
pub struct VulkanShader {
    device: ash::Device,
    pub vertex_shader: vk::ShaderModule,
    pub pixel_shader: vk::ShaderModule,
    pub vertex_shader_inputs: Vec<ShaderVariable>,
    pub scene_pblock_layout: Arc<VulkanParameterBlockLayout>,
    pub view_pblock_layout: Arc<VulkanParameterBlockLayout>,
    pub material_pblock_layout: Arc<VulkanParameterBlockLayout>,
    pub object_pblock_layout: Arc<VulkanParameterBlockLayout>,
    pub pipeline_layout: vk::PipelineLayout,
}

impl VulkanShader {
    pub(crate) fn new(device: &ash::Device, data: &ShaderData) -> Result<Self> {
        let scene_pblock_layout = create_pblock_layout(device, &data.environment.scene_pblock, 0)?;
        let view_pblock_layout = create_pblock_layout(device, &data.environment.view_pblock, 1)?;
        let material_pblock_layout = create_pblock_layout(device, &data.material_pblock, 2)?;
        let object_pblock_layout = create_pblock_layout(device, &data.object_pblock, 3)?;

        let pipeline_layout = create_graphics_pipeline_layout(
            device,
            &[&scene_pblock_layout, &view_pblock_layout, &material_pblock_layout, &object_pblock_layout],
        )?;

        Ok(Self {
            device: device.clone(),
            vertex_shader: create_shader_module(device, &data.vertex_shader.spirv)?,
            pixel_shader: create_shader_module(device, &data.pixel_shader.spirv)?,
            vertex_shader_inputs: data.vertex_shader.inputs.clone(),
            scene_pblock_layout,
            view_pblock_layout,
            material_pblock_layout,
            object_pblock_layout,
            pipeline_layout,
        })
    }

    /// Location of a named vertex input, by position in the input list.
    pub fn attribute_location(&self, name: &str) -> Option<u32> {
        self.vertex_shader_inputs.iter().position(|v| v.name == name).map(|i| i as u32)
    }

    pub fn material_pblock_layout(&self) -> Arc<VulkanParameterBlockLayout> {
        Arc::clone(&self.material_pblock_layout)
    }

    pub fn object_pblock_layout(&self) -> Arc<VulkanParameterBlockLayout> {
        Arc::clone(&self.object_pblock_layout)
    }
}

impl Drop for VulkanShader {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline_layout(self.pipeline_layout, None);
            self.device.destroy_shader_module(self.vertex_shader, None);
            self.device.destroy_shader_module(self.pixel_shader, None);
        }
    }
}

impl std::fmt::Debug for VulkanShader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanShader").finish_non_exhaustive()
    }
}

/// Descriptor-set layouts for the sets present in the shader, in set order,
/// plus the object push-constant range if the object layout selected one.
fn create_graphics_pipeline_layout(
    device: &ash::Device,
    pblock_layouts: &[&Arc<VulkanParameterBlockLayout>; 4],
) -> Result<vk::PipelineLayout> {
    let set_layouts: Vec<vk::DescriptorSetLayout> =
        pblock_layouts.iter().filter_map(|layout| layout.set_layout).collect();

    let push_constant_ranges: Vec<vk::PushConstantRange> =
        pblock_layouts[3].push_constant_range.into_iter().collect();

    let create_info = vk::PipelineLayoutCreateInfo::default()
        .set_layouts(&set_layouts)
        .push_constant_ranges(&push_constant_ranges);
    Ok(unsafe { device.create_pipeline_layout(&create_info, None)? })
}

/// The Scene and View parameter-block layouts shared by all shaders used in
/// one renderer.
pub struct VulkanShaderEnvironment {
    pub scene_pblock_layout: Arc<VulkanParameterBlockLayout>,
    pub view_pblock_layout: Arc<VulkanParameterBlockLayout>,
}

impl VulkanShaderEnvironment {
    pub(crate) fn new(device: &ash::Device, data: &ShaderEnvironmentData) -> Result<Self> {
        Ok(Self {
            scene_pblock_layout: create_pblock_layout(device, &data.scene_pblock, 0)?,
            view_pblock_layout: create_pblock_layout(device, &data.view_pblock, 1)?,
        })
    }
}

impl std::fmt::Debug for VulkanShaderEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanShaderEnvironment").finish_non_exhaustive()
    }
}

/// A compute kernel: shader module, parameter layout and compute pipeline.
pub struct VulkanKernel {
    device: ash::Device,
    pub compute_shader: vk::ShaderModule,
    pub params_pblock_layout: Arc<VulkanParameterBlockLayout>,
    pub pipeline_layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
}

impl VulkanKernel {
    pub(crate) fn new(device: &ash::Device, data: &KernelData) -> Result<Self> {
        let params_pblock_layout = create_pblock_layout(device, &data.params_pblock, 0)?;
        let compute_shader = create_shader_module(device, &data.compute_shader.spirv)?;

        let set_layouts: Vec<vk::DescriptorSetLayout> =
            params_pblock_layout.set_layout.into_iter().collect();
        let layout_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
        let pipeline_layout = unsafe { device.create_pipeline_layout(&layout_info, None)? };

        let entry_point = c"main";
        let stage = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(compute_shader)
            .name(entry_point);
        let create_info =
            vk::ComputePipelineCreateInfo::default().stage(stage).layout(pipeline_layout);
        let pipelines = unsafe {
            device
                .create_compute_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, result)| result)?
        };

        Ok(Self {
            device: device.clone(),
            compute_shader,
            params_pblock_layout,
            pipeline_layout,
            pipeline: pipelines[0],
        })
    }
}

impl Drop for VulkanKernel {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.pipeline_layout, None);
            self.device.destroy_shader_module(self.compute_shader, None);
        }
    }
}

impl std::fmt::Debug for VulkanKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanKernel").finish_non_exhaustive()
    }
}
