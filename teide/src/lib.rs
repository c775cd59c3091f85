//! Teide: a low-level graphics runtime on Vulkan.
//!
//! Applications describe shaders, pipelines, meshes, textures and render
//! lists; the runtime compiles, schedules and executes the rendering work
//! on windows or offscreen render targets while coordinating CPU worker
//! threads and GPU queues.
//!
//! Resources are owned by reference-counted [`Handle`]s returned from the
//! device's `create_*` operations. Rendering goes through a [`Renderer`]:
//! `begin_frame`, any number of `render_to_texture` / `render_to_surface`
//! calls, then `end_frame`.

pub mod buffer_data;
pub mod error;
pub mod executor;
pub mod format;
pub mod handle;
pub mod mesh_data;
pub mod pipeline_data;
pub mod render_list;
pub mod shader_data;
pub mod sync_util;
pub mod task;
pub mod texture_data;
pub mod vulkan;

pub use buffer_data::{BufferData, BufferUsage, ResourceLifetime};
pub use error::{CompileError, Error, Result};
pub use executor::{Scheduler, MAX_FRAMES_IN_FLIGHT};
pub use format::{get_format_element_size, Format};
pub use handle::{Handle, ResourceRegistry};
pub use mesh_data::{
    Aabb, MeshData, PrimitiveTopology, VertexAttribute, VertexBufferBinding, VertexClass, VertexLayout,
};
pub use pipeline_data::{
    BlendFactor, BlendFunc, BlendOp, BlendState, ColorMask, CullMode, DepthState, FillMode,
    FramebufferLayout, RasterState, RenderOverrides, RenderPassDesc, RenderStates,
};
pub use render_list::{
    ClearState, Color, RenderList, RenderObject, RenderTargetInfo, RenderToTextureResult, ScissorRect,
    ShaderParameters, ViewportRegion,
};
pub use shader_data::{
    build_parameter_block_layout, KernelData, ParameterBlockDesc, ParameterBlockLayoutData, ShaderData,
    ShaderEnvironmentData, ShaderLanguage, ShaderSourceData, ShaderStageData, ShaderStageDefinition,
    ShaderStageFlags, ShaderVariable, ShaderVariableType, OBJECT_PBLOCK_SET, PUSH_CONSTANT_SIZE_LIMIT,
};
pub use task::{make_promise, ready_task, Promise, Task};
pub use texture_data::{
    get_byte_size, CompareOp, Filter, MipmapMode, SamplerAddressMode, SamplerState, TextureData,
};

pub use vulkan::device::{create_headless_device, DeviceSettings, VulkanDevice};
#[cfg(feature = "window")]
pub use vulkan::device::create_device_and_surface;
pub use vulkan::enable_software_rendering;
pub use vulkan::graph::RenderGraph;
pub use vulkan::parameter_block::ParameterBlockData;
pub use vulkan::pipeline::PipelineData;
pub use vulkan::renderer::Renderer;
pub use vulkan::surface::VulkanSurface;

use std::sync::Arc;

/// The device applications hold and clone.
pub type DevicePtr = Arc<VulkanDevice>;

/// A window-backed presentation surface.
pub type Surface = VulkanSurface;

pub type Buffer = Handle<vulkan::buffer::VulkanBuffer>;
pub type Texture = Handle<vulkan::texture::VulkanTexture>;
pub type Mesh = Handle<vulkan::mesh::VulkanMesh>;
pub type Shader = Handle<vulkan::shader::VulkanShader>;
pub type ShaderEnvironment = Handle<vulkan::shader::VulkanShaderEnvironment>;
pub type Pipeline = Handle<vulkan::pipeline::VulkanPipeline>;
pub type ParameterBlock = Handle<vulkan::parameter_block::VulkanParameterBlock>;
pub type Kernel = Handle<vulkan::shader::VulkanKernel>;
