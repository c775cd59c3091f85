//! The device: resource registries, creation operations, render-pass and
//! framebuffer caches, and surface/renderer factories.

use std::collections::HashMap;
use std::ffi::CStr;
use std::sync::{Arc, Mutex};

use ash::vk;
use log::debug;

use crate::buffer_data::BufferData;
use crate::error::{Error, Result};
use crate::executor::Scheduler;
use crate::format::has_depth_or_stencil_component;
use crate::handle::ResourceRegistry;
use crate::mesh_data::MeshData;
use crate::pipeline_data::{FramebufferLayout, RenderPassInfo};
use crate::render_list::ClearState;
use crate::shader_data::{KernelData, ShaderData, ShaderEnvironmentData};
use crate::sync_util::ThreadMap;
use crate::texture_data::TextureData;
use crate::vulkan::buffer::{create_buffer_with_data, VulkanBuffer};
use crate::vulkan::command_buffer::CommandBuffer;
use crate::vulkan::mesh::{create_mesh_impl, VulkanMesh};
use crate::vulkan::parameter_block::{
    create_parameter_block_impl, DescriptorAllocator, ParameterBlockData, VulkanParameterBlock,
};
use crate::vulkan::pipeline::{create_graphics_pipeline, PipelineData, VulkanPipeline};
use crate::vulkan::render_pass::{self, Framebuffer};
use crate::vulkan::renderer::Renderer;
use crate::vulkan::shader::{VulkanKernel, VulkanShader, VulkanShaderEnvironment};
use crate::vulkan::surface::VulkanSurface;
use crate::vulkan::texture::{create_texture_impl, VulkanTexture};
use crate::vulkan::{
    create_instance, create_logical_device, find_physical_device, PhysicalDeviceInfo, QueueFamilies,
};
use crate::{Buffer, Kernel, Mesh, ParameterBlock, Pipeline, Shader, ShaderEnvironment, Texture};

/// Settings for device construction.
#[derive(Debug, Clone)]
pub struct DeviceSettings {
    pub num_threads: u32,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        let num_threads =
            std::thread::available_parallelism().map(|n| n.get() as u32).unwrap_or(1);
        Self { num_threads }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RenderPassCacheKey {
    framebuffer_layout: FramebufferLayout,
    render_pass_info: RenderPassInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FramebufferCacheKey {
    render_pass: vk::RenderPass,
    size: (u32, u32),
    attachments: Vec<vk::ImageView>,
}

/// Owns the raw device and instance; destroyed strictly after every other
/// field of [`VulkanDevice`].
struct DeviceCore {
    device: ash::Device,
    instance: ash::Instance,
    entry: ash::Entry,
}

impl Drop for DeviceCore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

/// The Vulkan device: reference-counted registries for every resource type,
/// the unified scheduler, and the content-addressed render-pass and
/// framebuffer caches.
///
/// Creation operations may be called from the application thread; uploads
/// are recorded on worker threads through the scheduler and the calling
/// thread blocks until the returned handle's resource is fully created.
pub struct VulkanDevice {
    scheduler: Scheduler,

    buffers: ResourceRegistry<VulkanBuffer>,
    textures: ResourceRegistry<VulkanTexture>,
    meshes: ResourceRegistry<VulkanMesh>,
    shaders: ResourceRegistry<VulkanShader>,
    shader_environments: ResourceRegistry<VulkanShaderEnvironment>,
    pipelines: ResourceRegistry<VulkanPipeline>,
    parameter_blocks: ResourceRegistry<VulkanParameterBlock>,
    kernels: ResourceRegistry<VulkanKernel>,

    main_descriptor_allocator: Arc<DescriptorAllocator>,
    worker_descriptor_allocators: ThreadMap<Arc<DescriptorAllocator>>,

    render_pass_cache: Mutex<HashMap<RenderPassCacheKey, vk::RenderPass>>,
    framebuffer_cache: Mutex<HashMap<FramebufferCacheKey, vk::Framebuffer>>,

    properties: vk::PhysicalDeviceProperties,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    physical_device: vk::PhysicalDevice,
    queue_families: QueueFamilies,
    present_queue: Option<vk::Queue>,

    surface_loader: Option<ash::khr::surface::Instance>,
    swapchain_loader: Option<ash::khr::swapchain::Device>,

    core: DeviceCore,
}

impl VulkanDevice {
    fn from_parts(
        entry: ash::Entry,
        instance: ash::Instance,
        surface_loader: Option<ash::khr::surface::Instance>,
        swapchain_loader: Option<ash::khr::swapchain::Device>,
        physical_device: PhysicalDeviceInfo,
        device: ash::Device,
        settings: &DeviceSettings,
    ) -> Arc<Self> {
        let graphics_queue =
            unsafe { device.get_device_queue(physical_device.queue_families.graphics_family, 0) };
        let present_queue = physical_device
            .queue_families
            .present_family
            .map(|family| unsafe { device.get_device_queue(family, 0) });

        let num_threads = settings.num_threads.max(1);
        let scheduler = Scheduler::new(
            num_threads,
            device.clone(),
            graphics_queue,
            physical_device.queue_families.graphics_family,
        );

        let worker_descriptor_allocators =
            ThreadMap::new(num_threads as usize, || Arc::new(DescriptorAllocator::new(device.clone())));

        Arc::new(Self {
            scheduler,
            buffers: ResourceRegistry::new("buffer"),
            textures: ResourceRegistry::new("texture"),
            meshes: ResourceRegistry::new("mesh"),
            shaders: ResourceRegistry::new("shader"),
            shader_environments: ResourceRegistry::new("shader environment"),
            pipelines: ResourceRegistry::new("pipeline"),
            parameter_blocks: ResourceRegistry::new("parameter block"),
            kernels: ResourceRegistry::new("kernel"),
            main_descriptor_allocator: Arc::new(DescriptorAllocator::new(device.clone())),
            worker_descriptor_allocators,
            render_pass_cache: Mutex::new(HashMap::new()),
            framebuffer_cache: Mutex::new(HashMap::new()),
            properties: physical_device.properties,
            memory_properties: physical_device.memory_properties,
            physical_device: physical_device.physical_device,
            queue_families: physical_device.queue_families,
            present_queue,
            surface_loader,
            swapchain_loader,
            core: DeviceCore { device, instance, entry },
        })
    }

    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub(crate) fn vk_device(&self) -> &ash::Device {
        &self.core.device
    }

    pub(crate) fn present_queue(&self) -> Option<vk::Queue> {
        self.present_queue
    }

    pub(crate) fn swapchain_loader(&self) -> Option<&ash::khr::swapchain::Device> {
        self.swapchain_loader.as_ref()
    }

    pub(crate) fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    /// Worker threads get their own descriptor allocator so transient
    /// parameter blocks never contend on the main pool; any other thread
    /// falls back to the main allocator.
    pub(crate) fn transient_descriptor_allocator(&self) -> Arc<DescriptorAllocator> {
        if crate::executor::cpu::current_worker_index().is_some() {
            self.worker_descriptor_allocators.lock_current(|allocator| Arc::clone(allocator))
        } else {
            Arc::clone(&self.main_descriptor_allocator)
        }
    }

    // --- Resource creation ---

    pub fn create_buffer(&self, data: BufferData, name: &str) -> Result<Buffer> {
        let device = self.core.device.clone();
        let memory_properties = self.memory_properties;
        let registry = self.buffers.clone();
        let name = name.to_string();
        self.scheduler
            .schedule_gpu(move |cmd| {
                debug!("Creating buffer {name}");
                let buffer = create_buffer_with_data(
                    &device,
                    &memory_properties,
                    &data.data,
                    data.usage,
                    data.lifetime,
                    cmd,
                )?;
                let handle = registry.insert(buffer);
                cmd.add_buffer(&handle);
                Ok(handle)
            })
            .get()
    }

    pub fn create_texture(&self, data: TextureData, name: &str) -> Result<Texture> {
        let device = self.core.device.clone();
        let memory_properties = self.memory_properties;
        let registry = self.textures.clone();
        let name = name.to_string();
        self.scheduler
            .schedule_gpu(move |cmd| {
                debug!("Creating texture {name}");
                let texture =
                    create_texture_impl(&device, &memory_properties, &data, vk::ImageUsageFlags::SAMPLED, cmd)?;
                if texture.mip_level_count > 1 {
                    texture.generate_mipmaps(cmd);
                } else {
                    // No mipmaps to generate; transition directly into a
                    // samplable layout.
                    texture.transition_to_shader_input(cmd);
                }
                let handle = registry.insert(texture);
                cmd.add_texture(&handle);
                Ok(handle)
            })
            .get()
    }

    /// Creates a texture usable as a color or depth-stencil attachment,
    /// left in its attachment layout.
    pub fn create_renderable_texture(&self, data: TextureData, name: &str) -> Result<Texture> {
        let device = self.core.device.clone();
        let memory_properties = self.memory_properties;
        let registry = self.textures.clone();
        let name = name.to_string();
        self.scheduler
            .schedule_gpu(move |cmd| {
                debug!("Creating renderable texture {name}");
                let is_color_target = !has_depth_or_stencil_component(data.format);
                let render_usage = if is_color_target {
                    vk::ImageUsageFlags::COLOR_ATTACHMENT
                } else {
                    vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
                };
                let usage = render_usage | vk::ImageUsageFlags::SAMPLED;
                let texture = create_texture_impl(&device, &memory_properties, &data, usage, cmd)?;
                texture.transition_to_render_target(cmd);
                let handle = registry.insert(texture);
                cmd.add_texture(&handle);
                Ok(handle)
            })
            .get()
    }

    pub fn create_mesh(&self, data: MeshData, name: &str) -> Result<Mesh> {
        let device = self.core.device.clone();
        let memory_properties = self.memory_properties;
        let registry = self.meshes.clone();
        let name = name.to_string();
        self.scheduler
            .schedule_gpu(move |cmd| {
                debug!("Creating mesh {name}");
                let mesh = create_mesh_impl(&device, &memory_properties, &data, cmd)?;
                let handle = registry.insert(mesh);
                cmd.add_mesh(&handle);
                Ok(handle)
            })
            .get()
    }

    pub fn create_shader(&self, data: &ShaderData, name: &str) -> Result<Shader> {
        debug!("Creating shader {name}");
        let shader = VulkanShader::new(&self.core.device, data)?;
        Ok(self.shaders.insert(shader))
    }

    pub fn create_shader_environment(&self, data: &ShaderEnvironmentData, name: &str) -> Result<ShaderEnvironment> {
        debug!("Creating shader environment {name}");
        let environment = VulkanShaderEnvironment::new(&self.core.device, data)?;
        Ok(self.shader_environments.insert(environment))
    }

    pub fn create_kernel(&self, data: &KernelData, name: &str) -> Result<Kernel> {
        debug!("Creating kernel {name}");
        let kernel = VulkanKernel::new(&self.core.device, data)?;
        Ok(self.kernels.insert(kernel))
    }

    pub fn create_pipeline(&self, data: PipelineData) -> Result<Pipeline> {
        let shader_handle = data.shader.clone();
        let pipelines = shader_handle.with(|shader| -> Result<Vec<_>> {
            data.render_passes
                .iter()
                .map(|render_pass_desc| {
                    let render_pass = self.create_render_pass_layout(&render_pass_desc.framebuffer_layout)?;
                    let pipeline = create_graphics_pipeline(
                        &self.core.device,
                        shader,
                        &data.vertex_layout,
                        &data.render_states,
                        render_pass_desc,
                        render_pass,
                    )?;
                    Ok((*render_pass_desc, pipeline))
                })
                .collect()
        })?;
        let pipeline_layout = shader_handle.with(|shader| shader.pipeline_layout);
        let pipeline = VulkanPipeline::new(&self.core.device, data.shader, pipeline_layout, pipelines);
        Ok(self.pipelines.insert(pipeline))
    }

    pub fn create_parameter_block(&self, data: ParameterBlockData, name: &str) -> Result<ParameterBlock> {
        let device = self.core.device.clone();
        let memory_properties = self.memory_properties;
        let registry = self.parameter_blocks.clone();
        let allocator = Arc::clone(&self.main_descriptor_allocator);
        let name = name.to_string();
        self.scheduler
            .schedule_gpu(move |cmd| {
                let block = create_parameter_block_impl(
                    &device,
                    &memory_properties,
                    &allocator,
                    &data,
                    &name,
                    Some(cmd),
                )?;
                let handle = registry.insert(block);
                cmd.add_parameter_block(&handle);
                Ok(handle)
            })
            .get()
    }

    /// Synchronous parameter-block creation for render recording paths.
    /// Transient blocks need no command stream; permanent ones record their
    /// upload into `command_buffer`.
    pub(crate) fn create_parameter_block_for_thread(
        &self,
        data: &ParameterBlockData,
        name: &str,
        command_buffer: Option<&mut CommandBuffer>,
    ) -> Result<ParameterBlock> {
        let allocator = self.transient_descriptor_allocator();
        let block = create_parameter_block_impl(
            &self.core.device,
            &self.memory_properties,
            &allocator,
            data,
            name,
            command_buffer,
        )?;
        Ok(self.parameter_blocks.insert(block))
    }

    // --- Render pass and framebuffer caches ---

    /// A render pass compatible with `layout`, ignoring load/store behavior.
    /// Used when building pipelines.
    pub fn create_render_pass_layout(&self, layout: &FramebufferLayout) -> Result<vk::RenderPass> {
        self.get_render_pass(layout, RenderPassInfo::default())
    }

    /// A render pass for `layout` with load operations derived from the
    /// render list's clear state.
    pub fn create_render_pass(
        &self,
        layout: &FramebufferLayout,
        clear_state: &ClearState,
    ) -> Result<vk::RenderPass> {
        self.get_render_pass(layout, render_pass::render_pass_info_for_clear_state(clear_state))
    }

    fn get_render_pass(&self, layout: &FramebufferLayout, info: RenderPassInfo) -> Result<vk::RenderPass> {
        let key = RenderPassCacheKey { framebuffer_layout: *layout, render_pass_info: info };
        let mut cache = self.render_pass_cache.lock().unwrap();
        if let Some(&render_pass) = cache.get(&key) {
            return Ok(render_pass);
        }
        let render_pass = render_pass::create_render_pass(&self.core.device, layout, &info)?;
        cache.insert(key, render_pass);
        Ok(render_pass)
    }

    pub(crate) fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        layout: &FramebufferLayout,
        size: (u32, u32),
        attachments: Vec<vk::ImageView>,
    ) -> Result<Framebuffer> {
        let key = FramebufferCacheKey { render_pass, size, attachments };
        let mut cache = self.framebuffer_cache.lock().unwrap();
        let framebuffer = match cache.get(&key) {
            Some(&framebuffer) => framebuffer,
            None => {
                let framebuffer =
                    render_pass::create_framebuffer(&self.core.device, render_pass, size, &key.attachments)?;
                cache.insert(key, framebuffer);
                framebuffer
            }
        };
        Ok(Framebuffer { framebuffer, layout: *layout, size })
    }

    // --- Factories ---

    pub fn create_renderer(self: &Arc<Self>, shader_environment: Option<ShaderEnvironment>) -> Result<Renderer> {
        Renderer::new(Arc::clone(self), shader_environment)
    }

    /// Creates a surface for another window. The device must have been
    /// created with presentation support.
    #[cfg(feature = "window")]
    pub fn create_surface(
        &self,
        window: &(impl raw_window_handle::HasWindowHandle + raw_window_handle::HasDisplayHandle),
        multisampled: bool,
    ) -> Result<VulkanSurface> {
        let surface_loader = self
            .surface_loader
            .as_ref()
            .ok_or_else(|| Error::Surface("device was created without presentation support".into()))?;
        let swapchain_loader = self
            .swapchain_loader
            .as_ref()
            .ok_or_else(|| Error::Surface("device was created without presentation support".into()))?;

        let display_handle =
            window.display_handle().map_err(|e| Error::Surface(format!("window handle: {e}")))?;
        let window_handle =
            window.window_handle().map_err(|e| Error::Surface(format!("window handle: {e}")))?;
        let surface = unsafe {
            ash_window::create_surface(
                &self.core.entry,
                &self.core.instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| Error::Surface(format!("failed to create surface: {e}")))?
        };

        let physical_device = PhysicalDeviceInfo {
            physical_device: self.physical_device,
            properties: self.properties,
            memory_properties: self.memory_properties,
            queue_families: self.queue_families,
        };
        VulkanSurface::new(
            &self.core.instance,
            &self.core.device,
            &physical_device,
            surface_loader.clone(),
            swapchain_loader.clone(),
            surface,
            (1, 1),
            multisampled,
        )
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        self.scheduler.wait_for_gpu();
        unsafe {
            let _ = self.core.device.device_wait_idle();
        }
        for (_, framebuffer) in self.framebuffer_cache.get_mut().unwrap().drain() {
            unsafe {
                self.core.device.destroy_framebuffer(framebuffer, None);
            }
        }
        for (_, render_pass) in self.render_pass_cache.get_mut().unwrap().drain() {
            unsafe {
                self.core.device.destroy_render_pass(render_pass, None);
            }
        }
    }
}

impl std::fmt::Debug for VulkanDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let device_name = self
            .properties
            .device_name
            .iter()
            .take_while(|&&c| c != 0)
            .map(|&c| c as u8 as char)
            .collect::<String>();
        f.debug_struct("VulkanDevice").field("device_name", &device_name).finish_non_exhaustive()
    }
}

/// Creates a device with no presentation support.
pub fn create_headless_device(settings: &DeviceSettings) -> Result<Arc<VulkanDevice>> {
    let entry = unsafe { ash::Entry::load() }
        .map_err(|e| Error::DeviceCreation(format!("failed to load Vulkan: {e}")))?;
    let instance = create_instance(&entry, &[])?;
    let physical_device = find_physical_device(&instance, None, &[])?;
    let device = create_logical_device(&instance, &physical_device, &[])?;
    Ok(VulkanDevice::from_parts(entry, instance, None, None, physical_device, device, settings))
}

/// Creates a device able to present to `window`, plus a surface for it.
#[cfg(feature = "window")]
pub fn create_device_and_surface(
    window: &(impl raw_window_handle::HasWindowHandle + raw_window_handle::HasDisplayHandle),
    multisampled: bool,
    settings: &DeviceSettings,
) -> Result<(Arc<VulkanDevice>, VulkanSurface)> {
    let entry = unsafe { ash::Entry::load() }
        .map_err(|e| Error::DeviceCreation(format!("failed to load Vulkan: {e}")))?;

    let display_handle =
        window.display_handle().map_err(|e| Error::Surface(format!("window handle: {e}")))?;
    let window_handle =
        window.window_handle().map_err(|e| Error::Surface(format!("window handle: {e}")))?;

    let extensions = ash_window::enumerate_required_extensions(display_handle.as_raw())
        .map_err(|e| Error::Surface(format!("unsupported window system: {e}")))?;
    let instance = create_instance(&entry, extensions)?;

    let surface = unsafe {
        ash_window::create_surface(&entry, &instance, display_handle.as_raw(), window_handle.as_raw(), None)
            .map_err(|e| Error::Surface(format!("failed to create surface: {e}")))?
    };
    let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

    let required_extensions: [&CStr; 1] = [ash::khr::swapchain::NAME];
    let physical_device =
        find_physical_device(&instance, Some((&surface_loader, surface)), &required_extensions)?;
    let device = create_logical_device(&instance, &physical_device, &required_extensions)?;
    let swapchain_loader = ash::khr::swapchain::Device::new(&instance, &device);

    let surface_impl = VulkanSurface::new(
        &instance,
        &device,
        &physical_device,
        surface_loader.clone(),
        swapchain_loader.clone(),
        surface,
        (1, 1),
        multisampled,
    )?;

    let vulkan_device = VulkanDevice::from_parts(
        entry,
        instance,
        Some(surface_loader),
        Some(swapchain_loader),
        physical_device,
        device,
        settings,
    );
    Ok((vulkan_device, surface_impl))
}
