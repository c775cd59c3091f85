//! The per-frame renderer: scene parameter blocks, render lists, surface
//! presentation and CPU/GPU frame pacing.
//!
//! CPU-GPU synchronisation works like this, using an example where the
//! application is GPU-bound. The frame number is modded with
//! MAX_FRAMES_IN_FLIGHT (2 here).
//!
//!  1. The CPU processes frame 0 and submits it to the GPU
//!  2. The CPU immediately moves on to frame 1 while the GPU starts
//!     processing frame 0 (the GPU might actually start earlier, since
//!     command buffers are submitted to the queue throughout the frame)
//!  3. The CPU finishes processing frame 1 and the work is queued for
//!     execution on the GPU
//!  4. The CPU waits for the GPU to finish frame 0, and then begins frame 0
//!  5. The CPU starts work on the new frame 0 while the GPU starts work on
//!     frame 1
//!  6. Repeat ad infinitum
//!
//! ```text
//!     +-------+-------+              +-------+              +-------+
//! CPU |   0   |   1   |              |   0   |              |   1   |
//!     +-------+-------+--------------+-------+--------------+-------+----
//! GPU         |          0           |           1          |          0
//!             +----------------------+----------------------+-----------
//! ```
//!
//! This lets the CPU and GPU work concurrently while ensuring they never
//! work on the same frame slot at the same time.

use std::sync::Arc;

use ash::vk;
use log::{error, warn};

use crate::buffer_data::ResourceLifetime;
use crate::error::{Error, Result};
use crate::executor::MAX_FRAMES_IN_FLIGHT;
use crate::format::get_image_aspect;
use crate::pipeline_data::RenderPassDesc;
use crate::render_list::{RenderList, RenderObject, RenderTargetInfo, RenderToTextureResult, ShaderParameters};
use crate::sync_util::Synchronized;
use crate::task::Task;
use crate::texture_data::{get_byte_size, TextureData};
use crate::vulkan::buffer::create_buffer_uninitialized;
use crate::vulkan::command_buffer::{CommandBuffer, CommandBufferResources};
use crate::vulkan::device::VulkanDevice;
use crate::vulkan::parameter_block::ParameterBlockData;
use crate::vulkan::render_pass::Framebuffer;
use crate::vulkan::surface::{SurfaceImage, VulkanSurface};
use crate::vulkan::texture::mip_byte_size;
use crate::{ParameterBlock, ShaderEnvironment, Texture};

#[derive(Default)]
struct FrameResources {
    scene_parameters: Synchronized<Option<ParameterBlock>>,
    view_parameters: Synchronized<Vec<ParameterBlock>>,
    recorded: Synchronized<Vec<CommandBufferResources>>,
}

impl FrameResources {
    fn clear(&self) {
        self.scene_parameters.lock(|scene| *scene = None);
        self.view_parameters.lock(std::mem::take);
        self.recorded.lock(std::mem::take);
    }
}

struct RendererShared {
    device: Arc<VulkanDevice>,
    shader_environment: Option<ShaderEnvironment>,
    surface_command_buffers: Synchronized<Vec<vk::CommandBuffer>>,
    surfaces_to_present: Synchronized<Vec<SurfaceImage>>,
    frame_resources: [FrameResources; MAX_FRAMES_IN_FLIGHT],
}

/// The frame state machine. Application calls are single-threaded; the
/// renderer fans recording out to the scheduler's worker pool.
pub struct Renderer {
    shared: Arc<RendererShared>,
    render_finished: [vk::Semaphore; MAX_FRAMES_IN_FLIGHT],
    in_flight_fences: [vk::Fence; MAX_FRAMES_IN_FLIGHT],
    frame_number: u32,
}

impl Renderer {
    pub(crate) fn new(device: Arc<VulkanDevice>, shader_environment: Option<ShaderEnvironment>) -> Result<Self> {
        let vk_device = device.vk_device().clone();

        let mut render_finished = [vk::Semaphore::null(); MAX_FRAMES_IN_FLIGHT];
        for semaphore in &mut render_finished {
            *semaphore = unsafe { vk_device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)? };
        }
        // Signalled so the first use of each frame slot does not wait.
        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);
        let mut in_flight_fences = [vk::Fence::null(); MAX_FRAMES_IN_FLIGHT];
        for fence in &mut in_flight_fences {
            *fence = unsafe { vk_device.create_fence(&fence_info, None)? };
        }

        Ok(Self {
            shared: Arc::new(RendererShared {
                device,
                shader_environment,
                surface_command_buffers: Synchronized::default(),
                surfaces_to_present: Synchronized::default(),
                frame_resources: Default::default(),
            }),
            render_finished,
            in_flight_fences,
            frame_number: 0,
        })
    }

    pub fn frame_number(&self) -> u32 {
        self.frame_number
    }

    /// Starts a new frame: waits for the GPU to release this frame slot,
    /// recycles its transient resources and builds the scene parameter
    /// block.
    pub fn begin_frame(&mut self, scene_parameters: ShaderParameters) -> Result<()> {
        self.frame_number = (self.frame_number + 1) % MAX_FRAMES_IN_FLIGHT as u32;
        let frame = self.frame_number as usize;

        let device = self.shared.device.vk_device();
        unsafe {
            device.wait_for_fences(&[self.in_flight_fences[frame]], true, u64::MAX)?;
        }

        self.shared.device.scheduler().next_frame();
        self.shared.frame_resources[frame].clear();

        if let Some(environment) = &self.shared.shader_environment {
            let layout = environment.with(|e| Arc::clone(&e.scene_pblock_layout));
            let data = ParameterBlockData {
                layout,
                lifetime: ResourceLifetime::Transient,
                parameters: scene_parameters,
            };
            let block = self.shared.device.create_parameter_block_for_thread(&data, "Scene", None)?;
            self.shared.frame_resources[frame].scene_parameters.lock(|scene| *scene = Some(block));
        }
        Ok(())
    }

    /// Renders a list into freshly allocated offscreen textures. The
    /// captured aspects are returned and end the pass in a shader-readable
    /// layout.
    pub fn render_to_texture(&mut self, render_target: &RenderTargetInfo, render_list: RenderList) -> Result<RenderToTextureResult> {
        let layout = render_target.framebuffer_layout;
        assert!(
            layout.capture_color || layout.capture_depth_stencil,
            "nothing to capture in a render-to-texture pass"
        );

        let create_renderable = |format: Option<crate::format::Format>, name: &str| -> Result<Option<Texture>> {
            let Some(format) = format else { return Ok(None) };
            let data = TextureData {
                size: render_target.size,
                format,
                mip_level_count: 1,
                sample_count: layout.sample_count.max(1),
                sampler_state: render_target.sampler_state,
                pixels: Vec::new(),
            };
            let name = format!("{}:{}", render_list.name, name);
            Ok(Some(self.shared.device.create_renderable_texture(data, &name)?))
        };

        let color = create_renderable(layout.color_format, "color")?;
        let depth_stencil = create_renderable(layout.depth_stencil_format, "depthStencil")?;
        // A multisampled pass that captures color resolves into a separate
        // single-sample texture.
        let resolve = if layout.sample_count > 1 && layout.capture_color {
            let resolve_data = TextureData {
                size: render_target.size,
                format: layout.color_format.unwrap(),
                mip_level_count: 1,
                sample_count: 1,
                sampler_state: render_target.sampler_state,
                pixels: Vec::new(),
            };
            let name = format!("{}:resolve", render_list.name);
            Some(self.shared.device.create_renderable_texture(resolve_data, &name)?)
        } else {
            None
        };

        let shared = Arc::clone(&self.shared);
        let frame = self.frame_number as usize;
        let target = render_target.clone();
        let task_color = color.clone();
        let task_depth = depth_stencil.clone();
        let task_resolve = resolve.clone();

        self.shared.device.scheduler().schedule_gpu(move |cmd| {
            let result = (|| -> Result<()> {
                let mut attachments = Vec::new();
                for texture in [&task_color, &task_depth].into_iter().flatten() {
                    cmd.add_texture(texture);
                    texture.with(|t| {
                        t.transition_to_render_target(cmd);
                        attachments.push(t.image_view);
                    });
                }
                if let Some(resolve) = &task_resolve {
                    cmd.add_texture(resolve);
                    resolve.with(|t| {
                        t.transition_to_color_target(cmd);
                        attachments.push(t.image_view);
                    });
                }

                let render_pass_desc = RenderPassDesc {
                    framebuffer_layout: target.framebuffer_layout,
                    render_overrides: render_list.render_overrides,
                };
                let render_pass =
                    shared.device.create_render_pass(&target.framebuffer_layout, &render_list.clear_state)?;
                let framebuffer = shared.device.create_framebuffer(
                    render_pass,
                    &target.framebuffer_layout,
                    target.size,
                    attachments,
                )?;

                record_render_list(&shared, cmd, &render_list, render_pass, &render_pass_desc, &framebuffer, frame)?;

                if target.framebuffer_layout.capture_color {
                    if let Some(texture) = task_resolve.as_ref().or(task_color.as_ref()) {
                        texture.with(|t| t.transition_to_shader_input(cmd));
                    }
                }
                if target.framebuffer_layout.capture_depth_stencil {
                    if let Some(texture) = &task_depth {
                        texture.with(|t| t.transition_to_shader_input(cmd));
                    }
                }
                Ok(())
            })();
            if let Err(e) = result {
                error!("Failed to record render-to-texture pass: {e}");
            }
        });

        Ok(RenderToTextureResult {
            color_texture: if layout.capture_color { resolve.or(color) } else { None },
            depth_stencil_texture: if layout.capture_depth_stencil { depth_stencil } else { None },
        })
    }

    /// Renders a list into the next image of `surface`. The draw commands
    /// are recorded on a worker thread and submitted at `end_frame`.
    pub fn render_to_surface(&mut self, surface: &mut VulkanSurface, render_list: RenderList) -> Result<()> {
        let Some(surface_image) = self.add_surface_to_present(surface)? else {
            return Ok(());
        };

        let shared = Arc::clone(&self.shared);
        let frame = self.frame_number as usize;
        let source = self.shared.device.scheduler().command_buffer_source();

        self.shared.device.scheduler().schedule(move |worker| {
            let result = (|| -> Result<()> {
                let mut cmd = source.acquire(worker);

                let framebuffer = surface_image.framebuffer;
                let render_pass_desc = RenderPassDesc {
                    framebuffer_layout: framebuffer.layout,
                    render_overrides: render_list.render_overrides,
                };
                let render_pass =
                    shared.device.create_render_pass(&framebuffer.layout, &render_list.clear_state)?;

                record_render_list(&shared, &mut cmd, &render_list, render_pass, &render_pass_desc, &framebuffer, frame)?;

                let (raw, resources) = cmd.finish();
                shared.frame_resources[frame].recorded.lock(|recorded| recorded.push(resources));
                shared.surface_command_buffers.lock(|buffers| buffers.push(raw));
                Ok(())
            })();
            if let Err(e) = result {
                error!("Failed to record surface render list: {e}");
            }
        });
        Ok(())
    }

    /// Submits the frame's surface command buffers and presents the
    /// acquired images.
    pub fn end_frame(&mut self) -> Result<()> {
        let frame = self.frame_number as usize;
        let device = &self.shared.device;

        device.scheduler().wait_for_cpu();

        let images = self.shared.surfaces_to_present.lock(std::mem::take);
        if images.is_empty() {
            return Ok(());
        }

        let present_queue = device
            .present_queue()
            .ok_or_else(|| Error::Surface("can't present without a present queue".into()))?;
        let swapchain_loader = device
            .swapchain_loader()
            .ok_or_else(|| Error::Surface("device was created without presentation support".into()))?
            .clone();

        let fence = self.in_flight_fences[frame];
        unsafe {
            device.vk_device().reset_fences(&[fence])?;
        }

        let mut command_buffers = self.shared.surface_command_buffers.lock(std::mem::take);
        command_buffers.extend(images.iter().map(|image| image.pre_present_command_buffer));

        let wait_semaphores: Vec<vk::Semaphore> = images.iter().map(|image| image.image_available).collect();
        let wait_stages =
            vec![vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT; wait_semaphores.len()];
        let signal_semaphores = [self.render_finished[frame]];

        device.scheduler().gpu().submit_with_sync(
            &command_buffers,
            &wait_semaphores,
            &wait_stages,
            &signal_semaphores,
            fence,
        )?;

        let swapchains: Vec<vk::SwapchainKHR> = images.iter().map(|image| image.swapchain).collect();
        let image_indices: Vec<u32> = images.iter().map(|image| image.image_index).collect();
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let present_result = device
            .scheduler()
            .gpu()
            .lock_queue(|_| unsafe { swapchain_loader.queue_present(present_queue, &present_info) });
        match present_result {
            Ok(false) => {}
            Ok(true) => warn!("Suboptimal swapchain image"),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => warn!("Out-of-date swapchain at present"),
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Reads back the full mip chain of `texture` into host memory.
    pub fn copy_texture_data(&self, texture: Texture) -> Task<TextureData> {
        let (size, format, mip_level_count, sample_count) =
            texture.with(|t| (t.size, t.format, t.mip_level_count, t.sample_count));
        let texture_data = TextureData {
            size,
            format,
            mip_level_count,
            sample_count,
            sampler_state: Default::default(),
            pixels: Vec::new(),
        };
        let buffer_size = get_byte_size(&texture_data) as u64;

        let device = Arc::clone(&self.shared.device);
        let scheduler = self.shared.device.scheduler();

        let readback = scheduler.schedule_gpu(move |cmd| -> Result<Arc<crate::vulkan::buffer::VulkanBuffer>> {
            let buffer = create_buffer_uninitialized(
                device.vk_device(),
                device.memory_properties(),
                buffer_size,
                vk::BufferUsageFlags::TRANSFER_DST,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            )?;

            cmd.add_texture(&texture);
            texture.with(|t| {
                t.transition_to_transfer_src(cmd);

                let mut buffer_offset = 0u64;
                let regions: Vec<vk::BufferImageCopy> = (0..t.mip_level_count)
                    .map(|mip| {
                        let extent = vk::Extent3D {
                            width: (t.size.0 >> mip).max(1),
                            height: (t.size.1 >> mip).max(1),
                            depth: 1,
                        };
                        let region = vk::BufferImageCopy::default()
                            .buffer_offset(buffer_offset)
                            .image_subresource(
                                vk::ImageSubresourceLayers::default()
                                    .aspect_mask(get_image_aspect(t.format))
                                    .mip_level(mip)
                                    .layer_count(1),
                            )
                            .image_extent(extent);
                        buffer_offset += mip_byte_size(t.size, t.format, mip);
                        region
                    })
                    .collect();
                unsafe {
                    device.vk_device().cmd_copy_image_to_buffer(
                        cmd.get(),
                        t.image,
                        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                        buffer.buffer,
                        &regions,
                    );
                }
                t.transition_to_shader_input(cmd);
            });

            Ok(Arc::new(buffer))
        });

        scheduler.schedule_after(readback, move |buffer| {
            let mut data = texture_data;
            if let Ok(buffer) = buffer {
                data.pixels = buffer.mapped_data().to_vec();
            }
            data
        })
    }

    fn add_surface_to_present(&mut self, surface: &mut VulkanSurface) -> Result<Option<SurfaceImage>> {
        let raw_surface = surface.vulkan_surface();
        let existing = self
            .shared
            .surfaces_to_present
            .lock(|surfaces| surfaces.iter().find(|image| image.surface == raw_surface).copied());
        if let Some(image) = existing {
            return Ok(Some(image));
        }

        let frame = self.frame_number as usize;
        match surface.acquire_next_image(self.in_flight_fences[frame])? {
            Some(image) => {
                self.shared.surfaces_to_present.lock(|surfaces| surfaces.push(image));
                Ok(Some(image))
            }
            None => Ok(None),
        }
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.shared.device.scheduler().wait_for_gpu();

        let device = self.shared.device.vk_device();
        let timeout = std::time::Duration::from_secs(1);
        let wait =
            unsafe { device.wait_for_fences(&self.in_flight_fences, true, timeout.as_nanos() as u64) };
        if wait == Err(vk::Result::TIMEOUT) {
            error!("Timeout (>{timeout:?}) while waiting for all in-flight command buffers to complete!");
        }

        for frame in &self.shared.frame_resources {
            frame.clear();
        }
        unsafe {
            for semaphore in self.render_finished {
                device.destroy_semaphore(semaphore, None);
            }
            for fence in self.in_flight_fences {
                device.destroy_fence(fence, None);
            }
        }
    }
}

/// Computes the dynamic viewport from the framebuffer extent and the render
/// list's normalized region.
fn make_viewport(size: (u32, u32), region: &crate::render_list::ViewportRegion) -> vk::Viewport {
    vk::Viewport {
        x: region.left * size.0 as f32,
        y: region.top * size.1 as f32,
        width: region.right * size.0 as f32,
        height: region.bottom * size.1 as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

fn make_clear_values(framebuffer: &Framebuffer, render_list: &RenderList) -> Vec<vk::ClearValue> {
    let clear_state = &render_list.clear_state;
    let mut clear_values = Vec::new();
    if framebuffer.layout.color_format.is_some() {
        let color = clear_state.color_value.unwrap_or_default();
        clear_values.push(vk::ClearValue { color: vk::ClearColorValue { float32: color } });
    }
    if framebuffer.layout.depth_stencil_format.is_some() {
        clear_values.push(vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: clear_state.depth_value.unwrap_or(1.0),
                stencil: clear_state.stencil_value.unwrap_or(0),
            },
        });
    }
    clear_values
}

/// Records one render list: viewport and scissor, the view parameter block,
/// the scene/view descriptor bindings and every render object in order.
fn record_render_list(
    shared: &RendererShared,
    cmd: &mut CommandBuffer,
    render_list: &RenderList,
    render_pass: vk::RenderPass,
    render_pass_desc: &RenderPassDesc,
    framebuffer: &Framebuffer,
    frame: usize,
) -> Result<()> {
    let device = shared.device.vk_device().clone();
    let raw = cmd.get();

    let viewport = make_viewport(framebuffer.size, &render_list.viewport_region);
    let scissor = match &render_list.scissor {
        Some(rect) => vk::Rect2D {
            offset: vk::Offset2D { x: rect.x, y: rect.y },
            extent: vk::Extent2D { width: rect.width, height: rect.height },
        },
        None => vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent: vk::Extent2D { width: framebuffer.size.0, height: framebuffer.size.1 },
        },
    };
    unsafe {
        device.cmd_set_viewport(raw, 0, &[viewport]);
        device.cmd_set_scissor(raw, 0, &[scissor]);
    }

    // The view parameter block is transient and lives in this frame's
    // bucket until the slot comes around again.
    let view_parameters = match &shared.shader_environment {
        Some(environment) => {
            let layout = environment.with(|e| Arc::clone(&e.view_pblock_layout));
            let data = ParameterBlockData {
                layout,
                lifetime: ResourceLifetime::Transient,
                parameters: render_list.view_parameters.clone(),
            };
            let name = format!("{}:View", render_list.name);
            let block = shared.device.create_parameter_block_for_thread(&data, &name, Some(cmd))?;
            cmd.add_parameter_block(&block);
            shared.frame_resources[frame].view_parameters.lock(|views| views.push(block.clone()));
            Some(block)
        }
        None => None,
    };

    let clear_values = make_clear_values(framebuffer, render_list);
    let render_pass_begin = vk::RenderPassBeginInfo::default()
        .render_pass(render_pass)
        .framebuffer(framebuffer.framebuffer)
        .render_area(vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent: vk::Extent2D { width: framebuffer.size.0, height: framebuffer.size.1 },
        })
        .clear_values(&clear_values);
    unsafe {
        device.cmd_begin_render_pass(raw, &render_pass_begin, vk::SubpassContents::INLINE);
    }

    if !render_list.objects.is_empty() {
        let scene_set = shared.frame_resources[frame]
            .scene_parameters
            .lock(|scene| scene.as_ref().and_then(|block| block.with(|b| b.descriptor_set())));
        let view_set =
            view_parameters.as_ref().and_then(|block| block.with(|b| b.descriptor_set()));

        // Bind the contiguous tail of non-null scene/view sets, starting at
        // the first active one.
        let descriptor_sets = [scene_set, view_set];
        let first_active = descriptor_sets.iter().position(|set| set.is_some());
        if let Some(first_active) = first_active {
            let active: Vec<vk::DescriptorSet> =
                descriptor_sets[first_active..].iter().filter_map(|set| *set).collect();
            let pipeline_layout =
                render_list.objects[0].pipeline.with(|p| p.pipeline_layout);
            unsafe {
                device.cmd_bind_descriptor_sets(
                    raw,
                    vk::PipelineBindPoint::GRAPHICS,
                    pipeline_layout,
                    first_active as u32,
                    &active,
                    &[],
                );
            }
        }

        for object in &render_list.objects {
            record_render_object(&shared.device, cmd, object, render_pass_desc)?;
        }
    }

    unsafe {
        device.cmd_end_render_pass(raw);
    }
    Ok(())
}

/// Render-list recording for graph nodes, which carry no shader
/// environment: only material bindings and object push constants are set.
pub(crate) fn record_graph_render_list(
    device: &Arc<VulkanDevice>,
    cmd: &mut CommandBuffer,
    render_list: &RenderList,
    render_pass: vk::RenderPass,
    render_pass_desc: &RenderPassDesc,
    framebuffer: &Framebuffer,
) -> Result<()> {
    let vk_device = device.vk_device().clone();
    let raw = cmd.get();

    let viewport = make_viewport(framebuffer.size, &render_list.viewport_region);
    let scissor = vk::Rect2D {
        offset: vk::Offset2D::default(),
        extent: vk::Extent2D { width: framebuffer.size.0, height: framebuffer.size.1 },
    };
    unsafe {
        vk_device.cmd_set_viewport(raw, 0, &[viewport]);
        vk_device.cmd_set_scissor(raw, 0, &[scissor]);
    }

    let clear_values = make_clear_values(framebuffer, render_list);
    let render_pass_begin = vk::RenderPassBeginInfo::default()
        .render_pass(render_pass)
        .framebuffer(framebuffer.framebuffer)
        .render_area(scissor)
        .clear_values(&clear_values);
    unsafe {
        vk_device.cmd_begin_render_pass(raw, &render_pass_begin, vk::SubpassContents::INLINE);
    }
    for object in &render_list.objects {
        record_render_object(device, cmd, object, render_pass_desc)?;
    }
    unsafe {
        vk_device.cmd_end_render_pass(raw);
    }
    Ok(())
}

fn record_render_object(
    device: &Arc<VulkanDevice>,
    cmd: &mut CommandBuffer,
    object: &RenderObject,
    render_pass_desc: &RenderPassDesc,
) -> Result<()> {
    let device = device.vk_device().clone();
    let raw = cmd.get();

    cmd.add_mesh(&object.mesh);
    cmd.add_pipeline(&object.pipeline);
    if let Some(material) = &object.material_parameters {
        cmd.add_parameter_block(material);
    }

    object.pipeline.with(|pipeline| {
        if let Some(material) = &object.material_parameters {
            if let Some(set) = material.with(|block| block.descriptor_set()) {
                unsafe {
                    device.cmd_bind_descriptor_sets(
                        raw,
                        vk::PipelineBindPoint::GRAPHICS,
                        pipeline.pipeline_layout,
                        2,
                        &[set],
                        &[],
                    );
                }
            }
        }

        unsafe {
            device.cmd_bind_pipeline(raw, vk::PipelineBindPoint::GRAPHICS, pipeline.pipeline_for(render_pass_desc));
        }

        let (push_constant_range, uniforms_stages) = pipeline
            .shader
            .with(|shader| (shader.object_pblock_layout.push_constant_range, shader.object_pblock_layout.uniforms_stages));
        if push_constant_range.is_some() && !object.object_parameters.uniform_data.is_empty() {
            unsafe {
                device.cmd_push_constants(
                    raw,
                    pipeline.pipeline_layout,
                    uniforms_stages,
                    0,
                    &object.object_parameters.uniform_data,
                );
            }
        }
    });

    object.mesh.with(|mesh| {
        unsafe {
            device.cmd_bind_vertex_buffers(raw, 0, &[mesh.vertex_buffer.buffer], &[0]);
        }
        match &mesh.index_buffer {
            Some(index_buffer) => unsafe {
                device.cmd_bind_index_buffer(
                    raw,
                    index_buffer.buffer,
                    0,
                    crate::vulkan::mesh::VulkanMesh::INDEX_TYPE,
                );
                device.cmd_draw_indexed(raw, mesh.index_count, 1, 0, 0, 0);
            },
            None => unsafe {
                device.cmd_draw(raw, mesh.vertex_count, 1, 0, 0);
            },
        }
    });
    Ok(())
}
