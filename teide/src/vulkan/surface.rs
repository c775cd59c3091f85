//! Window surfaces: swapchain, per-image framebuffers and frame-pacing
//! synchronization objects.

use ash::vk;
use log::{error, info, warn};

use crate::error::{Error, Result};
use crate::executor::MAX_FRAMES_IN_FLIGHT;
use crate::format::{format_from_vk, format_to_vk, get_image_aspect, Format};
use crate::pipeline_data::{FramebufferLayout, RenderPassInfo};
use crate::vulkan::memory::MemoryAllocator;
use crate::vulkan::render_pass::{create_framebuffer, create_render_pass, Framebuffer};
use crate::vulkan::PhysicalDeviceInfo;

/// Everything the renderer needs to draw into and present one acquired
/// swapchain image.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceImage {
    pub surface: vk::SurfaceKHR,
    pub swapchain: vk::SwapchainKHR,
    pub image_index: u32,
    pub image_available: vk::Semaphore,
    pub image: vk::Image,
    pub framebuffer: Framebuffer,
    pub pre_present_command_buffer: vk::CommandBuffer,
}

struct AttachmentImage {
    image: vk::Image,
    view: vk::ImageView,
}

/// A window-backed surface: swapchain images with their framebuffers, an
/// image-available semaphore ring and per-image in-flight fences.
///
/// The multisample color and depth images are allocated from a
/// surface-scoped memory pool that is freed wholesale on every swapchain
/// rebuild.
pub struct VulkanSurface {
    instance: ash::Instance,
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
    surface: vk::SurfaceKHR,
    queue_family_indices: Vec<u32>,
    command_pool: vk::CommandPool,
    allocator: MemoryAllocator,

    surface_extent: (u32, u32),
    msaa_sample_count: u32,
    framebuffer_layout: FramebufferLayout,

    swapchain: vk::SwapchainKHR,
    swapchain_images: Vec<vk::Image>,
    swapchain_image_views: Vec<vk::ImageView>,
    color_buffer: Option<AttachmentImage>,
    depth_buffer: Option<AttachmentImage>,
    render_pass: vk::RenderPass,
    framebuffers: Vec<vk::Framebuffer>,
    pre_present_command_buffers: Vec<vk::CommandBuffer>,

    image_available: [vk::Semaphore; MAX_FRAMES_IN_FLIGHT],
    next_semaphore_index: usize,
    images_in_flight: Vec<vk::Fence>,
}

fn choose_surface_format(available: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    let preferred = vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_SRGB,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    };
    if available.contains(&preferred) {
        return preferred;
    }
    available[0]
}

fn choose_present_mode(available: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if available.contains(&vk::PresentModeKHR::MAILBOX) {
        return vk::PresentModeKHR::MAILBOX;
    }
    // FIFO mode is guaranteed to be supported.
    vk::PresentModeKHR::FIFO
}

impl VulkanSurface {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        instance: &ash::Instance,
        device: &ash::Device,
        physical_device: &PhysicalDeviceInfo,
        surface_loader: ash::khr::surface::Instance,
        swapchain_loader: ash::khr::swapchain::Device,
        surface: vk::SurfaceKHR,
        extent: (u32, u32),
        multisampled: bool,
    ) -> Result<Self> {
        let mut queue_family_indices = vec![physical_device.queue_families.graphics_family];
        if let Some(present) = physical_device.queue_families.present_family {
            if !queue_family_indices.contains(&present) {
                queue_family_indices.push(present);
            }
        }

        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(physical_device.queue_families.graphics_family);
        let command_pool = unsafe { device.create_command_pool(&pool_info, None)? };

        let msaa_sample_count = if multisampled {
            let limits = &physical_device.properties.limits;
            let supported =
                limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts;
            let bits = supported.as_raw();
            if bits == 0 {
                1
            } else {
                1 << (31 - bits.leading_zeros())
            }
        } else {
            1
        };

        let mut image_available = [vk::Semaphore::null(); MAX_FRAMES_IN_FLIGHT];
        for semaphore in &mut image_available {
            *semaphore =
                unsafe { device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)? };
        }

        let mut surface_impl = Self {
            instance: instance.clone(),
            device: device.clone(),
            physical_device: physical_device.physical_device,
            surface_loader,
            swapchain_loader,
            surface,
            queue_family_indices,
            command_pool,
            allocator: MemoryAllocator::new(device.clone(), physical_device.memory_properties),
            surface_extent: extent,
            msaa_sample_count,
            framebuffer_layout: FramebufferLayout::default(),
            swapchain: vk::SwapchainKHR::null(),
            swapchain_images: Vec::new(),
            swapchain_image_views: Vec::new(),
            color_buffer: None,
            depth_buffer: None,
            render_pass: vk::RenderPass::null(),
            framebuffers: Vec::new(),
            pre_present_command_buffers: Vec::new(),
            image_available,
            next_semaphore_index: 0,
            images_in_flight: Vec::new(),
        };
        surface_impl.create_swapchain_and_images()?;
        Ok(surface_impl)
    }

    pub fn extent(&self) -> (u32, u32) {
        self.surface_extent
    }

    pub fn color_format(&self) -> Option<Format> {
        self.framebuffer_layout.color_format
    }

    pub fn depth_format(&self) -> Option<Format> {
        self.framebuffer_layout.depth_stencil_format
    }

    pub fn sample_count(&self) -> u32 {
        self.msaa_sample_count
    }

    pub fn framebuffer_layout(&self) -> FramebufferLayout {
        self.framebuffer_layout
    }

    pub fn vulkan_surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Rebuilds the swapchain and everything derived from it. `extent` is
    /// only used when the surface itself reports no fixed extent.
    pub fn on_resize(&mut self, extent: (u32, u32)) -> Result<()> {
        self.surface_extent = extent;
        self.recreate_swapchain()
    }

    /// Acquires the next swapchain image, waiting on `frame_fence` (the
    /// previous use of the caller's frame slot) first. Returns `None` when
    /// the swapchain is out of date and has been recreated, or when the
    /// surface currently has a zero extent.
    pub fn acquire_next_image(&mut self, frame_fence: vk::Fence) -> Result<Option<SurfaceImage>> {
        unsafe {
            self.device.wait_for_fences(&[frame_fence], true, u64::MAX)?;
        }

        if self.swapchain == vk::SwapchainKHR::null() {
            self.recreate_swapchain()?;
            if self.swapchain == vk::SwapchainKHR::null() {
                return Ok(None);
            }
        }

        let semaphore = self.next_semaphore();
        let acquired = unsafe {
            self.swapchain_loader.acquire_next_image(self.swapchain, u64::MAX, semaphore, vk::Fence::null())
        };
        let image_index = match acquired {
            Ok((index, false)) => index,
            Ok((index, true)) => {
                warn!("Suboptimal swapchain image");
                index
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.recreate_swapchain()?;
                return Ok(None);
            }
            Err(e) => {
                error!("Couldn't acquire swapchain image: {e}");
                return Ok(None);
            }
        };

        // Wait until any previous frame that rendered to this image is done
        // with it, then mark it as used by this frame.
        let prior_fence = self.images_in_flight[image_index as usize];
        if prior_fence != vk::Fence::null() {
            unsafe {
                self.device.wait_for_fences(&[prior_fence], true, u64::MAX)?;
            }
        }
        self.images_in_flight[image_index as usize] = frame_fence;

        Ok(Some(SurfaceImage {
            surface: self.surface,
            swapchain: self.swapchain,
            image_index,
            image_available: semaphore,
            image: self.swapchain_images[image_index as usize],
            framebuffer: Framebuffer {
                framebuffer: self.framebuffers[image_index as usize],
                layout: self.framebuffer_layout,
                size: self.surface_extent,
            },
            pre_present_command_buffer: self.pre_present_command_buffers[image_index as usize],
        }))
    }

    fn next_semaphore(&mut self) -> vk::Semaphore {
        let index = self.next_semaphore_index;
        self.next_semaphore_index = (self.next_semaphore_index + 1) % MAX_FRAMES_IN_FLIGHT;
        self.image_available[index]
    }

    fn find_depth_format(&self) -> Result<Format> {
        let candidates = [Format::Depth32, Format::Depth32Stencil8, Format::Depth24Stencil8];
        for format in candidates {
            let props = unsafe {
                self.instance
                    .get_physical_device_format_properties(self.physical_device, format_to_vk(format))
            };
            if props
                .optimal_tiling_features
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
            {
                return Ok(format);
            }
        }
        Err(Error::Surface("failed to find a supported depth format".into()))
    }

    fn create_attachment_image(
        &self,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
    ) -> Result<AttachmentImage> {
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: self.surface_extent.0,
                height: self.surface_extent.1,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::from_raw(self.msaa_sample_count))
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let image = unsafe { self.device.create_image(&image_info, None)? };

        let requirements = unsafe { self.device.get_image_memory_requirements(image) };
        let allocation = self.allocator.allocate(requirements, vk::MemoryPropertyFlags::DEVICE_LOCAL)?;
        unsafe {
            self.device.bind_image_memory(image, allocation.memory, allocation.offset)?;
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );
        let view = unsafe { self.device.create_image_view(&view_info, None)? };
        Ok(AttachmentImage { image, view })
    }

    fn create_swapchain_and_images(&mut self) -> Result<()> {
        let capabilities = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.physical_device, self.surface)
                .map_err(|e| Error::Surface(format!("failed to query surface capabilities: {e}")))?
        };

        let extent = if capabilities.current_extent.width != u32::MAX {
            (capabilities.current_extent.width, capabilities.current_extent.height)
        } else {
            (
                self.surface_extent
                    .0
                    .clamp(capabilities.min_image_extent.width, capabilities.max_image_extent.width),
                self.surface_extent
                    .1
                    .clamp(capabilities.min_image_extent.height, capabilities.max_image_extent.height),
            )
        };
        if extent.0 == 0 || extent.1 == 0 {
            // Minimized window; leave the swapchain absent until a resize.
            info!("Deferring swapchain creation for zero-sized surface");
            return Ok(());
        }
        self.surface_extent = extent;

        let formats = unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(self.physical_device, self.surface)
                .map_err(|e| Error::Surface(format!("failed to query surface formats: {e}")))?
        };
        let surface_format = choose_surface_format(&formats);

        let present_modes = unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(self.physical_device, self.surface)
                .map_err(|e| Error::Surface(format!("failed to query present modes: {e}")))?
        };
        let present_mode = choose_present_mode(&present_modes);

        let mut image_count = capabilities.min_image_count + 1;
        if capabilities.max_image_count > 0 {
            image_count = image_count.min(capabilities.max_image_count);
        }

        let sharing_mode = if self.queue_family_indices.len() == 1 {
            vk::SharingMode::EXCLUSIVE
        } else {
            vk::SharingMode::CONCURRENT
        };

        let old_swapchain = self.swapchain;
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(vk::Extent2D { width: extent.0, height: extent.1 })
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(&self.queue_family_indices)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);
        self.swapchain = unsafe {
            self.swapchain_loader
                .create_swapchain(&create_info, None)
                .map_err(|e| Error::Surface(format!("failed to create swapchain: {e}")))?
        };
        if old_swapchain != vk::SwapchainKHR::null() {
            unsafe {
                self.swapchain_loader.destroy_swapchain(old_swapchain, None);
            }
        }

        self.swapchain_images = unsafe {
            self.swapchain_loader
                .get_swapchain_images(self.swapchain)
                .map_err(|e| Error::Surface(format!("failed to get swapchain images: {e}")))?
        };
        self.swapchain_image_views = self
            .swapchain_images
            .iter()
            .map(|&image| {
                let view_info = vk::ImageViewCreateInfo::default()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(surface_format.format)
                    .subresource_range(
                        vk::ImageSubresourceRange::default()
                            .aspect_mask(vk::ImageAspectFlags::COLOR)
                            .base_mip_level(0)
                            .level_count(1)
                            .base_array_layer(0)
                            .layer_count(1),
                    );
                Ok(unsafe { self.device.create_image_view(&view_info, None)? })
            })
            .collect::<Result<Vec<_>>>()?;
        self.images_in_flight = vec![vk::Fence::null(); self.swapchain_images.len()];

        if self.msaa_sample_count > 1 {
            self.color_buffer = Some(self.create_attachment_image(
                surface_format.format,
                vk::ImageUsageFlags::TRANSIENT_ATTACHMENT | vk::ImageUsageFlags::COLOR_ATTACHMENT,
                vk::ImageAspectFlags::COLOR,
            )?);
        }

        let depth_format = self.find_depth_format()?;
        self.depth_buffer = Some(self.create_attachment_image(
            format_to_vk(depth_format),
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            get_image_aspect(depth_format),
        )?);

        self.framebuffer_layout = FramebufferLayout {
            color_format: Some(format_from_vk(surface_format.format)),
            depth_stencil_format: Some(depth_format),
            sample_count: self.msaa_sample_count,
            capture_color: true,
            capture_depth_stencil: false,
        };

        self.render_pass =
            create_render_pass(&self.device, &self.framebuffer_layout, &RenderPassInfo::default())?;

        self.framebuffers = self
            .swapchain_image_views
            .iter()
            .map(|&swapchain_view| {
                let depth_view = self.depth_buffer.as_ref().unwrap().view;
                let attachments: Vec<vk::ImageView> = match &self.color_buffer {
                    Some(color) => vec![color.view, depth_view, swapchain_view],
                    None => vec![swapchain_view, depth_view],
                };
                create_framebuffer(&self.device, self.render_pass, self.surface_extent, &attachments)
            })
            .collect::<Result<Vec<_>>>()?;

        // Pre-recorded transitions into the presentable layout, appended to
        // each frame's submission.
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(self.swapchain_images.len() as u32);
        self.pre_present_command_buffers = unsafe { self.device.allocate_command_buffers(&alloc_info)? };
        for (&image, &cmd) in self.swapchain_images.iter().zip(&self.pre_present_command_buffers) {
            let barrier = vk::ImageMemoryBarrier::default()
                .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
                .dst_access_mask(vk::AccessFlags::empty())
                .old_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .base_mip_level(0)
                        .level_count(1)
                        .base_array_layer(0)
                        .layer_count(1),
                );
            unsafe {
                self.device.begin_command_buffer(cmd, &vk::CommandBufferBeginInfo::default())?;
                self.device.cmd_pipeline_barrier(
                    cmd,
                    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                    vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[barrier],
                );
                self.device.end_command_buffer(cmd)?;
            }
        }

        Ok(())
    }

    fn destroy_swapchain_objects(&mut self) {
        unsafe {
            if !self.pre_present_command_buffers.is_empty() {
                self.device.free_command_buffers(self.command_pool, &self.pre_present_command_buffers);
                self.pre_present_command_buffers.clear();
            }
            for framebuffer in self.framebuffers.drain(..) {
                self.device.destroy_framebuffer(framebuffer, None);
            }
            if self.render_pass != vk::RenderPass::null() {
                self.device.destroy_render_pass(self.render_pass, None);
                self.render_pass = vk::RenderPass::null();
            }
            for buffer in self.color_buffer.take().into_iter().chain(self.depth_buffer.take()) {
                self.device.destroy_image_view(buffer.view, None);
                self.device.destroy_image(buffer.image, None);
            }
            for view in self.swapchain_image_views.drain(..) {
                self.device.destroy_image_view(view, None);
            }
            self.swapchain_images.clear();
        }
    }

    fn recreate_swapchain(&mut self) -> Result<()> {
        unsafe {
            self.device.device_wait_idle()?;
        }
        self.destroy_swapchain_objects();
        self.allocator.deallocate_all();
        self.create_swapchain_and_images()
    }
}

impl Drop for VulkanSurface {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
        }
        self.destroy_swapchain_objects();
        unsafe {
            if self.swapchain != vk::SwapchainKHR::null() {
                self.swapchain_loader.destroy_swapchain(self.swapchain, None);
            }
            for semaphore in self.image_available {
                self.device.destroy_semaphore(semaphore, None);
            }
            self.device.destroy_command_pool(self.command_pool, None);
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}

impl std::fmt::Debug for VulkanSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanSurface")
            .field("extent", &self.surface_extent)
            .field("sample_count", &self.msaa_sample_count)
            .finish_non_exhaustive()
    }
}
