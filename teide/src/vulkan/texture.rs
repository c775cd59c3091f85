//! Device textures: creation with staged uploads, layout transitions and
//! mipmap generation.

use std::sync::Mutex;

use ash::vk;

use crate::error::Result;
use crate::format::{format_to_vk, get_format_element_size, get_image_aspect, has_depth_or_stencil_component, Format};
use crate::texture_data::{CompareOp, Filter, MipmapMode, SamplerAddressMode, SamplerState, TextureData};
use crate::vulkan::buffer::create_buffer_uninitialized;
use crate::vulkan::command_buffer::CommandBuffer;

/// Mutable layout-tracking state of a texture, advanced by explicit
/// transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureState {
    pub layout: vk::ImageLayout,
    pub last_pipeline_stage: vk::PipelineStageFlags,
}

impl Default for TextureState {
    fn default() -> Self {
        Self { layout: vk::ImageLayout::UNDEFINED, last_pipeline_stage: vk::PipelineStageFlags::TOP_OF_PIPE }
    }
}

/// Access mask implied by each permitted layout.
fn access_flags_for_layout(layout: vk::ImageLayout) -> vk::AccessFlags {
    match layout {
        vk::ImageLayout::UNDEFINED => vk::AccessFlags::empty(),
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => vk::AccessFlags::TRANSFER_WRITE,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => vk::AccessFlags::TRANSFER_READ,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => {
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
        }
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL => {
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
        }
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL | vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL => {
            vk::AccessFlags::SHADER_READ
        }
        vk::ImageLayout::PRESENT_SRC_KHR => vk::AccessFlags::empty(),
        _ => vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
    }
}

/// Records a full-subresource layout transition.
pub(crate) fn transition_image_layout(
    device: &ash::Device,
    command_buffer: vk::CommandBuffer,
    image: vk::Image,
    format: Format,
    mip_level_count: u32,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    old_stage: vk::PipelineStageFlags,
    new_stage: vk::PipelineStageFlags,
) {
    let barrier = vk::ImageMemoryBarrier::default()
        .src_access_mask(access_flags_for_layout(old_layout))
        .dst_access_mask(access_flags_for_layout(new_layout))
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(get_image_aspect(format))
                .base_mip_level(0)
                .level_count(mip_level_count)
                .base_array_layer(0)
                .layer_count(1),
        );
    unsafe {
        device.cmd_pipeline_barrier(
            command_buffer,
            old_stage,
            new_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }
}

/// A sampled or renderable image with its view, sampler and layout state.
pub struct VulkanTexture {
    device: ash::Device,
    pub image: vk::Image,
    memory: vk::DeviceMemory,
    pub image_view: vk::ImageView,
    pub sampler: vk::Sampler,
    pub size: (u32, u32),
    pub format: Format,
    pub mip_level_count: u32,
    pub sample_count: u32,
    pub sampler_state: SamplerState,
    state: Mutex<TextureState>,
}

impl Drop for VulkanTexture {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
            self.device.destroy_image_view(self.image_view, None);
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

impl std::fmt::Debug for VulkanTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanTexture")
            .field("size", &self.size)
            .field("format", &self.format)
            .field("mip_level_count", &self.mip_level_count)
            .finish_non_exhaustive()
    }
}

impl VulkanTexture {
    pub fn state(&self) -> TextureState {
        *self.state.lock().unwrap()
    }

    fn do_transition(
        &self,
        command_buffer: &CommandBuffer,
        new_layout: vk::ImageLayout,
        new_stage: vk::PipelineStageFlags,
    ) {
        let mut state = self.state.lock().unwrap();
        if state.layout == new_layout && state.last_pipeline_stage == new_stage {
            return;
        }
        transition_image_layout(
            &self.device,
            command_buffer.get(),
            self.image,
            self.format,
            self.mip_level_count,
            state.layout,
            new_layout,
            state.last_pipeline_stage,
            new_stage,
        );
        state.layout = new_layout;
        state.last_pipeline_stage = new_stage;
    }

    pub fn transition_to_shader_input(&self, command_buffer: &CommandBuffer) {
        let new_layout = if self.state.lock().unwrap().layout == vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        {
            vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
        } else {
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        };
        self.do_transition(command_buffer, new_layout, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    pub fn transition_to_transfer_src(&self, command_buffer: &CommandBuffer) {
        self.do_transition(command_buffer, vk::ImageLayout::TRANSFER_SRC_OPTIMAL, vk::PipelineStageFlags::TRANSFER);
    }

    pub fn transition_to_transfer_dst(&self, command_buffer: &CommandBuffer) {
        self.do_transition(command_buffer, vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::PipelineStageFlags::TRANSFER);
    }

    pub fn transition_to_render_target(&self, command_buffer: &CommandBuffer) {
        if has_depth_or_stencil_component(self.format) {
            self.transition_to_depth_stencil_target(command_buffer);
        } else {
            self.transition_to_color_target(command_buffer);
        }
    }

    pub fn transition_to_color_target(&self, command_buffer: &CommandBuffer) {
        assert!(!has_depth_or_stencil_component(self.format));
        self.do_transition(
            command_buffer,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        );
    }

    pub fn transition_to_depth_stencil_target(&self, command_buffer: &CommandBuffer) {
        assert!(has_depth_or_stencil_component(self.format));
        self.do_transition(
            command_buffer,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        );
    }

    pub fn transition_to_present_src(&self, command_buffer: &CommandBuffer) {
        self.do_transition(
            command_buffer,
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        );
    }

    /// Fills mip levels 1..N by blitting down the chain, leaving every mip
    /// level in the shader-read-only layout. Mip 0 must be in the
    /// transfer-dst layout.
    pub fn generate_mipmaps(&self, command_buffer: &CommandBuffer) {
        let cmd = command_buffer.get();
        let make_barrier = |src_access, dst_access, old_layout, new_layout, mip_level| {
            vk::ImageMemoryBarrier::default()
                .src_access_mask(src_access)
                .dst_access_mask(dst_access)
                .old_layout(old_layout)
                .new_layout(new_layout)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(self.image)
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .base_mip_level(mip_level)
                        .level_count(1)
                        .base_array_layer(0)
                        .layer_count(1),
                )
        };

        let origin = vk::Offset3D::default();
        let mut prev_mip_size =
            vk::Offset3D { x: self.size.0 as i32, y: self.size.1 as i32, z: 1 };

        for i in 1..self.mip_level_count {
            let curr_mip_size = vk::Offset3D {
                x: (prev_mip_size.x / 2).max(1),
                y: (prev_mip_size.y / 2).max(1),
                z: 1,
            };

            // Previous level becomes the blit source.
            let before = make_barrier(
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::TRANSFER_READ,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                i - 1,
            );
            unsafe {
                self.device.cmd_pipeline_barrier(
                    cmd,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[before],
                );
            }

            let blit = vk::ImageBlit::default()
                .src_subresource(
                    vk::ImageSubresourceLayers::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .mip_level(i - 1)
                        .layer_count(1),
                )
                .src_offsets([origin, prev_mip_size])
                .dst_subresource(
                    vk::ImageSubresourceLayers::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .mip_level(i)
                        .layer_count(1),
                )
                .dst_offsets([origin, curr_mip_size]);
            unsafe {
                self.device.cmd_blit_image(
                    cmd,
                    self.image,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    self.image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[blit],
                    vk::Filter::LINEAR,
                );
            }

            // Previous level is done; make it shader-readable.
            let after = make_barrier(
                vk::AccessFlags::TRANSFER_READ,
                vk::AccessFlags::SHADER_READ,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                i - 1,
            );
            unsafe {
                self.device.cmd_pipeline_barrier(
                    cmd,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::FRAGMENT_SHADER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[after],
                );
            }

            prev_mip_size = curr_mip_size;
        }

        let final_barrier = make_barrier(
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::SHADER_READ,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            self.mip_level_count - 1,
        );
        unsafe {
            self.device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[final_barrier],
            );
        }

        let mut state = self.state.lock().unwrap();
        state.layout = vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;
        state.last_pipeline_stage = vk::PipelineStageFlags::FRAGMENT_SHADER;
    }
}

fn filter_to_vk(filter: Filter) -> vk::Filter {
    match filter {
        Filter::Nearest => vk::Filter::NEAREST,
        Filter::Linear => vk::Filter::LINEAR,
    }
}

fn mipmap_mode_to_vk(mode: MipmapMode) -> vk::SamplerMipmapMode {
    match mode {
        MipmapMode::Nearest => vk::SamplerMipmapMode::NEAREST,
        MipmapMode::Linear => vk::SamplerMipmapMode::LINEAR,
    }
}

fn address_mode_to_vk(mode: SamplerAddressMode) -> vk::SamplerAddressMode {
    match mode {
        SamplerAddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
        SamplerAddressMode::Mirror => vk::SamplerAddressMode::MIRRORED_REPEAT,
        SamplerAddressMode::Clamp => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        SamplerAddressMode::Border => vk::SamplerAddressMode::CLAMP_TO_BORDER,
    }
}

pub(crate) fn compare_op_to_vk(op: CompareOp) -> vk::CompareOp {
    match op {
        CompareOp::Never => vk::CompareOp::NEVER,
        CompareOp::Less => vk::CompareOp::LESS,
        CompareOp::Equal => vk::CompareOp::EQUAL,
        CompareOp::LessEqual => vk::CompareOp::LESS_OR_EQUAL,
        CompareOp::Greater => vk::CompareOp::GREATER,
        CompareOp::GreaterEqual => vk::CompareOp::GREATER_OR_EQUAL,
        CompareOp::NotEqual => vk::CompareOp::NOT_EQUAL,
        CompareOp::Always => vk::CompareOp::ALWAYS,
    }
}

/// Creates the image, view and sampler and uploads mip 0 when pixel data is
/// present, recording the copy into `command_buffer`. The returned texture's
/// state reflects the recorded transitions.
pub(crate) fn create_texture_impl(
    device: &ash::Device,
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    data: &TextureData,
    mut usage: vk::ImageUsageFlags,
    command_buffer: &mut CommandBuffer,
) -> Result<VulkanTexture> {
    // All textures can be copied from so their contents are readable.
    usage |= vk::ImageUsageFlags::TRANSFER_SRC;
    if !data.pixels.is_empty() {
        usage |= vk::ImageUsageFlags::TRANSFER_DST;
    }
    if data.mip_level_count > 1 {
        // Mipmap generation blits between levels of the same image.
        usage |= vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::TRANSFER_DST;
    }

    let mip_level_count = data.mip_level_count.max(1);
    let sample_count = data.sample_count.max(1);
    let extent = vk::Extent3D { width: data.size.0.max(1), height: data.size.1.max(1), depth: 1 };
    let vk_format = format_to_vk(data.format);

    let image_info = vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(vk_format)
        .extent(extent)
        .mip_levels(mip_level_count)
        .array_layers(1)
        .samples(vk::SampleCountFlags::from_raw(sample_count))
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED);
    let image = unsafe { device.create_image(&image_info, None)? };

    let requirements = unsafe { device.get_image_memory_requirements(image) };
    let memory_type_index = crate::vulkan::buffer::find_memory_type(
        memory_properties,
        requirements.memory_type_bits,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )?;
    let allocate_info = vk::MemoryAllocateInfo::default()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);
    let memory = unsafe { device.allocate_memory(&allocate_info, None)? };
    unsafe {
        device.bind_image_memory(image, memory, 0)?;
    }

    let mut state = TextureState::default();

    if !data.pixels.is_empty() {
        let staging = create_buffer_uninitialized(
            device,
            memory_properties,
            data.pixels.len() as u64,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        staging.write_mapped(0, &data.pixels);

        transition_image_layout(
            device,
            command_buffer.get(),
            image,
            data.format,
            mip_level_count,
            state.layout,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            state.last_pipeline_stage,
            vk::PipelineStageFlags::TRANSFER,
        );
        state = TextureState {
            layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            last_pipeline_stage: vk::PipelineStageFlags::TRANSFER,
        };

        let region = vk::BufferImageCopy::default()
            .image_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(get_image_aspect(data.format))
                    .mip_level(0)
                    .layer_count(1),
            )
            .image_extent(extent);
        unsafe {
            device.cmd_copy_buffer_to_image(
                command_buffer.get(),
                staging.buffer,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
        command_buffer.take_ownership(staging);
    }

    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(vk_format)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(get_image_aspect(data.format))
                .base_mip_level(0)
                .level_count(mip_level_count)
                .base_array_layer(0)
                .layer_count(1),
        );
    let image_view = unsafe { device.create_image_view(&view_info, None)? };

    let ss = &data.sampler_state;
    let anisotropy = ss.max_anisotropy.map(|a| a.clamp(1.0, 16.0));
    let sampler_info = vk::SamplerCreateInfo::default()
        .mag_filter(filter_to_vk(ss.mag_filter))
        .min_filter(filter_to_vk(ss.min_filter))
        .mipmap_mode(mipmap_mode_to_vk(ss.mipmap_mode))
        .address_mode_u(address_mode_to_vk(ss.address_mode_u))
        .address_mode_v(address_mode_to_vk(ss.address_mode_v))
        .address_mode_w(address_mode_to_vk(ss.address_mode_w))
        .anisotropy_enable(anisotropy.is_some())
        .max_anisotropy(anisotropy.unwrap_or(1.0))
        .compare_enable(ss.compare_op.is_some())
        .compare_op(compare_op_to_vk(ss.compare_op.unwrap_or(CompareOp::Never)))
        .max_lod(mip_level_count as f32);
    let sampler = unsafe { device.create_sampler(&sampler_info, None)? };

    Ok(VulkanTexture {
        device: device.clone(),
        image,
        memory,
        image_view,
        sampler,
        size: (extent.width, extent.height),
        format: data.format,
        mip_level_count,
        sample_count,
        sampler_state: *ss,
        state: Mutex::new(state),
    })
}

/// Byte size of one mip level's pixel data.
pub(crate) fn mip_byte_size(size: (u32, u32), format: Format, mip: u32) -> u64 {
    let width = (size.0 >> mip).max(1) as u64;
    let height = (size.1 >> mip).max(1) as u64;
    width * height * get_format_element_size(format) as u64
}
