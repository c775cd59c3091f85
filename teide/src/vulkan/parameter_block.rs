//! Parameter-block layouts, descriptor allocation and block creation.

use std::sync::{Arc, Mutex};

use ash::vk;
use log::debug;

use crate::buffer_data::{BufferUsage, ResourceLifetime};
use crate::error::Result;
use crate::format::has_depth_or_stencil_component;
use crate::handle::Handle;
use crate::render_list::ShaderParameters;
use crate::shader_data::{ParameterBlockLayoutData, ShaderStageFlags};
use crate::vulkan::buffer::{create_buffer_with_data, VulkanBuffer};
use crate::vulkan::command_buffer::CommandBuffer;
use crate::vulkan::texture::VulkanTexture;

pub(crate) fn shader_stages_to_vk(stages: ShaderStageFlags) -> vk::ShaderStageFlags {
    let mut flags = vk::ShaderStageFlags::empty();
    if stages.contains(ShaderStageFlags::VERTEX) {
        flags |= vk::ShaderStageFlags::VERTEX;
    }
    if stages.contains(ShaderStageFlags::PIXEL) {
        flags |= vk::ShaderStageFlags::FRAGMENT;
    }
    flags
}

/// Device-side layout of one parameter block: its descriptor-set layout,
/// per-type descriptor counts and optional push-constant range.
pub struct VulkanParameterBlockLayout {
    device: ash::Device,
    pub set_layout: Option<vk::DescriptorSetLayout>,
    pub descriptor_type_counts: Vec<(vk::DescriptorType, u32)>,
    pub uniform_buffer_size: u32,
    pub push_constant_range: Option<vk::PushConstantRange>,
    pub uniforms_stages: vk::ShaderStageFlags,
}

impl VulkanParameterBlockLayout {
    pub fn new(data: ParameterBlockLayoutData, device: &ash::Device) -> Result<Self> {
        let mut bindings = Vec::new();
        let mut push_constant_range = None;
        let mut uniform_buffer_size = 0;
        let uniforms_stages = shader_stages_to_vk(data.uniforms_stages);

        if data.uniforms_size > 0 {
            if data.is_push_constant {
                push_constant_range = Some(
                    vk::PushConstantRange::default()
                        .stage_flags(uniforms_stages)
                        .offset(0)
                        .size(data.uniforms_size),
                );
            } else {
                bindings.push(
                    vk::DescriptorSetLayoutBinding::default()
                        .binding(0)
                        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                        .descriptor_count(1)
                        .stage_flags(uniforms_stages),
                );
                uniform_buffer_size = data.uniforms_size;
            }
        }

        for i in 0..data.texture_count {
            bindings.push(
                vk::DescriptorSetLayoutBinding::default()
                    .binding(i + 1)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::ALL_GRAPHICS),
            );
        }

        let descriptor_type_counts =
            bindings.iter().map(|b| (b.descriptor_type, b.descriptor_count)).collect();

        let set_layout = if bindings.is_empty() {
            None
        } else {
            let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
            Some(unsafe { device.create_descriptor_set_layout(&create_info, None)? })
        };

        Ok(Self {
            device: device.clone(),
            set_layout,
            descriptor_type_counts,
            uniform_buffer_size,
            push_constant_range,
            uniforms_stages,
        })
    }

    pub fn has_descriptors(&self) -> bool {
        !self.descriptor_type_counts.is_empty()
    }

    pub fn has_push_constants(&self) -> bool {
        self.push_constant_range.is_some()
    }

    pub fn is_empty(&self) -> bool {
        !(self.has_descriptors() || self.has_push_constants())
    }
}

impl Drop for VulkanParameterBlockLayout {
    fn drop(&mut self) {
        if let Some(layout) = self.set_layout.take() {
            unsafe {
                self.device.destroy_descriptor_set_layout(layout, None);
            }
        }
    }
}

impl std::fmt::Debug for VulkanParameterBlockLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanParameterBlockLayout")
            .field("uniform_buffer_size", &self.uniform_buffer_size)
            .field("push_constant_range", &self.push_constant_range)
            .finish_non_exhaustive()
    }
}

const INITIAL_MAX_SETS: u32 = 16;
const POOL_SIZE_MULTIPLIER: u32 = 4;

struct DescriptorAllocatorInner {
    pools: Vec<vk::DescriptorPool>,
    max_sets: u32,
}

/// Growable descriptor-set allocator. Sets are individually freed when
/// their parameter block is destroyed; a new, larger pool is added whenever
/// the current one runs out.
pub struct DescriptorAllocator {
    device: ash::Device,
    inner: Mutex<DescriptorAllocatorInner>,
}

impl DescriptorAllocator {
    pub fn new(device: ash::Device) -> Self {
        Self {
            device,
            inner: Mutex::new(DescriptorAllocatorInner { pools: Vec::new(), max_sets: INITIAL_MAX_SETS }),
        }
    }

    fn add_pool(&self, inner: &mut DescriptorAllocatorInner) -> Result<()> {
        let per_type = inner.max_sets * POOL_SIZE_MULTIPLIER;
        let pool_sizes = [
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(per_type),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(per_type),
        ];
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(inner.max_sets)
            .pool_sizes(&pool_sizes);
        let pool = unsafe { self.device.create_descriptor_pool(&create_info, None)? };
        inner.pools.push(pool);
        Ok(())
    }

    /// Allocates a set of the given layout, returning the pool it came from
    /// so it can be freed later.
    pub fn allocate(&self, layout: vk::DescriptorSetLayout) -> Result<(vk::DescriptorSet, vk::DescriptorPool)> {
        let mut inner = self.inner.lock().unwrap();
        if inner.pools.is_empty() {
            self.add_pool(&mut inner)?;
        }
        loop {
            let pool = *inner.pools.last().unwrap();
            let layouts = [layout];
            let alloc_info =
                vk::DescriptorSetAllocateInfo::default().descriptor_pool(pool).set_layouts(&layouts);
            match unsafe { self.device.allocate_descriptor_sets(&alloc_info) } {
                Ok(sets) => return Ok((sets[0], pool)),
                Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) | Err(vk::Result::ERROR_FRAGMENTED_POOL) => {
                    inner.max_sets *= 2;
                    self.add_pool(&mut inner)?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn free(&self, set: vk::DescriptorSet, pool: vk::DescriptorPool) {
        let _inner = self.inner.lock().unwrap();
        unsafe {
            let _ = self.device.free_descriptor_sets(pool, &[set]);
        }
    }
}

impl Drop for DescriptorAllocator {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap();
        for pool in inner.pools.drain(..) {
            unsafe {
                self.device.destroy_descriptor_pool(pool, None);
            }
        }
    }
}

/// A parameter block: uniform buffer, texture bindings and the descriptor
/// set tying them together, or raw bytes when the layout selected push
/// constants.
pub struct VulkanParameterBlock {
    pub layout: Arc<VulkanParameterBlockLayout>,
    pub uniform_buffer: Option<VulkanBuffer>,
    pub textures: Vec<Handle<VulkanTexture>>,
    descriptor_set: Option<(vk::DescriptorSet, vk::DescriptorPool)>,
    allocator: Option<Arc<DescriptorAllocator>>,
    pub push_constant_data: Vec<u8>,
}

impl VulkanParameterBlock {
    pub fn descriptor_set(&self) -> Option<vk::DescriptorSet> {
        self.descriptor_set.map(|(set, _)| set)
    }

    pub fn uniform_buffer_size(&self) -> usize {
        self.uniform_buffer.as_ref().map_or(0, |b| b.size() as usize)
    }

    pub fn push_constant_size(&self) -> usize {
        self.push_constant_data.len()
    }
}

impl Drop for VulkanParameterBlock {
    fn drop(&mut self) {
        if let (Some(allocator), Some((set, pool))) = (&self.allocator, self.descriptor_set.take()) {
            allocator.free(set, pool);
        }
    }
}

impl std::fmt::Debug for VulkanParameterBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanParameterBlock")
            .field("uniform_buffer_size", &self.uniform_buffer_size())
            .field("push_constant_size", &self.push_constant_size())
            .finish_non_exhaustive()
    }
}

/// Data for creating a parameter block against an existing layout.
#[derive(Debug, Clone)]
pub struct ParameterBlockData {
    pub layout: Arc<VulkanParameterBlockLayout>,
    pub lifetime: ResourceLifetime,
    pub parameters: ShaderParameters,
}

/// Builds a parameter block: creates and fills the uniform buffer, allocates
/// and writes the descriptor set, and captures push-constant bytes.
///
/// `command_buffer` is required for Permanent blocks, whose uniform buffer
/// takes the staged-upload path.
pub(crate) fn create_parameter_block_impl(
    device: &ash::Device,
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    allocator: &Arc<DescriptorAllocator>,
    data: &ParameterBlockData,
    name: &str,
    command_buffer: Option<&mut CommandBuffer>,
) -> Result<VulkanParameterBlock> {
    let layout = &data.layout;
    debug!("Creating parameter block {name}");

    let mut block = VulkanParameterBlock {
        layout: Arc::clone(layout),
        uniform_buffer: None,
        textures: data.parameters.textures.clone(),
        descriptor_set: None,
        allocator: None,
        push_constant_data: Vec::new(),
    };

    if let Some(range) = layout.push_constant_range {
        // Push constants are recorded at draw time; keep the bytes padded to
        // the full range.
        let mut bytes = data.parameters.uniform_data.clone();
        bytes.resize(range.size as usize, 0);
        block.push_constant_data = bytes;
    } else if layout.uniform_buffer_size > 0 {
        let mut bytes = data.parameters.uniform_data.clone();
        bytes.resize(layout.uniform_buffer_size as usize, 0);
        let buffer = match (data.lifetime, command_buffer) {
            (ResourceLifetime::Permanent, Some(cmd)) => create_buffer_with_data(
                device,
                memory_properties,
                &bytes,
                BufferUsage::Uniform,
                ResourceLifetime::Permanent,
                cmd,
            )?,
            _ => {
                // Transient blocks (and permanent ones created outside a
                // command stream) use a host-visible buffer.
                let buffer = crate::vulkan::buffer::create_buffer_uninitialized(
                    device,
                    memory_properties,
                    bytes.len() as u64,
                    crate::vulkan::buffer::buffer_usage_to_vk(BufferUsage::Uniform),
                    vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
                )?;
                buffer.write_mapped(0, &bytes);
                buffer
            }
        };
        block.uniform_buffer = Some(buffer);
    }

    if let Some(set_layout) = layout.set_layout {
        let (set, pool) = allocator.allocate(set_layout)?;
        write_descriptor_set(device, set, block.uniform_buffer.as_ref(), &block.textures);
        block.descriptor_set = Some((set, pool));
        block.allocator = Some(Arc::clone(allocator));
    }

    Ok(block)
}

fn write_descriptor_set(
    device: &ash::Device,
    set: vk::DescriptorSet,
    uniform_buffer: Option<&VulkanBuffer>,
    textures: &[Handle<VulkanTexture>],
) {
    let mut writes = Vec::with_capacity(1 + textures.len());

    let buffer_info = uniform_buffer.map(|buffer| {
        [vk::DescriptorBufferInfo::default().buffer(buffer.buffer).offset(0).range(buffer.size())]
    });
    if let Some(info) = &buffer_info {
        writes.push(
            vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(info),
        );
    }

    let image_infos: Vec<[vk::DescriptorImageInfo; 1]> = textures
        .iter()
        .map(|texture| {
            texture.with(|t| {
                let layout = if has_depth_or_stencil_component(t.format) {
                    vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
                } else {
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
                };
                [vk::DescriptorImageInfo::default()
                    .sampler(t.sampler)
                    .image_view(t.image_view)
                    .image_layout(layout)]
            })
        })
        .collect();
    for (i, info) in image_infos.iter().enumerate() {
        writes.push(
            vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(i as u32 + 1)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .image_info(info),
        );
    }

    unsafe {
        device.update_descriptor_sets(&writes, &[]);
    }
}
