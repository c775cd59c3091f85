//! Device buffers with optional persistent mapping and staged uploads.

use std::ptr::NonNull;

use ash::vk;

use crate::buffer_data::{BufferUsage, ResourceLifetime};
use crate::error::{Error, Result};
use crate::vulkan::command_buffer::CommandBuffer;

pub(crate) fn buffer_usage_to_vk(usage: BufferUsage) -> vk::BufferUsageFlags {
    match usage {
        BufferUsage::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER,
        BufferUsage::Index => vk::BufferUsageFlags::INDEX_BUFFER,
        BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
        BufferUsage::Generic => {
            vk::BufferUsageFlags::STORAGE_BUFFER
                | vk::BufferUsageFlags::TRANSFER_SRC
                | vk::BufferUsageFlags::TRANSFER_DST
        }
    }
}

pub(crate) fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> Result<u32> {
    (0..memory_properties.memory_type_count)
        .find(|&i| {
            let suitable = (type_bits & (1 << i)) != 0;
            let memory_type = &memory_properties.memory_types[i as usize];
            suitable && memory_type.property_flags.contains(flags)
        })
        .ok_or_else(|| Error::DeviceCreation(format!("no suitable memory type for flags {flags:?}")))
}

/// A buffer with its dedicated memory allocation. Host-visible buffers stay
/// persistently mapped for their whole lifetime.
pub struct VulkanBuffer {
    device: ash::Device,
    pub buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    pub size: u64,
    mapped: Option<NonNull<u8>>,
}

// The mapped pointer refers to host-coherent memory; access is synchronized
// by the frame fences that gate every readback.
unsafe impl Send for VulkanBuffer {}
unsafe impl Sync for VulkanBuffer {}

impl VulkanBuffer {
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_host_visible(&self) -> bool {
        self.mapped.is_some()
    }

    /// The mapped bytes of a host-visible buffer, empty otherwise.
    pub fn mapped_data(&self) -> &[u8] {
        match self.mapped {
            Some(ptr) => unsafe { std::slice::from_raw_parts(ptr.as_ptr(), self.size as usize) },
            None => &[],
        }
    }

    pub fn write_mapped(&self, offset: usize, data: &[u8]) {
        let ptr = self.mapped.expect("write_mapped requires a host-visible buffer");
        assert!(offset + data.len() <= self.size as usize);
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.as_ptr().add(offset), data.len());
        }
    }
}

impl Drop for VulkanBuffer {
    fn drop(&mut self) {
        unsafe {
            if self.mapped.is_some() {
                self.device.unmap_memory(self.memory);
            }
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

impl std::fmt::Debug for VulkanBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanBuffer").field("size", &self.size).finish_non_exhaustive()
    }
}

/// Creates a buffer and binds a dedicated allocation, mapping it when the
/// memory is host-visible.
pub(crate) fn create_buffer_uninitialized(
    device: &ash::Device,
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    size: u64,
    usage: vk::BufferUsageFlags,
    memory_flags: vk::MemoryPropertyFlags,
) -> Result<VulkanBuffer> {
    let size = size.max(1);
    let create_info = vk::BufferCreateInfo::default()
        .size(size)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);
    let buffer = unsafe { device.create_buffer(&create_info, None)? };

    let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
    let memory_type_index = match find_memory_type(memory_properties, requirements.memory_type_bits, memory_flags)
    {
        Ok(index) => index,
        Err(e) => {
            unsafe { device.destroy_buffer(buffer, None) };
            return Err(e);
        }
    };
    let allocate_info = vk::MemoryAllocateInfo::default()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);
    let memory = unsafe { device.allocate_memory(&allocate_info, None)? };
    unsafe {
        device.bind_buffer_memory(buffer, memory, 0)?;
    }

    let mapped = if memory_flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
        let ptr = unsafe { device.map_memory(memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())? };
        NonNull::new(ptr.cast::<u8>())
    } else {
        None
    };

    Ok(VulkanBuffer { device: device.clone(), buffer, memory, size, mapped })
}

/// Creates a buffer holding `data`.
///
/// Permanent buffers live in device-local memory and are filled through a
/// staging buffer recorded into `command_buffer`; transient buffers are
/// host-visible and written directly.
pub(crate) fn create_buffer_with_data(
    device: &ash::Device,
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    data: &[u8],
    usage: BufferUsage,
    lifetime: ResourceLifetime,
    command_buffer: &mut CommandBuffer,
) -> Result<VulkanBuffer> {
    let usage_flags = buffer_usage_to_vk(usage);

    match lifetime {
        ResourceLifetime::Permanent => {
            let staging = create_buffer_uninitialized(
                device,
                memory_properties,
                data.len() as u64,
                vk::BufferUsageFlags::TRANSFER_SRC,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            )?;
            staging.write_mapped(0, data);

            let buffer = create_buffer_uninitialized(
                device,
                memory_properties,
                data.len() as u64,
                usage_flags | vk::BufferUsageFlags::TRANSFER_DST,
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
            )?;

            let region = vk::BufferCopy::default().size(data.len().max(1) as u64);
            let barrier = vk::BufferMemoryBarrier::default()
                .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .dst_access_mask(vk::AccessFlags::SHADER_READ | vk::AccessFlags::VERTEX_ATTRIBUTE_READ)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .buffer(buffer.buffer)
                .size(vk::WHOLE_SIZE);
            unsafe {
                device.cmd_copy_buffer(command_buffer.get(), staging.buffer, buffer.buffer, &[region]);
                device.cmd_pipeline_barrier(
                    command_buffer.get(),
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::VERTEX_INPUT | vk::PipelineStageFlags::VERTEX_SHADER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[barrier],
                    &[],
                );
            }
            command_buffer.take_ownership(staging);
            Ok(buffer)
        }
        ResourceLifetime::Transient => {
            let buffer = create_buffer_uninitialized(
                device,
                memory_properties,
                data.len() as u64,
                usage_flags,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            )?;
            buffer.write_mapped(0, data);
            Ok(buffer)
        }
    }
}
