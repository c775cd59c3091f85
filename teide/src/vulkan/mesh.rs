//! Device meshes: vertex and index buffers plus layout metadata.

use ash::vk;

use crate::error::Result;
use crate::mesh_data::{Aabb, MeshData, VertexLayout};
use crate::vulkan::buffer::{create_buffer_with_data, VulkanBuffer};
use crate::vulkan::command_buffer::CommandBuffer;
use crate::buffer_data::BufferUsage;

/// A mesh with its uploaded buffers. Indices, when present, are 16-bit.
pub struct VulkanMesh {
    pub vertex_layout: VertexLayout,
    pub vertex_buffer: VulkanBuffer,
    pub index_buffer: Option<VulkanBuffer>,
    pub vertex_count: u32,
    pub index_count: u32,
    pub aabb: Aabb,
}

impl VulkanMesh {
    pub const INDEX_TYPE: vk::IndexType = vk::IndexType::UINT16;
}

impl std::fmt::Debug for VulkanMesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanMesh")
            .field("vertex_count", &self.vertex_count)
            .field("index_count", &self.index_count)
            .finish_non_exhaustive()
    }
}

pub(crate) fn create_mesh_impl(
    device: &ash::Device,
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    data: &MeshData,
    command_buffer: &mut CommandBuffer,
) -> Result<VulkanMesh> {
    let vertex_buffer = create_buffer_with_data(
        device,
        memory_properties,
        &data.vertex_data,
        BufferUsage::Vertex,
        data.lifetime,
        command_buffer,
    )?;

    let (index_buffer, index_count) = if data.index_data.is_empty() {
        (None, 0)
    } else {
        let buffer = create_buffer_with_data(
            device,
            memory_properties,
            &data.index_data,
            BufferUsage::Index,
            data.lifetime,
            command_buffer,
        )?;
        (Some(buffer), (data.index_data.len() / std::mem::size_of::<u16>()) as u32)
    };

    Ok(VulkanMesh {
        vertex_layout: data.vertex_layout.clone(),
        vertex_buffer,
        index_buffer,
        vertex_count: data.vertex_count,
        index_count,
        aabb: data.aabb,
    })
}
