//! Command buffer wrapper carrying resource references, and the per-worker
//! pools that recycle command buffers every frame.

use ash::vk;

use crate::handle::Handle;
use crate::vulkan::buffer::VulkanBuffer;
use crate::vulkan::mesh::VulkanMesh;
use crate::vulkan::parameter_block::VulkanParameterBlock;
use crate::vulkan::pipeline::VulkanPipeline;
use crate::vulkan::texture::VulkanTexture;

/// Strong references held by a command buffer. They keep every referenced
/// resource alive until the submission's completion callback drops them,
/// strictly after the GPU has finished executing the commands.
#[derive(Default)]
#[allow(dead_code)]
pub struct CommandBufferResources {
    textures: Vec<Handle<VulkanTexture>>,
    buffers: Vec<Handle<VulkanBuffer>>,
    meshes: Vec<Handle<VulkanMesh>>,
    parameter_blocks: Vec<Handle<VulkanParameterBlock>>,
    pipelines: Vec<Handle<VulkanPipeline>>,
    owned_buffers: Vec<VulkanBuffer>,
}

/// A command buffer in the recording state. Created from a per-worker pool;
/// the wrapped `vk::CommandBuffer` returns to its pool when the frame slot
/// is recycled.
pub struct CommandBuffer {
    device: ash::Device,
    command_buffer: vk::CommandBuffer,
    resources: CommandBufferResources,
}

impl CommandBuffer {
    pub(crate) fn new(device: ash::Device, command_buffer: vk::CommandBuffer) -> Self {
        let begin_info =
            vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            device
                .begin_command_buffer(command_buffer, &begin_info)
                .expect("failed to begin command buffer");
        }
        Self { device, command_buffer, resources: CommandBufferResources::default() }
    }

    pub fn get(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn add_texture(&mut self, texture: &Handle<VulkanTexture>) {
        self.resources.textures.push(texture.clone());
    }

    pub fn add_buffer(&mut self, buffer: &Handle<VulkanBuffer>) {
        self.resources.buffers.push(buffer.clone());
    }

    pub fn add_mesh(&mut self, mesh: &Handle<VulkanMesh>) {
        self.resources.meshes.push(mesh.clone());
    }

    pub fn add_parameter_block(&mut self, parameter_block: &Handle<VulkanParameterBlock>) {
        self.resources.parameter_blocks.push(parameter_block.clone());
    }

    pub fn add_pipeline(&mut self, pipeline: &Handle<VulkanPipeline>) {
        self.resources.pipelines.push(pipeline.clone());
    }

    /// Takes ownership of a staging buffer until the submission completes.
    pub fn take_ownership(&mut self, buffer: VulkanBuffer) {
        self.resources.owned_buffers.push(buffer);
    }

    /// Ends recording and releases the raw command buffer together with the
    /// references it accumulated.
    pub fn finish(self) -> (vk::CommandBuffer, CommandBufferResources) {
        unsafe {
            self.device.end_command_buffer(self.command_buffer).expect("failed to end command buffer");
        }
        (self.command_buffer, self.resources)
    }
}

/// Recycling allocator for one worker thread and one frame slot. Reset as a
/// unit when the frame slot is reused.
pub struct CommandBufferPool {
    pool: vk::CommandPool,
    buffers: Vec<vk::CommandBuffer>,
    next: usize,
}

impl CommandBufferPool {
    pub fn new(device: &ash::Device, queue_family_index: u32) -> Self {
        let create_info = vk::CommandPoolCreateInfo::default().queue_family_index(queue_family_index);
        let pool = unsafe {
            device.create_command_pool(&create_info, None).expect("failed to create command pool")
        };
        Self { pool, buffers: Vec::new(), next: 0 }
    }

    /// Returns a command buffer in the initial state, allocating on demand.
    pub fn acquire(&mut self, device: &ash::Device) -> vk::CommandBuffer {
        if self.next == self.buffers.len() {
            let alloc_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(self.pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);
            let allocated = unsafe {
                device.allocate_command_buffers(&alloc_info).expect("failed to allocate command buffer")
            };
            self.buffers.push(allocated[0]);
        }
        let command_buffer = self.buffers[self.next];
        self.next += 1;
        command_buffer
    }

    /// Returns every allocated command buffer to the initial state.
    pub fn reset(&mut self, device: &ash::Device) {
        unsafe {
            device
                .reset_command_pool(self.pool, vk::CommandPoolResetFlags::empty())
                .expect("failed to reset command pool");
        }
        self.next = 0;
    }

    /// Destroys the pool. Called by the scheduler before the device goes
    /// away; `CommandBufferPool` has no access to the device in `drop`.
    pub fn destroy(&mut self, device: &ash::Device) {
        unsafe {
            device.destroy_command_pool(self.pool, None);
        }
        self.pool = vk::CommandPool::null();
        self.buffers.clear();
    }
}
