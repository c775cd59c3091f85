//! Suballocating device-memory pools for attachment images.
//!
//! Each memory type gets its own list of fixed-size pools that are bump
//! allocated and only ever freed wholesale, either on swapchain rebuild
//! (surface-scoped allocators) or at destruction.

use std::sync::Mutex;

use ash::vk;

use crate::error::{Error, Result};

const POOL_SIZE: vk::DeviceSize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct MemoryAllocation {
    pub memory: vk::DeviceMemory,
    pub offset: vk::DeviceSize,
    pub size: vk::DeviceSize,
}

struct MemoryPool {
    memory_type_index: u32,
    memory: vk::DeviceMemory,
    capacity: vk::DeviceSize,
    used: vk::DeviceSize,
}

pub struct MemoryAllocator {
    device: ash::Device,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    pools: Mutex<Vec<MemoryPool>>,
}

impl MemoryAllocator {
    pub fn new(device: ash::Device, memory_properties: vk::PhysicalDeviceMemoryProperties) -> Self {
        Self { device, memory_properties, pools: Mutex::new(Vec::new()) }
    }

    /// Suballocates from a pool of a memory type compatible with
    /// `requirements` and `flags`, growing a new pool when needed.
    pub fn allocate(
        &self,
        requirements: vk::MemoryRequirements,
        flags: vk::MemoryPropertyFlags,
    ) -> Result<MemoryAllocation> {
        let memory_type_index = (0..self.memory_properties.memory_type_count)
            .find(|&i| {
                let suitable = (requirements.memory_type_bits & (1 << i)) != 0;
                let memory_type = &self.memory_properties.memory_types[i as usize];
                suitable && memory_type.property_flags.contains(flags)
            })
            .ok_or_else(|| Error::DeviceCreation(format!("no suitable memory type for flags {flags:?}")))?;

        let mut pools = self.pools.lock().unwrap();
        for pool in pools.iter_mut() {
            if pool.memory_type_index != memory_type_index {
                continue;
            }
            let offset = align_to(pool.used, requirements.alignment);
            if offset + requirements.size <= pool.capacity {
                pool.used = offset + requirements.size;
                return Ok(MemoryAllocation { memory: pool.memory, offset, size: requirements.size });
            }
        }

        let capacity = POOL_SIZE.max(requirements.size);
        let allocate_info = vk::MemoryAllocateInfo::default()
            .allocation_size(capacity)
            .memory_type_index(memory_type_index);
        let memory = unsafe { self.device.allocate_memory(&allocate_info, None)? };
        pools.push(MemoryPool { memory_type_index, memory, capacity, used: requirements.size });
        Ok(MemoryAllocation { memory, offset: 0, size: requirements.size })
    }

    /// Frees every pool. All allocations handed out become invalid; callers
    /// must have destroyed the resources bound to them.
    pub fn deallocate_all(&self) {
        let mut pools = self.pools.lock().unwrap();
        for pool in pools.drain(..) {
            unsafe {
                self.device.free_memory(pool.memory, None);
            }
        }
    }
}

impl Drop for MemoryAllocator {
    fn drop(&mut self) {
        self.deallocate_all();
    }
}

fn align_to(offset: vk::DeviceSize, alignment: vk::DeviceSize) -> vk::DeviceSize {
    (offset + alignment - 1) / alignment * alignment
}
