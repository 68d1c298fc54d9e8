//! Command pools and buffers.
//!
//! One pool per worker thread: no two threads ever record through the same
//! pool, which removes pool-contention races by construction. Primary
//! buffers (one per swapchain image) come from pool 0; secondary buffers are
//! allocated during draw recording from each worker's own pool and tracked
//! here so a re-record can free the previous generation.

use ash::vk;

use crate::device::context::{VulkanError, VulkanResult};

pub struct Commands {
    device: ash::Device,
    pools: Vec<vk::CommandPool>,
    primary: Vec<vk::CommandBuffer>,
    secondary: Vec<Vec<vk::CommandBuffer>>,
}

impl Commands {
    pub(crate) fn new(
        device: ash::Device,
        queue_family_index: u32,
        swapchain_size: usize,
        num_threads: usize,
    ) -> VulkanResult<Self> {
        let mut pools = Vec::with_capacity(num_threads);
        for _ in 0..num_threads {
            let pool_info = vk::CommandPoolCreateInfo::builder()
                .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
                .queue_family_index(queue_family_index);
            let pool = unsafe {
                device
                    .create_command_pool(&pool_info, None)
                    .map_err(VulkanError::Api)?
            };
            pools.push(pool);
        }

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pools[0])
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(swapchain_size as u32);
        let primary = unsafe {
            device
                .allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device,
            pools,
            primary,
            secondary: vec![Vec::new(); num_threads],
        })
    }

    /// Per-thread command pools; index by worker index.
    pub fn pools(&self) -> &[vk::CommandPool] {
        &self.pools
    }

    /// Per-swapchain-image primary command buffers.
    pub fn primary(&self) -> &[vk::CommandBuffer] {
        &self.primary
    }

    /// Remembers a recorded secondary buffer so it stays alive until the
    /// next re-record frees it.
    pub(crate) fn track_secondary(&mut self, thread: usize, buffer: vk::CommandBuffer) {
        self.secondary[thread].push(buffer);
    }

    /// Reallocates the primary buffers for a new swapchain image count and
    /// frees all tracked secondaries. The caller must have waited for the
    /// device to go idle first.
    pub(crate) fn resize(&mut self, swapchain_size: usize) -> VulkanResult<()> {
        self.free_secondary();
        unsafe {
            self.device.free_command_buffers(self.pools[0], &self.primary);
        }
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.pools[0])
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(swapchain_size as u32);
        self.primary = unsafe {
            self.device
                .allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::Api)?
        };
        Ok(())
    }

    /// Frees every tracked secondary buffer. The caller must have waited for
    /// the device to go idle first.
    pub(crate) fn free_secondary(&mut self) {
        for (pool, buffers) in self.pools.iter().zip(&mut self.secondary) {
            if !buffers.is_empty() {
                unsafe {
                    self.device.free_command_buffers(*pool, buffers);
                }
                buffers.clear();
            }
        }
    }
}

impl Drop for Commands {
    fn drop(&mut self) {
        unsafe {
            // Destroying a pool frees all buffers allocated from it.
            for &pool in &self.pools {
                self.device.destroy_command_pool(pool, None);
            }
        }
    }
}
