//! Per-frame fences and semaphores enforcing the frames-in-flight limit.

use ash::vk;

use crate::device::context::{VulkanError, VulkanResult};

/// Synchronization objects for at most `swapchain_size` frames in flight.
///
/// Each frame slot owns one fence (created signaled so the first wait passes)
/// and one semaphore pair ordering acquire → submit → present. The
/// `images_in_flight` table remembers which frame fence last used each
/// swapchain image; a null entry means the image is free.
pub struct Sync {
    device: ash::Device,
    image_available: Vec<vk::Semaphore>,
    render_finished: Vec<vk::Semaphore>,
    frame_fences: Vec<vk::Fence>,
    images_in_flight: Vec<vk::Fence>,
}

impl Sync {
    pub(crate) fn new(device: ash::Device, swapchain_size: usize) -> VulkanResult<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        let fence_info =
            vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        let mut sync = Self {
            device: device.clone(),
            image_available: Vec::with_capacity(swapchain_size),
            render_finished: Vec::with_capacity(swapchain_size),
            frame_fences: Vec::with_capacity(swapchain_size),
            images_in_flight: vec![vk::Fence::null(); swapchain_size],
        };

        for _ in 0..swapchain_size {
            unsafe {
                sync.image_available.push(
                    device
                        .create_semaphore(&semaphore_info, None)
                        .map_err(VulkanError::Api)?,
                );
                sync.render_finished.push(
                    device
                        .create_semaphore(&semaphore_info, None)
                        .map_err(VulkanError::Api)?,
                );
                sync.frame_fences.push(
                    device
                        .create_fence(&fence_info, None)
                        .map_err(VulkanError::Api)?,
                );
            }
        }

        Ok(sync)
    }

    pub fn image_available(&self, frame: usize) -> vk::Semaphore {
        self.image_available[frame]
    }

    pub fn render_finished(&self, frame: usize) -> vk::Semaphore {
        self.render_finished[frame]
    }

    pub fn frame_fence(&self, frame: usize) -> vk::Fence {
        self.frame_fences[frame]
    }

    pub(crate) fn image_in_flight(&self, image_index: usize) -> vk::Fence {
        self.images_in_flight[image_index]
    }

    /// Marks `image_index` as owned by the given frame fence.
    pub(crate) fn mark_image_in_flight(&mut self, image_index: usize, fence: vk::Fence) {
        self.images_in_flight[image_index] = fence;
    }

    /// Forgets image ownership; used when the swapchain is rebuilt.
    pub(crate) fn clear_images_in_flight(&mut self) {
        for fence in &mut self.images_in_flight {
            *fence = vk::Fence::null();
        }
    }

    /// True when the frame's fence has been signaled by the GPU.
    pub fn frame_fence_signaled(&self, frame: usize) -> VulkanResult<bool> {
        unsafe {
            self.device
                .get_fence_status(self.frame_fences[frame])
                .map_err(VulkanError::Api)
        }
    }
}

impl Drop for Sync {
    fn drop(&mut self) {
        unsafe {
            for &semaphore in &self.render_finished {
                self.device.destroy_semaphore(semaphore, None);
            }
            for &semaphore in &self.image_available {
                self.device.destroy_semaphore(semaphore, None);
            }
            for &fence in &self.frame_fences {
                self.device.destroy_fence(fence, None);
            }
        }
    }
}
