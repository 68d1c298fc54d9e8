//! Shared allocation and one-shot command helpers.

use ash::vk;

use crate::device::context::{RawContext, VulkanError, VulkanResult};

/// Finds a memory type matching the filter and the desired properties.
pub(crate) fn find_memory_type(
    ctx: &RawContext,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    let mem_properties = unsafe {
        ctx.instance
            .get_physical_device_memory_properties(ctx.physical_device)
    };

    for i in 0..mem_properties.memory_type_count {
        if (type_filter & (1 << i)) != 0
            && (mem_properties.memory_types[i as usize].property_flags & properties) == properties
        {
            return Ok(i);
        }
    }

    Err(VulkanError::NoSuitableMemoryType)
}

/// Creates a buffer and binds it to freshly allocated memory.
pub(crate) fn create_buffer(
    ctx: &RawContext,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    properties: vk::MemoryPropertyFlags,
) -> VulkanResult<(vk::Buffer, vk::DeviceMemory)> {
    let buffer_info = vk::BufferCreateInfo::builder()
        .size(size)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let buffer = unsafe {
        ctx.device
            .create_buffer(&buffer_info, None)
            .map_err(VulkanError::Api)?
    };

    let mem_requirements = unsafe { ctx.device.get_buffer_memory_requirements(buffer) };
    let memory_type_index =
        find_memory_type(ctx, mem_requirements.memory_type_bits, properties)?;

    let alloc_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(mem_requirements.size)
        .memory_type_index(memory_type_index);

    let memory = unsafe {
        match ctx.device.allocate_memory(&alloc_info, None) {
            Ok(memory) => memory,
            Err(e) => {
                ctx.device.destroy_buffer(buffer, None);
                return Err(VulkanError::Api(e));
            }
        }
    };

    unsafe {
        if let Err(e) = ctx.device.bind_buffer_memory(buffer, memory, 0) {
            ctx.device.destroy_buffer(buffer, None);
            ctx.device.free_memory(memory, None);
            return Err(VulkanError::Api(e));
        }
    }

    Ok((buffer, memory))
}

/// Creates a 2D image and binds it to freshly allocated memory.
pub(crate) fn create_image(
    ctx: &RawContext,
    extent: vk::Extent2D,
    format: vk::Format,
    tiling: vk::ImageTiling,
    usage: vk::ImageUsageFlags,
    properties: vk::MemoryPropertyFlags,
) -> VulkanResult<(vk::Image, vk::DeviceMemory)> {
    let image_info = vk::ImageCreateInfo::builder()
        .image_type(vk::ImageType::TYPE_2D)
        .extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .format(format)
        .tiling(tiling)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .usage(usage)
        .samples(vk::SampleCountFlags::TYPE_1)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let image = unsafe {
        ctx.device
            .create_image(&image_info, None)
            .map_err(VulkanError::Api)?
    };

    let mem_requirements = unsafe { ctx.device.get_image_memory_requirements(image) };
    let memory_type_index =
        find_memory_type(ctx, mem_requirements.memory_type_bits, properties)?;

    let alloc_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(mem_requirements.size)
        .memory_type_index(memory_type_index);

    let memory = unsafe {
        match ctx.device.allocate_memory(&alloc_info, None) {
            Ok(memory) => memory,
            Err(e) => {
                ctx.device.destroy_image(image, None);
                return Err(VulkanError::Api(e));
            }
        }
    };

    unsafe {
        if let Err(e) = ctx.device.bind_image_memory(image, memory, 0) {
            ctx.device.destroy_image(image, None);
            ctx.device.free_memory(memory, None);
            return Err(VulkanError::Api(e));
        }
    }

    Ok((image, memory))
}

/// Creates an image view over a single mip level and layer.
pub(crate) fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
    aspect_mask: vk::ImageAspectFlags,
) -> VulkanResult<vk::ImageView> {
    let view_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe {
        device
            .create_image_view(&view_info, None)
            .map_err(VulkanError::Api)
    }
}

/// Allocates a primary command buffer from `pool` and begins recording it
/// for one-time submission.
pub(crate) fn begin_single_time_commands(
    device: &ash::Device,
    pool: vk::CommandPool,
) -> VulkanResult<vk::CommandBuffer> {
    let alloc_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);

    let command_buffer = unsafe {
        device
            .allocate_command_buffers(&alloc_info)
            .map_err(VulkanError::Api)?[0]
    };

    let begin_info =
        vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

    unsafe {
        device
            .begin_command_buffer(command_buffer, &begin_info)
            .map_err(VulkanError::Api)?;
    }

    Ok(command_buffer)
}

/// Ends the command buffer, submits it to `queue`, waits for the queue to
/// drain and frees the buffer.
pub(crate) fn end_single_time_commands(
    device: &ash::Device,
    queue: vk::Queue,
    pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
) -> VulkanResult<()> {
    unsafe {
        device
            .end_command_buffer(command_buffer)
            .map_err(VulkanError::Api)?;

        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);
        device
            .queue_submit(queue, &[submit_info.build()], vk::Fence::null())
            .map_err(VulkanError::Api)?;
        device.queue_wait_idle(queue).map_err(VulkanError::Api)?;

        device.free_command_buffers(pool, &command_buffers);
    }
    Ok(())
}

/// Repacks SPIR-V bytes into words, validating the blob length.
pub(crate) fn spirv_words(bytes: &[u8]) -> VulkanResult<Vec<u32>> {
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        return Err(VulkanError::InitializationFailed(
            "SPIR-V bytecode length is not a multiple of four".to_string(),
        ));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spirv_words_repacks_bytes() {
        let bytes = 0x0723_0203u32.to_ne_bytes();
        let words = spirv_words(&bytes).unwrap();
        assert_eq!(words, vec![0x0723_0203]);
    }

    #[test]
    fn spirv_words_rejects_truncated_blobs() {
        assert!(spirv_words(&[1, 2, 3]).is_err());
        assert!(spirv_words(&[]).is_err());
    }
}
