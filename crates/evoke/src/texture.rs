//! Image-file textures: decode, upload, sample.

use std::path::Path;

use ash::vk;

use crate::device::context::{RawContext, VulkanError, VulkanResult};
use crate::device::Device;
use crate::util;

/// A sampled 2D texture uploaded from an image file.
///
/// Decoding goes through the `image` crate; texels are converted to RGBA8,
/// shuttled through a staging buffer and transitioned
/// UNDEFINED → TRANSFER_DST → SHADER_READ_ONLY.
pub struct Texture {
    device: ash::Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
    sampler: vk::Sampler,
}

impl Texture {
    pub fn new<P: AsRef<Path>>(device: &Device, path: P) -> VulkanResult<Self> {
        let decoded = image::open(path.as_ref())
            .map_err(|e| {
                VulkanError::InitializationFailed(format!(
                    "failed to load texture image {}: {e}",
                    path.as_ref().display()
                ))
            })?
            .to_rgba8();
        let (width, height) = decoded.dimensions();
        let texels = decoded.into_raw();

        let ctx = device.raw_context().clone();
        let extent = vk::Extent2D { width, height };
        let size = texels.len() as vk::DeviceSize;

        let (staging, staging_memory) = util::create_buffer(
            &ctx,
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        let upload = (|| -> VulkanResult<(vk::Image, vk::DeviceMemory)> {
            unsafe {
                let mapped = ctx
                    .device
                    .map_memory(staging_memory, 0, size, vk::MemoryMapFlags::empty())
                    .map_err(VulkanError::Api)?;
                std::ptr::copy_nonoverlapping(texels.as_ptr(), mapped.cast::<u8>(), texels.len());
                ctx.device.unmap_memory(staging_memory);
            }

            let (image, memory) = util::create_image(
                &ctx,
                extent,
                vk::Format::R8G8B8A8_SRGB,
                vk::ImageTiling::OPTIMAL,
                vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
            )?;

            let pool = device.command_pools()[0];
            let queue = device.graphics_queue();

            transition_image_layout(
                &ctx,
                pool,
                queue,
                image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            )?;
            copy_buffer_to_image(&ctx, pool, queue, staging, image, extent)?;
            transition_image_layout(
                &ctx,
                pool,
                queue,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )?;

            Ok((image, memory))
        })();

        unsafe {
            ctx.device.destroy_buffer(staging, None);
            ctx.device.free_memory(staging_memory, None);
        }
        let (image, memory) = upload?;

        let view = util::create_image_view(
            &ctx.device,
            image,
            vk::Format::R8G8B8A8_SRGB,
            vk::ImageAspectFlags::COLOR,
        )?;

        let sampler_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(true)
            .max_anisotropy(16.0)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR);

        let sampler = unsafe {
            ctx.device
                .create_sampler(&sampler_info, None)
                .map_err(|_| {
                    VulkanError::InitializationFailed(
                        "failed to create texture sampler".to_string(),
                    )
                })?
        };

        Ok(Self {
            device: ctx.device,
            image,
            memory,
            view,
            sampler,
        })
    }

    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
            self.device.destroy_image_view(self.view, None);
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

fn transition_image_layout(
    ctx: &RawContext,
    pool: vk::CommandPool,
    queue: vk::Queue,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> VulkanResult<()> {
    let (src_access, dst_access, src_stage, dst_stage) = match (old_layout, new_layout) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => (
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
        ),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => (
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        ),
        _ => {
            return Err(VulkanError::InvalidOperation {
                reason: "unsupported image layout transition".to_string(),
            })
        }
    };

    let command = util::begin_single_time_commands(&ctx.device, pool)?;

    let barrier = vk::ImageMemoryBarrier::builder()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
        .src_access_mask(src_access)
        .dst_access_mask(dst_access);

    unsafe {
        ctx.device.cmd_pipeline_barrier(
            command,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier.build()],
        );
    }

    util::end_single_time_commands(&ctx.device, queue, pool, command)
}

fn copy_buffer_to_image(
    ctx: &RawContext,
    pool: vk::CommandPool,
    queue: vk::Queue,
    buffer: vk::Buffer,
    image: vk::Image,
    extent: vk::Extent2D,
) -> VulkanResult<()> {
    let command = util::begin_single_time_commands(&ctx.device, pool)?;

    let region = vk::BufferImageCopy::builder()
        .buffer_offset(0)
        .buffer_row_length(0)
        .buffer_image_height(0)
        .image_subresource(vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        })
        .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
        .image_extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        });

    unsafe {
        ctx.device.cmd_copy_buffer_to_image(
            command,
            buffer,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region.build()],
        );
    }

    util::end_single_time_commands(&ctx.device, queue, pool, command)
}
