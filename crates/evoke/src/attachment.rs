//! Role-tagged render-target attachments.
//!
//! An attachment's role fixes its format, usage and load/store ops at
//! construction. Framebuffer-role attachments own no image (the swapchain
//! provides one per presentable image); color and depth roles allocate a
//! device-local image that is torn down and reallocated on resize. Image
//! state lives behind a `RefCell` so `Rc`-shared attachments survive that
//! recreation in place.

use std::cell::RefCell;

use ash::vk;

use crate::device::context::{RawContext, VulkanResult};
use crate::device::Device;
use crate::util;

/// The role an attachment plays within a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    /// Presented swapchain target: cleared on load, stored, PRESENT layout.
    Framebuffer,
    /// Intermediate device-local color target, readable as an input
    /// attachment by a later subpass.
    Color,
    /// Depth-stencil target in the device's selected depth format.
    Depth,
}

struct AttachmentImage {
    device: ash::Device,
    image: vk::Image,
    view: vk::ImageView,
    memory: vk::DeviceMemory,
}

impl Drop for AttachmentImage {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// One render-pass attachment: description, clear value and (for color and
/// depth roles) the backing image.
pub struct Attachment {
    index: u32,
    kind: AttachmentKind,
    description: vk::AttachmentDescription,
    clear_value: vk::ClearValue,
    ctx: Option<RawContext>,
    image: RefCell<Option<AttachmentImage>>,
}

impl Attachment {
    /// A presentable framebuffer attachment. Owns no image, so no device is
    /// needed; the swapchain supplies the image views.
    pub fn framebuffer(index: u32) -> Self {
        let description = vk::AttachmentDescription::builder()
            .format(vk::Format::B8G8R8A8_SRGB)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .build();

        Self {
            index,
            kind: AttachmentKind::Framebuffer,
            description,
            clear_value: vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.0, 0.0, 0.0, 1.0],
                },
            },
            ctx: None,
            image: RefCell::new(None),
        }
    }

    /// An intermediate color attachment readable as an input attachment.
    pub fn color(device: &Device, index: u32) -> VulkanResult<Self> {
        let description = vk::AttachmentDescription::builder()
            .format(vk::Format::R8G8B8A8_UNORM)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::DONT_CARE)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .build();

        let attachment = Self {
            index,
            kind: AttachmentKind::Color,
            description,
            clear_value: vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.0, 0.0, 0.0, 1.0],
                },
            },
            ctx: Some(device.raw_context().clone()),
            image: RefCell::new(None),
        };
        attachment.allocate_image(device.extent())?;
        Ok(attachment)
    }

    /// A depth-stencil attachment in the device's selected depth format.
    pub fn depth(device: &Device, index: u32) -> VulkanResult<Self> {
        let depth_format = device.depth_format();
        let description = vk::AttachmentDescription::builder()
            .format(depth_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .build();

        let attachment = Self {
            index,
            kind: AttachmentKind::Depth,
            description,
            clear_value: vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 1,
                },
            },
            ctx: Some(device.raw_context().clone()),
            image: RefCell::new(None),
        };
        attachment.allocate_image(device.extent())?;
        Ok(attachment)
    }

    fn allocate_image(&self, extent: vk::Extent2D) -> VulkanResult<()> {
        let ctx = match &self.ctx {
            Some(ctx) => ctx,
            None => return Ok(()),
        };

        let (format, usage, aspect) = match self.kind {
            AttachmentKind::Framebuffer => return Ok(()),
            AttachmentKind::Color => (
                vk::Format::R8G8B8A8_UNORM,
                vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::INPUT_ATTACHMENT,
                vk::ImageAspectFlags::COLOR,
            ),
            AttachmentKind::Depth => (
                ctx.depth_format,
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
                    | vk::ImageUsageFlags::INPUT_ATTACHMENT,
                vk::ImageAspectFlags::DEPTH,
            ),
        };

        let (image, memory) = util::create_image(
            ctx,
            extent,
            format,
            vk::ImageTiling::OPTIMAL,
            usage,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        let view = util::create_image_view(&ctx.device, image, format, aspect)?;

        *self.image.borrow_mut() = Some(AttachmentImage {
            device: ctx.device.clone(),
            image,
            view,
            memory,
        });
        Ok(())
    }

    /// Rebuilds the backing image for the new extent. A no-op for
    /// framebuffer-role attachments, whose images belong to the swapchain.
    pub(crate) fn recreate(&self, extent: vk::Extent2D) -> VulkanResult<()> {
        if self.kind == AttachmentKind::Framebuffer {
            return Ok(());
        }
        // Drop the old image before allocating its replacement.
        *self.image.borrow_mut() = None;
        self.allocate_image(extent)
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn kind(&self) -> AttachmentKind {
        self.kind
    }

    pub fn description(&self) -> vk::AttachmentDescription {
        self.description
    }

    pub fn clear_value(&self) -> vk::ClearValue {
        self.clear_value
    }

    /// Current image view; `None` for framebuffer-role attachments.
    pub fn view(&self) -> Option<vk::ImageView> {
        self.image.borrow().as_ref().map(|image| image.view)
    }

    pub fn color_reference(&self) -> vk::AttachmentReference {
        vk::AttachmentReference {
            attachment: self.index,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }
    }

    pub fn depth_reference(&self) -> vk::AttachmentReference {
        vk::AttachmentReference {
            attachment: self.index,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        }
    }

    pub fn input_reference(&self) -> vk::AttachmentReference {
        vk::AttachmentReference {
            attachment: self.index,
            layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framebuffer_attachment_presents() {
        let attachment = Attachment::framebuffer(0);
        let desc = attachment.description();
        assert_eq!(desc.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(desc.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(desc.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(attachment.kind(), AttachmentKind::Framebuffer);
        assert!(attachment.view().is_none());
    }

    #[test]
    fn references_carry_the_attachment_index() {
        let attachment = Attachment::framebuffer(3);
        assert_eq!(attachment.color_reference().attachment, 3);
        assert_eq!(
            attachment.color_reference().layout,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        );
        assert_eq!(
            attachment.depth_reference().layout,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );
        assert_eq!(
            attachment.input_reference().layout,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        );
    }

    #[test]
    fn framebuffer_recreate_is_a_no_op() {
        let attachment = Attachment::framebuffer(0);
        attachment
            .recreate(vk::Extent2D {
                width: 64,
                height: 64,
            })
            .unwrap();
        assert!(attachment.view().is_none());
    }
}
