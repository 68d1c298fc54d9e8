//! Per-swapchain-image framebuffers.

use ash::vk;

use crate::attachment::AttachmentKind;
use crate::device::context::{VulkanError, VulkanResult};
use crate::device::swapchain::Swapchain;
use crate::pass::RenderPass;

/// One framebuffer per swapchain image, assembling the render pass's
/// attachment views in index order. The framebuffer-role slot takes the
/// swapchain's view for that image; color/depth slots take the attachment's
/// own view.
pub struct Framebuffer {
    device: ash::Device,
    framebuffers: Vec<vk::Framebuffer>,
}

impl Framebuffer {
    pub(crate) fn new(
        device: ash::Device,
        render_pass: &RenderPass,
        swapchain: &Swapchain,
    ) -> VulkanResult<Self> {
        let extent = swapchain.extent();
        let mut framebuffers = Vec::with_capacity(swapchain.len());

        for &swapchain_view in swapchain.image_views() {
            let mut views = Vec::with_capacity(render_pass.attachments().len());
            for attachment in render_pass.attachments() {
                let view = match attachment.kind() {
                    AttachmentKind::Framebuffer => swapchain_view,
                    _ => attachment.view().ok_or_else(|| VulkanError::InvalidOperation {
                        reason: format!(
                            "attachment {} has no backing image",
                            attachment.index()
                        ),
                    })?,
                };
                views.push(view);
            }

            let create_info = vk::FramebufferCreateInfo::builder()
                .render_pass(render_pass.handle())
                .attachments(&views)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            let framebuffer = unsafe {
                device
                    .create_framebuffer(&create_info, None)
                    .map_err(|_| {
                        VulkanError::InitializationFailed(
                            "failed to create framebuffer".to_string(),
                        )
                    })?
            };
            framebuffers.push(framebuffer);
        }

        Ok(Self {
            device,
            framebuffers,
        })
    }

    pub fn handles(&self) -> &[vk::Framebuffer] {
        &self.framebuffers
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            for &framebuffer in &self.framebuffers {
                self.device.destroy_framebuffer(framebuffer, None);
            }
        }
    }
}
