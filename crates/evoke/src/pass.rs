//! Subpasses and render passes.
//!
//! A subpass references disjoint sets of color, depth and input attachments
//! and declares ordering dependencies on earlier subpasses by index. Only
//! forward references are expressible, so the dependency graph is acyclic by
//! construction. The render pass aggregates attachments by their `index`
//! field (which callers keep contiguous from 0) and serializes against prior
//! frames with one implicit EXTERNAL → 0 dependency.

use std::rc::Rc;

use ash::vk;

use crate::attachment::Attachment;
use crate::device::context::{VulkanError, VulkanResult};
use crate::device::Device;

/// One stage of a render pass.
pub struct Subpass {
    index: u32,
    dependencies: Vec<vk::SubpassDependency>,
    color_attachments: Vec<Rc<Attachment>>,
    depth_attachments: Vec<Rc<Attachment>>,
    input_attachments: Vec<Rc<Attachment>>,
    color_references: Vec<vk::AttachmentReference>,
    depth_references: Vec<vk::AttachmentReference>,
    input_references: Vec<vk::AttachmentReference>,
}

impl Subpass {
    /// Builds a subpass at `index` that waits on each subpass in
    /// `dependencies` before reading its color output as an input.
    pub fn new(
        index: u32,
        dependencies: &[u32],
        color_attachments: Vec<Rc<Attachment>>,
        depth_attachments: Vec<Rc<Attachment>>,
        input_attachments: Vec<Rc<Attachment>>,
    ) -> Self {
        let color_references = color_attachments
            .iter()
            .map(|a| a.color_reference())
            .collect();
        let depth_references = depth_attachments
            .iter()
            .map(|a| a.depth_reference())
            .collect();
        let input_references = input_attachments
            .iter()
            .map(|a| a.input_reference())
            .collect();

        let dependencies = dependencies
            .iter()
            .map(|&src| Self::translate_dependency(src, index))
            .collect();

        Self {
            index,
            dependencies,
            color_attachments,
            depth_attachments,
            input_attachments,
            color_references,
            depth_references,
            input_references,
        }
    }

    /// "Wait for subpass `src`'s color output before fragment-shader reads":
    /// the one dependency shape this wrapper supports.
    fn translate_dependency(src: u32, dst: u32) -> vk::SubpassDependency {
        vk::SubpassDependency {
            src_subpass: src,
            dst_subpass: dst,
            src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_stage_mask: vk::PipelineStageFlags::FRAGMENT_SHADER,
            src_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            dst_access_mask: vk::AccessFlags::INPUT_ATTACHMENT_READ,
            dependency_flags: vk::DependencyFlags::BY_REGION,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn has_depth_attachment(&self) -> bool {
        !self.depth_attachments.is_empty()
    }

    pub(crate) fn dependencies(&self) -> &[vk::SubpassDependency] {
        &self.dependencies
    }

    pub(crate) fn attachments(&self) -> impl Iterator<Item = &Rc<Attachment>> {
        self.color_attachments
            .iter()
            .chain(self.depth_attachments.iter())
            .chain(self.input_attachments.iter())
    }

    /// Description pointing into this subpass's reference lists. Valid only
    /// while `self` is borrowed, which `RenderPass::new` guarantees.
    fn description(&self) -> vk::SubpassDescription {
        let mut builder = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&self.color_references)
            .input_attachments(&self.input_references);
        if let Some(depth) = self.depth_references.first() {
            builder = builder.depth_stencil_attachment(depth);
        }
        builder.build()
    }

    #[cfg(test)]
    pub(crate) fn reference_counts(&self) -> (usize, usize, usize) {
        (
            self.color_references.len(),
            self.depth_references.len(),
            self.input_references.len(),
        )
    }
}

/// A compiled render pass over an ordered set of subpasses.
pub struct RenderPass {
    device: ash::Device,
    render_pass: vk::RenderPass,
    attachments: Vec<Rc<Attachment>>,
    subpasses: Vec<Subpass>,
    clear_values: Vec<vk::ClearValue>,
}

impl RenderPass {
    /// Creates the render pass. `attachments` must carry contiguous indices
    /// starting at 0; they are sorted into index order here so clear values
    /// and framebuffer views line up with the descriptions.
    pub fn new(
        device: &Device,
        mut attachments: Vec<Rc<Attachment>>,
        subpasses: Vec<Subpass>,
    ) -> VulkanResult<Self> {
        if subpasses.is_empty() {
            return Err(VulkanError::InvalidOperation {
                reason: "render pass needs at least one subpass".to_string(),
            });
        }

        attachments.sort_by_key(|a| a.index());
        for (position, attachment) in attachments.iter().enumerate() {
            if attachment.index() as usize != position {
                return Err(VulkanError::InvalidOperation {
                    reason: format!(
                        "attachment indices must be contiguous from 0, found {} at position {}",
                        attachment.index(),
                        position
                    ),
                });
            }
        }

        let descriptions: Vec<vk::AttachmentDescription> =
            attachments.iter().map(|a| a.description()).collect();
        let clear_values: Vec<vk::ClearValue> =
            attachments.iter().map(|a| a.clear_value()).collect();

        let subpass_descriptions: Vec<vk::SubpassDescription> =
            subpasses.iter().map(|s| s.description()).collect();

        // Serialize subpass 0 against the previous frame's use of the
        // attachments, then append the declared cross-subpass dependencies.
        let mut dependencies = vec![vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            src_access_mask: vk::AccessFlags::empty(),
            dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            dependency_flags: vk::DependencyFlags::empty(),
        }];
        for subpass in &subpasses {
            dependencies.extend_from_slice(subpass.dependencies());
        }

        let create_info = vk::RenderPassCreateInfo::builder()
            .attachments(&descriptions)
            .subpasses(&subpass_descriptions)
            .dependencies(&dependencies);

        let render_pass = unsafe {
            device
                .ash_device()
                .create_render_pass(&create_info, None)
                .map_err(|_| {
                    VulkanError::InitializationFailed("failed to create render pass".to_string())
                })?
        };

        Ok(Self {
            device: device.ash_device().clone(),
            render_pass,
            attachments,
            subpasses,
            clear_values,
        })
    }

    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Clear values ordered by attachment index.
    pub fn clear_values(&self) -> &[vk::ClearValue] {
        &self.clear_values
    }

    pub fn attachments(&self) -> &[Rc<Attachment>] {
        &self.attachments
    }

    pub fn subpass(&self, index: usize) -> &Subpass {
        &self.subpasses[index]
    }

    pub fn num_subpasses(&self) -> usize {
        self.subpasses.len()
    }

    /// Rebuilds the color/depth attachment images for a new extent. The
    /// render pass object itself only depends on formats, so it survives.
    pub(crate) fn recreate_attachments(&self, extent: vk::Extent2D) -> VulkanResult<()> {
        for attachment in &self.attachments {
            attachment.recreate(extent)?;
        }
        Ok(())
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_render_pass(self.render_pass, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_translation_uses_fixed_masks() {
        let dep = Subpass::translate_dependency(0, 1);
        assert_eq!(dep.src_subpass, 0);
        assert_eq!(dep.dst_subpass, 1);
        assert_eq!(
            dep.src_stage_mask,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        );
        assert_eq!(dep.dst_stage_mask, vk::PipelineStageFlags::FRAGMENT_SHADER);
        assert_eq!(dep.src_access_mask, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
        assert_eq!(dep.dst_access_mask, vk::AccessFlags::INPUT_ATTACHMENT_READ);
        assert_eq!(dep.dependency_flags, vk::DependencyFlags::BY_REGION);
    }

    #[test]
    fn subpass_collects_references_by_role() {
        let framebuffer = Rc::new(Attachment::framebuffer(0));
        let other = Rc::new(Attachment::framebuffer(1));

        let subpass = Subpass::new(
            1,
            &[0],
            vec![Rc::clone(&framebuffer)],
            Vec::new(),
            vec![Rc::clone(&other)],
        );

        assert_eq!(subpass.reference_counts(), (1, 0, 1));
        assert!(!subpass.has_depth_attachment());
        assert_eq!(subpass.dependencies().len(), 1);
        assert_eq!(subpass.dependencies()[0].src_subpass, 0);
        assert_eq!(subpass.dependencies()[0].dst_subpass, 1);
    }

    #[test]
    fn subpass_attachment_iterator_walks_all_roles() {
        let a = Rc::new(Attachment::framebuffer(0));
        let b = Rc::new(Attachment::framebuffer(1));
        let subpass = Subpass::new(0, &[], vec![a], Vec::new(), vec![b]);
        assert_eq!(subpass.attachments().count(), 2);
    }
}
