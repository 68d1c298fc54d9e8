//! Graphics pipeline construction and resize recreation.

use std::rc::Rc;

use ash::vk;

use crate::descriptor::Descriptor;
use crate::device::context::{VulkanError, VulkanResult};
use crate::device::Device;
use crate::pass::RenderPass;
use crate::shader::Shader;
use crate::vertex_input::VertexInput;

/// One compiled graphics pipeline bound to a single subpass.
///
/// Depth-stencil state is derived from the subpass shape: a subpass with a
/// depth attachment writes depth and stamps the stencil buffer
/// (REPLACE-on-pass), one without tests depth read-only and draws only where
/// the stencil matches (EQUAL). This is the geometry/composite split of a
/// deferred multi-pass renderer.
pub struct Pipeline {
    device: ash::Device,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
    descriptor: Option<Descriptor>,
    vertex_input: VertexInput,
    render_pass: Rc<RenderPass>,
    subpass_index: u32,
    shaders: Vec<Shader>,
}

impl Pipeline {
    /// Builds the pipeline layout and pipeline. Finalizes the descriptor if
    /// the caller has not already done so.
    pub fn new(
        device: &Device,
        subpass_index: u32,
        descriptor: Option<Descriptor>,
        vertex_input: VertexInput,
        render_pass: Rc<RenderPass>,
        shaders: Vec<Shader>,
    ) -> VulkanResult<Self> {
        if subpass_index as usize >= render_pass.num_subpasses() {
            return Err(VulkanError::InvalidOperation {
                reason: format!("subpass index {subpass_index} out of range"),
            });
        }

        let mut descriptor = descriptor;
        if let Some(descriptor) = descriptor.as_mut() {
            descriptor.finalize()?;
        }

        let ash_device = device.ash_device().clone();
        let set_layouts: Vec<vk::DescriptorSetLayout> = descriptor
            .iter()
            .map(|d| d.set_layout())
            .collect();

        let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(&set_layouts);
        let layout = unsafe {
            ash_device
                .create_pipeline_layout(&layout_info, None)
                .map_err(|_| {
                    VulkanError::InitializationFailed(
                        "failed to create pipeline layout".to_string(),
                    )
                })?
        };

        let pipeline = build_pipeline(
            &ash_device,
            device.extent(),
            layout,
            &render_pass,
            subpass_index,
            &vertex_input,
            &shaders,
        )?;

        Ok(Self {
            device: ash_device,
            pipeline,
            layout,
            descriptor,
            vertex_input,
            render_pass,
            subpass_index,
            shaders,
        })
    }

    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    pub fn subpass_index(&self) -> u32 {
        self.subpass_index
    }

    pub fn descriptor(&self) -> Option<&Descriptor> {
        self.descriptor.as_ref()
    }

    pub fn render_pass(&self) -> &Rc<RenderPass> {
        &self.render_pass
    }

    /// Rebuilds the pipeline for a new extent and re-finalizes the
    /// descriptor (input-attachment views may have been replaced). The
    /// layout survives: set layouts do not change on resize.
    pub(crate) fn recreate(&mut self, extent: vk::Extent2D) -> VulkanResult<()> {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
        }
        self.pipeline = vk::Pipeline::null();

        if let Some(descriptor) = self.descriptor.as_mut() {
            descriptor.recreate()?;
        }

        self.pipeline = build_pipeline(
            &self.device,
            extent,
            self.layout,
            &self.render_pass,
            self.subpass_index,
            &self.vertex_input,
            &self.shaders,
        )?;
        Ok(())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            if self.pipeline != vk::Pipeline::null() {
                self.device.destroy_pipeline(self.pipeline, None);
            }
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

fn build_pipeline(
    device: &ash::Device,
    extent: vk::Extent2D,
    layout: vk::PipelineLayout,
    render_pass: &RenderPass,
    subpass_index: u32,
    vertex_input: &VertexInput,
    shaders: &[Shader],
) -> VulkanResult<vk::Pipeline> {
    let binding_descriptions = [vertex_input.binding_description()];
    let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder()
        .vertex_binding_descriptions(&binding_descriptions)
        .vertex_attribute_descriptions(vertex_input.attribute_descriptions());

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false);

    let viewports = [vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }];
    let scissors = [vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }];
    let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
        .viewports(&viewports)
        .scissors(&scissors);

    let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(vk::CullModeFlags::BACK)
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
        .depth_bias_enable(false);

    let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1)
        .min_sample_shading(1.0);

    let writes_depth = render_pass.subpass(subpass_index as usize).has_depth_attachment();

    // Geometry passes write straight color; composite passes blend.
    let color_blend_attachments = [vk::PipelineColorBlendAttachmentState {
        blend_enable: if writes_depth { vk::FALSE } else { vk::TRUE },
        src_color_blend_factor: vk::BlendFactor::ONE,
        dst_color_blend_factor: vk::BlendFactor::ZERO,
        color_blend_op: vk::BlendOp::ADD,
        src_alpha_blend_factor: vk::BlendFactor::ONE,
        dst_alpha_blend_factor: vk::BlendFactor::ZERO,
        alpha_blend_op: vk::BlendOp::ADD,
        color_write_mask: vk::ColorComponentFlags::RGBA,
    }];
    let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
        .attachments(&color_blend_attachments);

    let depth_stencil = depth_stencil_state(writes_depth);

    let shader_stages: Vec<vk::PipelineShaderStageCreateInfo> =
        shaders.iter().map(|s| s.stage_info()).collect();

    let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
        .stages(&shader_stages)
        .vertex_input_state(&vertex_input_info)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterizer)
        .multisample_state(&multisampling)
        .color_blend_state(&color_blending)
        .depth_stencil_state(&depth_stencil)
        .layout(layout)
        .render_pass(render_pass.handle())
        .subpass(subpass_index);

    let pipelines = unsafe {
        device
            .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info.build()], None)
            .map_err(|(_, e)| VulkanError::Api(e))?
    };

    Ok(pipelines[0])
}

/// Depth-stencil state for the two subpass shapes.
fn depth_stencil_state(writes_depth: bool) -> vk::PipelineDepthStencilStateCreateInfo {
    let stencil = if writes_depth {
        // Stamp covered pixels for the composite pass to match on.
        vk::StencilOpState {
            fail_op: vk::StencilOp::KEEP,
            pass_op: vk::StencilOp::REPLACE,
            depth_fail_op: vk::StencilOp::KEEP,
            compare_op: vk::CompareOp::ALWAYS,
            compare_mask: 0xff,
            write_mask: 0xff,
            reference: 1,
        }
    } else {
        vk::StencilOpState {
            fail_op: vk::StencilOp::KEEP,
            pass_op: vk::StencilOp::KEEP,
            depth_fail_op: vk::StencilOp::KEEP,
            compare_op: vk::CompareOp::EQUAL,
            compare_mask: 0xff,
            write_mask: 0x0,
            reference: 1,
        }
    };

    vk::PipelineDepthStencilStateCreateInfo::builder()
        .depth_test_enable(true)
        .depth_write_enable(writes_depth)
        .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL)
        .depth_bounds_test_enable(false)
        .stencil_test_enable(true)
        .front(stencil)
        .back(stencil)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_pass_writes_depth_and_stamps_stencil() {
        let state = depth_stencil_state(true);
        assert_eq!(state.depth_write_enable, vk::TRUE);
        assert_eq!(state.front.pass_op, vk::StencilOp::REPLACE);
        assert_eq!(state.front.compare_op, vk::CompareOp::ALWAYS);
        assert_eq!(state.front.write_mask, 0xff);
        assert_eq!(state.front.reference, 1);
    }

    #[test]
    fn composite_pass_tests_depth_read_only() {
        let state = depth_stencil_state(false);
        assert_eq!(state.depth_test_enable, vk::TRUE);
        assert_eq!(state.depth_write_enable, vk::FALSE);
        assert_eq!(state.front.pass_op, vk::StencilOp::KEEP);
        assert_eq!(state.front.compare_op, vk::CompareOp::EQUAL);
        assert_eq!(state.front.write_mask, 0x0);
    }
}
