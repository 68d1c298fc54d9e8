//! Descriptor sets binding buffers, attachments and textures to shaders.
//!
//! Bindings accumulate before `finalize`; each `add_*` call appends one pool
//! size, one set-layout binding and one deferred write. `finalize` then
//! allocates the pool and one set per swapchain image and performs every
//! deferred write. It runs exactly once: repeated calls are no-ops, so the
//! resulting sets never change without new bindings. `recreate` re-runs the
//! writes after a resize, when input-attachment views have been replaced.

use std::rc::Rc;

use ash::vk;

use crate::attachment::Attachment;
use crate::buffer::DynamicBuffer;
use crate::device::context::{VulkanError, VulkanResult};
use crate::device::Device;
use crate::shader::ShaderStage;
use crate::texture::Texture;

enum BindingResource {
    /// One buffer per swapchain image, e.g. a [`DynamicBuffer`]'s copies.
    UniformBuffer {
        buffers: Vec<vk::Buffer>,
        range: vk::DeviceSize,
    },
    /// Re-reads the attachment's current view at write time, so recreation
    /// after a resize picks up the new image.
    InputAttachment { attachment: Rc<Attachment> },
    TextureSampler {
        view: vk::ImageView,
        sampler: vk::Sampler,
    },
}

struct Binding {
    binding: u32,
    stage: ShaderStage,
    resource: BindingResource,
}

impl Binding {
    fn descriptor_type(&self) -> vk::DescriptorType {
        match self.resource {
            BindingResource::UniformBuffer { .. } => vk::DescriptorType::UNIFORM_BUFFER,
            BindingResource::InputAttachment { .. } => vk::DescriptorType::INPUT_ATTACHMENT,
            BindingResource::TextureSampler { .. } => {
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER
            }
        }
    }
}

/// A descriptor pool and one descriptor set per swapchain image.
pub struct Descriptor {
    device: ash::Device,
    swapchain_size: usize,
    bindings: Vec<Binding>,
    pool: vk::DescriptorPool,
    set_layout: vk::DescriptorSetLayout,
    sets: Vec<vk::DescriptorSet>,
    finalized: bool,
}

impl Descriptor {
    pub fn new(device: &Device) -> Self {
        Self {
            device: device.ash_device().clone(),
            swapchain_size: device.swapchain_size(),
            bindings: Vec::new(),
            pool: vk::DescriptorPool::null(),
            set_layout: vk::DescriptorSetLayout::null(),
            sets: Vec::new(),
            finalized: false,
        }
    }

    /// Binds a uniform buffer: set `i` sees the buffer copy for swapchain
    /// image `i`.
    pub fn add_uniform_buffer(
        &mut self,
        binding: u32,
        buffer: &DynamicBuffer,
        stage: ShaderStage,
    ) {
        self.bindings.push(Binding {
            binding,
            stage,
            resource: BindingResource::UniformBuffer {
                buffers: buffer.buffers().to_vec(),
                range: buffer.size(),
            },
        });
    }

    /// Binds an attachment written by an earlier subpass for fragment-shader
    /// reads.
    pub fn add_input_attachment(
        &mut self,
        binding: u32,
        attachment: Rc<Attachment>,
        stage: ShaderStage,
    ) {
        self.bindings.push(Binding {
            binding,
            stage,
            resource: BindingResource::InputAttachment { attachment },
        });
    }

    /// Binds a sampled texture.
    pub fn add_texture_sampler(&mut self, binding: u32, texture: &Texture, stage: ShaderStage) {
        self.bindings.push(Binding {
            binding,
            stage,
            resource: BindingResource::TextureSampler {
                view: texture.view(),
                sampler: texture.sampler(),
            },
        });
    }

    /// Number of bindings added so far.
    pub fn num_bindings(&self) -> usize {
        self.bindings.len()
    }

    /// Pool sizes that `finalize` will request, one entry per binding.
    pub fn pool_sizes(&self) -> Vec<vk::DescriptorPoolSize> {
        pool_sizes(&self.bindings, self.swapchain_size)
    }

    /// Set-layout bindings that `finalize` will install.
    pub fn layout_bindings(&self) -> Vec<vk::DescriptorSetLayoutBinding> {
        layout_bindings(&self.bindings)
    }

    /// Allocates the pool, layout and sets and performs all deferred writes.
    ///
    /// Runs exactly once; calling again without new bindings changes
    /// nothing. Must be called before the descriptor is used by a pipeline
    /// (pipeline construction does this).
    pub fn finalize(&mut self) -> VulkanResult<()> {
        if self.finalized {
            return Ok(());
        }
        validate_bindings(&self.bindings)?;

        let layout_bindings = self.layout_bindings();
        let layout_info =
            vk::DescriptorSetLayoutCreateInfo::builder().bindings(&layout_bindings);
        self.set_layout = unsafe {
            self.device
                .create_descriptor_set_layout(&layout_info, None)
                .map_err(|_| {
                    VulkanError::InitializationFailed(
                        "failed to create descriptor set layout".to_string(),
                    )
                })?
        };

        self.allocate_sets()?;
        self.finalized = true;
        Ok(())
    }

    /// Re-finalizes after a resize: the pool and sets are rebuilt so
    /// input-attachment writes pick up the recreated views.
    pub(crate) fn recreate(&mut self) -> VulkanResult<()> {
        if !self.finalized {
            return Ok(());
        }
        unsafe {
            // Destroying the pool frees all sets allocated from it.
            self.device.destroy_descriptor_pool(self.pool, None);
        }
        self.pool = vk::DescriptorPool::null();
        self.sets.clear();
        self.allocate_sets()
    }

    fn allocate_sets(&mut self) -> VulkanResult<()> {
        let pool_sizes = self.pool_sizes();
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .pool_sizes(&pool_sizes)
            .max_sets(self.swapchain_size as u32);
        self.pool = unsafe {
            self.device
                .create_descriptor_pool(&pool_info, None)
                .map_err(|_| {
                    VulkanError::InitializationFailed(
                        "failed to create descriptor pool".to_string(),
                    )
                })?
        };

        let layouts = vec![self.set_layout; self.swapchain_size];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);
        self.sets = unsafe {
            self.device
                .allocate_descriptor_sets(&alloc_info)
                .map_err(|_| {
                    VulkanError::InitializationFailed(
                        "failed to allocate descriptor sets".to_string(),
                    )
                })?
        };

        for (image_index, &set) in self.sets.iter().enumerate() {
            for binding in &self.bindings {
                self.write_binding(set, image_index, binding)?;
            }
        }
        Ok(())
    }

    fn write_binding(
        &self,
        set: vk::DescriptorSet,
        image_index: usize,
        binding: &Binding,
    ) -> VulkanResult<()> {
        match &binding.resource {
            BindingResource::UniformBuffer { buffers, range } => {
                let buffer_info = [vk::DescriptorBufferInfo {
                    buffer: buffers[image_index % buffers.len()],
                    offset: 0,
                    range: *range,
                }];
                let write = vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(binding.binding)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(&buffer_info);
                unsafe {
                    self.device.update_descriptor_sets(&[write.build()], &[]);
                }
            }
            BindingResource::InputAttachment { attachment } => {
                let view = attachment.view().ok_or_else(|| VulkanError::InvalidOperation {
                    reason: format!(
                        "attachment {} bound as input has no backing image",
                        attachment.index()
                    ),
                })?;
                let image_info = [vk::DescriptorImageInfo {
                    sampler: vk::Sampler::null(),
                    image_view: view,
                    image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                }];
                let write = vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(binding.binding)
                    .descriptor_type(vk::DescriptorType::INPUT_ATTACHMENT)
                    .image_info(&image_info);
                unsafe {
                    self.device.update_descriptor_sets(&[write.build()], &[]);
                }
            }
            BindingResource::TextureSampler { view, sampler } => {
                let image_info = [vk::DescriptorImageInfo {
                    sampler: *sampler,
                    image_view: *view,
                    image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                }];
                let write = vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(binding.binding)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(&image_info);
                unsafe {
                    self.device.update_descriptor_sets(&[write.build()], &[]);
                }
            }
        }
        Ok(())
    }

    pub fn sets(&self) -> &[vk::DescriptorSet] {
        &self.sets
    }

    pub fn set_layout(&self) -> vk::DescriptorSetLayout {
        self.set_layout
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }
}

impl Drop for Descriptor {
    fn drop(&mut self) {
        unsafe {
            if self.pool != vk::DescriptorPool::null() {
                self.device.destroy_descriptor_pool(self.pool, None);
            }
            if self.set_layout != vk::DescriptorSetLayout::null() {
                self.device.destroy_descriptor_set_layout(self.set_layout, None);
            }
        }
    }
}

fn pool_sizes(bindings: &[Binding], swapchain_size: usize) -> Vec<vk::DescriptorPoolSize> {
    bindings
        .iter()
        .map(|b| vk::DescriptorPoolSize {
            ty: b.descriptor_type(),
            descriptor_count: swapchain_size as u32,
        })
        .collect()
}

fn layout_bindings(bindings: &[Binding]) -> Vec<vk::DescriptorSetLayoutBinding> {
    bindings
        .iter()
        .map(|b| {
            vk::DescriptorSetLayoutBinding::builder()
                .binding(b.binding)
                .descriptor_type(b.descriptor_type())
                .descriptor_count(1)
                .stage_flags(b.stage.flags())
                .build()
        })
        .collect()
}

fn validate_bindings(bindings: &[Binding]) -> VulkanResult<()> {
    let mut seen = std::collections::HashSet::new();
    for binding in bindings {
        if !seen.insert(binding.binding) {
            return Err(VulkanError::InvalidOperation {
                reason: format!("duplicate descriptor binding {}", binding.binding),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bindings() -> Vec<Binding> {
        vec![
            Binding {
                binding: 0,
                stage: ShaderStage::Vertex,
                resource: BindingResource::UniformBuffer {
                    buffers: vec![vk::Buffer::null(); 2],
                    range: 192,
                },
            },
            Binding {
                binding: 1,
                stage: ShaderStage::Fragment,
                resource: BindingResource::TextureSampler {
                    view: vk::ImageView::null(),
                    sampler: vk::Sampler::null(),
                },
            },
            Binding {
                binding: 2,
                stage: ShaderStage::Fragment,
                resource: BindingResource::InputAttachment {
                    attachment: Rc::new(Attachment::framebuffer(1)),
                },
            },
        ]
    }

    #[test]
    fn each_binding_contributes_one_pool_size_and_layout_entry() {
        let bindings = sample_bindings();
        let sizes = pool_sizes(&bindings, 2);
        let layout = layout_bindings(&bindings);

        assert_eq!(sizes.len(), 3);
        assert_eq!(layout.len(), 3);
        assert_eq!(sizes[0].ty, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(sizes[1].ty, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(sizes[2].ty, vk::DescriptorType::INPUT_ATTACHMENT);
        assert!(sizes.iter().all(|s| s.descriptor_count == 2));

        assert_eq!(layout[0].stage_flags, vk::ShaderStageFlags::VERTEX);
        assert_eq!(layout[1].stage_flags, vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(layout[2].binding, 2);
        assert!(layout.iter().all(|b| b.descriptor_count == 1));
    }

    #[test]
    fn bookkeeping_is_stable_across_repeated_queries() {
        let bindings = sample_bindings();
        let sizes_a = pool_sizes(&bindings, 3);
        let sizes_b = pool_sizes(&bindings, 3);
        assert_eq!(sizes_a.len(), sizes_b.len());
        for (a, b) in sizes_a.iter().zip(sizes_b.iter()) {
            assert_eq!(a.ty, b.ty);
            assert_eq!(a.descriptor_count, b.descriptor_count);
        }

        let first = layout_bindings(&bindings);
        let second = layout_bindings(&bindings);
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.binding, b.binding);
            assert_eq!(a.descriptor_type, b.descriptor_type);
        }
    }

    #[test]
    fn duplicate_binding_numbers_are_rejected() {
        let mut bindings = sample_bindings();
        bindings[2].binding = 0;
        assert!(validate_bindings(&bindings).is_err());

        let unique = sample_bindings();
        assert!(validate_bindings(&unique).is_ok());
    }
}
