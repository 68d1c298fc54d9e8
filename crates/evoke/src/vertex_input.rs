//! Vertex binding and attribute layout description.

use ash::vk;

/// Describes one vertex buffer binding and its shader-visible attributes.
#[derive(Debug, Clone, Default)]
pub struct VertexInput {
    binding_description: vk::VertexInputBindingDescription,
    attribute_descriptions: Vec<vk::VertexInputAttributeDescription>,
}

impl VertexInput {
    /// A layout with the given per-vertex stride on binding 0.
    pub fn new(stride: u32) -> Self {
        Self {
            binding_description: vk::VertexInputBindingDescription {
                binding: 0,
                stride,
                input_rate: vk::VertexInputRate::VERTEX,
            },
            attribute_descriptions: Vec::new(),
        }
    }

    /// Adds a three-component float attribute at `location`.
    pub fn set_attribute_vec3(&mut self, location: u32, offset: u32) {
        self.push_attribute(location, offset, vk::Format::R32G32B32_SFLOAT);
    }

    /// Adds a two-component float attribute at `location`.
    pub fn set_attribute_vec2(&mut self, location: u32, offset: u32) {
        self.push_attribute(location, offset, vk::Format::R32G32_SFLOAT);
    }

    fn push_attribute(&mut self, location: u32, offset: u32, format: vk::Format) {
        self.attribute_descriptions
            .push(vk::VertexInputAttributeDescription {
                location,
                binding: 0,
                format,
                offset,
            });
    }

    pub fn binding_description(&self) -> vk::VertexInputBindingDescription {
        self.binding_description
    }

    pub fn attribute_descriptions(&self) -> &[vk::VertexInputAttributeDescription] {
        &self.attribute_descriptions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vertex::Vertex;
    use std::mem::{offset_of, size_of};

    #[test]
    fn binding_uses_per_vertex_rate() {
        let input = VertexInput::new(size_of::<Vertex>() as u32);
        let binding = input.binding_description();
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.stride, 44);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);
    }

    #[test]
    fn attributes_record_location_offset_and_format() {
        let mut input = VertexInput::new(size_of::<Vertex>() as u32);
        input.set_attribute_vec3(0, offset_of!(Vertex, pos) as u32);
        input.set_attribute_vec3(1, offset_of!(Vertex, color) as u32);
        input.set_attribute_vec2(2, offset_of!(Vertex, tex_coord) as u32);

        let attributes = input.attribute_descriptions();
        assert_eq!(attributes.len(), 3);
        assert_eq!(attributes[0].format, vk::Format::R32G32B32_SFLOAT);
        assert_eq!(attributes[1].offset, 12);
        assert_eq!(attributes[2].format, vk::Format::R32G32_SFLOAT);
        assert_eq!(attributes[2].offset, 24);
        assert!(attributes.iter().all(|a| a.binding == 0));
    }
}
