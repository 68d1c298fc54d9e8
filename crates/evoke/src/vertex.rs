//! The vertex layout shared by the example scenes.

use bytemuck::{Pod, Zeroable};
use nalgebra::{Vector2, Vector3};

/// Position, color, texture coordinate and normal.
///
/// Field arrays keep the struct `Pod` so vertex slices can be uploaded as
/// raw bytes without an intermediate copy.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub color: [f32; 3],
    pub tex_coord: [f32; 2],
    pub normal: [f32; 3],
}

impl Vertex {
    pub fn new(pos: Vector3<f32>, color: Vector3<f32>) -> Self {
        Self {
            pos: pos.into(),
            color: color.into(),
            tex_coord: [0.0, 0.0],
            normal: [0.0, 0.0, 0.0],
        }
    }

    pub fn with_tex_coord(mut self, tex_coord: Vector2<f32>) -> Self {
        self.tex_coord = tex_coord.into();
        self
    }

    pub fn with_normal(mut self, normal: Vector3<f32>) -> Self {
        self.normal = normal.into();
        self
    }
}

impl Default for Vertex {
    fn default() -> Self {
        Self::zeroed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_is_eleven_packed_floats() {
        assert_eq!(std::mem::size_of::<Vertex>(), 11 * 4);
    }

    #[test]
    fn vertex_bytes_round_trip() {
        let vertices = [
            Vertex::new(
                Vector3::new(0.0, -0.5, 0.0),
                Vector3::new(1.0, 0.0, 0.0),
            ),
            Vertex::new(Vector3::new(-0.5, 0.5, 0.0), Vector3::new(0.0, 0.0, 1.0))
                .with_tex_coord(Vector2::new(0.25, 0.75)),
        ];
        let bytes: &[u8] = bytemuck::cast_slice(&vertices);
        let restored: &[Vertex] = bytemuck::cast_slice(bytes);
        assert_eq!(restored, &vertices);
    }
}
