//! Unit cube geometry for the grid scenes.

use evoke::Vertex;
use nalgebra::{Rotation3, Vector3};

/// Vertices per cube.
pub const CUBE_VERTICES: usize = 8;
/// Indices per cube (12 triangles).
pub const CUBE_INDICES: usize = 36;

/// Triangle indices over the eight corners.
pub const INDICES: [u32; CUBE_INDICES] = [
    0, 1, 2, 2, 3, 0, // top
    0, 4, 5, 5, 1, 0, // side 0
    1, 5, 6, 6, 2, 1, // side 1
    2, 6, 7, 7, 3, 2, // side 2
    3, 7, 4, 4, 0, 3, // side 3
    4, 6, 5, 6, 4, 7, // bottom
];

/// One axis-aligned cube in the grid.
#[derive(Debug, Clone, Copy)]
pub struct Cube {
    pub center: Vector3<f32>,
    pub color: Vector3<f32>,
    pub size: f32,
}

impl Cube {
    pub fn new(center: Vector3<f32>, color: Vector3<f32>, size: f32) -> Self {
        Self {
            center,
            color,
            size,
        }
    }

    /// The eight corners, matching the winding [`INDICES`] assumes.
    pub fn corners(&self) -> [Vector3<f32>; CUBE_VERTICES] {
        let h = self.size / 2.0;
        let c = self.center;
        [
            Vector3::new(c.x - h, c.y - h, c.z + h),
            Vector3::new(c.x + h, c.y - h, c.z + h),
            Vector3::new(c.x + h, c.y + h, c.z + h),
            Vector3::new(c.x - h, c.y + h, c.z + h),
            Vector3::new(c.x - h, c.y - h, c.z - h),
            Vector3::new(c.x + h, c.y - h, c.z - h),
            Vector3::new(c.x + h, c.y + h, c.z - h),
            Vector3::new(c.x - h, c.y + h, c.z - h),
        ]
    }

    /// Writes this cube's vertices, spun by `angle` about its own vertical
    /// axis, into `out` (which must hold exactly [`CUBE_VERTICES`] slots).
    pub fn write_vertices(&self, angle: f32, out: &mut [Vertex]) {
        debug_assert_eq!(out.len(), CUBE_VERTICES);
        let rotation = Rotation3::from_axis_angle(&Vector3::z_axis(), angle);
        for (slot, corner) in out.iter_mut().zip(self.corners()) {
            let spun = rotation * (corner - self.center) + self.center;
            *slot = Vertex::new(spun, self.color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn corners_are_centered() {
        let cube = Cube::new(Vector3::new(1.0, 2.0, 3.0), Vector3::new(1.0, 0.0, 1.0), 0.5);
        let corners = cube.corners();
        assert_eq!(corners.len(), CUBE_VERTICES);
        let centroid: Vector3<f32> =
            corners.iter().sum::<Vector3<f32>>() / CUBE_VERTICES as f32;
        assert_relative_eq!(centroid, cube.center, epsilon = 1e-6);
    }

    #[test]
    fn index_table_covers_every_corner() {
        assert_eq!(INDICES.len(), CUBE_INDICES);
        for corner in 0..CUBE_VERTICES as u32 {
            assert!(INDICES.contains(&corner));
        }
        assert!(INDICES.iter().all(|&i| (i as usize) < CUBE_VERTICES));
    }

    #[test]
    fn rotation_preserves_the_center() {
        let cube = Cube::new(Vector3::new(0.5, -0.5, 0.0), Vector3::new(1.0, 0.0, 0.0), 0.2);
        let mut spun = [Vertex::default(); CUBE_VERTICES];
        cube.write_vertices(std::f32::consts::FRAC_PI_3, &mut spun);

        let centroid = spun
            .iter()
            .map(|v| Vector3::from(v.pos))
            .sum::<Vector3<f32>>()
            / CUBE_VERTICES as f32;
        assert_relative_eq!(centroid, cube.center, epsilon = 1e-5);
    }
}
