//! An n×n lattice of cubes with thread-pool-parallel vertex updates.

use evoke::{partition, ThreadPool, Vertex};
use nalgebra::Vector3;

use crate::cube::{Cube, CUBE_INDICES, CUBE_VERTICES, INDICES};

/// A square grid of cubes centered on the origin.
pub struct Grid {
    cubes: Vec<Cube>,
}

impl Grid {
    /// Lays `num * num` cubes of `cube_size` across a `grid_size`-wide
    /// square in the XY plane.
    pub fn new(grid_size: f32, cube_size: f32, num: usize) -> Self {
        let step = grid_size / num as f32;
        let left = -grid_size / 2.0 + 0.5 * step;
        let top = grid_size / 2.0 - 0.5 * step;

        let mut cubes = Vec::with_capacity(num * num);
        for i in 0..num {
            for j in 0..num {
                let center = Vector3::new(left + j as f32 * step, top - i as f32 * step, 0.0);
                cubes.push(Cube::new(center, Vector3::new(1.0, 0.0, 1.0), cube_size));
            }
        }

        Self { cubes }
    }

    pub fn num_cubes(&self) -> usize {
        self.cubes.len()
    }

    pub fn num_vertices(&self) -> usize {
        self.cubes.len() * CUBE_VERTICES
    }

    /// Index buffer contents: each cube's triangle table offset by its
    /// block of eight vertices.
    pub fn indices(&self) -> Vec<u32> {
        let mut indices = Vec::with_capacity(self.cubes.len() * CUBE_INDICES);
        for cube_index in 0..self.cubes.len() as u32 {
            indices.extend(INDICES.iter().map(|&i| i + cube_index * CUBE_VERTICES as u32));
        }
        indices
    }

    /// Vertex positions with every cube spun by `angle`, computed across
    /// the pool: cubes are split into contiguous slices, one per worker,
    /// each writing its own disjoint span of the output.
    pub fn vertices(&self, angle: f32, pool: &ThreadPool) -> Vec<Vertex> {
        let mut vertices = vec![Vertex::default(); self.num_vertices()];
        let ranges = partition(self.cubes.len(), pool.num_threads());

        let mut spans: Vec<&mut [Vertex]> = Vec::with_capacity(ranges.len());
        let mut rest = vertices.as_mut_slice();
        for range in &ranges {
            let (span, tail) = rest.split_at_mut(range.len() * CUBE_VERTICES);
            spans.push(span);
            rest = tail;
        }

        pool.scope(|s| {
            for (range, span) in ranges.iter().cloned().zip(spans) {
                let cubes = &self.cubes[range];
                s.spawn(move || {
                    for (cube, out) in cubes.iter().zip(span.chunks_mut(CUBE_VERTICES)) {
                        cube.write_vertices(angle, out);
                    }
                });
            }
        });

        vertices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn grid_holds_n_squared_cubes() {
        let grid = Grid::new(2.0, 0.25, 4);
        assert_eq!(grid.num_cubes(), 16);
        assert_eq!(grid.num_vertices(), 16 * CUBE_VERTICES);
    }

    #[test]
    fn index_blocks_step_by_eight() {
        let grid = Grid::new(2.0, 0.25, 2);
        let indices = grid.indices();
        assert_eq!(indices.len(), 4 * CUBE_INDICES);
        for (cube, block) in indices.chunks(CUBE_INDICES).enumerate() {
            let base = (cube * CUBE_VERTICES) as u32;
            assert!(block.iter().all(|&i| i >= base && i < base + 8));
        }
    }

    #[test]
    fn vertex_output_is_identical_for_any_thread_count() {
        let grid = Grid::new(2.0, 0.2, 3);
        let angle = 0.37;
        let single = grid.vertices(angle, &ThreadPool::new(1));
        let multi = grid.vertices(angle, &ThreadPool::new(4));

        assert_eq!(single.len(), multi.len());
        for (a, b) in single.iter().zip(multi.iter()) {
            for (pa, pb) in a.pos.iter().zip(b.pos.iter()) {
                assert_relative_eq!(*pa, *pb);
            }
        }
    }

    #[test]
    fn cubes_are_laid_out_symmetrically() {
        let grid = Grid::new(2.0, 0.25, 2);
        let vertices = grid.vertices(0.0, &ThreadPool::new(1));
        let centroid = vertices
            .iter()
            .map(|v| Vector3::from(v.pos))
            .sum::<Vector3<f32>>()
            / vertices.len() as f32;
        assert_relative_eq!(centroid, Vector3::zeros(), epsilon = 1e-6);
    }
}
