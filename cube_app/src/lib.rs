//! Shared scene pieces for the example binaries: cube/grid geometry, the
//! demo camera, CLI flags and the benchmark CSV recorder.

pub mod bench;
pub mod camera;
pub mod cube;
pub mod flags;
pub mod grid;

pub use bench::Bench;
pub use camera::UniformBufferObject;
pub use cube::Cube;
pub use flags::{BenchFlags, SceneFlags};
pub use grid::Grid;
