//! Model-view-projection uniform data for the demo scenes.

use bytemuck::{Pod, Zeroable};
use nalgebra::{Matrix4, Point3, Vector3};

/// The uniform block every demo shader expects at binding 0.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct UniformBufferObject {
    pub model: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
}

impl UniformBufferObject {
    /// The shared demo camera: orbit-free view from (2,2,2) toward the
    /// origin, z-up, with the scene spun by `angle` about the z axis.
    pub fn spinning(angle: f32, aspect: f32) -> Self {
        let model = Matrix4::from_axis_angle(&Vector3::z_axis(), angle);
        let view = Matrix4::look_at_rh(
            &Point3::new(2.0, 2.0, 2.0),
            &Point3::origin(),
            &Vector3::z(),
        );
        let mut proj = Matrix4::new_perspective(aspect, 45.0_f32.to_radians(), 0.1, 10.0);
        // GL-style clip space to Vulkan: flip y.
        proj[(1, 1)] *= -1.0;

        Self {
            model: model.into(),
            view: view.into(),
            proj: proj.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn ubo_is_three_tightly_packed_matrices() {
        assert_eq!(std::mem::size_of::<UniformBufferObject>(), 3 * 16 * 4);
    }

    #[test]
    fn zero_angle_model_is_identity() {
        let ubo = UniformBufferObject::spinning(0.0, 4.0 / 3.0);
        let model = Matrix4::from(ubo.model);
        assert_relative_eq!(model, Matrix4::identity(), epsilon = 1e-6);
    }

    #[test]
    fn projection_flips_y_for_vulkan() {
        let ubo = UniformBufferObject::spinning(0.3, 1.0);
        assert!(ubo.proj[1][1] < 0.0);
        let unflipped = Matrix4::new_perspective(1.0, 45.0_f32.to_radians(), 0.1, 10.0);
        assert_relative_eq!(ubo.proj[1][1], -unflipped[(1, 1)]);
    }
}
