// SPDX-License-Identifier: CEPL-1.0
//! Transform math for the spinning quad.
use glam::{Mat4, Vec3};

/// Degrees of spin per second about +Z.
pub const SPIN_DEG_PER_SEC: f32 = 90.0;

const EYE: Vec3 = Vec3::new(2.0, 2.0, 2.0);
const FOV_Y_DEG: f32 = 45.0;
const Z_NEAR: f32 = 0.1;
const Z_FAR: f32 = 10.0;

/// Uniform block as the vertex shader sees it (std140, three column-major mat4).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct UniformBlock {
    pub model: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
}

impl UniformBlock {
    pub fn new(model: Mat4, view: Mat4, proj: Mat4) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            view: view.to_cols_array_2d(),
            proj: proj.to_cols_array_2d(),
        }
    }

    /// Camera at (2,2,2) looking at the origin, quad rotated by `elapsed_secs`.
    pub fn spinning(elapsed_secs: f32, aspect: f32) -> Self {
        Self::new(spin(elapsed_secs), camera_view(), projection(aspect))
    }
}

pub fn spin(elapsed_secs: f32) -> Mat4 {
    Mat4::from_rotation_z(elapsed_secs * SPIN_DEG_PER_SEC.to_radians())
}

pub fn camera_view() -> Mat4 {
    Mat4::look_at_rh(EYE, Vec3::ZERO, Vec3::Z)
}

/// Right-handed, depth in [0,1], with Y flipped for Vulkan clip space.
pub fn projection(aspect: f32) -> Mat4 {
    let aspect = if aspect.is_finite() && aspect > 0.0 { aspect } else { 1.0 };
    let mut proj = Mat4::perspective_rh(FOV_Y_DEG.to_radians(), aspect, Z_NEAR, Z_FAR);
    proj.y_axis.y *= -1.0;
    proj
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn one_second_is_a_quarter_turn() {
        let p = spin(1.0) * Vec4::new(1.0, 0.0, 0.0, 1.0);
        assert!(p.abs_diff_eq(Vec4::new(0.0, 1.0, 0.0, 1.0), 1e-5));
    }

    #[test]
    fn spin_at_zero_is_identity() {
        assert!(spin(0.0).abs_diff_eq(Mat4::IDENTITY, 1e-6));
    }

    #[test]
    fn projection_flips_y() {
        let proj = projection(1.0);
        assert!(proj.y_axis.y < 0.0);
        assert!(proj.x_axis.x > 0.0);
    }

    #[test]
    fn wider_aspect_narrows_x_scale() {
        let square = projection(1.0);
        let wide = projection(2.0);
        assert!((wide.x_axis.x * 2.0 - square.x_axis.x).abs() < 1e-5);
    }

    #[test]
    fn degenerate_aspect_falls_back_to_square() {
        assert!(projection(0.0).abs_diff_eq(projection(1.0), 1e-6));
        assert!(projection(f32::NAN).abs_diff_eq(projection(1.0), 1e-6));
    }

    #[test]
    fn origin_lands_in_front_of_camera() {
        let view = camera_view();
        let origin = view * Vec4::new(0.0, 0.0, 0.0, 1.0);
        // right-handed view space looks down -Z
        assert!(origin.z < 0.0);
        assert!((origin.z + EYE.length()).abs() < 1e-5);
    }

    #[test]
    fn block_is_three_mat4() {
        assert_eq!(std::mem::size_of::<UniformBlock>(), 3 * 64);
        let block = UniformBlock::spinning(0.0, 1.0);
        assert_eq!(block.model, Mat4::IDENTITY.to_cols_array_2d());
    }
}
