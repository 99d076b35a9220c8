//! Linear algebra type system for accelerometer calibration
//!
//! Fixed-size nalgebra aliases for samples, per-axis parameters and the
//! Euler-angle rotation parametrisation shared by the fitters.

use nalgebra::{Matrix3, Rotation3, SVector};

// ===== Parameter Dimensions =====
pub const AXES: usize = 3;
pub const OFFSET_SCALE_DIM: usize = 6; // (ox, oy, oz, sx, sy, sz)
pub const ROTATION_DIM: usize = 3; // (roll, pitch, yaw)

// ===== Sample Types =====
/// Raw or corrected accelerometer reading in g.
pub type Vec3 = SVector<f64, AXES>;
pub type Mat3 = Matrix3<f64>;

// ===== Parameter Vectors =====
pub type OffsetScaleParams = SVector<f64, OFFSET_SCALE_DIM>;
/// Euler angles (roll, pitch, yaw) in radians.
pub type EulerAngles = SVector<f64, ROTATION_DIM>;

/// Rotation matrix for a (roll, pitch, yaw) triple.
pub fn rotation_from_euler(angles: &EulerAngles) -> Mat3 {
    Rotation3::from_euler_angles(angles[0], angles[1], angles[2]).into_inner()
}

/// Angle of the relative rotation `a^T b`, in radians.
pub fn relative_angle(a: &Mat3, b: &Mat3) -> f64 {
    let relative = Rotation3::from_matrix_unchecked(a.transpose() * b);
    relative.angle()
}

/// Packs an offset and scale into a single parameter vector.
pub fn pack_offset_scale(offset: &Vec3, scale: &Vec3) -> OffsetScaleParams {
    OffsetScaleParams::new(offset[0], offset[1], offset[2], scale[0], scale[1], scale[2])
}

/// Splits a parameter vector back into (offset, scale).
pub fn unpack_offset_scale(params: &[f64]) -> (Vec3, Vec3) {
    (
        Vec3::new(params[0], params[1], params[2]),
        Vec3::new(params[3], params[4], params[5]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_zero_angles_are_identity() {
        let r = rotation_from_euler(&EulerAngles::zeros());
        assert_abs_diff_eq!(r, Mat3::identity(), epsilon = 1e-12);
    }

    #[test]
    fn test_relative_angle_about_z() {
        let a = rotation_from_euler(&EulerAngles::new(0.0, 0.0, 0.1));
        let b = rotation_from_euler(&EulerAngles::new(0.0, 0.0, 0.3));
        assert_abs_diff_eq!(relative_angle(&a, &b), 0.2, epsilon = 1e-9);
    }

    #[test]
    fn test_offset_scale_packing() {
        let offset = Vec3::new(0.1, -0.2, 0.3);
        let scale = Vec3::new(1.01, 0.99, 1.05);
        let params = pack_offset_scale(&offset, &scale);
        let (o, s) = unpack_offset_scale(params.as_slice());
        assert_eq!(o, offset);
        assert_eq!(s, scale);
    }
}
