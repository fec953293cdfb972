//! Pose transforms produced by the tracker.
//!
//! A pose arrives as 16 floats in row-major order (the order a tracker
//! writes them), and is stored exactly as received. Conversion to the
//! column-major [`Mat4`] the GPU wants happens on read, never in place.

use glam::{Mat4, Vec3};
use thiserror::Error;

/// Number of values in a pose matrix.
pub const POSE_LEN: usize = 16;

/// Errors raised while reading a pose from tracker output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoseError {
    #[error("pose must have {POSE_LEN} values, got {0}")]
    WrongLength(usize),
}

/// Rigid 4x4 transform of the tracked target in camera space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseTransform([f32; POSE_LEN]);

impl PoseTransform {
    pub const IDENTITY: Self = Self([
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]);

    /// Wrap 16 row-major values.
    pub const fn new(values: [f32; POSE_LEN]) -> Self {
        Self(values)
    }

    /// Copy a pose out of a buffer the tracker may reuse for its next frame.
    pub fn from_slice(values: &[f32]) -> Result<Self, PoseError> {
        let values: [f32; POSE_LEN] = values
            .try_into()
            .map_err(|_| PoseError::WrongLength(values.len()))?;
        Ok(Self(values))
    }

    /// Row-major values, exactly as received.
    pub fn values(&self) -> &[f32; POSE_LEN] {
        &self.0
    }

    /// Value at `row`, `col`.
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.0[row * 4 + col]
    }

    /// Column-major matrix for rendering.
    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from_cols_array(&self.0).transpose()
    }

    /// Translation part (last column).
    pub fn translation(&self) -> Vec3 {
        Vec3::new(self.0[3], self.0[7], self.0[11])
    }
}

impl Default for PoseTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl From<Mat4> for PoseTransform {
    fn from(matrix: Mat4) -> Self {
        Self(matrix.transpose().to_cols_array())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_slice_rejects_short_buffers() {
        let err = PoseTransform::from_slice(&[0.0; 12]).unwrap_err();
        assert_eq!(err, PoseError::WrongLength(12));
    }

    #[test]
    fn row_major_translation() {
        let mut values = PoseTransform::IDENTITY.0;
        values[3] = 1.5;
        values[7] = -2.0;
        values[11] = 0.25;
        let pose = PoseTransform::new(values);

        assert_eq!(pose.translation(), Vec3::new(1.5, -2.0, 0.25));
        // Same point through the GPU matrix.
        let moved = pose.to_mat4().transform_point3(Vec3::ZERO);
        assert_eq!(moved, Vec3::new(1.5, -2.0, 0.25));
    }

    #[test]
    fn mat4_conversion_keeps_values() {
        let values: [f32; 16] = std::array::from_fn(|i| i as f32 * 0.5 - 3.0);
        let pose = PoseTransform::new(values);
        let back = PoseTransform::from(pose.to_mat4());
        assert_eq!(back.values(), &values);
        assert_eq!(pose.get(2, 1), values[9]);
    }
}
