//! Perspective camera for the overlay scene.
//!
//! The camera sits at the origin looking down -Z, matching the camera
//! space the tracker reports poses in. Only the aspect ratio changes
//! after construction; field of view and clip planes are fixed.

use glam::Mat4;

/// Perspective camera at the tracker's optical center.
#[derive(Debug, Clone)]
pub struct PerspectiveCamera {
    /// Vertical field of view in radians.
    fov: f32,
    /// Aspect ratio (width / height).
    aspect: f32,
    /// Near clipping plane.
    near: f32,
    /// Far clipping plane.
    far: f32,

    projection_matrix: Mat4,
}

impl PerspectiveCamera {
    pub const DEFAULT_FOV_DEGREES: f32 = 60.0;
    pub const DEFAULT_NEAR: f32 = 0.01;
    pub const DEFAULT_FAR: f32 = 1000.0;

    /// Create a camera. Objects outside `near..far` are clipped.
    pub fn new(fov_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        let mut camera = Self {
            fov: fov_degrees.to_radians(),
            aspect,
            near,
            far,
            projection_matrix: Mat4::IDENTITY,
        };
        camera.update_projection_matrix();
        camera
    }

    /// Get the projection matrix.
    pub fn projection_matrix(&self) -> Mat4 {
        self.projection_matrix
    }

    /// Get the view matrix. Poses are already in camera space.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::IDENTITY
    }

    /// Get field of view in radians.
    pub fn fov(&self) -> f32 {
        self.fov
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn near(&self) -> f32 {
        self.near
    }

    pub fn far(&self) -> f32 {
        self.far
    }

    /// Set aspect ratio and regenerate the projection.
    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
        self.update_projection_matrix();
    }

    fn update_projection_matrix(&mut self) {
        self.projection_matrix = Mat4::perspective_rh(self.fov, self.aspect, self.near, self.far);
    }
}

impl Default for PerspectiveCamera {
    fn default() -> Self {
        Self::new(Self::DEFAULT_FOV_DEGREES, 1.0, Self::DEFAULT_NEAR, Self::DEFAULT_FAR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec3, Vec4};

    fn camera_to_ndc(camera: &PerspectiveCamera, point: Vec3) -> Vec3 {
        let clip = camera.projection_matrix() * point.extend(1.0);
        Vec3::new(clip.x / clip.w, clip.y / clip.w, clip.z / clip.w)
    }

    fn contains(camera: &PerspectiveCamera, point: Vec3) -> bool {
        let clip: Vec4 = camera.projection_matrix() * point.extend(1.0);
        clip.w > 0.0
            && clip.x.abs() <= clip.w
            && clip.y.abs() <= clip.w
            && (0.0..=clip.w).contains(&clip.z)
    }

    #[test]
    fn test_camera_defaults() {
        let camera = PerspectiveCamera::default();
        assert!((camera.fov() - 60.0_f32.to_radians()).abs() < 1e-6);
        assert_eq!(camera.near(), 0.01);
        assert_eq!(camera.far(), 1000.0);
        assert_eq!(camera.view_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn test_point_ahead_projects_to_center() {
        let camera = PerspectiveCamera::new(60.0, 4.0 / 3.0, 0.01, 1000.0);
        let ndc = camera_to_ndc(&camera, Vec3::new(0.0, 0.0, -2.0));
        assert!(ndc.x.abs() < 1e-6);
        assert!(ndc.y.abs() < 1e-6);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn test_clip_planes_bound_depth() {
        let camera = PerspectiveCamera::default();
        assert!(contains(&camera, Vec3::new(0.0, 0.0, -1.0)));
        assert!(!contains(&camera, Vec3::new(0.0, 0.0, -0.001)));
        assert!(!contains(&camera, Vec3::new(0.0, 0.0, -2000.0)));
        assert!(!contains(&camera, Vec3::new(0.0, 0.0, 1.0)));
    }

    #[test]
    fn test_aspect_changes_projection() {
        let mut camera = PerspectiveCamera::new(60.0, 800.0 / 600.0, 0.01, 1000.0);
        let before = camera.projection_matrix();
        camera.set_aspect(600.0 / 800.0);
        assert_eq!(camera.aspect(), 600.0 / 800.0);
        assert_ne!(camera.projection_matrix(), before);
        // Vertical scale depends on fov only.
        assert_eq!(camera.projection_matrix().y_axis.y, before.y_axis.y);
    }
}
