//! Overlay renderer: camera, anchor and the surface they are drawn to.
//!
//! The GPU side lives behind [`RenderSurface`]; this type owns the scene
//! state and decides what to draw.

use glam::Mat4;
use thiserror::Error;

use crate::camera::PerspectiveCamera;
use crate::config::OverlayConfig;
use crate::mesh::MeshData;
use crate::pose::PoseTransform;
use crate::scene::{self, AnchorNode, MeshId, MeshNode};
use crate::video::FrameImage;

/// Errors a surface can report for a single frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SurfaceError {
    #[error("surface lost")]
    Lost,

    #[error("surface outdated")]
    Outdated,

    #[error("out of memory")]
    OutOfMemory,

    #[error("surface error: {0}")]
    Other(String),
}

/// Everything a surface needs to draw one frame.
#[derive(Debug, Clone, Copy)]
pub struct RenderFrame<'a> {
    pub projection: Mat4,
    pub view: Mat4,
    /// Anchor transform (camera space), column-major.
    pub anchor: Mat4,
    pub anchor_visible: bool,
    pub meshes: &'a [MeshNode],
}

/// Platform render target.
pub trait RenderSurface {
    /// Resize the drawable to `width` x `height` pixels.
    fn resize(&mut self, width: u32, height: u32);

    /// Replace the pass-through background with `frame`.
    fn present_video_frame(&mut self, frame: &FrameImage);

    /// Draw and present one frame.
    fn draw(&mut self, frame: &RenderFrame<'_>) -> Result<(), SurfaceError>;

    /// Free GPU resources. Called once, at teardown.
    fn release(&mut self);
}

/// Owns the surface, the perspective camera and the anchor node.
pub struct OverlayRenderer {
    surface: Box<dyn RenderSurface>,
    camera: PerspectiveCamera,
    anchor: AnchorNode,
    width: u32,
    height: u32,
    renders: u64,
    released: bool,
}

impl OverlayRenderer {
    /// Create a renderer sized to `width` x `height`, anchor hidden.
    pub fn new(surface: Box<dyn RenderSurface>, config: &OverlayConfig, width: u32, height: u32) -> Self {
        let aspect = if height == 0 { 1.0 } else { width as f32 / height as f32 };
        let mut renderer = Self {
            surface,
            camera: PerspectiveCamera::new(config.fov_degrees, aspect, config.near, config.far),
            anchor: AnchorNode::new(),
            width: 0,
            height: 0,
            renders: 0,
            released: false,
        };
        renderer.resize(width, height);
        renderer
    }

    /// Attach content under the anchor.
    pub fn attach(&mut self, mesh: MeshData, local: Mat4) -> MeshId {
        self.anchor.attach(mesh, local)
    }

    /// Attach the placeholder box for a `target_width` x `target_height`
    /// target unless content is already attached.
    pub fn ensure_content(&mut self, target_width: u32, target_height: u32, config: &OverlayConfig) {
        if self.anchor.has_content() {
            return;
        }
        if config.debug_grid > 0 {
            for (mesh, local) in scene::placeholder_grid(
                target_width,
                target_height,
                config.model_scale,
                config.debug_grid,
            ) {
                self.anchor.attach(mesh, local);
            }
        } else {
            let (mesh, local) = scene::placeholder_box(target_width, target_height, config.model_scale);
            self.anchor.attach(mesh, local);
        }
        tracing::debug!(
            "Placeholder content for {target_width}x{target_height} target ({} meshes)",
            self.anchor.children().len()
        );
    }

    /// Copy `pose` into the anchor and render. Runs on every call.
    pub fn apply_pose(&mut self, pose: &PoseTransform) {
        self.anchor.set_matrix(pose);
        self.render();
    }

    /// Resize the canvas and regenerate the camera projection.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        if width == 0 || height == 0 {
            tracing::debug!("Ignoring degenerate resize to {width}x{height}");
            return;
        }
        self.camera.set_aspect(width as f32 / height as f32);
        self.surface.resize(width, height);
        tracing::debug!("Resized to {}x{}", width, height);
    }

    pub fn show(&mut self) {
        self.anchor.set_visible(true);
    }

    /// Hide the anchor. A visible anchor is redrawn hidden right away,
    /// since no pose update may follow to refresh the surface.
    pub fn hide(&mut self) {
        if self.anchor.is_visible() {
            self.anchor.set_visible(false);
            self.render();
        }
    }

    pub fn is_visible(&self) -> bool {
        self.anchor.is_visible()
    }

    /// Forward a pass-through camera frame to the surface.
    pub fn present_video_frame(&mut self, frame: &FrameImage) {
        if !frame.is_complete() {
            tracing::warn!(
                "Skipping incomplete video frame ({} bytes for {}x{})",
                frame.pixels.len(),
                frame.width,
                frame.height
            );
            return;
        }
        self.surface.present_video_frame(frame);
    }

    /// Draw the scene from the camera. Surface errors are handled here.
    pub fn render(&mut self) {
        if self.released {
            return;
        }
        let frame = RenderFrame {
            projection: self.camera.projection_matrix(),
            view: self.camera.view_matrix(),
            anchor: self.anchor.matrix().to_mat4(),
            anchor_visible: self.anchor.is_visible(),
            meshes: self.anchor.children(),
        };
        self.renders += 1;

        match self.surface.draw(&frame) {
            Ok(()) => {}
            Err(SurfaceError::Lost | SurfaceError::Outdated) => {
                tracing::debug!("Surface lost, reconfiguring");
                if self.width > 0 && self.height > 0 {
                    self.surface.resize(self.width, self.height);
                }
            }
            Err(e) => tracing::error!("Render error: {e}"),
        }
    }

    /// Release the surface. Further renders are no-ops.
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.surface.release();
        }
    }

    pub fn anchor(&self) -> &AnchorNode {
        &self.anchor
    }

    pub fn camera(&self) -> &PerspectiveCamera {
        &self.camera
    }

    /// Canvas size in pixels.
    pub fn canvas_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Frames rendered so far.
    pub fn render_count(&self) -> u64 {
        self.renders
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSurface;

    fn renderer(width: u32, height: u32) -> (OverlayRenderer, RecordingSurface) {
        let surface = RecordingSurface::new();
        let renderer = OverlayRenderer::new(Box::new(surface.clone()), &OverlayConfig::default(), width, height);
        (renderer, surface)
    }

    #[test]
    fn resize_updates_canvas_and_aspect() {
        let (mut renderer, surface) = renderer(800, 600);
        assert_eq!(renderer.camera().aspect(), 800.0 / 600.0);

        renderer.resize(600, 800);
        assert_eq!(renderer.camera().aspect(), 600.0 / 800.0);
        assert_eq!(renderer.canvas_size(), (600, 800));
        assert_eq!(surface.resizes(), vec![(800, 600), (600, 800)]);
    }

    #[test]
    fn resize_keeps_anchor_state() {
        let (mut renderer, _) = renderer(800, 600);
        let pose = PoseTransform::new(std::array::from_fn(|i| i as f32));
        renderer.apply_pose(&pose);
        renderer.show();

        renderer.resize(1024, 768);
        assert!(renderer.is_visible());
        assert_eq!(renderer.anchor().matrix(), &pose);
    }

    #[test]
    fn apply_pose_is_bit_identical() {
        let (mut renderer, surface) = renderer(640, 480);
        let values = [
            1.0, 0.0, 0.0, 0.1, //
            0.0, 1.0, 0.0, -0.2, //
            0.0, 0.0, 1.0, -1.5, //
            0.0, 0.0, 0.0, 1.0,
        ];
        renderer.apply_pose(&PoseTransform::new(values));

        let stored = renderer.anchor().matrix().values();
        for (a, b) in stored.iter().zip(values.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
        assert_eq!(surface.draws(), 1);
    }

    #[test]
    fn same_pose_renders_every_time() {
        let (mut renderer, surface) = renderer(640, 480);
        renderer.apply_pose(&PoseTransform::IDENTITY);
        renderer.apply_pose(&PoseTransform::IDENTITY);
        assert_eq!(surface.draws(), 2);
        assert_eq!(renderer.render_count(), 2);
    }

    #[test]
    fn draw_reports_visibility_and_content() {
        let (mut renderer, surface) = renderer(640, 480);
        renderer.ensure_content(640, 480, &OverlayConfig::default());
        renderer.ensure_content(640, 480, &OverlayConfig::default());
        renderer.show();
        renderer.render();

        let last = surface.last_draw().unwrap();
        assert!(last.anchor_visible);
        assert_eq!(last.mesh_count, 1);
    }

    #[test]
    fn hide_redraws_once() {
        let (mut renderer, surface) = renderer(640, 480);
        renderer.show();
        renderer.render();

        renderer.hide();
        renderer.hide();
        assert_eq!(surface.draws(), 2);
        assert!(!surface.last_draw().unwrap().anchor_visible);
    }

    #[test]
    fn lost_surface_is_reconfigured() {
        let (mut renderer, surface) = renderer(640, 480);
        surface.fail_next_draw(SurfaceError::Lost);
        renderer.render();
        assert_eq!(surface.resizes(), vec![(640, 480), (640, 480)]);
    }

    #[test]
    fn degenerate_resize_is_recorded_only() {
        let (mut renderer, surface) = renderer(640, 480);
        renderer.resize(0, 480);
        assert_eq!(renderer.canvas_size(), (0, 480));
        assert_eq!(renderer.camera().aspect(), 640.0 / 480.0);
        assert_eq!(surface.resizes(), vec![(640, 480)]);
    }

    #[test]
    fn incomplete_frames_are_skipped() {
        let (mut renderer, surface) = renderer(4, 4);
        renderer.present_video_frame(&FrameImage::new(2, 2, vec![0; 3]));
        renderer.present_video_frame(&FrameImage::new(2, 2, vec![0; 16]));
        assert_eq!(surface.video_frames(), vec![(2, 2)]);
    }

    #[test]
    fn release_is_idempotent() {
        let (mut renderer, surface) = renderer(640, 480);
        renderer.release();
        renderer.release();
        renderer.render();
        assert_eq!(surface.releases(), 1);
        assert_eq!(surface.draws(), 0);
    }
}
