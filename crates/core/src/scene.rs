//! Anchor node and its attached content.

use glam::{Mat4, Vec3};

use crate::mesh::{MeshBuilder, MeshData};
use crate::pose::PoseTransform;

/// Identifies a mesh attached to the anchor. Stable for the life of the
/// renderer so surfaces can cache GPU buffers per mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub u32);

/// A mesh placed relative to the anchor.
#[derive(Debug, Clone)]
pub struct MeshNode {
    pub id: MeshId,
    pub mesh: MeshData,
    /// Transform from mesh space to anchor space.
    pub local: Mat4,
    pub frustum_culled: bool,
}

/// The scene node driven by tracker poses.
///
/// Its matrix is whatever the last pose said, verbatim: there is no
/// position/rotation/scale to recompose it from.
#[derive(Debug, Clone)]
pub struct AnchorNode {
    matrix: PoseTransform,
    visible: bool,
    children: Vec<MeshNode>,
    next_id: u32,
}

impl AnchorNode {
    /// Anchor nodes never recompose their matrix.
    pub const MATRIX_AUTO_UPDATE: bool = false;
    /// Anchor nodes are never frustum culled.
    pub const FRUSTUM_CULLED: bool = false;

    /// Hidden anchor at the identity pose with no content.
    pub fn new() -> Self {
        Self {
            matrix: PoseTransform::IDENTITY,
            visible: false,
            children: Vec::new(),
            next_id: 0,
        }
    }

    pub fn matrix(&self) -> &PoseTransform {
        &self.matrix
    }

    pub fn set_matrix(&mut self, pose: &PoseTransform) {
        self.matrix = *pose;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Attach a mesh under the anchor.
    pub fn attach(&mut self, mesh: MeshData, local: Mat4) -> MeshId {
        let id = MeshId(self.next_id);
        self.next_id += 1;
        self.children.push(MeshNode {
            id,
            mesh,
            local,
            frustum_culled: false,
        });
        id
    }

    pub fn children(&self) -> &[MeshNode] {
        &self.children
    }

    pub fn has_content(&self) -> bool {
        !self.children.is_empty()
    }
}

impl Default for AnchorNode {
    fn default() -> Self {
        Self::new()
    }
}

/// Placeholder box sized to the tracked target.
///
/// The box spans the target's aspect ratio normalized to a unit longest
/// side, is as deep as its shorter side, and sits on the anchor plane.
pub fn placeholder_box(target_width: u32, target_height: u32, model_scale: f32) -> (MeshData, Mat4) {
    let longest = target_width.max(target_height).max(1) as f32;
    let width = target_width as f32 / longest;
    let height = target_height as f32 / longest;
    let depth = width.min(height);

    let mut builder = MeshBuilder::new();
    builder.add_box(width, height, depth);

    let local = Mat4::from_translation(Vec3::new(0.0, model_scale * depth / 2.0, 0.0))
        * Mat4::from_scale(Vec3::splat(model_scale));
    (builder.finish(), local)
}

/// Largest side of the placeholder grid.
pub const MAX_GRID: u32 = 64;

/// `count` x `count` grid of placeholder boxes on the anchor's XZ-plane.
/// `count` is clamped to [`MAX_GRID`].
pub fn placeholder_grid(
    target_width: u32,
    target_height: u32,
    model_scale: f32,
    count: u32,
) -> Vec<(MeshData, Mat4)> {
    let (mesh, local) = placeholder_box(target_width, target_height, model_scale);
    let longest = target_width.max(target_height).max(1) as f32;
    let depth = target_width.min(target_height) as f32 / longest;
    let spacing = 4.0 * model_scale * depth;
    let count = count.min(MAX_GRID);
    let half = count as i32 / 2;

    let mut cells = Vec::with_capacity(count as usize * count as usize);
    for i in 0..count as i32 {
        for j in 0..count as i32 {
            let offset = Vec3::new((i - half) as f32 * spacing, 0.0, (j - half) as f32 * spacing);
            cells.push((mesh.clone(), Mat4::from_translation(offset) * local));
        }
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchor_starts_hidden_at_identity() {
        let anchor = AnchorNode::new();
        assert!(!anchor.is_visible());
        assert_eq!(anchor.matrix(), &PoseTransform::IDENTITY);
        assert!(!anchor.has_content());
        assert!(!AnchorNode::MATRIX_AUTO_UPDATE);
        assert!(!AnchorNode::FRUSTUM_CULLED);
    }

    #[test]
    fn attach_assigns_distinct_ids() {
        let mut anchor = AnchorNode::new();
        let a = anchor.attach(MeshData::default(), Mat4::IDENTITY);
        let b = anchor.attach(MeshData::default(), Mat4::IDENTITY);
        assert_ne!(a, b);
        assert_eq!(anchor.children().len(), 2);
        assert!(anchor.children().iter().all(|c| !c.frustum_culled));
    }

    #[test]
    fn placeholder_follows_target_aspect() {
        let (mesh, local) = placeholder_box(640, 480, 0.3);
        let (min, max) = mesh.bounds().unwrap();
        let size = max - min;
        assert!((size.x - 1.0).abs() < 1e-6);
        assert!((size.y - 0.75).abs() < 1e-6);
        assert!((size.z - 0.75).abs() < 1e-6);

        // Scaled by 0.3 and resting on the anchor plane.
        let bottom = local.transform_point3(Vec3::new(0.0, min.y, 0.0));
        assert!(bottom.y.abs() < 1e-6);
        let top = local.transform_point3(Vec3::new(0.0, max.y, 0.0));
        assert!((top.y - 0.3 * 0.75).abs() < 1e-6);
    }

    #[test]
    fn placeholder_grid_size() {
        let cells = placeholder_grid(640, 480, 0.3, 3);
        assert_eq!(cells.len(), 9);
        // Center cell has no extra offset.
        let (_, center) = placeholder_box(640, 480, 0.3);
        assert_eq!(cells[4].1, center);
    }

    #[test]
    fn placeholder_grid_is_clamped() {
        let cells = placeholder_grid(640, 480, 0.3, 70_000);
        assert_eq!(cells.len(), (MAX_GRID * MAX_GRID) as usize);
    }
}
