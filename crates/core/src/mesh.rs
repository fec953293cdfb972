//! Triangle meshes for anchor content.
//!
//! Meshes are flat triangle lists with per-face normals, ready to upload
//! as a vertex buffer without indices.

use glam::Vec3;

/// Vertex with position and normal.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

/// Built mesh data ready for GPU upload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshData {
    pub vertices: Vec<MeshVertex>,
}

impl MeshData {
    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Axis-aligned bounds as (min, max), or `None` for an empty mesh.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let mut iter = self.vertices.iter().map(|v| Vec3::from(v.position));
        let first = iter.next()?;
        Some(iter.fold((first, first), |(min, max), p| (min.min(p), max.max(p))))
    }
}

/// Fluent mesh builder for procedural geometry.
#[derive(Debug, Default)]
pub struct MeshBuilder {
    vertices: Vec<MeshVertex>,
}

impl MeshBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a triangle, normal taken from the winding (counter-clockwise).
    pub fn add_triangle(&mut self, p1: Vec3, p2: Vec3, p3: Vec3) -> &mut Self {
        let normal: [f32; 3] = (p2 - p1).cross(p3 - p1).normalize_or_zero().into();
        for p in [p1, p2, p3] {
            self.vertices.push(MeshVertex {
                position: p.into(),
                normal,
            });
        }
        self
    }

    /// Add a quad as two triangles (1, 2, 3) and (1, 3, 4).
    pub fn add_quad(&mut self, p1: Vec3, p2: Vec3, p3: Vec3, p4: Vec3) -> &mut Self {
        self.add_triangle(p1, p2, p3);
        self.add_triangle(p1, p3, p4)
    }

    /// Add a box centered at `center`.
    pub fn add_box_at(&mut self, center: Vec3, width: f32, height: f32, depth: f32) -> &mut Self {
        let h = Vec3::new(width, height, depth) / 2.0;
        let corner = |x: f32, y: f32, z: f32| center + Vec3::new(x * h.x, y * h.y, z * h.z);

        // +Z, -Z
        self.add_quad(corner(-1., -1., 1.), corner(1., -1., 1.), corner(1., 1., 1.), corner(-1., 1., 1.));
        self.add_quad(corner(1., -1., -1.), corner(-1., -1., -1.), corner(-1., 1., -1.), corner(1., 1., -1.));
        // +Y, -Y
        self.add_quad(corner(-1., 1., 1.), corner(1., 1., 1.), corner(1., 1., -1.), corner(-1., 1., -1.));
        self.add_quad(corner(-1., -1., -1.), corner(1., -1., -1.), corner(1., -1., 1.), corner(-1., -1., 1.));
        // +X, -X
        self.add_quad(corner(1., -1., 1.), corner(1., -1., -1.), corner(1., 1., -1.), corner(1., 1., 1.));
        self.add_quad(corner(-1., -1., -1.), corner(-1., -1., 1.), corner(-1., 1., 1.), corner(-1., 1., -1.));
        self
    }

    /// Add a box centered at the origin.
    pub fn add_box(&mut self, width: f32, height: f32, depth: f32) -> &mut Self {
        self.add_box_at(Vec3::ZERO, width, height, depth)
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Build the final mesh data.
    pub fn build(&self) -> MeshData {
        MeshData {
            vertices: self.vertices.clone(),
        }
    }

    /// Build and consume the builder.
    pub fn finish(self) -> MeshData {
        MeshData {
            vertices: self.vertices,
        }
    }
}
