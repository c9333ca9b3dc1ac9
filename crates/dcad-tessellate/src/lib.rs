#![warn(missing_docs)]

//! NURBS face tessellation for the dcad interchange codec.
//!
//! Converts model faces into triangle meshes by sampling the underlying
//! surface on a parametric grid and emitting two triangles per cell. The
//! meshes feed the STL and OBJ emitters, the native container, and the
//! application renderer.

use dcad_math::Point3;
use dcad_model::{Body, Face, Model};

/// Output triangle mesh for rendering and export.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    /// Flat array of vertex positions: `[x0, y0, z0, x1, y1, z1, ...]`.
    pub positions: Vec<f64>,
    /// Flat array of vertex normals, same length as `positions`.
    pub normals: Vec<f64>,
    /// Flat array of triangle indices: `[i0, i1, i2, ...]`.
    pub indices: Vec<u32>,
}

impl MeshData {
    /// An empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of triangles.
    pub fn num_triangles(&self) -> usize {
        self.indices.len() / 3
    }

    /// Number of vertices.
    pub fn num_vertices(&self) -> usize {
        self.positions.len() / 3
    }

    /// Vertex position `i` as a point.
    pub fn position(&self, i: usize) -> Point3 {
        Point3::new(
            self.positions[3 * i],
            self.positions[3 * i + 1],
            self.positions[3 * i + 2],
        )
    }

    /// Merge another mesh into this one, offsetting its indices.
    pub fn merge(&mut self, other: &MeshData) {
        let offset = self.num_vertices() as u32;
        self.positions.extend_from_slice(&other.positions);
        self.normals.extend_from_slice(&other.normals);
        self.indices.extend(other.indices.iter().map(|&i| i + offset));
    }
}

/// Mesh quality selector.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Quality {
    /// Coarse preview quality.
    Draft,
    /// Default quality.
    #[default]
    Standard,
    /// Dense output for final export.
    Fine,
    /// Explicit numeric control.
    Custom {
        /// Maximum chord deviation in mm.
        chord_tolerance: f64,
        /// Maximum angle between adjacent facet normals, radians.
        angle_tolerance: f64,
        /// Minimum edge length in mm.
        min_edge: f64,
        /// Maximum edge length in mm.
        max_edge: f64,
    },
}

impl Quality {
    /// Grid segments per knot span in each parametric direction.
    fn segments_per_span(&self) -> usize {
        match self {
            Quality::Draft => 4,
            Quality::Standard => 8,
            Quality::Fine => 16,
            Quality::Custom { chord_tolerance, .. } => {
                // Finer chord tolerance buys more segments, within sane bounds.
                let t = chord_tolerance.max(1e-6);
                ((10.0 / t).sqrt().ceil() as usize).clamp(4, 64)
            }
        }
    }
}

/// Tessellate a single face by uniform sampling of its surface domain.
pub fn tessellate_face(face: &Face, quality: Quality) -> MeshData {
    let surface = &face.surface;
    let per_span = quality.segments_per_span();
    let spans_u = surface.nu().saturating_sub(surface.degree_u).max(1);
    let spans_v = surface.nv().saturating_sub(surface.degree_v).max(1);
    let nu = (spans_u * per_span).min(256);
    let nv = (spans_v * per_span).min(256);

    let ((u0, u1), (v0, v1)) = surface.domain();
    let mut mesh = MeshData::new();

    for i in 0..=nu {
        let u = u0 + (u1 - u0) * i as f64 / nu as f64;
        for j in 0..=nv {
            let v = v0 + (v1 - v0) * j as f64 / nv as f64;
            let p = surface.point_at(u, v);
            let mut n = surface.normal_at(u, v).into_inner();
            if !face.same_sense {
                n = -n;
            }
            mesh.positions.extend_from_slice(&[p.x, p.y, p.z]);
            mesh.normals.extend_from_slice(&[n.x, n.y, n.z]);
        }
    }

    let stride = (nv + 1) as u32;
    for i in 0..nu as u32 {
        for j in 0..nv as u32 {
            let a = i * stride + j;
            let b = (i + 1) * stride + j;
            let c = (i + 1) * stride + j + 1;
            let d = i * stride + j + 1;
            if face.same_sense {
                mesh.indices.extend_from_slice(&[a, b, c, a, c, d]);
            } else {
                mesh.indices.extend_from_slice(&[a, c, b, a, d, c]);
            }
        }
    }

    mesh
}

/// Tessellate every face of a body into one merged mesh.
pub fn tessellate_body(body: &Body, quality: Quality) -> MeshData {
    let mut mesh = MeshData::new();
    for face in &body.faces {
        mesh.merge(&tessellate_face(face, quality));
    }
    mesh
}

/// Tessellate every body of a model, one mesh per body.
pub fn tessellate_model(model: &Model, quality: Quality) -> Vec<MeshData> {
    model
        .bodies
        .iter()
        .map(|b| tessellate_body(b, quality))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use dcad_math::{Dir3, Vec3};
    use dcad_model::Face;
    use dcad_nurbs::NurbsSurface;

    fn plane_face() -> Face {
        Face::unbounded(NurbsSurface::plane_patch(
            Point3::origin(),
            Dir3::new_normalize(Vec3::z()),
            None,
            10.0,
        ))
    }

    #[test]
    fn test_plane_tessellation_flat() {
        let mesh = tessellate_face(&plane_face(), Quality::Draft);
        assert!(mesh.num_triangles() > 0);
        for i in 0..mesh.num_vertices() {
            assert_relative_eq!(mesh.position(i).z, 0.0, epsilon = 1e-9);
        }
        assert_eq!(mesh.positions.len(), mesh.normals.len());
    }

    #[test]
    fn test_quality_orders_density() {
        let draft = tessellate_face(&plane_face(), Quality::Draft);
        let fine = tessellate_face(&plane_face(), Quality::Fine);
        assert!(fine.num_triangles() > draft.num_triangles());
    }

    #[test]
    fn test_cylinder_tessellation_on_radius() {
        let face = Face::unbounded(NurbsSurface::cylinder_patch(
            Point3::origin(),
            Dir3::new_normalize(Vec3::z()),
            None,
            5.0,
            20.0,
        ));
        let mesh = tessellate_face(&face, Quality::Standard);
        for i in 0..mesh.num_vertices() {
            let p = mesh.position(i);
            let r = (p.x * p.x + p.y * p.y).sqrt();
            assert_relative_eq!(r, 5.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_merge_offsets_indices() {
        let a = tessellate_face(&plane_face(), Quality::Draft);
        let mut merged = a.clone();
        merged.merge(&a);
        assert_eq!(merged.num_vertices(), 2 * a.num_vertices());
        assert_eq!(merged.num_triangles(), 2 * a.num_triangles());
        let max_index = *merged.indices.iter().max().unwrap() as usize;
        assert!(max_index < merged.num_vertices());
    }
}
