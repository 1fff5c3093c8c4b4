//! Closed triangle meshes used for inertia and hydrodynamics.

use crate::{fph, quantities::Pose};
use nalgebra::{Point3, Vector3, point};
use std::f64::consts::PI;

/// A closed triangle mesh with counter-clockwise winding when viewed from
/// outside, so that `(v1 - v0) × (v2 - v0)` points out of the enclosed
/// volume.
#[derive(Clone, Debug, PartialEq)]
pub struct TriangleMesh {
    positions: Vec<Point3<fph>>,
    indices: Vec<[u32; 3]>,
}

impl TriangleMesh {
    /// Creates a mesh from the given vertex positions and triangle indices.
    ///
    /// # Panics
    /// If any index is out of bounds.
    pub fn new(positions: Vec<Point3<fph>>, indices: Vec<[u32; 3]>) -> Self {
        let n_vertices = positions.len();
        assert!(
            indices
                .iter()
                .flatten()
                .all(|&idx| (idx as usize) < n_vertices),
            "Tried to create triangle mesh with out-of-bounds vertex index"
        );
        Self { positions, indices }
    }

    /// Creates a mesh representing a box with the given half extents, centered
    /// at the origin and aligned with the axes.
    ///
    /// # Panics
    /// If any of the half extents is negative.
    pub fn create_box(half_extents: &Vector3<fph>) -> Self {
        assert!(
            half_extents.iter().all(|&extent| extent >= 0.0),
            "Tried to create box mesh with negative extent"
        );
        let (x, y, z) = (Vector3::x(), Vector3::y(), Vector3::z());

        // Outward normal followed by two tangents with `u × v = n`
        let faces = [(x, y, z), (-x, z, y), (y, z, x), (-y, x, z), (z, x, y), (-z, y, x)];

        let mut positions = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(12);

        for (normal, u, v) in faces {
            let center = normal.component_mul(half_extents);
            let u = u.component_mul(half_extents);
            let v = v.component_mul(half_extents);
            let base = positions.len() as u32;
            positions.extend_from_slice(&[
                Point3::from(center - u - v),
                Point3::from(center + u - v),
                Point3::from(center + u + v),
                Point3::from(center - u + v),
            ]);
            indices.push([base, base + 1, base + 2]);
            indices.push([base, base + 2, base + 3]);
        }

        Self { positions, indices }
    }

    /// Creates a UV sphere mesh with the given radius, centered at the
    /// origin, with `n_rings` latitude bands and twice as many longitude
    /// segments.
    ///
    /// # Panics
    /// If `n_rings` is smaller than 2.
    pub fn create_sphere(radius: fph, n_rings: u32) -> Self {
        assert!(n_rings >= 2, "Tried to create sphere mesh with fewer than two rings");
        let n_segments = 2 * n_rings;

        let mut positions = Vec::with_capacity(((n_rings + 1) * (n_segments + 1)) as usize);
        for ring in 0..=n_rings {
            let polar_angle = PI * fph::from(ring) / fph::from(n_rings);
            for segment in 0..=n_segments {
                let azimuthal_angle = 2.0 * PI * fph::from(segment) / fph::from(n_segments);
                positions.push(point![
                    radius * polar_angle.sin() * azimuthal_angle.cos(),
                    radius * polar_angle.sin() * azimuthal_angle.sin(),
                    radius * polar_angle.cos()
                ]);
            }
        }

        let indices = grid_indices(n_rings, n_segments, |ring, segment| {
            ring * (n_segments + 1) + segment
        });

        Self { positions, indices }
    }

    /// Creates a cylinder mesh with the given radius and length, centered at
    /// the origin with its axis along z.
    ///
    /// # Panics
    /// If `n_segments` is smaller than 3.
    pub fn create_cylinder(radius: fph, length: fph, n_segments: u32) -> Self {
        assert!(n_segments >= 3, "Tried to create cylinder mesh with fewer than three segments");
        let half_length = 0.5 * length;

        let mut positions = Vec::with_capacity(2 * n_segments as usize + 2);
        for z in [-half_length, half_length] {
            for segment in 0..n_segments {
                let angle = 2.0 * PI * fph::from(segment) / fph::from(n_segments);
                positions.push(point![radius * angle.cos(), radius * angle.sin(), z]);
            }
        }
        let bottom_center = positions.len() as u32;
        positions.push(point![0.0, 0.0, -half_length]);
        let top_center = bottom_center + 1;
        positions.push(point![0.0, 0.0, half_length]);

        let mut indices = Vec::with_capacity(4 * n_segments as usize);
        for segment in 0..n_segments {
            let next = (segment + 1) % n_segments;
            let (bottom, bottom_next) = (segment, next);
            let (top, top_next) = (segment + n_segments, next + n_segments);

            indices.push([bottom, bottom_next, top_next]);
            indices.push([bottom, top_next, top]);
            indices.push([top_center, top, top_next]);
            indices.push([bottom_center, bottom_next, bottom]);
        }

        Self { positions, indices }
    }

    /// Creates a torus mesh with the given major and minor radius, centered at
    /// the origin with its axis of symmetry along z.
    ///
    /// # Panics
    /// If either segment count is smaller than 3.
    pub fn create_torus(
        major_radius: fph,
        minor_radius: fph,
        n_major_segments: u32,
        n_minor_segments: u32,
    ) -> Self {
        assert!(
            n_major_segments >= 3 && n_minor_segments >= 3,
            "Tried to create torus mesh with fewer than three segments"
        );

        let mut positions =
            Vec::with_capacity(((n_major_segments + 1) * (n_minor_segments + 1)) as usize);
        for major in 0..=n_major_segments {
            let major_angle = 2.0 * PI * fph::from(major) / fph::from(n_major_segments);
            for minor in 0..=n_minor_segments {
                let minor_angle = 2.0 * PI * fph::from(minor) / fph::from(n_minor_segments);
                let ring_radius = major_radius + minor_radius * minor_angle.cos();
                positions.push(point![
                    ring_radius * major_angle.cos(),
                    ring_radius * major_angle.sin(),
                    minor_radius * minor_angle.sin()
                ]);
            }
        }

        let indices = grid_indices(n_major_segments, n_minor_segments, |major, minor| {
            major * (n_minor_segments + 1) + minor
        });

        Self { positions, indices }
    }

    pub fn n_vertices(&self) -> usize {
        self.positions.len()
    }

    pub fn n_triangles(&self) -> usize {
        self.indices.len()
    }

    pub fn positions(&self) -> &[Point3<fph>] {
        &self.positions
    }

    pub fn indices(&self) -> &[[u32; 3]] {
        &self.indices
    }

    /// Returns an iterator over the three vertex positions of each triangle.
    pub fn triangle_vertex_positions(&self) -> impl Iterator<Item = [&Point3<fph>; 3]> {
        self.indices.iter().map(|[i, j, k]| {
            [
                &self.positions[*i as usize],
                &self.positions[*j as usize],
                &self.positions[*k as usize],
            ]
        })
    }

    /// Returns the distance from the origin to the farthest vertex.
    pub fn bounding_radius(&self) -> fph {
        self.positions
            .iter()
            .map(|position| position.coords.norm())
            .fold(0.0, fph::max)
    }

    /// Translates all vertices by the given displacement.
    pub fn translate(&mut self, displacement: &Vector3<fph>) {
        for position in &mut self.positions {
            *position += displacement;
        }
    }

    /// Returns a copy of the mesh with every vertex transformed by the given
    /// pose.
    pub fn transformed(&self, pose: &Pose) -> Self {
        Self {
            positions: self
                .positions
                .iter()
                .map(|position| pose.transform_point(position))
                .collect(),
            indices: self.indices.clone(),
        }
    }

    /// Returns the vertex farthest along the given direction.
    pub fn support_point(&self, direction: &Vector3<fph>) -> Point3<fph> {
        self.positions
            .iter()
            .copied()
            .max_by(|a, b| a.coords.dot(direction).total_cmp(&b.coords.dot(direction)))
            .unwrap_or_else(Point3::origin)
    }
}

/// Triangulates a `(n_u + 1) × (n_v + 1)` vertex grid whose parametrization
/// has `∂u × ∂v` pointing outward.
fn grid_indices(n_u: u32, n_v: u32, vertex_idx: impl Fn(u32, u32) -> u32) -> Vec<[u32; 3]> {
    let mut indices = Vec::with_capacity(2 * (n_u * n_v) as usize);
    for u in 0..n_u {
        for v in 0..n_v {
            let (a, b) = (vertex_idx(u, v), vertex_idx(u + 1, v));
            let (c, d) = (vertex_idx(u + 1, v + 1), vertex_idx(u, v + 1));
            indices.push([a, b, c]);
            indices.push([a, c, d]);
        }
    }
    indices
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::inertia::{
        compute_cylinder_volume, compute_sphere_volume, compute_torus_volume,
        compute_triangle_mesh_volume,
    };
    use approx::assert_abs_diff_eq;
    use nalgebra::vector;

    fn triangle_normals_point_outward(mesh: &TriangleMesh) -> bool {
        mesh.triangle_vertex_positions().all(|[v0, v1, v2]| {
            let normal = (v1 - v0).cross(&(v2 - v0));
            let centroid = (v0.coords + v1.coords + v2.coords) / 3.0;
            normal.norm() < 1e-12 || normal.dot(&centroid) > 0.0
        })
    }

    #[test]
    #[should_panic]
    fn creating_mesh_with_invalid_index_fails() {
        TriangleMesh::new(vec![Point3::origin()], vec![[0, 0, 1]]);
    }

    #[test]
    fn box_mesh_has_twelve_outward_triangles() {
        let mesh = TriangleMesh::create_box(&vector![1.0, 2.0, 3.0]);
        assert_eq!(mesh.n_triangles(), 12);
        assert!(triangle_normals_point_outward(&mesh));
    }

    #[test]
    fn sphere_mesh_volume_approaches_analytic_volume() {
        let mesh = TriangleMesh::create_sphere(0.5, 32);
        assert!(triangle_normals_point_outward(&mesh));
        let volume = compute_triangle_mesh_volume(&mesh);
        assert_abs_diff_eq!(volume, compute_sphere_volume(0.5), epsilon = 0.01 * volume);
    }

    #[test]
    fn cylinder_mesh_volume_approaches_analytic_volume() {
        let mesh = TriangleMesh::create_cylinder(0.3, 2.0, 64);
        assert!(triangle_normals_point_outward(&mesh));
        let volume = compute_triangle_mesh_volume(&mesh);
        assert_abs_diff_eq!(volume, compute_cylinder_volume(0.3, 2.0), epsilon = 0.01 * volume);
    }

    #[test]
    fn torus_mesh_volume_approaches_analytic_volume() {
        let mesh = TriangleMesh::create_torus(1.0, 0.25, 64, 32);
        let volume = compute_triangle_mesh_volume(&mesh);
        assert_abs_diff_eq!(volume, compute_torus_volume(1.0, 0.25), epsilon = 0.01 * volume);
    }

    #[test]
    fn support_point_is_extreme_vertex() {
        let mesh = TriangleMesh::create_box(&vector![1.0, 2.0, 3.0]);
        let support = mesh.support_point(&vector![1.0, 1.0, -1.0]);
        assert_abs_diff_eq!(support, point![1.0, 2.0, -3.0]);
    }
}
