//! Estimation of the fluid volume displaced by a solid.

use super::FluidDomain;
use crate::{
    fph,
    geometry::{Shape, TriangleMesh},
    quantities::{self, Pose, Position},
};
use nalgebra::{UnitVector3, Vector3};
use std::f64::consts::PI;

/// The part of a solid lying inside a fluid.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SubmergedVolume {
    /// The displaced fluid volume.
    pub volume: fph,
    /// The centroid of the displaced volume (the center of buoyancy), in
    /// world space.
    pub center: Position,
}

/// The part of a triangle lying inside a fluid, with the depth of each
/// vertex.
#[derive(Clone, Copy, Debug)]
pub(super) struct SubmergedPolygon {
    vertices: [Position; 4],
    depths: [fph; 4],
    len: usize,
}

impl SubmergedVolume {
    pub fn empty(center: Position) -> Self {
        Self {
            volume: 0.0,
            center,
        }
    }

    /// Whether nothing is submerged. A volume or center that is not finite
    /// counts as empty.
    pub fn is_empty(&self) -> bool {
        !(self.volume > 0.0 && self.volume.is_finite())
            || !quantities::is_finite_vector(&self.center.coords)
    }
}

impl SubmergedPolygon {
    /// Clips the triangle with the given world space vertices against the
    /// free surface of the fluid.
    pub(super) fn clip_triangle(fluid: &FluidDomain, triangle: [&Position; 3]) -> Self {
        let depths = triangle.map(|vertex| fluid.depth(vertex));

        let mut polygon = Self {
            vertices: [Position::origin(); 4],
            depths: [0.0; 4],
            len: 0,
        };

        for idx in 0..3 {
            let next_idx = (idx + 1) % 3;
            let (depth, next_depth) = (depths[idx], depths[next_idx]);

            if depth >= 0.0 {
                polygon.push(*triangle[idx], depth);
            }
            if (depth >= 0.0) != (next_depth >= 0.0) {
                let fraction = depth / (depth - next_depth);
                let crossing = triangle[idx] + (triangle[next_idx] - triangle[idx]) * fraction;
                polygon.push(crossing, 0.0);
            }
        }
        polygon
    }

    fn push(&mut self, vertex: Position, depth: fph) {
        if self.len < self.vertices.len() {
            self.vertices[self.len] = vertex;
            self.depths[self.len] = depth;
            self.len += 1;
        }
    }

    pub(super) fn is_empty(&self) -> bool {
        self.len < 3
    }

    /// Returns the vertices and depths of each triangle in a fan
    /// triangulation of the polygon.
    pub(super) fn triangles(&self) -> impl Iterator<Item = ([&Position; 3], [fph; 3])> {
        (1..self.len.saturating_sub(1)).map(move |idx| {
            (
                [&self.vertices[0], &self.vertices[idx], &self.vertices[idx + 1]],
                [self.depths[0], self.depths[idx], self.depths[idx + 1]],
            )
        })
    }

    /// Computes the area-weighted normal vector and the centroid of the
    /// polygon.
    pub(super) fn area_vector_and_centroid(&self) -> (Vector3<fph>, Position) {
        let mut area_vector = Vector3::zeros();
        let mut weighted_centroid = Vector3::zeros();
        let mut total_area = 0.0;
        for ([v0, v1, v2], _) in self.triangles() {
            let triangle_area_vector = 0.5 * (v1 - v0).cross(&(v2 - v0));
            let area = triangle_area_vector.norm();
            area_vector += triangle_area_vector;
            weighted_centroid += area * (v0.coords + v1.coords + v2.coords) / 3.0;
            total_area += area;
        }
        let centroid = if total_area > 0.0 {
            Position::from(weighted_centroid / total_area)
        } else {
            Position::from(self.vertices[0].coords)
        };
        (area_vector, centroid)
    }
}

/// Computes the submerged volume and center of buoyancy of the closed world
/// space mesh by integrating the hydrostatic pressure over the part of its
/// surface lying inside the fluid.
///
/// The waterline cap closing the submerged region carries zero pressure, so
/// only the clipped triangles contribute. With `N` the surface normal and `d`
/// the depth, the integrals are
/// `V = -∮ d (n·N) dA`, `∫ d dV = -∮ d²/2 (n·N) dA` and
/// `∫ x dV = N ∫ d dV - ∮ x d (n·N) dA`.
pub fn compute_submerged_volume_of_mesh(
    fluid: &FluidDomain,
    world_mesh: &TriangleMesh,
) -> SubmergedVolume {
    let normal = fluid.surface_normal();

    let mut volume = 0.0;
    let mut depth_moment = 0.0;
    let mut surface_moment = Vector3::zeros();

    for triangle in world_mesh.triangle_vertex_positions() {
        let polygon = SubmergedPolygon::clip_triangle(fluid, triangle);
        if polygon.is_empty() {
            continue;
        }
        for ([v0, v1, v2], [d0, d1, d2]) in polygon.triangles() {
            let projected_area = 0.5 * (v1 - v0).cross(&(v2 - v0)).dot(normal);
            let depth_sum = d0 + d1 + d2;
            let squared_depth_sum = d0 * d0 + d1 * d1 + d2 * d2 + d0 * d1 + d1 * d2 + d0 * d2;
            let weighted_vertices = v0.coords * d0 + v1.coords * d1 + v2.coords * d2;
            let vertex_sum = v0.coords + v1.coords + v2.coords;

            volume -= projected_area * depth_sum / 3.0;
            depth_moment -= projected_area * squared_depth_sum / 12.0;
            surface_moment += projected_area * (weighted_vertices + vertex_sum * depth_sum) / 12.0;
        }
    }

    if !(volume > fph::EPSILON) || !volume.is_finite() {
        return SubmergedVolume::empty(mesh_center(world_mesh));
    }

    let first_moment = normal.into_inner() * depth_moment - surface_moment;

    SubmergedVolume {
        volume,
        center: Position::from(first_moment / volume),
    }
}

/// Estimates the submerged volume and center of buoyancy of the given shape
/// at the given pose from its dimensions.
///
/// Spheres use the exact spherical cap. Boxes, cylinders and tori use a
/// submerged fraction growing linearly across the shape's extent along the
/// surface normal. Returns [`None`] for shapes without an analytic estimate.
pub fn compute_analytic_submerged_volume(
    fluid: &FluidDomain,
    shape: &Shape,
    pose: &Pose,
) -> Option<SubmergedVolume> {
    let normal = fluid.surface_normal();
    let center = Position::from(pose.translation.vector);
    let center_depth = fluid.depth(&center);

    let submerged = match shape {
        Shape::Sphere { radius } => {
            let immersion = (center_depth + radius).clamp(0.0, 2.0 * radius);
            let volume = PI * immersion.powi(2) * (3.0 * radius - immersion) / 3.0;
            if volume <= 0.0 {
                return Some(SubmergedVolume::empty(center));
            }
            let centroid_offset =
                3.0 * (2.0 * radius - immersion).powi(2) / (4.0 * (3.0 * radius - immersion));
            SubmergedVolume {
                volume,
                center: center - normal.into_inner() * centroid_offset,
            }
        }
        Shape::Box { .. } | Shape::Cylinder { .. } | Shape::Torus { .. } => {
            let body_normal =
                UnitVector3::new_unchecked(pose.rotation.inverse_transform_vector(normal));
            let half_extent = shape.half_extent_along(&body_normal);
            let fraction = ((center_depth + half_extent) / (2.0 * half_extent)).clamp(0.0, 1.0);
            SubmergedVolume {
                volume: fraction * shape.volume(),
                center: center - normal.into_inner() * ((1.0 - fraction) * half_extent),
            }
        }
        Shape::Plane | Shape::Mesh(_) => return None,
    };

    // Clamping passes NaN through
    if submerged.is_empty() {
        Some(SubmergedVolume::empty(center))
    } else {
        Some(submerged)
    }
}

fn mesh_center(mesh: &TriangleMesh) -> Position {
    let n_vertices = mesh.n_vertices().max(1) as fph;
    Position::from(
        mesh.positions()
            .iter()
            .fold(Vector3::zeros(), |sum, position| sum + position.coords)
            / n_vertices,
    )
}
