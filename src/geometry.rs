//! Collision and hydrodynamic geometry of simulated objects.

mod mesh;

pub use mesh::TriangleMesh;

use crate::{fph, inertia::{self, InertialProperties}};
use anyhow::{Result, bail};
use nalgebra::{Point3, UnitVector3, Vector3, point, vector};
use std::{f64::consts::PI, sync::Arc};

/// The geometric shape of an entity, expressed in the entity's own reference
/// frame.
///
/// Cylinders and tori have their axis of symmetry along the z-axis. A plane
/// is the infinite half-space `z <= 0`, with its surface normal along +z.
#[derive(Clone, Debug, PartialEq)]
pub enum Shape {
    Plane,
    Sphere { radius: fph },
    Box { half_extents: Vector3<fph> },
    Cylinder { radius: fph, length: fph },
    Torus { major_radius: fph, minor_radius: fph },
    /// A closed triangle mesh. Collision detection treats it as convex.
    Mesh(Arc<TriangleMesh>),
}

/// Signed distance from a shape's surface together with the outward surface
/// normal at the closest surface point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceDistance {
    pub distance: fph,
    pub normal: UnitVector3<fph>,
}

impl Shape {
    /// Checks that all dimensions of the shape are positive and finite.
    ///
    /// # Errors
    /// Returns an error describing the first invalid dimension.
    pub fn validate(&self) -> Result<()> {
        let positive = |value: fph| value > 0.0 && value.is_finite();
        match self {
            Self::Plane => {}
            Self::Sphere { radius } => {
                if !positive(*radius) {
                    bail!("Invalid sphere radius: {radius}");
                }
            }
            Self::Box { half_extents } => {
                if !half_extents.iter().copied().all(positive) {
                    bail!("Invalid box half extents: {half_extents:?}");
                }
            }
            Self::Cylinder { radius, length } => {
                if !positive(*radius) || !positive(*length) {
                    bail!("Invalid cylinder dimensions: radius {radius}, length {length}");
                }
            }
            Self::Torus {
                major_radius,
                minor_radius,
            } => {
                if !positive(*minor_radius) || !(major_radius > minor_radius) {
                    bail!(
                        "Invalid torus dimensions: major radius {major_radius}, minor radius {minor_radius}"
                    );
                }
            }
            Self::Mesh(mesh) => {
                if mesh.n_triangles() < 4 {
                    bail!("Mesh shape needs at least four triangles, got {}", mesh.n_triangles());
                }
                if !(inertia::compute_triangle_mesh_volume(mesh) > 0.0) {
                    bail!("Mesh shape does not enclose a positive volume");
                }
            }
        }
        Ok(())
    }

    /// Whether the shape encloses a finite volume.
    pub fn is_bounded(&self) -> bool {
        !matches!(self, Self::Plane)
    }

    /// Returns the enclosed volume, which is infinite for a plane.
    pub fn volume(&self) -> fph {
        match self {
            Self::Plane => fph::INFINITY,
            Self::Sphere { radius } => inertia::compute_sphere_volume(*radius),
            Self::Box { half_extents } => inertia::compute_box_volume(half_extents),
            Self::Cylinder { radius, length } => inertia::compute_cylinder_volume(*radius, *length),
            Self::Torus {
                major_radius,
                minor_radius,
            } => inertia::compute_torus_volume(*major_radius, *minor_radius),
            Self::Mesh(mesh) => inertia::compute_triangle_mesh_volume(mesh),
        }
    }

    /// Computes the inertial properties of the shape filled with material of
    /// the given density, or returns [`None`] for an unbounded shape.
    pub fn inertial_properties(&self, mass_density: fph) -> Option<InertialProperties> {
        Some(match self {
            Self::Plane => return None,
            Self::Sphere { radius } => InertialProperties::of_uniform_sphere(*radius, mass_density),
            Self::Box { half_extents } => {
                InertialProperties::of_uniform_box(half_extents, mass_density)
            }
            Self::Cylinder { radius, length } => {
                InertialProperties::of_uniform_cylinder(*radius, *length, mass_density)
            }
            Self::Torus {
                major_radius,
                minor_radius,
            } => InertialProperties::of_uniform_torus(*major_radius, *minor_radius, mass_density),
            Self::Mesh(mesh) => InertialProperties::of_uniform_triangle_mesh(mesh, mass_density),
        })
    }

    /// Creates a closed triangle mesh approximating the shape's surface, or
    /// returns [`None`] for an unbounded shape. Higher resolutions give finer
    /// meshes.
    pub fn tessellate(&self, resolution: u32) -> Option<TriangleMesh> {
        let resolution = resolution.max(3);
        Some(match self {
            Self::Plane => return None,
            Self::Sphere { radius } => TriangleMesh::create_sphere(*radius, resolution),
            Self::Box { half_extents } => TriangleMesh::create_box(half_extents),
            Self::Cylinder { radius, length } => {
                TriangleMesh::create_cylinder(*radius, *length, 2 * resolution)
            }
            Self::Torus {
                major_radius,
                minor_radius,
            } => TriangleMesh::create_torus(
                *major_radius,
                *minor_radius,
                2 * resolution,
                resolution,
            ),
            Self::Mesh(mesh) => TriangleMesh::clone(mesh),
        })
    }

    /// Returns the radius of the smallest origin-centered sphere enclosing
    /// the shape.
    pub fn bounding_radius(&self) -> fph {
        match self {
            Self::Plane => fph::INFINITY,
            Self::Sphere { radius } => *radius,
            Self::Box { half_extents } => half_extents.norm(),
            Self::Cylinder { radius, length } => radius.hypot(0.5 * length),
            Self::Torus {
                major_radius,
                minor_radius,
            } => major_radius + minor_radius,
            Self::Mesh(mesh) => mesh.bounding_radius(),
        }
    }

    /// Returns the point on the shape farthest along the given direction.
    /// For a plane, the direction is ignored and the origin is returned.
    pub fn support_point(&self, direction: &Vector3<fph>) -> Point3<fph> {
        let unit_direction = direction
            .try_normalize(fph::EPSILON)
            .unwrap_or_else(Vector3::z);
        match self {
            Self::Plane => Point3::origin(),
            Self::Sphere { radius } => Point3::from(unit_direction * *radius),
            Self::Box { half_extents } => Point3::from(half_extents.zip_map(direction, |h, d| {
                if d < 0.0 { -h } else { h }
            })),
            Self::Cylinder { radius, length } => {
                let radial = radial_unit_vector(&unit_direction);
                let axial = if direction.z < 0.0 { -0.5 } else { 0.5 } * length;
                Point3::from(radial * *radius + Vector3::z() * axial)
            }
            Self::Torus {
                major_radius,
                minor_radius,
            } => {
                let radial = radial_unit_vector(&unit_direction);
                Point3::from(radial * *major_radius + unit_direction * *minor_radius)
            }
            Self::Mesh(mesh) => mesh.support_point(direction),
        }
    }

    /// Returns half the extent of the shape when projected onto the given
    /// unit direction, measured from the shape's origin.
    pub fn half_extent_along(&self, direction: &UnitVector3<fph>) -> fph {
        match self {
            Self::Plane => fph::INFINITY,
            Self::Sphere { radius } => *radius,
            Self::Box { half_extents } => half_extents.dot(&direction.abs()),
            Self::Cylinder { radius, length } => {
                let axial = direction.z.abs();
                0.5 * length * axial + radius * (1.0 - axial.powi(2)).max(0.0).sqrt()
            }
            Self::Torus {
                major_radius,
                minor_radius,
            } => major_radius * (1.0 - direction.z.powi(2)).max(0.0).sqrt() + minor_radius,
            Self::Mesh(mesh) => {
                let max = mesh.support_point(direction).coords.dot(direction);
                let min = mesh.support_point(&-direction.into_inner()).coords.dot(direction);
                0.5 * (max - min)
            }
        }
    }

    /// Computes the signed distance from the given point (in the shape's
    /// frame) to the shape's surface, negative inside, along with the
    /// outward normal of the closest surface point.
    ///
    /// Distances are exact for the primitive shapes. Meshes use the largest
    /// distance to any face plane, which is exact inside a convex mesh and a
    /// lower bound outside it.
    pub fn surface_distance(&self, point: &Point3<fph>) -> SurfaceDistance {
        let p = point.coords;
        match self {
            Self::Plane => SurfaceDistance {
                distance: p.z,
                normal: Vector3::z_axis(),
            },
            Self::Sphere { radius } => SurfaceDistance {
                distance: p.norm() - radius,
                normal: UnitVector3::try_new(p, fph::EPSILON).unwrap_or_else(Vector3::z_axis),
            },
            Self::Box { half_extents } => box_surface_distance(half_extents, &p),
            Self::Cylinder { radius, length } => {
                cylinder_surface_distance(*radius, 0.5 * length, &p)
            }
            Self::Torus {
                major_radius,
                minor_radius,
            } => {
                let radial = radial_unit_vector(&p);
                let from_ring = vector![
                    p.xy().norm() - major_radius,
                    0.0,
                    p.z
                ];
                let normal_vector = radial * from_ring.x + Vector3::z() * from_ring.z;
                SurfaceDistance {
                    distance: from_ring.norm() - minor_radius,
                    normal: UnitVector3::try_new(normal_vector, fph::EPSILON)
                        .unwrap_or_else(Vector3::z_axis),
                }
            }
            Self::Mesh(mesh) => mesh_surface_distance(mesh, point),
        }
    }

    /// Returns points on the shape's surface that are tested for penetration
    /// into other shapes during collision detection. Spheres and planes are
    /// handled analytically and have none.
    pub fn collision_sample_points(&self) -> Vec<Point3<fph>> {
        const N_RING_SAMPLES: u32 = 12;

        let ring_direction = |idx: u32| {
            let angle = 2.0 * PI * fph::from(idx) / fph::from(N_RING_SAMPLES);
            vector![angle.cos(), angle.sin(), 0.0]
        };

        match self {
            Self::Plane | Self::Sphere { .. } => Vec::new(),
            Self::Box { half_extents } => (0..8)
                .map(|corner: u32| {
                    let sign = |bit: u32| if corner & (1 << bit) == 0 { -1.0 } else { 1.0 };
                    point![
                        sign(0) * half_extents.x,
                        sign(1) * half_extents.y,
                        sign(2) * half_extents.z
                    ]
                })
                .collect(),
            Self::Cylinder { radius, length } => (0..N_RING_SAMPLES)
                .flat_map(|idx| {
                    let rim = ring_direction(idx) * *radius;
                    [-0.5 * length, 0.5 * length]
                        .map(|z| Point3::from(rim + Vector3::z() * z))
                })
                .collect(),
            Self::Torus {
                major_radius,
                minor_radius,
            } => (0..N_RING_SAMPLES)
                .flat_map(|idx| {
                    let radial = ring_direction(idx);
                    let center = radial * *major_radius;
                    [radial, -radial, Vector3::z(), -Vector3::z()]
                        .map(|offset| Point3::from(center + offset * *minor_radius))
                })
                .collect(),
            Self::Mesh(mesh) => mesh.positions().to_vec(),
        }
    }

    /// Returns the area of the shape's silhouette when viewed along each of
    /// the three axes of its frame.
    pub fn projected_areas(&self) -> Vector3<fph> {
        match self {
            Self::Plane => Vector3::repeat(fph::INFINITY),
            Self::Sphere { radius } => Vector3::repeat(PI * radius.powi(2)),
            Self::Box { half_extents } => {
                4.0 * vector![
                    half_extents.y * half_extents.z,
                    half_extents.x * half_extents.z,
                    half_extents.x * half_extents.y
                ]
            }
            Self::Cylinder { radius, length } => {
                let side = 2.0 * radius * length;
                vector![side, side, PI * radius.powi(2)]
            }
            Self::Torus {
                major_radius,
                minor_radius,
            } => {
                let side = 4.0 * minor_radius * (major_radius + minor_radius);
                vector![side, side, 4.0 * PI * major_radius * minor_radius]
            }
            Self::Mesh(mesh) => {
                let mut areas = Vector3::zeros();
                for [v0, v1, v2] in mesh.triangle_vertex_positions() {
                    let area_vector = 0.5 * (v1 - v0).cross(&(v2 - v0));
                    areas += area_vector.abs();
                }
                0.5 * areas
            }
        }
    }
}

/// Returns the unit vector pointing from the z-axis towards the given point
/// within the xy-plane, or the x-axis for points on the z-axis.
fn radial_unit_vector(point: &Vector3<fph>) -> Vector3<fph> {
    vector![point.x, point.y, 0.0]
        .try_normalize(fph::EPSILON)
        .unwrap_or_else(Vector3::x)
}

fn box_surface_distance(half_extents: &Vector3<fph>, p: &Vector3<fph>) -> SurfaceDistance {
    let signs = p.map(|value| if value < 0.0 { -1.0 } else { 1.0 });
    let excess = p.abs() - half_extents;
    let outside = excess.map(|value| value.max(0.0));

    if outside.iter().any(|&value| value > 0.0) {
        let distance = outside.norm();
        SurfaceDistance {
            distance,
            normal: UnitVector3::new_unchecked(outside.component_mul(&signs) / distance),
        }
    } else {
        let axis = excess.imax();
        let mut normal = Vector3::zeros();
        normal[axis] = signs[axis];
        SurfaceDistance {
            distance: excess[axis],
            normal: UnitVector3::new_unchecked(normal),
        }
    }
}

fn cylinder_surface_distance(radius: fph, half_length: fph, p: &Vector3<fph>) -> SurfaceDistance {
    let radial = radial_unit_vector(p);
    let axial = if p.z < 0.0 { -Vector3::z() } else { Vector3::z() };
    let radial_excess = p.xy().norm() - radius;
    let axial_excess = p.z.abs() - half_length;

    if radial_excess > 0.0 && axial_excess > 0.0 {
        let normal_vector = radial * radial_excess + axial * axial_excess;
        let distance = normal_vector.norm();
        SurfaceDistance {
            distance,
            normal: UnitVector3::new_unchecked(normal_vector / distance),
        }
    } else if radial_excess > axial_excess {
        SurfaceDistance {
            distance: radial_excess,
            normal: UnitVector3::new_unchecked(radial),
        }
    } else {
        SurfaceDistance {
            distance: axial_excess,
            normal: UnitVector3::new_unchecked(axial),
        }
    }
}

fn mesh_surface_distance(mesh: &TriangleMesh, point: &Point3<fph>) -> SurfaceDistance {
    let mut closest = SurfaceDistance {
        distance: fph::NEG_INFINITY,
        normal: Vector3::z_axis(),
    };
    for [v0, v1, v2] in mesh.triangle_vertex_positions() {
        let Some(normal) = UnitVector3::try_new((v1 - v0).cross(&(v2 - v0)), fph::EPSILON) else {
            continue;
        };
        let distance = normal.dot(&(point - v0));
        if distance > closest.distance {
            closest = SurfaceDistance { distance, normal };
        }
    }
    closest
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    fn bounded_shapes() -> Vec<Shape> {
        vec![
            Shape::Sphere { radius: 0.5 },
            Shape::Box {
                half_extents: vector![0.5, 1.0, 1.5],
            },
            Shape::Cylinder {
                radius: 0.4,
                length: 2.0,
            },
            Shape::Torus {
                major_radius: 1.0,
                minor_radius: 0.2,
            },
            Shape::Mesh(Arc::new(TriangleMesh::create_box(&vector![0.3, 0.3, 0.3]))),
        ]
    }

    prop_compose! {
        fn direction_strategy()(
            x in -1.0..1.0,
            y in -1.0..1.0,
            z in -1.0..1.0,
        ) -> Vector3<fph> {
            let direction = vector![x, y, z];
            if direction.norm() < 1e-3 { Vector3::x() } else { direction.normalize() }
        }
    }

    #[test]
    fn invalid_dimensions_are_rejected() {
        assert!(Shape::Sphere { radius: 0.0 }.validate().is_err());
        assert!(
            Shape::Torus {
                major_radius: 0.1,
                minor_radius: 0.2
            }
            .validate()
            .is_err()
        );
        assert!(
            Shape::Box {
                half_extents: vector![1.0, fph::NAN, 1.0]
            }
            .validate()
            .is_err()
        );
        assert!(Shape::Plane.validate().is_ok());
    }

    #[test]
    fn plane_is_unbounded() {
        assert!(!Shape::Plane.is_bounded());
        assert!(Shape::Plane.inertial_properties(1000.0).is_none());
        assert!(Shape::Plane.tessellate(8).is_none());
        assert_eq!(Shape::Plane.volume(), fph::INFINITY);
    }

    #[test]
    fn box_surface_distance_is_exact_inside_and_outside() {
        let shape = Shape::Box {
            half_extents: vector![1.0, 2.0, 3.0],
        };
        let inside = shape.surface_distance(&point![0.5, 0.0, 0.0]);
        assert_abs_diff_eq!(inside.distance, -0.5);
        assert_abs_diff_eq!(inside.normal.into_inner(), Vector3::x());

        let outside = shape.surface_distance(&point![4.0, 6.0, 0.0]);
        assert_abs_diff_eq!(outside.distance, 5.0);
        assert_abs_diff_eq!(outside.normal.into_inner(), vector![0.6, 0.8, 0.0]);
    }

    #[test]
    fn cylinder_surface_distance_picks_closest_face() {
        let shape = Shape::Cylinder {
            radius: 1.0,
            length: 4.0,
        };
        let near_side = shape.surface_distance(&point![0.0, 0.9, 0.0]);
        assert_abs_diff_eq!(near_side.distance, -0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(near_side.normal.into_inner(), Vector3::y(), epsilon = 1e-12);

        let near_cap = shape.surface_distance(&point![0.0, 0.0, -1.8]);
        assert_abs_diff_eq!(near_cap.distance, -0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(near_cap.normal.into_inner(), -Vector3::z(), epsilon = 1e-12);
    }

    #[test]
    fn torus_surface_distance_is_measured_from_tube() {
        let shape = Shape::Torus {
            major_radius: 2.0,
            minor_radius: 0.5,
        };
        let above_tube = shape.surface_distance(&point![2.0, 0.0, 1.0]);
        assert_abs_diff_eq!(above_tube.distance, 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(above_tube.normal.into_inner(), Vector3::z(), epsilon = 1e-12);
        assert!(shape.surface_distance(&Point3::origin()).distance > 0.0);
    }

    #[test]
    fn tessellated_volume_is_close_to_analytic_volume() {
        for shape in bounded_shapes() {
            let mesh = shape.tessellate(24).unwrap();
            let mesh_volume = inertia::compute_triangle_mesh_volume(&mesh);
            assert_abs_diff_eq!(mesh_volume, shape.volume(), epsilon = 0.02 * shape.volume());
        }
    }

    #[test]
    fn sample_points_lie_on_surface() {
        for shape in bounded_shapes() {
            for point in shape.collision_sample_points() {
                assert_abs_diff_eq!(shape.surface_distance(&point).distance, 0.0, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn projected_box_areas_match_faces() {
        let shape = Shape::Box {
            half_extents: vector![1.0, 2.0, 3.0],
        };
        assert_abs_diff_eq!(shape.projected_areas(), vector![24.0, 12.0, 8.0]);
        let mesh = TriangleMesh::create_box(&vector![1.0, 2.0, 3.0]);
        let mesh_shape = Shape::Mesh(Arc::new(mesh));
        assert_abs_diff_eq!(
            mesh_shape.projected_areas(),
            vector![24.0, 12.0, 8.0],
            epsilon = 1e-12
        );
    }

    proptest! {
        #[test]
        fn support_point_projection_matches_half_extent(direction in direction_strategy()) {
            let unit_direction = UnitVector3::new_normalize(direction);
            for shape in bounded_shapes() {
                let support = shape.support_point(&direction);
                let extent = shape.half_extent_along(&unit_direction);
                prop_assert!((support.coords.dot(&direction) - extent).abs() < 1e-9);
            }
        }

        #[test]
        fn support_point_is_not_inside_shape(direction in direction_strategy()) {
            for shape in bounded_shapes() {
                let support = shape.support_point(&direction);
                prop_assert!(shape.surface_distance(&support).distance > -1e-9);
            }
        }
    }
}
