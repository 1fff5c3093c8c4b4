//! Computation and representation of inertia-related properties.

use crate::{fph, geometry::TriangleMesh, quantities::Position};
use approx::AbsDiffEq;
use bytemuck::{Pod, Zeroable};
use nalgebra::{Matrix3, Point3, UnitQuaternion, Vector3, vector};
use std::f64::consts::PI;

const ONE_THIRD: fph = 1.0 / 3.0;

/// The inertia-related properties of a physical body.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Zeroable, Pod)]
pub struct InertialProperties {
    inertia_tensor: InertiaTensor,
    center_of_mass: Position,
    mass: fph,
}

/// The inertia tensor of a physical body, stored together with its inverse.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Zeroable, Pod)]
pub struct InertiaTensor {
    matrix: Matrix3<fph>,
    inverse_matrix: Matrix3<fph>,
}

impl InertialProperties {
    /// Creates a new set of inertial properties.
    ///
    /// # Panics
    /// If the given mass does not exceed zero.
    pub fn new(mass: fph, center_of_mass: Position, inertia_tensor: InertiaTensor) -> Self {
        assert!(
            mass > 0.0,
            "Tried creating body with mass not exceeding zero"
        );
        Self {
            inertia_tensor,
            center_of_mass,
            mass,
        }
    }

    /// Computes the inertial properties of the uniformly dense body
    /// represented by the given closed triangle mesh.
    pub fn of_uniform_triangle_mesh(mesh: &TriangleMesh, mass_density: fph) -> Self {
        let (mass, center_of_mass, inertia_tensor) =
            compute_uniform_triangle_mesh_inertial_properties(mesh, mass_density);
        Self::new(mass, center_of_mass, inertia_tensor)
    }

    /// Computes the inertial properties of the uniformly dense box with the
    /// given half extents, centered at the origin and aligned with the axes.
    pub fn of_uniform_box(half_extents: &Vector3<fph>, mass_density: fph) -> Self {
        let volume = compute_box_volume(half_extents);
        let mass = volume * mass_density;

        let [hx, hy, hz] = [half_extents.x, half_extents.y, half_extents.z];
        let inertia_tensor = InertiaTensor::from_diagonal_elements(
            ONE_THIRD * mass * (hy.powi(2) + hz.powi(2)),
            ONE_THIRD * mass * (hx.powi(2) + hz.powi(2)),
            ONE_THIRD * mass * (hx.powi(2) + hy.powi(2)),
        );

        Self::new(mass, Position::origin(), inertia_tensor)
    }

    /// Computes the inertial properties of the uniformly dense sphere with the
    /// given radius, centered at the origin.
    pub fn of_uniform_sphere(radius: fph, mass_density: fph) -> Self {
        let mass = compute_sphere_volume(radius) * mass_density;
        let moment_of_inertia = 0.4 * mass * radius.powi(2);
        let inertia_tensor = InertiaTensor::from_diagonal_elements(
            moment_of_inertia,
            moment_of_inertia,
            moment_of_inertia,
        );
        Self::new(mass, Position::origin(), inertia_tensor)
    }

    /// Computes the inertial properties of the uniformly dense cylinder with
    /// the given radius and length, centered at the origin with its axis
    /// along z.
    pub fn of_uniform_cylinder(radius: fph, length: fph, mass_density: fph) -> Self {
        let mass = compute_cylinder_volume(radius, length) * mass_density;

        let moment_of_inertia_z = 0.5 * mass * radius.powi(2);
        let moment_of_inertia_xy =
            (0.25 * ONE_THIRD) * mass * (3.0 * radius.powi(2) + length.powi(2));
        let inertia_tensor = InertiaTensor::from_diagonal_elements(
            moment_of_inertia_xy,
            moment_of_inertia_xy,
            moment_of_inertia_z,
        );

        Self::new(mass, Position::origin(), inertia_tensor)
    }

    /// Computes the inertial properties of the uniformly dense torus with the
    /// given major and minor radius, centered at the origin with its axis of
    /// symmetry along z.
    pub fn of_uniform_torus(major_radius: fph, minor_radius: fph, mass_density: fph) -> Self {
        let mass = compute_torus_volume(major_radius, minor_radius) * mass_density;

        let (big, small) = (major_radius.powi(2), minor_radius.powi(2));
        let moment_of_inertia_z = mass * (big + 0.75 * small);
        let moment_of_inertia_xy = mass * (0.5 * big + 0.625 * small);
        let inertia_tensor = InertiaTensor::from_diagonal_elements(
            moment_of_inertia_xy,
            moment_of_inertia_xy,
            moment_of_inertia_z,
        );

        Self::new(mass, Position::origin(), inertia_tensor)
    }

    pub fn mass(&self) -> fph {
        self.mass
    }

    pub fn center_of_mass(&self) -> &Position {
        &self.center_of_mass
    }

    /// Returns the inertia tensor, defined relative to the center of mass.
    pub fn inertia_tensor(&self) -> &InertiaTensor {
        &self.inertia_tensor
    }
}

impl AbsDiffEq for InertialProperties {
    type Epsilon = <fph as AbsDiffEq>::Epsilon;

    fn default_epsilon() -> Self::Epsilon {
        fph::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        fph::abs_diff_eq(&self.mass, &other.mass, epsilon)
            && Point3::abs_diff_eq(&self.center_of_mass, &other.center_of_mass, epsilon)
            && InertiaTensor::abs_diff_eq(&self.inertia_tensor, &other.inertia_tensor, epsilon)
    }
}

impl InertiaTensor {
    /// Creates a new inertia tensor corresponding to the given matrix, or
    /// returns [`None`] if the matrix is singular.
    pub fn try_from_matrix(matrix: Matrix3<fph>) -> Option<Self> {
        let inverse_matrix = matrix.try_inverse()?;
        Some(Self {
            matrix,
            inverse_matrix,
        })
    }

    /// Creates a new inertia tensor corresponding to the given matrix.
    ///
    /// # Panics
    /// If the matrix is not invertible.
    pub fn from_matrix(matrix: Matrix3<fph>) -> Self {
        Self::try_from_matrix(matrix).expect("Could not invert inertia tensor")
    }

    /// Creates a new diagonal inertia tensor with the given diagonal elements.
    ///
    /// # Panics
    /// If any of the given elements does not exceed zero.
    pub fn from_diagonal_elements(j_xx: fph, j_yy: fph, j_zz: fph) -> Self {
        assert!(
            j_xx > 0.0 && j_yy > 0.0 && j_zz > 0.0,
            "Tried creating inertia tensor with diagonal element not exceeding zero"
        );
        Self {
            matrix: Matrix3::from_diagonal(&vector![j_xx, j_yy, j_zz]),
            inverse_matrix: Matrix3::from_diagonal(&vector![1.0 / j_xx, 1.0 / j_yy, 1.0 / j_zz]),
        }
    }

    pub fn identity() -> Self {
        Self {
            matrix: Matrix3::identity(),
            inverse_matrix: Matrix3::identity(),
        }
    }

    pub fn matrix(&self) -> &Matrix3<fph> {
        &self.matrix
    }

    pub fn inverse_matrix(&self) -> &Matrix3<fph> {
        &self.inverse_matrix
    }

    /// Computes the inertia matrix of the body after the given rotation.
    pub fn rotated_matrix(&self, rotation: &UnitQuaternion<fph>) -> Matrix3<fph> {
        let rotation_matrix = rotation.to_rotation_matrix();
        rotation_matrix * self.matrix * rotation_matrix.transpose()
    }

    /// Computes the inverse inertia matrix of the body after the given
    /// rotation.
    pub fn inverse_rotated_matrix(&self, rotation: &UnitQuaternion<fph>) -> Matrix3<fph> {
        let rotation_matrix = rotation.to_rotation_matrix();
        rotation_matrix * self.inverse_matrix * rotation_matrix.transpose()
    }

    /// Computes the change in the inertia matrix when the reference point is
    /// moved by the given displacement away from the center of mass of a body
    /// with the given mass (parallel axis theorem).
    pub fn compute_parallel_axis_inertia_matrix_difference(
        mass: fph,
        displacement: &Vector3<fph>,
    ) -> Matrix3<fph> {
        mass * (Matrix3::identity() * displacement.norm_squared()
            - displacement * displacement.transpose())
    }
}

impl AbsDiffEq for InertiaTensor {
    type Epsilon = <fph as AbsDiffEq>::Epsilon;

    fn default_epsilon() -> Self::Epsilon {
        fph::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        Matrix3::abs_diff_eq(&self.matrix, &other.matrix, epsilon)
    }
}

pub fn compute_box_volume(half_extents: &Vector3<fph>) -> fph {
    8.0 * half_extents.x * half_extents.y * half_extents.z
}

pub fn compute_sphere_volume(radius: fph) -> fph {
    (4.0 * ONE_THIRD) * PI * radius.powi(3)
}

pub fn compute_cylinder_volume(radius: fph, length: fph) -> fph {
    PI * radius.powi(2) * length
}

pub fn compute_torus_volume(major_radius: fph, minor_radius: fph) -> fph {
    2.0 * PI.powi(2) * major_radius * minor_radius.powi(2)
}

/// Computes the volume enclosed by the given closed triangle mesh using the
/// divergence theorem (Eberly, 2004).
pub fn compute_triangle_mesh_volume(mesh: &TriangleMesh) -> fph {
    let mut volume = 0.0;
    for [vertex_0, vertex_1, vertex_2] in mesh.triangle_vertex_positions() {
        let edge_cross_prod = (vertex_1 - vertex_0).cross(&(vertex_2 - vertex_0));
        volume += edge_cross_prod.x * (vertex_0.x + vertex_1.x + vertex_2.x);
    }
    volume * (0.5 * ONE_THIRD)
}

/// Computes the mass, center of mass and inertia tensor (about the center of
/// mass) of a uniformly dense body represented by the given closed triangle
/// mesh, following Eberly (2004).
pub fn compute_uniform_triangle_mesh_inertial_properties(
    mesh: &TriangleMesh,
    mass_density: fph,
) -> (fph, Position, InertiaTensor) {
    let mut mass = 0.0;
    let mut first_moments = Vector3::zeros();
    let mut diagonal_second_moments = Vector3::zeros();
    let mut mixed_second_moments = Vector3::zeros();

    for [vertex_0, vertex_1, vertex_2] in mesh.triangle_vertex_positions() {
        let (zeroth, first, diagonal_second, mixed_second) =
            compute_moment_contributions_for_triangle(vertex_0, vertex_1, vertex_2);
        mass += zeroth;
        first_moments += first;
        diagonal_second_moments += diagonal_second;
        mixed_second_moments += mixed_second;
    }

    mass *= (0.5 * ONE_THIRD) * mass_density;
    first_moments *= (0.5 * 0.25 * ONE_THIRD) * mass_density;
    diagonal_second_moments *= (ONE_THIRD * 0.25 * 0.2) * mass_density;
    mixed_second_moments *= (0.5 * ONE_THIRD * 0.25 * 0.2) * mass_density;

    let center_of_mass = Point3::from(first_moments / mass);

    let j_xx = diagonal_second_moments.y + diagonal_second_moments.z;
    let j_yy = diagonal_second_moments.z + diagonal_second_moments.x;
    let j_zz = diagonal_second_moments.x + diagonal_second_moments.y;

    let j_xy = -mixed_second_moments.x;
    let j_yz = -mixed_second_moments.y;
    let j_zx = -mixed_second_moments.z;

    let origin_matrix = Matrix3::from_columns(&[
        vector![j_xx, j_xy, j_zx],
        vector![j_xy, j_yy, j_yz],
        vector![j_zx, j_yz, j_zz],
    ]);

    // Move the reference point from the origin to the center of mass
    let inertia_tensor = InertiaTensor::from_matrix(
        origin_matrix
            - InertiaTensor::compute_parallel_axis_inertia_matrix_difference(
                mass,
                &center_of_mass.coords,
            ),
    );

    (mass, center_of_mass, inertia_tensor)
}

fn compute_moment_contributions_for_triangle(
    vertex_0: &Point3<fph>,
    vertex_1: &Point3<fph>,
    vertex_2: &Point3<fph>,
) -> (fph, Vector3<fph>, Vector3<fph>, Vector3<fph>) {
    let w_0 = vertex_0.coords;
    let w_1 = vertex_1.coords;
    let w_2 = vertex_2.coords;

    let tmp_0 = w_0 + w_1;
    let tmp_1 = w_0.component_mul(&w_0);
    let tmp_2 = tmp_1 + w_1.component_mul(&tmp_0);

    let f_1 = tmp_0 + w_2;
    let f_2 = tmp_2 + w_2.component_mul(&f_1);
    let f_3 = w_0.component_mul(&tmp_1) + w_1.component_mul(&tmp_2) + w_2.component_mul(&f_2);

    let g_0 = f_2 + w_0.component_mul(&(f_1 + w_0));
    let g_1 = f_2 + w_1.component_mul(&(f_1 + w_1));
    let g_2 = f_2 + w_2.component_mul(&(f_1 + w_2));

    let edge_cross_prod = (vertex_1 - vertex_0).cross(&(vertex_2 - vertex_0));

    let mixed_second_moments = vector![
        edge_cross_prod.x * (w_0.y * g_0.x + w_1.y * g_1.x + w_2.y * g_2.x),
        edge_cross_prod.y * (w_0.z * g_0.y + w_1.z * g_1.y + w_2.z * g_2.y),
        edge_cross_prod.z * (w_0.x * g_0.z + w_1.x * g_1.z + w_2.x * g_2.z)
    ];

    (
        edge_cross_prod.x * f_1.x,
        edge_cross_prod.component_mul(&f_2),
        edge_cross_prod.component_mul(&f_3),
        mixed_second_moments,
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::{abs_diff_eq, assert_abs_diff_eq};
    use proptest::prelude::*;

    #[test]
    #[should_panic]
    fn creating_properties_with_zero_mass_fails() {
        InertialProperties::new(0.0, Position::origin(), InertiaTensor::identity());
    }

    #[test]
    fn sphere_inertia_is_isotropic() {
        let properties = InertialProperties::of_uniform_sphere(0.5, 1000.0);
        let matrix = properties.inertia_tensor().matrix();
        assert_abs_diff_eq!(matrix.m11, matrix.m22);
        assert_abs_diff_eq!(matrix.m22, matrix.m33);
        assert_abs_diff_eq!(
            properties.mass(),
            compute_sphere_volume(0.5) * 1000.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn rotated_inverse_is_inverse_of_rotated_matrix() {
        let tensor = *InertialProperties::of_uniform_box(&vector![1.0, 2.0, 3.0], 1.0)
            .inertia_tensor();
        let rotation = UnitQuaternion::from_euler_angles(0.3, -0.7, 1.1);
        let product = tensor.rotated_matrix(&rotation) * tensor.inverse_rotated_matrix(&rotation);
        assert_abs_diff_eq!(product, Matrix3::identity(), epsilon = 1e-12);
    }

    #[test]
    fn torus_volume_matches_pappus_theorem() {
        let volume = compute_torus_volume(2.0, 0.5);
        let pappus = (PI * 0.25) * (2.0 * PI * 2.0);
        assert_abs_diff_eq!(volume, pappus, epsilon = 1e-12);
    }

    proptest! {
        #[test]
        fn box_mesh_inertial_properties_match_analytic_box(
            hx in 0.05..3.0,
            hy in 0.05..3.0,
            hz in 0.05..3.0,
            density in 1.0..1e4,
        ) {
            let half_extents = vector![hx, hy, hz];
            let mesh = TriangleMesh::create_box(&half_extents);
            let from_mesh = InertialProperties::of_uniform_triangle_mesh(&mesh, density);
            let analytic = InertialProperties::of_uniform_box(&half_extents, density);
            prop_assert!(abs_diff_eq!(
                from_mesh,
                analytic,
                epsilon = 1e-9 * analytic.mass().max(1.0) * 10.0
            ));
        }
    }

    proptest! {
        #[test]
        fn mesh_volume_of_box_is_exact(hx in 0.01..5.0, hy in 0.01..5.0, hz in 0.01..5.0) {
            let half_extents = vector![hx, hy, hz];
            let mesh = TriangleMesh::create_box(&half_extents);
            prop_assert!(abs_diff_eq!(
                compute_triangle_mesh_volume(&mesh),
                compute_box_volume(&half_extents),
                epsilon = 1e-9
            ));
        }
    }
}
