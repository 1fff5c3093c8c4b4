//! Hydrodynamic coefficient matrices of a solid.

use crate::{fph, geometry::TriangleMesh, quantities::Position};
use nalgebra::{Matrix3, Matrix6, SMatrix, Vector3, Vector6};

/// Body frame coefficient matrices relating the generalized velocity
/// `[v; ω]` and acceleration of a solid relative to the fluid to the
/// generalized hydrodynamic load `[F; T]` about its center of mass.
///
/// The matrices are normalized by the fluid property they scale with, so the
/// same coefficients can be used in any fluid.
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
#[derive(Clone, Debug, PartialEq)]
pub struct HydrodynamicCoefficients {
    /// Added mass per unit fluid density.
    pub added_mass: Matrix6<fph>,
    /// Quadratic pressure drag per unit fluid density. Row `j`, column `k`
    /// gives the load along `j` from the quadratic velocity term along `k`.
    pub pressure_drag: Matrix6<fph>,
    /// Linear skin friction per unit fluid viscosity.
    pub skin_friction: Matrix6<fph>,
}

impl HydrodynamicCoefficients {
    /// Computes the coefficients of the closed body frame mesh by summing the
    /// contribution of every face, assuming each face only interacts with
    /// fluid moving against it.
    ///
    /// `layer_thickness` is the thickness of the fluid layer dragged along
    /// with each face when accelerating, `drag_coefficient` scales the
    /// pressure drag on faces facing the flow and `skin_layer_thickness` is
    /// the boundary layer thickness governing viscous friction.
    pub fn from_mesh(
        mesh: &TriangleMesh,
        center_of_mass: &Position,
        layer_thickness: fph,
        drag_coefficient: fph,
        skin_layer_thickness: fph,
    ) -> Self {
        let mut added_mass = Matrix6::zeros();
        let mut pressure_drag = Matrix6::zeros();
        let mut skin_friction = Matrix6::zeros();

        for [v0, v1, v2] in mesh.triangle_vertex_positions() {
            let area_vector = 0.5 * (v1 - v0).cross(&(v2 - v0));
            let area = area_vector.norm();
            if area <= fph::EPSILON {
                continue;
            }
            let normal = area_vector / area;
            let centroid = Position::from((v0.coords + v1.coords + v2.coords) / 3.0);
            let displacement = centroid - center_of_mass;

            let direction = generalized_direction(&normal, &displacement);
            let velocity_map = point_velocity_map(&displacement);
            let tangential_projector = Matrix3::identity() - normal * normal.transpose();

            // Only the half of the faces facing the motion contributes, which
            // for a closed surface is half of the full sum
            added_mass += (0.5 * layer_thickness * area) * direction * direction.transpose();

            for k in 0..6 {
                let weight = 0.25 * drag_coefficient * area * direction[k] * direction[k].abs();
                for j in 0..6 {
                    pressure_drag[(j, k)] += weight * direction[j];
                }
            }

            if skin_layer_thickness > 0.0 {
                skin_friction += (area / skin_layer_thickness)
                    * velocity_map.transpose()
                    * tangential_projector
                    * velocity_map;
            }
        }

        Self {
            added_mass,
            pressure_drag,
            skin_friction,
        }
    }

    /// Returns a copy where all coupling between different generalized
    /// directions has been removed, as for a body symmetric about all three
    /// of its principal planes.
    pub fn trifold_symmetric(&self) -> Self {
        let diagonal = |matrix: &Matrix6<fph>| Matrix6::from_diagonal(&matrix.diagonal());
        Self {
            added_mass: diagonal(&self.added_mass),
            pressure_drag: diagonal(&self.pressure_drag),
            skin_friction: diagonal(&self.skin_friction),
        }
    }

    /// Whether all coefficients are finite.
    pub fn is_finite(&self) -> bool {
        [&self.added_mass, &self.pressure_drag, &self.skin_friction]
            .iter()
            .all(|matrix| matrix.iter().all(|value| value.is_finite()))
    }
}

impl Default for HydrodynamicCoefficients {
    fn default() -> Self {
        Self {
            added_mass: Matrix6::zeros(),
            pressure_drag: Matrix6::zeros(),
            skin_friction: Matrix6::zeros(),
        }
    }
}

/// Returns `[n; r × n]`, the generalized direction of a force along `n`
/// acting at displacement `r` from the center of mass.
fn generalized_direction(
    normal: &Vector3<fph>,
    displacement: &Vector3<fph>,
) -> Vector6<fph> {
    let moment = displacement.cross(normal);
    Vector6::new(normal.x, normal.y, normal.z, moment.x, moment.y, moment.z)
}

/// Returns the matrix mapping the generalized velocity `[v; ω]` of a body to
/// the velocity of the point at displacement `r`, which is `v - r × ω`.
fn point_velocity_map(displacement: &Vector3<fph>) -> SMatrix<fph, 3, 6> {
    let mut map = SMatrix::<fph, 3, 6>::zeros();
    map.fixed_view_mut::<3, 3>(0, 0).copy_from(&Matrix3::identity());
    map.fixed_view_mut::<3, 3>(0, 3).copy_from(&(-displacement.cross_matrix()));
    map
}
