//! Viscous damping and added mass loads.

use super::{
    FluidDomain, HydrodynamicCoefficients, SolidKinematics, Wrench, buoyancy::SubmergedPolygon,
};
use crate::{fph, geometry::TriangleMesh, quantities};
use nalgebra::{Matrix6, Vector3, Vector6};

/// Parameters of the per-face damping and added mass model.
#[derive(Clone, Copy, Debug)]
pub(super) struct FaceModel {
    pub layer_thickness: fph,
    pub drag_coefficient: fph,
    pub skin_layer_thickness: fph,
}

/// Computes the damping and added mass loads on the given world space mesh
/// by evaluating the relative fluid flow at the centroid of the submerged
/// part of every face.
///
/// Faces above the free surface contribute nothing. Faces with a degenerate
/// area or non-finite relative motion are skipped.
pub(super) fn compute_face_loads(
    fluid: &FluidDomain,
    world_mesh: &TriangleMesh,
    kinematics: &SolidKinematics,
    model: &FaceModel,
) -> (Wrench, Wrench) {
    let density = fluid.fluid().density;
    let viscosity = fluid.fluid().viscosity;

    let mut damping = Wrench::zero();
    let mut added_mass = Wrench::zero();

    for triangle in world_mesh.triangle_vertex_positions() {
        let polygon = SubmergedPolygon::clip_triangle(fluid, triangle);
        if polygon.is_empty() {
            continue;
        }
        let (area_vector, centroid) = polygon.area_vector_and_centroid();
        let area = area_vector.norm();
        if area <= fph::EPSILON {
            continue;
        }
        let normal = area_vector / area;
        let displacement = centroid - kinematics.center_of_mass;

        let point_velocity = quantities::compute_velocity_of_point_on_body(
            &kinematics.center_of_mass,
            &kinematics.velocity,
            &kinematics.angular_velocity,
            &centroid,
        );
        let relative_velocity = fluid.velocity_at(&centroid) - point_velocity;

        let point_acceleration = kinematics.acceleration
            + kinematics.angular_acceleration.cross(&displacement)
            + kinematics
                .angular_velocity
                .cross(&kinematics.angular_velocity.cross(&displacement));
        let relative_acceleration = fluid.acceleration_at(&centroid) - point_acceleration;

        if quantities::is_finite_vector(&relative_velocity) {
            let normal_speed = relative_velocity.dot(&normal);
            let tangential_velocity = relative_velocity - normal * normal_speed;

            let mut force = Vector3::zeros();
            if model.skin_layer_thickness > 0.0 {
                force += (viscosity * area / model.skin_layer_thickness) * tangential_velocity;
            }
            // Pressure drag only acts on faces the flow is pushing against
            if normal_speed < 0.0 {
                force += (0.5 * model.drag_coefficient * density * area)
                    * normal_speed
                    * normal_speed.abs()
                    * normal;
            }
            damping.add_force_at(&force, &displacement);
        }

        if quantities::is_finite_vector(&relative_acceleration) {
            let normal_acceleration = relative_acceleration.dot(&normal);
            if normal_acceleration < 0.0 {
                let force = (density * area * model.layer_thickness * normal_acceleration) * normal;
                added_mass.add_force_at(&force, &displacement);
            }
        }
    }

    (damping, added_mass)
}

/// Computes the damping and added mass loads from the body frame coefficient
/// matrices, scaled by the fraction of the body that is submerged.
pub(super) fn compute_coefficient_loads(
    fluid: &FluidDomain,
    coefficients: &HydrodynamicCoefficients,
    kinematics: &SolidKinematics,
    submerged_fraction: fph,
) -> (Wrench, Wrench) {
    if submerged_fraction <= 0.0 {
        return (Wrench::zero(), Wrench::zero());
    }
    let rotation = kinematics.pose.rotation;

    let relative_velocity =
        kinematics.velocity - fluid.velocity_at(&kinematics.center_of_mass);
    let relative_acceleration =
        kinematics.acceleration - fluid.acceleration_at(&kinematics.center_of_mass);

    let to_body = |vector: &Vector3<fph>| rotation.inverse_transform_vector(vector);
    let generalized = |linear: &Vector3<fph>, angular: &Vector3<fph>| {
        let (linear, angular) = (to_body(linear), to_body(angular));
        Vector6::new(linear.x, linear.y, linear.z, angular.x, angular.y, angular.z)
    };

    let velocity = generalized(&relative_velocity, &kinematics.angular_velocity);
    let acceleration = generalized(&relative_acceleration, &kinematics.angular_acceleration);

    let to_world = |load: Vector6<fph>| {
        let load = load * submerged_fraction;
        let force = rotation.transform_vector(&load.fixed_rows::<3>(0).into_owned());
        let torque = rotation.transform_vector(&load.fixed_rows::<3>(3).into_owned());
        if quantities::is_finite_vector(&force) && quantities::is_finite_vector(&torque) {
            Wrench { force, torque }
        } else {
            Wrench::zero()
        }
    };

    let density = fluid.fluid().density;
    let viscosity = fluid.fluid().viscosity;

    let quadratic_velocity = velocity.map(|value| value * value.abs());
    let damping_load = -(viscosity * coefficients.skin_friction * velocity
        + density * coefficients.pressure_drag * quadratic_velocity);
    let added_mass_load = -(density * coefficients.added_mass * acceleration);

    (to_world(damping_load), to_world(added_mass_load))
}

/// Returns the largest diagonal translational entry of the added mass
/// matrix, which bounds the apparent mass of the body along any axis.
pub(super) fn max_translational_added_mass(added_mass: &Matrix6<fph>) -> fph {
    (0..3)
        .map(|axis| added_mass[(axis, axis)])
        .fold(0.0, fph::max)
}
