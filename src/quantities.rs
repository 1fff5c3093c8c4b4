//! Type aliases and helpers for physical quantities.

use crate::fph;
use nalgebra::{Isometry3, Point3, Quaternion, Translation3, UnitQuaternion, Vector3};

/// A position in 3D space.
pub type Position = Point3<fph>;

/// A direction or displacement in 3D space.
pub type Direction = Vector3<fph>;

/// A linear velocity in 3D space.
pub type Velocity = Vector3<fph>;

/// An angular velocity vector, whose direction is the axis of rotation and
/// whose length is the angular speed.
pub type AngularVelocity = Vector3<fph>;

/// A linear acceleration in 3D space.
pub type Acceleration = Vector3<fph>;

/// An angular acceleration in 3D space.
pub type AngularAcceleration = Vector3<fph>;

/// An orientation in 3D space.
pub type Orientation = UnitQuaternion<fph>;

/// Linear momentum.
pub type Momentum = Vector3<fph>;

/// Angular momentum about the center of mass.
pub type AngularMomentum = Vector3<fph>;

/// A force in 3D space.
pub type Force = Vector3<fph>;

/// A torque in 3D space.
pub type Torque = Vector3<fph>;

/// A rigid transform (rotation followed by translation).
pub type Pose = Isometry3<fph>;

/// Creates a [`Pose`] from the given position and orientation.
#[inline]
pub fn pose_from_parts(position: &Position, orientation: &Orientation) -> Pose {
    Pose::from_parts(Translation3::from(position.coords), *orientation)
}

/// Computes the quaternion representing the instantaneous time derivative of
/// the given orientation for a body with the given angular velocity.
#[inline]
pub fn compute_orientation_derivative(
    orientation: &Orientation,
    angular_velocity: &AngularVelocity,
) -> Quaternion<fph> {
    Quaternion::from_imag(0.5 * angular_velocity) * orientation.as_ref()
}

/// Evolves the given [`Orientation`] with the given angular velocity for the
/// given duration.
pub fn advance_orientation(
    orientation: &Orientation,
    angular_velocity: &AngularVelocity,
    duration: fph,
) -> Orientation {
    let angular_speed = angular_velocity.norm();
    if angular_speed < fph::EPSILON || !angular_speed.is_finite() {
        return *orientation;
    }
    let axis = angular_velocity / angular_speed;
    let (sin_half_angle, cos_half_angle) = (0.5 * angular_speed * duration).sin_cos();

    let rotation = Quaternion::from_parts(cos_half_angle, axis.scale(sin_half_angle));

    UnitQuaternion::new_normalize(rotation * orientation.as_ref())
}

/// Applies a small pseudo rotation to the given orientation, as used for
/// positional correction where the rotation is already scaled by the step.
pub fn pseudo_advanced_orientation(
    orientation: &Orientation,
    pseudo_angular_velocity: &AngularVelocity,
) -> Orientation {
    UnitQuaternion::new_normalize(
        orientation.as_ref()
            + compute_orientation_derivative(orientation, pseudo_angular_velocity),
    )
}

/// Computes the velocity of the given world space point on a body with the
/// given center of mass and velocities.
#[inline]
pub fn compute_velocity_of_point_on_body(
    center_of_mass: &Position,
    velocity: &Velocity,
    angular_velocity: &AngularVelocity,
    point: &Position,
) -> Velocity {
    velocity + angular_velocity.cross(&(point - center_of_mass))
}

/// Returns the rotation angle (in radians) between two orientations.
pub fn orientation_difference_angle(a: &Orientation, b: &Orientation) -> fph {
    a.angle_to(b)
}

/// Whether all components of the vector are finite.
#[inline]
pub fn is_finite_vector(vector: &Vector3<fph>) -> bool {
    vector.iter().all(|value| value.is_finite())
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::{point, vector};
    use proptest::prelude::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    prop_compose! {
        fn orientation_strategy()(
            roll in 0.0..2.0 * PI,
            pitch in -FRAC_PI_2..FRAC_PI_2,
            yaw in 0.0..2.0 * PI,
        ) -> Orientation {
            Orientation::from_euler_angles(roll, pitch, yaw)
        }
    }

    #[test]
    fn advancing_orientation_with_zero_angular_velocity_does_nothing() {
        let orientation = Orientation::from_euler_angles(0.1, 0.2, 0.3);
        let advanced = advance_orientation(&orientation, &AngularVelocity::zeros(), 1.0);
        assert_abs_diff_eq!(advanced, orientation);
    }

    #[test]
    fn advancing_orientation_rotates_by_expected_angle() {
        let advanced = advance_orientation(
            &Orientation::identity(),
            &vector![0.0, 0.0, FRAC_PI_2],
            1.0,
        );
        let rotated = advanced.transform_vector(&Vector3::x());
        assert_abs_diff_eq!(rotated, Vector3::y(), epsilon = 1e-12);
    }

    #[test]
    fn point_velocity_includes_rotation() {
        let velocity = compute_velocity_of_point_on_body(
            &Position::origin(),
            &vector![1.0, 0.0, 0.0],
            &vector![0.0, 0.0, 1.0],
            &point![1.0, 0.0, 0.0],
        );
        assert_abs_diff_eq!(velocity, vector![1.0, 1.0, 0.0]);
    }

    proptest! {
        #[test]
        fn advanced_orientation_stays_normalized(
            orientation in orientation_strategy(),
            wx in -10.0..10.0,
            wy in -10.0..10.0,
            wz in -10.0..10.0,
        ) {
            let advanced = advance_orientation(&orientation, &vector![wx, wy, wz], 0.01);
            prop_assert!((advanced.as_ref().norm() - 1.0).abs() < 1e-12);
        }
    }
}
