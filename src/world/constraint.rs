//! Constraints on rigid bodies.

pub mod contact;
pub mod joint;
pub mod solver;

use crate::{
    fph,
    quantities::{self, Orientation, Position, Velocity},
    world::RigidBody,
};
use nalgebra::{Matrix3, Vector3};
use num_traits::Zero;
use std::{
    fmt,
    ops::{Add, Mul, Sub},
};

/// Represents a constraint involving two rigid bodies.
trait TwoBodyConstraint {
    type Prepared: PreparedTwoBodyConstraint;

    /// Creates an instantiation of the constraint that has been prepared for
    /// constraint solving in the current step.
    fn prepare(&self, body_a: &ConstrainedBody, body_b: &ConstrainedBody) -> Self::Prepared;
}

/// Represents a [`TwoBodyConstraint`] that has been prepared for constraint
/// solving in the current step.
trait PreparedTwoBodyConstraint {
    type Impulses: fmt::Debug
        + Copy
        + Zero
        + Add<Output = Self::Impulses>
        + Sub<Output = Self::Impulses>
        + Mul<fph, Output = Self::Impulses>;

    /// Whether the accumulated [`Self::Impulses`] from the other constraint,
    /// which involves the same bodies, can be used as the initial guess for
    /// this constraint.
    fn can_use_warm_impulses_from(&self, other: &Self) -> bool;

    /// Computes the corrective impulses that would make the current body
    /// velocities satisfy the velocity constraint. No clamping is performed.
    fn compute_impulses(&self, body_a: &ConstrainedBody, body_b: &ConstrainedBody)
    -> Self::Impulses;

    /// Clamps the given accumulated impulses to satisfy the inequality
    /// velocity constraints.
    fn clamp_impulses(&self, impulses: Self::Impulses) -> Self::Impulses;

    /// Applies the given impulses to the velocities of the two bodies.
    fn apply_impulses_to_body_pair(
        &self,
        body_a: &mut ConstrainedBody,
        body_b: &mut ConstrainedBody,
        impulses: Self::Impulses,
    );

    /// Computes and applies pseudo impulses to the positions and
    /// orientations of the bodies to reduce the violation of the position
    /// constraint.
    fn apply_positional_correction_to_body_pair(
        &self,
        body_a: &mut ConstrainedBody,
        body_b: &mut ConstrainedBody,
        correction_factor: fph,
    );

    /// Returns the squared magnitude of the given impulses, used for
    /// measuring convergence.
    fn squared_impulse_magnitude(impulses: &Self::Impulses) -> fph;
}

/// The properties and state of a rigid body required for constraint
/// solving. The state is updated iteratively as constraints are solved.
#[derive(Clone, Debug)]
struct ConstrainedBody {
    inverse_mass: fph,
    /// Inverse of the body's inertia tensor in world space.
    inverse_inertia_tensor: Matrix3<fph>,
    /// World space position of the center of mass.
    position: Position,
    orientation: Orientation,
    velocity: Velocity,
    angular_velocity: Vector3<fph>,
}

impl ConstrainedBody {
    fn from_rigid_body(body: &RigidBody) -> Self {
        Self {
            inverse_mass: body.inverse_mass(),
            inverse_inertia_tensor: body.compute_inverse_world_inertia_matrix(),
            position: *body.position(),
            orientation: *body.orientation(),
            velocity: body.compute_velocity(),
            angular_velocity: body.compute_angular_velocity(),
        }
    }

    /// A body with infinite mass resting at the given configuration. Used for
    /// the world when a joint attaches only one body.
    fn immovable(position: Position, orientation: Orientation) -> Self {
        Self {
            inverse_mass: 0.0,
            inverse_inertia_tensor: Matrix3::zeros(),
            position,
            orientation,
            velocity: Velocity::zeros(),
            angular_velocity: Vector3::zeros(),
        }
    }

    /// Transforms the given point to world space from the frame that moves
    /// and rotates with the body, with origin at the center of mass.
    fn transform_point_from_body_to_world_frame(&self, point: &Position) -> Position {
        self.orientation.transform_point(point) + self.position.coords
    }

    /// Transforms the given point from world space to the frame that moves
    /// and rotates with the body, with origin at the center of mass.
    fn transform_point_from_world_to_body_frame(&self, point: &Position) -> Position {
        self.orientation
            .inverse_transform_point(&(point - self.position.coords))
    }

    fn apply_impulse(&mut self, impulse: &Vector3<fph>, angular_impulse: &Vector3<fph>) {
        self.velocity += self.inverse_mass * impulse;
        self.angular_velocity += self.inverse_inertia_tensor * angular_impulse;
    }

    /// Moves and rotates the body by the velocity change the given pseudo
    /// impulse would cause over a unit time.
    fn apply_pseudo_impulse_and_angular_impulse(
        &mut self,
        pseudo_impulse: &Vector3<fph>,
        pseudo_angular_impulse: &Vector3<fph>,
    ) {
        self.position += self.inverse_mass * pseudo_impulse;
        self.orientation = quantities::pseudo_advanced_orientation(
            &self.orientation,
            &(self.inverse_inertia_tensor * pseudo_angular_impulse),
        );
    }

    /// Applies the given pseudo impulse acting at the given displacement
    /// from the center of mass.
    fn apply_pseudo_impulse(&mut self, pseudo_impulse: &Vector3<fph>, disp: &Vector3<fph>) {
        self.apply_pseudo_impulse_and_angular_impulse(pseudo_impulse, &disp.cross(pseudo_impulse));
    }
}
