//! Rigid bodies.

use crate::{
    fph,
    geometry::Shape,
    inertia::{InertiaTensor, InertialProperties},
    quantities::{
        self, AngularMomentum, AngularVelocity, Force, Momentum, Orientation, Pose, Position,
        Torque, Velocity,
    },
};
use approx::AbsDiffEq;
use hydrosim_utils::ArenaKey;
use nalgebra::{Matrix3, Point3, Translation3, Vector3};

/// Identifier for a [`RigidBody`] in a [`BodySet`](super::BodySet).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RigidBodyID(pub(super) ArenaKey);

/// Whether a rigid body responds to forces and impulses.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RigidBodyKind {
    /// The body never moves and behaves as if it had infinite mass.
    Static,
    /// The body is advanced from the forces and impulses acting on it.
    Dynamic,
}

/// A rigid body with a collision shape.
///
/// The position of the body is the world space position of its center of
/// mass, and its orientation is that of the shape's frame. Linear and angular
/// momentum are the primary state variables, velocities are derived from
/// them.
#[derive(Clone, Debug, PartialEq)]
pub struct RigidBody {
    kind: RigidBodyKind,
    shape: Shape,
    /// The center of mass expressed in the shape's frame.
    local_center_of_mass: Position,
    mass: fph,
    inertia_tensor: InertiaTensor,
    position: Position,
    orientation: Orientation,
    momentum: Momentum,
    angular_momentum: AngularMomentum,
    total_force: Force,
    total_torque: Torque,
}

impl RigidBody {
    /// Creates a new dynamic body with the given shape and inertial
    /// properties (expressed in the shape's frame), placing the shape's frame
    /// at the given pose.
    pub fn new_dynamic(
        shape: Shape,
        inertial_properties: &InertialProperties,
        shape_pose: &Pose,
        velocity: Velocity,
        angular_velocity: AngularVelocity,
    ) -> Self {
        let local_center_of_mass = *inertial_properties.center_of_mass();
        let inertia_tensor = *inertial_properties.inertia_tensor();
        let orientation = shape_pose.rotation;
        let position = shape_pose.transform_point(&local_center_of_mass);
        let mass = inertial_properties.mass();

        Self {
            kind: RigidBodyKind::Dynamic,
            shape,
            local_center_of_mass,
            mass,
            inertia_tensor,
            position,
            orientation,
            momentum: velocity * mass,
            angular_momentum: inertia_tensor.rotated_matrix(&orientation) * angular_velocity,
            total_force: Force::zeros(),
            total_torque: Torque::zeros(),
        }
    }

    /// Creates a new static body with the given shape placed at the given
    /// pose.
    pub fn new_static(shape: Shape, shape_pose: &Pose) -> Self {
        Self {
            kind: RigidBodyKind::Static,
            shape,
            local_center_of_mass: Position::origin(),
            mass: fph::INFINITY,
            inertia_tensor: InertiaTensor::identity(),
            position: Position::from(shape_pose.translation.vector),
            orientation: shape_pose.rotation,
            momentum: Momentum::zeros(),
            angular_momentum: AngularMomentum::zeros(),
            total_force: Force::zeros(),
            total_torque: Torque::zeros(),
        }
    }

    pub fn kind(&self) -> RigidBodyKind {
        self.kind
    }

    pub fn is_static(&self) -> bool {
        self.kind == RigidBodyKind::Static
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Returns the mass of the body, which is infinite for static bodies.
    pub fn mass(&self) -> fph {
        self.mass
    }

    pub fn inverse_mass(&self) -> fph {
        match self.kind {
            RigidBodyKind::Static => 0.0,
            RigidBodyKind::Dynamic => self.mass.recip(),
        }
    }

    /// Returns the inertia tensor of the body about its center of mass, in
    /// the body's frame.
    pub fn inertia_tensor(&self) -> &InertiaTensor {
        &self.inertia_tensor
    }

    /// Computes the world space inverse inertia matrix, which is zero for
    /// static bodies.
    pub fn compute_inverse_world_inertia_matrix(&self) -> Matrix3<fph> {
        match self.kind {
            RigidBodyKind::Static => Matrix3::zeros(),
            RigidBodyKind::Dynamic => self.inertia_tensor.inverse_rotated_matrix(&self.orientation),
        }
    }

    /// Returns the world space position of the center of mass.
    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn orientation(&self) -> &Orientation {
        &self.orientation
    }

    /// Returns the center of mass in the shape's frame.
    pub fn local_center_of_mass(&self) -> &Position {
        &self.local_center_of_mass
    }

    /// Computes the world space pose of the shape's frame.
    pub fn shape_pose(&self) -> Pose {
        quantities::pose_from_parts(&self.position, &self.orientation)
            * Translation3::from(-self.local_center_of_mass.coords)
    }

    pub fn momentum(&self) -> &Momentum {
        &self.momentum
    }

    pub fn angular_momentum(&self) -> &AngularMomentum {
        &self.angular_momentum
    }

    pub fn compute_velocity(&self) -> Velocity {
        match self.kind {
            RigidBodyKind::Static => Velocity::zeros(),
            RigidBodyKind::Dynamic => self.momentum / self.mass,
        }
    }

    pub fn compute_angular_velocity(&self) -> AngularVelocity {
        self.compute_inverse_world_inertia_matrix() * self.angular_momentum
    }

    pub fn total_force(&self) -> &Force {
        &self.total_force
    }

    pub fn total_torque(&self) -> &Torque {
        &self.total_torque
    }

    pub fn transform_vector_from_body_to_world_space(&self, vector: &Vector3<fph>) -> Vector3<fph> {
        self.orientation.transform_vector(vector)
    }

    pub fn transform_vector_from_world_to_body_space(&self, vector: &Vector3<fph>) -> Vector3<fph> {
        self.orientation.inverse_transform_vector(vector)
    }

    /// Transforms a point from the shape's frame to world space.
    pub fn transform_point_from_shape_to_world_space(&self, point: &Point3<fph>) -> Point3<fph> {
        self.shape_pose().transform_point(point)
    }

    /// Transforms a point from world space to the shape's frame.
    pub fn transform_point_from_world_to_shape_space(&self, point: &Point3<fph>) -> Point3<fph> {
        self.shape_pose().inverse_transform_point(point)
    }

    /// Computes the velocity of the given world space point attached to the
    /// body.
    pub fn compute_velocity_of_attached_world_space_point(&self, point: &Position) -> Velocity {
        quantities::compute_velocity_of_point_on_body(
            &self.position,
            &self.compute_velocity(),
            &self.compute_angular_velocity(),
            point,
        )
    }

    pub fn apply_force_at_center_of_mass(&mut self, force: &Force) {
        self.total_force += force;
    }

    pub fn apply_torque(&mut self, torque: &Torque) {
        self.total_torque += torque;
    }

    /// Applies the given force at the given world space position, which
    /// generally also gives a torque about the center of mass.
    pub fn apply_force(&mut self, force: &Force, force_position: &Position) {
        self.apply_force_at_center_of_mass(force);
        self.apply_torque(&(force_position - self.position).cross(force));
    }

    /// Places the shape's frame at the given pose.
    pub fn set_shape_pose(&mut self, shape_pose: &Pose) {
        self.orientation = shape_pose.rotation;
        self.position = shape_pose.transform_point(&self.local_center_of_mass);
    }

    pub fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    pub fn set_orientation(&mut self, orientation: Orientation) {
        self.orientation = orientation;
    }

    /// Recomputes the linear momentum from the given velocity. Does nothing
    /// for static bodies.
    pub fn synchronize_momentum(&mut self, velocity: &Velocity) {
        if self.kind == RigidBodyKind::Dynamic {
            self.momentum = velocity * self.mass;
        }
    }

    /// Recomputes the angular momentum from the given angular velocity. Does
    /// nothing for static bodies.
    pub fn synchronize_angular_momentum(&mut self, angular_velocity: &AngularVelocity) {
        if self.kind == RigidBodyKind::Dynamic {
            self.angular_momentum =
                self.inertia_tensor.rotated_matrix(&self.orientation) * angular_velocity;
        }
    }

    /// Advances the momenta with the force and torque accumulated since the
    /// last reset.
    pub fn advance_momenta(&mut self, step_duration: fph) {
        if self.kind == RigidBodyKind::Dynamic {
            self.momentum += self.total_force * step_duration;
            self.angular_momentum += self.total_torque * step_duration;
        }
    }

    /// Advances the position and orientation with the current velocities.
    pub fn advance_configuration(&mut self, step_duration: fph) {
        if self.kind == RigidBodyKind::Dynamic {
            let velocity = self.compute_velocity();
            let angular_velocity = self.compute_angular_velocity();
            self.position += velocity * step_duration;
            self.orientation = quantities::advance_orientation(
                &self.orientation,
                &angular_velocity,
                step_duration,
            );
        }
    }

    pub fn reset_force_and_torque(&mut self) {
        self.total_force = Force::zeros();
        self.total_torque = Torque::zeros();
    }
}

impl AbsDiffEq for RigidBody {
    type Epsilon = <fph as AbsDiffEq>::Epsilon;

    fn default_epsilon() -> Self::Epsilon {
        fph::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        self.kind == other.kind
            && Position::abs_diff_eq(&self.position, &other.position, epsilon)
            && Orientation::abs_diff_eq(&self.orientation, &other.orientation, epsilon)
            && Momentum::abs_diff_eq(&self.momentum, &other.momentum, epsilon)
            && AngularMomentum::abs_diff_eq(
                &self.angular_momentum,
                &other.angular_momentum,
                epsilon,
            )
    }
}
