//! Reduced coordinate articulated bodies with a fixed base.

use crate::{
    fph,
    geometry::Shape,
    inertia::InertialProperties,
    quantities::{
        AngularVelocity, Force, Pose, Position, Torque, Velocity,
    },
};
use anyhow::{Result, bail};
use hydrosim_utils::ArenaKey;
use nalgebra::{
    DMatrix, DVector, Matrix3, Translation3, UnitQuaternion, UnitVector3, Vector3,
};

/// Identifier for a [`Multibody`] in a [`BodySet`](super::BodySet).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MultibodyID(pub(super) ArenaKey);

/// The kind of joint connecting a link to its parent.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LinkJointKind {
    Fixed,
    /// Rotation about the joint axis by the joint position in radians.
    Revolute,
    /// Translation along the joint axis by the joint position in meters.
    Prismatic,
}

/// The joint connecting a link to its parent link or to the base.
#[derive(Clone, Debug, PartialEq)]
pub struct LinkJoint {
    pub kind: LinkJointKind,
    /// The joint axis in the joint frame (and the link frame).
    pub axis: UnitVector3<fph>,
    /// The pose of the joint frame relative to the parent's link frame (or
    /// the base frame) when the joint position is zero.
    pub parent_offset: Pose,
    /// Lower and upper bounds on the joint position.
    pub limits: Option<(fph, fph)>,
    /// Viscous damping coefficient opposing the joint velocity.
    pub damping: fph,
}

/// A rigid link of a [`Multibody`].
#[derive(Clone, Debug)]
pub struct MultibodyLink {
    parent: Option<usize>,
    joint: LinkJoint,
    mass: fph,
    /// Center of mass in the link frame.
    local_center_of_mass: Position,
    /// Inertia matrix about the center of mass in the link frame.
    local_inertia_matrix: Matrix3<fph>,
    shape: Option<Shape>,
    joint_position: fph,
    joint_velocity: fph,
    state: LinkState,
    external_force: Force,
    external_torque: Torque,
    joint_force: fph,
}

/// World space kinematic state of a link, derived from the joint positions
/// and velocities.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinkState {
    /// Pose of the link frame.
    pub pose: Pose,
    pub center_of_mass: Position,
    /// Velocity of the center of mass.
    pub velocity: Velocity,
    pub angular_velocity: AngularVelocity,
}

/// A tree of links with a fixed base, simulated in joint coordinates.
#[derive(Clone, Debug)]
pub struct Multibody {
    base_pose: Pose,
    /// Links in an order where every parent precedes its children.
    links: Vec<MultibodyLink>,
    /// Index of the generalized coordinate of each link's joint.
    dof_indices: Vec<Option<usize>>,
    n_dofs: usize,
}

/// Velocity product terms of a link, meaning the accelerations it would
/// have if all joint accelerations were zero.
#[derive(Clone, Copy, Debug)]
struct BiasAcceleration {
    /// Acceleration of the link frame origin.
    origin: Vector3<fph>,
    angular: Vector3<fph>,
}

impl LinkJoint {
    pub fn fixed(parent_offset: Pose) -> Self {
        Self {
            kind: LinkJointKind::Fixed,
            axis: Vector3::z_axis(),
            parent_offset,
            limits: None,
            damping: 0.0,
        }
    }

    pub fn revolute(parent_offset: Pose, axis: UnitVector3<fph>) -> Self {
        Self {
            kind: LinkJointKind::Revolute,
            axis,
            parent_offset,
            limits: None,
            damping: 0.0,
        }
    }

    pub fn prismatic(parent_offset: Pose, axis: UnitVector3<fph>) -> Self {
        Self {
            kind: LinkJointKind::Prismatic,
            axis,
            parent_offset,
            limits: None,
            damping: 0.0,
        }
    }

    pub fn with_limits(mut self, lower: fph, upper: fph) -> Self {
        self.limits = Some((lower, upper));
        self
    }

    pub fn with_damping(mut self, damping: fph) -> Self {
        self.damping = damping;
        self
    }

    pub fn is_movable(&self) -> bool {
        self.kind != LinkJointKind::Fixed
    }

    /// Computes the transform from the link frame to the parent frame for
    /// the given joint position.
    fn transform(&self, joint_position: fph) -> Pose {
        let motion = match self.kind {
            LinkJointKind::Fixed => Pose::identity(),
            LinkJointKind::Revolute => Pose::from_parts(
                Translation3::identity(),
                UnitQuaternion::from_axis_angle(&self.axis, joint_position),
            ),
            LinkJointKind::Prismatic => Pose::from_parts(
                Translation3::from(self.axis.into_inner() * joint_position),
                UnitQuaternion::identity(),
            ),
        };
        self.parent_offset * motion
    }
}

impl MultibodyLink {
    /// Creates a link attached through the given joint to the link with the
    /// given index, or to the base if there is no parent. The inertial
    /// properties are expressed in the link frame.
    pub fn new(
        parent: Option<usize>,
        joint: LinkJoint,
        inertial_properties: &InertialProperties,
        shape: Option<Shape>,
    ) -> Self {
        Self {
            parent,
            joint,
            mass: inertial_properties.mass(),
            local_center_of_mass: *inertial_properties.center_of_mass(),
            local_inertia_matrix: *inertial_properties.inertia_tensor().matrix(),
            shape,
            joint_position: 0.0,
            joint_velocity: 0.0,
            state: LinkState {
                pose: Pose::identity(),
                center_of_mass: Position::origin(),
                velocity: Velocity::zeros(),
                angular_velocity: AngularVelocity::zeros(),
            },
            external_force: Force::zeros(),
            external_torque: Torque::zeros(),
            joint_force: 0.0,
        }
    }

    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    pub fn joint(&self) -> &LinkJoint {
        &self.joint
    }

    pub fn mass(&self) -> fph {
        self.mass
    }

    pub fn local_center_of_mass(&self) -> &Position {
        &self.local_center_of_mass
    }

    pub fn shape(&self) -> Option<&Shape> {
        self.shape.as_ref()
    }

    pub fn joint_position(&self) -> fph {
        self.joint_position
    }

    pub fn joint_velocity(&self) -> fph {
        self.joint_velocity
    }

    /// Returns the world space state from the latest kinematics update.
    pub fn state(&self) -> &LinkState {
        &self.state
    }

    pub fn external_force(&self) -> &Force {
        &self.external_force
    }

    pub fn external_torque(&self) -> &Torque {
        &self.external_torque
    }

    pub fn joint_force(&self) -> fph {
        self.joint_force
    }

    fn world_inertia_matrix(&self) -> Matrix3<fph> {
        let rotation = self.state.pose.rotation.to_rotation_matrix();
        rotation * self.local_inertia_matrix * rotation.transpose()
    }

    fn world_axis(&self) -> Vector3<fph> {
        self.state.pose.rotation * self.joint.axis.into_inner()
    }

    fn origin(&self) -> Position {
        Position::from(self.state.pose.translation.vector)
    }
}

impl Multibody {
    /// Creates a multibody without links whose base frame is fixed at the
    /// given pose.
    pub fn new(base_pose: Pose) -> Self {
        Self {
            base_pose,
            links: Vec::new(),
            dof_indices: Vec::new(),
            n_dofs: 0,
        }
    }

    /// Adds the given link and returns its index.
    ///
    /// # Errors
    /// Returns an error if the link's parent has not been added yet or the
    /// link's mass is not positive.
    pub fn add_link(&mut self, link: MultibodyLink) -> Result<usize> {
        if let Some(parent) = link.parent {
            if parent >= self.links.len() {
                bail!(
                    "Parent index {parent} of new link is out of range ({} links)",
                    self.links.len()
                );
            }
        }
        if !(link.mass > 0.0) {
            bail!("Invalid link mass: {}", link.mass);
        }
        let dof_index = if link.joint.is_movable() {
            self.n_dofs += 1;
            Some(self.n_dofs - 1)
        } else {
            None
        };
        self.dof_indices.push(dof_index);
        self.links.push(link);
        self.update_kinematics();
        Ok(self.links.len() - 1)
    }

    pub fn base_pose(&self) -> &Pose {
        &self.base_pose
    }

    /// Moves the base to the given pose.
    pub fn set_base_pose(&mut self, base_pose: Pose) {
        self.base_pose = base_pose;
        self.update_kinematics();
    }

    pub fn n_links(&self) -> usize {
        self.links.len()
    }

    /// Returns the number of generalized coordinates.
    pub fn n_dofs(&self) -> usize {
        self.n_dofs
    }

    pub fn links(&self) -> &[MultibodyLink] {
        &self.links
    }

    pub fn get_link(&self, link_idx: usize) -> Option<&MultibodyLink> {
        self.links.get(link_idx)
    }

    /// Returns the link with the given index.
    ///
    /// # Panics
    /// If the index is out of bounds.
    pub fn link(&self, link_idx: usize) -> &MultibodyLink {
        self.get_link(link_idx)
            .expect("Requested missing multibody link")
    }

    /// Returns the total mass of all links.
    pub fn total_mass(&self) -> fph {
        self.links.iter().map(|link| link.mass).sum()
    }

    /// Sets the position and velocity of the given link's joint.
    pub fn set_joint_state(&mut self, link_idx: usize, position: fph, velocity: fph) {
        if let Some(link) = self.links.get_mut(link_idx) {
            link.joint_position = position;
            link.joint_velocity = velocity;
            self.update_kinematics();
        }
    }

    /// Applies the given world space force at the given world space point on
    /// the given link.
    pub fn apply_link_force(&mut self, link_idx: usize, force: &Force, point: &Position) {
        if let Some(link) = self.links.get_mut(link_idx) {
            link.external_force += force;
            link.external_torque += (point - link.state.center_of_mass).cross(force);
        }
    }

    /// Applies the given world space force at the center of mass of the
    /// given link.
    pub fn apply_link_force_at_center_of_mass(&mut self, link_idx: usize, force: &Force) {
        if let Some(link) = self.links.get_mut(link_idx) {
            link.external_force += force;
        }
    }

    pub fn apply_link_torque(&mut self, link_idx: usize, torque: &Torque) {
        if let Some(link) = self.links.get_mut(link_idx) {
            link.external_torque += torque;
        }
    }

    /// Applies a generalized force (a torque for revolute joints, a force
    /// for prismatic joints) on the given link's joint.
    pub fn apply_joint_force(&mut self, link_idx: usize, joint_force: fph) {
        if let Some(link) = self.links.get_mut(link_idx) {
            link.joint_force += joint_force;
        }
    }

    /// Sets every joint velocity to zero.
    pub fn zero_joint_velocities(&mut self) {
        for link in &mut self.links {
            link.joint_velocity = 0.0;
        }
        self.update_kinematics();
    }

    pub fn reset_forces(&mut self) {
        for link in &mut self.links {
            link.external_force = Force::zeros();
            link.external_torque = Torque::zeros();
            link.joint_force = 0.0;
        }
    }

    /// Recomputes the world space state of every link from the joint
    /// positions and velocities.
    pub fn update_kinematics(&mut self) {
        for link_idx in 0..self.links.len() {
            let (parent_pose, parent_velocity_at_origin, parent_angular_velocity, parent_origin) =
                self.parent_motion(link_idx);

            let link = &mut self.links[link_idx];
            let pose = parent_pose * link.joint.transform(link.joint_position);
            let origin = Position::from(pose.translation.vector);
            let axis = pose.rotation * link.joint.axis.into_inner();

            let mut angular_velocity = parent_angular_velocity;
            let mut origin_velocity = parent_velocity_at_origin
                + parent_angular_velocity.cross(&(origin - parent_origin));
            match link.joint.kind {
                LinkJointKind::Fixed => {}
                LinkJointKind::Revolute => angular_velocity += axis * link.joint_velocity,
                LinkJointKind::Prismatic => origin_velocity += axis * link.joint_velocity,
            }

            let center_of_mass = pose.transform_point(&link.local_center_of_mass);
            link.state = LinkState {
                pose,
                center_of_mass,
                velocity: origin_velocity + angular_velocity.cross(&(center_of_mass - origin)),
                angular_velocity,
            };
        }
    }

    /// Returns the pose, origin velocity, angular velocity and origin of the
    /// parent of the given link, which is the base for root links.
    fn parent_motion(&self, link_idx: usize) -> (Pose, Velocity, AngularVelocity, Position) {
        match self.links[link_idx].parent {
            Some(parent_idx) => {
                let parent = &self.links[parent_idx];
                let origin = parent.origin();
                let velocity_at_origin = parent.state.velocity
                    + parent
                        .state
                        .angular_velocity
                        .cross(&(origin - parent.state.center_of_mass));
                (
                    parent.state.pose,
                    velocity_at_origin,
                    parent.state.angular_velocity,
                    origin,
                )
            }
            None => (
                self.base_pose,
                Velocity::zeros(),
                AngularVelocity::zeros(),
                Position::from(self.base_pose.translation.vector),
            ),
        }
    }

    /// Whether the joint of `ancestor_idx` moves the link `link_idx`.
    fn is_ancestor_or_self(&self, ancestor_idx: usize, link_idx: usize) -> bool {
        let mut current = Some(link_idx);
        while let Some(idx) = current {
            if idx == ancestor_idx {
                return true;
            }
            current = self.links[idx].parent;
        }
        false
    }

    /// Computes the Jacobian columns mapping the velocity of the joint of
    /// `joint_link_idx` to the linear velocity of the center of mass and the
    /// angular velocity of `link_idx`.
    fn jacobian_column(
        &self,
        joint_link_idx: usize,
        link_idx: usize,
    ) -> (Vector3<fph>, Vector3<fph>) {
        let joint_link = &self.links[joint_link_idx];
        let axis = joint_link.world_axis();
        match joint_link.joint.kind {
            LinkJointKind::Fixed => (Vector3::zeros(), Vector3::zeros()),
            LinkJointKind::Revolute => {
                let arm = self.links[link_idx].state.center_of_mass - joint_link.origin();
                (axis.cross(&arm), axis)
            }
            LinkJointKind::Prismatic => (axis, Vector3::zeros()),
        }
    }

    /// Computes the joint space mass matrix.
    pub fn compute_mass_matrix(&self) -> DMatrix<fph> {
        let mut mass_matrix = DMatrix::zeros(self.n_dofs, self.n_dofs);

        for (link_idx, link) in self.links.iter().enumerate() {
            let inertia = link.world_inertia_matrix();
            let columns: Vec<(usize, Vector3<fph>, Vector3<fph>)> = self
                .movable_ancestors(link_idx)
                .map(|(joint_link_idx, dof)| {
                    let (linear, angular) = self.jacobian_column(joint_link_idx, link_idx);
                    (dof, linear, angular)
                })
                .collect();

            for (dof_i, linear_i, angular_i) in &columns {
                for (dof_j, linear_j, angular_j) in &columns {
                    mass_matrix[(*dof_i, *dof_j)] += link.mass * linear_i.dot(linear_j)
                        + angular_i.dot(&(inertia * angular_j));
                }
            }
        }
        mass_matrix
    }

    /// Returns the link index and coordinate index of each movable joint
    /// affecting the given link.
    fn movable_ancestors(&self, link_idx: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..=link_idx).filter_map(move |joint_link_idx| {
            let dof = self.dof_indices[joint_link_idx]?;
            self.is_ancestor_or_self(joint_link_idx, link_idx)
                .then_some((joint_link_idx, dof))
        })
    }

    /// Computes the acceleration every link would have with zero joint
    /// accelerations, recursing outwards from the base.
    fn compute_bias_accelerations(&self) -> Vec<BiasAcceleration> {
        let mut biases: Vec<BiasAcceleration> = Vec::with_capacity(self.links.len());

        for link in &self.links {
            let origin = link.origin();
            let axis = link.world_axis();

            let (parent_bias, parent_angular_velocity, parent_origin) = match link.parent {
                Some(parent_idx) => {
                    let parent = &self.links[parent_idx];
                    (
                        biases[parent_idx],
                        parent.state.angular_velocity,
                        parent.origin(),
                    )
                }
                None => (
                    BiasAcceleration {
                        origin: Vector3::zeros(),
                        angular: Vector3::zeros(),
                    },
                    Vector3::zeros(),
                    Position::from(self.base_pose.translation.vector),
                ),
            };

            // Acceleration of the point of the parent coinciding with this
            // link's origin
            let arm = origin - parent_origin;
            let mut origin_acceleration = parent_bias.origin
                + parent_bias.angular.cross(&arm)
                + parent_angular_velocity.cross(&parent_angular_velocity.cross(&arm));
            let mut angular_acceleration = parent_bias.angular;

            match link.joint.kind {
                LinkJointKind::Fixed => {}
                LinkJointKind::Revolute => {
                    angular_acceleration +=
                        parent_angular_velocity.cross(&(axis * link.joint_velocity));
                }
                LinkJointKind::Prismatic => {
                    origin_acceleration +=
                        2.0 * parent_angular_velocity.cross(&(axis * link.joint_velocity));
                }
            }

            biases.push(BiasAcceleration {
                origin: origin_acceleration,
                angular: angular_acceleration,
            });
        }
        biases
    }

    /// Computes the generalized forces from joint forces, external link
    /// loads, velocity product terms and joint damping.
    fn compute_generalized_forces(&self) -> DVector<fph> {
        let biases = self.compute_bias_accelerations();
        let mut forces = DVector::zeros(self.n_dofs);

        for (link_idx, link) in self.links.iter().enumerate() {
            if let Some(dof) = self.dof_indices[link_idx] {
                forces[dof] += link.joint_force - link.joint.damping * link.joint_velocity;
            }

            let bias = &biases[link_idx];
            let omega = link.state.angular_velocity;
            let arm = link.state.center_of_mass - link.origin();
            let center_of_mass_bias = bias.origin
                + bias.angular.cross(&arm)
                + omega.cross(&omega.cross(&arm));

            let inertia = link.world_inertia_matrix();
            let net_force = link.external_force - link.mass * center_of_mass_bias;
            let net_torque =
                link.external_torque - inertia * bias.angular - omega.cross(&(inertia * omega));

            for (joint_link_idx, dof) in self.movable_ancestors(link_idx) {
                let (linear, angular) = self.jacobian_column(joint_link_idx, link_idx);
                forces[dof] += linear.dot(&net_force) + angular.dot(&net_torque);
            }
        }
        forces
    }

    /// Computes the joint accelerations resulting from the current state and
    /// applied loads. Falls back to an LU decomposition if the mass matrix is
    /// not numerically positive definite, and to zero acceleration if it is
    /// singular.
    pub fn compute_joint_accelerations(&self) -> DVector<fph> {
        let mass_matrix = self.compute_mass_matrix();
        let forces = self.compute_generalized_forces();

        if let Some(cholesky) = mass_matrix.clone().cholesky() {
            return cholesky.solve(&forces);
        }
        mass_matrix.lu().solve(&forces).unwrap_or_else(|| {
            log::debug!("Singular multibody mass matrix, skipping joint accelerations");
            DVector::zeros(self.n_dofs)
        })
    }

    /// Advances the joint velocities and then the joint positions over the
    /// given duration, enforces the joint limits and updates the link
    /// states.
    pub fn advance(&mut self, step_duration: fph) {
        if self.n_dofs == 0 {
            return;
        }
        let accelerations = self.compute_joint_accelerations();
        if accelerations.iter().any(|value| !value.is_finite()) {
            log::debug!("Non-finite multibody joint accelerations, skipping step");
            return;
        }

        for (link, dof) in self.links.iter_mut().zip(&self.dof_indices) {
            let Some(dof) = *dof else {
                continue;
            };
            link.joint_velocity += accelerations[dof] * step_duration;
            link.joint_position += link.joint_velocity * step_duration;

            if let Some((lower, upper)) = link.joint.limits {
                if link.joint_position < lower {
                    link.joint_position = lower;
                    link.joint_velocity = link.joint_velocity.max(0.0);
                } else if link.joint_position > upper {
                    link.joint_position = upper;
                    link.joint_velocity = link.joint_velocity.min(0.0);
                }
            }
        }
        self.update_kinematics();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::{point, vector};
    use proptest::prelude::*;

    const GRAVITY: fph = 9.81;

    fn point_mass(mass: fph, center_of_mass: Position) -> InertialProperties {
        let inertia = 1e-6 * mass;
        InertialProperties::new(
            mass,
            center_of_mass,
            crate::inertia::InertiaTensor::from_diagonal_elements(inertia, inertia, inertia),
        )
    }

    fn pendulum(length: fph) -> Multibody {
        let mut multibody = Multibody::new(Pose::identity());
        multibody
            .add_link(MultibodyLink::new(
                None,
                LinkJoint::revolute(Pose::identity(), Vector3::y_axis()),
                &point_mass(2.0, point![length, 0.0, 0.0]),
                None,
            ))
            .unwrap();
        multibody
    }

    fn apply_gravity(multibody: &mut Multibody) {
        for idx in 0..multibody.n_links() {
            let force = vector![0.0, 0.0, -GRAVITY * multibody.link(idx).mass()];
            multibody.apply_link_force_at_center_of_mass(idx, &force);
        }
    }

    #[test]
    fn adding_link_with_unknown_parent_fails() {
        let mut multibody = Multibody::new(Pose::identity());
        let result = multibody.add_link(MultibodyLink::new(
            Some(0),
            LinkJoint::fixed(Pose::identity()),
            &point_mass(1.0, Position::origin()),
            None,
        ));
        assert!(result.is_err());
        assert_eq!(multibody.n_links(), 0);
    }

    #[test]
    fn horizontal_pendulum_starts_falling_with_gravity_over_length() {
        let length = 0.5;
        let mut multibody = pendulum(length);
        apply_gravity(&mut multibody);
        let accelerations = multibody.compute_joint_accelerations();
        // Positive rotation about y moves +x towards -z
        assert_abs_diff_eq!(accelerations[0], GRAVITY / length, epsilon = 1e-4);
    }

    #[test]
    fn spinning_pendulum_link_has_centripetal_bias() {
        let mut multibody = Multibody::new(Pose::identity());
        multibody
            .add_link(MultibodyLink::new(
                None,
                LinkJoint::revolute(Pose::identity(), Vector3::z_axis()),
                &point_mass(1.0, point![1.0, 0.0, 0.0]),
                None,
            ))
            .unwrap();
        multibody
            .add_link(MultibodyLink::new(
                Some(0),
                LinkJoint::prismatic(Pose::translation(1.0, 0.0, 0.0), Vector3::x_axis()),
                &point_mass(1.0, Position::origin()),
                None,
            ))
            .unwrap();
        multibody.set_joint_state(0, 0.0, 2.0);

        let accelerations = multibody.compute_joint_accelerations();
        // With no radial force, the sliding mass accelerates outwards with
        // the centripetal acceleration omega^2 r
        assert!(accelerations[1] > 0.0);
    }

    #[test]
    fn prismatic_link_falls_freely() {
        let mut multibody = Multibody::new(Pose::identity());
        multibody
            .add_link(MultibodyLink::new(
                None,
                LinkJoint::prismatic(Pose::identity(), Vector3::z_axis()),
                &point_mass(3.0, Position::origin()),
                None,
            ))
            .unwrap();
        for _ in 0..100 {
            apply_gravity(&mut multibody);
            multibody.advance(0.01);
            multibody.reset_forces();
        }
        assert_abs_diff_eq!(multibody.link(0).joint_velocity(), -GRAVITY, epsilon = 1e-9);
        assert_abs_diff_eq!(
            multibody.link(0).state().velocity,
            vector![0.0, 0.0, -GRAVITY],
            epsilon = 1e-9
        );
    }

    #[test]
    fn joint_limits_stop_motion() {
        let mut multibody = Multibody::new(Pose::identity());
        multibody
            .add_link(MultibodyLink::new(
                None,
                LinkJoint::prismatic(Pose::identity(), Vector3::z_axis()).with_limits(-0.1, 0.1),
                &point_mass(1.0, Position::origin()),
                None,
            ))
            .unwrap();
        for _ in 0..100 {
            apply_gravity(&mut multibody);
            multibody.advance(0.01);
            multibody.reset_forces();
        }
        assert_eq!(multibody.link(0).joint_position(), -0.1);
        assert_eq!(multibody.link(0).joint_velocity(), 0.0);
    }

    #[test]
    fn damping_brings_pendulum_to_rest() {
        let mut multibody = Multibody::new(Pose::identity());
        multibody
            .add_link(MultibodyLink::new(
                None,
                LinkJoint::revolute(Pose::identity(), Vector3::y_axis()).with_damping(5.0),
                &point_mass(1.0, point![0.5, 0.0, 0.0]),
                None,
            ))
            .unwrap();
        for _ in 0..20000 {
            apply_gravity(&mut multibody);
            multibody.advance(0.001);
            multibody.reset_forces();
        }
        let link = multibody.link(0);
        assert_abs_diff_eq!(link.joint_velocity(), 0.0, epsilon = 1e-3);
        // Hanging straight down
        assert_abs_diff_eq!(link.state().center_of_mass, point![0.0, 0.0, -0.5], epsilon = 1e-3);
    }

    #[test]
    fn forward_kinematics_composes_joint_transforms() {
        let mut multibody = pendulum(1.0);
        multibody
            .add_link(MultibodyLink::new(
                Some(0),
                LinkJoint::revolute(Pose::translation(1.0, 0.0, 0.0), Vector3::y_axis()),
                &point_mass(1.0, point![1.0, 0.0, 0.0]),
                None,
            ))
            .unwrap();
        multibody.set_joint_state(0, std::f64::consts::FRAC_PI_2, 0.0);
        multibody.set_joint_state(1, -std::f64::consts::FRAC_PI_2, 0.0);
        assert_abs_diff_eq!(
            multibody.link(1).state().center_of_mass,
            point![1.0, 0.0, -1.0],
            epsilon = 1e-12
        );
    }

    proptest! {
        #[test]
        fn mass_matrix_is_symmetric_positive_definite(
            angle_1 in -3.0..3.0_f64,
            angle_2 in -3.0..3.0_f64,
        ) {
            let mut multibody = pendulum(1.0);
            multibody
                .add_link(MultibodyLink::new(
                    Some(0),
                    LinkJoint::revolute(Pose::translation(1.0, 0.0, 0.0), Vector3::y_axis()),
                    &point_mass(1.0, point![1.0, 0.0, 0.0]),
                    None,
                ))
                .unwrap();
            multibody.set_joint_state(0, angle_1, 0.0);
            multibody.set_joint_state(1, angle_2, 0.0);
            let mass_matrix = multibody.compute_mass_matrix();
            prop_assert!((mass_matrix[(0, 1)] - mass_matrix[(1, 0)]).abs() < 1e-12);
            prop_assert!(mass_matrix.cholesky().is_some());
        }
    }
}
