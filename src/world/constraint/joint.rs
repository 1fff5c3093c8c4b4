//! Joint constraints between two rigid bodies, or a rigid body and the
//! world.

use super::{
    ConstrainedBody, PreparedTwoBodyConstraint, TwoBodyConstraint,
    contact::construct_tangent_vectors,
};
use crate::{
    fph,
    quantities::{self, Pose, Position},
    world::{RigidBody, RigidBodyID},
};
use hydrosim_utils::ArenaKey;
use nalgebra::{Matrix6, UnitVector3, Vector3, Vector6};

/// Identifier for a [`JointConstraint`] in a physics world.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JointID(pub(in crate::world) ArenaKey);

/// Which relative motions a joint permits. The joint axis is the z-axis of
/// the joint frame.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum JointKind {
    /// No relative motion.
    Fixed,
    /// Rotation about the joint axis.
    Revolute,
    /// Free rotation about the joint origin.
    Spherical,
    /// Translation along the joint axis.
    Prismatic,
}

/// A joint constraint. The joint frame is stored relative to each body, and
/// the constraint keeps the two copies of the frame coincident up to the
/// motion permitted by the [`JointKind`].
#[derive(Clone, Debug)]
pub struct JointConstraint {
    kind: JointKind,
    body_a: RigidBodyID,
    body_b: Option<RigidBodyID>,
    /// The joint frame relative to the center of mass frame of body A.
    local_frame_a: Pose,
    /// The joint frame relative to the center of mass frame of body B, or to
    /// the world when there is no body B.
    local_frame_b: Pose,
}

#[derive(Clone, Debug)]
pub(super) struct PreparedJoint {
    kind: JointKind,
    local_frame_a: Pose,
    local_frame_b: Pose,
    rows: JacobianRows,
    inverse_effective_mass: Matrix6<fph>,
}

/// Up to six scalar constraint rows. Linear rows constrain the relative
/// velocity of the joint origins along a direction, angular rows constrain
/// the relative angular velocity about an axis.
#[derive(Clone, Debug)]
struct JacobianRows {
    linear: [Vector3<fph>; 6],
    angular_a: [Vector3<fph>; 6],
    angular_b: [Vector3<fph>; 6],
    active: [bool; 6],
    position_error: Vector6<fph>,
}

impl JointConstraint {
    /// Creates a joint of the given kind with its frame at the given world
    /// space pose, attaching body A to body B or to the world.
    pub fn new(
        kind: JointKind,
        (body_a_id, body_a): (RigidBodyID, &RigidBody),
        body_b: Option<(RigidBodyID, &RigidBody)>,
        joint_frame: &Pose,
    ) -> Self {
        let local_frame = |body: &RigidBody| {
            quantities::pose_from_parts(body.position(), body.orientation()).inverse()
                * joint_frame
        };
        Self {
            kind,
            body_a: body_a_id,
            body_b: body_b.map(|(id, _)| id),
            local_frame_a: local_frame(body_a),
            local_frame_b: body_b.map_or(*joint_frame, |(_, body)| local_frame(body)),
        }
    }

    pub fn kind(&self) -> JointKind {
        self.kind
    }

    pub fn body_a(&self) -> RigidBodyID {
        self.body_a
    }

    pub fn body_b(&self) -> Option<RigidBodyID> {
        self.body_b
    }

    /// Whether the joint involves the given body.
    pub fn involves(&self, body: RigidBodyID) -> bool {
        self.body_a == body || self.body_b == Some(body)
    }
}

impl TwoBodyConstraint for JointConstraint {
    type Prepared = PreparedJoint;

    fn prepare(&self, body_a: &ConstrainedBody, body_b: &ConstrainedBody) -> PreparedJoint {
        let rows = JacobianRows::compute(
            self.kind,
            &self.local_frame_a,
            &self.local_frame_b,
            body_a,
            body_b,
        );
        let inverse_effective_mass = rows.compute_inverse_effective_mass(body_a, body_b);
        PreparedJoint {
            kind: self.kind,
            local_frame_a: self.local_frame_a,
            local_frame_b: self.local_frame_b,
            rows,
            inverse_effective_mass,
        }
    }
}

impl PreparedTwoBodyConstraint for PreparedJoint {
    type Impulses = Vector6<fph>;

    fn can_use_warm_impulses_from(&self, other: &Self) -> bool {
        self.kind == other.kind
    }

    fn compute_impulses(&self, body_a: &ConstrainedBody, body_b: &ConstrainedBody) -> Vector6<fph> {
        -(self.inverse_effective_mass * self.rows.compute_velocity_violation(body_a, body_b))
    }

    fn clamp_impulses(&self, impulses: Vector6<fph>) -> Vector6<fph> {
        impulses
    }

    fn apply_impulses_to_body_pair(
        &self,
        body_a: &mut ConstrainedBody,
        body_b: &mut ConstrainedBody,
        impulses: Vector6<fph>,
    ) {
        let (impulse, angular_impulse_a, angular_impulse_b) = self.rows.combine(&impulses);
        body_a.apply_impulse(&impulse, &angular_impulse_a);
        body_b.apply_impulse(&-impulse, &-angular_impulse_b);
    }

    fn apply_positional_correction_to_body_pair(
        &self,
        body_a: &mut ConstrainedBody,
        body_b: &mut ConstrainedBody,
        correction_factor: fph,
    ) {
        // Unlike the velocity rows, the rows are recomputed from the current
        // configurations so that the correction converges over the
        // iterations
        let rows = JacobianRows::compute(
            self.kind,
            &self.local_frame_a,
            &self.local_frame_b,
            body_a,
            body_b,
        );
        let inverse_effective_mass = rows.compute_inverse_effective_mass(body_a, body_b);

        let pseudo_impulses =
            -(inverse_effective_mass * (rows.position_error * correction_factor));

        let (impulse, angular_impulse_a, angular_impulse_b) = rows.combine(&pseudo_impulses);
        body_a.apply_pseudo_impulse_and_angular_impulse(&impulse, &angular_impulse_a);
        body_b.apply_pseudo_impulse_and_angular_impulse(&-impulse, &-angular_impulse_b);
    }

    fn squared_impulse_magnitude(impulses: &Vector6<fph>) -> fph {
        impulses.norm_squared()
    }
}

impl JacobianRows {
    fn compute(
        kind: JointKind,
        local_frame_a: &Pose,
        local_frame_b: &Pose,
        body_a: &ConstrainedBody,
        body_b: &ConstrainedBody,
    ) -> Self {
        let frame_a = quantities::pose_from_parts(&body_a.position, &body_a.orientation)
            * local_frame_a;
        let frame_b = quantities::pose_from_parts(&body_b.position, &body_b.orientation)
            * local_frame_b;

        let origin_a = Position::from(frame_a.translation.vector);
        let origin_b = Position::from(frame_b.translation.vector);
        let disp_a = origin_a - body_a.position;
        let disp_b = origin_b - body_b.position;
        let separation = origin_a - origin_b;

        let axis_a = frame_a.rotation * Vector3::z_axis();
        let (tangent, bitangent) = construct_tangent_vectors(&axis_a);

        let mut rows = Self {
            linear: [Vector3::zeros(); 6],
            angular_a: [Vector3::zeros(); 6],
            angular_b: [Vector3::zeros(); 6],
            active: [false; 6],
            position_error: Vector6::zeros(),
        };

        let set_linear_row = |rows: &mut Self, idx: usize, direction: &Vector3<fph>| {
            rows.linear[idx] = *direction;
            rows.angular_a[idx] = disp_a.cross(direction);
            rows.angular_b[idx] = disp_b.cross(direction);
            rows.active[idx] = true;
            rows.position_error[idx] = direction.dot(&separation);
        };

        match kind {
            JointKind::Prismatic => {
                set_linear_row(&mut rows, 0, &tangent.into_inner());
                set_linear_row(&mut rows, 1, &bitangent.into_inner());
            }
            JointKind::Fixed | JointKind::Revolute | JointKind::Spherical => {
                for (idx, direction) in [Vector3::x(), Vector3::y(), Vector3::z()]
                    .iter()
                    .enumerate()
                {
                    set_linear_row(&mut rows, idx, direction);
                }
            }
        }

        let set_angular_row = |rows: &mut Self, idx: usize, axis: &Vector3<fph>, error: fph| {
            rows.angular_a[idx] = *axis;
            rows.angular_b[idx] = *axis;
            rows.active[idx] = true;
            rows.position_error[idx] = error;
        };

        match kind {
            JointKind::Fixed | JointKind::Prismatic => {
                // Rotation taking frame B to frame A
                let rotation_error = (frame_a.rotation * frame_b.rotation.inverse()).scaled_axis();
                for (offset, axis) in [Vector3::x(), Vector3::y(), Vector3::z()]
                    .iter()
                    .enumerate()
                {
                    set_angular_row(&mut rows, 3 + offset, axis, axis.dot(&rotation_error));
                }
            }
            JointKind::Revolute => {
                let axis_b: UnitVector3<fph> = frame_b.rotation * Vector3::z_axis();
                // For small misalignments this is the rotation taking the
                // axis of B onto the axis of A
                let misalignment = axis_b.into_inner().cross(&axis_a.into_inner());
                set_angular_row(&mut rows, 3, &tangent.into_inner(), tangent.dot(&misalignment));
                set_angular_row(
                    &mut rows,
                    4,
                    &bitangent.into_inner(),
                    bitangent.dot(&misalignment),
                );
            }
            JointKind::Spherical => {}
        }

        rows
    }

    /// Computes the inverse of the effective mass matrix `J M^-1 J^T`.
    /// Inactive rows are decoupled with unit diagonal entries, so they never
    /// receive an impulse.
    fn compute_inverse_effective_mass(
        &self,
        body_a: &ConstrainedBody,
        body_b: &ConstrainedBody,
    ) -> Matrix6<fph> {
        let inverse_mass = body_a.inverse_mass + body_b.inverse_mass;
        let effective_mass = Matrix6::from_fn(|i, j| {
            if self.active[i] && self.active[j] {
                inverse_mass * self.linear[i].dot(&self.linear[j])
                    + self.angular_a[i].dot(&(body_a.inverse_inertia_tensor * self.angular_a[j]))
                    + self.angular_b[i].dot(&(body_b.inverse_inertia_tensor * self.angular_b[j]))
            } else if i == j {
                1.0
            } else {
                0.0
            }
        });
        effective_mass.try_inverse().unwrap_or_else(Matrix6::zeros)
    }

    fn compute_velocity_violation(
        &self,
        body_a: &ConstrainedBody,
        body_b: &ConstrainedBody,
    ) -> Vector6<fph> {
        let relative_velocity = body_a.velocity - body_b.velocity;
        Vector6::from_fn(|idx, _| {
            if self.active[idx] {
                self.linear[idx].dot(&relative_velocity)
                    + self.angular_a[idx].dot(&body_a.angular_velocity)
                    - self.angular_b[idx].dot(&body_b.angular_velocity)
            } else {
                0.0
            }
        })
    }

    /// Sums the given row impulses into the linear impulse on body A and the
    /// angular impulses on each body. Body B receives the negated impulses.
    fn combine(&self, impulses: &Vector6<fph>) -> (Vector3<fph>, Vector3<fph>, Vector3<fph>) {
        let mut impulse = Vector3::zeros();
        let mut angular_impulse_a = Vector3::zeros();
        let mut angular_impulse_b = Vector3::zeros();
        for idx in 0..6 {
            if self.active[idx] {
                impulse += self.linear[idx] * impulses[idx];
                angular_impulse_a += self.angular_a[idx] * impulses[idx];
                angular_impulse_b += self.angular_b[idx] * impulses[idx];
            }
        }
        (impulse, angular_impulse_a, angular_impulse_b)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::quantities::{Orientation, Velocity};
    use approx::assert_abs_diff_eq;
    use nalgebra::{Matrix3, point, vector};

    fn body_at(
        position: Position,
        velocity: Velocity,
        angular_velocity: Vector3<fph>,
    ) -> ConstrainedBody {
        ConstrainedBody {
            inverse_mass: 1.0,
            inverse_inertia_tensor: Matrix3::identity(),
            position,
            orientation: Orientation::identity(),
            velocity,
            angular_velocity,
        }
    }

    fn world() -> ConstrainedBody {
        ConstrainedBody::immovable(Position::origin(), Orientation::identity())
    }

    fn joint_to_world(kind: JointKind, body: &ConstrainedBody, frame: &Pose) -> JointConstraint {
        JointConstraint {
            kind,
            body_a: RigidBodyID(dummy_key()),
            body_b: None,
            local_frame_a: quantities::pose_from_parts(&body.position, &body.orientation).inverse()
                * frame,
            local_frame_b: *frame,
        }
    }

    fn dummy_key() -> ArenaKey {
        let mut arena = hydrosim_utils::Arena::new();
        arena.insert(())
    }

    fn solve(prepared: &PreparedJoint, body: &mut ConstrainedBody, world: &mut ConstrainedBody) {
        for _ in 0..4 {
            let impulses = prepared.compute_impulses(body, world);
            prepared.apply_impulses_to_body_pair(body, world, impulses);
        }
    }

    #[test]
    fn spherical_joint_stops_velocity_of_anchor() {
        let mut body = body_at(
            point![1.0, 0.0, 0.0],
            vector![0.0, 2.0, -1.0],
            vector![0.0, 0.0, 1.0],
        );
        let mut world = world();
        let joint = joint_to_world(JointKind::Spherical, &body, &Pose::identity());
        let prepared = joint.prepare(&body, &world);
        solve(&prepared, &mut body, &mut world);

        let anchor_velocity = body.velocity + body.angular_velocity.cross(&(-body.position.coords));
        assert_abs_diff_eq!(anchor_velocity, Vector3::zeros(), epsilon = 1e-9);
    }

    #[test]
    fn revolute_joint_only_permits_rotation_about_axis() {
        let mut body = body_at(Position::origin(), vector![1.0, 0.0, 0.0], vector![0.5, 0.5, 3.0]);
        let mut world = world();
        let joint = joint_to_world(JointKind::Revolute, &body, &Pose::identity());
        let prepared = joint.prepare(&body, &world);
        solve(&prepared, &mut body, &mut world);

        assert_abs_diff_eq!(body.velocity, Vector3::zeros(), epsilon = 1e-9);
        assert_abs_diff_eq!(body.angular_velocity, vector![0.0, 0.0, 3.0], epsilon = 1e-9);
    }

    #[test]
    fn prismatic_joint_only_permits_translation_along_axis() {
        let mut body = body_at(Position::origin(), vector![1.0, -1.0, 2.0], vector![0.1, 0.2, 0.3]);
        let mut world = world();
        let joint = joint_to_world(JointKind::Prismatic, &body, &Pose::identity());
        let prepared = joint.prepare(&body, &world);
        solve(&prepared, &mut body, &mut world);

        assert_abs_diff_eq!(body.velocity, vector![0.0, 0.0, 2.0], epsilon = 1e-9);
        assert_abs_diff_eq!(body.angular_velocity, Vector3::zeros(), epsilon = 1e-9);
    }

    #[test]
    fn fixed_joint_corrects_drifted_configuration() {
        let mut body = body_at(Position::origin(), Vector3::zeros(), Vector3::zeros());
        let mut world = world();
        let joint = joint_to_world(JointKind::Fixed, &body, &Pose::identity());

        body.position = point![0.1, -0.05, 0.02];
        body.orientation = Orientation::from_axis_angle(&Vector3::y_axis(), 0.1);

        let prepared = joint.prepare(&body, &world);
        for _ in 0..50 {
            prepared.apply_positional_correction_to_body_pair(&mut body, &mut world, 0.5);
        }
        assert_abs_diff_eq!(body.position, Position::origin(), epsilon = 1e-6);
        assert_abs_diff_eq!(body.orientation.angle(), 0.0, epsilon = 1e-6);
    }
}
