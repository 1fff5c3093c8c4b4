//! The physics world: rigid bodies, multibodies, collisions and
//! constraints advanced together in fixed steps.

pub mod collision;
pub mod constraint;
mod multibody;
mod rigid_body;

pub use constraint::{
    contact::{ContactImpulses, ContactResponseParameters},
    joint::{JointConstraint, JointID, JointKind},
    solver::{ConstraintSolverConfig, ConstraintSolverType},
};
pub use multibody::{LinkJoint, LinkJointKind, LinkState, Multibody, MultibodyID, MultibodyLink};
pub use rigid_body::{RigidBody, RigidBodyID, RigidBodyKind};

use crate::{
    fph,
    quantities::{AngularVelocity, Position, Velocity},
};
use collision::PlacedShape;
use constraint::{contact::ContactManifold, solver::ConstraintSolver};
use hydrosim_utils::Arena;
use nalgebra::UnitVector3;

/// All rigid bodies and multibodies of a world.
#[derive(Clone, Debug, Default)]
pub struct BodySet {
    rigid_bodies: Arena<RigidBody>,
    multibodies: Arena<Multibody>,
}

/// The contacts found between two rigid bodies in the last step, with the
/// response the solver gave them.
#[derive(Clone, Debug, PartialEq)]
pub struct CollisionRecord {
    pub body_a: RigidBodyID,
    pub body_b: RigidBodyID,
    pub contacts: Vec<ContactRecord>,
}

/// A single resolved contact point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContactRecord {
    pub position_on_a: Position,
    pub position_on_b: Position,
    /// Surface normal of body B, pointing towards body A.
    pub normal: UnitVector3<fph>,
    pub penetration_depth: fph,
    /// Normal impulse applied by the solver during the step.
    pub normal_impulse: fph,
    /// Normal force averaged over the step.
    pub normal_force: fph,
    /// Tangential velocity of A relative to B at the contact after the
    /// solve.
    pub slip_velocity: Velocity,
}

/// Hooks through which the owner of a world takes part in each step.
pub trait TickCallbacks {
    /// Called at the start of the step, before collision detection. This is
    /// where external forces are applied.
    fn pre_tick(&mut self, bodies: &mut BodySet, step_duration: fph);

    /// Called at the end of the step with the collisions it resolved.
    fn post_tick(&mut self, bodies: &BodySet, collisions: &[CollisionRecord], step_duration: fph);

    /// Whether contacts between the two bodies should be generated.
    fn needs_collision(&self, _body_a: RigidBodyID, _body_b: RigidBodyID) -> bool {
        true
    }

    /// Determines the contact response between the two bodies from their
    /// materials.
    fn combine_materials(
        &self,
        _body_a: RigidBodyID,
        _body_b: RigidBodyID,
    ) -> ContactResponseParameters {
        ContactResponseParameters::default()
    }
}

/// A physics world that can be stepped and populated.
pub trait DynamicsWorld {
    /// Advances the world by one step of the given duration, calling the
    /// given hooks before and after.
    fn step_simulation(&mut self, step_duration: fph, callbacks: &mut dyn TickCallbacks);

    fn add_rigid_body(&mut self, body: RigidBody) -> RigidBodyID;

    /// Removes the given body together with any joint involving it.
    fn remove_rigid_body(&mut self, id: RigidBodyID) -> Option<RigidBody>;

    fn add_multibody(&mut self, multibody: Multibody) -> MultibodyID;

    fn remove_multibody(&mut self, id: MultibodyID) -> Option<Multibody>;

    /// Adds the given joint.
    ///
    /// # Returns
    /// [`None`] if the joint refers to a missing body.
    fn add_joint(&mut self, joint: JointConstraint) -> Option<JointID>;

    fn remove_joint(&mut self, id: JointID) -> Option<JointConstraint>;

    /// Returns the collisions resolved in the last step.
    fn collision_manifolds(&self) -> &[CollisionRecord];

    fn bodies(&self) -> &BodySet;

    fn bodies_mut(&mut self) -> &mut BodySet;

    /// Removes all bodies, joints and cached solver state.
    fn clear(&mut self);
}

/// A [`DynamicsWorld`] resolving rigid body contacts and joints with an
/// impulse based constraint solver, and advancing multibodies in joint
/// coordinates.
#[derive(Debug)]
pub struct RigidBodyWorld {
    bodies: BodySet,
    joints: Arena<JointConstraint>,
    solver: ConstraintSolver,
    manifolds: Vec<(RigidBodyID, RigidBodyID, ContactManifold)>,
    collision_records: Vec<CollisionRecord>,
}

impl BodySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_rigid_body(&self, id: RigidBodyID) -> Option<&RigidBody> {
        self.rigid_bodies.get(id.0)
    }

    pub fn get_rigid_body_mut(&mut self, id: RigidBodyID) -> Option<&mut RigidBody> {
        self.rigid_bodies.get_mut(id.0)
    }

    /// Returns the rigid body with the given ID.
    ///
    /// # Panics
    /// If no rigid body has the ID.
    pub fn rigid_body(&self, id: RigidBodyID) -> &RigidBody {
        self.get_rigid_body(id)
            .expect("Requested missing rigid body")
    }

    /// Returns the rigid body with the given ID mutably.
    ///
    /// # Panics
    /// If no rigid body has the ID.
    pub fn rigid_body_mut(&mut self, id: RigidBodyID) -> &mut RigidBody {
        self.get_rigid_body_mut(id)
            .expect("Requested missing rigid body")
    }

    pub fn get_multibody(&self, id: MultibodyID) -> Option<&Multibody> {
        self.multibodies.get(id.0)
    }

    pub fn get_multibody_mut(&mut self, id: MultibodyID) -> Option<&mut Multibody> {
        self.multibodies.get_mut(id.0)
    }

    /// Returns the multibody with the given ID.
    ///
    /// # Panics
    /// If no multibody has the ID.
    pub fn multibody(&self, id: MultibodyID) -> &Multibody {
        self.get_multibody(id)
            .expect("Requested missing multibody")
    }

    /// Returns the multibody with the given ID mutably.
    ///
    /// # Panics
    /// If no multibody has the ID.
    pub fn multibody_mut(&mut self, id: MultibodyID) -> &mut Multibody {
        self.get_multibody_mut(id)
            .expect("Requested missing multibody")
    }

    pub fn n_rigid_bodies(&self) -> usize {
        self.rigid_bodies.len()
    }

    pub fn n_multibodies(&self) -> usize {
        self.multibodies.len()
    }

    /// Iterates over the rigid bodies in insertion slot order.
    pub fn rigid_bodies(&self) -> impl Iterator<Item = (RigidBodyID, &RigidBody)> {
        self.rigid_bodies
            .iter()
            .map(|(key, body)| (RigidBodyID(key), body))
    }

    pub fn rigid_bodies_mut(&mut self) -> impl Iterator<Item = (RigidBodyID, &mut RigidBody)> {
        self.rigid_bodies
            .iter_mut()
            .map(|(key, body)| (RigidBodyID(key), body))
    }

    /// Iterates over the multibodies in insertion slot order.
    pub fn multibodies(&self) -> impl Iterator<Item = (MultibodyID, &Multibody)> {
        self.multibodies
            .iter()
            .map(|(key, multibody)| (MultibodyID(key), multibody))
    }

    pub fn multibodies_mut(&mut self) -> impl Iterator<Item = (MultibodyID, &mut Multibody)> {
        self.multibodies
            .iter_mut()
            .map(|(key, multibody)| (MultibodyID(key), multibody))
    }

    /// Sets the linear and angular velocity of every dynamic rigid body and
    /// every multibody joint to zero.
    pub fn zero_velocities(&mut self) {
        for body in self.rigid_bodies.values_mut() {
            body.synchronize_momentum(&Velocity::zeros());
            body.synchronize_angular_momentum(&AngularVelocity::zeros());
        }
        for multibody in self.multibodies.values_mut() {
            multibody.zero_joint_velocities();
        }
    }

    fn advance_rigid_body_momenta(&mut self, step_duration: fph) {
        for body in self.rigid_bodies.values_mut() {
            body.advance_momenta(step_duration);
        }
    }

    fn advance_rigid_body_configurations(&mut self, step_duration: fph) {
        for body in self.rigid_bodies.values_mut() {
            body.advance_configuration(step_duration);
        }
    }

    fn advance_multibodies(&mut self, step_duration: fph) {
        for multibody in self.multibodies.values_mut() {
            multibody.advance(step_duration);
        }
    }

    fn reset_forces(&mut self) {
        for body in self.rigid_bodies.values_mut() {
            body.reset_force_and_torque();
        }
        for multibody in self.multibodies.values_mut() {
            multibody.reset_forces();
        }
    }

    fn clear(&mut self) {
        self.rigid_bodies.clear();
        self.multibodies.clear();
    }
}

impl CollisionRecord {
    /// Returns the sum of the normal forces of all contacts.
    pub fn total_normal_force(&self) -> fph {
        self.contacts.iter().map(|contact| contact.normal_force).sum()
    }

    /// Whether the record is between the two given bodies, in either order.
    pub fn is_between(&self, body_a: RigidBodyID, body_b: RigidBodyID) -> bool {
        (self.body_a == body_a && self.body_b == body_b)
            || (self.body_a == body_b && self.body_b == body_a)
    }
}

impl RigidBodyWorld {
    /// Creates an empty world whose constraints are solved with the given
    /// solver type and configuration.
    pub fn new(solver_config: ConstraintSolverConfig, solver_type: ConstraintSolverType) -> Self {
        Self {
            bodies: BodySet::new(),
            joints: Arena::new(),
            solver: ConstraintSolver::new(solver_config, solver_type),
            manifolds: Vec::new(),
            collision_records: Vec::new(),
        }
    }

    pub fn solver(&self) -> &ConstraintSolver {
        &self.solver
    }

    pub fn solver_mut(&mut self) -> &mut ConstraintSolver {
        &mut self.solver
    }

    pub fn get_joint(&self, id: JointID) -> Option<&JointConstraint> {
        self.joints.get(id.0)
    }

    pub fn n_joints(&self) -> usize {
        self.joints.len()
    }

    /// Whether a joint connects the two given bodies.
    pub fn are_jointed(&self, body_a: RigidBodyID, body_b: RigidBodyID) -> bool {
        self.joints.values().any(|joint| {
            (joint.body_a() == body_a && joint.body_b() == Some(body_b))
                || (joint.body_a() == body_b && joint.body_b() == Some(body_a))
        })
    }

    /// Finds the contacts between every pair of rigid bodies that can
    /// collide and stores them in the manifold list.
    fn detect_collisions(&mut self, callbacks: &dyn TickCallbacks) {
        let placed_shapes: Vec<(PlacedShape<'_>, bool)> = self
            .bodies
            .rigid_bodies()
            .map(|(id, body)| {
                (
                    PlacedShape {
                        body: id,
                        shape: body.shape(),
                        pose: body.shape_pose(),
                    },
                    body.is_static(),
                )
            })
            .collect();

        let mut manifolds = std::mem::take(&mut self.manifolds);
        manifolds.clear();
        let mut manifold = ContactManifold::new();

        for (idx, (shape_a, a_is_static)) in placed_shapes.iter().enumerate() {
            for (shape_b, b_is_static) in &placed_shapes[idx + 1..] {
                if *a_is_static && *b_is_static {
                    continue;
                }
                if !callbacks.needs_collision(shape_a.body, shape_b.body)
                    || self.are_jointed(shape_a.body, shape_b.body)
                {
                    continue;
                }
                if !collision::bounding_volumes_overlap(shape_a, shape_b) {
                    continue;
                }
                manifold.clear();
                collision::detect_contacts(shape_a, shape_b, &mut manifold);
                if !manifold.is_empty() {
                    manifolds.push((shape_a.body, shape_b.body, manifold.clone()));
                }
            }
        }

        self.manifolds = manifolds;
    }

    fn prepare_constraints(&mut self, callbacks: &dyn TickCallbacks) {
        // Body states cached for the previous step are stale
        self.solver.clear_prepared_bodies();

        for (body_a, body_b, manifold) in &self.manifolds {
            let response_params = callbacks.combine_materials(*body_a, *body_b);
            for contact in manifold.contacts() {
                self.solver
                    .prepare_contact(&self.bodies, *body_a, *body_b, contact, response_params);
            }
        }

        for (key, joint) in self.joints.iter() {
            self.solver.prepare_joint(&self.bodies, JointID(key), joint);
        }

        self.solver.remove_unprepared_constraints();
    }

    fn solve_constraints(&mut self) {
        self.solver
            .synchronize_prepared_constrained_body_velocities(&self.bodies);
        self.solver.compute_constrained_velocities();
        self.solver.compute_corrected_configurations();
        self.solver
            .apply_constrained_velocities_and_corrected_configurations(&mut self.bodies);
    }

    fn record_collisions(&mut self, step_duration: fph) {
        self.collision_records.clear();

        for (body_a_id, body_b_id, manifold) in &self.manifolds {
            let (Some(body_a), Some(body_b)) = (
                self.bodies.get_rigid_body(*body_a_id),
                self.bodies.get_rigid_body(*body_b_id),
            ) else {
                continue;
            };

            let contacts = manifold
                .contacts()
                .iter()
                .map(|contact| {
                    let geometry = &contact.geometry;
                    let normal_impulse = self
                        .solver
                        .contact_impulses(contact.id)
                        .map_or(0.0, |impulses| impulses.normal);

                    let relative_velocity = body_a
                        .compute_velocity_of_attached_world_space_point(&geometry.position)
                        - body_b.compute_velocity_of_attached_world_space_point(&geometry.position);
                    let normal = geometry.surface_normal;
                    let slip_velocity = relative_velocity
                        - normal.into_inner() * relative_velocity.dot(normal.as_ref());

                    ContactRecord {
                        position_on_a: geometry.position_on_a(),
                        position_on_b: geometry.position_on_b(),
                        normal,
                        penetration_depth: geometry.penetration_depth,
                        normal_impulse,
                        normal_force: normal_impulse / step_duration,
                        slip_velocity,
                    }
                })
                .collect();

            self.collision_records.push(CollisionRecord {
                body_a: *body_a_id,
                body_b: *body_b_id,
                contacts,
            });
        }
    }
}

impl Default for RigidBodyWorld {
    fn default() -> Self {
        Self::new(
            ConstraintSolverConfig::default(),
            ConstraintSolverType::default(),
        )
    }
}

impl DynamicsWorld for RigidBodyWorld {
    fn step_simulation(&mut self, step_duration: fph, callbacks: &mut dyn TickCallbacks) {
        callbacks.pre_tick(&mut self.bodies, step_duration);

        let solve = self.solver.config().enabled;

        hydrosim_utils::with_trace_logging!("Detecting collisions"; {
            self.detect_collisions(callbacks);
        });
        if solve {
            self.prepare_constraints(callbacks);
        }

        self.bodies.advance_rigid_body_momenta(step_duration);

        if solve {
            hydrosim_utils::with_trace_logging!("Solving constraints"; {
                self.solve_constraints();
            });
        }

        self.bodies.advance_rigid_body_configurations(step_duration);
        self.bodies.advance_multibodies(step_duration);
        self.bodies.reset_forces();

        self.record_collisions(step_duration);

        log::debug!(
            "Solved {} contacts and {} joints between {} bodies",
            self.solver.prepared_contact_count(),
            self.solver.prepared_joint_count(),
            self.solver.prepared_body_count()
        );

        callbacks.post_tick(&self.bodies, &self.collision_records, step_duration);
    }

    fn add_rigid_body(&mut self, body: RigidBody) -> RigidBodyID {
        RigidBodyID(self.bodies.rigid_bodies.insert(body))
    }

    fn remove_rigid_body(&mut self, id: RigidBodyID) -> Option<RigidBody> {
        let body = self.bodies.rigid_bodies.remove(id.0)?;

        let orphaned_joints: Vec<_> = self
            .joints
            .iter()
            .filter(|(_, joint)| joint.involves(id))
            .map(|(key, _)| key)
            .collect();
        for key in orphaned_joints {
            log::debug!("Removing joint attached to removed rigid body");
            self.joints.remove(key);
        }

        self.manifolds
            .retain(|(body_a, body_b, _)| *body_a != id && *body_b != id);
        self.collision_records
            .retain(|record| record.body_a != id && record.body_b != id);

        Some(body)
    }

    fn add_multibody(&mut self, multibody: Multibody) -> MultibodyID {
        MultibodyID(self.bodies.multibodies.insert(multibody))
    }

    fn remove_multibody(&mut self, id: MultibodyID) -> Option<Multibody> {
        self.bodies.multibodies.remove(id.0)
    }

    fn add_joint(&mut self, joint: JointConstraint) -> Option<JointID> {
        if self.bodies.get_rigid_body(joint.body_a()).is_none() {
            return None;
        }
        if let Some(body_b) = joint.body_b() {
            self.bodies.get_rigid_body(body_b)?;
        }
        Some(JointID(self.joints.insert(joint)))
    }

    fn remove_joint(&mut self, id: JointID) -> Option<JointConstraint> {
        self.joints.remove(id.0)
    }

    fn collision_manifolds(&self) -> &[CollisionRecord] {
        &self.collision_records
    }

    fn bodies(&self) -> &BodySet {
        &self.bodies
    }

    fn bodies_mut(&mut self) -> &mut BodySet {
        &mut self.bodies
    }

    fn clear(&mut self) {
        self.bodies.clear();
        self.joints.clear();
        self.solver.clear();
        self.manifolds.clear();
        self.collision_records.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{geometry::Shape, quantities::Pose};
    use approx::assert_abs_diff_eq;
    use nalgebra::{Vector3, vector};

    const GRAVITY: fph = 9.81;
    const DT: fph = 1e-3;

    #[derive(Default)]
    struct Gravity {
        disabled_pairs: Vec<(RigidBodyID, RigidBodyID)>,
        post_tick_count: usize,
        max_record_count: usize,
    }

    impl TickCallbacks for Gravity {
        fn pre_tick(&mut self, bodies: &mut BodySet, _step_duration: fph) {
            for (_, body) in bodies.rigid_bodies_mut() {
                if !body.is_static() {
                    let force = vector![0.0, 0.0, -GRAVITY * body.mass()];
                    body.apply_force_at_center_of_mass(&force);
                }
            }
        }

        fn post_tick(&mut self, _bodies: &BodySet, collisions: &[CollisionRecord], _dt: fph) {
            self.post_tick_count += 1;
            self.max_record_count = self.max_record_count.max(collisions.len());
        }

        fn needs_collision(&self, body_a: RigidBodyID, body_b: RigidBodyID) -> bool {
            !self
                .disabled_pairs
                .iter()
                .any(|&(a, b)| (a == body_a && b == body_b) || (a == body_b && b == body_a))
        }
    }

    fn sphere(world: &mut RigidBodyWorld, x: fph, z: fph) -> RigidBodyID {
        let shape = Shape::Sphere { radius: 0.5 };
        let inertial_properties = shape.inertial_properties(1000.0).unwrap();
        world.add_rigid_body(RigidBody::new_dynamic(
            shape,
            &inertial_properties,
            &Pose::translation(x, 0.0, z),
            Vector3::zeros(),
            Vector3::zeros(),
        ))
    }

    fn ground(world: &mut RigidBodyWorld) -> RigidBodyID {
        world.add_rigid_body(RigidBody::new_static(Shape::Plane, &Pose::identity()))
    }

    fn run(world: &mut RigidBodyWorld, callbacks: &mut Gravity, n_steps: usize) {
        for _ in 0..n_steps {
            world.step_simulation(DT, callbacks);
        }
    }

    #[test]
    fn sphere_comes_to_rest_on_ground() {
        let mut world = RigidBodyWorld::default();
        let plane = ground(&mut world);
        let ball = sphere(&mut world, 0.0, 1.0);
        let mut callbacks = Gravity::default();

        run(&mut world, &mut callbacks, 3000);

        let body = world.bodies().rigid_body(ball);
        assert_abs_diff_eq!(body.position().z, 0.5, epsilon = 1e-2);
        assert_abs_diff_eq!(body.compute_velocity(), Vector3::zeros(), epsilon = 1e-2);

        let records = world.collision_manifolds();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_between(plane, ball));
        let weight = GRAVITY * body.mass();
        assert_abs_diff_eq!(records[0].total_normal_force(), weight, epsilon = 0.05 * weight);
    }

    #[test]
    fn every_step_calls_post_tick() {
        let mut world = RigidBodyWorld::default();
        sphere(&mut world, 0.0, 1.0);
        let mut callbacks = Gravity::default();
        run(&mut world, &mut callbacks, 17);
        assert_eq!(callbacks.post_tick_count, 17);
    }

    #[test]
    fn disabled_pair_passes_through() {
        let mut world = RigidBodyWorld::default();
        let plane = ground(&mut world);
        let ball = sphere(&mut world, 0.0, 1.0);
        let mut callbacks = Gravity {
            disabled_pairs: vec![(ball, plane)],
            ..Default::default()
        };

        run(&mut world, &mut callbacks, 1000);

        assert!(world.bodies().rigid_body(ball).position().z < 0.0);
        assert_eq!(callbacks.max_record_count, 0);
    }

    #[test]
    fn static_bodies_never_collide_with_each_other() {
        let mut world = RigidBodyWorld::default();
        ground(&mut world);
        world.add_rigid_body(RigidBody::new_static(
            Shape::Sphere { radius: 1.0 },
            &Pose::identity(),
        ));
        let mut callbacks = Gravity::default();
        run(&mut world, &mut callbacks, 5);
        assert!(world.collision_manifolds().is_empty());
    }

    #[test]
    fn identical_worlds_evolve_identically() {
        let build = || {
            let mut world = RigidBodyWorld::default();
            ground(&mut world);
            let a = sphere(&mut world, 0.0, 1.0);
            let b = sphere(&mut world, 0.3, 2.2);
            (world, a, b)
        };
        let (mut world_1, a_1, b_1) = build();
        let (mut world_2, a_2, b_2) = build();
        run(&mut world_1, &mut Gravity::default(), 1500);
        run(&mut world_2, &mut Gravity::default(), 1500);

        for (id_1, id_2) in [(a_1, a_2), (b_1, b_2)] {
            let body_1 = world_1.bodies().rigid_body(id_1);
            let body_2 = world_2.bodies().rigid_body(id_2);
            assert_eq!(body_1.position(), body_2.position());
            assert_eq!(body_1.orientation(), body_2.orientation());
            assert_eq!(body_1.momentum(), body_2.momentum());
        }
    }

    #[test]
    fn spherical_joint_keeps_body_at_fixed_distance_from_anchor() {
        let mut world = RigidBodyWorld::default();
        let ball = sphere(&mut world, 1.0, 0.0);
        let joint = JointConstraint::new(
            JointKind::Spherical,
            (ball, world.bodies().rigid_body(ball)),
            None,
            &Pose::identity(),
        );
        world.add_joint(joint).unwrap();

        run(&mut world, &mut Gravity::default(), 500);

        let distance = world.bodies().rigid_body(ball).position().coords.norm();
        assert_abs_diff_eq!(distance, 1.0, epsilon = 2e-2);
        assert!(world.bodies().rigid_body(ball).position().z < -0.1);
    }

    #[test]
    fn jointed_bodies_do_not_collide() {
        let mut world = RigidBodyWorld::default();
        let a = sphere(&mut world, 0.0, 5.0);
        let b = sphere(&mut world, 0.6, 5.0);
        let joint = JointConstraint::new(
            JointKind::Fixed,
            (a, world.bodies().rigid_body(a)),
            Some((b, world.bodies().rigid_body(b))),
            &Pose::translation(0.3, 0.0, 5.0),
        );
        world.add_joint(joint).unwrap();
        let mut callbacks = Gravity::default();
        run(&mut world, &mut callbacks, 10);
        assert_eq!(callbacks.max_record_count, 0);
    }

    #[test]
    fn removing_body_removes_its_joints() {
        let mut world = RigidBodyWorld::default();
        let a = sphere(&mut world, 0.0, 5.0);
        let b = sphere(&mut world, 2.0, 5.0);
        let joint = JointConstraint::new(
            JointKind::Spherical,
            (a, world.bodies().rigid_body(a)),
            Some((b, world.bodies().rigid_body(b))),
            &Pose::translation(1.0, 0.0, 5.0),
        );
        let joint_id = world.add_joint(joint).unwrap();

        assert!(world.remove_rigid_body(b).is_some());
        assert!(world.get_joint(joint_id).is_none());
        assert!(world.remove_rigid_body(b).is_none());
        assert_eq!(world.bodies().n_rigid_bodies(), 1);
    }

    #[test]
    fn joint_to_missing_body_is_rejected() {
        let mut world = RigidBodyWorld::default();
        let a = sphere(&mut world, 0.0, 5.0);
        let joint = JointConstraint::new(
            JointKind::Spherical,
            (a, world.bodies().rigid_body(a)),
            None,
            &Pose::identity(),
        );
        world.remove_rigid_body(a);
        assert!(world.add_joint(joint).is_none());
    }

    #[test]
    fn multibody_advances_with_world() {
        let mut world = RigidBodyWorld::default();
        let mut multibody = Multibody::new(Pose::identity());
        let inertial_properties = Shape::Sphere { radius: 0.1 }
            .inertial_properties(1000.0)
            .unwrap();
        multibody
            .add_link(MultibodyLink::new(
                None,
                LinkJoint::prismatic(Pose::identity(), Vector3::z_axis()),
                &inertial_properties,
                None,
            ))
            .unwrap();
        let id = world.add_multibody(multibody);

        struct LinkGravity(MultibodyID);
        impl TickCallbacks for LinkGravity {
            fn pre_tick(&mut self, bodies: &mut BodySet, _dt: fph) {
                let multibody = bodies.multibody_mut(self.0);
                let force = vector![0.0, 0.0, -GRAVITY * multibody.link(0).mass()];
                multibody.apply_link_force_at_center_of_mass(0, &force);
            }
            fn post_tick(&mut self, _bodies: &BodySet, _collisions: &[CollisionRecord], _dt: fph) {}
        }

        let mut callbacks = LinkGravity(id);
        for _ in 0..100 {
            world.step_simulation(DT, &mut callbacks);
        }
        assert_abs_diff_eq!(
            world.bodies().multibody(id).link(0).joint_velocity(),
            -GRAVITY * 0.1,
            epsilon = 1e-9
        );
    }

    #[test]
    fn clearing_empties_world() {
        let mut world = RigidBodyWorld::default();
        ground(&mut world);
        sphere(&mut world, 0.0, 0.4);
        run(&mut world, &mut Gravity::default(), 2);
        world.clear();
        assert_eq!(world.bodies().n_rigid_bodies(), 0);
        assert!(world.collision_manifolds().is_empty());
        assert_eq!(world.solver().prepared_contact_count(), 0);
    }
}
