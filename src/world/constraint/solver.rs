//! Constraint solving based on the sequential impulse method.

use super::{
    ConstrainedBody, PreparedTwoBodyConstraint, TwoBodyConstraint,
    contact::{
        Contact, ContactID, ContactImpulses, ContactResponseParameters, ContactWithID,
        PreparedContact,
    },
    joint::{JointConstraint, JointID, PreparedJoint},
};
use crate::{
    fph,
    quantities::{Orientation, Position},
    world::{BodySet, RigidBodyID},
};
use bitflags::bitflags;
use hydrosim_utils::KeyIndexMapper;
use num_traits::Zero;
use std::{
    fmt,
    hash::Hash,
    ops::{Deref, DerefMut},
};

/// The algorithm used for solving the velocity constraints.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConstraintSolverType {
    /// Sequential impulses with warm starting.
    #[default]
    SequentialImpulse,
    /// Direct pivoting solver. Solved with sequential impulses.
    Dantzig,
    /// Projected Gauss-Seidel without warm starting.
    ProjectedGaussSeidel,
    /// Complementary pivoting solver. Solved with sequential impulses.
    Lemke,
    /// Nonsmooth nonlinear conjugate gradient: sequential impulses
    /// accelerated with a conjugate gradient momentum term.
    Nncg,
}

/// A Sequential Impulse constraint solver.
#[derive(Clone, Debug)]
pub struct ConstraintSolver {
    bodies: Vec<ConstrainedBody>,
    /// Maps each prepared body to its index. [`None`] is the world.
    body_index_map: KeyIndexMapper<Option<RigidBodyID>>,
    contacts: ConstraintCache<ContactID, PreparedContact>,
    joints: ConstraintCache<JointID, PreparedJoint>,
    config: ConstraintSolverConfig,
    method: SolverMethod,
}

/// Configuration parameters for the [`ConstraintSolver`].
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
#[derive(Clone, Debug, PartialEq)]
pub struct ConstraintSolverConfig {
    /// Whether constraints will be solved.
    pub enabled: bool,
    /// The number of iterations to perform for solving the velocity
    /// constraints.
    pub n_iterations: u32,
    /// How to scale the still-valid accumulated impulses from the previous
    /// step before using them as the initial impulses for the current step.
    /// Set to zero to disable warm starting.
    pub old_impulse_weight: fph,
    /// The number of iterations to use for positional correction after the
    /// velocity constraints have been solved.
    pub n_positional_correction_iterations: u32,
    /// The fraction of the current positional error the solver should try to
    /// correct.
    pub positional_correction_factor: fph,
    /// Approach speeds below this give fully inelastic contacts [m/s].
    pub restitution_threshold: fph,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum SolverMethod {
    SequentialImpulse { warm_start: bool },
    ConjugateGradient,
}

/// Container for constraints of a specific type that manages their lifetime
/// over multiple steps.
#[derive(Clone, Debug)]
struct ConstraintCache<K, C: PreparedTwoBodyConstraint> {
    constraints: Vec<BodyPairConstraint<C>>,
    constraint_index_map: KeyIndexMapper<K>,
}

/// Wrapper for an arbitrary two-body constraint that tracks the indices of
/// the involved [`ConstrainedBody`]s and the current accumulated impulses.
#[derive(Clone, Debug)]
struct BodyPairConstraint<C: PreparedTwoBodyConstraint> {
    body_a_idx: usize,
    body_b_idx: usize,
    constraint: C,
    accumulated_impulses: C::Impulses,
    /// Change in accumulated impulses from the latest sweep.
    last_change: C::Impulses,
    /// Search direction for the conjugate gradient solver.
    search_direction: C::Impulses,
    flags: ConstraintFlags,
}

bitflags! {
    #[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
    struct ConstraintFlags: u8 {
        /// Whether this constraint was prepared for use in the current step.
        const WAS_PREPARED = 1 << 0;
    }
}

impl ConstraintSolverType {
    fn method(self) -> SolverMethod {
        match self {
            Self::SequentialImpulse => SolverMethod::SequentialImpulse { warm_start: true },
            Self::ProjectedGaussSeidel => SolverMethod::SequentialImpulse { warm_start: false },
            Self::Nncg => SolverMethod::ConjugateGradient,
            Self::Dantzig | Self::Lemke => {
                log::warn!(
                    "Constraint solver type {self:?} is not available, using sequential impulses"
                );
                SolverMethod::SequentialImpulse { warm_start: true }
            }
        }
    }
}

impl ConstraintSolver {
    /// Creates a new constraint solver of the given type with the given
    /// configuration parameters.
    pub fn new(config: ConstraintSolverConfig, solver_type: ConstraintSolverType) -> Self {
        Self {
            bodies: Vec::new(),
            body_index_map: KeyIndexMapper::new(),
            contacts: ConstraintCache::new(),
            joints: ConstraintCache::new(),
            config,
            method: solver_type.method(),
        }
    }

    pub fn prepared_contact_count(&self) -> usize {
        self.contacts.constraints().len()
    }

    pub fn prepared_joint_count(&self) -> usize {
        self.joints.constraints().len()
    }

    pub fn prepared_body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn config(&self) -> &ConstraintSolverConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ConstraintSolverConfig {
        &mut self.config
    }

    /// Returns the accumulated impulses of the given contact from the last
    /// solve, if the contact was part of it.
    pub fn contact_impulses(&self, id: ContactID) -> Option<ContactImpulses> {
        self.contacts.accumulated_impulses(id)
    }

    /// Prepares the given contact between the given bodies for solution. The
    /// states of the involved bodies are fetched and cached.
    pub fn prepare_contact(
        &mut self,
        bodies: &BodySet,
        body_a_id: RigidBodyID,
        body_b_id: RigidBodyID,
        contact: &ContactWithID,
        response_params: ContactResponseParameters,
    ) {
        let contact_constraint = Contact {
            geometry: contact.geometry,
            response_params,
            restitution_threshold: self.config.restitution_threshold,
        };
        if let Some(prepared_contact) = self.prepare_constraint_for_body_pair(
            bodies,
            Some(body_a_id),
            Some(body_b_id),
            &contact_constraint,
        ) {
            self.contacts.register_prepared_constraint(
                contact.id,
                prepared_contact,
                self.warm_impulse_weight(),
            );
        }
    }

    /// Prepares the given joint for solution. The states of the involved
    /// bodies are fetched and cached.
    pub fn prepare_joint(&mut self, bodies: &BodySet, id: JointID, joint: &JointConstraint) {
        if let Some(prepared_joint) = self.prepare_constraint_for_body_pair(
            bodies,
            Some(joint.body_a()),
            joint.body_b(),
            joint,
        ) {
            self.joints
                .register_prepared_constraint(id, prepared_joint, self.warm_impulse_weight());
        }
    }

    /// Removes any constraints cached from the previous solve that have not
    /// been prepared again. Must be called after preparing all active
    /// constraints and before [`Self::compute_constrained_velocities`].
    pub fn remove_unprepared_constraints(&mut self) {
        self.contacts.remove_unprepared_constraints_and_reset_flags();
        self.joints.remove_unprepared_constraints_and_reset_flags();
    }

    /// Updates the velocities of all prepared bodies to match those of the
    /// bodies in the given set. Called after advancing the velocities (but
    /// not configurations) with the external forces.
    pub fn synchronize_prepared_constrained_body_velocities(&mut self, bodies: &BodySet) {
        for (body_id, constrained_body) in
            self.body_index_map.key_at_each_idx().zip(&mut self.bodies)
        {
            let Some(body) = body_id.and_then(|id| bodies.get_rigid_body(id)) else {
                continue;
            };
            constrained_body.velocity = body.compute_velocity();
            constrained_body.angular_velocity = body.compute_angular_velocity();
        }
    }

    /// Solves the prepared velocity constraints by repeatedly going through
    /// each constraint and applying the impulses that make the body
    /// velocities satisfy it in isolation.
    ///
    /// With warm starting, the final impulses of surviving constraints from
    /// the previous solve are applied before the iterations begin.
    pub fn compute_constrained_velocities(&mut self) {
        if !self.config.enabled {
            return;
        }
        apply_warm_impulses_for_body_pair_constraints(
            &mut self.bodies,
            self.contacts.constraints(),
        );
        apply_warm_impulses_for_body_pair_constraints(&mut self.bodies, self.joints.constraints());

        match self.method {
            SolverMethod::SequentialImpulse { .. } => {
                for _ in 0..self.config.n_iterations {
                    apply_impulses_sequentially_for_body_pair_constraints(
                        &mut self.bodies,
                        self.contacts.constraints_mut(),
                    );
                    apply_impulses_sequentially_for_body_pair_constraints(
                        &mut self.bodies,
                        self.joints.constraints_mut(),
                    );
                }
            }
            SolverMethod::ConjugateGradient => self.compute_constrained_velocities_with_momentum(),
        }
    }

    /// Sequential impulse iterations where each sweep is followed by a step
    /// along the previous sweep's impulse change, weighted by the
    /// Fletcher-Reeves ratio of successive squared impulse changes. The
    /// momentum is dropped whenever the ratio exceeds one.
    fn compute_constrained_velocities_with_momentum(&mut self) {
        self.contacts.reset_search_directions();
        self.joints.reset_search_directions();

        let mut previous_squared_change: fph = 0.0;

        for iteration in 0..self.config.n_iterations {
            let squared_change = apply_impulses_sequentially_for_body_pair_constraints(
                &mut self.bodies,
                self.contacts.constraints_mut(),
            ) + apply_impulses_sequentially_for_body_pair_constraints(
                &mut self.bodies,
                self.joints.constraints_mut(),
            );

            let beta = if iteration > 0 && previous_squared_change > fph::EPSILON {
                squared_change / previous_squared_change
            } else {
                0.0
            };
            let beta = if beta > 1.0 { 0.0 } else { beta };

            apply_momentum_for_body_pair_constraints(
                &mut self.bodies,
                self.contacts.constraints_mut(),
                beta,
            );
            apply_momentum_for_body_pair_constraints(
                &mut self.bodies,
                self.joints.constraints_mut(),
                beta,
            );

            previous_squared_change = squared_change;
        }
    }

    /// Corrects the configurations of the bodies by repeatedly going through
    /// each constraint and moving the involved bodies to reduce its positional
    /// error in isolation.
    pub fn compute_corrected_configurations(&mut self) {
        if !self.config.enabled {
            return;
        }
        for _ in 0..self.config.n_positional_correction_iterations {
            apply_positional_corrections_sequentially_for_body_pair_constraints(
                &mut self.bodies,
                self.contacts.constraints(),
                self.config.positional_correction_factor,
            );
            apply_positional_corrections_sequentially_for_body_pair_constraints(
                &mut self.bodies,
                self.joints.constraints(),
                self.config.positional_correction_factor,
            );
        }
    }

    /// Updates the velocities and configurations of the bodies in the given
    /// set to the solved ones.
    pub fn apply_constrained_velocities_and_corrected_configurations(&self, bodies: &mut BodySet) {
        for (body_id, constrained_body) in self.body_index_map.key_at_each_idx().zip(&self.bodies) {
            let Some(body) = body_id.and_then(|id| bodies.get_rigid_body_mut(id)) else {
                continue;
            };
            if body.is_static() {
                continue;
            }
            body.set_position(constrained_body.position);
            body.set_orientation(constrained_body.orientation);
            body.synchronize_momentum(&constrained_body.velocity);
            body.synchronize_angular_momentum(&constrained_body.angular_velocity);
        }
    }

    /// Clears all bodies cached from the previous solve. Must be called
    /// before preparing constraints for the next solve.
    pub fn clear_prepared_bodies(&mut self) {
        self.bodies.clear();
        self.body_index_map.clear();
    }

    /// Removes all stored constraint solver state.
    pub fn clear(&mut self) {
        self.clear_prepared_bodies();
        self.contacts.clear();
        self.joints.clear();
    }

    fn warm_impulse_weight(&self) -> fph {
        match self.method {
            SolverMethod::SequentialImpulse { warm_start: false } => 0.0,
            _ => self.config.old_impulse_weight,
        }
    }

    fn prepare_constraint_for_body_pair<C: TwoBodyConstraint>(
        &mut self,
        bodies: &BodySet,
        body_a_id: Option<RigidBodyID>,
        body_b_id: Option<RigidBodyID>,
        constraint: &C,
    ) -> Option<BodyPairConstraint<C::Prepared>> {
        let body_a_idx = self.prepare_body(bodies, body_a_id)?;
        let body_b_idx = self.prepare_body(bodies, body_b_id)?;
        if body_a_idx == body_b_idx {
            return None;
        }

        let prepared_constraint =
            constraint.prepare(&self.bodies[body_a_idx], &self.bodies[body_b_idx]);

        Some(BodyPairConstraint {
            body_a_idx,
            body_b_idx,
            constraint: prepared_constraint,
            accumulated_impulses: Zero::zero(),
            last_change: Zero::zero(),
            search_direction: Zero::zero(),
            flags: ConstraintFlags::WAS_PREPARED,
        })
    }

    fn prepare_body(&mut self, bodies: &BodySet, body_id: Option<RigidBodyID>) -> Option<usize> {
        if let Some(body_idx) = self.body_index_map.get(body_id) {
            return Some(body_idx);
        }

        let constrained_body = match body_id {
            Some(id) => ConstrainedBody::from_rigid_body(bodies.get_rigid_body(id)?),
            None => ConstrainedBody::immovable(Position::origin(), Orientation::identity()),
        };

        let body_idx = self.bodies.len();
        self.bodies.push(constrained_body);
        self.body_index_map.push_key(body_id);

        Some(body_idx)
    }
}

impl Default for ConstraintSolverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            n_iterations: 8,
            old_impulse_weight: 0.4,
            n_positional_correction_iterations: 3,
            positional_correction_factor: 0.2,
            restitution_threshold: 0.2,
        }
    }
}

impl ConstraintSolverConfig {
    /// Checks that the parameters are usable.
    ///
    /// # Errors
    /// Returns an error if a weight or factor is outside `[0, 1]` or the
    /// restitution threshold is negative.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&self.old_impulse_weight) {
            anyhow::bail!("Invalid old impulse weight: {}", self.old_impulse_weight);
        }
        if !(0.0..=1.0).contains(&self.positional_correction_factor) {
            anyhow::bail!(
                "Invalid positional correction factor: {}",
                self.positional_correction_factor
            );
        }
        if !(self.restitution_threshold >= 0.0) {
            anyhow::bail!("Invalid restitution threshold: {}", self.restitution_threshold);
        }
        Ok(())
    }
}

impl<K, C> ConstraintCache<K, C>
where
    K: fmt::Debug + Copy + Eq + Hash,
    C: PreparedTwoBodyConstraint,
{
    fn new() -> Self {
        Self {
            constraints: Vec::new(),
            constraint_index_map: KeyIndexMapper::new(),
        }
    }

    fn constraints(&self) -> &[BodyPairConstraint<C>] {
        &self.constraints
    }

    fn constraints_mut(&mut self) -> &mut [BodyPairConstraint<C>] {
        &mut self.constraints
    }

    fn accumulated_impulses(&self, key: K) -> Option<C::Impulses> {
        self.constraint_index_map
            .get(key)
            .map(|idx| self.constraints[idx].accumulated_impulses)
    }

    fn register_prepared_constraint(
        &mut self,
        key: K,
        prepared_constraint: BodyPairConstraint<C>,
        old_impulse_weight: fph,
    ) {
        if let Some(idx) = self.constraint_index_map.get(key) {
            // We know this constraint from the previous solve. If the
            // geometry has not changed much, the old impulses are likely
            // close to the solution and are used as the initial guess, with a
            // weight to mitigate overshoot.
            let old_constraint = &self.constraints[idx];
            let warm_impulses = if prepared_constraint.can_use_warm_impulses_from(old_constraint) {
                old_constraint.accumulated_impulses * old_impulse_weight
            } else {
                Zero::zero()
            };
            self.constraints[idx] = prepared_constraint.with_accumulated_impulses(warm_impulses);
        } else {
            self.constraints.push(prepared_constraint);
            self.constraint_index_map.push_key(key);
        }
    }

    fn remove_unprepared_constraints_and_reset_flags(&mut self) {
        let mut idx = 0;
        let mut len = self.constraints.len();
        while idx < len {
            let constraint = &mut self.constraints[idx];
            if constraint.flags.contains(ConstraintFlags::WAS_PREPARED) {
                constraint.flags.remove(ConstraintFlags::WAS_PREPARED);
                idx += 1;
            } else {
                self.constraints.swap_remove(idx);
                self.constraint_index_map.swap_remove_key_at_idx(idx);
                len -= 1;
            }
        }
    }

    fn reset_search_directions(&mut self) {
        for constraint in &mut self.constraints {
            constraint.last_change = Zero::zero();
            constraint.search_direction = Zero::zero();
        }
    }

    fn clear(&mut self) {
        self.constraints.clear();
        self.constraint_index_map.clear();
    }
}

impl<C: PreparedTwoBodyConstraint> BodyPairConstraint<C> {
    fn with_accumulated_impulses(mut self, accumulated_impulses: C::Impulses) -> Self {
        self.accumulated_impulses = accumulated_impulses;
        self
    }
}

impl<C: PreparedTwoBodyConstraint> Deref for BodyPairConstraint<C> {
    type Target = C;

    fn deref(&self) -> &Self::Target {
        &self.constraint
    }
}

impl<C: PreparedTwoBodyConstraint> DerefMut for BodyPairConstraint<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.constraint
    }
}

fn apply_warm_impulses_for_body_pair_constraints<P: PreparedTwoBodyConstraint>(
    bodies: &mut [ConstrainedBody],
    constraints: &[BodyPairConstraint<P>],
) {
    for constraint in constraints {
        let (body_a, body_b) =
            two_mutable_elements(bodies, constraint.body_a_idx, constraint.body_b_idx);

        constraint.apply_impulses_to_body_pair(body_a, body_b, constraint.accumulated_impulses);
    }
}

/// Performs one sequential impulse sweep and returns the sum of the squared
/// magnitudes of the changes in accumulated impulses.
fn apply_impulses_sequentially_for_body_pair_constraints<P: PreparedTwoBodyConstraint>(
    bodies: &mut [ConstrainedBody],
    constraints: &mut [BodyPairConstraint<P>],
) -> fph {
    let mut squared_change = 0.0;

    for constraint in constraints {
        let (body_a, body_b) =
            two_mutable_elements(bodies, constraint.body_a_idx, constraint.body_b_idx);

        // The incremental impulses that would make the current velocities
        // satisfy the constraint as an equality constraint
        let corrective_impulses = constraint.compute_impulses(body_a, body_b);

        // The accumulated impulses are what must be applied to the velocities
        // before the solve, and clamping them turns the constraint into an
        // inequality constraint where needed
        let old_accumulated_impulses = constraint.accumulated_impulses;
        constraint.accumulated_impulses =
            constraint.clamp_impulses(constraint.accumulated_impulses + corrective_impulses);

        let clamped_corrective_impulses =
            constraint.accumulated_impulses - old_accumulated_impulses;

        constraint.apply_impulses_to_body_pair(body_a, body_b, clamped_corrective_impulses);

        squared_change += P::squared_impulse_magnitude(&clamped_corrective_impulses);
        constraint.last_change = clamped_corrective_impulses;
    }

    squared_change
}

/// Moves the accumulated impulses of each constraint along its previous
/// search direction scaled by `beta`, then makes the latest sweep's change
/// plus the applied momentum the new search direction.
fn apply_momentum_for_body_pair_constraints<P: PreparedTwoBodyConstraint>(
    bodies: &mut [ConstrainedBody],
    constraints: &mut [BodyPairConstraint<P>],
    beta: fph,
) {
    for constraint in constraints {
        let mut applied_impulses = P::Impulses::zero();

        if beta > 0.0 {
            let (body_a, body_b) =
                two_mutable_elements(bodies, constraint.body_a_idx, constraint.body_b_idx);

            let old_accumulated_impulses = constraint.accumulated_impulses;
            constraint.accumulated_impulses = constraint.clamp_impulses(
                constraint.accumulated_impulses + constraint.search_direction * beta,
            );
            applied_impulses = constraint.accumulated_impulses - old_accumulated_impulses;
            constraint.apply_impulses_to_body_pair(body_a, body_b, applied_impulses);
        }

        constraint.search_direction = constraint.last_change + applied_impulses;
    }
}

fn apply_positional_corrections_sequentially_for_body_pair_constraints<
    P: PreparedTwoBodyConstraint,
>(
    bodies: &mut [ConstrainedBody],
    constraints: &[BodyPairConstraint<P>],
    correction_factor: fph,
) {
    for constraint in constraints {
        let (body_a, body_b) =
            two_mutable_elements(bodies, constraint.body_a_idx, constraint.body_b_idx);

        constraint.apply_positional_correction_to_body_pair(body_a, body_b, correction_factor);
    }
}

fn two_mutable_elements<T>(values: &mut [T], idx_a: usize, idx_b: usize) -> (&mut T, &mut T) {
    assert_ne!(idx_a, idx_b);

    if idx_b > idx_a {
        let (left, right) = values.split_at_mut(idx_b);
        (&mut left[idx_a], &mut right[0])
    } else {
        let (left, right) = values.split_at_mut(idx_a);
        (&mut right[0], &mut left[idx_b])
    }
}
