//! Running scenarios: registration of everything a scenario contains and
//! fixed-step advancement of the world.

mod config;
mod filter;
mod ic;
mod state;

pub use config::{CollisionFilter, ICSolverConfig, SimulationConfig};
pub use filter::CollisionPairs;

use crate::{
    actuator::{Actuator, ActuatorIndex},
    contact::{Contact, ContactIndex, ContactTracker},
    controller::{Controller, ControllerIndex},
    entity::{
        Entity, EntityID, EntityRegistry, FeatherstoneEntity, ForcefieldEntity, SolidEntity,
        StaticEntity, SystemEntity,
    },
    fph,
    hydrodynamics::{CurrentProfile, FluidDomain, SolidKinematics},
    joint::{Joint, JointIndex},
    material::MaterialManager,
    quantities::{Force, Pose, Position, Torque},
    registry::Registry,
    rendering::{DrawingQueue, Renderable},
    scenarios::Scenario,
    sensor::{Sensor, SensorIndex},
    world::{BodySet, DynamicsWorld, RigidBodyWorld},
};
use anyhow::{Result, anyhow, bail};
use state::ScenarioState;
use std::{sync::Arc, time::Instant};

/// Owns the physics world and everything placed in it, and advances them
/// together in fixed steps.
///
/// Every registered item is referred to by the handle or index returned
/// when it was added. Names are made unique on registration by suffixing.
#[derive(Debug)]
pub struct SimulationManager<W: DynamicsWorld = RigidBodyWorld> {
    config: SimulationConfig,
    world: W,
    state: ScenarioState,
    drawing_queue: Arc<DrawingQueue>,
    renderables: Vec<Renderable>,
    running: bool,
    real_time_factor: fph,
}

impl SimulationManager<RigidBodyWorld> {
    /// Creates a manager for an empty [`RigidBodyWorld`] using the given
    /// configuration.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        let world = RigidBodyWorld::new(config.solver_config.clone(), config.solver);
        Self::with_world(config, world)
    }
}

impl<W: DynamicsWorld> SimulationManager<W> {
    /// Creates a manager running the given world.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn with_world(config: SimulationConfig, world: W) -> Result<Self> {
        config.validate()?;
        let state = ScenarioState::new(
            config.hydrodynamics.clone(),
            config.hydrodynamics_prescaler,
            config.gravity,
            CollisionPairs::new(config.collision_filter),
        );
        log::debug!(
            "Created simulation manager with {} steps per second",
            config.steps_per_second
        );
        Ok(Self {
            config,
            world,
            state,
            drawing_queue: Arc::new(DrawingQueue::new()),
            renderables: Vec::new(),
            running: true,
            real_time_factor: 0.0,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut W {
        &mut self.world
    }

    pub fn bodies(&self) -> &BodySet {
        self.world.bodies()
    }

    pub fn materials(&self) -> &MaterialManager {
        &self.state.materials
    }

    pub fn materials_mut(&mut self) -> &mut MaterialManager {
        &mut self.state.materials
    }

    /// Returns a handle to the queue receiving a snapshot of everything
    /// drawable after every step, for use from a render thread.
    pub fn drawing_queue(&self) -> Arc<DrawingQueue> {
        Arc::clone(&self.drawing_queue)
    }

    /// Returns the simulated time since the scenario started [s].
    pub fn simulation_time(&self) -> fph {
        self.state.time
    }

    /// Returns the number of steps taken since the scenario started,
    /// excluding those spent solving initial conditions.
    pub fn step_count(&self) -> u64 {
        self.state.step_count
    }

    /// Returns the ratio of simulated to wall clock time for the latest
    /// step.
    pub fn real_time_factor(&self) -> fph {
        self.real_time_factor
    }

    pub fn set_gravity_enabled(&mut self, enabled: bool) {
        self.state.gravity_enabled = enabled;
    }

    /// Builds the given scenario, destroying the current one first if there
    /// is one.
    ///
    /// # Errors
    /// Returns an error if the scenario cannot be built. Whatever was
    /// registered before the failure stays in place.
    pub fn build_scenario(&mut self, scenario: &dyn Scenario<W>) -> Result<()> {
        if !self.state.entities.is_empty() {
            self.destroy_scenario();
        }
        hydrosim_utils::with_timing_info_logging!("Building scenario {}", scenario.name(); {
            scenario.build(self)
        })?;
        log::info!(
            "Scenario {} has {} entities, {} joints, {} sensors, {} actuators and {} controllers",
            scenario.name(),
            self.state.entities.len(),
            self.state.joints.len(),
            self.state.sensors.len(),
            self.state.actuators.len(),
            self.state.controllers.len()
        );
        if self.config.drawing_enabled {
            self.publish_renderables();
        }
        Ok(())
    }

    /// Advances the simulation by one step and publishes a drawing snapshot
    /// if drawing is enabled.
    ///
    /// Returns `false` without stepping if the simulation is stopped.
    pub fn advance_simulation(&mut self) -> bool {
        if !self.running {
            return false;
        }
        let step_duration = self.config.step_duration();

        let start_time = Instant::now();
        self.world.step_simulation(step_duration, &mut self.state);
        let elapsed = start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.real_time_factor = step_duration / elapsed;
        }

        if self.config.drawing_enabled {
            self.publish_renderables();
        }
        true
    }

    /// Advances the simulation until the given duration of simulated time
    /// has passed or the simulation is stopped, and returns the number of
    /// steps taken.
    pub fn run_for(&mut self, duration: fph) -> u64 {
        let n_steps = (duration.max(0.0) * self.config.steps_per_second).round() as u64;
        let mut n_taken = 0;
        while n_taken < n_steps && self.advance_simulation() {
            n_taken += 1;
        }
        log::debug!(
            "Advanced {} of {} steps, simulation time is {:.3} s",
            n_taken,
            n_steps,
            self.state.time
        );
        n_taken
    }

    /// Makes subsequent calls to [`Self::advance_simulation`] do nothing.
    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn resume(&mut self) {
        self.running = true;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    fn publish_renderables(&mut self) {
        let mut renderables = std::mem::take(&mut self.renderables);
        renderables.clear();
        let bodies = self.world.bodies();
        for (_, entity) in self.state.entities.iter() {
            entity.render(bodies, &mut renderables);
        }
        self.state.contacts.render(&mut renderables);
        self.drawing_queue.publish(renderables.drain(..));
        self.renderables = renderables;
    }

    /// Registers the given entity and places it in the world at the given
    /// pose. The parts of a system entity are registered and placed
    /// individually, relative to the given pose.
    ///
    /// # Errors
    /// Returns an error if the entity cannot be placed.
    pub fn add_entity(&mut self, entity: impl Into<Entity>, pose: &Pose) -> Result<EntityID> {
        let mut entity = match entity.into() {
            Entity::System(system) => return self.add_system_entity(system, pose),
            entity => entity,
        };
        if let Entity::Solid(solid) = &mut entity {
            solid.set_tessellation_resolution(self.config.hydrodynamics.tessellation_resolution);
        }
        entity.add_to_world(&mut self.world, pose)?;

        let is_placed_in_world =
            entity.rigid_body_id().is_some() || entity.as_forcefield().is_some();
        let id = self.state.entities.add(entity);
        if is_placed_in_world {
            self.state.refresh_entity_lookups();
        }
        log::debug!(
            "Added {:?} entity {}",
            self.state.entities.entity(id).entity_type(),
            self.state.entities.entity(id).name()
        );
        Ok(id)
    }

    /// # Errors
    /// See [`Self::add_entity`].
    pub fn add_static_entity(&mut self, entity: StaticEntity, pose: &Pose) -> Result<EntityID> {
        self.add_entity(entity, pose)
    }

    /// # Errors
    /// See [`Self::add_entity`].
    pub fn add_solid_entity(&mut self, entity: SolidEntity, pose: &Pose) -> Result<EntityID> {
        self.add_entity(entity, pose)
    }

    /// # Errors
    /// Returns an error if the multibody has no links.
    pub fn add_featherstone_entity(
        &mut self,
        entity: FeatherstoneEntity,
        pose: &Pose,
    ) -> Result<EntityID> {
        self.add_entity(entity, pose)
    }

    /// Places the free surface of the force field at the given pose, whose
    /// z-axis is the surface normal pointing out of the ocean.
    ///
    /// # Errors
    /// See [`Self::add_entity`].
    pub fn add_forcefield_entity(
        &mut self,
        entity: ForcefieldEntity,
        pose: &Pose,
    ) -> Result<EntityID> {
        self.add_entity(entity, pose)
    }

    /// Registers every part of the system at its pose relative to the given
    /// one, then its joints, sensors and actuators, and finally the system
    /// entity itself.
    ///
    /// # Errors
    /// Returns an error if the system has no parts, was registered before,
    /// or if a part or joint cannot be placed.
    pub fn add_system_entity(&mut self, mut system: SystemEntity, pose: &Pose) -> Result<EntityID> {
        let assembly = system.take_assembly()?;

        let mut part_ids = Vec::with_capacity(assembly.parts.len());
        for part in assembly.parts {
            if matches!(part.entity, Entity::System(_)) {
                bail!("System {} contains another system", system.name());
            }
            part_ids.push(self.add_entity(part.entity, &(pose * part.local_pose))?);
        }
        let part_id = |part: usize| {
            part_ids
                .get(part)
                .copied()
                .ok_or_else(|| anyhow!("System {} has no part {}", system.name(), part))
        };

        for joint in assembly.joints {
            let entity_b = joint.part_b.map(part_id).transpose()?;
            self.add_joint(Joint::new(
                joint.name,
                joint.kind,
                part_id(joint.part_a)?,
                entity_b,
                pose * joint.local_frame,
            ))?;
        }
        for (part, mut sensor) in assembly.sensors {
            sensor.attach(part_id(part)?);
            self.add_sensor(sensor);
        }
        for (part, mut actuator) in assembly.actuators {
            actuator.attach(part_id(part)?);
            self.add_actuator(actuator);
        }

        system.set_parts(part_ids);
        let id = self.state.entities.add(system.into());
        log::debug!("Added system entity {}", self.state.entities.entity(id).name());
        Ok(id)
    }

    /// Constrains the motion of the entities named by the joint and returns
    /// the index of the joint.
    ///
    /// # Errors
    /// Returns an error if a joined entity has no rigid body in the world.
    pub fn add_joint(&mut self, mut joint: Joint) -> Result<JointIndex> {
        joint.add_to_world(&mut self.world, &self.state.entities)?;
        Ok(self.state.joints.add(joint))
    }

    /// Appends the sensor to those updated after every step.
    pub fn add_sensor(&mut self, sensor: Sensor) -> SensorIndex {
        self.state.sensors.add(sensor)
    }

    /// Appends the actuator to those updated after every step.
    pub fn add_actuator(&mut self, actuator: Actuator) -> ActuatorIndex {
        self.state.actuators.add(actuator)
    }

    /// Appends the controller to those updated after every step, before
    /// the actuators.
    pub fn add_controller(&mut self, controller: Controller) -> ControllerIndex {
        self.state.controllers.add(controller)
    }

    /// Starts recording the contact points between the two entities, keeping
    /// at most `history_length` of the most recent ones (0 means no limit).
    /// Adding a pair that is already tracked, in either order, returns the
    /// existing contact.
    pub fn add_contact(
        &mut self,
        entity_a: EntityID,
        entity_b: EntityID,
        history_length: usize,
    ) -> ContactIndex {
        self.state
            .contacts
            .add_contact(entity_a, entity_b, history_length)
    }

    pub fn enable_collision(&mut self, entity_a: EntityID, entity_b: EntityID) {
        self.state.collision_pairs.enable(entity_a, entity_b);
    }

    pub fn disable_collision(&mut self, entity_a: EntityID, entity_b: EntityID) {
        self.state.collision_pairs.disable(entity_a, entity_b);
    }

    /// Whether the two entities are allowed to collide.
    pub fn check_collision(&self, entity_a: EntityID, entity_b: EntityID) -> bool {
        self.state.collision_pairs.check(entity_a, entity_b)
    }

    pub fn entities(&self) -> &EntityRegistry {
        &self.state.entities
    }

    pub fn get_entity(&self, id: EntityID) -> Option<&Entity> {
        self.state.entities.get(id)
    }

    pub fn get_entity_mut(&mut self, id: EntityID) -> Option<&mut Entity> {
        self.state.entities.get_mut(id)
    }

    /// Returns the entity at the given position in registration order.
    pub fn entity_by_index(&self, index: usize) -> Option<&Entity> {
        self.state.entities.get(self.state.entities.id_at(index)?)
    }

    pub fn entity_by_name(&self, name: &str) -> Option<&Entity> {
        self.state.entities.get_by_name(name)
    }

    pub fn entity_id(&self, name: &str) -> Option<EntityID> {
        self.state.entities.id_of(name)
    }

    pub fn joints(&self) -> &Registry<JointIndex, Joint> {
        &self.state.joints
    }

    pub fn get_joint(&self, index: JointIndex) -> Option<&Joint> {
        self.state.joints.get(index)
    }

    pub fn joint_by_name(&self, name: &str) -> Option<&Joint> {
        self.state.joints.get_by_name(name)
    }

    pub fn contacts(&self) -> &ContactTracker {
        &self.state.contacts
    }

    pub fn get_contact(&self, index: ContactIndex) -> Option<&Contact> {
        self.state.contacts.get(index)
    }

    pub fn get_contact_mut(&mut self, index: ContactIndex) -> Option<&mut Contact> {
        self.state.contacts.get_mut(index)
    }

    /// Returns the tracked contact between the two entities, in either
    /// order.
    pub fn find_contact(&self, entity_a: EntityID, entity_b: EntityID) -> Option<&Contact> {
        self.state.contacts.find(entity_a, entity_b)
    }

    pub fn sensors(&self) -> &Registry<SensorIndex, Sensor> {
        &self.state.sensors
    }

    pub fn get_sensor(&self, index: SensorIndex) -> Option<&Sensor> {
        self.state.sensors.get(index)
    }

    pub fn sensor_by_name(&self, name: &str) -> Option<&Sensor> {
        self.state.sensors.get_by_name(name)
    }

    pub fn actuators(&self) -> &Registry<ActuatorIndex, Actuator> {
        &self.state.actuators
    }

    pub fn get_actuator(&self, index: ActuatorIndex) -> Option<&Actuator> {
        self.state.actuators.get(index)
    }

    pub fn get_actuator_mut(&mut self, index: ActuatorIndex) -> Option<&mut Actuator> {
        self.state.actuators.get_mut(index)
    }

    pub fn actuator_by_name(&self, name: &str) -> Option<&Actuator> {
        self.state.actuators.get_by_name(name)
    }

    pub fn actuator_by_name_mut(&mut self, name: &str) -> Option<&mut Actuator> {
        self.state.actuators.get_by_name_mut(name)
    }

    pub fn controllers(&self) -> &Registry<ControllerIndex, Controller> {
        &self.state.controllers
    }

    pub fn get_controller(&self, index: ControllerIndex) -> Option<&Controller> {
        self.state.controllers.get(index)
    }

    pub fn get_controller_mut(&mut self, index: ControllerIndex) -> Option<&mut Controller> {
        self.state.controllers.get_mut(index)
    }

    pub fn controller_by_name(&self, name: &str) -> Option<&Controller> {
        self.state.controllers.get_by_name(name)
    }

    /// Returns the fluid domains of all placed force fields.
    pub fn fluids(&self) -> &[FluidDomain] {
        self.state.fluids()
    }

    /// Replaces the current of the given ocean force field.
    ///
    /// # Errors
    /// Returns an error if the entity is not a force field.
    pub fn set_current(&mut self, entity: EntityID, current: CurrentProfile) -> Result<()> {
        let forcefield = self
            .state
            .entities
            .get_mut(entity)
            .and_then(Entity::as_forcefield_mut)
            .ok_or_else(|| anyhow!("Entity {:?} is not a force field", entity))?;
        forcefield.set_current(current);
        self.state.refresh_entity_lookups();
        Ok(())
    }

    /// Returns the pose, velocities and estimated accelerations of the given
    /// solid entity.
    pub fn solid_kinematics(&self, entity: EntityID) -> Option<SolidKinematics> {
        self.state
            .entities
            .get(entity)?
            .as_solid()?
            .kinematics(self.world.bodies())
    }

    /// Applies a force at the given world space point of a solid entity
    /// during the next step.
    ///
    /// # Errors
    /// Returns an error if the entity is not a solid in the world.
    pub fn apply_force(&mut self, entity: EntityID, force: &Force, point: &Position) -> Result<()> {
        let body = self.dynamic_body_of(entity)?;
        self.world
            .bodies_mut()
            .rigid_body_mut(body)
            .apply_force(force, point);
        Ok(())
    }

    /// Applies a force at the center of mass of a solid entity during the
    /// next step.
    ///
    /// # Errors
    /// Returns an error if the entity is not a solid in the world.
    pub fn apply_central_force(&mut self, entity: EntityID, force: &Force) -> Result<()> {
        let body = self.dynamic_body_of(entity)?;
        self.world
            .bodies_mut()
            .rigid_body_mut(body)
            .apply_force_at_center_of_mass(force);
        Ok(())
    }

    /// Applies a torque to a solid entity during the next step.
    ///
    /// # Errors
    /// Returns an error if the entity is not a solid in the world.
    pub fn apply_torque(&mut self, entity: EntityID, torque: &Torque) -> Result<()> {
        let body = self.dynamic_body_of(entity)?;
        self.world
            .bodies_mut()
            .rigid_body_mut(body)
            .apply_torque(torque);
        Ok(())
    }

    fn dynamic_body_of(&self, entity: EntityID) -> Result<crate::world::RigidBodyID> {
        self.state
            .entities
            .get(entity)
            .and_then(Entity::as_solid)
            .and_then(SolidEntity::rigid_body_id)
            .ok_or_else(|| anyhow!("Entity {:?} is not a solid in the world", entity))
    }

    /// Removes everything in the scenario, from the world and from the
    /// registries, and resets the simulation time. Materials are forgotten
    /// too. The configuration is kept.
    pub fn destroy_scenario(&mut self) {
        hydrosim_utils::with_timing_info_logging!("Destroying scenario"; {
            self.state.contacts.clear();
            self.state.controllers.clear();
            self.state.actuators.clear();
            self.state.sensors.clear();

            for (_, joint) in self.state.joints.iter_mut() {
                joint.remove_from_world(&mut self.world);
            }
            self.state.joints.clear();

            let ids: Vec<EntityID> = self.state.entities.ids().iter().rev().copied().collect();
            for id in ids {
                if let Some(entity) = self.state.entities.get_mut(id) {
                    entity.remove_from_world(&mut self.world);
                }
            }

            self.state.clear();
            self.state.gravity_enabled = true;
            self.world.clear();
            self.drawing_queue.clear();
            self.real_time_factor = 0.0;
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        entity::ForcefieldEntity,
        geometry::Shape,
        hydrodynamics::CurrentProfile,
        sensor::Odometry,
        world::JointKind,
    };
    use approx::assert_abs_diff_eq;
    use nalgebra::vector;

    fn manager() -> SimulationManager {
        let mut manager = SimulationManager::new(SimulationConfig::default()).unwrap();
        let materials = manager.materials_mut();
        materials.create_material("Steel", 7800.0, 0.3).unwrap();
        materials.create_material("Wood", 500.0, 0.5).unwrap();
        materials.create_fluid("Water", 1000.0, 1e-3, 1.33).unwrap();
        manager
    }

    fn add_ball(manager: &mut SimulationManager, name: &str, material: &str, z: fph) -> EntityID {
        let shape = Shape::Sphere { radius: 0.1 };
        let ball = SolidEntity::new(name, shape, material, manager.materials()).unwrap();
        manager
            .add_solid_entity(ball, &Pose::translation(0.0, 0.0, z))
            .unwrap()
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = SimulationConfig {
            steps_per_second: -1.0,
            ..Default::default()
        };
        assert!(SimulationManager::new(config).is_err());
    }

    #[test]
    fn advancing_counts_steps_and_time() {
        let mut manager = manager();
        add_ball(&mut manager, "Ball", "Steel", 1.0);
        for _ in 0..10 {
            assert!(manager.advance_simulation());
        }
        assert_eq!(manager.step_count(), 10);
        assert_abs_diff_eq!(manager.simulation_time(), 10.0 / 200.0, epsilon = 1e-12);
    }

    #[test]
    fn stopped_simulation_does_not_advance() {
        let mut manager = manager();
        add_ball(&mut manager, "Ball", "Steel", 1.0);
        manager.stop();
        assert!(!manager.advance_simulation());
        assert_eq!(manager.run_for(1.0), 0);
        manager.resume();
        assert_eq!(manager.run_for(0.05), 10);
    }

    #[test]
    fn free_fall_follows_gravity() {
        let mut manager = manager();
        let ball = add_ball(&mut manager, "Ball", "Steel", 10.0);
        manager.run_for(0.5);
        let velocity = manager.solid_kinematics(ball).unwrap().velocity;
        assert_abs_diff_eq!(velocity.z, -9.81 * 0.5, epsilon = 1e-6);
    }

    #[test]
    fn added_solid_keeps_user_coefficients_at_configured_resolution() {
        let mut config = SimulationConfig::default();
        config.hydrodynamics.tessellation_resolution = 16;
        let mut manager = SimulationManager::new(config).unwrap();
        manager
            .materials_mut()
            .create_material("Wood", 500.0, 0.5)
            .unwrap();

        let mut ball =
            SolidEntity::new("Ball", Shape::Sphere { radius: 0.1 }, "Wood", manager.materials())
                .unwrap();
        let mut coefficients = ball.hydrodynamic_model().unwrap().coefficients().clone();
        coefficients.added_mass = nalgebra::Matrix6::identity() * 42.0;
        ball.set_hydrodynamic_coefficients(coefficients);
        let ball = manager.add_solid_entity(ball, &Pose::identity()).unwrap();

        let model = manager
            .get_entity(ball)
            .and_then(Entity::as_solid)
            .and_then(SolidEntity::hydrodynamic_model)
            .unwrap();
        assert_eq!(model.coefficients().added_mass[(0, 0)], 42.0);
    }

    #[test]
    fn duplicate_entity_names_are_suffixed() {
        let mut manager = manager();
        add_ball(&mut manager, "Ball", "Steel", 1.0);
        add_ball(&mut manager, "Ball", "Steel", 2.0);
        assert!(manager.entity_by_name("Ball").is_some());
        assert!(manager.entity_by_name("Ball1").is_some());
        assert_eq!(manager.entity_by_index(1).unwrap().name(), "Ball1");
    }

    #[test]
    fn contacts_are_tracked_once_per_pair() {
        let mut manager = manager();
        let a = add_ball(&mut manager, "A", "Steel", 1.0);
        let b = add_ball(&mut manager, "B", "Steel", 2.0);
        let first = manager.add_contact(a, b, 10);
        let second = manager.add_contact(b, a, 20);
        assert_eq!(first, second);
        assert_eq!(manager.contacts().len(), 1);
        assert!(manager.find_contact(b, a).is_some());
    }

    #[test]
    fn collision_checks_follow_overrides() {
        let mut manager = manager();
        let a = add_ball(&mut manager, "A", "Steel", 1.0);
        let b = add_ball(&mut manager, "B", "Steel", 2.0);
        assert!(manager.check_collision(a, b));
        manager.disable_collision(b, a);
        assert!(!manager.check_collision(a, b));
        manager.enable_collision(a, b);
        assert!(manager.check_collision(b, a));
    }

    #[test]
    fn applied_force_acts_for_one_step() {
        let mut manager = manager();
        manager.set_gravity_enabled(false);
        let ball = add_ball(&mut manager, "Ball", "Steel", 1.0);
        let mass = manager
            .get_entity(ball)
            .unwrap()
            .as_solid()
            .unwrap()
            .mass();
        manager
            .apply_central_force(ball, &vector![mass * 200.0, 0.0, 0.0])
            .unwrap();
        manager.advance_simulation();
        manager.advance_simulation();
        let velocity = manager.solid_kinematics(ball).unwrap().velocity;
        assert_abs_diff_eq!(velocity.x, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn applying_force_to_static_entity_fails() {
        let mut manager = manager();
        let ground = StaticEntity::new(
            "Ground",
            Shape::Plane,
            "Steel",
            manager.materials(),
        )
        .unwrap();
        let ground = manager
            .add_static_entity(ground, &Pose::identity())
            .unwrap();
        assert!(manager.apply_central_force(ground, &Force::zeros()).is_err());
    }

    #[test]
    fn fluid_loads_are_held_between_recomputations() {
        let config = SimulationConfig {
            hydrodynamics_prescaler: 3,
            drawing_enabled: false,
            ..Default::default()
        };
        let mut manager = SimulationManager::new(config).unwrap();
        manager
            .materials_mut()
            .create_material("Steel", 7800.0, 0.3)
            .unwrap();
        manager
            .materials_mut()
            .create_fluid("Water", 1000.0, 1e-3, 1.33)
            .unwrap();
        let ocean = ForcefieldEntity::ocean(
            "Ocean",
            "Water",
            CurrentProfile::default(),
            manager.materials(),
        )
        .unwrap();
        manager
            .add_forcefield_entity(ocean, &Pose::identity())
            .unwrap();
        let ball = add_ball(&mut manager, "Ball", "Steel", -1.0);

        let wrench_after = |manager: &mut SimulationManager| {
            manager.advance_simulation();
            *manager
                .get_entity(ball)
                .unwrap()
                .as_solid()
                .unwrap()
                .fluid_wrench()
        };
        let first = wrench_after(&mut manager);
        let second = wrench_after(&mut manager);
        let third = wrench_after(&mut manager);
        let fourth = wrench_after(&mut manager);
        assert_eq!(first, second);
        assert_eq!(first, third);
        assert_ne!(first, fourth);
    }

    #[test]
    fn system_parts_become_entities() {
        let mut manager = manager();
        let hull =
            SolidEntity::new("Hull", Shape::Sphere { radius: 0.2 }, "Wood", manager.materials())
                .unwrap();
        let fin = SolidEntity::new(
            "Fin",
            Shape::Box {
                half_extents: vector![0.05, 0.1, 0.01],
            },
            "Wood",
            manager.materials(),
        )
        .unwrap();

        let mut vehicle = SystemEntity::new("Vehicle");
        let hull = vehicle.add_part(hull, Pose::identity()).unwrap();
        let fin = vehicle
            .add_part(fin, Pose::translation(0.0, 0.3, 0.0))
            .unwrap();
        vehicle
            .add_joint(
                "Mount",
                JointKind::Fixed,
                hull,
                Some(fin),
                Pose::translation(0.0, 0.2, 0.0),
            )
            .unwrap();
        vehicle
            .add_sensor(hull, Sensor::new("Nav", Odometry::new()))
            .unwrap();

        let id = manager
            .add_entity(vehicle, &Pose::translation(0.0, 0.0, 5.0))
            .unwrap();
        assert_eq!(manager.entities().len(), 3);
        assert_eq!(manager.joints().len(), 1);

        let fin_pose = manager
            .entity_by_name("Fin")
            .unwrap()
            .as_solid()
            .unwrap()
            .pose(manager.bodies())
            .unwrap();
        assert_abs_diff_eq!(fin_pose.translation.vector, vector![0.0, 0.3, 5.0], epsilon = 1e-12);

        let system = manager.get_entity(id).unwrap().as_system().unwrap();
        assert_eq!(system.parts().len(), 2);

        manager.advance_simulation();
        assert_eq!(manager.sensor_by_name("Nav").unwrap().history().len(), 1);
    }

    #[test]
    fn destroying_scenario_empties_everything() {
        let mut manager = manager();
        let a = add_ball(&mut manager, "A", "Steel", 1.0);
        let b = add_ball(&mut manager, "B", "Steel", 2.0);
        manager
            .add_joint(Joint::new(
                "Link",
                JointKind::Spherical,
                a,
                Some(b),
                Pose::translation(0.0, 0.0, 1.5),
            ))
            .unwrap();
        manager.add_contact(a, b, 5);
        manager.add_sensor(Sensor::new("Nav", Odometry::new()).attached_to(a));
        manager.run_for(0.1);

        manager.destroy_scenario();
        assert!(manager.entities().is_empty());
        assert!(manager.joints().is_empty());
        assert!(manager.contacts().is_empty());
        assert!(manager.sensors().is_empty());
        assert_eq!(manager.bodies().n_rigid_bodies(), 0);
        assert_eq!(manager.simulation_time(), 0.0);
        assert!(manager.drawing_queue().is_empty());
        assert!(manager.materials().material_id("Steel").is_none());
    }

    #[test]
    fn drawing_queue_receives_snapshot() {
        let mut manager = manager();
        add_ball(&mut manager, "A", "Steel", 1.0);
        add_ball(&mut manager, "B", "Steel", 2.0);
        let queue = manager.drawing_queue();
        manager.advance_simulation();
        let mut buffer = Vec::new();
        queue.copy_into(&mut buffer);
        assert_eq!(buffer.len(), 2);
    }
}
