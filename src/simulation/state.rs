//! Registries of a scenario and the per-step hooks acting on them.

use super::filter::CollisionPairs;
use crate::{
    actuator::{Actuator, ActuatorIndex},
    contact::ContactTracker,
    controller::{Controller, ControllerIndex},
    entity::{Entity, EntityID, EntityRegistry},
    fph,
    hydrodynamics::{FluidDomain, HydrodynamicsSettings},
    joint::{Joint, JointIndex},
    material::MaterialManager,
    quantities::Acceleration,
    registry::Registry,
    sensor::{Sensor, SensorContext, SensorIndex},
    world::{BodySet, CollisionRecord, ContactResponseParameters, RigidBodyID, TickCallbacks},
};
use std::collections::HashMap;

/// Everything a scenario consists of apart from the physics world, and the
/// hooks the world calls on every step.
#[derive(Debug)]
pub(super) struct ScenarioState {
    pub materials: MaterialManager,
    pub entities: EntityRegistry,
    pub joints: Registry<JointIndex, Joint>,
    pub sensors: Registry<SensorIndex, Sensor>,
    pub actuators: Registry<ActuatorIndex, Actuator>,
    pub controllers: Registry<ControllerIndex, Controller>,
    pub contacts: ContactTracker,
    pub collision_pairs: CollisionPairs,
    /// Owner of every static or solid rigid body, for lookups only.
    body_entities: HashMap<RigidBodyID, EntityID>,
    /// The fluid domains of all placed forcefields, in registration order.
    fluids: Vec<FluidDomain>,
    pub hydrodynamics: HydrodynamicsSettings,
    pub hydrodynamics_prescaler: u32,
    pub gravity: Acceleration,
    pub gravity_enabled: bool,
    /// While settling initial conditions, time stands still and only
    /// passive forces act.
    pub settling: bool,
    pub time: fph,
    pub step_count: u64,
}

impl ScenarioState {
    pub fn new(
        hydrodynamics: HydrodynamicsSettings,
        hydrodynamics_prescaler: u32,
        gravity: Acceleration,
        collision_pairs: CollisionPairs,
    ) -> Self {
        Self {
            materials: MaterialManager::new(),
            entities: EntityRegistry::new(),
            joints: Registry::new(),
            sensors: Registry::new(),
            actuators: Registry::new(),
            controllers: Registry::new(),
            contacts: ContactTracker::new(),
            collision_pairs,
            body_entities: HashMap::new(),
            fluids: Vec::new(),
            hydrodynamics,
            hydrodynamics_prescaler: hydrodynamics_prescaler.max(1),
            gravity,
            gravity_enabled: true,
            settling: false,
            time: 0.0,
            step_count: 0,
        }
    }

    pub fn fluids(&self) -> &[FluidDomain] {
        &self.fluids
    }

    pub fn entity_of_body(&self, body: RigidBodyID) -> Option<EntityID> {
        self.body_entities.get(&body).copied()
    }

    /// Rebuilds the lookups derived from the entities: rigid body owners and
    /// fluid domains.
    pub fn refresh_entity_lookups(&mut self) {
        self.body_entities.clear();
        self.fluids.clear();
        for (id, entity) in self.entities.iter() {
            if let Some(body) = entity.rigid_body_id() {
                self.body_entities.insert(body, id);
            }
            if let Some(domain) = entity.as_forcefield().and_then(|field| field.domain()) {
                self.fluids.push(domain.clone());
            }
        }
    }

    fn apply_gravity(&self, bodies: &mut BodySet) {
        for (_, entity) in self.entities.iter() {
            match entity {
                Entity::Solid(solid) => solid.apply_gravity(bodies, &self.gravity),
                Entity::Featherstone(multibody) => multibody.apply_gravity(bodies, &self.gravity),
                _ => {}
            }
        }
    }

    fn apply_fluid_forces(&mut self, bodies: &mut BodySet) {
        let recompute = self.step_count % u64::from(self.hydrodynamics_prescaler) == 0;
        let fluids: Vec<&FluidDomain> = self.fluids.iter().collect();
        let gravity = if self.gravity_enabled {
            self.gravity
        } else {
            Acceleration::zeros()
        };

        for (_, entity) in self.entities.iter_mut() {
            match entity {
                Entity::Solid(solid) => {
                    if recompute {
                        solid.apply_fluid_forces(&self.hydrodynamics, &fluids, bodies, &gravity);
                    } else {
                        solid.reapply_fluid_forces(bodies);
                    }
                }
                Entity::Featherstone(multibody) => {
                    if recompute {
                        multibody.apply_fluid_forces(
                            &self.hydrodynamics,
                            &fluids,
                            bodies,
                            &gravity,
                        );
                    } else {
                        multibody.reapply_fluid_forces(bodies);
                    }
                }
                _ => {}
            }
        }
    }

    fn update_motion_estimates(&mut self, bodies: &BodySet, step_duration: fph) {
        for (_, entity) in self.entities.iter_mut() {
            match entity {
                Entity::Solid(solid) => solid.update_motion_estimate(bodies, step_duration),
                Entity::Featherstone(multibody) => {
                    multibody.update_motion_estimate(bodies, step_duration);
                }
                _ => {}
            }
        }
    }

    /// Forgets the velocity history of every entity, so accelerations are
    /// estimated afresh.
    pub fn reset_motion_estimates(&mut self, bodies: &BodySet) {
        for (_, entity) in self.entities.iter_mut() {
            match entity {
                Entity::Solid(solid) => solid.reset_motion_estimate(bodies),
                Entity::Featherstone(multibody) => multibody.reset_motion_estimate(bodies),
                _ => {}
            }
        }
    }

    fn update_sensors(&mut self, bodies: &BodySet, step_duration: fph) {
        if self.sensors.is_empty() {
            return;
        }
        let fluids: Vec<&FluidDomain> = self.fluids.iter().collect();
        let context = SensorContext {
            time: self.time,
            bodies,
            entities: &self.entities,
            fluids: &fluids,
            gravity: &self.gravity,
        };
        for (_, sensor) in self.sensors.iter_mut() {
            sensor.update(step_duration, &context);
        }
    }

    fn update_controllers(&mut self, step_duration: fph) {
        for (_, controller) in self.controllers.iter_mut() {
            controller.update(step_duration, &self.sensors, &mut self.actuators);
        }
    }

    fn update_actuators(&mut self, step_duration: fph) {
        for (_, actuator) in self.actuators.iter_mut() {
            actuator.update(step_duration);
        }
    }

    /// Removes everything, keeping the settings.
    pub fn clear(&mut self) {
        self.contacts.clear();
        self.controllers.clear();
        self.actuators.clear();
        self.sensors.clear();
        self.joints.clear();
        self.entities.clear();
        self.materials.clear();
        self.collision_pairs.clear();
        self.body_entities.clear();
        self.fluids.clear();
        self.time = 0.0;
        self.step_count = 0;
    }
}

impl TickCallbacks for ScenarioState {
    fn pre_tick(&mut self, bodies: &mut BodySet, _step_duration: fph) {
        if self.gravity_enabled {
            self.apply_gravity(bodies);
        }
        self.apply_fluid_forces(bodies);

        if !self.settling {
            for (_, actuator) in self.actuators.iter() {
                actuator.apply(bodies, &self.entities);
            }
        }
    }

    fn post_tick(&mut self, bodies: &BodySet, collisions: &[CollisionRecord], step_duration: fph) {
        if self.settling {
            return;
        }
        self.time += step_duration;
        self.step_count += 1;

        self.update_motion_estimates(bodies, step_duration);

        let body_entities = &self.body_entities;
        self.contacts.record(self.time, collisions, |body| {
            body_entities.get(&body).copied()
        });

        self.update_sensors(bodies, step_duration);
        self.update_controllers(step_duration);
        self.update_actuators(step_duration);
    }

    fn needs_collision(&self, body_a: RigidBodyID, body_b: RigidBodyID) -> bool {
        match (self.entity_of_body(body_a), self.entity_of_body(body_b)) {
            (Some(entity_a), Some(entity_b)) => self.collision_pairs.check(entity_a, entity_b),
            _ => true,
        }
    }

    fn combine_materials(
        &self,
        body_a: RigidBodyID,
        body_b: RigidBodyID,
    ) -> ContactResponseParameters {
        let material_of = |body| {
            let entity = self.entities.get(self.entity_of_body(body)?)?;
            let id = entity.material()?;
            Some((id, self.materials.get_material(id)?.restitution))
        };
        let (Some((id_a, restitution_a)), Some((id_b, restitution_b))) =
            (material_of(body_a), material_of(body_b))
        else {
            return ContactResponseParameters::default();
        };
        let friction = self.materials.materials_interaction(id_a, id_b);
        ContactResponseParameters::from_materials(
            restitution_a,
            restitution_b,
            friction.static_friction,
            friction.dynamic_friction,
        )
    }
}
