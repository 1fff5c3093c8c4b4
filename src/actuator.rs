//! Actuators turning setpoints into forces on entities.

use crate::{
    entity::{EntityID, EntityRegistry},
    fph,
    quantities::Position,
    registry::{Named, define_registry_index},
    timer::{UpdateFrequency, UpdateTimer},
    world::BodySet,
};
use nalgebra::UnitVector3;
use std::fmt;

define_registry_index!(
    /// Index of an [`Actuator`] in the order of registration.
    ActuatorIndex
);

/// How an [`Actuator`] acts on the world.
pub trait Drive: fmt::Debug + Send {
    /// Limits the given setpoint to what the drive can deliver.
    fn saturate(&self, setpoint: fph) -> fph;

    /// Applies the given output to the driven entity.
    fn apply(&self, output: fph, bodies: &mut BodySet, entities: &EntityRegistry);

    /// Makes the drive act on the given entity.
    fn attach(&mut self, entity: EntityID);
}

/// A named actuator. The setpoint may change at any time, but the output
/// applied on every step is only refreshed at the update frequency.
#[derive(Debug)]
pub struct Actuator {
    name: String,
    timer: UpdateTimer,
    setpoint: fph,
    output: fph,
    drive: Box<dyn Drive>,
}

/// A propeller pushing a solid along an axis fixed to it. The setpoint is
/// the thrust in newtons.
#[derive(Clone, Debug)]
pub struct Thruster {
    entity: Option<EntityID>,
    local_position: Position,
    local_axis: UnitVector3<fph>,
    max_thrust: fph,
}

/// A motor driving a multibody joint with a generalized force.
#[derive(Clone, Debug)]
pub struct JointMotor {
    entity: Option<EntityID>,
    link_idx: usize,
    max_force: fph,
}

impl Actuator {
    /// Creates an actuator that refreshes its output on every step.
    pub fn new(name: impl Into<String>, drive: impl Drive + 'static) -> Self {
        Self {
            name: name.into(),
            timer: UpdateTimer::default(),
            setpoint: 0.0,
            output: 0.0,
            drive: Box::new(drive),
        }
    }

    pub fn with_frequency(mut self, frequency: UpdateFrequency) -> Self {
        self.timer.set_frequency(frequency);
        self
    }

    pub fn attached_to(mut self, entity: EntityID) -> Self {
        self.attach(entity);
        self
    }

    pub fn attach(&mut self, entity: EntityID) {
        self.drive.attach(entity);
    }

    pub fn frequency(&self) -> UpdateFrequency {
        self.timer.frequency()
    }

    pub fn setpoint(&self) -> fph {
        self.setpoint
    }

    /// Sets the requested output. Non-finite setpoints are ignored.
    pub fn set_setpoint(&mut self, setpoint: fph) {
        if setpoint.is_finite() {
            self.setpoint = setpoint;
        } else {
            log::warn!("Ignoring non-finite setpoint for actuator {}", self.name);
        }
    }

    /// Returns the output currently applied.
    pub fn output(&self) -> fph {
        self.output
    }

    /// Advances the actuator's clock and latches the saturated setpoint as
    /// the new output if a refresh is due.
    ///
    /// # Returns
    /// Whether the output was refreshed.
    pub fn update(&mut self, step_duration: fph) -> bool {
        if self.timer.tick(step_duration).is_none() {
            return false;
        }
        self.output = self.drive.saturate(self.setpoint);
        true
    }

    /// Applies the current output.
    pub fn apply(&self, bodies: &mut BodySet, entities: &EntityRegistry) {
        if self.output != 0.0 {
            self.drive.apply(self.output, bodies, entities);
        }
    }

    pub fn reset(&mut self) {
        self.timer.reset();
        self.setpoint = 0.0;
        self.output = 0.0;
    }
}

impl Named for Actuator {
    fn name(&self) -> &str {
        &self.name
    }

    fn rename(&mut self, name: String) {
        self.name = name;
    }
}

impl Thruster {
    /// Creates a thruster at the given point in the shape frame of the
    /// solid it is attached to, pushing along the given shape frame axis
    /// with at most the given thrust in either direction.
    pub fn new(local_position: Position, local_axis: UnitVector3<fph>, max_thrust: fph) -> Self {
        Self {
            entity: None,
            local_position,
            local_axis,
            max_thrust: max_thrust.abs(),
        }
    }
}

impl Drive for Thruster {
    fn saturate(&self, setpoint: fph) -> fph {
        setpoint.clamp(-self.max_thrust, self.max_thrust)
    }

    fn apply(&self, output: fph, bodies: &mut BodySet, entities: &EntityRegistry) {
        let Some(body_id) = self
            .entity
            .and_then(|id| entities.get(id))
            .and_then(|entity| entity.as_solid())
            .and_then(|solid| solid.rigid_body_id())
        else {
            return;
        };
        let Some(body) = bodies.get_rigid_body_mut(body_id) else {
            return;
        };
        let pose = body.shape_pose();
        let force = pose.rotation * self.local_axis.into_inner() * output;
        let position = pose.transform_point(&self.local_position);
        body.apply_force(&force, &position);
    }

    fn attach(&mut self, entity: EntityID) {
        self.entity = Some(entity);
    }
}

impl JointMotor {
    pub fn new(link_idx: usize, max_force: fph) -> Self {
        Self {
            entity: None,
            link_idx,
            max_force: max_force.abs(),
        }
    }
}

impl Drive for JointMotor {
    fn saturate(&self, setpoint: fph) -> fph {
        setpoint.clamp(-self.max_force, self.max_force)
    }

    fn apply(&self, output: fph, bodies: &mut BodySet, entities: &EntityRegistry) {
        if let Some(multibody) = self
            .entity
            .and_then(|id| entities.get(id))
            .and_then(|entity| entity.as_featherstone())
        {
            multibody.apply_joint_force(bodies, self.link_idx, output);
        }
    }

    fn attach(&mut self, entity: EntityID) {
        self.entity = Some(entity);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        entity::SolidEntity,
        geometry::Shape,
        material::MaterialManager,
        quantities::Pose,
        timer::UpdateFrequency,
        world::{DynamicsWorld, RigidBodyWorld},
    };
    use approx::assert_abs_diff_eq;
    use nalgebra::{Vector3, point, vector};

    fn scene() -> (RigidBodyWorld, EntityRegistry, EntityID) {
        let mut materials = MaterialManager::new();
        materials.create_material("Steel", 7800.0, 0.2).unwrap();
        let mut world = RigidBodyWorld::default();
        let mut entities = EntityRegistry::new();
        let mut hull = SolidEntity::new(
            "Hull",
            Shape::Box {
                half_extents: vector![1.0, 0.5, 0.5],
            },
            "Steel",
            &materials,
        )
        .unwrap();
        hull.add_to_world(&mut world, &Pose::identity());
        let id = entities.add(hull.into());
        (world, entities, id)
    }

    #[test]
    fn output_is_saturated_setpoint() {
        let mut actuator = Actuator::new(
            "Thruster",
            Thruster::new(Position::origin(), Vector3::x_axis(), 50.0),
        );
        actuator.set_setpoint(80.0);
        assert_eq!(actuator.output(), 0.0);
        assert!(actuator.update(0.01));
        assert_eq!(actuator.output(), 50.0);
        actuator.set_setpoint(-20.0);
        actuator.update(0.01);
        assert_eq!(actuator.output(), -20.0);
    }

    #[test]
    fn non_finite_setpoint_is_ignored() {
        let mut actuator = Actuator::new("Motor", JointMotor::new(0, 10.0));
        actuator.set_setpoint(3.0);
        actuator.set_setpoint(fph::NAN);
        assert_eq!(actuator.setpoint(), 3.0);
    }

    #[test]
    fn output_is_latched_between_refreshes() {
        let mut actuator = Actuator::new(
            "Thruster",
            Thruster::new(Position::origin(), Vector3::x_axis(), 50.0),
        )
        .with_frequency(UpdateFrequency::hz(10.0).unwrap());
        actuator.set_setpoint(10.0);
        for _ in 0..9 {
            assert!(!actuator.update(0.01));
        }
        assert_eq!(actuator.output(), 0.0);
        assert!(actuator.update(0.01));
        assert_eq!(actuator.output(), 10.0);
    }

    #[test]
    fn offset_thruster_pushes_and_turns_solid() {
        let (mut world, entities, hull) = scene();
        let mut actuator = Actuator::new(
            "Stern",
            Thruster::new(point![-1.0, 0.5, 0.0], Vector3::x_axis(), 100.0),
        )
        .attached_to(hull);
        actuator.set_setpoint(40.0);
        actuator.update(0.01);
        actuator.apply(world.bodies_mut(), &entities);

        let body_id = entities.entity(hull).rigid_body_id().unwrap();
        let body = world.bodies().rigid_body(body_id);
        assert_abs_diff_eq!(*body.total_force(), vector![40.0, 0.0, 0.0]);
        assert_abs_diff_eq!(*body.total_torque(), vector![0.0, 0.0, -20.0], epsilon = 1e-12);
    }

    #[test]
    fn unattached_drive_does_nothing() {
        let (mut world, entities, hull) = scene();
        let mut actuator = Actuator::new(
            "Loose",
            Thruster::new(Position::origin(), Vector3::z_axis(), 100.0),
        );
        actuator.set_setpoint(40.0);
        actuator.update(0.01);
        actuator.apply(world.bodies_mut(), &entities);
        let body_id = entities.entity(hull).rigid_body_id().unwrap();
        assert_eq!(*world.bodies().rigid_body(body_id).total_force(), Vector3::zeros());
    }
}
