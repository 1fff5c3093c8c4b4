//! Named joints between entities.

use crate::{
    entity::{EntityID, EntityRegistry},
    quantities::Pose,
    registry::{Named, define_registry_index},
    world::{DynamicsWorld, JointConstraint, JointID, JointKind},
};
use anyhow::{Result, anyhow};

define_registry_index!(
    /// Index of a [`Joint`] in the order of registration.
    JointIndex
);

/// A joint attaching a solid or static entity to another one, or to the
/// world.
#[derive(Clone, Debug)]
pub struct Joint {
    name: String,
    kind: JointKind,
    entity_a: EntityID,
    entity_b: Option<EntityID>,
    frame: Pose,
    id: Option<JointID>,
}

impl Joint {
    /// Creates a joint of the given kind whose frame is at the given world
    /// space pose when the joint is added. The joint axis is the z-axis of
    /// the frame.
    pub fn new(
        name: impl Into<String>,
        kind: JointKind,
        entity_a: EntityID,
        entity_b: Option<EntityID>,
        frame: Pose,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            entity_a,
            entity_b,
            frame,
            id: None,
        }
    }

    pub fn kind(&self) -> JointKind {
        self.kind
    }

    pub fn entity_a(&self) -> EntityID {
        self.entity_a
    }

    pub fn entity_b(&self) -> Option<EntityID> {
        self.entity_b
    }

    pub fn frame(&self) -> &Pose {
        &self.frame
    }

    pub fn joint_id(&self) -> Option<JointID> {
        self.id
    }

    pub fn is_in_world(&self) -> bool {
        self.id.is_some()
    }

    /// Creates the joint constraint between the rigid bodies of the joined
    /// entities. Does nothing if the joint is already in the world.
    ///
    /// # Errors
    /// Returns an error if a joined entity is missing or has no rigid body
    /// in the world.
    pub fn add_to_world(
        &mut self,
        world: &mut dyn DynamicsWorld,
        entities: &EntityRegistry,
    ) -> Result<()> {
        if self.id.is_some() {
            return Ok(());
        }
        let body_of = |id: EntityID| {
            entities
                .get(id)
                .and_then(|entity| entity.rigid_body_id())
                .ok_or_else(|| {
                    anyhow!("Joint {} attaches an entity without a rigid body", self.name)
                })
        };
        let body_a_id = body_of(self.entity_a)?;
        let body_b_id = self.entity_b.map(body_of).transpose()?;

        let bodies = world.bodies();
        let body_a = bodies
            .get_rigid_body(body_a_id)
            .ok_or_else(|| anyhow!("Missing rigid body for joint {}", self.name))?;
        let body_b = match body_b_id {
            Some(id) => Some((
                id,
                bodies
                    .get_rigid_body(id)
                    .ok_or_else(|| anyhow!("Missing rigid body for joint {}", self.name))?,
            )),
            None => None,
        };
        let constraint = JointConstraint::new(self.kind, (body_a_id, body_a), body_b, &self.frame);

        self.id = Some(
            world
                .add_joint(constraint)
                .ok_or_else(|| anyhow!("World rejected joint {}", self.name))?,
        );
        log::debug!("Added {:?} joint {}", self.kind, self.name);
        Ok(())
    }

    pub fn remove_from_world(&mut self, world: &mut dyn DynamicsWorld) {
        if let Some(id) = self.id.take() {
            world.remove_joint(id);
        }
    }
}

impl Named for Joint {
    fn name(&self) -> &str {
        &self.name
    }

    fn rename(&mut self, name: String) {
        self.name = name;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        entity::{SolidEntity, StaticEntity},
        geometry::Shape,
        material::MaterialManager,
        world::RigidBodyWorld,
    };

    fn scene() -> (RigidBodyWorld, EntityRegistry, EntityID, EntityID) {
        let mut materials = MaterialManager::new();
        materials.create_material("Steel", 7800.0, 0.2).unwrap();
        let mut world = RigidBodyWorld::default();
        let mut entities = EntityRegistry::new();

        let mut floor: crate::entity::Entity =
            StaticEntity::new("Floor", Shape::Plane, "Steel", &materials)
                .unwrap()
                .into();
        floor.add_to_world(&mut world, &Pose::identity()).unwrap();
        let floor = entities.add(floor);

        let mut ball =
            SolidEntity::new("Ball", Shape::Sphere { radius: 0.2 }, "Steel", &materials).unwrap();
        ball.add_to_world(&mut world, &Pose::translation(0.0, 0.0, 1.0));
        let ball = entities.add(ball.into());
        (world, entities, floor, ball)
    }

    #[test]
    fn joint_between_entities_is_added_once() {
        let (mut world, entities, floor, ball) = scene();
        let mut joint = Joint::new(
            "Tether",
            JointKind::Spherical,
            ball,
            Some(floor),
            Pose::translation(0.0, 0.0, 0.5),
        );
        joint.add_to_world(&mut world, &entities).unwrap();
        joint.add_to_world(&mut world, &entities).unwrap();
        assert_eq!(world.n_joints(), 1);

        joint.remove_from_world(&mut world);
        assert!(!joint.is_in_world());
        assert_eq!(world.n_joints(), 0);
    }

    #[test]
    fn joint_to_entity_outside_world_fails() {
        let (mut world, mut entities, _, ball) = scene();
        entities
            .get_mut(ball)
            .unwrap()
            .remove_from_world(&mut world);
        let mut joint = Joint::new("Hinge", JointKind::Revolute, ball, None, Pose::identity());
        assert!(joint.add_to_world(&mut world, &entities).is_err());
        assert!(joint.joint_id().is_none());
    }
}
