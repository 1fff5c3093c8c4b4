//! Simulated entities and the registry that owns them.

mod featherstone;
mod forcefield;
mod solid;
mod system;

pub use featherstone::{FeatherstoneEntity, FeatherstoneLink};
pub use forcefield::{ForcefieldEntity, ForcefieldKind};
pub use solid::{DEFAULT_TESSELLATION_RESOLUTION, SolidEntity};
pub use system::{SystemAssembly, SystemEntity, SystemJoint, SystemPart};

use crate::{
    geometry::Shape,
    material::{MaterialID, MaterialManager},
    name::NameManager,
    quantities::Pose,
    registry::Named,
    rendering::{Appearance, Renderable, RenderableKind},
    world::{BodySet, DynamicsWorld, RigidBody, RigidBodyID},
};
use anyhow::{Result, anyhow};
use hydrosim_utils::{Arena, ArenaKey};

/// Identifier for an [`Entity`] in an [`EntityRegistry`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityID(ArenaKey);

/// The variant of an [`Entity`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum EntityType {
    Static,
    Solid,
    Featherstone,
    Forcefield,
    System,
}

/// Anything placed in a simulated scenario.
#[derive(Debug)]
pub enum Entity {
    Static(StaticEntity),
    Solid(SolidEntity),
    Featherstone(FeatherstoneEntity),
    Forcefield(ForcefieldEntity),
    System(SystemEntity),
}

/// Immovable geometry such as the sea floor.
#[derive(Clone, Debug)]
pub struct StaticEntity {
    name: String,
    shape: Shape,
    material: MaterialID,
    appearance: Appearance,
    renderable: bool,
    body: Option<RigidBodyID>,
}

/// Owns all entities of a scenario in registration order, with unique
/// names.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: Arena<Entity>,
    order: Vec<EntityID>,
    names: NameManager,
}

impl StaticEntity {
    /// Creates static geometry with the given shape made of the named
    /// material. Unlike solids, static entities may be unbounded.
    ///
    /// # Errors
    /// Returns an error if the material is unknown or the shape is invalid.
    pub fn new(
        name: impl Into<String>,
        shape: Shape,
        material_name: &str,
        materials: &MaterialManager,
    ) -> Result<Self> {
        let name = name.into();
        shape.validate()?;
        let material = materials
            .material_id(material_name)
            .ok_or_else(|| anyhow!("Unknown material {material_name} for static entity {name}"))?;
        Ok(Self {
            name,
            shape,
            material,
            appearance: Appearance::default(),
            renderable: true,
            body: None,
        })
    }

    pub fn with_appearance(mut self, appearance: Appearance) -> Self {
        self.appearance = appearance;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn material(&self) -> MaterialID {
        self.material
    }

    pub fn rigid_body_id(&self) -> Option<RigidBodyID> {
        self.body
    }

    /// Adds a static body with the shape at the given pose. Does nothing if
    /// it is already in a world.
    pub fn add_to_world(&mut self, world: &mut dyn DynamicsWorld, pose: &Pose) {
        if self.body.is_some() {
            log::debug!("Static entity {} is already in the world", self.name);
            return;
        }
        let body = RigidBody::new_static(self.shape.clone(), pose);
        self.body = Some(world.add_rigid_body(body));
    }

    pub fn remove_from_world(&mut self, world: &mut dyn DynamicsWorld) {
        if let Some(body) = self.body.take() {
            world.remove_rigid_body(body);
        }
    }

    pub fn pose(&self, bodies: &BodySet) -> Option<Pose> {
        Some(bodies.get_rigid_body(self.body?)?.shape_pose())
    }

    fn render(&self, bodies: &BodySet) -> Option<Renderable> {
        let pose = self.pose(bodies)?;
        Some(Renderable::new(RenderableKind::Static, &pose, self.appearance))
    }
}

impl Entity {
    pub fn name(&self) -> &str {
        match self {
            Self::Static(entity) => &entity.name,
            Self::Solid(entity) => &entity.name,
            Self::Featherstone(entity) => &entity.name,
            Self::Forcefield(entity) => &entity.name,
            Self::System(entity) => &entity.name,
        }
    }

    pub fn entity_type(&self) -> EntityType {
        match self {
            Self::Static(_) => EntityType::Static,
            Self::Solid(_) => EntityType::Solid,
            Self::Featherstone(_) => EntityType::Featherstone,
            Self::Forcefield(_) => EntityType::Forcefield,
            Self::System(_) => EntityType::System,
        }
    }

    pub fn is_renderable(&self) -> bool {
        match self {
            Self::Static(entity) => entity.renderable,
            Self::Solid(entity) => entity.renderable,
            Self::Featherstone(entity) => entity.renderable,
            Self::Forcefield(entity) => entity.renderable,
            Self::System(entity) => entity.renderable,
        }
    }

    pub fn set_renderable(&mut self, renderable: bool) {
        match self {
            Self::Static(entity) => entity.renderable = renderable,
            Self::Solid(entity) => entity.renderable = renderable,
            Self::Featherstone(entity) => entity.renderable = renderable,
            Self::Forcefield(entity) => entity.renderable = renderable,
            Self::System(entity) => entity.renderable = renderable,
        }
    }

    pub fn is_in_world(&self) -> bool {
        match self {
            Self::Static(entity) => entity.body.is_some(),
            Self::Solid(entity) => entity.is_in_world(),
            Self::Featherstone(entity) => entity.is_in_world(),
            Self::Forcefield(entity) => entity.is_in_world(),
            Self::System(entity) => entity.is_assembled(),
        }
    }

    /// Places the entity in the given world at the given pose. System
    /// entities are placed part by part by their owner.
    ///
    /// # Errors
    /// Returns an error if a multibody cannot be built.
    pub fn add_to_world(&mut self, world: &mut dyn DynamicsWorld, pose: &Pose) -> Result<()> {
        match self {
            Self::Static(entity) => entity.add_to_world(world, pose),
            Self::Solid(entity) => entity.add_to_world(world, pose),
            Self::Featherstone(entity) => entity.add_to_world(world, pose)?,
            Self::Forcefield(entity) => entity.add_to_world(pose),
            Self::System(_) => {}
        }
        Ok(())
    }

    pub fn remove_from_world(&mut self, world: &mut dyn DynamicsWorld) {
        match self {
            Self::Static(entity) => entity.remove_from_world(world),
            Self::Solid(entity) => entity.remove_from_world(world),
            Self::Featherstone(entity) => entity.remove_from_world(world),
            Self::Forcefield(entity) => entity.remove_from_world(),
            Self::System(_) => {}
        }
    }

    /// Returns the rigid body of a static or solid entity.
    pub fn rigid_body_id(&self) -> Option<RigidBodyID> {
        match self {
            Self::Static(entity) => entity.rigid_body_id(),
            Self::Solid(entity) => entity.rigid_body_id(),
            _ => None,
        }
    }

    /// Returns the material of a static or solid entity.
    pub fn material(&self) -> Option<MaterialID> {
        match self {
            Self::Static(entity) => Some(entity.material()),
            Self::Solid(entity) => Some(entity.material()),
            _ => None,
        }
    }

    /// Appends what should be drawn of the entity to the given list.
    pub fn render(&self, bodies: &BodySet, renderables: &mut Vec<Renderable>) {
        if !self.is_renderable() {
            return;
        }
        match self {
            Self::Static(entity) => renderables.extend(entity.render(bodies)),
            Self::Solid(entity) => renderables.extend(entity.render(bodies)),
            Self::Featherstone(entity) => entity.render(bodies, renderables),
            Self::Forcefield(entity) => renderables.extend(entity.render()),
            Self::System(_) => {}
        }
    }

    pub fn as_static(&self) -> Option<&StaticEntity> {
        match self {
            Self::Static(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn as_solid(&self) -> Option<&SolidEntity> {
        match self {
            Self::Solid(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn as_solid_mut(&mut self) -> Option<&mut SolidEntity> {
        match self {
            Self::Solid(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn as_featherstone(&self) -> Option<&FeatherstoneEntity> {
        match self {
            Self::Featherstone(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn as_featherstone_mut(&mut self) -> Option<&mut FeatherstoneEntity> {
        match self {
            Self::Featherstone(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn as_forcefield(&self) -> Option<&ForcefieldEntity> {
        match self {
            Self::Forcefield(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn as_forcefield_mut(&mut self) -> Option<&mut ForcefieldEntity> {
        match self {
            Self::Forcefield(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn as_system(&self) -> Option<&SystemEntity> {
        match self {
            Self::System(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn as_system_mut(&mut self) -> Option<&mut SystemEntity> {
        match self {
            Self::System(entity) => Some(entity),
            _ => None,
        }
    }
}

impl Named for Entity {
    fn name(&self) -> &str {
        Entity::name(self)
    }

    fn rename(&mut self, name: String) {
        match self {
            Self::Static(entity) => entity.name = name,
            Self::Solid(entity) => entity.name = name,
            Self::Featherstone(entity) => entity.name = name,
            Self::Forcefield(entity) => entity.name = name,
            Self::System(entity) => entity.name = name,
        }
    }
}

impl From<StaticEntity> for Entity {
    fn from(entity: StaticEntity) -> Self {
        Self::Static(entity)
    }
}

impl From<SolidEntity> for Entity {
    fn from(entity: SolidEntity) -> Self {
        Self::Solid(entity)
    }
}

impl From<FeatherstoneEntity> for Entity {
    fn from(entity: FeatherstoneEntity) -> Self {
        Self::Featherstone(entity)
    }
}

impl From<ForcefieldEntity> for Entity {
    fn from(entity: ForcefieldEntity) -> Self {
        Self::Forcefield(entity)
    }
}

impl From<SystemEntity> for Entity {
    fn from(entity: SystemEntity) -> Self {
        Self::System(entity)
    }
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Stores the given entity, suffixing its name if it is taken, and
    /// returns its ID.
    pub fn add(&mut self, mut entity: Entity) -> EntityID {
        let name = self.names.add_name(entity.name());
        if name != entity.name() {
            log::debug!("Renaming entity {} to {name}", entity.name());
            entity.rename(name);
        }
        let id = EntityID(self.entities.insert(entity));
        self.order.push(id);
        id
    }

    pub fn get(&self, id: EntityID) -> Option<&Entity> {
        self.entities.get(id.0)
    }

    pub fn get_mut(&mut self, id: EntityID) -> Option<&mut Entity> {
        self.entities.get_mut(id.0)
    }

    /// Returns the entity with the given ID.
    ///
    /// # Panics
    /// If the entity does not exist.
    pub fn entity(&self, id: EntityID) -> &Entity {
        self.get(id).expect("Requested missing entity")
    }

    /// Returns the entity with the given ID for modification.
    ///
    /// # Panics
    /// If the entity does not exist.
    pub fn entity_mut(&mut self, id: EntityID) -> &mut Entity {
        self.get_mut(id).expect("Requested missing entity")
    }

    /// Returns the ID of the entity at the given position in registration
    /// order.
    pub fn id_at(&self, index: usize) -> Option<EntityID> {
        self.order.get(index).copied()
    }

    /// Returns the ID of the entity with the given name.
    pub fn id_of(&self, name: &str) -> Option<EntityID> {
        self.order
            .iter()
            .copied()
            .find(|id| self.get(*id).is_some_and(|entity| entity.name() == name))
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Entity> {
        self.get(self.id_of(name)?)
    }

    /// Returns the ID of the static or solid entity owning the given rigid
    /// body.
    pub fn id_of_rigid_body(&self, body: RigidBodyID) -> Option<EntityID> {
        self.iter()
            .find(|(_, entity)| entity.rigid_body_id() == Some(body))
            .map(|(id, _)| id)
    }

    /// Iterates over the entities in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityID, &Entity)> {
        self.order
            .iter()
            .filter_map(|id| self.entities.get(id.0).map(|entity| (*id, entity)))
    }

    /// Iterates mutably over the entities in storage order, which may
    /// differ from registration order once entities have been removed.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (EntityID, &mut Entity)> {
        self.entities
            .iter_mut()
            .map(|(key, entity)| (EntityID(key), entity))
    }

    /// Returns the IDs of all entities in registration order.
    pub fn ids(&self) -> &[EntityID] {
        &self.order
    }

    /// Removes the given entity and frees its name. The entity is returned
    /// still in the world, if it was.
    pub fn remove(&mut self, id: EntityID) -> Option<Entity> {
        let entity = self.entities.remove(id.0)?;
        self.order.retain(|other| *other != id);
        self.names.remove_name(entity.name());
        Some(entity)
    }

    pub fn clear(&mut self) {
        self.entities.clear();
        self.order.clear();
        self.names.clear_names();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::world::RigidBodyWorld;
    use approx::assert_abs_diff_eq;

    fn materials() -> MaterialManager {
        let mut materials = MaterialManager::new();
        materials.create_material("Steel", 7800.0, 0.2).unwrap();
        materials
    }

    fn ball(materials: &MaterialManager, name: &str) -> Entity {
        SolidEntity::new(name, Shape::Sphere { radius: 0.5 }, "Steel", materials)
            .unwrap()
            .into()
    }

    #[test]
    fn registry_keeps_order_and_unique_names() {
        let materials = materials();
        let mut registry = EntityRegistry::new();
        let a = registry.add(ball(&materials, "Ball"));
        let b = registry.add(ball(&materials, "Ball"));
        assert_eq!(registry.entity(a).name(), "Ball");
        assert_eq!(registry.entity(b).name(), "Ball1");
        assert_eq!(registry.id_at(1), Some(b));
        assert_eq!(registry.id_of("Ball1"), Some(b));
        assert!(registry.get_by_name("Ball2").is_none());
    }

    #[test]
    fn removing_entity_frees_name() {
        let materials = materials();
        let mut registry = EntityRegistry::new();
        let a = registry.add(ball(&materials, "Ball"));
        registry.add(ball(&materials, "Ball"));
        assert!(registry.remove(a).is_some());
        assert!(registry.remove(a).is_none());
        let c = registry.add(ball(&materials, "Ball"));
        assert_eq!(registry.entity(c).name(), "Ball");
        assert_eq!(registry.len(), 2);
        let names: Vec<_> = registry.iter().map(|(_, entity)| entity.name()).collect();
        assert_eq!(names, ["Ball1", "Ball"]);
    }

    #[test]
    #[should_panic]
    fn requesting_removed_entity_panics() {
        let materials = materials();
        let mut registry = EntityRegistry::new();
        let a = registry.add(ball(&materials, "Ball"));
        registry.remove(a);
        registry.entity(a);
    }

    #[test]
    fn static_entity_lives_in_world_as_static_body() {
        let materials = materials();
        let mut world = RigidBodyWorld::default();
        let mut floor: Entity = StaticEntity::new("Floor", Shape::Plane, "Steel", &materials)
            .unwrap()
            .into();
        floor.add_to_world(&mut world, &Pose::identity()).unwrap();
        floor.add_to_world(&mut world, &Pose::identity()).unwrap();

        assert_eq!(world.bodies().n_rigid_bodies(), 1);
        let body = world.bodies().rigid_body(floor.rigid_body_id().unwrap());
        assert!(body.is_static());

        floor.remove_from_world(&mut world);
        assert!(!floor.is_in_world());
        assert_eq!(world.bodies().n_rigid_bodies(), 0);
    }

    #[test]
    fn unrenderable_entities_are_not_drawn() {
        let materials = materials();
        let mut world = RigidBodyWorld::default();
        let mut entity = ball(&materials, "Ball");
        entity
            .add_to_world(&mut world, &Pose::translation(0.0, 0.0, 1.0))
            .unwrap();

        let mut renderables = Vec::new();
        entity.render(world.bodies(), &mut renderables);
        assert_eq!(renderables.len(), 1);
        assert_eq!(renderables[0].kind, RenderableKind::Solid);
        assert_eq!(renderables[0].model_matrix[(2, 3)], 1.0);

        renderables.clear();
        entity.set_renderable(false);
        entity.render(world.bodies(), &mut renderables);
        assert!(renderables.is_empty());
    }

    #[test]
    fn rigid_body_lookup_finds_owner() {
        let materials = materials();
        let mut world = RigidBodyWorld::default();
        let mut registry = EntityRegistry::new();
        let id = registry.add(ball(&materials, "Ball"));
        registry
            .entity_mut(id)
            .add_to_world(&mut world, &Pose::translation(0.0, 0.0, 1.0))
            .unwrap();
        let body = registry.entity(id).rigid_body_id().unwrap();
        assert_eq!(registry.id_of_rigid_body(body), Some(id));
        assert_eq!(registry.entity(id).entity_type(), EntityType::Solid);
        assert!(registry.entity(id).as_featherstone().is_none());
        assert_abs_diff_eq!(
            registry.entity(id).as_solid().unwrap().mass(),
            7800.0 * 4.0 / 3.0 * std::f64::consts::PI * 0.125,
            epsilon = 1e-9
        );
    }
}
