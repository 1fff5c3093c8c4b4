//! Composite entities assembled from other entities.

use super::{Entity, EntityID};
use crate::{
    actuator::Actuator, quantities::Pose, sensor::Sensor, world::JointKind,
};
use anyhow::{Result, bail};

/// A robot or vehicle made of parts joined together, carrying its own
/// sensors and actuators. Parts are referred to by their index in the
/// order they were added until the system is registered, at which point
/// every part becomes an entity of its own.
#[derive(Debug)]
pub struct SystemEntity {
    pub(super) name: String,
    pub(super) renderable: bool,
    assembly: SystemAssembly,
    parts: Vec<EntityID>,
}

/// The contents of a [`SystemEntity`] that are registered separately.
#[derive(Debug, Default)]
pub struct SystemAssembly {
    pub parts: Vec<SystemPart>,
    pub joints: Vec<SystemJoint>,
    pub sensors: Vec<(usize, Sensor)>,
    pub actuators: Vec<(usize, Actuator)>,
}

/// A part of a system, placed relative to the system frame.
#[derive(Debug)]
pub struct SystemPart {
    pub entity: Entity,
    pub local_pose: Pose,
}

/// A joint between two parts of a system, or between a part and the world.
#[derive(Clone, Debug)]
pub struct SystemJoint {
    pub name: String,
    pub kind: JointKind,
    pub part_a: usize,
    pub part_b: Option<usize>,
    /// The joint frame relative to the system frame.
    pub local_frame: Pose,
}

impl SystemEntity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            renderable: true,
            assembly: SystemAssembly::default(),
            parts: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a part placed at the given pose in the system frame and returns
    /// its index.
    ///
    /// # Errors
    /// Returns an error if the system is already registered or the part is
    /// itself a system.
    pub fn add_part(&mut self, entity: impl Into<Entity>, local_pose: Pose) -> Result<usize> {
        let entity = entity.into();
        self.check_unassembled()?;
        if matches!(entity, Entity::System(_)) {
            bail!("System {} cannot contain system {}", self.name, entity.name());
        }
        self.assembly.parts.push(SystemPart { entity, local_pose });
        Ok(self.assembly.parts.len() - 1)
    }

    /// Joins two parts, or one part to the world.
    ///
    /// # Errors
    /// Returns an error if the system is already registered or a part index
    /// is out of range.
    pub fn add_joint(
        &mut self,
        name: impl Into<String>,
        kind: JointKind,
        part_a: usize,
        part_b: Option<usize>,
        local_frame: Pose,
    ) -> Result<()> {
        self.check_unassembled()?;
        self.check_part(part_a)?;
        if let Some(part_b) = part_b {
            self.check_part(part_b)?;
        }
        self.assembly.joints.push(SystemJoint {
            name: name.into(),
            kind,
            part_a,
            part_b,
            local_frame,
        });
        Ok(())
    }

    /// Mounts the given sensor on the given part.
    ///
    /// # Errors
    /// Returns an error if the system is already registered or the part
    /// index is out of range.
    pub fn add_sensor(&mut self, part: usize, sensor: Sensor) -> Result<()> {
        self.check_unassembled()?;
        self.check_part(part)?;
        self.assembly.sensors.push((part, sensor));
        Ok(())
    }

    /// Mounts the given actuator on the given part.
    ///
    /// # Errors
    /// Returns an error if the system is already registered or the part
    /// index is out of range.
    pub fn add_actuator(&mut self, part: usize, actuator: Actuator) -> Result<()> {
        self.check_unassembled()?;
        self.check_part(part)?;
        self.assembly.actuators.push((part, actuator));
        Ok(())
    }

    pub fn n_parts(&self) -> usize {
        self.assembly.parts.len().max(self.parts.len())
    }

    /// Returns the IDs of the registered parts, in the order the parts were
    /// added.
    pub fn parts(&self) -> &[EntityID] {
        &self.parts
    }

    /// Returns the ID of the registered part with the given index.
    pub fn part(&self, part: usize) -> Option<EntityID> {
        self.parts.get(part).copied()
    }

    pub fn is_assembled(&self) -> bool {
        !self.parts.is_empty()
    }

    /// Hands out everything that must be registered separately.
    ///
    /// # Errors
    /// Returns an error if the system has no parts or was already
    /// disassembled.
    pub fn take_assembly(&mut self) -> Result<SystemAssembly> {
        self.check_unassembled()?;
        if self.assembly.parts.is_empty() {
            bail!("System {} has no parts", self.name);
        }
        Ok(std::mem::take(&mut self.assembly))
    }

    /// Records the IDs the parts were registered with.
    pub fn set_parts(&mut self, parts: Vec<EntityID>) {
        self.parts = parts;
    }

    fn check_unassembled(&self) -> Result<()> {
        if self.is_assembled() {
            bail!("System {} is already registered", self.name);
        }
        Ok(())
    }

    fn check_part(&self, part: usize) -> Result<()> {
        if part >= self.assembly.parts.len() {
            bail!("System {} has no part {part}", self.name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        entity::SolidEntity, geometry::Shape, material::MaterialManager, sensor::Odometry,
    };

    fn materials() -> MaterialManager {
        let mut materials = MaterialManager::new();
        materials.create_material("Aluminium", 2700.0, 0.3).unwrap();
        materials
    }

    fn fin(materials: &MaterialManager) -> SolidEntity {
        SolidEntity::new(
            "Fin",
            Shape::Box {
                half_extents: nalgebra::vector![0.2, 0.02, 0.1],
            },
            "Aluminium",
            materials,
        )
        .unwrap()
    }

    #[test]
    fn parts_are_indexed_in_order() {
        let materials = materials();
        let mut system = SystemEntity::new("Glider");
        assert_eq!(system.add_part(fin(&materials), Pose::identity()).unwrap(), 0);
        assert_eq!(
            system
                .add_part(fin(&materials), Pose::translation(0.0, 1.0, 0.0))
                .unwrap(),
            1
        );
        assert_eq!(system.n_parts(), 2);
    }

    #[test]
    fn references_to_unknown_parts_are_rejected() {
        let materials = materials();
        let mut system = SystemEntity::new("Glider");
        system.add_part(fin(&materials), Pose::identity()).unwrap();
        assert!(
            system
                .add_joint("Hinge", JointKind::Revolute, 0, Some(1), Pose::identity())
                .is_err()
        );
        assert!(
            system
                .add_sensor(2, Sensor::new("Odometry", Odometry::new()))
                .is_err()
        );
        assert!(system.add_part(SystemEntity::new("Inner"), Pose::identity()).is_err());
    }

    #[test]
    fn empty_system_cannot_be_assembled() {
        let mut system = SystemEntity::new("Empty");
        assert!(system.take_assembly().is_err());
    }
}
