//! Entities simulated as articulated multibodies.

use crate::{
    fph,
    geometry::Shape,
    hydrodynamics::{
        FluidDomain, FluidLoads, HydrodynamicModel, HydrodynamicsSettings, SolidKinematics, Wrench,
    },
    inertia::InertialProperties,
    material::{MaterialID, MaterialManager},
    quantities::{Acceleration, AngularAcceleration, AngularVelocity, Pose, Velocity},
    rendering::{Appearance, Renderable, RenderableKind},
    world::{BodySet, DynamicsWorld, LinkJoint, Multibody, MultibodyID, MultibodyLink},
};
use anyhow::{Result, anyhow, bail};

use super::solid::DEFAULT_TESSELLATION_RESOLUTION;

/// An articulated entity: a tree of links attached to a fixed base, moved
/// by its joints.
#[derive(Clone, Debug)]
pub struct FeatherstoneEntity {
    pub(super) name: String,
    links: Vec<FeatherstoneLink>,
    pub(super) appearance: Appearance,
    pub(super) renderable: bool,
    multibody: Option<MultibodyID>,
}

/// A link of a [`FeatherstoneEntity`]. The link frame is the frame of its
/// shape.
#[derive(Clone, Debug)]
pub struct FeatherstoneLink {
    name: String,
    parent: Option<usize>,
    joint: LinkJoint,
    shape: Shape,
    material: MaterialID,
    inertial_properties: InertialProperties,
    hydrodynamics: Option<HydrodynamicModel>,
    appearance: Appearance,
    motion: LinkMotion,
    fluid_wrench: Wrench,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct LinkMotion {
    velocity: Velocity,
    angular_velocity: AngularVelocity,
    acceleration: Acceleration,
    angular_acceleration: AngularAcceleration,
}

impl FeatherstoneEntity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            links: Vec::new(),
            appearance: Appearance::default(),
            renderable: true,
            multibody: None,
        }
    }

    /// Appends a link with the given shape made of the named material,
    /// attached by the given joint to the parent link (or to the base) and
    /// returns its index.
    ///
    /// # Errors
    /// Returns an error if the entity is already in a world, the parent is
    /// unknown, the material is unknown or the shape is unbounded.
    pub fn add_link(
        &mut self,
        name: impl Into<String>,
        parent: Option<usize>,
        joint: LinkJoint,
        shape: Shape,
        material_name: &str,
        materials: &MaterialManager,
    ) -> Result<usize> {
        let name = name.into();
        if self.multibody.is_some() {
            bail!("Cannot add link {name} to multibody {} after it was built", self.name);
        }
        if let Some(parent) = parent {
            if parent >= self.links.len() {
                bail!("Unknown parent link {parent} for link {name} of {}", self.name);
            }
        }
        shape.validate()?;
        let material = materials
            .material_id(material_name)
            .ok_or_else(|| anyhow!("Unknown material {material_name} for link {name}"))?;
        let density = materials.material(material)?.density;
        let inertial_properties = shape
            .inertial_properties(density)
            .ok_or_else(|| anyhow!("Shape of link {name} does not have a finite volume"))?;
        let hydrodynamics = HydrodynamicModel::new(
            &shape,
            inertial_properties.center_of_mass(),
            DEFAULT_TESSELLATION_RESOLUTION,
        );

        self.links.push(FeatherstoneLink {
            name,
            parent,
            joint,
            shape,
            material,
            inertial_properties,
            hydrodynamics,
            appearance: Appearance::default(),
            motion: LinkMotion::default(),
            fluid_wrench: Wrench::zero(),
        });
        Ok(self.links.len() - 1)
    }

    pub fn with_appearance(mut self, appearance: Appearance) -> Self {
        self.appearance = appearance;
        self
    }

    /// Sets the appearance of a single link.
    pub fn set_link_appearance(&mut self, link_idx: usize, appearance: Appearance) {
        if let Some(link) = self.links.get_mut(link_idx) {
            link.appearance = appearance;
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn links(&self) -> &[FeatherstoneLink] {
        &self.links
    }

    pub fn n_links(&self) -> usize {
        self.links.len()
    }

    /// Returns the index of the link with the given name.
    pub fn link_index(&self, name: &str) -> Option<usize> {
        self.links.iter().position(|link| link.name == name)
    }

    pub fn multibody_id(&self) -> Option<MultibodyID> {
        self.multibody
    }

    pub fn is_in_world(&self) -> bool {
        self.multibody.is_some()
    }

    /// Builds the multibody with its base at the given pose and adds it to
    /// the given world. Does nothing if it is already in a world.
    ///
    /// # Errors
    /// Returns an error if the entity has no links.
    pub fn add_to_world(&mut self, world: &mut dyn DynamicsWorld, pose: &Pose) -> Result<()> {
        if self.multibody.is_some() {
            log::debug!("Multibody {} is already in the world", self.name);
            return Ok(());
        }
        if self.links.is_empty() {
            bail!("Multibody {} has no links", self.name);
        }
        let mut multibody = Multibody::new(*pose);
        for link in &mut self.links {
            multibody.add_link(MultibodyLink::new(
                link.parent,
                link.joint.clone(),
                &link.inertial_properties,
                Some(link.shape.clone()),
            ))?;
            link.motion = LinkMotion::default();
            link.fluid_wrench = Wrench::zero();
        }
        self.multibody = Some(world.add_multibody(multibody));
        Ok(())
    }

    /// Removes the multibody from the given world. Does nothing if it is
    /// not in a world.
    pub fn remove_from_world(&mut self, world: &mut dyn DynamicsWorld) {
        if let Some(id) = self.multibody.take() {
            world.remove_multibody(id);
        }
    }

    /// Returns the multibody in the given body set.
    pub fn multibody<'a>(&self, bodies: &'a BodySet) -> Option<&'a Multibody> {
        bodies.get_multibody(self.multibody?)
    }

    /// Returns the world space pose of the given link's frame.
    pub fn link_pose(&self, bodies: &BodySet, link_idx: usize) -> Option<Pose> {
        Some(self.multibody(bodies)?.get_link(link_idx)?.state().pose)
    }

    /// Returns the position and velocity of the given link's joint.
    pub fn joint_state(&self, bodies: &BodySet, link_idx: usize) -> Option<(fph, fph)> {
        let link = self.multibody(bodies)?.get_link(link_idx)?;
        Some((link.joint_position(), link.joint_velocity()))
    }

    /// Applies the weight of every link at its center of mass.
    pub fn apply_gravity(&self, bodies: &mut BodySet, gravity: &Acceleration) {
        let Some(multibody) = self.multibody.and_then(|id| bodies.get_multibody_mut(id)) else {
            return;
        };
        for link_idx in 0..multibody.n_links() {
            let weight = gravity * multibody.link(link_idx).mass();
            multibody.apply_link_force_at_center_of_mass(link_idx, &weight);
        }
    }

    /// Computes the loads the given fluid exerts on the given link.
    pub fn compute_link_fluid_forces(
        &self,
        settings: &HydrodynamicsSettings,
        fluid: &FluidDomain,
        bodies: &BodySet,
        link_idx: usize,
        gravity: &Acceleration,
    ) -> Option<FluidLoads> {
        let link = self.links.get(link_idx)?;
        let model = link.hydrodynamics.as_ref()?;
        let kinematics = self.link_kinematics(bodies, link_idx)?;
        Some(model.compute_loads(settings, fluid, &kinematics, link.mass(), gravity))
    }

    /// Computes the loads from all the given fluids on every link and
    /// applies them, keeping them for [`Self::reapply_fluid_forces`].
    pub fn apply_fluid_forces(
        &mut self,
        settings: &HydrodynamicsSettings,
        fluids: &[&FluidDomain],
        bodies: &mut BodySet,
        gravity: &Acceleration,
    ) {
        for link_idx in 0..self.links.len() {
            let mut wrench = Wrench::zero();
            for fluid in fluids {
                if let Some(loads) =
                    self.compute_link_fluid_forces(settings, fluid, bodies, link_idx, gravity)
                {
                    wrench += loads.total();
                }
            }
            self.links[link_idx].fluid_wrench = wrench;
        }
        self.reapply_fluid_forces(bodies);
    }

    /// Applies the fluid loads computed most recently to every link.
    pub fn reapply_fluid_forces(&self, bodies: &mut BodySet) {
        let Some(multibody) = self.multibody.and_then(|id| bodies.get_multibody_mut(id)) else {
            return;
        };
        for (link_idx, link) in self.links.iter().enumerate() {
            multibody.apply_link_force_at_center_of_mass(link_idx, &link.fluid_wrench.force);
            multibody.apply_link_torque(link_idx, &link.fluid_wrench.torque);
        }
    }

    /// Applies a generalized force on the joint of the given link.
    pub fn apply_joint_force(&self, bodies: &mut BodySet, link_idx: usize, joint_force: fph) {
        if let Some(multibody) = self.multibody.and_then(|id| bodies.get_multibody_mut(id)) {
            multibody.apply_joint_force(link_idx, joint_force);
        }
    }

    /// Returns the kinematic state of the given link's shape frame.
    pub fn link_kinematics(&self, bodies: &BodySet, link_idx: usize) -> Option<SolidKinematics> {
        let state = *self.multibody(bodies)?.get_link(link_idx)?.state();
        let motion = &self.links.get(link_idx)?.motion;
        Some(SolidKinematics {
            pose: state.pose,
            center_of_mass: state.center_of_mass,
            velocity: state.velocity,
            angular_velocity: state.angular_velocity,
            acceleration: motion.acceleration,
            angular_acceleration: motion.angular_acceleration,
        })
    }

    /// Updates the link acceleration estimates from the velocity changes over
    /// a step of the given duration.
    pub fn update_motion_estimate(&mut self, bodies: &BodySet, step_duration: fph) {
        let Some(multibody) = self.multibody.and_then(|id| bodies.get_multibody(id)) else {
            return;
        };
        if step_duration <= 0.0 {
            return;
        }
        for (link, multibody_link) in self.links.iter_mut().zip(multibody.links()) {
            let state = multibody_link.state();
            link.motion = LinkMotion {
                velocity: state.velocity,
                angular_velocity: state.angular_velocity,
                acceleration: (state.velocity - link.motion.velocity) / step_duration,
                angular_acceleration: (state.angular_velocity - link.motion.angular_velocity)
                    / step_duration,
            };
        }
    }

    pub fn reset_motion_estimate(&mut self, bodies: &BodySet) {
        let Some(multibody) = self.multibody.and_then(|id| bodies.get_multibody(id)) else {
            return;
        };
        for (link, multibody_link) in self.links.iter_mut().zip(multibody.links()) {
            link.motion = LinkMotion {
                velocity: multibody_link.state().velocity,
                angular_velocity: multibody_link.state().angular_velocity,
                ..Default::default()
            };
        }
    }

    pub(super) fn render(&self, bodies: &BodySet, renderables: &mut Vec<Renderable>) {
        let Some(multibody) = self.multibody(bodies) else {
            return;
        };
        for (link, multibody_link) in self.links.iter().zip(multibody.links()) {
            let appearance = if link.appearance == Appearance::default() {
                self.appearance
            } else {
                link.appearance
            };
            renderables.push(Renderable::new(
                RenderableKind::MultibodyLink,
                &multibody_link.state().pose,
                appearance,
            ));
        }
    }
}

impl FeatherstoneLink {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    pub fn joint(&self) -> &LinkJoint {
        &self.joint
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn material(&self) -> MaterialID {
        self.material
    }

    pub fn mass(&self) -> fph {
        self.inertial_properties.mass()
    }

    pub fn fluid_wrench(&self) -> &Wrench {
        &self.fluid_wrench
    }
}
