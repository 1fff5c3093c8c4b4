//! Entities simulated as a single rigid body.

use crate::{
    fph,
    geometry::Shape,
    hydrodynamics::{
        FluidDomain, FluidLoads, HydrodynamicCoefficients, HydrodynamicModel,
        HydrodynamicsSettings, SolidKinematics, Wrench,
    },
    inertia::InertialProperties,
    material::{MaterialID, MaterialManager},
    quantities::{
        Acceleration, AngularAcceleration, AngularVelocity, Pose, Position, Velocity,
    },
    rendering::{Appearance, Renderable, RenderableKind},
    world::{BodySet, DynamicsWorld, RigidBody, RigidBodyID},
};
use anyhow::{Result, anyhow};

/// Tessellation resolution used for the hydrodynamic surface mesh until a
/// simulation picks its own.
pub const DEFAULT_TESSELLATION_RESOLUTION: u32 = 12;

/// A dynamic entity consisting of one rigid body.
#[derive(Clone, Debug)]
pub struct SolidEntity {
    pub(super) name: String,
    shape: Shape,
    material: MaterialID,
    inertial_properties: InertialProperties,
    hydrodynamics: Option<HydrodynamicModel>,
    tessellation_resolution: u32,
    pub(super) appearance: Appearance,
    pub(super) renderable: bool,
    initial_velocity: Velocity,
    initial_angular_velocity: AngularVelocity,
    body: Option<RigidBodyID>,
    motion: MotionEstimate,
    fluid_loads: Vec<FluidLoads>,
    fluid_wrench: Wrench,
}

/// Accelerations estimated from velocity changes over the last step.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct MotionEstimate {
    velocity: Velocity,
    angular_velocity: AngularVelocity,
    acceleration: Acceleration,
    angular_acceleration: AngularAcceleration,
}

impl SolidEntity {
    /// Creates a solid with the given shape made of the named material.
    ///
    /// # Errors
    /// Returns an error if the material is unknown or the shape does not
    /// enclose a finite non-zero volume.
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
            .ok_or_else(|| anyhow!("Unknown material {material_name} for solid {name}"))?;
        let density = materials.material(material)?.density;
        let inertial_properties = shape
            .inertial_properties(density)
            .ok_or_else(|| anyhow!("Shape of solid {name} does not have a finite volume"))?;
        let hydrodynamics = HydrodynamicModel::new(
            &shape,
            inertial_properties.center_of_mass(),
            DEFAULT_TESSELLATION_RESOLUTION,
        );

        Ok(Self {
            name,
            shape,
            material,
            inertial_properties,
            hydrodynamics,
            tessellation_resolution: DEFAULT_TESSELLATION_RESOLUTION,
            appearance: Appearance::default(),
            renderable: true,
            initial_velocity: Velocity::zeros(),
            initial_angular_velocity: AngularVelocity::zeros(),
            body: None,
            motion: MotionEstimate::default(),
            fluid_loads: Vec::new(),
            fluid_wrench: Wrench::zero(),
        })
    }

    pub fn with_appearance(mut self, appearance: Appearance) -> Self {
        self.appearance = appearance;
        self
    }

    /// Sets the velocities the body starts with when added to a world.
    pub fn with_initial_velocities(
        mut self,
        velocity: Velocity,
        angular_velocity: AngularVelocity,
    ) -> Self {
        self.initial_velocity = velocity;
        self.initial_angular_velocity = angular_velocity;
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

    pub fn mass(&self) -> fph {
        self.inertial_properties.mass()
    }

    pub fn inertial_properties(&self) -> &InertialProperties {
        &self.inertial_properties
    }

    pub fn hydrodynamic_model(&self) -> Option<&HydrodynamicModel> {
        self.hydrodynamics.as_ref()
    }

    /// Replaces the coefficients derived from the shape with the given ones.
    pub fn set_hydrodynamic_coefficients(&mut self, coefficients: HydrodynamicCoefficients) {
        if let Some(model) = &mut self.hydrodynamics {
            model.set_coefficients(coefficients);
        }
    }

    /// Rebuilds the hydrodynamic surface mesh with the given resolution if
    /// it differs from the current one. Coefficients set with
    /// [`Self::set_hydrodynamic_coefficients`] are kept.
    pub fn set_tessellation_resolution(&mut self, resolution: u32) {
        if resolution == self.tessellation_resolution {
            return;
        }
        self.tessellation_resolution = resolution;
        if let Some(model) = &mut self.hydrodynamics {
            model.retessellate(self.inertial_properties.center_of_mass(), resolution);
        }
    }

    /// Returns the rigid body of the solid if it has been added to a world.
    pub fn rigid_body_id(&self) -> Option<RigidBodyID> {
        self.body
    }

    pub fn is_in_world(&self) -> bool {
        self.body.is_some()
    }

    /// Builds the rigid body and adds it to the given world with the shape
    /// frame at the given pose. Does nothing if the solid is already in a
    /// world.
    pub fn add_to_world(&mut self, world: &mut dyn DynamicsWorld, pose: &Pose) {
        if self.body.is_some() {
            log::debug!("Solid {} is already in the world", self.name);
            return;
        }
        let body = RigidBody::new_dynamic(
            self.shape.clone(),
            &self.inertial_properties,
            pose,
            self.initial_velocity,
            self.initial_angular_velocity,
        );
        self.body = Some(world.add_rigid_body(body));
        self.motion = MotionEstimate {
            velocity: self.initial_velocity,
            angular_velocity: self.initial_angular_velocity,
            ..Default::default()
        };
        self.fluid_loads.clear();
        self.fluid_wrench = Wrench::zero();
    }

    /// Removes the rigid body from the given world. Does nothing if the
    /// solid is not in a world.
    pub fn remove_from_world(&mut self, world: &mut dyn DynamicsWorld) {
        if let Some(body) = self.body.take() {
            world.remove_rigid_body(body);
        }
    }

    /// Returns the pose of the shape frame.
    pub fn pose(&self, bodies: &BodySet) -> Option<Pose> {
        Some(bodies.get_rigid_body(self.body?)?.shape_pose())
    }

    /// Returns the current kinematic state, with accelerations estimated
    /// from the last step.
    pub fn kinematics(&self, bodies: &BodySet) -> Option<SolidKinematics> {
        let body = bodies.get_rigid_body(self.body?)?;
        Some(SolidKinematics {
            pose: body.shape_pose(),
            center_of_mass: *body.position(),
            velocity: body.compute_velocity(),
            angular_velocity: body.compute_angular_velocity(),
            acceleration: self.motion.acceleration,
            angular_acceleration: self.motion.angular_acceleration,
        })
    }

    /// Returns the world space position of the given point in the shape
    /// frame.
    pub fn transform_point_to_world(&self, bodies: &BodySet, point: &Position) -> Option<Position> {
        Some(self.pose(bodies)?.transform_point(point))
    }

    /// Applies the weight of the solid at its center of mass.
    pub fn apply_gravity(&self, bodies: &mut BodySet, gravity: &Acceleration) {
        if let Some(body) = self.body.and_then(|id| bodies.get_rigid_body_mut(id)) {
            let weight = gravity * body.mass();
            body.apply_force_at_center_of_mass(&weight);
        }
    }

    /// Computes the loads the given fluid exerts on the solid.
    pub fn compute_fluid_forces(
        &self,
        settings: &HydrodynamicsSettings,
        fluid: &FluidDomain,
        bodies: &BodySet,
        gravity: &Acceleration,
    ) -> Option<FluidLoads> {
        let model = self.hydrodynamics.as_ref()?;
        let kinematics = self.kinematics(bodies)?;
        Some(model.compute_loads(settings, fluid, &kinematics, self.mass(), gravity))
    }

    /// Computes the loads from all the given fluids and applies their sum,
    /// which is kept for [`Self::reapply_fluid_forces`].
    pub fn apply_fluid_forces(
        &mut self,
        settings: &HydrodynamicsSettings,
        fluids: &[&FluidDomain],
        bodies: &mut BodySet,
        gravity: &Acceleration,
    ) {
        self.fluid_loads.clear();
        self.fluid_wrench = Wrench::zero();
        for fluid in fluids {
            if let Some(loads) = self.compute_fluid_forces(settings, fluid, bodies, gravity) {
                self.fluid_wrench += loads.total();
                self.fluid_loads.push(loads);
            }
        }
        self.reapply_fluid_forces(bodies);
    }

    /// Applies the fluid loads computed most recently.
    pub fn reapply_fluid_forces(&self, bodies: &mut BodySet) {
        if let Some(body) = self.body.and_then(|id| bodies.get_rigid_body_mut(id)) {
            body.apply_force_at_center_of_mass(&self.fluid_wrench.force);
            body.apply_torque(&self.fluid_wrench.torque);
        }
    }

    /// Returns the loads from each fluid computed most recently, in the
    /// order the fluids were given.
    pub fn fluid_loads(&self) -> &[FluidLoads] {
        &self.fluid_loads
    }

    /// Returns the sum of the fluid loads computed most recently.
    pub fn fluid_wrench(&self) -> &Wrench {
        &self.fluid_wrench
    }

    /// Updates the acceleration estimates from the velocity change over a
    /// step of the given duration.
    pub fn update_motion_estimate(&mut self, bodies: &BodySet, step_duration: fph) {
        let Some(body) = self.body.and_then(|id| bodies.get_rigid_body(id)) else {
            return;
        };
        if step_duration <= 0.0 {
            return;
        }
        let velocity = body.compute_velocity();
        let angular_velocity = body.compute_angular_velocity();
        self.motion = MotionEstimate {
            velocity,
            angular_velocity,
            acceleration: (velocity - self.motion.velocity) / step_duration,
            angular_acceleration: (angular_velocity - self.motion.angular_velocity)
                / step_duration,
        };
    }

    /// Forgets the velocity history, so the next estimate starts from rest.
    pub fn reset_motion_estimate(&mut self, bodies: &BodySet) {
        if let Some(body) = self.body.and_then(|id| bodies.get_rigid_body(id)) {
            self.motion = MotionEstimate {
                velocity: body.compute_velocity(),
                angular_velocity: body.compute_angular_velocity(),
                ..Default::default()
            };
        }
    }

    pub(super) fn render(&self, bodies: &BodySet) -> Option<Renderable> {
        let pose = self.pose(bodies)?;
        Some(Renderable::new(RenderableKind::Solid, &pose, self.appearance))
    }
}
