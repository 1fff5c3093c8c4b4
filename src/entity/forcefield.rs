//! Ghost volumes filled with fluid.

use crate::{
    fph,
    hydrodynamics::{CurrentProfile, FluidDomain},
    material::{Fluid, MaterialManager},
    quantities::{Pose, Position, Velocity},
    rendering::{Appearance, Renderable, RenderableKind},
};
use anyhow::Result;
use nalgebra::{Unit, Vector3};

/// An entity that does not collide but exerts fluid loads on the solids
/// and multibody links inside it.
#[derive(Clone, Debug)]
pub struct ForcefieldEntity {
    pub(super) name: String,
    kind: ForcefieldKind,
    pub(super) appearance: Appearance,
    pub(super) renderable: bool,
    domain: Option<FluidDomain>,
    pose: Pose,
}

/// The fluid volumes a [`ForcefieldEntity`] can represent. The free surface
/// passes through the origin of the entity frame with the local z-axis
/// pointing out of an ocean and into an atmosphere.
#[derive(Clone, Debug, PartialEq)]
pub enum ForcefieldKind {
    Ocean { fluid: Fluid, current: CurrentProfile },
    Atmosphere { fluid: Fluid, wind: Velocity },
}

impl ForcefieldEntity {
    /// Creates an ocean filled with the named fluid.
    ///
    /// # Errors
    /// Returns an error if the fluid is unknown.
    pub fn ocean(
        name: impl Into<String>,
        fluid_name: &str,
        current: CurrentProfile,
        materials: &MaterialManager,
    ) -> Result<Self> {
        let fluid = materials.fluid_by_name(fluid_name)?.clone();
        Ok(Self::new(name, ForcefieldKind::Ocean { fluid, current }))
    }

    /// Creates an atmosphere filled with the named fluid.
    ///
    /// # Errors
    /// Returns an error if the fluid is unknown.
    pub fn atmosphere(
        name: impl Into<String>,
        fluid_name: &str,
        wind: Velocity,
        materials: &MaterialManager,
    ) -> Result<Self> {
        let fluid = materials.fluid_by_name(fluid_name)?.clone();
        Ok(Self::new(name, ForcefieldKind::Atmosphere { fluid, wind }))
    }

    pub fn new(name: impl Into<String>, kind: ForcefieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            appearance: Appearance::default(),
            renderable: true,
            domain: None,
            pose: Pose::identity(),
        }
    }

    pub fn with_appearance(mut self, appearance: Appearance) -> Self {
        self.appearance = appearance;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ForcefieldKind {
        &self.kind
    }

    pub fn fluid(&self) -> &Fluid {
        match &self.kind {
            ForcefieldKind::Ocean { fluid, .. } | ForcefieldKind::Atmosphere { fluid, .. } => fluid,
        }
    }

    pub fn is_ocean(&self) -> bool {
        matches!(self.kind, ForcefieldKind::Ocean { .. })
    }

    pub fn is_in_world(&self) -> bool {
        self.domain.is_some()
    }

    /// Returns the fluid domain, which exists while the entity is in a
    /// world.
    pub fn domain(&self) -> Option<&FluidDomain> {
        self.domain.as_ref()
    }

    /// Places the free surface at the given pose. Does nothing if the
    /// entity is already placed.
    pub fn add_to_world(&mut self, pose: &Pose) {
        if self.domain.is_some() {
            log::debug!("Forcefield {} is already in the world", self.name);
            return;
        }
        let surface_point = pose.transform_point(&Position::origin());
        let up = pose.rotation * Vector3::z();
        self.domain = Some(match &self.kind {
            ForcefieldKind::Ocean { fluid, current } => FluidDomain::new(
                fluid.clone(),
                surface_point,
                Unit::new_normalize(up),
                current.clone(),
            ),
            ForcefieldKind::Atmosphere { fluid, wind } => FluidDomain::new(
                fluid.clone(),
                surface_point,
                Unit::new_normalize(-up),
                CurrentProfile::Uniform(*wind),
            ),
        });
        self.pose = *pose;
    }

    pub fn remove_from_world(&mut self) {
        self.domain = None;
    }

    /// Replaces the current of an ocean, also in the placed domain. Does
    /// nothing for an atmosphere.
    pub fn set_current(&mut self, new_current: CurrentProfile) {
        if let ForcefieldKind::Ocean { current, .. } = &mut self.kind {
            *current = new_current.clone();
            if let Some(domain) = &mut self.domain {
                domain.set_current(new_current);
            }
        }
    }

    /// Returns the hydrostatic gauge pressure at the given point, or zero
    /// outside the fluid or when the entity is not placed.
    pub fn gauge_pressure(&self, point: &Position, gravity_magnitude: fph) -> fph {
        self.domain
            .as_ref()
            .map_or(0.0, |domain| domain.gauge_pressure(point, gravity_magnitude))
    }

    pub(super) fn render(&self) -> Option<Renderable> {
        self.domain.as_ref()?;
        Some(Renderable::new(
            RenderableKind::ForceField,
            &self.pose,
            self.appearance,
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::{point, vector};

    fn materials() -> MaterialManager {
        let mut materials = MaterialManager::new();
        materials.create_fluid("Water", 1000.0, 1e-3, 1.33).unwrap();
        materials.create_fluid("Air", 1.2, 1.8e-5, 1.0).unwrap();
        materials
    }

    #[test]
    fn unknown_fluid_is_rejected() {
        let materials = materials();
        assert!(
            ForcefieldEntity::ocean("Ocean", "Oil", CurrentProfile::default(), &materials).is_err()
        );
    }

    #[test]
    fn ocean_surface_follows_placement() {
        let materials = materials();
        let mut ocean =
            ForcefieldEntity::ocean("Ocean", "Water", CurrentProfile::default(), &materials)
                .unwrap();
        assert!(ocean.domain().is_none());
        ocean.add_to_world(&Pose::translation(0.0, 0.0, 2.0));

        let domain = ocean.domain().unwrap();
        assert_abs_diff_eq!(domain.depth(&point![5.0, -3.0, 0.0]), 2.0);
        assert!(!domain.contains(&point![0.0, 0.0, 3.0]));
        assert_abs_diff_eq!(
            ocean.gauge_pressure(&point![0.0, 0.0, 1.0], 9.81),
            1000.0 * 9.81
        );
    }

    #[test]
    fn atmosphere_lies_above_its_surface() {
        let materials = materials();
        let mut air = ForcefieldEntity::atmosphere(
            "Sky",
            "Air",
            vector![3.0, 0.0, 0.0],
            &materials,
        )
        .unwrap();
        air.add_to_world(&Pose::identity());

        let domain = air.domain().unwrap();
        assert!(domain.contains(&point![0.0, 0.0, 10.0]));
        assert!(!domain.contains(&point![0.0, 0.0, -1.0]));
        assert_abs_diff_eq!(domain.velocity_at(&point![0.0, 0.0, 10.0]), vector![3.0, 0.0, 0.0]);
    }

    #[test]
    fn tilted_ocean_measures_depth_along_its_normal() {
        let materials = materials();
        let mut ocean =
            ForcefieldEntity::ocean("Ocean", "Water", CurrentProfile::default(), &materials)
                .unwrap();
        ocean.add_to_world(&Pose::rotation(Vector3::x() * std::f64::consts::PI));

        // Upside down, the fluid is above the surface
        assert!(ocean.domain().unwrap().contains(&point![0.0, 0.0, 1.0]));
    }

    #[test]
    fn removed_forcefield_exerts_no_pressure() {
        let materials = materials();
        let mut ocean =
            ForcefieldEntity::ocean("Ocean", "Water", CurrentProfile::default(), &materials)
                .unwrap();
        ocean.add_to_world(&Pose::identity());
        ocean.remove_from_world();
        assert!(!ocean.is_in_world());
        assert_eq!(ocean.gauge_pressure(&point![0.0, 0.0, -5.0], 9.81), 0.0);
        assert!(ocean.render().is_none());
    }
}
