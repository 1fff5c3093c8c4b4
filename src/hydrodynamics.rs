//! Buoyancy, viscous damping and added mass acting on solids in fluids.
//!
//! Everything here is pure computation that runs inside the physics step, so
//! no function fails. Degenerate faces and non-finite motion are skipped
//! rather than propagated.

mod buoyancy;
mod coefficients;
mod drag;
mod fluid;

pub use buoyancy::{
    SubmergedVolume, compute_analytic_submerged_volume, compute_submerged_volume_of_mesh,
};
pub use coefficients::HydrodynamicCoefficients;
pub use fluid::{CurrentProfile, FluidDomain};

use crate::{
    fph,
    geometry::{Shape, TriangleMesh},
    quantities::{
        self, Acceleration, AngularAcceleration, AngularVelocity, Force, Pose, Position, Torque,
        Velocity,
    },
};
use anyhow::{Result, bail};
use drag::FaceModel;
use nalgebra::Vector3;
use std::ops::{Add, AddAssign, Mul};

/// How the hydrodynamic loads on solids are computed.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum HydrodynamicsType {
    /// Analytic buoyancy with damping and added mass from diagonal
    /// coefficient matrices.
    TrifoldSymmetry,
    /// Analytic buoyancy with damping and added mass from fully coupled
    /// coefficient matrices.
    FullyCoupled,
    /// Buoyancy, damping and added mass integrated over the submerged part of
    /// the tessellated surface.
    #[default]
    GeometryBased,
}

/// Which hydrodynamic load families are active and how they are computed.
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
#[derive(Clone, Debug, PartialEq)]
pub struct HydrodynamicsSettings {
    pub algorithm: HydrodynamicsType,
    pub buoyancy: bool,
    pub damping: bool,
    pub added_mass: bool,
    /// Upper bound on the ratio between the added mass and the mass of a
    /// solid. Added mass is applied explicitly from the previous step's
    /// acceleration, which diverges unless this stays below one.
    pub max_added_mass_ratio: fph,
    /// Number of latitude bands used when tessellating primitive shapes.
    pub tessellation_resolution: u32,
}

/// A force together with a torque about a body's center of mass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Wrench {
    pub force: Force,
    pub torque: Torque,
}

/// The hydrodynamic loads on a solid from one fluid, each expressed in
/// world space with torques about the center of mass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FluidLoads {
    pub buoyancy: Wrench,
    pub damping: Wrench,
    pub added_mass: Wrench,
    pub submerged_volume: SubmergedVolume,
}

/// The kinematic state of a solid used for computing hydrodynamic loads.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolidKinematics {
    /// The pose of the solid's shape frame.
    pub pose: Pose,
    pub center_of_mass: Position,
    pub velocity: Velocity,
    pub angular_velocity: AngularVelocity,
    pub acceleration: Acceleration,
    pub angular_acceleration: AngularAcceleration,
}

/// Precomputed hydrodynamic description of a solid.
#[derive(Clone, Debug)]
pub struct HydrodynamicModel {
    shape: Shape,
    mesh: TriangleMesh,
    volume: fph,
    layer_thickness: fph,
    drag_coefficient: fph,
    skin_layer_thickness: fph,
    coefficients: HydrodynamicCoefficients,
    custom_coefficients: bool,
}

impl HydrodynamicsSettings {
    /// Checks that the settings are usable.
    ///
    /// # Errors
    /// Returns an error if the added mass ratio is negative or not finite or
    /// the tessellation resolution is too low.
    pub fn validate(&self) -> Result<()> {
        if !(self.max_added_mass_ratio >= 0.0 && self.max_added_mass_ratio.is_finite()) {
            bail!("Invalid maximum added mass ratio: {}", self.max_added_mass_ratio);
        }
        if self.tessellation_resolution < 3 {
            bail!(
                "Tessellation resolution must be at least 3, got {}",
                self.tessellation_resolution
            );
        }
        Ok(())
    }
}

impl Default for HydrodynamicsSettings {
    fn default() -> Self {
        Self {
            algorithm: HydrodynamicsType::default(),
            buoyancy: true,
            damping: true,
            added_mass: true,
            max_added_mass_ratio: 0.5,
            tessellation_resolution: 12,
        }
    }
}

impl Wrench {
    pub fn zero() -> Self {
        Self {
            force: Force::zeros(),
            torque: Torque::zeros(),
        }
    }

    /// Adds the given force acting at the given displacement from the center
    /// of mass.
    pub fn add_force_at(&mut self, force: &Force, displacement: &Vector3<fph>) {
        self.force += force;
        self.torque += displacement.cross(force);
    }

    pub fn is_finite(&self) -> bool {
        quantities::is_finite_vector(&self.force) && quantities::is_finite_vector(&self.torque)
    }
}

impl Default for Wrench {
    fn default() -> Self {
        Self::zero()
    }
}

impl Add for Wrench {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            force: self.force + rhs.force,
            torque: self.torque + rhs.torque,
        }
    }
}

impl AddAssign for Wrench {
    fn add_assign(&mut self, rhs: Self) {
        self.force += rhs.force;
        self.torque += rhs.torque;
    }
}

impl Mul<fph> for Wrench {
    type Output = Self;

    fn mul(self, rhs: fph) -> Self::Output {
        Self {
            force: self.force * rhs,
            torque: self.torque * rhs,
        }
    }
}

impl FluidLoads {
    pub fn none(center_of_mass: Position) -> Self {
        Self {
            buoyancy: Wrench::zero(),
            damping: Wrench::zero(),
            added_mass: Wrench::zero(),
            submerged_volume: SubmergedVolume::empty(center_of_mass),
        }
    }

    /// Returns the sum of all load families.
    pub fn total(&self) -> Wrench {
        self.buoyancy + self.damping + self.added_mass
    }
}

impl HydrodynamicModel {
    /// Default coefficient scaling the pressure drag on faces facing the
    /// flow.
    pub const DEFAULT_DRAG_COEFFICIENT: fph = 1.0;

    /// Default thickness of the viscous boundary layer [m].
    pub const DEFAULT_SKIN_LAYER_THICKNESS: fph = 1e-3;

    /// Builds the hydrodynamic model of the given shape, whose center of
    /// mass lies at the given position in the shape's frame. Returns [`None`]
    /// for unbounded shapes.
    pub fn new(
        shape: &Shape,
        center_of_mass: &Position,
        tessellation_resolution: u32,
    ) -> Option<Self> {
        let mesh = shape.tessellate(tessellation_resolution)?;
        let volume = shape.volume();
        let layer_thickness = added_mass_layer_thickness(&mesh, volume);

        let coefficients = HydrodynamicCoefficients::from_mesh(
            &mesh,
            center_of_mass,
            layer_thickness,
            Self::DEFAULT_DRAG_COEFFICIENT,
            Self::DEFAULT_SKIN_LAYER_THICKNESS,
        );

        Some(Self {
            shape: shape.clone(),
            mesh,
            volume,
            layer_thickness,
            drag_coefficient: Self::DEFAULT_DRAG_COEFFICIENT,
            skin_layer_thickness: Self::DEFAULT_SKIN_LAYER_THICKNESS,
            coefficients,
            custom_coefficients: false,
        })
    }

    /// Rebuilds the surface mesh with the given resolution. Coefficients
    /// set with [`Self::set_coefficients`] and the face drag parameters are
    /// kept, while coefficients derived from the shape are recomputed.
    pub fn retessellate(&mut self, center_of_mass: &Position, tessellation_resolution: u32) {
        let Some(mesh) = self.shape.tessellate(tessellation_resolution) else {
            return;
        };
        self.layer_thickness = added_mass_layer_thickness(&mesh, self.volume);
        self.mesh = mesh;

        if !self.custom_coefficients {
            self.coefficients = HydrodynamicCoefficients::from_mesh(
                &self.mesh,
                center_of_mass,
                self.layer_thickness,
                self.drag_coefficient,
                self.skin_layer_thickness,
            );
        }
    }

    pub fn volume(&self) -> fph {
        self.volume
    }

    /// Returns the tessellated surface in the shape's frame.
    pub fn mesh(&self) -> &TriangleMesh {
        &self.mesh
    }

    pub fn coefficients(&self) -> &HydrodynamicCoefficients {
        &self.coefficients
    }

    /// Replaces the coefficients computed from the shape, which are used by
    /// the analytic algorithms.
    pub fn set_coefficients(&mut self, coefficients: HydrodynamicCoefficients) {
        self.coefficients = coefficients;
        self.custom_coefficients = true;
    }

    /// Sets the drag coefficient and boundary layer thickness used by the
    /// geometry based algorithm.
    pub fn set_face_drag_parameters(&mut self, drag_coefficient: fph, skin_layer_thickness: fph) {
        self.drag_coefficient = drag_coefficient;
        self.skin_layer_thickness = skin_layer_thickness;
    }

    /// Computes the loads exerted by the given fluid on a solid of the given
    /// mass in the given kinematic state.
    pub fn compute_loads(
        &self,
        settings: &HydrodynamicsSettings,
        fluid: &FluidDomain,
        kinematics: &SolidKinematics,
        mass: fph,
        gravity: &Acceleration,
    ) -> FluidLoads {
        let center = Position::from(kinematics.pose.translation.vector);
        if fluid.depth(&center) < -self.shape.bounding_radius() {
            return FluidLoads::none(kinematics.center_of_mass);
        }

        let world_mesh = self.mesh.transformed(&kinematics.pose);

        let submerged_volume = match settings.algorithm {
            HydrodynamicsType::GeometryBased => None,
            HydrodynamicsType::TrifoldSymmetry | HydrodynamicsType::FullyCoupled => {
                compute_analytic_submerged_volume(fluid, &self.shape, &kinematics.pose)
            }
        }
        .unwrap_or_else(|| compute_submerged_volume_of_mesh(fluid, &world_mesh));

        if submerged_volume.is_empty() {
            return FluidLoads::none(kinematics.center_of_mass);
        }

        let mut loads = FluidLoads::none(kinematics.center_of_mass);
        loads.submerged_volume = submerged_volume;

        if settings.buoyancy {
            let force = -fluid.fluid().density * submerged_volume.volume * gravity;
            let mut buoyancy = Wrench::zero();
            buoyancy.add_force_at(
                &force,
                &(submerged_volume.center - kinematics.center_of_mass),
            );
            if buoyancy.is_finite() {
                loads.buoyancy = buoyancy;
            }
        }

        if !settings.damping && !settings.added_mass {
            return loads;
        }

        let (damping, added_mass) = match settings.algorithm {
            HydrodynamicsType::GeometryBased => drag::compute_face_loads(
                fluid,
                &world_mesh,
                kinematics,
                &FaceModel {
                    layer_thickness: self.layer_thickness,
                    drag_coefficient: self.drag_coefficient,
                    skin_layer_thickness: self.skin_layer_thickness,
                },
            ),
            HydrodynamicsType::TrifoldSymmetry => drag::compute_coefficient_loads(
                fluid,
                &self.coefficients.trifold_symmetric(),
                kinematics,
                self.submerged_fraction(&submerged_volume),
            ),
            HydrodynamicsType::FullyCoupled => drag::compute_coefficient_loads(
                fluid,
                &self.coefficients,
                kinematics,
                self.submerged_fraction(&submerged_volume),
            ),
        };

        if settings.damping && damping.is_finite() {
            loads.damping = damping;
        }
        if settings.added_mass && added_mass.is_finite() {
            loads.added_mass = added_mass
                * self.added_mass_scaling(settings, fluid, kinematics, mass, &added_mass);
        }

        loads
    }

    fn submerged_fraction(&self, submerged_volume: &SubmergedVolume) -> fph {
        if self.volume > 0.0 {
            (submerged_volume.volume / self.volume).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Returns the factor the added mass load must be scaled with to keep
    /// the apparent added mass below the allowed fraction of the body mass.
    fn added_mass_scaling(
        &self,
        settings: &HydrodynamicsSettings,
        fluid: &FluidDomain,
        kinematics: &SolidKinematics,
        mass: fph,
        added_mass: &Wrench,
    ) -> fph {
        let allowed_mass = settings.max_added_mass_ratio * mass;

        let apparent_mass = match settings.algorithm {
            HydrodynamicsType::GeometryBased => {
                let acceleration = kinematics.acceleration.norm();
                if acceleration > fph::EPSILON {
                    added_mass.force.norm() / acceleration
                } else {
                    0.0
                }
            }
            HydrodynamicsType::TrifoldSymmetry | HydrodynamicsType::FullyCoupled => {
                fluid.fluid().density
                    * drag::max_translational_added_mass(&self.coefficients.added_mass)
            }
        };

        if apparent_mass > allowed_mass && apparent_mass > 0.0 {
            allowed_mass / apparent_mass
        } else {
            1.0
        }
    }
}

/// Thickness of the fluid layer dragged along by each face, calibrated so
/// that a sphere gets the exact added mass of half its displaced volume.
fn added_mass_layer_thickness(mesh: &TriangleMesh, volume: fph) -> fph {
    let surface_area: fph = mesh
        .triangle_vertex_positions()
        .map(|[v0, v1, v2]| 0.5 * (v1 - v0).cross(&(v2 - v0)).norm())
        .sum();
    if surface_area > 0.0 {
        3.0 * volume / surface_area
    } else {
        0.0
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::material::Fluid;
    use approx::assert_abs_diff_eq;
    use nalgebra::{point, vector};

    fn gravity() -> Acceleration {
        vector![0.0, 0.0, -9.81]
    }

    fn ocean() -> FluidDomain {
        FluidDomain::ocean(Fluid::water(), 0.0, CurrentProfile::default())
    }

    fn resting_kinematics(position: Position) -> SolidKinematics {
        SolidKinematics {
            pose: Pose::translation(position.x, position.y, position.z),
            center_of_mass: position,
            velocity: Velocity::zeros(),
            angular_velocity: AngularVelocity::zeros(),
            acceleration: Acceleration::zeros(),
            angular_acceleration: AngularAcceleration::zeros(),
        }
    }

    fn all_algorithms() -> [HydrodynamicsType; 3] {
        [
            HydrodynamicsType::TrifoldSymmetry,
            HydrodynamicsType::FullyCoupled,
            HydrodynamicsType::GeometryBased,
        ]
    }

    #[test]
    fn submerged_box_feels_archimedes_force_in_every_mode() {
        let shape = Shape::Box {
            half_extents: vector![0.5, 0.5, 0.5],
        };
        let model = HydrodynamicModel::new(&shape, &Position::origin(), 12).unwrap();
        for algorithm in all_algorithms() {
            let settings = HydrodynamicsSettings {
                algorithm,
                ..Default::default()
            };
            let loads = model.compute_loads(
                &settings,
                &ocean(),
                &resting_kinematics(point![0.0, 0.0, -3.0]),
                500.0,
                &gravity(),
            );
            assert_abs_diff_eq!(loads.buoyancy.force, vector![0.0, 0.0, 9810.0], epsilon = 1e-6);
            assert_abs_diff_eq!(loads.buoyancy.torque, Vector3::zeros(), epsilon = 1e-6);
            assert_abs_diff_eq!(loads.damping.force, Vector3::zeros(), epsilon = 1e-9);
        }
    }

    #[test]
    fn disabled_families_produce_no_load() {
        let shape = Shape::Sphere { radius: 0.3 };
        let model = HydrodynamicModel::new(&shape, &Position::origin(), 12).unwrap();
        let settings = HydrodynamicsSettings {
            buoyancy: false,
            damping: false,
            ..Default::default()
        };
        let mut kinematics = resting_kinematics(point![0.0, 0.0, -1.0]);
        kinematics.velocity = vector![1.0, 0.0, 0.0];
        let loads = model.compute_loads(&settings, &ocean(), &kinematics, 100.0, &gravity());
        assert_eq!(loads.buoyancy, Wrench::zero());
        assert_eq!(loads.damping, Wrench::zero());
        assert!(loads.submerged_volume.volume > 0.0);
    }

    #[test]
    fn solid_far_above_surface_is_unaffected() {
        let shape = Shape::Cylinder {
            radius: 0.2,
            length: 1.0,
        };
        let model = HydrodynamicModel::new(&shape, &Position::origin(), 12).unwrap();
        let loads = model.compute_loads(
            &HydrodynamicsSettings::default(),
            &ocean(),
            &resting_kinematics(point![0.0, 0.0, 10.0]),
            10.0,
            &gravity(),
        );
        assert_eq!(loads.total(), Wrench::zero());
    }

    #[test]
    fn buoyancy_offset_from_center_of_mass_produces_torque() {
        let shape = Shape::Box {
            half_extents: vector![1.0, 0.25, 0.25],
        };
        let model = HydrodynamicModel::new(&shape, &Position::origin(), 12).unwrap();
        let mut kinematics = resting_kinematics(Position::origin());
        kinematics.pose.translation.vector = vector![0.0, 0.0, -0.1];
        kinematics.center_of_mass = point![0.5, 0.0, -0.1];

        let loads = model.compute_loads(
            &HydrodynamicsSettings::default(),
            &ocean(),
            &kinematics,
            100.0,
            &gravity(),
        );
        // The center of buoyancy lies on the negative x side of the center of
        // mass, so the upward force rotates the body about +y
        assert!(loads.buoyancy.torque.y > 0.0);
        assert_abs_diff_eq!(loads.buoyancy.torque.x, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn non_finite_pose_produces_no_load() {
        let shape = Shape::Sphere { radius: 0.3 };
        let model = HydrodynamicModel::new(&shape, &Position::origin(), 12).unwrap();
        let kinematics = resting_kinematics(point![0.0, 0.0, fph::NAN]);
        for algorithm in all_algorithms() {
            let settings = HydrodynamicsSettings {
                algorithm,
                ..Default::default()
            };
            let loads = model.compute_loads(&settings, &ocean(), &kinematics, 100.0, &gravity());
            assert_eq!(loads.buoyancy, Wrench::zero());
            assert!(loads.total().is_finite());
        }
    }

    #[test]
    fn added_mass_is_bounded_by_body_mass() {
        let shape = Shape::Sphere { radius: 0.5 };
        let model = HydrodynamicModel::new(&shape, &Position::origin(), 16).unwrap();
        let mut kinematics = resting_kinematics(point![0.0, 0.0, -5.0]);
        kinematics.acceleration = vector![10.0, 0.0, 0.0];
        let mass = 1.0;
        for algorithm in all_algorithms() {
            let settings = HydrodynamicsSettings {
                algorithm,
                damping: false,
                ..Default::default()
            };
            let loads = model.compute_loads(&settings, &ocean(), &kinematics, mass, &gravity());
            assert!(loads.added_mass.force.x < 0.0);
            assert!(loads.added_mass.force.norm() <= 0.5 * mass * 10.0 + 1e-6);
        }
    }
}
