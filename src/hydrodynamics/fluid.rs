//! Bodies of fluid with a flat free surface.

use crate::{
    fph,
    material::Fluid,
    quantities::{Acceleration, Position, Velocity},
};
use nalgebra::{UnitVector3, Vector3};

/// A region of fluid bounded by a flat free surface, such as an ocean below
/// its surface or an atmosphere above it.
#[derive(Clone, Debug, PartialEq)]
pub struct FluidDomain {
    fluid: Fluid,
    surface_point: Position,
    surface_normal: UnitVector3<fph>,
    current: CurrentProfile,
}

/// How the velocity of a fluid varies with depth below its free surface.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub enum CurrentProfile {
    /// The same velocity at every depth.
    Uniform(Velocity),
    /// A velocity varying linearly from `surface_velocity` at the surface to
    /// `deep_velocity` at `reference_depth`, and constant beyond it.
    Sheared {
        surface_velocity: Velocity,
        deep_velocity: Velocity,
        reference_depth: fph,
    },
}

impl FluidDomain {
    /// Creates a domain filled with the given fluid on the side of the plane
    /// through `surface_point` opposite to `surface_normal`.
    pub fn new(
        fluid: Fluid,
        surface_point: Position,
        surface_normal: UnitVector3<fph>,
        current: CurrentProfile,
    ) -> Self {
        Self {
            fluid,
            surface_point,
            surface_normal,
            current,
        }
    }

    /// Creates a domain of the given fluid occupying everything below the
    /// horizontal plane at the given height.
    pub fn ocean(fluid: Fluid, surface_height: fph, current: CurrentProfile) -> Self {
        Self::new(
            fluid,
            Position::new(0.0, 0.0, surface_height),
            Vector3::z_axis(),
            current,
        )
    }

    /// Creates a domain of the given fluid occupying everything above the
    /// horizontal plane at the given height, moving with the given wind.
    pub fn atmosphere(fluid: Fluid, surface_height: fph, wind: Velocity) -> Self {
        Self::new(
            fluid,
            Position::new(0.0, 0.0, surface_height),
            -Vector3::z_axis(),
            CurrentProfile::Uniform(wind),
        )
    }

    pub fn fluid(&self) -> &Fluid {
        &self.fluid
    }

    /// Returns the unit normal of the free surface, pointing out of the
    /// fluid.
    pub fn surface_normal(&self) -> &UnitVector3<fph> {
        &self.surface_normal
    }

    pub fn current(&self) -> &CurrentProfile {
        &self.current
    }

    pub fn set_current(&mut self, current: CurrentProfile) {
        self.current = current;
    }

    /// Returns how far below the free surface the given point is. The depth
    /// is negative for points outside the fluid.
    #[inline]
    pub fn depth(&self, point: &Position) -> fph {
        self.surface_normal.dot(&(self.surface_point - point))
    }

    /// Whether the given point is inside the fluid.
    pub fn contains(&self, point: &Position) -> bool {
        self.depth(point) >= 0.0
    }

    /// Returns the fluid velocity at the given point, which is zero outside
    /// the fluid.
    pub fn velocity_at(&self, point: &Position) -> Velocity {
        let depth = self.depth(point);
        if depth < 0.0 {
            Velocity::zeros()
        } else {
            self.current.velocity_at_depth(depth)
        }
    }

    /// Returns the fluid acceleration at the given point. Currents are
    /// steady, so this is always zero.
    pub fn acceleration_at(&self, _point: &Position) -> Acceleration {
        Acceleration::zeros()
    }

    /// Computes the hydrostatic pressure above the surface pressure at the
    /// given point for the given gravitational acceleration magnitude.
    pub fn gauge_pressure(&self, point: &Position, gravity_magnitude: fph) -> fph {
        self.fluid.density * gravity_magnitude * self.depth(point).max(0.0)
    }
}

impl CurrentProfile {
    /// Returns the current velocity at the given non-negative depth.
    pub fn velocity_at_depth(&self, depth: fph) -> Velocity {
        match self {
            Self::Uniform(velocity) => *velocity,
            Self::Sheared {
                surface_velocity,
                deep_velocity,
                reference_depth,
            } => {
                if *reference_depth <= 0.0 {
                    return *deep_velocity;
                }
                let fraction = (depth / reference_depth).clamp(0.0, 1.0);
                surface_velocity.lerp(deep_velocity, fraction)
            }
        }
    }
}

impl Default for CurrentProfile {
    fn default() -> Self {
        Self::Uniform(Velocity::zeros())
    }
}
