//! Configuration of a simulation.

use crate::{
    fph,
    hydrodynamics::HydrodynamicsSettings,
    quantities::Acceleration,
    world::{ConstraintSolverConfig, ConstraintSolverType},
};
use anyhow::{Result, bail};
use nalgebra::vector;

#[cfg(feature = "ron")]
use anyhow::Context;
#[cfg(feature = "ron")]
use std::path::Path;

/// Configuration parameters for a [`SimulationManager`](super::SimulationManager).
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationConfig {
    /// Number of fixed physics steps per simulated second.
    pub steps_per_second: fph,
    pub solver: ConstraintSolverType,
    pub solver_config: ConstraintSolverConfig,
    pub collision_filter: CollisionFilter,
    pub hydrodynamics: HydrodynamicsSettings,
    /// Fluid loads are recomputed on every `hydrodynamics_prescaler`-th step
    /// and reapplied unchanged on the steps in between.
    pub hydrodynamics_prescaler: u32,
    pub gravity: Acceleration,
    pub initial_conditions: ICSolverConfig,
    /// Whether a snapshot of renderables is published after every step.
    pub drawing_enabled: bool,
}

/// Configuration parameters for settling a scenario before it is run.
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
#[derive(Clone, Debug, PartialEq)]
pub struct ICSolverConfig {
    /// Largest displacement of any body over one iteration at which the
    /// scenario counts as settled [m].
    pub linear_tolerance: fph,
    /// Largest rotation of any body over one iteration at which the
    /// scenario counts as settled [rad].
    pub angular_tolerance: fph,
    pub max_iterations: u32,
    /// Upper bound on the simulated time spent settling, counted as the
    /// number of iterations times the step duration [s].
    pub max_time: fph,
    /// Whether gravity acts while settling.
    pub gravity_enabled: bool,
}

/// How the collision pair list of a simulation is interpreted.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum CollisionFilter {
    /// Every pair collides except those in the list.
    #[default]
    Inclusive,
    /// Only the pairs in the list collide.
    Exclusive,
}

impl SimulationConfig {
    /// Returns the duration of one physics step.
    pub fn step_duration(&self) -> fph {
        self.steps_per_second.recip()
    }

    /// Checks that the configuration is usable.
    ///
    /// # Errors
    /// Returns an error if any parameter is out of range.
    pub fn validate(&self) -> Result<()> {
        if !(self.steps_per_second > 0.0 && self.steps_per_second.is_finite()) {
            bail!("Invalid number of steps per second: {}", self.steps_per_second);
        }
        if self.hydrodynamics_prescaler == 0 {
            bail!("Hydrodynamics prescaler must be at least 1");
        }
        if !self.gravity.iter().all(|component| component.is_finite()) {
            bail!("Invalid gravity: {:?}", self.gravity);
        }
        self.solver_config.validate()?;
        self.hydrodynamics.validate()?;
        self.initial_conditions.validate()?;
        Ok(())
    }

    /// Parses the configuration from the RON file at the given path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    #[cfg(feature = "ron")]
    pub fn from_ron_file(file_path: impl AsRef<Path>) -> Result<Self> {
        let file_path = file_path.as_ref();
        let text = std::fs::read_to_string(file_path)
            .with_context(|| format!("Could not open {}", file_path.display()))?;
        let config: Self = ron::from_str(&text)
            .with_context(|| format!("Invalid syntax in {}", file_path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", file_path.display()))?;
        Ok(config)
    }

    /// Writes the configuration as RON to the given path, creating missing
    /// directories.
    ///
    /// # Errors
    /// Returns an error if serialization or writing fails.
    #[cfg(feature = "ron")]
    pub fn write_ron_file(&self, output_file_path: impl AsRef<Path>) -> Result<()> {
        let output_file_path = output_file_path.as_ref();
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        if let Some(parent) = output_file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(output_file_path, text)
            .with_context(|| format!("Could not write {}", output_file_path.display()))
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            steps_per_second: 200.0,
            solver: ConstraintSolverType::default(),
            solver_config: ConstraintSolverConfig::default(),
            collision_filter: CollisionFilter::default(),
            hydrodynamics: HydrodynamicsSettings::default(),
            hydrodynamics_prescaler: 1,
            gravity: vector![0.0, 0.0, -9.81],
            initial_conditions: ICSolverConfig::default(),
            drawing_enabled: true,
        }
    }
}

impl ICSolverConfig {
    /// Checks that the configuration is usable.
    ///
    /// # Errors
    /// Returns an error if a tolerance or the time limit is negative.
    pub fn validate(&self) -> Result<()> {
        if !(self.linear_tolerance >= 0.0) {
            bail!("Invalid IC linear tolerance: {}", self.linear_tolerance);
        }
        if !(self.angular_tolerance >= 0.0) {
            bail!("Invalid IC angular tolerance: {}", self.angular_tolerance);
        }
        if !(self.max_time >= 0.0) {
            bail!("Invalid IC time limit: {}", self.max_time);
        }
        Ok(())
    }
}

impl Default for ICSolverConfig {
    fn default() -> Self {
        Self {
            linear_tolerance: 1e-6,
            angular_tolerance: 1e-5,
            max_iterations: 100_000,
            max_time: 10.0,
            gravity_enabled: false,
        }
    }
}
