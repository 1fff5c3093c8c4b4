//! Controllers closing the loop from sensors to actuators.

use crate::{
    actuator::{Actuator, ActuatorIndex},
    fph,
    registry::{Named, Registry, define_registry_index},
    sensor::{Sensor, SensorIndex},
    timer::{UpdateFrequency, UpdateTimer},
};
use anyhow::{Result, bail};
use std::fmt;

define_registry_index!(
    /// Index of a [`Controller`] in the order of registration.
    ControllerIndex
);

/// The rule a [`Controller`] applies when it is refreshed.
pub trait ControlLaw: fmt::Debug + Send {
    /// Reads the sensors and writes actuator setpoints, given the time since
    /// the previous refresh.
    fn control(
        &mut self,
        elapsed: fph,
        sensors: &Registry<SensorIndex, Sensor>,
        actuators: &mut Registry<ActuatorIndex, Actuator>,
    );

    /// Forgets any accumulated state.
    fn reset(&mut self) {}
}

/// A named controller refreshed at its own update frequency.
#[derive(Debug)]
pub struct Controller {
    name: String,
    timer: UpdateTimer,
    law: Box<dyn ControlLaw>,
}

/// Gains of a [`PidController`].
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PidGains {
    pub proportional: fph,
    pub integral: fph,
    pub derivative: fph,
}

/// Drives one sensor channel towards a setpoint through one actuator.
#[derive(Clone, Debug)]
pub struct PidController {
    sensor: SensorIndex,
    channel: usize,
    actuator: ActuatorIndex,
    setpoint: fph,
    gains: PidGains,
    output_limit: fph,
    integral: fph,
    previous_error: Option<fph>,
}

impl Controller {
    /// Creates a controller that refreshes on every step.
    pub fn new(name: impl Into<String>, law: impl ControlLaw + 'static) -> Self {
        Self {
            name: name.into(),
            timer: UpdateTimer::default(),
            law: Box::new(law),
        }
    }

    pub fn with_frequency(mut self, frequency: UpdateFrequency) -> Self {
        self.timer.set_frequency(frequency);
        self
    }

    pub fn frequency(&self) -> UpdateFrequency {
        self.timer.frequency()
    }

    /// Advances the controller's clock and applies its law if a refresh is
    /// due.
    ///
    /// # Returns
    /// Whether the law was applied.
    pub fn update(
        &mut self,
        step_duration: fph,
        sensors: &Registry<SensorIndex, Sensor>,
        actuators: &mut Registry<ActuatorIndex, Actuator>,
    ) -> bool {
        let Some(elapsed) = self.timer.tick(step_duration) else {
            return false;
        };
        self.law.control(elapsed, sensors, actuators);
        true
    }

    pub fn reset(&mut self) {
        self.timer.reset();
        self.law.reset();
    }
}

impl Named for Controller {
    fn name(&self) -> &str {
        &self.name
    }

    fn rename(&mut self, name: String) {
        self.name = name;
    }
}

impl PidController {
    /// Creates a PID controller reading the given channel of the given
    /// sensor and setting the given actuator's setpoint, bounded in
    /// magnitude by the given limit.
    ///
    /// # Errors
    /// Returns an error if the output limit is not positive.
    pub fn new(
        sensor: SensorIndex,
        channel: usize,
        actuator: ActuatorIndex,
        gains: PidGains,
        output_limit: fph,
    ) -> Result<Self> {
        if !(output_limit > 0.0) {
            bail!("Invalid PID output limit: {output_limit}");
        }
        Ok(Self {
            sensor,
            channel,
            actuator,
            setpoint: 0.0,
            gains,
            output_limit,
            integral: 0.0,
            previous_error: None,
        })
    }

    pub fn with_setpoint(mut self, setpoint: fph) -> Self {
        self.setpoint = setpoint;
        self
    }

    pub fn setpoint(&self) -> fph {
        self.setpoint
    }

    pub fn set_setpoint(&mut self, setpoint: fph) {
        self.setpoint = setpoint;
    }

    fn compute_output(&mut self, measurement: fph, elapsed: fph) -> fph {
        let error = self.setpoint - measurement;
        let derivative = match self.previous_error {
            Some(previous) if elapsed > 0.0 => (error - previous) / elapsed,
            _ => 0.0,
        };
        self.previous_error = Some(error);

        let integral = self.integral + error * elapsed;
        let unclamped = self.gains.proportional * error
            + self.gains.integral * integral
            + self.gains.derivative * derivative;
        let output = unclamped.clamp(-self.output_limit, self.output_limit);

        // Integrate only while unsaturated to avoid windup
        if output == unclamped {
            self.integral = integral;
        }
        output
    }
}

impl ControlLaw for PidController {
    fn control(
        &mut self,
        elapsed: fph,
        sensors: &Registry<SensorIndex, Sensor>,
        actuators: &mut Registry<ActuatorIndex, Actuator>,
    ) {
        let Some(measurement) = sensors
            .get(self.sensor)
            .and_then(|sensor| sensor.latest_value(self.channel))
        else {
            return;
        };
        let output = self.compute_output(measurement, elapsed);
        if let Some(actuator) = actuators.get_mut(self.actuator) {
            actuator.set_setpoint(output);
        }
    }

    fn reset(&mut self) {
        self.integral = 0.0;
        self.previous_error = None;
    }
}
