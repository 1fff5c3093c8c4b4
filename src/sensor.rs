//! Sensors sampling the simulated state into bounded histories.

use crate::{
    entity::{EntityID, EntityRegistry},
    fph,
    hydrodynamics::FluidDomain,
    quantities::{Acceleration, Position},
    registry::{Named, define_registry_index},
    timer::{UpdateFrequency, UpdateTimer},
    world::BodySet,
};
use std::{collections::VecDeque, fmt};

define_registry_index!(
    /// Index of a [`Sensor`] in the order of registration.
    SensorIndex
);

/// The simulated state a sensor may observe.
#[derive(Clone, Copy, Debug)]
pub struct SensorContext<'a> {
    pub time: fph,
    pub bodies: &'a BodySet,
    pub entities: &'a EntityRegistry,
    pub fluids: &'a [&'a FluidDomain],
    pub gravity: &'a Acceleration,
}

/// The measurement a [`Sensor`] performs.
pub trait Probe: fmt::Debug + Send {
    /// Names of the values in each sample.
    fn channels(&self) -> &'static [&'static str];

    /// Measures one value per channel, or returns [`None`] if the observed
    /// entity is missing.
    fn measure(&self, context: &SensorContext<'_>) -> Option<Vec<fph>>;

    /// Makes the probe observe the given entity.
    fn attach(&mut self, entity: EntityID);
}

/// Values measured at a point in simulated time.
#[derive(Clone, Debug, PartialEq)]
pub struct SensorSample {
    pub timestamp: fph,
    pub values: Vec<fph>,
}

/// The most recent samples of a sensor, oldest first. A capacity of zero
/// keeps every sample.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SampleHistory {
    samples: VecDeque<SensorSample>,
    capacity: usize,
}

/// A named sensor refreshed at its own update frequency.
#[derive(Debug)]
pub struct Sensor {
    name: String,
    timer: UpdateTimer,
    history: SampleHistory,
    probe: Box<dyn Probe>,
}

/// Pose and velocities of a solid, in world space.
#[derive(Clone, Debug, Default)]
pub struct Odometry {
    entity: Option<EntityID>,
}

/// Hydrostatic gauge pressure at a point fixed to a solid, summed over all
/// fluids.
#[derive(Clone, Debug)]
pub struct Pressure {
    entity: Option<EntityID>,
    local_point: Position,
}

/// Position and velocity of a multibody joint.
#[derive(Clone, Debug)]
pub struct JointEncoder {
    entity: Option<EntityID>,
    link_idx: usize,
}

impl SampleHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Appends the given sample, dropping the oldest when full.
    pub fn push(&mut self, sample: SensorSample) {
        if self.capacity > 0 && self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn latest(&self) -> Option<&SensorSample> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SensorSample> {
        self.samples.iter()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

impl Sensor {
    /// Creates a sensor that refreshes on every step and keeps an unbounded
    /// history.
    pub fn new(name: impl Into<String>, probe: impl Probe + 'static) -> Self {
        Self {
            name: name.into(),
            timer: UpdateTimer::default(),
            history: SampleHistory::new(0),
            probe: Box::new(probe),
        }
    }

    pub fn with_frequency(mut self, frequency: UpdateFrequency) -> Self {
        self.timer.set_frequency(frequency);
        self
    }

    /// Bounds the history to the given number of samples, or keeps every
    /// sample if it is zero.
    pub fn with_history_length(mut self, length: usize) -> Self {
        self.history = SampleHistory::new(length);
        self
    }

    pub fn attached_to(mut self, entity: EntityID) -> Self {
        self.attach(entity);
        self
    }

    pub fn attach(&mut self, entity: EntityID) {
        self.probe.attach(entity);
    }

    pub fn frequency(&self) -> UpdateFrequency {
        self.timer.frequency()
    }

    pub fn channels(&self) -> &'static [&'static str] {
        self.probe.channels()
    }

    /// Returns the index of the channel with the given name.
    pub fn channel_index(&self, channel: &str) -> Option<usize> {
        self.channels().iter().position(|name| *name == channel)
    }

    pub fn history(&self) -> &SampleHistory {
        &self.history
    }

    pub fn latest(&self) -> Option<&SensorSample> {
        self.history.latest()
    }

    /// Returns the most recent value of the given channel.
    pub fn latest_value(&self, channel: usize) -> Option<fph> {
        self.latest()?.values.get(channel).copied()
    }

    /// Advances the sensor's clock by the given step duration and takes a
    /// sample if one is due.
    ///
    /// # Returns
    /// Whether a sample was taken.
    pub fn update(&mut self, step_duration: fph, context: &SensorContext<'_>) -> bool {
        if self.timer.tick(step_duration).is_none() {
            return false;
        }
        self.refresh(context)
    }

    /// Takes a sample regardless of the update frequency.
    pub fn refresh(&mut self, context: &SensorContext<'_>) -> bool {
        match self.probe.measure(context) {
            Some(values) => {
                self.history.push(SensorSample {
                    timestamp: context.time,
                    values,
                });
                true
            }
            None => {
                log::trace!("Sensor {} has nothing to measure", self.name);
                false
            }
        }
    }

    /// Forgets all samples and restarts the clock.
    pub fn reset(&mut self) {
        self.timer.reset();
        self.history.clear();
    }
}

impl Named for Sensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn rename(&mut self, name: String) {
        self.name = name;
    }
}

impl Odometry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Probe for Odometry {
    fn channels(&self) -> &'static [&'static str] {
        &[
            "x", "y", "z", "qw", "qx", "qy", "qz", "vx", "vy", "vz", "wx", "wy", "wz",
        ]
    }

    fn measure(&self, context: &SensorContext<'_>) -> Option<Vec<fph>> {
        let solid = context.entities.get(self.entity?)?.as_solid()?;
        let kinematics = solid.kinematics(context.bodies)?;
        let position = kinematics.center_of_mass;
        let orientation = kinematics.pose.rotation;
        let velocity = kinematics.velocity;
        let angular_velocity = kinematics.angular_velocity;
        Some(vec![
            position.x,
            position.y,
            position.z,
            orientation.w,
            orientation.i,
            orientation.j,
            orientation.k,
            velocity.x,
            velocity.y,
            velocity.z,
            angular_velocity.x,
            angular_velocity.y,
            angular_velocity.z,
        ])
    }

    fn attach(&mut self, entity: EntityID) {
        self.entity = Some(entity);
    }
}

impl Pressure {
    /// Creates a pressure probe at the given point in the shape frame of
    /// the solid it is attached to.
    pub fn new(local_point: Position) -> Self {
        Self {
            entity: None,
            local_point,
        }
    }
}

impl Probe for Pressure {
    fn channels(&self) -> &'static [&'static str] {
        &["pressure"]
    }

    fn measure(&self, context: &SensorContext<'_>) -> Option<Vec<fph>> {
        let solid = context.entities.get(self.entity?)?.as_solid()?;
        let point = solid.transform_point_to_world(context.bodies, &self.local_point)?;
        let gravity_magnitude = context.gravity.norm();
        let pressure = context
            .fluids
            .iter()
            .map(|fluid| fluid.gauge_pressure(&point, gravity_magnitude))
            .sum();
        Some(vec![pressure])
    }

    fn attach(&mut self, entity: EntityID) {
        self.entity = Some(entity);
    }
}

impl JointEncoder {
    pub fn new(link_idx: usize) -> Self {
        Self {
            entity: None,
            link_idx,
        }
    }
}

impl Probe for JointEncoder {
    fn channels(&self) -> &'static [&'static str] {
        &["position", "velocity"]
    }

    fn measure(&self, context: &SensorContext<'_>) -> Option<Vec<fph>> {
        let multibody = context.entities.get(self.entity?)?.as_featherstone()?;
        let (position, velocity) = multibody.joint_state(context.bodies, self.link_idx)?;
        Some(vec![position, velocity])
    }

    fn attach(&mut self, entity: EntityID) {
        self.entity = Some(entity);
    }
}
