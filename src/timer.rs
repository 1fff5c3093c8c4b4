//! Frequency gating of per-step updates.

use crate::fph;
use anyhow::{Result, bail};

/// How often a sensor, actuator or controller refreshes its state.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum UpdateFrequency {
    /// Refresh on every physics step.
    #[default]
    EveryStep,
    /// Refresh at the given rate in hertz.
    Hz(fph),
}

/// Accumulates simulated time and reports when the next refresh is due.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UpdateTimer {
    frequency: UpdateFrequency,
    elapsed: fph,
}

impl UpdateFrequency {
    /// Creates a rate in hertz.
    ///
    /// # Errors
    /// Returns an error if the rate is not positive and finite.
    pub fn hz(rate: fph) -> Result<Self> {
        if !(rate > 0.0 && rate.is_finite()) {
            bail!("Invalid update frequency: {rate} Hz");
        }
        Ok(Self::Hz(rate))
    }

    /// Returns the time between refreshes, or [`None`] for every step.
    pub fn period(&self) -> Option<fph> {
        match self {
            Self::EveryStep => None,
            Self::Hz(rate) => Some(rate.recip()),
        }
    }
}

impl UpdateTimer {
    pub fn new(frequency: UpdateFrequency) -> Self {
        Self {
            frequency,
            elapsed: 0.0,
        }
    }

    pub fn frequency(&self) -> UpdateFrequency {
        self.frequency
    }

    pub fn set_frequency(&mut self, frequency: UpdateFrequency) {
        self.frequency = frequency;
        self.elapsed = 0.0;
    }

    /// Adds the given step duration to the accumulated time.
    ///
    /// # Returns
    /// The time since the previous refresh if a refresh is due, otherwise
    /// [`None`].
    pub fn tick(&mut self, step_duration: fph) -> Option<fph> {
        self.elapsed += step_duration;
        match self.frequency.period() {
            None => Some(std::mem::take(&mut self.elapsed)),
            Some(period) => {
                // Tolerate round-off from summing many small steps
                if self.elapsed + 1e-9 * period >= period {
                    let since_refresh = self.elapsed;
                    self.elapsed = (self.elapsed - period).max(0.0) % period;
                    Some(since_refresh)
                } else {
                    None
                }
            }
        }
    }

    pub fn reset(&mut self) {
        self.elapsed = 0.0;
    }
}

impl Default for UpdateTimer {
    fn default() -> Self {
        Self::new(UpdateFrequency::EveryStep)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    #[test]
    fn every_step_timer_always_fires() {
        let mut timer = UpdateTimer::default();
        for _ in 0..5 {
            assert_eq!(timer.tick(0.01), Some(0.01));
        }
    }

    #[test]
    fn ten_hz_timer_fires_every_hundred_millisecond_steps() {
        let mut timer = UpdateTimer::new(UpdateFrequency::hz(10.0).unwrap());
        let fired: Vec<usize> = (1..=300)
            .filter(|_| timer.tick(1e-3).is_some())
            .collect();
        assert_eq!(fired, vec![100, 200, 300]);
    }

    #[test]
    fn refresh_reports_time_since_previous_refresh() {
        let mut timer = UpdateTimer::new(UpdateFrequency::Hz(2.0));
        assert_eq!(timer.tick(0.3), None);
        assert_abs_diff_eq!(timer.tick(0.3).unwrap(), 0.6);
    }

    #[test]
    fn invalid_rates_are_rejected() {
        assert!(UpdateFrequency::hz(0.0).is_err());
        assert!(UpdateFrequency::hz(-5.0).is_err());
        assert!(UpdateFrequency::hz(fph::INFINITY).is_err());
    }

    proptest! {
        #[test]
        fn refresh_count_matches_rate(rate in 1.0..100.0_f64, n_steps in 1..5000_usize) {
            let step = 1e-3;
            let mut timer = UpdateTimer::new(UpdateFrequency::Hz(rate));
            let count = (0..n_steps).filter(|_| timer.tick(step).is_some()).count();
            let expected = (n_steps as fph * step * rate).floor() as usize;
            prop_assert!(count.abs_diff(expected) <= 1);
        }
    }
}
