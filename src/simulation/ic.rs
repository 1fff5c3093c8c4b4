//! Settling a scenario into a resting configuration before it is run.

use super::SimulationManager;
use crate::{
    fph,
    quantities::{Orientation, Position, orientation_difference_angle},
    world::{BodySet, DynamicsWorld},
};

/// Position and orientation of every rigid body and multibody link.
fn configuration_snapshot(bodies: &BodySet) -> Vec<(Position, Orientation)> {
    let mut snapshot: Vec<_> = bodies
        .rigid_bodies()
        .map(|(_, body)| (*body.position(), *body.orientation()))
        .collect();
    for (_, multibody) in bodies.multibodies() {
        snapshot.extend(multibody.links().iter().map(|link| {
            let pose = &link.state().pose;
            (Position::from(pose.translation.vector), pose.rotation)
        }));
    }
    snapshot
}

/// Largest displacement and largest rotation between two snapshots of the
/// same bodies.
fn max_configuration_change(
    before: &[(Position, Orientation)],
    after: &[(Position, Orientation)],
) -> (fph, fph) {
    before
        .iter()
        .zip(after)
        .fold((0.0, 0.0), |(linear, angular), (a, b)| {
            (
                fph::max(linear, (b.0 - a.0).norm()),
                fph::max(angular, orientation_difference_angle(&a.1, &b.1)),
            )
        })
}

/// Number of settling steps of the given duration that fit within the
/// given simulated time.
fn iterations_within_time(max_time: fph, step_duration: fph) -> u32 {
    // Tolerate round-off in the quotient so that an exact multiple counts
    ((max_time / step_duration) * (1.0 + 1e-12)).floor() as u32
}

impl<W: DynamicsWorld> SimulationManager<W> {
    /// Lets the scenario settle under contact, joint and fluid forces, with
    /// all velocities removed after every step, until no body moves more
    /// than the configured tolerances over one step. Simulation time does
    /// not advance, and sensors, controllers and actuators stay idle.
    ///
    /// The time limit counts simulated settling time, one step duration per
    /// iteration.
    ///
    /// Returns whether the configuration converged within the iteration and
    /// time limits. Either way the velocities are zero afterwards.
    pub fn solve_ic_problem(&mut self) -> bool {
        hydrosim_utils::with_timing_info_logging!("Solving initial conditions"; {
            self.settle()
        })
    }

    fn settle(&mut self) -> bool {
        let ic_config = self.config.initial_conditions.clone();
        let step_duration = self.config.step_duration();

        let gravity_was_enabled = self.state.gravity_enabled;
        self.state.settling = true;
        self.state.gravity_enabled = ic_config.gravity_enabled;

        let max_iterations = ic_config
            .max_iterations
            .min(iterations_within_time(ic_config.max_time, step_duration));
        let mut converged = false;
        let mut n_iterations = 0;

        self.world.bodies_mut().zero_velocities();

        while n_iterations < max_iterations {
            let before = configuration_snapshot(self.world.bodies());

            self.world.step_simulation(step_duration, &mut self.state);
            self.world.bodies_mut().zero_velocities();
            n_iterations += 1;

            let after = configuration_snapshot(self.world.bodies());
            let (linear_change, angular_change) = max_configuration_change(&before, &after);
            log::trace!(
                "IC iteration {}: max displacement {:.3e} m, max rotation {:.3e} rad",
                n_iterations,
                linear_change,
                angular_change
            );

            if linear_change <= ic_config.linear_tolerance
                && angular_change <= ic_config.angular_tolerance
            {
                converged = true;
                break;
            }
        }

        self.state.settling = false;
        self.state.gravity_enabled = gravity_was_enabled;
        self.state.reset_motion_estimates(self.world.bodies());

        if converged {
            log::info!("Initial conditions converged after {} iterations", n_iterations);
        } else {
            log::warn!(
                "Initial conditions did not converge after {} iterations ({:.3} s simulated)",
                n_iterations,
                fph::from(n_iterations) * step_duration
            );
        }
        converged
    }
}
