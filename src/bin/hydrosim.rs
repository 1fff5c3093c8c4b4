use anyhow::Result;

#[cfg(feature = "cli")]
mod main {
    use super::*;
    use clap::{Parser, ValueEnum};
    use hydrosim::{
        SimulationConfig, SimulationManager,
        registry::Named,
        scenarios::{DepthHold, FallingSphere, FloatingBuoy, Scenario},
    };
    use std::path::PathBuf;

    #[derive(Debug, Parser)]
    #[command(about = "Run a hydrosim scenario without rendering", long_about = None)]
    struct Cli {
        /// Scenario to run
        #[arg(short, long, value_enum, default_value_t = ScenarioChoice::FallingSphere)]
        scenario: ScenarioChoice,

        /// Number of simulated seconds to run for
        #[arg(short, long, default_value_t = 5.0)]
        duration: f64,

        /// Path to a RON file with the simulation configuration (requires
        /// the `ron` feature)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Overrides the number of physics steps per simulated second
        #[arg(long)]
        steps_per_second: Option<f64>,

        /// Settle the scenario before running it
        #[arg(long)]
        solve_ic: bool,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
    enum ScenarioChoice {
        FallingSphere,
        FloatingBuoy,
        DepthHold,
    }

    impl ScenarioChoice {
        fn scenario(self) -> Box<dyn Scenario> {
            match self {
                Self::FallingSphere => Box::new(FallingSphere::default()),
                Self::FloatingBuoy => Box::new(FloatingBuoy::default()),
                Self::DepthHold => Box::new(DepthHold::default()),
            }
        }
    }

    fn load_config(cli: &Cli) -> Result<SimulationConfig> {
        let mut config = match &cli.config {
            #[cfg(feature = "ron")]
            Some(path) => SimulationConfig::from_ron_file(path)?,
            #[cfg(not(feature = "ron"))]
            Some(_) => {
                anyhow::bail!("Reading a configuration file requires the `ron` feature")
            }
            None => SimulationConfig::default(),
        };
        if let Some(steps_per_second) = cli.steps_per_second {
            config.steps_per_second = steps_per_second;
        }
        config.drawing_enabled = false;
        Ok(config)
    }

    pub fn main() -> Result<()> {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

        let cli = Cli::parse();
        let config = load_config(&cli)?;

        let mut manager = SimulationManager::new(config)?;
        manager.build_scenario(cli.scenario.scenario().as_ref())?;

        if cli.solve_ic && !manager.solve_ic_problem() {
            log::warn!("Running from unsettled initial conditions");
        }

        let n_steps = manager.run_for(cli.duration);
        log::info!(
            "Ran {} steps to t = {:.3} s (real-time factor {:.1})",
            n_steps,
            manager.simulation_time(),
            manager.real_time_factor()
        );

        for (_, contact) in manager.contacts().iter() {
            let entities = manager.entities();
            log::info!(
                "Contact {} - {}: {} points, latest normal force {:.3} N",
                entities.entity(contact.entity_a()).name(),
                entities.entity(contact.entity_b()).name(),
                contact.points().len(),
                contact.latest_normal_force()
            );
        }
        for (_, sensor) in manager.sensors().iter() {
            if let Some(sample) = sensor.latest() {
                log::info!("Sensor {}: {:?}", sensor.name(), sample.values);
            }
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    #[cfg(feature = "cli")]
    main::main()?;
    Ok(())
}
