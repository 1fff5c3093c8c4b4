//! Scenarios populating a simulation, and a few built-in ones.

use crate::{
    actuator::{Actuator, Thruster},
    controller::{Controller, PidController, PidGains},
    entity::{ForcefieldEntity, SolidEntity, StaticEntity, SystemEntity},
    fph,
    geometry::Shape,
    hydrodynamics::CurrentProfile,
    quantities::Pose,
    rendering::Appearance,
    sensor::{Odometry, Pressure, Sensor},
    simulation::SimulationManager,
    timer::UpdateFrequency,
    world::{DynamicsWorld, RigidBodyWorld},
};
use anyhow::{Result, anyhow, bail};
use nalgebra::{Vector3, point, vector};

/// Something that knows how to populate a simulation with materials,
/// entities, joints, sensors, actuators and controllers.
pub trait Scenario<W: DynamicsWorld = RigidBodyWorld> {
    fn name(&self) -> &str;

    /// Registers the contents of the scenario with the given manager,
    /// which holds no entities when this is called.
    ///
    /// # Errors
    /// Returns an error if any part of the scenario cannot be created.
    fn build(&self, manager: &mut SimulationManager<W>) -> Result<()>;
}

/// A rubber ball dropped on a concrete floor.
#[derive(Clone, Debug)]
pub struct FallingSphere {
    /// Height of the ball center above the floor [m].
    pub height: fph,
    pub radius: fph,
    /// Number of contact points kept between ball and floor.
    pub contact_history_length: usize,
}

/// A wooden marker buoy dropped into water under a still atmosphere.
#[derive(Clone, Debug)]
pub struct FloatingBuoy {
    /// Height of the buoy center above the water surface [m].
    pub drop_height: fph,
    pub current: CurrentProfile,
}

/// A small underwater vehicle keeping its depth with a vertical thruster
/// driven by a PID controller.
#[derive(Clone, Debug)]
pub struct DepthHold {
    pub initial_depth: fph,
    pub target_depth: fph,
}

/// Returns the built-in scenario with the given name.
pub fn builtin_scenario(name: &str) -> Option<Box<dyn Scenario>> {
    match name {
        "falling_sphere" => Some(Box::new(FallingSphere::default())),
        "floating_buoy" => Some(Box::new(FloatingBuoy::default())),
        "depth_hold" => Some(Box::new(DepthHold::default())),
        _ => None,
    }
}

/// Names accepted by [`builtin_scenario`].
pub const BUILTIN_SCENARIOS: [&str; 3] = ["falling_sphere", "floating_buoy", "depth_hold"];

impl Default for FallingSphere {
    fn default() -> Self {
        Self {
            height: 1.0,
            radius: 0.1,
            contact_history_length: 100,
        }
    }
}

impl<W: DynamicsWorld> Scenario<W> for FallingSphere {
    fn name(&self) -> &str {
        "FallingSphere"
    }

    fn build(&self, manager: &mut SimulationManager<W>) -> Result<()> {
        let materials = manager.materials_mut();
        materials.create_material("Concrete", 4000.0, 0.2)?;
        materials.create_material("Rubber", 2000.0, 0.5)?;
        if !materials.set_materials_interaction("Concrete", "Rubber", 0.9, 0.7) {
            bail!("Could not set friction between concrete and rubber");
        }

        let floor = StaticEntity::new("Floor", Shape::Plane, "Concrete", manager.materials())?
            .with_appearance(Appearance {
                geometry_id: Some(0),
                look_id: Some(1),
            });
        let floor = manager.add_static_entity(floor, &Pose::identity())?;

        let ball = SolidEntity::new(
            "Ball",
            Shape::Sphere {
                radius: self.radius,
            },
            "Rubber",
            manager.materials(),
        )?
        .with_appearance(Appearance {
            geometry_id: Some(1),
            look_id: Some(2),
        });
        let ball = manager.add_solid_entity(ball, &Pose::translation(0.0, 0.0, self.height))?;

        manager.add_contact(ball, floor, self.contact_history_length);
        Ok(())
    }
}

impl Default for FloatingBuoy {
    fn default() -> Self {
        Self {
            drop_height: 0.5,
            current: CurrentProfile::Uniform(vector![0.2, 0.0, 0.0]),
        }
    }
}

impl<W: DynamicsWorld> Scenario<W> for FloatingBuoy {
    fn name(&self) -> &str {
        "FloatingBuoy"
    }

    fn build(&self, manager: &mut SimulationManager<W>) -> Result<()> {
        let materials = manager.materials_mut();
        materials.create_material("Pine", 500.0, 0.3)?;
        materials.create_fluid("Water", 1000.0, 1.0e-3, 1.33)?;
        materials.create_fluid("Air", 1.2, 1.8e-5, 1.0)?;

        let ocean = ForcefieldEntity::ocean(
            "Ocean",
            "Water",
            self.current.clone(),
            manager.materials(),
        )?;
        manager.add_forcefield_entity(ocean, &Pose::identity())?;

        let atmosphere = ForcefieldEntity::atmosphere(
            "Atmosphere",
            "Air",
            Vector3::zeros(),
            manager.materials(),
        )?;
        manager.add_forcefield_entity(atmosphere, &Pose::identity())?;

        let buoy = SolidEntity::new(
            "Buoy",
            Shape::Sphere { radius: 0.3 },
            "Pine",
            manager.materials(),
        )?;
        let buoy = manager.add_solid_entity(buoy, &Pose::translation(0.0, 0.0, self.drop_height))?;

        manager.add_sensor(
            Sensor::new("BuoyPressure", Pressure::new(point![0.0, 0.0, -0.3]))
                .with_history_length(1000)
                .attached_to(buoy),
        );
        Ok(())
    }
}

impl Default for DepthHold {
    fn default() -> Self {
        Self {
            initial_depth: 1.0,
            target_depth: 2.0,
        }
    }
}

impl<W: DynamicsWorld> Scenario<W> for DepthHold {
    fn name(&self) -> &str {
        "DepthHold"
    }

    fn build(&self, manager: &mut SimulationManager<W>) -> Result<()> {
        let materials = manager.materials_mut();
        materials.create_material("Hull", 1100.0, 0.3)?;
        materials.create_fluid("Water", 1000.0, 1.0e-3, 1.33)?;

        let ocean = ForcefieldEntity::ocean(
            "Ocean",
            "Water",
            CurrentProfile::default(),
            manager.materials(),
        )?;
        manager.add_forcefield_entity(ocean, &Pose::identity())?;

        let hull = SolidEntity::new(
            "Hull",
            Shape::Sphere { radius: 0.25 },
            "Hull",
            manager.materials(),
        )?;

        let mut vehicle = SystemEntity::new("Vehicle");
        let hull = vehicle.add_part(hull, Pose::identity())?;
        vehicle.add_sensor(
            hull,
            Sensor::new("Navigation", Odometry::new())
                .with_frequency(UpdateFrequency::hz(50.0)?)
                .with_history_length(500),
        )?;
        vehicle.add_actuator(
            hull,
            Actuator::new(
                "VerticalThruster",
                Thruster::new(point![0.0, 0.0, 0.0], Vector3::z_axis(), 200.0),
            ),
        )?;
        manager.add_system_entity(vehicle, &Pose::translation(0.0, 0.0, -self.initial_depth))?;

        let sensor = manager
            .sensors()
            .index_of("Navigation")
            .ok_or_else(|| anyhow!("Missing navigation sensor"))?;
        let actuator = manager
            .actuators()
            .index_of("VerticalThruster")
            .ok_or_else(|| anyhow!("Missing vertical thruster"))?;
        let depth_channel = manager
            .get_sensor(sensor)
            .and_then(|navigation| navigation.channel_index("z"))
            .ok_or_else(|| anyhow!("Navigation sensor has no z channel"))?;

        let pid = PidController::new(
            sensor,
            depth_channel,
            actuator,
            PidGains {
                proportional: 400.0,
                integral: 40.0,
                derivative: 300.0,
            },
            200.0,
        )?
        .with_setpoint(-self.target_depth);
        manager.add_controller(
            Controller::new("DepthController", pid).with_frequency(UpdateFrequency::hz(50.0)?),
        );
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::simulation::SimulationConfig;
    use approx::assert_abs_diff_eq;

    fn manager() -> SimulationManager {
        SimulationManager::new(SimulationConfig {
            drawing_enabled: false,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn every_builtin_scenario_builds() {
        for name in BUILTIN_SCENARIOS {
            let mut manager = manager();
            let scenario = builtin_scenario(name).unwrap();
            manager.build_scenario(scenario.as_ref()).unwrap();
            assert!(!manager.entities().is_empty());
        }
        assert!(builtin_scenario("missing").is_none());
    }

    #[test]
    fn rebuilding_replaces_previous_scenario() {
        let mut manager = manager();
        manager.build_scenario(&FallingSphere::default()).unwrap();
        manager.build_scenario(&FallingSphere::default()).unwrap();
        assert_eq!(manager.entities().len(), 2);
        assert_eq!(manager.contacts().len(), 1);
    }

    #[test]
    fn buoy_floats_at_surface() {
        let mut manager = manager();
        manager
            .build_scenario(&FloatingBuoy {
                drop_height: 0.0,
                current: CurrentProfile::default(),
            })
            .unwrap();
        manager.run_for(20.0);

        let buoy = manager.entity_id("Buoy").unwrap();
        let kinematics = manager.solid_kinematics(buoy).unwrap();
        assert!(kinematics.velocity.norm() < 0.05);
        assert!(kinematics.center_of_mass.z.abs() < 0.1);

        let pressure = manager
            .sensor_by_name("BuoyPressure")
            .unwrap()
            .latest_value(0)
            .unwrap();
        assert!(pressure > 0.0);
    }

    #[test]
    fn vehicle_approaches_target_depth() {
        let mut manager = manager();
        manager.build_scenario(&DepthHold::default()).unwrap();
        manager.run_for(30.0);

        let hull = manager.entity_id("Hull").unwrap();
        let depth = -manager.solid_kinematics(hull).unwrap().center_of_mass.z;
        assert_abs_diff_eq!(depth, 2.0, epsilon = 0.2);
    }
}
