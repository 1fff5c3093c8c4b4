//! End-to-end scenario tests.

use approx::assert_abs_diff_eq;
use hydrosim::{
    SimulationConfig, SimulationManager,
    entity::{EntityID, SolidEntity, StaticEntity},
    geometry::Shape,
    quantities::Pose,
    scenarios::FallingSphere,
    simulation::ICSolverConfig,
    world::DynamicsWorld,
};

fn config() -> SimulationConfig {
    SimulationConfig {
        drawing_enabled: false,
        ..Default::default()
    }
}

fn falling_sphere(config: SimulationConfig) -> (SimulationManager, EntityID, EntityID) {
    let mut manager = SimulationManager::new(config).unwrap();
    manager.build_scenario(&FallingSphere::default()).unwrap();
    let floor = manager.entity_id("Floor").unwrap();
    let ball = manager.entity_id("Ball").unwrap();
    (manager, floor, ball)
}

#[test]
fn sphere_dropped_on_plane_comes_to_rest_in_contact() {
    let (mut manager, floor, ball) = falling_sphere(config());

    let ball_entity = manager.get_entity(ball).unwrap().as_solid().unwrap();
    let mass = ball_entity.mass();
    assert_abs_diff_eq!(
        mass,
        2000.0 * 4.0 / 3.0 * std::f64::consts::PI * 0.1_f64.powi(3),
        epsilon = 1e-9
    );

    assert!(manager.solve_ic_problem());
    assert_eq!(manager.simulation_time(), 0.0);
    assert_abs_diff_eq!(
        manager.solid_kinematics(ball).unwrap().center_of_mass.z,
        1.0,
        epsilon = 1e-12
    );

    manager.run_for(4.0);

    let contact = manager.find_contact(floor, ball).unwrap();
    assert!(!contact.points().is_empty());

    let kinematics = manager.solid_kinematics(ball).unwrap();
    assert!(kinematics.velocity.norm() < 1e-2);
    assert_abs_diff_eq!(kinematics.center_of_mass.z, 0.1, epsilon = 1e-2);
    assert_abs_diff_eq!(contact.latest_normal_force(), mass * 9.81, epsilon = 0.1 * mass * 9.81);
}

#[test]
fn disabled_pair_never_touches() {
    let (mut manager, floor, ball) = falling_sphere(config());
    manager.disable_collision(ball, floor);

    for _ in 0..400 {
        manager.advance_simulation();
        assert!(manager.world().collision_manifolds().is_empty());
    }

    assert!(manager.find_contact(floor, ball).unwrap().points().is_empty());
    assert!(manager.solid_kinematics(ball).unwrap().center_of_mass.z < -0.1);
}

#[test]
fn exclusive_filter_needs_explicit_pairs() {
    let config = SimulationConfig {
        collision_filter: hydrosim::simulation::CollisionFilter::Exclusive,
        ..config()
    };
    let (mut manager, floor, ball) = falling_sphere(config.clone());
    manager.run_for(1.0);
    assert!(manager.find_contact(floor, ball).unwrap().points().is_empty());

    let (mut manager, floor, ball) = falling_sphere(config);
    manager.enable_collision(floor, ball);
    manager.run_for(1.0);
    assert!(!manager.find_contact(floor, ball).unwrap().points().is_empty());
}

#[test]
fn identical_scenarios_evolve_identically() {
    let (mut first, _, first_ball) = falling_sphere(config());
    let (mut second, _, second_ball) = falling_sphere(config());

    for _ in 0..500 {
        first.advance_simulation();
        second.advance_simulation();
    }
    let pose_of = |manager: &SimulationManager, ball| {
        manager
            .get_entity(ball)
            .unwrap()
            .as_solid()
            .unwrap()
            .pose(manager.bodies())
            .unwrap()
    };
    assert_eq!(pose_of(&first, first_ball), pose_of(&second, second_ball));
}

#[test]
fn contact_history_keeps_only_most_recent_points() {
    let (mut manager, floor, ball) = falling_sphere(config());
    assert_eq!(manager.find_contact(floor, ball).unwrap().history_length(), 100);

    let mut manager_short = SimulationManager::new(config()).unwrap();
    manager_short
        .build_scenario(&FallingSphere {
            contact_history_length: 5,
            ..Default::default()
        })
        .unwrap();

    manager.run_for(3.0);
    manager_short.run_for(3.0);

    let long = manager.find_contact(floor, ball).unwrap();
    let short = manager_short
        .contacts()
        .iter()
        .next()
        .map(|(_, contact)| contact)
        .unwrap();
    assert!(long.points().len() > 5);
    assert_eq!(short.points().len(), 5);

    let newest: Vec<_> = long
        .points()
        .iter()
        .skip(long.points().len() - 5)
        .map(|point| point.timestamp)
        .collect();
    let kept: Vec<_> = short.points().iter().map(|point| point.timestamp).collect();
    assert_eq!(kept, newest);
    assert!(kept.windows(2).all(|pair| pair[0] <= pair[1]));
}

#[test]
fn ic_solver_stops_at_iteration_limit() {
    let config = SimulationConfig {
        initial_conditions: ICSolverConfig {
            linear_tolerance: 1e-12,
            max_iterations: 20,
            gravity_enabled: true,
            ..Default::default()
        },
        ..config()
    };
    let (mut manager, _, ball) = falling_sphere(config);

    assert!(!manager.solve_ic_problem());
    assert_eq!(manager.step_count(), 0);
    assert_eq!(manager.simulation_time(), 0.0);

    let kinematics = manager.solid_kinematics(ball).unwrap();
    assert_eq!(kinematics.velocity.norm(), 0.0);
    assert!(kinematics.center_of_mass.z < 1.0);
}

#[test]
fn ic_solver_stops_at_time_limit() {
    let config = SimulationConfig {
        initial_conditions: ICSolverConfig {
            linear_tolerance: 0.0,
            max_time: 0.0,
            gravity_enabled: true,
            ..Default::default()
        },
        ..config()
    };
    let (mut manager, _, _) = falling_sphere(config);
    assert!(!manager.solve_ic_problem());
}

#[test]
fn ic_time_limit_counts_simulated_steps() {
    let config = SimulationConfig {
        steps_per_second: 200.0,
        initial_conditions: ICSolverConfig {
            linear_tolerance: 0.0,
            angular_tolerance: 0.0,
            max_iterations: 1_000_000,
            max_time: 0.05,
            gravity_enabled: true,
        },
        ..config()
    };
    let (mut manager, _, ball) = falling_sphere(config);

    assert!(!manager.solve_ic_problem());

    // Velocities are cleared after every iteration, so each of the ten
    // allowed steps drops the ball by g*dt^2
    let step_drop = 9.81 / (200.0 * 200.0);
    let drop = 1.0 - manager.solid_kinematics(ball).unwrap().center_of_mass.z;
    assert_abs_diff_eq!(drop, 10.0 * step_drop, epsilon = 0.5 * step_drop);
}

#[test]
fn jointed_bodies_hang_from_static_anchor() {
    let mut manager = SimulationManager::new(config()).unwrap();
    manager
        .materials_mut()
        .create_material("Steel", 7800.0, 0.3)
        .unwrap();

    let shape = Shape::Sphere { radius: 0.05 };
    let anchor = StaticEntity::new("Anchor", shape, "Steel", manager.materials()).unwrap();
    let anchor = manager
        .add_static_entity(anchor, &Pose::translation(0.0, 0.0, 2.0))
        .unwrap();
    let shape = Shape::Sphere { radius: 0.1 };
    let bob = SolidEntity::new("Bob", shape, "Steel", manager.materials()).unwrap();
    let bob = manager
        .add_solid_entity(bob, &Pose::translation(0.5, 0.0, 2.0))
        .unwrap();
    manager
        .add_joint(hydrosim::joint::Joint::new(
            "Pivot",
            hydrosim::world::JointKind::Spherical,
            anchor,
            Some(bob),
            Pose::translation(0.0, 0.0, 2.0),
        ))
        .unwrap();

    manager.run_for(1.0);
    let position = manager.solid_kinematics(bob).unwrap().center_of_mass;
    let distance = (position - nalgebra::point![0.0, 0.0, 2.0]).norm();
    assert_abs_diff_eq!(distance, 0.5, epsilon = 1e-2);
    assert!(position.z < 2.0);
}
