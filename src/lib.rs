//! Fixed-step simulation of rigid bodies and multibodies moving through
//! water and air, with sensors, actuators and controllers for marine
//! robots.

pub mod actuator;
pub mod contact;
pub mod controller;
pub mod entity;
pub mod geometry;
pub mod hydrodynamics;
pub mod inertia;
pub mod joint;
pub mod material;
pub mod name;
pub mod quantities;
pub mod registry;
pub mod rendering;
pub mod scenarios;
pub mod sensor;
pub mod simulation;
pub mod timer;
pub mod world;

pub use scenarios::Scenario;
pub use simulation::{SimulationConfig, SimulationManager};

/// Floating point type used for physics simulation.
#[allow(non_camel_case_types)]
pub type fph = f64;
