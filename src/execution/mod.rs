//! Simulated execution stepper

pub mod simulation;

pub use simulation::*;
