//! Utility functions and helpers

pub mod units;
pub mod logging;
pub mod display;

pub use units::*;
pub use logging::*;
pub use display::*;
