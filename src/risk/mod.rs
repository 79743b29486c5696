//! Position sizing and portfolio risk gating

pub mod gate;

pub use gate::*;
