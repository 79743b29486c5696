//! Error taxonomy for the scanner

pub mod scan_error;

pub use scan_error::*;
