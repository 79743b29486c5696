//! Block-driven reserve refresh pipeline

pub mod price_feed;

pub use price_feed::*;
