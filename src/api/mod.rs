//! HTTP read API

pub mod state;
pub mod handlers;
pub mod server;

pub use state::*;
pub use server::*;
