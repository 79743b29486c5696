//! Pair resolution and reserve snapshot caching

pub mod pair_cache;

pub use pair_cache::*;
