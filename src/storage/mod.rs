//! Durable opportunity store (SQLite behind a writer thread)

pub mod records;
pub mod schema;
pub mod writer;

pub use records::*;
pub use schema::*;
pub use writer::*;
