//! Filesystem side of the setter engine.

pub mod config;
pub mod packages;
pub mod pipeline;
pub mod schema_store;
