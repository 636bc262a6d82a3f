//! Deterministic, pure logic for setter definitions and resource documents.
//!
//! Core modules are free of I/O side effects. They operate on in-memory text
//! and return deterministic outputs suitable for tests.

pub mod definition;
pub mod document;
pub mod filter;
pub mod schema;
pub mod setter_filter;
pub mod types;
pub mod yaml;
