//! Setter synchronization for packages of resource manifests.
//!
//! A package's schema file declares named, typed setters; fields in the
//! package's YAML resources are bound to setters by a marker comment. This
//! crate keeps both sides in agreement:
//!
//! - **[`core`]**: Pure logic (definitions, schema editing, document bindings,
//!   filters). No I/O.
//! - **[`io`]**: Filesystem side (config, schema persistence, the resource
//!   pipeline, package discovery).
//!
//! [`update`] runs schema mutations transactionally and [`traverse`] walks a
//! package tree with an explicit error policy.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod traverse;
pub mod update;

pub use error::{Result, SetterError};
