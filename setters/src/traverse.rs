//! Running an operation over a package and, optionally, its sub-packages.

use std::path::Path;

use tracing::{debug, warn};

use crate::core::types::Operation;
use crate::error::{Result, SetterError};
use crate::io::packages::{Package, discover_packages};

/// What to do when a package fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Stop at the first failing package and return its error.
    Abort,
    /// Record the failure and continue with the next package.
    Collect,
}

impl ErrorPolicy {
    /// A single package fails fast; a recursive walk isolates failures.
    pub fn for_recursion(recursive: bool) -> Self {
        if recursive {
            ErrorPolicy::Collect
        } else {
            ErrorPolicy::Abort
        }
    }
}

/// How to walk a package tree.
#[derive(Debug, Clone)]
pub struct WalkOptions {
    pub schema_file: String,
    pub recursive: bool,
    pub policy: ErrorPolicy,
    pub operation: Operation,
}

impl WalkOptions {
    pub fn new(schema_file: &str, operation: Operation, recursive: bool) -> Self {
        Self {
            schema_file: schema_file.to_string(),
            recursive,
            policy: ErrorPolicy::for_recursion(recursive),
            operation,
        }
    }
}

/// Result of running an operation on one package.
#[derive(Debug)]
pub struct PipelineRun {
    pub package: Package,
    pub operation: Operation,
    pub count: usize,
    pub error: Option<SetterError>,
}

impl PipelineRun {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Visit every package under `root` in discovery order.
///
/// With [`ErrorPolicy::Abort`] the first failing visit's error is returned.
/// With [`ErrorPolicy::Collect`] every package is visited and failures are
/// recorded in the returned runs.
pub fn walk_packages<F>(root: &Path, options: &WalkOptions, mut visit: F) -> Result<Vec<PipelineRun>>
where
    F: FnMut(&Package) -> Result<usize>,
{
    let packages = discover_packages(root, &options.schema_file, options.recursive)?;
    let mut runs = Vec::with_capacity(packages.len());
    for package in packages {
        debug!(package = %package.dir.display(), operation = %options.operation, "visiting package");
        match visit(&package) {
            Ok(count) => runs.push(PipelineRun {
                package,
                operation: options.operation,
                count,
                error: None,
            }),
            Err(err) if options.policy == ErrorPolicy::Abort => return Err(err),
            Err(err) => {
                warn!(package = %package.dir.display(), error = %err, "package failed; continuing");
                runs.push(PipelineRun {
                    package,
                    operation: options.operation,
                    count: 0,
                    error: Some(err),
                });
            }
        }
    }
    Ok(runs)
}
