//! Package discovery and resource file enumeration.
//!
//! A package is a directory holding a schema file. Its resources are the
//! matching files below it, except those in hidden directories or in nested
//! packages, which own their resources.

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::error::{Result, SetterError};
use crate::io::config::SettersConfig;

/// A package directory and its schema file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub dir: PathBuf,
    pub schema_path: PathBuf,
}

impl Package {
    pub fn new(dir: &Path, schema_file: &str) -> Self {
        Self {
            dir: dir.to_path_buf(),
            schema_path: dir.join(schema_file),
        }
    }
}

/// Packages under `root`: `root` itself first, then (when `recursive`) every
/// nested directory holding a schema file, in lexical depth-first order.
///
/// `root` is always included so that a missing schema file there is reported
/// by the operation rather than silently skipped.
pub fn discover_packages(root: &Path, schema_file: &str, recursive: bool) -> Result<Vec<Package>> {
    let mut packages = vec![Package::new(root, schema_file)];
    if !recursive {
        return Ok(packages);
    }
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| entry.file_type().is_dir() && !is_hidden(entry));
    for entry in walker {
        let entry = entry.map_err(|err| walk_error(root, err))?;
        if entry.path().join(schema_file).is_file() {
            debug!(package = %entry.path().display(), "found nested package");
            packages.push(Package::new(entry.path(), schema_file));
        }
    }
    Ok(packages)
}

/// Resource files of the package at `dir`, in lexical order, relative to
/// `dir`. The package's own schema file is never a resource.
pub fn resource_files(dir: &Path, config: &SettersConfig) -> Result<Vec<PathBuf>> {
    let walker = WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            !is_hidden(entry) && !entry.path().join(&config.schema_file).is_file()
        });

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|err| walk_error(dir, err))?;
        if !entry.file_type().is_file() || !config.is_resource(entry.path()) {
            continue;
        }
        if entry.depth() == 1 && entry.file_name() == config.schema_file.as_str() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(dir)
            .map_or_else(|_| entry.path().to_path_buf(), Path::to_path_buf);
        files.push(relative);
    }
    files.sort();
    Ok(files)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.') && name != "." && name != "..")
}

fn walk_error(root: &Path, err: walkdir::Error) -> SetterError {
    let path = err.path().unwrap_or(root).to_path_buf();
    SetterError::io("walk", &path, err.into())
}
