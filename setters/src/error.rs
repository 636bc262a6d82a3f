//! Error taxonomy shared by the setter library.
//!
//! The CLI layer wraps these in `anyhow`, but library entry points return the
//! typed [`SetterError`] so callers (and the traversal controller) can tell a
//! missing setter from an I/O failure.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type for setter operations.
pub type Result<T> = std::result::Result<T, SetterError>;

#[derive(Debug, Error)]
pub enum SetterError {
    #[error("schema file {} not found", path.display())]
    SchemaNotFound { path: PathBuf },

    #[error("setter {name:?} does not exist")]
    SetterNotFound { name: String },

    #[error("setter {name:?} already exists")]
    AlreadyExists { name: String },

    #[error("invalid value {value:?} for setter {name:?}: {reason}")]
    Validation {
        name: String,
        value: String,
        reason: String,
    },

    #[error("setter {name:?} cannot have both a value and list values")]
    Conflict { name: String },

    #[error("parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("setter {name:?} is referenced by {count} field(s); use --force to clear the references")]
    Referenced { name: String, count: usize },

    #[error("{action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("revert {} failed: {source} (after: {original})", path.display())]
    RevertFailed {
        path: PathBuf,
        original: String,
        #[source]
        source: io::Error,
    },
}

impl SetterError {
    pub fn io(action: &'static str, path: &Path, source: io::Error) -> Self {
        Self::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn parse(path: &Path, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    /// True for both flavors of not-found (missing schema file or setter).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::SchemaNotFound { .. } | Self::SetterNotFound { .. }
        )
    }
}
