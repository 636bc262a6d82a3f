//! Loading, persisting and restoring a package's schema file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::core::schema::SchemaDocument;
use crate::error::{Result, SetterError};

/// Exact bytes and permissions of a schema file before a mutation.
#[derive(Debug, Clone)]
pub struct SchemaSnapshot {
    path: PathBuf,
    bytes: Vec<u8>,
    permissions: fs::Permissions,
}

impl SchemaSnapshot {
    /// Record the file as it is now. A missing file is `SchemaNotFound`.
    pub fn capture(path: &Path) -> Result<Self> {
        let metadata = fs::metadata(path).map_err(|err| not_found_or(path, "stat", err))?;
        let bytes = fs::read(path).map_err(|err| not_found_or(path, "read", err))?;
        debug!(path = %path.display(), bytes = bytes.len(), "captured schema snapshot");
        Ok(Self {
            path: path.to_path_buf(),
            bytes,
            permissions: metadata.permissions(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The captured content as text; non-UTF-8 content is a `Parse` error.
    pub fn text(&self) -> Result<&str> {
        std::str::from_utf8(&self.bytes)
            .map_err(|err| SetterError::parse(&self.path, format!("not UTF-8: {err}")))
    }

    /// Write the captured bytes and permissions back.
    pub fn restore(&self) -> io::Result<()> {
        fs::write(&self.path, &self.bytes)?;
        fs::set_permissions(&self.path, self.permissions.clone())?;
        debug!(path = %self.path.display(), "restored schema snapshot");
        Ok(())
    }
}

/// Read and parse the schema file at `path`.
pub fn load_schema(path: &Path, prefix: &str) -> Result<SchemaDocument> {
    let text = fs::read_to_string(path).map_err(|err| not_found_or(path, "read", err))?;
    SchemaDocument::parse(path, &text, prefix)
}

/// Write the rendered schema back to its file.
pub fn persist_schema(schema: &SchemaDocument) -> Result<()> {
    let path = schema.path();
    fs::write(path, schema.render()).map_err(|err| SetterError::io("write", path, err))?;
    debug!(path = %path.display(), "persisted schema");
    Ok(())
}

fn not_found_or(path: &Path, action: &'static str, err: io::Error) -> SetterError {
    if err.kind() == io::ErrorKind::NotFound {
        SetterError::SchemaNotFound {
            path: path.to_path_buf(),
        }
    } else {
        SetterError::io(action, path, err)
    }
}
