//! Test-only helpers for building packages on disk.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use walkdir::WalkDir;

use crate::io::config::SettersConfig;
use crate::io::packages::Package;

const HEADER: &str = "apiVersion: config.kubernetes.io/v1alpha1\nkind: Krmfile\n";

/// A setter as `(name, value, type)` for [`krmfile`].
pub type SetterSpec<'a> = (&'a str, &'a str, Option<&'a str>);

/// Render a schema file declaring `setters` with scalar values.
pub fn krmfile(setters: &[SetterSpec<'_>]) -> String {
    let mut out = HEADER.to_string();
    if setters.is_empty() {
        return out;
    }
    out.push_str("openAPI:\n  definitions:\n");
    for (name, value, ty) in setters {
        out.push_str(&format!("    io.k8s.cli.setters.{name}:\n"));
        if let Some(ty) = ty {
            out.push_str(&format!("      type: {ty}\n"));
        }
        out.push_str("      x-k8s-cli:\n        setter:\n");
        out.push_str(&format!("          name: {name}\n"));
        out.push_str(&format!("          value: \"{value}\"\n"));
    }
    out
}

/// A package in a temporary directory.
pub struct TestPackage {
    dir: TempDir,
    setters: Vec<(String, String, Option<String>)>,
}

impl Default for TestPackage {
    fn default() -> Self {
        Self::new()
    }
}

impl TestPackage {
    /// A package whose schema file declares no setters.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("Krmfile"), HEADER).expect("write Krmfile");
        Self {
            dir,
            setters: Vec::new(),
        }
    }

    /// Declare a setter and rewrite the schema file.
    pub fn setter(mut self, name: &str, value: &str, ty: Option<&str>) -> Self {
        self.setters
            .push((name.to_string(), value.to_string(), ty.map(str::to_string)));
        let specs: Vec<SetterSpec<'_>> = self
            .setters
            .iter()
            .map(|(name, value, ty)| (name.as_str(), value.as_str(), ty.as_deref()))
            .collect();
        let text = krmfile(&specs);
        self.write("Krmfile", &text);
        self
    }

    /// Write a file relative to the package root.
    pub fn resource(self, relative: &str, contents: &str) -> Self {
        self.write(relative, contents);
        self
    }

    pub fn write(&self, relative: &str, contents: &str) {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(&path, contents).expect("write file");
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn package(&self) -> Package {
        Package::new(self.dir.path(), "Krmfile")
    }

    pub fn config(&self) -> SettersConfig {
        SettersConfig::default()
    }

    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.dir.path().join(relative)).expect("read file")
    }

    pub fn schema_text(&self) -> String {
        self.read("Krmfile")
    }

    /// Every file under the package with its contents.
    pub fn snapshot(&self) -> BTreeMap<PathBuf, String> {
        WalkDir::new(self.dir.path())
            .sort_by_file_name()
            .into_iter()
            .map(|entry| entry.expect("walk"))
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| {
                let relative = entry
                    .path()
                    .strip_prefix(self.dir.path())
                    .expect("inside package")
                    .to_path_buf();
                let contents = fs::read_to_string(entry.path()).expect("read file");
                (relative, contents)
            })
            .collect()
    }
}
