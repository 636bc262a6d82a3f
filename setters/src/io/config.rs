//! Optional configuration read from `setters.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// File name looked up in the target directory when `--config` is not given.
pub const CONFIG_FILE: &str = "setters.toml";

/// Setter engine configuration (TOML).
///
/// Missing fields default to the conventions used by existing packages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SettersConfig {
    /// Name of the schema file that marks a package directory.
    pub schema_file: String,

    /// Key prefix of setter definitions under `openAPI.definitions`.
    pub definition_prefix: String,

    /// Extensions of resource files read by the pipeline.
    pub resource_extensions: Vec<String>,

    /// Write resource files even when their bytes did not change.
    pub rewrite_unchanged: bool,
}

impl Default for SettersConfig {
    fn default() -> Self {
        Self {
            schema_file: "Krmfile".to_string(),
            definition_prefix: "io.k8s.cli.setters.".to_string(),
            resource_extensions: vec!["yaml".to_string(), "yml".to_string()],
            rewrite_unchanged: false,
        }
    }
}

impl SettersConfig {
    pub fn validate(&self) -> Result<()> {
        let schema_file = self.schema_file.trim();
        if schema_file.is_empty() {
            return Err(anyhow!("schema_file must be non-empty"));
        }
        if schema_file.contains(['/', '\\']) {
            return Err(anyhow!("schema_file must be a file name, not a path"));
        }
        if self.definition_prefix.trim().is_empty() {
            return Err(anyhow!("definition_prefix must be non-empty"));
        }
        if self.resource_extensions.is_empty() {
            return Err(anyhow!("resource_extensions must be a non-empty array"));
        }
        if let Some(ext) = self
            .resource_extensions
            .iter()
            .find(|ext| ext.trim().is_empty() || ext.starts_with('.'))
        {
            return Err(anyhow!(
                "resource_extensions entries must be bare extensions, got {ext:?}"
            ));
        }
        Ok(())
    }

    /// True if `path` has one of the configured resource extensions.
    pub fn is_resource(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.resource_extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            })
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `SettersConfig::default()`.
pub fn load_config(path: &Path) -> Result<SettersConfig> {
    if !path.exists() {
        let cfg = SettersConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: SettersConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}
