//! Project configuration for kelp

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::KelpError;
use crate::result::Result;

/// Settings read from `kelp.json`, `kelp.yaml` and friends
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KelpConfig {
    /// Directories of definition JSON to load into the registry
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub definitions: Vec<PathBuf>,

    /// Directory written trees go to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,

    /// FHIR version of the loaded definitions (informational)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fhir_version: Option<String>,
}

impl KelpConfig {
    /// Parse a config file, choosing the format by extension
    ///
    /// `.yaml`/`.yml` are YAML; everything else is JSON5, which also accepts
    /// plain JSON, comments and trailing commas.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| KelpError::io_error(path, e))?;
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == "yaml" || ext == "yml");

        let mut config: KelpConfig = if is_yaml {
            serde_yaml::from_str(&content).map_err(|e| KelpError::config_error(e.to_string()))?
        } else {
            json5::from_str(&content).map_err(|e| KelpError::config_error(e.to_string()))?
        };

        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        Ok(config)
    }

    /// Make relative paths relative to `base` instead of the working directory
    pub fn resolve_relative_to(&mut self, base: &Path) {
        for dir in &mut self.definitions {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
        if let Some(output) = &mut self.output
            && output.is_relative()
        {
            *output = base.join(&*output);
        }
    }
}
