//! In-memory definition registry loaded from local JSON

use dashmap::DashMap;
use indexmap::IndexMap;
use rayon::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};
use walkdir::WalkDir;

use super::DefinitionRegistry;
use crate::error::KelpError;
use crate::fhir_types::StructureDefinition;
use crate::result::{Result, ResultExt};

/// FHIR definitions indexed by id, name, url and (for base definitions) type
///
/// Raw JSON is kept as loaded; StructureDefinitions are parsed into trees on
/// first lookup and cached, so lookups from many threads share one parse.
#[derive(Debug, Default)]
pub struct FhirDefinitions {
    resources: Vec<Arc<Value>>,
    index: IndexMap<String, usize>,
    parsed: DashMap<usize, Arc<StructureDefinition>>,
}

impl FhirDefinitions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of resources loaded
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Add one resource; Bundles contribute their entries
    ///
    /// Keys already taken by an earlier resource keep pointing at it.
    pub fn add(&mut self, resource: Value) {
        if resource.get("resourceType").and_then(Value::as_str) == Some("Bundle") {
            let entries = resource
                .get("entry")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for entry in entries {
                if let Some(inner) = entry.get("resource") {
                    self.add(inner.clone());
                }
            }
            return;
        }

        let position = self.resources.len();
        let keys = index_keys(&resource);
        if keys.is_empty() {
            trace!("Skipping resource without id, name or url");
            return;
        }
        for key in keys {
            self.index.entry(key).or_insert(position);
        }
        self.resources.push(Arc::new(resource));
    }

    /// Load every `*.json` file below `dir`, returning how many resources were added
    ///
    /// Files are read and parsed in parallel. A file that cannot be read or
    /// is not JSON is logged and skipped.
    pub fn load_dir(&mut self, dir: impl AsRef<Path>) -> Result<usize> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(KelpError::io_error(
                dir,
                std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            ));
        }

        let files: Vec<PathBuf> = WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();

        let parsed: Vec<Value> = files
            .par_iter()
            .filter_map(|path| read_json(path).log_and_continue())
            .collect();

        let before = self.len();
        for resource in parsed {
            self.add(resource);
        }
        let added = self.len() - before;
        debug!("Loaded {} resources from {}", added, dir.display());
        Ok(added)
    }

    /// Raw JSON of the resource known by `name` (id, name, url or type)
    pub fn find_resource(&self, name: &str) -> Option<&Value> {
        self.index
            .get(name)
            .map(|&position| self.resources[position].as_ref())
    }
}

impl DefinitionRegistry for FhirDefinitions {
    fn lookup(&self, name: &str) -> Option<Arc<StructureDefinition>> {
        let position = *self.index.get(name)?;
        let json = &self.resources[position];
        if json.get("resourceType").and_then(Value::as_str) != Some("StructureDefinition") {
            return None;
        }

        // The entry lock is held while parsing, so each definition is parsed once
        self.parsed
            .entry(position)
            .or_try_insert_with(|| StructureDefinition::from_json(json).map(Arc::new))
            .log_and_continue()
            .map(|entry| entry.value().clone())
    }
}

fn read_json(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path).map_err(|e| KelpError::io_error(path, e))?;
    Ok(serde_json::from_str(&content)?)
}

/// Keys a resource is found under
fn index_keys(resource: &Value) -> Vec<String> {
    let mut keys = Vec::new();
    for field in ["id", "name", "url"] {
        if let Some(key) = resource.get(field).and_then(Value::as_str) {
            keys.push(key.to_string());
        }
    }

    let is_structure_definition =
        resource.get("resourceType").and_then(Value::as_str) == Some("StructureDefinition");
    let is_constraint = resource.get("derivation").and_then(Value::as_str) == Some("constraint");
    if is_structure_definition
        && !is_constraint
        && let Some(type_name) = resource.get("type").and_then(Value::as_str)
    {
        keys.push(type_name.to_string());
    }
    keys
}
