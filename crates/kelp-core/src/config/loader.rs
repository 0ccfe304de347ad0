//! Configuration file discovery and loading

use super::kelp_config::KelpConfig;
use crate::error::KelpError;
use crate::result::Result;
use std::path::{Path, PathBuf};

/// Config file names, highest priority first
pub const CONFIG_FILE_NAMES: &[&str] = &[
    ".kelprc.json",
    "kelp.jsonc",
    "kelp.json",
    "kelp.yaml",
    "kelp.yml",
];

/// Configuration loader for discovering and loading config files
pub struct ConfigLoader;

impl ConfigLoader {
    /// Auto-discover a config file by traversing upward from `start_path`
    ///
    /// In each directory the names in [`CONFIG_FILE_NAMES`] are tried in
    /// order; the search stops at the first hit or at the filesystem root.
    pub fn auto_discover(start_path: &Path) -> Result<Option<PathBuf>> {
        let mut current = start_path
            .canonicalize()
            .map_err(|e| KelpError::config_error(format!("Invalid path: {e}")))?;

        loop {
            for filename in CONFIG_FILE_NAMES {
                let config_path = current.join(filename);
                if config_path.is_file() {
                    tracing::debug!("Found config: {}", config_path.display());
                    return Ok(Some(config_path));
                }
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => break,
            }
        }

        Ok(None)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<KelpConfig> {
        KelpConfig::load(path).map_err(|e| {
            KelpError::config_error(format!(
                "Failed to load config from '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Load config from an explicit path, or discover one
    ///
    /// An explicit path must exist. Without one, discovery starts at
    /// `start_dir` (default: the current directory); finding nothing yields
    /// the default configuration.
    pub fn load(custom_path: Option<&Path>, start_dir: Option<&Path>) -> Result<KelpConfig> {
        if let Some(path) = custom_path {
            if !path.is_file() {
                return Err(KelpError::config_error(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            return Self::load_from_file(path);
        }

        let search_dir = start_dir.unwrap_or_else(|| Path::new("."));
        match Self::auto_discover(search_dir)? {
            Some(config_path) => Self::load_from_file(&config_path),
            None => {
                tracing::debug!("No config file found, using defaults");
                Ok(KelpConfig::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_temp_config(dir: &Path, filename: &str, content: &str) -> PathBuf {
        let path = dir.join(filename);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_auto_discover_from_nested() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("profiles/nested");
        fs::create_dir_all(&nested).unwrap();
        create_temp_config(temp_dir.path(), "kelp.json", r#"{"definitions": ["defs"]}"#);

        let found = ConfigLoader::auto_discover(&nested).unwrap();
        assert_eq!(found.unwrap().file_name().unwrap(), "kelp.json");
    }

    #[test]
    fn test_auto_discover_priority() {
        let temp_dir = TempDir::new().unwrap();
        create_temp_config(temp_dir.path(), "kelp.yaml", "definitions: []");
        create_temp_config(temp_dir.path(), ".kelprc.json", "{}");
        create_temp_config(temp_dir.path(), "kelp.json", "{}");

        let found = ConfigLoader::auto_discover(temp_dir.path()).unwrap();
        assert_eq!(found.unwrap().file_name().unwrap(), ".kelprc.json");
    }

    #[test]
    fn test_load_discovered_resolves_paths() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("sub");
        fs::create_dir_all(&nested).unwrap();
        create_temp_config(temp_dir.path(), "kelp.yml", "definitions:\n  - defs\n");

        let config = ConfigLoader::load(None, Some(&nested)).unwrap();
        let expected = temp_dir.path().canonicalize().unwrap().join("defs");
        assert_eq!(config.definitions, vec![expected]);
    }

    #[test]
    fn test_load_explicit_missing() {
        let err = ConfigLoader::load(Some(Path::new("nonexistent.json")), None).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn test_load_invalid_json() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = create_temp_config(temp_dir.path(), "kelp.json", "{ invalid json ");

        let result = ConfigLoader::load_from_file(&config_path);
        assert!(matches!(result, Err(KelpError::ConfigError { .. })));
    }
}
