//! Configuration system for kelp
//!
//! A project can name the definition directories to load and the output
//! directory once, in a config file, instead of passing them on every run.
//!
//! ## Configuration Files
//!
//! Searched in this order, in the start directory and then each parent:
//! - `.kelprc.json`, `kelp.jsonc`, `kelp.json` - JSON with comments and trailing commas
//! - `kelp.yaml`, `kelp.yml` - YAML
//!
//! Relative paths are resolved against the directory of the config file.
//!
//! ## Example Configuration
//!
//! ```jsonc
//! {
//!   "definitions": ["./fhir/hl7.fhir.r4.core", "./fhir/hl7.fhir.us.core"],
//!   "output": "./out",
//!   "fhirVersion": "4.0.1"
//! }
//! ```

mod kelp_config;
mod loader;

pub use kelp_config::KelpConfig;
pub use loader::{CONFIG_FILE_NAMES, ConfigLoader};
