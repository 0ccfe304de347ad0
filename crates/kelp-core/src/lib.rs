//! Kelp Core
//!
//! Element tree engine for FHIR Shorthand (FSH) profiles.
//! This crate holds a StructureDefinition's elements as an ordered tree,
//! resolves FSH paths against it (unfolding data types and creating slices
//! as the path demands), and reports what changed as a differential.

pub mod canonical;
pub mod config;
pub mod error;
pub mod fhir_types;
pub mod path_resolver;
pub mod result;

pub use canonical::{DefinitionRegistry, FhirDefinitions};
pub use config::{ConfigLoader, KelpConfig};
pub use error::{ErrorKind, KelpError};
pub use fhir_types::{ElementDefinition, StructureDefinition};
pub use path_resolver::{Bracket, PathError, PathSegment, SoftIndexOp, parse_path};
pub use result::{Result, ResultExt};

/// Initialize the tracing subscriber for logging
pub fn init_tracing() {
    init_tracing_with("kelp_core=info,kelp_cli=info");
}

/// Initialize tracing with a default filter, still overridable through `RUST_LOG`
pub fn init_tracing_with(default_filter: &str) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
