//! Definition lookup for the element tree engine
//!
//! The path resolver needs two things from the outside world: the element
//! tree of a data type when an element has to be unfolded, and the canonical
//! url of a resource name when a reference target is checked. Both go through
//! [`DefinitionRegistry`], a read-only lookup that is populated once and then
//! shared freely between threads.
//!
//! [`FhirDefinitions`] is the in-memory implementation, loaded from local
//! directories of definition JSON.
//!
//! # Example
//!
//! ```rust,no_run
//! use kelp_core::canonical::{DefinitionRegistry, FhirDefinitions};
//! use kelp_core::fhir_types::StructureDefinition;
//!
//! # fn example() -> kelp_core::Result<()> {
//! let mut defs = FhirDefinitions::new();
//! defs.load_dir("definitions/hl7.fhir.r4.core")?;
//!
//! let json = defs.find_resource("Observation").expect("Observation is loaded");
//! let mut observation = StructureDefinition::from_json(json)?;
//! let code_text = observation.find_element_by_path("code.text", Some(&defs));
//! assert!(code_text.is_some());
//! # Ok(())
//! # }
//! ```

mod definitions;

pub use definitions::FhirDefinitions;

use crate::fhir_types::StructureDefinition;
use std::sync::Arc;

/// Read-only lookup from a type or resource name to its definition tree
///
/// `name` may be an id, a name, a canonical url or, for base definitions, the
/// type they define.
pub trait DefinitionRegistry: Send + Sync {
    fn lookup(&self, name: &str) -> Option<Arc<StructureDefinition>>;
}

impl<R: DefinitionRegistry + ?Sized> DefinitionRegistry for Arc<R> {
    fn lookup(&self, name: &str) -> Option<Arc<StructureDefinition>> {
        (**self).lookup(name)
    }
}
