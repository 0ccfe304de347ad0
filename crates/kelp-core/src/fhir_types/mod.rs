//! FHIR Type Definitions
//!
//! The StructureDefinition element tree and its elements. These types carry
//! only the members the engine needs to reason about; everything else read
//! from a definition is kept verbatim and written back out.
//!
//! ## Modules
//!
//! - `element` - ElementDefinition, cardinality, types, slicing, baseline diffing
//! - `structure_definition` - the ordered element tree and its mutation API

pub mod element;
pub mod structure_definition;

pub use element::{
    DiscriminatorType, ElementDefinition, ElementDefinitionSlicing, ElementDefinitionType, Max,
    SlicingDiscriminator, SlicingRules,
};
pub use structure_definition::{StructureDefinition, StructureDefinitionKind};
