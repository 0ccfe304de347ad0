//! StructureDefinition: the ordered element tree of one profile
//!
//! Elements live in a single `Vec` kept in pre-order: every element's parent
//! comes before it, and an element's descendants follow it contiguously. The
//! slices of an element come after the element's own children, each slice
//! followed by its own children and re-slices.
//!
//! Trees are built from JSON with [`StructureDefinition::from_json`], which
//! captures a baseline on every element. Whatever changes afterwards (new
//! elements, changed members) shows up in the differential of
//! [`StructureDefinition::to_json`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::{debug, warn};

use super::element::{ElementDefinition, slice_base_id};
use crate::error::KelpError;
use crate::result::Result;

/// Top-level members with a typed home on [`StructureDefinition`]
const TYPED_MEMBERS: &[&str] = &[
    "resourceType",
    "id",
    "url",
    "name",
    "kind",
    "type",
    "baseDefinition",
    "derivation",
    "snapshot",
    "differential",
];

/// Kind of structure definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StructureDefinitionKind {
    PrimitiveType,
    ComplexType,
    Resource,
    Logical,
}

/// FHIR StructureDefinition with its element tree
#[derive(Debug, Clone)]
pub struct StructureDefinition {
    /// Logical id of this artifact
    pub id: String,

    /// Canonical identifier for this structure definition
    pub url: String,

    /// Name for this structure definition (computer friendly)
    pub name: Option<String>,

    /// Type defined or constrained by this structure
    pub type_field: String,

    /// primitive-type | complex-type | resource | logical
    pub kind: StructureDefinitionKind,

    /// Definition that this type is constrained/specialized from
    pub base_definition: Option<String>,

    /// specialization | constraint
    pub derivation: Option<String>,

    /// Remaining top-level members, kept in input order
    pub extra: Map<String, Value>,

    pub(crate) elements: Vec<ElementDefinition>,
}

impl StructureDefinition {
    /// Create a definition whose tree holds only the root element
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        type_field: impl Into<String>,
        kind: StructureDefinitionKind,
    ) -> Self {
        let type_field = type_field.into();
        Self {
            id: id.into(),
            url: url.into(),
            name: None,
            elements: vec![ElementDefinition::new(type_field.clone())],
            type_field,
            kind,
            base_definition: None,
            derivation: None,
            extra: Map::new(),
        }
    }

    /// Build a tree from StructureDefinition JSON and capture its baseline
    ///
    /// Elements come from `snapshot.element`; a definition with only a
    /// differential is accepted when its elements form a complete tree.
    pub fn from_json(json: &Value) -> Result<Self> {
        let obj = json
            .as_object()
            .ok_or_else(|| KelpError::invalid_definition("StructureDefinition must be a JSON object"))?;

        if let Some(resource_type) = obj.get("resourceType").and_then(Value::as_str)
            && resource_type != "StructureDefinition"
        {
            return Err(KelpError::invalid_definition(format!(
                "expected resourceType 'StructureDefinition', found '{resource_type}'"
            )));
        }

        let id = required_str(obj, "id", "StructureDefinition")?;
        let context = format!("StructureDefinition '{id}'");
        let url = required_str(obj, "url", &context)?;
        let type_field = required_str(obj, "type", &context)?;
        let kind_value = obj
            .get("kind")
            .ok_or_else(|| KelpError::missing_field("kind", &context))?;
        let kind: StructureDefinitionKind = serde_json::from_value(kind_value.clone())
            .map_err(|_| KelpError::invalid_definition(format!("{context} has unknown kind {kind_value}")))?;

        let raw_elements = match element_array(obj, "snapshot") {
            Some(elements) => elements,
            None => {
                let elements = element_array(obj, "differential")
                    .ok_or_else(|| KelpError::missing_field("snapshot.element", &context))?;
                warn!("{} has no snapshot, building tree from its differential", context);
                elements
            }
        };
        if raw_elements.is_empty() {
            return Err(KelpError::invalid_definition(format!("{context} has no elements")));
        }

        let elements = raw_elements
            .iter()
            .map(ElementDefinition::from_json)
            .collect::<Result<Vec<_>>>()?;

        let extra = obj
            .iter()
            .filter(|(key, _)| !TYPED_MEMBERS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let mut sd = Self {
            name: optional_str(obj, "name"),
            base_definition: optional_str(obj, "baseDefinition"),
            derivation: optional_str(obj, "derivation"),
            id,
            url,
            type_field,
            kind,
            extra,
            elements,
        };
        sd.validate_order()?;
        sd.capture_baseline();

        debug!("Loaded {} with {} elements", context, sd.elements.len());
        Ok(sd)
    }

    /// Serialize with a full snapshot and, when anything changed, a differential
    pub fn to_json(&self) -> Value {
        let mut json = Map::new();
        json.insert("resourceType".to_string(), Value::from("StructureDefinition"));
        json.insert("id".to_string(), Value::from(self.id.as_str()));
        json.insert("url".to_string(), Value::from(self.url.as_str()));
        if let Some(name) = &self.name {
            json.insert("name".to_string(), Value::from(name.as_str()));
        }
        for (key, value) in &self.extra {
            json.insert(key.clone(), value.clone());
        }
        json.insert(
            "kind".to_string(),
            serde_json::to_value(self.kind).unwrap_or(Value::Null),
        );
        json.insert("type".to_string(), Value::from(self.type_field.as_str()));
        if let Some(base) = &self.base_definition {
            json.insert("baseDefinition".to_string(), Value::from(base.as_str()));
        }
        if let Some(derivation) = &self.derivation {
            json.insert("derivation".to_string(), Value::from(derivation.as_str()));
        }

        let snapshot: Vec<Value> = self
            .elements
            .iter()
            .map(|e| Value::Object(e.to_json()))
            .collect();
        json.insert("snapshot".to_string(), element_list(snapshot));

        let differential: Vec<Value> = self
            .elements
            .iter()
            .map(ElementDefinition::differential_fields)
            .filter(|fields| !fields.is_empty())
            .map(Value::Object)
            .collect();
        if !differential.is_empty() {
            json.insert("differential".to_string(), element_list(differential));
        }

        Value::Object(json)
    }

    /// File name the definition is written under
    pub fn file_name(&self) -> String {
        format!("StructureDefinition-{}.json", self.id)
    }

    // ------------------------------------------------------------------------
    // Access
    // ------------------------------------------------------------------------

    /// Elements in tree order
    pub fn elements(&self) -> &[ElementDefinition] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// The root element (`Observation` for an Observation profile)
    pub fn root(&self) -> Option<&ElementDefinition> {
        self.elements.first()
    }

    /// Exact lookup by element id
    pub fn find_element(&self, id: &str) -> Option<&ElementDefinition> {
        self.elements.iter().find(|e| e.id == id)
    }

    /// Exact lookup by element id (mutable)
    pub fn find_element_mut(&mut self, id: &str) -> Option<&mut ElementDefinition> {
        self.elements.iter_mut().find(|e| e.id == id)
    }

    pub(crate) fn index_of(&self, id: &str) -> Option<usize> {
        self.elements.iter().position(|e| e.id == id)
    }

    // ------------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------------

    /// Append a new child of the root named `segment_name`
    pub fn new_element(&mut self, segment_name: &str) -> Result<&mut ElementDefinition> {
        if segment_name.is_empty() || segment_name.contains('.') {
            return Err(KelpError::InvalidSegment {
                segment: segment_name.to_string(),
            });
        }
        let root = self
            .root()
            .ok_or_else(|| KelpError::invalid_definition(format!("'{}' has no root element", self.id)))?;

        let mut element = ElementDefinition::new(format!("{}.{}", root.id, segment_name));
        element.path = format!("{}.{}", root.path, segment_name);

        let index = self.add_element(element)?;
        Ok(&mut self.elements[index])
    }

    /// Insert an element where its id places it in the tree, returning its index
    ///
    /// Slices go after the existing slices of their sliced element; anything
    /// else goes after the existing children of its parent. Nothing changes when
    /// the parent is missing or the id is taken.
    pub fn add_element(&mut self, element: ElementDefinition) -> Result<usize> {
        if self.index_of(&element.id).is_some() {
            return Err(KelpError::DuplicateElement { id: element.id });
        }
        let index = self.insertion_index(&element.id)?;
        self.elements.insert(index, element);
        Ok(index)
    }

    fn insertion_index(&self, id: &str) -> Result<usize> {
        if let Some(base) = slice_base_id(id) {
            let base_index = self.index_of(&base).ok_or_else(|| KelpError::MissingParent {
                id: id.to_string(),
                parent: base.clone(),
            })?;
            return Ok(self.block_end(base_index, true));
        }

        let parent = id
            .rsplit_once('.')
            .map(|(parent, _)| parent)
            .ok_or_else(|| KelpError::InvalidSegment {
                segment: id.to_string(),
            })?;
        let parent_index = self.index_of(parent).ok_or_else(|| KelpError::MissingParent {
            id: id.to_string(),
            parent: parent.to_string(),
        })?;
        Ok(self.block_end(parent_index, false))
    }

    /// One past the last element of the block that starts at `index`
    ///
    /// With `include_slices` the block also covers the element's slices and
    /// their subtrees; without it only the element's own children.
    pub(crate) fn block_end(&self, index: usize, include_slices: bool) -> usize {
        let id = &self.elements[index].id;
        let mut end = index + 1;
        while end < self.elements.len() && in_block(&self.elements[end].id, id, include_slices) {
            end += 1;
        }
        end
    }

    /// Whether the element at `index` has any materialized children
    pub(crate) fn has_children(&self, index: usize) -> bool {
        self.block_end(index, false) > index + 1
    }

    /// Capture a baseline on every element
    pub fn capture_baseline(&mut self) {
        self.elements
            .iter_mut()
            .for_each(ElementDefinition::capture_baseline);
    }

    /// Clear the baseline of every element, making the whole tree differential
    pub fn clear_baseline(&mut self) {
        self.elements
            .iter_mut()
            .for_each(ElementDefinition::clear_baseline);
    }

    /// Check the pre-order invariant, reporting the first violation
    pub fn validate_order(&self) -> Result<()> {
        let mut seen = HashSet::new();
        // Open blocks from the root down: (id, whether its slices have started)
        let mut open: Vec<(&str, bool)> = Vec::new();

        for (index, element) in self.elements.iter().enumerate() {
            if !seen.insert(element.id.as_str()) {
                return Err(KelpError::invalid_definition(format!(
                    "duplicate element id '{}'",
                    element.id
                )));
            }

            if index == 0 {
                if element.parent_id().is_some() {
                    return Err(KelpError::invalid_definition(format!(
                        "first element '{}' is not a root",
                        element.id
                    )));
                }
                open.push((element.id.as_str(), false));
                continue;
            }

            let slice_base = element.slice_of();
            let container = match &slice_base {
                Some(base) => base.as_str(),
                None => element.parent_id().unwrap_or(""),
            };

            while open.last().is_some_and(|(id, _)| *id != container) {
                open.pop();
            }
            let Some(top) = open.last_mut() else {
                return Err(KelpError::invalid_definition(format!(
                    "element '{}' is not inside the block of '{}'",
                    element.id, container
                )));
            };

            if slice_base.is_some() {
                top.1 = true;
            } else if top.1 {
                return Err(KelpError::invalid_definition(format!(
                    "child '{}' follows the slices of '{}'",
                    element.id, container
                )));
            }
            open.push((element.id.as_str(), false));
        }
        Ok(())
    }
}

/// Whether `candidate` sits in the block of element `id`
fn in_block(candidate: &str, id: &str, include_slices: bool) -> bool {
    candidate.strip_prefix(id).is_some_and(|rest| {
        rest.starts_with('.') || (include_slices && (rest.starts_with(':') || rest.starts_with('/')))
    })
}

fn required_str(obj: &Map<String, Value>, field: &str, context: &str) -> Result<String> {
    obj.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| KelpError::missing_field(field, context))
}

fn optional_str(obj: &Map<String, Value>, field: &str) -> Option<String> {
    obj.get(field).and_then(Value::as_str).map(str::to_string)
}

fn element_array<'a>(obj: &'a Map<String, Value>, view: &str) -> Option<&'a Vec<Value>> {
    obj.get(view)?.get("element")?.as_array()
}

fn element_list(elements: Vec<Value>) -> Value {
    let mut view = Map::new();
    view.insert("element".to_string(), Value::Array(elements));
    Value::Object(view)
}
