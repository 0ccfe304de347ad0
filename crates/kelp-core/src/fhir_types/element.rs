//! ElementDefinition: one constraint-bearing node of a StructureDefinition
//!
//! The members the tree engine reasons about (id, path, slicing, cardinality,
//! types) are typed; every other member is carried verbatim in `extra` so that
//! nothing read from a definition is lost on the way back out.
//!
//! Each element can hold a *baseline*: a captured copy of its own serialized
//! members. Comparing the current members against the baseline is how the
//! differential is computed.

use indexmap::IndexMap;
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::KelpError;
use crate::result::Result;

// ============================================================================
// Cardinality
// ============================================================================

/// Maximum cardinality of an element (`"*"` in JSON when unbounded)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Max {
    Bounded(u32),
    Unbounded,
}

impl Max {
    /// Whether more than one repetition is allowed
    pub fn is_repeating(&self) -> bool {
        match self {
            Max::Unbounded => true,
            Max::Bounded(n) => *n > 1,
        }
    }
}

impl fmt::Display for Max {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Max::Bounded(n) => write!(f, "{n}"),
            Max::Unbounded => f.write_str("*"),
        }
    }
}

impl FromStr for Max {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s == "*" {
            return Ok(Max::Unbounded);
        }
        s.parse::<u32>()
            .map(Max::Bounded)
            .map_err(|_| format!("invalid max cardinality '{s}'"))
    }
}

impl Serialize for Max {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Max {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

// ============================================================================
// Type
// ============================================================================

/// Data type for an element
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElementDefinitionType {
    /// Data type or Resource (reference target)
    pub code: String,

    /// Profiles (StructureDefinition or IG) on type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Vec<String>>,

    /// Profiles (StructureDefinition or IG) for the target resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_profile: Option<Vec<String>>,

    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl ElementDefinitionType {
    /// Create a simple type with just a code
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            profile: None,
            target_profile: None,
            extra: IndexMap::new(),
        }
    }

    /// Create a Reference type pointing at the given target profiles
    pub fn reference<I, S>(targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            target_profile: Some(targets.into_iter().map(Into::into).collect()),
            ..Self::new("Reference")
        }
    }
}

// ============================================================================
// Slicing
// ============================================================================

/// How slices are identified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscriminatorType {
    Value,
    Exists,
    Pattern,
    Type,
    Profile,
    Position,
}

/// A single discriminator: what to look at, and where
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlicingDiscriminator {
    #[serde(rename = "type")]
    pub type_: DiscriminatorType,
    pub path: String,
}

impl SlicingDiscriminator {
    pub fn new(type_: DiscriminatorType, path: impl Into<String>) -> Self {
        Self {
            type_,
            path: path.into(),
        }
    }
}

/// closed | open | openAtEnd
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SlicingRules {
    Closed,
    #[default]
    Open,
    OpenAtEnd,
}

/// Slicing rules placed on the element that is split into slices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementDefinitionSlicing {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub discriminator: Vec<SlicingDiscriminator>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordered: Option<bool>,

    #[serde(default)]
    pub rules: SlicingRules,

    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl ElementDefinitionSlicing {
    pub fn new(rules: SlicingRules) -> Self {
        Self {
            discriminator: Vec::new(),
            description: None,
            ordered: None,
            rules,
            extra: IndexMap::new(),
        }
    }
}

// ============================================================================
// ElementDefinition
// ============================================================================

/// Definition of an element in a resource or data type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementDefinition {
    /// Unique id: structural segments, each optionally suffixed with `:sliceName`
    pub id: String,

    /// Path of the element in the hierarchy of elements (no slice names)
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slice_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slicing: Option<ElementDefinitionSlicing>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<Max>,

    /// Reference to the definition of another element (`#Observation.referenceRange`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_reference: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Vec::is_empty")]
    pub type_: Vec<ElementDefinitionType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub must_support: Option<bool>,

    /// Every other member, kept in input order
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,

    #[serde(skip)]
    baseline: Option<Map<String, Value>>,
}

impl ElementDefinition {
    /// Create an element from its id; the path is the id without slice names
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let path = path_from_id(&id);
        Self {
            id,
            path,
            slice_name: None,
            slicing: None,
            short: None,
            definition: None,
            comment: None,
            min: None,
            max: None,
            content_reference: None,
            type_: Vec::new(),
            must_support: None,
            extra: IndexMap::new(),
            baseline: None,
        }
    }

    /// Read an element from its JSON form
    pub fn from_json(json: &Value) -> Result<Self> {
        let id = json
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| KelpError::missing_field("id", format!("element {json}")))?
            .to_string();
        if json.get("path").and_then(Value::as_str).is_none() {
            return Err(KelpError::missing_field("path", format!("element '{id}'")));
        }
        serde_json::from_value(json.clone()).map_err(|source| KelpError::InvalidElement { id, source })
    }

    /// All set members as a JSON object, in serialization order
    pub fn to_json(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    // ------------------------------------------------------------------------
    // Baseline and diffing
    // ------------------------------------------------------------------------

    /// True when no baseline exists or any member differs from it
    pub fn has_diff(&self) -> bool {
        match &self.baseline {
            None => true,
            Some(baseline) => &self.to_json() != baseline,
        }
    }

    /// Snapshot the current members as the new comparison point
    pub fn capture_baseline(&mut self) {
        self.baseline = Some(self.to_json());
    }

    /// Drop the baseline so the whole element counts as new
    pub fn clear_baseline(&mut self) {
        self.baseline = None;
    }

    pub fn has_baseline(&self) -> bool {
        self.baseline.is_some()
    }

    /// Members that belong in the differential: `id`, `path`, and whatever changed
    ///
    /// Empty when the element has no diff. Members removed since the baseline
    /// are not represented.
    pub fn differential_fields(&self) -> Map<String, Value> {
        if !self.has_diff() {
            return Map::new();
        }

        let mut diff = Map::new();
        diff.insert("id".to_string(), Value::String(self.id.clone()));
        diff.insert("path".to_string(), Value::String(self.path.clone()));

        for (key, value) in self.to_json() {
            if key == "id" || key == "path" {
                continue;
            }
            let unchanged = self
                .baseline
                .as_ref()
                .is_some_and(|baseline| baseline.get(&key) == Some(&value));
            if !unchanged {
                diff.insert(key, value);
            }
        }
        diff
    }

    /// A copy with no baseline, for use as a brand-new element
    pub fn clone_detached(&self) -> Self {
        Self {
            baseline: None,
            ..self.clone()
        }
    }

    // ------------------------------------------------------------------------
    // Structure
    // ------------------------------------------------------------------------

    /// Id of the structural parent (`Observation.code` for `Observation.code.text`)
    pub fn parent_id(&self) -> Option<&str> {
        self.id.rsplit_once('.').map(|(parent, _)| parent)
    }

    /// Id of the element this one is a slice of, if it is a slice
    ///
    /// `Patient.telecom:email` is a slice of `Patient.telecom`;
    /// `Patient.telecom:email/work` is a re-slice of `Patient.telecom:email`.
    pub fn slice_of(&self) -> Option<String> {
        slice_base_id(&self.id)
    }

    /// Id a slice of this element named `name` gets
    pub fn slice_id(&self, name: &str) -> String {
        match self.slice_name {
            Some(_) => format!("{}/{}", self.id, name),
            None => format!("{}:{}", self.id, name),
        }
    }

    /// A polymorphic `[x]` element that has not been narrowed to a choice slice
    pub fn is_choice(&self) -> bool {
        self.path.ends_with("[x]") && self.slice_name.is_none()
    }

    pub fn is_repeating(&self) -> bool {
        self.max.is_some_and(|max| max.is_repeating())
    }

    pub fn type_codes(&self) -> Vec<&str> {
        self.type_.iter().map(|t| t.code.as_str()).collect()
    }

    /// Whether any allowed type points at target resources
    pub fn has_reference_type(&self) -> bool {
        self.type_
            .iter()
            .any(|t| t.code == "Reference" || t.target_profile.is_some())
    }

    /// Target profile urls across all types
    pub fn target_profiles(&self) -> impl Iterator<Item = &str> {
        self.type_
            .iter()
            .filter_map(|t| t.target_profile.as_ref())
            .flatten()
            .map(String::as_str)
    }

    /// Names of the reference targets (last segment of each target profile url)
    pub fn reference_targets(&self) -> Vec<&str> {
        self.target_profiles()
            .map(|url| url.rsplit('/').next().unwrap_or(url))
            .collect()
    }

    /// Slice name of a choice variant: `value[x]` + `dateTime` -> `valueDateTime`
    pub fn choice_slice_name(&self, code: &str) -> String {
        let last = self.path.rsplit('.').next().unwrap_or(&self.path);
        let base = last.trim_end_matches("[x]");
        let mut chars = code.chars();
        match chars.next() {
            Some(first) => format!("{base}{}{}", first.to_uppercase(), chars.as_str()),
            None => base.to_string(),
        }
    }

    /// Position in `type` of the choice named either by code or by full slice name
    pub fn find_choice_type(&self, name: &str) -> Option<usize> {
        self.type_
            .iter()
            .position(|t| t.code == name || self.choice_slice_name(&t.code) == name)
    }

    /// Swap the id and path prefixes of a cloned element onto a new parent
    pub(crate) fn reparent(&mut self, from_id: &str, to_id: &str, from_path: &str, to_path: &str) {
        if let Some(rest) = self.id.strip_prefix(from_id) {
            self.id = format!("{to_id}{rest}");
        }
        if let Some(rest) = self.path.strip_prefix(from_path) {
            self.path = format!("{to_path}{rest}");
        }
    }
}

/// Two elements are equal when their members are; baselines are not compared
impl PartialEq for ElementDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.to_json() == other.to_json()
    }
}

/// Strip slice names from every segment of an id
pub(crate) fn path_from_id(id: &str) -> String {
    id.split('.')
        .map(|segment| segment.split_once(':').map_or(segment, |(name, _)| name))
        .collect::<Vec<_>>()
        .join(".")
}

/// Sliced element of a slice id, or `None` when the last segment is not a slice
pub(crate) fn slice_base_id(id: &str) -> Option<String> {
    let (head, last) = match id.rsplit_once('.') {
        Some((head, last)) => (Some(head), last),
        None => (None, id),
    };
    let (name, slice) = last.split_once(':')?;
    let base_last = match slice.rsplit_once('/') {
        Some((parent_slice, _)) => format!("{name}:{parent_slice}"),
        None => name.to_string(),
    };
    Some(match head {
        Some(head) => format!("{head}.{base_last}"),
        None => base_last,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn value_x() -> ElementDefinition {
        ElementDefinition::from_json(&json!({
            "id": "Observation.value[x]",
            "path": "Observation.value[x]",
            "short": "Actual result",
            "min": 0,
            "max": "1",
            "type": [
                { "code": "Quantity" },
                { "code": "string" },
                { "code": "dateTime" }
            ],
            "isSummary": true
        }))
        .unwrap()
    }

    #[test]
    fn test_max_parsing() {
        assert_eq!("*".parse::<Max>(), Ok(Max::Unbounded));
        assert_eq!("3".parse::<Max>(), Ok(Max::Bounded(3)));
        assert!("many".parse::<Max>().is_err());
        assert!(Max::Unbounded.is_repeating());
        assert!(!Max::Bounded(1).is_repeating());
        assert_eq!(Max::Unbounded.to_string(), "*");
    }

    #[test]
    fn test_from_json_keeps_unknown_members() {
        let element = value_x();
        assert_eq!(element.max, Some(Max::Bounded(1)));
        assert_eq!(element.type_codes(), vec!["Quantity", "string", "dateTime"]);
        assert_eq!(element.extra.get("isSummary"), Some(&json!(true)));

        let out = element.to_json();
        assert_eq!(out.get("max"), Some(&json!("1")));
        assert_eq!(out.get("isSummary"), Some(&json!(true)));
    }

    #[test]
    fn test_from_json_missing_id() {
        let err = ElementDefinition::from_json(&json!({ "path": "Observation" })).unwrap_err();
        assert!(matches!(err, KelpError::MissingField { ref field, .. } if field == "id"));
    }

    #[test]
    fn test_from_json_bad_type_entry() {
        let err = ElementDefinition::from_json(&json!({
            "id": "Observation.code",
            "path": "Observation.code",
            "type": [{ "profile": ["http://example.org/x"] }]
        }))
        .unwrap_err();
        assert!(matches!(err, KelpError::InvalidElement { ref id, .. } if id == "Observation.code"));
    }

    #[test]
    fn test_new_derives_path() {
        let element = ElementDefinition::new("Observation.value[x]:valueQuantity.system");
        assert_eq!(element.path, "Observation.value[x].system");
        assert!(element.has_diff());
    }

    #[test]
    fn test_baseline_diff() {
        let mut element = value_x();
        assert!(element.has_diff());

        element.capture_baseline();
        assert!(!element.has_diff());
        assert!(element.differential_fields().is_empty());

        element.min = Some(1);
        assert!(element.has_diff());
        let diff = element.differential_fields();
        assert_eq!(
            Value::Object(diff),
            json!({ "id": "Observation.value[x]", "path": "Observation.value[x]", "min": 1 })
        );
    }

    #[test]
    fn test_cleared_baseline_diffs_everything() {
        let mut element = value_x();
        element.capture_baseline();
        element.clear_baseline();
        assert!(element.has_diff());
        assert_eq!(element.differential_fields(), element.to_json());
    }

    #[test]
    fn test_clone_detached_drops_baseline() {
        let mut element = value_x();
        element.capture_baseline();
        let copy = element.clone_detached();
        assert!(!copy.has_baseline());
        assert_eq!(copy, element);
    }

    #[test]
    fn test_slice_ids() {
        let mut telecom = ElementDefinition::new("Patient.telecom");
        assert_eq!(telecom.slice_id("email"), "Patient.telecom:email");
        telecom.slice_name = Some("email".to_string());
        telecom.id = "Patient.telecom:email".to_string();
        assert_eq!(telecom.slice_id("work"), "Patient.telecom:email/work");

        assert_eq!(slice_base_id("Patient.telecom:email").as_deref(), Some("Patient.telecom"));
        assert_eq!(
            slice_base_id("Patient.telecom:email/work").as_deref(),
            Some("Patient.telecom:email")
        );
        assert_eq!(slice_base_id("Patient.telecom:email.system"), None);
    }

    #[test]
    fn test_choice_names() {
        let element = value_x();
        assert!(element.is_choice());
        assert_eq!(element.choice_slice_name("dateTime"), "valueDateTime");
        assert_eq!(element.find_choice_type("valueQuantity"), Some(0));
        assert_eq!(element.find_choice_type("string"), Some(1));
        assert_eq!(element.find_choice_type("valueBoolean"), None);
    }

    #[test]
    fn test_reference_targets() {
        let mut based_on = ElementDefinition::new("Observation.basedOn");
        based_on.type_ = vec![ElementDefinitionType::reference([
            "http://hl7.org/fhir/StructureDefinition/CarePlan",
            "http://hl7.org/fhir/StructureDefinition/MedicationRequest",
        ])];
        assert!(based_on.has_reference_type());
        assert_eq!(based_on.reference_targets(), vec!["CarePlan", "MedicationRequest"]);
    }

    #[test]
    fn test_reparent() {
        let mut element = ElementDefinition::new("Quantity.system");
        element.reparent(
            "Quantity",
            "Observation.value[x]:valueQuantity",
            "Quantity",
            "Observation.value[x]",
        );
        assert_eq!(element.id, "Observation.value[x]:valueQuantity.system");
        assert_eq!(element.path, "Observation.value[x].system");
    }
}
