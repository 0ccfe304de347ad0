//! Integration tests for StructureDefinition loading, mutation and output
//!
//! These tests run against the definitions in `tests/fixtures`.

use kelp_core::canonical::FhirDefinitions;
use kelp_core::fhir_types::{ElementDefinition, Max, StructureDefinition};
use kelp_core::KelpError;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::LazyLock;

static DEFS: LazyLock<FhirDefinitions> = LazyLock::new(|| {
    let mut defs = FhirDefinitions::new();
    defs.load_dir(fixtures_dir()).unwrap();
    defs
});

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

fn load(name: &str) -> StructureDefinition {
    let json = DEFS.find_resource(name).unwrap();
    StructureDefinition::from_json(json).unwrap()
}

fn ids(sd: &StructureDefinition) -> Vec<&str> {
    sd.elements().iter().map(|e| e.id.as_str()).collect()
}

#[test]
fn test_from_json_loads_observation() {
    let observation = load("Observation");
    assert_eq!(observation.id, "Observation");
    assert_eq!(observation.len(), 50);
    assert_eq!(
        observation.extra["meta"]["lastUpdated"],
        json!("2019-11-01T09:29:23.356+11:00")
    );
    assert_eq!(observation.extra["extension"].as_array().unwrap().len(), 6);
    assert_eq!(
        observation.extra["extension"][0],
        json!({
            "url": "http://hl7.org/fhir/StructureDefinition/structuredefinition-category",
            "valueString": "Clinical.Diagnostics"
        })
    );

    let value_x = &observation.elements()[21];
    assert_eq!(value_x.id, "Observation.value[x]");
    assert_eq!(value_x.path, "Observation.value[x]");
    assert_eq!(value_x.min, Some(0));
    assert_eq!(value_x.max, Some(Max::Bounded(1)));
    assert_eq!(
        value_x.type_codes(),
        vec![
            "Quantity",
            "CodeableConcept",
            "string",
            "boolean",
            "integer",
            "Range",
            "Ratio",
            "SampledData",
            "time",
            "dateTime",
            "Period"
        ]
    );
}

#[test]
fn test_snapshot_round_trips_in_content() {
    let json = DEFS.find_resource("resprate").unwrap();
    let sd = StructureDefinition::from_json(json).unwrap();
    let out = sd.to_json();

    assert_eq!(out["snapshot"], json["snapshot"]);
    assert_eq!(out["baseDefinition"], json["baseDefinition"]);
    assert_eq!(out["title"], json["title"]);
    assert!(out.get("differential").is_none());
}

#[test]
fn test_to_json_reflects_changes_after_capture() {
    let mut observation = load("Observation");
    observation.capture_baseline();
    observation.find_element_mut("Observation.code").unwrap().short =
        Some("Special observation code".to_string());
    observation.find_element_mut("Observation.value[x]").unwrap().min = Some(1);

    let json = observation.to_json();
    assert_eq!(
        json["differential"]["element"],
        json!([
            {
                "id": "Observation.code",
                "path": "Observation.code",
                "short": "Special observation code"
            },
            { "id": "Observation.value[x]", "path": "Observation.value[x]", "min": 1 }
        ])
    );
}

#[test]
fn test_new_element() {
    let mut observation = load("Observation");
    observation.new_element("extra").unwrap();
    assert_eq!(observation.len(), 51);
    assert_eq!(observation.elements()[50].id, "Observation.extra");
    assert_eq!(observation.elements()[50].path, "Observation.extra");
}

#[test]
fn test_add_element_in_the_right_place() {
    let mut observation = load("Observation");
    let index = observation
        .add_element(ElementDefinition::new("Observation.meta.id"))
        .unwrap();
    assert_eq!(index, 3);
    assert_eq!(observation.len(), 51);
    assert_eq!(observation.elements()[3].id, "Observation.meta.id");
    observation.validate_order().unwrap();
}

#[test]
fn test_add_explicit_choice_element_in_the_right_place() {
    let mut observation = load("Observation");
    observation
        .add_element(ElementDefinition::new("Observation.value[x]:valueQuantity"))
        .unwrap();
    assert_eq!(observation.len(), 51);
    assert_eq!(
        observation.elements()[22].id,
        "Observation.value[x]:valueQuantity"
    );
    assert_eq!(observation.elements()[22].path, "Observation.value[x]");
    observation.validate_order().unwrap();
}

#[test]
fn test_add_element_failures_leave_tree_unchanged() {
    let mut observation = load("Observation");
    let before = ids(&observation).join(",");

    let err = observation
        .add_element(ElementDefinition::new("Observation.status"))
        .unwrap_err();
    assert!(matches!(err, KelpError::DuplicateElement { .. }));

    let err = observation
        .add_element(ElementDefinition::new("Observation.foo.bar"))
        .unwrap_err();
    assert!(matches!(err, KelpError::MissingParent { .. }));

    let err = observation
        .add_element(ElementDefinition::new("Observation.foo:bar"))
        .unwrap_err();
    assert!(matches!(err, KelpError::MissingParent { .. }));

    assert_eq!(ids(&observation).join(","), before);
}

#[test]
fn test_find_element_by_id() {
    let observation = load("Observation");
    let value_x = observation.find_element("Observation.value[x]").unwrap();
    assert_eq!(value_x.short.as_deref(), Some("Actual result"));
    assert!(observation.find_element("Observation.valueQuantity").is_none());
}

#[test]
fn test_capture_baseline_creates_new_starting_point() {
    let mut observation = load("Observation");
    observation.capture_baseline();
    let value_x = observation.find_element_mut("Observation.value[x]").unwrap();
    assert!(!value_x.has_diff());
    value_x.min = Some(1);
    assert!(value_x.has_diff());
}

#[test]
fn test_clear_baseline_makes_everything_diff() {
    let mut observation = load("Observation");
    let value_x = observation.find_element_mut("Observation.value[x]").unwrap();
    assert!(!value_x.has_diff());
    value_x.clear_baseline();
    assert!(value_x.has_diff());

    observation.clear_baseline();
    let json = observation.to_json();
    let differential = json["differential"]["element"].as_array().unwrap();
    assert_eq!(differential.len(), 50);
    assert_eq!(differential[21], json["snapshot"]["element"][21]);
}

#[test]
fn test_differential_only_definition() {
    let json = json!({
        "resourceType": "StructureDefinition",
        "id": "obs-note",
        "url": "http://example.org/fhir/StructureDefinition/obs-note",
        "type": "Observation",
        "kind": "resource",
        "derivation": "constraint",
        "differential": { "element": [
            { "id": "Observation", "path": "Observation" },
            { "id": "Observation.note", "path": "Observation.note", "min": 1 }
        ] }
    });
    let sd = StructureDefinition::from_json(&json).unwrap();
    assert_eq!(sd.len(), 2);
    assert!(sd.elements().iter().all(|e| !e.has_diff()));
}

#[test]
fn test_fixtures_keep_tree_order() {
    for name in [
        "Observation",
        "resprate",
        "Patient",
        "patient-telecom-reslice",
        "CodeableConcept",
        "Quantity",
    ] {
        let sd = load(name);
        sd.validate_order().unwrap();
        assert_eq!(sd.root().map(|e| e.id.as_str()), Some(sd.type_field.as_str()));
    }
}

#[test]
fn test_output_is_json_object() {
    let out = load("Patient").to_json();
    assert!(matches!(out, Value::Object(_)));
    assert_eq!(out["resourceType"], json!("StructureDefinition"));
    assert_eq!(out["kind"], json!("resource"));
}
