//! Command implementations

use anyhow::{Context, bail};
use colored::*;
use kelp_core::KelpConfig;
use kelp_core::canonical::FhirDefinitions;
use kelp_core::fhir_types::StructureDefinition;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::output::RunSummary;

/// `kelp resolve`: print the element each path addresses
pub fn resolve_command(
    config: &KelpConfig,
    definition: &str,
    paths: &[String],
    defs: Vec<PathBuf>,
    json: bool,
) -> anyhow::Result<RunSummary> {
    let mut summary = RunSummary::default();
    let registry = load_registry(config, defs, &mut summary)?;
    let mut sd = load_definition(&registry, definition)?;

    for path in paths {
        match sd.find_element_by_path(path, Some(&registry)) {
            Some(element) if json => {
                println!("{}", serde_json::to_string_pretty(&element.to_json())?);
                summary.resolved += 1;
            }
            Some(element) => {
                println!("{} {} {}", path, "->".dimmed(), element.id.green());
                summary.resolved += 1;
            }
            None => report_unresolved(path, &sd, &mut summary),
        }
    }

    summary.elements = sd.len();
    summary.print();
    Ok(summary)
}

/// `kelp tree`: resolve paths, then print or write the definition
pub fn tree_command(
    config: &KelpConfig,
    definition: &str,
    paths: &[String],
    defs: Vec<PathBuf>,
    out: Option<PathBuf>,
    differential_only: bool,
) -> anyhow::Result<RunSummary> {
    let mut summary = RunSummary::default();
    let registry = load_registry(config, defs, &mut summary)?;
    let mut sd = load_definition(&registry, definition)?;

    for path in paths {
        if sd.find_element_by_path(path, Some(&registry)).is_some() {
            summary.resolved += 1;
        } else {
            report_unresolved(path, &sd, &mut summary);
        }
    }

    let mut json = sd.to_json();
    if differential_only {
        json = json
            .get("differential")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({ "element": [] }));
    }
    let rendered = serde_json::to_string_pretty(&json)?;

    match out.or_else(|| config.output.clone()) {
        Some(dir) => {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
            let file = dir.join(sd.file_name());
            fs::write(&file, rendered)
                .with_context(|| format!("Failed to write {}", file.display()))?;
            info!("Wrote {}", file.display());
            summary.written = Some(file);
        }
        None => println!("{rendered}"),
    }

    summary.elements = sd.len();
    summary.print();
    Ok(summary)
}

/// Load every definitions directory named on the command line, or in the config when none are
fn load_registry(
    config: &KelpConfig,
    defs: Vec<PathBuf>,
    summary: &mut RunSummary,
) -> anyhow::Result<FhirDefinitions> {
    let dirs = if defs.is_empty() {
        config.definitions.clone()
    } else {
        defs
    };

    let mut registry = FhirDefinitions::new();
    for dir in &dirs {
        let added = registry
            .load_dir(dir)
            .with_context(|| format!("Failed to load definitions from {}", dir.display()))?;
        info!("Loaded {} definitions from {}", added, dir.display());
    }
    summary.definitions = registry.len();
    Ok(registry)
}

/// Build the tree of `definition`: a JSON file path, or a name known to the registry
fn load_definition(
    registry: &FhirDefinitions,
    definition: &str,
) -> anyhow::Result<StructureDefinition> {
    let path = Path::new(definition);
    if path.is_file() {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let json: Value = serde_json::from_str(&content)
            .with_context(|| format!("{} is not valid JSON", path.display()))?;
        return StructureDefinition::from_json(&json)
            .with_context(|| format!("Invalid StructureDefinition in {}", path.display()));
    }

    let Some(json) = registry.find_resource(definition) else {
        bail!("Definition '{definition}' not found");
    };
    debug!("Building tree for {}", definition);
    StructureDefinition::from_json(json)
        .with_context(|| format!("Invalid StructureDefinition '{definition}'"))
}

fn report_unresolved(path: &str, sd: &StructureDefinition, summary: &mut RunSummary) {
    eprintln!(
        "{} {}: cannot resolve path '{}'",
        "error".red().bold(),
        sd.id,
        path
    );
    summary.errors += 1;
}
