//! Path resolution against a StructureDefinition element tree
//!
//! Resolves FSH paths (e.g. `code.text`, `valueQuantity.system`,
//! `category[VSCat].id`, `telecom[email][workEmail]`) to elements of a
//! [`StructureDefinition`], creating the elements a path implies when they do
//! not exist yet.
//!
//! # Algorithm Overview
//!
//! 1. **Path Parsing**: break the path into segments with bracket information
//! 2. **Child Lookup**: find the segment's element among the current element's
//!    children, including choice name replacement (`valueQuantity` for
//!    `value[x]`)
//! 3. **Element Unfolding**: when the current element has no children yet,
//!    clone them in from the element's type (or from the sliced element, or
//!    from a content reference)
//! 4. **Bracket Handling**: classify each bracket against the element and
//!    resolve it: choice slice, existing slice, new slice or re-slice,
//!    reference target, or instance index
//!
//! Resolution never fails loudly: anything that cannot be found or created
//! yields `None`.
//!
//! # Example
//!
//! ```rust,no_run
//! use kelp_core::canonical::FhirDefinitions;
//! use kelp_core::fhir_types::StructureDefinition;
//!
//! # fn example(defs: &FhirDefinitions, mut observation: StructureDefinition) {
//! // Resolve a choice by name replacement, unfolding Quantity into the new slice
//! let system = observation.find_element_by_path("valueQuantity.system", Some(defs));
//! assert_eq!(
//!     system.map(|e| e.id.as_str()),
//!     Some("Observation.value[x]:valueQuantity.system")
//! );
//! # }
//! ```

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::debug;

use crate::canonical::DefinitionRegistry;
use crate::fhir_types::{
    DiscriminatorType, ElementDefinition, ElementDefinitionSlicing, SlicingDiscriminator,
    SlicingRules, StructureDefinition,
};

static TRAILING_BRACKET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]$").unwrap());

/// Names a new slice may take; `.`, `:` and `/` would corrupt element ids
static SLICE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_@-]+$").unwrap());

/// Path segment with bracket information
///
/// In `category[VSCat].coding`, there are two segments: `category` with the
/// bracket `[VSCat]` and `coding` with none. A leading `[x]` is part of the
/// name: `value[x][valueQuantity]` has the name `value[x]` and one bracket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    /// Element name (before any bracket)
    pub name: String,
    /// Brackets in the order written
    pub brackets: Vec<Bracket>,
}

impl PathSegment {
    /// Create a new path segment without brackets
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            brackets: Vec::new(),
        }
    }

    /// Create a new path segment with brackets
    pub fn with_brackets(name: impl Into<String>, brackets: Vec<Bracket>) -> Self {
        Self {
            name: name.into(),
            brackets,
        }
    }
}

/// Bracket contents in FSH paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bracket {
    /// A name: slice, choice type or reference target, depending on the element
    Name(String),

    /// Array index: `[0]`, `[1]`, `[2]`
    Index(usize),

    /// Soft indexing: `[+]` or `[=]`
    Soft(SoftIndexOp),
}

/// Soft indexing operators
///
/// - `[+]`: Increment - creates a new array element
/// - `[=]`: Repeat - reuses the last referenced array element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoftIndexOp {
    Increment,
    Repeat,
}

/// Path syntax errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("Empty segment in path: {0}")]
    EmptySegment(String),

    #[error("Unclosed bracket in path: {0}")]
    UnclosedBracket(String),

    #[error("Invalid path syntax: {0}")]
    InvalidSyntax(String),
}

/// What a bracket means for the element it is applied to
#[derive(Debug, Clone, PartialEq, Eq)]
enum BracketKind {
    /// Index of the matching entry in the choice element's types
    ChoiceType(usize),
    /// Index of a slice that already exists
    ExistingSlice(usize),
    /// Name of a slice to create
    NewSlice(String),
    /// A declared reference target; the element itself
    ReferenceTarget,
    /// An instance index; the element itself
    InstanceIndex,
    Unresolvable,
}

/// Parse an FSH path into segments
///
/// The empty path yields no segments (it addresses the root element).
pub fn parse_path(path: &str) -> Result<Vec<PathSegment>, PathError> {
    let mut segments = Vec::new();
    if path.is_empty() {
        return Ok(segments);
    }

    let mut name = String::new();
    let mut brackets = Vec::new();
    let mut bracket: Option<String> = None;

    for ch in path.chars() {
        if let Some(content) = bracket.as_mut() {
            match ch {
                ']' => {
                    let content = std::mem::take(content);
                    bracket = None;
                    brackets.push(parse_bracket(&content, path)?);
                }
                '[' => return Err(PathError::InvalidSyntax(path.to_string())),
                _ => content.push(ch),
            }
            continue;
        }

        match ch {
            '.' => segments.push(finish_segment(&mut name, &mut brackets, path)?),
            '[' if !name.is_empty() => bracket = Some(String::new()),
            '[' | ']' => return Err(PathError::InvalidSyntax(path.to_string())),
            _ if !brackets.is_empty() => return Err(PathError::InvalidSyntax(path.to_string())),
            _ => name.push(ch),
        }
    }

    if bracket.is_some() {
        return Err(PathError::UnclosedBracket(path.to_string()));
    }
    segments.push(finish_segment(&mut name, &mut brackets, path)?);
    Ok(segments)
}

fn finish_segment(
    name: &mut String,
    brackets: &mut Vec<Bracket>,
    path: &str,
) -> Result<PathSegment, PathError> {
    if name.is_empty() {
        return Err(PathError::EmptySegment(path.to_string()));
    }
    let mut name = std::mem::take(name);
    let mut brackets = std::mem::take(brackets);
    if brackets.first() == Some(&Bracket::Name("x".to_string())) {
        brackets.remove(0);
        name.push_str("[x]");
    }
    Ok(PathSegment::with_brackets(name, brackets))
}

fn parse_bracket(content: &str, path: &str) -> Result<Bracket, PathError> {
    match content {
        "" => Err(PathError::InvalidSyntax(path.to_string())),
        "+" => Ok(Bracket::Soft(SoftIndexOp::Increment)),
        "=" => Ok(Bracket::Soft(SoftIndexOp::Repeat)),
        _ => match content.parse::<usize>() {
            Ok(index) => Ok(Bracket::Index(index)),
            Err(_) => Ok(Bracket::Name(content.to_string())),
        },
    }
}

impl StructureDefinition {
    /// Find the element a path addresses, creating implied elements on the way
    ///
    /// `registry` supplies type definitions for unfolding and reference target
    /// urls; without it, paths that need unfolding do not resolve.
    pub fn find_element_by_path(
        &mut self,
        path: &str,
        registry: Option<&dyn DefinitionRegistry>,
    ) -> Option<&mut ElementDefinition> {
        let index = self.resolve_path_index(path, registry)?;
        self.elements.get_mut(index)
    }

    /// Like [`find_element_by_path`](Self::find_element_by_path), returning the element's position
    pub fn resolve_path_index(
        &mut self,
        path: &str,
        registry: Option<&dyn DefinitionRegistry>,
    ) -> Option<usize> {
        let segments = parse_path(path).ok()?;
        if self.elements.is_empty() {
            return None;
        }

        let mut current = 0;
        for segment in &segments {
            current = self.resolve_child(current, &segment.name, registry)?;
            for bracket in &segment.brackets {
                current = self.resolve_bracket(current, bracket, registry)?;
            }
        }
        Some(current)
    }

    /// The reference target named in the final bracket of `path`, if `element` declares it
    pub fn get_reference_name(&self, path: &str, element: &ElementDefinition) -> Option<String> {
        let name = TRAILING_BRACKET.captures(path)?.get(1)?.as_str();
        element
            .reference_targets()
            .contains(&name)
            .then(|| name.to_string())
    }

    fn resolve_child(
        &mut self,
        parent: usize,
        name: &str,
        registry: Option<&dyn DefinitionRegistry>,
    ) -> Option<usize> {
        if let Some(index) = self.find_child(parent, name) {
            return Some(index);
        }
        if self.has_children(parent) {
            return None;
        }
        self.unfold(parent, name, registry)?;
        self.find_child(parent, name)
    }

    /// Direct child by name, or the choice slice a renamed choice addresses
    fn find_child(&mut self, parent: usize, name: &str) -> Option<usize> {
        let child_id = format!("{}.{}", self.elements[parent].id, name);
        if let Some(index) = self.index_of(&child_id) {
            return Some(index);
        }

        let (choice, type_index) = self.find_renamed_choice(parent, name)?;
        self.resolve_choice_slice(choice, type_index)
    }

    /// `valueQuantity` under a parent with `value[x]` allowing Quantity
    fn find_renamed_choice(&self, parent: usize, name: &str) -> Option<(usize, usize)> {
        let parent_id = self.elements[parent].id.as_str();
        let end = self.block_end(parent, false);
        (parent + 1..end).find_map(|index| {
            let element = &self.elements[index];
            if !element.is_choice() || element.parent_id() != Some(parent_id) {
                return None;
            }
            let choice_name = element.id.rsplit('.').next()?;
            let prefix = choice_name.strip_suffix("[x]")?;
            if !name.starts_with(prefix) || name.len() == prefix.len() {
                return None;
            }
            let type_index = element.find_choice_type(name)?;
            (element.choice_slice_name(&element.type_[type_index].code) == name)
                .then_some((index, type_index))
        })
    }

    fn resolve_bracket(
        &mut self,
        current: usize,
        bracket: &Bracket,
        registry: Option<&dyn DefinitionRegistry>,
    ) -> Option<usize> {
        match self.classify_bracket(current, bracket, registry) {
            BracketKind::ChoiceType(type_index) => self.resolve_choice_slice(current, type_index),
            BracketKind::ExistingSlice(index) => Some(index),
            BracketKind::NewSlice(name) => Some(self.create_slice(current, &name)),
            BracketKind::ReferenceTarget | BracketKind::InstanceIndex => Some(current),
            BracketKind::Unresolvable => None,
        }
    }

    fn classify_bracket(
        &self,
        current: usize,
        bracket: &Bracket,
        registry: Option<&dyn DefinitionRegistry>,
    ) -> BracketKind {
        let name = match bracket {
            Bracket::Index(_) | Bracket::Soft(_) => return BracketKind::InstanceIndex,
            Bracket::Name(name) => name,
        };
        let element = &self.elements[current];

        if element.is_choice() {
            return match element.find_choice_type(name) {
                Some(type_index) => BracketKind::ChoiceType(type_index),
                None => BracketKind::Unresolvable,
            };
        }

        if let Some(index) = self.index_of(&element.slice_id(name)) {
            return BracketKind::ExistingSlice(index);
        }

        if element.has_reference_type() {
            return if reference_target_matches(element, name, registry) {
                BracketKind::ReferenceTarget
            } else {
                BracketKind::Unresolvable
            };
        }

        if element.is_repeating() && SLICE_NAME.is_match(name) {
            BracketKind::NewSlice(name.clone())
        } else {
            BracketKind::Unresolvable
        }
    }

    /// Find or create the slice of choice element `choice` for one of its types
    fn resolve_choice_slice(&mut self, choice: usize, type_index: usize) -> Option<usize> {
        let element = &self.elements[choice];
        let choice_type = element.type_.get(type_index)?.clone();
        let slice_name = element.choice_slice_name(&choice_type.code);
        let slice_id = element.slice_id(&slice_name);
        if let Some(index) = self.index_of(&slice_id) {
            return Some(index);
        }

        let mut slice = element.clone_detached();
        slice.id = slice_id;
        slice.slice_name = Some(slice_name);
        slice.type_ = vec![choice_type];
        slice.slicing = None;
        slice.min = Some(0);

        let position = self.choice_slice_position(choice, type_index);
        let slicing = self.elements[choice].slicing.get_or_insert_with(|| {
            let mut slicing = ElementDefinitionSlicing::new(SlicingRules::Open);
            slicing.ordered = Some(false);
            slicing
        });
        let discriminator = SlicingDiscriminator::new(DiscriminatorType::Type, "$this");
        if !slicing.discriminator.contains(&discriminator) {
            slicing.discriminator.push(discriminator);
        }

        debug!("Created choice slice {}", slice.id);
        self.elements.insert(position, slice);
        Some(position)
    }

    /// Where a new choice slice goes: after the choice's children, before the
    /// first existing choice slice of a type declared later
    ///
    /// Slices therefore keep the order of the choice's `type` list instead of
    /// each new one being placed first in the group.
    fn choice_slice_position(&self, choice: usize, type_index: usize) -> usize {
        let element = &self.elements[choice];
        let children_end = self.block_end(choice, false);
        let group_end = self.block_end(choice, true);

        (children_end..group_end)
            .find(|&index| {
                let other = &self.elements[index];
                other.slice_of().as_deref() == Some(element.id.as_str())
                    && other
                        .type_
                        .first()
                        .and_then(|t| element.type_.iter().position(|ct| ct.code == t.code))
                        .is_some_and(|declared| declared > type_index)
            })
            .unwrap_or(group_end)
    }

    /// Create a slice (or re-slice) of the element at `base`, after its existing slices
    fn create_slice(&mut self, base: usize, name: &str) -> usize {
        let element = &self.elements[base];
        let mut slice = element.clone_detached();
        slice.id = element.slice_id(name);
        slice.slice_name = Some(match &element.slice_name {
            Some(parent_slice) => format!("{parent_slice}/{name}"),
            None => name.to_string(),
        });
        slice.slicing = None;
        slice.min = Some(0);

        let position = self.block_end(base, true);
        self.elements[base]
            .slicing
            .get_or_insert_with(|| ElementDefinitionSlicing::new(SlicingRules::Open));

        debug!("Created slice {}", slice.id);
        self.elements.insert(position, slice);
        position
    }

    /// Materialize the children of the element at `index`, if they contain `child`
    ///
    /// Nothing is inserted when no source for the children is available or the
    /// children do not include `child`.
    fn unfold(
        &mut self,
        index: usize,
        child: &str,
        registry: Option<&dyn DefinitionRegistry>,
    ) -> Option<()> {
        let mut children = self.unfold_template(index, registry)?;
        let element = &self.elements[index];
        if !template_has_child(&children, &element.id, child) {
            return None;
        }

        children.iter_mut().for_each(ElementDefinition::capture_baseline);
        debug!("Unfolded {} elements under {}", children.len(), element.id);
        self.elements.splice(index + 1..index + 1, children);
        Some(())
    }

    /// Cloned, reparented children for the element at `index`
    fn unfold_template(
        &self,
        index: usize,
        registry: Option<&dyn DefinitionRegistry>,
    ) -> Option<Vec<ElementDefinition>> {
        let element = &self.elements[index];

        // A data slice starts from the children of the element it slices
        if let Some(base) = element.slice_of().and_then(|id| self.index_of(&id))
            && !self.elements[base].is_choice()
            && self.has_children(base)
        {
            return Some(self.clone_children(base, element));
        }

        if element.type_.is_empty() {
            let reference = element.content_reference.as_deref()?;
            let target_id = reference.rsplit_once('#').map_or(reference, |(_, id)| id);
            let target = self.index_of(target_id)?;
            return self
                .has_children(target)
                .then(|| self.clone_children(target, element));
        }

        if element.is_choice() || element.type_.len() != 1 {
            return None;
        }
        let element_type = &element.type_[0];
        let registry = registry?;
        let definition = element_type
            .profile
            .iter()
            .flatten()
            .find_map(|profile| registry.lookup(profile))
            .or_else(|| registry.lookup(&element_type.code))?;
        let root = definition.root()?;

        Some(
            definition.elements()[1..]
                .iter()
                .map(|source| {
                    let mut clone = source.clone_detached();
                    clone.reparent(&root.id, &element.id, &root.path, &element.path);
                    clone
                })
                .collect(),
        )
    }

    /// Copies of the children of `source`, moved under `target`
    fn clone_children(&self, source: usize, target: &ElementDefinition) -> Vec<ElementDefinition> {
        let from = &self.elements[source];
        self.elements[source + 1..self.block_end(source, false)]
            .iter()
            .map(|child| {
                let mut clone = child.clone_detached();
                clone.reparent(&from.id, &target.id, &from.path, &target.path);
                clone
            })
            .collect()
    }
}

/// Whether unfolded `children` of `parent_id` contain `name`, directly or as a renamed choice
fn template_has_child(children: &[ElementDefinition], parent_id: &str, name: &str) -> bool {
    let child_id = format!("{parent_id}.{name}");
    children.iter().any(|child| {
        child.id == child_id
            || (child.is_choice()
                && child.parent_id() == Some(parent_id)
                && child
                    .find_choice_type(name)
                    .is_some_and(|i| child.choice_slice_name(&child.type_[i].code) == name))
    })
}

/// Whether `name` is one of the element's reference targets
fn reference_target_matches(
    element: &ElementDefinition,
    name: &str,
    registry: Option<&dyn DefinitionRegistry>,
) -> bool {
    if element.reference_targets().contains(&name) {
        return true;
    }
    registry
        .and_then(|registry| registry.lookup(name))
        .is_some_and(|definition| element.target_profiles().any(|url| url == definition.url))
}
