//! Optimize: extract duplicated inline schemas into shared components.
//!
//! Inline schemas that are "complex" (objects with properties, enums,
//! compositions, conditionals, multi-type, ...) are grouped by content hash.
//! Every group with more than one occurrence, or matching an existing
//! component schema, is replaced by a `$ref` to one shared component.
//!
//! Occurrences are replaced deepest first: an outer schema is only replaced
//! after everything inside it, so the pointer to a pending inner occurrence
//! never goes stale.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use inflections::Inflect;
use oaskit_core::pointer::key_str;
use oaskit_core::walk::{reference_of, walk, ComponentKind, Flow, NodeKind};
use oaskit_core::{CancelToken, ContentHash, Location};
use serde_yaml_ng::Value;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::helpers::{
    component_name, component_section, counter_name, insert_components, walk_options,
};

/// Name used when no meaningful location token exists.
const FALLBACK_NAME: &str = "InlineSchema";

/// Keywords that make a schema worth extracting.
const COMPLEX_KEYWORDS: &[&str] = &[
    "properties",
    "enum",
    "allOf",
    "oneOf",
    "anyOf",
    "not",
    "patternProperties",
    "additionalProperties",
    "dependentSchemas",
    "dependentRequired",
    "if",
    "then",
    "else",
];

/// Location tokens that describe structure rather than a name.
const STRUCTURAL_TOKENS: &[&str] = &[
    "paths", "webhooks", "components", "schemas", "responses", "parameters", "requestBodies",
    "headers", "callbacks", "pathItems", "content", "schema", "items", "properties",
    "additionalProperties", "patternProperties", "allOf", "oneOf", "anyOf", "not", "if", "then",
    "else", "prefixItems", "requestBody", "get", "put", "post", "delete", "options", "head",
    "patch", "trace", "$defs", "definitions", "dependentSchemas", "contains", "propertyNames",
];

/// Everything the naming callback gets to decide a component name.
#[derive(Debug)]
pub struct NameRequest<'a> {
    /// Default name derived from the first occurrence's location.
    pub suggested: &'a str,
    /// Content hash shared by all occurrences.
    pub hash: &'a ContentHash,
    /// Every location holding this schema, in document order.
    pub locations: &'a [Location],
    /// The schema itself (as first seen).
    pub schema: &'a Value,
}

/// What [`optimize`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptimizeReport {
    /// New component names, in creation order.
    pub created: Vec<String>,
    /// Inline occurrences replaced by `$ref`.
    pub replaced: usize,
}

/// One group of structurally identical inline schemas.
#[derive(Debug)]
struct Group {
    schema: Value,
    locations: Vec<Location>,
}

/// Deduplicate inline schemas using default component names.
///
/// # Errors
///
/// Only [`Error::Walk`] on cancellation.
pub fn optimize(doc: &mut Value) -> Result<OptimizeReport> {
    optimize_with(doc, None, |request| request.suggested.to_string())
}

/// Deduplicate inline schemas, asking `namer` for each new component's name.
///
/// The returned name is sanitized and de-conflicted against existing
/// component names, so the callback may return the suggestion unchanged.
///
/// # Errors
///
/// [`Error::Walk`] once `cancel` fires.
pub fn optimize_with(
    doc: &mut Value,
    cancel: Option<&CancelToken>,
    mut namer: impl FnMut(&NameRequest<'_>) -> String,
) -> Result<OptimizeReport> {
    // Catalog existing component schemas
    let mut existing: HashMap<ContentHash, String> = HashMap::new();
    let mut taken: HashSet<String> = HashSet::new();
    if let Some(schemas) = component_section(doc, ComponentKind::Schemas) {
        for (name, schema) in schemas {
            let Some(name) = key_str(name) else {
                continue;
            };
            existing
                .entry(ContentHash::of(schema))
                .or_insert_with(|| name.to_string());
            taken.insert(name.into_owned());
        }
    }

    let groups = collect(doc, cancel)?;

    // Deepest first; stable, so equal depths keep document order
    let mut pending: Vec<(&ContentHash, &Location)> = groups
        .iter()
        .filter(|(hash, group)| group.locations.len() > 1 || existing.contains_key(*hash))
        .flat_map(|(hash, group)| group.locations.iter().map(move |loc| (hash, loc)))
        .collect();
    pending.sort_by(|a, b| b.1.depth().cmp(&a.1.depth()));

    let mut names: HashMap<&ContentHash, String> = HashMap::new();
    let mut created: IndexMap<String, Value> = IndexMap::new();
    let mut replaced = 0;

    for (hash, location) in pending {
        let name = if let Some(name) = names.get(hash) {
            name.clone()
        } else {
            let name = if let Some(name) = existing.get(hash) {
                name.clone()
            } else {
                let group = &groups[hash];
                let suggested = suggest_name(&group.locations[0]);
                let requested = namer(&NameRequest {
                    suggested: &suggested,
                    hash,
                    locations: &group.locations,
                    schema: &group.schema,
                });
                let base = component_name(&requested);
                let name = if taken.contains(&base) {
                    counter_name(&base, |c| !taken.contains(c))
                } else {
                    base
                };
                taken.insert(name.clone());

                // Materialize from the current value: inner duplicates are
                // already references at this point.
                let value = location.get(doc).cloned().unwrap_or_else(|| group.schema.clone());
                debug!(
                    target: "oaskit::optimize",
                    %name,
                    hash = hash.short(),
                    occurrences = group.locations.len(),
                    "extracting schema"
                );
                created.insert(name.clone(), value);
                name
            };
            names.insert(hash, name.clone());
            name
        };

        let reference = ComponentKind::Schemas.local_ref(&name);
        if let Some(slot) = location.get_mut(doc) {
            let mut target = serde_yaml_ng::Mapping::new();
            target.insert(Value::String("$ref".to_string()), Value::String(reference));
            *slot = Value::Mapping(target);
            replaced += 1;
        }
    }

    let report = OptimizeReport {
        created: created.keys().cloned().collect(),
        replaced,
    };
    insert_components(doc, ComponentKind::Schemas, created);

    info!(
        target: "oaskit::optimize",
        created = report.created.len(),
        replaced = report.replaced,
        "deduplicated inline schemas"
    );
    Ok(report)
}

/// Group complex inline schemas by hash, in document order.
fn collect(doc: &mut Value, cancel: Option<&CancelToken>) -> Result<IndexMap<ContentHash, Group>> {
    let mut groups: IndexMap<ContentHash, Group> = IndexMap::new();
    walk::<Error, _>(doc, NodeKind::Document, &walk_options(cancel), |visit| {
        if visit.kind() != NodeKind::Schema {
            return Ok(Flow::Continue);
        }
        let location = visit.location();
        let is_component_root = location.depth() == 3
            && location.starts_with(&["components", ComponentKind::Schemas.as_ref()]);
        let node = visit.node();
        if is_component_root || reference_of(node).is_some() || !is_complex(node) {
            return Ok(Flow::Continue);
        }

        groups
            .entry(ContentHash::of(node))
            .or_insert_with(|| Group {
                schema: node.clone(),
                locations: Vec::new(),
            })
            .locations
            .push(location.clone());
        Ok(Flow::Continue)
    })?;
    Ok(groups)
}

/// Whether a schema is worth extracting; primitives never are.
fn is_complex(schema: &Value) -> bool {
    let Some(map) = schema.as_mapping() else {
        return false;
    };
    if COMPLEX_KEYWORDS.iter().any(|k| map.contains_key(*k)) {
        return true;
    }
    map.get("type")
        .and_then(Value::as_sequence)
        .is_some_and(|types| types.len() > 1)
}

/// PascalCase name from the nearest meaningful location token.
///
/// `/components/schemas/Pet/properties/owner` → `Owner`;
/// `/paths/~1pets~1{id}/get/...` → `Pets`.
fn suggest_name(location: &Location) -> String {
    location
        .tokens()
        .iter()
        .rev()
        .find_map(|token| meaningful(token))
        .map_or_else(|| FALLBACK_NAME.to_string(), |t| t.to_pascal_case())
}

fn meaningful(token: &str) -> Option<&str> {
    if STRUCTURAL_TOKENS.contains(&token) || token.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if token.starts_with('/') {
        // Path template: last literal segment
        return token
            .split('/')
            .rev()
            .find(|s| !s.is_empty() && !s.starts_with('{'));
    }
    if token.contains('/') || token.starts_with("x-") {
        // media type or extension
        return None;
    }
    Some(token)
}
