//! Shared YAML manipulation helpers used across the engines.

use oaskit_core::{CancelToken, ComponentKind, WalkOptions};
use serde_yaml_ng::{Mapping, Value};

/// Shorthand for `Value::String`.
pub fn val_s(s: &str) -> Value {
    Value::String(s.to_string())
}

/// Walk options honoring an optional cancel token.
pub fn walk_options<'a>(cancel: Option<&CancelToken>) -> WalkOptions<'a> {
    match cancel {
        Some(token) => WalkOptions::new().cancel(token.clone()),
        None => WalkOptions::new(),
    }
}

/// The mapping under `key`, created (or replacing a non-mapping) if needed.
pub fn ensure_mapping<'m>(map: &'m mut Mapping, key: &str) -> Option<&'m mut Mapping> {
    let slot = map
        .entry(val_s(key))
        .or_insert_with(|| Value::Mapping(Mapping::new()));
    if !slot.is_mapping() {
        *slot = Value::Mapping(Mapping::new());
    }
    slot.as_mapping_mut()
}

/// `components.<kind>` of the document, if present.
pub fn component_section(doc: &Value, kind: ComponentKind) -> Option<&Mapping> {
    doc.as_mapping()?
        .get("components")?
        .as_mapping()?
        .get(kind.as_ref())?
        .as_mapping()
}

/// Names of every `components.<kind>` entry, in document order.
#[cfg(test)]
pub fn component_names(doc: &Value, kind: ComponentKind) -> Vec<String> {
    component_section(doc, kind)
        .map(|section| {
            section
                .keys()
                .filter_map(|k| oaskit_core::pointer::key_str(k).map(|k| k.into_owned()))
                .collect()
        })
        .unwrap_or_default()
}

/// Append entries to `components.<kind>`, creating the sections as needed.
///
/// Existing entries with the same name are left untouched. Returns the
/// number of entries inserted.
pub fn insert_components(
    doc: &mut Value,
    kind: ComponentKind,
    entries: impl IntoIterator<Item = (String, Value)>,
) -> usize {
    let mut entries = entries.into_iter().peekable();
    if entries.peek().is_none() {
        return 0;
    }
    let Some(section) = doc
        .as_mapping_mut()
        .and_then(|root| ensure_mapping(root, "components"))
        .and_then(|components| ensure_mapping(components, kind.as_ref()))
    else {
        return 0;
    };

    let mut inserted = 0;
    for (name, value) in entries {
        let key = val_s(&name);
        if !section.contains_key(&key) {
            section.insert(key, value);
            inserted += 1;
        }
    }
    inserted
}

/// Restrict a raw name to the characters OpenAPI allows in component keys
/// (`^[a-zA-Z0-9._-]+$`).
pub fn component_name(raw: &str) -> String {
    let name: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if name.is_empty() {
        "Component".to_string()
    } else {
        name
    }
}

/// First `{base}_{n}` (n = 1, 2, ...) for which `is_free` holds.
pub fn counter_name(base: &str, mut is_free: impl FnMut(&str) -> bool) -> String {
    let mut n = 1usize;
    loop {
        let candidate = format!("{base}_{n}");
        if is_free(&candidate) {
            return candidate;
        }
        n += 1;
    }
}
