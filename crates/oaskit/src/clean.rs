//! Clean: remove components and tags nothing reaches.
//!
//! Reachability is a fixed point over per-kind sets of used component names:
//!
//! 1. seed from `/paths`, `/webhooks`, and `/security` (security requirements
//!    name schemes directly, not through `$ref`);
//! 2. repeatedly walk only the components already marked used, adding what
//!    they reference, until a pass adds nothing;
//! 3. drop every unmarked component, then empty sections, then an empty
//!    `components`; drop top-level tags no operation uses.
//!
//! Cycles that nothing outside the cycle reaches are never marked, so they
//! are removed along with everything else unreachable.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use oaskit_core::pointer::key_str;
use oaskit_core::walk::{parse_component_ref, walk, ComponentKind, Flow, NodeKind, Visit};
use oaskit_core::{CancelToken, Location};
use serde_yaml_ng::Value;
use strum::IntoEnumIterator;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::helpers::walk_options;

/// Top-level sections that are entry points of the API surface.
const SEEDS: &[&str] = &["paths", "webhooks", "security"];

/// What [`clean`] removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanReport {
    /// Removed components as `(kind, name)`, in document order.
    pub removed_components: Vec<(ComponentKind, String)>,
    /// Removed top-level tag names, in document order.
    pub removed_tags: Vec<String>,
    /// Expansion passes until the fixed point.
    pub passes: usize,
}

/// Used component names and tag names; only ever grows.
#[derive(Debug, Default)]
struct Tracker {
    used: BTreeMap<ComponentKind, BTreeSet<String>>,
    tags: BTreeSet<String>,
}

impl Tracker {
    fn mark(&mut self, kind: ComponentKind, name: String) {
        self.used.entry(kind).or_default().insert(name);
    }

    fn is_used(&self, kind: ComponentKind, name: &str) -> bool {
        self.used.get(&kind).is_some_and(|names| names.contains(name))
    }

    /// Total tracked names; compared between passes to detect the fixed point.
    fn size(&self) -> usize {
        self.used.values().map(BTreeSet::len).sum::<usize>() + self.tags.len()
    }

    /// Whether `location` lies inside a used `components.<kind>.<name>` entry.
    fn covers(&self, location: &Location) -> bool {
        let (Some("components"), Some(kind), Some(name)) =
            (location.token(0), location.token(1), location.token(2))
        else {
            return false;
        };
        ComponentKind::from_str(kind).is_ok_and(|kind| self.is_used(kind, name))
    }

    fn absorb(&mut self, found: Found) {
        for (kind, name) in found.components {
            self.mark(kind, name);
        }
        self.tags.extend(found.tags);
    }
}

/// Names discovered during one walk, merged after the walk completes.
#[derive(Debug, Default)]
struct Found {
    components: Vec<(ComponentKind, String)>,
    tags: Vec<String>,
}

impl Found {
    fn record(&mut self, visit: &Visit<'_>) {
        if let Some((kind, name)) = visit.reference().and_then(parse_component_ref) {
            self.components.push((kind, name));
        }

        match visit.kind() {
            NodeKind::SecurityRequirement => {
                if let Some(requirement) = visit.node().as_mapping() {
                    self.components.extend(requirement.keys().filter_map(|k| {
                        key_str(k).map(|name| (ComponentKind::SecuritySchemes, name.into_owned()))
                    }));
                }
            }
            NodeKind::Operation => {
                if let Some(tags) = visit.node().get("tags").and_then(Value::as_sequence) {
                    self.tags
                        .extend(tags.iter().filter_map(Value::as_str).map(String::from));
                }
            }
            NodeKind::Schema => self.record_discriminator(visit.node()),
            _ => {}
        }
    }

    /// `discriminator.mapping` values are schema references without `$ref`.
    fn record_discriminator(&mut self, schema: &Value) {
        let Some(mapping) = schema
            .get("discriminator")
            .and_then(|d| d.get("mapping"))
            .and_then(Value::as_mapping)
        else {
            return;
        };
        for target in mapping.values().filter_map(Value::as_str) {
            if let Some((kind, name)) = parse_component_ref(target) {
                self.components.push((kind, name));
            }
        }
    }
}

/// Remove every component and tag not reachable from the API surface.
///
/// # Errors
///
/// Only [`Error::Walk`] on cancellation; well-formed input cannot fail.
pub fn clean(doc: &mut Value) -> Result<CleanReport> {
    clean_with(doc, None)
}

/// [`clean`] with a cancellation token.
///
/// # Errors
///
/// [`Error::Walk`] once `cancel` fires.
pub fn clean_with(doc: &mut Value, cancel: Option<&CancelToken>) -> Result<CleanReport> {
    let mut tracker = Tracker::default();

    // Seed
    let found = track(doc, cancel, |location| {
        location.token(0).is_some_and(|t| SEEDS.contains(&t))
    })?;
    tracker.absorb(found);

    // Expand to the fixed point
    let mut passes = 0;
    loop {
        passes += 1;
        let before = tracker.size();
        let found = track(doc, cancel, |location| tracker.covers(location))?;
        tracker.absorb(found);
        if tracker.size() == before {
            break;
        }
    }

    let mut report = CleanReport {
        passes,
        ..CleanReport::default()
    };
    prune_components(doc, &tracker, &mut report);
    prune_tags(doc, &tracker, &mut report);

    info!(
        target: "oaskit::clean",
        components = report.removed_components.len(),
        tags = report.removed_tags.len(),
        passes,
        "removed unreachable components"
    );
    Ok(report)
}

fn track(
    doc: &mut Value,
    cancel: Option<&CancelToken>,
    filter: impl Fn(&Location) -> bool,
) -> Result<Found> {
    let options = walk_options(cancel).filter(filter);
    let mut found = Found::default();
    walk::<Error, _>(doc, NodeKind::Document, &options, |visit| {
        found.record(visit);
        Ok(Flow::Continue)
    })?;
    Ok(found)
}

fn prune_components(doc: &mut Value, tracker: &Tracker, report: &mut CleanReport) {
    let Some(root) = doc.as_mapping_mut() else {
        return;
    };
    let Some(components) = root.get_mut("components").and_then(Value::as_mapping_mut) else {
        return;
    };

    for kind in ComponentKind::iter() {
        let Some(section) = components
            .get_mut(kind.as_ref())
            .and_then(Value::as_mapping_mut)
        else {
            continue;
        };

        let unused: Vec<Value> = section
            .keys()
            .filter(|k| key_str(k).is_none_or(|name| !tracker.is_used(kind, &name)))
            .cloned()
            .collect();
        for key in unused {
            section.shift_remove(&key);
            let name = key_str(&key).map(|n| n.into_owned()).unwrap_or_default();
            debug!(target: "oaskit::clean", %kind, %name, "removed component");
            report.removed_components.push((kind, name));
        }

        if section.is_empty() {
            components.shift_remove(kind.as_ref());
        }
    }

    let components_empty = components.is_empty();
    if components_empty {
        root.shift_remove("components");
    }
}

fn prune_tags(doc: &mut Value, tracker: &Tracker, report: &mut CleanReport) {
    let Some(root) = doc.as_mapping_mut() else {
        return;
    };
    let Some(tags) = root.get_mut("tags").and_then(Value::as_sequence_mut) else {
        return;
    };

    tags.retain(|tag| {
        let Some(name) = tag.get("name").and_then(Value::as_str) else {
            return true;
        };
        let keep = tracker.tags.contains(name);
        if !keep {
            report.removed_tags.push(name.to_string());
        }
        keep
    });

    if tags.is_empty() {
        root.shift_remove("tags");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn parse(yaml: &str) -> Value {
        serde_yaml_ng::from_str(yaml).unwrap()
    }

    fn names(doc: &Value, kind: ComponentKind) -> Vec<String> {
        crate::helpers::component_names(doc, kind)
    }

    const DOC: &str = indoc! {r"
        openapi: 3.1.0
        tags:
          - name: pets
          - name: orphan
          - name: users
        security:
          - api_key: []
        paths:
          /pets:
            get:
              tags: [pets]
              parameters:
                - $ref: '#/components/parameters/Limit'
              responses:
                '200':
                  $ref: '#/components/responses/PetList'
          /users:
            get:
              tags: [users]
              security:
                - oauth: [read]
              responses:
                '200':
                  description: OK
        components:
          schemas:
            Pet:
              type: object
              properties:
                parent:
                  $ref: '#/components/schemas/Pet'
                owner:
                  $ref: '#/components/schemas/Owner'
            Owner:
              type: object
            B:
              properties:
                c: {$ref: '#/components/schemas/C'}
            C:
              properties:
                b: {$ref: '#/components/schemas/B'}
            Lonely:
              type: string
          responses:
            PetList:
              description: pets
              content:
                application/json:
                  schema:
                    type: array
                    items:
                      $ref: '#/components/schemas/Pet'
          parameters:
            Limit:
              name: limit
              in: query
              schema: {type: integer}
          headers:
            Unused:
              schema: {type: string}
          securitySchemes:
            api_key: {type: apiKey, name: key, in: header}
            oauth: {type: oauth2, flows: {}}
            basic: {type: http, scheme: basic}
    "};

    #[test]
    fn removes_unreachable_and_keeps_transitive() {
        let mut doc = parse(DOC);
        let report = clean(&mut doc).unwrap();

        assert_eq!(names(&doc, ComponentKind::Schemas), vec!["Pet", "Owner"]);
        assert_eq!(names(&doc, ComponentKind::Responses), vec!["PetList"]);
        assert_eq!(names(&doc, ComponentKind::Parameters), vec!["Limit"]);
        assert_eq!(
            names(&doc, ComponentKind::SecuritySchemes),
            vec!["api_key", "oauth"]
        );
        assert!(doc["components"].get("headers").is_none());
        assert_eq!(
            report.removed_components,
            vec![
                (ComponentKind::Schemas, "B".to_string()),
                (ComponentKind::Schemas, "C".to_string()),
                (ComponentKind::Schemas, "Lonely".to_string()),
                (ComponentKind::Headers, "Unused".to_string()),
                (ComponentKind::SecuritySchemes, "basic".to_string()),
            ]
        );
    }

    #[test]
    fn prunes_unused_tags_in_order() {
        let mut doc = parse(DOC);
        let report = clean(&mut doc).unwrap();
        let tags: Vec<&str> = doc["tags"]
            .as_sequence()
            .unwrap()
            .iter()
            .filter_map(|t| t["name"].as_str())
            .collect();
        assert_eq!(tags, vec!["pets", "users"]);
        assert_eq!(report.removed_tags, vec!["orphan"]);
    }

    #[test]
    fn clean_is_idempotent() {
        let mut once = parse(DOC);
        clean(&mut once).unwrap();
        let mut twice = once.clone();
        let report = clean(&mut twice).unwrap();
        assert_eq!(once, twice);
        assert!(report.removed_components.is_empty());
    }

    #[test]
    fn everything_unused_drops_components_and_tags() {
        let mut doc = parse(indoc! {r"
            tags: [{name: a}]
            paths: {}
            components:
              schemas:
                A: {$ref: '#/components/schemas/A'}
        "});
        clean(&mut doc).unwrap();
        assert!(doc.get("components").is_none());
        assert!(doc.get("tags").is_none());
    }

    #[test]
    fn components_with_only_extensions_survive() {
        let mut doc = parse(indoc! {r"
            paths: {}
            components:
              x-owner: team
              schemas:
                A: {type: string}
        "});
        clean(&mut doc).unwrap();
        assert_eq!(doc["components"]["x-owner"].as_str(), Some("team"));
        assert!(doc["components"].get("schemas").is_none());
    }

    #[test]
    fn webhooks_and_discriminator_mapping_are_roots() {
        let mut doc = parse(indoc! {r"
            webhooks:
              newPet:
                post:
                  requestBody:
                    content:
                      application/json:
                        schema: {$ref: '#/components/schemas/Pet'}
            components:
              schemas:
                Pet:
                  oneOf:
                    - $ref: '#/components/schemas/Cat'
                  discriminator:
                    propertyName: kind
                    mapping:
                      dog: '#/components/schemas/Dog'
                Cat: {type: object}
                Dog: {type: object}
                Fish: {type: object}
        "});
        clean(&mut doc).unwrap();
        assert_eq!(names(&doc, ComponentKind::Schemas), vec!["Pet", "Cat", "Dog"]);
    }

    #[test]
    fn cancelled_clean_fails() {
        let mut doc = parse(DOC);
        let token = CancelToken::new();
        token.cancel();
        let err = clean_with(&mut doc, Some(&token)).unwrap_err();
        assert!(matches!(err, Error::Walk(_)));
    }
}
