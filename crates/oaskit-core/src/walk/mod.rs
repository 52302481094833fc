//! Deterministic, cancellable traversal of an OpenAPI document tree.
//!
//! The walker recovers each node's [`NodeKind`] from its position (a closed
//! field table, no runtime type registry) and hands the visitor a [`Visit`]
//! bound to the live node, so engines can inspect, replace, or re-point it
//! in place. Mapping entries are visited in document order, which makes
//! every engine built on top reproducible.
//!
//! ```
//! use oaskit_core::walk::{walk, Flow, NodeKind, WalkOptions};
//! use oaskit_core::WalkError;
//!
//! let yaml = "
//! paths:
//!   /pets:
//!     get:
//!       responses:
//!         '200':
//!           $ref: '#/components/responses/Ok'
//! ";
//! let mut doc: serde_yaml_ng::Value = serde_yaml_ng::from_str(yaml).unwrap();
//!
//! let mut refs = Vec::new();
//! walk::<WalkError, _>(&mut doc, NodeKind::Document, &WalkOptions::new(), |visit| {
//!     if let Some(r) = visit.reference() {
//!         refs.push(r.to_string());
//!     }
//!     Ok(Flow::Continue)
//! })
//! .unwrap();
//! assert_eq!(refs, vec!["#/components/responses/Ok"]);
//! ```

mod kind;
mod refs;

use std::fmt;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_yaml_ng::{Mapping, Value};

use crate::error::WalkError;
use crate::pointer::{key_str, Location};

pub use kind::{parse_component_ref, ComponentKind, NodeKind};
pub(crate) use kind::Shape;
pub use refs::{collect_refs, for_each_ref_mut, reference_of};

/// Shared cancellation flag, checked before every visit and at I/O calls.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; every clone observes it.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// `Err(WalkError::Cancelled)` once cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`WalkError::Cancelled`] if [`cancel`](Self::cancel) was called.
    pub fn check(&self) -> Result<(), WalkError> {
        if self.is_cancelled() {
            Err(WalkError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// What the walker does after a visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flow {
    /// Descend into the node's children.
    #[default]
    Continue,
    /// Do not descend into this node; continue with its siblings.
    SkipChildren,
    /// End the whole walk successfully.
    Stop,
}

type LocationFilter<'a> = Box<dyn Fn(&Location) -> bool + 'a>;

/// Walk configuration.
#[derive(Default)]
pub struct WalkOptions<'a> {
    filter: Option<LocationFilter<'a>>,
    base: Location,
    cancel: Option<CancelToken>,
}

impl fmt::Debug for WalkOptions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalkOptions")
            .field("filter", &self.filter.is_some())
            .field("base", &self.base)
            .field("cancel", &self.cancel)
            .finish()
    }
}

impl<'a> WalkOptions<'a> {
    /// Visit everything, starting at the document root.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Only report nodes whose location satisfies `predicate`.
    ///
    /// Rejected nodes are still descended into, so a predicate such as
    /// "under `/paths`" skips the document root but reports everything below.
    #[must_use]
    pub fn filter(mut self, predicate: impl Fn(&Location) -> bool + 'a) -> Self {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Report locations relative to `base` instead of the root.
    ///
    /// Used when walking a detached subtree (a resolved reference target or
    /// a stored component) as if it were mounted at `base`.
    #[must_use]
    pub fn base(mut self, base: Location) -> Self {
        self.base = base;
        self
    }

    /// Stop with [`WalkError::Cancelled`] once `token` is cancelled.
    #[must_use]
    pub fn cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn accepts(&self, location: &Location) -> bool {
        self.filter.as_ref().is_none_or(|f| f(location))
    }

    fn check_cancelled(&self) -> Result<(), WalkError> {
        self.cancel.as_ref().map_or(Ok(()), CancelToken::check)
    }
}

/// One visited node.
#[derive(Debug)]
pub struct Visit<'v> {
    kind: NodeKind,
    location: &'v Location,
    node: &'v mut Value,
}

impl Visit<'_> {
    /// The node's OpenAPI object type.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// The node's position.
    #[must_use]
    pub fn location(&self) -> &Location {
        self.location
    }

    /// Borrow the node.
    #[must_use]
    pub fn node(&self) -> &Value {
        self.node
    }

    /// Mutably borrow the node.
    pub fn node_mut(&mut self) -> &mut Value {
        self.node
    }

    /// The `$ref` target if this is a reference object of a referenceable kind.
    #[must_use]
    pub fn reference(&self) -> Option<&str> {
        if self.kind.is_referenceable() {
            reference_of(self.node)
        } else {
            None
        }
    }

    /// Replace the node; the walker descends into the replacement.
    pub fn set(&mut self, value: Value) {
        *self.node = value;
    }

    /// Point this node at `target`.
    ///
    /// An existing reference object keeps its sibling keys (`summary`,
    /// `description`); anything else is replaced by `{$ref: target}`.
    pub fn set_reference(&mut self, target: impl Into<String>) {
        let target = Value::String(target.into());
        match self.node.as_mapping_mut() {
            Some(map) if map.contains_key("$ref") => {
                map.insert(Value::String("$ref".to_string()), target);
            }
            _ => {
                let mut map = Mapping::new();
                map.insert(Value::String("$ref".to_string()), target);
                *self.node = Value::Mapping(map);
            }
        }
    }
}

/// Walk `root` (of kind `root_kind`), calling `visitor` for each node.
///
/// Null nodes are skipped. `x-*` keys are reported as [`NodeKind::Extension`]
/// and never descended into.
///
/// # Errors
///
/// Returns the visitor's first error, or [`WalkError::Cancelled`] converted
/// into `E` when the options' cancel token fires.
pub fn walk<E, F>(
    root: &mut Value,
    root_kind: NodeKind,
    options: &WalkOptions<'_>,
    visitor: F,
) -> Result<(), E>
where
    E: From<WalkError>,
    F: FnMut(&mut Visit<'_>) -> Result<Flow, E>,
{
    let mut walker = Walker {
        options,
        visitor,
        location: options.base.clone(),
    };
    walker.node(root, root_kind).map(|_| ())
}

struct Walker<'o, 'f, F> {
    options: &'o WalkOptions<'f>,
    visitor: F,
    location: Location,
}

type Step = ControlFlow<()>;

impl<F> Walker<'_, '_, F> {
    fn node<E>(&mut self, node: &mut Value, kind: NodeKind) -> Result<Step, E>
    where
        E: From<WalkError>,
        F: FnMut(&mut Visit<'_>) -> Result<Flow, E>,
    {
        self.options.check_cancelled()?;
        if node.is_null() {
            return Ok(Step::Continue(()));
        }

        let flow = if self.options.accepts(&self.location) {
            let mut visit = Visit {
                kind,
                location: &self.location,
                node: &mut *node,
            };
            (self.visitor)(&mut visit)?
        } else {
            Flow::Continue
        };

        match flow {
            Flow::Stop => Ok(Step::Break(())),
            Flow::SkipChildren => Ok(Step::Continue(())),
            Flow::Continue if kind == NodeKind::Extension => Ok(Step::Continue(())),
            Flow::Continue => self.fields(node, kind),
        }
    }

    fn fields<E>(&mut self, node: &mut Value, kind: NodeKind) -> Result<Step, E>
    where
        E: From<WalkError>,
        F: FnMut(&mut Visit<'_>) -> Result<Flow, E>,
    {
        let Some(map) = node.as_mapping_mut() else {
            return Ok(Step::Continue(()));
        };

        for (key, value) in map.iter_mut() {
            let Some(key) = key_str(key) else {
                continue;
            };
            let shape = if kind.has_extensions() && key.starts_with("x-") {
                Some(Shape::One(NodeKind::Extension))
            } else {
                kind.field(&key)
            };
            let Some(shape) = shape else {
                continue;
            };

            self.location.push(key.into_owned());
            let step = self.shaped(value, shape);
            self.location.pop();
            if step?.is_break() {
                return Ok(Step::Break(()));
            }
        }
        Ok(Step::Continue(()))
    }

    fn shaped<E>(&mut self, value: &mut Value, shape: Shape) -> Result<Step, E>
    where
        E: From<WalkError>,
        F: FnMut(&mut Visit<'_>) -> Result<Flow, E>,
    {
        match shape {
            Shape::One(kind) => self.node(value, kind),
            Shape::OneOrSeq(kind) if !value.is_sequence() => self.node(value, kind),
            Shape::Seq(kind) | Shape::OneOrSeq(kind) => {
                let Some(items) = value.as_sequence_mut() else {
                    return Ok(Step::Continue(()));
                };
                for (index, item) in items.iter_mut().enumerate() {
                    self.location.push(index.to_string());
                    let step = self.node(item, kind);
                    self.location.pop();
                    if step?.is_break() {
                        return Ok(Step::Break(()));
                    }
                }
                Ok(Step::Continue(()))
            }
            Shape::Map(kind) => self.entries(value, kind, false),
            Shape::Patterned(kind) => self.entries(value, kind, true),
        }
    }

    fn entries<E>(&mut self, value: &mut Value, kind: NodeKind, patterned: bool) -> Result<Step, E>
    where
        E: From<WalkError>,
        F: FnMut(&mut Visit<'_>) -> Result<Flow, E>,
    {
        let Some(map) = value.as_mapping_mut() else {
            return Ok(Step::Continue(()));
        };

        for (key, entry) in map.iter_mut() {
            let Some(key) = key_str(key) else {
                continue;
            };
            let entry_kind = if patterned && key.starts_with("x-") {
                NodeKind::Extension
            } else {
                kind
            };

            self.location.push(key.into_owned());
            let step = self.node(entry, entry_kind);
            self.location.pop();
            if step?.is_break() {
                return Ok(Step::Break(()));
            }
        }
        Ok(Step::Continue(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn doc() -> Value {
        serde_yaml_ng::from_str(indoc! {r"
            openapi: 3.1.0
            info:
              title: Pets
              x-logo: logo.png
            paths:
              x-internal: true
              /pets:
                get:
                  parameters:
                    - $ref: '#/components/parameters/Limit'
                  responses:
                    200:
                      description: OK
                      content:
                        application/json:
                          schema:
                            type: array
                            items:
                              $ref: '#/components/schemas/Pet'
            components:
              schemas:
                Pet:
                  type: object
                  properties:
                    x-name:
                      type: string
                  x-extra: 1
              parameters:
                Limit:
                  name: limit
                  in: query
            security:
              - api_key: []
        "})
        .unwrap()
    }

    fn visits(doc: &mut Value, options: &WalkOptions<'_>) -> Vec<(NodeKind, String)> {
        let mut out = Vec::new();
        walk::<WalkError, _>(doc, NodeKind::Document, options, |visit| {
            out.push((visit.kind(), visit.location().to_pointer()));
            Ok(Flow::Continue)
        })
        .unwrap();
        out
    }

    #[test]
    fn visits_in_document_order_with_kinds() {
        let mut doc = doc();
        let seen = visits(&mut doc, &WalkOptions::new());
        let expected = vec![
            (NodeKind::Document, ""),
            (NodeKind::Info, "/info"),
            (NodeKind::Extension, "/info/x-logo"),
            (NodeKind::Extension, "/paths/x-internal"),
            (NodeKind::PathItem, "/paths/~1pets"),
            (NodeKind::Operation, "/paths/~1pets/get"),
            (NodeKind::Parameter, "/paths/~1pets/get/parameters/0"),
            (NodeKind::Response, "/paths/~1pets/get/responses/200"),
            (NodeKind::MediaType, "/paths/~1pets/get/responses/200/content/application~1json"),
            (
                NodeKind::Schema,
                "/paths/~1pets/get/responses/200/content/application~1json/schema",
            ),
            (
                NodeKind::Schema,
                "/paths/~1pets/get/responses/200/content/application~1json/schema/items",
            ),
            (NodeKind::Components, "/components"),
            (NodeKind::Schema, "/components/schemas/Pet"),
            (NodeKind::Schema, "/components/schemas/Pet/properties/x-name"),
            (NodeKind::Extension, "/components/schemas/Pet/x-extra"),
            (NodeKind::Parameter, "/components/parameters/Limit"),
            (NodeKind::SecurityRequirement, "/security/0"),
        ];
        let expected: Vec<_> = expected
            .into_iter()
            .map(|(k, p)| (k, p.to_string()))
            .collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn filter_skips_reporting_but_descends() {
        let mut doc = doc();
        let options = WalkOptions::new().filter(|loc| loc.starts_with(&["components"]));
        let seen = visits(&mut doc, &options);
        assert_eq!(seen.first().map(|(k, _)| *k), Some(NodeKind::Components));
        assert!(seen.iter().all(|(_, p)| p.starts_with("/components")));
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn base_prefixes_locations() {
        let mut schema: Value = serde_yaml_ng::from_str("items: {type: string}").unwrap();
        let options = WalkOptions::new().base(Location::parse("/components/schemas/Tags"));
        let mut seen = Vec::new();
        walk::<WalkError, _>(&mut schema, NodeKind::Schema, &options, |visit| {
            seen.push(visit.location().to_pointer());
            Ok(Flow::Continue)
        })
        .unwrap();
        assert_eq!(
            seen,
            vec!["/components/schemas/Tags", "/components/schemas/Tags/items"]
        );
    }

    #[test]
    fn skip_children_and_stop() {
        let mut doc = doc();
        let mut seen = Vec::new();
        walk::<WalkError, _>(&mut doc, NodeKind::Document, &WalkOptions::new(), |visit| {
            seen.push(visit.kind());
            Ok(match visit.kind() {
                NodeKind::PathItem => Flow::SkipChildren,
                NodeKind::Components => Flow::Stop,
                _ => Flow::Continue,
            })
        })
        .unwrap();
        assert!(!seen.contains(&NodeKind::Operation));
        assert_eq!(seen.last(), Some(&NodeKind::Components));
    }

    #[test]
    fn cancellation_surfaces_as_error() {
        let mut doc = doc();
        let token = CancelToken::new();
        let options = WalkOptions::new().cancel(token.clone());
        let mut count = 0;
        let result = walk::<WalkError, _>(&mut doc, NodeKind::Document, &options, |_| {
            count += 1;
            if count == 3 {
                token.cancel();
            }
            Ok(Flow::Continue)
        });
        assert_eq!(result, Err(WalkError::Cancelled));
        assert_eq!(count, 3);
    }

    #[test]
    fn set_reference_keeps_siblings() {
        let mut doc: Value = serde_yaml_ng::from_str(indoc! {r"
            paths:
              /a:
                get:
                  responses:
                    '200':
                      $ref: other.yaml#/Ok
                      description: overridden
                    '404':
                      description: inline
        "})
        .unwrap();
        walk::<WalkError, _>(&mut doc, NodeKind::Document, &WalkOptions::new(), |visit| {
            if visit.kind() == NodeKind::Response {
                visit.set_reference("#/components/responses/Ok");
            }
            Ok(Flow::Continue)
        })
        .unwrap();

        let responses = &doc["paths"]["/a"]["get"]["responses"];
        assert_eq!(responses["200"]["$ref"].as_str(), Some("#/components/responses/Ok"));
        assert_eq!(responses["200"]["description"].as_str(), Some("overridden"));
        assert_eq!(responses["404"]["$ref"].as_str(), Some("#/components/responses/Ok"));
        assert!(responses["404"].get("description").is_none());
    }

    #[test]
    fn reference_only_on_referenceable_kinds() {
        let mut doc: Value = serde_yaml_ng::from_str(indoc! {r"
            info:
              $ref: not-a-reference.yaml
            components:
              schemas:
                A:
                  $ref: '#/components/schemas/B'
        "})
        .unwrap();
        let mut refs = Vec::new();
        walk::<WalkError, _>(&mut doc, NodeKind::Document, &WalkOptions::new(), |visit| {
            if let Some(r) = visit.reference() {
                refs.push(r.to_string());
            }
            Ok(Flow::Continue)
        })
        .unwrap();
        assert_eq!(refs, vec!["#/components/schemas/B"]);
    }
}
