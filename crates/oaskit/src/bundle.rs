//! Bundle: inline every external reference into local components.
//!
//! For each external `$ref` in the document (walk order), the target is
//! resolved, given a conflict-free component name, stored, and then crawled
//! for its own external references using its document as the new base. Once
//! everything is resolved:
//!
//! 1. references inside the stored components are rewritten to local names,
//! 2. references in the original document are rewritten to local names,
//! 3. the stored components are merged into `components`.
//!
//! Schemas are deduplicated by content: an external schema whose simple name
//! is already taken by an identical schema reuses that component.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use oaskit_core::pointer::key_str;
use oaskit_core::reference::{
    flatten_path, path_from_root, split_fragment, with_fragment, Reference,
};
use oaskit_core::walk::{for_each_ref_mut, walk, ComponentKind, Flow};
use oaskit_core::{resolve_against, CancelToken, ContentHash, Location, NodeKind};
use serde::Deserialize;
use serde_yaml_ng::Value;
use strum::IntoEnumIterator;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::helpers::{component_name, counter_name, insert_components, walk_options};
use crate::resolve::{ResolveOptions, Resolver};

/// Fallback when a component's simple name is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleNaming {
    /// `Pet_1`, `Pet_2`, ...
    #[default]
    Counter,
    /// Name derived from the file path (`schemas_pet_Pet`), counter as last resort.
    #[serde(alias = "file_path")]
    FilePath,
}

/// Configuration for [`bundle`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BundleOptions<'a> {
    resolve: ResolveOptions<'a>,
    naming: BundleNaming,
}

impl<'a> BundleOptions<'a> {
    /// Bundle with `resolve` and the counter naming strategy.
    #[must_use]
    pub fn new(resolve: ResolveOptions<'a>) -> Self {
        Self {
            resolve,
            naming: BundleNaming::default(),
        }
    }

    /// Apply settings from a [`ProjectConfig`](crate::ProjectConfig).
    #[must_use]
    pub fn with_project_config(mut self, project: &crate::ProjectConfig) -> Self {
        self.naming = project.bundle.naming;
        self
    }

    /// Set the naming strategy.
    #[must_use]
    pub fn naming(mut self, naming: BundleNaming) -> Self {
        self.naming = naming;
        self
    }
}

/// What [`bundle`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BundleReport {
    /// New components merged into the document.
    pub components_added: usize,
    /// External references that reused an existing identical schema.
    pub components_reused: usize,
    /// `$ref` values rewritten (document and stored components).
    pub references_rewritten: usize,
    /// Distinct external documents fetched.
    pub documents_fetched: usize,
}

/// Inline all external references of `doc` into its components section.
///
/// # Errors
///
/// [`Error::Resolution`] naming the offending reference if any external
/// target cannot be fetched, parsed, or found; [`Error::Walk`] on
/// cancellation. The document may be partially mutated on error.
pub fn bundle(doc: &mut Value, options: &BundleOptions<'_>) -> Result<BundleReport> {
    let mut bundler = Bundler::new(options);
    bundler.preregister(doc);
    bundler.collect(doc)?;

    let mut report = BundleReport {
        components_reused: bundler.reused,
        documents_fetched: bundler.resolver.fetched(),
        ..BundleReport::default()
    };
    report.references_rewritten += bundler.rewrite_stored()?;
    report.references_rewritten += bundler.rewrite_document(doc)?;
    report.components_added = bundler.merge(doc);

    info!(
        target: "oaskit::bundle",
        added = report.components_added,
        reused = report.components_reused,
        rewritten = report.references_rewritten,
        fetched = report.documents_fetched,
        "bundled external references"
    );
    Ok(report)
}

/// A resolved external target waiting to be merged.
#[derive(Debug)]
struct Stored {
    value: Value,
    /// Document the value came from; base for its own references.
    document: String,
}

/// Engine-local naming state, created per [`bundle`] call.
#[derive(Debug, Default)]
struct ComponentStorage {
    /// Normalized absolute reference → assigned name, per kind.
    by_ref: IndexMap<ComponentKind, IndexMap<String, String>>,
    /// Newly stored components, per kind, in resolution order.
    components: IndexMap<ComponentKind, IndexMap<String, Stored>>,
    /// Every name in use per kind (pre-existing and new).
    taken: HashMap<ComponentKind, HashSet<String>>,
    /// Content hash per schema name (pre-existing and new).
    schema_hashes: HashMap<String, ContentHash>,
}

impl ComponentStorage {
    fn lookup(&self, kind: ComponentKind, absolute: &str) -> Option<&String> {
        self.by_ref.get(&kind)?.get(absolute)
    }

    fn is_taken(&self, kind: ComponentKind, name: &str) -> bool {
        self.taken.get(&kind).is_some_and(|names| names.contains(name))
    }

    fn claim(&mut self, kind: ComponentKind, name: &str) {
        self.taken.entry(kind).or_default().insert(name.to_string());
    }
}

enum Assigned {
    New(String),
    Reused(String),
}

struct Bundler<'a> {
    resolver: Resolver<'a>,
    root: String,
    naming: BundleNaming,
    cancel: Option<&'a CancelToken>,
    storage: ComponentStorage,
    reused: usize,
}

impl<'a> Bundler<'a> {
    fn new(options: &BundleOptions<'a>) -> Self {
        Self {
            resolver: Resolver::new(options.resolve),
            root: options.resolve.root_location(),
            naming: options.naming,
            cancel: options.resolve.cancel_token(),
            storage: ComponentStorage::default(),
            reused: 0,
        }
    }

    /// Reserve the document's own component names (and schema hashes).
    fn preregister(&mut self, doc: &Value) {
        for kind in ComponentKind::iter() {
            let Some(section) = crate::helpers::component_section(doc, kind) else {
                continue;
            };
            for (name, value) in section {
                let Some(name) = key_str(name) else {
                    continue;
                };
                if kind == ComponentKind::Schemas {
                    let own = kind.local_ref(&name);
                    let hash = fingerprint(value, &self.root, own.trim_start_matches('#'));
                    self.storage.schema_hashes.insert(name.to_string(), hash);
                }
                self.storage.claim(kind, &name);
            }
        }
    }

    /// Walk the document and register every external reference.
    fn collect(&mut self, doc: &mut Value) -> Result<()> {
        let refs = references(doc, NodeKind::Document, self.cancel)?;
        let root = self.root.clone();
        for (kind, reference) in refs {
            self.register(kind, &reference, &root)?;
        }
        Ok(())
    }

    /// Resolve, name, store, and crawl one reference found in `base`.
    fn register(&mut self, kind: ComponentKind, reference: &str, base: &str) -> Result<()> {
        let absolute = match resolve_against(reference, base) {
            Ok(absolute) => absolute,
            Err(e) => {
                debug!(
                    target: "oaskit::bundle",
                    reference,
                    error = %e,
                    "skipping malformed reference"
                );
                return Ok(());
            }
        };
        let (uri, _) = split_fragment(&absolute);
        if uri.is_empty() || uri == self.root {
            return Ok(());
        }
        if self.storage.lookup(kind, &absolute).is_some() {
            return Ok(());
        }

        let resolved = self
            .resolver
            .resolve(&absolute)
            .map_err(|source| Error::Resolution {
                reference: reference.to_string(),
                source,
            })?;

        let (_, own) = split_fragment(&absolute);
        let hash = (kind == ComponentKind::Schemas)
            .then(|| fingerprint(&resolved.value, &resolved.document, own.unwrap_or_default()));

        let name = match self.assign_name(kind, &absolute, hash.as_ref()) {
            Assigned::Reused(name) => {
                debug!(
                    target: "oaskit::bundle",
                    reference = %absolute,
                    %name,
                    "reusing identical component"
                );
                self.reused += 1;
                self.storage
                    .by_ref
                    .entry(kind)
                    .or_default()
                    .insert(absolute, name);
                return Ok(());
            }
            Assigned::New(name) => name,
        };

        debug!(target: "oaskit::bundle", reference = %absolute, %name, %kind, "storing component");
        self.storage.claim(kind, &name);
        if let Some(hash) = hash {
            self.storage.schema_hashes.insert(name.clone(), hash);
        }
        self.storage
            .by_ref
            .entry(kind)
            .or_default()
            .insert(absolute, name.clone());

        let mut crawl = resolved.value.clone();
        self.storage.components.entry(kind).or_default().insert(
            name,
            Stored {
                value: resolved.value,
                document: resolved.document.clone(),
            },
        );

        for (nested_kind, nested) in references(&mut crawl, kind.node_kind(), self.cancel)? {
            self.register(nested_kind, &nested, &resolved.document)?;
        }
        Ok(())
    }

    fn assign_name(
        &self,
        kind: ComponentKind,
        absolute: &str,
        hash: Option<&ContentHash>,
    ) -> Assigned {
        let simple = Reference::parse(absolute)
            .ok()
            .and_then(|r| r.simple_name())
            .map_or_else(|| "Component".to_string(), |n| component_name(&n));

        if let Some(assigned) = self.try_name(kind, &simple, hash) {
            return assigned;
        }

        let base = match self.naming {
            BundleNaming::Counter => simple,
            BundleNaming::FilePath => {
                let candidate = self.file_path_name(absolute, &simple);
                if let Some(assigned) = self.try_name(kind, &candidate, hash) {
                    return assigned;
                }
                candidate
            }
        };

        let mut reused = None;
        let name = counter_name(&base, |candidate| {
            match self.try_name(kind, candidate, hash) {
                Some(Assigned::New(_)) => true,
                Some(Assigned::Reused(name)) => {
                    reused = Some(name);
                    true
                }
                None => false,
            }
        });
        reused.map_or(Assigned::New(name), Assigned::Reused)
    }

    /// `New` if `candidate` is free, `Reused` if it holds an identical schema.
    fn try_name(
        &self,
        kind: ComponentKind,
        candidate: &str,
        hash: Option<&ContentHash>,
    ) -> Option<Assigned> {
        if !self.storage.is_taken(kind, candidate) {
            return Some(Assigned::New(candidate.to_string()));
        }
        let existing = self.storage.schema_hashes.get(candidate)?;
        (hash == Some(existing)).then(|| Assigned::Reused(candidate.to_string()))
    }

    /// `schemas/pet.yaml#/Pet` → `schemas_pet_Pet`.
    fn file_path_name(&self, absolute: &str, simple: &str) -> String {
        let (uri, fragment) = split_fragment(absolute);
        let path = flatten_path(&path_from_root(&self.root, uri), "_");
        let path = match path.rsplit_once('.') {
            Some((stem, ext)) if !ext.contains('_') => stem.to_string(),
            _ => path,
        };
        let name = if fragment.is_some_and(|f| !f.is_empty()) {
            format!("{path}_{simple}")
        } else {
            path
        };
        component_name(&name)
    }

    /// Point references inside stored components at their local names.
    fn rewrite_stored(&mut self) -> Result<usize> {
        let root = self.root.as_str();
        let ComponentStorage {
            by_ref, components, ..
        } = &mut self.storage;
        let options = walk_options(self.cancel);
        let mut rewritten = 0;

        for (kind, section) in components.iter_mut() {
            for stored in section.values_mut() {
                let document = stored.document.as_str();
                walk::<Error, _>(&mut stored.value, kind.node_kind(), &options, |visit| {
                    let (Some(reference), Some(target)) =
                        (visit.reference(), visit.kind().component_kind())
                    else {
                        return Ok(Flow::Continue);
                    };
                    let local = local_target(by_ref, root, target, reference, document, false);
                    if let Some(local) = local {
                        visit.set_reference(local);
                        rewritten += 1;
                    }
                    Ok(Flow::Continue)
                })?;
            }
        }
        Ok(rewritten)
    }

    /// Point the document's own external references at their local names.
    ///
    /// A reference into the root whose fragment does not exist there is
    /// matched by fragment against the stored references instead.
    fn rewrite_document(&self, doc: &mut Value) -> Result<usize> {
        let dangling: HashSet<String> = references(doc, NodeKind::Document, self.cancel)?
            .into_iter()
            .map(|(_, reference)| reference)
            .filter(|reference| self.is_dangling(doc, reference))
            .collect();

        let options = walk_options(self.cancel);
        let mut rewritten = 0;
        walk::<Error, _>(doc, NodeKind::Document, &options, |visit| {
            let (Some(reference), Some(target)) =
                (visit.reference(), visit.kind().component_kind())
            else {
                return Ok(Flow::Continue);
            };
            let local = local_target(
                &self.storage.by_ref,
                &self.root,
                target,
                reference,
                &self.root,
                dangling.contains(reference),
            );
            if let Some(local) = local {
                visit.set_reference(local);
                rewritten += 1;
            }
            Ok(Flow::Continue)
        })?;
        Ok(rewritten)
    }

    /// Whether `reference` points into the root at a location it lacks.
    fn is_dangling(&self, doc: &Value, reference: &str) -> bool {
        let Ok(absolute) = resolve_against(reference, &self.root) else {
            return false;
        };
        match split_fragment(&absolute) {
            (uri, Some(fragment)) if uri == self.root => {
                Location::from_fragment(fragment).get(doc).is_none()
            }
            _ => false,
        }
    }

    /// Move stored components into the document.
    fn merge(&mut self, doc: &mut Value) -> usize {
        std::mem::take(&mut self.storage.components)
            .into_iter()
            .map(|(kind, section)| {
                insert_components(
                    doc,
                    kind,
                    section.into_iter().map(|(name, stored)| (name, stored.value)),
                )
            })
            .sum()
    }
}

/// Every `$ref` reachable through the typed walk, with the kind it stands for.
fn references(
    value: &mut Value,
    root_kind: NodeKind,
    cancel: Option<&CancelToken>,
) -> Result<Vec<(ComponentKind, String)>> {
    let mut refs = Vec::new();
    walk::<Error, _>(value, root_kind, &walk_options(cancel), |visit| {
        if let (Some(reference), Some(kind)) = (visit.reference(), visit.kind().component_kind()) {
            refs.push((kind, reference.to_string()));
        }
        Ok(Flow::Continue)
    })?;
    Ok(refs)
}

/// Local replacement for `reference` found in the document at `base`.
///
/// `None` when the reference should stay as written (already local,
/// unresolvable, or unknown). A `dangling_root` reference points into the
/// root at a missing location and is looked up by fragment alone.
fn local_target(
    by_ref: &IndexMap<ComponentKind, IndexMap<String, String>>,
    root: &str,
    kind: ComponentKind,
    reference: &str,
    base: &str,
    dangling_root: bool,
) -> Option<String> {
    let absolute = resolve_against(reference, base).ok()?;
    let (uri, fragment) = split_fragment(&absolute);
    if uri.is_empty() {
        return None;
    }

    let local = if uri == root && !dangling_root {
        with_fragment("", Some(fragment.unwrap_or_default()))
    } else if let Some(name) = by_ref.get(&kind).and_then(|refs| refs.get(&absolute)) {
        kind.local_ref(name)
    } else {
        kind.local_ref(suffix_match(by_ref.get(&kind)?, fragment?)?)
    };
    (local != reference).then_some(local)
}

/// Find a stored reference whose text ends with `#{fragment}`.
///
/// Only consulted when the exact normalized reference is unknown. If two
/// external documents define the same fragment, the first one stored wins,
/// which may not be the document the reference actually came from.
fn suffix_match<'m>(refs: &'m IndexMap<String, String>, fragment: &str) -> Option<&'m String> {
    let suffix = format!("#{fragment}");
    let mut matches = refs.iter().filter(|(r, _)| r.ends_with(&suffix));
    let (first_ref, name) = matches.next()?;
    if let Some((other, _)) = matches.next() {
        debug!(
            target: "oaskit::bundle",
            fragment,
            chosen = %first_ref,
            other = %other,
            "ambiguous fragment match"
        );
    }
    Some(name)
}

/// Content hash with every `$ref` expressed in root coordinates, so equal
/// text that points at different files never collides.
///
/// References back into the hashed value itself (found at `own` in
/// `document`) keep only their path below it, so identical recursive schemas
/// from different files hash equal.
fn fingerprint(value: &Value, document: &str, own: &str) -> ContentHash {
    let mut normalized = value.clone();
    for_each_ref_mut(&mut normalized, &mut |reference| {
        let Ok(absolute) = resolve_against(reference, document) else {
            return false;
        };
        let (uri, fragment) = split_fragment(&absolute);
        let fragment = fragment.unwrap_or_default();
        let key = match fragment.strip_prefix(own) {
            Some(rest) if uri == document && (rest.is_empty() || rest.starts_with('/')) => {
                format!("#{rest}")
            }
            _ => absolute.clone(),
        };
        if key == *reference {
            return false;
        }
        *reference = key;
        true
    });
    ContentHash::of(&normalized)
}
