//! Localize: copy external reference targets next to each other.
//!
//! Unlike [`bundle`](crate::bundle()), the unit of work is the whole file: every
//! distinct external document reachable from the root (transitively) is
//! copied into one target directory under a conflict-free file name, its
//! `$ref`s are rewritten to point at the sibling copies, and the root's
//! references are rewritten to point at the copies with their fragments kept.

use indexmap::IndexMap;
use oaskit_core::reference::{
    file_name, file_stem, flatten_path, join_path, landing_directory, parent_dir, path_from_root,
    relative_path, split_fragment, with_fragment,
};
use oaskit_core::walk::{collect_refs, for_each_ref_mut, walk, Flow};
use oaskit_core::{resolve_against, NodeKind};
use serde::Deserialize;
use serde_yaml_ng::Value;
use tracing::{debug, info};

use crate::error::{Error, ResolveError, Result};
use crate::helpers::{counter_name, walk_options};
use crate::resolve::{ResolveOptions, Resolver};

/// How to name copied files whose base names collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalizeNaming {
    /// First file keeps `pet.yaml`; later ones become `schemas-pet.yaml`,
    /// then the full flattened path, then a counter.
    #[default]
    PathBased,
    /// `pet.yaml`, `pet_1.yaml`, `pet_2.yaml`, ...
    Counter,
}

/// Configuration for [`localize`].
#[derive(Debug, Clone, Default)]
pub struct LocalizeOptions<'a> {
    resolve: ResolveOptions<'a>,
    target_directory: String,
    naming: LocalizeNaming,
}

impl<'a> LocalizeOptions<'a> {
    /// Localize into `target_directory` using path-based naming.
    #[must_use]
    pub fn new(resolve: ResolveOptions<'a>, target_directory: impl Into<String>) -> Self {
        Self {
            resolve,
            target_directory: target_directory.into(),
            naming: LocalizeNaming::default(),
        }
    }

    /// Apply settings from a [`ProjectConfig`](crate::ProjectConfig).
    ///
    /// The target directory is only taken from the config when it is set.
    #[must_use]
    pub fn with_project_config(mut self, project: &crate::ProjectConfig) -> Self {
        if let Some(dir) = &project.localize.target_directory {
            self.target_directory.clone_from(dir);
        }
        self.naming = project.localize.naming;
        self
    }

    /// Set the target directory.
    #[must_use]
    pub fn target_directory(mut self, dir: impl Into<String>) -> Self {
        self.target_directory = dir.into();
        self
    }

    /// Set the naming strategy.
    #[must_use]
    pub fn naming(mut self, naming: LocalizeNaming) -> Self {
        self.naming = naming;
        self
    }
}

/// What [`localize`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalizeReport {
    /// Written files, as `(original location, written path)`, in discovery order.
    pub files: Vec<(String, String)>,
    /// `$ref` values rewritten in the root document.
    pub references_rewritten: usize,
}

/// One discovered external file.
#[derive(Debug)]
struct LocalFile {
    bytes: Vec<u8>,
    /// Reference text that first led here, for error messages.
    reference: String,
    name: String,
}

/// Copy every external file `doc` references into the target directory and
/// point the references at the copies.
///
/// # Errors
///
/// - [`Error::Config`] when the target directory is empty (before any I/O)
/// - [`Error::Resolution`] when a referenced file cannot be fetched or parsed
/// - [`Error::Write`] when a copy cannot be written
pub fn localize(doc: &mut Value, options: &LocalizeOptions<'_>) -> Result<LocalizeReport> {
    let target = options.target_directory.trim();
    if target.is_empty() {
        return Err(Error::Config(
            "localize requires a target directory".to_string(),
        ));
    }

    let root = options.resolve.root_location();
    let cancel = options.resolve.cancel_token();
    let mut resolver = Resolver::new(options.resolve);

    // Discovery
    let mut files: IndexMap<String, LocalFile> = IndexMap::new();
    let mut pending: Vec<(String, String)> = Vec::new();
    walk::<Error, _>(doc, NodeKind::Document, &walk_options(cancel), |visit| {
        if let Some(reference) = visit.reference() {
            pending.push((reference.to_string(), root.clone()));
        }
        Ok(Flow::Continue)
    })?;
    pending.reverse();

    while let Some((reference, base)) = pending.pop() {
        let Some(uri) = external_document(&reference, &base, &root) else {
            continue;
        };
        if files.contains_key(&uri) {
            continue;
        }

        let bytes = resolver
            .raw(&uri)
            .map_err(|source| Error::Resolution {
                reference: reference.clone(),
                source,
            })?
            .to_vec();
        let parsed: Value = serde_yaml_ng::from_slice(&bytes).map_err(|source| {
            Error::Resolution {
                reference: reference.clone(),
                source: ResolveError::Parse {
                    location: uri.clone(),
                    source,
                },
            }
        })?;

        // Depth-first in reference order: push nested refs in reverse.
        let nested: Vec<_> = collect_refs(&parsed)
            .into_iter()
            .map(|r| (r, uri.clone()))
            .collect();
        pending.extend(nested.into_iter().rev());

        debug!(target: "oaskit::localize", location = %uri, "discovered");
        files.insert(
            uri,
            LocalFile {
                bytes,
                reference,
                name: String::new(),
            },
        );
    }

    // Naming
    assign_names(&mut files, &root, options.naming);

    // Copy + rewrite
    let fs = options.resolve.filesystem();
    fs.create_dir_all(target).map_err(|source| Error::Write {
        path: target.to_string(),
        source,
    })?;

    let mut written = Vec::with_capacity(files.len());
    for (uri, file) in &files {
        let contents = rewrite_file(uri, file, &files, &root, target)?;
        let path = join_path(target, &file.name);
        fs.write(&path, &contents).map_err(|source| Error::Write {
            path: path.clone(),
            source,
        })?;
        debug!(target: "oaskit::localize", from = %uri, to = %path, "wrote");
        written.push((uri.clone(), path));
    }

    // Root rewrite
    let root_dir = parent_dir(&root);
    let mut rewritten = 0;
    walk::<Error, _>(doc, NodeKind::Document, &walk_options(cancel), |visit| {
        let Some(reference) = visit.reference() else {
            return Ok(Flow::Continue);
        };
        let Some(uri) = external_document(reference, &root, &root) else {
            return Ok(Flow::Continue);
        };
        let Some(file) = files.get(&uri) else {
            return Ok(Flow::Continue);
        };
        let (_, fragment) = split_fragment(reference);
        let local = relative_path(root_dir, &join_path(target, &file.name));
        visit.set_reference(with_fragment(&local, fragment));
        rewritten += 1;
        Ok(Flow::Continue)
    })?;

    info!(
        target: "oaskit::localize",
        files = written.len(),
        rewritten,
        target_directory = target,
        "localized external references"
    );
    Ok(LocalizeReport {
        files: written,
        references_rewritten: rewritten,
    })
}

/// Normalized location of the document `reference` (found in `base`) points
/// at, or `None` for references into the root document or malformed ones.
fn external_document(reference: &str, base: &str, root: &str) -> Option<String> {
    let absolute = resolve_against(reference, base).ok()?;
    let (uri, _) = split_fragment(&absolute);
    (!uri.is_empty() && uri != root).then(|| uri.to_string())
}

fn assign_names(files: &mut IndexMap<String, LocalFile>, root: &str, naming: LocalizeNaming) {
    let mut taken: Vec<String> = Vec::with_capacity(files.len());
    for (uri, file) in files.iter_mut() {
        let is_free = |candidate: &str| !taken.iter().any(|t| t == candidate);
        let simple = file_name(uri).to_string();

        let name = if is_free(&simple) {
            simple
        } else {
            match naming {
                LocalizeNaming::PathBased => {
                    let from_root = path_from_root(root, uri);
                    let prefixed = format!("{}-{simple}", landing_directory(&from_root));
                    let flattened = flatten_path(&from_root, "-");
                    if is_free(&prefixed) {
                        prefixed
                    } else if is_free(&flattened) {
                        flattened
                    } else {
                        numbered(&simple, is_free)
                    }
                }
                LocalizeNaming::Counter => numbered(&simple, is_free),
            }
        };

        debug!(target: "oaskit::localize", location = %uri, %name, "named");
        taken.push(name.clone());
        file.name = name;
    }
}

/// `pet.yaml` → first free of `pet_1.yaml`, `pet_2.yaml`, ...
fn numbered(simple: &str, is_free: impl Fn(&str) -> bool) -> String {
    let stem = file_stem(simple);
    let ext = &simple[stem.len()..];
    let base = counter_name(stem, |candidate| is_free(&format!("{candidate}{ext}")));
    format!("{base}{ext}")
}

/// Rewrite the `$ref`s of one file for its new home in `target`.
///
/// References to other files (or the file itself) follow the copies' names.
/// References back into the root are re-pointed from `target`. Files with
/// nothing to rewrite are copied byte for byte.
fn rewrite_file(
    uri: &str,
    file: &LocalFile,
    files: &IndexMap<String, LocalFile>,
    root: &str,
    target: &str,
) -> Result<Vec<u8>> {
    let mut value: Value = serde_yaml_ng::from_slice(&file.bytes).map_err(|source| {
        Error::Resolution {
            reference: file.reference.clone(),
            source: ResolveError::Parse {
                location: uri.to_string(),
                source,
            },
        }
    })?;

    let changed = for_each_ref_mut(&mut value, &mut |reference| {
        let (document, fragment) = split_fragment(reference);
        if document.is_empty() {
            return false;
        }
        let Ok(absolute) = resolve_against(reference, uri) else {
            return false;
        };
        let (absolute_uri, _) = split_fragment(&absolute);
        let destination = if !root.is_empty() && absolute_uri == root {
            relative_path(target, root)
        } else if let Some(sibling) = files.get(absolute_uri) {
            sibling.name.clone()
        } else {
            return false;
        };
        let local = with_fragment(&destination, fragment);
        if local == *reference {
            return false;
        }
        *reference = local;
        true
    });

    if changed == 0 {
        return Ok(file.bytes.clone());
    }

    let is_json = file.name.to_ascii_lowercase().ends_with(".json");
    if is_json {
        if let Ok(json) = serde_json::to_string_pretty(&value) {
            return Ok(json.into_bytes());
        }
    }
    Ok(serde_yaml_ng::to_string(&value)?.into_bytes())
}
