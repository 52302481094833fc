//! Sanitize: strip `x-*` extensions and fields OpenAPI does not define, then
//! Clean.
//!
//! Extension filtering uses shell-style globs (`*`, `?`, `[...]`). An
//! extension is removed when it matches a `remove` pattern (or `remove` is
//! empty) and matches no `keep` pattern. Bad or unused patterns are reported
//! as warnings, never as errors.

use oaskit_core::walk::{reference_of, walk, Flow, NodeKind};
use oaskit_core::{CancelToken, Location};
use regex::Regex;
use serde::Deserialize;
use serde_yaml_ng::Value;
use tracing::{debug, info};

use crate::clean::{clean_with, CleanReport};
use crate::error::{Error, Result};
use crate::helpers::walk_options;

/// Which `x-*` extensions survive [`sanitize`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExtensionFilter {
    /// Globs of extensions that are always kept.
    pub keep: Vec<String>,
    /// Globs of extensions to remove; empty means every extension not kept.
    pub remove: Vec<String>,
}

/// Sanitize settings.
///
/// Uses a builder pattern:
///
/// ```ignore
/// let options = SanitizeOptions::new()
///     .keep_extensions(["x-speakeasy-*"])
///     .keep_unused_components(true);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SanitizeOptions<'a> {
    extensions: ExtensionFilter,
    keep_unused_components: bool,
    keep_unknown_properties: bool,
    cancel: Option<&'a CancelToken>,
}

impl<'a> SanitizeOptions<'a> {
    /// Remove every extension and unknown field, then Clean.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply settings from a [`ProjectConfig`](crate::ProjectConfig).
    #[must_use]
    pub fn with_project_config(mut self, project: &crate::ProjectConfig) -> Self {
        self.extensions = project.sanitize.extensions.clone();
        self.keep_unused_components = project.sanitize.keep_unused_components;
        self.keep_unknown_properties = project.sanitize.keep_unknown_properties;
        self
    }

    /// Replace the extension filter.
    #[must_use]
    pub fn extensions(mut self, filter: ExtensionFilter) -> Self {
        self.extensions = filter;
        self
    }

    /// Add globs of extensions to keep.
    #[must_use]
    pub fn keep_extensions<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions.keep.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Add globs of extensions to remove.
    #[must_use]
    pub fn remove_extensions<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions.remove.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Skip the Clean pass.
    #[must_use]
    pub fn keep_unused_components(mut self, keep: bool) -> Self {
        self.keep_unused_components = keep;
        self
    }

    /// Leave fields the object model does not define.
    #[must_use]
    pub fn keep_unknown_properties(mut self, keep: bool) -> Self {
        self.keep_unknown_properties = keep;
        self
    }

    /// Abort the walks once `token` fires.
    #[must_use]
    pub fn cancel(mut self, token: &'a CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// What [`sanitize`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SanitizeReport {
    /// Non-fatal problems with the extension patterns.
    pub warnings: Vec<String>,
    /// Extensions removed.
    pub extensions_removed: usize,
    /// Unknown fields removed.
    pub properties_removed: usize,
    /// Clean's report, unless it was skipped.
    pub clean: Option<CleanReport>,
}

/// Strip extensions and unknown fields from `doc`, then remove unused
/// components.
///
/// # Errors
///
/// Only [`Error::Walk`] on cancellation. Pattern problems end up in
/// [`SanitizeReport::warnings`].
pub fn sanitize(doc: &mut Value, options: &SanitizeOptions<'_>) -> Result<SanitizeReport> {
    let mut report = SanitizeReport::default();

    let mut keep = compile_all(&options.extensions.keep, &mut report.warnings);
    let mut remove = compile_all(&options.extensions.remove, &mut report.warnings);
    let remove_all = options.extensions.remove.is_empty();

    if !options.keep_unknown_properties {
        report.properties_removed = remove_unknown(doc, options.cancel)?;
    }

    // Extensions
    let mut doomed: Vec<Location> = Vec::new();
    walk::<Error, _>(doc, NodeKind::Document, &walk_options(options.cancel), |visit| {
        if visit.kind() != NodeKind::Extension {
            return Ok(Flow::Continue);
        }
        let Some(name) = visit.location().last() else {
            return Ok(Flow::SkipChildren);
        };
        let kept = matches_any(&mut keep, name);
        let removed = remove_all || matches_any(&mut remove, name);
        if removed && !kept {
            doomed.push(visit.location().clone());
        }
        Ok(Flow::SkipChildren)
    })?;

    // Keys never shift positional tokens, but parents must outlive children.
    doomed.sort_by(|a, b| b.depth().cmp(&a.depth()));
    for location in &doomed {
        if location.remove(doc).is_some() {
            debug!(target: "oaskit::sanitize", %location, "removed extension");
            report.extensions_removed += 1;
        }
    }

    for glob in keep.iter().chain(&remove).filter(|g| !g.matched) {
        report
            .warnings
            .push(format!("pattern `{}` matched no extension", glob.pattern));
    }

    if !options.keep_unused_components {
        report.clean = Some(clean_with(doc, options.cancel)?);
    }

    info!(
        target: "oaskit::sanitize",
        extensions = report.extensions_removed,
        properties = report.properties_removed,
        warnings = report.warnings.len(),
        "sanitized document"
    );
    Ok(report)
}

/// Drop fields that are neither defined for the node's kind nor extensions.
fn remove_unknown(doc: &mut Value, cancel: Option<&CancelToken>) -> Result<usize> {
    let mut removed = 0;
    walk::<Error, _>(doc, NodeKind::Document, &walk_options(cancel), |visit| {
        let known = visit.kind().known_fields();
        if known.is_empty() {
            return Ok(Flow::Continue);
        }
        let is_reference = reference_of(visit.node()).is_some();
        let Some(map) = visit.node_mut().as_mapping_mut() else {
            return Ok(Flow::Continue);
        };

        let unknown: Vec<Value> = map
            .keys()
            .filter(|key| {
                let Some(key) = key.as_str() else {
                    return true;
                };
                !(key.starts_with("x-")
                    || known.contains(&key)
                    || (is_reference && matches!(key, "summary" | "description")))
            })
            .cloned()
            .collect();
        for key in &unknown {
            map.shift_remove(key);
        }
        if !unknown.is_empty() {
            debug!(
                target: "oaskit::sanitize",
                location = %visit.location(),
                count = unknown.len(),
                "removed unknown fields"
            );
        }
        removed += unknown.len();
        Ok(Flow::Continue)
    })?;
    Ok(removed)
}

/// A compiled glob and whether it has matched anything yet.
#[derive(Debug)]
struct Glob {
    pattern: String,
    regex: Regex,
    matched: bool,
}

fn compile_all(patterns: &[String], warnings: &mut Vec<String>) -> Vec<Glob> {
    patterns
        .iter()
        .filter_map(|pattern| match glob_regex(pattern) {
            Ok(regex) => Some(Glob {
                pattern: pattern.clone(),
                regex,
                matched: false,
            }),
            Err(reason) => {
                warnings.push(format!("invalid pattern `{pattern}`: {reason}"));
                None
            }
        })
        .collect()
}

/// Whether any glob matches `name`; marks every glob that does.
fn matches_any(globs: &mut [Glob], name: &str) -> bool {
    let mut any = false;
    for glob in globs.iter_mut() {
        if glob.regex.is_match(name) {
            glob.matched = true;
            any = true;
        }
    }
    any
}

/// Translate a shell glob into an anchored regex.
fn glob_regex(pattern: &str) -> std::result::Result<Regex, String> {
    let mut out = String::from("^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                let mut class = String::new();
                let mut closed = false;
                for (i, c) in chars.by_ref().enumerate() {
                    match c {
                        ']' if i > 0 || !class.is_empty() => {
                            closed = true;
                            break;
                        }
                        '!' | '^' if i == 0 => class.push('^'),
                        '\\' | '[' => {
                            class.push('\\');
                            class.push(c);
                        }
                        _ => class.push(c),
                    }
                }
                if !closed || class.is_empty() || class == "^" {
                    return Err("unterminated character class".to_string());
                }
                out.push('[');
                out.push_str(&class);
                out.push(']');
            }
            _ => out.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    out.push('$');
    Regex::new(&out).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    const DOC: &str = indoc! {r"
        openapi: 3.1.0
        info:
          title: Pets
          version: '1'
          x-logo: logo.png
          x-internal-owner: team-a
        paths:
          x-speakeasy-retries: 3
          /pets:
            get:
              x-internal-id: 7
              x-speakeasy-name: listPets
              bogus: true
              responses:
                '200':
                  description: OK
                  content:
                    application/json:
                      schema:
                        $ref: '#/components/schemas/Pet'
        components:
          schemas:
            Pet:
              type: object
              nonsense: 1
              properties:
                x-tag:
                  type: string
                  x-go-type: string
            Unused:
              type: string
    "};

    fn parse(yaml: &str) -> Value {
        serde_yaml_ng::from_str(yaml).unwrap()
    }

    #[test]
    fn default_strips_everything_and_cleans() {
        let mut doc = parse(DOC);
        let report = sanitize(&mut doc, &SanitizeOptions::new()).unwrap();

        assert_eq!(report.extensions_removed, 6);
        assert_eq!(report.properties_removed, 2);
        assert!(report.warnings.is_empty());
        assert!(doc["info"].get("x-logo").is_none());
        assert!(doc["paths"].get("x-speakeasy-retries").is_none());
        assert!(doc["paths"]["/pets"]["get"].get("bogus").is_none());
        assert!(doc["components"]["schemas"]["Pet"].get("nonsense").is_none());
        // A property named like an extension is a schema, not an extension
        assert_eq!(
            doc["components"]["schemas"]["Pet"]["properties"]["x-tag"]["type"].as_str(),
            Some("string")
        );
        assert!(doc["components"]["schemas"]["Pet"]["properties"]["x-tag"]
            .get("x-go-type")
            .is_none());

        let clean = report.clean.unwrap();
        assert_eq!(
            clean.removed_components,
            vec![(oaskit_core::ComponentKind::Schemas, "Unused".to_string())]
        );
    }

    #[test]
    fn keep_wins_over_remove() {
        let mut doc = parse(DOC);
        let options = SanitizeOptions::new()
            .keep_extensions(["x-speakeasy-*"])
            .remove_extensions(["x-internal-*", "x-speakeasy-name"])
            .keep_unused_components(true)
            .keep_unknown_properties(true);
        let report = sanitize(&mut doc, &options).unwrap();

        assert_eq!(report.extensions_removed, 2);
        assert_eq!(report.properties_removed, 0);
        assert!(report.clean.is_none());
        assert_eq!(doc["info"]["x-logo"].as_str(), Some("logo.png"));
        assert!(doc["info"].get("x-internal-owner").is_none());
        let op = &doc["paths"]["/pets"]["get"];
        assert!(op.get("x-internal-id").is_none());
        assert_eq!(op["x-speakeasy-name"].as_str(), Some("listPets"));
        assert_eq!(op["bogus"].as_bool(), Some(true));
        assert!(doc["components"]["schemas"].get("Unused").is_some());
    }

    #[test]
    fn bad_and_unused_patterns_are_warnings() {
        let mut doc = parse(DOC);
        let options = SanitizeOptions::new()
            .keep_extensions(["x-[abc", "x-nothing-*"])
            .keep_unused_components(true);
        let report = sanitize(&mut doc, &options).unwrap();

        assert_eq!(
            report.warnings,
            vec![
                "invalid pattern `x-[abc`: unterminated character class".to_string(),
                "pattern `x-nothing-*` matched no extension".to_string(),
            ]
        );
        assert_eq!(report.extensions_removed, 6);
    }

    #[test]
    fn invalid_remove_patterns_remove_nothing() {
        let mut doc = parse(DOC);
        let options = SanitizeOptions::new()
            .remove_extensions(["x-[oops"])
            .keep_unused_components(true);
        let report = sanitize(&mut doc, &options).unwrap();
        assert_eq!(report.extensions_removed, 0);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn reference_siblings_survive() {
        let mut doc = parse(indoc! {r"
            openapi: 3.1.0
            paths:
              /a:
                get:
                  parameters:
                    - $ref: '#/components/parameters/P'
                      description: overridden
                      color: red
                  responses: {}
            components:
              parameters:
                P: {name: p, in: query}
        "});
        let report = sanitize(&mut doc, &SanitizeOptions::new()).unwrap();
        assert_eq!(report.properties_removed, 1);
        let param = &doc["paths"]["/a"]["get"]["parameters"][0];
        assert_eq!(param["description"].as_str(), Some("overridden"));
        assert!(param.get("color").is_none());
    }

    #[test]
    fn project_config_is_applied() {
        let project: crate::ProjectConfig = serde_yaml_ng::from_str(indoc! {r#"
            sanitize:
              extensions:
                keep: ["x-logo"]
              keep_unused_components: true
        "#})
        .unwrap();
        let mut doc = parse(DOC);
        let report =
            sanitize(&mut doc, &SanitizeOptions::new().with_project_config(&project)).unwrap();
        assert_eq!(report.extensions_removed, 5);
        assert!(report.clean.is_none());
        assert_eq!(doc["info"]["x-logo"].as_str(), Some("logo.png"));
    }

    #[test]
    fn globs() {
        let re = glob_regex("x-go-*").unwrap();
        assert!(re.is_match("x-go-type"));
        assert!(!re.is_match("x-gopher"));
        assert!(glob_regex("x-?d").unwrap().is_match("x-id"));
        assert!(glob_regex("x-[ab]").unwrap().is_match("x-b"));
        assert!(!glob_regex("x-[!ab]").unwrap().is_match("x-a"));
        assert!(glob_regex("x.y").unwrap().is_match("x.y"));
        assert!(!glob_regex("x.y").unwrap().is_match("xzy"));
        assert!(glob_regex("x-[").is_err());
    }

    #[test]
    fn cancelled() {
        let token = CancelToken::new();
        token.cancel();
        let mut doc = parse(DOC);
        let result = sanitize(&mut doc, &SanitizeOptions::new().cancel(&token));
        assert!(matches!(result, Err(Error::Walk(_))));
    }
}
