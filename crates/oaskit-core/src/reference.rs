//! Reference classification and path algebra.
//!
//! Every engine expresses references in one coordinate system: relative to
//! the root document's location. A reference found inside an external file is
//! first resolved against that file's own location with [`resolve_against`],
//! so two spellings of the same target (reached through different chains of
//! files) normalize to the same key.
//!
//! Paths are handled as text rather than through [`std::path`], because the
//! separator style of the *reference* decides the output style regardless of
//! the host platform:
//!
//! - `..\shared\pet.yaml` against `C:\api\root.yaml` → `C:\shared\pet.yaml`
//! - `../shared/pet.yaml` against `api/root.yaml` → `shared/pet.yaml`
//! - URLs are joined with RFC 3986 rules, never path-joined.

use url::Url;

use crate::error::ReferenceError;
use crate::pointer::decode_fragment_token;

/// Literal that replaces `..` segments in generated names.
pub const PARENT_MARKER: &str = "parent";

/// Directory name reported for files with no directory component.
const ROOT_MARKER: &str = "root";

/// Coarse classification of a `$ref` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    /// `#/components/schemas/Pet`: points into the referencing document.
    Fragment,
    /// `./schemas/pet.yaml#/Pet` or `pet.yaml`.
    RelativePath,
    /// `/specs/pet.yaml` or `C:\specs\pet.yaml`.
    AbsolutePath,
    /// `https://example.com/pet.yaml#/Pet`.
    Url,
}

/// Separator convention of a filesystem path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PathStyle {
    /// `/`-separated.
    #[default]
    Posix,
    /// `\`-separated.
    Windows,
}

impl PathStyle {
    /// Detect the style of a path from its separators, if it has any.
    #[must_use]
    pub fn detect(text: &str) -> Option<Self> {
        if text.contains('\\') {
            Some(Self::Windows)
        } else if text.contains('/') {
            Some(Self::Posix)
        } else {
            None
        }
    }

    /// Style of the reference text wins; the base location breaks ties.
    fn for_pair(reference: &str, base: &str) -> Self {
        Self::detect(reference)
            .or_else(|| Self::detect(base))
            .unwrap_or_default()
    }

    /// The separator character for this style.
    #[must_use]
    pub const fn separator(self) -> char {
        match self {
            Self::Posix => '/',
            Self::Windows => '\\',
        }
    }

    const fn separator_str(self) -> &'static str {
        match self {
            Self::Posix => "/",
            Self::Windows => "\\",
        }
    }
}

/// A parsed `$ref` string, borrowing from the original text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference<'a> {
    raw: &'a str,
    uri: &'a str,
    fragment: Option<&'a str>,
    kind: ReferenceKind,
}

impl<'a> Reference<'a> {
    /// Classify a reference string.
    ///
    /// # Errors
    ///
    /// Returns [`ReferenceError`] for empty input, more than one `#`, or a
    /// URL-shaped reference that does not parse.
    pub fn parse(raw: &'a str) -> Result<Self, ReferenceError> {
        if raw.trim().is_empty() {
            return Err(ReferenceError::Empty);
        }

        let (uri, fragment) = split_fragment(raw);
        if fragment.is_some_and(|f| f.contains('#')) {
            return Err(ReferenceError::Malformed {
                reference: raw.to_string(),
                reason: "more than one '#'",
            });
        }

        let kind = if uri.is_empty() {
            ReferenceKind::Fragment
        } else if looks_like_url(uri) {
            Url::parse(uri).map_err(|source| ReferenceError::Url {
                reference: raw.to_string(),
                source,
            })?;
            ReferenceKind::Url
        } else if is_absolute_path(uri) {
            ReferenceKind::AbsolutePath
        } else {
            ReferenceKind::RelativePath
        };

        Ok(Self {
            raw,
            uri,
            fragment,
            kind,
        })
    }

    /// The reference exactly as written.
    #[must_use]
    pub const fn raw(&self) -> &'a str {
        self.raw
    }

    /// Document part (everything before `#`); empty for fragment-only refs.
    #[must_use]
    pub const fn uri(&self) -> &'a str {
        self.uri
    }

    /// Fragment without the leading `#`, if present.
    #[must_use]
    pub const fn fragment(&self) -> Option<&'a str> {
        self.fragment
    }

    /// Classification of the document part.
    #[must_use]
    pub const fn kind(&self) -> ReferenceKind {
        self.kind
    }

    /// Whether the document part is a URL.
    #[must_use]
    pub fn is_url(&self) -> bool {
        self.kind == ReferenceKind::Url
    }

    /// Whether this is a bare `#...` reference.
    #[must_use]
    pub fn is_fragment(&self) -> bool {
        self.kind == ReferenceKind::Fragment
    }

    /// Decoded JSON-pointer tokens of the fragment (empty for whole-document refs).
    #[must_use]
    pub fn pointer_tokens(&self) -> Vec<String> {
        let Some(fragment) = self.fragment else {
            return Vec::new();
        };
        fragment.split('/').skip(1).map(decode_fragment_token).collect()
    }

    /// Human-readable name of the target.
    ///
    /// The last pointer token (`#/components/schemas/Pet` → `Pet`), or the
    /// file stem for whole-document references (`./pet.yaml` → `pet`).
    #[must_use]
    pub fn simple_name(&self) -> Option<String> {
        if let Some(last) = self.pointer_tokens().pop().filter(|t| !t.is_empty()) {
            return Some(last);
        }
        let stem = file_stem(self.uri);
        (!stem.is_empty()).then(|| stem.to_string())
    }
}

/// Resolve `reference`, found in the document at `base`, into root coordinates.
///
/// `base` must itself already be expressed in root coordinates (the root
/// document's own location for references found in the root). The result is
/// the normalized document location plus the original fragment, so it can be
/// used directly as a deduplication key.
///
/// # Errors
///
/// Returns [`ReferenceError`] when `reference` is malformed or URL joining fails.
pub fn resolve_against(reference: &str, base: &str) -> Result<String, ReferenceError> {
    let parsed = Reference::parse(reference)?;
    let (base_uri, _) = split_fragment(base);

    let uri = match parsed.kind {
        ReferenceKind::Fragment => base_uri.to_string(),
        ReferenceKind::Url => normalize_url(parsed.uri, reference)?,
        ReferenceKind::AbsolutePath => {
            normalize_path(parsed.uri, PathStyle::for_pair(parsed.uri, base_uri))
        }
        ReferenceKind::RelativePath if looks_like_url(base_uri) => {
            let base_url = Url::parse(base_uri).map_err(|source| ReferenceError::Url {
                reference: base.to_string(),
                source,
            })?;
            base_url
                .join(parsed.uri)
                .map_err(|source| ReferenceError::Url {
                    reference: reference.to_string(),
                    source,
                })?
                .to_string()
        }
        ReferenceKind::RelativePath => join_path(parent_dir(base_uri), parsed.uri),
    };

    Ok(with_fragment(&uri, parsed.fragment))
}

/// Normalize a document location (path or URL), keeping any fragment.
///
/// Unparseable URLs are returned unchanged.
#[must_use]
pub fn normalize_location(location: &str) -> String {
    let (uri, fragment) = split_fragment(location);
    if uri.is_empty() {
        return location.to_string();
    }
    let uri = if looks_like_url(uri) {
        normalize_url(uri, location).unwrap_or_else(|_| uri.to_string())
    } else {
        normalize_path(uri, PathStyle::detect(uri).unwrap_or_default())
    };
    with_fragment(&uri, fragment)
}

/// Split `a.yaml#/b` into `("a.yaml", Some("/b"))`.
#[must_use]
pub fn split_fragment(reference: &str) -> (&str, Option<&str>) {
    reference
        .split_once('#')
        .map_or((reference, None), |(uri, fragment)| (uri, Some(fragment)))
}

/// Re-attach an optional fragment to a document location.
#[must_use]
pub fn with_fragment(uri: &str, fragment: Option<&str>) -> String {
    match fragment {
        Some(fragment) => format!("{uri}#{fragment}"),
        None => uri.to_string(),
    }
}

/// Whether `uri` has a URL scheme (`https://`, `file://`, ...).
///
/// Single-letter schemes are rejected so `C:\x.yaml` stays a path.
#[must_use]
pub fn looks_like_url(uri: &str) -> bool {
    let Some((scheme, _)) = uri.split_once("://") else {
        return false;
    };
    scheme.len() > 1
        && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Whether `path` is rooted (`/x`, `\x`, `\\server\x`, or `C:\x`).
#[must_use]
pub fn is_absolute_path(path: &str) -> bool {
    Prefix::split(path).0 != Prefix::None
}

/// Collapse `.`/`..` segments and repeated separators, emitting `style` separators.
///
/// `..` that would climb above a relative path's start is kept; above an
/// absolute root it is dropped.
#[must_use]
pub fn normalize_path(path: &str, style: PathStyle) -> String {
    let (prefix, rest) = Prefix::split(path);
    let absolute = prefix != Prefix::None;

    let mut parts: Vec<&str> = Vec::new();
    for segment in rest.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if absolute => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }

    let head = prefix.render(style);
    let body = parts.join(style.separator_str());
    if head.is_empty() && body.is_empty() {
        return ".".to_string();
    }
    format!("{head}{body}")
}

/// Join a relative path onto a directory and normalize the result.
#[must_use]
pub fn join_path(dir: &str, relative: &str) -> String {
    let style = PathStyle::for_pair(relative, dir);
    if dir.is_empty() || is_absolute_path(relative) {
        return normalize_path(relative, style);
    }
    let joiner = if dir.ends_with(['/', '\\']) {
        ""
    } else {
        style.separator_str()
    };
    normalize_path(&format!("{dir}{joiner}{relative}"), style)
}

/// Directory part of a path (`""` when there is none).
#[must_use]
pub fn parent_dir(path: &str) -> &str {
    match path.rfind(['/', '\\']) {
        Some(0) => &path[..1],
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Last path component, ignoring any query or fragment.
#[must_use]
pub fn file_name(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    match path.rfind(['/', '\\']) {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// [`file_name`] without its final extension.
#[must_use]
pub fn file_stem(path: &str) -> &str {
    let name = file_name(path);
    match name.rfind('.') {
        Some(0) | None => name,
        Some(idx) => &name[..idx],
    }
}

/// Path of `to` relative to the directory `from_dir`.
///
/// URLs, differing roots, and `from_dir` values that themselves climb with
/// `..` past the common prefix yield the normalized `to` unchanged.
#[must_use]
pub fn relative_path(from_dir: &str, to: &str) -> String {
    if looks_like_url(to) || looks_like_url(from_dir) {
        return to.to_string();
    }

    let style = PathStyle::for_pair(to, from_dir);
    let from = normalize_path(from_dir, style);
    let target = normalize_path(to, style);

    let (from_prefix, from_rest) = Prefix::split(&from);
    let (to_prefix, to_rest) = Prefix::split(&target);
    if from_prefix != to_prefix {
        return target;
    }

    let from_parts = path_segments(from_rest);
    let to_parts = path_segments(to_rest);
    let common = from_parts
        .iter()
        .zip(&to_parts)
        .take_while(|(a, b)| a == b)
        .count();

    if from_parts[common..].contains(&"..") {
        return target;
    }

    let mut parts = vec![".."; from_parts.len() - common];
    parts.extend(&to_parts[common..]);
    if parts.is_empty() {
        return ".".to_string();
    }
    parts.join(style.separator_str())
}

/// Path of `target` as seen from the root document's directory.
///
/// Used for name derivation; URLs come back unchanged.
#[must_use]
pub fn path_from_root(root_location: &str, target: &str) -> String {
    if looks_like_url(target) {
        return target.to_string();
    }
    relative_path(parent_dir(split_fragment(root_location).0), target)
}

/// Name of the directory a file lands in.
///
/// `schemas/pet.yaml` → `schemas`; `../pet.yaml` → `parent`; `pet.yaml` → `root`.
/// Always non-empty, even for paths that climb above their starting point.
#[must_use]
pub fn landing_directory(path: &str) -> String {
    let normalized = normalize_path(path, PathStyle::detect(path).unwrap_or_default());
    let (_, rest) = Prefix::split(&normalized);
    let mut dirs = path_segments(rest);
    dirs.pop();
    match dirs.last() {
        Some(&"..") => PARENT_MARKER.to_string(),
        Some(dir) => (*dir).to_string(),
        None => ROOT_MARKER.to_string(),
    }
}

/// All path components joined by `joiner`, `..` rewritten to [`PARENT_MARKER`].
///
/// URL schemes, queries, and fragments are dropped:
/// `https://example.com/a/pet.yaml` → `example.com-a-pet.yaml` with `"-"`.
#[must_use]
pub fn flatten_path(path: &str, joiner: &str) -> String {
    let body = path.split_once("://").map_or(path, |(_, rest)| rest);
    let body = body.split(['?', '#']).next().unwrap_or_default();
    body.split(['/', '\\'])
        .filter(|s| !s.is_empty() && *s != ".")
        .map(|s| if s == ".." { PARENT_MARKER } else { s })
        .collect::<Vec<_>>()
        .join(joiner)
}

fn path_segments(rest: &str) -> Vec<&str> {
    rest.split(['/', '\\'])
        .filter(|s| !s.is_empty() && *s != ".")
        .collect()
}

fn normalize_url(uri: &str, reference: &str) -> Result<String, ReferenceError> {
    Url::parse(uri)
        .map(|url| url.to_string())
        .map_err(|source| ReferenceError::Url {
            reference: reference.to_string(),
            source,
        })
}

/// Root component of a filesystem path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prefix {
    None,
    Root,
    Unc,
    Drive(u8),
}

impl Prefix {
    fn split(path: &str) -> (Self, &str) {
        let bytes = path.as_bytes();
        let is_sep = |b: u8| b == b'/' || b == b'\\';

        if bytes.len() >= 2 && is_sep(bytes[0]) && is_sep(bytes[1]) {
            return (Self::Unc, &path[2..]);
        }
        if bytes.first().copied().is_some_and(is_sep) {
            return (Self::Root, &path[1..]);
        }
        if bytes.len() >= 2
            && bytes[0].is_ascii_alphabetic()
            && bytes[1] == b':'
            && (bytes.len() == 2 || is_sep(bytes[2]))
        {
            return (Self::Drive(bytes[0]), &path[2..]);
        }
        (Self::None, path)
    }

    fn render(self, style: PathStyle) -> String {
        let sep = style.separator();
        match self {
            Self::None => String::new(),
            Self::Root => sep.to_string(),
            Self::Unc => format!("{sep}{sep}"),
            Self::Drive(letter) => format!("{}:{sep}", letter as char),
        }
    }
}
