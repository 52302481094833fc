//! JSON-pointer locations over a live `serde_yaml_ng::Value` tree.
//!
//! A [`Location`] is the list of unescaped pointer tokens from the document
//! root to a node. It doubles as the path-addressed update capability the
//! engines use to replace nodes after a walk (see [`Location::set`]).

use std::borrow::Cow;
use std::fmt;

use percent_encoding::percent_decode_str;
use serde_yaml_ng::{Mapping, Value};

/// Unescape one RFC 6901 token (`~1` → `/`, `~0` → `~`).
#[must_use]
pub fn unescape_token(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

/// Decode one token taken from a URI fragment: percent-decoding first, then
/// RFC 6901 unescaping.
///
/// Tokens must be split off before decoding, so `%2F` stays inside its key.
#[must_use]
pub fn decode_fragment_token(token: &str) -> String {
    unescape_token(&percent_decode_str(token).decode_utf8_lossy())
}

/// Escape one RFC 6901 token (`~` → `~0`, `/` → `~1`).
#[must_use]
pub fn escape_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

/// Text of a scalar mapping key.
///
/// YAML allows unquoted numeric and boolean keys (`200:` under `responses`),
/// which are addressed by their scalar text.
#[must_use]
pub fn key_str(key: &Value) -> Option<Cow<'_, str>> {
    match key {
        Value::String(s) => Some(Cow::Borrowed(s)),
        Value::Number(n) => Some(Cow::Owned(n.to_string())),
        Value::Bool(b) => Some(Cow::Owned(b.to_string())),
        _ => None,
    }
}

/// Position of a node inside a document, as unescaped pointer tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location(Vec<String>);

impl Location {
    /// The document root (`""` as a pointer).
    #[must_use]
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    /// Parse a JSON pointer (`/components/schemas/Pet`).
    ///
    /// A leading `#` is tolerated so fragments can be passed directly.
    #[must_use]
    pub fn parse(pointer: &str) -> Self {
        let pointer = pointer.strip_prefix('#').unwrap_or(pointer);
        if pointer.is_empty() {
            return Self::root();
        }
        Self(pointer.split('/').skip(1).map(unescape_token).collect())
    }

    /// Parse a URI fragment (`#/components/schemas/My%20Pet`), which may be
    /// percent-encoded.
    #[must_use]
    pub fn from_fragment(fragment: &str) -> Self {
        let fragment = fragment.strip_prefix('#').unwrap_or(fragment);
        if fragment.is_empty() {
            return Self::root();
        }
        Self(fragment.split('/').skip(1).map(decode_fragment_token).collect())
    }

    /// Build a location from already-unescaped tokens.
    #[must_use]
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(tokens.into_iter().map(Into::into).collect())
    }

    /// Append a token.
    pub fn push(&mut self, token: impl Into<String>) {
        self.0.push(token.into());
    }

    /// Remove the last token.
    pub fn pop(&mut self) -> Option<String> {
        self.0.pop()
    }

    /// A new location one level deeper.
    #[must_use]
    pub fn child(&self, token: impl Into<String>) -> Self {
        let mut child = self.clone();
        child.push(token);
        child
    }

    /// Number of tokens; the root has depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// The unescaped tokens.
    #[must_use]
    pub fn tokens(&self) -> &[String] {
        &self.0
    }

    /// Token at `index`, if any.
    #[must_use]
    pub fn token(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    /// Last token, if any.
    #[must_use]
    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Whether this location begins with the given tokens.
    #[must_use]
    pub fn starts_with(&self, prefix: &[&str]) -> bool {
        self.0.len() >= prefix.len() && self.0.iter().zip(prefix).all(|(a, b)| a == b)
    }

    /// Render as an escaped JSON pointer.
    #[must_use]
    pub fn to_pointer(&self) -> String {
        self.0.iter().fold(String::new(), |mut out, token| {
            out.push('/');
            out.push_str(&escape_token(token));
            out
        })
    }

    /// Render as a local `$ref` string (`#/components/schemas/Pet`).
    #[must_use]
    pub fn to_fragment(&self) -> String {
        format!("#{}", self.to_pointer())
    }

    /// Borrow the node at this location.
    #[must_use]
    pub fn get<'v>(&self, root: &'v Value) -> Option<&'v Value> {
        self.0
            .iter()
            .try_fold(root, |node, token| child(node, token))
    }

    /// Mutably borrow the node at this location.
    pub fn get_mut<'v>(&self, root: &'v mut Value) -> Option<&'v mut Value> {
        self.0
            .iter()
            .try_fold(root, |node, token| child_mut(node, token))
    }

    /// Replace the node at this location; `false` if it no longer exists.
    pub fn set(&self, root: &mut Value, value: Value) -> bool {
        match self.get_mut(root) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Remove the node at this location from its parent container.
    ///
    /// Mapping entries keep the relative order of their siblings.
    pub fn remove(&self, root: &mut Value) -> Option<Value> {
        let (last, parent) = self.0.split_last()?;
        let parent = Self(parent.to_vec()).get_mut(root)?;
        match parent {
            Value::Mapping(map) => {
                let key = find_key(map, last)?;
                map.shift_remove(&key)
            }
            Value::Sequence(seq) => {
                let idx: usize = last.parse().ok()?;
                (idx < seq.len()).then(|| seq.remove(idx))
            }
            _ => None,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_pointer())
    }
}

fn find_key(map: &Mapping, token: &str) -> Option<Value> {
    map.keys()
        .find(|k| key_str(k).as_deref() == Some(token))
        .cloned()
}

fn child<'v>(node: &'v Value, token: &str) -> Option<&'v Value> {
    match node {
        Value::Mapping(map) => map.get(token).or_else(|| {
            map.iter()
                .find(|(k, _)| key_str(k).as_deref() == Some(token))
                .map(|(_, v)| v)
        }),
        Value::Sequence(seq) => seq.get(token.parse::<usize>().ok()?),
        Value::Tagged(tagged) => child(&tagged.value, token),
        _ => None,
    }
}

fn child_mut<'v>(node: &'v mut Value, token: &str) -> Option<&'v mut Value> {
    match node {
        Value::Mapping(map) => map
            .iter_mut()
            .find(|(k, _)| key_str(k).as_deref() == Some(token))
            .map(|(_, v)| v),
        Value::Sequence(seq) => seq.get_mut(token.parse::<usize>().ok()?),
        Value::Tagged(tagged) => child_mut(&mut tagged.value, token),
        _ => None,
    }
}
