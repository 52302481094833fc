//! Stable structural hashing of schema subtrees.
//!
//! The hash is computed over RFC 8785 canonical JSON, so mapping key order,
//! YAML scalar spelling (`200` vs `'200'` keys), and the order of set-like
//! keyword arrays (`required`, `type`) never change the result.

use std::fmt;

use json_canon::to_string as to_canonical_json;
use serde_json::{Map, Number, Value as Json};
use serde_yaml_ng::Value;

use crate::pointer::key_str;

/// BLAKE3 hex digest of a node's canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(String);

impl ContentHash {
    /// Hash a document node.
    #[must_use]
    pub fn of(value: &Value) -> Self {
        let mut json = to_json(value);
        normalize_schema_semantics(&mut json);
        let canonical = to_canonical_json(&json).unwrap_or_else(|_| json.to_string());
        Self(blake3::hash(canonical.as_bytes()).to_hex().to_string())
    }

    /// Full hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight hex characters, for generated names.
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Convert a YAML node into JSON, stringifying scalar keys and dropping tags.
fn to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Json::Number(i.into())
            } else if let Some(u) = n.as_u64() {
                Json::Number(u.into())
            } else {
                n.as_f64()
                    .and_then(Number::from_f64)
                    .map_or_else(|| Json::String(n.to_string()), Json::Number)
            }
        }
        Value::String(s) => Json::String(s.clone()),
        Value::Sequence(seq) => Json::Array(seq.iter().map(to_json).collect()),
        Value::Mapping(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                let key = key_str(k).map_or_else(
                    || serde_yaml_ng::to_string(k).unwrap_or_default().trim().to_string(),
                    |k| k.into_owned(),
                );
                out.insert(key, to_json(v));
            }
            Json::Object(out)
        }
        Value::Tagged(tagged) => to_json(&tagged.value),
    }
}

/// Sort set-like keyword arrays so their order does not affect the hash.
fn normalize_schema_semantics(value: &mut Json) {
    match value {
        Json::Object(map) => {
            for keyword in ["required", "type"] {
                if let Some(Json::Array(arr)) = map.get_mut(keyword) {
                    sort_string_array_in_place(arr);
                }
            }
            for value in map.values_mut() {
                normalize_schema_semantics(value);
            }
        }
        Json::Array(arr) => {
            for item in arr {
                normalize_schema_semantics(item);
            }
        }
        _ => {}
    }
}

fn sort_string_array_in_place(arr: &mut Vec<Json>) {
    let mut strings: Vec<String> = arr
        .iter()
        .filter_map(|v| v.as_str().map(String::from))
        .collect();

    if strings.len() == arr.len() {
        strings.sort_unstable();
        *arr = strings.into_iter().map(Json::String).collect();
    }
}
