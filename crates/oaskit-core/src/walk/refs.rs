//! Untyped `$ref` scanning, for content that is not walked structurally.

use std::collections::BTreeSet;

use serde_yaml_ng::Value;

/// The `$ref` string of a reference object, if `value` is one.
#[must_use]
pub fn reference_of(value: &Value) -> Option<&str> {
    value.as_mapping()?.get("$ref")?.as_str()
}

/// Recursively collect every `$ref` string value, sorted and deduplicated.
#[must_use]
pub fn collect_refs(value: &Value) -> BTreeSet<String> {
    let mut refs = BTreeSet::new();
    collect_into(value, &mut refs);
    refs
}

fn collect_into(value: &Value, refs: &mut BTreeSet<String>) {
    match value {
        Value::Mapping(map) => {
            for (k, v) in map {
                if k.as_str() == Some("$ref") {
                    if let Some(s) = v.as_str() {
                        refs.insert(s.to_string());
                    }
                }
                collect_into(v, refs);
            }
        }
        Value::Sequence(seq) => {
            for item in seq {
                collect_into(item, refs);
            }
        }
        Value::Tagged(tagged) => collect_into(&tagged.value, refs),
        _ => {}
    }
}

/// Call `f` on every `$ref` string value, in document order.
///
/// The callback may rewrite the string in place. Returns how many values
/// the callback reported as changed.
pub fn for_each_ref_mut(value: &mut Value, f: &mut impl FnMut(&mut String) -> bool) -> usize {
    match value {
        Value::Mapping(map) => {
            let mut changed = 0;
            for (k, v) in map.iter_mut() {
                if k.as_str() == Some("$ref") {
                    if let Value::String(s) = v {
                        changed += usize::from(f(s));
                        continue;
                    }
                }
                changed += for_each_ref_mut(v, f);
            }
            changed
        }
        Value::Sequence(seq) => seq.iter_mut().map(|item| for_each_ref_mut(item, f)).sum(),
        Value::Tagged(tagged) => for_each_ref_mut(&mut tagged.value, f),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    const RAW: &str = indoc! {r"
        User:
          type: object
          properties:
            address:
              $ref: ./address.yaml#/Address
            friends:
              type: array
              items:
                $ref: '#/User'
        examples:
          - $ref: ./address.yaml#/Address
    "};

    #[test]
    fn collects_unique_refs() {
        let doc: Value = serde_yaml_ng::from_str(RAW).unwrap();
        let refs: Vec<_> = collect_refs(&doc).into_iter().collect();
        assert_eq!(refs, vec!["#/User", "./address.yaml#/Address"]);
    }

    #[test]
    fn rewrites_in_place_and_counts_changes() {
        let mut doc: Value = serde_yaml_ng::from_str(RAW).unwrap();
        let mut seen = Vec::new();
        let changed = for_each_ref_mut(&mut doc, &mut |r| {
            seen.push(r.clone());
            if r.starts_with("./address.yaml") {
                *r = r.replace("./address.yaml", "address.yaml");
                true
            } else {
                false
            }
        });
        assert_eq!(changed, 2);
        assert_eq!(seen.len(), 3);
        assert_eq!(
            doc["User"]["properties"]["address"]["$ref"].as_str(),
            Some("address.yaml#/Address")
        );
        assert_eq!(doc["examples"][0]["$ref"].as_str(), Some("address.yaml#/Address"));
    }

    #[test]
    fn reference_of_requires_string_ref() {
        let yes: Value = serde_yaml_ng::from_str("$ref: '#/a'").unwrap();
        let no: Value = serde_yaml_ng::from_str("$ref: {nested: true}").unwrap();
        assert_eq!(reference_of(&yes), Some("#/a"));
        assert_eq!(reference_of(&no), None);
    }
}
