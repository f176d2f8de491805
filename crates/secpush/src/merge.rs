//! Deep merge over YAML documents (spec §4.1, §8 laws 1-2).
//!
//! Figment's provider model merges mappings but has no notion of "list of
//! mappings keyed by name" — our config needs that for `sources:`/`sinks:`
//! lists across layered documents, so this is hand-rolled instead.

use serde_yaml::{Mapping, Value};

/// Key injected into name-keyed list elements the first time they're seen,
/// recording which document declared them. Relative paths inside a source's
/// options are resolved against this file's directory (spec §4.1). The typed
/// `Config` built from the merged document never carries this field forward,
/// so nothing needs to strip it back out.
pub const DECLARED_IN_KEY: &str = "__declared_in";

/// Merge `new` onto `base` in place, tagging any newly-inserted name-keyed
/// list element with `origin` under [`DECLARED_IN_KEY`].
///
/// Implements the merge table from spec §4.1:
/// - mapping ∪ mapping → recursive merge, scalar replaces scalar
/// - list of mappings where every element has `name` → merged element-wise
///   by name (recursive merge on match, append on new)
/// - any other list → replaced wholesale
/// - scalar / null → replaced wholesale
pub fn merge(base: &Value, new: &Value, origin: &str) -> Value {
    match (base, new) {
        (Value::Mapping(base_map), Value::Mapping(new_map)) => {
            Value::Mapping(merge_mappings(base_map, new_map, origin))
        }
        (Value::Sequence(base_seq), Value::Sequence(new_seq))
            if is_name_keyed_list(base_seq) && is_name_keyed_list(new_seq) =>
        {
            Value::Sequence(merge_name_keyed_lists(base_seq, new_seq, origin))
        }
        (Value::Null, Value::Sequence(new_seq)) if is_name_keyed_list(new_seq) => {
            Value::Sequence(merge_name_keyed_lists(&[], new_seq, origin))
        }
        // an absent base (the accumulator's initial state, or a key the base
        // document never had) behaves like an empty mapping so the first
        // document to declare a mapping still goes through merge_mappings
        // and gets its name-keyed list entries tagged with `origin`.
        (Value::Null, Value::Mapping(new_map)) => Value::Mapping(merge_mappings(&Mapping::new(), new_map, origin)),
        // any other shape (including differing shapes): new replaces wholesale
        (_, new_value) => new_value.clone(),
    }
}

fn merge_mappings(base: &Mapping, new: &Mapping, origin: &str) -> Mapping {
    let mut result = base.clone();
    for (key, new_value) in new {
        match result.get(key) {
            Some(existing) => {
                let merged = merge(existing, new_value, origin);
                result.insert(key.clone(), merged);
            }
            None => {
                result.insert(key.clone(), tag_if_name_keyed(new_value, origin));
            }
        }
    }
    result
}

fn is_name_keyed_list(seq: &[Value]) -> bool {
    !seq.is_empty()
        && seq.iter().all(|entry| {
            entry
                .as_mapping()
                .is_some_and(|m| m.contains_key(Value::from("name")))
        })
}

/// A bare value might be a name-keyed list that just hasn't been merged with
/// anything yet (first document declaring `sources:`); tag its elements too.
fn tag_if_name_keyed(value: &Value, origin: &str) -> Value {
    match value.as_sequence() {
        Some(seq) if is_name_keyed_list(seq) => {
            Value::Sequence(merge_name_keyed_lists(&[], seq, origin))
        }
        _ => value.clone(),
    }
}

fn merge_name_keyed_lists(base: &[Value], new: &[Value], origin: &str) -> Vec<Value> {
    let mut result: Vec<Value> = base.to_vec();

    for new_entry in new {
        let name = entry_name(new_entry);
        let existing_index = result.iter().position(|e| entry_name(e) == name);

        match existing_index {
            Some(idx) => {
                let merged = merge(&result[idx], new_entry, origin);
                result[idx] = merged;
            }
            None => {
                result.push(tag_declared_in(new_entry, origin));
            }
        }
    }

    result
}

fn entry_name(value: &Value) -> Option<String> {
    value
        .as_mapping()?
        .get(Value::from("name"))?
        .as_str()
        .map(str::to_string)
}

fn tag_declared_in(entry: &Value, origin: &str) -> Value {
    let mut mapping = entry.as_mapping().cloned().unwrap_or_default();
    if !mapping.contains_key(Value::from(DECLARED_IN_KEY)) {
        mapping.insert(Value::from(DECLARED_IN_KEY), Value::from(origin));
    }
    Value::Mapping(mapping)
}

/// Read back the `declared_in` tag a merge wrote, without removing it.
pub fn declared_in(entry: &Value) -> Option<String> {
    entry
        .as_mapping()?
        .get(Value::from(DECLARED_IN_KEY))?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn scalars_replace_wholesale() {
        let base = yaml("a: 1\n");
        let new = yaml("a: 2\n");
        let merged = merge(&base, &new, "b.yaml");
        assert_eq!(merged["a"].as_i64(), Some(2));
    }

    #[test]
    fn mappings_merge_recursively() {
        let base = yaml("outer:\n  a: 1\n  b: 2\n");
        let new = yaml("outer:\n  b: 3\n  c: 4\n");
        let merged = merge(&base, &new, "b.yaml");
        assert_eq!(merged["outer"]["a"].as_i64(), Some(1));
        assert_eq!(merged["outer"]["b"].as_i64(), Some(3));
        assert_eq!(merged["outer"]["c"].as_i64(), Some(4));
    }

    #[test]
    fn plain_lists_replace_wholesale() {
        let base = yaml("xs: [1, 2, 3]\n");
        let new = yaml("xs: [9]\n");
        let merged = merge(&base, &new, "b.yaml");
        assert_eq!(merged["xs"].as_sequence().unwrap().len(), 1);
    }

    #[test]
    fn name_keyed_lists_merge_by_name() {
        let base = yaml("sources:\n  - name: a\n    type: env\n  - name: b\n    type: env\n");
        let new = yaml("sources:\n  - name: b\n    type: yaml\n  - name: c\n    type: env\n");
        let merged = merge(&base, &new, "dev.yaml");
        let sources = merged["sources"].as_sequence().unwrap();
        assert_eq!(sources.len(), 3, "a, b (merged), c");

        let b = sources
            .iter()
            .find(|e| entry_name(e).as_deref() == Some("b"))
            .unwrap();
        assert_eq!(b["type"].as_str(), Some("yaml"), "new value wins on match");
    }

    #[test]
    fn new_entries_get_tagged_with_origin() {
        let base = yaml("sources: []\n");
        let new = yaml("sources:\n  - name: a\n    type: yaml\n");
        let merged = merge(&base, &new, "dev.yaml");
        let a = &merged["sources"].as_sequence().unwrap()[0];
        assert_eq!(declared_in(a).as_deref(), Some("dev.yaml"));
    }

    #[test]
    fn first_declaring_document_wins_on_later_merges() {
        let base = yaml("sources:\n  - name: a\n    type: yaml\n");
        let first = merge(&Value::Null, &base, "defaults.yaml");
        let overridden = merge(
            &first,
            &yaml("sources:\n  - name: a\n    type: yaml\n    key: x\n"),
            "dev.yaml",
        );
        let a = &overridden["sources"].as_sequence().unwrap()[0];
        assert_eq!(declared_in(a).as_deref(), Some("defaults.yaml"));
    }

    #[test]
    fn merge_determinism_law() {
        let a = yaml("vars:\n  x: 1\n");
        let b = yaml("vars:\n  y: 2\n");
        let c = yaml("vars:\n  x: 3\n");

        let left = merge(&merge(&a, &b, "f"), &c, "f");
        let ab = merge(&a, &b, "f");
        let right = merge(&ab, &c, "f");
        assert_eq!(left, right);
    }
}
