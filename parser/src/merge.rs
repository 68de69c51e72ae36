// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

//! Recursive map merge used to combine filter outputs: absent keys are
//! inserted, keys present in both that are themselves objects are merged
//! recursively, and any other key in `partial` overwrites `parent`.
//! Ported from `utils.MergeMap`.

use serde_json::{Map, Value};

pub fn merge_map(mut parent: Map<String, Value>, partial: Map<String, Value>) -> Map<String, Value> {
    for (k, v) in partial {
        match parent.get_mut(&k) {
            None => {
                parent.insert(k, v);
            }
            Some(existing) => {
                if let (Value::Object(existing_map), Value::Object(v_map)) = (existing.clone(), v.clone()) {
                    parent.insert(k, Value::Object(merge_map(existing_map, v_map)));
                } else {
                    parent.insert(k, v);
                }
            }
        }
    }
    parent
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn inserts_absent_keys() {
        let parent = obj(json!({"a": 1}));
        let partial = obj(json!({"b": 2}));
        let merged = merge_map(parent, partial);
        assert_eq!(merged["a"], json!(1));
        assert_eq!(merged["b"], json!(2));
    }

    #[test]
    fn recurses_into_shared_object_keys() {
        let parent = obj(json!({"a": {"x": 1}}));
        let partial = obj(json!({"a": {"y": 2}}));
        let merged = merge_map(parent, partial);
        assert_eq!(merged["a"], json!({"x": 1, "y": 2}));
    }

    #[test]
    fn scalar_overwrites_scalar() {
        let parent = obj(json!({"a": 1}));
        let partial = obj(json!({"a": 2}));
        let merged = merge_map(parent, partial);
        assert_eq!(merged["a"], json!(2));
    }
}
