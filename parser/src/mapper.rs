// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

//! Bracket-path (`[a][b][c]`) and dot-path (`a.b.c`) map explosion/lookup,
//! ported from `parser.Mapper`/`Mapkv` and the dotted-path helpers used by
//! the app filter's text-extraction step and the template `ret` function.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::merge::merge_map;

/// Strips a single matching pair of surrounding quotes (`"..."` or
/// `'...'`) from a string value, same as the leading lines of `Mapkv`.
fn unquote(v: Value) -> Value {
    let Value::String(s) = &v else { return v };
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return if s.len() <= 2 {
                Value::String(String::new())
            } else {
                Value::String(s[1..s.len() - 1].to_string())
            };
        }
    }
    v
}

/// Explodes a single `[a][b][c]`-shaped key into a nested object holding
/// `value` at the leaf. A key not matching the bracket shape becomes a
/// flat `{key: value}`.
pub fn mapkv(key: &str, value: Value) -> Map<String, Value> {
    let key = key.trim();
    let value = unquote(value);

    let bytes = key.as_bytes();
    if key.len() <= 2 || bytes[0] != b'[' || bytes[bytes.len() - 1] != b']' {
        let mut m = Map::new();
        m.insert(key.to_string(), value);
        return m;
    }

    let inner = &key[1..key.len() - 1];
    let segments: Vec<&str> = inner.split("][").collect();
    build_nested(&segments, value)
}

/// Explodes a dotted `a.b.c` key the same way `mapkv` explodes a
/// bracketed one — used by the app filter's hide-key handling where the
/// configured parsing key is dot-delimited rather than bracket-delimited.
pub fn create_map_from_delim(key: &str, value: Value) -> Map<String, Value> {
    if key.is_empty() {
        return Map::new();
    }
    let segments: Vec<&str> = key.split('.').collect();
    build_nested(&segments, value)
}

fn build_nested(segments: &[&str], value: Value) -> Map<String, Value> {
    if segments.is_empty() {
        return Map::new();
    }
    let mut m = Map::new();
    if segments.len() == 1 {
        m.insert(segments[0].to_string(), value);
        return m;
    }
    let nested = build_nested(&segments[1..], value);
    m.insert(segments[0].to_string(), Value::Object(nested));
    m
}

/// Applies `mapkv` to every entry of a flat string map and merges the
/// results, ported from `parser.Mapper`.
pub fn mapper(flat: &BTreeMap<String, String>) -> Map<String, Value> {
    let mut data = Map::new();
    for (k, v) in flat {
        let exploded = mapkv(k, Value::String(v.clone()));
        data = merge_map(data, exploded);
    }
    data
}

/// Dotted-path lookup into a nested JSON object, e.g. `found_var_delim(m,
/// "a.b.c")` reads `m["a"]["b"]["c"]`. Used both by the app filter's
/// "first non-empty candidate key" search and by the template `ret`
/// function.
pub fn found_var_delim(value: &Value, path: &str) -> Option<Value> {
    let mut cur = value;
    for segment in path.split('.') {
        cur = cur.as_object()?.get(segment)?;
    }
    Some(cur.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn explodes_bracket_path() {
        let m = mapkv("[a][b][c]", json!("v"));
        assert_eq!(Value::Object(m), json!({"a": {"b": {"c": "v"}}}));
    }

    #[test]
    fn leaves_plain_keys_flat() {
        let m = mapkv("plain", json!(1));
        assert_eq!(Value::Object(m), json!({"plain": 1}));
    }

    #[test]
    fn strips_matching_quotes() {
        let m = mapkv("k", json!("\"quoted\""));
        assert_eq!(m["k"], json!("quoted"));
    }

    #[test]
    fn dotted_lookup_finds_nested_value() {
        let data = json!({"a": {"b": {"c": "v"}}});
        assert_eq!(found_var_delim(&data, "a.b.c"), Some(json!("v")));
        assert_eq!(found_var_delim(&data, "a.b.missing"), None);
    }
}
