// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

//! Parses the CF router access-log's trailing `key:value key2:value2 ...`
//! tail into typed values: quoted strings, then floats, then integers,
//! falling back to a bare string. Ported from `parser.parseInlineParams`.

use serde_json::{Map, Value};

pub fn parse_inline_params(inline: &str) -> Map<String, Value> {
    let mut out = Map::new();
    for part in inline.trim().split(' ') {
        let Some((k, v_raw)) = part.split_once(':') else {
            continue;
        };
        let v = v_raw.trim();
        if v.is_empty() {
            continue;
        }
        let value = if v.starts_with('"') && v.len() >= 2 {
            Value::String(v.trim_matches('"').to_string())
        } else if let Ok(f) = v.parse::<f64>() {
            Value::from(f)
        } else if let Ok(i) = v.parse::<i64>() {
            Value::from(i)
        } else {
            Value::String(v.to_string())
        };
        out.insert(k.to_string(), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_quoted_float_and_int() {
        let out = parse_inline_params(r#"app_id:"abc-123" response_time:1.234 app_index:0"#);
        assert_eq!(out["app_id"], json!("abc-123"));
        assert_eq!(out["response_time"], json!(1.234));
        // Bare numeric tokens are tried as float before int (matching the
        // original's `ParseFloat`-then-`ParseInt` order), so a plain "0"
        // lands as a float, not an int.
        assert_eq!(out["app_index"], json!(0.0));
    }

    #[test]
    fn quoted_numeric_value_stays_a_string() {
        let out = parse_inline_params(r#"app_index:"10""#);
        assert_eq!(out["app_index"], json!("10"));
    }
}
