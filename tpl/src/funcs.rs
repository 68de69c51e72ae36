// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

//! Builtin pipeline functions, ported from `tpl/funcs.go` (`split`,
//! `join`, `trimSuffix`, `trimPrefix`, `hasPrefix`, `hasSuffix`), plus
//! `ret`, a dotted-path accessor into the log record the original
//! lacked and callers needed to pull a nested field straight out of
//! `@cf`/`@metric`/etc rather than only ever starting from `.`.

use serde_json::Value;

use crate::engine::TemplateData;

pub fn call(name: &str, args: &[Value], piped: Option<Value>, data: &TemplateData) -> Result<Value, String> {
    let mut all_args = args.to_vec();
    if let Some(v) = piped {
        all_args.push(v);
    }

    match name {
        "split" => {
            let (s, sep) = two_strings(&all_args, name)?;
            Ok(Value::Array(s.split(&sep as &str).map(|p| Value::String(p.to_string())).collect()))
        }
        "join" => {
            let sep = last_string(&all_args, name)?;
            let items = all_args
                .first()
                .and_then(|v| v.as_array())
                .ok_or_else(|| format!("{name}: first argument must be an array"))?;
            let parts: Vec<String> = items.iter().map(value_to_string).collect();
            Ok(Value::String(parts.join(&sep)))
        }
        "trimSuffix" => {
            // Go's funcMap signature is `trimSuffix(suffix, s)`: the explicit
            // template argument comes first, the piped value (appended last
            // by `call`'s caller) is the string being trimmed.
            let (suffix, s) = two_strings(&all_args, name)?;
            Ok(Value::String(s.strip_suffix(&suffix as &str).unwrap_or(&s).to_string()))
        }
        "trimPrefix" => {
            let (prefix, s) = two_strings(&all_args, name)?;
            Ok(Value::String(s.strip_prefix(&prefix as &str).unwrap_or(&s).to_string()))
        }
        "hasPrefix" => {
            let (s, prefix) = two_strings(&all_args, name)?;
            Ok(Value::Bool(s.starts_with(&prefix as &str)))
        }
        "hasSuffix" => {
            let (s, suffix) = two_strings(&all_args, name)?;
            Ok(Value::Bool(s.ends_with(&suffix as &str)))
        }
        "first" => {
            let items = all_args
                .first()
                .and_then(|v| v.as_array())
                .ok_or_else(|| "first: argument must be an array".to_string())?;
            Ok(items.first().cloned().unwrap_or(Value::Null))
        }
        "last" => {
            let items = all_args
                .first()
                .and_then(|v| v.as_array())
                .ok_or_else(|| "last: argument must be an array".to_string())?;
            Ok(items.last().cloned().unwrap_or(Value::Null))
        }
        "ret" => {
            let path = all_args
                .first()
                .map(value_to_string)
                .ok_or_else(|| "ret: missing path argument".to_string())?;
            Ok(crate::engine::lookup_logdata(data, &path).unwrap_or(Value::Null))
        }
        other => Err(format!("unknown template function {other:?}")),
    }
}

fn two_strings(args: &[Value], name: &str) -> Result<(String, String), String> {
    if args.len() < 2 {
        return Err(format!("{name}: expected 2 arguments, got {}", args.len()));
    }
    Ok((value_to_string(&args[0]), value_to_string(&args[1])))
}

fn last_string(args: &[Value], name: &str) -> Result<String, String> {
    args.last()
        .map(value_to_string)
        .ok_or_else(|| format!("{name}: missing argument"))
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_joins_and_splits() {
        let data = TemplateData::default();
        let parts = call("split", &[Value::String("a,b,c".into()), Value::String(",".into())], None, &data).unwrap();
        assert_eq!(parts, serde_json::json!(["a", "b", "c"]));
        let joined = call("join", &[parts, Value::String("-".into())], None, &data).unwrap();
        assert_eq!(joined, Value::String("a-b-c".into()));
    }

    #[test]
    fn trims_and_checks_affixes() {
        let data = TemplateData::default();
        // trimSuffix/trimPrefix take (suffix, s) / (prefix, s): `s` normally
        // arrives as the piped-in value, appended after the explicit argument.
        assert_eq!(
            call("trimSuffix", &[Value::String(".log".into()), Value::String("app.log".into())], None, &data).unwrap(),
            Value::String("app".into())
        );
        assert_eq!(
            call("hasPrefix", &[Value::String("app.log".into()), Value::String("app".into())], None, &data).unwrap(),
            Value::Bool(true)
        );
    }
}
