// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

//! Application-log filter, ported from `filter_app.go`. Tries, in order:
//! whole-message JSON, the instance's own named-capture patterns, then a
//! small set of built-in program-output patterns; falls back to a bare
//! `@message`. Recurses into whichever "text" field it finds (`@message`,
//! `@raw`, `text` by default, plus whatever the deployment's parsing
//! keys configure) so a JSON log wrapping a program-pattern line gets
//! both layers extracted.

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{Filter, FilterPatterns};
use crate::{
    mapper::{create_map_from_delim, found_var_delim, mapper},
    merge::merge_map,
    msg::SyslogMessage,
};

/// A key this filter will recurse into looking for further structure,
/// e.g. `@message` if a program pattern only peeled off a timestamp and
/// left the rest of the line in `@message`. Deserializable so it can be
/// configured directly via `forwarder.parsing_keys` in the TOML config.
#[derive(Debug, Clone, Deserialize)]
pub struct ParsingKey {
    pub name: String,
    #[serde(default)]
    pub hide: bool,
}

pub fn default_parsing_keys() -> Vec<ParsingKey> {
    vec![
        ParsingKey { name: "@message".into(), hide: false },
        ParsingKey { name: "@raw".into(), hide: false },
        ParsingKey { name: "text".into(), hide: false },
    ]
}

/// Built-in fallback patterns tried, in order, when none of the
/// instance's own patterns match. A deliberately small set covering
/// common program log shapes rather than the original's large
/// ModSecurity-oriented grok library (see DESIGN.md).
fn program_patterns() -> &'static [&'static str] {
    &[
        r#"^(?P<timestamp>\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?)\s+(?P<level>[A-Za-z]+)\s+(?P<message>.*)$"#,
        r#"^(?P<level>[A-Z]+)\s*[:\-]\s*(?P<message>.*)$"#,
    ]
}

fn json_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^\s*\{\s*".*\}\s*$"#).expect("static regex is valid"))
}

pub struct AppFilter {
    pub parsing_keys: Vec<ParsingKey>,
}

impl AppFilter {
    pub fn new(mut parsing_keys: Vec<ParsingKey>) -> Self {
        parsing_keys.extend(default_parsing_keys());
        Self { parsing_keys }
    }

    fn filter_json(&self, message: &str) -> Map<String, Value> {
        match serde_json::from_str::<Value>(message) {
            Ok(v) => {
                let mut m = Map::new();
                m.insert("app".into(), v);
                m
            }
            Err(e) => {
                let mut m = Map::new();
                m.insert("@message".into(), json!(message));
                m.insert("@exception".into(), json!(e.to_string()));
                m
            }
        }
    }

    fn parse_json_map_value(&self, mut m: Map<String, Value>) -> Map<String, Value> {
        if let Some(msg_json) = m.remove("@json") {
            let text = value_to_text(&msg_json);
            m = merge_map(m, self.filter_json(&text));
        }
        if let Some(msg) = m.get("@message") {
            let text = value_to_text(msg);
            if json_regex().is_match(&text) {
                m.remove("@message");
                m = merge_map(m, self.filter_json(&text));
            }
        }
        m
    }

    fn filter_program_pattern(&self, message: &str) -> Map<String, Value> {
        for pattern in program_patterns() {
            let re = match Regex::new(pattern) {
                Ok(re) => re,
                Err(_) => continue,
            };
            if let Some(caps) = re.captures(message) {
                let mut flat = std::collections::BTreeMap::new();
                for name in re.capture_names().flatten() {
                    if let Some(m) = caps.name(name) {
                        flat.insert(name.to_string(), m.as_str().to_string());
                    }
                }
                let mut result = mapper(&flat);
                if let Some(app) = result.get("app").cloned() {
                    result.insert("@app".into(), app);
                }
                return result;
            }
        }
        Map::new()
    }

    fn find_text_value(&self, m: &Value) -> (Option<ParsingKey>, String) {
        for key in &self.parsing_keys {
            if let Some(Value::String(s)) = found_var_delim(m, &key.name) {
                return (Some(key.clone()), s);
            }
        }
        (None, String::new())
    }

    fn filter_patterns_msg(&self, message: &str, patterns: &[String]) -> Map<String, Value> {
        if json_regex().is_match(message) {
            return self.filter_json(message);
        }

        let mut result_map = Map::new();
        for pattern in patterns {
            if let Ok(re) = Regex::new(pattern) {
                if let Some(caps) = re.captures(message) {
                    let mut flat = std::collections::BTreeMap::new();
                    for name in re.capture_names().flatten() {
                        if let Some(m) = caps.name(name) {
                            flat.insert(name.to_string(), m.as_str().to_string());
                        }
                    }
                    result_map = mapper(&flat);
                    break;
                }
            }
        }

        if result_map.is_empty() {
            result_map = self.filter_program_pattern(message);
        }
        if result_map.is_empty() {
            let mut m = Map::new();
            m.insert("@message".into(), json!(message));
            return m;
        }

        result_map = self.parse_json_map_value(result_map);
        let (msg_key, text_value) = self.find_text_value(&Value::Object(result_map.clone()));
        if !text_value.is_empty() {
            result_map = merge_map(result_map, self.filter_patterns_msg(&text_value, patterns));
        }

        let has_msg = result_map.contains_key("@message");
        if has_msg {
            if let Some(key) = &msg_key {
                if !key.hide && !key.name.is_empty() {
                    let msg_value = result_map["@message"].clone();
                    result_map = merge_map(result_map, create_map_from_delim(&key.name, msg_value));
                }
            }
        } else {
            result_map.insert("@message".into(), json!(""));
        }

        result_map
    }
}

fn value_to_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Filter for AppFilter {
    fn matches(&self, msg: &SyslogMessage) -> bool {
        match_app_proc_id(&msg.proc_id)
    }

    fn filter(&self, msg: &mut SyslogMessage) -> Map<String, Value> {
        self.filter_patterns(msg, &[])
    }
}

impl FilterPatterns for AppFilter {
    fn filter_patterns(&self, msg: &SyslogMessage, patterns: &[String]) -> Map<String, Value> {
        let message = msg.message.clone().unwrap_or_default();
        self.filter_patterns_msg(&message, patterns)
    }
}

fn match_app_proc_id(proc_id: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\[APP/[A-Z]+/[A-Z0-9-]+(?:/[A-Z0-9-]+)*/[0-9]+\]$").expect("static regex is valid")
    })
    .is_match(proc_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg;

    #[test]
    fn matches_app_proc_id() {
        let m = msg::parse(r#"<14>1 - host app [APP/PROC/WEB/0] - - body"#).unwrap();
        assert!(AppFilter::new(vec![]).matches(&m));
    }

    #[test]
    fn matches_task_proc_id_with_hyphenated_name() {
        let m = msg::parse(r#"<14>1 - host app [APP/TASK/MY-TASK/7] - - body"#).unwrap();
        assert!(AppFilter::new(vec![]).matches(&m));
    }

    #[test]
    fn falls_back_to_bare_message_when_nothing_matches() {
        let filter = AppFilter::new(vec![]);
        let data = filter.filter_patterns_msg("just some text", &[]);
        assert_eq!(data["@message"], json!("just some text"));
    }

    #[test]
    fn whole_message_json_is_unwrapped() {
        let filter = AppFilter::new(vec![]);
        let data = filter.filter_patterns_msg(r#"{"a": 1}"#, &[]);
        assert_eq!(data["app"]["a"], json!(1));
    }

    #[test]
    fn instance_pattern_is_tried_before_fallback() {
        let filter = AppFilter::new(vec![]);
        let patterns = vec![r#"^(?P<level>[A-Z]+) (?P<message>.*)$"#.to_string()];
        let data = filter.filter_patterns_msg("INFO started up", &patterns);
        assert_eq!(data["level"], json!("INFO"));
        assert_eq!(data["message"], json!("started up"));
    }
}
