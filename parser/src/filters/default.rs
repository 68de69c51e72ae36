// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

//! Ported from `filter_default.go`: always matches, decomposes the
//! `[TYPE/detail.../index]` proc id and stamps the envelope fields every
//! record carries (`@source`, `@shipper`, `@input`, `@type`,
//! `@timestamp`, `@cf`).

use serde_json::{json, Map, Value};

use super::Filter;
use crate::msg::SyslogMessage;

pub struct DefaultFilter;

impl Filter for DefaultFilter {
    fn matches(&self, _msg: &SyslogMessage) -> bool {
        true
    }

    fn filter(&self, msg: &mut SyslogMessage) -> Map<String, Value> {
        let mut data = Map::new();

        let proc_id = msg.proc_id.trim_start_matches('[').trim_end_matches(']');
        let segments: Vec<&str> = proc_id.split('/').collect();
        let index_str = *segments.last().unwrap_or(&"");
        let index: i64 = if index_str.is_empty() {
            0
        } else {
            index_str.parse().unwrap_or(0)
        };
        let src_type = segments.first().copied().unwrap_or_default();
        let mut is_cf_task = false;
        let mut details = String::new();
        if segments.len() > 2 {
            details = segments[1..segments.len() - 1].join("/");
            if segments[1].eq_ignore_ascii_case("task") {
                is_cf_task = true;
            }
        }

        data.insert(
            "@source".into(),
            json!({"type": src_type, "details": details}),
        );
        data.insert(
            "@shipper".into(),
            json!({"name": "log-service", "priority": msg.priority}),
        );
        data.insert("@input".into(), json!("syslog"));
        data.insert("@type".into(), json!("LogMessage"));
        if let Some(ts) = &msg.timestamp {
            data.insert("@timestamp".into(), json!(ts));
        }
        if let Some(message) = &msg.message {
            if message.trim().is_empty() {
                data.insert("@level".into(), json!("INFO"));
                data.insert("@message".into(), json!(message));
            }
        }

        let mut flat: std::collections::BTreeMap<&str, &str> = std::collections::BTreeMap::new();
        for params in msg.structured_data.values() {
            for (k, v) in params {
                flat.insert(k.as_str(), v.as_str());
            }
        }

        let mut cf = Map::new();
        cf.insert("app".into(), json!(flat.get("app_name").copied().unwrap_or_default()));
        cf.insert("app_id".into(), json!(flat.get("app_id").copied().unwrap_or_default()));
        cf.insert("org".into(), json!(flat.get("org").copied().unwrap_or_default()));
        cf.insert("org_id".into(), json!(flat.get("org_id").copied().unwrap_or_default()));
        cf.insert("space".into(), json!(flat.get("space").copied().unwrap_or_default()));
        cf.insert("space_id".into(), json!(flat.get("space_id").copied().unwrap_or_default()));
        if is_cf_task {
            cf.insert("task_id".into(), json!(index));
            cf.insert("task_name".into(), json!(segments.get(2).copied().unwrap_or_default()));
        } else {
            cf.insert("app_instance".into(), json!(index));
        }
        data.insert("@cf".into(), Value::Object(cf));

        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg;

    #[test]
    fn decomposes_app_instance_proc_id() {
        let mut m = msg::parse(
            r#"<14>1 - host app [APP/PROC/WEB/2] - - body"#,
        )
        .unwrap();
        let data = DefaultFilter.filter(&mut m);
        assert_eq!(data["@cf"]["app_instance"], json!(2));
        assert_eq!(data["@source"]["type"], json!("APP"));
        assert_eq!(data["@source"]["details"], json!("PROC/WEB"));
    }

    #[test]
    fn decomposes_task_proc_id() {
        let mut m = msg::parse(r#"<14>1 - host app [APP/TASK/3] - - body"#).unwrap();
        let data = DefaultFilter.filter(&mut m);
        assert_eq!(data["@cf"]["task_id"], json!(3));
        assert!(data["@cf"].get("app_instance").is_none());
    }
}
