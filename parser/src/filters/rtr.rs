// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

//! CF gorouter access-log parsing, ported from `filter_rtr.go`. Matches
//! only `[RTR/N]` proc ids; on a message that fails the fixed-format
//! regex, surfaces `@exception` instead of dropping the record, matching
//! the original's degrade-gracefully behavior.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Map, Value};

use super::Filter;
use crate::{inline_params::parse_inline_params, msg::SyslogMessage};

fn rtr_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r#"^(?P<hostname>\b(?:[0-9A-Za-z][0-9A-Za-z-]{0,62})(?:\.(?:[0-9A-Za-z][0-9A-Za-z-]{0,62}))*(\.?|\b))"#,
            r#"(?P<port>:[0-9]+)? - \[(?P<timestamp>[^\]]*)\] "(?P<verb>[^\s]*) (?P<path>[^\s]*) (?P<http_spec>[^\s]*)" "#,
            r#"(?P<status>[0-9]+) (?P<request_bytes_received>[0-9]+) (?P<body_bytes_sent>[0-9]+) "#,
            r#""(?P<referer>[^\s]*)" "(?P<http_user_agent>[^"]*)" "(?P<src_host>[0-9.]*):(?P<src_port>[0-9]+)" "#,
            r#""(?P<dst_host>[0-9.]*):(?P<dst_port>[0-9]+)" (?P<params>.*)$"#,
        ))
        .expect("static rtr regex is valid")
    })
}

fn match_regex(re: &'static str) -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(re).expect("static regex is valid"))
}

pub struct RtrFilter;

impl RtrFilter {
    fn parse(&self, message: &str) -> Result<Map<String, Value>, String> {
        let re = rtr_regex();
        let caps = re
            .captures(message)
            .ok_or_else(|| "Log router could not be parsed, probably format has changed.".to_string())?;

        let mut result = Map::new();
        for name in re.capture_names().flatten() {
            if name == "params" {
                continue;
            }
            if let Some(m) = caps.name(name) {
                result.insert(name.to_string(), json!(m.as_str()));
            }
        }
        if let Some(m) = caps.name("params") {
            for (k, v) in parse_inline_params(m.as_str()) {
                result.insert(k, v);
            }
        }
        Ok(result)
    }
}

impl Filter for RtrFilter {
    fn matches(&self, msg: &SyslogMessage) -> bool {
        match_regex(r"^\[RTR/[0-9]+]").is_match(&msg.proc_id)
    }

    fn filter(&self, msg: &mut SyslogMessage) -> Map<String, Value> {
        let message = msg.message.clone().unwrap_or_default();
        let mut values = match self.parse(&message) {
            Ok(v) => v,
            Err(e) => {
                let mut data = Map::new();
                data.insert("@message".into(), json!(message));
                data.insert("@exception".into(), json!(e));
                return data;
            }
        };

        let take_str = |values: &mut Map<String, Value>, k: &str| {
            values.remove(k).unwrap_or(Value::Null)
        };
        let take_i64 = |values: &mut Map<String, Value>, k: &str| -> i64 {
            values
                .remove(k)
                .and_then(|v| v.as_str().and_then(|s| s.parse::<i64>().ok()))
                .unwrap_or(0)
        };

        let mut rtr = Map::new();
        rtr.insert("hostname".into(), take_str(&mut values, "hostname"));
        rtr.insert("timestamp".into(), take_str(&mut values, "timestamp"));
        rtr.insert("verb".into(), take_str(&mut values, "verb"));
        rtr.insert("path".into(), take_str(&mut values, "path"));
        rtr.insert("http_spec".into(), take_str(&mut values, "http_spec"));

        let status = take_i64(&mut values, "status");
        rtr.insert("status".into(), json!(status));
        rtr.insert(
            "request_bytes_received".into(),
            json!(take_i64(&mut values, "request_bytes_received")),
        );
        rtr.insert(
            "body_bytes_sent".into(),
            json!(take_i64(&mut values, "body_bytes_sent")),
        );
        rtr.insert("referer".into(), take_str(&mut values, "referer"));
        rtr.insert("http_user_agent".into(), take_str(&mut values, "http_user_agent"));

        let src_port = take_i64(&mut values, "src_port");
        rtr.insert(
            "src".into(),
            json!({"host": take_str(&mut values, "src_host"), "port": src_port}),
        );
        let dst_port = take_i64(&mut values, "dst_port");
        rtr.insert(
            "dst".into(),
            json!({"host": take_str(&mut values, "dst_host"), "port": dst_port}),
        );

        let xff_raw = values
            .remove("x_forwarded_for")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        let xff: Vec<String> = if xff_raw.contains(", ") {
            xff_raw.split(", ").map(str::to_string).collect()
        } else {
            xff_raw.split(',').map(str::to_string).collect()
        };
        let remote_addr = xff.first().cloned().unwrap_or_default();
        rtr.insert("x_forwarded_for".into(), json!(xff));
        rtr.insert("remote_addr".into(), json!(remote_addr));

        if let Some(v) = values.remove("x_forwarded_proto") {
            rtr.insert("x_forwarded_proto".into(), v);
        }

        let response_time = values
            .remove("response_time")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);
        rtr.insert("response_time_sec".into(), json!(response_time));
        let response_time_ms = (round_plus(response_time, 3) * 1000.0) as i64;
        rtr.insert("response_time_ms".into(), json!(response_time_ms));

        if let Some(v) = values.remove("gorouter_time").and_then(|v| v.as_f64()) {
            rtr.insert("gorouter_time_sec".into(), json!(v));
            rtr.insert("gorouter_time_ms".into(), json!((round_plus(v, 3) * 1000.0) as i64));
        }
        if let Some(v) = values.remove("app_time").and_then(|v| v.as_f64()) {
            rtr.insert("app_time_sec".into(), json!(v));
            rtr.insert("app_time_ms".into(), json!((round_plus(v, 3) * 1000.0) as i64));
        }

        if let Some(v) = values.remove("app_id") {
            rtr.insert("app_id".into(), v);
        }
        let app_index = values
            .remove("app_index")
            .map(|v| match v {
                Value::Number(n) => n.as_i64().unwrap_or(0),
                Value::String(s) => s.parse().unwrap_or(0),
                _ => 0,
            })
            .unwrap_or(0);
        rtr.insert("app_index".into(), json!(app_index));

        let request_id = values.remove("vcap_request_id");

        let mut data = Map::new();
        data.insert("rtr".into(), Value::Object(rtr));
        if let Some(rid) = request_id {
            data.insert("@request_id".into(), rid);
        }
        for (k, v) in values {
            data.insert(k, v);
        }

        let verb = data["rtr"]["verb"].as_str().unwrap_or_default();
        let path = data["rtr"]["path"].as_str().unwrap_or_default();
        data.insert(
            "@message".into(),
            json!(format!("{status} {verb} {path} ({response_time_ms} ms)")),
        );
        data.insert(
            "@level".into(),
            json!(if status >= 400 { "ERROR" } else { "INFO" }),
        );

        data
    }
}

fn round_plus(f: f64, places: i32) -> f64 {
    let shift = 10f64.powi(places);
    (f * shift + 0.5).floor() / shift
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg;

    #[test]
    fn matches_rtr_proc_id() {
        let m = msg::parse(r#"<14>1 - host app [RTR/0] - - body"#).unwrap();
        assert!(RtrFilter.matches(&m));
    }

    #[test]
    fn parses_access_log_line() {
        let line = concat!(
            r#"myapp.example.com - [2023-01-01T00:00:00.000+0000] "GET /path HTTP/1.1" "#,
            r#"200 12 34 "-" "curl/7.0" "10.0.0.1:1234" "10.0.0.2:5678" "#,
            r#"x_forwarded_for:"10.0.0.1" x_forwarded_proto:"http" vcap_request_id:"req-1" response_time:0.012 app_id:"app-1" app_index:"0""#,
        );
        let mut m = SyslogMessage {
            proc_id: "[RTR/0]".into(),
            message: Some(line.to_string()),
            ..Default::default()
        };
        let data = RtrFilter.filter(&mut m);
        assert_eq!(data["rtr"]["status"], json!(200));
        assert_eq!(data["rtr"]["verb"], json!("GET"));
        assert_eq!(data["@request_id"], json!("req-1"));
        assert_eq!(data["@level"], json!("INFO"));
    }

    #[test]
    fn unparseable_message_reports_exception() {
        let mut m = SyslogMessage {
            proc_id: "[RTR/0]".into(),
            message: Some("not a router line".into()),
            ..Default::default()
        };
        let data = RtrFilter.filter(&mut m);
        assert!(data.contains_key("@exception"));
    }
}
