// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

//! A minimal RFC5424 syslog message reader. Ported by hand from the
//! `go-syslog/v3/rfc5424` usage in the original forwarder: we only need a
//! fraction of the grammar that format actually supports (structured data,
//! procid, hostname, message body), so this is a straight-line scanner
//! rather than a generated grammar.

use std::collections::BTreeMap;

use snafu::{Backtrace, OptionExt, Snafu};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Syslog message is empty.\nBacktrace:\n{}", backtrace))]
    Empty { backtrace: Backtrace },

    #[snafu(display("Syslog message is missing the '<PRI>' header.\nBacktrace:\n{}", backtrace))]
    MissingPriority { backtrace: Backtrace },

    #[snafu(display("Syslog message has too few header fields, msg:{}.\nBacktrace:\n{}", msg, backtrace))]
    TooFewFields { msg: String, backtrace: Backtrace },

    #[snafu(display("Unterminated structured data block in:{}.\nBacktrace:\n{}", msg, backtrace))]
    UnterminatedStructuredData { msg: String, backtrace: Backtrace },
}

common_util::define_result!(Error);

/// One `[id key="value" ...]` block of RFC5424 structured data. Key order
/// is preserved with a `BTreeMap` for deterministic test output even
/// though the original used a plain Go map.
pub type SdParams = BTreeMap<String, String>;

#[derive(Debug, Clone, Default)]
pub struct SyslogMessage {
    pub priority: u8,
    pub version: u8,
    pub timestamp: Option<String>,
    pub hostname: String,
    pub app_name: Option<String>,
    pub proc_id: String,
    pub msg_id: Option<String>,
    pub structured_data: BTreeMap<String, SdParams>,
    pub message: Option<String>,
}

impl SyslogMessage {
    pub fn severity(&self) -> u8 {
        self.priority % 8
    }

    pub fn facility(&self) -> u8 {
        self.priority / 8
    }

    pub fn set_parameter(&mut self, sd_id: &str, key: &str, value: &str) {
        self.structured_data
            .entry(sd_id.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }
}

/// Parses a single RFC5424 frame. `message` must not include the
/// octet-count framing prefix used on the wire; that is stripped by the
/// caller (the forwarder http body reader) before this is invoked.
pub fn parse(message: &str) -> Result<SyslogMessage> {
    let message = message.trim_end_matches(['\n', '\r']);
    if message.is_empty() {
        return Empty.fail();
    }

    let rest = message.strip_prefix('<').context(MissingPriority)?;
    let close = rest.find('>').context(MissingPriority)?;
    let pri: u8 = rest[..close]
        .parse()
        .map_err(|_| Error::MissingPriority {
            backtrace: Backtrace::generate(),
        })?;
    let rest = &rest[close + 1..];

    // VERSION SP TIMESTAMP SP HOSTNAME SP APP-NAME SP PROCID SP MSGID SP ...
    let mut parts = rest.splitn(6, ' ');
    let version: u8 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1);
    let timestamp = parts.next().map(nil_dash).and_then(|s| s);
    let hostname = parts.next().map(nil_dash).and_then(|s| s).unwrap_or_default();
    let app_name = parts.next().map(nil_dash).and_then(|s| s);
    let proc_id = parts.next().map(nil_dash).and_then(|s| s).unwrap_or_default();
    let remainder = parts.next().unwrap_or("");

    let mut remainder_parts = remainder.splitn(2, ' ');
    let msg_id = remainder_parts.next().map(nil_dash).and_then(|s| s);
    let rest = remainder_parts.next().unwrap_or("").trim_start();

    let (structured_data, message_part) = parse_structured_data(rest, message)?;
    let message = if message_part.is_empty() {
        None
    } else {
        Some(message_part.to_string())
    };

    Ok(SyslogMessage {
        priority: pri,
        version,
        timestamp,
        hostname,
        app_name,
        proc_id,
        msg_id,
        structured_data,
        message,
    })
}

fn nil_dash(s: &str) -> Option<String> {
    if s == "-" || s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn parse_structured_data<'a>(
    rest: &'a str,
    whole_msg: &str,
) -> Result<(BTreeMap<String, SdParams>, &'a str)> {
    let mut data = BTreeMap::new();
    let mut cursor = rest;

    if let Some(stripped) = cursor.strip_prefix('-') {
        cursor = stripped.trim_start();
    }

    while cursor.starts_with('[') {
        let end = find_sd_element_end(cursor).context(UnterminatedStructuredData {
            msg: whole_msg.to_string(),
        })?;
        let element = &cursor[1..end];
        let mut fields = element.splitn(2, ' ');
        let sd_id = fields.next().unwrap_or_default().to_string();
        let params_str = fields.next().unwrap_or_default();
        let params = parse_sd_params(params_str);
        data.insert(sd_id, params);
        cursor = cursor[end + 1..].trim_start();
    }

    Ok((data, cursor))
}

fn find_sd_element_end(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(1) {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_quotes => escaped = true,
            b'"' => in_quotes = !in_quotes,
            b']' if !in_quotes => return Some(i),
            _ => {}
        }
    }
    None
}

fn parse_sd_params(s: &str) -> SdParams {
    let mut params = SdParams::new();
    let mut cursor = s.trim_start();
    while let Some(eq) = cursor.find('=') {
        let key = cursor[..eq].trim().to_string();
        cursor = cursor[eq + 1..].trim_start();
        if !cursor.starts_with('"') {
            break;
        }
        let mut value = String::new();
        let mut chars = cursor[1..].char_indices();
        let mut end = None;
        let mut escaped = false;
        for (i, c) in &mut chars {
            if escaped {
                value.push(c);
                escaped = false;
                continue;
            }
            match c {
                '\\' => escaped = true,
                '"' => {
                    end = Some(i);
                    break;
                }
                _ => value.push(c),
            }
        }
        let Some(end) = end else { break };
        if !key.is_empty() {
            params.insert(key, value);
        }
        cursor = cursor[1 + end + 1..].trim_start();
    }
    params
}

fn escape_sd_value(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace(']', "\\]")
}

impl SyslogMessage {
    /// Re-serializes this message back to an RFC5424 frame. Only
    /// `structured_data` and `message` are expected to have changed by
    /// the time this is called (the filter chain mutates those two
    /// fields and nothing else); header fields round-trip verbatim.
    pub fn serialize(&self) -> String {
        let nil = |s: &Option<String>| s.clone().unwrap_or_else(|| "-".to_string());
        let mut out = format!(
            "<{}>{} {} {} {} {} {}",
            self.priority,
            self.version,
            nil(&self.timestamp),
            if self.hostname.is_empty() { "-".to_string() } else { self.hostname.clone() },
            nil(&self.app_name),
            if self.proc_id.is_empty() { "-".to_string() } else { self.proc_id.clone() },
            nil(&self.msg_id),
        );

        if self.structured_data.is_empty() {
            out.push_str(" -");
        } else {
            for (sd_id, params) in &self.structured_data {
                out.push_str(&format!(" [{sd_id}"));
                for (k, v) in params {
                    out.push_str(&format!(" {k}=\"{}\"", escape_sd_value(v)));
                }
                out.push(']');
            }
        }

        if let Some(message) = &self.message {
            out.push(' ');
            out.push_str(message);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_frame_with_structured_data() {
        let raw = r#"<14>1 2023-01-01T00:00:00Z host org - - [id@47450 a="1" b="two words"] msg body"#;
        let msg = parse(raw).unwrap();
        let again = parse(&msg.serialize()).unwrap();
        assert_eq!(msg.priority, again.priority);
        assert_eq!(msg.structured_data, again.structured_data);
        assert_eq!(msg.message, again.message);
    }

    #[test]
    fn parses_basic_frame() {
        let raw =
            r#"<14>1 2023-01-01T00:00:00Z host.org.space.app myapp [APP/PROC/WEB/0] - - hello world"#;
        let msg = parse(raw).unwrap();
        assert_eq!(msg.priority, 14);
        assert_eq!(msg.hostname, "host.org.space.app");
        assert_eq!(msg.app_name.as_deref(), Some("myapp"));
        assert_eq!(msg.proc_id, "[APP/PROC/WEB/0]");
        assert_eq!(msg.message.as_deref(), Some("hello world"));
    }

    #[test]
    fn parses_structured_data() {
        let raw =
            r#"<14>1 2023-01-01T00:00:00Z host org - - [id@47450 a="1" b="two words"] msg body"#;
        let msg = parse(raw).unwrap();
        let sd = msg.structured_data.get("id@47450").unwrap();
        assert_eq!(sd.get("a").unwrap(), "1");
        assert_eq!(sd.get("b").unwrap(), "two words");
        assert_eq!(msg.message.as_deref(), Some("msg body"));
    }

    #[test]
    fn rejects_empty_message() {
        assert!(parse("").is_err());
    }
}
