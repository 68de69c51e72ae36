// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

//! Ties the RFC5424 reader ([`msg`]), the filter chain ([`filters`]) and
//! the template evaluator ([`tpl`]) into the single entry point the
//! forwarder calls per record: [`Parser::parse`]. Ported from
//! `examples/original_source/parser/parser.go`'s `Parser.Parse`.

pub mod filters;
pub mod host;
pub mod inline_params;
pub mod mapper;
pub mod merge;
pub mod msg;

use std::collections::BTreeMap;

use filters::{AppFilter, DefaultFilter, Filter, FilterPatterns, MetricsFilter, RtrFilter};
use serde_json::{Map, Value};
use snafu::{Backtrace, ResultExt, Snafu};

pub use filters::ParsingKey;

/// Default company id used to namespace the seeded structured-data
/// block when an instance has none configured, ported from parser.go's
/// `defCompanyID`.
pub const DEFAULT_COMPANY_ID: &str = "logsbroker@1368";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Failed to parse syslog frame, err:{}.\nBacktrace:\n{}", source, backtrace))]
    Parse {
        source: msg::Error,
        backtrace: Backtrace,
    },
}

common_util::define_result!(Error);

/// The per-instance context `Parser::parse` needs beyond the raw
/// message: everything a resolved `InstanceParam` plus the binding's
/// `app_id` carry. Deliberately decoupled from `store::models` and
/// `cache::CachedMetadata` so this crate has no dependency on either —
/// the forwarder assembles one of these from the cache lookup.
#[derive(Debug, Clone, Default)]
pub struct ForwardContext {
    pub company_id: String,
    pub org_id: String,
    pub space_id: String,
    pub namespace: String,
    pub app_id: String,
    pub patterns: Vec<String>,
    pub tags: BTreeMap<String, String>,
    pub source_labels: BTreeMap<String, String>,
}

/// One configured parser instance: the fixed filter chain plus the
/// operator-configured knobs (`forwarder.parsing_keys`,
/// `forwarder.ignore_tags_structured_data`).
pub struct Parser {
    default_filter: DefaultFilter,
    metrics_filter: MetricsFilter,
    rtr_filter: RtrFilter,
    app_filter: AppFilter,
    ignore_tags_structured_data: bool,
}

impl Parser {
    pub fn new(parsing_keys: Vec<ParsingKey>, ignore_tags_structured_data: bool) -> Self {
        Self {
            default_filter: DefaultFilter,
            metrics_filter: MetricsFilter,
            rtr_filter: RtrFilter,
            app_filter: AppFilter::new(parsing_keys),
            ignore_tags_structured_data,
        }
    }

    /// Parses and transforms one raw RFC5424 frame. Returns `Ok(None)`
    /// for the spec's "silent success" case (empty body, no metrics);
    /// otherwise the re-serialized frame ready to hand to a sink
    /// writer.
    pub fn parse(&self, ctx: &ForwardContext, raw: &str) -> Result<Option<String>> {
        let mut message = msg::parse(raw).context(Parse)?;

        let body_empty = message.message.as_deref().map(str::trim).unwrap_or("").is_empty();
        if body_empty && !filters::is_metrics(&message) {
            return Ok(None);
        }

        let (org, space, app) = host::parse_host(&message.hostname);
        let company_id = if ctx.company_id.is_empty() {
            DEFAULT_COMPANY_ID
        } else {
            ctx.company_id.as_str()
        };

        if self.ignore_tags_structured_data {
            message.structured_data.remove(filters::TAGS_STRUCTURED_DATA_ID);
        }

        message.set_parameter(company_id, "app", &format!("{org}/{space}/{app}"));
        message.set_parameter(company_id, "app_name", &app);
        message.set_parameter(company_id, "app_id", &ctx.app_id);
        message.set_parameter(company_id, "org", &org);
        message.set_parameter(company_id, "org_id", &ctx.org_id);
        message.set_parameter(company_id, "space", &space);
        message.set_parameter(company_id, "space_id", &ctx.space_id);

        let mut data: Map<String, Value> = Map::new();
        data = self.run_filter(&self.default_filter, &mut message, data);
        if self.metrics_filter.matches(&message) {
            data = self.run_filter(&self.metrics_filter, &mut message, data);
        }
        if self.rtr_filter.matches(&message) {
            data = self.run_filter(&self.rtr_filter, &mut message, data);
        }
        if self.app_filter.matches(&message) {
            let values = if ctx.patterns.is_empty() {
                self.app_filter.filter(&mut message)
            } else {
                self.app_filter.filter_patterns(&message, &ctx.patterns)
            };
            data = merge::merge_map(data, values);
        }

        if !ctx.source_labels.is_empty() {
            let mut source_label_map = Map::new();
            for (k, v) in &ctx.source_labels {
                source_label_map.insert(k.clone(), Value::String(v.clone()));
            }
            let current_source = match data.get("@source") {
                Some(Value::Object(m)) => m.clone(),
                _ => Map::new(),
            };
            data.insert(
                "@source".into(),
                Value::Object(merge::merge_map(source_label_map, current_source)),
            );
        }

        let template_data = tpl::TemplateData {
            org: org.clone(),
            org_id: ctx.org_id.clone(),
            space: space.clone(),
            space_id: ctx.space_id.clone(),
            app: app.clone(),
            app_id: ctx.app_id.clone(),
            namespace: ctx.namespace.clone(),
            logdata: Value::Object(data.clone()),
        };
        let templater = tpl::Templater::new(&template_data);
        for (key, template) in &ctx.tags {
            match templater.execute(template) {
                Ok(rendered) => message.set_parameter(company_id, key, &rendered),
                Err(e) => {
                    data.insert("@exception_tag".into(), Value::String(e.to_string()));
                }
            }
        }

        let body = serde_json::to_string(&Value::Object(data)).unwrap_or_default();
        message.message = Some(format!("{body}\n"));

        Ok(Some(message.serialize()))
    }

    fn run_filter(&self, filter: &dyn Filter, msg: &mut msg::SyslogMessage, data: Map<String, Value>) -> Map<String, Value> {
        let values = filter.filter(msg);
        merge::merge_map(data, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ForwardContext {
        ForwardContext {
            company_id: String::new(),
            org_id: "org-guid".into(),
            space_id: "space-guid".into(),
            namespace: String::new(),
            app_id: "app-guid".into(),
            patterns: vec![],
            tags: BTreeMap::new(),
            source_labels: BTreeMap::new(),
        }
    }

    #[test]
    fn empty_body_is_silent_success() {
        let parser = Parser::new(vec![], false);
        let raw = r#"<14>1 - my-org.my-space.my-app myapp [APP/PROC/WEB/0] - - "#;
        assert!(parser.parse(&ctx(), raw).unwrap().is_none());
    }

    #[test]
    fn app_record_seeds_company_block_and_emits_json_body() {
        let parser = Parser::new(vec![], false);
        let raw = r#"<14>1 - my-org.my-space.my-app myapp [APP/PROC/WEB/3] - - hello world"#;
        let out = parser.parse(&ctx(), raw).unwrap().unwrap();
        assert!(out.contains("logsbroker@1368"));
        assert!(out.contains(r#"app_id="app-guid""#));
        assert!(out.contains(r#"org="my-org""#));
        let reparsed = msg::parse(&out).unwrap();
        let body: Value = serde_json::from_str(reparsed.message.as_deref().unwrap()).unwrap();
        assert_eq!(body["@cf"]["app_instance"], Value::from(3));
    }

    #[test]
    fn gauge_metric_with_empty_body_still_forwards() {
        let parser = Parser::new(vec![], false);
        let raw = r#"<14>1 - my-org.my-space.my-app myapp [APP/PROC/WEB/0] - [gauge@47450 name="memory" value="5423" unit="bytes"] "#;
        let out = parser.parse(&ctx(), raw).unwrap().unwrap();
        let reparsed = msg::parse(&out).unwrap();
        let body: Value = serde_json::from_str(reparsed.message.as_deref().unwrap()).unwrap();
        assert_eq!(body["@metric"]["type"], Value::from("gauge"));
        assert_eq!(body["@metric"]["value"], Value::from(5423.0));
    }

    #[test]
    fn template_tag_is_expanded_into_structured_data() {
        let parser = Parser::new(vec![], false);
        let mut c = ctx();
        c.tags.insert(
            "env".to_string(),
            r#"{{ if hasSuffix .Org "-staging" }}dev{{ else }}prod{{ end }}"#.to_string(),
        );
        let raw = r#"<14>1 - acme-staging.my-space.my-app myapp [APP/PROC/WEB/0] - - hello"#;
        let out = parser.parse(&c, raw).unwrap().unwrap();
        assert!(out.contains(r#"env="dev""#));
    }

    #[test]
    fn bad_template_annotates_exception_tag_without_failing() {
        let parser = Parser::new(vec![], false);
        let mut c = ctx();
        c.tags.insert("broken".to_string(), "{{ .org | nosuchfunc }}".to_string());
        let raw = r#"<14>1 - my-org.my-space.my-app myapp [APP/PROC/WEB/0] - - hello"#;
        let out = parser.parse(&c, raw).unwrap().unwrap();
        assert!(out.contains("@exception_tag"));
    }
}
