// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

//! The forwarder (component E): binds the sink writer set, the parser,
//! the template evaluator (transitively, inside [`parser::Parser`]) and
//! the metadata cache into the hot path invoked once per inbound
//! syslog record. Ported from
//! `examples/original_source/api/forwarder.go`'s `Forwarder.Forward`.

use std::{collections::BTreeMap, sync::Arc, time::Instant};

use cache::MetadataCache;
use log::{error, warn};
use parser::{host, Parser};
use sinks::SinkWriter;

use crate::metrics::{ForwardLabels, Metrics};

/// Everything the hot path needs, handed to every `tokio::spawn`ed
/// per-record task as a cheap `Arc` clone.
pub struct Forwarder {
    cache: Arc<MetadataCache>,
    parser: Arc<Parser>,
    sinks: BTreeMap<String, Arc<dyn SinkWriter>>,
    metrics: Arc<Metrics>,
}

impl Forwarder {
    pub fn new(
        cache: Arc<MetadataCache>,
        parser: Arc<Parser>,
        sinks: BTreeMap<String, Arc<dyn SinkWriter>>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            cache,
            parser,
            sinks,
            metrics,
        }
    }

    /// Parses, enriches and forwards one raw syslog frame read from a
    /// `POST /{binding_id}` request body. Never propagates an error to
    /// the HTTP layer — every failure is counted and logged, matching
    /// `spec.md` §7's "the forwarder never blocks the HTTP response on
    /// downstream failure".
    pub async fn forward(&self, binding_id: &str, revision: i64, body: &str) {
        if body.trim().is_empty() {
            return;
        }

        let (org, space, app) = preview_host(body);
        let start = Instant::now();

        let (metadata, cache_hit) = match self.cache.log_metadata(binding_id, revision).await {
            Ok(result) => result,
            Err(e) => {
                warn!("cache miss for binding '{binding_id}' rev {revision}: {e}");
                self.metrics.record_error(&ForwardLabels {
                    instance_id: "",
                    binding_id,
                    plan_name: "",
                    org: &org,
                    space: &space,
                    app: &app,
                });
                return;
            }
        };

        let instance = &metadata.instance_param;
        let labels = ForwardLabels {
            instance_id: &instance.instance_id,
            binding_id,
            plan_name: &instance.plan_name,
            org: &org,
            space: &space,
            app: &app,
        };

        let ctx = parser::ForwardContext {
            company_id: instance.company_id.clone(),
            org_id: instance.org_id.clone(),
            space_id: instance.space_id.clone(),
            namespace: instance.namespace.clone(),
            app_id: metadata.app_id.clone(),
            patterns: instance.patterns.clone(),
            tags: instance.tags.clone(),
            source_labels: instance.source_labels.clone(),
        };

        let parsed = match self.parser.parse(&ctx, body) {
            Ok(parsed) => parsed,
            Err(e) => {
                error!("failed to parse syslog frame for binding '{binding_id}': {e}");
                self.metrics.record_error(&labels);
                return;
            }
        };

        // `spec.md` §4.B step 1: an empty-message, non-metric record is a
        // silent success, not a failure — nothing was dropped because
        // nothing needed sending.
        let Some(serialized) = parsed else {
            return;
        };

        let Some(sink) = self.sinks.get(&instance.plan_name) else {
            error!("no sink configured for plan '{}'", instance.plan_name);
            self.metrics.record_error(&labels);
            return;
        };

        match sink.write(serialized.as_bytes()).await {
            Ok(_) => {
                self.metrics.record_sent(&labels, start.elapsed().as_secs_f64());
                if !cache_hit {
                    self.metrics.record_sent_without_cache(&labels);
                }
            }
            Err(e) => {
                error!("sink write failed for plan '{}': {e}", instance.plan_name);
                self.metrics.record_error(&labels);
            }
        }
    }
}

/// Best-effort hostname decomposition used only to label the
/// `logs_sent_errors_total` metric on a cache miss, before the instance
/// (and hence its company id) is even known. Mirrors
/// `Parser.ParseHostFromMessage` in the original: a partial parse that
/// tolerates a malformed frame rather than failing the whole request.
fn preview_host(raw: &str) -> (String, String, String) {
    let after_pri = raw.splitn(2, '>').nth(1).unwrap_or(raw);
    let hostname = after_pri.split_whitespace().nth(2).unwrap_or("");
    host::parse_host(hostname)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_host_splits_canonical_hostname() {
        let raw = "<14>1 - my-org.my-space.my-app myapp [APP/PROC/WEB/0] - - hi";
        let (org, space, app) = preview_host(raw);
        assert_eq!(org, "my-org");
        assert_eq!(space, "my-space");
        assert_eq!(app, "my-app");
    }

    #[test]
    fn preview_host_tolerates_garbage() {
        let (org, space, app) = preview_host("not a syslog frame");
        assert_eq!((org.as_str(), space.as_str(), app.as_str()), ("", "", ""));
    }
}
