// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

//! Metrics registry (component J): a small set of `prometheus` counters
//! and a histogram tracking the forwarder's hot path, registered once
//! at startup and injected as an `Arc<Metrics>` rather than relying on
//! the crate's process-wide default registry, per `spec.md` §9's
//! "process-wide metrics registry... acceptable as an injected
//! collaborator with explicit registration at startup".

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use warp::{reply, Reply};

const LABELS: &[&str] = &["instance_id", "binding_id", "plan_name", "org", "space", "app"];

pub struct ForwardLabels<'a> {
    pub instance_id: &'a str,
    pub binding_id: &'a str,
    pub plan_name: &'a str,
    pub org: &'a str,
    pub space: &'a str,
    pub app: &'a str,
}

impl<'a> ForwardLabels<'a> {
    fn values(&self) -> [&str; 6] {
        [
            self.instance_id,
            self.binding_id,
            self.plan_name,
            self.org,
            self.space,
            self.app,
        ]
    }
}

/// `spec.md` §4.E's fixed histogram buckets for `logs_sent_duration`.
const DURATION_BUCKETS: &[f64] = &[0.005, 0.010, 0.100, 0.250, 0.500, 1.0];

pub struct Metrics {
    registry: Registry,
    logs_sent_total: IntCounterVec,
    logs_sent_errors_total: IntCounterVec,
    logs_sent_without_cache_total: IntCounterVec,
    logs_sent_duration: HistogramVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let logs_sent_total = IntCounterVec::new(
            Opts::new("logs_sent_total", "Number of records successfully handed to a sink"),
            LABELS,
        )
        .unwrap();
        let logs_sent_errors_total = IntCounterVec::new(
            Opts::new(
                "logs_sent_errors_total",
                "Number of records dropped due to a parse, sink or not-found failure",
            ),
            LABELS,
        )
        .unwrap();
        let logs_sent_without_cache_total = IntCounterVec::new(
            Opts::new(
                "logs_sent_without_cache_total",
                "Number of records forwarded after a metadata cache miss required a store reload",
            ),
            LABELS,
        )
        .unwrap();
        let logs_sent_duration = HistogramVec::new(
            HistogramOpts::new("logs_sent_duration", "Time spent parsing and writing one record")
                .buckets(DURATION_BUCKETS.to_vec()),
            LABELS,
        )
        .unwrap();

        registry.register(Box::new(logs_sent_total.clone())).unwrap();
        registry.register(Box::new(logs_sent_errors_total.clone())).unwrap();
        registry
            .register(Box::new(logs_sent_without_cache_total.clone()))
            .unwrap();
        registry.register(Box::new(logs_sent_duration.clone())).unwrap();

        Self {
            registry,
            logs_sent_total,
            logs_sent_errors_total,
            logs_sent_without_cache_total,
            logs_sent_duration,
        }
    }

    pub fn record_sent(&self, labels: &ForwardLabels<'_>, elapsed_secs: f64) {
        self.logs_sent_total.with_label_values(&labels.values()).inc();
        self.logs_sent_duration
            .with_label_values(&labels.values())
            .observe(elapsed_secs);
    }

    pub fn record_error(&self, labels: &ForwardLabels<'_>) {
        self.logs_sent_errors_total.with_label_values(&labels.values()).inc();
    }

    /// Recorded when the metadata cache lookup for a record was a miss
    /// (it had to reload from the store rather than serving a cached
    /// entry), matching `spec.md` §4.E's `logs_sent_without_cache_total`.
    pub fn record_sent_without_cache(&self, labels: &ForwardLabels<'_>) {
        self.logs_sent_without_cache_total.with_label_values(&labels.values()).inc();
    }

    /// Recorded by the per-record panic-recovery boundary (`spec.md`
    /// §4.E/§7): the offending record's labels are usually unknown by the
    /// time a panic unwinds past the parser/forwarder, so this counts
    /// against the same series with empty label values rather than
    /// skipping the metric.
    pub fn record_panic(&self) {
        self.record_error(&ForwardLabels {
            instance_id: "",
            binding_id: "",
            plan_name: "",
            org: "",
            space: "",
            app: "",
        });
    }

    /// `GET /metrics`: the Prometheus text exposition of every metric
    /// registered above.
    pub fn dump(&self) -> impl Reply {
        let families = self.registry.gather();
        let mut buf = Vec::new();
        TextEncoder::new().encode(&families, &mut buf).unwrap_or_else(|e| {
            buf = format!("failed to encode metrics: {e}").into_bytes();
        });
        reply::with_header(buf, "Content-Type", TextEncoder::new().format_type())
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
