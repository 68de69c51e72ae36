// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

//! The filter chain: each filter inspects the parsed syslog message and,
//! if it matches, contributes a fragment of the output JSON document.
//! Chain order (`Default`, `Metrics`, `Router`, `App`) and the merge
//! semantics between fragments are fixed by `Parser::parse`.

mod app;
mod default;
mod metrics;
mod rtr;

pub use app::{AppFilter, ParsingKey};
pub use default::DefaultFilter;
pub use metrics::MetricsFilter;
pub use rtr::RtrFilter;

use serde_json::{Map, Value};

use crate::msg::SyslogMessage;

/// Structured-data id for the `@source` template-seeding trick used by
/// the original (`ensure-init-data@0`) and removed again before the
/// message is forwarded.
pub const ENSURE_INIT_DATA_ID: &str = "ensure-init-data@0";
pub const TAGS_STRUCTURED_DATA_ID: &str = "tags@47450";
pub const GAUGE_STRUCTURED_DATA_ID: &str = "gauge@47450";
pub const COUNTER_STRUCTURED_DATA_ID: &str = "counter@47450";
pub const TIMER_STRUCTURED_DATA_ID: &str = "timer@47450";
pub const MESSAGE_KEY: &str = "@message";

pub fn is_metrics(msg: &SyslogMessage) -> bool {
    msg.structured_data.contains_key(GAUGE_STRUCTURED_DATA_ID)
        || msg.structured_data.contains_key(COUNTER_STRUCTURED_DATA_ID)
        || msg.structured_data.contains_key(TIMER_STRUCTURED_DATA_ID)
}

/// A stage of the filter chain.
pub trait Filter {
    /// Whether this filter applies to `msg` at all (e.g. the router
    /// filter only matches `[RTR/N]` proc ids).
    fn matches(&self, msg: &SyslogMessage) -> bool;

    /// Extracts this filter's contribution to the output document. May
    /// mutate `msg.structured_data` to consume fields it has claimed
    /// (the metrics filter does this to avoid also surfacing raw gauge/
    /// counter/timer structured-data blocks).
    fn filter(&self, msg: &mut SyslogMessage) -> Map<String, Value>;
}

/// Implemented only by the app filter: when the caller supplies instance
/// patterns, the filter matches message text against them instead of
/// running its default JSON/program-pattern heuristics.
pub trait FilterPatterns: Filter {
    fn filter_patterns(&self, msg: &SyslogMessage, patterns: &[String]) -> Map<String, Value>;
}
