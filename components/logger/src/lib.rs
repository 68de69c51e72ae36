// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

//! Runtime-adjustable log level on top of `tracing-subscriber`'s reload
//! layer, exposed to the http admin surface via `set_level_by_str`.

use std::str::FromStr;

use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt,
    layer::SubscriberExt,
    reload,
    util::SubscriberInitExt,
    Registry,
};

pub type ReloadHandle = reload::Handle<EnvFilter, Registry>;

/// Holds the reload handle for the process-wide tracing subscriber so the
/// log level can be changed without a restart.
pub struct RuntimeLevel {
    handle: ReloadHandle,
}

impl RuntimeLevel {
    pub fn new(handle: ReloadHandle) -> Self {
        Self { handle }
    }

    /// Parses `level` (e.g. "debug", "info,logdrain_parser=trace") and
    /// swaps it in as the active filter. Returns a human-readable error
    /// string on failure, matching the http handler's expectations.
    pub fn set_level_by_str(&self, level: &str) -> Result<(), String> {
        let filter = EnvFilter::from_str(level).map_err(|e| e.to_string())?;
        self.handle.reload(filter).map_err(|e| e.to_string())
    }
}

/// Builds and installs the global tracing subscriber, returning the
/// `RuntimeLevel` handle used to adjust it afterwards.
///
/// `json` switches to structured JSON log lines; `no_color` disables ANSI
/// colors on the human-readable formatter. Also installs a `tracing_log`
/// bridge so the workspace's many `log::warn!`/`log::error!` call sites
/// (cache, forwarder, sinks) are routed through the same subscriber
/// rather than going to the `log` crate's no-op default logger.
pub fn init_global_logger(default_level: &str, json: bool, no_color: bool) -> RuntimeLevel {
    tracing_log::LogTracer::init().expect("LogTracer must only be installed once");

    let initial_filter = EnvFilter::try_new(default_level)
        .unwrap_or_else(|_| EnvFilter::new(LevelFilter::INFO.to_string()));
    let (filter, reload_handle) = reload::Layer::new(initial_filter);

    let registry = Registry::default().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().with_ansi(!no_color)).init();
    }

    RuntimeLevel::new(reload_handle)
}
