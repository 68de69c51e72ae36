// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

//! Plans are derived once from `syslog_addresses` configuration and
//! held in an in-process map for the life of the service — they are
//! never persisted, matching `spec.md` §3 ("Plan ... Immutable at
//! runtime"). Grounded in
//! `examples/original_source/model/model.go`'s `SyslogAddress`.

use std::collections::BTreeMap;

use serde::Deserialize;
use store::models::DrainType;

#[derive(Debug, Clone)]
pub struct Plan {
    pub id: String,
    pub name: String,
    pub company_id: String,
    pub description: String,
    pub bullets: Vec<String>,
    pub urls: Vec<String>,
    pub default_drain_type: DrainType,
    pub patterns: Vec<String>,
    pub tags: BTreeMap<String, String>,
    pub source_labels: BTreeMap<String, String>,
}

impl Plan {
    pub fn matches(&self, id_or_name: &str) -> bool {
        self.id == id_or_name || self.name == id_or_name
    }

    pub fn from_config(cfg: PlanConfig) -> Self {
        Self {
            id: cfg.id,
            name: cfg.name,
            company_id: cfg.company_id,
            description: cfg.description,
            bullets: cfg.bullets,
            urls: cfg.urls,
            default_drain_type: cfg
                .default_drain_type
                .as_deref()
                .map(DrainType::from_str)
                .unwrap_or(DrainType::Empty),
            patterns: cfg.patterns,
            tags: cfg.tags,
            source_labels: cfg.source_labels,
        }
    }
}

/// Shape of one `[[syslog_addresses]]` TOML table, per `spec.md` §6.
/// Deserialized once at startup and turned into a `Plan` by
/// [`Plan::from_config`]; never touched again afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub company_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub default_drain_type: Option<String>,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub bullets: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub source_labels: BTreeMap<String, String>,
}
