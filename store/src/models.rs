// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

//! Logical rows of the persistence layer, plus `ResolvedInstanceParam`, the
//! composite view the cache and broker work with (instance row + its
//! patterns/tags/source-labels joined together). Grounded in
//! `examples/original_source/model/model.go`'s `InstanceParam`/`Pattern`/
//! `Label`, redesigned to drop the ORM back-pointers per `spec.md` §9.

use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainType {
    Empty,
    Logs,
    Metrics,
    All,
}

impl DrainType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DrainType::Empty => "",
            DrainType::Logs => "logs",
            DrainType::Metrics => "metrics",
            DrainType::All => "all",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "logs" => DrainType::Logs,
            "metrics" => DrainType::Metrics,
            "all" => DrainType::All,
            _ => DrainType::Empty,
        }
    }
}

/// Primary key (instance_id, revision). Patterns/tags/source-labels are
/// stored in separate tables keyed by `instance_id` only and joined in
/// here by the store layer.
#[derive(Debug, Clone)]
pub struct ResolvedInstanceParam {
    pub instance_id: String,
    pub revision: i64,
    pub org_id: String,
    pub space_id: String,
    pub namespace: String,
    pub plan_name: String,
    pub company_id: String,
    pub use_tls: bool,
    pub drain_type: DrainType,
    /// Plan patterns first, then instance-supplied patterns, preserving
    /// the concatenation order from `spec.md` §4.F.
    pub patterns: Vec<String>,
    pub tags: BTreeMap<String, String>,
    pub source_labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct BindingRow {
    pub binding_id: String,
    pub instance_id: String,
    pub app_id: String,
}

/// Input to `Store::create_instance_param`; the store assigns
/// `created_at` and owns writing the child rows.
pub struct NewInstanceParam {
    pub instance_id: String,
    pub revision: i64,
    pub org_id: String,
    pub space_id: String,
    pub namespace: String,
    pub plan_name: String,
    pub company_id: String,
    pub use_tls: bool,
    pub drain_type: DrainType,
    pub patterns: Vec<String>,
    pub tags: BTreeMap<String, String>,
    pub source_labels: BTreeMap<String, String>,
}
