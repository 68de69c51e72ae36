// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

//! The configuration loader (component H): a typed `Config` assembled
//! from a TOML file via `common_util::toml::parse_toml_from_path`,
//! mirroring every grouped key in `spec.md` §6. Leaf structs follow the
//! teacher's `#[serde(default)]`-per-section convention rather than one
//! monolithic `Default` impl.

use std::collections::BTreeMap;

use broker::plan::PlanConfig;
use parser::ParsingKey;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub port: u16,
    pub tls: TlsConfig,
    pub max_keep_alive: MaxKeepAliveConfig,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            tls: TlsConfig::default(),
            max_keep_alive: MaxKeepAliveConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    pub port: u16,
    pub cert_file: String,
    pub key_file: String,
}

impl TlsConfig {
    pub fn is_enabled(&self) -> bool {
        !self.cert_file.is_empty() && !self.key_file.is_empty()
    }
}

/// Keep-alive governor (`spec.md` §4.E): connections tagged at accept
/// time with an end-of-life instant force `Connection: close` past it,
/// for load-balancer rebalancing. Disabled by default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MaxKeepAliveConfig {
    pub disabled: bool,
    pub duration_secs: u64,
    pub fuzziness_secs: u64,
}

impl Default for MaxKeepAliveConfig {
    fn default() -> Self {
        Self {
            disabled: true,
            duration_secs: 600,
            fuzziness_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
    pub no_color: bool,
    pub enable_profiler: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            no_color: false,
            enable_profiler: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub public_host: String,
    pub drain_host: String,
    pub username: String,
    pub password: String,
    pub force_empty_drain_type: bool,
    pub virtual_host: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            public_host: "localhost".to_string(),
            drain_host: "localhost".to_string(),
            username: "admin".to_string(),
            password: "admin".to_string(),
            force_empty_drain_type: false,
            virtual_host: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    pub cnx_max_idle: u32,
    pub cnx_max_open: u32,
    pub cnx_max_life_secs: u64,
    pub sqlite_fallback: bool,
    pub sqlite_path: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            cnx_max_idle: 2,
            cnx_max_open: 10,
            cnx_max_life_secs: 3600,
            sqlite_fallback: true,
            sqlite_path: "logdrain.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ForwarderConfig {
    pub allowed_hosts: Vec<String>,
    pub parsing_keys: Vec<ParsingKey>,
    pub ignore_tags_structured_data: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BindingCacheConfig {
    pub duration: String,
    pub pre_cache: bool,
}

impl Default for BindingCacheConfig {
    fn default() -> Self {
        Self {
            duration: "always".to_string(),
            pre_cache: false,
        }
    }
}

/// Top-level configuration, assembled from the TOML file named by
/// `--config` (falling back to `Config::default()` when absent, as the
/// teacher's own entry point does for its own config file).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub web: WebConfig,
    pub log: LogConfig,
    pub broker: BrokerConfig,
    pub db: DbConfig,
    pub forwarder: ForwarderConfig,
    pub binding_cache: BindingCacheConfig,
    pub syslog_addresses: Vec<PlanConfig>,
}

impl Config {
    pub fn has_tls(&self) -> bool {
        self.web.tls.is_enabled()
    }

    pub fn plan_urls_by_name(&self) -> BTreeMap<String, Vec<String>> {
        self.syslog_addresses
            .iter()
            .map(|p| (p.name.clone(), p.urls.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_ports() {
        let config = Config::default();
        assert_eq!(config.web.port, 8080);
        assert!(!config.has_tls());
        assert_eq!(config.binding_cache.duration, "always");
    }

    #[test]
    fn parses_syslog_addresses_section() {
        let toml = r#"
            [web]
            port = 9090

            [[syslog_addresses]]
            id = "plan-1"
            name = "loghost"
            urls = ["tcp://sink.example.com:6514"]
        "#;
        let config: Config = ::toml::from_str(toml).unwrap();
        assert_eq!(config.web.port, 9090);
        assert_eq!(config.syslog_addresses.len(), 1);
        assert_eq!(config.syslog_addresses[0].name, "loghost");
    }
}
