// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

//! The broker state machine (component F of `SPEC_FULL.md`):
//! Provision/Update/Bind/Unbind/Deprovision/GetInstance/GetBinding,
//! ported from `examples/original_source/api/broker.go`'s
//! `LoghostBroker`. Plans are held in memory ([`plan::Plan`]); instance
//! and binding state lives in [`store::Store`].

pub mod error;
pub mod plan;

pub use error::Error;
pub use plan::Plan;

common_util::define_result!(Error);

use std::collections::BTreeMap;

use snafu::ResultExt;
use store::models::{DrainType, NewInstanceParam, ResolvedInstanceParam};

/// Static broker-wide settings that influence drain-URL generation and
/// drain-type resolution but never change per-instance. Ported from
/// `model.Config.Broker`/`model.Config.Web`.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub public_host: String,
    pub drain_host: String,
    pub web_port: u16,
    pub web_tls_port: u16,
    pub has_tls: bool,
    pub force_empty_drain_type: bool,
}

/// `context` block of a provision/update call (`organization_guid`,
/// `space_guid`, `namespace` in the open-service-broker request body).
#[derive(Debug, Clone, Default)]
pub struct InstanceContext {
    pub org_id: String,
    pub space_id: String,
    pub namespace: String,
}

/// `parameters` block of a provision/update call.
#[derive(Debug, Clone, Default)]
pub struct ProvisionParams {
    pub tags: BTreeMap<String, String>,
    pub patterns: Vec<String>,
    pub drain_type: Option<DrainType>,
    pub use_tls: bool,
}

#[derive(Clone)]
pub struct Broker {
    store: store::Store,
    plans: Vec<Plan>,
    config: BrokerConfig,
}

impl Broker {
    pub fn new(store: store::Store, plans: Vec<Plan>, config: BrokerConfig) -> Self {
        Self { store, plans, config }
    }

    pub fn plans(&self) -> &[Plan] {
        &self.plans
    }

    fn find_plan(&self, plan_id_or_name: &str) -> Result<&Plan> {
        self.plans
            .iter()
            .find(|p| p.matches(plan_id_or_name))
            .ok_or_else(|| Error::PlanNotFound {
                plan: plan_id_or_name.to_string(),
                backtrace: snafu::Backtrace::generate(),
            })
    }

    fn resolve_drain_type(&self, plan: &Plan, params: &ProvisionParams) -> DrainType {
        if self.config.force_empty_drain_type {
            return DrainType::Empty;
        }
        match &params.drain_type {
            Some(DrainType::Empty) | None => plan.default_drain_type.clone(),
            Some(dt) => dt.clone(),
        }
    }

    /// Creates a fresh instance at revision 1. The revision-keyed
    /// schema means there is nothing to delete first — unlike the
    /// source, which wipes any leftover pattern/tag/source-label rows
    /// for `instance_id` before inserting (see `DESIGN.md`).
    pub async fn provision(
        &self,
        instance_id: &str,
        plan_id: &str,
        ctx: InstanceContext,
        params: ProvisionParams,
    ) -> Result<()> {
        let plan = self.find_plan(plan_id)?;

        let mut tags = plan.tags.clone();
        tags.extend(params.tags.clone());
        let mut patterns = plan.patterns.clone();
        patterns.extend(params.patterns.clone());
        let drain_type = self.resolve_drain_type(plan, &params);

        self.store
            .create_instance_param(NewInstanceParam {
                instance_id: instance_id.to_string(),
                revision: 1,
                org_id: ctx.org_id,
                space_id: ctx.space_id,
                namespace: ctx.namespace,
                plan_name: plan.name.clone(),
                company_id: plan.company_id.clone(),
                use_tls: params.use_tls || self.config.has_tls,
                drain_type,
                patterns,
                tags,
                source_labels: plan.source_labels.clone(),
            })
            .await
            .context(error::Store)
    }

    /// Creates revision = previous + 1, inheriting org/space/namespace
    /// from the previous revision. Merging rules otherwise match
    /// `provision` — see `DESIGN.md` for why this deviates from the
    /// source, which hard-codes `UseTls: config.HasTLS()` here and
    /// silently drops `params.UseTLS`.
    pub async fn update(
        &self,
        instance_id: &str,
        plan_id: &str,
        params: ProvisionParams,
    ) -> Result<()> {
        let previous = self
            .store
            .get_latest_instance_param(instance_id)
            .await
            .context(error::Store)?
            .ok_or_else(|| Error::InstanceNotFound {
                instance_id: instance_id.to_string(),
                backtrace: snafu::Backtrace::generate(),
            })?;

        let plan = self.find_plan(plan_id)?;

        let mut tags = plan.tags.clone();
        tags.extend(params.tags.clone());
        let mut patterns = plan.patterns.clone();
        patterns.extend(params.patterns.clone());
        let drain_type = self.resolve_drain_type(plan, &params);

        self.store
            .create_instance_param(NewInstanceParam {
                instance_id: instance_id.to_string(),
                revision: previous.revision + 1,
                org_id: previous.org_id,
                space_id: previous.space_id,
                namespace: previous.namespace,
                plan_name: plan.name.clone(),
                company_id: plan.company_id.clone(),
                use_tls: params.use_tls || self.config.has_tls,
                drain_type,
                patterns,
                tags,
                source_labels: plan.source_labels.clone(),
            })
            .await
            .context(error::Store)
    }

    /// Verifies the instance exists, records the binding, and returns
    /// the drain URL the platform will POST syslog frames to.
    pub async fn bind(&self, instance_id: &str, binding_id: &str, app_id: &str) -> Result<String> {
        let instance = self
            .store
            .get_latest_instance_param(instance_id)
            .await
            .context(error::Store)?
            .ok_or_else(|| Error::InstanceNotFound {
                instance_id: instance_id.to_string(),
                backtrace: snafu::Backtrace::generate(),
            })?;

        self.store
            .create_binding(binding_id, instance_id, app_id)
            .await
            .context(error::Store)?;

        Ok(self.drain_url(&instance, binding_id))
    }

    pub async fn unbind(&self, binding_id: &str) -> Result<()> {
        self.store.delete_binding(binding_id).await.context(error::Store)
    }

    /// Deletes the instance and every binding/pattern/tag/source-label
    /// row attached to it; `store::delete_instance` cascades across
    /// all revisions at once.
    pub async fn deprovision(&self, instance_id: &str) -> Result<()> {
        self.store.delete_instance(instance_id).await.context(error::Store)
    }

    pub async fn get_instance(&self, instance_id: &str) -> Result<ResolvedInstanceParam> {
        self.store
            .get_latest_instance_param(instance_id)
            .await
            .context(error::Store)?
            .ok_or_else(|| Error::InstanceNotFound {
                instance_id: instance_id.to_string(),
                backtrace: snafu::Backtrace::generate(),
            })
    }

    /// Returns the binding's instance/app pairing plus the recomputed
    /// drain URL (the binding row carries no URL itself — it is
    /// derived from the instance's current revision every time).
    pub async fn get_binding(&self, binding_id: &str) -> Result<(store::models::BindingRow, String)> {
        let binding = self
            .store
            .get_binding(binding_id)
            .await
            .context(error::Store)?
            .ok_or_else(|| Error::BindingNotFound {
                binding_id: binding_id.to_string(),
                backtrace: snafu::Backtrace::generate(),
            })?;

        let instance = self
            .store
            .get_latest_instance_param(&binding.instance_id)
            .await
            .context(error::Store)?
            .ok_or_else(|| Error::InstanceNotFound {
                instance_id: binding.instance_id.clone(),
                backtrace: snafu::Backtrace::generate(),
            })?;

        let url = self.drain_url(&instance, binding_id);
        Ok((binding, url))
    }

    /// `{scheme}://{drain_host}:{port}/{binding_id}?rev={revision}[&drain-type={type}]`,
    /// switching to HTTPS/the TLS port when both the instance's
    /// `use_tls` flag and broker-wide TLS are enabled. Ported from
    /// `LoghostBroker.genURL`.
    fn drain_url(&self, instance: &ResolvedInstanceParam, binding_id: &str) -> String {
        let (scheme, port) = if instance.use_tls && self.config.has_tls {
            ("https", self.config.web_tls_port)
        } else {
            ("http", self.config.web_port)
        };
        let mut url = format!(
            "{scheme}://{}:{port}/{binding_id}?rev={}",
            self.config.drain_host, instance.revision
        );
        if instance.drain_type != DrainType::Empty {
            url.push_str("&drain-type=");
            url.push_str(instance.drain_type.as_str());
        }
        url
    }

    pub fn dashboard_url(&self, instance_id: &str) -> String {
        format!("https://{}/docs/{instance_id}", self.config.public_host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BrokerConfig {
        BrokerConfig {
            public_host: "broker.example.com".into(),
            drain_host: "logservice.private.domain".into(),
            web_port: 0,
            web_tls_port: 443,
            has_tls: false,
            force_empty_drain_type: false,
        }
    }

    fn plan() -> Plan {
        Plan {
            id: "plan-id".into(),
            name: "loghost".into(),
            company_id: "acme@1".into(),
            description: "".into(),
            bullets: vec![],
            urls: vec!["tcp://sink.example.com:6514".into()],
            default_drain_type: DrainType::Empty,
            patterns: vec!["plan-pattern".into()],
            tags: BTreeMap::from([("plan_tag".to_string(), "plan_value".to_string())]),
            source_labels: BTreeMap::new(),
        }
    }

    async fn broker() -> Broker {
        let store = store::Store::connect(":memory:", 1).await.unwrap();
        Broker::new(store, vec![plan()], config())
    }

    #[tokio::test]
    async fn provision_then_get_instance_merges_plan_and_params() {
        let broker = broker().await;
        let mut params = ProvisionParams::default();
        params.tags.insert("custom".to_string(), "value".to_string());
        params.patterns.push("instance-pattern".to_string());

        broker
            .provision("inst-1", "loghost", InstanceContext::default(), params)
            .await
            .unwrap();

        let instance = broker.get_instance("inst-1").await.unwrap();
        assert_eq!(instance.revision, 1);
        assert_eq!(instance.patterns, vec!["plan-pattern", "instance-pattern"]);
        assert_eq!(instance.tags["plan_tag"], "plan_value");
        assert_eq!(instance.tags["custom"], "value");
    }

    #[tokio::test]
    async fn params_tags_win_over_plan_tags() {
        let broker = broker().await;
        let mut params = ProvisionParams::default();
        params.tags.insert("plan_tag".to_string(), "overridden".to_string());

        broker
            .provision("inst-1", "loghost", InstanceContext::default(), params)
            .await
            .unwrap();

        let instance = broker.get_instance("inst-1").await.unwrap();
        assert_eq!(instance.tags["plan_tag"], "overridden");
    }

    #[tokio::test]
    async fn update_bumps_revision_and_inherits_context() {
        let broker = broker().await;
        let ctx = InstanceContext {
            org_id: "org-1".into(),
            space_id: "space-1".into(),
            namespace: "ns".into(),
        };
        broker
            .provision("inst-1", "loghost", ctx, ProvisionParams::default())
            .await
            .unwrap();

        broker
            .update("inst-1", "loghost", ProvisionParams::default())
            .await
            .unwrap();

        let instance = broker.get_instance("inst-1").await.unwrap();
        assert_eq!(instance.revision, 2);
        assert_eq!(instance.org_id, "org-1");
        assert_eq!(instance.space_id, "space-1");
    }

    #[tokio::test]
    async fn update_without_provision_is_not_found() {
        let broker = broker().await;
        let err = broker
            .update("missing", "loghost", ProvisionParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InstanceNotFound { .. }));
    }

    #[tokio::test]
    async fn bind_returns_drain_url_with_revision() {
        let broker = broker().await;
        broker
            .provision("inst-1", "loghost", InstanceContext::default(), ProvisionParams::default())
            .await
            .unwrap();

        let url = broker.bind("inst-1", "binding-1", "app-1").await.unwrap();
        assert_eq!(url, "http://logservice.private.domain:0/binding-1?rev=1");
    }

    #[tokio::test]
    async fn bind_url_switches_to_https_when_use_tls_and_broker_tls_enabled() {
        let mut cfg = config();
        cfg.has_tls = true;
        let store = store::Store::connect(":memory:", 1).await.unwrap();
        let broker = Broker::new(store, vec![plan()], cfg);

        let mut params = ProvisionParams::default();
        params.use_tls = true;
        broker
            .provision("inst-1", "loghost", InstanceContext::default(), params)
            .await
            .unwrap();

        let url = broker.bind("inst-1", "binding-1", "app-1").await.unwrap();
        assert_eq!(url, "https://logservice.private.domain:443/binding-1?rev=1");
    }

    #[tokio::test]
    async fn get_binding_recomputes_url_after_update() {
        let broker = broker().await;
        broker
            .provision("inst-1", "loghost", InstanceContext::default(), ProvisionParams::default())
            .await
            .unwrap();
        broker.bind("inst-1", "binding-1", "app-1").await.unwrap();
        broker
            .update("inst-1", "loghost", ProvisionParams::default())
            .await
            .unwrap();

        let (binding, url) = broker.get_binding("binding-1").await.unwrap();
        assert_eq!(binding.app_id, "app-1");
        assert_eq!(url, "http://logservice.private.domain:0/binding-1?rev=2");
    }

    #[tokio::test]
    async fn unbind_removes_binding() {
        let broker = broker().await;
        broker
            .provision("inst-1", "loghost", InstanceContext::default(), ProvisionParams::default())
            .await
            .unwrap();
        broker.bind("inst-1", "binding-1", "app-1").await.unwrap();
        broker.unbind("binding-1").await.unwrap();
        let err = broker.get_binding("binding-1").await.unwrap_err();
        assert!(matches!(err, Error::BindingNotFound { .. }));
    }

    #[tokio::test]
    async fn deprovision_removes_instance_and_bindings() {
        let broker = broker().await;
        broker
            .provision("inst-1", "loghost", InstanceContext::default(), ProvisionParams::default())
            .await
            .unwrap();
        broker.bind("inst-1", "binding-1", "app-1").await.unwrap();

        broker.deprovision("inst-1").await.unwrap();

        assert!(matches!(
            broker.get_instance("inst-1").await.unwrap_err(),
            Error::InstanceNotFound { .. }
        ));
        assert!(matches!(
            broker.get_binding("binding-1").await.unwrap_err(),
            Error::BindingNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn unknown_plan_is_rejected() {
        let broker = broker().await;
        let err = broker
            .provision("inst-1", "no-such-plan", InstanceContext::default(), ProvisionParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PlanNotFound { .. }));
    }
}
