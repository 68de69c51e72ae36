// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

//! Wire shapes for the open-service-broker v2 HTTP surface (`spec.md`
//! §6), grounded in `examples/original_source/api/broker.go`'s use of
//! `github.com/pivotal-cf/brokerapi`'s `domain` package: `Provision`
//! returns `{"dashboard_url": ...}`, `Bind` returns
//! `{"credentials": {}, "syslog_drain_url": ...}`.

use std::collections::BTreeMap;

use broker::{InstanceContext, ProvisionParams};
use serde::{Deserialize, Serialize};
use store::models::{DrainType, ResolvedInstanceParam};

pub const SERVICE_ID: &str = "11c147f0-297f-4fd6-9401-e94e64f37094";

#[derive(Debug, Serialize)]
pub struct Catalog {
    pub services: Vec<ServiceOffering>,
}

#[derive(Debug, Serialize)]
pub struct ServiceOffering {
    pub id: String,
    pub name: String,
    pub description: String,
    pub bindable: bool,
    pub plans: Vec<ServicePlan>,
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ServicePlan {
    pub id: String,
    pub name: String,
    pub description: String,
    pub bullets: Vec<String>,
}

pub fn build_catalog(plans: &[broker::Plan]) -> Catalog {
    Catalog {
        services: vec![ServiceOffering {
            id: SERVICE_ID.to_string(),
            name: "logs".to_string(),
            description: "Drain apps logs to one or multiple syslog server(s).".to_string(),
            bindable: true,
            tags: vec!["syslog".to_string(), "forward".to_string()],
            plans: plans
                .iter()
                .map(|p| ServicePlan {
                    id: p.id.clone(),
                    name: p.name.clone(),
                    description: p.description.clone(),
                    bullets: p.bullets.clone(),
                })
                .collect(),
        }],
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct RequestContextBody {
    pub organization_guid: String,
    pub space_guid: String,
    pub namespace: String,
}

impl From<RequestContextBody> for InstanceContext {
    fn from(ctx: RequestContextBody) -> Self {
        InstanceContext {
            org_id: ctx.organization_guid,
            space_id: ctx.space_guid,
            namespace: ctx.namespace,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct RequestParametersBody {
    pub tags: BTreeMap<String, String>,
    pub patterns: Vec<String>,
    pub drain_type: Option<String>,
    pub use_tls: bool,
}

impl From<RequestParametersBody> for ProvisionParams {
    fn from(params: RequestParametersBody) -> Self {
        ProvisionParams {
            tags: params.tags,
            patterns: params.patterns,
            drain_type: params.drain_type.as_deref().map(DrainType::from_str),
            use_tls: params.use_tls,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ProvisionRequest {
    pub service_id: String,
    pub plan_id: String,
    pub organization_guid: String,
    pub space_guid: String,
    pub context: RequestContextBody,
    pub parameters: RequestParametersBody,
}

#[derive(Debug, Serialize)]
pub struct ProvisionResponse {
    pub dashboard_url: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct UpdateRequest {
    pub service_id: String,
    pub plan_id: String,
    pub parameters: RequestParametersBody,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct BindResourceBody {
    pub app_guid: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct BindRequest {
    pub service_id: String,
    pub plan_id: String,
    pub app_guid: String,
    pub bind_resource: BindResourceBody,
}

impl BindRequest {
    pub fn app_id(&self) -> &str {
        if !self.bind_resource.app_guid.is_empty() {
            &self.bind_resource.app_guid
        } else {
            &self.app_guid
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BindResponse {
    pub credentials: BTreeMap<String, String>,
    pub syslog_drain_url: String,
}

#[derive(Debug, Serialize)]
pub struct GetInstanceResponse {
    pub service_id: String,
    pub plan_id: String,
    pub parameters: GetInstanceParameters,
}

#[derive(Debug, Serialize)]
pub struct GetInstanceParameters {
    pub tags: BTreeMap<String, String>,
    pub patterns: Vec<String>,
    pub drain_type: String,
}

pub fn instance_to_response(instance: &ResolvedInstanceParam, plan_id: &str) -> GetInstanceResponse {
    GetInstanceResponse {
        service_id: SERVICE_ID.to_string(),
        plan_id: plan_id.to_string(),
        parameters: GetInstanceParameters {
            tags: instance.tags.clone(),
            patterns: instance.patterns.clone(),
            drain_type: instance.drain_type.as_str().to_string(),
        },
    }
}

#[derive(Debug, Serialize)]
pub struct GetBindingResponse {
    pub credentials: BTreeMap<String, String>,
    pub syslog_drain_url: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub description: String,
}
