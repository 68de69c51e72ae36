// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

//! The HTTP surface (component 4.F/4.G): the forward endpoint syslog
//! drains POST to, and the open-service-broker v2 surface Cloud
//! Controller calls to provision/bind instances. Routing is built with
//! `warp`'s filter combinators, matching the style the rest of this
//! workspace's teacher uses for its own HTTP service. Grounded in
//! `examples/original_source/api/forwarder.go` (`ServeHTTP`,
//! `isAuthorized`) and `examples/original_source/api/broker.go`.

use std::{net::SocketAddr, sync::Arc};

use base64::Engine;
use broker::Broker;
use futures::FutureExt;
use log::{error, warn};
use logger::RuntimeLevel;
use serde::Deserialize;
use warp::{
    http::{HeaderValue, StatusCode},
    reject, reply, Filter, Rejection, Reply,
};

use crate::{
    broker_api::{self, BindRequest, ProvisionRequest, ProvisionResponse, UpdateRequest},
    error::Error,
    forwarder::Forwarder,
    limiter::KeepAliveGovernor,
    metrics::Metrics,
};

/// Collaborators every route closure needs; cloned (cheaply, behind
/// `Arc`s) into each filter chain rather than threaded through as
/// separate `warp::any().map(...)` state, matching `spec.md` §4's
/// description of the server as one shared, injected set of
/// components.
#[derive(Clone)]
pub struct Context {
    pub forwarder: Arc<Forwarder>,
    pub broker: Arc<Broker>,
    pub metrics: Arc<Metrics>,
    pub runtime_level: Arc<RuntimeLevel>,
    pub keep_alive: Arc<KeepAliveGovernor>,
    pub allowed_hosts: Arc<Vec<String>>,
    pub broker_username: Arc<String>,
    pub broker_password: Arc<String>,
}

pub fn routes(ctx: Context) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    forward_route(ctx.clone())
        .or(metrics_route(ctx.clone()))
        .or(log_level_route(ctx.clone()))
        .or(broker_routes(ctx))
        .recover(handle_rejection)
}

fn with_ctx(ctx: Context) -> impl Filter<Extract = (Context,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}

#[derive(Debug, Deserialize, Default)]
struct ForwardQuery {
    rev: Option<i64>,
}

/// `POST /{binding_id}?rev=N`: the syslog drain endpoint. The path
/// segment is optional — when the request is posted to the bare root
/// (no binding id in the path), `spec.md` §4.E's fallback kicks in and
/// the binding id is taken from the first dot-segment of the `Host`
/// header instead. Checked against `forwarder.allowed_hosts` (Host
/// header, port stripped) the way `isAuthorized` does in the original,
/// then handed off to a `tokio::spawn`ed [`Forwarder::forward`] call so
/// the response returns immediately regardless of downstream latency.
fn forward_route(ctx: Context) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let binding_id_in_path = warp::path::param::<String>().and(warp::path::end()).map(Some);
    let binding_id_from_host = warp::path::end().map(|| None::<String>);

    warp::post()
        .and(binding_id_in_path.or(binding_id_from_host).unify())
        .and(warp::query::<ForwardQuery>())
        .and(warp::header::optional::<String>("host"))
        .and(warp::addr::remote())
        .and(warp::body::bytes())
        .and(with_ctx(ctx))
        .and_then(handle_forward)
}

async fn handle_forward(
    path_binding_id: Option<String>,
    query: ForwardQuery,
    host: Option<String>,
    remote: Option<SocketAddr>,
    body: bytes::Bytes,
    ctx: Context,
) -> Result<impl Reply, Rejection> {
    if !is_authorized(&ctx.allowed_hosts, host.as_deref()) {
        return Err(reject::custom(Error::Unauthorized));
    }

    let binding_id = match path_binding_id.or_else(|| host.as_deref().and_then(binding_id_from_host)) {
        Some(id) => id,
        None => {
            return Err(reject::custom(Error::BadRequest {
                message: "no binding id in the path and no Host header to fall back to".to_string(),
            }))
        }
    };

    let revision = query.rev.unwrap_or_else(|| {
        warn!("request for binding '{binding_id}' carried no rev query param, defaulting to 0");
        0
    });

    let raw = String::from_utf8_lossy(&body).into_owned();
    let forwarder = ctx.forwarder.clone();
    let metrics = ctx.metrics.clone();
    tokio::spawn(async move {
        // Top-level recovery boundary per `spec.md` §4.E/§7: a panic deep
        // in the parser or a sink must not take the process down with it.
        let outcome = std::panic::AssertUnwindSafe(forwarder.forward(&binding_id, revision, &raw))
            .catch_unwind()
            .await;
        if let Err(panic) = outcome {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            error!(
                "recovered from panic while forwarding binding '{binding_id}': {message}\n{}",
                std::backtrace::Backtrace::force_capture()
            );
            metrics.record_panic();
        }
    });

    let mut response = reply::Response::new("".into());
    if let Some(remote) = remote {
        if ctx.keep_alive.should_close(remote) {
            response
                .headers_mut()
                .insert("connection", HeaderValue::from_static("close"));
        }
    }
    Ok(response)
}

/// Matches `forwarder.go`'s `isAuthorized`: an empty allow-list
/// authorizes everything, otherwise the `Host` header (with any `:port`
/// suffix stripped) must appear in it.
fn is_authorized(allowed_hosts: &[String], host_header: Option<&str>) -> bool {
    if allowed_hosts.is_empty() {
        return true;
    }
    let host = match host_header {
        Some(h) => h.rsplit_once(':').map(|(host, _)| host).unwrap_or(h),
        None => return false,
    };
    allowed_hosts.iter().any(|allowed| allowed == host)
}

/// `spec.md` §4.E's path-less fallback: the first dot-segment of the
/// `Host` header (port stripped), e.g. `125ce4a5-7845-14ae.drains.example.com`
/// yields `125ce4a5-7845-14ae`. `None` for an empty host or a leading dot.
fn binding_id_from_host(host: &str) -> Option<String> {
    let host_only = host.rsplit_once(':').map(|(h, _)| h).unwrap_or(host);
    let first = host_only.split('.').next()?;
    if first.is_empty() {
        None
    } else {
        Some(first.to_string())
    }
}

fn metrics_route(ctx: Context) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::get()
        .and(warp::path("metrics"))
        .and(warp::path::end())
        .and(with_ctx(ctx))
        .map(|ctx: Context| ctx.metrics.dump())
}

/// `PUT /debug/log_level/{level}`: swaps the process-wide tracing
/// filter without a restart.
fn log_level_route(ctx: Context) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::put()
        .and(warp::path("debug"))
        .and(warp::path("log_level"))
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(with_ctx(ctx))
        .and_then(|level: String, ctx: Context| async move {
            match ctx.runtime_level.set_level_by_str(&level) {
                Ok(()) => Ok(reply::with_status(format!("log level set to '{level}'"), StatusCode::OK)),
                Err(message) => Ok(reply::with_status(message, StatusCode::BAD_REQUEST)),
            }
        })
}

fn broker_routes(ctx: Context) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let base = warp::path("v2").and(require_basic_auth(ctx.clone()));

    let catalog = base
        .clone()
        .and(warp::get())
        .and(warp::path("catalog"))
        .and(warp::path::end())
        .and(with_ctx(ctx.clone()))
        .map(|_: (), ctx: Context| reply::json(&broker_api::build_catalog(ctx.broker.plans())));

    let provision = base
        .clone()
        .and(warp::put())
        .and(warp::path("service_instances"))
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(warp::body::json())
        .and(with_ctx(ctx.clone()))
        .and_then(|_: (), instance_id: String, req: ProvisionRequest, ctx: Context| {
            handle_provision(instance_id, req, ctx)
        });

    let update = base
        .clone()
        .and(warp::patch())
        .and(warp::path("service_instances"))
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(warp::body::json())
        .and(with_ctx(ctx.clone()))
        .and_then(|_: (), instance_id: String, req: UpdateRequest, ctx: Context| handle_update(instance_id, req, ctx));

    let deprovision = base
        .clone()
        .and(warp::delete())
        .and(warp::path("service_instances"))
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(with_ctx(ctx.clone()))
        .and_then(|_: (), instance_id: String, ctx: Context| handle_deprovision(instance_id, ctx));

    let get_instance = base
        .clone()
        .and(warp::get())
        .and(warp::path("service_instances"))
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(with_ctx(ctx.clone()))
        .and_then(|_: (), instance_id: String, ctx: Context| handle_get_instance(instance_id, ctx));

    let bind = base
        .clone()
        .and(warp::put())
        .and(warp::path("service_instances"))
        .and(warp::path::param::<String>())
        .and(warp::path("service_bindings"))
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(warp::body::json())
        .and(with_ctx(ctx.clone()))
        .and_then(
            |_: (), instance_id: String, binding_id: String, req: BindRequest, ctx: Context| {
                handle_bind(instance_id, binding_id, req, ctx)
            },
        );

    let unbind = base
        .clone()
        .and(warp::delete())
        .and(warp::path("service_instances"))
        .and(warp::path::param::<String>())
        .and(warp::path("service_bindings"))
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(with_ctx(ctx.clone()))
        .and_then(|_: (), _instance_id: String, binding_id: String, ctx: Context| {
            handle_unbind(binding_id, ctx)
        });

    let get_binding = base
        .and(warp::get())
        .and(warp::path("service_instances"))
        .and(warp::path::param::<String>())
        .and(warp::path("service_bindings"))
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(with_ctx(ctx))
        .and_then(|_: (), _instance_id: String, binding_id: String, ctx: Context| {
            handle_get_binding(binding_id, ctx)
        });

    catalog
        .or(provision)
        .or(update)
        .or(deprovision)
        .or(get_instance)
        .or(bind)
        .or(unbind)
        .or(get_binding)
}

/// Requires `Authorization: Basic base64(user:pass)` matching
/// `broker.username`/`broker.password`. A plain string comparison, not
/// a constant-time one: the original's own handler does an unguarded
/// `==`, and this workspace pulls no `subtle` dependency (see
/// `DESIGN.md`).
fn require_basic_auth(ctx: Context) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and(with_ctx(ctx))
        .and_then(|header: Option<String>, ctx: Context| async move {
            if basic_auth_ok(header.as_deref(), &ctx.broker_username, &ctx.broker_password) {
                Ok(())
            } else {
                Err(reject::custom(Error::Unauthorized))
            }
        })
        .untuple_one()
}

fn basic_auth_ok(header: Option<&str>, username: &str, password: &str) -> bool {
    let Some(header) = header else { return false };
    let Some(encoded) = header.strip_prefix("Basic ") else {
        return false;
    };
    let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded) else {
        return false;
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return false;
    };
    match decoded.split_once(':') {
        Some((u, p)) => u == username && p == password,
        None => false,
    }
}

async fn handle_provision(instance_id: String, req: ProvisionRequest, ctx: Context) -> Result<impl Reply, Rejection> {
    let plan_id = req.plan_id.clone();
    ctx.broker
        .provision(&instance_id, &plan_id, req.context.into(), req.parameters.into())
        .await
        .map_err(|source| {
            reject::custom(Error::Broker {
                source,
                backtrace: snafu::Backtrace::generate(),
            })
        })?;

    Ok(reply::with_status(
        reply::json(&ProvisionResponse {
            dashboard_url: ctx.broker.dashboard_url(&instance_id),
        }),
        StatusCode::CREATED,
    ))
}

async fn handle_update(instance_id: String, req: UpdateRequest, ctx: Context) -> Result<impl Reply, Rejection> {
    ctx.broker
        .update(&instance_id, &req.plan_id, req.parameters.into())
        .await
        .map_err(|source| {
            reject::custom(Error::Broker {
                source,
                backtrace: snafu::Backtrace::generate(),
            })
        })?;
    Ok(reply::with_status(reply::json(&serde_json::json!({})), StatusCode::OK))
}

async fn handle_deprovision(instance_id: String, ctx: Context) -> Result<impl Reply, Rejection> {
    ctx.broker.deprovision(&instance_id).await.map_err(|source| {
        reject::custom(Error::Broker {
            source,
            backtrace: snafu::Backtrace::generate(),
        })
    })?;
    Ok(reply::with_status(reply::json(&serde_json::json!({})), StatusCode::OK))
}

async fn handle_get_instance(instance_id: String, ctx: Context) -> Result<impl Reply, Rejection> {
    let instance = ctx.broker.get_instance(&instance_id).await.map_err(|source| {
        reject::custom(Error::Broker {
            source,
            backtrace: snafu::Backtrace::generate(),
        })
    })?;
    let plan_id = ctx
        .broker
        .plans()
        .iter()
        .find(|p| p.name == instance.plan_name)
        .map(|p| p.id.clone())
        .unwrap_or_default();
    Ok(reply::json(&broker_api::instance_to_response(&instance, &plan_id)))
}

async fn handle_bind(
    instance_id: String,
    binding_id: String,
    req: BindRequest,
    ctx: Context,
) -> Result<impl Reply, Rejection> {
    let drain_url = ctx
        .broker
        .bind(&instance_id, &binding_id, req.app_id())
        .await
        .map_err(|source| {
            reject::custom(Error::Broker {
                source,
                backtrace: snafu::Backtrace::generate(),
            })
        })?;

    Ok(reply::with_status(
        reply::json(&broker_api::BindResponse {
            credentials: Default::default(),
            syslog_drain_url: drain_url,
        }),
        StatusCode::CREATED,
    ))
}

async fn handle_unbind(binding_id: String, ctx: Context) -> Result<impl Reply, Rejection> {
    ctx.broker.unbind(&binding_id).await.map_err(|source| {
        reject::custom(Error::Broker {
            source,
            backtrace: snafu::Backtrace::generate(),
        })
    })?;
    Ok(reply::with_status(reply::json(&serde_json::json!({})), StatusCode::OK))
}

async fn handle_get_binding(binding_id: String, ctx: Context) -> Result<impl Reply, Rejection> {
    let (_binding, drain_url) = ctx.broker.get_binding(&binding_id).await.map_err(|source| {
        reject::custom(Error::Broker {
            source,
            backtrace: snafu::Backtrace::generate(),
        })
    })?;
    Ok(reply::json(&broker_api::GetBindingResponse {
        credentials: Default::default(),
        syslog_drain_url: drain_url,
    }))
}

async fn handle_rejection(err: Rejection) -> Result<impl Reply, std::convert::Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found.".to_string())
    } else if let Some(e) = err.find::<Error>() {
        let status = match e {
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::Broker { source, .. } => match source {
                broker::Error::PlanNotFound { .. }
                | broker::Error::InstanceNotFound { .. }
                | broker::Error::BindingNotFound { .. } => StatusCode::NOT_FOUND,
                broker::Error::Store { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Cache { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, e.to_string())
    } else if err.find::<warp::filters::body::BodyDeserializeError>().is_some() {
        (StatusCode::BAD_REQUEST, "Invalid request body.".to_string())
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal error.".to_string())
    };

    Ok(reply::with_status(
        reply::json(&broker_api::ErrorResponse {
            description: crate::error_util::remove_backtrace_from_err(&message).to_string(),
        }),
        status,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_allow_list_authorizes_everything() {
        assert!(is_authorized(&[], None));
        assert!(is_authorized(&[], Some("anything.example.com")));
    }

    #[test]
    fn allow_list_strips_port_before_matching() {
        let allowed = vec!["drain.example.com".to_string()];
        assert!(is_authorized(&allowed, Some("drain.example.com:8080")));
        assert!(!is_authorized(&allowed, Some("other.example.com:8080")));
        assert!(!is_authorized(&allowed, None));
    }

    #[test]
    fn binding_id_from_host_takes_first_dot_segment() {
        assert_eq!(
            binding_id_from_host("125ce4a5-7845-14ae.drains.example.com"),
            Some("125ce4a5-7845-14ae".to_string())
        );
        assert_eq!(
            binding_id_from_host("125ce4a5-7845-14ae.drains.example.com:8080"),
            Some("125ce4a5-7845-14ae".to_string())
        );
        assert_eq!(binding_id_from_host(""), None);
        assert_eq!(binding_id_from_host(".example.com"), None);
    }

    #[test]
    fn basic_auth_accepts_matching_credentials_only() {
        let header = format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode("admin:secret")
        );
        assert!(basic_auth_ok(Some(&header), "admin", "secret"));
        assert!(!basic_auth_ok(Some(&header), "admin", "wrong"));
        assert!(!basic_auth_ok(None, "admin", "secret"));
        assert!(!basic_auth_ok(Some("Bearer xyz"), "admin", "secret"));
    }
}
