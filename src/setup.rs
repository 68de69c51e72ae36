// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

//! Wires every component (component K of `SPEC_FULL.md`) into a running
//! server: store, sinks, parser, metadata cache, broker, forwarder,
//! metrics and the `warp` HTTP surface, plus log/tracing setup and
//! graceful shutdown. Ported in spirit from the original `setup.rs`'s
//! `run_server`, which built a `Builder<Q>` from a handful of
//! already-assembled engine components and blocked on it inside a
//! freshly built tokio runtime — the same shape, with this crate's
//! actual collaborators in place of `catalog`/`cluster`/`table_engine`.

use std::{collections::BTreeMap, net::SocketAddr, sync::Arc, time::Duration};

use broker::{Broker, Plan};
use cache::{CacheDuration, MetadataCache};
use common_util::runtime::Builder as RuntimeBuilder;
use log::{error, info, warn};
use logger::RuntimeLevel;
use parser::Parser;
use server::{
    forwarder::Forwarder,
    http::{self, Context},
    limiter::{KeepAliveConfig, KeepAliveGovernor},
    metrics::Metrics,
};
use signal_hook::{consts::TERM_SIGNALS, iterator::Signals};
use sinks::SinkWriter;
use store::Store;

use crate::config::Config;

/// How long the server waits, after a shutdown signal closes the
/// listener, for in-flight forwarder tasks to drain before exiting
/// anyway. `spec.md` §5's "Cancellation" section.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(10);

pub fn setup_logger(config: &Config) -> RuntimeLevel {
    logger::init_global_logger(&config.log.level, config.log.json, config.log.no_color)
}

pub fn setup_tracing(config: &Config) -> tracing_util::tracing_appender::non_blocking::WorkerGuard {
    tracing_util::init_tracing_with_file(
        "logdrain-server",
        "logs",
        &config.log.level,
        tracing_util::tracing_appender::rolling::Rotation::DAILY,
    )
}

/// Builds a dedicated tokio runtime and blocks the calling thread on
/// [`run`], matching the synchronous `main()` call the teacher's own
/// entry point makes into `setup::run_server`.
pub fn run_server(config: Config, runtime_level: RuntimeLevel) {
    let runtime = RuntimeBuilder::default()
        .thread_name("logdrain")
        .enable_all()
        .build()
        .expect("failed to build tokio runtime");

    runtime.block_on(async move {
        if let Err(e) = run(config, Arc::new(runtime_level)).await {
            error!("server exited with error: {e}");
            std::process::exit(1);
        }
    });
}

async fn run(config: Config, runtime_level: Arc<RuntimeLevel>) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(Store::connect(&config.db.sqlite_path, config.db.cnx_max_open).await?);

    let plans: Vec<Plan> = config.syslog_addresses.iter().cloned().map(Plan::from_config).collect();

    let mut sinks: BTreeMap<String, Arc<dyn SinkWriter>> = BTreeMap::new();
    for plan in &plans {
        let sink = sinks::build(&plan.name, &plan.urls).await?;
        sinks.insert(plan.name.clone(), Arc::from(sink));
    }

    let broker_config = broker::BrokerConfig {
        public_host: config.broker.public_host.clone(),
        drain_host: config.broker.drain_host.clone(),
        web_port: config.web.port,
        web_tls_port: config.web.tls.port,
        has_tls: config.has_tls(),
        force_empty_drain_type: config.broker.force_empty_drain_type,
    };
    let broker = Arc::new(Broker::new((*store).clone(), plans, broker_config));

    let cache_duration = CacheDuration::parse(&config.binding_cache.duration);
    let cache = Arc::new(MetadataCache::new(store.clone(), cache_duration));
    if config.binding_cache.pre_cache {
        match cache.pre_cache().await {
            Ok(n) => info!("pre-cached {n} binding(s) into the metadata cache"),
            Err(e) => warn!("failed to pre-cache metadata: {e}"),
        }
    }
    tokio::spawn(cache.clone().run_cleaner());

    let parser = Arc::new(Parser::new(
        config.forwarder.parsing_keys.clone(),
        config.forwarder.ignore_tags_structured_data,
    ));

    let metrics = Arc::new(Metrics::new());
    let forwarder = Arc::new(Forwarder::new(cache, parser, sinks, metrics.clone()));

    let keep_alive = Arc::new(KeepAliveGovernor::new(KeepAliveConfig {
        disabled: config.web.max_keep_alive.disabled,
        duration: Duration::from_secs(config.web.max_keep_alive.duration_secs),
        fuzziness: Duration::from_secs(config.web.max_keep_alive.fuzziness_secs),
    }));

    let ctx = Context {
        forwarder,
        broker,
        metrics,
        runtime_level,
        keep_alive,
        allowed_hosts: Arc::new(config.forwarder.allowed_hosts.clone()),
        broker_username: Arc::new(config.broker.username.clone()),
        broker_password: Arc::new(config.broker.password.clone()),
    };

    let routes = http::routes(ctx);
    let shutdown = shutdown_signal();

    if config.has_tls() {
        let addr: SocketAddr = format!("0.0.0.0:{}", config.web.tls.port).parse()?;
        info!("listening for syslog drains on https://{addr}");
        let (_, server) = warp::serve(routes)
            .tls()
            .cert_path(&config.web.tls.cert_file)
            .key_path(&config.web.tls.key_file)
            .bind_with_graceful_shutdown(addr, shutdown);
        server.await;
    } else {
        let addr: SocketAddr = format!("0.0.0.0:{}", config.web.port).parse()?;
        info!("listening for syslog drains on http://{addr}");
        let (_, server) = warp::serve(routes).bind_with_graceful_shutdown(addr, shutdown);
        server.await;
    }

    info!("listener closed, draining in-flight forwarder tasks for up to {SHUTDOWN_DRAIN:?}");
    tokio::time::sleep(SHUTDOWN_DRAIN).await;
    Ok(())
}

/// Resolves once SIGTERM or SIGINT arrives, letting `warp`'s graceful
/// shutdown close the listener. `signal-hook`'s synchronous
/// `Signals::forever()` iterator runs on a dedicated OS thread and
/// hands the result across to the async world with a oneshot channel,
/// since this workspace does not pull in `signal-hook-tokio`.
fn shutdown_signal() -> impl std::future::Future<Output = ()> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    std::thread::spawn(move || {
        let mut signals = Signals::new(TERM_SIGNALS).expect("failed to register signal handlers");
        if let Some(sig) = signals.forever().next() {
            warn!("received signal {sig}, starting graceful shutdown");
            let _ = tx.send(());
        }
    });
    async move {
        let _ = rx.await;
    }
}
