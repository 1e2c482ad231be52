// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context as _, Result};
use clap::Parser;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use kube::{
    runtime::{watcher::Config, Controller},
    Api, Client,
};
use kube_lease_manager::LeaseManagerBuilder;
use lightspeed_operator::{
    constants::{
        APP_SERVER_DEFAULT_IMAGE, CONSOLE_UI_DEFAULT_IMAGE, DEFAULT_HEALTH_PROBE_BIND_ADDRESS,
        DEFAULT_LEASE_DURATION_SECS, DEFAULT_LEASE_GRACE_SECS, DEFAULT_METRICS_BIND_ADDRESS,
        DEFAULT_NAMESPACE, DEFAULT_RECONCILE_INTERVAL_MINUTES, LEADER_LEASE_NAME,
        POSTGRES_DEFAULT_IMAGE, TOKIO_WORKER_THREADS,
    },
    context::{Context, OperatorOptions},
    crd::OLSConfig,
    health::{metrics_router, probe_router, serve, HealthState},
    metrics,
    reconcilers::{error_policy, reconcile_olsconfig},
    watchers::watched_object_mapper,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// OpenShift Lightspeed operator
#[derive(Debug, Parser)]
#[command(name = "lightspeed-operator", version, about)]
struct Cli {
    /// Namespace the operand is deployed into
    #[arg(long, env = "WATCH_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    namespace: String,

    /// Minutes between periodic reconciliations once everything is ready
    #[arg(long, default_value_t = DEFAULT_RECONCILE_INTERVAL_MINUTES)]
    reconcile_interval: u64,

    /// Application server image
    #[arg(long, default_value = APP_SERVER_DEFAULT_IMAGE)]
    service_image: String,

    /// Console plugin image
    #[arg(long, default_value = CONSOLE_UI_DEFAULT_IMAGE)]
    console_image: String,

    /// Postgres image
    #[arg(long, default_value = POSTGRES_DEFAULT_IMAGE)]
    postgres_image: String,

    /// Hold a lease before reconciling
    #[arg(long, default_value_t = false)]
    leader_elect: bool,

    /// Address the `/metrics` endpoint binds to
    #[arg(long, default_value = DEFAULT_METRICS_BIND_ADDRESS)]
    metrics_bind_address: SocketAddr,

    /// Address the `/healthz` and `/readyz` endpoints bind to
    #[arg(long, default_value = DEFAULT_HEALTH_PROBE_BIND_ADDRESS)]
    health_probe_bind_address: SocketAddr,
}

impl Cli {
    fn operator_options(&self) -> OperatorOptions {
        OperatorOptions {
            namespace: self.namespace.clone(),
            app_server_image: self.service_image.clone(),
            console_image: self.console_image.clone(),
            postgres_image: self.postgres_image.clone(),
            reconcile_interval: Duration::from_secs(self.reconcile_interval * 60),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("lightspeed-operator")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cli))
}

fn init_logging() {
    // Respects RUST_LOG if set, otherwise defaults to INFO level.
    // RUST_LOG_FORMAT=json switches to JSON output.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

/// Lease holder identity: the pod name, else the hostname.
fn pod_identity() -> String {
    std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| {
            warn!("POD_NAME not set, using 'unknown' as lease identity");
            "unknown".to_string()
        })
}

async fn async_main(cli: Cli) -> Result<()> {
    init_logging();

    info!("Starting OpenShift Lightspeed operator");
    debug!(options = ?cli, "Command line parsed");

    let client = Client::try_default().await?;
    debug!("Kubernetes client initialized successfully");

    let options = cli.operator_options();
    let health = Arc::new(HealthState::new());

    let metrics_server = tokio::spawn(serve(cli.metrics_bind_address, metrics_router(), "Metrics"));
    let probe_server = tokio::spawn(serve(
        cli.health_probe_bind_address,
        probe_router(health.clone()),
        "Health probe",
    ));

    let _lease_task = if cli.leader_elect {
        Some(acquire_leadership(client.clone(), &options.namespace).await?)
    } else {
        None
    };

    let ctx = Arc::new(Context::new(client, options));
    health.set_ready(true);

    // The controller never exits on its own; any branch finishing is fatal.
    tokio::select! {
        result = run_olsconfig_controller(ctx) => {
            error!("CRITICAL: OLSConfig controller exited: {:?}", result);
            result?;
            anyhow::bail!("OLSConfig controller exited unexpectedly without error")
        }
        result = metrics_server => {
            error!("CRITICAL: metrics server exited: {:?}", result);
            result??;
            anyhow::bail!("metrics server exited unexpectedly without error")
        }
        result = probe_server => {
            error!("CRITICAL: health probe server exited: {:?}", result);
            result??;
            anyhow::bail!("health probe server exited unexpectedly without error")
        }
    }
}

/// Block until this replica holds the lease, then watch for its loss.
///
/// Losing the lease terminates the process so the platform restarts it and
/// it re-enters election.
async fn acquire_leadership(
    client: Client,
    namespace: &str,
) -> Result<tokio::task::JoinHandle<()>> {
    let identity = pod_identity();
    info!(
        lease = LEADER_LEASE_NAME,
        namespace = %namespace,
        identity = %identity,
        "Waiting to acquire leadership"
    );

    let manager = LeaseManagerBuilder::new(client, LEADER_LEASE_NAME)
        .with_namespace(namespace)
        .with_identity(identity.as_str())
        .with_duration(DEFAULT_LEASE_DURATION_SECS)
        .with_grace(DEFAULT_LEASE_GRACE_SECS)
        .build()
        .await
        .context("failed to build lease manager")?;
    let (mut channel, task) = manager.watch().await;

    while !*channel.borrow_and_update() {
        channel
            .changed()
            .await
            .context("lease manager stopped before leadership was acquired")?;
    }
    info!(identity = %identity, "Acquired leadership");
    metrics::record_leader_elected(&identity);

    tokio::spawn(async move {
        loop {
            if channel.changed().await.is_err() || !*channel.borrow_and_update() {
                error!(identity = %identity, "Lost leadership, shutting down");
                metrics::record_leader_lost(&identity);
                std::process::exit(1);
            }
        }
    });

    Ok(tokio::spawn(async move {
        if let Ok(Err(e)) = task.await {
            error!("Lease manager failed: {}", e);
        }
    }))
}

/// Run the `OLSConfig` controller.
///
/// Besides the CR itself, owned operand objects and any annotated Secret or
/// ConfigMap in the operator namespace trigger a reconcile.
async fn run_olsconfig_controller(ctx: Arc<Context>) -> Result<()> {
    info!("Starting OLSConfig controller");

    let client = ctx.client.clone();
    let namespace = ctx.namespace().to_string();

    let api = Api::<OLSConfig>::all(client.clone());
    let deployments = Api::<Deployment>::namespaced(client.clone(), &namespace);
    let services = Api::<Service>::namespaced(client.clone(), &namespace);
    let config_maps = Api::<ConfigMap>::namespaced(client.clone(), &namespace);
    let secrets = Api::<Secret>::namespaced(client, &namespace);

    Controller::new(api, Config::default())
        .owns(deployments, Config::default())
        .owns(services, Config::default())
        .owns(config_maps.clone(), Config::default())
        .owns(secrets.clone(), Config::default())
        .watches(secrets, Config::default(), watched_object_mapper::<Secret>)
        .watches(config_maps, Config::default(), watched_object_mapper::<ConfigMap>)
        .shutdown_on_signal()
        .run(reconcile_olsconfig, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, _)) => debug!(name = %obj.name, "Reconcile finished"),
                Err(e) => debug!(error = %e, "Reconcile trigger failed"),
            }
        })
        .await;

    Ok(())
}

#[cfg(test)]
mod main_tests;
