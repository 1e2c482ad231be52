// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Top-level `OLSConfig` reconciliation.
//!
//! One pass runs the three subsystems in a fixed order and records one
//! condition per subsystem:
//!
//! | Subsystem | Condition | Deployment |
//! |-----------|-----------|------------|
//! | console plugin | `ConsolePluginReady` | `lightspeed-console-plugin` |
//! | Postgres cache | `CacheReady` | `lightspeed-postgres-server` |
//! | application server | `ApiReady` | `lightspeed-app-server` |
//!
//! A failing subsystem does not stop the ones after it. The conditions are
//! written once at the end of the pass, followed by `Reconciled` when every
//! subsystem is ready.

use crate::constants::{
    APP_SERVER_DEPLOYMENT_NAME, CONSOLE_UI_NAME, ERROR_REQUEUE_DURATION_SECS, KIND_OLS_CONFIG,
    OLS_CONFIG_FINALIZER, OLS_CONFIG_NAME, POSTGRES_DEPLOYMENT_NAME,
};
use crate::context::Context;
use crate::crd::OLSConfig;
use crate::metrics;
use crate::reconcilers::appserver::reconcile_app_server;
use crate::reconcilers::console::{
    delete_console_ui_resources, reconcile_console_ui, remove_console_ui,
};
use crate::reconcilers::finalizers::{
    ensure_cluster_finalizer, handle_cluster_deletion, FinalizerCleanup,
};
use crate::reconcilers::postgres::reconcile_postgres;
use crate::reconcilers::status::{
    check_deployment_status, DeploymentHealth, OLSConfigStatusUpdater,
};
use crate::reconcilers::tasks::TaskError;
use crate::status_reasons::{
    failed_message, in_progress_message, CONDITION_TYPE_API_READY, CONDITION_TYPE_CACHE_READY,
    CONDITION_TYPE_CONSOLE_PLUGIN_READY, CONDITION_TYPE_RECONCILED, MESSAGE_ALL_DEPLOYED,
    MESSAGE_RECONCILED, STATUS_FALSE, STATUS_TRUE,
};
use anyhow::Result;
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Error surfaced to the controller runtime.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ReconcileError(#[from] anyhow::Error);

#[async_trait::async_trait]
impl FinalizerCleanup for OLSConfig {
    async fn cleanup(&self, client: &Client) -> Result<()> {
        remove_console_ui(client).await
    }
}

/// Result of one subsystem as seen by the status conditions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubsystemOutcome {
    Ready,
    Progressing,
    Failed(String),
}

/// Record the condition for one subsystem from its task result and the
/// rollout state of its Deployment.
pub async fn observe_subsystem(
    ctx: &Context,
    updater: &mut OLSConfigStatusUpdater,
    condition_type: &str,
    result: Result<(), TaskError>,
    deployment: &str,
) -> SubsystemOutcome {
    if let Err(e) = result {
        let message = e.to_string();
        updater.set_condition(condition_type, STATUS_FALSE, &failed_message(&message));
        return SubsystemOutcome::Failed(message);
    }

    match check_deployment_status(&ctx.client, ctx.namespace(), deployment).await {
        Ok(DeploymentHealth::Ready) => {
            updater.set_condition(condition_type, STATUS_TRUE, MESSAGE_ALL_DEPLOYED);
            SubsystemOutcome::Ready
        }
        Ok(DeploymentHealth::Progressing(detail)) => {
            debug!(deployment = %deployment, detail = %detail, "Deployment rolling out");
            updater.set_condition(condition_type, STATUS_FALSE, &in_progress_message(&detail));
            SubsystemOutcome::Progressing
        }
        Ok(DeploymentHealth::Failed(detail)) => {
            updater.set_condition(condition_type, STATUS_FALSE, &failed_message(&detail));
            SubsystemOutcome::Failed(detail)
        }
        Err(e) => {
            let message = format!("{e:#}");
            updater.set_condition(condition_type, STATUS_FALSE, &failed_message(&message));
            SubsystemOutcome::Failed(message)
        }
    }
}

/// One reconcile pass over the singleton `OLSConfig`.
///
/// # Errors
///
/// Returns an error if the finalizer or status cannot be written, or when
/// any subsystem failed.
pub async fn reconcile(ctx: &Context, cr: &OLSConfig) -> Result<Action> {
    let name = cr.name_any();
    if name != OLS_CONFIG_NAME {
        info!(name = %name, "Ignoring OLSConfig, only {} is reconciled", OLS_CONFIG_NAME);
        return Ok(Action::await_change());
    }

    if cr.metadata.deletion_timestamp.is_some() {
        handle_cluster_deletion(&ctx.client, cr, OLS_CONFIG_FINALIZER).await?;
        return Ok(Action::await_change());
    }

    ensure_cluster_finalizer(&ctx.client, cr, OLS_CONFIG_FINALIZER).await?;

    let mut updater = OLSConfigStatusUpdater::new(cr);
    let mut outcomes = Vec::new();

    if cr.spec.ols.deployment.console.enabled {
        let result = reconcile_console_ui(ctx, cr).await;
        outcomes.push(
            observe_subsystem(
                ctx,
                &mut updater,
                CONDITION_TYPE_CONSOLE_PLUGIN_READY,
                result,
                CONSOLE_UI_NAME,
            )
            .await,
        );
    } else {
        info!("Console plugin disabled, removing it");
        if let Err(e) = delete_console_ui_resources(ctx).await {
            outcomes.push(SubsystemOutcome::Failed(format!("{e:#}")));
        }
    }

    let result = reconcile_postgres(ctx, cr).await;
    outcomes.push(
        observe_subsystem(
            ctx,
            &mut updater,
            CONDITION_TYPE_CACHE_READY,
            result,
            POSTGRES_DEPLOYMENT_NAME,
        )
        .await,
    );

    let result = reconcile_app_server(ctx, cr).await;
    outcomes.push(
        observe_subsystem(
            ctx,
            &mut updater,
            CONDITION_TYPE_API_READY,
            result,
            APP_SERVER_DEPLOYMENT_NAME,
        )
        .await,
    );

    let failures: Vec<String> = outcomes
        .iter()
        .filter_map(|o| match o {
            SubsystemOutcome::Failed(message) => Some(message.clone()),
            _ => None,
        })
        .collect();
    let progressing = outcomes.contains(&SubsystemOutcome::Progressing);

    if failures.is_empty() && !progressing {
        updater.set_condition(CONDITION_TYPE_RECONCILED, STATUS_TRUE, MESSAGE_RECONCILED);
    } else if !failures.is_empty() {
        updater.set_condition(
            CONDITION_TYPE_RECONCILED,
            STATUS_FALSE,
            &failed_message(&failures.join("; ")),
        );
    }

    updater.apply(&ctx.client).await?;

    if !failures.is_empty() {
        anyhow::bail!("reconcile failed: {}", failures.join("; "));
    }
    if progressing {
        metrics::record_reconciliation_requeue(KIND_OLS_CONFIG);
        return Ok(Action::requeue(Duration::from_secs(ERROR_REQUEUE_DURATION_SECS)));
    }
    Ok(Action::requeue(ctx.options.reconcile_interval))
}

/// Controller entry point for `OLSConfig`.
///
/// # Errors
///
/// Returns [`ReconcileError`] when the pass failed; the error policy requeues.
pub async fn reconcile_olsconfig(
    cr: Arc<OLSConfig>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let start = Instant::now();
    debug!(name = %cr.name_any(), generation = ?cr.metadata.generation, "Reconciling OLSConfig");

    match reconcile(&ctx, &cr).await {
        Ok(action) => {
            metrics::record_reconciliation_success(KIND_OLS_CONFIG, start.elapsed());
            info!(name = %cr.name_any(), "Successfully reconciled OLSConfig");
            Ok(action)
        }
        Err(e) => {
            metrics::record_reconciliation_error(KIND_OLS_CONFIG, start.elapsed());
            error!(name = %cr.name_any(), error = %format!("{e:#}"), "Failed to reconcile OLSConfig");
            Err(e.into())
        }
    }
}

/// Requeue a failed pass after a fixed delay.
pub fn error_policy(cr: Arc<OLSConfig>, err: &ReconcileError, _ctx: Arc<Context>) -> Action {
    warn!(name = %cr.name_any(), error = %err, "Requeueing OLSConfig after error");
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_DURATION_SECS))
}

#[cfg(test)]
#[path = "olsconfig_tests.rs"]
mod olsconfig_tests;
