// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Application server reconciliation.
//!
//! Phase 1 writes the configuration file and verifies the user-supplied
//! inputs (provider credentials, additional CA bundle). Phase 2 rolls out the
//! Deployment, which restarts whenever a mounted input changes (the
//! `olsconfig` ConfigMap, Postgres or provider credentials, CA bundles, a
//! user-supplied serving certificate), then checks the Service and the
//! serving certificate.

pub mod assets;
pub mod config;
pub mod deployment;

use crate::constants::{OLS_CONFIGMAP_NAME, OLS_CONFIG_HASH_ANNOTATION};
use crate::context::Context;
use crate::crd::OLSConfig;
use crate::reconcilers::deployment::create_or_update_deployment;
use crate::reconcilers::resources::{
    create_or_update, ensure_exists, get_optional, network_policy_equal, require_tls_secret,
    service_equal,
};
use crate::reconcilers::tasks::{run_phases, ReconcileTask, TaskError};
use crate::watchers::annotate_watcher;
use anyhow::{Context as _, Result};
use futures::FutureExt;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::{Api, ResourceExt};
use std::collections::BTreeSet;
use tracing::{debug, info};

use assets::{
    app_server_network_policy, app_server_service, app_server_service_account,
    collect_extra_cas, ols_config_map, tls_secret_name,
};
use deployment::{app_server_tracked_dependencies, generate_app_server_deployment};

/// Subsystem label used in logs and metrics.
pub const SUBSYSTEM: &str = "appserver";

pub const RESOURCE_TASKS: [ReconcileTask; 5] = [
    ReconcileTask {
        name: "reconcile app server ServiceAccount",
        run: |c, r| reconcile_service_account(c, r).boxed(),
    },
    ReconcileTask {
        name: "reconcile OLS ConfigMap",
        run: |c, r| reconcile_ols_config_map(c, r).boxed(),
    },
    ReconcileTask {
        name: "reconcile additional CA ConfigMap",
        run: |c, r| reconcile_additional_ca_config_map(c, r).boxed(),
    },
    ReconcileTask {
        name: "reconcile LLM provider Secrets",
        run: |c, r| reconcile_llm_secrets(c, r).boxed(),
    },
    ReconcileTask {
        name: "reconcile app server Network Policy",
        run: |c, r| reconcile_app_server_network_policy(c, r).boxed(),
    },
];

pub const DEPLOYMENT_TASKS: [ReconcileTask; 3] = [
    ReconcileTask {
        name: "reconcile app server Deployment",
        run: |c, r| reconcile_app_server_deployment(c, r).boxed(),
    },
    ReconcileTask {
        name: "reconcile app server Service",
        run: |c, r| reconcile_app_server_service(c, r).boxed(),
    },
    ReconcileTask {
        name: "reconcile app server TLS Secret",
        run: |c, r| reconcile_tls_secret(c, r).boxed(),
    },
];

/// Reconcile the whole application server subsystem.
///
/// # Errors
///
/// Returns the failed tasks of the resource phase, or the first failure of
/// the deployment phase.
pub async fn reconcile_app_server(ctx: &Context, cr: &OLSConfig) -> Result<(), TaskError> {
    info!("Reconciling application server");
    run_phases(ctx, cr, SUBSYSTEM, &RESOURCE_TASKS, &DEPLOYMENT_TASKS).await?;
    info!("Application server reconciled");
    Ok(())
}

/// # Errors
///
/// Returns an error if generation or an API call fails.
pub async fn reconcile_service_account(ctx: &Context, cr: &OLSConfig) -> Result<()> {
    let desired = app_server_service_account(cr, ctx.namespace())?;
    ensure_exists(&ctx.client, ctx.namespace(), &desired).await?;
    Ok(())
}

fn config_hash(cm: &ConfigMap) -> Option<&String> {
    cm.annotations().get(OLS_CONFIG_HASH_ANNOTATION)
}

/// Regenerate `olsconfig.yaml` and replace the ConfigMap when its content
/// hash differs.
///
/// # Errors
///
/// Returns an error if the CA lookup, generation or an API call fails.
pub async fn reconcile_ols_config_map(ctx: &Context, cr: &OLSConfig) -> Result<()> {
    let extra_cas = collect_extra_cas(&ctx.client, ctx.namespace(), cr).await?;
    let desired = ols_config_map(cr, ctx.namespace(), extra_cas)?;
    let outcome = create_or_update(
        &ctx.client,
        ctx.namespace(),
        &desired,
        |live: &ConfigMap, want: &ConfigMap| {
            config_hash(live) == config_hash(want) && live.data == want.data
        },
        |live: &mut ConfigMap, want: &ConfigMap| {
            live.data.clone_from(&want.data);
            if let Some(hash) = config_hash(want) {
                live.annotations_mut()
                    .insert(OLS_CONFIG_HASH_ANNOTATION.to_string(), hash.clone());
            }
        },
    )
    .await?;
    debug!(configmap = %OLS_CONFIGMAP_NAME, outcome = ?outcome, "OLS ConfigMap reconciled");
    Ok(())
}

/// Verify the additional CA ConfigMap exists and mark it as watched.
///
/// # Errors
///
/// Fails when the referenced ConfigMap does not exist or an API call fails.
pub async fn reconcile_additional_ca_config_map(ctx: &Context, cr: &OLSConfig) -> Result<()> {
    let Some(name) = cr.spec.ols.additional_ca_name() else {
        return Ok(());
    };
    let api: Api<ConfigMap> = Api::namespaced(ctx.client.clone(), ctx.namespace());
    let Some(cm) = get_optional(&api, name)
        .await
        .with_context(|| format!("failed to get additional CA ConfigMap {name}"))?
    else {
        anyhow::bail!("additional CA ConfigMap {name} not found");
    };
    annotate_watcher(&ctx.client, ctx.namespace(), &cm).await?;
    Ok(())
}

/// Verify every provider credentials Secret exists and mark it as watched.
///
/// # Errors
///
/// Fails on the first missing Secret or failed API call.
pub async fn reconcile_llm_secrets(ctx: &Context, cr: &OLSConfig) -> Result<()> {
    let api: Api<Secret> = Api::namespaced(ctx.client.clone(), ctx.namespace());
    let names: BTreeSet<&str> = cr
        .spec
        .llm
        .providers
        .iter()
        .map(|p| p.credentials_secret_ref.name.as_str())
        .filter(|n| !n.is_empty())
        .collect();

    for name in names {
        let Some(secret) = get_optional(&api, name)
            .await
            .with_context(|| format!("failed to get LLM provider secret {name}"))?
        else {
            anyhow::bail!("LLM provider secret {name} not found");
        };
        annotate_watcher(&ctx.client, ctx.namespace(), &secret).await?;
    }
    Ok(())
}

/// # Errors
///
/// Returns an error if generation or an API call fails.
pub async fn reconcile_app_server_network_policy(ctx: &Context, cr: &OLSConfig) -> Result<()> {
    let desired = app_server_network_policy(cr, ctx.namespace())?;
    create_or_update(
        &ctx.client,
        ctx.namespace(),
        &desired,
        network_policy_equal,
        |live, want| {
            live.metadata.labels.clone_from(&want.metadata.labels);
            live.spec.clone_from(&want.spec);
        },
    )
    .await?;
    Ok(())
}

/// # Errors
///
/// Returns an error if a dependency lookup or an API call fails.
pub async fn reconcile_app_server_deployment(ctx: &Context, cr: &OLSConfig) -> Result<()> {
    let desired = generate_app_server_deployment(ctx, cr)
        .await
        .context("failed to generate app server deployment")?;
    create_or_update_deployment(ctx, &desired, &app_server_tracked_dependencies(cr)).await
}

/// Create the Service, or update it when labels, selector or ports drifted.
///
/// # Errors
///
/// Returns an error if generation or an API call fails.
pub async fn reconcile_app_server_service(ctx: &Context, cr: &OLSConfig) -> Result<()> {
    let desired = app_server_service(cr, ctx.namespace())?;
    create_or_update(
        &ctx.client,
        ctx.namespace(),
        &desired,
        service_equal,
        |live, want| {
            live.metadata.labels.clone_from(&want.metadata.labels);
            if let (Some(live_spec), Some(want_spec)) = (live.spec.as_mut(), want.spec.as_ref()) {
                live_spec.selector.clone_from(&want_spec.selector);
                live_spec.ports.clone_from(&want_spec.ports);
            }
        },
    )
    .await?;
    Ok(())
}

/// Verify the serving certificate Secret holds a certificate and a key.
///
/// A user-supplied certificate Secret is also marked as watched.
///
/// # Errors
///
/// Fails while the Secret is missing or incomplete.
pub async fn reconcile_tls_secret(ctx: &Context, cr: &OLSConfig) -> Result<()> {
    let secret = require_tls_secret(&ctx.client, ctx.namespace(), tls_secret_name(cr)).await?;
    if cr.spec.ols.tls_secret_name().is_some() {
        annotate_watcher(&ctx.client, ctx.namespace(), &secret).await?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
