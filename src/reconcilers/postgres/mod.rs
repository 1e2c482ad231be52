// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Postgres conversation cache reconciliation.
//!
//! ## Phases
//!
//! 1. ConfigMap, bootstrap Secret, credentials Secret and NetworkPolicy.
//!    These are independent; every task runs and failures are reported
//!    together.
//! 2. PVC, Deployment and Service. The Deployment reads the password out of
//!    the credentials Secret, so this phase runs only after phase 1 succeeded
//!    and stops at the first failure.
//!
//! ## Credentials
//!
//! The password is generated once and never rewritten while present. Its
//! SHA-256 is kept in the `hash/postgres-secret` annotation of the Secret;
//! a mismatch means the password was edited out of band and only the
//! annotation is refreshed. The Deployment notices the edit through the
//! Secret's resource version. A user-supplied Secret is not owned by the CR
//! and gets the watcher annotation instead.

pub mod assets;
pub mod deployment;

use crate::constants::{
    OLS_CONFIG_NAME, POSTGRES_CONFIGMAP_NAME, POSTGRES_SECRET_HASH_ANNOTATION,
    POSTGRES_SECRET_KEY_NAME, WATCHER_ANNOTATION,
};
use crate::context::Context;
use crate::crd::OLSConfig;
use crate::fingerprint::hash_bytes;
use crate::reconcilers::deployment::create_or_update_deployment;
use crate::reconcilers::resources::{
    create_or_update, create_resource, ensure_exists, get_optional, is_owned_by,
    network_policy_equal, replace_resource, ApplyOutcome,
};
use crate::reconcilers::tasks::{run_phases, ReconcileTask, TaskError};
use crate::watchers::{annotate_watcher, is_watched};
use anyhow::{Context as _, Result};
use futures::FutureExt;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::ByteString;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams};
use kube::{Api, ResourceExt};
use serde_json::json;
use tracing::{debug, info};

use assets::{
    credentials_selector, generate_password, postgres_bootstrap_secret, postgres_config_map,
    postgres_network_policy, postgres_pvc, postgres_secret, postgres_service, resolve_storage,
    secret_password,
};
use deployment::{generate_postgres_deployment, postgres_tracked_dependencies};

/// Subsystem label used in logs and metrics.
pub const SUBSYSTEM: &str = "postgres";

/// Independent Postgres tasks.
pub const RESOURCE_TASKS: [ReconcileTask; 4] = [
    ReconcileTask {
        name: "reconcile Postgres ConfigMap",
        run: |c, r| reconcile_postgres_config_map(c, r).boxed(),
    },
    ReconcileTask {
        name: "reconcile Postgres Bootstrap Secret",
        run: |c, r| reconcile_postgres_bootstrap_secret(c, r).boxed(),
    },
    ReconcileTask {
        name: "reconcile Postgres Secret",
        run: |c, r| reconcile_postgres_secret(c, r).boxed(),
    },
    ReconcileTask {
        name: "reconcile Postgres Network Policy",
        run: |c, r| reconcile_postgres_network_policy(c, r).boxed(),
    },
];

/// Postgres tasks that depend on the resource tasks, in order.
pub const DEPLOYMENT_TASKS: [ReconcileTask; 3] = [
    ReconcileTask {
        name: "reconcile Postgres PVC",
        run: |c, r| reconcile_postgres_pvc(c, r).boxed(),
    },
    ReconcileTask {
        name: "reconcile Postgres Deployment",
        run: |c, r| reconcile_postgres_deployment(c, r).boxed(),
    },
    ReconcileTask {
        name: "reconcile Postgres Service",
        run: |c, r| reconcile_postgres_service(c, r).boxed(),
    },
];

/// Reconcile the whole Postgres subsystem.
///
/// # Errors
///
/// Returns the failed tasks of the resource phase, or the first failure of
/// the deployment phase.
pub async fn reconcile_postgres(ctx: &Context, cr: &OLSConfig) -> Result<(), TaskError> {
    info!("Reconciling Postgres conversation cache");
    run_phases(ctx, cr, SUBSYSTEM, &RESOURCE_TASKS, &DEPLOYMENT_TASKS).await?;
    info!("Postgres conversation cache reconciled");
    Ok(())
}

/// Create the server configuration, or rewrite its data when it drifted.
///
/// # Errors
///
/// Returns an error if generation or an API call fails.
pub async fn reconcile_postgres_config_map(ctx: &Context, cr: &OLSConfig) -> Result<()> {
    let desired = postgres_config_map(cr, ctx.namespace())?;
    let outcome = create_or_update(
        &ctx.client,
        ctx.namespace(),
        &desired,
        |live: &ConfigMap, want: &ConfigMap| live.data == want.data,
        |live: &mut ConfigMap, want: &ConfigMap| live.data.clone_from(&want.data),
    )
    .await?;
    debug!(configmap = %POSTGRES_CONFIGMAP_NAME, outcome = ?outcome, "Postgres ConfigMap reconciled");
    Ok(())
}

/// Create the bootstrap Secret when absent.
///
/// # Errors
///
/// Returns an error if generation or an API call fails.
pub async fn reconcile_postgres_bootstrap_secret(ctx: &Context, cr: &OLSConfig) -> Result<()> {
    let desired = postgres_bootstrap_secret(cr, ctx.namespace())?;
    ensure_exists(&ctx.client, ctx.namespace(), &desired).await?;
    Ok(())
}

/// Delete every operator-generated credentials Secret.
///
/// Runs before a credentials Secret is created so that a renamed Secret does
/// not leave the previous one behind.
///
/// # Errors
///
/// Returns an error if the delete-collection call fails.
pub async fn delete_old_postgres_secrets(ctx: &Context) -> Result<()> {
    let api: Api<Secret> = Api::namespaced(ctx.client.clone(), ctx.namespace());
    let selector = credentials_selector();
    info!(selector = %selector, "Deleting old Postgres secrets");
    api.delete_collection(
        &DeleteParams::default(),
        &ListParams::default().labels(&selector),
    )
    .await
    .context("failed to delete old Postgres secrets")?;
    Ok(())
}

/// Ensure the credentials Secret holds a password and a matching hash.
///
/// # Errors
///
/// Returns an error if an API call fails.
pub async fn reconcile_postgres_secret(ctx: &Context, cr: &OLSConfig) -> Result<()> {
    let namespace = ctx.namespace();
    let name = cr
        .spec
        .ols
        .conversation_cache
        .postgres
        .credentials_secret_name();
    let api: Api<Secret> = Api::namespaced(ctx.client.clone(), namespace);

    let Some(existing) = get_optional(&api, name)
        .await
        .with_context(|| format!("failed to get Postgres secret {name}"))?
    else {
        delete_old_postgres_secrets(ctx).await?;
        let secret = postgres_secret(cr, namespace, name, &generate_password())?;
        create_resource(&ctx.client, namespace, &secret).await?;
        return Ok(());
    };

    // A Secret supplied by the user is not owned, so only the watcher
    // annotation brings its edits to the controller.
    let user_supplied = !is_owned_by(&existing, cr);
    let watcher_missing = user_supplied && !is_watched(&existing);

    let Some(password) = secret_password(&existing) else {
        info!(secret = %name, "Postgres secret has no password, generating one");
        let password = generate_password();
        let mut updated = existing;
        if watcher_missing {
            updated
                .annotations_mut()
                .insert(WATCHER_ANNOTATION.to_string(), OLS_CONFIG_NAME.to_string());
        }
        updated
            .data
            .get_or_insert_with(Default::default)
            .insert(
                POSTGRES_SECRET_KEY_NAME.to_string(),
                ByteString(password.as_bytes().to_vec()),
            );
        updated.annotations_mut().insert(
            POSTGRES_SECRET_HASH_ANNOTATION.to_string(),
            hash_bytes(password.as_bytes()),
        );
        replace_resource(&ctx.client, namespace, &updated).await?;
        return Ok(());
    };

    let hash = hash_bytes(password.as_bytes());
    if existing.annotations().get(POSTGRES_SECRET_HASH_ANNOTATION) == Some(&hash) {
        if watcher_missing {
            annotate_watcher(&ctx.client, namespace, &existing).await?;
        } else {
            debug!(secret = %name, "Postgres secret unchanged, skipped");
        }
        return Ok(());
    }

    info!(secret = %name, "Postgres secret edited out of band, refreshing hash");
    let mut annotations = serde_json::Map::new();
    annotations.insert(POSTGRES_SECRET_HASH_ANNOTATION.to_string(), json!(hash));
    if watcher_missing {
        annotations.insert(WATCHER_ANNOTATION.to_string(), json!(OLS_CONFIG_NAME));
    }
    let patch = json!({ "metadata": { "annotations": annotations } });
    api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .with_context(|| format!("failed to update Postgres secret {name}"))?;
    Ok(())
}

/// Create the NetworkPolicy, or update it when labels or spec drifted.
///
/// # Errors
///
/// Returns an error if generation or an API call fails.
pub async fn reconcile_postgres_network_policy(ctx: &Context, cr: &OLSConfig) -> Result<()> {
    let desired = postgres_network_policy(cr, ctx.namespace())?;
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

/// Create the data PVC when storage is configured.
///
/// Storage defaults resolved here are written back into the CR.
///
/// # Errors
///
/// Fails when no storage class can be resolved or an API call fails.
pub async fn reconcile_postgres_pvc(ctx: &Context, cr: &OLSConfig) -> Result<()> {
    let Some(storage) = cr.spec.ols.storage.as_ref() else {
        return Ok(());
    };

    let resolved = resolve_storage(&ctx.client, storage).await?;
    if &resolved != storage {
        info!(
            size = ?resolved.size,
            class = ?resolved.class,
            "Writing resolved storage defaults back to OLSConfig"
        );
        let api: Api<OLSConfig> = Api::all(ctx.client.clone());
        let patch = json!({ "spec": { "ols": { "storage": resolved } } });
        api.patch(&cr.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .context("failed to write storage defaults to OLSConfig")?;
    }

    let pvc = postgres_pvc(cr, ctx.namespace(), &resolved)?;
    if ensure_exists(&ctx.client, ctx.namespace(), &pvc).await? == ApplyOutcome::Unchanged {
        debug!(pvc = %pvc.name_any(), "Postgres PVC exists, skipped");
    }
    Ok(())
}

/// Generate the Deployment and create it or run the update policy.
///
/// # Errors
///
/// Fails when the password is missing or an API call fails.
pub async fn reconcile_postgres_deployment(ctx: &Context, cr: &OLSConfig) -> Result<()> {
    let desired = generate_postgres_deployment(ctx, cr)
        .await
        .context("failed to generate Postgres deployment")?;
    create_or_update_deployment(ctx, &desired, &postgres_tracked_dependencies(cr)).await
}

/// Create the Service when absent.
///
/// # Errors
///
/// Returns an error if generation or an API call fails.
pub async fn reconcile_postgres_service(ctx: &Context, cr: &OLSConfig) -> Result<()> {
    let desired = postgres_service(cr, ctx.namespace())?;
    ensure_exists(&ctx.client, ctx.namespace(), &desired).await?;
    Ok(())
}
