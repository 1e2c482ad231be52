// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Console plugin reconciliation.
//!
//! The plugin is an nginx Deployment serving the UI bundle, registered with
//! the OpenShift console through a cluster-scoped `ConsolePlugin` and enabled
//! by listing it in the Console operator configuration. Disabling the console
//! (or deleting the `OLSConfig`) reverses the registration.

pub mod assets;

use crate::constants::{CONSOLE_CR_NAME, CONSOLE_UI_CERT_SECRET_NAME, CONSOLE_UI_NAME};
use crate::context::Context;
use crate::crd::OLSConfig;
use crate::reconcilers::deployment::create_or_update_deployment;
use crate::reconcilers::resources::{
    create_or_update, delete_if_exists, get_optional, is_not_found, network_policy_equal,
    require_tls_secret, service_equal,
};
use crate::reconcilers::retry::retry_on_conflict;
use crate::reconcilers::tasks::{run_phases, ReconcileTask, TaskError};
use anyhow::{Context as _, Result};
use futures::FutureExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use kube::api::{DeleteParams, DynamicObject, PostParams};
use kube::{Api, Client, ResourceExt};
use tracing::{debug, info};

use assets::{
    console_operator_resource, console_plugin, console_plugin_resource, console_ui_config_map,
    console_ui_deployment, console_ui_network_policy, console_ui_service, enabled_plugins,
    set_enabled_plugins,
};

/// Subsystem label used in logs and metrics.
pub const SUBSYSTEM: &str = "console";

pub const RESOURCE_TASKS: [ReconcileTask; 2] = [
    ReconcileTask {
        name: "reconcile Console Plugin ConfigMap",
        run: |c, r| reconcile_console_ui_config_map(c, r).boxed(),
    },
    ReconcileTask {
        name: "reconcile Console Plugin NetworkPolicy",
        run: |c, r| reconcile_console_ui_network_policy(c, r).boxed(),
    },
];

pub const DEPLOYMENT_TASKS: [ReconcileTask; 5] = [
    ReconcileTask {
        name: "reconcile Console Plugin Deployment",
        run: |c, r| reconcile_console_ui_deployment(c, r).boxed(),
    },
    ReconcileTask {
        name: "reconcile Console Plugin Service",
        run: |c, r| reconcile_console_ui_service(c, r).boxed(),
    },
    ReconcileTask {
        name: "reconcile Console Plugin TLS Certs",
        run: |c, _| reconcile_console_ui_tls_secret(c).boxed(),
    },
    ReconcileTask {
        name: "reconcile Console Plugin",
        run: |c, r| reconcile_console_plugin(c, r).boxed(),
    },
    ReconcileTask {
        name: "activate Console Plugin",
        run: |c, _| activate_console_ui(&c.client).boxed(),
    },
];

/// Reconcile the whole console plugin subsystem.
///
/// # Errors
///
/// Returns the failed tasks of the resource phase, or the first failure of
/// the deployment phase.
pub async fn reconcile_console_ui(ctx: &Context, cr: &OLSConfig) -> Result<(), TaskError> {
    info!("Reconciling console plugin");
    run_phases(ctx, cr, SUBSYSTEM, &RESOURCE_TASKS, &DEPLOYMENT_TASKS).await?;
    info!("Console plugin reconciled");
    Ok(())
}

/// # Errors
///
/// Returns an error if generation or an API call fails.
pub async fn reconcile_console_ui_config_map(ctx: &Context, cr: &OLSConfig) -> Result<()> {
    let desired = console_ui_config_map(cr, ctx.namespace())?;
    create_or_update(
        &ctx.client,
        ctx.namespace(),
        &desired,
        |live: &ConfigMap, want: &ConfigMap| live.data == want.data,
        |live, want| live.data.clone_from(&want.data),
    )
    .await?;
    Ok(())
}

/// # Errors
///
/// Returns an error if generation or an API call fails.
pub async fn reconcile_console_ui_network_policy(ctx: &Context, cr: &OLSConfig) -> Result<()> {
    let desired = console_ui_network_policy(cr, ctx.namespace())?;
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
/// Returns an error if generation or an API call fails.
pub async fn reconcile_console_ui_deployment(ctx: &Context, cr: &OLSConfig) -> Result<()> {
    let desired = console_ui_deployment(cr, ctx.namespace(), &ctx.options.console_image)
        .context("failed to generate Console Plugin deployment")?;
    create_or_update_deployment(ctx, &desired, &[]).await
}

/// Create the Service, or update it when its ports, selector or serving
/// certificate annotation drifted.
///
/// # Errors
///
/// Returns an error if generation or an API call fails.
pub async fn reconcile_console_ui_service(ctx: &Context, cr: &OLSConfig) -> Result<()> {
    let desired = console_ui_service(cr, ctx.namespace())?;
    create_or_update(
        &ctx.client,
        ctx.namespace(),
        &desired,
        |live: &Service, want: &Service| {
            service_equal(live, want) && live.annotations() == want.annotations()
        },
        |live, want| {
            live.metadata.labels.clone_from(&want.metadata.labels);
            live.metadata.annotations.clone_from(&want.metadata.annotations);
            if let (Some(live_spec), Some(want_spec)) = (live.spec.as_mut(), want.spec.as_ref()) {
                live_spec.selector.clone_from(&want_spec.selector);
                live_spec.ports.clone_from(&want_spec.ports);
            }
        },
    )
    .await?;
    Ok(())
}

/// # Errors
///
/// Fails while the serving certificate has not been issued.
pub async fn reconcile_console_ui_tls_secret(ctx: &Context) -> Result<()> {
    require_tls_secret(&ctx.client, ctx.namespace(), CONSOLE_UI_CERT_SECRET_NAME).await?;
    Ok(())
}

/// Create the `ConsolePlugin`, or replace it when its spec drifted.
///
/// # Errors
///
/// Returns an error if generation or an API call fails.
pub async fn reconcile_console_plugin(ctx: &Context, cr: &OLSConfig) -> Result<()> {
    let desired = console_plugin(cr, ctx.namespace())?;
    let api: Api<DynamicObject> = Api::all_with(ctx.client.clone(), &console_plugin_resource());

    let Some(live) = get_optional(&api, CONSOLE_UI_NAME)
        .await
        .context("failed to get Console Plugin")?
    else {
        api.create(&PostParams::default(), &desired)
            .await
            .context("failed to create Console Plugin")?;
        info!(plugin = %CONSOLE_UI_NAME, "Created ConsolePlugin");
        return Ok(());
    };

    if live.data["spec"] == desired.data["spec"] {
        debug!(plugin = %CONSOLE_UI_NAME, "ConsolePlugin unchanged, skipped");
        return Ok(());
    }

    let mut updated = live;
    updated.data["spec"] = desired.data["spec"].clone();
    api.replace(CONSOLE_UI_NAME, &PostParams::default(), &updated)
        .await
        .context("failed to update Console Plugin")?;
    info!(plugin = %CONSOLE_UI_NAME, "Updated ConsolePlugin");
    Ok(())
}

/// Add the plugin to the Console operator's enabled plugin list.
///
/// Read-modify-write, retried on conflict.
///
/// # Errors
///
/// Returns an error if the Console operator configuration cannot be read or
/// updated.
pub async fn activate_console_ui(client: &Client) -> Result<()> {
    let api: Api<DynamicObject> = Api::all_with(client.clone(), &console_operator_resource());
    retry_on_conflict(
        || {
            let api = api.clone();
            async move {
                let mut console = api.get(CONSOLE_CR_NAME).await?;
                let mut plugins = enabled_plugins(&console);
                if plugins.iter().any(|p| p == CONSOLE_UI_NAME) {
                    debug!("Console plugin already enabled");
                    return Ok(console);
                }
                plugins.push(CONSOLE_UI_NAME.to_string());
                set_enabled_plugins(&mut console, &plugins);
                let updated = api
                    .replace(CONSOLE_CR_NAME, &PostParams::default(), &console)
                    .await?;
                info!(plugin = %CONSOLE_UI_NAME, "Enabled console plugin");
                Ok(updated)
            }
        },
        "activate Console Plugin",
    )
    .await?;
    Ok(())
}

/// Remove the plugin from the Console operator's enabled plugin list.
///
/// A missing Console operator configuration counts as deactivated.
///
/// # Errors
///
/// Returns an error if the configuration cannot be read or updated.
pub async fn deactivate_console_ui(client: &Client) -> Result<()> {
    let api: Api<DynamicObject> = Api::all_with(client.clone(), &console_operator_resource());
    retry_on_conflict(
        || {
            let api = api.clone();
            async move {
                let Some(mut console) = get_optional(&api, CONSOLE_CR_NAME).await? else {
                    debug!("Console operator configuration not found, nothing to deactivate");
                    return Ok(());
                };
                let plugins = enabled_plugins(&console);
                if !plugins.iter().any(|p| p == CONSOLE_UI_NAME) {
                    return Ok(());
                }
                let remaining: Vec<String> =
                    plugins.into_iter().filter(|p| p != CONSOLE_UI_NAME).collect();
                set_enabled_plugins(&mut console, &remaining);
                api.replace(CONSOLE_CR_NAME, &PostParams::default(), &console)
                    .await?;
                info!(plugin = %CONSOLE_UI_NAME, "Disabled console plugin");
                Ok(())
            }
        },
        "deactivate Console Plugin",
    )
    .await
}

/// Delete the `ConsolePlugin`, tolerating its absence.
///
/// # Errors
///
/// Returns an error if the delete fails for a reason other than HTTP 404.
pub async fn delete_console_plugin(client: &Client) -> Result<()> {
    let api: Api<DynamicObject> = Api::all_with(client.clone(), &console_plugin_resource());
    match api.delete(CONSOLE_UI_NAME, &DeleteParams::default()).await {
        Ok(_) => {
            info!(plugin = %CONSOLE_UI_NAME, "Deleted ConsolePlugin");
            Ok(())
        }
        Err(e) if is_not_found(&e) => {
            debug!(plugin = %CONSOLE_UI_NAME, "ConsolePlugin already absent");
            Ok(())
        }
        Err(e) => Err(e).context("failed to delete Console Plugin"),
    }
}

/// Unregister the plugin from the console: deactivate, then delete the
/// `ConsolePlugin`.
///
/// # Errors
///
/// Returns `failed to {step}: {cause}` for the first step that fails.
pub async fn remove_console_ui(client: &Client) -> Result<()> {
    deactivate_console_ui(client)
        .await
        .map_err(|e| anyhow::anyhow!("failed to deactivate Console Plugin: {e:#}"))?;
    delete_console_plugin(client)
        .await
        .map_err(|e| anyhow::anyhow!("failed to delete Console Plugin: {e:#}"))?;
    info!("Console plugin removed");
    Ok(())
}

/// Tear the console plugin down after it was disabled in the CR.
///
/// # Errors
///
/// Returns an error if a delete fails for a reason other than HTTP 404.
pub async fn delete_console_ui_resources(ctx: &Context) -> Result<()> {
    let ns = ctx.namespace();
    remove_console_ui(&ctx.client).await?;
    delete_if_exists::<Deployment>(&ctx.client, ns, CONSOLE_UI_NAME).await?;
    delete_if_exists::<Service>(&ctx.client, ns, CONSOLE_UI_NAME).await?;
    delete_if_exists::<ConfigMap>(&ctx.client, ns, CONSOLE_UI_NAME).await?;
    delete_if_exists::<NetworkPolicy>(&ctx.client, ns, CONSOLE_UI_NAME).await?;
    Ok(())
}
