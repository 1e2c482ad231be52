// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Finalizer management for cluster-scoped custom resources.
//!
//! Namespaced operand objects are reclaimed by owner references. Cluster-scoped
//! side effects (the `ConsolePlugin` and its entry in the Console operator
//! configuration) are not, so the `OLSConfig` carries a finalizer and its
//! [`FinalizerCleanup`] implementation undoes them before deletion completes.
//!
//! # Example
//!
//! ```rust,ignore
//! use lightspeed_operator::constants::OLS_CONFIG_FINALIZER;
//! use lightspeed_operator::reconcilers::finalizers::{ensure_cluster_finalizer, handle_cluster_deletion};
//!
//! async fn reconcile(client: Client, cr: OLSConfig) -> Result<()> {
//!     if cr.metadata.deletion_timestamp.is_some() {
//!         return handle_cluster_deletion(&client, &cr, OLS_CONFIG_FINALIZER).await;
//!     }
//!     ensure_cluster_finalizer(&client, &cr, OLS_CONFIG_FINALIZER).await?;
//!     // Normal reconciliation...
//!     Ok(())
//! }
//! ```

use anyhow::{Context as _, Result};
use kube::api::{Patch, PatchParams};
use kube::core::ClusterResourceScope;
use kube::{Api, Client, Resource, ResourceExt};
use serde_json::json;
use tracing::info;

/// Cleanup run before a finalizer is removed.
///
/// If `cleanup` fails the finalizer stays and deletion is retried on the next
/// reconciliation.
#[async_trait::async_trait]
pub trait FinalizerCleanup: Resource + ResourceExt + Clone {
    /// Undo side effects owner references do not reclaim.
    ///
    /// # Errors
    ///
    /// Returns an error if any cleanup step fails.
    async fn cleanup(&self, client: &Client) -> Result<()>;
}

fn has_finalizer<T: Resource>(resource: &T, finalizer: &str) -> bool {
    resource
        .meta()
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|existing| existing == finalizer))
}

/// Add a finalizer to a cluster-scoped resource if not already present.
///
/// # Errors
///
/// Returns an error if the API patch operation fails.
pub async fn ensure_cluster_finalizer<T>(
    client: &Client,
    resource: &T,
    finalizer: &str,
) -> Result<()>
where
    T: Resource<DynamicType = (), Scope = ClusterResourceScope>
        + ResourceExt
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + for<'de> serde::Deserialize<'de>,
{
    if has_finalizer(resource, finalizer) {
        return Ok(());
    }

    let name = resource.name_any();
    info!("Adding finalizer {} to {} {}", finalizer, T::kind(&()), name);

    let mut finalizers = resource.meta().finalizers.clone().unwrap_or_default();
    finalizers.push(finalizer.to_string());

    let api: Api<T> = Api::all(client.clone());
    let patch = json!({ "metadata": { "finalizers": finalizers } });
    api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .with_context(|| format!("failed to add finalizer to {} {name}", T::kind(&())))?;

    Ok(())
}

/// Remove a finalizer from a cluster-scoped resource if present.
///
/// # Errors
///
/// Returns an error if the API patch operation fails.
pub async fn remove_cluster_finalizer<T>(
    client: &Client,
    resource: &T,
    finalizer: &str,
) -> Result<()>
where
    T: Resource<DynamicType = (), Scope = ClusterResourceScope>
        + ResourceExt
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + for<'de> serde::Deserialize<'de>,
{
    if !has_finalizer(resource, finalizer) {
        return Ok(());
    }

    let name = resource.name_any();
    info!("Removing finalizer {} from {} {}", finalizer, T::kind(&()), name);

    let mut finalizers = resource.meta().finalizers.clone().unwrap_or_default();
    finalizers.retain(|f| f != finalizer);

    let api: Api<T> = Api::all(client.clone());
    let patch = json!({ "metadata": { "finalizers": finalizers } });
    api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .with_context(|| format!("failed to remove finalizer from {} {name}", T::kind(&())))?;

    Ok(())
}

/// Run cleanup, then remove the finalizer.
///
/// Does nothing when the finalizer is already gone.
///
/// # Errors
///
/// Returns an error if cleanup or the finalizer removal fails; the finalizer
/// then stays in place.
pub async fn handle_cluster_deletion<T>(
    client: &Client,
    resource: &T,
    finalizer: &str,
) -> Result<()>
where
    T: Resource<DynamicType = (), Scope = ClusterResourceScope>
        + ResourceExt
        + FinalizerCleanup
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + for<'de> serde::Deserialize<'de>,
{
    let name = resource.name_any();
    info!("{} {} is being deleted", T::kind(&()), name);

    if has_finalizer(resource, finalizer) {
        info!("Running cleanup for {} {}", T::kind(&()), name);
        resource.cleanup(client).await?;
        remove_cluster_finalizer(client, resource, finalizer).await?;
    }

    Ok(())
}

#[cfg(test)]
#[path = "finalizers_tests.rs"]
mod finalizers_tests;
