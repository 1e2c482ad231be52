// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Generic resource helpers for Kubernetes resources.
//!
//! This module provides the lookups and mutations every reconcile task is
//! built from: a not-found tolerant get, create, replace and delete, plus the
//! owner reference that ties each managed object to the `OLSConfig`.
//!
//! # Example
//!
//! ```rust,no_run
//! use lightspeed_operator::reconcilers::resources::{create_resource, get_optional};
//! use k8s_openapi::api::core::v1::ServiceAccount;
//! use kube::{Api, Client};
//! use anyhow::Result;
//!
//! async fn example(client: &Client, sa: ServiceAccount) -> Result<()> {
//!     let api: Api<ServiceAccount> = Api::namespaced(client.clone(), "openshift-lightspeed");
//!     if get_optional(&api, "lightspeed-app-server").await?.is_none() {
//!         create_resource(client, "openshift-lightspeed", &sa).await?;
//!     }
//!     Ok(())
//! }
//! ```

use crate::crd::OLSConfig;
use crate::metrics;
use anyhow::{Context as _, Result};
use k8s_openapi::api::core::v1::{Secret, Service};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::api::{DeleteParams, PostParams};
use kube::core::NamespaceResourceScope;
use kube::{Api, Client, Resource, ResourceExt};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Whether a kube error is an HTTP 404 from the API server.
#[must_use]
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

/// Get a resource, mapping "not found" to `None`.
///
/// # Errors
///
/// Returns the API error for any failure other than HTTP 404.
pub async fn get_optional<T>(api: &Api<T>, name: &str) -> Result<Option<T>, kube::Error>
where
    T: Resource + Clone + std::fmt::Debug + serde::de::DeserializeOwned,
{
    match api.get(name).await {
        Ok(obj) => Ok(Some(obj)),
        Err(e) if is_not_found(&e) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Controller owner reference pointing at the `OLSConfig`.
///
/// Every managed object carries it so deleting the CR cascades.
///
/// # Errors
///
/// Returns an error if the `OLSConfig` has not been persisted yet (no UID).
pub fn owner_reference(cr: &OLSConfig) -> Result<OwnerReference> {
    cr.controller_owner_ref(&())
        .ok_or_else(|| anyhow::anyhow!("OLSConfig {} has no uid", cr.name_any()))
}

/// Whether `obj` carries an owner reference to `cr`.
#[must_use]
pub fn is_owned_by<K: Resource>(obj: &K, cr: &OLSConfig) -> bool {
    let Some(uid) = cr.meta().uid.as_deref() else {
        return false;
    };
    obj.owner_references().iter().any(|r| r.uid == uid)
}

/// Object metadata shared by every generated namespaced object.
///
/// # Errors
///
/// Returns an error if the owner reference cannot be built.
pub fn owned_metadata(
    cr: &OLSConfig,
    name: &str,
    namespace: &str,
    labels: BTreeMap<String, String>,
) -> Result<ObjectMeta> {
    Ok(ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(labels),
        owner_references: Some(vec![owner_reference(cr)?]),
        ..Default::default()
    })
}

/// Create a namespaced resource.
///
/// # Errors
///
/// Returns an error if the resource has no name or the API call fails.
pub async fn create_resource<T>(client: &Client, namespace: &str, resource: &T) -> Result<T>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + ResourceExt
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + for<'de> serde::Deserialize<'de>,
{
    let name = resource
        .meta()
        .name
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("Resource must have a name"))?;

    let api: Api<T> = Api::namespaced(client.clone(), namespace);

    debug!(
        namespace = %namespace,
        name = %name,
        kind = %T::kind(&()),
        "Creating resource"
    );

    let created = api
        .create(&PostParams::default(), resource)
        .await
        .with_context(|| format!("failed to create {} {namespace}/{name}", T::kind(&())))?;
    metrics::record_resource_created(&T::kind(&()));
    info!("Created {} {}/{}", T::kind(&()), namespace, name);

    Ok(created)
}

/// Replace a namespaced resource.
///
/// The caller passes the existing object with its desired changes merged in,
/// so the `resourceVersion` it carries makes this an optimistic-concurrency
/// update that fails on a conflicting writer.
///
/// # Errors
///
/// Returns an error if the resource has no name or the API call fails.
pub async fn replace_resource<T>(client: &Client, namespace: &str, resource: &T) -> Result<T>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + ResourceExt
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + for<'de> serde::Deserialize<'de>,
{
    let name = resource
        .meta()
        .name
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("Resource must have a name"))?;

    let api: Api<T> = Api::namespaced(client.clone(), namespace);

    info!("Updating {} {}/{}", T::kind(&()), namespace, name);
    let replaced = api
        .replace(name, &PostParams::default(), resource)
        .await
        .with_context(|| format!("failed to update {} {namespace}/{name}", T::kind(&())))?;
    metrics::record_resource_updated(&T::kind(&()));

    Ok(replaced)
}

/// Delete a namespaced resource, tolerating its absence.
///
/// Returns `true` when a delete was issued, `false` when the object was
/// already gone.
///
/// # Errors
///
/// Returns an error if the API call fails for a reason other than HTTP 404.
pub async fn delete_if_exists<T>(client: &Client, namespace: &str, name: &str) -> Result<bool>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + std::fmt::Debug
        + serde::de::DeserializeOwned,
{
    let api: Api<T> = Api::namespaced(client.clone(), namespace);
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => {
            metrics::record_resource_deleted(&T::kind(&()));
            info!("Deleted {} {}/{}", T::kind(&()), namespace, name);
            Ok(true)
        }
        Err(e) if is_not_found(&e) => {
            debug!("{} {}/{} already absent", T::kind(&()), namespace, name);
            Ok(false)
        }
        Err(e) => Err(e)
            .with_context(|| format!("failed to delete {} {namespace}/{name}", T::kind(&()))),
    }
}

/// What a reconcile step did to a resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Create `desired` when absent; leave an existing object untouched.
///
/// # Errors
///
/// Returns an error if the lookup or create fails.
pub async fn ensure_exists<T>(client: &Client, namespace: &str, desired: &T) -> Result<ApplyOutcome>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + ResourceExt
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + for<'de> serde::Deserialize<'de>,
{
    let name = desired.name_any();
    let api: Api<T> = Api::namespaced(client.clone(), namespace);

    if get_optional(&api, &name)
        .await
        .with_context(|| format!("failed to get {} {namespace}/{name}", T::kind(&())))?
        .is_some()
    {
        debug!("{} {}/{} exists, skipped", T::kind(&()), namespace, name);
        return Ok(ApplyOutcome::Unchanged);
    }

    create_resource(client, namespace, desired).await?;
    Ok(ApplyOutcome::Created)
}

/// Create `desired` when absent, otherwise update the live object when it
/// differs on the fields `equal` compares.
///
/// `merge` copies the desired fields onto the live object, which keeps its
/// `resourceVersion` for the optimistic-concurrency replace.
///
/// # Errors
///
/// Returns an error if the lookup, create or update fails.
pub async fn create_or_update<T, E, M>(
    client: &Client,
    namespace: &str,
    desired: &T,
    equal: E,
    merge: M,
) -> Result<ApplyOutcome>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + ResourceExt
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + for<'de> serde::Deserialize<'de>,
    E: Fn(&T, &T) -> bool,
    M: FnOnce(&mut T, &T),
{
    let name = desired.name_any();
    let api: Api<T> = Api::namespaced(client.clone(), namespace);

    let Some(existing) = get_optional(&api, &name)
        .await
        .with_context(|| format!("failed to get {} {namespace}/{name}", T::kind(&())))?
    else {
        create_resource(client, namespace, desired).await?;
        return Ok(ApplyOutcome::Created);
    };

    if equal(&existing, desired) {
        debug!("{} {}/{} unchanged, skipped", T::kind(&()), namespace, name);
        return Ok(ApplyOutcome::Unchanged);
    }

    let mut updated = existing;
    merge(&mut updated, desired);
    replace_resource(client, namespace, &updated).await?;
    Ok(ApplyOutcome::Updated)
}

/// Fetch the Secret `name`, failing unless it holds a non-empty `tls.crt`
/// and `tls.key`.
///
/// Serving certificates are issued asynchronously by the service-CA
/// controller; the next reconcile pass checks again.
///
/// # Errors
///
/// Fails while the Secret is missing or incomplete, or the lookup fails.
pub async fn require_tls_secret(client: &Client, namespace: &str, name: &str) -> Result<Secret> {
    let api: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let Some(secret) = get_optional(&api, name)
        .await
        .with_context(|| format!("failed to get TLS secret {name}"))?
    else {
        anyhow::bail!("TLS secret {name} not found");
    };

    let data = secret.data.as_ref();
    for key in ["tls.crt", "tls.key"] {
        if data.and_then(|d| d.get(key)).is_none_or(|v| v.0.is_empty()) {
            anyhow::bail!("TLS secret {name} has no {key}");
        }
    }
    Ok(secret)
}

// ============================================================================
// Semantic equality of operator-owned fields
// ============================================================================

/// NetworkPolicies are equal when labels and spec match.
#[must_use]
pub fn network_policy_equal(a: &NetworkPolicy, b: &NetworkPolicy) -> bool {
    a.metadata.labels == b.metadata.labels && a.spec == b.spec
}

/// Services are equal when labels, selector and ports match.
///
/// Server-assigned fields (cluster IP, session affinity, IP families) are
/// ignored.
#[must_use]
pub fn service_equal(a: &Service, b: &Service) -> bool {
    let spec_a = a.spec.as_ref();
    let spec_b = b.spec.as_ref();
    a.metadata.labels == b.metadata.labels
        && spec_a.and_then(|s| s.selector.as_ref()) == spec_b.and_then(|s| s.selector.as_ref())
        && ports_equal(spec_a, spec_b)
}

fn ports_equal(
    a: Option<&k8s_openapi::api::core::v1::ServiceSpec>,
    b: Option<&k8s_openapi::api::core::v1::ServiceSpec>,
) -> bool {
    let ports_a = a.and_then(|s| s.ports.as_ref()).map_or(&[][..], Vec::as_slice);
    let ports_b = b.and_then(|s| s.ports.as_ref()).map_or(&[][..], Vec::as_slice);
    ports_a.len() == ports_b.len()
        && ports_a.iter().zip(ports_b).all(|(pa, pb)| {
            pa.name == pb.name
                && pa.port == pb.port
                && pa.protocol.as_deref().unwrap_or("TCP") == pb.protocol.as_deref().unwrap_or("TCP")
                && pa.target_port == pb.target_port
        })
}

#[cfg(test)]
#[path = "resources_tests.rs"]
mod resources_tests;
