// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Watches on objects the operator reads but does not own.
//!
//! LLM provider credentials and the additional CA bundle are created by the
//! user. The operator marks each of them with the watcher annotation the
//! first time it reads them; events on marked objects then trigger a
//! reconcile of the singleton `OLSConfig`.

use crate::constants::{OLS_CONFIG_NAME, WATCHER_ANNOTATION};
use crate::crd::OLSConfig;
use anyhow::{Context as _, Result};
use kube::api::{Patch, PatchParams};
use kube::core::NamespaceResourceScope;
use kube::runtime::reflector::ObjectRef;
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::fmt::Debug;
use tracing::debug;

/// True when the object carries the watcher annotation for the singleton CR.
pub fn is_watched<K: Resource>(obj: &K) -> bool {
    obj.meta()
        .annotations
        .as_ref()
        .and_then(|a| a.get(WATCHER_ANNOTATION))
        .is_some_and(|v| v == OLS_CONFIG_NAME)
}

/// Map a watched Secret or ConfigMap to the singleton CR.
///
/// Unannotated objects map to nothing.
pub fn watched_object_mapper<K: Resource>(obj: K) -> Option<ObjectRef<OLSConfig>> {
    is_watched(&obj).then(|| ObjectRef::new(OLS_CONFIG_NAME))
}

/// Add the watcher annotation to `obj` unless it is already present.
///
/// Returns `true` when a patch was sent.
///
/// # Errors
///
/// Returns an error if the patch fails.
pub async fn annotate_watcher<K>(client: &Client, namespace: &str, obj: &K) -> Result<bool>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + DeserializeOwned,
{
    if is_watched(obj) {
        return Ok(false);
    }

    let name = obj.name_any();
    let api: Api<K> = Api::namespaced(client.clone(), namespace);
    let patch = json!({
        "metadata": { "annotations": { WATCHER_ANNOTATION: OLS_CONFIG_NAME } }
    });
    api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .with_context(|| format!("failed to annotate {} {name}", K::kind(&())))?;
    debug!(kind = %K::kind(&()), name = %name, "Added watcher annotation");
    Ok(true)
}

#[cfg(test)]
#[path = "watchers_tests.rs"]
mod watchers_tests;
