// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Change-detection primitives.
//!
//! Two strategies are used, chosen by who owns the input:
//!
//! - **Content hash** for data the operator generates itself (the Postgres
//!   password, `olsconfig.yaml`). The SHA-256 hex digest is stored next to the
//!   data so out-of-band edits are noticed.
//! - **Resource version** for objects consumed by a Deployment. The version
//!   read at generation time is stored on the consuming Deployment's
//!   annotations; a different version on the next pass means restart.
//!
//! Lookup failures other than "not found" always count as a change.

use crate::constants::{ANNOTATION_NAME_MAX_LEN, DEPENDENCY_VERSION_ANNOTATION_PREFIX};
use crate::reconcilers::resources::get_optional;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::{Api, Client, ResourceExt};
use sha2::{Digest, Sha256};

/// SHA-256 hex digest of `data`.
#[must_use]
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Annotation key holding the resource version of the `kind` object `name`.
///
/// Yields `ols.openshift.io/{kind}-{name}-version`. Names too long for an
/// annotation key segment are replaced by a prefix of their SHA-256.
#[must_use]
pub fn dependency_version_annotation(kind: &str, name: &str) -> String {
    let segment = format!("{kind}-{name}-version");
    if segment.len() <= ANNOTATION_NAME_MAX_LEN {
        return format!("{DEPENDENCY_VERSION_ANNOTATION_PREFIX}{segment}");
    }
    let digest = hash_bytes(name.as_bytes());
    format!("{DEPENDENCY_VERSION_ANNOTATION_PREFIX}{kind}-{}-version", &digest[..16])
}

/// Current resource version of a Secret; `None` when it does not exist.
///
/// # Errors
///
/// Returns the API error for any failure other than "not found".
pub async fn get_secret_resource_version(
    client: &Client,
    namespace: &str,
    name: &str,
) -> Result<Option<String>, kube::Error> {
    let api: Api<Secret> = Api::namespaced(client.clone(), namespace);
    Ok(get_optional(&api, name)
        .await?
        .and_then(|s| s.resource_version()))
}

/// Current resource version of a ConfigMap; `None` when it does not exist.
///
/// # Errors
///
/// Returns the API error for any failure other than "not found".
pub async fn get_configmap_resource_version(
    client: &Client,
    namespace: &str,
    name: &str,
) -> Result<Option<String>, kube::Error> {
    let api: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);
    Ok(get_optional(&api, name)
        .await?
        .and_then(|c| c.resource_version()))
}

/// Compare a stored fingerprint with an observed one.
///
/// Absence on one side only is a change. A failed lookup is a change.
#[must_use]
pub fn version_changed<E>(stored: Option<&str>, observed: &Result<Option<String>, E>) -> bool {
    match observed {
        Ok(current) => stored != current.as_deref(),
        Err(_) => true,
    }
}

#[cfg(test)]
#[path = "fingerprint_tests.rs"]
mod fingerprint_tests;
