// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Status condition helpers for the `OLSConfig` resource.
//!
//! Conditions are collected in memory during a reconcile pass by
//! [`OLSConfigStatusUpdater`] and written once at the end. The write re-reads
//! the CR, merges the collected conditions into the live list and patches the
//! status subresource with the live `resourceVersion`, retrying on conflict.
//!
//! # Example
//!
//! ```rust,no_run
//! use lightspeed_operator::reconcilers::status::create_condition;
//!
//! let condition = create_condition(
//!     "CacheReady",
//!     "True",
//!     "Reconciling",
//!     "All components are successfully deployed",
//!     Some(3),
//! );
//! ```

use crate::crd::{Condition, OLSConfig};
use crate::reconcilers::resources::get_optional;
use crate::reconcilers::retry::retry_on_conflict;
use crate::status_reasons::REASON_RECONCILING;
use anyhow::{Context as _, Result};
use chrono::Utc;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use serde_json::json;
use tracing::debug;

/// Create a new condition stamped with the current time.
#[must_use]
pub fn create_condition(
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
    observed_generation: Option<i64>,
) -> Condition {
    Condition {
        r#type: condition_type.to_string(),
        status: status.to_string(),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        last_transition_time: Some(Utc::now().to_rfc3339()),
        observed_generation,
    }
}

/// Find a condition by type.
#[must_use]
pub fn find_condition<'a>(
    conditions: &'a [Condition],
    condition_type: &str,
) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == condition_type)
}

/// Update or add a condition in a conditions list (in-memory, no API call).
///
/// The existing `lastTransitionTime` is kept when the status is unchanged.
pub fn update_condition_in_memory(conditions: &mut Vec<Condition>, new_condition: &Condition) {
    if let Some(existing) = conditions
        .iter_mut()
        .find(|c| c.r#type == new_condition.r#type)
    {
        let last_transition_time = if existing.status == new_condition.status {
            existing
                .last_transition_time
                .clone()
                .or_else(|| new_condition.last_transition_time.clone())
        } else {
            new_condition.last_transition_time.clone()
        };

        *existing = Condition {
            last_transition_time,
            ..new_condition.clone()
        };
    } else {
        conditions.push(new_condition.clone());
    }
}

/// Compare two condition lists, ignoring `lastTransitionTime`.
#[must_use]
pub fn conditions_equal(current: &[Condition], new: &[Condition]) -> bool {
    current.len() == new.len()
        && new.iter().all(|new_cond| {
            find_condition(current, &new_cond.r#type).is_some_and(|curr| {
                curr.status == new_cond.status
                    && curr.reason == new_cond.reason
                    && curr.message == new_cond.message
                    && curr.observed_generation == new_cond.observed_generation
            })
        })
}

// ============================================================================
// Deployment readiness
// ============================================================================

/// Rollout state of an operand Deployment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeploymentHealth {
    /// All desired replicas are ready on the current generation.
    Ready,
    /// Still rolling out; the detail says why.
    Progressing(String),
    /// The Deployment reports `ReplicaFailure`.
    Failed(String),
}

/// Classify a Deployment from its status.
#[must_use]
pub fn deployment_health(deployment: &Deployment) -> DeploymentHealth {
    let Some(status) = deployment.status.as_ref() else {
        return DeploymentHealth::Progressing("Deployment has no status yet".to_string());
    };
    let conditions = status.conditions.as_deref().unwrap_or_default();
    let condition = |type_: &str| conditions.iter().find(|c| c.type_ == type_);

    if let Some(failure) = condition("ReplicaFailure").filter(|c| c.status == "True") {
        return DeploymentHealth::Failed(
            failure
                .message
                .clone()
                .unwrap_or_else(|| "replica failure".to_string()),
        );
    }

    let desired = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);
    let ready = status.ready_replicas.unwrap_or(0);
    if ready != desired {
        return DeploymentHealth::Progressing(format!("{ready}/{desired} replicas ready"));
    }

    if !condition("Available").is_some_and(|c| c.status == "True") {
        return DeploymentHealth::Progressing("Deployment is not available".to_string());
    }

    if let Some(progressing) = condition("Progressing").filter(|c| c.status == "False") {
        return DeploymentHealth::Progressing(
            progressing
                .message
                .clone()
                .unwrap_or_else(|| "Deployment is not progressing".to_string()),
        );
    }

    let generation = deployment.metadata.generation.unwrap_or(0);
    let observed = status.observed_generation.unwrap_or(0);
    if observed < generation {
        return DeploymentHealth::Progressing(format!(
            "waiting for rollout of generation {generation} (observed {observed})"
        ));
    }

    DeploymentHealth::Ready
}

/// Read a Deployment and classify its rollout state.
///
/// A missing Deployment counts as progressing.
///
/// # Errors
///
/// Returns an error if the Deployment cannot be read.
pub async fn check_deployment_status(
    client: &Client,
    namespace: &str,
    name: &str,
) -> Result<DeploymentHealth> {
    let api: Api<Deployment> = Api::namespaced(client.clone(), namespace);
    let deployment = get_optional(&api, name)
        .await
        .with_context(|| format!("failed to get Deployment {name}"))?;

    Ok(match deployment {
        Some(d) => deployment_health(&d),
        None => DeploymentHealth::Progressing(format!("Deployment {name} not found")),
    })
}

// ============================================================================
// Status updater
// ============================================================================

/// Collects condition changes for one reconcile pass and writes them once.
pub struct OLSConfigStatusUpdater {
    name: String,
    generation: Option<i64>,
    updates: Vec<Condition>,
}

impl OLSConfigStatusUpdater {
    #[must_use]
    pub fn new(cr: &OLSConfig) -> Self {
        Self {
            name: cr.name_any(),
            generation: cr.metadata.generation,
            updates: Vec::new(),
        }
    }

    /// Record a condition (in-memory only, no API call).
    pub fn set_condition(&mut self, condition_type: &str, status: &str, message: &str) {
        let condition = create_condition(
            condition_type,
            status,
            REASON_RECONCILING,
            message,
            self.generation,
        );
        update_condition_in_memory(&mut self.updates, &condition);
    }

    /// Conditions recorded so far.
    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.updates
    }

    /// Write the recorded conditions to the status subresource.
    ///
    /// Skips the write when the live conditions already match.
    ///
    /// # Errors
    ///
    /// Returns an error if the CR cannot be read or the status write keeps
    /// failing.
    pub async fn apply(&self, client: &Client) -> Result<()> {
        if self.updates.is_empty() {
            return Ok(());
        }

        let api: Api<OLSConfig> = Api::all(client.clone());
        retry_on_conflict(
            || {
                let api = api.clone();
                let name = self.name.clone();
                let updates = self.updates.clone();
                async move {
                    let current = api.get_status(&name).await?;
                    let existing = current
                        .status
                        .as_ref()
                        .map(|s| s.conditions.clone())
                        .unwrap_or_default();

                    let mut merged = existing.clone();
                    for condition in &updates {
                        update_condition_in_memory(&mut merged, condition);
                    }

                    if conditions_equal(&existing, &merged) {
                        debug!(name = %name, "OLSConfig status unchanged, skipping update");
                        return Ok(current);
                    }

                    let patch = json!({
                        "metadata": { "resourceVersion": current.resource_version() },
                        "status": { "conditions": merged }
                    });
                    api.patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
                        .await
                }
            },
            "update OLSConfig status",
        )
        .await?;

        debug!(
            name = %self.name,
            conditions = self.updates.len(),
            "Updated OLSConfig status"
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod status_tests;
