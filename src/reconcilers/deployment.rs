// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Deployment update and restart policy.
//!
//! Generated Deployments are compared with the live object on the fields the
//! operator owns only. Server-populated defaults are applied to the desired
//! spec first so they never show up as a difference.
//!
//! A Deployment may also depend on objects it does not embed (credentials
//! Secret, configuration ConfigMap). The resource version of each such
//! dependency is stored as an annotation on the Deployment when it is
//! generated; a different live version forces an update and a rolling
//! restart even when the spec is unchanged.

use crate::constants::{FORCE_RELOAD_ANNOTATION, VOLUME_DEFAULT_MODE, VOLUME_RESTRICTED_MODE};
use crate::context::Context;
use crate::fingerprint::{
    get_configmap_resource_version, get_secret_resource_version, version_changed,
};
use crate::metrics;
use crate::reconcilers::resources::{create_resource, get_optional, replace_resource};
use anyhow::{Context as _, Result};
use chrono::{SecondsFormat, Utc};
use k8s_openapi::api::apps::v1::{
    Deployment, DeploymentSpec, DeploymentStrategy, RollingUpdateDeployment,
};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, EmptyDirVolumeSource, EnvVar, PodTemplateSpec, Probe,
    ResourceRequirements, SecretVolumeSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{Api, Client, ResourceExt};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Kubernetes default for `spec.replicas`
const DEFAULT_REPLICAS: i32 = 1;

/// Kubernetes default for `maxSurge` and `maxUnavailable`
const DEFAULT_ROLLING_UPDATE_PERCENT: &str = "25%";

/// Kubernetes default for `spec.revisionHistoryLimit`
const DEFAULT_REVISION_HISTORY_LIMIT: i32 = 10;

/// Kubernetes default for `spec.progressDeadlineSeconds`
const DEFAULT_PROGRESS_DEADLINE_SECONDS: i32 = 600;

// ============================================================================
// Tracked dependencies
// ============================================================================

/// Kind of object a Deployment depends on without embedding it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DependencyKind {
    Secret,
    ConfigMap,
}

/// An externally-owned object whose resource version is stored on the
/// consuming Deployment under `annotation`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackedDependency {
    pub annotation: String,
    pub kind: DependencyKind,
    pub name: String,
}

impl TrackedDependency {
    #[must_use]
    pub fn secret(annotation: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            annotation: annotation.into(),
            kind: DependencyKind::Secret,
            name: name.into(),
        }
    }

    #[must_use]
    pub fn config_map(annotation: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            annotation: annotation.into(),
            kind: DependencyKind::ConfigMap,
            name: name.into(),
        }
    }

    /// Live resource version, `None` when the object does not exist.
    ///
    /// # Errors
    ///
    /// Returns the API error for any failure other than "not found".
    pub async fn resource_version(
        &self,
        client: &Client,
        namespace: &str,
    ) -> Result<Option<String>, kube::Error> {
        match self.kind {
            DependencyKind::Secret => {
                get_secret_resource_version(client, namespace, &self.name).await
            }
            DependencyKind::ConfigMap => {
                get_configmap_resource_version(client, namespace, &self.name).await
            }
        }
    }
}

/// Read the current resource version of every dependency, keyed by annotation.
///
/// Dependencies that do not exist yet are left out.
///
/// # Errors
///
/// Returns an error if any lookup fails for a reason other than "not found".
pub async fn capture_versions(
    client: &Client,
    namespace: &str,
    tracked: &[TrackedDependency],
) -> Result<BTreeMap<String, String>> {
    let mut versions = BTreeMap::new();
    for dep in tracked {
        let version = dep
            .resource_version(client, namespace)
            .await
            .with_context(|| format!("failed to get resource version of {}", dep.name))?;
        if let Some(version) = version {
            versions.insert(dep.annotation.clone(), version);
        }
    }
    Ok(versions)
}

/// Whether any tracked dependency moved away from the version stored on `existing`.
///
/// A failed lookup counts as a change.
pub async fn dependencies_changed(
    client: &Client,
    namespace: &str,
    existing: &Deployment,
    tracked: &[TrackedDependency],
) -> bool {
    let annotations = existing.annotations();
    for dep in tracked {
        let stored = annotations.get(&dep.annotation).map(String::as_str);
        let observed = dep.resource_version(client, namespace).await;
        if version_changed(stored, &observed) {
            debug!(
                deployment = %existing.name_any(),
                dependency = %dep.name,
                stored = ?stored,
                observed = ?observed.as_ref().ok(),
                "Tracked dependency changed"
            );
            return true;
        }
    }
    false
}

// ============================================================================
// Defaulting
// ============================================================================

/// Fill in the values the API server would default, leaving set values alone.
pub fn set_deployment_defaults(spec: &mut DeploymentSpec) {
    if spec.replicas.is_none() {
        spec.replicas = Some(DEFAULT_REPLICAS);
    }

    let strategy = spec.strategy.get_or_insert_with(DeploymentStrategy::default);
    if strategy.type_.is_none() {
        strategy.type_ = Some("RollingUpdate".to_string());
    }
    if strategy.type_.as_deref() == Some("RollingUpdate") {
        let rolling = strategy
            .rolling_update
            .get_or_insert_with(RollingUpdateDeployment::default);
        if rolling.max_surge.is_none() {
            rolling.max_surge = Some(IntOrString::String(
                DEFAULT_ROLLING_UPDATE_PERCENT.to_string(),
            ));
        }
        if rolling.max_unavailable.is_none() {
            rolling.max_unavailable = Some(IntOrString::String(
                DEFAULT_ROLLING_UPDATE_PERCENT.to_string(),
            ));
        }
    }

    if spec.revision_history_limit.is_none() {
        spec.revision_history_limit = Some(DEFAULT_REVISION_HISTORY_LIMIT);
    }
    if spec.progress_deadline_seconds.is_none() {
        spec.progress_deadline_seconds = Some(DEFAULT_PROGRESS_DEADLINE_SECONDS);
    }
}

// ============================================================================
// Semantic equality
// ============================================================================

/// Compare two Deployment specs on operator-owned fields.
///
/// Resource quantities are compared by value. Pod template annotations are
/// not compared, so the restart annotation never causes an update by itself.
#[must_use]
pub fn deployment_spec_equal(a: &DeploymentSpec, b: &DeploymentSpec) -> bool {
    if a.replicas != b.replicas
        || a.strategy != b.strategy
        || a.revision_history_limit != b.revision_history_limit
        || a.selector.match_labels.clone().unwrap_or_default()
            != b.selector.match_labels.clone().unwrap_or_default()
        || a.selector.match_expressions.clone().unwrap_or_default()
            != b.selector.match_expressions.clone().unwrap_or_default()
    {
        return false;
    }
    pod_template_equal(&a.template, &b.template)
}

fn pod_template_equal(a: &PodTemplateSpec, b: &PodTemplateSpec) -> bool {
    let labels = |t: &PodTemplateSpec| {
        t.metadata
            .as_ref()
            .and_then(|m| m.labels.clone())
            .unwrap_or_default()
    };
    if labels(a) != labels(b) {
        return false;
    }

    let (Some(pa), Some(pb)) = (a.spec.as_ref(), b.spec.as_ref()) else {
        return a.spec.is_none() && b.spec.is_none();
    };

    pa.service_account_name == pb.service_account_name
        && pa.node_selector.clone().unwrap_or_default()
            == pb.node_selector.clone().unwrap_or_default()
        && pa.tolerations.clone().unwrap_or_default() == pb.tolerations.clone().unwrap_or_default()
        && pod_volumes_equal(
            pa.volumes.as_deref().unwrap_or_default(),
            pb.volumes.as_deref().unwrap_or_default(),
        )
        && containers_equal(
            pa.init_containers.as_deref().unwrap_or_default(),
            pb.init_containers.as_deref().unwrap_or_default(),
        )
        && containers_equal(&pa.containers, &pb.containers)
}

/// Compare containers pairwise by position.
#[must_use]
pub fn containers_equal(a: &[Container], b: &[Container]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(ca, cb)| container_equal(ca, cb))
}

fn container_equal(a: &Container, b: &Container) -> bool {
    a.name == b.name
        && a.image == b.image
        && a.ports.clone().unwrap_or_default() == b.ports.clone().unwrap_or_default()
        && a.args.clone().unwrap_or_default() == b.args.clone().unwrap_or_default()
        && resources_equal(a.resources.as_ref(), b.resources.as_ref())
        && a.security_context == b.security_context
        && a.image_pull_policy == b.image_pull_policy
        && env_equal(
            a.env.as_deref().unwrap_or_default(),
            b.env.as_deref().unwrap_or_default(),
        )
        && volume_mounts_equal(
            a.volume_mounts.as_deref().unwrap_or_default(),
            b.volume_mounts.as_deref().unwrap_or_default(),
        )
        && probe_equal(a.liveness_probe.as_ref(), b.liveness_probe.as_ref())
        && probe_equal(a.readiness_probe.as_ref(), b.readiness_probe.as_ref())
        && probe_equal(a.startup_probe.as_ref(), b.startup_probe.as_ref())
}

fn resources_equal(a: Option<&ResourceRequirements>, b: Option<&ResourceRequirements>) -> bool {
    quantity_maps_equal(
        a.and_then(|r| r.requests.as_ref()),
        b.and_then(|r| r.requests.as_ref()),
    ) && quantity_maps_equal(
        a.and_then(|r| r.limits.as_ref()),
        b.and_then(|r| r.limits.as_ref()),
    ) && a.and_then(|r| r.claims.as_ref()) == b.and_then(|r| r.claims.as_ref())
}

fn quantity_maps_equal(
    a: Option<&BTreeMap<String, Quantity>>,
    b: Option<&BTreeMap<String, Quantity>>,
) -> bool {
    let empty = BTreeMap::new();
    let (a, b) = (a.unwrap_or(&empty), b.unwrap_or(&empty));
    a.len() == b.len()
        && a
            .iter()
            .all(|(name, qa)| b.get(name).is_some_and(|qb| quantities_equal(qa, qb)))
}

/// Compare two resource quantities by value.
///
/// The API server stores quantities in canonical form (`0.5` becomes `500m`,
/// `1024Mi` becomes `1Gi`). Quantities that do not parse are compared as
/// strings.
#[must_use]
pub fn quantities_equal(a: &Quantity, b: &Quantity) -> bool {
    match (quantity_nanos(&a.0), quantity_nanos(&b.0)) {
        (Some(x), Some(y)) => x == y,
        _ => a.0 == b.0,
    }
}

/// Value of a quantity in units of 10^-9, rounded up.
///
/// Accepts decimal SI suffixes (`n` to `E`), binary suffixes (`Ki` to `Ei`)
/// and decimal exponents (`1e3`). Returns `None` on malformed input or
/// overflow.
#[must_use]
pub fn quantity_nanos(quantity: &str) -> Option<i128> {
    let quantity = quantity.trim();
    let split = quantity
        .find(|c: char| !(c.is_ascii_digit() || matches!(c, '.' | '+' | '-')))
        .unwrap_or(quantity.len());
    let (number, suffix) = quantity.split_at(split);

    let (exp10, exp2): (i32, u32) = match suffix {
        "" => (0, 0),
        "n" => (-9, 0),
        "u" => (-6, 0),
        "m" => (-3, 0),
        "k" => (3, 0),
        "M" => (6, 0),
        "G" => (9, 0),
        "T" => (12, 0),
        "P" => (15, 0),
        "E" => (18, 0),
        "Ki" => (0, 10),
        "Mi" => (0, 20),
        "Gi" => (0, 30),
        "Ti" => (0, 40),
        "Pi" => (0, 50),
        "Ei" => (0, 60),
        s if s.starts_with(['e', 'E']) => (s[1..].parse().ok()?, 0),
        _ => return None,
    };

    let (negative, digits) = match number.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, number.strip_prefix('+').unwrap_or(number)),
    };
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }

    let mut mantissa: i128 = 0;
    for c in whole.chars().chain(fraction.chars()) {
        let digit = i128::from(c.to_digit(10)?);
        mantissa = mantissa.checked_mul(10)?.checked_add(digit)?;
    }
    mantissa = mantissa.checked_mul(1i128.checked_shl(exp2)?)?;

    let scale = 9 + exp10 - i32::try_from(fraction.len()).ok()?;
    let value = if scale >= 0 {
        mantissa.checked_mul(10i128.checked_pow(scale.unsigned_abs())?)?
    } else {
        let divisor = 10i128.checked_pow(scale.unsigned_abs())?;
        (mantissa + divisor - 1) / divisor
    };
    Some(if negative { -value } else { value })
}

/// Compare environment variables by name, ignoring order.
#[must_use]
pub fn env_equal(a: &[EnvVar], b: &[EnvVar]) -> bool {
    let by_name = |vars: &[EnvVar]| -> BTreeMap<String, EnvVar> {
        vars.iter().map(|v| (v.name.clone(), v.clone())).collect()
    };
    a.len() == b.len() && by_name(a) == by_name(b)
}

/// Compare volume mounts by name, ignoring order.
#[must_use]
pub fn volume_mounts_equal(a: &[VolumeMount], b: &[VolumeMount]) -> bool {
    let by_name = |mounts: &[VolumeMount]| -> BTreeMap<String, VolumeMount> {
        mounts.iter().map(|m| (m.name.clone(), m.clone())).collect()
    };
    a.len() == b.len() && by_name(a) == by_name(b)
}

/// Compare pod volumes by name and source identity.
///
/// Only the identity of the source is compared (Secret name, ConfigMap name,
/// `emptyDir` medium, claim name); modes and other defaulted fields are not.
/// Sources of any other kind never compare equal.
#[must_use]
pub fn pod_volumes_equal(a: &[Volume], b: &[Volume]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(va, vb)| volume_equal(va, vb))
}

fn volume_equal(a: &Volume, b: &Volume) -> bool {
    if a.name != b.name {
        return false;
    }
    if let (Some(sa), Some(sb)) = (&a.secret, &b.secret) {
        return sa.secret_name == sb.secret_name;
    }
    if let (Some(ca), Some(cb)) = (&a.config_map, &b.config_map) {
        return ca.name == cb.name;
    }
    if let (Some(ea), Some(eb)) = (&a.empty_dir, &b.empty_dir) {
        return ea.medium.as_deref().unwrap_or_default() == eb.medium.as_deref().unwrap_or_default();
    }
    if let (Some(pa), Some(pb)) = (&a.persistent_volume_claim, &b.persistent_volume_claim) {
        return pa.claim_name == pb.claim_name;
    }
    false
}

/// Compare probes.
///
/// The handler and `terminationGracePeriodSeconds` must match. Timing and
/// threshold fields are compared only when both sides set a non-zero value.
#[must_use]
pub fn probe_equal(a: Option<&Probe>, b: Option<&Probe>) -> bool {
    let (pa, pb) = match (a, b) {
        (None, None) => return true,
        (Some(pa), Some(pb)) => (pa, pb),
        _ => return false,
    };

    let int_equal = |x: Option<i32>, y: Option<i32>| {
        let (x, y) = (x.unwrap_or(0), y.unwrap_or(0));
        x == 0 || y == 0 || x == y
    };

    pa.exec == pb.exec
        && pa.http_get == pb.http_get
        && pa.tcp_socket == pb.tcp_socket
        && pa.grpc == pb.grpc
        && int_equal(pa.initial_delay_seconds, pb.initial_delay_seconds)
        && int_equal(pa.period_seconds, pb.period_seconds)
        && int_equal(pa.timeout_seconds, pb.timeout_seconds)
        && int_equal(pa.success_threshold, pb.success_threshold)
        && int_equal(pa.failure_threshold, pb.failure_threshold)
        && pa.termination_grace_period_seconds == pb.termination_grace_period_seconds
}

// ============================================================================
// Pod building blocks
// ============================================================================

/// `emptyDir` volume.
#[must_use]
pub fn empty_dir_volume(name: &str) -> Volume {
    Volume {
        name: name.to_string(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    }
}

/// Volume named `secret-{secret_name}`, readable by the owner only.
#[must_use]
pub fn secret_volume(secret_name: &str) -> Volume {
    Volume {
        name: format!("secret-{secret_name}"),
        secret: Some(SecretVolumeSource {
            secret_name: Some(secret_name.to_string()),
            default_mode: Some(VOLUME_RESTRICTED_MODE),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// ConfigMap volume with the default file mode.
#[must_use]
pub fn config_map_volume(name: &str, config_map: &str) -> Volume {
    Volume {
        name: name.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: config_map.to_string(),
            default_mode: Some(VOLUME_DEFAULT_MODE),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[must_use]
pub fn volume_mount(name: &str, mount_path: &str) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: mount_path.to_string(),
        ..Default::default()
    }
}

/// Read-only variant of [`volume_mount`].
#[must_use]
pub fn read_only_mount(name: &str, mount_path: &str) -> VolumeMount {
    VolumeMount {
        read_only: Some(true),
        ..volume_mount(name, mount_path)
    }
}

#[must_use]
pub fn env_var(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        value_from: None,
    }
}

// ============================================================================
// Update and restart
// ============================================================================

/// Stamp the pod template with a fresh restart timestamp.
pub fn apply_force_reload(template: &mut PodTemplateSpec) {
    template
        .metadata
        .get_or_insert_with(Default::default)
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(
            FORCE_RELOAD_ANNOTATION.to_string(),
            Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
        );
}

/// Update `existing` towards `desired` when the spec or a tracked dependency changed.
///
/// On update the desired spec replaces the live one, the tracked annotations
/// are copied from `desired`, and the pod template gets a fresh restart
/// timestamp. The live `resourceVersion` is kept, so a concurrent writer makes
/// the update fail rather than be overwritten.
///
/// Returns `true` when the Deployment was updated.
///
/// # Errors
///
/// Returns an error if the desired Deployment has no spec or the update fails.
pub async fn update_deployment(
    ctx: &Context,
    existing: &Deployment,
    desired: &Deployment,
    tracked: &[TrackedDependency],
) -> Result<bool> {
    let name = existing.name_any();
    let namespace = ctx.namespace();

    let mut desired_spec = desired
        .spec
        .clone()
        .ok_or_else(|| anyhow::anyhow!("desired Deployment {name} has no spec"))?;
    set_deployment_defaults(&mut desired_spec);

    let spec_changed = existing
        .spec
        .as_ref()
        .is_none_or(|live| !deployment_spec_equal(live, &desired_spec));
    let changed =
        spec_changed || dependencies_changed(&ctx.client, namespace, existing, tracked).await;

    if !changed {
        debug!(deployment = %name, namespace = %namespace, "Deployment unchanged, skipped");
        return Ok(false);
    }

    let mut updated = existing.clone();
    let desired_annotations = desired.annotations();
    let annotations = updated.annotations_mut();
    for dep in tracked {
        match desired_annotations.get(&dep.annotation) {
            Some(version) => {
                annotations.insert(dep.annotation.clone(), version.clone());
            }
            None => {
                annotations.remove(&dep.annotation);
            }
        }
    }

    apply_force_reload(&mut desired_spec.template);
    updated.spec = Some(desired_spec);

    info!(
        deployment = %name,
        namespace = %namespace,
        spec_changed = spec_changed,
        "Deployment changed, rolling restart"
    );
    replace_resource(&ctx.client, namespace, &updated).await?;
    metrics::record_deployment_restart(&name);

    Ok(true)
}

/// Create `desired` when absent, otherwise apply the update policy.
///
/// # Errors
///
/// Returns an error if the lookup, create or update fails.
pub async fn create_or_update_deployment(
    ctx: &Context,
    desired: &Deployment,
    tracked: &[TrackedDependency],
) -> Result<()> {
    let name = desired.name_any();
    let api: Api<Deployment> = Api::namespaced(ctx.client.clone(), ctx.namespace());

    match get_optional(&api, &name)
        .await
        .with_context(|| format!("failed to get Deployment {name}"))?
    {
        None => {
            create_resource(&ctx.client, ctx.namespace(), desired).await?;
        }
        Some(existing) => {
            update_deployment(ctx, &existing, desired, tracked).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "deployment_tests.rs"]
mod deployment_tests;
