// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Application server Deployment generation.

use crate::constants::{
    ADDITIONAL_CA_MOUNT_PATH, ADDITIONAL_CA_VERSION_ANNOTATION, ADDITIONAL_CA_VOLUME,
    APP_SERVER_CONTAINER_NAME, APP_SERVER_DEPLOYMENT_NAME, APP_SERVER_PORT,
    APP_SERVER_SERVICE_ACCOUNT_NAME, CERT_BUNDLE_MOUNT_PATH, CERT_BUNDLE_VOLUME,
    KUBE_ROOT_CA_CONFIGMAP, OLS_CONFIGMAP_NAME, OLS_CONFIGMAP_VERSION_ANNOTATION,
    OLS_CONFIG_FILENAME, OLS_CONFIG_MOUNT_ROOT, OLS_CONFIG_VOLUME, OPENSHIFT_CA_MOUNT_PATH,
    OPENSHIFT_CA_VOLUME, POSTGRES_SECRET_VERSION_ANNOTATION, TMP_VOLUME_MOUNT_PATH,
    TMP_VOLUME_NAME, USER_DATA_MOUNT_PATH,
};
use crate::context::Context;
use crate::crd::OLSConfig;
use crate::fingerprint::dependency_version_annotation;
use crate::labels::app_server_selector_labels;
use crate::reconcilers::appserver::assets::tls_secret_name;
use crate::reconcilers::appserver::config::{
    postgres_credentials_path, provider_credentials_path, POSTGRES_CA_MOUNT_PATH, TLS_MOUNT_PATH,
};
use crate::reconcilers::deployment::{
    capture_versions, config_map_volume, empty_dir_volume, env_var, read_only_mount,
    secret_volume, volume_mount, TrackedDependency,
};
use crate::reconcilers::postgres::deployment::{postgres_ca_volume, postgres_ca_volume_mount};
use crate::reconcilers::resources::owned_metadata;
use anyhow::Result;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, HTTPGetAction, PodSpec, PodTemplateSpec, Probe,
    ResourceRequirements, SecurityContext, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::{BTreeMap, BTreeSet};

const HTTPS_PORT_NAME: &str = "https";
const USER_DATA_VOLUME: &str = "ols-user-data";
const APP_SERVER_REVISION_HISTORY_LIMIT: i32 = 1;

/// Objects whose resource versions the app server Deployment records.
///
/// Everything the pod mounts from outside the operator is tracked: the
/// generated configuration, the Postgres credentials, the cluster root CA,
/// the additional CA bundle, each provider credentials Secret once, and the
/// user-supplied serving certificate.
#[must_use]
pub fn app_server_tracked_dependencies(cr: &OLSConfig) -> Vec<TrackedDependency> {
    let mut tracked = vec![
        TrackedDependency::config_map(OLS_CONFIGMAP_VERSION_ANNOTATION, OLS_CONFIGMAP_NAME),
        TrackedDependency::secret(
            POSTGRES_SECRET_VERSION_ANNOTATION,
            cr.spec.ols.conversation_cache.postgres.credentials_secret_name(),
        ),
        TrackedDependency::config_map(
            dependency_version_annotation("configmap", KUBE_ROOT_CA_CONFIGMAP),
            KUBE_ROOT_CA_CONFIGMAP,
        ),
    ];
    if let Some(name) = cr.spec.ols.additional_ca_name() {
        tracked.push(TrackedDependency::config_map(
            ADDITIONAL_CA_VERSION_ANNOTATION,
            name,
        ));
    }

    let mut seen = BTreeSet::new();
    for provider in &cr.spec.llm.providers {
        let secret = provider.credentials_secret_ref.name.as_str();
        if secret.is_empty() || !seen.insert(secret) {
            continue;
        }
        tracked.push(TrackedDependency::secret(
            dependency_version_annotation("secret", secret),
            secret,
        ));
    }

    if let Some(secret) = cr.spec.ols.tls_secret_name() {
        if seen.insert(secret) {
            tracked.push(TrackedDependency::secret(
                dependency_version_annotation("secret", secret),
                secret,
            ));
        }
    }
    tracked
}

/// Container resources from the CR, or the API defaults.
#[must_use]
pub fn api_resources(cr: &OLSConfig) -> ResourceRequirements {
    cr.spec
        .ols
        .deployment
        .api
        .resources
        .clone()
        .unwrap_or_else(|| ResourceRequirements {
            requests: Some(BTreeMap::from([
                ("cpu".to_string(), Quantity("500m".to_string())),
                ("memory".to_string(), Quantity("1Gi".to_string())),
            ])),
            limits: Some(BTreeMap::from([(
                "memory".to_string(),
                Quantity("4Gi".to_string()),
            )])),
            ..Default::default()
        })
}

fn https_probe(path: &str) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(path.to_string()),
            port: IntOrString::String(HTTPS_PORT_NAME.to_string()),
            scheme: Some("HTTPS".to_string()),
            ..Default::default()
        }),
        initial_delay_seconds: Some(30),
        period_seconds: Some(30),
        timeout_seconds: Some(30),
        failure_threshold: Some(15),
        ..Default::default()
    }
}

/// Volumes and mounts of the API container.
///
/// Each provider credentials Secret is mounted once, even when several
/// providers share it.
#[must_use]
pub fn app_server_volumes(cr: &OLSConfig) -> (Vec<Volume>, Vec<VolumeMount>) {
    let ols = &cr.spec.ols;
    let mut volumes = Vec::new();
    let mut mounts = Vec::new();

    let mut seen = BTreeSet::new();
    for provider in &cr.spec.llm.providers {
        let secret = provider.credentials_secret_ref.name.as_str();
        if secret.is_empty() || !seen.insert(secret) {
            continue;
        }
        let volume = secret_volume(secret);
        mounts.push(read_only_mount(
            &volume.name,
            &provider_credentials_path(provider),
        ));
        volumes.push(volume);
    }

    let tls = secret_volume(tls_secret_name(cr));
    mounts.push(read_only_mount(&tls.name, TLS_MOUNT_PATH));
    volumes.push(tls);

    let pg_secret = ols.conversation_cache.postgres.credentials_secret_name();
    let credentials = secret_volume(pg_secret);
    mounts.push(read_only_mount(
        &credentials.name,
        &postgres_credentials_path(pg_secret),
    ));
    volumes.push(credentials);

    volumes.push(config_map_volume(OLS_CONFIG_VOLUME, OLS_CONFIGMAP_NAME));
    mounts.push(read_only_mount(OLS_CONFIG_VOLUME, OLS_CONFIG_MOUNT_ROOT));

    let collection = &ols.user_data_collection;
    if !collection.feedback_disabled || !collection.transcripts_disabled {
        volumes.push(empty_dir_volume(USER_DATA_VOLUME));
        mounts.push(volume_mount(USER_DATA_VOLUME, USER_DATA_MOUNT_PATH));
    }

    volumes.push(config_map_volume(OPENSHIFT_CA_VOLUME, KUBE_ROOT_CA_CONFIGMAP));
    mounts.push(read_only_mount(OPENSHIFT_CA_VOLUME, OPENSHIFT_CA_MOUNT_PATH));

    if let Some(name) = ols.additional_ca_name() {
        volumes.push(config_map_volume(ADDITIONAL_CA_VOLUME, name));
        mounts.push(read_only_mount(ADDITIONAL_CA_VOLUME, ADDITIONAL_CA_MOUNT_PATH));
    }

    volumes.push(empty_dir_volume(CERT_BUNDLE_VOLUME));
    mounts.push(volume_mount(CERT_BUNDLE_VOLUME, CERT_BUNDLE_MOUNT_PATH));

    volumes.push(postgres_ca_volume());
    mounts.push(postgres_ca_volume_mount(POSTGRES_CA_MOUNT_PATH));

    volumes.push(empty_dir_volume(TMP_VOLUME_NAME));
    mounts.push(volume_mount(TMP_VOLUME_NAME, TMP_VOLUME_MOUNT_PATH));

    (volumes, mounts)
}

/// Build the desired app server Deployment, recording the current versions
/// of its tracked dependencies.
///
/// # Errors
///
/// Returns an error if a lookup or the owner reference fails.
pub async fn generate_app_server_deployment(ctx: &Context, cr: &OLSConfig) -> Result<Deployment> {
    let namespace = ctx.namespace();
    let annotations =
        capture_versions(&ctx.client, namespace, &app_server_tracked_dependencies(cr)).await?;

    let (volumes, volume_mounts) = app_server_volumes(cr);
    let deployment = &cr.spec.ols.deployment;

    let container = Container {
        name: APP_SERVER_CONTAINER_NAME.to_string(),
        image: Some(ctx.options.app_server_image.clone()),
        image_pull_policy: Some("Always".to_string()),
        ports: Some(vec![ContainerPort {
            name: Some(HTTPS_PORT_NAME.to_string()),
            container_port: APP_SERVER_PORT,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        security_context: Some(SecurityContext {
            allow_privilege_escalation: Some(false),
            read_only_root_filesystem: Some(true),
            ..Default::default()
        }),
        env: Some(vec![env_var(
            "OLS_CONFIG_FILE",
            format!("{OLS_CONFIG_MOUNT_ROOT}/{OLS_CONFIG_FILENAME}"),
        )]),
        volume_mounts: Some(volume_mounts),
        resources: Some(api_resources(cr)),
        readiness_probe: Some(https_probe("/readiness")),
        liveness_probe: Some(https_probe("/liveness")),
        ..Default::default()
    };

    let mut metadata = owned_metadata(
        cr,
        APP_SERVER_DEPLOYMENT_NAME,
        namespace,
        app_server_selector_labels(),
    )?;
    metadata.annotations = Some(annotations);

    Ok(Deployment {
        metadata,
        spec: Some(DeploymentSpec {
            replicas: Some(deployment.replicas.unwrap_or(1)),
            selector: LabelSelector {
                match_labels: Some(app_server_selector_labels()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(app_server_selector_labels()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(APP_SERVER_SERVICE_ACCOUNT_NAME.to_string()),
                    containers: vec![container],
                    volumes: Some(volumes),
                    tolerations: deployment.api.tolerations.clone(),
                    node_selector: deployment.api.node_selector.clone(),
                    ..Default::default()
                }),
            },
            revision_history_limit: Some(APP_SERVER_REVISION_HISTORY_LIMIT),
            ..Default::default()
        }),
        status: None,
    })
}

#[cfg(test)]
#[path = "deployment_tests.rs"]
mod deployment_tests;
