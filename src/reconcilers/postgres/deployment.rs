// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Postgres Deployment generation.

use crate::constants::{
    CERTS_MOUNT_ROOT, POSTGRES_BOOTSTRAP_MOUNT_PATH, POSTGRES_BOOTSTRAP_SECRET_NAME,
    POSTGRES_CA_VOLUME, POSTGRES_CERTS_SECRET_NAME, POSTGRES_CONFIGMAP_NAME,
    POSTGRES_CONFIGMAP_VERSION_ANNOTATION, POSTGRES_CONFIG_KEY, POSTGRES_CONFIG_MOUNT_PATH,
    POSTGRES_CONTAINER_NAME, POSTGRES_DATA_MOUNT_PATH, POSTGRES_DATA_VOLUME,
    POSTGRES_DEPLOYMENT_NAME, POSTGRES_EXTENSION_SCRIPT, POSTGRES_PORT_NAME, POSTGRES_PVC_NAME,
    POSTGRES_SECRET_VERSION_ANNOTATION, POSTGRES_SERVICE_PORT, POSTGRES_VAR_RUN_MOUNT_PATH,
    POSTGRES_VAR_RUN_VOLUME, SERVICE_CA_CONFIGMAP, TMP_VOLUME_MOUNT_PATH, TMP_VOLUME_NAME,
};
use crate::context::Context;
use crate::crd::OLSConfig;
use crate::labels::postgres_selector_labels;
use crate::reconcilers::deployment::{
    capture_versions, config_map_volume, empty_dir_volume, env_var, read_only_mount,
    secret_volume, volume_mount, TrackedDependency,
};
use crate::reconcilers::postgres::assets::secret_password;
use crate::reconcilers::resources::{get_optional, owned_metadata};
use anyhow::{Context as _, Result};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec,
    ResourceRequirements, Secret, SecurityContext, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::Api;
use std::collections::BTreeMap;

/// Old ReplicaSets kept for the database; rollbacks are never used.
const POSTGRES_REVISION_HISTORY_LIMIT: i32 = 1;

/// Objects whose resource versions the Postgres Deployment records.
#[must_use]
pub fn postgres_tracked_dependencies(cr: &OLSConfig) -> Vec<TrackedDependency> {
    vec![
        TrackedDependency::config_map(
            POSTGRES_CONFIGMAP_VERSION_ANNOTATION,
            POSTGRES_CONFIGMAP_NAME,
        ),
        TrackedDependency::secret(
            POSTGRES_SECRET_VERSION_ANNOTATION,
            cr.spec.ols.conversation_cache.postgres.credentials_secret_name(),
        ),
    ]
}

/// Container resources from the CR, or the database defaults.
#[must_use]
pub fn database_resources(cr: &OLSConfig) -> ResourceRequirements {
    cr.spec
        .ols
        .deployment
        .database
        .resources
        .clone()
        .unwrap_or_else(|| ResourceRequirements {
            requests: Some(BTreeMap::from([
                ("cpu".to_string(), Quantity("30m".to_string())),
                ("memory".to_string(), Quantity("300Mi".to_string())),
            ])),
            limits: Some(BTreeMap::from([(
                "memory".to_string(),
                Quantity("2Gi".to_string()),
            )])),
            ..Default::default()
        })
}

/// Service CA bundle volume, shared by the server and its clients.
#[must_use]
pub fn postgres_ca_volume() -> Volume {
    config_map_volume(POSTGRES_CA_VOLUME, SERVICE_CA_CONFIGMAP)
}

/// Read-only mount of [`postgres_ca_volume`] at `mount_path`.
#[must_use]
pub fn postgres_ca_volume_mount(mount_path: &str) -> VolumeMount {
    read_only_mount(POSTGRES_CA_VOLUME, mount_path)
}

/// Volumes and mounts of the database container.
///
/// The data directory is backed by the PVC when storage is configured and by
/// an `emptyDir` otherwise.
#[must_use]
pub fn postgres_volumes(cr: &OLSConfig) -> (Vec<Volume>, Vec<VolumeMount>) {
    let certs = secret_volume(POSTGRES_CERTS_SECRET_NAME);
    let bootstrap = secret_volume(POSTGRES_BOOTSTRAP_SECRET_NAME);

    let config = config_map_volume(POSTGRES_CONFIGMAP_NAME, POSTGRES_CONFIGMAP_NAME);

    let data = if cr.spec.ols.storage.is_some() {
        Volume {
            name: POSTGRES_DATA_VOLUME.to_string(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: POSTGRES_PVC_NAME.to_string(),
                read_only: None,
            }),
            ..Default::default()
        }
    } else {
        empty_dir_volume(POSTGRES_DATA_VOLUME)
    };

    let mounts = vec![
        read_only_mount(&certs.name, CERTS_MOUNT_ROOT),
        VolumeMount {
            sub_path: Some(POSTGRES_EXTENSION_SCRIPT.to_string()),
            ..read_only_mount(&bootstrap.name, POSTGRES_BOOTSTRAP_MOUNT_PATH)
        },
        VolumeMount {
            sub_path: Some(POSTGRES_CONFIG_KEY.to_string()),
            ..volume_mount(POSTGRES_CONFIGMAP_NAME, POSTGRES_CONFIG_MOUNT_PATH)
        },
        volume_mount(POSTGRES_DATA_VOLUME, POSTGRES_DATA_MOUNT_PATH),
        postgres_ca_volume_mount(&format!("{CERTS_MOUNT_ROOT}/{POSTGRES_CA_VOLUME}")),
        volume_mount(POSTGRES_VAR_RUN_VOLUME, POSTGRES_VAR_RUN_MOUNT_PATH),
        volume_mount(TMP_VOLUME_NAME, TMP_VOLUME_MOUNT_PATH),
    ];

    let volumes = vec![
        certs,
        bootstrap,
        config,
        data,
        postgres_ca_volume(),
        empty_dir_volume(POSTGRES_VAR_RUN_VOLUME),
        empty_dir_volume(TMP_VOLUME_NAME),
    ];

    (volumes, mounts)
}

/// Build the desired Postgres Deployment.
///
/// The password is read from the credentials Secret and injected verbatim.
/// The current resource versions of the configuration ConfigMap and the
/// credentials Secret are recorded as Deployment annotations.
///
/// # Errors
///
/// Fails when the credentials Secret is missing or holds no password, or
/// when a lookup fails.
pub async fn generate_postgres_deployment(ctx: &Context, cr: &OLSConfig) -> Result<Deployment> {
    let namespace = ctx.namespace();
    let postgres = &cr.spec.ols.conversation_cache.postgres;
    let secret_name = postgres.credentials_secret_name();

    let secrets: Api<Secret> = Api::namespaced(ctx.client.clone(), namespace);
    let password = get_optional(&secrets, secret_name)
        .await
        .with_context(|| format!("failed to get Postgres secret {secret_name}"))?
        .as_ref()
        .and_then(secret_password);
    let Some(password) = password else {
        anyhow::bail!("password is needed to start postgres deployment");
    };

    let annotations =
        capture_versions(&ctx.client, namespace, &postgres_tracked_dependencies(cr)).await?;

    let (volumes, volume_mounts) = postgres_volumes(cr);
    let database = &cr.spec.ols.deployment.database;

    let container = Container {
        name: POSTGRES_CONTAINER_NAME.to_string(),
        image: Some(ctx.options.postgres_image.clone()),
        image_pull_policy: Some("Always".to_string()),
        ports: Some(vec![ContainerPort {
            name: Some(POSTGRES_PORT_NAME.to_string()),
            container_port: POSTGRES_SERVICE_PORT,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        security_context: Some(SecurityContext {
            allow_privilege_escalation: Some(false),
            read_only_root_filesystem: Some(true),
            ..Default::default()
        }),
        env: Some(vec![
            env_var("POSTGRESQL_USER", postgres.user_name()),
            env_var("POSTGRESQL_DATABASE", postgres.database_name()),
            env_var("POSTGRESQL_ADMIN_PASSWORD", password.clone()),
            env_var("POSTGRESQL_PASSWORD", password),
            env_var("POSTGRESQL_SHARED_BUFFERS", postgres.shared_buffers_or_default()),
            env_var(
                "POSTGRESQL_MAX_CONNECTIONS",
                postgres.max_connections_or_default().to_string(),
            ),
        ]),
        volume_mounts: Some(volume_mounts),
        resources: Some(database_resources(cr)),
        ..Default::default()
    };

    let mut metadata = owned_metadata(
        cr,
        POSTGRES_DEPLOYMENT_NAME,
        namespace,
        postgres_selector_labels(),
    )?;
    metadata.annotations = Some(annotations);

    Ok(Deployment {
        metadata,
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(postgres_selector_labels()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(postgres_selector_labels()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes: Some(volumes),
                    tolerations: database.tolerations.clone(),
                    node_selector: database.node_selector.clone(),
                    ..Default::default()
                }),
            },
            revision_history_limit: Some(POSTGRES_REVISION_HISTORY_LIMIT),
            ..Default::default()
        }),
        status: None,
    })
}

#[cfg(test)]
#[path = "deployment_tests.rs"]
mod deployment_tests;
