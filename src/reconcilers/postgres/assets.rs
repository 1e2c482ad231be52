// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Postgres object generators.
//!
//! Pure functions from the `OLSConfig` to the objects of the conversation
//! cache. The only cluster read is the StorageClass lookup done by
//! [`resolve_storage`] when no class is given.

use crate::constants::{
    DEFAULT_STORAGE_CLASS_ANNOTATION, POSTGRES_BOOTSTRAP_SECRET_NAME, POSTGRES_CERTS_SECRET_NAME,
    POSTGRES_CONFIGMAP_NAME, POSTGRES_CONFIG_KEY, POSTGRES_CREDENTIALS_LABEL,
    POSTGRES_CREDENTIALS_LABEL_VALUE, POSTGRES_DEFAULT_PVC_SIZE, POSTGRES_EXTENSION_SCRIPT,
    POSTGRES_NETWORK_POLICY_NAME, POSTGRES_PASSWORD_BYTES, POSTGRES_PORT_NAME, POSTGRES_PVC_NAME,
    POSTGRES_SECRET_HASH_ANNOTATION, POSTGRES_SECRET_KEY_NAME, POSTGRES_SERVICE_NAME,
    POSTGRES_SERVICE_PORT, SERVING_CERT_SECRET_ANNOTATION,
};
use crate::crd::{OLSConfig, StorageSpec};
use crate::fingerprint::hash_bytes;
use crate::labels::{app_server_selector_labels, postgres_selector_labels, to_selector_string};
use crate::reconcilers::resources::owned_metadata;
use anyhow::{Context as _, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use k8s_openapi::api::core::v1::{
    ConfigMap, PersistentVolumeClaim, PersistentVolumeClaimSpec, Secret, Service, ServicePort,
    ServiceSpec, VolumeResourceRequirements,
};
use k8s_openapi::api::networking::v1::{
    NetworkPolicy, NetworkPolicyIngressRule, NetworkPolicyPeer, NetworkPolicyPort,
    NetworkPolicySpec,
};
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use k8s_openapi::ByteString;
use kube::api::ListParams;
use kube::{Api, Client, ResourceExt};
use std::collections::BTreeMap;

/// Server configuration enabling TLS with the service-CA issued certificate.
pub const POSTGRES_CONFIG: &str = "huge_pages = off
ssl = on
ssl_cert_file = '/etc/certs/tls.crt'
ssl_key_file = '/etc/certs/tls.key'
ssl_ca_file = '/etc/certs/cm-olspostgresca/service-ca.crt'
";

/// Start-up hook creating the extension and schemas the app server uses.
pub const POSTGRES_BOOTSTRAP_SCRIPT: &str = r#"#!/bin/bash

cat /var/lib/pgsql/data/userdata/postgresql.conf

echo "attempting to create pg_trgm extension if it does not exist"

_psql () { psql --set ON_ERROR_STOP=1 "$@" ; }

echo "CREATE EXTENSION IF NOT EXISTS pg_trgm;" | _psql -d $POSTGRESQL_DATABASE

echo "CREATE SCHEMA IF NOT EXISTS lcore;" | _psql -d $POSTGRESQL_DATABASE
echo "CREATE SCHEMA IF NOT EXISTS quota;" | _psql -d $POSTGRESQL_DATABASE
echo "CREATE SCHEMA IF NOT EXISTS conversation_cache;" | _psql -d $POSTGRESQL_DATABASE
"#;

/// Labels of the operator-generated credentials Secrets.
///
/// The extra credentials label keeps the bootstrap Secret, which shares the
/// Postgres labels, out of stale-credential cleanup.
#[must_use]
pub fn credentials_labels() -> BTreeMap<String, String> {
    let mut labels = postgres_selector_labels();
    labels.insert(
        POSTGRES_CREDENTIALS_LABEL.to_string(),
        POSTGRES_CREDENTIALS_LABEL_VALUE.to_string(),
    );
    labels
}

/// Label selector matching every operator-generated credentials Secret.
#[must_use]
pub fn credentials_selector() -> String {
    to_selector_string(&credentials_labels())
}

/// A new random password: 12 random bytes, base64 standard encoded.
#[must_use]
pub fn generate_password() -> String {
    BASE64.encode(rand::random::<[u8; POSTGRES_PASSWORD_BYTES]>())
}

/// Password stored in a credentials Secret, if present and non-empty.
#[must_use]
pub fn secret_password(secret: &Secret) -> Option<String> {
    secret
        .data
        .as_ref()
        .and_then(|d| d.get(POSTGRES_SECRET_KEY_NAME))
        .filter(|b| !b.0.is_empty())
        .map(|b| String::from_utf8_lossy(&b.0).into_owned())
}

/// Credentials Secret holding `password`, annotated with its hash.
///
/// # Errors
///
/// Returns an error if the owner reference cannot be built.
pub fn postgres_secret(cr: &OLSConfig, namespace: &str, name: &str, password: &str) -> Result<Secret> {
    let mut metadata = owned_metadata(cr, name, namespace, credentials_labels())?;
    metadata.annotations = Some(BTreeMap::from([(
        POSTGRES_SECRET_HASH_ANNOTATION.to_string(),
        hash_bytes(password.as_bytes()),
    )]));

    Ok(Secret {
        metadata,
        data: Some(BTreeMap::from([(
            POSTGRES_SECRET_KEY_NAME.to_string(),
            ByteString(password.as_bytes().to_vec()),
        )])),
        ..Default::default()
    })
}

/// Bootstrap Secret carrying the extension script.
///
/// # Errors
///
/// Returns an error if the owner reference cannot be built.
pub fn postgres_bootstrap_secret(cr: &OLSConfig, namespace: &str) -> Result<Secret> {
    Ok(Secret {
        metadata: owned_metadata(
            cr,
            POSTGRES_BOOTSTRAP_SECRET_NAME,
            namespace,
            postgres_selector_labels(),
        )?,
        string_data: Some(BTreeMap::from([(
            POSTGRES_EXTENSION_SCRIPT.to_string(),
            POSTGRES_BOOTSTRAP_SCRIPT.to_string(),
        )])),
        ..Default::default()
    })
}

/// Server configuration ConfigMap.
///
/// # Errors
///
/// Returns an error if the owner reference cannot be built.
pub fn postgres_config_map(cr: &OLSConfig, namespace: &str) -> Result<ConfigMap> {
    Ok(ConfigMap {
        metadata: owned_metadata(cr, POSTGRES_CONFIGMAP_NAME, namespace, postgres_selector_labels())?,
        data: Some(BTreeMap::from([(
            POSTGRES_CONFIG_KEY.to_string(),
            POSTGRES_CONFIG.to_string(),
        )])),
        ..Default::default()
    })
}

/// Service in front of the database, with a service-CA serving certificate.
///
/// # Errors
///
/// Returns an error if the owner reference cannot be built.
pub fn postgres_service(cr: &OLSConfig, namespace: &str) -> Result<Service> {
    let mut metadata =
        owned_metadata(cr, POSTGRES_SERVICE_NAME, namespace, postgres_selector_labels())?;
    metadata.annotations = Some(BTreeMap::from([(
        SERVING_CERT_SECRET_ANNOTATION.to_string(),
        POSTGRES_CERTS_SECRET_NAME.to_string(),
    )]));

    Ok(Service {
        metadata,
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(postgres_selector_labels()),
            ports: Some(vec![ServicePort {
                name: Some(POSTGRES_PORT_NAME.to_string()),
                port: POSTGRES_SERVICE_PORT,
                protocol: Some("TCP".to_string()),
                target_port: Some(IntOrString::Int(POSTGRES_SERVICE_PORT)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    })
}

/// Ingress to the database from app server pods only.
///
/// # Errors
///
/// Returns an error if the owner reference cannot be built.
pub fn postgres_network_policy(cr: &OLSConfig, namespace: &str) -> Result<NetworkPolicy> {
    Ok(NetworkPolicy {
        metadata: owned_metadata(
            cr,
            POSTGRES_NETWORK_POLICY_NAME,
            namespace,
            postgres_selector_labels(),
        )?,
        spec: Some(NetworkPolicySpec {
            pod_selector: Some(LabelSelector {
                match_labels: Some(postgres_selector_labels()),
                ..Default::default()
            }),
            ingress: Some(vec![NetworkPolicyIngressRule {
                from: Some(vec![NetworkPolicyPeer {
                    pod_selector: Some(LabelSelector {
                        match_labels: Some(app_server_selector_labels()),
                        ..Default::default()
                    }),
                    ..Default::default()
                }]),
                ports: Some(vec![NetworkPolicyPort {
                    port: Some(IntOrString::Int(POSTGRES_SERVICE_PORT)),
                    protocol: Some("TCP".to_string()),
                    end_port: None,
                }]),
            }]),
            policy_types: Some(vec!["Ingress".to_string()]),
            egress: None,
        }),
    })
}

/// Fill in an empty size and an empty storage class.
///
/// An empty class resolves to the StorageClass annotated as the cluster
/// default.
///
/// # Errors
///
/// Fails when no class is given and the cluster has no default class, or
/// when StorageClasses cannot be listed.
pub async fn resolve_storage(client: &Client, storage: &StorageSpec) -> Result<StorageSpec> {
    let size = storage
        .size
        .clone()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| POSTGRES_DEFAULT_PVC_SIZE.to_string());

    let class = match storage.class.clone().filter(|c| !c.is_empty()) {
        Some(class) => class,
        None => {
            let api: Api<StorageClass> = Api::all(client.clone());
            let classes = api
                .list(&ListParams::default())
                .await
                .context("failed to list storage classes")?;
            match default_storage_class(&classes.items) {
                Some(name) => name,
                None => anyhow::bail!(
                    "no storage class specified and no default storage class configured"
                ),
            }
        }
    };

    Ok(StorageSpec {
        size: Some(size),
        class: Some(class),
    })
}

/// Name of the StorageClass annotated as the cluster default.
#[must_use]
pub fn default_storage_class(classes: &[StorageClass]) -> Option<String> {
    classes
        .iter()
        .find(|sc| {
            sc.annotations()
                .get(DEFAULT_STORAGE_CLASS_ANNOTATION)
                .is_some_and(|v| v == "true")
        })
        .map(ResourceExt::name_any)
}

/// Claim for the data directory, from resolved storage settings.
///
/// # Errors
///
/// Returns an error if the owner reference cannot be built.
pub fn postgres_pvc(
    cr: &OLSConfig,
    namespace: &str,
    storage: &StorageSpec,
) -> Result<PersistentVolumeClaim> {
    let size = storage.size.as_deref().unwrap_or(POSTGRES_DEFAULT_PVC_SIZE);

    Ok(PersistentVolumeClaim {
        metadata: owned_metadata(cr, POSTGRES_PVC_NAME, namespace, postgres_selector_labels())?,
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(size.to_string()),
                )])),
                limits: None,
            }),
            storage_class_name: storage.class.clone(),
            ..Default::default()
        }),
        status: None,
    })
}

#[cfg(test)]
#[path = "assets_tests.rs"]
mod assets_tests;
