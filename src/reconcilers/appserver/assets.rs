// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Application server object generators.

use crate::constants::{
    ADDITIONAL_CA_MOUNT_PATH, APP_SERVER_NETWORK_POLICY_NAME, APP_SERVER_PORT,
    APP_SERVER_SERVICE_ACCOUNT_NAME, APP_SERVER_SERVICE_NAME, APP_SERVER_TLS_SECRET_NAME,
    KUBE_ROOT_CA_CONFIGMAP, OLS_CONFIGMAP_NAME, OLS_CONFIG_FILENAME, OLS_CONFIG_HASH_ANNOTATION,
    OPENSHIFT_CA_MOUNT_PATH, SERVING_CERT_SECRET_ANNOTATION,
};
use crate::crd::OLSConfig;
use crate::fingerprint::hash_bytes;
use crate::labels::{app_server_selector_labels, K8S_METADATA_NAME, K8S_NAME};
use crate::reconcilers::appserver::config::{ca_file_path, render_app_server_config};
use crate::reconcilers::resources::{get_optional, owned_metadata};
use anyhow::{Context as _, Result};
use k8s_openapi::api::core::v1::{ConfigMap, Service, ServiceAccount, ServicePort, ServiceSpec};
use k8s_openapi::api::networking::v1::{
    NetworkPolicy, NetworkPolicyIngressRule, NetworkPolicyPeer, NetworkPolicyPort,
    NetworkPolicySpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{Api, Client};
use std::collections::BTreeMap;

const HTTPS_PORT_NAME: &str = "https";
const PEM_CERTIFICATE_HEADER: &str = "-----BEGIN CERTIFICATE-----";

/// Name of the Secret holding the app server serving certificate.
#[must_use]
pub fn tls_secret_name(cr: &OLSConfig) -> &str {
    cr.spec
        .ols
        .tls_secret_name()
        .unwrap_or(APP_SERVER_TLS_SECRET_NAME)
}

/// ServiceAccount the app server runs as.
///
/// # Errors
///
/// Returns an error if the owner reference cannot be built.
pub fn app_server_service_account(cr: &OLSConfig, namespace: &str) -> Result<ServiceAccount> {
    Ok(ServiceAccount {
        metadata: owned_metadata(
            cr,
            APP_SERVER_SERVICE_ACCOUNT_NAME,
            namespace,
            app_server_selector_labels(),
        )?,
        ..Default::default()
    })
}

/// Container paths of the PEM certificates held by a CA ConfigMap.
///
/// Keys whose value is not a PEM certificate are skipped.
#[must_use]
pub fn ca_bundle_paths(config_map: &ConfigMap, mount_path: &str) -> Vec<String> {
    config_map
        .data
        .iter()
        .flatten()
        .filter(|(_, v)| v.contains(PEM_CERTIFICATE_HEADER))
        .map(|(k, _)| ca_file_path(mount_path, k))
        .collect()
}

/// Collect the extra CA files the app server should trust.
///
/// The cluster root CA comes first, followed by the user's additional CA
/// ConfigMap when one is referenced.
///
/// # Errors
///
/// Fails when the referenced additional CA ConfigMap does not exist or a
/// lookup fails.
pub async fn collect_extra_cas(
    client: &Client,
    namespace: &str,
    cr: &OLSConfig,
) -> Result<Vec<String>> {
    let api: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);
    let mut paths = Vec::new();

    if let Some(root_ca) = get_optional(&api, KUBE_ROOT_CA_CONFIGMAP)
        .await
        .with_context(|| format!("failed to get ConfigMap {KUBE_ROOT_CA_CONFIGMAP}"))?
    {
        paths.extend(ca_bundle_paths(&root_ca, OPENSHIFT_CA_MOUNT_PATH));
    }

    if let Some(name) = cr.spec.ols.additional_ca_name() {
        let Some(additional) = get_optional(&api, name)
            .await
            .with_context(|| format!("failed to get additional CA ConfigMap {name}"))?
        else {
            anyhow::bail!("additional CA ConfigMap {name} not found");
        };
        paths.extend(ca_bundle_paths(&additional, ADDITIONAL_CA_MOUNT_PATH));
    }

    Ok(paths)
}

/// The `olsconfig` ConfigMap, annotated with the hash of its content.
///
/// # Errors
///
/// Returns an error if rendering or the owner reference fails.
pub fn ols_config_map(
    cr: &OLSConfig,
    namespace: &str,
    extra_cas: Vec<String>,
) -> Result<ConfigMap> {
    let content = render_app_server_config(cr, namespace, extra_cas)?;
    let mut metadata =
        owned_metadata(cr, OLS_CONFIGMAP_NAME, namespace, app_server_selector_labels())?;
    metadata.annotations = Some(BTreeMap::from([(
        OLS_CONFIG_HASH_ANNOTATION.to_string(),
        hash_bytes(content.as_bytes()),
    )]));

    Ok(ConfigMap {
        metadata,
        data: Some(BTreeMap::from([(OLS_CONFIG_FILENAME.to_string(), content)])),
        ..Default::default()
    })
}

fn namespace_selector(namespace: &str) -> LabelSelector {
    LabelSelector {
        match_labels: Some(BTreeMap::from([(
            K8S_METADATA_NAME.to_string(),
            namespace.to_string(),
        )])),
        ..Default::default()
    }
}

/// Ingress to the API from cluster monitoring, the web console and the
/// ingress routers.
///
/// # Errors
///
/// Returns an error if the owner reference cannot be built.
pub fn app_server_network_policy(cr: &OLSConfig, namespace: &str) -> Result<NetworkPolicy> {
    let port = vec![NetworkPolicyPort {
        port: Some(IntOrString::Int(APP_SERVER_PORT)),
        protocol: Some("TCP".to_string()),
        end_port: None,
    }];

    let prometheus = NetworkPolicyPeer {
        namespace_selector: Some(namespace_selector("openshift-monitoring")),
        pod_selector: Some(LabelSelector {
            match_expressions: Some(vec![
                LabelSelectorRequirement {
                    key: K8S_NAME.to_string(),
                    operator: "In".to_string(),
                    values: Some(vec!["prometheus".to_string()]),
                },
                LabelSelectorRequirement {
                    key: "prometheus".to_string(),
                    operator: "In".to_string(),
                    values: Some(vec!["k8s".to_string()]),
                },
            ]),
            ..Default::default()
        }),
        ip_block: None,
    };

    let console = NetworkPolicyPeer {
        namespace_selector: Some(namespace_selector("openshift-console")),
        pod_selector: Some(LabelSelector {
            match_labels: Some(BTreeMap::from([("app".to_string(), "console".to_string())])),
            ..Default::default()
        }),
        ip_block: None,
    };

    let ingress = NetworkPolicyPeer {
        namespace_selector: Some(LabelSelector {
            match_labels: Some(BTreeMap::from([(
                "network.openshift.io/policy-group".to_string(),
                "ingress".to_string(),
            )])),
            ..Default::default()
        }),
        pod_selector: None,
        ip_block: None,
    };

    Ok(NetworkPolicy {
        metadata: owned_metadata(
            cr,
            APP_SERVER_NETWORK_POLICY_NAME,
            namespace,
            app_server_selector_labels(),
        )?,
        spec: Some(NetworkPolicySpec {
            pod_selector: Some(LabelSelector {
                match_labels: Some(app_server_selector_labels()),
                ..Default::default()
            }),
            ingress: Some(
                [prometheus, console, ingress]
                    .into_iter()
                    .map(|peer| NetworkPolicyIngressRule {
                        from: Some(vec![peer]),
                        ports: Some(port.clone()),
                    })
                    .collect(),
            ),
            policy_types: Some(vec!["Ingress".to_string()]),
            egress: None,
        }),
    })
}

/// Service in front of the API.
///
/// The service CA issues the serving certificate unless the user brings
/// their own.
///
/// # Errors
///
/// Returns an error if the owner reference cannot be built.
pub fn app_server_service(cr: &OLSConfig, namespace: &str) -> Result<Service> {
    let mut metadata =
        owned_metadata(cr, APP_SERVER_SERVICE_NAME, namespace, app_server_selector_labels())?;
    if cr.spec.ols.tls_secret_name().is_none() {
        metadata.annotations = Some(BTreeMap::from([(
            SERVING_CERT_SECRET_ANNOTATION.to_string(),
            APP_SERVER_TLS_SECRET_NAME.to_string(),
        )]));
    }

    Ok(Service {
        metadata,
        spec: Some(ServiceSpec {
            selector: Some(app_server_selector_labels()),
            ports: Some(vec![ServicePort {
                name: Some(HTTPS_PORT_NAME.to_string()),
                port: APP_SERVER_PORT,
                protocol: Some("TCP".to_string()),
                target_port: Some(IntOrString::String(HTTPS_PORT_NAME.to_string())),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    })
}

#[cfg(test)]
#[path = "assets_tests.rs"]
mod assets_tests;
