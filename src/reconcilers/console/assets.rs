// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Console plugin object generators.
//!
//! The `ConsolePlugin` and the Console operator configuration are OpenShift
//! types with no `k8s-openapi` binding; both are handled as
//! [`DynamicObject`]s.

use crate::constants::{
    APP_SERVER_PORT, APP_SERVER_SERVICE_NAME, CONSOLE_NAMESPACE, CONSOLE_PROXY_ALIAS,
    CONSOLE_UI_CERT_SECRET_NAME, CONSOLE_UI_DISPLAY_NAME, CONSOLE_UI_NAME, CONSOLE_UI_PORT,
    SERVING_CERT_SECRET_ANNOTATION, VOLUME_DEFAULT_MODE,
};
use crate::crd::OLSConfig;
use crate::labels::{console_ui_labels, K8S_METADATA_NAME};
use crate::reconcilers::deployment::{
    config_map_volume, empty_dir_volume, read_only_mount, volume_mount,
};
use crate::reconcilers::resources::{owned_metadata, owner_reference};
use anyhow::Result;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, Container, ContainerPort, PodSecurityContext, PodSpec, PodTemplateSpec,
    ResourceRequirements, SeccompProfile, SecretVolumeSource, SecurityContext, Service,
    ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::api::networking::v1::{
    NetworkPolicy, NetworkPolicyIngressRule, NetworkPolicyPeer, NetworkPolicyPort,
    NetworkPolicySpec,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use serde_json::json;
use std::collections::BTreeMap;

const HTTPS_PORT_NAME: &str = "https";
const NGINX_CONFIG_KEY: &str = "nginx.conf";
const NGINX_CONFIG_VOLUME: &str = "nginx-config";
const NGINX_TEMP_VOLUME: &str = "nginx-temp";

/// nginx serving the plugin bundle over TLS on the plugin port.
pub const NGINX_CONFIG: &str = r"pid       /tmp/nginx/nginx.pid;
error_log /dev/stdout info;
events {}
http {
    client_body_temp_path /tmp/nginx/client_body;
    proxy_temp_path       /tmp/nginx/proxy;
    fastcgi_temp_path     /tmp/nginx/fastcgi;
    uwsgi_temp_path       /tmp/nginx/uwsgi;
    scgi_temp_path        /tmp/nginx/scgi;
    access_log            /dev/stdout;
    include               /etc/nginx/mime.types;
    default_type          application/octet-stream;
    keepalive_timeout     65;
    server {
        listen              9443 ssl;
        listen              [::]:9443 ssl;
        ssl_certificate     /var/cert/tls.crt;
        ssl_certificate_key /var/cert/tls.key;
        root                /usr/share/nginx/html;
    }
}
";

/// `console.openshift.io/v1` `ConsolePlugin`, cluster-scoped.
#[must_use]
pub fn console_plugin_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk("console.openshift.io", "v1", "ConsolePlugin"),
        "consoleplugins",
    )
}

/// `operator.openshift.io/v1` `Console`, the console operator configuration.
#[must_use]
pub fn console_operator_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk("operator.openshift.io", "v1", "Console"),
        "consoles",
    )
}

/// # Errors
///
/// Returns an error if the owner reference cannot be built.
pub fn console_ui_config_map(cr: &OLSConfig, namespace: &str) -> Result<ConfigMap> {
    Ok(ConfigMap {
        metadata: owned_metadata(cr, CONSOLE_UI_NAME, namespace, console_ui_labels())?,
        data: Some(BTreeMap::from([(
            NGINX_CONFIG_KEY.to_string(),
            NGINX_CONFIG.to_string(),
        )])),
        ..Default::default()
    })
}

/// Ingress to the plugin from the OpenShift console pods only.
///
/// # Errors
///
/// Returns an error if the owner reference cannot be built.
pub fn console_ui_network_policy(cr: &OLSConfig, namespace: &str) -> Result<NetworkPolicy> {
    Ok(NetworkPolicy {
        metadata: owned_metadata(cr, CONSOLE_UI_NAME, namespace, console_ui_labels())?,
        spec: Some(NetworkPolicySpec {
            pod_selector: Some(LabelSelector {
                match_labels: Some(console_ui_labels()),
                ..Default::default()
            }),
            ingress: Some(vec![NetworkPolicyIngressRule {
                from: Some(vec![NetworkPolicyPeer {
                    namespace_selector: Some(LabelSelector {
                        match_labels: Some(BTreeMap::from([(
                            K8S_METADATA_NAME.to_string(),
                            CONSOLE_NAMESPACE.to_string(),
                        )])),
                        ..Default::default()
                    }),
                    pod_selector: Some(LabelSelector {
                        match_labels: Some(BTreeMap::from([(
                            "app".to_string(),
                            "console".to_string(),
                        )])),
                        ..Default::default()
                    }),
                    ip_block: None,
                }]),
                ports: Some(vec![NetworkPolicyPort {
                    port: Some(IntOrString::Int(CONSOLE_UI_PORT)),
                    protocol: Some("TCP".to_string()),
                    end_port: None,
                }]),
            }]),
            policy_types: Some(vec!["Ingress".to_string()]),
            egress: None,
        }),
    })
}

/// Container resources from the CR, or the plugin defaults.
#[must_use]
pub fn console_ui_resources(cr: &OLSConfig) -> ResourceRequirements {
    cr.spec
        .ols
        .deployment
        .console
        .resources
        .clone()
        .unwrap_or_else(|| ResourceRequirements {
            requests: Some(BTreeMap::from([
                ("cpu".to_string(), Quantity("10m".to_string())),
                ("memory".to_string(), Quantity("50Mi".to_string())),
            ])),
            limits: Some(BTreeMap::from([(
                "memory".to_string(),
                Quantity("100Mi".to_string()),
            )])),
            ..Default::default()
        })
}

fn console_ui_volumes() -> (Vec<Volume>, Vec<VolumeMount>) {
    let cert = Volume {
        name: CONSOLE_UI_CERT_SECRET_NAME.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(CONSOLE_UI_CERT_SECRET_NAME.to_string()),
            default_mode: Some(VOLUME_DEFAULT_MODE),
            ..Default::default()
        }),
        ..Default::default()
    };

    let mounts = vec![
        read_only_mount(CONSOLE_UI_CERT_SECRET_NAME, "/var/cert"),
        VolumeMount {
            sub_path: Some(NGINX_CONFIG_KEY.to_string()),
            ..read_only_mount(NGINX_CONFIG_VOLUME, "/etc/nginx/nginx.conf")
        },
        volume_mount(NGINX_TEMP_VOLUME, "/tmp/nginx"),
    ];
    let volumes = vec![
        cert,
        config_map_volume(NGINX_CONFIG_VOLUME, CONSOLE_UI_NAME),
        empty_dir_volume(NGINX_TEMP_VOLUME),
    ];
    (volumes, mounts)
}

/// Console plugin Deployment running `image`.
///
/// # Errors
///
/// Returns an error if the owner reference cannot be built.
pub fn console_ui_deployment(cr: &OLSConfig, namespace: &str, image: &str) -> Result<Deployment> {
    let console = &cr.spec.ols.deployment.console;
    let (volumes, volume_mounts) = console_ui_volumes();

    let container = Container {
        name: CONSOLE_UI_NAME.to_string(),
        image: Some(image.to_string()),
        image_pull_policy: Some("Always".to_string()),
        ports: Some(vec![ContainerPort {
            name: Some(HTTPS_PORT_NAME.to_string()),
            container_port: CONSOLE_UI_PORT,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        security_context: Some(SecurityContext {
            allow_privilege_escalation: Some(false),
            read_only_root_filesystem: Some(true),
            ..Default::default()
        }),
        resources: Some(console_ui_resources(cr)),
        volume_mounts: Some(volume_mounts),
        ..Default::default()
    };

    Ok(Deployment {
        metadata: owned_metadata(cr, CONSOLE_UI_NAME, namespace, console_ui_labels())?,
        spec: Some(DeploymentSpec {
            replicas: console.replicas,
            selector: LabelSelector {
                match_labels: Some(console_ui_labels()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(console_ui_labels()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes: Some(volumes),
                    security_context: Some(PodSecurityContext {
                        run_as_non_root: Some(true),
                        seccomp_profile: Some(SeccompProfile {
                            type_: "RuntimeDefault".to_string(),
                            localhost_profile: None,
                        }),
                        ..Default::default()
                    }),
                    tolerations: console.tolerations.clone(),
                    node_selector: console.node_selector.clone(),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    })
}

/// Service in front of the plugin, with a service-CA serving certificate.
///
/// # Errors
///
/// Returns an error if the owner reference cannot be built.
pub fn console_ui_service(cr: &OLSConfig, namespace: &str) -> Result<Service> {
    let mut metadata = owned_metadata(cr, CONSOLE_UI_NAME, namespace, console_ui_labels())?;
    metadata.annotations = Some(BTreeMap::from([(
        SERVING_CERT_SECRET_ANNOTATION.to_string(),
        CONSOLE_UI_CERT_SECRET_NAME.to_string(),
    )]));

    Ok(Service {
        metadata,
        spec: Some(ServiceSpec {
            selector: Some(console_ui_labels()),
            ports: Some(vec![ServicePort {
                name: Some(HTTPS_PORT_NAME.to_string()),
                port: CONSOLE_UI_PORT,
                protocol: Some("TCP".to_string()),
                target_port: Some(IntOrString::String(HTTPS_PORT_NAME.to_string())),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    })
}

/// `ConsolePlugin` serving the plugin bundle and proxying `ols` requests to
/// the app server with the user's token.
///
/// # Errors
///
/// Returns an error if the owner reference cannot be built.
pub fn console_plugin(cr: &OLSConfig, namespace: &str) -> Result<DynamicObject> {
    let mut proxy = json!({
        "alias": CONSOLE_PROXY_ALIAS,
        "authorization": "UserToken",
        "endpoint": {
            "type": "Service",
            "service": {
                "name": APP_SERVER_SERVICE_NAME,
                "namespace": namespace,
                "port": APP_SERVER_PORT
            }
        }
    });
    if let Some(ca) = cr
        .spec
        .ols
        .deployment
        .console
        .ca_certificate
        .as_deref()
        .filter(|c| !c.is_empty())
    {
        proxy["caCertificate"] = json!(ca);
    }

    let mut plugin = DynamicObject::new(CONSOLE_UI_NAME, &console_plugin_resource());
    plugin.metadata.labels = Some(console_ui_labels());
    plugin.metadata.owner_references = Some(vec![owner_reference(cr)?]);
    plugin.data = json!({
        "spec": {
            "backend": {
                "type": "Service",
                "service": {
                    "name": CONSOLE_UI_NAME,
                    "namespace": namespace,
                    "port": CONSOLE_UI_PORT,
                    "basePath": "/"
                }
            },
            "displayName": CONSOLE_UI_DISPLAY_NAME,
            "i18n": { "loadType": "Preload" },
            "proxy": [proxy]
        }
    });
    Ok(plugin)
}

/// Plugin names enabled in a Console operator configuration.
#[must_use]
pub fn enabled_plugins(console: &DynamicObject) -> Vec<String> {
    console.data["spec"]["plugins"]
        .as_array()
        .map(|plugins| {
            plugins
                .iter()
                .filter_map(|p| p.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Replace the enabled plugin list of a Console operator configuration.
pub fn set_enabled_plugins(console: &mut DynamicObject, plugins: &[String]) {
    console.data["spec"]["plugins"] = json!(plugins);
}

#[cfg(test)]
#[path = "assets_tests.rs"]
mod assets_tests;
