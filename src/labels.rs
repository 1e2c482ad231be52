// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common label constants and selector-label builders.
//!
//! Each operand subsystem carries the same four `app.kubernetes.io` labels on
//! every object it owns, and the same map is used as the pod selector so that
//! Services, NetworkPolicies and Deployments always agree.

use std::collections::BTreeMap;

// ============================================================================
// Kubernetes Standard Labels
// https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
// ============================================================================

/// Standard label for the component name within the architecture
pub const K8S_COMPONENT: &str = "app.kubernetes.io/component";

/// Standard label for the tool being used to manage the operation of an application
pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Standard label for the name of the application
pub const K8S_NAME: &str = "app.kubernetes.io/name";

/// Standard label for the name of a higher-level application this one is part of
pub const K8S_PART_OF: &str = "app.kubernetes.io/part-of";

/// Namespace name label set by Kubernetes on every namespace
pub const K8S_METADATA_NAME: &str = "kubernetes.io/metadata.name";

// ============================================================================
// Kubernetes Standard Label Values
// ============================================================================

/// Value for `app.kubernetes.io/managed-by`
pub const MANAGED_BY_OPERATOR: &str = "lightspeed-operator";

/// Value for `app.kubernetes.io/part-of`
pub const PART_OF_LIGHTSPEED: &str = "openshift-lightspeed";

/// Component value for the Postgres server
pub const COMPONENT_POSTGRES: &str = "postgres-server";

/// Component value for the application server
pub const COMPONENT_APP_SERVER: &str = "application-server";

/// Component value for the console plugin
pub const COMPONENT_CONSOLE_PLUGIN: &str = "console-plugin";

/// Application name of the Postgres server
pub const NAME_POSTGRES: &str = "lightspeed-service-postgres";

/// Application name of the application server
pub const NAME_APP_SERVER: &str = "lightspeed-service-api";

/// Application name of the console plugin
pub const NAME_CONSOLE_PLUGIN: &str = "lightspeed-console-plugin";

// ============================================================================
// Selector Builders
// ============================================================================

fn selector_labels(component: &str, name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (K8S_COMPONENT.to_string(), component.to_string()),
        (K8S_MANAGED_BY.to_string(), MANAGED_BY_OPERATOR.to_string()),
        (K8S_NAME.to_string(), name.to_string()),
        (K8S_PART_OF.to_string(), PART_OF_LIGHTSPEED.to_string()),
    ])
}

/// Labels and pod selector of every Postgres object.
#[must_use]
pub fn postgres_selector_labels() -> BTreeMap<String, String> {
    selector_labels(COMPONENT_POSTGRES, NAME_POSTGRES)
}

/// Labels and pod selector of every app server object.
#[must_use]
pub fn app_server_selector_labels() -> BTreeMap<String, String> {
    selector_labels(COMPONENT_APP_SERVER, NAME_APP_SERVER)
}

/// Labels and pod selector of every console plugin object.
#[must_use]
pub fn console_ui_labels() -> BTreeMap<String, String> {
    selector_labels(COMPONENT_CONSOLE_PLUGIN, NAME_CONSOLE_PLUGIN)
}

/// Render a label map as a `key=value,...` label selector string.
#[must_use]
pub fn to_selector_string(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}
