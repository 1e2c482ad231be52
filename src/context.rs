// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context passed to every reconcile function.
//!
//! The controller receives an `Arc<Context>` that contains:
//! - Kubernetes client
//! - Operator options resolved once from the command line
//!
//! Reconcile tasks take `&Context` explicitly; nothing in the crate reads
//! process-global configuration.

use crate::constants::{
    APP_SERVER_DEFAULT_IMAGE, CONSOLE_UI_DEFAULT_IMAGE, DEFAULT_NAMESPACE,
    DEFAULT_RECONCILE_INTERVAL_MINUTES, POSTGRES_DEFAULT_IMAGE,
};
use kube::Client;
use std::time::Duration;

/// Startup options that parameterize the generated resources.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorOptions {
    /// Namespace the operand is deployed into
    pub namespace: String,

    /// Image of the application server
    pub app_server_image: String,

    /// Image of the console plugin
    pub console_image: String,

    /// Image of the Postgres server
    pub postgres_image: String,

    /// Periodic requeue interval once everything is ready
    pub reconcile_interval: Duration,
}

impl Default for OperatorOptions {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            app_server_image: APP_SERVER_DEFAULT_IMAGE.to_string(),
            console_image: CONSOLE_UI_DEFAULT_IMAGE.to_string(),
            postgres_image: POSTGRES_DEFAULT_IMAGE.to_string(),
            reconcile_interval: Duration::from_secs(DEFAULT_RECONCILE_INTERVAL_MINUTES * 60),
        }
    }
}

/// Shared context passed to the controller.
///
/// This context provides access to:
/// - Kubernetes client for API operations
/// - Operator options (namespace, images, reconcile interval)
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client for API operations
    pub client: Client,

    /// Options resolved at startup
    pub options: OperatorOptions,
}

impl Context {
    #[must_use]
    pub fn new(client: Client, options: OperatorOptions) -> Self {
        Self { client, options }
    }

    /// Namespace all operand resources live in.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.options.namespace
    }
}
