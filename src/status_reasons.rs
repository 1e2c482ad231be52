// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Status condition types, reasons and messages for the `OLSConfig` resource.
//!
//! One condition is kept per subsystem plus an aggregate `Reconciled`
//! condition. All of them carry the same reason; the message tells ready,
//! failed and rolling-out apart.
//!
//! # Example Status
//!
//! ```yaml
//! status:
//!   conditions:
//!     - type: ConsolePluginReady
//!       status: "True"
//!       reason: Reconciling
//!       message: All components are successfully deployed
//!     - type: CacheReady
//!       status: "False"
//!       reason: Reconciling
//!       message: "In Progress: 0/1 replicas ready"
//!     - type: ApiReady
//!       status: "False"
//!       reason: Reconciling
//!       message: "Failed: failed to reconcile app server Deployment: ..."
//! ```

// ============================================================================
// Condition Types
// ============================================================================

/// Console plugin Deployment, Service and `ConsolePlugin` are in place.
pub const CONDITION_TYPE_CONSOLE_PLUGIN_READY: &str = "ConsolePluginReady";

/// Postgres conversation cache is deployed and ready.
pub const CONDITION_TYPE_CACHE_READY: &str = "CacheReady";

/// Application server is deployed and ready.
pub const CONDITION_TYPE_API_READY: &str = "ApiReady";

/// Every subsystem reconciled without failure and none is rolling out.
pub const CONDITION_TYPE_RECONCILED: &str = "Reconciled";

// ============================================================================
// Reasons
// ============================================================================

/// Reason carried by every condition the operator writes.
pub const REASON_RECONCILING: &str = "Reconciling";

// ============================================================================
// Status values
// ============================================================================

pub const STATUS_TRUE: &str = "True";
pub const STATUS_FALSE: &str = "False";

// ============================================================================
// Messages
// ============================================================================

/// Message of a subsystem condition whose Deployment is ready.
pub const MESSAGE_ALL_DEPLOYED: &str = "All components are successfully deployed";

/// Message of the `Reconciled` condition.
pub const MESSAGE_RECONCILED: &str = "Custom resource successfully reconciled";

/// Message of a condition whose subsystem failed.
#[must_use]
pub fn failed_message(error: &str) -> String {
    format!("Failed: {error}")
}

/// Message of a condition whose Deployment is still rolling out.
#[must_use]
pub fn in_progress_message(detail: &str) -> String {
    format!("{}: {detail}", crate::constants::DEPLOYMENT_IN_PROGRESS)
}
