// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kubernetes reconciliation for the `OLSConfig` resource.
//!
//! # Reconciliation Architecture
//!
//! The operator follows the standard Kubernetes controller pattern:
//!
//! 1. **Watch** - the `OLSConfig`, the objects it owns and annotated inputs
//! 2. **Reconcile** - generate the desired objects for each subsystem and
//!    compare them with the live ones
//! 3. **Update** - create, update or restart what drifted
//! 4. **Status** - report one condition per subsystem back on the CR
//!
//! # Subsystems
//!
//! - [`console`] - console plugin Deployment, `ConsolePlugin` and activation
//! - [`postgres`] - conversation cache
//! - [`appserver`] - application server and its configuration file
//!
//! Each subsystem exposes two ordered task lists run by [`tasks::run_phases`].
//!
//! # Example: Running a Pass
//!
//! ```rust,no_run
//! use lightspeed_operator::context::Context;
//! use lightspeed_operator::crd::OLSConfig;
//! use lightspeed_operator::reconcilers::reconcile_olsconfig;
//! use std::sync::Arc;
//!
//! async fn reconcile_once(ctx: Arc<Context>, cr: OLSConfig) {
//!     let _ = reconcile_olsconfig(Arc::new(cr), ctx).await;
//! }
//! ```

pub mod appserver;
pub mod console;
pub mod deployment;
pub mod finalizers;
pub mod olsconfig;
pub mod postgres;
pub mod resources;
pub mod retry;
pub mod status;
pub mod tasks;

pub use appserver::reconcile_app_server;
pub use console::{reconcile_console_ui, remove_console_ui};
pub use olsconfig::{error_policy, reconcile_olsconfig, ReconcileError};
pub use postgres::reconcile_postgres;
