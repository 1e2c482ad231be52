// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#![allow(unexpected_cfgs)]

//! # Lightspeed Operator - OpenShift Lightspeed for Kubernetes
//!
//! A Kubernetes operator written in Rust that deploys and maintains the
//! OpenShift Lightspeed AI assistant from a single `OLSConfig` custom
//! resource.
//!
//! ## Overview
//!
//! The operator drives three subsystems toward the state the `OLSConfig`
//! declares:
//!
//! - the **application server** answering assistant queries, with its
//!   generated `olsconfig.yaml`
//! - the **Postgres conversation cache**, with generated credentials
//! - the **console plugin** that surfaces the assistant in the OpenShift
//!   web console
//!
//! ## Modules
//!
//! - [`crd`] - the `OLSConfig` custom resource
//! - [`reconcilers`] - per-subsystem task lists and the top-level loop
//! - [`context`] - client and startup options shared by every task
//! - [`fingerprint`] - content hashing and resource-version capture
//! - [`watchers`] - mapping of watched Secrets and ConfigMaps to the CR
//! - [`health`] - `/metrics`, `/healthz` and `/readyz`
//!
//! ## Example
//!
//! ```rust,no_run
//! use lightspeed_operator::crd::{OLSConfig, OLSConfigSpec, OLSSpec};
//!
//! let cr = OLSConfig::new(
//!     "cluster",
//!     OLSConfigSpec {
//!         ols: OLSSpec {
//!             default_model: "granite".to_string(),
//!             ..Default::default()
//!         },
//!         ..Default::default()
//!     },
//! );
//! ```

pub mod constants;
pub mod context;
pub mod crd;
pub mod fingerprint;
pub mod health;
pub mod labels;
pub mod metrics;
pub mod reconcilers;
pub mod status_reasons;
pub mod watchers;

#[cfg(test)]
pub(crate) mod testing;

#[cfg(test)]
mod crd_tests;
