// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! HTTP endpoints for Prometheus and the kubelet probes.
//!
//! - `/metrics` on the metrics address: the [`crate::metrics`] registry
//! - `/healthz` on the probe address: always 200 while the process serves
//! - `/readyz` on the probe address: 200 once the controller has started

use crate::constants::METRICS_SERVER_PATH;
use crate::metrics::gather_metrics;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Readiness flag shared between the controller and the probe server.
#[derive(Debug, Default)]
pub struct HealthState {
    ready: AtomicBool,
}

impl HealthState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_ready() {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

async fn metrics() -> Response {
    match gather_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Router serving `/metrics`.
pub fn metrics_router() -> Router {
    Router::new().route(METRICS_SERVER_PATH, get(metrics))
}

/// Router serving `/healthz` and `/readyz`.
pub fn probe_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(state)
}

/// Serve `router` on `addr` until the process exits.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(addr: SocketAddr, router: Router, name: &str) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("{} server listening on {}", name, addr);
    axum::serve(listener, router).await
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod health_tests;
