// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Test doubles shared by the unit tests.
//!
//! [`mock_client`] returns a `kube::Client` whose transport is a
//! `tower_test` mock. The paired [`ApiServer`] answers the requests a reconcile
//! task issues one at a time, asserting verb and path in order.

use crate::context::{Context, OperatorOptions};
use crate::crd::{OLSConfig, OLSConfigSpec, OLSSpec};
use http::{Method, Request, Response};
use http_body_util::BodyExt;
use kube::client::Body;
use kube::Client;
use serde_json::{json, Value};
use tower_test::mock::{self, Handle};

pub const TEST_NAMESPACE: &str = "openshift-lightspeed";

/// A request observed by the mock API server.
#[derive(Debug)]
pub struct Captured {
    pub method: Method,
    pub path: String,
    pub query: String,
    pub body: Value,
}

/// Scripted API server behind a mocked client.
pub struct ApiServer {
    handle: Handle<Request<Body>, Response<Body>>,
}

pub fn mock_client() -> (Client, ApiServer) {
    let (service, handle) = mock::pair::<Request<Body>, Response<Body>>();
    (Client::new(service, TEST_NAMESPACE), ApiServer { handle })
}

/// A context backed by a mocked client, using the default options.
pub fn mock_context() -> (Context, ApiServer) {
    let (client, server) = mock_client();
    (Context::new(client, OperatorOptions::default()), server)
}

impl ApiServer {
    /// Answer the next request with `status` and `response`, asserting its verb and path.
    pub async fn expect(&mut self, method: Method, path: &str, status: u16, response: Value) -> Captured {
        let (request, send) = self
            .handle
            .next_request()
            .await
            .expect("client issued no further request");
        let (parts, body) = request.into_parts();
        assert_eq!(parts.method, method, "unexpected verb for {}", parts.uri);
        assert_eq!(parts.uri.path(), path, "unexpected path");

        let bytes = body.collect().await.expect("request body").to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        send.send_response(
            Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&response).unwrap()))
                .unwrap(),
        );

        Captured {
            method: parts.method,
            path: parts.uri.path().to_string(),
            query: parts.uri.query().unwrap_or_default().to_string(),
            body,
        }
    }

    /// Answer the next request with 200 and `response`.
    pub async fn ok(&mut self, method: Method, path: &str, response: Value) -> Captured {
        self.expect(method, path, 200, response).await
    }

    /// Answer the next request with 201 and echo the submitted object back.
    pub async fn created(&mut self, path: &str) -> Captured {
        let (request, send) = self
            .handle
            .next_request()
            .await
            .expect("client issued no further request");
        let (parts, body) = request.into_parts();
        assert_eq!(parts.method, Method::POST, "unexpected verb for {}", parts.uri);
        assert_eq!(parts.uri.path(), path, "unexpected path");

        let bytes = body.collect().await.expect("request body").to_bytes();
        let body: Value = serde_json::from_slice(&bytes).expect("json body");
        send.send_response(
            Response::builder()
                .status(201)
                .header("content-type", "application/json")
                .body(Body::from(bytes.to_vec()))
                .unwrap(),
        );

        Captured {
            method: parts.method,
            path: parts.uri.path().to_string(),
            query: parts.uri.query().unwrap_or_default().to_string(),
            body,
        }
    }

    /// Answer the next request by echoing its body with HTTP 200 (PUT/PATCH).
    pub async fn echo(&mut self, method: Method, path: &str) -> Captured {
        let (request, send) = self
            .handle
            .next_request()
            .await
            .expect("client issued no further request");
        let (parts, body) = request.into_parts();
        assert_eq!(parts.method, method, "unexpected verb for {}", parts.uri);
        assert_eq!(parts.uri.path(), path, "unexpected path");

        let bytes = body.collect().await.expect("request body").to_bytes();
        let body: Value = serde_json::from_slice(&bytes).expect("json body");
        send.send_response(
            Response::builder()
                .status(200)
                .header("content-type", "application/json")
                .body(Body::from(bytes.to_vec()))
                .unwrap(),
        );

        Captured {
            method: parts.method,
            path: parts.uri.path().to_string(),
            query: parts.uri.query().unwrap_or_default().to_string(),
            body,
        }
    }

    /// Answer the next request with a 404 Status.
    pub async fn not_found(&mut self, method: Method, path: &str) -> Captured {
        self.expect(method, path, 404, status_body(404, "NotFound")).await
    }

    /// Answer the next request with a 409 Status.
    pub async fn conflict(&mut self, method: Method, path: &str) -> Captured {
        self.expect(method, path, 409, status_body(409, "Conflict")).await
    }

    /// Answer the next request with a 500 Status.
    pub async fn server_error(&mut self, method: Method, path: &str) -> Captured {
        self.expect(method, path, 500, status_body(500, "InternalError"))
            .await
    }
}

pub fn status_body(code: u16, reason: &str) -> Value {
    json!({
        "kind": "Status",
        "apiVersion": "v1",
        "metadata": {},
        "status": "Failure",
        "message": reason.to_lowercase(),
        "reason": reason,
        "code": code
    })
}

/// Path of a core (v1) namespaced object.
pub fn core_path(plural: &str, name: &str) -> String {
    format!("/api/v1/namespaces/{TEST_NAMESPACE}/{plural}/{name}")
}

/// Path of a core (v1) namespaced collection.
pub fn core_collection(plural: &str) -> String {
    format!("/api/v1/namespaces/{TEST_NAMESPACE}/{plural}")
}

/// Path of a namespaced object in a named API group.
pub fn group_path(group_version: &str, plural: &str, name: &str) -> String {
    format!("/apis/{group_version}/namespaces/{TEST_NAMESPACE}/{plural}/{name}")
}

/// A persisted `OLSConfig` named `cluster` with a UID, ready for owner references.
pub fn test_olsconfig() -> OLSConfig {
    let mut cr = OLSConfig::new(
        "cluster",
        OLSConfigSpec {
            ols: OLSSpec {
                default_model: "granite".to_string(),
                default_provider: Some("watsonx".to_string()),
                ..Default::default()
            },
            ..Default::default()
        },
    );
    cr.metadata.uid = Some("3f1c2a4e-0000-4000-8000-000000000001".to_string());
    cr.metadata.generation = Some(1);
    cr.metadata.resource_version = Some("100".to_string());
    cr
}

/// Serialize a typed object for use as a mock response.
pub fn to_json<T: serde::Serialize>(obj: &T) -> Value {
    serde_json::to_value(obj).unwrap()
}
