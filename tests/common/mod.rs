// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

// Common test utilities for integration tests

#![allow(dead_code)]

use kube::{
    api::{Api, DeleteParams, PostParams},
    client::Client,
};
use lightspeed_operator::constants::OLS_CONFIG_NAME;
use lightspeed_operator::crd::{
    LLMSpec, ModelSpec, OLSConfig, OLSConfigSpec, OLSSpec, ProviderSpec, SecretRef,
};
use serde_json::json;
use std::time::Duration;
use tokio::time::sleep;

/// Get a Kubernetes client or skip the test if not in a cluster
pub async fn get_kube_client_or_skip() -> Option<Client> {
    match Client::try_default().await {
        Ok(client) => Some(client),
        Err(e) => {
            eprintln!("Skipping integration test: not running in Kubernetes cluster: {}", e);
            None
        }
    }
}

/// Create a test namespace
pub async fn create_test_namespace(
    client: &Client,
    name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let namespaces: Api<k8s_openapi::api::core::v1::Namespace> = Api::all(client.clone());

    let ns = serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": {
            "name": name,
            "labels": {
                "test": "integration",
                "managed-by": "lightspeed-operator-test"
            }
        }
    }))?;

    match namespaces.create(&PostParams::default(), &ns).await {
        Ok(_) => {
            println!("Created test namespace: {}", name);
            Ok(())
        }
        Err(kube::Error::Api(ae)) if ae.code == 409 => {
            println!("Test namespace already exists: {}", name);
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}

/// Cleanup test namespace
pub async fn cleanup_test_namespace(
    client: &Client,
    name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let namespaces: Api<k8s_openapi::api::core::v1::Namespace> = Api::all(client.clone());

    match namespaces.delete(name, &DeleteParams::default()).await {
        Ok(_) => {
            println!("Deleted test namespace: {}", name);
            Ok(())
        }
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            println!("Test namespace already deleted: {}", name);
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}

/// A minimal `OLSConfig` named `cluster` with one OpenAI provider
pub fn minimal_olsconfig(credentials_secret: &str) -> OLSConfig {
    OLSConfig::new(
        OLS_CONFIG_NAME,
        OLSConfigSpec {
            llm: LLMSpec {
                providers: vec![ProviderSpec {
                    name: "openai".to_string(),
                    url: Some("https://api.openai.com/v1".to_string()),
                    r#type: "openai".to_string(),
                    credentials_secret_ref: SecretRef {
                        name: credentials_secret.to_string(),
                    },
                    models: vec![ModelSpec {
                        name: "gpt-4o-mini".to_string(),
                        ..Default::default()
                    }],
                    ..Default::default()
                }],
            },
            ols: OLSSpec {
                default_model: "gpt-4o-mini".to_string(),
                default_provider: Some("openai".to_string()),
                ..Default::default()
            },
            ..Default::default()
        },
    )
}

/// Create a provider credentials Secret holding an `apitoken` key
pub async fn create_provider_secret(
    client: &Client,
    namespace: &str,
    name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let secrets: Api<k8s_openapi::api::core::v1::Secret> =
        Api::namespaced(client.clone(), namespace);

    let secret = serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": { "name": name },
        "stringData": { "apitoken": "integration-test-token" }
    }))?;

    match secrets.create(&PostParams::default(), &secret).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(()),
        Err(e) => Err(Box::new(e)),
    }
}

/// Delete the `cluster` OLSConfig, ignoring a missing object
pub async fn delete_olsconfig(client: &Client) -> Result<(), Box<dyn std::error::Error>> {
    let api: Api<OLSConfig> = Api::all(client.clone());
    match api.delete(OLS_CONFIG_NAME, &DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
        Err(e) => Err(Box::new(e)),
    }
}

/// Poll until `check` returns true or `timeout` elapses
pub async fn wait_for<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if check().await {
            return true;
        }
        sleep(Duration::from_secs(2)).await;
    }
    false
}
