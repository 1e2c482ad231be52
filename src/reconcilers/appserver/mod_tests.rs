// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the app server task lists

#[cfg(test)]
mod tests {
    use crate::constants::{OLS_CONFIG_HASH_ANNOTATION, WATCHER_ANNOTATION};
    use crate::crd::{ProviderSpec, SecretRef};
    use crate::reconcilers::appserver::assets::{app_server_service, ols_config_map};
    use crate::reconcilers::appserver::*;
    use crate::testing::{core_path, mock_context, test_olsconfig, to_json, TEST_NAMESPACE};
    use http::Method;
    use serde_json::json;

    fn with_provider(secret: &str) -> crate::crd::OLSConfig {
        let mut cr = test_olsconfig();
        cr.spec.llm.providers = vec![ProviderSpec {
            name: "openai".to_string(),
            r#type: "openai".to_string(),
            credentials_secret_ref: SecretRef {
                name: secret.to_string(),
            },
            ..Default::default()
        }];
        cr
    }

    #[tokio::test]
    async fn test_ols_config_map_unchanged_is_skipped() {
        let (ctx, mut server) = mock_context();
        let cr = test_olsconfig();
        let live = to_json(&ols_config_map(&cr, TEST_NAMESPACE, vec![]).unwrap());
        let task = tokio::spawn(async move { reconcile_ols_config_map(&ctx, &cr).await });

        server
            .not_found(Method::GET, &core_path("configmaps", "kube-root-ca.crt"))
            .await;
        server
            .ok(Method::GET, &core_path("configmaps", "olsconfig"), live)
            .await;
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_ols_config_map_regenerated_on_content_change() {
        let (ctx, mut server) = mock_context();
        let cr = test_olsconfig();
        let desired = ols_config_map(&cr, TEST_NAMESPACE, vec![]).unwrap();
        let expected_hash = desired.metadata.annotations.as_ref().unwrap()
            [OLS_CONFIG_HASH_ANNOTATION]
            .clone();

        let mut stale = test_olsconfig();
        stale.spec.ols.default_model = "old-model".to_string();
        let mut live = ols_config_map(&stale, TEST_NAMESPACE, vec![]).unwrap();
        live.metadata.resource_version = Some("5".to_string());
        let live = to_json(&live);

        let task = tokio::spawn(async move { reconcile_ols_config_map(&ctx, &cr).await });

        server
            .not_found(Method::GET, &core_path("configmaps", "kube-root-ca.crt"))
            .await;
        let path = core_path("configmaps", "olsconfig");
        server.ok(Method::GET, &path, live).await;
        let put = server.echo(Method::PUT, &path).await;
        task.await.unwrap().unwrap();

        assert_eq!(put.body["metadata"]["resourceVersion"], "5");
        assert_eq!(
            put.body["metadata"]["annotations"][OLS_CONFIG_HASH_ANNOTATION],
            expected_hash
        );
        assert!(put.body["data"]["olsconfig.yaml"]
            .as_str()
            .unwrap()
            .contains("default_model: granite"));
    }

    #[tokio::test]
    async fn test_additional_ca_skipped_when_unset() {
        let (ctx, _server) = mock_context();
        let cr = test_olsconfig();
        reconcile_additional_ca_config_map(&ctx, &cr).await.unwrap();
    }

    #[tokio::test]
    async fn test_llm_secret_gets_watcher_annotation() {
        let (ctx, mut server) = mock_context();
        let cr = with_provider("openai-creds");
        let task = tokio::spawn(async move { reconcile_llm_secrets(&ctx, &cr).await });

        let secret = json!({"metadata": {"name": "openai-creds", "namespace": TEST_NAMESPACE}});
        let path = core_path("secrets", "openai-creds");
        server.ok(Method::GET, &path, secret.clone()).await;
        let patch = server.ok(Method::PATCH, &path, secret).await;
        task.await.unwrap().unwrap();

        assert_eq!(
            patch.body["metadata"]["annotations"][WATCHER_ANNOTATION],
            "cluster"
        );
    }

    #[tokio::test]
    async fn test_missing_llm_secret_fails() {
        let (ctx, mut server) = mock_context();
        let cr = with_provider("openai-creds");
        let task = tokio::spawn(async move { reconcile_llm_secrets(&ctx, &cr).await });

        server
            .not_found(Method::GET, &core_path("secrets", "openai-creds"))
            .await;
        let err = task.await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "LLM provider secret openai-creds not found");
    }

    #[tokio::test]
    async fn test_service_port_drift_is_updated() {
        let (ctx, mut server) = mock_context();
        let cr = test_olsconfig();
        let mut live = app_server_service(&cr, TEST_NAMESPACE).unwrap();
        if let Some(spec) = live.spec.as_mut() {
            spec.cluster_ip = Some("172.30.0.10".to_string());
            spec.ports.as_mut().unwrap()[0].port = 8080;
        }
        let live = to_json(&live);
        let task = tokio::spawn(async move { reconcile_app_server_service(&ctx, &cr).await });

        let path = core_path("services", "lightspeed-app-server");
        server.ok(Method::GET, &path, live).await;
        let put = server.echo(Method::PUT, &path).await;
        task.await.unwrap().unwrap();

        assert_eq!(put.body["spec"]["ports"][0]["port"], 8443);
        assert_eq!(put.body["spec"]["clusterIP"], "172.30.0.10");
    }

    #[tokio::test]
    async fn test_tls_secret_requires_key() {
        let (ctx, mut server) = mock_context();
        let cr = test_olsconfig();
        let task = tokio::spawn(async move { reconcile_tls_secret(&ctx, &cr).await });

        server
            .ok(
                Method::GET,
                &core_path("secrets", "lightspeed-tls"),
                json!({"metadata": {"name": "lightspeed-tls"}, "data": {"tls.crt": "Y2VydA=="}}),
            )
            .await;
        let err = task.await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "TLS secret lightspeed-tls has no tls.key");
    }

    #[tokio::test]
    async fn test_tls_secret_complete() {
        let (ctx, mut server) = mock_context();
        let cr = test_olsconfig();
        let task = tokio::spawn(async move { reconcile_tls_secret(&ctx, &cr).await });

        server
            .ok(
                Method::GET,
                &core_path("secrets", "lightspeed-tls"),
                json!({
                    "metadata": {"name": "lightspeed-tls"},
                    "data": {"tls.crt": "Y2VydA==", "tls.key": "a2V5"}
                }),
            )
            .await;
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_user_tls_secret_marked_as_watched() {
        let (ctx, mut server) = mock_context();
        let mut cr = test_olsconfig();
        cr.spec.ols.tls_config = Some(crate::crd::TLSConfig {
            key_cert_secret_ref: SecretRef {
                name: "user-tls".to_string(),
            },
        });
        let task = tokio::spawn(async move { reconcile_tls_secret(&ctx, &cr).await });

        let path = core_path("secrets", "user-tls");
        let secret = json!({
            "metadata": {"name": "user-tls", "namespace": TEST_NAMESPACE},
            "data": {"tls.crt": "Y2VydA==", "tls.key": "a2V5"}
        });
        server.ok(Method::GET, &path, secret.clone()).await;
        let patch = server.ok(Method::PATCH, &path, secret).await;
        task.await.unwrap().unwrap();

        assert_eq!(
            patch.body["metadata"]["annotations"][WATCHER_ANNOTATION],
            "cluster"
        );
    }
}
