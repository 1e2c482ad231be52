// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `postgres/assets.rs`

#[cfg(test)]
mod tests {
    use crate::constants::{
        DEFAULT_STORAGE_CLASS_ANNOTATION, POSTGRES_CONFIG_KEY, POSTGRES_CREDENTIALS_LABEL,
        POSTGRES_EXTENSION_SCRIPT, POSTGRES_SECRET_HASH_ANNOTATION, SERVING_CERT_SECRET_ANNOTATION,
    };
    use crate::crd::StorageSpec;
    use crate::fingerprint::hash_bytes;
    use crate::labels::{app_server_selector_labels, postgres_selector_labels};
    use crate::reconcilers::postgres::assets::*;
    use crate::testing::{mock_client, test_olsconfig, TEST_NAMESPACE};
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use http::Method;
    use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
    use serde_json::json;

    const STORAGE_CLASSES_PATH: &str = "/apis/storage.k8s.io/v1/storageclasses";

    fn storage_class(name: &str, default: bool) -> serde_json::Value {
        let mut meta = json!({ "name": name });
        if default {
            meta["annotations"] = json!({ DEFAULT_STORAGE_CLASS_ANNOTATION: "true" });
        }
        json!({ "metadata": meta, "provisioner": "ebs.csi.aws.com" })
    }

    fn storage_class_list(items: Vec<serde_json::Value>) -> serde_json::Value {
        json!({
            "apiVersion": "storage.k8s.io/v1",
            "kind": "StorageClassList",
            "metadata": {},
            "items": items
        })
    }

    #[test]
    fn test_generate_password_is_base64_of_twelve_bytes() {
        let password = generate_password();
        assert_eq!(password.len(), 16);
        assert_eq!(BASE64.decode(&password).unwrap().len(), 12);
        assert_ne!(password, generate_password());
    }

    #[test]
    fn test_postgres_secret_carries_password_and_hash() {
        let cr = test_olsconfig();
        let secret = postgres_secret(&cr, TEST_NAMESPACE, "pg-creds", "c2VjcmV0cGFzcw==").unwrap();

        assert_eq!(secret.metadata.name.as_deref(), Some("pg-creds"));
        assert_eq!(
            secret.metadata.annotations.as_ref().unwrap()[POSTGRES_SECRET_HASH_ANNOTATION],
            hash_bytes(b"c2VjcmV0cGFzcw==")
        );
        assert_eq!(secret_password(&secret).as_deref(), Some("c2VjcmV0cGFzcw=="));
        assert_eq!(secret.metadata.labels, Some(credentials_labels()));
    }

    #[test]
    fn test_credentials_label_separates_bootstrap_secret() {
        let cr = test_olsconfig();
        let bootstrap = postgres_bootstrap_secret(&cr, TEST_NAMESPACE).unwrap();
        let labels = bootstrap.metadata.labels.unwrap();

        assert!(!labels.contains_key(POSTGRES_CREDENTIALS_LABEL));
        assert!(credentials_selector().contains(POSTGRES_CREDENTIALS_LABEL));
        assert!(bootstrap.string_data.unwrap()[POSTGRES_EXTENSION_SCRIPT].contains("pg_trgm"));
    }

    #[test]
    fn test_secret_password_ignores_empty_value() {
        let cr = test_olsconfig();
        let secret = postgres_secret(&cr, TEST_NAMESPACE, "pg-creds", "").unwrap();
        assert_eq!(secret_password(&secret), None);
    }

    #[test]
    fn test_postgres_config_map_enables_tls() {
        let cr = test_olsconfig();
        let cm = postgres_config_map(&cr, TEST_NAMESPACE).unwrap();
        let conf = &cm.data.unwrap()[POSTGRES_CONFIG_KEY];
        assert!(conf.contains("ssl = on"));
        assert!(conf.contains("/etc/certs/tls.crt"));
    }

    #[test]
    fn test_postgres_service_requests_serving_cert() {
        let cr = test_olsconfig();
        let service = postgres_service(&cr, TEST_NAMESPACE).unwrap();

        assert_eq!(
            service.metadata.annotations.unwrap()[SERVING_CERT_SECRET_ANNOTATION],
            "lightspeed-postgres-certs"
        );
        let spec = service.spec.unwrap();
        assert_eq!(spec.selector, Some(postgres_selector_labels()));
        let port = &spec.ports.unwrap()[0];
        assert_eq!(port.port, 5432);
        assert_eq!(port.name.as_deref(), Some("server"));
        assert_eq!(port.target_port, Some(IntOrString::Int(5432)));
    }

    #[test]
    fn test_postgres_network_policy_admits_app_server_only() {
        let cr = test_olsconfig();
        let policy = postgres_network_policy(&cr, TEST_NAMESPACE).unwrap();
        let spec = policy.spec.unwrap();

        assert_eq!(
            spec.pod_selector.unwrap().match_labels,
            Some(postgres_selector_labels())
        );
        let rule = &spec.ingress.unwrap()[0];
        assert_eq!(
            rule.from.as_ref().unwrap()[0]
                .pod_selector
                .as_ref()
                .unwrap()
                .match_labels,
            Some(app_server_selector_labels())
        );
        assert_eq!(
            rule.ports.as_ref().unwrap()[0].port,
            Some(IntOrString::Int(5432))
        );
        assert_eq!(spec.policy_types, Some(vec!["Ingress".to_string()]));
    }

    #[test]
    fn test_postgres_pvc_uses_resolved_storage() {
        let cr = test_olsconfig();
        let storage = StorageSpec {
            size: Some("5Gi".to_string()),
            class: Some("gp3-csi".to_string()),
        };
        let pvc = postgres_pvc(&cr, TEST_NAMESPACE, &storage).unwrap();
        let spec = pvc.spec.unwrap();

        assert_eq!(pvc.metadata.name.as_deref(), Some("lightspeed-postgres-pvc"));
        assert_eq!(spec.access_modes, Some(vec!["ReadWriteOnce".to_string()]));
        assert_eq!(spec.storage_class_name.as_deref(), Some("gp3-csi"));
        assert_eq!(
            spec.resources.unwrap().requests.unwrap()["storage"].0,
            "5Gi"
        );
    }

    #[tokio::test]
    async fn test_resolve_storage_keeps_explicit_class_without_lookup() {
        let (client, _server) = mock_client();
        let storage = StorageSpec {
            size: None,
            class: Some("gp3-csi".to_string()),
        };

        let resolved = resolve_storage(&client, &storage).await.unwrap();
        assert_eq!(resolved.size.as_deref(), Some("1Gi"));
        assert_eq!(resolved.class.as_deref(), Some("gp3-csi"));
    }

    #[tokio::test]
    async fn test_resolve_storage_picks_default_class() {
        let (client, mut server) = mock_client();
        let task = tokio::spawn(async move {
            resolve_storage(&client, &StorageSpec::default()).await
        });

        server
            .ok(
                Method::GET,
                STORAGE_CLASSES_PATH,
                storage_class_list(vec![
                    storage_class("slow", false),
                    storage_class("gp3-csi", true),
                ]),
            )
            .await;

        let resolved = task.await.unwrap().unwrap();
        assert_eq!(resolved.class.as_deref(), Some("gp3-csi"));
        assert_eq!(resolved.size.as_deref(), Some("1Gi"));
    }

    #[tokio::test]
    async fn test_resolve_storage_fails_without_default_class() {
        let (client, mut server) = mock_client();
        let task = tokio::spawn(async move {
            resolve_storage(&client, &StorageSpec::default()).await
        });

        server
            .ok(
                Method::GET,
                STORAGE_CLASSES_PATH,
                storage_class_list(vec![storage_class("slow", false)]),
            )
            .await;

        let err = task.await.unwrap().unwrap_err();
        assert_eq!(
            err.to_string(),
            "no storage class specified and no default storage class configured"
        );
    }
}
