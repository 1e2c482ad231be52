// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#[cfg(test)]
mod tests {
    use crate::fingerprint::*;
    use crate::testing::{core_path, mock_client, TEST_NAMESPACE};
    use http::Method;
    use serde_json::json;

    #[test]
    fn test_hash_bytes_is_stable_sha256() {
        assert_eq!(
            hash_bytes(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(hash_bytes(b"secret"), hash_bytes(b"secret"));
        assert_ne!(hash_bytes(b"secret"), hash_bytes(b"secret2"));
        assert_eq!(hash_bytes(b"abc").len(), 64);
    }

    #[test]
    fn test_dependency_version_annotation_is_per_object() {
        assert_eq!(
            dependency_version_annotation("secret", "openai-creds"),
            "ols.openshift.io/secret-openai-creds-version"
        );
        assert_ne!(
            dependency_version_annotation("secret", "a"),
            dependency_version_annotation("secret", "b")
        );
        assert_ne!(
            dependency_version_annotation("secret", "a"),
            dependency_version_annotation("configmap", "a")
        );
    }

    #[test]
    fn test_dependency_version_annotation_shortens_long_names() {
        let long = "x".repeat(200);
        let key = dependency_version_annotation("secret", &long);
        let (prefix, segment) = key.split_once('/').unwrap();

        assert_eq!(prefix, "ols.openshift.io");
        assert!(segment.len() <= 63);
        assert!(segment.starts_with("secret-") && segment.ends_with("-version"));
        assert_ne!(key, dependency_version_annotation("secret", &"y".repeat(200)));
    }

    #[test]
    fn test_version_changed_matrix() {
        let same: Result<Option<String>, ()> = Ok(Some("7".to_string()));
        let other: Result<Option<String>, ()> = Ok(Some("8".to_string()));
        let gone: Result<Option<String>, ()> = Ok(None);
        let failed: Result<Option<String>, ()> = Err(());

        assert!(!version_changed(Some("7"), &same));
        assert!(version_changed(Some("7"), &other));
        assert!(version_changed(Some("7"), &gone));
        assert!(version_changed(None, &same));
        assert!(!version_changed(None, &gone));
        assert!(version_changed(Some("7"), &failed));
        assert!(version_changed(None, &failed));
    }

    #[tokio::test]
    async fn test_secret_resource_version_found() {
        let (client, mut server) = mock_client();
        let lookup = tokio::spawn(async move {
            get_secret_resource_version(&client, TEST_NAMESPACE, "creds").await
        });

        server
            .ok(
                Method::GET,
                &core_path("secrets", "creds"),
                json!({
                    "apiVersion": "v1",
                    "kind": "Secret",
                    "metadata": {"name": "creds", "namespace": TEST_NAMESPACE, "resourceVersion": "42"}
                }),
            )
            .await;

        assert_eq!(lookup.await.unwrap().unwrap(), Some("42".to_string()));
    }

    #[tokio::test]
    async fn test_configmap_resource_version_not_found_is_none() {
        let (client, mut server) = mock_client();
        let lookup = tokio::spawn(async move {
            get_configmap_resource_version(&client, TEST_NAMESPACE, "olsconfig").await
        });

        server
            .not_found(Method::GET, &core_path("configmaps", "olsconfig"))
            .await;

        assert_eq!(lookup.await.unwrap().unwrap(), None);
    }

    #[tokio::test]
    async fn test_resource_version_server_error_counts_as_change() {
        let (client, mut server) = mock_client();
        let lookup = tokio::spawn(async move {
            get_configmap_resource_version(&client, TEST_NAMESPACE, "olsconfig").await
        });

        server
            .server_error(Method::GET, &core_path("configmaps", "olsconfig"))
            .await;

        let observed = lookup.await.unwrap();
        assert!(observed.is_err());
        assert!(version_changed(Some("1"), &observed));
    }
}
