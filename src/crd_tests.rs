// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#[cfg(test)]
mod tests {
    use crate::crd::*;
    use kube::CustomResourceExt;
    use serde_json::json;

    fn minimal_spec() -> serde_json::Value {
        json!({
            "llm": {
                "providers": [{
                    "name": "watsonx",
                    "type": "watsonx",
                    "url": "https://us-south.ml.cloud.ibm.com",
                    "projectID": "abc-123",
                    "credentialsSecretRef": {"name": "watsonx-creds"},
                    "models": [{"name": "granite", "parameters": {"maxTokensForResponse": 512}}]
                }]
            },
            "ols": {"defaultModel": "granite"}
        })
    }

    #[test]
    fn test_minimal_spec_deserializes_with_defaults() {
        let spec: OLSConfigSpec = serde_json::from_value(minimal_spec()).unwrap();

        assert_eq!(spec.llm.providers.len(), 1);
        assert_eq!(spec.llm.providers[0].project_id.as_deref(), Some("abc-123"));
        assert_eq!(
            spec.llm.providers[0].models[0]
                .parameters
                .max_tokens_for_response,
            Some(512)
        );
        assert!(spec.ols.deployment.console.enabled);
        assert!(spec.ols.storage.is_none());
        assert_eq!(spec.ols.conversation_cache.r#type, CacheType::Postgres);
        assert_eq!(spec.ols.log_level_or_default(), "INFO");
    }

    #[test]
    fn test_console_can_be_disabled() {
        let mut value = minimal_spec();
        value["ols"]["deployment"] = json!({"console": {"enabled": false}});
        let spec: OLSConfigSpec = serde_json::from_value(value).unwrap();
        assert!(!spec.ols.deployment.console.enabled);
    }

    #[test]
    fn test_postgres_spec_defaults() {
        let pg = PostgresSpec::default();
        assert_eq!(pg.credentials_secret_name(), "lightspeed-postgres-secret");
        assert_eq!(pg.user_name(), "postgres");
        assert_eq!(pg.database_name(), "postgres");
        assert_eq!(pg.shared_buffers_or_default(), "256MB");
        assert_eq!(pg.max_connections_or_default(), 2000);

        let custom = PostgresSpec {
            credentials_secret: Some("my-pg".to_string()),
            max_connections: Some(50),
            ..Default::default()
        };
        assert_eq!(custom.credentials_secret_name(), "my-pg");
        assert_eq!(custom.max_connections_or_default(), 50);
    }

    #[test]
    fn test_empty_credentials_secret_falls_back() {
        let pg = PostgresSpec {
            credentials_secret: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(pg.credentials_secret_name(), "lightspeed-postgres-secret");
    }

    #[test]
    fn test_additional_ca_and_tls_names() {
        let mut value = minimal_spec();
        value["ols"]["additionalCAConfigMapRef"] = json!({"name": "my-ca"});
        value["ols"]["tlsConfig"] = json!({"keyCertSecretRef": {"name": "my-tls"}});
        let spec: OLSConfigSpec = serde_json::from_value(value).unwrap();

        assert_eq!(spec.ols.additional_ca_name(), Some("my-ca"));
        assert_eq!(spec.ols.tls_secret_name(), Some("my-tls"));

        let round_trip = serde_json::to_value(&spec).unwrap();
        assert_eq!(round_trip["ols"]["additionalCAConfigMapRef"]["name"], "my-ca");
    }

    #[test]
    fn test_crd_is_cluster_scoped() {
        let crd = OLSConfig::crd();
        assert_eq!(crd.spec.group, "ols.openshift.io");
        assert_eq!(crd.spec.scope, "Cluster");
        assert_eq!(crd.spec.names.kind, "OLSConfig");
        assert_eq!(crd.spec.names.plural, "olsconfigs");
        assert!(crd.spec.versions[0].subresources.is_some());
    }

    #[test]
    fn test_crd_matches_api_constants() {
        use crate::constants::{API_GROUP, API_GROUP_VERSION, API_VERSION, KIND_OLS_CONFIG};
        use kube::Resource;

        assert_eq!(OLSConfig::group(&()), API_GROUP);
        assert_eq!(OLSConfig::version(&()), API_VERSION);
        assert_eq!(OLSConfig::api_version(&()), API_GROUP_VERSION);
        assert_eq!(OLSConfig::kind(&()), KIND_OLS_CONFIG);
    }
}
