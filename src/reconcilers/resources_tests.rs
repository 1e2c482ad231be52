// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `resources.rs`

#[cfg(test)]
mod tests {
    use crate::crd::{OLSConfig, StorageSpec};
    use crate::labels::app_server_selector_labels;
    use crate::reconcilers::appserver::assets::{
        app_server_network_policy, app_server_service, app_server_service_account, ols_config_map,
    };
    use crate::reconcilers::appserver::deployment::generate_app_server_deployment;
    use crate::reconcilers::console::assets::{
        console_plugin, console_ui_config_map, console_ui_deployment, console_ui_network_policy,
        console_ui_service,
    };
    use crate::reconcilers::postgres::assets::{
        postgres_bootstrap_secret, postgres_config_map, postgres_network_policy, postgres_pvc,
        postgres_secret, postgres_service,
    };
    use crate::reconcilers::postgres::deployment::generate_postgres_deployment;
    use crate::reconcilers::resources::*;
    use crate::testing::{
        core_collection, core_path, mock_client, mock_context, test_olsconfig, to_json,
        TEST_NAMESPACE,
    };
    use http::Method;
    use k8s_openapi::api::core::v1::{Secret, Service, ServicePort, ServiceSpec};
    use k8s_openapi::api::networking::v1::{NetworkPolicy, NetworkPolicySpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
    use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
    use kube::Api;
    use serde_json::json;

    fn service(protocol: Option<&str>) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some("lightspeed-app-server".to_string()),
                labels: Some(app_server_selector_labels()),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                selector: Some(app_server_selector_labels()),
                ports: Some(vec![ServicePort {
                    name: Some("https".to_string()),
                    port: 8443,
                    protocol: protocol.map(str::to_string),
                    target_port: Some(IntOrString::String("https".to_string())),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            status: None,
        }
    }

    #[test]
    fn test_owner_reference_points_at_cr() {
        let cr = test_olsconfig();
        let owner = owner_reference(&cr).unwrap();

        assert_eq!(owner.api_version, "ols.openshift.io/v1alpha1");
        assert_eq!(owner.kind, "OLSConfig");
        assert_eq!(owner.name, "cluster");
        assert_eq!(owner.uid, cr.metadata.uid.clone().unwrap());
        assert_eq!(owner.controller, Some(true));
    }

    #[test]
    fn test_owner_reference_requires_uid() {
        let mut cr = test_olsconfig();
        cr.metadata.uid = None;
        assert!(owner_reference(&cr).is_err());
    }

    #[test]
    fn test_owned_metadata() {
        let cr = test_olsconfig();
        let meta = owned_metadata(&cr, "olsconfig", TEST_NAMESPACE, app_server_selector_labels())
            .unwrap();

        assert_eq!(meta.name.as_deref(), Some("olsconfig"));
        assert_eq!(meta.namespace.as_deref(), Some(TEST_NAMESPACE));
        assert_eq!(meta.labels, Some(app_server_selector_labels()));
        assert_eq!(meta.owner_references.unwrap().len(), 1);
    }

    #[test]
    fn test_service_equal_defaults_protocol_and_ignores_cluster_ip() {
        let desired = service(None);
        let mut live = service(Some("TCP"));
        live.spec.as_mut().unwrap().cluster_ip = Some("172.30.0.10".to_string());
        assert!(service_equal(&desired, &live));

        let mut other_port = service(None);
        other_port.spec.as_mut().unwrap().ports.as_mut().unwrap()[0].port = 9443;
        assert!(!service_equal(&desired, &other_port));

        let mut other_labels = service(None);
        other_labels.metadata.labels = None;
        assert!(!service_equal(&desired, &other_labels));
    }

    #[test]
    fn test_network_policy_equal() {
        let policy = |types: Vec<&str>| NetworkPolicy {
            metadata: ObjectMeta {
                labels: Some(app_server_selector_labels()),
                ..Default::default()
            },
            spec: Some(NetworkPolicySpec {
                pod_selector: Some(LabelSelector {
                    match_labels: Some(app_server_selector_labels()),
                    ..Default::default()
                }),
                policy_types: Some(types.into_iter().map(str::to_string).collect()),
                ..Default::default()
            }),
        };

        assert!(network_policy_equal(&policy(vec!["Ingress"]), &policy(vec!["Ingress"])));
        assert!(!network_policy_equal(&policy(vec!["Ingress"]), &policy(vec!["Egress"])));
    }

    #[tokio::test]
    async fn test_get_optional_maps_not_found_to_none() {
        let (client, mut server) = mock_client();
        let task = tokio::spawn(async move {
            let api: Api<Secret> = Api::namespaced(client, TEST_NAMESPACE);
            get_optional(&api, "missing").await
        });

        server.not_found(Method::GET, &core_path("secrets", "missing")).await;
        assert!(task.await.unwrap().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_optional_propagates_other_errors() {
        let (client, mut server) = mock_client();
        let task = tokio::spawn(async move {
            let api: Api<Secret> = Api::namespaced(client, TEST_NAMESPACE);
            get_optional(&api, "creds").await
        });

        server.server_error(Method::GET, &core_path("secrets", "creds")).await;
        assert!(task.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_create_resource_posts_to_collection() {
        let (client, mut server) = mock_client();
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some("creds".to_string()),
                namespace: Some(TEST_NAMESPACE.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let task =
            tokio::spawn(async move { create_resource(&client, TEST_NAMESPACE, &secret).await });

        let post = server.created(&core_collection("secrets")).await;
        task.await.unwrap().unwrap();
        assert_eq!(post.body["metadata"]["name"], "creds");
    }

    #[tokio::test]
    async fn test_delete_if_exists_tolerates_absence() {
        let (client, mut server) = mock_client();
        let task = tokio::spawn(async move {
            delete_if_exists::<Secret>(&client, TEST_NAMESPACE, "gone").await
        });

        server.not_found(Method::DELETE, &core_path("secrets", "gone")).await;
        assert!(!task.await.unwrap().unwrap());
    }

    #[tokio::test]
    async fn test_delete_if_exists_reports_deletion() {
        let (client, mut server) = mock_client();
        let task = tokio::spawn(async move {
            delete_if_exists::<Secret>(&client, TEST_NAMESPACE, "creds").await
        });

        server
            .ok(
                Method::DELETE,
                &core_path("secrets", "creds"),
                json!({
                    "apiVersion": "v1",
                    "kind": "Secret",
                    "metadata": {"name": "creds", "namespace": TEST_NAMESPACE}
                }),
            )
            .await;
        assert!(task.await.unwrap().unwrap());
    }

    fn assert_single_controller_owner(what: &str, meta: &ObjectMeta, cr: &OLSConfig) {
        let refs = meta.owner_references.as_deref().unwrap_or_default();
        assert_eq!(refs.len(), 1, "{what} must have exactly one owner reference");
        let owner = &refs[0];
        assert_eq!(owner.controller, Some(true), "{what} owner is not the controller");
        assert_eq!(owner.kind, "OLSConfig", "{what} owner kind");
        assert_eq!(owner.name, "cluster", "{what} owner name");
        assert_eq!(Some(owner.uid.as_str()), cr.metadata.uid.as_deref(), "{what} owner uid");
    }

    #[test]
    fn test_every_generated_object_has_one_controller_owner() {
        let cr = test_olsconfig();
        let ns = TEST_NAMESPACE;

        let generated: Vec<(&str, ObjectMeta)> = vec![
            ("postgres configmap", postgres_config_map(&cr, ns).unwrap().metadata),
            ("postgres bootstrap secret", postgres_bootstrap_secret(&cr, ns).unwrap().metadata),
            (
                "postgres secret",
                postgres_secret(&cr, ns, "lightspeed-postgres-secret", "cGFzcw==")
                    .unwrap()
                    .metadata,
            ),
            ("postgres network policy", postgres_network_policy(&cr, ns).unwrap().metadata),
            ("postgres service", postgres_service(&cr, ns).unwrap().metadata),
            (
                "postgres pvc",
                postgres_pvc(&cr, ns, &StorageSpec::default()).unwrap().metadata,
            ),
            ("olsconfig configmap", ols_config_map(&cr, ns, vec![]).unwrap().metadata),
            (
                "app server service account",
                app_server_service_account(&cr, ns).unwrap().metadata,
            ),
            ("app server network policy", app_server_network_policy(&cr, ns).unwrap().metadata),
            ("app server service", app_server_service(&cr, ns).unwrap().metadata),
            ("console configmap", console_ui_config_map(&cr, ns).unwrap().metadata),
            ("console network policy", console_ui_network_policy(&cr, ns).unwrap().metadata),
            (
                "console deployment",
                console_ui_deployment(&cr, ns, "quay.io/openshift-lightspeed/console:latest")
                    .unwrap()
                    .metadata,
            ),
            ("console service", console_ui_service(&cr, ns).unwrap().metadata),
            ("console plugin", console_plugin(&cr, ns).unwrap().metadata),
        ];

        for (what, meta) in &generated {
            assert_single_controller_owner(what, meta, &cr);
        }
    }

    #[tokio::test]
    async fn test_generated_deployments_have_one_controller_owner() {
        let (ctx, mut server) = mock_context();
        let cr = test_olsconfig();
        let owner = cr.clone();
        let secret = postgres_secret(&cr, TEST_NAMESPACE, "lightspeed-postgres-secret", "cGFzcw==")
            .unwrap();
        let secret_path = core_path("secrets", "lightspeed-postgres-secret");

        let task = tokio::spawn(async move {
            let postgres = generate_postgres_deployment(&ctx, &cr).await?;
            let app_server = generate_app_server_deployment(&ctx, &cr).await?;
            anyhow::Ok((postgres, app_server))
        });

        server.ok(Method::GET, &secret_path, to_json(&secret)).await;
        server
            .not_found(Method::GET, &core_path("configmaps", "lightspeed-postgres-conf"))
            .await;
        server.ok(Method::GET, &secret_path, to_json(&secret)).await;

        server
            .not_found(Method::GET, &core_path("configmaps", "olsconfig"))
            .await;
        server.not_found(Method::GET, &secret_path).await;
        server
            .not_found(Method::GET, &core_path("configmaps", "kube-root-ca.crt"))
            .await;

        let (postgres, app_server) = task.await.unwrap().unwrap();
        assert_single_controller_owner("postgres deployment", &postgres.metadata, &owner);
        assert_single_controller_owner("app server deployment", &app_server.metadata, &owner);
    }
}
