// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the Lightspeed operator.
//!
//! This module contains all fixed names, ports, images, annotation keys and
//! timings used throughout the codebase. Managed resource names are fixed
//! literals because the `OLSConfig` custom resource is a cluster singleton.

// ============================================================================
// API Constants
// ============================================================================

/// API group of the `OLSConfig` CRD
pub const API_GROUP: &str = "ols.openshift.io";

/// API version of the `OLSConfig` CRD
pub const API_VERSION: &str = "v1alpha1";

/// Fully qualified API version (group/version)
pub const API_GROUP_VERSION: &str = "ols.openshift.io/v1alpha1";

/// Kind name for the `OLSConfig` resource
pub const KIND_OLS_CONFIG: &str = "OLSConfig";

/// The only `OLSConfig` name the operator acts upon
pub const OLS_CONFIG_NAME: &str = "cluster";

/// Finalizer guarding console plugin removal
pub const OLS_CONFIG_FINALIZER: &str = "ols.openshift.io/finalizer";

/// Default namespace the operand is deployed into
pub const DEFAULT_NAMESPACE: &str = "openshift-lightspeed";

// ============================================================================
// Annotation Keys
// ============================================================================

/// Pod template annotation bumped to force a rolling restart
pub const FORCE_RELOAD_ANNOTATION: &str = "ols.openshift.io/force-reload";

/// Marks an externally-owned Secret or ConfigMap as feeding the singleton CR
pub const WATCHER_ANNOTATION: &str = "ols.openshift.io/watcher";

/// Resource version of the Postgres ConfigMap last consumed by the Postgres Deployment
pub const POSTGRES_CONFIGMAP_VERSION_ANNOTATION: &str =
    "ols.openshift.io/postgres-configmap-version";

/// Resource version of the Postgres credentials Secret last consumed by a Deployment
pub const POSTGRES_SECRET_VERSION_ANNOTATION: &str = "ols.openshift.io/postgres-secret-version";

/// Resource version of the `olsconfig` ConfigMap last consumed by the app server
pub const OLS_CONFIGMAP_VERSION_ANNOTATION: &str = "ols.openshift.io/olsconfig-configmap-version";

/// Resource version of the additional CA ConfigMap last consumed by the app server
pub const ADDITIONAL_CA_VERSION_ANNOTATION: &str =
    "ols.openshift.io/additional-ca-configmap-version";

/// Prefix of the per-object resource-version annotations on a consuming Deployment
pub const DEPENDENCY_VERSION_ANNOTATION_PREFIX: &str = "ols.openshift.io/";

/// Longest name segment allowed in an annotation key
pub const ANNOTATION_NAME_MAX_LEN: usize = 63;

/// SHA-256 of the generated Postgres password, stored on the credentials Secret
pub const POSTGRES_SECRET_HASH_ANNOTATION: &str = "hash/postgres-secret";

/// SHA-256 of the generated `olsconfig.yaml`, stored on the `olsconfig` ConfigMap
pub const OLS_CONFIG_HASH_ANNOTATION: &str = "hash/olsconfig";

/// Annotation asking the service CA operator to issue a serving certificate
pub const SERVING_CERT_SECRET_ANNOTATION: &str = "service.beta.openshift.io/serving-cert-secret-name";

/// Annotation flagging the cluster default StorageClass
pub const DEFAULT_STORAGE_CLASS_ANNOTATION: &str = "storageclass.kubernetes.io/is-default-class";

// ============================================================================
// Volume Constants
// ============================================================================

/// Default file mode for ConfigMap and Secret volumes (0644)
pub const VOLUME_DEFAULT_MODE: i32 = 420;

/// Restricted file mode for credential volumes (0600)
pub const VOLUME_RESTRICTED_MODE: i32 = 0o600;

/// Shared writable `/tmp` volume name
pub const TMP_VOLUME_NAME: &str = "tmp-writable-volume";

/// Mount path for the writable `/tmp` volume
pub const TMP_VOLUME_MOUNT_PATH: &str = "/tmp";

/// Service CA bundle ConfigMap injected by OpenShift into every namespace
pub const SERVICE_CA_CONFIGMAP: &str = "openshift-service-ca.crt";

/// Cluster root CA ConfigMap
pub const KUBE_ROOT_CA_CONFIGMAP: &str = "kube-root-ca.crt";

/// Root directory for certificate mounts
pub const CERTS_MOUNT_ROOT: &str = "/etc/certs";

// ============================================================================
// Postgres Constants
// ============================================================================

/// Postgres Deployment name
pub const POSTGRES_DEPLOYMENT_NAME: &str = "lightspeed-postgres-server";

/// Postgres Service name
pub const POSTGRES_SERVICE_NAME: &str = "lightspeed-postgres-server";

/// Postgres NetworkPolicy name
pub const POSTGRES_NETWORK_POLICY_NAME: &str = "lightspeed-postgres-server";

/// Postgres container name
pub const POSTGRES_CONTAINER_NAME: &str = "lightspeed-postgres-server";

/// Default Postgres image
pub const POSTGRES_DEFAULT_IMAGE: &str = "registry.redhat.io/rhel9/postgresql-16@sha256:42f385ac3c9b8913426da7c57e70bc6617cd237aaf697c667f6385a8c0b0118b";

/// Postgres server port
pub const POSTGRES_SERVICE_PORT: i32 = 5432;

/// Name of the Postgres container/service port
pub const POSTGRES_PORT_NAME: &str = "server";

/// Default Postgres user
pub const POSTGRES_DEFAULT_USER: &str = "postgres";

/// Default Postgres database name
pub const POSTGRES_DEFAULT_DB_NAME: &str = "postgres";

/// Default Postgres credentials Secret name
pub const POSTGRES_SECRET_NAME: &str = "lightspeed-postgres-secret";

/// Key of the password inside the credentials Secret
pub const POSTGRES_SECRET_KEY_NAME: &str = "password";

/// Number of random bytes behind a generated password
pub const POSTGRES_PASSWORD_BYTES: usize = 12;

/// Serving certificate Secret for the Postgres service
pub const POSTGRES_CERTS_SECRET_NAME: &str = "lightspeed-postgres-certs";

/// Bootstrap Secret holding the extension script
pub const POSTGRES_BOOTSTRAP_SECRET_NAME: &str = "lightspeed-postgres-bootstrap";

/// Key of the extension script inside the bootstrap Secret
pub const POSTGRES_EXTENSION_SCRIPT: &str = "create-extensions.sh";

/// Mount path of the extension script
pub const POSTGRES_BOOTSTRAP_MOUNT_PATH: &str =
    "/usr/share/container-scripts/postgresql/start/create-extensions.sh";

/// Postgres server configuration ConfigMap
pub const POSTGRES_CONFIGMAP_NAME: &str = "lightspeed-postgres-conf";

/// Key of the server configuration inside the ConfigMap
pub const POSTGRES_CONFIG_KEY: &str = "postgresql.conf.sample";

/// Mount path of the server configuration
pub const POSTGRES_CONFIG_MOUNT_PATH: &str = "/usr/share/pgsql/postgresql.conf.sample";

/// Data volume name
pub const POSTGRES_DATA_VOLUME: &str = "postgres-data";

/// Data volume mount path
pub const POSTGRES_DATA_MOUNT_PATH: &str = "/var/lib/pgsql";

/// Unix socket directory volume name
pub const POSTGRES_VAR_RUN_VOLUME: &str = "lightspeed-postgres-var-run";

/// Unix socket directory mount path
pub const POSTGRES_VAR_RUN_MOUNT_PATH: &str = "/var/run/postgresql";

/// Volume name of the service CA bundle mounted into Postgres clients and server
pub const POSTGRES_CA_VOLUME: &str = "cm-olspostgresca";

/// PersistentVolumeClaim name for the Postgres data volume
pub const POSTGRES_PVC_NAME: &str = "lightspeed-postgres-pvc";

/// Default PVC size when storage is requested without a size
pub const POSTGRES_DEFAULT_PVC_SIZE: &str = "1Gi";

/// Default value of `POSTGRESQL_SHARED_BUFFERS`
pub const POSTGRES_SHARED_BUFFERS: &str = "256MB";

/// Default value of `POSTGRESQL_MAX_CONNECTIONS`
pub const POSTGRES_MAX_CONNECTIONS: i32 = 2000;

/// SSL mode the app server uses to reach Postgres
pub const POSTGRES_SSL_MODE: &str = "require";

/// Extra label carried only by operator-generated credentials Secrets
pub const POSTGRES_CREDENTIALS_LABEL: &str = "ols.openshift.io/credentials";

/// Value of [`POSTGRES_CREDENTIALS_LABEL`]
pub const POSTGRES_CREDENTIALS_LABEL_VALUE: &str = "postgres";

// ============================================================================
// Application Server Constants
// ============================================================================

/// App server Deployment name
pub const APP_SERVER_DEPLOYMENT_NAME: &str = "lightspeed-app-server";

/// App server Service name
pub const APP_SERVER_SERVICE_NAME: &str = "lightspeed-app-server";

/// App server ServiceAccount name
pub const APP_SERVER_SERVICE_ACCOUNT_NAME: &str = "lightspeed-app-server";

/// App server NetworkPolicy name
pub const APP_SERVER_NETWORK_POLICY_NAME: &str = "lightspeed-app-server";

/// App server container name
pub const APP_SERVER_CONTAINER_NAME: &str = "lightspeed-service-api";

/// Default app server image
pub const APP_SERVER_DEFAULT_IMAGE: &str =
    "quay.io/openshift-lightspeed/lightspeed-service-api:latest";

/// App server HTTPS port (container and service)
pub const APP_SERVER_PORT: i32 = 8443;

/// App server serving certificate Secret
pub const APP_SERVER_TLS_SECRET_NAME: &str = "lightspeed-tls";

/// ConfigMap holding `olsconfig.yaml`
pub const OLS_CONFIGMAP_NAME: &str = "olsconfig";

/// File name of the app server configuration
pub const OLS_CONFIG_FILENAME: &str = "olsconfig.yaml";

/// Volume name of the `olsconfig` ConfigMap
pub const OLS_CONFIG_VOLUME: &str = "cm-olsconfig";

/// Mount directory of the `olsconfig` ConfigMap
pub const OLS_CONFIG_MOUNT_ROOT: &str = "/etc/ols";

/// Mount root for LLM provider API keys
pub const API_KEY_MOUNT_ROOT: &str = "/etc/apikeys";

/// Mount root for Postgres credentials
pub const CREDENTIALS_MOUNT_ROOT: &str = "/etc/credentials";

/// Volume name of the cluster root CA bundle
pub const OPENSHIFT_CA_VOLUME: &str = "openshift-ca";

/// Mount path of the cluster root CA bundle
pub const OPENSHIFT_CA_MOUNT_PATH: &str = "/etc/certs/ols-additional-ca";

/// Volume name of the user-supplied CA bundle
pub const ADDITIONAL_CA_VOLUME: &str = "additional-ca";

/// Mount path of the user-supplied CA bundle
pub const ADDITIONAL_CA_MOUNT_PATH: &str = "/etc/certs/ols-user-ca";

/// Volume name of the merged certificate bundle
pub const CERT_BUNDLE_VOLUME: &str = "cert-bundle";

/// Mount path of the merged certificate bundle
pub const CERT_BUNDLE_MOUNT_PATH: &str = "/etc/certs/cert-bundle";

/// Directory for feedback and transcripts
pub const USER_DATA_MOUNT_PATH: &str = "/app-root/ols-user-data";

/// Provider type that needs Azure-specific configuration
pub const AZURE_OPENAI_TYPE: &str = "azure_openai";

/// Default log level of the app server
pub const DEFAULT_LOG_LEVEL: &str = "INFO";

// ============================================================================
// Console Plugin Constants
// ============================================================================

/// Name shared by the console plugin Deployment, Service, ConfigMap,
/// NetworkPolicy and `ConsolePlugin`
pub const CONSOLE_UI_NAME: &str = "lightspeed-console-plugin";

/// Console plugin serving certificate Secret
pub const CONSOLE_UI_CERT_SECRET_NAME: &str = "lightspeed-console-plugin-cert";

/// Default console plugin image
pub const CONSOLE_UI_DEFAULT_IMAGE: &str =
    "quay.io/openshift-lightspeed/lightspeed-console-plugin:latest";

/// Console plugin HTTPS port
pub const CONSOLE_UI_PORT: i32 = 9443;

/// Display name of the `ConsolePlugin`
pub const CONSOLE_UI_DISPLAY_NAME: &str = "Lightspeed Console";

/// Proxy alias the console uses to reach the app server
pub const CONSOLE_PROXY_ALIAS: &str = "ols";

/// Name of the cluster `Console` operator resource
pub const CONSOLE_CR_NAME: &str = "cluster";

/// Namespace the OpenShift console runs in
pub const CONSOLE_NAMESPACE: &str = "openshift-console";

// ============================================================================
// Status Constants
// ============================================================================

/// Prefix of the condition message while a Deployment rolls out
pub const DEPLOYMENT_IN_PROGRESS: &str = "In Progress";

// ============================================================================
// Controller Timing Constants
// ============================================================================

/// Requeue interval after an error or while a Deployment rolls out
pub const ERROR_REQUEUE_DURATION_SECS: u64 = 30;

/// Default periodic reconcile interval in minutes
pub const DEFAULT_RECONCILE_INTERVAL_MINUTES: u64 = 10;

/// Number of Tokio worker threads
pub const TOKIO_WORKER_THREADS: usize = 4;

// ============================================================================
// Leader Election Constants
// ============================================================================

/// Lease object name used for leader election
pub const LEADER_LEASE_NAME: &str = "lightspeed-operator-lock";

/// Lease duration in seconds
pub const DEFAULT_LEASE_DURATION_SECS: u64 = 15;

/// Grace period in seconds before an expired lease may be taken over
pub const DEFAULT_LEASE_GRACE_SECS: u64 = 5;

// ============================================================================
// Server Constants
// ============================================================================

/// Default bind address of the metrics server
pub const DEFAULT_METRICS_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default bind address of the health probe server
pub const DEFAULT_HEALTH_PROBE_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Metrics endpoint path
pub const METRICS_SERVER_PATH: &str = "/metrics";
