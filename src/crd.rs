// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definition for the Lightspeed operator.
//!
//! A single cluster-scoped [`OLSConfig`] named `cluster` declares the desired
//! state of the whole OpenShift Lightspeed installation: LLM providers, the
//! application server, the Postgres conversation cache and the console plugin.
//!
//! # Example
//!
//! ```rust,no_run
//! use lightspeed_operator::crd::{LLMSpec, OLSConfigSpec, OLSSpec, ProviderSpec, SecretRef};
//!
//! let spec = OLSConfigSpec {
//!     llm: LLMSpec {
//!         providers: vec![ProviderSpec {
//!             name: "openai".to_string(),
//!             r#type: "openai".to_string(),
//!             credentials_secret_ref: SecretRef { name: "openai-creds".to_string() },
//!             ..Default::default()
//!         }],
//!     },
//!     ols: OLSSpec {
//!         default_model: "gpt-4o".to_string(),
//!         default_provider: Some("openai".to_string()),
//!         ..Default::default()
//!     },
//! };
//! ```

use crate::constants::{
    DEFAULT_LOG_LEVEL, POSTGRES_DEFAULT_DB_NAME, POSTGRES_DEFAULT_USER, POSTGRES_MAX_CONNECTIONS,
    POSTGRES_SECRET_NAME, POSTGRES_SHARED_BUFFERS,
};
use k8s_openapi::api::core::v1::{ResourceRequirements, Toleration};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Condition represents an observation of the operand's current state.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition: `ConsolePluginReady`, `CacheReady`, `ApiReady` or `Reconciled`.
    pub r#type: String,

    /// Status of the condition: True, False, or Unknown.
    pub status: String,

    /// Brief CamelCase reason for the condition's last transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message indicating details about the transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the condition transitioned from one status to another (RFC3339 format).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,

    /// Generation of the `OLSConfig` the condition was computed for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// Reference to a Secret or ConfigMap in the operator namespace.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
pub struct SecretRef {
    /// Name of the referenced object.
    pub name: String,
}

/// Model parameters.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModelParametersSpec {
    /// Maximum number of tokens the model may produce for one response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens_for_response: Option<u32>,
}

/// A model offered by an LLM provider.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModelSpec {
    /// Model name as understood by the provider.
    pub name: String,

    /// Model API endpoint, when different from the provider URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Context window size in tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window_size: Option<u32>,

    /// Generation parameters.
    #[serde(default)]
    pub parameters: ModelParametersSpec,
}

/// An LLM provider and the models it serves.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSpec {
    /// Provider name referenced by `defaultProvider`.
    pub name: String,

    /// Provider API URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Provider type (`openai`, `azure_openai`, `watsonx`, `rhoai_vllm`, ...).
    pub r#type: String,

    /// Secret holding the provider API token.
    #[serde(default)]
    pub credentials_secret_ref: SecretRef,

    /// Models served by this provider.
    #[serde(default)]
    pub models: Vec<ModelSpec>,

    /// Azure OpenAI deployment name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_name: Option<String>,

    /// Azure OpenAI API version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    /// Watsonx project ID.
    #[serde(default, rename = "projectID", skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

/// LLM configuration.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LLMSpec {
    /// Configured LLM providers.
    #[serde(default)]
    pub providers: Vec<ProviderSpec>,
}

/// Conversation cache backend.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Default, PartialEq, Eq, JsonSchema)]
pub enum CacheType {
    /// Postgres-backed cache managed by the operator.
    #[default]
    #[serde(rename = "postgres")]
    Postgres,
}

/// Postgres conversation cache settings.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostgresSpec {
    /// Database user (default `postgres`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Database name (default `postgres`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_name: Option<String>,

    /// Credentials Secret name (default `lightspeed-postgres-secret`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_secret: Option<String>,

    /// `shared_buffers` setting (default `256MB`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_buffers: Option<String>,

    /// `max_connections` setting (default 2000).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 1, max = 262_143))]
    pub max_connections: Option<i32>,
}

impl PostgresSpec {
    /// Credentials Secret name, falling back to the generated default.
    #[must_use]
    pub fn credentials_secret_name(&self) -> &str {
        self.credentials_secret
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(POSTGRES_SECRET_NAME)
    }

    #[must_use]
    pub fn user_name(&self) -> &str {
        self.user
            .as_deref()
            .filter(|u| !u.is_empty())
            .unwrap_or(POSTGRES_DEFAULT_USER)
    }

    #[must_use]
    pub fn database_name(&self) -> &str {
        self.db_name
            .as_deref()
            .filter(|d| !d.is_empty())
            .unwrap_or(POSTGRES_DEFAULT_DB_NAME)
    }

    #[must_use]
    pub fn shared_buffers_or_default(&self) -> &str {
        self.shared_buffers
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(POSTGRES_SHARED_BUFFERS)
    }

    #[must_use]
    pub fn max_connections_or_default(&self) -> i32 {
        self.max_connections
            .filter(|c| *c > 0)
            .unwrap_or(POSTGRES_MAX_CONNECTIONS)
    }
}

/// Conversation cache configuration.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConversationCacheSpec {
    /// Cache backend.
    #[serde(default)]
    pub r#type: CacheType,

    /// Postgres settings.
    #[serde(default)]
    pub postgres: PostgresSpec,
}

/// Scheduling and sizing of one operand container.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContainerConfig {
    /// Resource requests and limits; operand defaults apply when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    /// Pod tolerations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerations: Option<Vec<Toleration>>,

    /// Pod node selector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,
}

/// Console plugin container configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleContainerConfig {
    /// Whether the console plugin is deployed (default true).
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Number of console plugin replicas.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Resource requests and limits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    /// Pod tolerations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerations: Option<Vec<Toleration>>,

    /// Pod node selector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,

    /// PEM CA certificate the console uses when proxying to the app server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_certificate: Option<String>,
}

impl Default for ConsoleContainerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            replicas: None,
            resources: None,
            tolerations: None,
            node_selector: None,
            ca_certificate: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Deployment settings of every operand.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfig {
    /// App server replicas (default 1).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// App server container.
    #[serde(default)]
    pub api: ContainerConfig,

    /// Console plugin container.
    #[serde(default)]
    pub console: ConsoleContainerConfig,

    /// Postgres container.
    #[serde(default)]
    pub database: ContainerConfig,
}

/// Persistent storage of the Postgres data directory.
///
/// Absent storage means the database runs on an `emptyDir` volume.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageSpec {
    /// Requested size (default `1Gi`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,

    /// StorageClass name (default: the cluster default class).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
}

/// Regex-based redaction applied to user queries.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryFilterSpec {
    pub name: String,
    pub pattern: String,
    pub replace_with: String,
}

/// User data collection switches.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserDataCollectionSpec {
    #[serde(default)]
    pub feedback_disabled: bool,
    #[serde(default)]
    pub transcripts_disabled: bool,
}

/// Custom serving certificate for the app server.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TLSConfig {
    /// Secret containing `tls.crt` and `tls.key`.
    pub key_cert_secret_ref: SecretRef,
}

/// OpenShift Lightspeed service configuration.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OLSSpec {
    /// Conversation cache settings.
    #[serde(default)]
    pub conversation_cache: ConversationCacheSpec,

    /// Operand deployment settings.
    #[serde(default)]
    pub deployment: DeploymentConfig,

    /// App server log level (default `INFO`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Default model used for queries.
    pub default_model: String,

    /// Default provider used for queries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_provider: Option<String>,

    /// Query redaction filters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub query_filters: Vec<QueryFilterSpec>,

    /// User data collection switches.
    #[serde(default)]
    pub user_data_collection: UserDataCollectionSpec,

    /// Custom serving certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_config: Option<TLSConfig>,

    /// ConfigMap with extra CA certificates trusted by the app server.
    #[serde(
        default,
        rename = "additionalCAConfigMapRef",
        skip_serializing_if = "Option::is_none"
    )]
    pub additional_ca_config_map_ref: Option<SecretRef>,

    /// Persistent storage of the conversation cache.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageSpec>,
}

impl OLSSpec {
    /// App server log level, falling back to `INFO`.
    #[must_use]
    pub fn log_level_or_default(&self) -> &str {
        self.log_level
            .as_deref()
            .filter(|l| !l.is_empty())
            .unwrap_or(DEFAULT_LOG_LEVEL)
    }

    /// Name of the user-supplied serving certificate Secret, if any.
    #[must_use]
    pub fn tls_secret_name(&self) -> Option<&str> {
        self.tls_config
            .as_ref()
            .map(|t| t.key_cert_secret_ref.name.as_str())
            .filter(|n| !n.is_empty())
    }

    /// Name of the additional CA ConfigMap, if any.
    #[must_use]
    pub fn additional_ca_name(&self) -> Option<&str> {
        self.additional_ca_config_map_ref
            .as_ref()
            .map(|r| r.name.as_str())
            .filter(|n| !n.is_empty())
    }
}

/// `OLSConfig` is the Schema for the olsconfigs API.
///
/// # Example YAML
///
/// ```yaml
/// apiVersion: ols.openshift.io/v1alpha1
/// kind: OLSConfig
/// metadata:
///   name: cluster
/// spec:
///   llm:
///     providers:
///       - name: openai
///         type: openai
///         url: https://api.openai.com/v1
///         credentialsSecretRef:
///           name: openai-creds
///         models:
///           - name: gpt-4o
///   ols:
///     defaultModel: gpt-4o
///     defaultProvider: openai
///     storage:
///       size: 5Gi
/// ```
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
#[kube(
    group = "ols.openshift.io",
    version = "v1alpha1",
    kind = "OLSConfig",
    plural = "olsconfigs",
    doc = "OLSConfig declares the desired state of the OpenShift Lightspeed installation. The operator only acts on the instance named cluster."
)]
#[kube(status = "OLSConfigStatus")]
#[serde(rename_all = "camelCase")]
pub struct OLSConfigSpec {
    /// LLM providers.
    pub llm: LLMSpec,

    /// Service configuration.
    pub ols: OLSSpec,
}

/// `OLSConfig` status
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
pub struct OLSConfigStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}
