// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `olsconfig.yaml`, the application server configuration file.
//!
//! The file is regenerated from the `OLSConfig` on every pass and serialized
//! with `serde_yaml`. Field order is fixed by the structs below, so identical
//! input always yields identical bytes and the content hash is stable.

use crate::constants::{
    API_KEY_MOUNT_ROOT, AZURE_OPENAI_TYPE, CERT_BUNDLE_MOUNT_PATH,
    CREDENTIALS_MOUNT_ROOT, POSTGRES_SECRET_KEY_NAME, POSTGRES_SERVICE_NAME,
    POSTGRES_SERVICE_PORT, POSTGRES_SSL_MODE, USER_DATA_MOUNT_PATH,
};
use crate::crd::{OLSConfig, ProviderSpec};
use anyhow::{Context as _, Result};
use serde::Serialize;

/// Directory the app server reads the Postgres service CA from
pub const POSTGRES_CA_MOUNT_PATH: &str = "/etc/certs/postgres-ca";

/// Directory the app server serving certificate is mounted at
pub const TLS_MOUNT_PATH: &str = "/etc/certs/lightspeed-tls";

#[derive(Debug, Serialize, PartialEq)]
pub struct AppServerConfigFile {
    pub llm_providers: Vec<ProviderConfig>,
    pub ols_config: OlsConfigSection,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials_path: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<ModelConfig>,
    #[serde(rename = "type")]
    pub provider_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub azure_openai_config: Option<AzureOpenAIConfig>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct AzureOpenAIConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub credentials_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_name: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ModelConfig {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_window_size: Option<u32>,
    pub parameters: ModelParameters,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ModelParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens_for_response: Option<u32>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct OlsConfigSection {
    pub default_model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_provider: Option<String>,
    pub logging_config: LoggingConfig,
    pub conversation_cache: ConversationCacheConfig,
    pub tls_config: TlsConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub query_filters: Vec<QueryFilter>,
    pub user_data_collection: UserDataCollectionConfig,
    #[serde(rename = "extra_ca", skip_serializing_if = "Vec::is_empty")]
    pub extra_cas: Vec<String>,
    pub certificate_directory: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct LoggingConfig {
    pub app_log_level: String,
    pub lib_log_level: String,
    pub uvicorn_log_level: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ConversationCacheConfig {
    #[serde(rename = "type")]
    pub cache_type: String,
    pub postgres: PostgresCacheConfig,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct PostgresCacheConfig {
    pub host: String,
    pub port: i32,
    pub user: String,
    pub dbname: String,
    pub password_path: String,
    pub ssl_mode: String,
    pub ca_cert_path: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct TlsConfig {
    pub tls_certificate_path: String,
    pub tls_key_path: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct QueryFilter {
    pub name: String,
    pub pattern: String,
    pub replace_with: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct UserDataCollectionConfig {
    pub feedback_disabled: bool,
    pub feedback_storage: String,
    pub transcripts_disabled: bool,
    pub transcripts_storage: String,
}

/// Mount directory of a provider credentials Secret.
#[must_use]
pub fn provider_credentials_path(provider: &ProviderSpec) -> String {
    format!("{API_KEY_MOUNT_ROOT}/{}", provider.credentials_secret_ref.name)
}

/// Mount directory of the Postgres credentials Secret.
#[must_use]
pub fn postgres_credentials_path(secret_name: &str) -> String {
    format!("{CREDENTIALS_MOUNT_ROOT}/{secret_name}")
}

fn provider_config(provider: &ProviderSpec) -> ProviderConfig {
    let models = provider
        .models
        .iter()
        .map(|m| ModelConfig {
            name: m.name.clone(),
            url: m.url.clone(),
            context_window_size: m.context_window_size,
            parameters: ModelParameters {
                max_tokens_for_response: m.parameters.max_tokens_for_response,
            },
        })
        .collect();
    let credentials_path = provider_credentials_path(provider);

    if provider.r#type == AZURE_OPENAI_TYPE {
        ProviderConfig {
            name: provider.name.clone(),
            url: None,
            credentials_path: None,
            models,
            provider_type: provider.r#type.clone(),
            project_id: None,
            api_version: provider.api_version.clone(),
            azure_openai_config: Some(AzureOpenAIConfig {
                url: provider.url.clone(),
                credentials_path,
                deployment_name: provider.deployment_name.clone(),
            }),
        }
    } else {
        ProviderConfig {
            name: provider.name.clone(),
            url: provider.url.clone(),
            credentials_path: Some(credentials_path),
            models,
            provider_type: provider.r#type.clone(),
            project_id: provider.project_id.clone(),
            api_version: None,
            azure_openai_config: None,
        }
    }
}

/// Build the configuration file model.
///
/// `extra_cas` lists the CA files mounted into the container.
#[must_use]
pub fn app_server_config(
    cr: &OLSConfig,
    namespace: &str,
    extra_cas: Vec<String>,
) -> AppServerConfigFile {
    let ols = &cr.spec.ols;
    let postgres = &ols.conversation_cache.postgres;
    let log_level = ols.log_level_or_default().to_string();

    AppServerConfigFile {
        llm_providers: cr.spec.llm.providers.iter().map(provider_config).collect(),
        ols_config: OlsConfigSection {
            default_model: ols.default_model.clone(),
            default_provider: ols.default_provider.clone(),
            logging_config: LoggingConfig {
                app_log_level: log_level.clone(),
                lib_log_level: log_level.clone(),
                uvicorn_log_level: log_level,
            },
            conversation_cache: ConversationCacheConfig {
                cache_type: "postgres".to_string(),
                postgres: PostgresCacheConfig {
                    host: format!("{POSTGRES_SERVICE_NAME}.{namespace}.svc"),
                    port: POSTGRES_SERVICE_PORT,
                    user: postgres.user_name().to_string(),
                    dbname: postgres.database_name().to_string(),
                    password_path: format!(
                        "{}/{POSTGRES_SECRET_KEY_NAME}",
                        postgres_credentials_path(postgres.credentials_secret_name())
                    ),
                    ssl_mode: POSTGRES_SSL_MODE.to_string(),
                    ca_cert_path: format!("{POSTGRES_CA_MOUNT_PATH}/service-ca.crt"),
                },
            },
            tls_config: TlsConfig {
                tls_certificate_path: format!("{TLS_MOUNT_PATH}/tls.crt"),
                tls_key_path: format!("{TLS_MOUNT_PATH}/tls.key"),
            },
            query_filters: ols
                .query_filters
                .iter()
                .map(|f| QueryFilter {
                    name: f.name.clone(),
                    pattern: f.pattern.clone(),
                    replace_with: f.replace_with.clone(),
                })
                .collect(),
            user_data_collection: UserDataCollectionConfig {
                feedback_disabled: ols.user_data_collection.feedback_disabled,
                feedback_storage: format!("{USER_DATA_MOUNT_PATH}/feedback"),
                transcripts_disabled: ols.user_data_collection.transcripts_disabled,
                transcripts_storage: format!("{USER_DATA_MOUNT_PATH}/transcripts"),
            },
            extra_cas,
            certificate_directory: CERT_BUNDLE_MOUNT_PATH.to_string(),
        },
    }
}

/// Render `olsconfig.yaml`.
///
/// # Errors
///
/// Returns an error if YAML serialization fails.
pub fn render_app_server_config(
    cr: &OLSConfig,
    namespace: &str,
    extra_cas: Vec<String>,
) -> Result<String> {
    serde_yaml::to_string(&app_server_config(cr, namespace, extra_cas))
        .context("failed to generate OLS config file")
}

/// Container path of a CA file mounted from a ConfigMap key.
#[must_use]
pub fn ca_file_path(mount_path: &str, key: &str) -> String {
    format!("{mount_path}/{key}")
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
