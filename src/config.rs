//! Configuration management for Gatekeeper.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use tracing::info;

use crate::error::{GatekeeperError, Result};
use crate::ratelimit::{PolicyRegistry, PolicyRule};

/// Prefix for environment variable overrides, e.g. `GATEKEEPER__STORE__URL`.
pub const ENV_PREFIX: &str = "GATEKEEPER";

/// Main configuration for the Gatekeeper service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatekeeperConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Counter store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,

    /// Requests whose path starts with this prefix are rate limited
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,

    /// Largest request body buffered for admission
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            path_prefix: default_path_prefix(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_path_prefix() -> String {
    "/api/notification".to_string()
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

/// Which counter store implementation to run against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Shared Redis instance
    #[default]
    Redis,
    /// Process-local map (single instance only)
    Memory,
}

/// Counter store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Redis connection URL
    #[serde(default = "default_store_url")]
    pub url: String,

    /// Namespace prepended to every counter key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Timeout for a single counter operation in milliseconds
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_ms: u64,

    /// Timeout for one connection attempt in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Connection attempts at startup
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,

    /// Backoff step between connection attempts in milliseconds
    #[serde(default = "default_connect_backoff")]
    pub connect_backoff_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            url: default_store_url(),
            key_prefix: default_key_prefix(),
            operation_timeout_ms: default_operation_timeout(),
            connect_timeout_ms: default_connect_timeout(),
            connect_attempts: default_connect_attempts(),
            connect_backoff_ms: default_connect_backoff(),
        }
    }
}

fn default_store_url() -> String {
    "redis://127.0.0.1/".to_string()
}

fn default_key_prefix() -> String {
    "gatekeeper:".to_string()
}

fn default_operation_timeout() -> u64 {
    250
}

fn default_connect_timeout() -> u64 {
    2000
}

fn default_connect_attempts() -> u32 {
    3
}

fn default_connect_backoff() -> u64 {
    200
}

/// What to do with a request when the counter store cannot answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Reject the request with 503
    #[default]
    Closed,
    /// Admit the request and log a warning
    Open,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Behaviour on counter store failure
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Notification type -> policy
    #[serde(default)]
    pub policies: HashMap<String, PolicyRule>,
}

impl RateLimitingConfig {
    /// Build the policy registry from the configured mapping.
    pub fn registry(&self) -> Result<PolicyRegistry> {
        PolicyRegistry::new(self.policies.iter().map(|(name, rule)| (name.as_str(), *rule)))
    }
}

impl GatekeeperConfig {
    /// Load configuration from an optional YAML file layered under
    /// `GATEKEEPER__<SECTION>__<FIELD>` environment variables.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            info!(path = %path, "Loading configuration file");
            builder = builder.add_source(
                ::config::File::with_name(path).format(::config::FileFormat::Yaml),
            );
        }

        let settings = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| GatekeeperError::Config(e.to_string()))
    }
}
