//! CLI configuration.
//!
//! Read from `$XDG_CONFIG_HOME/fakts/config.json` unless a path is given.
//! Every field has a default, so a partial file is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use fakts_connection::store::config_dir;
use fakts_connection::{
    AppIdentity, ChallengeConfig, ConnectionConfig, ServiceDefinition, ServiceRegistry,
    graphql_builder, rest_builder,
};
use fakts_protocol::constants::{
    DEFAULT_ALIAS_TIMEOUT, DEFAULT_CHALLENGE_TIMEOUT, DEFAULT_DISCOVERY_TIMEOUT,
    DEFAULT_MAX_RETRIES, DEFAULT_POLL_INTERVAL,
};

/// Client flavour built for a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    Graphql,
    Rest,
}

/// One service the CLI asks access for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub key: String,
    pub service: String,
    #[serde(default = "default_kind")]
    pub kind: ClientKind,
    #[serde(default)]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ServiceEntry {
    fn graphql(key: &str, service: &str, name: &str, description: &str) -> Self {
        Self {
            key: key.into(),
            service: service.into(),
            kind: ClientKind::Graphql,
            optional: false,
            name: Some(name.into()),
            description: Some(description.into()),
        }
    }
}

/// The arkitekt services a stock deployment offers, all required.
fn default_services() -> Vec<ServiceEntry> {
    vec![
        ServiceEntry::graphql(
            "mikro",
            "live.arkitekt.mikro",
            "Mikro",
            "Mikro is a service for managing microservices.",
        ),
        ServiceEntry::graphql(
            "lok",
            "live.arkitekt.lok",
            "Lok",
            "Lok is a service for managing microservices.",
        ),
        ServiceEntry::graphql(
            "kabinet",
            "live.arkitekt.kabinet",
            "Kabinet",
            "Kabinet is a service for managing microservices.",
        ),
    ]
}

fn default_kind() -> ClientKind {
    ClientKind::Graphql
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub app: AppIdentity,
    pub services: Vec<ServiceEntry>,
    /// Session file; the platform default when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_path: Option<PathBuf>,
    pub discovery_timeout_ms: u64,
    pub alias_timeout_ms: u64,
    pub challenge_timeout_ms: u64,
    pub max_retries: u32,
    pub poll_interval_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_time_secs: Option<u64>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            app: AppIdentity::new("fakts-cli", env!("CARGO_PKG_VERSION"))
                .with_scopes(["openid"]),
            services: default_services(),
            session_path: None,
            discovery_timeout_ms: millis(DEFAULT_DISCOVERY_TIMEOUT),
            alias_timeout_ms: millis(DEFAULT_ALIAS_TIMEOUT),
            challenge_timeout_ms: millis(DEFAULT_CHALLENGE_TIMEOUT),
            max_retries: DEFAULT_MAX_RETRIES,
            poll_interval_ms: millis(DEFAULT_POLL_INTERVAL),
            expiration_time_secs: None,
        }
    }
}

fn millis(d: Duration) -> u64 {
    d.as_millis() as u64
}

impl CliConfig {
    /// Loads `path`, or the default config file when `path` is `None`.
    ///
    /// An explicit path must exist and parse. A broken default file is
    /// logged and replaced by defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            return serde_json::from_str(&content)
                .with_context(|| format!("parsing {}", path.display()));
        }

        let Some(path) = default_config_path() else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        match serde_json::from_str(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config, using defaults"
                );
                Ok(Self::default())
            }
        }
    }

    pub fn registry(&self) -> ServiceRegistry {
        let mut registry = ServiceRegistry::new();
        for entry in &self.services {
            let definition = match entry.kind {
                ClientKind::Graphql => {
                    ServiceDefinition::new(&entry.key, &entry.service, graphql_builder())
                }
                ClientKind::Rest => {
                    ServiceDefinition::new(&entry.key, &entry.service, rest_builder())
                }
            };
            let mut definition = definition.optional(entry.optional);
            if let Some(name) = &entry.name {
                definition = definition.name(name);
            }
            if let Some(description) = &entry.description {
                definition = definition.description(description);
            }
            registry.insert(definition);
        }
        registry
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            discovery_timeout: Duration::from_millis(self.discovery_timeout_ms),
            alias_timeout: Duration::from_millis(self.alias_timeout_ms),
            expiration_time: self.expiration_time_secs.map(Duration::from_secs),
            challenge: ChallengeConfig {
                challenge_timeout: Duration::from_millis(self.challenge_timeout_ms),
                max_retries: self.max_retries,
                poll_interval: Duration::from_millis(self.poll_interval_ms),
            },
            ..ConnectionConfig::default()
        }
    }
}

/// Returns the default config file path.
pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("fakts").join("config.json"))
}
