//! Provider configuration and bridge settings.
//!
//! Providers are declared in a flat JSON file (an ordered array of
//! [`ProviderConfig`] records). The manager reads it once at start-up; the
//! administrative API may overwrite it through [`ProviderConfigStore::save`],
//! but a running manager does not hot-reload it.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use bon::Builder;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::error::{BridgeError, Result};

/// Separator between provider and capability in qualified capability names.
pub const QUALIFIED_NAME_SEPARATOR: char = '.';

pub const DEFAULT_CONFIG_PATH: &str = "data/mcp_configs.json";
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// How the bridge talks to a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransportKind {
    /// Spawn a child process and speak over its stdin/stdout.
    #[default]
    Stdio,
    /// Connect to a remote streamable-HTTP endpoint.
    #[serde(alias = "sse", alias = "streamable_http")]
    Http,
}

/// One external tool provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(default)]
    pub transport: TransportKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Overrides layered on top of the bridge's own environment.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl ProviderConfig {
    /// A provider launched as a child process.
    pub fn stdio(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: TransportKind::Stdio,
            command: Some(command.into()),
            args: Vec::new(),
            env: BTreeMap::new(),
            url: None,
            headers: BTreeMap::new(),
        }
    }

    /// A provider reached over a streamable-HTTP endpoint.
    pub fn http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: TransportKind::Http,
            command: None,
            args: Vec::new(),
            env: BTreeMap::new(),
            url: Some(url.into()),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

/// Why `config` cannot be started alongside the names already `accepted`.
///
/// Names must be non-empty, unique and free of the qualified-name separator.
/// Surrounding whitespace is ignored.
pub fn provider_config_issue(
    config: &ProviderConfig,
    accepted: &HashSet<String>,
) -> Option<String> {
    let name = config.name.trim();
    if name.is_empty() {
        return Some("provider name must not be empty".into());
    }
    if name.contains(QUALIFIED_NAME_SEPARATOR) {
        return Some(format!(
            "provider name '{name}' must not contain '{QUALIFIED_NAME_SEPARATOR}'"
        ));
    }
    if accepted.contains(name) {
        return Some(format!("duplicate provider name '{name}'"));
    }
    None
}

/// Reject config lists that cannot be keyed by name.
pub fn validate_provider_configs(configs: &[ProviderConfig]) -> Result<()> {
    let mut accepted = HashSet::with_capacity(configs.len());
    for config in configs {
        if let Some(issue) = provider_config_issue(config, &accepted) {
            return Err(BridgeError::Configuration(issue));
        }
        accepted.insert(config.name.trim().to_owned());
    }
    Ok(())
}

/// Reads and writes the provider configuration file.
#[derive(Debug, Clone)]
pub struct ProviderConfigStore {
    path: PathBuf,
}

impl ProviderConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the provider list.
    ///
    /// A missing or malformed file is an empty list, and records that do not
    /// parse are skipped; both are logged. Only IO errors are returned.
    pub fn load(&self) -> Result<Vec<ProviderConfig>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no provider config file");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        let records = match serde_json::from_str::<Vec<serde_json::Value>>(&raw) {
            Ok(records) => records,
            Err(error) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %error,
                    "provider config file is malformed; starting with no providers"
                );
                return Ok(Vec::new());
            }
        };
        let configs: Vec<ProviderConfig> = records
            .into_iter()
            .enumerate()
            .filter_map(|(index, record)| match serde_json::from_value(record) {
                Ok(config) => Some(config),
                Err(error) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        index,
                        error = %error,
                        "skipping malformed provider config"
                    );
                    None
                }
            })
            .collect();
        tracing::debug!(
            path = %self.path.display(),
            providers = configs.len(),
            "loaded provider configs"
        );
        Ok(configs)
    }

    /// Overwrite the provider list. Takes effect on the next restart.
    pub fn save(&self, configs: &[ProviderConfig]) -> Result<()> {
        validate_provider_configs(configs)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let body = serde_json::to_string_pretty(configs)?;
        let staging = self.path.with_extension("json.tmp");
        std::fs::write(&staging, body)?;
        std::fs::rename(&staging, &self.path)?;
        Ok(())
    }
}

/// Timeouts and file locations for the bridge.
#[derive(Debug, Clone, Builder)]
pub struct BridgeSettings {
    /// Deadline for spawn/open plus the initialize handshake.
    #[builder(default = DEFAULT_HANDSHAKE_TIMEOUT)]
    pub handshake_timeout: Duration,
    /// Deadline for one capability listing.
    #[builder(default = DEFAULT_DISCOVERY_TIMEOUT)]
    pub discovery_timeout: Duration,
    /// Deadline for one capability invocation.
    #[builder(default = DEFAULT_CALL_TIMEOUT)]
    pub call_timeout: Duration,
    #[builder(default = PathBuf::from(DEFAULT_CONFIG_PATH), into)]
    pub config_path: PathBuf,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl BridgeSettings {
    /// Defaults overlaid with `YUE_MCP_*` environment variables (and `.env`).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let mut settings = Self::default();

        if let Ok(path) = std::env::var("YUE_MCP_CONFIG") {
            settings.config_path = PathBuf::from(path);
        }
        if let Some(timeout) = env_millis("YUE_MCP_HANDSHAKE_TIMEOUT_MS") {
            settings.handshake_timeout = timeout;
        }
        if let Some(timeout) = env_millis("YUE_MCP_DISCOVERY_TIMEOUT_MS") {
            settings.discovery_timeout = timeout;
        }
        if let Some(timeout) = env_millis("YUE_MCP_CALL_TIMEOUT_MS") {
            settings.call_timeout = timeout;
        }
        settings
    }

    pub fn config_store(&self) -> ProviderConfigStore {
        ProviderConfigStore::new(self.config_path.clone())
    }
}

fn env_millis(var: &str) -> Option<Duration> {
    let raw = std::env::var(var).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(ms) => Some(Duration::from_millis(ms)),
        Err(e) => {
            tracing::warn!(var, value = %raw, error = %e, "ignoring malformed timeout");
            None
        }
    }
}
