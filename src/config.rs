use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Schema version written into every document header.
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    /// Prefix of the `ValidatedBy` provenance attribute.
    #[serde(default = "default_validator_prefix")]
    pub validator_prefix: String,
    /// Prefix of the `RequestedBy` provenance attribute.
    #[serde(default = "default_requester_prefix")]
    pub requester_prefix: String,
    #[serde(default = "default_validate_schema")]
    pub validate_schema: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            validator_prefix: default_validator_prefix(),
            requester_prefix: default_requester_prefix(),
            validate_schema: default_validate_schema(),
        }
    }
}

fn default_schema_version() -> String {
    "1.0".to_string()
}
fn default_validator_prefix() -> String {
    "fleet-corpus".to_string()
}
fn default_requester_prefix() -> String {
    "processor".to_string()
}
fn default_validate_schema() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Used when an upload does not name its own webhook.
    #[serde(default)]
    pub default_url: Option<String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            default_url: None,
        }
    }
}

fn default_timeout_secs() -> u64 {
    10
}

impl Config {
    /// Config with defaults everywhere except the database path.
    pub fn for_database(path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig { path: path.into() },
            server: ServerConfig {
                bind: default_bind(),
            },
            ingest: IngestConfig::default(),
            webhook: WebhookConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;

    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.server.bind.trim().is_empty() {
        anyhow::bail!("server.bind must not be empty");
    }

    if config.ingest.schema_version.trim().is_empty() {
        anyhow::bail!("ingest.schema_version must not be empty");
    }

    if config.webhook.timeout_secs == 0 {
        anyhow::bail!("webhook.timeout_secs must be > 0");
    }

    if let Some(url) = &config.webhook.default_url {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            anyhow::bail!("webhook.default_url must be an http(s) URL, got '{}'", url);
        }
    }

    Ok(())
}
