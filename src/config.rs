use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    pub remote: RemoteConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub root: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    pub base_url: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Name of the environment variable holding a bearer token.
    #[serde(default)]
    pub token_env: Option<String>,
    #[serde(default = "default_remote_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_rate_limit_retries")]
    pub max_rate_limit_retries: u32,
    #[serde(default = "default_max_rate_limit_wait_secs")]
    pub max_rate_limit_wait_secs: u64,
    #[serde(default = "default_retry_after_secs")]
    pub default_retry_after_secs: u64,
}

fn default_page_size() -> usize {
    100
}
fn default_remote_timeout_secs() -> u64 {
    30
}
fn default_max_rate_limit_retries() -> u32 {
    5
}
fn default_max_rate_limit_wait_secs() -> u64 {
    300
}
fn default_retry_after_secs() -> u64 {
    5
}

impl RemoteConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_rate_limit_retries,
            max_total_wait: Duration::from_secs(self.max_rate_limit_wait_secs),
            default_wait: Duration::from_secs(self.default_retry_after_secs),
        }
    }
}

/// Bounds on rate-limit retries for a single page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub max_total_wait: Duration,
    /// Used when the server does not say how long to wait.
    pub default_wait: Duration,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EnrichmentConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub token_env: Option<String>,
    #[serde(default = "default_annotatable_kind")]
    pub annotatable_kind: String,
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    #[serde(default = "default_enrich_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            endpoint: None,
            model: None,
            token_env: None,
            annotatable_kind: "photo".to_string(),
            min_interval_ms: 1000,
            timeout_secs: 60,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_annotatable_kind() -> String {
    "photo".to_string()
}
fn default_min_interval_ms() -> u64 {
    1000
}
fn default_enrich_timeout_secs() -> u64 {
    60
}

impl EnrichmentConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SyncConfig {
    /// Restrict syncing to these slugs. Empty means every listed collection.
    #[serde(default)]
    pub collections: Vec<String>,
}

/// Read a bearer token from the environment variable named by `var`.
pub fn token_from_env(var: Option<&str>) -> Result<Option<String>> {
    match var {
        None => Ok(None),
        Some(name) => std::env::var(name)
            .map(Some)
            .with_context(|| format!("{} environment variable not set", name)),
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate remote
    if config.remote.page_size == 0 {
        anyhow::bail!("remote.page_size must be > 0");
    }
    if config.remote.base_url.trim().is_empty() {
        anyhow::bail!("remote.base_url must not be empty");
    }

    // Validate enrichment
    match config.enrichment.provider.as_str() {
        "disabled" => {}
        "http" => {
            if config.enrichment.endpoint.is_none() {
                anyhow::bail!("enrichment.endpoint must be specified when provider is 'http'");
            }
            if config.enrichment.model.is_none() {
                anyhow::bail!("enrichment.model must be specified when provider is 'http'");
            }
        }
        other => anyhow::bail!(
            "Unknown enrichment provider: '{}'. Must be disabled or http.",
            other
        ),
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[store]
root = "./data"

[remote]
base_url = "https://api.example.com"
"#;

    #[test]
    fn defaults_apply() {
        let cfg = parse_config(MINIMAL).unwrap();
        assert_eq!(cfg.remote.page_size, 100);
        assert!(!cfg.enrichment.is_enabled());
        assert_eq!(cfg.enrichment.annotatable_kind, "photo");
        assert!(cfg.sync.collections.is_empty());

        let policy = cfg.remote.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.max_total_wait, Duration::from_secs(300));
    }

    #[test]
    fn zero_page_size_rejected() {
        let bad = MINIMAL.replace(
            "base_url = \"https://api.example.com\"",
            "base_url = \"https://api.example.com\"\npage_size = 0",
        );
        let err = parse_config(&bad).unwrap_err();
        assert!(err.to_string().contains("page_size"));
    }

    #[test]
    fn http_provider_requires_endpoint_and_model() {
        let cfg = format!("{}\n[enrichment]\nprovider = \"http\"\n", MINIMAL);
        assert!(parse_config(&cfg).is_err());

        let cfg = format!(
            "{}\n[enrichment]\nprovider = \"http\"\nendpoint = \"https://vision.example/annotate\"\nmodel = \"v1\"\n",
            MINIMAL
        );
        assert!(parse_config(&cfg).unwrap().enrichment.is_enabled());
    }

    #[test]
    fn unknown_provider_rejected() {
        let cfg = format!("{}\n[enrichment]\nprovider = \"magic\"\n", MINIMAL);
        assert!(parse_config(&cfg).is_err());
    }
}
