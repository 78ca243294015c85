use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub source: SourceConfig,
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    /// Paginated messages endpoint, e.g. `https://example.com/messages/`.
    pub base_url: String,
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_page_limit() -> usize {
    100
}
fn default_page_delay_ms() -> u64 {
    200
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct SnapshotConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RefreshConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

// Read-heavy cache: refresh every 30 minutes by default.
fn default_interval_secs() -> u64 {
    30 * 60
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    6
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.source.base_url.trim().is_empty() {
        anyhow::bail!("source.base_url must not be empty");
    }

    if config.source.page_limit == 0 {
        anyhow::bail!("source.page_limit must be >= 1");
    }

    if config.refresh.interval_secs == 0 {
        anyhow::bail!("refresh.interval_secs must be >= 1");
    }

    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        let file = write_config(
            r#"
[source]
base_url = "http://localhost:9000/messages/"

[snapshot]
path = "/tmp/messages.json"

[server]
bind = "127.0.0.1:8000"
"#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.source.page_limit, 100);
        assert_eq!(config.source.max_retries, 3);
        assert_eq!(config.refresh.interval_secs, 1800);
        assert_eq!(config.retrieval.top_k, 6);
    }

    #[test]
    fn test_rejects_zero_page_limit() {
        let file = write_config(
            r#"
[source]
base_url = "http://localhost:9000/messages/"
page_limit = 0

[snapshot]
path = "/tmp/messages.json"

[server]
bind = "127.0.0.1:8000"
"#,
        );
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_rejects_empty_base_url() {
        let file = write_config(
            r#"
[source]
base_url = ""

[snapshot]
path = "/tmp/messages.json"

[server]
bind = "127.0.0.1:8000"
"#,
        );
        assert!(load_config(file.path()).is_err());
    }
}
