use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitorConfig {
    #[serde(default = "default_live_status_url")]
    pub live_status_url: String,
    #[serde(default = "default_build_server_url")]
    pub build_server_url: String,
    #[serde(default = "default_index_url")]
    pub index_url: String,
    #[serde(default = "default_download_urls")]
    pub download_urls: Vec<String>,

    #[serde(default = "default_live_period")]
    pub live_period_secs: u64,
    #[serde(default = "default_build_period")]
    pub build_period_secs: u64,
    #[serde(default = "default_slow_period")]
    pub index_period_secs: u64,
    #[serde(default = "default_slow_period")]
    pub download_period_secs: u64,

    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,
    /// Per mirror, covering the whole transfer.
    #[serde(default = "default_download_timeout")]
    pub download_timeout_ms: u64,

    #[serde(default = "default_maps_count_threshold")]
    pub maps_count_threshold: u32,

    pub webhook_url: Option<String>,
    pub telegram: Option<TelegramConfig>,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

fn default_live_status_url() -> String { "http://osmand.net/api/osmlive_status".into() }
fn default_build_server_url() -> String { "http://builder.osmand.net:8080/api/json".into() }
fn default_index_url() -> String { "http://osmand.net/get_indexes?gzip=true".into() }

fn default_download_urls() -> Vec<String> {
    ["download.osmand.net", "dl4.osmand.net", "dl5.osmand.net", "dl6.osmand.net"]
        .iter()
        .map(|host| format!("http://{host}/download.php?standard=yes&file=Angola_africa_2.obf.zip"))
        .collect()
}

fn default_live_period() -> u64 { 120 }
fn default_build_period() -> u64 { 60 }
fn default_slow_period() -> u64 { 300 }
fn default_probe_timeout() -> u64 { 30_000 }
fn default_download_timeout() -> u64 { 120_000 }
fn default_maps_count_threshold() -> u32 { crate::diff::DEFAULT_MAPS_COUNT_THRESHOLD }
fn default_api_port() -> u16 { 3000 }

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            live_status_url: default_live_status_url(),
            build_server_url: default_build_server_url(),
            index_url: default_index_url(),
            download_urls: default_download_urls(),
            live_period_secs: default_live_period(),
            build_period_secs: default_build_period(),
            index_period_secs: default_slow_period(),
            download_period_secs: default_slow_period(),
            probe_timeout_ms: default_probe_timeout(),
            download_timeout_ms: default_download_timeout(),
            maps_count_threshold: default_maps_count_threshold(),
            webhook_url: None,
            telegram: None,
            api_port: default_api_port(),
        }
    }
}

impl MonitorConfig {
    /// Reads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config in {}", path.display()))?;
        Ok(config)
    }

    /// Timer periods and request timeouts must be non-zero.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("live_period_secs", self.live_period_secs),
            ("build_period_secs", self.build_period_secs),
            ("index_period_secs", self.index_period_secs),
            ("download_period_secs", self.download_period_secs),
            ("probe_timeout_ms", self.probe_timeout_ms),
            ("download_timeout_ms", self.download_timeout_ms),
        ] {
            ensure!(value > 0, "{name} must be greater than zero");
        }
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_millis(self.download_timeout_ms)
    }

    /// Samples in the 3h and 24h live-delay windows at the live poll rate.
    pub fn window_capacities(&self) -> (usize, usize) {
        let period = self.live_period_secs.max(1);
        ((3 * 3600 / period) as usize, (24 * 3600 / period) as usize)
    }
}
