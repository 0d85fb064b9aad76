use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::{debug, error};

use super::{fetch, Probe, ProbeError};
use crate::models::{HostResult, ProbeKind, ProbeResult};

/// Downloads the same test object from every mirror and measures throughput.
///
/// Mirrors are tried one after another so they do not compete for bandwidth.
/// A failing mirror is recorded as an unsuccessful [`HostResult`]; the probe
/// as a whole never fails.
pub struct DownloadSpeedProbe {
    client: reqwest::Client,
    urls: Vec<String>,
    per_host_timeout: Duration,
}

impl DownloadSpeedProbe {
    pub fn new(client: reqwest::Client, urls: Vec<String>, per_host_timeout: Duration) -> Self {
        Self { client, urls, per_host_timeout }
    }

    /// Worst case for a full run, used as the scheduler's bound.
    pub fn total_timeout(&self) -> Duration {
        self.per_host_timeout * (self.urls.len() as u32 + 1)
    }

    async fn measure(&self, url: &str) -> Result<(u64, Duration), ProbeError> {
        let mut response = fetch(&self.client, url, self.per_host_timeout).await?;
        let started = Instant::now();
        let mut bytes = 0u64;
        while let Some(chunk) = response.chunk().await? {
            bytes += chunk.len() as u64;
        }
        Ok((bytes, started.elapsed()))
    }
}

#[async_trait]
impl Probe for DownloadSpeedProbe {
    fn kind(&self) -> ProbeKind {
        ProbeKind::DownloadSpeed
    }

    async fn run(&self) -> Result<ProbeResult, ProbeError> {
        let mut per_host = Vec::with_capacity(self.urls.len());
        for url in &self.urls {
            let host = host_of(url);
            let result = match self.measure(url).await {
                Ok((bytes, elapsed)) => {
                    let speed = bytes_per_sec(bytes, elapsed);
                    debug!(%host, bytes, elapsed_ms = elapsed.as_millis() as u64, "mirror download finished");
                    HostResult::ok(host, speed)
                }
                Err(e) => {
                    error!(%host, error = %e, "mirror download failed");
                    HostResult::failed(host)
                }
            };
            per_host.push(result);
        }
        Ok(ProbeResult::Download { per_host })
    }
}

/// Host part of `url`, or the url itself when it does not parse.
pub fn host_of(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

pub fn bytes_per_sec(bytes: u64, elapsed: Duration) -> f64 {
    // Sub-millisecond transfers would otherwise report an infinite speed.
    let secs = elapsed.as_secs_f64().max(0.001);
    bytes as f64 / secs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_host() {
        assert_eq!(
            host_of("http://dl4.example.net/download.php?standard=yes&file=a.zip"),
            "dl4.example.net"
        );
        assert_eq!(host_of("not a url"), "not a url");
    }

    #[test]
    fn speed_is_bytes_over_seconds() {
        assert_eq!(bytes_per_sec(2_000_000, Duration::from_secs(2)), 1_000_000.0);
        assert_eq!(bytes_per_sec(10, Duration::ZERO), 10_000.0);
    }

    #[tokio::test]
    async fn unreachable_mirrors_become_failed_hosts() {
        let client = reqwest::Client::new();
        let probe = DownloadSpeedProbe::new(
            client,
            vec!["http://127.0.0.1:1/a.zip".into(), "http://127.0.0.1:1/b.zip".into()],
            Duration::from_millis(200),
        );
        let result = probe.run().await.unwrap();
        let ProbeResult::Download { per_host } = result else {
            panic!("unexpected result {result:?}");
        };
        assert_eq!(per_host.len(), 2);
        assert!(per_host.iter().all(|r| !r.success && r.speed_bytes_per_sec == -1.0));
        assert!(per_host.iter().all(|r| r.host == "127.0.0.1"));
    }
}
