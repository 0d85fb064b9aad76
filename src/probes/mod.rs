//! One probe per external system. A probe performs its network I/O and
//! returns a typed [`ProbeResult`]; every infrastructure failure becomes a
//! [`ProbeError`].

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::models::{ProbeKind, ProbeResult};

pub mod build;
pub mod download;
pub mod index;
pub mod live;

pub use build::BuildServerProbe;
pub use download::DownloadSpeedProbe;
pub use index::IndexValidityProbe;
pub use live::LiveStatusProbe;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected HTTP status {0}")]
    Status(reqwest::StatusCode),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to decode response: {0}")]
    Decode(#[from] std::io::Error),
    #[error("failed to parse response: {0}")]
    Parse(String),
    #[error("probe task panicked: {0}")]
    Panicked(String),
}

#[async_trait]
pub trait Probe: Send + Sync {
    fn kind(&self) -> ProbeKind;

    async fn run(&self) -> Result<ProbeResult, ProbeError>;
}

/// GET `url` and fail on any non-success status.
pub(crate) async fn fetch(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<reqwest::Response, ProbeError> {
    let response = client.get(url).timeout(timeout).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ProbeError::Status(status));
    }
    Ok(response)
}

/// Local HTTP server for end-to-end fetch tests.
#[cfg(test)]
pub(crate) mod testing {
    use axum::Router;

    /// Serves `router` on an ephemeral port and returns its base URL.
    pub async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{addr}")
    }

    pub fn client() -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }
}
