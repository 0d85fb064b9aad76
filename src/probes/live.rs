use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use std::time::Duration;

use super::{fetch, Probe, ProbeError};
use crate::models::{ProbeKind, ProbeResult};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Reads the feed's last-update timestamp and reports how far behind it is.
pub struct LiveStatusProbe {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl LiveStatusProbe {
    pub fn new(client: reqwest::Client, url: impl Into<String>, timeout: Duration) -> Self {
        Self { client, url: url.into(), timeout }
    }
}

#[async_trait]
impl Probe for LiveStatusProbe {
    fn kind(&self) -> ProbeKind {
        ProbeKind::LiveStatus
    }

    async fn run(&self) -> Result<ProbeResult, ProbeError> {
        let body = fetch(&self.client, &self.url, self.timeout).await?.text().await?;
        let delay = delay_since(&body, Utc::now())?;
        Ok(ProbeResult::LiveDelay { delay })
    }
}

/// Parses the first line of `body` as a UTC `yyyy-MM-dd HH:mm` timestamp.
pub fn parse_timestamp(body: &str) -> Result<DateTime<Utc>, ProbeError> {
    let line = body.lines().next().unwrap_or_default().trim();
    NaiveDateTime::parse_from_str(line, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| ProbeError::Parse(format!("bad live timestamp {line:?}: {e}")))
}

pub fn delay_since(body: &str, now: DateTime<Utc>) -> Result<TimeDelta, ProbeError> {
    Ok(now - parse_timestamp(body)?)
}
