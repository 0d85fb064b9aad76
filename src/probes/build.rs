use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::time::Duration;

use super::{fetch, Probe, ProbeError};
use crate::models::{JobName, ProbeKind, ProbeResult};

/// Job colors that do not count as failing. Matched exactly.
pub const HEALTHY_COLORS: &[&str] = &["blue", "disabled", "notbuilt", "blue_anime"];

#[derive(Debug, Deserialize)]
pub struct JobList {
    pub jobs: Vec<Job>,
}

#[derive(Debug, Deserialize)]
pub struct Job {
    pub name: String,
    pub color: String,
}

/// Lists the CI server's jobs and reports the failing ones.
pub struct BuildServerProbe {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl BuildServerProbe {
    pub fn new(client: reqwest::Client, url: impl Into<String>, timeout: Duration) -> Self {
        Self { client, url: url.into(), timeout }
    }
}

#[async_trait]
impl Probe for BuildServerProbe {
    fn kind(&self) -> ProbeKind {
        ProbeKind::BuildServer
    }

    async fn run(&self) -> Result<ProbeResult, ProbeError> {
        let body = fetch(&self.client, &self.url, self.timeout).await?.bytes().await?;
        let list: JobList = serde_json::from_slice(&body)
            .map_err(|e| ProbeError::Parse(format!("bad job list: {e}")))?;
        Ok(ProbeResult::BuildJobs { failed_jobs: failing_jobs(&list) })
    }
}

pub fn failing_jobs(list: &JobList) -> BTreeSet<JobName> {
    list.jobs
        .iter()
        .filter(|job| !HEALTHY_COLORS.contains(&job.color.as_str()))
        .map(|job| job.name.clone())
        .collect()
}
