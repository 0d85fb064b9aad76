use chrono::TimeDelta;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

pub type JobName = String;

/// The external system a probe watches. Each kind owns one slot in the
/// state store and one timer in the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProbeKind {
    LiveStatus,
    BuildServer,
    IndexValidity,
    DownloadSpeed,
}

impl ProbeKind {
    /// Subject used in "Exception while checking the ..." alerts.
    pub fn subject(self) -> &'static str {
        match self {
            ProbeKind::LiveStatus => "live data status",
            ProbeKind::BuildServer => "build server status",
            ProbeKind::IndexValidity => "map index validity",
            ProbeKind::DownloadSpeed => "mirror download speed",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProbeKind::LiveStatus => "live-status",
            ProbeKind::BuildServer => "build-server",
            ProbeKind::IndexValidity => "index-validity",
            ProbeKind::DownloadSpeed => "download-speed",
        };
        f.write_str(name)
    }
}

/// Whether a probe run came from its timer or from an on-demand refresh.
/// Only scheduled live polls feed the rolling windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollKind {
    Scheduled,
    OnDemand,
}

/// Outcome of one mirror download.
///
/// Equality and ordering use `host` only: two results for the same host are
/// the same set element whatever their success flag or speed. Sets of these
/// iterate in lexicographic host order.
#[derive(Debug, Clone)]
pub struct HostResult {
    pub host: String,
    pub success: bool,
    /// Bytes per second, `-1.0` when the download failed.
    pub speed_bytes_per_sec: f64,
}

impl HostResult {
    pub fn ok(host: impl Into<String>, speed_bytes_per_sec: f64) -> Self {
        Self { host: host.into(), success: true, speed_bytes_per_sec }
    }

    pub fn failed(host: impl Into<String>) -> Self {
        Self { host: host.into(), success: false, speed_bytes_per_sec: -1.0 }
    }
}

impl PartialEq for HostResult {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host
    }
}

impl Eq for HostResult {}

impl PartialOrd for HostResult {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HostResult {
    fn cmp(&self, other: &Self) -> Ordering {
        self.host.cmp(&other.host)
    }
}

/// Successful outcome of a probe run.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeResult {
    LiveDelay { delay: TimeDelta },
    BuildJobs { failed_jobs: BTreeSet<JobName> },
    IndexValidity { valid: bool, map_count: u32 },
    Download { per_host: Vec<HostResult> },
}

impl ProbeResult {
    pub fn kind(&self) -> ProbeKind {
        match self {
            ProbeResult::LiveDelay { .. } => ProbeKind::LiveStatus,
            ProbeResult::BuildJobs { .. } => ProbeKind::BuildServer,
            ProbeResult::IndexValidity { .. } => ProbeKind::IndexValidity,
            ProbeResult::Download { .. } => ProbeKind::DownloadSpeed,
        }
    }
}
