//! Transition and threshold policy.
//!
//! [`DiffEngine::apply`] compares a probe outcome with the last successful
//! observation of the same category, commits the new observation and returns
//! the alerts to deliver. State is only ever changed by successful outcomes;
//! a failed probe yields a transient alert and leaves state as it was.
//!
//! | category       | policy                                                        |
//! |----------------|---------------------------------------------------------------|
//! | live delay     | hysteresis: > 1h and grown > 30min since the last alert        |
//! | build jobs     | set diff: newly failed and recovered, separate alerts          |
//! | map index      | edge-triggered validity, plus a standing low-count alarm       |
//! | download test  | set diff by host, each alert carrying the full host report     |

use chrono::{TimeDelta, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{error, info};

use crate::format;
use crate::models::{HostResult, JobName, PollKind, ProbeKind, ProbeResult};
use crate::probes::ProbeError;
use crate::state::StateStore;

pub const DEFAULT_MAPS_COUNT_THRESHOLD: u32 = 700;

pub struct DiffEngine {
    store: Arc<StateStore>,
    delay_alert_after: TimeDelta,
    delay_realert_growth: TimeDelta,
    maps_count_threshold: u32,
}

impl DiffEngine {
    pub fn new(store: Arc<StateStore>, maps_count_threshold: u32) -> Self {
        Self {
            store,
            delay_alert_after: TimeDelta::hours(1),
            delay_realert_growth: TimeDelta::minutes(30),
            maps_count_threshold,
        }
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// Apply one probe outcome for `kind` and return the alerts it raises.
    pub async fn apply(
        &self,
        kind: ProbeKind,
        outcome: Result<ProbeResult, ProbeError>,
        poll: PollKind,
    ) -> Vec<String> {
        match outcome {
            Ok(result) if result.kind() != kind => {
                error!(probe = %kind, got = %result.kind(), "probe returned a result for another category");
                Vec::new()
            }
            Ok(ProbeResult::LiveDelay { delay }) => self.apply_live(delay, poll).await,
            Ok(ProbeResult::BuildJobs { failed_jobs }) => self.apply_build(failed_jobs).await,
            Ok(ProbeResult::IndexValidity { valid, map_count }) => {
                self.apply_index(valid, map_count).await
            }
            Ok(ProbeResult::Download { per_host }) => self.apply_downloads(per_host).await,
            Err(e) => {
                error!(probe = %kind, error = %e, "probe failed");
                vec![format!("Exception while checking the {}.", kind.subject())]
            }
        }
    }

    async fn apply_live(&self, delay: TimeDelta, poll: PollKind) -> Vec<String> {
        let mut live = self.store.live().await;
        let mut alerts = Vec::new();

        if delay - live.previous_alerted_delay > self.delay_realert_growth
            && delay > self.delay_alert_after
        {
            alerts.push(format::live_delayed(delay, &live));
            live.previous_alerted_delay = delay;
        }
        live.last_delay = delay;
        live.last_checked_at = Some(Utc::now());

        if poll == PollKind::Scheduled {
            let secs = format::delay_secs(delay);
            live.window_3h.add(secs);
            live.window_24h.add(secs);
        }
        alerts
    }

    async fn apply_build(&self, failed_jobs: BTreeSet<JobName>) -> Vec<String> {
        let mut build = self.store.build().await;
        let mut alerts = Vec::new();

        let newly_failed: Vec<&JobName> = failed_jobs.difference(&build.failed_jobs).collect();
        if !newly_failed.is_empty() {
            alerts.push(format!(
                "There are new failures on the build server: {}",
                format::bracket_list(newly_failed)
            ));
        }
        let recovered: Vec<&JobName> = build.failed_jobs.difference(&failed_jobs).collect();
        if !recovered.is_empty() {
            alerts.push(format!(
                "There are recovered jobs on the build server: {}",
                format::bracket_list(recovered)
            ));
        }

        build.failed_jobs = failed_jobs;
        alerts
    }

    async fn apply_index(&self, valid: bool, map_count: u32) -> Vec<String> {
        let mut index = self.store.index().await;
        let mut alerts = Vec::new();

        match (index.last_valid, valid) {
            (true, false) => {
                alerts.push("Map index is not correctly generated on the website (check).".into())
            }
            (false, true) => {
                alerts.push(format!("Map index is correct and contains {map_count:5} maps."))
            }
            _ => {}
        }
        // Standing alarm: repeats every poll while the count stays low. An
        // invalid catalog has no meaningful count and only reports the break.
        if valid && map_count < self.maps_count_threshold {
            alerts.push(format!(
                "Maps quantity ({map_count:5}) is less than required ({:5}).",
                self.maps_count_threshold
            ));
        }

        index.last_valid = valid;
        if valid {
            index.last_map_count = Some(map_count);
        }
        alerts
    }

    async fn apply_downloads(&self, per_host: Vec<HostResult>) -> Vec<String> {
        let failed: BTreeSet<HostResult> =
            per_host.iter().filter(|r| !r.success).cloned().collect();
        let mut downloads = self.store.downloads().await;
        let mut alerts = Vec::new();

        let newly_failed = failed.difference(&downloads.failed_hosts).next().is_some();
        let recovered = downloads.failed_hosts.difference(&failed).next().is_some();
        if newly_failed || recovered {
            let report = format::download_report(&per_host);
            if newly_failed {
                alerts.push(format!("There are new failures in download test:\n{report}"));
            }
            if recovered {
                alerts.push(format!("There are recovered tests in download test:\n{report}"));
            }
            info!(failed = failed.len(), hosts = per_host.len(), "download test changed");
        }

        downloads.failed_hosts = failed;
        alerts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn engine() -> DiffEngine {
        DiffEngine::new(Arc::new(StateStore::new(90, 720)), DEFAULT_MAPS_COUNT_THRESHOLD)
    }

    fn live(minutes: i64) -> Result<ProbeResult, ProbeError> {
        Ok(ProbeResult::LiveDelay { delay: TimeDelta::minutes(minutes) })
    }

    fn jobs(names: &[&str]) -> Result<ProbeResult, ProbeError> {
        Ok(ProbeResult::BuildJobs { failed_jobs: names.iter().map(|s| s.to_string()).collect() })
    }

    fn index(valid: bool, map_count: u32) -> Result<ProbeResult, ProbeError> {
        Ok(ProbeResult::IndexValidity { valid, map_count })
    }

    fn downloads(results: &[HostResult]) -> Result<ProbeResult, ProbeError> {
        Ok(ProbeResult::Download { per_host: results.to_vec() })
    }

    #[tokio::test]
    async fn live_delay_hysteresis() {
        let engine = engine();
        let apply = |m| engine.apply(ProbeKind::LiveStatus, live(m), PollKind::Scheduled);

        let alerts = apply(61).await;
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].starts_with("Live data is delayed by 1:01 hours"));
        assert_eq!(
            engine.store().live().await.previous_alerted_delay,
            TimeDelta::minutes(61)
        );

        assert!(apply(70).await.is_empty());
        assert_eq!(
            engine.store().live().await.previous_alerted_delay,
            TimeDelta::minutes(61)
        );

        assert_eq!(apply(95).await.len(), 1);
        assert_eq!(
            engine.store().live().await.previous_alerted_delay,
            TimeDelta::minutes(95)
        );
    }

    #[tokio::test]
    async fn live_delay_under_an_hour_never_alerts() {
        let engine = engine();
        let alerts = engine.apply(ProbeKind::LiveStatus, live(45), PollKind::Scheduled).await;
        assert!(alerts.is_empty());
        let state = engine.store().live().await;
        assert_eq!(state.last_delay, TimeDelta::minutes(45));
        assert!(state.last_checked_at.is_some());
        assert_eq!(state.previous_alerted_delay, TimeDelta::zero());
    }

    #[tokio::test]
    async fn live_alert_uses_statistics_before_the_sample() {
        let engine = engine();
        engine.apply(ProbeKind::LiveStatus, live(20), PollKind::Scheduled).await;
        let alerts = engine.apply(ProbeKind::LiveStatus, live(120), PollKind::Scheduled).await;
        assert_eq!(
            alerts,
            ["Live data is delayed by 2:00 hours (avg3h 0:20, avg24h 0:20, max24h 0:20)"]
        );
        let state = engine.store().live().await;
        assert_eq!(state.window_24h.max(), 120.0 * 60.0);
        assert_eq!(state.window_3h.mean(), 70.0 * 60.0);
    }

    #[tokio::test]
    async fn on_demand_live_poll_skips_statistics() {
        let engine = engine();
        engine.apply(ProbeKind::LiveStatus, live(10), PollKind::OnDemand).await;
        let state = engine.store().live().await;
        assert!(state.window_3h.is_empty());
        assert!(state.window_24h.is_empty());
        assert_eq!(state.last_delay, TimeDelta::minutes(10));
    }

    #[tokio::test]
    async fn build_jobs_diff_reports_both_directions() {
        let engine = engine();
        let first = engine.apply(ProbeKind::BuildServer, jobs(&["A", "B"]), PollKind::Scheduled).await;
        assert_eq!(first, ["There are new failures on the build server: [A, B]"]);

        let alerts = engine.apply(ProbeKind::BuildServer, jobs(&["B", "C"]), PollKind::Scheduled).await;
        assert_eq!(
            alerts,
            [
                "There are new failures on the build server: [C]",
                "There are recovered jobs on the build server: [A]",
            ]
        );
        let expected: BTreeSet<JobName> = ["B", "C"].iter().map(|s| s.to_string()).collect();
        assert_eq!(engine.store().build().await.failed_jobs, expected);
    }

    #[tokio::test]
    async fn map_index_low_count_is_a_standing_alarm() {
        let engine = engine();
        for _ in 0..2 {
            let alerts = engine.apply(ProbeKind::IndexValidity, index(true, 500), PollKind::Scheduled).await;
            assert_eq!(alerts, ["Maps quantity (  500) is less than required (  700)."]);
        }
    }

    #[tokio::test]
    async fn map_index_transitions_are_edge_triggered() {
        let engine = engine();
        let broken = engine.apply(ProbeKind::IndexValidity, index(false, 0), PollKind::Scheduled).await;
        assert_eq!(broken, ["Map index is not correctly generated on the website (check)."]);

        let still_broken = engine.apply(ProbeKind::IndexValidity, index(false, 0), PollKind::Scheduled).await;
        assert!(still_broken.is_empty());

        let restored = engine.apply(ProbeKind::IndexValidity, index(true, 900), PollKind::Scheduled).await;
        assert_eq!(restored, ["Map index is correct and contains   900 maps."]);

        let state = engine.store().index().await;
        assert!(state.last_valid);
        assert_eq!(state.last_map_count, Some(900));
    }

    #[tokio::test]
    async fn download_failures_and_recoveries() {
        let engine = engine();
        let all_ok = [HostResult::ok("dl4", 2_000_000.0), HostResult::ok("dl5", 3_000_000.0)];
        assert!(engine.apply(ProbeKind::DownloadSpeed, downloads(&all_ok), PollKind::Scheduled).await.is_empty());

        let one_down = [HostResult::ok("dl4", 2_000_000.0), HostResult::failed("dl5")];
        let alerts = engine.apply(ProbeKind::DownloadSpeed, downloads(&one_down), PollKind::Scheduled).await;
        assert_eq!(
            alerts,
            ["There are new failures in download test:\nDownload speed from dl4 -  2.00 Mb.\ndl5 is unavailable.\n"]
        );

        let swapped = [HostResult::failed("dl4"), HostResult::ok("dl5", 500_000.0)];
        let alerts = engine.apply(ProbeKind::DownloadSpeed, downloads(&swapped), PollKind::Scheduled).await;
        assert_eq!(alerts.len(), 2);
        assert!(alerts[0].starts_with("There are new failures in download test:\ndl4 is unavailable.\n"));
        assert!(alerts[1].starts_with("There are recovered tests in download test:\n"));
        assert!(alerts[1].contains("Download speed from dl5 - 500.00 kb."));

        let failed: Vec<_> = engine.store().downloads().await.failed_hosts.iter().map(|r| r.host.clone()).collect();
        assert_eq!(failed, ["dl4"]);
    }

    #[tokio::test]
    async fn probe_failure_alerts_without_touching_state() {
        let engine = engine();
        engine.apply(ProbeKind::BuildServer, jobs(&["A"]), PollKind::Scheduled).await;
        engine.apply(ProbeKind::LiveStatus, live(30), PollKind::Scheduled).await;
        let before_build = engine.store().build().await.clone();
        let before_live = engine.store().live().await.clone();

        let alerts = engine
            .apply(
                ProbeKind::BuildServer,
                Err(ProbeError::Timeout(Duration::from_secs(30))),
                PollKind::Scheduled,
            )
            .await;
        assert_eq!(alerts, ["Exception while checking the build server status."]);
        assert_eq!(*engine.store().build().await, before_build);
        assert_eq!(*engine.store().live().await, before_live);
    }

    #[tokio::test]
    async fn mismatched_result_is_ignored() {
        let engine = engine();
        let alerts = engine.apply(ProbeKind::LiveStatus, jobs(&["A"]), PollKind::Scheduled).await;
        assert!(alerts.is_empty());
        assert!(engine.store().build().await.failed_jobs.is_empty());
    }

    #[tokio::test]
    async fn identical_results_are_idempotent() {
        let engine = engine();
        let hosts = [HostResult::failed("dl4"), HostResult::ok("dl5", 1.0)];
        engine.apply(ProbeKind::BuildServer, jobs(&["A", "B"]), PollKind::Scheduled).await;
        engine.apply(ProbeKind::IndexValidity, index(true, 900), PollKind::Scheduled).await;
        engine.apply(ProbeKind::DownloadSpeed, downloads(&hosts), PollKind::Scheduled).await;

        let build = engine.store().build().await.clone();
        let idx = engine.store().index().await.clone();
        let dl = engine.store().downloads().await.clone();

        assert!(engine.apply(ProbeKind::BuildServer, jobs(&["A", "B"]), PollKind::Scheduled).await.is_empty());
        assert!(engine.apply(ProbeKind::IndexValidity, index(true, 900), PollKind::Scheduled).await.is_empty());
        assert!(engine.apply(ProbeKind::DownloadSpeed, downloads(&hosts), PollKind::Scheduled).await.is_empty());

        assert_eq!(*engine.store().build().await, build);
        assert_eq!(*engine.store().index().await, idx);
        assert_eq!(*engine.store().downloads().await, dl);
    }
}
