use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::MonitorConfig;
use crate::diff::DiffEngine;
use crate::format;
use crate::models::{PollKind, ProbeKind, ProbeResult};
use crate::notify::Notifier;
use crate::probes::{
    BuildServerProbe, DownloadSpeedProbe, IndexValidityProbe, LiveStatusProbe, Probe, ProbeError,
};
use crate::state::StateStore;

/// Shortest timer period a probe can be registered with.
const MIN_PERIOD: Duration = Duration::from_secs(1);

struct ProbeSlot {
    probe: Arc<dyn Probe>,
    period: Duration,
    timeout: Duration,
    /// Held for the whole run; a tick that finds it taken is skipped.
    in_flight: Mutex<()>,
}

/// Owns one timer per probe and routes every outcome through the
/// [`DiffEngine`] to the [`Notifier`].
pub struct Monitor {
    engine: DiffEngine,
    notifier: Arc<dyn Notifier>,
    slots: BTreeMap<ProbeKind, ProbeSlot>,
}

impl Monitor {
    pub fn new(engine: DiffEngine, notifier: Arc<dyn Notifier>) -> Self {
        Self { engine, notifier, slots: BTreeMap::new() }
    }

    /// Register `probe` under its kind, replacing any earlier one.
    pub fn with_probe(mut self, probe: Arc<dyn Probe>, period: Duration, timeout: Duration) -> Self {
        if period < MIN_PERIOD {
            warn!(probe = %probe.kind(), ?period, "period below {MIN_PERIOD:?}, raising it");
        }
        let period = period.max(MIN_PERIOD);
        self.slots.insert(
            probe.kind(),
            ProbeSlot { probe, period, timeout, in_flight: Mutex::new(()) },
        );
        self
    }

    pub fn from_config(
        config: &MonitorConfig,
        client: reqwest::Client,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (window_3h, window_24h) = config.window_capacities();
        let store = Arc::new(StateStore::new(window_3h, window_24h));
        let engine = DiffEngine::new(store, config.maps_count_threshold);
        let timeout = config.probe_timeout();
        let downloads =
            DownloadSpeedProbe::new(client.clone(), config.download_urls.clone(), config.download_timeout());
        let download_timeout = downloads.total_timeout();

        Self::new(engine, notifier)
            .with_probe(
                Arc::new(LiveStatusProbe::new(client.clone(), &config.live_status_url, timeout)),
                Duration::from_secs(config.live_period_secs),
                timeout,
            )
            .with_probe(
                Arc::new(BuildServerProbe::new(client.clone(), &config.build_server_url, timeout)),
                Duration::from_secs(config.build_period_secs),
                timeout,
            )
            .with_probe(
                Arc::new(IndexValidityProbe::new(client, &config.index_url, timeout)),
                Duration::from_secs(config.index_period_secs),
                timeout,
            )
            .with_probe(
                Arc::new(downloads),
                Duration::from_secs(config.download_period_secs),
                download_timeout,
            )
    }

    pub fn store(&self) -> &Arc<StateStore> {
        self.engine.store()
    }

    /// Spawn one independent timer task per registered probe.
    pub fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        info!("Fleet monitor active with {} probes", self.slots.len());
        self.slots
            .iter()
            .map(|(&kind, slot)| {
                info!(probe = %kind, period_secs = slot.period.as_secs(), timeout_ms = slot.timeout.as_millis() as u64, "probe scheduled");
                let monitor = Arc::clone(self);
                tokio::spawn(async move { monitor.run_timer(kind).await })
            })
            .collect()
    }

    async fn run_timer(self: Arc<Self>, kind: ProbeKind) {
        let Some(period) = self.slots.get(&kind).map(|slot| slot.period) else {
            return;
        };
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            self.tick(kind).await;
        }
    }

    /// Run `kind` once unless a run is already in flight, in which case the
    /// tick is dropped and `None` returned.
    pub async fn tick(&self, kind: ProbeKind) -> Option<Vec<String>> {
        let slot = self.slots.get(&kind)?;
        let Ok(_guard) = slot.in_flight.try_lock() else {
            debug!(probe = %kind, "previous run still in flight, skipping tick");
            return None;
        };
        Some(self.execute(kind, slot, PollKind::Scheduled).await)
    }

    /// Run `kind` now, waiting for any in-flight run to finish first.
    pub async fn run_now(&self, kind: ProbeKind, poll: PollKind) -> Vec<String> {
        let Some(slot) = self.slots.get(&kind) else {
            return Vec::new();
        };
        let _guard = slot.in_flight.lock().await;
        self.execute(kind, slot, poll).await
    }

    /// On-demand live and build check, then the combined status text.
    pub async fn refresh_all(&self) -> String {
        futures::join!(
            self.run_now(ProbeKind::LiveStatus, PollKind::OnDemand),
            self.run_now(ProbeKind::BuildServer, PollKind::OnDemand),
        );
        let store = self.store();
        let live = store.live().await;
        let build = store.build().await;
        format::status_summary(&live, &build)
    }

    async fn execute(&self, kind: ProbeKind, slot: &ProbeSlot, poll: PollKind) -> Vec<String> {
        let outcome = run_isolated(&slot.probe, slot.timeout).await;
        let alerts = self.engine.apply(kind, outcome, poll).await;
        self.deliver(kind, &alerts).await;
        alerts
    }

    async fn deliver(&self, kind: ProbeKind, alerts: &[String]) {
        for alert in alerts {
            warn!(probe = %kind, "{}", alert);
            if let Err(e) = self.notifier.send(alert).await {
                error!(probe = %kind, error = %e, "dropping undelivered alert");
            }
        }
    }
}

/// Runs the probe on its own task so a panic or a hang stays contained.
async fn run_isolated(probe: &Arc<dyn Probe>, timeout: Duration) -> Result<ProbeResult, ProbeError> {
    let probe = Arc::clone(probe);
    let mut handle = tokio::spawn(async move { probe.run().await });
    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(join_error)) => Err(ProbeError::Panicked(join_error.to_string())),
        Err(_) => {
            handle.abort();
            Err(ProbeError::Timeout(timeout))
        }
    }
}
