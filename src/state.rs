use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use tokio::sync::{Mutex, MutexGuard};

use crate::models::{HostResult, JobName};
use crate::window::RollingWindow;

/// Last successful live-feed observation plus its delay statistics.
/// Window samples are delays in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveState {
    pub previous_alerted_delay: TimeDelta,
    pub last_delay: TimeDelta,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub window_3h: RollingWindow,
    pub window_24h: RollingWindow,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildServerState {
    pub failed_jobs: BTreeSet<JobName>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapIndexState {
    pub last_valid: bool,
    pub last_map_count: Option<u32>,
}

impl Default for MapIndexState {
    fn default() -> Self {
        // Optimistic start: the first invalid reading counts as a transition.
        Self { last_valid: true, last_map_count: None }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownloadTestState {
    pub failed_hosts: BTreeSet<HostResult>,
}

/// Process-wide last-known state, one lock per probe category.
///
/// Categories never share a lock, so a slow update on one cannot stall
/// another. Nothing here is persisted; a restart begins from the defaults.
#[derive(Debug)]
pub struct StateStore {
    live: Mutex<LiveState>,
    build: Mutex<BuildServerState>,
    index: Mutex<MapIndexState>,
    downloads: Mutex<DownloadTestState>,
}

impl StateStore {
    pub fn new(window_3h: usize, window_24h: usize) -> Self {
        Self {
            live: Mutex::new(LiveState {
                previous_alerted_delay: TimeDelta::zero(),
                last_delay: TimeDelta::zero(),
                last_checked_at: None,
                window_3h: RollingWindow::new(window_3h),
                window_24h: RollingWindow::new(window_24h),
            }),
            build: Mutex::new(BuildServerState::default()),
            index: Mutex::new(MapIndexState::default()),
            downloads: Mutex::new(DownloadTestState::default()),
        }
    }

    pub async fn live(&self) -> MutexGuard<'_, LiveState> {
        self.live.lock().await
    }

    pub async fn build(&self) -> MutexGuard<'_, BuildServerState> {
        self.build.lock().await
    }

    pub async fn index(&self) -> MutexGuard<'_, MapIndexState> {
        self.index.lock().await
    }

    pub async fn downloads(&self) -> MutexGuard<'_, DownloadTestState> {
        self.downloads.lock().await
    }

    /// Point-in-time copy of every category, each read under its own lock.
    pub async fn snapshot(&self) -> StoreSnapshot {
        let live = {
            let live = self.live().await;
            LiveSnapshot {
                last_delay_secs: live.last_delay.num_seconds(),
                previous_alerted_delay_secs: live.previous_alerted_delay.num_seconds(),
                last_checked_at: live.last_checked_at,
                avg_3h_secs: live.window_3h.mean(),
                avg_24h_secs: live.window_24h.mean(),
                max_24h_secs: live.window_24h.max(),
                samples_24h: live.window_24h.len(),
                window_3h_capacity: live.window_3h.capacity(),
                window_24h_capacity: live.window_24h.capacity(),
            }
        };
        let failed_jobs = self.build().await.failed_jobs.iter().cloned().collect();
        let (map_index_valid, map_count) = {
            let index = self.index().await;
            (index.last_valid, index.last_map_count)
        };
        let failed_hosts = self
            .downloads()
            .await
            .failed_hosts
            .iter()
            .map(|r| r.host.clone())
            .collect();

        StoreSnapshot {
            live,
            failed_jobs,
            map_index_valid,
            map_count,
            failed_hosts,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LiveSnapshot {
    pub last_delay_secs: i64,
    pub previous_alerted_delay_secs: i64,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub avg_3h_secs: f64,
    pub avg_24h_secs: f64,
    pub max_24h_secs: f64,
    pub samples_24h: usize,
    pub window_3h_capacity: usize,
    pub window_24h_capacity: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreSnapshot {
    pub live: LiveSnapshot,
    pub failed_jobs: Vec<JobName>,
    pub map_index_valid: bool,
    pub map_count: Option<u32>,
    pub failed_hosts: Vec<String>,
}
