//! Human-readable alert and status text.

use chrono::TimeDelta;

use crate::models::HostResult;
use crate::state::{BuildServerState, LiveState};

const SPEED_DIVIDER: f64 = 1000.0;

/// `H:MM`, whole hours then truncated, zero-padded minutes.
pub fn format_hm(secs: f64) -> String {
    if secs < 0.0 {
        return format!("-{}", format_hm(-secs));
    }
    let total_minutes = (secs / 60.0).floor() as u64;
    format!("{}:{:02}", total_minutes / 60, total_minutes % 60)
}

pub fn delay_secs(delay: TimeDelta) -> f64 {
    delay.num_milliseconds() as f64 / 1000.0
}

pub fn format_speed(bytes_per_sec: f64) -> String {
    let kb = bytes_per_sec / SPEED_DIVIDER;
    if kb < SPEED_DIVIDER {
        return format!("{kb:5.2} kb");
    }
    format!("{:5.2} Mb", kb / SPEED_DIVIDER)
}

/// `[a, b, c]` in iteration order.
pub fn bracket_list<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let joined = items
        .into_iter()
        .map(|s| s.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{joined}]")
}

pub fn live_delayed(delay: TimeDelta, live: &LiveState) -> String {
    format!(
        "Live data is delayed by {} hours (avg3h {}, avg24h {}, max24h {})",
        format_hm(delay_secs(delay)),
        format_hm(live.window_3h.mean()),
        format_hm(live.window_24h.mean()),
        format_hm(live.window_24h.max()),
    )
}

pub fn host_line(result: &HostResult) -> String {
    if result.success {
        format!(
            "Download speed from {} - {}.\n",
            result.host,
            format_speed(result.speed_bytes_per_sec)
        )
    } else {
        format!("{} is unavailable.\n", result.host)
    }
}

/// One line per host, ordered by host.
pub fn download_report(per_host: &[HostResult]) -> String {
    let mut sorted: Vec<&HostResult> = per_host.iter().collect();
    sorted.sort();
    sorted.into_iter().map(host_line).collect()
}

pub fn status_summary(live: &LiveState, build: &BuildServerState) -> String {
    let mut msg = live_delayed(live.last_delay, live);
    msg.push('\n');
    if build.failed_jobs.is_empty() {
        msg.push_str("Build server is OK.");
    } else {
        msg.push_str("Build server has failing jobs: ");
        msg.push_str(&bracket_list(&build.failed_jobs));
    }
    msg
}
