use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::Serialize;

/// Default resample cadence for the download rate.
pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(5);

/// Frontend-facing view of the download queue, published after every change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    pub queue: Vec<String>,
    pub progress: BTreeMap<String, u64>,
    pub transferred_bytes: u64,
    pub total_bytes: u64,
    pub overall_percent: f64, // 0.0..=100.0
    pub eta_seconds: Option<u64>,
    pub stale: Vec<String>,
}

/// `100 * transferred / total`, clamped, and 0 when nothing is queued.
pub fn percent(transferred: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (transferred as f64 * 100.0 / total as f64).clamp(0.0, 100.0)
}

/// Coarse throughput estimate from a moving snapshot.
///
/// The first observation after a reset pins the snapshot. Once `interval` has
/// passed, the next observation measures the rate over the closed window, keeps
/// it, and moves the snapshot forward. Throughput is the rate since the
/// snapshot when bytes moved in the open window, otherwise the last window's.
#[derive(Debug, Clone)]
pub struct RateEstimator {
    interval: Duration,
    snapshot: Option<(Instant, u64)>,
    last_rate: Option<f64>,
}

impl Default for RateEstimator {
    fn default() -> Self {
        Self::new(SAMPLE_INTERVAL)
    }
}

impl RateEstimator {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            snapshot: None,
            last_rate: None,
        }
    }

    pub fn reset(&mut self) {
        self.snapshot = None;
        self.last_rate = None;
    }

    pub fn observe(&mut self, now: Instant, progress: u64) {
        match self.snapshot {
            None => self.snapshot = Some((now, progress)),
            Some((at, base)) if now.saturating_duration_since(at) >= self.interval => {
                // A window with no bytes means the transfer stalled.
                self.last_rate = rate(at, base, now, progress);
                self.snapshot = Some((now, progress));
            }
            Some(_) => {}
        }
    }

    /// Bytes per second, if anything moved.
    pub fn throughput(&self, now: Instant, progress: u64) -> Option<f64> {
        let (at, base) = self.snapshot?;
        rate(at, base, now, progress).or(self.last_rate)
    }

    /// Time left for `total - progress` bytes, or `None` when unknown.
    pub fn eta(&self, now: Instant, progress: u64, total: u64) -> Option<Duration> {
        let rate = self.throughput(now, progress)?;
        let remaining = total.saturating_sub(progress) as f64;
        Duration::try_from_secs_f64(remaining / rate).ok()
    }
}

fn rate(from: Instant, base: u64, now: Instant, progress: u64) -> Option<f64> {
    let elapsed = now.saturating_duration_since(from).as_secs_f64();
    let delta = progress.saturating_sub(base);
    if elapsed <= 0.0 || delta == 0 {
        return None;
    }
    Some(delta as f64 / elapsed)
}
