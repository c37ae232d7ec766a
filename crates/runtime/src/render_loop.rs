use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::tick::TickClock;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Rate of the animation clock.
    pub target_hz: f64,
    /// Minimum spacing between two snapshot publishes.
    pub min_publish_interval_ms: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            target_hz: 60.0,
            min_publish_interval_ms: 16,
        }
    }
}

impl RenderConfig {
    pub fn clock(&self) -> TickClock {
        TickClock::from_hz(self.target_hz)
    }

    pub fn min_publish_interval(&self) -> Duration {
        Duration::from_millis(self.min_publish_interval_ms)
    }
}

/// Mutable state the render loop samples every tick.
///
/// `fingerprint` must be cheap: it runs on every tick, while `build_snapshot`
/// only runs when the fingerprint moved.
pub trait SnapshotSource {
    type Fingerprint: Copy + PartialEq + std::fmt::Debug;
    type Snapshot;
    type Error: std::fmt::Display;

    fn fingerprint(&self) -> Self::Fingerprint;

    fn build_snapshot(&self, sequence: u64) -> Result<Self::Snapshot, Self::Error>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome<T> {
    Published(T),
    /// Nothing changed since the last publish.
    Unchanged,
    /// Something changed, but the previous publish is too recent.
    Throttled,
    /// Building the snapshot failed; the next tick retries.
    Failed,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub ticks: u64,
    pub publishes: u64,
    pub unchanged: u64,
    pub throttled: u64,
    pub failures: u64,
}

/// Fixed-rate snapshot publisher decoupled from input.
///
/// The loop never blocks and never fails: a tick either publishes a fresh
/// snapshot or leaves the previous one in place.
#[derive(Debug)]
pub struct RenderLoop<S: SnapshotSource> {
    source: S,
    min_interval: Duration,
    last_fingerprint: Option<S::Fingerprint>,
    last_publish: Option<Instant>,
    sequence: u64,
    stats: RenderStats,
}

impl<S: SnapshotSource> RenderLoop<S> {
    pub fn new(source: S, config: &RenderConfig) -> Self {
        Self {
            source,
            min_interval: config.min_publish_interval(),
            last_fingerprint: None,
            last_publish: None,
            sequence: 0,
            stats: RenderStats::default(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    /// Number of snapshots published so far.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn tick(&mut self, now: Instant) -> TickOutcome<S::Snapshot> {
        self.stats.ticks += 1;

        let fingerprint = self.source.fingerprint();
        if self.last_fingerprint == Some(fingerprint) {
            self.stats.unchanged += 1;
            return TickOutcome::Unchanged;
        }

        if let Some(last) = self.last_publish {
            if now.saturating_duration_since(last) < self.min_interval {
                self.stats.throttled += 1;
                return TickOutcome::Throttled;
            }
        }

        match self.source.build_snapshot(self.sequence + 1) {
            Ok(snapshot) => {
                self.sequence += 1;
                self.last_fingerprint = Some(fingerprint);
                self.last_publish = Some(now);
                self.stats.publishes += 1;
                TickOutcome::Published(snapshot)
            }
            Err(e) => {
                self.stats.failures += 1;
                debug!("snapshot build failed, retrying next tick: {e}");
                TickOutcome::Failed
            }
        }
    }
}
