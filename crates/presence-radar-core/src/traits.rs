//! Core trait definitions for the presence-radar system.
//!
//! # Traits
//!
//! - [`Clock`]: monotonic millisecond time source for ages and timeouts
//! - [`RadarFrame`]: anything that carries one radar's decoded slots
//! - [`TargetTracker`]: the downstream consumer of fused observations

use std::sync::atomic::{AtomicI64, Ordering};

use crate::types::{Observation, RawDetection};

/// Millisecond time source.
///
/// Every age, timeout and window in the pipeline is computed against this
/// clock, so tests and replays can drive time explicitly.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds.
    fn now_ms(&self) -> i64;
}

/// Wall-clock time from the system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Manually driven clock for tests and replay.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Creates a clock reading `start_ms`.
    #[must_use]
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    /// Sets the current time.
    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    /// Advances the clock by `delta_ms` and returns the new time.
    pub fn advance(&self, delta_ms: i64) -> i64 {
        self.now.fetch_add(delta_ms, Ordering::SeqCst) + delta_ms
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// A decoded frame from one radar.
pub trait RadarFrame {
    /// Decoder-assigned timestamp (ms).
    fn timestamp_ms(&self) -> i64;

    /// All slots in wire order, including empty ones.
    fn detections(&self) -> &[RawDetection];

    /// Slots the sensor declares for this frame.
    fn slot_count(&self) -> usize {
        self.detections().len()
    }

    /// True if any slot is valid.
    fn present(&self) -> bool {
        self.detections().iter().any(|d| d.valid)
    }
}

/// Downstream per-target tracker.
///
/// Receives each tick's fused observations together with their measurement
/// variances (mm², same order and length).
pub trait TargetTracker {
    /// Feeds one tick of observations.
    fn update(&mut self, now_ms: i64, observations: &[Observation], variances_mm2: &[f64]);
}
