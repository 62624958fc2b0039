//! Tick pipeline: ingest, snapshot, quality, fusion, health.
//!
//! ```text
//! ingest_frame ──► RadarSnapshotBuffer
//!                        │ tick()
//!                        ▼
//!                  make_snapshot ──► quality ──► fusion ──► TargetTracker
//! ```
//!
//! All mutable state sits behind one `parking_lot::Mutex`, so frames may be
//! ingested from several I/O threads while `tick` assembles each snapshot
//! atomically.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use presence_radar_core::{
    Clock, CoordinateTransform, CoreResult, Observation, PresenceConfig, RadarFrame, RadarId,
    TargetTracker,
};

use crate::fusion::{FusionClusterer, FusionDebug};
use crate::health::{HealthMonitor, HealthSummary, TickLagStats};
use crate::ingest::{IngestOutcome, RadarIngest};
use crate::quality::ObservationQualityStage;
use crate::snapshot::{RadarDebugRow, RadarHealth, RadarSnapshotBuffer, SnapshotMeta};

/// Observation counts at each stage of one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasCounts {
    pub meas_in: usize,
    pub filtered: usize,
    pub deduped: usize,
    pub fused: usize,
}

/// Everything one tick produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickOutput {
    pub now: i64,
    pub snapshot_meta: SnapshotMeta,
    pub radars: Vec<RadarHealth>,
    pub radar_debug: Option<Vec<RadarDebugRow>>,
    /// Fused observations for the downstream tracker.
    pub observations: Vec<Observation>,
    /// Variance (mm²) per entry of `observations`.
    pub variances_mm2: Vec<f64>,
    pub fusion: FusionDebug,
    pub tick_lag: TickLagStats,
    /// Snapshot key differs from the previous tick's.
    pub snapshot_changed_this_tick: bool,
    pub counts: MeasCounts,
    pub health: HealthSummary,
}

struct PipelineState {
    buffer: RadarSnapshotBuffer,
    quality: ObservationQualityStage,
    health: HealthMonitor,
    last_snapshot_key: Option<String>,
}

/// Owns every stage of the tracking pipeline.
pub struct TrackingPipeline {
    config: PresenceConfig,
    clock: Arc<dyn Clock>,
    transform: Arc<CoordinateTransform>,
    ingest: RadarIngest,
    clusterer: FusionClusterer,
    state: Mutex<PipelineState>,
}

impl std::fmt::Debug for TrackingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingPipeline")
            .field("radars", &self.transform.radar_count())
            .field("update_interval_ms", &self.config.tracking.update_interval_ms)
            .field("fusion", &self.clusterer.is_enabled())
            .finish_non_exhaustive()
    }
}

impl TrackingPipeline {
    /// Validates `config` and wires every stage.
    ///
    /// # Errors
    ///
    /// Returns [`presence_radar_core::CoreError::Configuration`] if the
    /// configuration fails validation.
    pub fn new(config: PresenceConfig, clock: Arc<dyn Clock>) -> CoreResult<Self> {
        config.validate()?;

        let transform = Arc::new(CoordinateTransform::from_config(&config));
        let ingest = RadarIngest::from_config(&config, Arc::clone(&transform));
        let clusterer = FusionClusterer::from_config(&config, Arc::clone(&transform));
        let state = PipelineState {
            buffer: RadarSnapshotBuffer::from_config(&config),
            quality: ObservationQualityStage::from_config(&config),
            health: HealthMonitor::new(
                config.tracking.health.clone(),
                config.tracking.update_interval_ms,
            ),
            last_snapshot_key: None,
        };

        tracing::info!(
            radars = transform.radar_count(),
            expected = state.buffer.expected().len(),
            update_interval_ms = config.tracking.update_interval_ms,
            fusion = clusterer.is_enabled(),
            wait_for_all = config.tracking.snapshot.wait_for_all.enabled,
            "tracking pipeline started"
        );

        Ok(Self {
            config,
            clock,
            transform,
            ingest,
            clusterer,
            state: Mutex::new(state),
        })
    }

    #[must_use]
    pub fn config(&self) -> &PresenceConfig {
        &self.config
    }

    #[must_use]
    pub fn transform(&self) -> &Arc<CoordinateTransform> {
        &self.transform
    }

    /// Latest buffered `meas_ts` of `radar`.
    #[must_use]
    pub fn latest_meas_ts(&self, radar: RadarId) -> Option<i64> {
        self.state.lock().buffer.latest_meas_ts(radar)
    }

    /// Buffers one decoded frame published under `publish_as`, received at
    /// `recv_ts`.
    pub fn ingest_frame<F: RadarFrame + ?Sized>(
        &self,
        publish_as: &str,
        frame: &F,
        recv_ts: i64,
    ) -> IngestOutcome {
        let now = self.clock.now_ms();
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let buffer = &state.buffer;
        let built = self.ingest.build_entry(
            publish_as,
            frame,
            recv_ts,
            |radar| buffer.latest_meas_ts(radar),
            state.health.sanity_mut(),
        );

        match built {
            Ok((radar_id, entry)) => {
                let meas_ts = entry.meas_ts;
                let observations = entry.observations.len();
                state.buffer.ingest_entry(radar_id, entry, now);
                IngestOutcome::Buffered {
                    radar_id,
                    meas_ts,
                    observations,
                }
            }
            Err(reason) => {
                tracing::debug!(publish_as, recv_ts, reason = %reason, "frame ignored");
                IngestOutcome::Ignored(reason)
            }
        }
    }

    /// Runs one tick at the clock's current time.
    pub fn tick(&self) -> TickOutput {
        let now = self.clock.now_ms();
        let debug_enabled = self.config.tracking.debug_enabled;
        let mut guard = self.state.lock();
        let state = &mut *guard;

        state.buffer.cleanup(now);
        state.quality.cleanup(now);

        let snapshot = state.buffer.make_snapshot(now, debug_enabled);
        let quality = state.quality.process(&snapshot.observations, now);
        let fusion = self
            .clusterer
            .cluster(&quality.deduped, &quality.variances_mm2, debug_enabled);

        let tick_lag = TickLagStats::from_observations(now, &fusion.observations);
        let snapshot_changed_this_tick =
            state.last_snapshot_key.as_deref() != Some(snapshot.meta.snapshot_key.as_str());
        if snapshot_changed_this_tick {
            state.last_snapshot_key = Some(snapshot.meta.snapshot_key.clone());
        }

        let counts = MeasCounts {
            meas_in: snapshot.meta.meas_in,
            filtered: quality.filtered.len(),
            deduped: quality.deduped.len(),
            fused: fusion.observations.len(),
        };
        let health = state.health.summarize(now, &snapshot.meta, tick_lag);
        drop(guard);

        tracing::trace!(
            key = %snapshot.meta.snapshot_key,
            changed = snapshot_changed_this_tick,
            meas_in = counts.meas_in,
            fused = counts.fused,
            "tick"
        );

        TickOutput {
            now,
            snapshot_meta: snapshot.meta,
            radars: snapshot.radars,
            radar_debug: snapshot.debug,
            observations: fusion.observations,
            variances_mm2: fusion.variances_mm2,
            fusion: fusion.debug,
            tick_lag,
            snapshot_changed_this_tick,
            counts,
            health,
        }
    }

    /// Runs one tick and forwards its observations to `tracker` when the
    /// snapshot changed.
    pub fn tick_into<T: TargetTracker + ?Sized>(&self, tracker: &mut T) -> TickOutput {
        let out = self.tick();
        if out.snapshot_changed_this_tick {
            tracker.update(out.now, &out.observations, &out.variances_mm2);
        }
        out
    }

    /// Clears buffered history, quality history, sanity counters and the
    /// health summary sequence.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.buffer.reset();
        state.quality.reset();
        state.health.reset();
        state.last_snapshot_key = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use presence_radar_core::{ManualClock, RadarLayoutEntry, RawDetection};

    struct Frame {
        ts: i64,
        slots: Vec<RawDetection>,
    }

    impl RadarFrame for Frame {
        fn timestamp_ms(&self) -> i64 {
            self.ts
        }

        fn detections(&self) -> &[RawDetection] {
            &self.slots
        }
    }

    fn config() -> PresenceConfig {
        let mut cfg = PresenceConfig::default();
        cfg.layout.radar_azimuth_deg = vec![0.0];
        cfg.layout.radars = vec![RadarLayoutEntry {
            publish_as: "radarA".into(),
            ..Default::default()
        }];
        cfg
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut cfg = config();
        cfg.tracking.update_interval_ms = 0;
        let clock = Arc::new(ManualClock::new(1000));
        let err = TrackingPipeline::new(cfg, clock).unwrap_err();
        assert!(matches!(
            err,
            presence_radar_core::CoreError::Configuration(
                presence_radar_core::ConfigError::InvalidValue { field: "updateIntervalMs", .. }
            )
        ));
    }

    #[test]
    fn test_tick_reports_key_change_once() {
        let clock = Arc::new(ManualClock::new(1000));
        let pipeline = TrackingPipeline::new(config(), clock.clone()).expect("pipeline");
        let frame = Frame {
            ts: 990,
            slots: vec![RawDetection {
                slot_id: 1,
                x_mm: 0,
                y_mm: 1000,
                resolution_mm: 0,
                speed_cms: 0,
                valid: true,
            }],
        };
        assert!(pipeline.ingest_frame("radarA", &frame, 995).is_buffered());

        let first = pipeline.tick();
        assert!(first.snapshot_changed_this_tick);
        assert_eq!(first.counts.fused, 1);

        clock.advance(50);
        let second = pipeline.tick();
        assert!(!second.snapshot_changed_this_tick);
        assert_eq!(second.snapshot_meta.snapshot_key, first.snapshot_meta.snapshot_key);
    }
}
