//! Decoded frame to buffer entry adapter.
//!
//! Resolves the publishing radar in the layout, projects valid slots into
//! the world frame and applies timestamp sanity rules before anything
//! reaches the snapshot buffer.

use std::sync::Arc;

use presence_radar_core::{
    CoordinateTransform, HealthConfig, LayoutConfig, Observation, PresenceConfig, Provenance,
    RadarBufferEntry, RadarFrame, RadarId,
};

use crate::health::{SanityCounters, SanityEvent, SanityKind};

/// Why a frame was not buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// `publish_as` is not in the layout.
    UnknownRadar,
    /// The layout disables the radar.
    RadarDisabled,
    /// Receipt timestamp not positive.
    InvalidRecvTs,
    /// Frame timestamp not positive.
    InvalidMeasTs,
}

impl IgnoreReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnknownRadar => "unknown radar",
            Self::RadarDisabled => "radar disabled",
            Self::InvalidRecvTs => "invalid recv_ts",
            Self::InvalidMeasTs => "invalid meas_ts",
        }
    }
}

impl std::fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of feeding one frame to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Buffered {
        radar_id: RadarId,
        /// Timestamp after the backwards clamp.
        meas_ts: i64,
        observations: usize,
    },
    Ignored(IgnoreReason),
}

impl IngestOutcome {
    #[must_use]
    pub fn is_buffered(&self) -> bool {
        matches!(self, Self::Buffered { .. })
    }
}

/// Builds [`RadarBufferEntry`] values from decoded frames.
#[derive(Debug, Clone)]
pub struct RadarIngest {
    layout: LayoutConfig,
    health: HealthConfig,
    transform: Arc<CoordinateTransform>,
}

impl RadarIngest {
    #[must_use]
    pub fn new(layout: LayoutConfig, health: HealthConfig, transform: Arc<CoordinateTransform>) -> Self {
        Self {
            layout,
            health,
            transform,
        }
    }

    #[must_use]
    pub fn from_config(cfg: &PresenceConfig, transform: Arc<CoordinateTransform>) -> Self {
        Self::new(cfg.layout.clone(), cfg.tracking.health.clone(), transform)
    }

    /// Looks up an enabled radar by publish name.
    ///
    /// # Errors
    ///
    /// [`IgnoreReason::UnknownRadar`] or [`IgnoreReason::RadarDisabled`].
    pub fn resolve(&self, publish_as: &str) -> Result<RadarId, IgnoreReason> {
        match self.layout.find_by_publish_as(publish_as.trim()) {
            Some((id, entry)) if entry.enabled => Ok(id),
            Some(_) => Err(IgnoreReason::RadarDisabled),
            None => Err(IgnoreReason::UnknownRadar),
        }
    }

    /// Converts `frame` into a buffer entry for its radar.
    ///
    /// `latest_meas_ts` is the radar's latest buffered timestamp; an older
    /// frame timestamp is clamped to `latest + 1`. Anomalies are counted in
    /// `sanity`.
    ///
    /// # Errors
    ///
    /// Returns the [`IgnoreReason`] when the frame must not be buffered.
    pub fn build_entry<F: RadarFrame + ?Sized>(
        &self,
        publish_as: &str,
        frame: &F,
        recv_ts: i64,
        latest_meas_ts: impl FnOnce(RadarId) -> Option<i64>,
        sanity: &mut SanityCounters,
    ) -> Result<(RadarId, RadarBufferEntry), IgnoreReason> {
        if recv_ts <= 0 {
            return Err(IgnoreReason::InvalidRecvTs);
        }
        let radar_id = self.resolve(publish_as)?;
        let raw_meas_ts = frame.timestamp_ms();
        if raw_meas_ts <= 0 {
            return Err(IgnoreReason::InvalidMeasTs);
        }

        let mut note = |kind: SanityKind, detail: String| {
            sanity.note(
                kind,
                SanityEvent {
                    ts: recv_ts,
                    radar_id,
                    detail,
                },
            );
        };

        let meas_ts = match latest_meas_ts(radar_id) {
            Some(prev) if prev > 0 && raw_meas_ts < prev => {
                note(
                    SanityKind::MeasWentBackwards,
                    format!("measTs {raw_meas_ts} < prev {prev}"),
                );
                prev + 1
            }
            _ => raw_meas_ts,
        };

        if recv_ts < meas_ts {
            note(
                SanityKind::NegativeRecvLag,
                format!("recvTs {recv_ts} < measTs {meas_ts}"),
            );
        }
        let recv_lag_ms = (recv_ts - meas_ts).max(0);
        let lag_limit = self.health.recv_lag_huge_ms;
        if lag_limit > 0 && recv_lag_ms > lag_limit {
            note(
                SanityKind::RecvLagHuge,
                format!("recvLag {recv_lag_ms}ms > {lag_limit}ms"),
            );
        }

        let slot_count = frame.slot_count();
        let slot_limit = self.health.slot_count_max;
        if slot_limit > 0 && slot_count > slot_limit {
            note(
                SanityKind::SlotCountTooHigh,
                format!("slotCount {slot_count} > {slot_limit}"),
            );
        }
        let valid_count = frame.detections().iter().filter(|d| d.valid).count();
        if valid_count > slot_count {
            note(
                SanityKind::DetectionsGtSlots,
                format!("detections {valid_count} > slots {slot_count}"),
            );
        }

        let entry_cfg = self.layout.radars.get(radar_id.index());
        let publish_as = entry_cfg.map_or_else(|| publish_as.trim().to_string(), |e| e.publish_as.clone());
        let zone_id = entry_cfg
            .and_then(|e| e.zone_id.clone())
            .filter(|z| !z.is_empty())
            .unwrap_or_else(|| format!("zone{radar_id}"));
        let params = self.transform.params(radar_id);

        let mut observations = Vec::with_capacity(valid_count);
        for det in frame.detections().iter().filter(|d| d.valid) {
            let local = det.local_mm();
            let world = self.transform.to_world_mm(radar_id, local);
            if !world.is_finite() {
                note(
                    SanityKind::NonFiniteWorld,
                    format!("slot {} local ({}, {})", det.slot_id, det.x_mm, det.y_mm),
                );
                continue;
            }
            observations.push(
                Observation::new(meas_ts, radar_id, world)
                    .with_zone(zone_id.clone())
                    .with_prov(Provenance {
                        publish_as: publish_as.clone(),
                        radar_id,
                        slot_id: Some(det.slot_id),
                        meas_ts,
                        local_mm: local,
                        transform: params,
                    }),
            );
        }

        let entry = RadarBufferEntry {
            meas_ts,
            recv_ts,
            detection_count: observations.len(),
            slot_count,
            publish_as,
            zone_id: Some(zone_id),
            observations,
        };
        Ok((radar_id, entry))
    }
}
