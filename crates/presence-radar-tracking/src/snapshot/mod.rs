//! Per-tick radar snapshots.
//!
//! [`RadarSnapshotBuffer`] keeps a short rolling history per radar and, once
//! per tick, picks one as-of frame for every expected radar. The result is a
//! [`Snapshot`]: the pooled observations of the fresh radars, a health row
//! for every expected radar and tick metadata.

mod buffer;

pub use buffer::RadarSnapshotBuffer;

use serde::{Deserialize, Serialize};

use presence_radar_core::{Observation, RadarId};

/// Freshness of one radar for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RadarStatus {
    /// Selected frame is young enough to use.
    Fresh,
    /// Selected frame exists but is too old to pool.
    Stale,
    /// No frame, or one older than the missing timeout.
    Missing,
}

impl RadarStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Stale => "stale",
            Self::Missing => "missing",
        }
    }
}

impl std::fmt::Display for RadarStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health row for one expected radar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RadarHealth {
    pub radar_id: RadarId,
    pub status: RadarStatus,
    /// Observations were pooled into the snapshot.
    pub included: bool,
    /// Selected `meas_ts` is newer than any selected on earlier ticks.
    pub advanced: bool,
    pub meas_ts: Option<i64>,
    pub recv_ts: Option<i64>,
    pub age_ms: Option<i64>,
    pub recv_lag_ms: Option<i64>,
    pub detection_count: usize,
    pub slot_count: Option<usize>,
    pub publish_as: Option<String>,
    pub zone_id: Option<String>,
}

impl RadarHealth {
    fn missing(radar_id: RadarId) -> Self {
        Self {
            radar_id,
            status: RadarStatus::Missing,
            included: false,
            advanced: false,
            meas_ts: None,
            recv_ts: None,
            age_ms: None,
            recv_lag_ms: None,
            detection_count: 0,
            slot_count: None,
            publish_as: None,
            zone_id: None,
        }
    }
}

/// Extra per-radar detail emitted in debug mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RadarDebugRow {
    #[serde(flatten)]
    pub health: RadarHealth,
    /// Radar comes from the configured layout rather than from traffic.
    pub from_layout: bool,
    /// Entries currently buffered for the radar.
    pub buffered_entries: usize,
    /// Observations carried by the selected entry.
    pub observation_count: usize,
}

/// Tick metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMeta {
    pub tick_interval_ms: i64,
    pub stale_meas_max_ms: i64,
    pub radar_missing_timeout_ms: i64,
    pub jitter_delay_ms: i64,
    /// Timestamp frames were aligned on.
    pub sample_ts: i64,
    /// `radarId:measTs` (or `radarId:na`) per expected radar, sorted by id,
    /// joined by `|`.
    pub snapshot_key: String,
    pub wait_for_all: bool,
    pub wait_for_all_timeout_ms: Option<i64>,
    /// Radars from the layout; 0 when the layout enables none.
    pub radars_expected: usize,
    pub radars_seen_total: usize,
    pub radars_fresh: usize,
    pub radars_stale: usize,
    pub radars_missing: usize,
    pub frames_fresh_used: usize,
    pub frames_fresh_with_detections: usize,
    pub meas_in: usize,
    pub max_radar_age_ms: i64,
    pub min_radar_age_ms: i64,
    pub max_recv_lag_ms: i64,
    pub snapshots_advanced_this_tick: bool,
    pub radars_advanced_count: usize,
    pub stuck_ticks: u32,
    pub stuck: bool,
}

/// Output of [`RadarSnapshotBuffer::make_snapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Observations of all fresh radars, in radar id order.
    pub observations: Vec<Observation>,
    /// One row per expected radar, in radar id order.
    pub radars: Vec<RadarHealth>,
    pub meta: SnapshotMeta,
    pub debug: Option<Vec<RadarDebugRow>>,
}

impl Snapshot {
    /// Health row for `radar_id`, if it was expected.
    #[must_use]
    pub fn radar(&self, radar_id: RadarId) -> Option<&RadarHealth> {
        self.radars.iter().find(|r| r.radar_id == radar_id)
    }
}
