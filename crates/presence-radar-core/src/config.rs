//! Configuration for the presence-radar pipeline.
//!
//! [`PresenceConfig`] is the root object: radar layout, extrinsic yaw
//! corrections and the tracking thresholds. Every struct deserializes from
//! camelCase JSON and every missing field falls back to its default, so a
//! partial document such as `{"layout":{"radarAzimuthDeg":[0,120,240]}}` is
//! a complete configuration.
//!
//! # Example
//!
//! ```rust
//! use presence_radar_core::config::PresenceConfig;
//!
//! let cfg = PresenceConfig::from_json_str(r#"{"layout":{"radarAzimuthDeg":[0,180]}}"#)
//!     .expect("valid config");
//! assert_eq!(cfg.layout.radar_azimuth_deg.len(), 2);
//! assert_eq!(cfg.tracking.snapshot.stale_meas_max_ms, 250);
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::types::RadarId;

/// Tube radius used when no usable diameter is configured.
pub const DEFAULT_TUBE_RADIUS_MM: f64 = 50.0;

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// One radar in the layout. Its radar id is its index in
/// [`LayoutConfig::radars`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RadarLayoutEntry {
    /// Name the radar publishes its frames under.
    pub publish_as: String,
    /// Disabled radars are ignored at ingest and not expected in snapshots.
    pub enabled: bool,
    /// Logical zone tag; defaults to `zone{radarId}`.
    pub zone_id: Option<String>,
}

impl Default for RadarLayoutEntry {
    fn default() -> Self {
        Self {
            publish_as: String::new(),
            enabled: true,
            zone_id: None,
        }
    }
}

/// Physical mounting layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayoutConfig {
    /// Mounting azimuth per radar id (degrees).
    pub radar_azimuth_deg: Vec<f64>,
    /// Diameter of the central tube (mm).
    pub tube_diameter_mm: Option<f64>,
    /// Sensor field of view (degrees, full angle). Default: **120**.
    pub radar_fov_deg: f64,
    /// Per-radar publish names and flags.
    pub radars: Vec<RadarLayoutEntry>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            radar_azimuth_deg: Vec::new(),
            tube_diameter_mm: None,
            radar_fov_deg: 120.0,
            radars: Vec::new(),
        }
    }
}

impl LayoutConfig {
    /// Tube radius, falling back to [`DEFAULT_TUBE_RADIUS_MM`] when the
    /// diameter is absent or not positive.
    #[must_use]
    pub fn tube_radius_mm(&self) -> f64 {
        match self.tube_diameter_mm {
            Some(d) if d.is_finite() && d > 0.0 => d / 2.0,
            _ => DEFAULT_TUBE_RADIUS_MM,
        }
    }

    /// Ids of enabled radars, in layout order.
    #[must_use]
    pub fn enabled_radar_ids(&self) -> Vec<RadarId> {
        self.radars
            .iter()
            .enumerate()
            .filter(|(_, r)| r.enabled)
            .filter_map(|(i, _)| RadarId::from_index(i))
            .collect()
    }

    /// Looks up a radar by publish name.
    #[must_use]
    pub fn find_by_publish_as(&self, publish_as: &str) -> Option<(RadarId, &RadarLayoutEntry)> {
        self.radars
            .iter()
            .enumerate()
            .find(|(_, r)| r.publish_as == publish_as)
            .and_then(|(i, r)| RadarId::from_index(i).map(|id| (id, r)))
    }
}

/// Extrinsic corrections measured after mounting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExtrinsicsConfig {
    /// Yaw correction per radar (degrees). Used only when its length equals
    /// the azimuth count; index 0 is always treated as 0.
    pub yaw_offsets_deg: Option<Vec<f64>>,
}

// ---------------------------------------------------------------------------
// Tracking
// ---------------------------------------------------------------------------

/// Wait-for-all alignment policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WaitForAllConfig {
    /// Align on the slowest expected radar. Default: **false**.
    pub enabled: bool,
    /// Upper bound on how far behind `now` alignment may wait. Default: **120**.
    pub timeout_ms: i64,
}

impl Default for WaitForAllConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_ms: 120,
        }
    }
}

/// Radar snapshot buffer thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SnapshotConfig {
    /// Backward offset applied to `now` when sampling. Default: **0**.
    pub jitter_delay_ms: i64,
    /// Frames kept per radar. Default: **5**.
    pub radar_buffer_max_frames: usize,
    /// History window per radar. Default: **4000**.
    pub radar_buffer_window_ms: i64,
    /// Oldest age still considered fresh. Default: **250**.
    pub stale_meas_max_ms: i64,
    /// Age beyond which a radar is missing. Default: **1500**.
    pub radar_missing_timeout_ms: i64,
    /// Consecutive non-advancing ticks before `stuck`. Default: **20**.
    pub stuck_ticks_warn: u32,
    /// Wait-for-all policy.
    pub wait_for_all: WaitForAllConfig,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            jitter_delay_ms: 0,
            radar_buffer_max_frames: 5,
            radar_buffer_window_ms: 4000,
            stale_meas_max_ms: 250,
            radar_missing_timeout_ms: 1500,
            stuck_ticks_warn: 20,
            wait_for_all: WaitForAllConfig::default(),
        }
    }
}

/// Observation quality thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QualityConfig {
    /// Bearing below which no edge penalty applies. Default: **30**.
    pub edge_bearing_full_deg: f64,
    /// Bearing beyond which observations are dropped. `None` or a
    /// non-positive value disables the filter. Default: **45**.
    ///
    /// The edge penalty ramps from `edge_bearing_full_deg` to this cutoff.
    /// With the filter disabled the ramp ends at 90 degrees instead, so a
    /// given bearing is penalized less than under the default.
    pub edge_bearing_cutoff_deg: Option<f64>,
    /// Default: **4**.
    pub edge_noise_scale_max: f64,
    /// Default: **1200**.
    pub range_full_mm: f64,
    /// Default: **3000**.
    pub range_cutoff_mm: f64,
    /// Default: **3**.
    pub range_noise_scale_max: f64,
    /// History window for jitter and jump detection. Default: **500**.
    pub jitter_window_ms: i64,
    /// Default: **60**.
    pub jitter_full_mm: f64,
    /// Default: **250**.
    pub jitter_cutoff_mm: f64,
    /// Default: **3**.
    pub jitter_noise_scale_max: f64,
    /// Default: **3500**.
    pub jump_suspicious_mm_s: f64,
    /// Default: **8000**.
    pub jump_impossible_mm_s: f64,
    /// Default: **10**.
    pub jump_noise_scale_max: f64,
    /// Staleness penalty; 1 disables it. Default: **1**.
    pub stale_noise_scale_max: f64,
    /// Base measurement noise (mm, standard deviation). Default: **160**.
    pub meas_noise_base_mm: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            edge_bearing_full_deg: 30.0,
            edge_bearing_cutoff_deg: Some(45.0),
            edge_noise_scale_max: 4.0,
            range_full_mm: 1200.0,
            range_cutoff_mm: 3000.0,
            range_noise_scale_max: 3.0,
            jitter_window_ms: 500,
            jitter_full_mm: 60.0,
            jitter_cutoff_mm: 250.0,
            jitter_noise_scale_max: 3.0,
            jump_suspicious_mm_s: 3500.0,
            jump_impossible_mm_s: 8000.0,
            jump_noise_scale_max: 10.0,
            stale_noise_scale_max: 1.0,
            meas_noise_base_mm: 160.0,
        }
    }
}

impl QualityConfig {
    /// Edge cutoff when the filter is active.
    #[must_use]
    pub fn edge_cutoff_deg(&self) -> Option<f64> {
        self.edge_bearing_cutoff_deg
            .filter(|c| c.is_finite() && *c > 0.0)
    }
}

/// Fusion clusterer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FusionConfig {
    /// Default: **false**.
    pub enabled: bool,
    /// Merge gate radius (mm). Default: **450**.
    pub cluster_gate_mm: f64,
    /// Groups above this size pass through unmerged. Default: **10**.
    pub max_cluster_size: usize,
    /// Extra bearing allowed in the visibility check. Default: **6**.
    pub fov_margin_deg: f64,
    /// Extra range allowed in the visibility check. Default: **150**.
    pub range_margin_mm: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cluster_gate_mm: 450.0,
            max_cluster_size: 10,
            fov_margin_deg: 6.0,
            range_margin_mm: 150.0,
        }
    }
}

/// Ingest sanity and tick health thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HealthConfig {
    /// Default: **500**.
    pub recv_lag_huge_ms: i64,
    /// Default: **3**.
    pub slot_count_max: usize,
    /// Tick lag p95 above this many tick intervals is reported. Default: **2**.
    pub tick_lag_warn_mult: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            recv_lag_huge_ms: 500,
            slot_count_max: 3,
            tick_lag_warn_mult: 2.0,
        }
    }
}

/// Tracking tick settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TrackingConfig {
    /// Nominal tick interval. Default: **50**.
    pub update_interval_ms: i64,
    pub snapshot: SnapshotConfig,
    pub quality: QualityConfig,
    pub fusion: FusionConfig,
    pub health: HealthConfig,
    /// Emit per-radar and per-cluster debug rows. Default: **false**.
    pub debug_enabled: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: 50,
            snapshot: SnapshotConfig::default(),
            quality: QualityConfig::default(),
            fusion: FusionConfig::default(),
            health: HealthConfig::default(),
            debug_enabled: false,
        }
    }
}

// ---------------------------------------------------------------------------
// PresenceConfig
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PresenceConfig {
    pub layout: LayoutConfig,
    pub extrinsics: ExtrinsicsConfig,
    pub tracking: TrackingConfig,
}

impl PresenceConfig {
    /// Load and validate a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::FileRead`] if the file cannot be read,
    /// [`ConfigError::ParseError`] on malformed JSON, and
    /// [`ConfigError::InvalidValue`] if validation fails.
    pub fn from_json(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: PresenceConfig =
            serde_json::from_str(&contents).map_err(|source| ConfigError::ParseError {
                path: path.to_path_buf(),
                source,
            })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse and validate a configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// [`ConfigError::ParseError`] on malformed JSON and
    /// [`ConfigError::InvalidValue`] if validation fails.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let cfg: PresenceConfig =
            serde_json::from_str(json).map_err(|source| ConfigError::ParseError {
                path: PathBuf::from("<inline>"),
                source,
            })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate all fields and return the first problem found.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let layout = &self.layout;
        if layout.radar_azimuth_deg.iter().any(|a| !a.is_finite()) {
            return Err(ConfigError::invalid_value(
                "radarAzimuthDeg",
                "all azimuths must be finite",
            ));
        }
        if layout.radar_azimuth_deg.len() > usize::from(u8::MAX) + 1 {
            return Err(ConfigError::invalid_value(
                "radarAzimuthDeg",
                "at most 256 radars are supported",
            ));
        }
        if !(layout.radar_fov_deg.is_finite() && layout.radar_fov_deg > 0.0) {
            return Err(ConfigError::invalid_value("radarFovDeg", "must be > 0"));
        }
        if let Some(yaw) = &self.extrinsics.yaw_offsets_deg {
            if yaw.iter().any(|v| !v.is_finite()) {
                return Err(ConfigError::invalid_value(
                    "yawOffsetsDeg",
                    "all offsets must be finite",
                ));
            }
        }

        let snap = &self.tracking.snapshot;
        if snap.radar_buffer_max_frames == 0 {
            return Err(ConfigError::invalid_value("radarBufferMaxFrames", "must be > 0"));
        }
        if snap.radar_buffer_window_ms <= 0 {
            return Err(ConfigError::invalid_value("radarBufferWindowMs", "must be > 0"));
        }
        if snap.jitter_delay_ms < 0 {
            return Err(ConfigError::invalid_value("jitterDelayMs", "must be >= 0"));
        }
        if snap.stale_meas_max_ms > snap.radar_missing_timeout_ms {
            return Err(ConfigError::invalid_value(
                "staleMeasMaxMs",
                format!(
                    "must be <= radarMissingTimeoutMs ({}), got {}",
                    snap.radar_missing_timeout_ms, snap.stale_meas_max_ms
                ),
            ));
        }
        if snap.wait_for_all.timeout_ms < 0 {
            return Err(ConfigError::invalid_value("waitForAll.timeoutMs", "must be >= 0"));
        }

        let q = &self.tracking.quality;
        check_ramp("edgeBearingFullDeg", q.edge_bearing_full_deg, q.edge_bearing_cutoff_deg.unwrap_or(f64::INFINITY))?;
        check_ramp("rangeFullMm", q.range_full_mm, q.range_cutoff_mm)?;
        check_ramp("jitterFullMm", q.jitter_full_mm, q.jitter_cutoff_mm)?;
        check_ramp("jumpSuspiciousMmS", q.jump_suspicious_mm_s, q.jump_impossible_mm_s)?;
        if !(q.meas_noise_base_mm.is_finite() && q.meas_noise_base_mm > 0.0) {
            return Err(ConfigError::invalid_value("measNoiseBaseMm", "must be > 0"));
        }
        if q.jitter_window_ms <= 0 {
            return Err(ConfigError::invalid_value("jitterWindowMs", "must be > 0"));
        }

        let f = &self.tracking.fusion;
        if f.max_cluster_size == 0 {
            return Err(ConfigError::invalid_value("maxClusterSize", "must be > 0"));
        }
        if !(f.cluster_gate_mm.is_finite() && f.cluster_gate_mm >= 0.0) {
            return Err(ConfigError::invalid_value("clusterGateMm", "must be >= 0"));
        }

        let h = &self.tracking.health;
        if !(h.tick_lag_warn_mult.is_finite() && h.tick_lag_warn_mult > 0.0) {
            return Err(ConfigError::invalid_value("tickLagWarnMult", "must be > 0"));
        }

        if self.tracking.update_interval_ms <= 0 {
            return Err(ConfigError::invalid_value("updateIntervalMs", "must be > 0"));
        }
        Ok(())
    }
}

/// A ramp needs `full < cutoff`. A disabled cutoff (non-positive) is skipped.
fn check_ramp(field: &'static str, full: f64, cutoff: f64) -> Result<(), ConfigError> {
    if cutoff <= 0.0 {
        return Ok(());
    }
    if !full.is_finite() || full >= cutoff {
        return Err(ConfigError::invalid_value(
            field,
            format!("must be finite and below its cutoff ({cutoff}), got {full}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        PresenceConfig::default().validate().unwrap();
    }

    #[test]
    fn test_tube_radius_fallback() {
        let mut layout = LayoutConfig::default();
        assert_eq!(layout.tube_radius_mm(), DEFAULT_TUBE_RADIUS_MM);
        layout.tube_diameter_mm = Some(-4.0);
        assert_eq!(layout.tube_radius_mm(), DEFAULT_TUBE_RADIUS_MM);
        layout.tube_diameter_mm = Some(120.0);
        assert_eq!(layout.tube_radius_mm(), 60.0);
    }

    #[test]
    fn test_enabled_radar_ids() {
        let layout = LayoutConfig {
            radars: vec![
                RadarLayoutEntry { publish_as: "a".into(), ..Default::default() },
                RadarLayoutEntry { publish_as: "b".into(), enabled: false, ..Default::default() },
                RadarLayoutEntry { publish_as: "c".into(), ..Default::default() },
            ],
            ..Default::default()
        };
        assert_eq!(layout.enabled_radar_ids(), vec![RadarId::new(0), RadarId::new(2)]);
        assert_eq!(layout.find_by_publish_as("b").map(|(id, _)| id), Some(RadarId::new(1)));
        assert!(layout.find_by_publish_as("zz").is_none());
    }

    #[test]
    fn test_disabled_edge_cutoff() {
        let mut q = QualityConfig::default();
        assert_eq!(q.edge_cutoff_deg(), Some(45.0));
        q.edge_bearing_cutoff_deg = Some(0.0);
        assert_eq!(q.edge_cutoff_deg(), None);
        q.edge_bearing_cutoff_deg = None;
        assert_eq!(q.edge_cutoff_deg(), None);
    }
}
