//! Observation quality stage.
//!
//! Runs once per tick on the pooled snapshot observations:
//!
//! - **Edge filter**: drops observations whose local bearing exceeds the
//!   configured cutoff.
//! - **Dedup**: keeps the newest observation per sensor slot.
//! - **Variance**: base measurement variance scaled by bearing, range,
//!   jitter, jump and staleness ramps.
//!
//! Jitter and jump detection keep one last sample per sensor slot. Idle
//! entries are purged by [`ObservationQualityStage::cleanup`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use presence_radar_core::utils::{bearing_deg, clamp01, lerp, map_scale, range_mm};
use presence_radar_core::{Observation, PresenceConfig, QualityConfig, RadarId};

/// Bearing at which the edge ramp saturates when the edge filter is off.
const EDGE_RAMP_END_DEG: f64 = 90.0;

/// Stale threshold used when the configured one is not positive.
const DEFAULT_STALE_MEAS_MAX_MS: i64 = 250;

/// Dedup identity of an observation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum DedupKey {
    Slot { publish_as: String, slot_id: u8 },
    Radar { radar_id: RadarId, slot_id: Option<u8> },
}

impl DedupKey {
    fn of(obs: &Observation) -> Self {
        let slot_id = obs.prov.as_ref().and_then(|p| p.slot_id);
        match (published_name(obs), slot_id) {
            (Some(publish_as), Some(slot_id)) => Self::Slot {
                publish_as: publish_as.to_string(),
                slot_id,
            },
            _ => Self::Radar {
                radar_id: obs.radar_id,
                slot_id,
            },
        }
    }
}

/// Key of the per-slot history used for jitter and jump scales.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum HistoryKey {
    Slot { publish_as: String, slot_id: u8 },
    Radar(RadarId),
}

impl HistoryKey {
    fn of(obs: &Observation) -> Self {
        let slot_id = obs.prov.as_ref().and_then(|p| p.slot_id);
        match (published_name(obs), slot_id) {
            (Some(publish_as), Some(slot_id)) => Self::Slot {
                publish_as: publish_as.to_string(),
                slot_id,
            },
            _ => Self::Radar(obs.radar_id),
        }
    }
}

fn published_name(obs: &Observation) -> Option<&str> {
    obs.prov
        .as_ref()
        .map(|p| p.publish_as.trim())
        .filter(|s| !s.is_empty())
}

/// Last world position seen for one history key.
#[derive(Debug, Clone, Copy)]
struct LastSample {
    ts: i64,
    x_mm: f64,
    y_mm: f64,
}

impl LastSample {
    /// Displacement and elapsed time to `next`, if inside `window_ms`.
    fn step_to(&self, next: &LastSample, window_ms: i64) -> Option<(f64, i64)> {
        let dt = next.ts - self.ts;
        if dt <= 0 || (window_ms > 0 && dt > window_ms) {
            return None;
        }
        let dist = (next.x_mm - self.x_mm).hypot(next.y_mm - self.y_mm);
        dist.is_finite().then_some((dist, dt))
    }
}

/// Result of [`ObservationQualityStage::process`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityOutput {
    /// Observations surviving the edge filter.
    pub filtered: Vec<Observation>,
    /// Newest observation per sensor slot, in first-seen order.
    pub deduped: Vec<Observation>,
    /// Measurement variance (mm²) per entry of `deduped`.
    pub variances_mm2: Vec<f64>,
}

/// Edge filtering, dedup and variance modelling for one tick.
#[derive(Debug)]
pub struct ObservationQualityStage {
    config: QualityConfig,
    stale_meas_max_ms: i64,
    jitter_last: HashMap<HistoryKey, LastSample>,
    jump_last: HashMap<HistoryKey, LastSample>,
}

impl ObservationQualityStage {
    /// Creates a stage. `stale_meas_max_ms` is the snapshot freshness
    /// threshold the staleness ramp spans.
    #[must_use]
    pub fn new(config: QualityConfig, stale_meas_max_ms: i64) -> Self {
        let stale_meas_max_ms = if stale_meas_max_ms > 0 {
            stale_meas_max_ms
        } else {
            DEFAULT_STALE_MEAS_MAX_MS
        };
        Self {
            config,
            stale_meas_max_ms,
            jitter_last: HashMap::new(),
            jump_last: HashMap::new(),
        }
    }

    #[must_use]
    pub fn from_config(cfg: &PresenceConfig) -> Self {
        Self::new(
            cfg.tracking.quality.clone(),
            cfg.tracking.snapshot.stale_meas_max_ms,
        )
    }

    /// Number of history keys currently held.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.jitter_last.len().max(self.jump_last.len())
    }

    /// Runs edge filter, dedup and variance modelling.
    pub fn process(&mut self, observations: &[Observation], now: i64) -> QualityOutput {
        let filtered = self.filter_edges(observations);
        let deduped = dedup_latest(&filtered);
        let variances_mm2 = deduped
            .iter()
            .map(|obs| self.variance_mm2(obs, now))
            .collect();
        QualityOutput {
            filtered,
            deduped,
            variances_mm2,
        }
    }

    /// Drops history idle for more than twice the jitter window.
    pub fn cleanup(&mut self, now: i64) {
        let ttl = self.config.jitter_window_ms.saturating_mul(2);
        if ttl <= 0 {
            return;
        }
        self.jitter_last.retain(|_, s| now - s.ts <= ttl);
        self.jump_last.retain(|_, s| now - s.ts <= ttl);
    }

    /// Forgets all per-slot history.
    pub fn reset(&mut self) {
        self.jitter_last.clear();
        self.jump_last.clear();
    }

    fn filter_edges(&self, observations: &[Observation]) -> Vec<Observation> {
        let Some(cutoff) = self.config.edge_cutoff_deg() else {
            return observations.to_vec();
        };
        observations
            .iter()
            .filter(|obs| match obs.local_mm() {
                Some(local) if local.is_finite() => {
                    bearing_deg(local.x_mm, local.y_mm).abs() <= cutoff
                }
                _ => true,
            })
            .cloned()
            .collect()
    }

    fn variance_mm2(&mut self, obs: &Observation, now: i64) -> f64 {
        let q = &self.config;
        let base_var = (q.meas_noise_base_mm * q.meas_noise_base_mm).max(1.0);

        let (bearing_scale, range_scale) = match obs.local_mm() {
            Some(local) if local.is_finite() => {
                let bearing = bearing_deg(local.x_mm, local.y_mm).abs();
                let range = range_mm(local.x_mm, local.y_mm);
                let edge_end = q.edge_cutoff_deg().unwrap_or(EDGE_RAMP_END_DEG);
                (
                    map_scale(bearing, q.edge_bearing_full_deg, edge_end, q.edge_noise_scale_max),
                    map_scale(range, q.range_full_mm, q.range_cutoff_mm, q.range_noise_scale_max),
                )
            }
            _ => (1.0, 1.0),
        };

        let ts = if obs.meas_ts > 0 { obs.meas_ts } else { now };
        let sample = LastSample {
            ts,
            x_mm: obs.x_mm,
            y_mm: obs.y_mm,
        };
        let key = HistoryKey::of(obs);

        let stale_scale = if q.stale_noise_scale_max > 1.0 {
            let age = (now - ts).max(0) as f64;
            lerp(1.0, q.stale_noise_scale_max, clamp01(age / self.stale_meas_max_ms as f64))
        } else {
            1.0
        };

        let jitter_scale = self.jitter_scale(key.clone(), sample);
        let jump_scale = self.jump_scale(key, sample);

        base_var * bearing_scale * range_scale * jitter_scale * stale_scale * jump_scale
    }

    fn jitter_scale(&mut self, key: HistoryKey, sample: LastSample) -> f64 {
        if sample.ts <= 0 {
            return 1.0;
        }
        let q = &self.config;
        match self
            .jitter_last
            .insert(key, sample)
            .and_then(|prev| prev.step_to(&sample, q.jitter_window_ms))
        {
            Some((dist, _)) => map_scale(dist, q.jitter_full_mm, q.jitter_cutoff_mm, q.jitter_noise_scale_max),
            None => 1.0,
        }
    }

    fn jump_scale(&mut self, key: HistoryKey, sample: LastSample) -> f64 {
        if sample.ts <= 0 {
            return 1.0;
        }
        let q = &self.config;
        let Some((dist, dt_ms)) = self
            .jump_last
            .insert(key, sample)
            .and_then(|prev| prev.step_to(&sample, q.jitter_window_ms))
        else {
            return 1.0;
        };
        let speed_mm_s = dist / (dt_ms as f64 / 1000.0);
        jump_scale_for_speed(
            speed_mm_s,
            q.jump_suspicious_mm_s,
            q.jump_impossible_mm_s,
            q.jump_noise_scale_max,
        )
    }
}

/// Keeps the newest observation per [`DedupKey`]; ties go to the later one.
fn dedup_latest(observations: &[Observation]) -> Vec<Observation> {
    let mut index_by_key: HashMap<DedupKey, usize> = HashMap::new();
    let mut out: Vec<Observation> = Vec::with_capacity(observations.len());
    for obs in observations {
        match index_by_key.get(&DedupKey::of(obs)) {
            Some(&i) => {
                if obs.meas_ts >= out[i].meas_ts {
                    out[i] = obs.clone();
                }
            }
            None => {
                index_by_key.insert(DedupKey::of(obs), out.len());
                out.push(obs.clone());
            }
        }
    }
    out
}

fn jump_scale_for_speed(speed_mm_s: f64, suspicious: f64, impossible: f64, scale_max: f64) -> f64 {
    if ![speed_mm_s, suspicious, impossible, scale_max].iter().all(|v| v.is_finite()) {
        return 1.0;
    }
    if scale_max <= 1.0 || impossible <= suspicious || speed_mm_s <= suspicious {
        return 1.0;
    }
    if speed_mm_s >= impossible {
        return scale_max;
    }
    lerp(1.0, scale_max, clamp01((speed_mm_s - suspicious) / (impossible - suspicious)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use presence_radar_core::{PointMm, Provenance};

    const BASE_VAR: f64 = 160.0 * 160.0;

    fn obs(publish_as: &str, slot: u8, ts: i64, x: f64, y: f64) -> Observation {
        let radar = RadarId::new(0);
        Observation::new(ts, radar, PointMm::new(x, y)).with_prov(Provenance {
            publish_as: publish_as.to_string(),
            radar_id: radar,
            slot_id: Some(slot),
            meas_ts: ts,
            local_mm: PointMm::new(x, y),
            transform: None,
        })
    }

    fn stage() -> ObservationQualityStage {
        ObservationQualityStage::new(QualityConfig::default(), 250)
    }

    #[test]
    fn test_edge_filter_drops_beyond_cutoff() {
        let mut stage = stage();
        let bare = Observation::new(1000, RadarId::new(1), PointMm::new(5000.0, 10.0));
        let input = vec![
            obs("a", 1, 1000, 900.0, 1000.0),
            obs("a", 2, 1000, 1100.0, 1000.0),
            bare,
        ];
        let out = stage.process(&input, 1000);
        assert_eq!(out.filtered.len(), 2);
        assert_eq!(out.filtered[0].prov.as_ref().and_then(|p| p.slot_id), Some(1));
        assert!(out.filtered[1].prov.is_none());
    }

    #[test]
    fn test_edge_filter_disabled() {
        let cfg = QualityConfig {
            edge_bearing_cutoff_deg: None,
            ..QualityConfig::default()
        };
        let mut stage = ObservationQualityStage::new(cfg, 250);
        let out = stage.process(&[obs("a", 1, 1000, 3000.0, 100.0)], 1000);
        assert_eq!(out.filtered.len(), 1);
    }

    #[test]
    fn test_edge_ramp_ends_at_right_angle_when_disabled() {
        let cfg = QualityConfig {
            edge_bearing_cutoff_deg: None,
            ..QualityConfig::default()
        };
        let mut stage = ObservationQualityStage::new(cfg, 250);
        let b = 60f64.to_radians();
        let input = [
            obs("a", 1, 1000, 1000.0 * b.sin(), 1000.0 * b.cos()),
            obs("a", 2, 1000, 1000.0, 0.0),
        ];
        let out = stage.process(&input, 1000);
        assert_abs_diff_eq!(out.variances_mm2[0], BASE_VAR * 2.5, epsilon = 1e-6);
        assert_abs_diff_eq!(out.variances_mm2[1], BASE_VAR * 4.0, epsilon = 1e-6);
    }

    #[test]
    fn test_dedup_keeps_newest_in_first_seen_order() {
        let input = vec![
            obs("a", 1, 900, 0.0, 1000.0),
            obs("b", 1, 950, 0.0, 1000.0),
            obs("a", 1, 980, 0.0, 1100.0),
            obs("a", 1, 940, 0.0, 1200.0),
        ];
        let out = dedup_latest(&input);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].meas_ts, 980);
        assert_eq!(out[0].y_mm, 1100.0);
        assert_eq!(out[1].prov.as_ref().map(|p| p.publish_as.as_str()), Some("b"));
    }

    #[test]
    fn test_dedup_falls_back_to_radar_key() {
        let mut a = obs("", 1, 900, 0.0, 1000.0);
        let mut b = obs("", 1, 910, 0.0, 1000.0);
        a.radar_id = RadarId::new(0);
        b.radar_id = RadarId::new(1);
        assert_eq!(dedup_latest(&[a, b]).len(), 2);
    }

    #[test]
    fn test_base_variance_on_axis() {
        let mut stage = stage();
        let out = stage.process(&[obs("a", 1, 1000, 0.0, 1000.0)], 1000);
        assert_abs_diff_eq!(out.variances_mm2[0], BASE_VAR, epsilon = 1e-9);
    }

    #[test]
    fn test_range_scale_ramp() {
        let mut stage = stage();
        let out = stage.process(&[obs("a", 1, 1000, 0.0, 2100.0)], 1000);
        assert_abs_diff_eq!(out.variances_mm2[0], BASE_VAR * 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_jitter_scale_saturates() {
        let mut stage = stage();
        stage.process(&[obs("a", 1, 1000, 0.0, 1000.0)], 1000);

        // 250 mm in 100 ms: full jitter, 2500 mm/s is below suspicious.
        let out = stage.process(&[obs("a", 1, 1100, 250.0, 1000.0)], 1100);
        assert_abs_diff_eq!(out.variances_mm2[0], BASE_VAR * 3.0, epsilon = 1e-6);

        // Another slot has no history yet.
        let out = stage.process(&[obs("a", 2, 1100, 250.0, 1000.0)], 1100);
        assert_abs_diff_eq!(out.variances_mm2[0], BASE_VAR, epsilon = 1e-6);
    }

    #[test]
    fn test_jump_scale_for_impossible_speed() {
        let mut stage = stage();
        stage.process(&[obs("a", 1, 1000, 0.0, 500.0)], 1000);
        let out = stage.process(&[obs("a", 1, 1100, 0.0, 1100.0)], 1100);
        // 600 mm in 100 ms: jitter saturates at 3, 6000 mm/s sits 5/9 up the
        // jump ramp.
        let jump = 1.0 + 9.0 * (2500.0 / 4500.0);
        assert_abs_diff_eq!(out.variances_mm2[0], BASE_VAR * 3.0 * jump, epsilon = 1e-6);
    }

    #[test]
    fn test_history_outside_window_is_ignored() {
        let mut stage = stage();
        stage.process(&[obs("a", 1, 1000, 0.0, 500.0)], 1000);
        let out = stage.process(&[obs("a", 1, 1600, 0.0, 1100.0)], 1600);
        assert_abs_diff_eq!(out.variances_mm2[0], BASE_VAR, epsilon = 1e-9);
    }

    #[test]
    fn test_stale_scale() {
        let cfg = QualityConfig {
            stale_noise_scale_max: 3.0,
            ..QualityConfig::default()
        };
        let mut stage = ObservationQualityStage::new(cfg, 250);
        let out = stage.process(&[obs("a", 1, 1000, 0.0, 1000.0)], 1125);
        assert_abs_diff_eq!(out.variances_mm2[0], BASE_VAR * 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_cleanup_purges_idle_history() {
        let mut stage = stage();
        stage.process(&[obs("a", 1, 1000, 0.0, 1000.0), obs("b", 2, 1000, 0.0, 1000.0)], 1000);
        assert_eq!(stage.history_len(), 2);
        stage.cleanup(2000);
        assert_eq!(stage.history_len(), 2);
        stage.cleanup(2001);
        assert_eq!(stage.history_len(), 0);
    }

    #[test]
    fn test_jump_ramp_degenerate() {
        assert_eq!(jump_scale_for_speed(9000.0, 8000.0, 3500.0, 10.0), 1.0);
        assert_eq!(jump_scale_for_speed(9000.0, 3500.0, 8000.0, 1.0), 1.0);
        assert_eq!(jump_scale_for_speed(f64::NAN, 3500.0, 8000.0, 10.0), 1.0);
        assert_eq!(jump_scale_for_speed(9000.0, 3500.0, 8000.0, 10.0), 10.0);
    }
}
