//! Rolling per-radar history and tick-time frame selection.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use presence_radar_core::{PresenceConfig, RadarBufferEntry, RadarId, SnapshotConfig};

use super::{RadarDebugRow, RadarHealth, RadarStatus, Snapshot, SnapshotMeta};

/// Stuck threshold used when the configured one is zero.
const DEFAULT_STUCK_TICKS_WARN: u32 = 20;

// ---------------------------------------------------------------------------
// RadarSnapshotBuffer
// ---------------------------------------------------------------------------

/// Owns one rolling history per radar id and assembles per-tick snapshots.
///
/// Ingest trims each history by both `radar_buffer_max_frames` and
/// `radar_buffer_window_ms`. [`cleanup`](Self::cleanup) evicts anything
/// older than twice the window, independently of snapshot cadence.
#[derive(Debug)]
pub struct RadarSnapshotBuffer {
    config: SnapshotConfig,
    tick_interval_ms: i64,
    /// Enabled layout radars, sorted.
    expected: Vec<RadarId>,
    buffers: BTreeMap<RadarId, VecDeque<RadarBufferEntry>>,
    /// `meas_ts` of the last ingested entry per radar.
    latest_meas_ts: BTreeMap<RadarId, i64>,
    seen_ever: BTreeSet<RadarId>,
    /// Highest `meas_ts` selected on any earlier tick.
    last_tick_meas_ts: BTreeMap<RadarId, i64>,
    last_status: BTreeMap<RadarId, RadarStatus>,
    stuck_ticks: u32,
    was_stuck: bool,
}

impl RadarSnapshotBuffer {
    /// Creates a buffer expecting `expected` radars each tick. With no
    /// expected radars, every radar currently holding a latest record is
    /// expected instead.
    pub fn new(
        config: SnapshotConfig,
        tick_interval_ms: i64,
        expected: impl IntoIterator<Item = RadarId>,
    ) -> Self {
        let mut expected: Vec<RadarId> = expected.into_iter().collect();
        expected.sort_unstable();
        expected.dedup();
        Self {
            config,
            tick_interval_ms,
            expected,
            buffers: BTreeMap::new(),
            latest_meas_ts: BTreeMap::new(),
            seen_ever: BTreeSet::new(),
            last_tick_meas_ts: BTreeMap::new(),
            last_status: BTreeMap::new(),
            stuck_ticks: 0,
            was_stuck: false,
        }
    }

    /// Creates a buffer expecting the enabled radars of the layout.
    #[must_use]
    pub fn from_config(cfg: &PresenceConfig) -> Self {
        Self::new(
            cfg.tracking.snapshot.clone(),
            cfg.tracking.update_interval_ms,
            cfg.layout.enabled_radar_ids(),
        )
    }

    /// Radars expected from the layout.
    #[must_use]
    pub fn expected(&self) -> &[RadarId] {
        &self.expected
    }

    /// Entries currently buffered for `radar`.
    #[must_use]
    pub fn buffered(&self, radar: RadarId) -> usize {
        self.buffers.get(&radar).map_or(0, VecDeque::len)
    }

    /// `meas_ts` of the last entry ingested for `radar`.
    #[must_use]
    pub fn latest_meas_ts(&self, radar: RadarId) -> Option<i64> {
        self.latest_meas_ts.get(&radar).copied()
    }

    /// Appends `entry` to the radar's history and trims it.
    pub fn ingest_entry(&mut self, radar: RadarId, entry: RadarBufferEntry, now: i64) {
        let meas_ts = entry.meas_ts;
        let cutoff = now - self.config.radar_buffer_window_ms;
        let max_frames = self.config.radar_buffer_max_frames.max(1);

        let buf = self.buffers.entry(radar).or_default();
        buf.push_back(entry);
        buf.retain(|e| e.meas_ts >= cutoff);
        while buf.len() > max_frames {
            buf.pop_front();
        }
        if buf.is_empty() {
            self.buffers.remove(&radar);
        }

        self.latest_meas_ts.insert(radar, meas_ts);
        self.seen_ever.insert(radar);
    }

    /// Evicts history older than twice the buffer window and forgets latest
    /// records past the same horizon.
    pub fn cleanup(&mut self, now: i64) {
        let ttl = self.config.radar_buffer_window_ms.saturating_mul(2);
        if ttl <= 0 {
            return;
        }
        let cutoff = now - ttl;

        self.buffers.retain(|_, buf| {
            buf.retain(|e| e.meas_ts >= cutoff);
            !buf.is_empty()
        });
        self.latest_meas_ts.retain(|radar, ts| {
            let keep = *ts >= cutoff;
            if !keep {
                tracing::debug!(radar_id = %radar, meas_ts = *ts, "forgetting idle radar");
            }
            keep
        });
    }

    /// Clears all history and counters.
    pub fn reset(&mut self) {
        self.buffers.clear();
        self.latest_meas_ts.clear();
        self.seen_ever.clear();
        self.last_tick_meas_ts.clear();
        self.last_status.clear();
        self.stuck_ticks = 0;
        self.was_stuck = false;
    }

    /// Assembles the snapshot for the tick at `now`.
    pub fn make_snapshot(&mut self, now: i64, debug_enabled: bool) -> Snapshot {
        let cfg = &self.config;
        let stale_meas_max_ms = cfg.stale_meas_max_ms;
        let radar_missing_timeout_ms = cfg.radar_missing_timeout_ms;
        let wait_for_all = cfg.wait_for_all.enabled;
        let wait_timeout_ms = cfg.wait_for_all.timeout_ms;

        let expected_ids: Vec<RadarId> = if self.expected.is_empty() {
            self.latest_meas_ts.keys().copied().collect()
        } else {
            self.expected.clone()
        };

        let sample_ts = self.sample_ts(now, &expected_ids);

        let mut observations = Vec::new();
        let mut radars = Vec::with_capacity(expected_ids.len());
        let mut debug_rows = debug_enabled.then(Vec::new);
        let mut selected: Vec<(RadarId, Option<i64>)> = Vec::with_capacity(expected_ids.len());

        let mut radars_fresh = 0usize;
        let mut radars_stale = 0usize;
        let mut radars_missing = 0usize;
        let mut max_radar_age_ms = 0i64;
        let mut min_radar_age_ms: Option<i64> = None;
        let mut max_recv_lag_ms = 0i64;
        let mut frames_fresh_with_detections = 0usize;
        let mut meas_in = 0usize;
        let mut radars_advanced_count = 0usize;

        for &radar_id in &expected_ids {
            let Some(entry) = self.select_entry(radar_id, sample_ts) else {
                selected.push((radar_id, None));
                radars_missing += 1;
                let health = RadarHealth::missing(radar_id);
                if let Some(rows) = debug_rows.as_mut() {
                    rows.push(RadarDebugRow {
                        health: health.clone(),
                        from_layout: !self.expected.is_empty(),
                        buffered_entries: 0,
                        observation_count: 0,
                    });
                }
                radars.push(health);
                continue;
            };

            let meas_ts = entry.meas_ts;
            selected.push((radar_id, Some(meas_ts)));

            let age_ms = (now - meas_ts).max(0);
            let recv_lag_ms = if entry.recv_ts != 0 && meas_ts != 0 {
                (entry.recv_ts - meas_ts).max(0)
            } else {
                0
            };

            let last_tick = self.last_tick_meas_ts.get(&radar_id).copied().unwrap_or(0);
            let advanced = meas_ts > last_tick;
            if advanced {
                radars_advanced_count += 1;
            }

            let status = if age_ms > radar_missing_timeout_ms {
                radars_missing += 1;
                RadarStatus::Missing
            } else if age_ms > stale_meas_max_ms {
                radars_stale += 1;
                RadarStatus::Stale
            } else {
                radars_fresh += 1;
                RadarStatus::Fresh
            };
            let included = status == RadarStatus::Fresh;

            if included {
                max_radar_age_ms = max_radar_age_ms.max(age_ms);
                min_radar_age_ms = Some(min_radar_age_ms.map_or(age_ms, |m| m.min(age_ms)));
                max_recv_lag_ms = max_recv_lag_ms.max(recv_lag_ms);
                if entry.detection_count > 0 {
                    frames_fresh_with_detections += 1;
                }
                meas_in += entry.detection_count;
                observations.extend(entry.observations.iter().cloned());
            }

            let health = RadarHealth {
                radar_id,
                status,
                included,
                advanced,
                meas_ts: Some(meas_ts),
                recv_ts: (entry.recv_ts != 0).then_some(entry.recv_ts),
                age_ms: Some(age_ms),
                recv_lag_ms: Some(recv_lag_ms),
                detection_count: entry.detection_count,
                slot_count: (entry.slot_count != 0).then_some(entry.slot_count),
                publish_as: Some(entry.publish_as.clone()),
                zone_id: entry.zone_id.clone(),
            };
            if let Some(rows) = debug_rows.as_mut() {
                rows.push(RadarDebugRow {
                    health: health.clone(),
                    from_layout: !self.expected.is_empty(),
                    buffered_entries: self.buffered(radar_id),
                    observation_count: entry.observations.len(),
                });
            }
            radars.push(health);
        }

        for health in &radars {
            self.note_status(health.radar_id, health.status);
        }

        for &(radar_id, meas_ts) in &selected {
            let Some(ts) = meas_ts else { continue };
            let last = self.last_tick_meas_ts.entry(radar_id).or_insert(0);
            if ts > *last {
                *last = ts;
            }
        }

        let snapshot_key = selected
            .iter()
            .map(|(radar_id, meas_ts)| match meas_ts {
                Some(ts) if *ts > 0 => format!("{radar_id}:{ts}"),
                _ => format!("{radar_id}:na"),
            })
            .collect::<Vec<_>>()
            .join("|");

        let stuck = self.update_stuck(radars_advanced_count);

        let meta = SnapshotMeta {
            tick_interval_ms: self.tick_interval_ms,
            stale_meas_max_ms,
            radar_missing_timeout_ms,
            jitter_delay_ms: self.config.jitter_delay_ms,
            sample_ts,
            snapshot_key,
            wait_for_all,
            wait_for_all_timeout_ms: wait_for_all.then_some(wait_timeout_ms),
            radars_expected: self.expected.len(),
            radars_seen_total: self.seen_ever.len(),
            radars_fresh,
            radars_stale,
            radars_missing,
            frames_fresh_used: radars_fresh,
            frames_fresh_with_detections,
            meas_in,
            max_radar_age_ms,
            min_radar_age_ms: min_radar_age_ms.unwrap_or(0),
            max_recv_lag_ms,
            snapshots_advanced_this_tick: radars_advanced_count > 0,
            radars_advanced_count,
            stuck_ticks: self.stuck_ticks,
            stuck,
        };

        Snapshot {
            observations,
            radars,
            meta,
            debug: debug_rows,
        }
    }

    /// `now - jitter_delay`, or with wait-for-all the slowest expected
    /// radar's latest timestamp, never further back than the timeout.
    fn sample_ts(&self, now: i64, expected_ids: &[RadarId]) -> i64 {
        let sample_ts = now - self.config.jitter_delay_ms;
        if !self.config.wait_for_all.enabled {
            return sample_ts;
        }
        let min_latest = expected_ids
            .iter()
            .filter_map(|id| self.latest_meas_ts.get(id).copied())
            .filter(|&ts| ts > 0)
            .min();
        match min_latest {
            Some(min_latest) => min_latest.max(now - self.config.wait_for_all.timeout_ms),
            None => sample_ts,
        }
    }

    /// Newest entry with `meas_ts <= sample_ts`, else the newest entry.
    fn select_entry(&self, radar: RadarId, sample_ts: i64) -> Option<&RadarBufferEntry> {
        let buf = self.buffers.get(&radar)?;
        buf.iter()
            .rev()
            .find(|e| e.meas_ts <= sample_ts)
            .or_else(|| buf.back())
    }

    fn note_status(&mut self, radar: RadarId, status: RadarStatus) {
        match self.last_status.insert(radar, status) {
            Some(prev) if prev != status => {
                tracing::info!(radar_id = %radar, from = %prev, to = %status, "radar status changed");
            }
            None if status != RadarStatus::Fresh => {
                tracing::debug!(radar_id = %radar, status = %status, "radar first seen");
            }
            _ => {}
        }
    }

    fn update_stuck(&mut self, radars_advanced_count: usize) -> bool {
        if !self.expected.is_empty() && radars_advanced_count == 0 {
            self.stuck_ticks = self.stuck_ticks.saturating_add(1);
        } else {
            self.stuck_ticks = 0;
        }
        let warn = match self.config.stuck_ticks_warn {
            0 => DEFAULT_STUCK_TICKS_WARN,
            n => n,
        };
        let stuck = self.stuck_ticks >= warn;
        if stuck != self.was_stuck {
            if stuck {
                tracing::warn!(stuck_ticks = self.stuck_ticks, "no expected radar advanced, snapshot stuck");
            } else {
                tracing::info!("snapshot advancing again");
            }
            self.was_stuck = stuck;
        }
        stuck
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use presence_radar_core::{Observation, PointMm};

    fn entry(radar: u8, meas_ts: i64, detections: usize) -> RadarBufferEntry {
        let id = RadarId::new(radar);
        RadarBufferEntry {
            meas_ts,
            recv_ts: meas_ts,
            detection_count: detections,
            slot_count: detections,
            publish_as: format!("radar{radar}"),
            zone_id: Some(format!("zone{radar}")),
            observations: (0..detections)
                .map(|i| Observation::new(meas_ts, id, PointMm::new(1000.0 + i as f64, 1200.0)))
                .collect(),
        }
    }

    #[test]
    fn test_ingest_trims_window_and_count() {
        let cfg = SnapshotConfig {
            radar_buffer_max_frames: 3,
            radar_buffer_window_ms: 1000,
            ..SnapshotConfig::default()
        };
        let mut buf = RadarSnapshotBuffer::new(cfg, 50, [RadarId::new(0)]);
        for ts in [100, 1500, 1600, 1700, 1800] {
            buf.ingest_entry(RadarId::new(0), entry(0, ts, 1), 2000);
        }
        assert_eq!(buf.buffered(RadarId::new(0)), 3);
        assert_eq!(buf.latest_meas_ts(RadarId::new(0)), Some(1800));
    }

    #[test]
    fn test_fresh_radars_pool_observations() {
        let mut buf = RadarSnapshotBuffer::new(SnapshotConfig::default(), 50, [RadarId::new(0), RadarId::new(1)]);
        buf.ingest_entry(RadarId::new(0), entry(0, 990, 2), 1000);
        buf.ingest_entry(RadarId::new(1), entry(1, 500, 3), 1000);
        let snap = buf.make_snapshot(1000, false);
        assert_eq!(snap.observations.len(), 2);
        assert_eq!(snap.meta.meas_in, 2);
        assert_eq!(snap.meta.frames_fresh_with_detections, 1);
        assert_eq!(snap.radar(RadarId::new(1)).map(|r| r.status), Some(RadarStatus::Stale));
        assert!(snap.debug.is_none());
    }

    #[test]
    fn test_no_layout_expects_seen_radars() {
        let mut buf = RadarSnapshotBuffer::new(SnapshotConfig::default(), 50, []);
        buf.ingest_entry(RadarId::new(3), entry(3, 990, 1), 1000);
        let snap = buf.make_snapshot(1000, true);
        assert_eq!(snap.meta.snapshot_key, "3:990");
        assert_eq!(snap.meta.radars_expected, 0);
        let rows = snap.debug.expect("debug rows");
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].from_layout);

        // Never stuck without a layout.
        let snap = buf.make_snapshot(1050, false);
        assert_eq!(snap.meta.stuck_ticks, 0);
    }

    #[test]
    fn test_min_age_zero_without_fresh_radars() {
        let mut buf = RadarSnapshotBuffer::new(SnapshotConfig::default(), 50, [RadarId::new(0)]);
        let snap = buf.make_snapshot(1000, false);
        assert_eq!(snap.meta.min_radar_age_ms, 0);
        assert_eq!(snap.meta.snapshot_key, "0:na");
    }
}
