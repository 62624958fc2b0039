//! Integration tests for [`RadarSnapshotBuffer`] alignment, freshness and
//! advance tracking.
//!
//! All timestamps are fixed integers; no wall clock is involved.

use presence_radar_core::{
    Observation, PointMm, PresenceConfig, Provenance, RadarBufferEntry, RadarId, RadarLayoutEntry,
    SnapshotConfig,
};
use presence_radar_tracking::snapshot::{RadarSnapshotBuffer, RadarStatus, Snapshot};

fn layout(enabled: &[bool]) -> Vec<RadarLayoutEntry> {
    enabled
        .iter()
        .enumerate()
        .map(|(i, &enabled)| RadarLayoutEntry {
            publish_as: format!("radar{}", (b'A' + i as u8) as char),
            enabled,
            zone_id: None,
        })
        .collect()
}

fn buffer(enabled: &[bool], snapshot: SnapshotConfig) -> RadarSnapshotBuffer {
    let mut cfg = PresenceConfig::default();
    cfg.layout.radars = layout(enabled);
    cfg.tracking.snapshot = snapshot;
    RadarSnapshotBuffer::from_config(&cfg)
}

fn entry(radar: u8, meas_ts: i64, recv_ts: i64) -> RadarBufferEntry {
    let id = RadarId::new(radar);
    let publish_as = format!("radar{}", (b'A' + radar) as char);
    let local = PointMm::new(1000.0, 1200.0);
    let obs = Observation::new(meas_ts, id, local)
        .with_zone("zone0")
        .with_prov(Provenance {
            publish_as: publish_as.clone(),
            radar_id: id,
            slot_id: Some(1),
            meas_ts,
            local_mm: local,
            transform: None,
        });
    RadarBufferEntry {
        meas_ts,
        recv_ts,
        detection_count: 1,
        slot_count: 1,
        publish_as,
        zone_id: Some("zone0".into()),
        observations: vec![obs],
    }
}

fn meas_ts(snap: &Snapshot, radar: u8) -> Option<i64> {
    snap.radar(RadarId::new(radar)).and_then(|r| r.meas_ts)
}

fn status(snap: &Snapshot, radar: u8) -> Option<RadarStatus> {
    snap.radar(RadarId::new(radar)).map(|r| r.status)
}

fn r(id: u8) -> RadarId {
    RadarId::new(id)
}

// ---------------------------------------------------------------------------
// History trimming and selection
// ---------------------------------------------------------------------------

/// With two frames allowed, the oldest of three is evicted.
#[test]
fn trims_history_by_max_frames() {
    let mut buf = buffer(
        &[true],
        SnapshotConfig {
            radar_buffer_max_frames: 2,
            radar_buffer_window_ms: 10_000,
            ..SnapshotConfig::default()
        },
    );
    for ts in [100, 200, 300] {
        buf.ingest_entry(r(0), entry(0, ts, ts), 1000);
    }
    let snap = buf.make_snapshot(1000, false);
    assert_eq!(meas_ts(&snap, 0), Some(300));
}

/// The newest frame at or before `sample_ts` wins over a newer one.
#[test]
fn selects_latest_at_or_before_sample_ts() {
    let mut buf = buffer(
        &[true],
        SnapshotConfig {
            radar_buffer_max_frames: 10,
            radar_buffer_window_ms: 10_000,
            ..SnapshotConfig::default()
        },
    );
    buf.ingest_entry(r(0), entry(0, 100, 100), 100);
    buf.ingest_entry(r(0), entry(0, 250, 250), 175);
    let snap = buf.make_snapshot(175, false);
    assert_eq!(meas_ts(&snap, 0), Some(100));
}

/// Entries already outside the window are dropped at ingest.
#[test]
fn applies_window_cutoff_at_ingest() {
    let mut buf = buffer(
        &[true],
        SnapshotConfig {
            radar_buffer_max_frames: 10,
            radar_buffer_window_ms: 100,
            ..SnapshotConfig::default()
        },
    );
    buf.ingest_entry(r(0), entry(0, 100, 100), 400);
    buf.ingest_entry(r(0), entry(0, 350, 350), 400);
    let snap = buf.make_snapshot(400, false);
    assert_eq!(meas_ts(&snap, 0), Some(350));
    assert_eq!(buf.buffered(r(0)), 1);
}

/// Jitter delay moves `sample_ts` back and selection follows it.
#[test]
fn jitter_delay_picks_older_frame() {
    let mut buf = buffer(
        &[true],
        SnapshotConfig {
            jitter_delay_ms: 40,
            ..SnapshotConfig::default()
        },
    );
    buf.ingest_entry(r(0), entry(0, 900, 900), 1000);
    buf.ingest_entry(r(0), entry(0, 980, 980), 1000);
    let snap = buf.make_snapshot(1000, false);
    assert_eq!(snap.meta.sample_ts, 960);
    assert_eq!(meas_ts(&snap, 0), Some(900));
}

// ---------------------------------------------------------------------------
// Wait-for-all alignment
// ---------------------------------------------------------------------------

fn wait_for_all(timeout_ms: i64, stale_meas_max_ms: i64) -> SnapshotConfig {
    let mut cfg = SnapshotConfig {
        stale_meas_max_ms,
        radar_missing_timeout_ms: 1500,
        ..SnapshotConfig::default()
    };
    cfg.wait_for_all.enabled = true;
    cfg.wait_for_all.timeout_ms = timeout_ms;
    cfg
}

/// Alignment lands on the slowest radar and the faster radar contributes
/// its older frame.
#[test]
fn wait_for_all_aligns_on_slowest_radar() {
    let mut buf = buffer(&[true, true], wait_for_all(110, 500));
    buf.ingest_entry(r(0), entry(0, 880, 880), 1000);
    buf.ingest_entry(r(0), entry(0, 980, 980), 1000);
    buf.ingest_entry(r(1), entry(1, 900, 900), 1000);

    let snap = buf.make_snapshot(1000, false);
    assert_eq!(snap.meta.sample_ts, 900);
    assert_eq!(meas_ts(&snap, 0), Some(880));
    assert_eq!(meas_ts(&snap, 1), Some(900));
    assert_eq!(snap.meta.snapshot_key, "0:880|1:900");
    assert!(snap.meta.wait_for_all);
    assert_eq!(snap.meta.wait_for_all_timeout_ms, Some(110));
}

/// A radar that never reports does not hold alignment back.
#[test]
fn wait_for_all_ignores_radar_without_data() {
    let mut buf = buffer(&[true, true, true], wait_for_all(110, 500));
    buf.ingest_entry(r(0), entry(0, 900, 900), 900);
    buf.ingest_entry(r(1), entry(1, 900, 900), 900);
    let snap1 = buf.make_snapshot(1000, false);
    assert_eq!(snap1.meta.snapshot_key, "0:900|1:900|2:na");
    assert_eq!(snap1.meta.radars_missing, 1);
    assert!(snap1.meta.snapshots_advanced_this_tick);

    buf.ingest_entry(r(0), entry(0, 1000, 1000), 1000);
    buf.ingest_entry(r(1), entry(1, 1000, 1000), 1000);
    let snap2 = buf.make_snapshot(1100, false);
    assert_eq!(snap2.meta.sample_ts, 1000);
    assert_eq!(snap2.meta.snapshot_key, "0:1000|1:1000|2:na");
    assert_eq!(snap2.meta.radars_missing, 1);
    assert!(snap2.meta.snapshots_advanced_this_tick);
}

/// A late radar catching up changes the key and counts as one advance.
#[test]
fn wait_for_all_late_arrival_updates_key() {
    let mut buf = buffer(&[true, true, true], wait_for_all(110, 250));
    buf.ingest_entry(r(0), entry(0, 1000, 1000), 1000);
    buf.ingest_entry(r(1), entry(1, 1000, 1000), 1000);
    buf.ingest_entry(r(2), entry(2, 900, 900), 1000);

    let before = buf.make_snapshot(1000, false);
    assert_eq!(before.meta.snapshot_key, "0:1000|1:1000|2:900");

    buf.ingest_entry(r(2), entry(2, 1000, 1000), 1050);
    let after = buf.make_snapshot(1050, false);
    assert_eq!(after.meta.sample_ts, 1000);
    assert_eq!(after.meta.snapshot_key, "0:1000|1:1000|2:1000");
    assert!(after.meta.snapshots_advanced_this_tick);
    assert_eq!(after.meta.radars_advanced_count, 1);
}

/// Cleanup forgets latest records so alignment never waits on a radar
/// whose history is gone.
#[test]
fn cleanup_forgets_phantom_latest() {
    let mut cfg = wait_for_all(110, 250);
    cfg.radar_buffer_window_ms = 400;
    let mut buf = buffer(&[true, true], cfg);

    buf.ingest_entry(r(1), entry(1, 1000, 1000), 1000);
    buf.ingest_entry(r(0), entry(0, 1880, 1880), 2000);
    buf.ingest_entry(r(0), entry(0, 1980, 1980), 2000);
    buf.cleanup(2000);

    assert_eq!(buf.latest_meas_ts(r(1)), None);
    let snap = buf.make_snapshot(2000, false);
    assert_eq!(snap.meta.sample_ts, 1980);
    assert_eq!(snap.meta.snapshot_key, "0:1980|1:na");
}

// ---------------------------------------------------------------------------
// Freshness classification
// ---------------------------------------------------------------------------

/// Ages equal to a threshold stay in the lower class.
#[test]
fn classifies_at_threshold_boundaries() {
    let mut buf = buffer(
        &[true, true, true, true],
        SnapshotConfig {
            stale_meas_max_ms: 100,
            radar_missing_timeout_ms: 300,
            ..SnapshotConfig::default()
        },
    );
    buf.ingest_entry(r(0), entry(0, 900, 900), 1000);
    buf.ingest_entry(r(1), entry(1, 899, 899), 1000);
    buf.ingest_entry(r(2), entry(2, 700, 700), 1000);
    buf.ingest_entry(r(3), entry(3, 699, 699), 1000);

    let snap = buf.make_snapshot(1000, false);
    assert_eq!(status(&snap, 0), Some(RadarStatus::Fresh));
    assert_eq!(status(&snap, 1), Some(RadarStatus::Stale));
    assert_eq!(status(&snap, 2), Some(RadarStatus::Stale));
    assert_eq!(status(&snap, 3), Some(RadarStatus::Missing));
    assert_eq!(snap.meta.radars_fresh, 1);
    assert_eq!(snap.meta.radars_stale, 2);
    assert_eq!(snap.meta.radars_missing, 1);
    assert_eq!(snap.meta.frames_fresh_used, 1);
    assert_eq!(snap.meta.meas_in, 1);
    assert_eq!(snap.observations.len(), 1);
}

/// Idle radars become missing with no selected timestamp after cleanup.
#[test]
fn cleanup_removes_history_after_idle() {
    let mut buf = buffer(
        &[true],
        SnapshotConfig {
            radar_buffer_window_ms: 100,
            ..SnapshotConfig::default()
        },
    );
    buf.ingest_entry(r(0), entry(0, 700, 700), 700);
    buf.cleanup(2000);
    let snap = buf.make_snapshot(2000, false);
    assert_eq!(status(&snap, 0), Some(RadarStatus::Missing));
    assert_eq!(meas_ts(&snap, 0), None);
}

/// Only enabled layout entries are expected.
#[test]
fn expected_set_from_enabled_layout() {
    let mut buf = buffer(&[true, false, true], SnapshotConfig::default());
    let snap = buf.make_snapshot(1000, false);
    assert_eq!(snap.meta.radars_expected, 2);
    let ids: Vec<RadarId> = snap.radars.iter().map(|r| r.radar_id).collect();
    assert_eq!(ids, vec![r(0), r(2)]);
    assert_eq!(snap.meta.radars_missing, 2);
}

// ---------------------------------------------------------------------------
// Snapshot key and advance tracking
// ---------------------------------------------------------------------------

/// Keys are sorted by radar id with `na` for radars without data.
#[test]
fn snapshot_key_sorted_with_na() {
    let mut buf = buffer(&[true, true, true], SnapshotConfig::default());
    buf.ingest_entry(r(2), entry(2, 950, 950), 1000);
    buf.ingest_entry(r(0), entry(0, 900, 900), 1000);
    let snap = buf.make_snapshot(1000, false);
    assert_eq!(snap.meta.snapshot_key, "0:900|1:na|2:950");
}

/// Advance flags follow the selected timestamps tick to tick.
#[test]
fn advanced_counters_follow_selection() {
    let mut buf = buffer(&[true, true], SnapshotConfig::default());
    buf.ingest_entry(r(0), entry(0, 900, 900), 1000);
    buf.ingest_entry(r(1), entry(1, 900, 900), 1000);

    let snap1 = buf.make_snapshot(1000, false);
    assert!(snap1.meta.snapshots_advanced_this_tick);
    assert_eq!(snap1.meta.radars_advanced_count, 2);

    let snap2 = buf.make_snapshot(1050, false);
    assert!(!snap2.meta.snapshots_advanced_this_tick);
    assert_eq!(snap2.meta.radars_advanced_count, 0);

    buf.ingest_entry(r(1), entry(1, 950, 950), 1050);
    let snap3 = buf.make_snapshot(1100, false);
    assert!(snap3.meta.snapshots_advanced_this_tick);
    assert_eq!(snap3.meta.radars_advanced_count, 1);
    assert_eq!(snap3.radar(r(1)).map(|h| h.advanced), Some(true));
    assert_eq!(snap3.radar(r(0)).map(|h| h.advanced), Some(false));
}

/// Re-ingesting the same timestamp is not an advance.
#[test]
fn duplicate_meas_ts_does_not_advance() {
    let mut buf = buffer(&[true], SnapshotConfig::default());
    buf.ingest_entry(r(0), entry(0, 900, 900), 1000);
    let snap1 = buf.make_snapshot(1000, false);
    assert_eq!(snap1.meta.snapshot_key, "0:900");
    assert_eq!(snap1.meta.radars_advanced_count, 1);

    buf.ingest_entry(r(0), entry(0, 900, 900), 1050);
    let snap2 = buf.make_snapshot(1050, false);
    assert_eq!(snap2.meta.snapshot_key, "0:900");
    assert!(!snap2.meta.snapshots_advanced_this_tick);
    assert_eq!(snap2.meta.radars_advanced_count, 0);
}

/// Stuck ticks accumulate while nothing advances and reset on advance.
#[test]
fn stuck_ticks_count_non_advancing_ticks() {
    let mut buf = buffer(
        &[true],
        SnapshotConfig {
            stuck_ticks_warn: 2,
            ..SnapshotConfig::default()
        },
    );
    buf.ingest_entry(r(0), entry(0, 900, 900), 1000);

    let snap1 = buf.make_snapshot(1000, false);
    assert_eq!((snap1.meta.stuck_ticks, snap1.meta.stuck), (0, false));
    let snap2 = buf.make_snapshot(1050, false);
    assert_eq!((snap2.meta.stuck_ticks, snap2.meta.stuck), (1, false));
    let snap3 = buf.make_snapshot(1100, false);
    assert_eq!((snap3.meta.stuck_ticks, snap3.meta.stuck), (2, true));

    buf.ingest_entry(r(0), entry(0, 920, 920), 1100);
    let snap4 = buf.make_snapshot(1150, false);
    assert_eq!((snap4.meta.stuck_ticks, snap4.meta.stuck), (0, false));
}

/// Debug rows mirror the health rows.
#[test]
fn debug_rows_present_when_enabled() {
    let mut buf = buffer(&[true, true], SnapshotConfig::default());
    buf.ingest_entry(r(0), entry(0, 990, 995), 1000);
    let snap = buf.make_snapshot(1000, true);
    let rows = snap.debug.as_ref().expect("debug rows");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].health, snap.radars[0]);
    assert_eq!(rows[0].observation_count, 1);
    assert!(rows[0].from_layout);
    assert_eq!(snap.radars[0].recv_lag_ms, Some(5));
    assert_eq!(snap.meta.max_recv_lag_ms, 5);
    assert_eq!(snap.meta.min_radar_age_ms, 10);
}
