//! Integration tests for [`presence_radar_core::config`].
//!
//! All tests use fixed JSON documents and the `Default` constructors.

use presence_radar_core::config::PresenceConfig;
use presence_radar_core::error::ConfigError;
use presence_radar_core::RadarId;
use tempfile::tempdir;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// The default configuration must pass its own validation.
#[test]
fn default_config_is_valid() {
    PresenceConfig::default()
        .validate()
        .expect("default PresenceConfig must be valid");
}

/// Reference thresholds are carried by the defaults.
#[test]
fn default_config_reference_thresholds() {
    let cfg = PresenceConfig::default();
    let t = &cfg.tracking;
    assert_eq!(t.update_interval_ms, 50);
    assert_eq!(t.snapshot.radar_buffer_max_frames, 5);
    assert_eq!(t.snapshot.radar_buffer_window_ms, 4000);
    assert_eq!(t.snapshot.stale_meas_max_ms, 250);
    assert_eq!(t.snapshot.radar_missing_timeout_ms, 1500);
    assert_eq!(t.snapshot.stuck_ticks_warn, 20);
    assert!(!t.snapshot.wait_for_all.enabled);
    assert_eq!(t.snapshot.wait_for_all.timeout_ms, 120);
    assert_eq!(t.quality.edge_bearing_cutoff_deg, Some(45.0));
    assert_eq!(t.quality.meas_noise_base_mm, 160.0);
    assert!(!t.fusion.enabled);
    assert_eq!(t.fusion.cluster_gate_mm, 450.0);
    assert_eq!(cfg.layout.radar_fov_deg, 120.0);
}

// ---------------------------------------------------------------------------
// JSON loading
// ---------------------------------------------------------------------------

/// A partial camelCase document fills the rest from defaults.
#[test]
fn partial_json_uses_defaults() {
    let json = r#"{
        "layout": {
            "radarAzimuthDeg": [0, 120, 240],
            "tubeDiameterMm": 110,
            "radars": [
                {"publishAs": "radar_n"},
                {"publishAs": "radar_se", "enabled": false},
                {"publishAs": "radar_sw", "zoneId": "kitchen"}
            ]
        },
        "extrinsics": {"yawOffsetsDeg": [0, 1.5, -2]},
        "tracking": {"snapshot": {"waitForAll": {"enabled": true}}, "fusion": {"enabled": true}}
    }"#;
    let cfg = PresenceConfig::from_json_str(json).expect("valid json");
    assert_eq!(cfg.layout.tube_radius_mm(), 55.0);
    assert_eq!(cfg.layout.enabled_radar_ids(), vec![RadarId::new(0), RadarId::new(2)]);
    assert_eq!(cfg.layout.radars[2].zone_id.as_deref(), Some("kitchen"));
    assert!(cfg.layout.radars[0].enabled);
    assert!(cfg.tracking.snapshot.wait_for_all.enabled);
    assert_eq!(cfg.tracking.snapshot.wait_for_all.timeout_ms, 120);
    assert!(cfg.tracking.fusion.enabled);
    assert_eq!(cfg.tracking.fusion.max_cluster_size, 10);
}

/// Loading from a file round-trips through serde.
#[test]
fn from_json_file() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("presence.json");
    let mut cfg = PresenceConfig::default();
    cfg.layout.radar_azimuth_deg = vec![0.0, 180.0];
    std::fs::write(&path, serde_json::to_string_pretty(&cfg).expect("serialize")).expect("write");

    let loaded = PresenceConfig::from_json(&path).expect("load");
    assert_eq!(loaded, cfg);
}

/// A missing file is reported as `FileRead`.
#[test]
fn from_json_missing_file() {
    let dir = tempdir().expect("tempdir");
    let err = PresenceConfig::from_json(&dir.path().join("nope.json")).unwrap_err();
    assert!(matches!(err, ConfigError::FileRead { .. }), "got {err:?}");
}

/// Malformed JSON is reported as `ParseError`.
#[test]
fn from_json_str_malformed() {
    let err = PresenceConfig::from_json_str("{ not json").unwrap_err();
    assert!(matches!(err, ConfigError::ParseError { .. }), "got {err:?}");
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Stale threshold may not exceed the missing timeout.
#[test]
fn stale_above_missing_is_rejected() {
    let mut cfg = PresenceConfig::default();
    cfg.tracking.snapshot.stale_meas_max_ms = 2000;
    let err = cfg.validate().unwrap_err();
    assert!(err.to_string().contains("staleMeasMaxMs"), "got {err}");
}

/// Ramps must have `full < cutoff`.
#[test]
fn inverted_ramp_is_rejected() {
    let mut cfg = PresenceConfig::default();
    cfg.tracking.quality.range_full_mm = 5000.0;
    assert!(cfg.validate().is_err());
}

/// A disabled edge cutoff does not constrain the edge ramp.
#[test]
fn disabled_edge_cutoff_is_valid() {
    let mut cfg = PresenceConfig::default();
    cfg.tracking.quality.edge_bearing_cutoff_deg = None;
    cfg.validate().expect("disabled edge filter is valid");
}

/// Zero cluster size is rejected.
#[test]
fn zero_cluster_size_is_rejected() {
    let mut cfg = PresenceConfig::default();
    cfg.tracking.fusion.max_cluster_size = 0;
    assert!(cfg.validate().is_err());
}

/// Non-finite azimuths are rejected.
#[test]
fn non_finite_azimuth_is_rejected() {
    let mut cfg = PresenceConfig::default();
    cfg.layout.radar_azimuth_deg = vec![0.0, f64::NAN];
    assert!(cfg.validate().is_err());
}
