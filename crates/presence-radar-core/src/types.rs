//! Core data types for the presence-radar system.
//!
//! This module defines the values that flow between the decoder, the snapshot
//! buffer, the quality stage and the fusion clusterer:
//!
//! - [`RawDetection`]: one radar-local slot as reported by the sensor
//! - [`Observation`]: a world-frame detection ready for fusion
//! - [`Provenance`]: which radar and slot produced an observation
//! - [`RadarBufferEntry`]: one ingested frame worth of observations
//!
//! All timestamps are integer milliseconds (`i64`). All positions are
//! millimetres; world positions use `+X` north and `+Y` east.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one physical radar unit.
///
/// Radar ids are small indices into the layout configuration and are stable
/// across ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RadarId(u8);

impl RadarId {
    /// Creates a radar id from its layout index.
    #[must_use]
    pub const fn new(id: u8) -> Self {
        Self(id)
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }

    /// Returns the id as a layout index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Converts a layout index to a radar id, if it fits.
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        u8::try_from(index).ok().map(Self)
    }
}

impl fmt::Display for RadarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for RadarId {
    fn from(id: u8) -> Self {
        Self(id)
    }
}

/// A 2-D point in millimetres.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointMm {
    /// X coordinate (mm)
    pub x_mm: f64,
    /// Y coordinate (mm)
    pub y_mm: f64,
}

impl PointMm {
    /// Creates a new point.
    #[must_use]
    pub const fn new(x_mm: f64, y_mm: f64) -> Self {
        Self { x_mm, y_mm }
    }

    /// Both coordinates are finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.x_mm.is_finite() && self.y_mm.is_finite()
    }

    /// Squared Euclidean distance to `other`.
    #[must_use]
    pub fn distance_sq(&self, other: &Self) -> f64 {
        let dx = self.x_mm - other.x_mm;
        let dy = self.y_mm - other.y_mm;
        dx * dx + dy * dy
    }

    /// Euclidean distance to `other`.
    #[must_use]
    pub fn distance(&self, other: &Self) -> f64 {
        self.distance_sq(other).sqrt()
    }
}

/// One radar-local detection slot as decoded from the wire.
///
/// `valid == false` marks an empty slot, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDetection {
    /// Radar-assigned slot number (1-based in wire order)
    pub slot_id: u8,
    /// Local X (mm), lateral
    pub x_mm: i32,
    /// Local Y (mm), forward
    pub y_mm: i32,
    /// Sensor-reported resolution, zero when not reported
    pub resolution_mm: u16,
    /// Sensor-reported speed, zero when not reported
    pub speed_cms: i16,
    /// Sensor-declared presence bit
    pub valid: bool,
}

impl RawDetection {
    /// Local position as a floating point.
    #[must_use]
    pub fn local_mm(&self) -> PointMm {
        PointMm::new(f64::from(self.x_mm), f64::from(self.y_mm))
    }
}

/// Geometry used to place one radar in the world frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformParams {
    /// Mounting azimuth around the tube (degrees)
    pub phi_deg: f64,
    /// Yaw correction (degrees)
    pub delta_deg: f64,
    /// Tube radius (mm)
    pub tube_radius_mm: f64,
}

impl TransformParams {
    /// Effective rotation `phi + delta` in degrees.
    #[must_use]
    pub fn theta_deg(&self) -> f64 {
        self.phi_deg + self.delta_deg
    }
}

/// Record of which radar and slot produced an observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    /// Publish name of the originating radar
    pub publish_as: String,
    /// Originating radar
    pub radar_id: RadarId,
    /// Sensor slot, when the sensor reports one
    pub slot_id: Option<u8>,
    /// Source timestamp (ms)
    pub meas_ts: i64,
    /// Position in the originating radar's local frame
    pub local_mm: PointMm,
    /// Transform used to reach world coordinates
    pub transform: Option<TransformParams>,
}

/// A world-frame detection ready for fusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    /// Source timestamp (ms)
    pub meas_ts: i64,
    /// Radar that produced the observation (the best member once fused)
    pub radar_id: RadarId,
    /// Logical zone tag
    pub zone_id: Option<String>,
    /// World X (mm)
    pub x_mm: f64,
    /// World Y (mm)
    pub y_mm: f64,
    /// Contributing radars, sorted and unique
    pub source_radars: Vec<RadarId>,
    /// Provenance; `None` once fused from more than one radar
    pub prov: Option<Provenance>,
}

impl Observation {
    /// Creates a single-source observation.
    #[must_use]
    pub fn new(meas_ts: i64, radar_id: RadarId, world: PointMm) -> Self {
        Self {
            meas_ts,
            radar_id,
            zone_id: None,
            x_mm: world.x_mm,
            y_mm: world.y_mm,
            source_radars: vec![radar_id],
            prov: None,
        }
    }

    /// Sets the zone tag.
    #[must_use]
    pub fn with_zone(mut self, zone_id: impl Into<String>) -> Self {
        self.zone_id = Some(zone_id.into());
        self
    }

    /// Sets the provenance.
    #[must_use]
    pub fn with_prov(mut self, prov: Provenance) -> Self {
        self.prov = Some(prov);
        self
    }

    /// World position.
    #[must_use]
    pub fn world(&self) -> PointMm {
        PointMm::new(self.x_mm, self.y_mm)
    }

    /// Local position from provenance, if present.
    #[must_use]
    pub fn local_mm(&self) -> Option<PointMm> {
        self.prov.as_ref().map(|p| p.local_mm)
    }
}

/// One ingested frame worth of data for one radar.
///
/// Owned by the snapshot buffer and never mutated after append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RadarBufferEntry {
    /// Source timestamp (ms)
    pub meas_ts: i64,
    /// Processing-time receipt (ms)
    pub recv_ts: i64,
    /// Number of valid detections in the frame
    pub detection_count: usize,
    /// Number of slots in the frame
    pub slot_count: usize,
    /// Publish name of the radar
    pub publish_as: String,
    /// Logical zone tag
    pub zone_id: Option<String>,
    /// World-frame observations derived from the frame
    pub observations: Vec<Observation>,
}
