//! Decoded LD2460 tracking frame.

use serde::{Deserialize, Serialize};

use presence_radar_core::{RadarFrame, RawDetection};

/// Policy deciding whether a decoded target slot holds a real detection.
///
/// The LD2460 has no explicit presence bit, so validity is inferred.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidRule {
    /// Nonzero resolution field.
    #[serde(rename = "resolution")]
    Resolution,
    /// Nonzero X or Y.
    #[default]
    #[serde(rename = "nonzeroXY")]
    NonzeroXy,
    /// Either of the above.
    #[serde(rename = "either")]
    Either,
}

impl ValidRule {
    /// Applies the rule to a decoded slot.
    #[must_use]
    pub fn is_valid(self, resolution_mm: u16, x_mm: i32, y_mm: i32) -> bool {
        let nonzero_xy = x_mm != 0 || y_mm != 0;
        match self {
            Self::Resolution => resolution_mm != 0,
            Self::NonzeroXy => nonzero_xy,
            Self::Either => resolution_mm != 0 || nonzero_xy,
        }
    }
}

impl std::str::FromStr for ValidRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resolution" => Ok(Self::Resolution),
            "nonzeroXY" | "nonzero-xy" => Ok(Self::NonzeroXy),
            "either" => Ok(Self::Either),
            other => Err(format!("unknown valid rule: {other}")),
        }
    }
}

/// One tracking report: every target slot in wire order plus a receive
/// timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingFrame {
    /// Receive timestamp assigned by the decoder (ms).
    pub timestamp_ms: i64,
    /// Target slots, including empty ones.
    pub targets: Vec<RawDetection>,
    /// True if any slot is valid.
    pub present: bool,
}

impl TrackingFrame {
    /// Builds a frame and derives `present` from its slots.
    #[must_use]
    pub fn new(timestamp_ms: i64, targets: Vec<RawDetection>) -> Self {
        let present = targets.iter().any(|t| t.valid);
        Self {
            timestamp_ms,
            targets,
            present,
        }
    }

    /// Valid targets only.
    pub fn valid_targets(&self) -> impl Iterator<Item = &RawDetection> {
        self.targets.iter().filter(|t| t.valid)
    }
}

impl RadarFrame for TrackingFrame {
    fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    fn detections(&self) -> &[RawDetection] {
        &self.targets
    }

    fn present(&self) -> bool {
        self.present
    }
}
