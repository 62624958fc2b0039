//! Cross-radar fusion of per-tick observations.
//!
//! [`FusionClusterer`] groups observations that plausibly belong to one
//! target and collapses each group into a single inverse-variance weighted
//! observation. Cross-radar pairs only merge when both radars could have
//! seen the pair's midpoint.

mod clusterer;
mod union_find;

pub use clusterer::FusionClusterer;

use serde::{Deserialize, Serialize};

use presence_radar_core::{Observation, RadarId};

/// One member of a merged cluster, reported in debug mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMember {
    pub radar_id: RadarId,
    pub zone_id: Option<String>,
    pub x_mm: f64,
    pub y_mm: f64,
    pub meas_ts: i64,
    pub var_mm2: f64,
}

/// Debug detail of one merged cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterDebug {
    /// Index of the fused observation in [`FusionOutput::observations`].
    pub output_index: usize,
    pub members: Vec<ClusterMember>,
    /// Largest member distance from the fused centroid.
    pub radius_mm: f64,
}

/// Per-tick fusion counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FusionDebug {
    pub enabled: bool,
    pub clusters_out: usize,
    pub clusters_multi_radar: usize,
    pub cluster_gate_mm: f64,
    pub cluster_radius_mm_max: f64,
    pub cluster_radius_mm_p95: f64,
    pub merges_cross_radar: usize,
    pub merge_rejected_not_visible: usize,
    /// Merged clusters; only in debug mode.
    pub clusters: Option<Vec<ClusterDebug>>,
}

impl FusionDebug {
    fn passthrough(enabled: bool, clusters_out: usize, cluster_gate_mm: f64) -> Self {
        Self {
            enabled,
            clusters_out,
            clusters_multi_radar: 0,
            cluster_gate_mm,
            cluster_radius_mm_max: 0.0,
            cluster_radius_mm_p95: 0.0,
            merges_cross_radar: 0,
            merge_rejected_not_visible: 0,
            clusters: None,
        }
    }
}

/// Result of [`FusionClusterer::cluster`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FusionOutput {
    pub observations: Vec<Observation>,
    /// Variance (mm²) per entry of `observations`.
    pub variances_mm2: Vec<f64>,
    pub debug: FusionDebug,
}
