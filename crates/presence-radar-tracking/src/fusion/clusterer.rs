//! Gated union-find clustering with visibility-checked cross-radar merges.

use std::collections::BTreeSet;
use std::sync::Arc;

use presence_radar_core::utils::{bearing_deg, percentile_from_sorted, range_mm};
use presence_radar_core::{
    CoordinateTransform, FusionConfig, Observation, PointMm, PresenceConfig, QualityConfig, RadarId,
};

use super::union_find::UnionFind;
use super::{ClusterDebug, ClusterMember, FusionDebug, FusionOutput};

/// Bearing limit when the quality stage has no edge cutoff.
const OPEN_BEARING_DEG: f64 = 180.0;

/// Percentile reported for cluster radii.
const RADIUS_PERCENTILE: f64 = 0.95;

/// Merges observations of one target within and across radars.
///
/// Holds only configuration and a shared transform, so one instance can be
/// used from several threads.
#[derive(Debug, Clone)]
pub struct FusionClusterer {
    config: FusionConfig,
    /// Visibility limit on absolute local bearing, margin included.
    bearing_abs_max_deg: f64,
    /// Visibility limit on local range, margin included.
    range_max_mm: f64,
    transform: Arc<CoordinateTransform>,
}

impl FusionClusterer {
    /// Creates a clusterer. The visibility region of each radar is the
    /// tighter of the edge cutoff and half the field of view, plus the
    /// configured margins.
    #[must_use]
    pub fn new(
        config: FusionConfig,
        quality: &QualityConfig,
        radar_fov_deg: f64,
        transform: Arc<CoordinateTransform>,
    ) -> Self {
        let edge = quality.edge_cutoff_deg().map_or(OPEN_BEARING_DEG, f64::abs);
        let half_fov = if radar_fov_deg.is_finite() {
            radar_fov_deg.abs() / 2.0
        } else {
            OPEN_BEARING_DEG
        };
        let bearing_abs_max_deg = edge.min(half_fov) + finite_abs(config.fov_margin_deg);
        let range_max_mm = quality.range_cutoff_mm + finite_abs(config.range_margin_mm);
        Self {
            config,
            bearing_abs_max_deg,
            range_max_mm,
            transform,
        }
    }

    #[must_use]
    pub fn from_config(cfg: &PresenceConfig, transform: Arc<CoordinateTransform>) -> Self {
        Self::new(
            cfg.tracking.fusion.clone(),
            &cfg.tracking.quality,
            cfg.layout.radar_fov_deg,
            transform,
        )
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// True if `world` lies inside `radar`'s bearing and range limits.
    #[must_use]
    pub fn is_visible(&self, radar: RadarId, world: PointMm) -> bool {
        let local = self.transform.to_local_mm(radar, world);
        if !local.is_finite() {
            return false;
        }
        bearing_deg(local.x_mm, local.y_mm).abs() <= self.bearing_abs_max_deg
            && range_mm(local.x_mm, local.y_mm) <= self.range_max_mm
    }

    /// Clusters `observations` and fuses each group.
    ///
    /// `variances_mm2` pairs 1:1 with `observations`. With fusion disabled
    /// or at most one observation both are returned unchanged.
    pub fn cluster(
        &self,
        observations: &[Observation],
        variances_mm2: &[f64],
        debug_enabled: bool,
    ) -> FusionOutput {
        let enabled = self.config.enabled;
        let gate_mm = self.config.cluster_gate_mm;
        if !enabled || observations.len() <= 1 {
            return FusionOutput {
                observations: observations.to_vec(),
                variances_mm2: variances_mm2.to_vec(),
                debug: FusionDebug::passthrough(enabled, observations.len(), gate_mm),
            };
        }

        let gate_sq = (gate_mm * gate_mm).max(1.0);
        let n = observations.len();
        let mut uf = UnionFind::new(n);
        let mut merges_cross_radar = 0usize;
        let mut merge_rejected_not_visible = 0usize;

        for i in 0..n {
            let a = &observations[i];
            for (j, b) in observations.iter().enumerate().skip(i + 1) {
                if a.world().distance_sq(&b.world()) > gate_sq {
                    continue;
                }
                if a.radar_id == b.radar_id {
                    uf.union(i, j);
                    continue;
                }
                let mid = PointMm::new((a.x_mm + b.x_mm) / 2.0, (a.y_mm + b.y_mm) / 2.0);
                if self.is_visible(a.radar_id, mid) && self.is_visible(b.radar_id, mid) {
                    merges_cross_radar += 1;
                    uf.union(i, j);
                } else {
                    merge_rejected_not_visible += 1;
                }
            }
        }

        let mut fused = Vec::with_capacity(n);
        let mut fused_var = Vec::with_capacity(n);
        let mut radii = Vec::with_capacity(n);
        let mut clusters_multi_radar = 0usize;
        let mut cluster_rows = debug_enabled.then(Vec::new);

        for idxs in uf.groups() {
            if idxs.len() == 1 || idxs.len() > self.config.max_cluster_size {
                if idxs.len() > 1 {
                    tracing::debug!(
                        size = idxs.len(),
                        max = self.config.max_cluster_size,
                        "oversized cluster passed through unmerged"
                    );
                }
                for i in idxs {
                    fused.push(observations[i].clone());
                    fused_var.push(variance_at(variances_mm2, i));
                    radii.push(0.0);
                }
                continue;
            }

            let merged = merge_group(observations, variances_mm2, &idxs);
            if merged.multi_radar {
                clusters_multi_radar += 1;
            }
            radii.push(merged.radius_mm);
            if let Some(rows) = cluster_rows.as_mut() {
                rows.push(ClusterDebug {
                    output_index: fused.len(),
                    members: idxs
                        .iter()
                        .map(|&i| {
                            let m = &observations[i];
                            ClusterMember {
                                radar_id: m.radar_id,
                                zone_id: m.zone_id.clone(),
                                x_mm: m.x_mm,
                                y_mm: m.y_mm,
                                meas_ts: m.meas_ts,
                                var_mm2: variance_at(variances_mm2, i),
                            }
                        })
                        .collect(),
                    radius_mm: merged.radius_mm,
                });
            }
            fused.push(merged.observation);
            fused_var.push(merged.var_mm2);
        }

        radii.sort_by(f64::total_cmp);
        let cluster_radius_mm_max = radii.last().copied().unwrap_or(0.0);
        let cluster_radius_mm_p95 = percentile_from_sorted(&radii, RADIUS_PERCENTILE).unwrap_or(0.0);

        FusionOutput {
            debug: FusionDebug {
                enabled,
                clusters_out: fused.len(),
                clusters_multi_radar,
                cluster_gate_mm: gate_mm,
                cluster_radius_mm_max,
                cluster_radius_mm_p95,
                merges_cross_radar,
                merge_rejected_not_visible,
                clusters: cluster_rows,
            },
            observations: fused,
            variances_mm2: fused_var,
        }
    }
}

struct MergedGroup {
    observation: Observation,
    var_mm2: f64,
    radius_mm: f64,
    multi_radar: bool,
}

/// Inverse-variance weighted fusion of one group of two or more members.
fn merge_group(observations: &[Observation], variances_mm2: &[f64], idxs: &[usize]) -> MergedGroup {
    let mut sum_w = 0.0;
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut ts_max = 0i64;
    let mut radars: BTreeSet<RadarId> = BTreeSet::new();
    let mut sources: BTreeSet<RadarId> = BTreeSet::new();
    let mut zones: BTreeSet<&str> = BTreeSet::new();
    let mut best = idxs[0];
    let mut best_var = f64::INFINITY;

    for &i in idxs {
        let m = &observations[i];
        let var = variance_at(variances_mm2, i);
        let w = 1.0 / var.max(1.0);
        sum_w += w;
        sum_x += w * m.x_mm;
        sum_y += w * m.y_mm;
        ts_max = ts_max.max(m.meas_ts);
        radars.insert(m.radar_id);
        sources.insert(m.radar_id);
        sources.extend(m.source_radars.iter().copied());
        if let Some(zone) = m.zone_id.as_deref() {
            zones.insert(zone);
        }
        if var < best_var {
            best_var = var;
            best = i;
        }
    }

    let rep = &observations[best];
    let centroid = if sum_w > 0.0 {
        PointMm::new(sum_x / sum_w, sum_y / sum_w)
    } else {
        rep.world()
    };
    let radius_mm = idxs
        .iter()
        .map(|&i| observations[i].world().distance(&centroid))
        .filter(|d| d.is_finite())
        .fold(0.0, f64::max);

    let multi_radar = radars.len() > 1;
    let zone_id = match zones.len() {
        1 => zones.iter().next().map(|z| (*z).to_string()),
        _ => rep.zone_id.clone(),
    };

    let observation = Observation {
        meas_ts: if ts_max > 0 { ts_max } else { rep.meas_ts },
        radar_id: rep.radar_id,
        zone_id,
        x_mm: centroid.x_mm,
        y_mm: centroid.y_mm,
        source_radars: sources.into_iter().collect(),
        prov: if multi_radar { None } else { rep.prov.clone() },
    };
    let var_mm2 = if sum_w > 0.0 {
        1.0 / sum_w
    } else {
        variance_at(variances_mm2, best)
    };

    MergedGroup {
        observation,
        var_mm2,
        radius_mm,
        multi_radar,
    }
}

/// Variance for index `i`; missing, zero or NaN entries count as 1.
fn variance_at(variances_mm2: &[f64], i: usize) -> f64 {
    match variances_mm2.get(i) {
        Some(&v) if v != 0.0 && !v.is_nan() => v,
        _ => 1.0,
    }
}

fn finite_abs(v: f64) -> f64 {
    if v.is_finite() {
        v.abs()
    } else {
        0.0
    }
}
