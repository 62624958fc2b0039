//! Radar-local to world coordinate transform.
//!
//! Each radar sits on the surface of a central tube at azimuth `phi` and looks
//! outward. Its local frame has `+y` forward and `+x` to the right. The world
//! frame has `+X` north and `+Y` east.
//!
//! For radar `i` with rotation `theta = phi + delta` and mount offset
//! `t = (R cos phi, R sin phi)`:
//!
//! ```text
//! X = cos(theta) * y - sin(theta) * x + tx
//! Y = sin(theta) * y + cos(theta) * x + ty
//! ```
//!
//! The transform is immutable after construction and can be shared freely
//! across threads.

use crate::config::PresenceConfig;
use crate::types::{PointMm, RadarId, TransformParams};

#[derive(Debug, Clone, Copy)]
struct RadarGeometry {
    params: TransformParams,
    cos: f64,
    sin: f64,
    tx: f64,
    ty: f64,
}

impl RadarGeometry {
    fn new(phi_deg: f64, delta_deg: f64, tube_radius_mm: f64) -> Self {
        let params = TransformParams {
            phi_deg,
            delta_deg,
            tube_radius_mm,
        };
        let theta = params.theta_deg().to_radians();
        let phi = phi_deg.to_radians();
        Self {
            params,
            cos: theta.cos(),
            sin: theta.sin(),
            tx: tube_radius_mm * phi.cos(),
            ty: tube_radius_mm * phi.sin(),
        }
    }
}

/// Per-radar rigid transform between local and world frames.
#[derive(Debug, Clone)]
pub struct CoordinateTransform {
    radars: Vec<RadarGeometry>,
    yaw_offsets_deg: Vec<f64>,
    tube_radius_mm: f64,
}

impl CoordinateTransform {
    /// Builds the transform from azimuths, optional yaw corrections and the
    /// tube radius.
    ///
    /// Yaw corrections are used only when there is one per azimuth; the first
    /// radar is the reference and its correction is forced to 0.
    #[must_use]
    pub fn new(radar_azimuth_deg: &[f64], yaw_offsets_deg: Option<&[f64]>, tube_radius_mm: f64) -> Self {
        let mut yaw = vec![0.0; radar_azimuth_deg.len()];
        if let Some(offsets) = yaw_offsets_deg {
            if offsets.len() == radar_azimuth_deg.len() {
                for (dst, src) in yaw.iter_mut().zip(offsets).skip(1) {
                    *dst = if src.is_finite() { *src } else { 0.0 };
                }
            }
        }
        let radars = radar_azimuth_deg
            .iter()
            .zip(&yaw)
            .map(|(&phi, &delta)| RadarGeometry::new(phi, delta, tube_radius_mm))
            .collect();
        Self {
            radars,
            yaw_offsets_deg: yaw,
            tube_radius_mm,
        }
    }

    /// Builds the transform from a full configuration.
    #[must_use]
    pub fn from_config(cfg: &PresenceConfig) -> Self {
        Self::new(
            &cfg.layout.radar_azimuth_deg,
            cfg.extrinsics.yaw_offsets_deg.as_deref(),
            cfg.layout.tube_radius_mm(),
        )
    }

    /// Number of radars with known geometry.
    #[must_use]
    pub fn radar_count(&self) -> usize {
        self.radars.len()
    }

    /// Effective yaw correction per radar (degrees).
    #[must_use]
    pub fn yaw_offsets_deg(&self) -> &[f64] {
        &self.yaw_offsets_deg
    }

    /// Tube radius in use (mm).
    #[must_use]
    pub fn tube_radius_mm(&self) -> f64 {
        self.tube_radius_mm
    }

    /// Geometry of one radar, or `None` for an unknown id.
    #[must_use]
    pub fn params(&self, radar: RadarId) -> Option<TransformParams> {
        self.radars.get(radar.index()).map(|g| g.params)
    }

    /// Maps a local detection into the world frame.
    ///
    /// Unknown radar ids map to the origin.
    #[must_use]
    pub fn to_world_mm(&self, radar: RadarId, local: PointMm) -> PointMm {
        let Some(g) = self.radars.get(radar.index()) else {
            return PointMm::default();
        };
        PointMm::new(
            g.cos * local.y_mm - g.sin * local.x_mm + g.tx,
            g.sin * local.y_mm + g.cos * local.x_mm + g.ty,
        )
    }

    /// Maps a world point into a radar's local frame.
    ///
    /// Unknown radar ids map to the origin.
    #[must_use]
    pub fn to_local_mm(&self, radar: RadarId, world: PointMm) -> PointMm {
        let Some(g) = self.radars.get(radar.index()) else {
            return PointMm::default();
        };
        let xp = world.x_mm - g.tx;
        let yp = world.y_mm - g.ty;
        PointMm::new(-g.sin * xp + g.cos * yp, g.cos * xp + g.sin * yp)
    }

    /// Distance between `world` and its world to local to world round trip.
    /// Useful when auditing extrinsics.
    #[must_use]
    pub fn round_trip_error_mm(&self, radar: RadarId, world: PointMm) -> f64 {
        let back = self.to_world_mm(radar, self.to_local_mm(radar, world));
        back.distance(&world)
    }
}
