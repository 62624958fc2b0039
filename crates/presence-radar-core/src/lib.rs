//! # Presence Radar Core
//!
//! Core types, configuration and geometry for fusing detections from several
//! short-range tracking radars mounted around a common tube.
//!
//! This crate provides the building blocks shared by the decoder and the
//! tracking pipeline:
//!
//! - **Data Types**: [`RawDetection`], [`Observation`], [`Provenance`] and
//!   [`RadarBufferEntry`].
//!
//! - **Configuration**: [`PresenceConfig`] and its sections, loadable from
//!   camelCase JSON via [`serde`].
//!
//! - **Geometry**: [`CoordinateTransform`] maps each radar's local frame into
//!   the shared world frame and back.
//!
//! - **Traits**: [`Clock`], [`RadarFrame`] and [`TargetTracker`] define the
//!   seams to time, decoded frames and the downstream tracker.
//!
//! ## Example
//!
//! ```rust
//! use presence_radar_core::{CoordinateTransform, PointMm, RadarId};
//!
//! let transform = CoordinateTransform::new(&[0.0, 120.0, 240.0], None, 50.0);
//! let world = transform.to_world_mm(RadarId::new(0), PointMm::new(0.0, 1000.0));
//! assert!((world.x_mm - 1050.0).abs() < 1e-9);
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod traits;
pub mod transform;
pub mod types;
pub mod utils;

pub use config::{
    ExtrinsicsConfig, FusionConfig, HealthConfig, LayoutConfig, PresenceConfig, QualityConfig,
    RadarLayoutEntry, SnapshotConfig, TrackingConfig, WaitForAllConfig,
};
pub use error::{ConfigError, CoreError, CoreResult};
pub use traits::{Clock, ManualClock, RadarFrame, SystemClock, TargetTracker};
pub use transform::CoordinateTransform;
pub use types::{
    Observation, PointMm, Provenance, RadarBufferEntry, RadarId, RawDetection, TransformParams,
};
