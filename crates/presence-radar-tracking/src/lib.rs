//! Multi-radar snapshot alignment, observation quality and fusion.
//!
//! Per radar, decoded frames are turned into world-frame observations and
//! buffered. Once per tick the pipeline:
//!
//! 1. picks one as-of frame per expected radar ([`snapshot`]),
//! 2. drops edge detections, deduplicates slots and assigns each
//!    observation a measurement variance ([`quality`]),
//! 3. merges observations of the same target within and across radars
//!    ([`fusion`]),
//! 4. summarises radar freshness and ingest anomalies ([`health`]).
//!
//! [`TrackingPipeline`] wires these stages together.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use presence_radar_core::{ManualClock, PresenceConfig, RadarLayoutEntry};
//! use presence_radar_tracking::TrackingPipeline;
//!
//! let mut cfg = PresenceConfig::default();
//! cfg.layout.radar_azimuth_deg = vec![0.0, 180.0];
//! cfg.layout.radars = vec![
//!     RadarLayoutEntry { publish_as: "north".into(), ..Default::default() },
//!     RadarLayoutEntry { publish_as: "south".into(), ..Default::default() },
//! ];
//! let pipeline = TrackingPipeline::new(cfg, Arc::new(ManualClock::new(1_000))).unwrap();
//! let out = pipeline.tick();
//! assert_eq!(out.snapshot_meta.snapshot_key, "0:na|1:na");
//! assert!(out.health.degraded);
//! ```

#![forbid(unsafe_code)]

pub mod fusion;
pub mod health;
pub mod ingest;
pub mod pipeline;
pub mod quality;
pub mod snapshot;

pub use fusion::{ClusterDebug, ClusterMember, FusionClusterer, FusionDebug, FusionOutput};
pub use health::{
    HealthIssue, HealthMonitor, HealthSummary, IssueCode, IssueSeverity, SanityCounters,
    SanityEvent, SanityKind, TickLagStats,
};
pub use ingest::{IgnoreReason, IngestOutcome, RadarIngest};
pub use pipeline::{MeasCounts, TickOutput, TrackingPipeline};
pub use quality::{ObservationQualityStage, QualityOutput};
pub use snapshot::{
    RadarDebugRow, RadarHealth, RadarSnapshotBuffer, RadarStatus, Snapshot, SnapshotMeta,
};
