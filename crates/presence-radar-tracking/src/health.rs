//! Ingest sanity counters and per-tick health summaries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use presence_radar_core::utils::percentile_from_sorted;
use presence_radar_core::{HealthConfig, Observation, RadarId};

use crate::snapshot::SnapshotMeta;

// ---------------------------------------------------------------------------
// Sanity counters
// ---------------------------------------------------------------------------

/// Kinds of ingest anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SanityKind {
    /// Frame timestamp older than the radar's latest; clamped forward.
    MeasWentBackwards,
    /// Receipt earlier than the measurement.
    NegativeRecvLag,
    /// Receipt lag above `recv_lag_huge_ms`.
    RecvLagHuge,
    /// More slots than `slot_count_max`.
    SlotCountTooHigh,
    /// More valid detections than declared slots.
    DetectionsGtSlots,
    /// Detection with a non-finite world position; dropped.
    NonFiniteWorld,
}

impl SanityKind {
    pub const ALL: [Self; 6] = [
        Self::MeasWentBackwards,
        Self::NegativeRecvLag,
        Self::RecvLagHuge,
        Self::SlotCountTooHigh,
        Self::DetectionsGtSlots,
        Self::NonFiniteWorld,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MeasWentBackwards => "measWentBackwards",
            Self::NegativeRecvLag => "negativeRecvLag",
            Self::RecvLagHuge => "recvLagHuge",
            Self::SlotCountTooHigh => "slotCountTooHigh",
            Self::DetectionsGtSlots => "detectionsGtSlots",
            Self::NonFiniteWorld => "nonFiniteWorld",
        }
    }

    /// Health issue raised when the counter is non-zero.
    #[must_use]
    pub fn issue(self) -> (IssueCode, IssueSeverity) {
        match self {
            Self::MeasWentBackwards => (IssueCode::MeasTsWentBackwards, IssueSeverity::Error),
            Self::NegativeRecvLag => (IssueCode::NegativeRecvLag, IssueSeverity::Error),
            Self::RecvLagHuge => (IssueCode::RecvLagHuge, IssueSeverity::Warning),
            Self::SlotCountTooHigh => (IssueCode::SlotcountTooHigh, IssueSeverity::Warning),
            Self::DetectionsGtSlots => (IssueCode::DetectionsGtSlots, IssueSeverity::Error),
            Self::NonFiniteWorld => (IssueCode::NonfiniteWorldXy, IssueSeverity::Error),
        }
    }
}

impl std::fmt::Display for SanityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last occurrence of one anomaly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SanityEvent {
    pub ts: i64,
    pub radar_id: RadarId,
    pub detail: String,
}

/// Anomaly counts since the last health summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SanityCounters {
    pub counts: BTreeMap<SanityKind, u64>,
    pub last: BTreeMap<SanityKind, SanityEvent>,
}

impl SanityCounters {
    /// Counts one anomaly and remembers it as the latest of its kind.
    pub fn note(&mut self, kind: SanityKind, event: SanityEvent) {
        tracing::warn!(
            kind = %kind,
            radar_id = %event.radar_id,
            ts = event.ts,
            detail = %event.detail,
            "ingest sanity violation"
        );
        *self.counts.entry(kind).or_insert(0) += 1;
        self.last.insert(kind, event);
    }

    #[must_use]
    pub fn count(&self, kind: SanityKind) -> u64 {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.total() == 0
    }
}

// ---------------------------------------------------------------------------
// Tick lag
// ---------------------------------------------------------------------------

/// Age of fused observations at tick time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickLagStats {
    pub samples: usize,
    pub max_ms: f64,
    pub p95_ms: f64,
}

impl TickLagStats {
    /// `now - meas_ts` over observations with a positive timestamp.
    #[must_use]
    pub fn from_observations(now: i64, observations: &[Observation]) -> Self {
        let mut lags: Vec<f64> = observations
            .iter()
            .filter(|o| o.meas_ts > 0)
            .map(|o| (now - o.meas_ts).max(0) as f64)
            .collect();
        if lags.is_empty() {
            return Self::default();
        }
        lags.sort_by(f64::total_cmp);
        Self {
            samples: lags.len(),
            max_ms: lags[lags.len() - 1],
            p95_ms: percentile_from_sorted(&lags, 0.95).unwrap_or(0.0),
        }
    }
}

// ---------------------------------------------------------------------------
// Health summary
// ---------------------------------------------------------------------------

/// Machine-readable issue code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    NegativeRecvLag,
    MeasTsWentBackwards,
    DetectionsGtSlots,
    NonfiniteWorldXy,
    RecvLagHuge,
    SlotcountTooHigh,
    NoAdvanceWhileFresh,
    TickLagHigh,
    PartialSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IssueSeverity {
    Error,
    Warning,
    Degraded,
}

/// One reported health issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthIssue {
    pub code: IssueCode,
    pub severity: IssueSeverity,
    /// Occurrences, for counter-backed issues.
    pub count: Option<u64>,
    pub detail: String,
}

/// Health of one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSummary {
    pub ts: i64,
    pub seq: u64,
    pub radars_expected: usize,
    pub radars_fresh: usize,
    pub radars_stale: usize,
    pub radars_missing: usize,
    /// Some expected radars are not fresh.
    pub degraded: bool,
    pub stuck: bool,
    pub stuck_ticks: u32,
    pub tick_lag: TickLagStats,
    pub sanity: SanityCounters,
    pub issues: Vec<HealthIssue>,
}

impl HealthSummary {
    #[must_use]
    pub fn has_issue(&self, code: IssueCode) -> bool {
        self.issues.iter().any(|i| i.code == code)
    }
}

/// Collects sanity counters between ticks and turns them into summaries.
#[derive(Debug)]
pub struct HealthMonitor {
    config: HealthConfig,
    tick_interval_ms: i64,
    counters: SanityCounters,
    seq: u64,
    was_degraded: bool,
}

impl HealthMonitor {
    #[must_use]
    pub fn new(config: HealthConfig, tick_interval_ms: i64) -> Self {
        Self {
            config,
            tick_interval_ms,
            counters: SanityCounters::default(),
            seq: 0,
            was_degraded: false,
        }
    }

    /// Counters accumulated since the last summary.
    pub fn sanity(&self) -> &SanityCounters {
        &self.counters
    }

    pub fn sanity_mut(&mut self) -> &mut SanityCounters {
        &mut self.counters
    }

    /// Clears counters, the summary sequence and the degraded latch.
    pub fn reset(&mut self) {
        self.counters = SanityCounters::default();
        self.seq = 0;
        self.was_degraded = false;
    }

    /// Builds the summary for one tick and resets the sanity counters.
    pub fn summarize(&mut self, now: i64, meta: &SnapshotMeta, tick_lag: TickLagStats) -> HealthSummary {
        self.seq += 1;
        let sanity = std::mem::take(&mut self.counters);

        let expected = meta.radars_expected;
        let fresh = meta.radars_fresh;
        let degraded = expected > 0 && fresh < expected;
        if degraded != self.was_degraded {
            if degraded {
                tracing::warn!(fresh, expected, "partial snapshot");
            } else {
                tracing::info!(expected, "all expected radars fresh");
            }
            self.was_degraded = degraded;
        }

        let mut issues = Vec::new();
        for kind in SanityKind::ALL {
            let count = sanity.count(kind);
            if count == 0 {
                continue;
            }
            let (code, severity) = kind.issue();
            issues.push(HealthIssue {
                code,
                severity,
                count: Some(count),
                detail: sanity.last.get(&kind).map(|e| e.detail.clone()).unwrap_or_default(),
            });
        }

        if fresh > 0 && expected > 0 && meta.radars_advanced_count == 0 {
            issues.push(HealthIssue {
                code: IssueCode::NoAdvanceWhileFresh,
                severity: IssueSeverity::Warning,
                count: None,
                detail: format!("fresh={fresh} expected={expected}"),
            });
        }

        let lag_warn_ms = if self.tick_interval_ms > 0 && self.config.tick_lag_warn_mult > 0.0 {
            self.config.tick_lag_warn_mult * self.tick_interval_ms as f64
        } else {
            0.0
        };
        if lag_warn_ms > 0.0 && tick_lag.p95_ms > lag_warn_ms {
            issues.push(HealthIssue {
                code: IssueCode::TickLagHigh,
                severity: IssueSeverity::Warning,
                count: None,
                detail: format!("p95={}ms warn={lag_warn_ms}ms", tick_lag.p95_ms),
            });
        }

        if degraded {
            issues.push(HealthIssue {
                code: IssueCode::PartialSnapshot,
                severity: IssueSeverity::Degraded,
                count: None,
                detail: format!("fresh={fresh} expected={expected}"),
            });
        }

        HealthSummary {
            ts: now,
            seq: self.seq,
            radars_expected: expected,
            radars_fresh: fresh,
            radars_stale: meta.radars_stale,
            radars_missing: meta.radars_missing,
            degraded,
            stuck: meta.stuck,
            stuck_ticks: meta.stuck_ticks,
            tick_lag,
            sanity,
            issues,
        }
    }
}
