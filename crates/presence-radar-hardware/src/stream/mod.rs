//! Streaming LD2460 decoder.
//!
//! Wraps [`decode_tracking_frames`] with a persistent carry buffer so that a
//! serial port can be read in arbitrary chunks. Each [`push`] returns the
//! events produced by that chunk, in order: diagnostics first, then frames,
//! then an optional stats record.
//!
//! The carry is bounded by [`StreamDecoderConfig::max_buffer_bytes`]. When a
//! push would exceed it the decoder resyncs to the last header in the carry,
//! or drops the carry entirely when there is none.
//!
//! [`push`]: Ld2460StreamDecoder::push

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use presence_radar_core::{Clock, SystemClock};

use crate::error::DecodeError;
use crate::ld2460_parser::{
    decode_tracking_frames, DecodeOptions, FIXED_OVERHEAD_BYTES, PREAMBLE_BYTES, REPORT_HEADER,
};
use crate::tracking_frame::{TrackingFrame, ValidRule};

/// Configuration for [`Ld2460StreamDecoder`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StreamDecoderConfig {
    /// Target validity policy.
    pub valid_rule: ValidRule,
    /// Cap on frames decoded per push; the rest waits in the carry.
    pub max_frames_per_push: Option<usize>,
    /// Carry size bound. Default: **4096**.
    ///
    /// When the carry starts with a header, the bound yields to that
    /// packet's declared length, so the carry may hold up to 65535 bytes
    /// while the packet completes.
    pub max_buffer_bytes: usize,
    /// Dropped bytes per push at which a `DroppedNoise` diagnostic is
    /// emitted. Default: **32**.
    pub noise_log_threshold: usize,
    /// Emit a [`DecoderEvent::Stats`] after every decoding push.
    pub emit_stats: bool,
}

impl Default for StreamDecoderConfig {
    fn default() -> Self {
        Self {
            valid_rule: ValidRule::default(),
            max_frames_per_push: None,
            max_buffer_bytes: 4096,
            noise_log_threshold: 32,
            emit_stats: false,
        }
    }
}

/// Diagnostic classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    BadFooter,
    BadLength,
    BadFunc,
    DroppedNoise,
    BufferOverflowDropAll,
    BufferOverflowDropPrefix,
}

impl DiagnosticCode {
    /// Wire-style name, e.g. `BAD_FOOTER`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BadFooter => "BAD_FOOTER",
            Self::BadLength => "BAD_LENGTH",
            Self::BadFunc => "BAD_FUNC",
            Self::DroppedNoise => "DROPPED_NOISE",
            Self::BufferOverflowDropAll => "BUFFER_OVERFLOW_DROP_ALL",
            Self::BufferOverflowDropPrefix => "BUFFER_OVERFLOW_DROP_PREFIX",
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified, recoverable decoding problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecoderDiagnostic {
    pub code: DiagnosticCode,
    /// Bytes discarded, for noise and overflow diagnostics.
    pub dropped_bytes: Option<usize>,
    /// Occurrences in this push, for malformed-packet diagnostics.
    pub count: Option<usize>,
}

impl DecoderDiagnostic {
    fn dropped(code: DiagnosticCode, dropped_bytes: usize) -> Self {
        Self {
            code,
            dropped_bytes: Some(dropped_bytes),
            count: None,
        }
    }

    fn counted(code: DiagnosticCode, count: usize) -> Self {
        Self {
            code,
            dropped_bytes: None,
            count: Some(count),
        }
    }
}

/// Running totals since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecoderTotals {
    pub carry_bytes: usize,
    pub total_frames: u64,
    pub total_bad_footers: u64,
    pub total_bad_lengths: u64,
    pub total_bad_func: u64,
    pub total_dropped: u64,
}

/// Per-push statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecoderStatsEvent {
    pub ts: i64,
    pub decoded_frames: usize,
    pub found_headers: usize,
    pub bad_footers: usize,
    pub bad_lengths: usize,
    pub bad_func: usize,
    pub dropped_bytes: usize,
    pub carry_bytes: usize,
    pub totals: DecoderTotals,
}

/// Output of [`Ld2460StreamDecoder::push`].
#[derive(Debug, Clone, PartialEq)]
pub enum DecoderEvent {
    Frame(TrackingFrame),
    Diagnostic(DecoderDiagnostic),
    Stats(DecoderStatsEvent),
}

/// Chunked LD2460 decoder with bounded carry.
pub struct Ld2460StreamDecoder {
    config: StreamDecoderConfig,
    clock: Arc<dyn Clock>,
    carry: Vec<u8>,
    totals: DecoderTotals,
}

impl std::fmt::Debug for Ld2460StreamDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ld2460StreamDecoder")
            .field("config", &self.config)
            .field("carry_bytes", &self.carry.len())
            .field("totals", &self.totals)
            .finish()
    }
}

impl Ld2460StreamDecoder {
    /// Creates a decoder stamping frames with the system clock.
    ///
    /// # Errors
    ///
    /// See [`Ld2460StreamDecoder::with_clock`].
    pub fn new(config: StreamDecoderConfig) -> Result<Self, DecodeError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a decoder stamping frames with `clock`.
    ///
    /// # Errors
    ///
    /// [`DecodeError::BufferTooSmall`] if the carry bound cannot hold an
    /// empty packet, [`DecodeError::ZeroFrameLimit`] for a zero frame cap.
    pub fn with_clock(config: StreamDecoderConfig, clock: Arc<dyn Clock>) -> Result<Self, DecodeError> {
        if config.max_buffer_bytes < FIXED_OVERHEAD_BYTES {
            return Err(DecodeError::BufferTooSmall {
                max_buffer_bytes: config.max_buffer_bytes,
                min: FIXED_OVERHEAD_BYTES,
            });
        }
        if config.max_frames_per_push == Some(0) {
            return Err(DecodeError::ZeroFrameLimit);
        }
        Ok(Self {
            config,
            clock,
            carry: Vec::new(),
            totals: DecoderTotals::default(),
        })
    }

    /// Discards the carry. Totals are kept.
    pub fn reset(&mut self) {
        self.carry.clear();
    }

    /// Current totals and carry size.
    #[must_use]
    pub fn state(&self) -> DecoderTotals {
        DecoderTotals {
            carry_bytes: self.carry.len(),
            ..self.totals
        }
    }

    /// Feeds a chunk and returns the resulting events.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<DecoderEvent> {
        let mut events = Vec::new();
        self.carry.extend_from_slice(chunk);

        if self.carry.len() > self.config.max_buffer_bytes {
            match rfind_header(&self.carry) {
                None => {
                    let dropped = self.carry.len();
                    self.totals.total_dropped += dropped as u64;
                    self.carry.clear();
                    tracing::warn!(dropped_bytes = dropped, "ld2460 carry overflow, no header, dropping all");
                    events.push(DecoderEvent::Diagnostic(DecoderDiagnostic::dropped(
                        DiagnosticCode::BufferOverflowDropAll,
                        dropped,
                    )));
                    return events;
                }
                Some(0) => {}
                Some(last_header) => {
                    self.totals.total_dropped += last_header as u64;
                    self.carry.drain(..last_header);
                    tracing::warn!(dropped_bytes = last_header, "ld2460 carry overflow, resynced to last header");
                    events.push(DecoderEvent::Diagnostic(DecoderDiagnostic::dropped(
                        DiagnosticCode::BufferOverflowDropPrefix,
                        last_header,
                    )));
                }
            }
        }

        if self.carry.len() < PREAMBLE_BYTES {
            return events;
        }

        let opts = DecodeOptions {
            max_frames: self.config.max_frames_per_push,
            valid_rule: self.config.valid_rule,
            received_at_ms: self.clock.now_ms(),
        };
        let out = decode_tracking_frames(&self.carry, &opts);
        let stats = out.stats;
        let dropped = out.dropped_bytes;
        let frames = out.frames;
        let remainder_start = self.carry.len() - out.remainder.len();

        self.totals.total_dropped += dropped as u64;
        if dropped >= self.config.noise_log_threshold {
            tracing::debug!(dropped_bytes = dropped, "ld2460 dropped noise");
            events.push(DecoderEvent::Diagnostic(DecoderDiagnostic::dropped(
                DiagnosticCode::DroppedNoise,
                dropped,
            )));
        }
        for (count, code) in [
            (stats.bad_footers, DiagnosticCode::BadFooter),
            (stats.bad_lengths, DiagnosticCode::BadLength),
            (stats.bad_func, DiagnosticCode::BadFunc),
        ] {
            if count > 0 {
                tracing::debug!(code = %code, count, "ld2460 malformed packet skipped");
                events.push(DecoderEvent::Diagnostic(DecoderDiagnostic::counted(code, count)));
            }
        }
        self.totals.total_bad_footers += stats.bad_footers as u64;
        self.totals.total_bad_lengths += stats.bad_lengths as u64;
        self.totals.total_bad_func += stats.bad_func as u64;
        self.totals.total_frames += frames.len() as u64;

        events.extend(frames.into_iter().map(DecoderEvent::Frame));
        self.carry.drain(..remainder_start);

        if self.config.emit_stats {
            events.push(DecoderEvent::Stats(DecoderStatsEvent {
                ts: self.clock.now_ms(),
                decoded_frames: stats.decoded_frames,
                found_headers: stats.found_headers,
                bad_footers: stats.bad_footers,
                bad_lengths: stats.bad_lengths,
                bad_func: stats.bad_func,
                dropped_bytes: dropped,
                carry_bytes: self.carry.len(),
                totals: self.state(),
            }));
        }

        events
    }
}

fn rfind_header(buf: &[u8]) -> Option<usize> {
    buf.windows(REPORT_HEADER.len())
        .rposition(|w| w == REPORT_HEADER)
}
