//! LD2460 tracking radar decoding.
//!
//! This crate turns the raw byte stream of an LD2460 tracking radar into
//! [`TrackingFrame`]s:
//!
//! - [`decode_tracking_frames`]: one-shot decode of a byte buffer, returning
//!   frames, the undecided remainder and drop counters
//! - [`Ld2460StreamDecoder`]: chunked decoding with a bounded carry buffer,
//!   returning frames and classified diagnostics per push
//! - [`encode_tracking_frame`]: the inverse, for fixtures and replay
//!
//! # Design Principles
//!
//! 1. **Never fail on bytes**: malformed packets are counted and skipped
//! 2. **Never lose a partial packet**: an incomplete tail is returned intact
//! 3. **No I/O**: parsing works on byte slices; transports live elsewhere
//!
//! # Example
//!
//! ```rust
//! use presence_radar_hardware::{decode_tracking_frames, encode_tracking_frame, DecodeOptions};
//!
//! let bytes = encode_tracking_frame(&[(5, 12)]).unwrap();
//! let out = decode_tracking_frames(&bytes, &DecodeOptions::default());
//! assert_eq!(out.frames.len(), 1);
//! assert_eq!(out.frames[0].targets[0].y_mm, 1200);
//! ```

#![forbid(unsafe_code)]

mod error;
mod ld2460_parser;
pub mod stream;
mod tracking_frame;

pub use error::DecodeError;
pub use ld2460_parser::{
    decode_tracking_frames, encode_tracking_frame, DecodeOptions, DecodeOutcome, DecodeStats,
    FIXED_OVERHEAD_BYTES, FUNC_CODE_TRACKING, MAX_TARGETS, POS_UNIT_MM, REPORT_HEADER, REPORT_TAIL,
    TARGET_STRIDE,
};
pub use stream::{
    DecoderDiagnostic, DecoderEvent, DecoderStatsEvent, DecoderTotals, DiagnosticCode,
    Ld2460StreamDecoder, StreamDecoderConfig,
};
pub use tracking_frame::{TrackingFrame, ValidRule};
