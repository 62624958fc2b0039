//! Error types for the LD2460 decoder.
//!
//! Malformed wire bytes are never reported through these types. Bad footers,
//! lengths and function codes are counted in [`DecodeStats`] and surfaced as
//! [`DecoderEvent::Diagnostic`], then skipped.
//!
//! [`DecodeStats`]: crate::DecodeStats
//! [`DecoderEvent::Diagnostic`]: crate::DecoderEvent::Diagnostic

use thiserror::Error;

/// Errors raised when a decoder is constructed with unusable options.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The carry buffer could never hold a complete packet.
    #[error("Invalid max buffer size: {max_buffer_bytes} bytes (minimum {min})")]
    BufferTooSmall {
        max_buffer_bytes: usize,
        min: usize,
    },

    /// A frame limit of zero would never make progress.
    #[error("Invalid frame limit: must be > 0")]
    ZeroFrameLimit,

    /// Too many targets to fit the 16-bit packet length field.
    #[error("Too many targets for one packet: {count} (max {max})")]
    TooManyTargets {
        count: usize,
        max: usize,
    },
}
