//! LD2460 tracking report parser.
//!
//! Decodes the binary tracking reports an LD2460 radar streams over UART.
//!
//! # Wire Format
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0       4     Header magic F4 F3 F2 F1
//! 4       1     Function code (0x04 = tracking)
//! 5       2     Packet length, little-endian, header and tail included
//! 7       4*N   Targets: i16 LE X, i16 LE Y, units of 0.1 m
//! 7+4N    4     Tail magic F8 F7 F6 F5
//! ```
//!
//! The packet length must be at least 11 and `(len - 11) % 4 == 0`.
//!
//! # Resync
//!
//! The parser scans for the header magic. A header with the wrong function
//! code, an impossible length or a bad tail is skipped by one byte and the
//! scan resumes. A header whose packet is not yet complete stops the scan and
//! is handed back as the remainder, untouched, to be completed by the next
//! read. Malformed input never produces an error; it is counted in
//! [`DecodeStats`].

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use presence_radar_core::RawDetection;

use crate::error::DecodeError;
use crate::tracking_frame::{TrackingFrame, ValidRule};

/// Report header magic.
pub const REPORT_HEADER: [u8; 4] = [0xF4, 0xF3, 0xF2, 0xF1];

/// Report tail magic.
pub const REPORT_TAIL: [u8; 4] = [0xF8, 0xF7, 0xF6, 0xF5];

/// Function code of tracking reports.
pub const FUNC_CODE_TRACKING: u8 = 0x04;

/// Header (4) + function (1) + length (2) + tail (4).
pub const FIXED_OVERHEAD_BYTES: usize = 11;

/// Bytes per target record.
pub const TARGET_STRIDE: usize = 4;

/// Bytes needed before the packet length is known.
pub const PREAMBLE_BYTES: usize = 7;

/// One wire unit (0.1 m) in millimetres.
pub const POS_UNIT_MM: i32 = 100;

/// Most targets a single packet can carry.
pub const MAX_TARGETS: usize = (u16::MAX as usize - FIXED_OVERHEAD_BYTES) / TARGET_STRIDE;

/// Options for [`decode_tracking_frames`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Stop after this many frames; the rest is returned as remainder.
    pub max_frames: Option<usize>,
    /// Target validity policy.
    pub valid_rule: ValidRule,
    /// Timestamp stamped on every decoded frame.
    pub received_at_ms: i64,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            max_frames: None,
            valid_rule: ValidRule::default(),
            received_at_ms: 0,
        }
    }
}

/// Counters for one decode call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodeStats {
    pub scanned_bytes: usize,
    pub found_headers: usize,
    pub decoded_frames: usize,
    pub bad_footers: usize,
    pub bad_lengths: usize,
    pub bad_func: usize,
}

/// Result of one decode call.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeOutcome<'a> {
    /// Frames in stream order.
    pub frames: Vec<TrackingFrame>,
    /// Undecided tail to prepend to the next read.
    pub remainder: &'a [u8],
    /// Bytes consumed that belong to no frame and are not in `remainder`.
    pub dropped_bytes: usize,
    pub stats: DecodeStats,
}

enum Packet {
    /// More bytes are needed to decide.
    Incomplete,
    BadFunc,
    BadLength,
    BadFooter,
    /// A complete packet of `len` bytes.
    Tracking { len: usize },
}

/// Decodes every complete tracking report in `buf`.
///
/// `frames.len()` plus the bytes of all decoded packets, `dropped_bytes` and
/// `remainder.len()` account for every byte of `buf`.
#[must_use]
pub fn decode_tracking_frames<'a>(buf: &'a [u8], opts: &DecodeOptions) -> DecodeOutcome<'a> {
    let max_frames = opts.max_frames.unwrap_or(usize::MAX);
    let mut frames = Vec::new();
    let mut stats = DecodeStats {
        scanned_bytes: buf.len(),
        ..DecodeStats::default()
    };
    let mut dropped_bytes = 0usize;
    let mut i = 0usize;

    let remainder = loop {
        if frames.len() >= max_frames {
            break &buf[i..];
        }

        let Some(header_idx) = find_header(buf, i) else {
            let tail = &buf[i..];
            let keep = header_prefix_suffix_len(tail);
            dropped_bytes += tail.len() - keep;
            break &buf[buf.len() - keep..];
        };

        stats.found_headers += 1;
        dropped_bytes += header_idx - i;

        match inspect_packet(&buf[header_idx..]) {
            Packet::Incomplete => break &buf[header_idx..],
            Packet::BadFunc => {
                stats.bad_func += 1;
                dropped_bytes += 1;
                i = header_idx + 1;
            }
            Packet::BadLength => {
                stats.bad_lengths += 1;
                dropped_bytes += 1;
                i = header_idx + 1;
            }
            Packet::BadFooter => {
                stats.bad_footers += 1;
                dropped_bytes += 1;
                i = header_idx + 1;
            }
            Packet::Tracking { len } => {
                let packet = &buf[header_idx..header_idx + len];
                frames.push(decode_targets(packet, opts));
                stats.decoded_frames += 1;
                i = header_idx + len;
            }
        }
    };

    DecodeOutcome {
        frames,
        remainder,
        dropped_bytes,
        stats,
    }
}

/// Encodes one tracking report from raw wire coordinates (0.1 m units).
///
/// # Errors
///
/// [`DecodeError::TooManyTargets`] if the packet length would overflow.
pub fn encode_tracking_frame(targets: &[(i16, i16)]) -> Result<Vec<u8>, DecodeError> {
    if targets.len() > MAX_TARGETS {
        return Err(DecodeError::TooManyTargets {
            count: targets.len(),
            max: MAX_TARGETS,
        });
    }
    let len = FIXED_OVERHEAD_BYTES + targets.len() * TARGET_STRIDE;
    let mut out = Vec::with_capacity(len);
    out.extend_from_slice(&REPORT_HEADER);
    out.push(FUNC_CODE_TRACKING);
    out.extend_from_slice(&u16::try_from(len).unwrap_or(u16::MAX).to_le_bytes());
    for &(x, y) in targets {
        out.extend_from_slice(&x.to_le_bytes());
        out.extend_from_slice(&y.to_le_bytes());
    }
    out.extend_from_slice(&REPORT_TAIL);
    Ok(out)
}

fn find_header(buf: &[u8], from: usize) -> Option<usize> {
    if from >= buf.len() {
        return None;
    }
    buf[from..]
        .windows(REPORT_HEADER.len())
        .position(|w| w == REPORT_HEADER)
        .map(|p| from + p)
}

/// Longest suffix of `tail` that could still grow into a header.
fn header_prefix_suffix_len(tail: &[u8]) -> usize {
    let max = tail.len().min(REPORT_HEADER.len() - 1);
    (1..=max)
        .rev()
        .find(|&k| tail[tail.len() - k..] == REPORT_HEADER[..k])
        .unwrap_or(0)
}

/// Classifies the packet starting at `pkt[0]`, which holds a header.
fn inspect_packet(pkt: &[u8]) -> Packet {
    if pkt.len() < PREAMBLE_BYTES {
        return Packet::Incomplete;
    }
    if pkt[4] != FUNC_CODE_TRACKING {
        return Packet::BadFunc;
    }
    let len = usize::from(LittleEndian::read_u16(&pkt[5..7]));
    if len < FIXED_OVERHEAD_BYTES || (len - FIXED_OVERHEAD_BYTES) % TARGET_STRIDE != 0 {
        return Packet::BadLength;
    }
    if pkt.len() < len {
        return Packet::Incomplete;
    }
    if pkt[len - REPORT_TAIL.len()..len] != REPORT_TAIL {
        return Packet::BadFooter;
    }
    Packet::Tracking { len }
}

fn decode_targets(packet: &[u8], opts: &DecodeOptions) -> TrackingFrame {
    let body = &packet[PREAMBLE_BYTES..packet.len() - REPORT_TAIL.len()];
    let targets = body
        .chunks_exact(TARGET_STRIDE)
        .enumerate()
        .map(|(idx, rec)| {
            let x_mm = i32::from(LittleEndian::read_i16(&rec[0..2])) * POS_UNIT_MM;
            let y_mm = i32::from(LittleEndian::read_i16(&rec[2..4])) * POS_UNIT_MM;
            // The report only carries X/Y.
            let resolution_mm = 0;
            RawDetection {
                slot_id: u8::try_from(idx + 1).unwrap_or(u8::MAX),
                x_mm,
                y_mm,
                resolution_mm,
                speed_cms: 0,
                valid: opts.valid_rule.is_valid(resolution_mm, x_mm, y_mm),
            }
        })
        .collect();
    TrackingFrame::new(opts.received_at_ms, targets)
}
