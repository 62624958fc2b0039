//! Dump LD2460 tracking reports from a raw capture.
//!
//! Reads a capture file (or stdin) in fixed-size chunks through the stream
//! decoder and prints one line per frame and per diagnostic.
//!
//! Usage:
//!   cargo run -p presence-radar-hardware --bin ld2460-dump -- capture.bin --chunk 64

use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use presence_radar_core::RadarFrame;
use presence_radar_hardware::{DecoderEvent, Ld2460StreamDecoder, StreamDecoderConfig, ValidRule};

/// Decode an LD2460 byte capture.
#[derive(Parser)]
#[command(name = "ld2460-dump", about = "Print frames and diagnostics from an LD2460 capture")]
struct Cli {
    /// Capture file; stdin when omitted.
    input: Option<PathBuf>,

    /// Read size per push, in bytes.
    #[arg(long, default_value_t = 256)]
    chunk: usize,

    /// Target validity rule: resolution, nonzeroXY or either.
    #[arg(long, default_value = "nonzeroXY")]
    valid_rule: ValidRule,

    /// Carry buffer bound.
    #[arg(long, default_value_t = 4096)]
    max_buffer: usize,

    /// Also print per-push stats.
    #[arg(long, short)]
    verbose: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let mut reader: Box<dyn Read> = match &cli.input {
        Some(path) => Box::new(
            File::open(path).with_context(|| format!("cannot open capture {}", path.display()))?,
        ),
        None => Box::new(io::stdin()),
    };

    let mut decoder = Ld2460StreamDecoder::new(StreamDecoderConfig {
        valid_rule: cli.valid_rule,
        max_buffer_bytes: cli.max_buffer,
        emit_stats: cli.verbose,
        ..StreamDecoderConfig::default()
    })?;

    let mut buf = vec![0u8; cli.chunk.max(1)];
    loop {
        let n = reader.read(&mut buf).context("read failed")?;
        if n == 0 {
            break;
        }
        for event in decoder.push(&buf[..n]) {
            print_event(&event);
        }
    }

    let totals = decoder.state();
    tracing::info!(
        frames = totals.total_frames,
        dropped = totals.total_dropped,
        bad_footers = totals.total_bad_footers,
        bad_lengths = totals.total_bad_lengths,
        bad_func = totals.total_bad_func,
        carry = totals.carry_bytes,
        "capture done"
    );
    Ok(())
}

fn print_event(event: &DecoderEvent) {
    match event {
        DecoderEvent::Frame(frame) => {
            let targets: Vec<String> = frame
                .valid_targets()
                .map(|t| format!("#{}({},{})", t.slot_id, t.x_mm, t.y_mm))
                .collect();
            println!(
                "[frame ts:{}] slots={} present={} {}",
                frame.timestamp_ms,
                frame.slot_count(),
                frame.present,
                targets.join(" "),
            );
        }
        DecoderEvent::Diagnostic(d) => {
            println!(
                "[diag {}] dropped={} count={}",
                d.code,
                d.dropped_bytes.map_or_else(|| "-".to_string(), |v| v.to_string()),
                d.count.map_or_else(|| "-".to_string(), |v| v.to_string()),
            );
        }
        DecoderEvent::Stats(s) => {
            println!(
                "[stats] headers={} frames={} dropped={} carry={}",
                s.found_headers, s.decoded_frames, s.dropped_bytes, s.carry_bytes
            );
        }
    }
}
