//! Command-line front end: opens the microphone, runs a detection session
//! for a fixed duration, and prints one line per analyzed frame.

use std::io::Write;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use log::info;

use fretsense_core::{
    Chord, ConfigPatch, DetectionConfig, DetectionResult, DetectionSession, Severity,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Instrument {
    Guitar,
    Bass,
}

/// Real-time chord detection from the default microphone.
#[derive(Debug, Parser)]
#[command(name = "fretsense", version, about)]
struct Args {
    /// Instrument profile to analyze against.
    #[arg(long, value_enum, default_value_t = Instrument::Guitar)]
    instrument: Instrument,

    /// Chord the player intends to practice, e.g. "Em", "C", "F#m".
    /// Without it, detection is purely blind.
    #[arg(long)]
    chord: Option<String>,

    /// How long to listen, in seconds.
    #[arg(long, default_value_t = 10)]
    duration_secs: u64,

    /// Detection sensitivity, 0..1.
    #[arg(long)]
    sensitivity: Option<f32>,

    /// Minimum RMS amplitude before a string counts as struck.
    #[arg(long)]
    min_amplitude: Option<f32>,

    /// Player skill level, 1 (beginner) to 10.
    #[arg(long)]
    level: Option<u8>,

    /// Emit one JSON object per frame instead of the human-readable line.
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let expected: Option<Chord> = args
        .chord
        .as_deref()
        .map(|label| label.parse().with_context(|| format!("bad chord label {label:?}")))
        .transpose()?;

    let mut config = DetectionConfig::default();
    if args.instrument == Instrument::Bass {
        config.instrument = fretsense_core::tuning::InstrumentProfile::bass();
    }

    let mut session = DetectionSession::new(config);
    session
        .initialize()
        .context("could not open the default audio input")?;

    // Per-run overrides merge like any other config patch.
    session.update_config(&ConfigPatch {
        sensitivity: args.sensitivity,
        min_amplitude: args.min_amplitude,
        user_level: args.level,
        ..Default::default()
    })?;

    info!(
        "listening for {}s on the {:?} profile{}",
        args.duration_secs,
        args.instrument,
        expected.map(|c| format!(", expecting {c}")).unwrap_or_default()
    );

    let json = args.json;
    session.start_detection(expected, move |result| {
        let mut stdout = std::io::stdout().lock();
        let _ = if json {
            writeln!(
                stdout,
                "{}",
                serde_json::to_string(&result).unwrap_or_else(|e| format!("{{\"error\":{:?}}}", e.to_string()))
            )
        } else {
            writeln!(stdout, "{}", render_line(&result))
        };
    })?;

    std::thread::sleep(Duration::from_secs(args.duration_secs));

    let stats = session.performance_stats();
    session.stop_detection();
    if let Some(fault) = session.last_fault() {
        anyhow::bail!("audio input failed while listening: {fault}");
    }

    eprintln!(
        "done: ~{:.1} frames/s, latency target {} ms",
        stats.detection_rate_hz, stats.latency_ms
    );
    Ok(())
}

fn render_line(result: &DetectionResult) -> String {
    let chord = match &result.detected_chord {
        Some(c) => format!("{c} ({:.0}%)", result.confidence * 100.0),
        None => "(none)".to_string(),
    };
    let worst = result
        .problems
        .first()
        .map(|p| {
            let tag = match p.severity {
                Severity::High => "!!",
                Severity::Medium => "!",
                Severity::Low => "·",
            };
            format!("  [{tag} {}]", p.description)
        })
        .unwrap_or_default();
    format!(
        "{:>6}  chord {:<10} quality {:.2}{worst}",
        result.timestamp_ms % 1_000_000,
        chord,
        result.quality.overall,
    )
}
