use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use pulse_lib::{
    config::{read_config, SessionConfig},
    io::{hrm::decode_heart_rate_measurement, text as text_io},
    metrics::hrv::{rmssd_summary, OUTLIER_RATIO},
    session::{HrmSession, SessionEvent},
    signal::RRSeries,
};
use std::{
    io::{self, Read},
    path::{Path, PathBuf},
};

#[derive(Parser)]
#[command(
    name = "pulse",
    version,
    about = "Pulse: BLE heart rate measurement decoding and streaming rMSSD"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode Heart Rate Measurement payloads (hex, one per line) into JSON frames
    Decode {
        /// Single payload, e.g. "10 48 00 04"
        #[arg(long)]
        hex: Option<String>,
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Replay a notification capture through a session and print rMSSD ticks
    Replay {
        #[arg(long)]
        input: Option<PathBuf>,
        /// TOML session config (measure_time_s, trigger_threshold_s, outlier_ratio)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Filtered rMSSD over newline-delimited RR intervals (seconds)
    Rmssd {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long, default_value_t = OUTLIER_RATIO)]
        outlier_ratio: f64,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Decode { hex, input } => cmd_decode(hex.as_deref(), input.as_deref())?,
        Commands::Replay { input, config } => cmd_replay(input.as_deref(), config.as_deref())?,
        Commands::Rmssd {
            input,
            outlier_ratio,
        } => cmd_rmssd(input.as_deref(), outlier_ratio)?,
    }
    Ok(())
}

fn read_stdin() -> Result<String> {
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

fn read_payloads(input: Option<&Path>) -> Result<Vec<Vec<u8>>> {
    match input {
        Some(path) => text_io::read_capture(path),
        None => text_io::parse_capture(&read_stdin()?),
    }
}

fn read_samples(input: Option<&Path>) -> Result<Vec<f64>> {
    match input {
        Some(path) => text_io::read_f64_series(path),
        None => text_io::parse_f64_series(&read_stdin()?),
    }
}

fn cmd_decode(hex: Option<&str>, input: Option<&Path>) -> Result<()> {
    let payloads = match hex {
        Some(hex) => vec![text_io::parse_hex_payload(hex)?],
        None => read_payloads(input)?,
    };
    let mut failed = 0;
    for (idx, payload) in payloads.iter().enumerate() {
        match decode_heart_rate_measurement(payload) {
            Ok(frame) => println!("{}", serde_json::to_string(&frame)?),
            Err(e) => {
                log::error!("payload {}: {}", idx + 1, e);
                failed += 1;
            }
        }
    }
    if !payloads.is_empty() && failed == payloads.len() {
        bail!("none of the {} payload(s) could be decoded", payloads.len());
    }
    Ok(())
}

fn cmd_replay(input: Option<&Path>, config: Option<&Path>) -> Result<()> {
    let config = match config {
        Some(path) => read_config(path)?,
        None => SessionConfig::default(),
    };
    let payloads = read_payloads(input)?;
    let mut session = HrmSession::with_config(config)?;
    let mut ticks = Vec::new();
    let mut sink = |value_ms: f64| ticks.push(SessionEvent::RmssdTick { value_ms });
    for payload in &payloads {
        session.handle(payload, &mut sink);
    }
    for tick in &ticks {
        println!("{}", serde_json::to_string(tick)?);
    }
    log::info!(
        "replayed {} notification(s), {} rMSSD tick(s), window {:.1} s",
        payloads.len(),
        ticks.len(),
        session.window().total_s()
    );
    Ok(())
}

fn cmd_rmssd(input: Option<&Path>, outlier_ratio: f64) -> Result<()> {
    SessionConfig {
        outlier_ratio,
        ..SessionConfig::default()
    }
    .validate()?;
    let rr = RRSeries {
        rr: read_samples(input)?,
    };
    let summary = rmssd_summary(&rr, outlier_ratio);
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}
