//! One-shot settle driver.
//!
//! Reads a recorded detection sequence (JSON array) from a file or stdin,
//! issues a single settle request on one channel, and prints the feedback
//! stream and the terminal result as JSON. Exit code 0 iff the request
//! succeeded.

use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use log::LevelFilter;
use nalgebra::Point2;
use serde::Deserialize;

use calib_settle::core::init_with_level;
use calib_settle::{
    BusyPolicy, ChannelRegistry, Detection, GridGeometry, RequestStatus, ScriptedStream,
    SettleParams, SourceInfo,
};

#[derive(Parser, Debug)]
#[command(name = "calib-settle", about = "Settle a recorded checkerboard detection stream")]
struct Cli {
    /// JSON file with the detection sequence; `-` or omitted reads stdin.
    input: Option<PathBuf>,

    /// Inner corner rows of the checkerboard.
    #[arg(long, default_value_t = 6)]
    rows: u32,

    /// Inner corner columns of the checkerboard.
    #[arg(long, default_value_t = 8)]
    cols: u32,

    /// Corner spacing in meters.
    #[arg(long, default_value_t = 0.025)]
    spacing: f32,

    /// Camera/channel identifier.
    #[arg(long, default_value = "cam0")]
    channel: String,

    /// Required number of consecutive consistent detections.
    #[arg(long, default_value_t = 5)]
    min_count: usize,

    /// Maximum drift between any two frames of a consistent run, in pixels.
    #[arg(long, default_value_t = 1.0)]
    max_drift: f32,

    /// Settle deadline in milliseconds.
    #[arg(long, default_value_t = 10_000)]
    max_wait_ms: u64,

    /// Preempt an active request instead of rejecting the new one.
    #[arg(long)]
    preempt: bool,

    /// Verbose logging (repeat for more).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Hand-authorable frame record; `points` omitted or empty means the board
/// was not found in that frame.
#[derive(Debug, Deserialize)]
struct FrameRecord {
    stamp_ms: u64,
    #[serde(default)]
    frame_id: Option<String>,
    #[serde(default)]
    points: Vec<[f32; 2]>,
}

impl FrameRecord {
    fn into_detection(self, index: usize, camera: &str) -> Detection {
        Detection {
            stamp: Duration::from_millis(self.stamp_ms),
            frame_id: self.frame_id.unwrap_or_else(|| format!("f{index}")),
            points: self
                .points
                .into_iter()
                .map(|[x, y]| Point2::new(x, y))
                .collect(),
            source: SourceInfo::pixels(camera),
        }
    }
}

fn read_frames(input: Option<&PathBuf>) -> Result<Vec<FrameRecord>, String> {
    let data = match input {
        Some(path) if path.as_os_str() != "-" => {
            fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?
        }
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| format!("stdin: {e}"))?;
            buf
        }
    };
    serde_json::from_str(&data).map_err(|e| format!("bad detection sequence: {e}"))
}

fn run(cli: Cli) -> Result<RequestStatus, String> {
    let geometry =
        GridGeometry::new(cli.rows, cli.cols, cli.spacing).map_err(|e| e.to_string())?;
    let params = SettleParams {
        max_wait: Duration::from_millis(cli.max_wait_ms),
        min_consistent_count: cli.min_count,
        max_drift: cli.max_drift,
        ..SettleParams::default()
    };

    let frames = read_frames(cli.input.as_ref())?;
    let detections: Vec<Detection> = frames
        .into_iter()
        .enumerate()
        .map(|(i, record)| record.into_detection(i, &cli.channel))
        .collect();
    let mut stream = ScriptedStream::new(detections);

    let policy = if cli.preempt {
        BusyPolicy::Preempt
    } else {
        BusyPolicy::Reject
    };

    let mut registry = ChannelRegistry::new();
    let coordinator = registry
        .register(cli.channel.clone(), geometry, policy)
        .map_err(|e| e.to_string())?;

    let (status, feedback) =
        calib_settle::settle_once(coordinator, params, &mut stream).map_err(|e| e.to_string())?;

    for message in &feedback {
        let line = serde_json::to_string(message).map_err(|e| e.to_string())?;
        println!("{line}");
    }
    let line = serde_json::to_string(&status).map_err(|e| e.to_string())?;
    println!("{line}");
    Ok(status)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    let _ = init_with_level(level);

    match run(cli) {
        Ok(RequestStatus::Succeeded { .. }) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::from(2)
        }
    }
}
