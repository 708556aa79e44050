use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::time::Duration;
use vigil_core::{parse_record, Analyzer, DetectionConfig};
use vigil_hw::camera::Camera;
use vigil_hw::{CaptureDevice, ConsoleBeeper, Tone, ToneSink, V4lBackend};

/// Frames discarded before `snap` keeps one, while auto-exposure settles.
const WARMUP_FRAMES: usize = 5;

#[derive(Parser)]
#[command(name = "vigil", about = "Vigil surveillance diagnostics CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List V4L2 capture devices
    Devices,
    /// Find the next camera index that opens
    Probe {
        /// Index to start after
        #[arg(short, long, default_value_t = 0)]
        start: u32,
        /// Probe indices 0..range
        #[arg(short, long, default_value_t = 5)]
        range: u32,
    },
    /// Capture one frame and save it as PNG
    Snap {
        /// Camera index (/dev/videoN)
        index: u32,
        /// Output image path
        output: PathBuf,
    },
    /// Classify a stream of landmark records (one JSON array per line)
    Classify {
        /// Landmark file, or `-` for stdin
        input: String,
        /// Print each result as JSON
        #[arg(long)]
        json: bool,
        /// Head movement threshold (normalized units)
        #[arg(long)]
        movement_threshold: Option<f32>,
        /// Eye openness threshold (normalized units)
        #[arg(long)]
        eye_open_threshold: Option<f32>,
    },
    /// Play a test tone on the console speaker
    Beep {
        #[arg(short, long, default_value_t = 800)]
        freq: u32,
        #[arg(short, long, default_value_t = 200)]
        ms: u64,
        #[arg(short, long, default_value = vigil_hw::beeper::DEFAULT_BEEP_DEVICE)]
        device: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for dev in devices {
                println!("{}  {}  [{}] {}", dev.index, dev.path, dev.driver, dev.name);
                println!("    bus: {}", dev.bus);
            }
        }
        Commands::Probe { start, range } => {
            let index = vigil_hw::probe(&V4lBackend, start, range)?;
            println!("Next available camera: {index} (/dev/video{index})");
        }
        Commands::Snap { index, output } => {
            let mut camera = Camera::open(index)?;
            println!(
                "Opened {} ({}x{}, {})",
                camera.device_path, camera.width, camera.height, camera.fourcc
            );
            let mut frame = camera.read()?;
            for _ in 0..WARMUP_FRAMES {
                frame = camera.read()?;
            }
            camera.release();

            let image = image::RgbImage::from_raw(frame.width, frame.height, frame.data)
                .context("frame buffer does not match its dimensions")?;
            image
                .save(&output)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!("Saved {}x{} frame to {}", frame.width, frame.height, output.display());
        }
        Commands::Classify {
            input,
            json,
            movement_threshold,
            eye_open_threshold,
        } => {
            let mut config = DetectionConfig::default();
            if let Some(t) = movement_threshold {
                config.movement_threshold = t;
            }
            if let Some(t) = eye_open_threshold {
                config.eye_open_threshold = t;
            }
            classify_stream(open_input(&input)?, config, json, &mut io::stdout().lock())?;
        }
        Commands::Beep { freq, ms, device } => {
            let beeper = ConsoleBeeper::new(device);
            beeper
                .play(Tone::new(freq, Duration::from_millis(ms)))
                .with_context(|| format!("failed to play tone on {}", beeper.device_path()))?;
        }
    }

    Ok(())
}

fn open_input(input: &str) -> Result<Box<dyn BufRead>> {
    if input == "-" {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(input).with_context(|| format!("failed to open {input}"))?;
    Ok(Box::new(BufReader::new(file)))
}

/// Replay landmark records through a fresh analyzer, one result per line.
///
/// A record that does not parse counts as a frame with no face, the same way
/// the daemon treats a failed provider reply. Returns frame counts per status.
fn classify_stream<R: BufRead, W: Write>(
    reader: R,
    config: DetectionConfig,
    json: bool,
    out: &mut W,
) -> Result<BTreeMap<&'static str, usize>> {
    let mut analyzer = Analyzer::new(config);
    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut frames = 0usize;

    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        let landmarks = parse_record(&line).unwrap_or_else(|e| {
            tracing::warn!(line = lineno + 1, error = %e, "unusable record; counting as no face");
            None
        });
        let result = analyzer.analyze(landmarks.as_ref());
        frames += 1;
        *counts.entry(result.status.as_str()).or_default() += 1;

        if json {
            writeln!(out, "{}", serde_json::to_string(&result)?)?;
        } else {
            writeln!(
                out,
                "{:>5}  {:<18} {:<8} {}",
                frames, result.status, result.threat_level, result.gaze_summary
            )?;
        }
    }

    if !json {
        writeln!(out)?;
        writeln!(out, "{frames} frames")?;
        for (status, count) in &counts {
            writeln!(out, "  {status:<18} {count}")?;
        }
    }
    Ok(counts)
}
