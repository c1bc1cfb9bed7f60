use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::block_registry::HeightAssignment;
use crate::config::PlaygroundConfig;
use crate::input::{controls_help, HeadlessCapture};
use crate::physics::SimpleWorld;
use crate::playground::{FrameSink, FrameSnapshot, Playground};
use crate::scheduler::RunStatus;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a block script headlessly and report the final row
    Run {
        /// Rhai script to run
        #[arg(long)]
        script: PathBuf,

        /// Block heights, comma separated (one block per height)
        #[arg(long, value_delimiter = ',', conflicts_with = "blocks")]
        heights: Option<Vec<f32>>,

        /// Number of blocks with heights 1..=N, shuffled
        #[arg(long)]
        blocks: Option<usize>,

        /// Seed for the initial shuffle
        #[arg(long)]
        seed: Option<u64>,

        /// Frame loop ticks per second
        #[arg(long, default_value_t = 60.0)]
        fps: f32,

        /// Give up if the script is still running after this long (simulated time)
        #[arg(long, default_value_t = 120.0)]
        max_seconds: f32,

        /// Write one JSON frame snapshot per tick
        #[arg(long)]
        frames_out: Option<PathBuf>,

        /// JSON config file; missing fields use defaults
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the controls help
    Controls,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            script,
            heights,
            blocks,
            seed,
            fps,
            max_seconds,
            frames_out,
            config,
        } => {
            let mut config = match config {
                Some(path) => PlaygroundConfig::from_json_file(&path)?,
                None => PlaygroundConfig::default(),
            };
            if let Some(count) = blocks {
                config.block_count = count;
            }
            let assignment = height_assignment(heights, seed, &config);
            run_headless(&script, config, assignment, fps, max_seconds, frames_out.as_deref())?;
        }
        Commands::Controls => {
            for line in controls_help() {
                println!("{}", line);
            }
        }
    }
    Ok(())
}

fn height_assignment(
    heights: Option<Vec<f32>>,
    seed: Option<u64>,
    config: &PlaygroundConfig,
) -> HeightAssignment {
    match (heights, seed) {
        (Some(heights), Some(seed)) => HeightAssignment::Shuffled { heights, seed },
        (Some(heights), None) => HeightAssignment::InOrder(heights),
        (None, seed) => {
            let seed = seed.unwrap_or_else(rand::random);
            log::info!("Shuffling {} blocks with seed {}", config.block_count, seed);
            HeightAssignment::Random { seed }
        }
    }
}

/// Frame sink writing JSON lines.
struct JsonLinesSink {
    out: BufWriter<File>,
}

impl JsonLinesSink {
    fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        Ok(Self {
            out: BufWriter::new(file),
        })
    }

    fn finish(mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

impl FrameSink for JsonLinesSink {
    fn present(&mut self, frame: &FrameSnapshot) -> Result<()> {
        serde_json::to_writer(&mut self.out, frame)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }
}

/// Tick length and simulated time limit for a headless run.
fn frame_timing(fps: f32, max_seconds: f32) -> Result<(Duration, Duration)> {
    if !fps.is_finite() || fps <= 0.0 {
        bail!("--fps must be positive, got {}", fps);
    }
    if !max_seconds.is_finite() || max_seconds < 0.0 {
        bail!("--max-seconds must be a finite, non-negative number, got {}", max_seconds);
    }
    let dt = Duration::try_from_secs_f64(1.0 / fps as f64)
        .with_context(|| format!("--fps {} gives an unusable tick length", fps))?;
    if dt.is_zero() {
        bail!("--fps {} is too high", fps);
    }
    let limit = Duration::try_from_secs_f32(max_seconds)
        .with_context(|| format!("--max-seconds {} is out of range", max_seconds))?;
    Ok((dt, limit))
}

fn run_headless(
    script_path: &Path,
    config: PlaygroundConfig,
    assignment: HeightAssignment,
    fps: f32,
    max_seconds: f32,
    frames_out: Option<&Path>,
) -> Result<()> {
    let (dt, limit) = frame_timing(fps, max_seconds)?;
    let source = std::fs::read_to_string(script_path)
        .with_context(|| format!("reading script {}", script_path.display()))?;

    let world = SimpleWorld::new(config.gravity).with_ground_size(config.ground_size);
    let mut playground = Playground::new(config, world, Box::new(HeadlessCapture), assignment)?;
    let mut sink = frames_out.map(JsonLinesSink::create).transpose()?;

    println!("Initial heights: {:?}", playground.heights());
    playground.run_source(&source);

    while playground.script_status() == RunStatus::Running && playground.now() < limit {
        let frame = playground.tick(dt);
        if let Some(sink) = sink.as_mut() {
            sink.present(&frame)?;
        }
    }
    if let Some(sink) = sink {
        sink.finish()?;
    }

    for diag in playground.take_diagnostics() {
        log::error!("{}", diag);
    }

    let status = playground.script_status();
    println!("Final heights: {:?}", playground.heights());
    println!("Swaps: {}", playground.script_stats().swaps);
    println!("Status: {:?}", status);

    match status {
        RunStatus::Completed => Ok(()),
        RunStatus::Running => {
            playground.cancel_script();
            bail!("script still running after {}s", max_seconds)
        }
        RunStatus::Failed => bail!(
            "script failed: {}",
            playground.last_script_error().unwrap_or("unknown error")
        ),
        RunStatus::Idle => bail!("script did not start"),
    }
}
