//! CLI Entry Point for cyto-daq
//!
//! Provides command-line interface for:
//! - Running the live pipeline against the synthetic frame source
//! - Replaying previously exported raw frame dumps
//!
//! # Usage
//!
//! Run with the synthetic source:
//! ```bash
//! cyto-daq run --record
//! ```
//!
//! Replay an exported frame directory:
//! ```bash
//! cyto-daq replay data/frames_20260825_120000 --record
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cyto_daq::analysis::CpuImageOps;
use cyto_daq::config::Settings;
use cyto_daq::core::{FrameGeometry, FrameSource, NullDisplay, Roi};
use cyto_daq::data::storage::BatchWriter;
use cyto_daq::pipeline::runner;
use cyto_daq::source::{MockFrameSource, ReplayFrameSource};
use cyto_daq::tracing_setup;
use std::path::PathBuf;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Default sensor geometry of the line-scan camera this tool targets.
const DEFAULT_WIDTH: usize = 512;
const DEFAULT_HEIGHT: usize = 96;

#[derive(Parser)]
#[command(name = "cyto-daq")]
#[command(about = "Real-time deformability cytometry pipeline", long_about = None)]
struct Cli {
    /// Configuration name (loads config/<name>.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline against the synthetic frame source
    Run {
        /// Retain qualified results for persistence from the start
        #[arg(long)]
        record: bool,

        /// Stop after this many frames instead of waiting for Ctrl+C
        #[arg(long)]
        frames: Option<u64>,
    },

    /// Replay a directory of exported .raw frames
    Replay {
        /// Directory containing frame_*.raw files
        dir: PathBuf,

        /// Retain qualified results for persistence from the start
        #[arg(long)]
        record: bool,
    },

    /// Copy a frame directory through the ring buffer into a fresh export
    Export {
        /// Directory containing frame_*.raw files
        dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::new(cli.config.as_deref()).context("loading configuration")?;
    tracing_setup::init_from_settings(&settings)
        .map_err(|e| anyhow::anyhow!(e))
        .context("initializing tracing")?;

    let geometry = FrameGeometry {
        width: DEFAULT_WIDTH,
        height: DEFAULT_HEIGHT,
    };

    let (source, record): (Box<dyn FrameSource>, bool) = match cli.command {
        Commands::Run { record, frames } => {
            let mut mock = MockFrameSource::new(geometry, settings.pipeline.target_fps);
            if let Some(limit) = frames {
                mock = mock.with_frame_limit(limit);
            }
            (Box::new(mock), record)
        }
        Commands::Replay { dir, record } => (
            Box::new(
                ReplayFrameSource::new(&dir, geometry, settings.pipeline.target_fps)
                    .context("opening replay directory")?,
            ),
            record,
        ),
        Commands::Export { dir } => return export_frames_from(&settings, geometry, &dir),
    };

    // Center the analysis window on the channel: half the sensor width,
    // full height. A full-frame ROI would disable analysis entirely.
    let roi = Roi {
        x: geometry.width / 4,
        y: 0,
        width: geometry.width / 2,
        height: geometry.height,
    };

    let handle = runner::launch(
        &settings,
        roi,
        source,
        Box::new(CpuImageOps::new()),
        Box::new(BatchWriter::new()),
        Box::new(NullDisplay),
    )
    .context("launching pipeline")?;

    let state = handle.state();
    state.set_recording(record);

    let sig_state = handle.state();
    ctrlc::set_handler(move || {
        tracing::info!("Ctrl+C received, shutting down");
        sig_state.request_shutdown();
    })
    .context("installing Ctrl+C handler")?;

    let summary = handle.join().context("pipeline run failed")?;
    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &cyto_daq::metrics::MetricsSnapshot) {
    println!(
        "frames processed: {}, results recorded: {}, avg latency: {:.1} µs, failures: {} processing / {} storage",
        summary.frames_processed,
        summary.results_recorded,
        summary.latency.average_us,
        summary.processing_failures,
        summary.storage_failures
    );
}

/// Load every frame of `dir` through a ring buffer sized to fit, then dump
/// the ring into a fresh timestamped export directory.
fn export_frames_from(settings: &Settings, geometry: FrameGeometry, dir: &std::path::Path) -> Result<()> {
    use cyto_daq::data::ring_buffer::RingBuffer;
    use cyto_daq::data::storage;

    let mut source = ReplayFrameSource::new(dir, geometry, u32::MAX)
        .context("opening frame directory")?;
    let ring = RingBuffer::new(settings.pipeline.frame_buffer_count);
    while let Some(frame) = source.acquire_next().context("reading frame")? {
        ring.push(frame);
    }
    let frames = ring.snapshot_oldest_first();
    let out = storage::export_frames(&frames, &settings.storage.output_dir)
        .context("writing export")?;
    println!("exported {} frames to {}", frames.len(), out.display());
    Ok(())
}
