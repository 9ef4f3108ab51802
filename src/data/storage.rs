//! Result-batch and frame-export writers.
//!
//! Each drained result batch lands in its own numbered directory,
//! `batch_000`, `batch_001`, ..., under the configured output root:
//!
//! - `results.csv` — one row per qualified result (timestamp, deformability,
//!   area), written with the `csv` crate.
//! - `images.bin` — the raw frame copies of the batch, concatenated in the
//!   same order as the CSV rows. Frame geometry is fixed per run, so readers
//!   slice by `width * height`.
//!
//! The on-demand frame export dumps the whole frame ring, oldest first, as
//! `frame_00000.raw`, `frame_00001.raw`, ... into a timestamped directory.

use crate::core::{AcquiredFrame, QualifiedResult};
use crate::error::{AppResult, CytoError};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::info;

/// Persistence sink writing numbered batch directories.
pub struct BatchWriter {
    next_batch: u32,
}

impl Default for BatchWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchWriter {
    /// New writer; batch numbering starts at zero.
    pub fn new() -> Self {
        Self { next_batch: 0 }
    }

    fn batch_dir(&self, root: &Path) -> PathBuf {
        root.join(format!("batch_{:03}", self.next_batch))
    }
}

impl crate::core::PersistenceSink for BatchWriter {
    fn write(&mut self, results: &[QualifiedResult], dir: &Path) -> AppResult<Duration> {
        let started = Instant::now();
        let batch_dir = self.batch_dir(dir);
        fs::create_dir_all(&batch_dir)?;

        let csv_path = batch_dir.join("results.csv");
        let mut writer = csv::Writer::from_path(&csv_path)
            .map_err(|e| CytoError::Storage(format!("create {}: {}", csv_path.display(), e)))?;
        writer
            .write_record(["timestamp_us", "deformability", "area"])
            .map_err(|e| CytoError::Storage(e.to_string()))?;
        for result in results {
            writer
                .write_record(&[
                    result.timestamp_us.to_string(),
                    result.deformability.to_string(),
                    result.area.to_string(),
                ])
                .map_err(|e| CytoError::Storage(e.to_string()))?;
        }
        writer
            .flush()
            .map_err(|e| CytoError::Storage(e.to_string()))?;

        let bin_path = batch_dir.join("images.bin");
        let mut bin = File::create(&bin_path)?;
        for result in results {
            bin.write_all(&result.frame)?;
        }
        bin.flush()?;

        info!(
            batch = self.next_batch,
            results = results.len(),
            dir = %batch_dir.display(),
            "Wrote result batch"
        );
        self.next_batch += 1;
        Ok(started.elapsed())
    }
}

/// Dump a frame snapshot, oldest first, as numbered raw files under a
/// timestamped subdirectory of `root`. Returns the created directory.
pub fn export_frames(frames: &[AcquiredFrame], root: &Path) -> AppResult<PathBuf> {
    let dir = root.join(format!(
        "frames_{}",
        chrono::Utc::now().format("%Y%m%d_%H%M%S")
    ));
    fs::create_dir_all(&dir)?;
    for (i, frame) in frames.iter().enumerate() {
        let path = dir.join(format!("frame_{:05}.raw", i));
        let mut file = File::create(&path)?;
        file.write_all(&frame.data)?;
    }
    info!(frames = frames.len(), dir = %dir.display(), "Exported frame snapshot");
    Ok(dir)
}
