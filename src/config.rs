//! Configuration management.
//!
//! Settings are loaded from `config/{name}.toml` via the `config` crate and
//! deserialized with serde. The `[image_processing]` table maps directly onto
//! [`ProcessingConfig`], which is installed into the pipeline state and can be
//! re-read at safe points (pull-based hot reload): a fresh value takes effect
//! on the next processed frame, never retroactively.

use crate::error::{AppResult, CytoError};
use config::Config;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application settings.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Log level for the tracing subscriber (trace/debug/info/warn/error).
    pub log_level: String,
    /// Persistence output settings.
    pub storage: StorageSettings,
    /// Pipeline geometry, capacities, and cadences.
    pub pipeline: PipelineSettings,
    /// Per-frame analysis thresholds (hot-reloadable).
    pub image_processing: ProcessingConfig,
}

/// Persistence output settings.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    /// Base directory for result batches and frame exports.
    pub output_dir: PathBuf,
}

/// Pipeline capacities and cadences.
#[derive(Debug, Deserialize, Clone)]
pub struct PipelineSettings {
    /// Frame ring-buffer capacity, in frames.
    pub frame_buffer_count: usize,
    /// Capacity of the deformability and processing-time ring buffers.
    pub metrics_buffer_count: usize,
    /// Qualified results accumulated before the active buffer is swapped
    /// out for persistence.
    pub result_batch_size: usize,
    /// Processing-latency threshold (µs) above which a sample counts as
    /// high-latency in the metrics snapshot.
    pub latency_threshold_us: f64,
    /// Target acquisition rate for paced sources (mock/replay).
    pub target_fps: u32,
    /// Cadence of the metrics sampler thread.
    #[serde(with = "humantime_serde")]
    pub metrics_interval: Duration,
}

/// Immutable-per-frame analysis thresholds.
///
/// Mirrors the original acquisition tool's `image_processing` config block.
/// A new value installed by the config provider applies from the next frame.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ProcessingConfig {
    /// Gaussian blur kernel size (odd, in pixels).
    pub gaussian_blur_size: u32,
    /// Background-subtraction binarization threshold (0-255).
    pub bg_subtract_threshold: u8,
    /// Morphological kernel size (pixels).
    pub morph_kernel_size: u32,
    /// Morphological open/close iterations.
    pub morph_iterations: u32,
    /// Minimum contour point count for qualification.
    pub contour_threshold_min: usize,
    /// Maximum contour point count for qualification.
    pub contour_threshold_max: usize,
}

impl Settings {
    /// Load settings from `config/{name}.toml` (default: `config/default`).
    pub fn new(config_name: Option<&str>) -> AppResult<Self> {
        let config_path = format!("config/{}", config_name.unwrap_or("default"));
        let s = Config::builder()
            .add_source(config::File::with_name(&config_path))
            .build()
            .map_err(CytoError::Config)?;

        let settings: Settings = s.try_deserialize().map_err(CytoError::Config)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Semantic validation beyond what deserialization checks.
    pub fn validate(&self) -> AppResult<()> {
        if self.pipeline.frame_buffer_count == 0 {
            return Err(CytoError::Configuration(
                "pipeline.frame_buffer_count must be >= 1".into(),
            ));
        }
        if self.pipeline.metrics_buffer_count == 0 {
            return Err(CytoError::Configuration(
                "pipeline.metrics_buffer_count must be >= 1".into(),
            ));
        }
        if self.pipeline.result_batch_size == 0 {
            return Err(CytoError::Configuration(
                "pipeline.result_batch_size must be >= 1".into(),
            ));
        }
        self.image_processing.validate()
    }
}

impl ProcessingConfig {
    /// Validate threshold ordering and kernel parity.
    pub fn validate(&self) -> AppResult<()> {
        if self.contour_threshold_min > self.contour_threshold_max {
            return Err(CytoError::Configuration(format!(
                "contour_threshold_min ({}) exceeds contour_threshold_max ({})",
                self.contour_threshold_min, self.contour_threshold_max
            )));
        }
        if self.gaussian_blur_size % 2 == 0 {
            return Err(CytoError::Configuration(format!(
                "gaussian_blur_size must be odd, got {}",
                self.gaussian_blur_size
            )));
        }
        Ok(())
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        // Matches config/default.toml; used by tests and the mock launcher.
        Self {
            gaussian_blur_size: 3,
            bg_subtract_threshold: 10,
            morph_kernel_size: 3,
            morph_iterations: 1,
            contour_threshold_min: 10,
            contour_threshold_max: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_processing_config_is_valid() {
        ProcessingConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_inverted_contour_thresholds() {
        let cfg = ProcessingConfig {
            contour_threshold_min: 50,
            contour_threshold_max: 10,
            ..ProcessingConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(CytoError::Configuration(_))));
    }

    #[test]
    fn rejects_even_blur_kernel() {
        let cfg = ProcessingConfig {
            gaussian_blur_size: 4,
            ..ProcessingConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
