//! Custom error types for the application.
//!
//! This module defines the primary error type, `CytoError`, for the entire
//! application. Using the `thiserror` crate, it provides a centralized and
//! consistent way to handle the different kinds of failures the pipeline can
//! hit, from configuration and I/O problems to per-stage faults.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from the `config` crate, typically file
//!   parsing or format issues in the configuration files.
//! - **`Configuration`**: Semantic errors in the configuration — values that
//!   parse but are logically invalid (e.g. a zero buffer capacity). These are
//!   caught during validation.
//! - **`Io`**: Wraps standard `std::io::Error` for file operations.
//! - **`Acquisition`**: A fatal frame-source failure. This is the only error
//!   class that terminates a run; the launcher runs the shutdown sequence and
//!   propagates it upward.
//! - **`Processing`**: Image-analysis failures for a single frame. These are
//!   recoverable by design — the processing stage counts them and moves on —
//!   but the `ImageOps` capability still reports them as typed errors.
//! - **`Storage`**: Persistence-sink failures. Counted and surfaced to
//!   metrics; never block or pause acquisition.
//! - **`OutOfRange`**: A ring-buffer read with an index at or beyond the
//!   current element count.
//!
//! By using `#[from]`, `CytoError` can be created from underlying error types,
//! simplifying error handling throughout the application with the `?` operator.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, CytoError>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum CytoError {
    /// Configuration file could not be loaded or parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Configuration parsed but contains logically invalid values.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// File or directory I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Fatal frame-source failure; terminates the run.
    #[error("Acquisition error: {0}")]
    Acquisition(String),

    /// Per-frame image-analysis failure; recoverable.
    #[error("Frame processing error: {0}")]
    Processing(String),

    /// Persistence-sink failure; counted, never retried by the core.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Ring-buffer read outside the valid index range.
    #[error("Ring buffer index {index} out of range (size {size})")]
    OutOfRange {
        /// Requested index, relative to the most recent push.
        index: usize,
        /// Number of elements currently held.
        size: usize,
    },
}

impl CytoError {
    /// Whether the pipeline should keep running after this error.
    ///
    /// Everything except configuration and acquisition failures is handled
    /// locally by the stage that hit it.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CytoError::Processing(_) | CytoError::Storage(_) | CytoError::OutOfRange { .. }
        )
    }
}
