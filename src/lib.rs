//! # Deformability Cytometry Pipeline Library
//!
//! Core library for the `cyto-daq` application: a real-time image-frame
//! pipeline that acquires grayscale frames, extracts cell contours, scores
//! their deformability, and persists qualified results without ever blocking
//! acquisition. The binary (`main.rs`) is a thin launcher over this crate;
//! the same modules back the integration tests and benchmarks.
//!
//! ## Crate Structure
//!
//! The library is organized into several modules, each with a distinct
//! responsibility:
//!
//! - **`analysis`**: Per-frame image analysis — background subtraction and
//!   filtering (`CpuImageOps`), contour shape metrics, and the qualification
//!   policy that decides which contours are retained.
//! - **`config`**: Structures for loading and validating application
//!   configuration from TOML files. See `config::Settings`.
//! - **`core`**: Fundamental types and capability traits — `FrameSource`,
//!   `ImageOps`, `PersistenceSink`, `DisplaySink` — that decouple the
//!   pipeline from hardware, file formats, and rendering backends.
//! - **`data`**: The bounded frame ring buffer and the batch/frame-export
//!   storage writers.
//! - **`error`**: The custom `CytoError` enum for centralized error handling
//!   across the application.
//! - **`metrics`**: Latency statistics, rate estimation, and the sampler
//!   thread that publishes runtime snapshots.
//! - **`pipeline`**: The stage threads (acquisition, processing, display,
//!   persistence), their shared state, and the launcher.
//! - **`source`**: Concrete frame sources — synthetic generation and
//!   raw-file replay.
//! - **`tracing_setup`**: Structured logging initialization.

pub mod analysis;
pub mod config;
pub mod core;
pub mod data;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod source;
pub mod tracing_setup;
