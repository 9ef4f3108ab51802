//! Core types and capability traits for the frame pipeline.
//!
//! The pipeline itself never touches hardware, rendering backends, or file
//! formats directly. Those concerns sit behind four capability traits —
//! [`FrameSource`], [`ImageOps`], [`PersistenceSink`], and [`DisplaySink`] —
//! injected by the launcher. This keeps the hot path testable with a
//! synthetic source and no rendering backend.

use crate::config::ProcessingConfig;
use crate::error::AppResult;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

/// Fixed frame geometry, chosen at startup and never resized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameGeometry {
    /// Frame width in pixels.
    pub width: usize,
    /// Frame height in pixels.
    pub height: usize,
}

impl FrameGeometry {
    /// Bytes per 8-bit grayscale frame.
    pub fn frame_size(&self) -> usize {
        self.width * self.height
    }
}

/// Rectangular region of interest within a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Roi {
    /// Left edge, in pixels.
    pub x: usize,
    /// Top edge, in pixels.
    pub y: usize,
    /// Width in pixels.
    pub width: usize,
    /// Height in pixels.
    pub height: usize,
}

impl Roi {
    /// An ROI covering the entire frame.
    pub fn full_frame(geometry: FrameGeometry) -> Self {
        Self {
            x: 0,
            y: 0,
            width: geometry.width,
            height: geometry.height,
        }
    }

    /// Whether this ROI spans the whole frame. A whole-frame ROI means no
    /// targeted object is being tracked, so analysis is skipped.
    pub fn spans_full_frame(&self, geometry: FrameGeometry) -> bool {
        self.x == 0
            && self.y == 0
            && self.width == geometry.width
            && self.height == geometry.height
    }

    /// Column index of the ROI's right edge (inclusive).
    pub fn right_column(&self) -> usize {
        self.x + self.width.saturating_sub(1)
    }
}

/// One frame as delivered by a [`FrameSource`].
#[derive(Clone, Debug)]
pub struct AcquiredFrame {
    /// Raw 8-bit grayscale pixel data, `geometry.frame_size()` bytes.
    pub data: Vec<u8>,
    /// Source-assigned monotonically increasing frame id.
    pub frame_id: u64,
    /// Source timestamp, microseconds.
    pub timestamp_us: u64,
    /// Transfer did not complete; the frame must be skipped.
    pub incomplete: bool,
}

/// Binary foreground mask produced by background subtraction.
///
/// Full-frame sized; foreground pixels are [`Mask::FOREGROUND`].
#[derive(Clone, Debug)]
pub struct Mask {
    /// Mask pixels, row-major, one byte per pixel.
    pub data: Vec<u8>,
    /// Mask width in pixels (same as the frame).
    pub width: usize,
    /// Mask height in pixels (same as the frame).
    pub height: usize,
}

impl Mask {
    /// Pixel value marking foreground.
    pub const FOREGROUND: u8 = 255;

    /// Allocate an all-background mask.
    pub fn zeroed(geometry: FrameGeometry) -> Self {
        Self {
            data: vec![0; geometry.frame_size()],
            width: geometry.width,
            height: geometry.height,
        }
    }

    /// Value at (x, y). Out-of-bounds reads as background.
    pub fn at(&self, x: usize, y: usize) -> u8 {
        if x < self.width && y < self.height {
            self.data[y * self.width + x]
        } else {
            0
        }
    }
}

/// A single contour point. Stored as f64 so downstream shape metrics avoid
/// repeated integer casts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    /// Column coordinate.
    pub x: f64,
    /// Row coordinate.
    pub y: f64,
}

/// A closed contour, ordered along the boundary.
pub type Contour = Vec<Point>;

/// Contours extracted from a mask, with the extraction time.
#[derive(Clone, Debug, Default)]
pub struct ContourSet {
    /// Extracted closed contours.
    pub contours: Vec<Contour>,
    /// Time spent in contour extraction.
    pub elapsed: Duration,
}

/// One analysis result that passed qualification while recording was active.
///
/// The frame copy is mandatory: the ring-buffer slot it came from may be
/// overwritten before persistence runs.
#[derive(Clone, Debug, Serialize)]
pub struct QualifiedResult {
    /// Wall-clock timestamp, microseconds since the Unix epoch.
    pub timestamp_us: u64,
    /// 1 − circularity, clamped at 0.
    pub deformability: f64,
    /// Contour area in square pixels.
    pub area: f64,
    /// Owned copy of the source frame.
    #[serde(skip)]
    pub frame: Vec<u8>,
}

/// A deformability/area pair for live visualization. Every qualifying contour
/// contributes one, independent of the recording flag.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DeformabilitySample {
    /// 1 − circularity, clamped at 0.
    pub deformability: f64,
    /// Contour area in square pixels.
    pub area: f64,
}

/// Supplier of raw frames (camera grabber, replay reader, synthetic source).
pub trait FrameSource: Send {
    /// Frame geometry this source produces.
    fn geometry(&self) -> FrameGeometry;

    /// Begin acquisition. Called once before the first `acquire_next`.
    fn start(&mut self) -> AppResult<()> {
        Ok(())
    }

    /// Acquire the next frame, blocking at the source's own pace.
    ///
    /// Incomplete or duplicate frames are still returned; the acquisition
    /// driver decides to skip them. `Ok(None)` signals a cleanly exhausted
    /// source (end of a replay); a returned error is fatal for the run.
    fn acquire_next(&mut self) -> AppResult<Option<AcquiredFrame>>;

    /// End acquisition. Called once during shutdown.
    fn stop(&mut self) -> AppResult<()> {
        Ok(())
    }
}

/// Image-filtering primitives (blur, threshold, morphology, contour tracing).
///
/// Any failure is a per-frame recoverable skip; the processing stage counts
/// it and continues.
pub trait ImageOps: Send {
    /// Install the background frame used for subtraction.
    fn set_background(&mut self, frame: &[u8], geometry: FrameGeometry) -> AppResult<()>;

    /// Background-subtract, binarize, and morphologically filter one frame,
    /// producing a foreground mask restricted to the ROI.
    fn subtract_background_and_filter(
        &mut self,
        frame: &[u8],
        geometry: FrameGeometry,
        roi: Roi,
        config: &ProcessingConfig,
    ) -> AppResult<Mask>;

    /// Extract closed contours from a mask.
    fn find_contours(&mut self, mask: &Mask) -> AppResult<ContourSet>;
}

/// Writer for batches of qualified results. Failures are counted by the
/// persistence stage, not retried.
pub trait PersistenceSink: Send {
    /// Write one drained batch under `dir`, returning the elapsed write time.
    fn write(&mut self, results: &[QualifiedResult], dir: &Path) -> AppResult<Duration>;
}

/// Read-only view of one displayable frame.
pub struct DisplayView<'a> {
    /// Raw frame bytes.
    pub frame: &'a [u8],
    /// Frame geometry.
    pub geometry: FrameGeometry,
    /// Current region of interest.
    pub roi: Roi,
    /// Foreground mask, present when overlay mode is enabled.
    pub overlay: Option<&'a Mask>,
}

/// Rendering backend for the display stage. The default binary injects a
/// no-op sink; rendering is an external concern.
pub trait DisplaySink: Send {
    /// Present one frame.
    fn show(&mut self, view: DisplayView<'_>) -> AppResult<()>;
}

/// Display sink that drops every frame.
#[derive(Debug, Default)]
pub struct NullDisplay;

impl DisplaySink for NullDisplay {
    fn show(&mut self, _view: DisplayView<'_>) -> AppResult<()> {
        Ok(())
    }
}

/// Current wall-clock time in microseconds since the Unix epoch.
pub fn now_us() -> u64 {
    chrono::Utc::now().timestamp_micros().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_frame_roi_detection() {
        let geometry = FrameGeometry {
            width: 512,
            height: 96,
        };
        assert!(Roi::full_frame(geometry).spans_full_frame(geometry));

        let partial = Roi {
            x: 10,
            y: 0,
            width: 100,
            height: 96,
        };
        assert!(!partial.spans_full_frame(geometry));
        assert_eq!(partial.right_column(), 109);
    }

    #[test]
    fn mask_out_of_bounds_reads_background() {
        let mask = Mask::zeroed(FrameGeometry {
            width: 4,
            height: 4,
        });
        assert_eq!(mask.at(10, 10), 0);
    }
}
