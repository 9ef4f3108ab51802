//! Processing stage: per-frame analysis and qualification.
//!
//! The consumer half of the analysis path. For each queued frame id it
//! re-locates the frame in the ring (the slot may have been overwritten by a
//! faster producer; that frame is simply dropped), runs the filter chain
//! through the injected [`ImageOps`], skips the frame outright if foreground
//! reaches the ROI's edge columns, and otherwise extracts contours, applies
//! the qualification policy, and appends retained results to the
//! double-buffered bank.
//!
//! Every qualifying contour feeds the live deformability ring whether or not
//! recording is active; only recording gates retention for persistence.
//! Analysis failures are counted and skipped, never fatal.

use crate::analysis::{calculate_metrics, mask_touches_roi_border, qualifies};
use crate::core::{AcquiredFrame, DeformabilitySample, ImageOps, QualifiedResult};
use crate::data::storage::export_frames;
use crate::error::AppResult;
use crate::pipeline::state::{PipelineState, StageWork};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

struct Processor {
    state: Arc<PipelineState>,
    ops: Box<dyn ImageOps>,
    output_dir: PathBuf,
    background_set: bool,
}

impl Processor {
    /// Adopt this frame as the new background. The first frame of a run is
    /// always adopted so the chain has something to subtract against.
    fn adopt_background(&mut self, frame: &AcquiredFrame) {
        match self.ops.set_background(&frame.data, self.state.geometry) {
            Ok(()) => {
                self.background_set = true;
                info!(frame_id = frame.frame_id, "Background frame installed");
            }
            Err(e) => {
                self.state.count_processing_failure();
                warn!(error = %e, "Background installation failed");
            }
        }
    }

    /// Dump the whole frame ring to disk, oldest first.
    fn service_export(&mut self) {
        if !self.state.take_export_request() {
            return;
        }
        let frames = self.state.frame_ring.snapshot_oldest_first();
        match export_frames(&frames, &self.output_dir) {
            Ok(dir) => info!(dir = %dir.display(), "Frame ring exported"),
            Err(e) => {
                self.state.count_storage_failure();
                warn!(error = %e, "Frame export failed");
            }
        }
    }

    fn handle(&mut self, frame_id: u64) {
        // Re-locate the frame by id; the ring may have moved on.
        let Some(latest) = self.state.frame_ring.latest() else {
            return;
        };
        if latest.frame_id < frame_id {
            return;
        }
        let offset = (latest.frame_id - frame_id) as usize;
        let frame = match self.state.frame_ring.get(offset) {
            Ok(frame) if frame.frame_id == frame_id => frame,
            _ => {
                debug!(frame_id, "Frame overwritten before analysis");
                return;
            }
        };

        // Timed around the whole per-frame path so skips and failures show
        // up in the latency distribution with their real cost.
        let started = Instant::now();
        self.analyze(&frame);
        let elapsed_us = started.elapsed().as_secs_f64() * 1e6;
        self.state.processing_times.push(elapsed_us);
    }

    fn analyze(&mut self, frame: &AcquiredFrame) {
        if self.state.take_background_request() || !self.background_set {
            self.adopt_background(frame);
            return;
        }

        let roi = self.state.roi();
        if roi.spans_full_frame(self.state.geometry) {
            // No target in view; nothing to analyze.
            return;
        }
        let config = self.state.processing_config();

        let mask = match self.ops.subtract_background_and_filter(
            &frame.data,
            self.state.geometry,
            roi,
            &config,
        ) {
            Ok(mask) => mask,
            Err(e) => {
                self.state.count_processing_failure();
                warn!(frame_id = frame.frame_id, error = %e, "Frame filtering failed");
                return;
            }
        };

        // An object straddling the channel edge is only partially in view;
        // the whole frame is disqualified and contour extraction skipped.
        if mask_touches_roi_border(&mask, &roi) {
            debug!(frame_id = frame.frame_id, "Foreground on ROI border, frame skipped");
            if self.state.overlay_enabled() {
                self.state.set_latest_mask(mask);
            }
            self.state.count_frame_processed();
            return;
        }

        let contour_set = match self.ops.find_contours(&mask) {
            Ok(set) => set,
            Err(e) => {
                self.state.count_processing_failure();
                warn!(frame_id = frame.frame_id, error = %e, "Contour extraction failed");
                return;
            }
        };

        for contour in &contour_set.contours {
            if !qualifies(contour, &roi, &config) {
                continue;
            }
            let Some(metrics) = calculate_metrics(contour) else {
                continue;
            };
            self.state.deformability_ring.push(DeformabilitySample {
                deformability: metrics.deformability,
                area: metrics.area,
            });
            self.state.count_sample_qualified();
            if self.state.is_recording() {
                self.state.append_qualified(QualifiedResult {
                    timestamp_us: frame.timestamp_us,
                    deformability: metrics.deformability,
                    area: metrics.area,
                    frame: frame.data.clone(),
                });
            }
        }

        if self.state.overlay_enabled() {
            self.state.set_latest_mask(mask);
        }
        self.state.count_frame_processed();
    }
}

/// Consume the processing queue until shutdown.
pub fn run(
    state: Arc<PipelineState>,
    ops: Box<dyn ImageOps>,
    output_dir: PathBuf,
) -> AppResult<()> {
    let mut processor = Processor {
        state: Arc::clone(&state),
        ops,
        output_dir,
        background_set: false,
    };
    info!("Processing started");
    loop {
        // Checked before taking more work: once shutdown is requested the
        // remaining backlog is abandoned, not analyzed, so the stage exits
        // in bounded time no matter how deep the queue is.
        if state.is_done() {
            break;
        }
        match state.wait_processing_work() {
            None => break,
            Some(StageWork::Frame(frame_id)) => processor.handle(frame_id),
            Some(StageWork::Control) => processor.service_export(),
        }
    }
    state.mark_processing_finished();
    info!("Processing stopped");
    Ok(())
}
