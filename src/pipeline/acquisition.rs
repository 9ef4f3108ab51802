//! Acquisition stage: the single producer.
//!
//! Pulls frames from the injected [`FrameSource`] at the source's own pace,
//! drops incomplete and duplicate deliveries, pushes the rest into the frame
//! ring, and fans the frame id out to the processing and display queues.
//! Never blocks on any consumer: the ring overwrites and the queues are
//! unbounded.
//!
//! A source error is the one fatal condition in the pipeline. The stage logs
//! it, requests shutdown so every other stage unwinds, and returns the error
//! to the launcher.

use crate::core::FrameSource;
use crate::error::AppResult;
use crate::pipeline::state::PipelineState;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Window over which the FPS estimate is averaged.
const FPS_WINDOW: Duration = Duration::from_secs(5);

/// On clean source exhaustion, give the processing stage time to finish the
/// queued frames before the shutdown sequence abandons them. Bails out as
/// soon as the consumer stops making progress, so a missing or wedged
/// consumer never stalls acquisition shutdown.
fn wait_for_backlog_drain(state: &PipelineState) {
    let mut last_len = state.processing_queue.len();
    let mut stalled = 0u32;
    while last_len > 0 && !state.is_done() && stalled < 20 {
        std::thread::sleep(Duration::from_millis(5));
        let len = state.processing_queue.len();
        if len < last_len {
            stalled = 0;
        } else {
            stalled += 1;
        }
        last_len = len;
    }
}

/// Drive the frame source until shutdown or source exhaustion.
pub fn run(state: Arc<PipelineState>, mut source: Box<dyn FrameSource>) -> AppResult<()> {
    source.start()?;
    info!("Acquisition started");

    let mut last_frame_id: Option<u64> = None;
    let mut window_start = Instant::now();
    let mut window_frames = 0u64;

    let result = loop {
        if state.is_done() {
            break Ok(());
        }
        // While paused the operator is reviewing the ring; don't grow it
        // under them.
        if state.is_paused() {
            std::thread::sleep(Duration::from_millis(5));
            continue;
        }
        let frame = match source.acquire_next() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("Frame source exhausted");
                wait_for_backlog_drain(&state);
                break Ok(());
            }
            Err(e) => {
                // Shutdown can race the source teardown; that is not fatal.
                if state.is_done() {
                    break Ok(());
                }
                error!(error = %e, "Fatal acquisition failure");
                break Err(e);
            }
        };

        if frame.incomplete {
            state.count_frame_incomplete();
            warn!(frame_id = frame.frame_id, "Skipping incomplete frame");
            continue;
        }
        if last_frame_id.is_some_and(|last| frame.frame_id <= last) {
            state.count_frame_duplicate();
            debug!(frame_id = frame.frame_id, "Skipping duplicate frame");
            continue;
        }
        last_frame_id = Some(frame.frame_id);

        let frame_id = frame.frame_id;
        state.count_frame_acquired();
        state.frame_ring.push(frame);
        state.processing_queue.push(frame_id);
        state.display_queue.push(frame_id);

        window_frames += 1;
        let elapsed = window_start.elapsed();
        if elapsed >= FPS_WINDOW {
            let fps = window_frames as f64 / elapsed.as_secs_f64();
            state.set_fps(fps);
            debug!(fps, "Acquisition rate updated");
            window_start = Instant::now();
            window_frames = 0;
        }
    };

    // Wake everyone regardless of how the loop ended.
    state.request_shutdown();
    if let Err(e) = source.stop() {
        warn!(error = %e, "Frame source stop failed");
    }
    info!("Acquisition stopped");
    result
}
