//! Display stage: a paced consumer that never creates backpressure.
//!
//! Drains its queue to the newest entry on every wakeup and renders only
//! that frame; anything older is stale by definition. While paused it
//! renders from the ring at the review cursor instead, re-rendering when a
//! control input marks the view dirty.
//!
//! Rendering failures are logged and dropped. The display is an observer;
//! nothing downstream depends on it.

use crate::core::{DisplaySink, DisplayView};
use crate::error::AppResult;
use crate::pipeline::state::{PipelineState, StageWork};
use std::sync::Arc;
use tracing::{info, warn};

fn render_latest(state: &PipelineState, sink: &mut dyn DisplaySink) {
    let Some(frame) = state.frame_ring.latest() else {
        return;
    };
    present(state, sink, &frame.data);
}

fn render_review(state: &PipelineState, sink: &mut dyn DisplaySink) {
    let size = state.frame_ring.size();
    if size == 0 {
        return;
    }
    let index = state.review_index().min(size - 1);
    if let Ok(frame) = state.frame_ring.get(index) {
        present(state, sink, &frame.data);
    }
}

fn present(state: &PipelineState, sink: &mut dyn DisplaySink, data: &[u8]) {
    let mask = if state.overlay_enabled() {
        state.latest_mask()
    } else {
        None
    };
    let view = DisplayView {
        frame: data,
        geometry: state.geometry,
        roi: state.roi(),
        overlay: mask.as_ref(),
    };
    if let Err(e) = sink.show(view) {
        warn!(error = %e, "Display render failed");
    }
}

/// Consume the display queue until shutdown. Wakes on new frames and on
/// control inputs alike, so pause, cursor moves, and overlay toggles
/// re-render even while acquisition is paused and no frames arrive.
pub fn run(state: Arc<PipelineState>, mut sink: Box<dyn DisplaySink>) -> AppResult<()> {
    info!("Display started");
    while let Some(work) = state.wait_display_work() {
        // Collapse the backlog; only the newest frame is worth drawing.
        while state.display_queue.try_pop().is_some() {}
        let dirty = state.take_display_dirty();

        if state.is_paused() {
            if dirty {
                render_review(&state, sink.as_mut());
            }
        } else if dirty || matches!(work, StageWork::Frame(_)) {
            render_latest(&state, sink.as_mut());
        }
    }
    info!("Display stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PipelineSettings, ProcessingConfig};
    use crate::core::{AcquiredFrame, FrameGeometry, Roi};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records the first byte of every frame it is asked to show.
    struct RecordingSink(Arc<Mutex<Vec<u8>>>);

    impl DisplaySink for RecordingSink {
        fn show(&mut self, view: DisplayView<'_>) -> AppResult<()> {
            if let Ok(mut seen) = self.0.lock() {
                seen.push(view.frame[0]);
            }
            Ok(())
        }
    }

    fn state() -> Arc<PipelineState> {
        let geometry = FrameGeometry {
            width: 4,
            height: 4,
        };
        Arc::new(PipelineState::new(
            &PipelineSettings {
                frame_buffer_count: 8,
                metrics_buffer_count: 8,
                result_batch_size: 10,
                latency_threshold_us: 200.0,
                target_fps: 1000,
                metrics_interval: Duration::from_millis(100),
            },
            ProcessingConfig::default(),
            geometry,
            Roi::full_frame(geometry),
        ))
    }

    fn push_frame(state: &Arc<PipelineState>, id: u64) {
        state.frame_ring.push(AcquiredFrame {
            data: vec![id as u8; 16],
            frame_id: id,
            timestamp_us: id,
            incomplete: false,
        });
    }

    #[test]
    fn live_view_renders_the_newest_frame() {
        let st = state();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut sink = RecordingSink(Arc::clone(&seen));

        for id in 1..=3 {
            push_frame(&st, id);
        }
        render_latest(&st, &mut sink);
        assert_eq!(*seen.lock().unwrap(), vec![3]);
    }

    #[test]
    fn paused_review_renders_the_cursor_frame() {
        let st = state();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut sink = RecordingSink(Arc::clone(&seen));

        for id in 1..=5 {
            push_frame(&st, id);
        }
        st.set_paused(true);
        st.set_review_index(2); // two frames behind the newest
        render_review(&st, &mut sink);
        assert_eq!(*seen.lock().unwrap(), vec![3]);
    }

    #[test]
    fn review_cursor_is_clamped_to_ring_size() {
        let st = state();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut sink = RecordingSink(Arc::clone(&seen));

        push_frame(&st, 1);
        push_frame(&st, 2);
        st.set_review_index(100);
        render_review(&st, &mut sink);
        // Clamped to the oldest held frame.
        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[test]
    fn paused_cursor_moves_rerender_without_new_frames() {
        let st = state();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = RecordingSink(Arc::clone(&seen));

        for id in 1..=5 {
            push_frame(&st, id);
        }
        // Paused before the stage even starts: acquisition is idle, so the
        // only wakeups the loop can get are control inputs.
        st.set_paused(true);

        let st2 = Arc::clone(&st);
        let handle = std::thread::spawn(move || run(st2, Box::new(sink)));

        std::thread::sleep(Duration::from_millis(50));
        st.set_review_index(2); // two frames behind the newest
        std::thread::sleep(Duration::from_millis(50));
        st.request_shutdown();
        handle.join().unwrap().unwrap();

        // Entering pause rendered the newest frame, the cursor move the
        // one two back.
        assert_eq!(*seen.lock().unwrap(), vec![5, 3]);
    }

    #[test]
    fn shutdown_ends_the_loop() {
        let st = state();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = RecordingSink(Arc::clone(&seen));

        let st2 = Arc::clone(&st);
        let handle = std::thread::spawn(move || run(st2, Box::new(sink)));
        std::thread::sleep(Duration::from_millis(30));
        st.request_shutdown();
        handle.join().unwrap().unwrap();
    }
}
