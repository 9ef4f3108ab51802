//! Persistence stage: writes swapped-out result batches off the hot path.
//!
//! Parks on the result bank's condvar until a full buffer is handed over,
//! writes it through the injected [`PersistenceSink`], and clears the saving
//! flag so the bank may swap again. At shutdown it drains whatever remains
//! in both buffers into one final partial batch, so every retained result is
//! persisted exactly once.
//!
//! Write failures are counted and logged; the batch is dropped rather than
//! retried, and acquisition is never paused on storage trouble.

use crate::core::{PersistenceSink, QualifiedResult};
use crate::error::AppResult;
use crate::pipeline::state::PipelineState;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

fn write_batch(
    state: &PipelineState,
    sink: &mut dyn PersistenceSink,
    batch: &[QualifiedResult],
    dir: &Path,
) {
    match sink.write(batch, dir) {
        Ok(elapsed) => {
            state.add_save_time(elapsed);
            debug!(results = batch.len(), elapsed_ms = elapsed.as_millis() as u64, "Batch persisted");
        }
        Err(e) => {
            state.count_storage_failure();
            warn!(results = batch.len(), error = %e, "Batch write failed");
        }
    }
}

/// Service the result bank until shutdown, then flush the remainder.
pub fn run(
    state: Arc<PipelineState>,
    mut sink: Box<dyn PersistenceSink>,
    output_dir: PathBuf,
) -> AppResult<()> {
    info!("Persistence started");
    while let Some(batch) = state.wait_save_batch() {
        write_batch(&state, sink.as_mut(), &batch, &output_dir);
        state.finish_save();
    }

    // The processing stage keeps appending while it drains its queue after
    // shutdown; the final flush must come after it. Bounded wait so a
    // wedged processing thread cannot hold persistence hostage.
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while !state.processing_finished() && std::time::Instant::now() < deadline {
        std::thread::sleep(std::time::Duration::from_millis(5));
    }

    let remaining = state.drain_remaining_results();
    if !remaining.is_empty() {
        info!(results = remaining.len(), "Flushing final partial batch");
        write_batch(&state, sink.as_mut(), &remaining, &output_dir);
    }
    info!("Persistence stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PipelineSettings, ProcessingConfig};
    use crate::core::{FrameGeometry, Roi};
    use crate::error::CytoError;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    /// Collects the timestamps of every batch it is asked to write.
    struct CollectingSink(Arc<Mutex<Vec<Vec<u64>>>>);

    impl PersistenceSink for CollectingSink {
        fn write(&mut self, results: &[QualifiedResult], _dir: &Path) -> AppResult<Duration> {
            if let Ok(mut batches) = self.0.lock() {
                batches.push(results.iter().map(|r| r.timestamp_us).collect());
            }
            Ok(Duration::from_micros(50))
        }
    }

    struct FailingSink;

    impl PersistenceSink for FailingSink {
        fn write(&mut self, _results: &[QualifiedResult], _dir: &Path) -> AppResult<Duration> {
            Err(CytoError::Storage("disk full".into()))
        }
    }

    fn state(batch: usize) -> Arc<PipelineState> {
        let geometry = FrameGeometry {
            width: 4,
            height: 4,
        };
        Arc::new(PipelineState::new(
            &PipelineSettings {
                frame_buffer_count: 8,
                metrics_buffer_count: 8,
                result_batch_size: batch,
                latency_threshold_us: 200.0,
                target_fps: 1000,
                metrics_interval: Duration::from_millis(100),
            },
            ProcessingConfig::default(),
            geometry,
            Roi::full_frame(geometry),
        ))
    }

    fn result(ts: u64) -> QualifiedResult {
        QualifiedResult {
            timestamp_us: ts,
            deformability: 0.1,
            area: 40.0,
            frame: Vec::new(),
        }
    }

    #[test]
    fn every_result_persisted_exactly_once() {
        let st = state(3);
        let batches = Arc::new(Mutex::new(Vec::new()));
        let sink = CollectingSink(Arc::clone(&batches));

        let st2 = Arc::clone(&st);
        let handle =
            thread::spawn(move || run(st2, Box::new(sink), PathBuf::from("/tmp/unused")));

        // Two full batches plus a partial one left at shutdown.
        for ts in 1..=7 {
            st.append_qualified(result(ts));
            thread::sleep(Duration::from_millis(5));
        }
        thread::sleep(Duration::from_millis(50));
        st.mark_processing_finished();
        st.request_shutdown();
        handle.join().unwrap().unwrap();

        let batches = batches.lock().unwrap();
        let flat: Vec<u64> = batches.iter().flatten().copied().collect();
        assert_eq!(flat, vec![1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0], vec![1, 2, 3]);
        assert_eq!(batches[1], vec![4, 5, 6]);
        assert_eq!(batches[2], vec![7]);
        assert_eq!(st.buffered_results(), 0);
        assert!(st.total_save_time() >= Duration::from_micros(100));
    }

    #[test]
    fn write_failure_is_counted_not_fatal() {
        let st = state(2);
        let st2 = Arc::clone(&st);
        let handle =
            thread::spawn(move || run(st2, Box::new(FailingSink), PathBuf::from("/tmp/unused")));

        st.append_qualified(result(1));
        st.append_qualified(result(2));
        thread::sleep(Duration::from_millis(50));
        st.mark_processing_finished();
        st.request_shutdown();
        handle.join().unwrap().unwrap();

        assert!(st.storage_failures() >= 1);
    }
}
