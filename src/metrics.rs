//! Aggregated runtime metrics.
//!
//! The sampler thread wakes on a fixed cadence, drains nothing and blocks
//! nobody: it reads the shared processing-time ring, the shared counters, and
//! the deformability ring, and publishes one [`MetricsSnapshot`] through the
//! shared slot for the display stage (and logs it). Statistics are computed
//! over whatever the rings currently hold, so a snapshot is a sliding-window
//! view, not a since-startup total.

use crate::data::ring_buffer::RingBuffer;
use crate::error::AppResult;
use crate::pipeline::state::PipelineState;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Latency statistics over a window of per-frame processing times.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct LatencyStats {
    /// Mean processing time, µs.
    pub average_us: f64,
    /// Maximum processing time in the window, µs.
    pub max_us: f64,
    /// Minimum processing time in the window, µs.
    pub min_us: f64,
    /// Most recent processing time, µs.
    pub instant_us: f64,
    /// Share of samples above the configured threshold, percent.
    pub high_latency_percent: f64,
}

/// Compute latency statistics over `samples` (µs), oldest first or not —
/// order only matters for `instant_us`, which takes the last element.
pub fn latency_stats(samples: &[f64], threshold_us: f64) -> LatencyStats {
    if samples.is_empty() {
        return LatencyStats::default();
    }
    let mut max = f64::MIN;
    let mut min = f64::MAX;
    let mut sum = 0.0;
    let mut high = 0usize;
    for &s in samples {
        sum += s;
        max = max.max(s);
        min = min.min(s);
        if s > threshold_us {
            high += 1;
        }
    }
    LatencyStats {
        average_us: sum / samples.len() as f64,
        max_us: max,
        min_us: min,
        instant_us: samples[samples.len() - 1],
        high_latency_percent: 100.0 * high as f64 / samples.len() as f64,
    }
}

/// Events-per-second estimator from a monotonically growing counter,
/// measured between consecutive `update` calls.
#[derive(Debug)]
pub struct RateEstimator {
    last_count: u64,
    last_at: Instant,
    rate: f64,
}

impl Default for RateEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl RateEstimator {
    /// Estimator with zero initial rate.
    pub fn new() -> Self {
        Self {
            last_count: 0,
            last_at: Instant::now(),
            rate: 0.0,
        }
    }

    /// Feed the current counter value; returns the updated rate (events/s).
    /// Counter resets (count moving backwards) restart the estimate.
    pub fn update(&mut self, count: u64) -> f64 {
        let now = Instant::now();
        let dt = now.duration_since(self.last_at).as_secs_f64();
        if count < self.last_count {
            self.rate = 0.0;
        } else if dt > 0.0 {
            self.rate = (count - self.last_count) as f64 / dt;
        }
        self.last_count = count;
        self.last_at = now;
        self.rate
    }

    /// Last computed rate without feeding a new sample.
    pub fn current(&self) -> f64 {
        self.rate
    }
}

/// One published metrics snapshot.
#[derive(Clone, Debug, Default, Serialize)]
pub struct MetricsSnapshot {
    /// Processing-latency statistics over the current window.
    pub latency: LatencyStats,
    /// Estimated acquisition rate, frames/s.
    pub fps: f64,
    /// Estimated qualified-result rate, events/s.
    pub deformability_rate: f64,
    /// Frames accepted from the source since startup.
    pub frames_acquired: u64,
    /// Incomplete-transfer skips since startup.
    pub frames_incomplete: u64,
    /// Duplicate-delivery skips since startup.
    pub frames_duplicate: u64,
    /// Frames processed since startup.
    pub frames_processed: u64,
    /// Qualified results recorded since startup.
    pub results_recorded: u64,
    /// Per-frame processing failures since startup.
    pub processing_failures: u64,
    /// Persistence write failures since startup.
    pub storage_failures: u64,
    /// Frame ids awaiting analysis at sample time.
    pub processing_queue_depth: usize,
    /// Frame ids awaiting display at sample time.
    pub display_queue_depth: usize,
    /// Total time spent in persistence writes.
    #[serde(skip)]
    pub total_save_time: Duration,
    /// Duration of the most recent persistence write.
    #[serde(skip)]
    pub last_save_time: Duration,
}

/// Drain-free read of the processing-time ring into a stats window.
pub fn window_stats(ring: &RingBuffer<f64>, threshold_us: f64) -> LatencyStats {
    let samples = ring.snapshot_oldest_first();
    latency_stats(&samples, threshold_us)
}

/// Sleep up to `interval`, returning early once shutdown is requested.
fn sleep_interruptible(state: &PipelineState, interval: Duration) {
    let deadline = Instant::now() + interval;
    while !state.is_done() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return;
        }
        std::thread::sleep(remaining.min(Duration::from_millis(10)));
    }
}

/// Sampler loop: publish one [`MetricsSnapshot`] per interval until shutdown.
///
/// Purely observational. It reads rings and counters without draining
/// anything, so it can die or stall without affecting the data path.
pub fn run_sampler(state: Arc<PipelineState>, interval: Duration) -> AppResult<()> {
    let mut rate = RateEstimator::new();
    info!("Metrics sampler started");
    while !state.is_done() {
        sleep_interruptible(&state, interval);
        if state.is_done() {
            break;
        }
        let latency = window_stats(&state.processing_times, state.latency_threshold_us);
        let snapshot = MetricsSnapshot {
            latency,
            fps: state.fps(),
            deformability_rate: rate.update(state.samples_qualified()),
            frames_acquired: state.frames_acquired(),
            frames_incomplete: state.frames_incomplete(),
            frames_duplicate: state.frames_duplicate(),
            frames_processed: state.frames_processed(),
            results_recorded: state.results_recorded(),
            processing_failures: state.processing_failures(),
            storage_failures: state.storage_failures(),
            processing_queue_depth: state.processing_queue.len(),
            display_queue_depth: state.display_queue.len(),
            total_save_time: state.total_save_time(),
            last_save_time: state.last_save_time(),
        };
        debug!(
            avg_us = snapshot.latency.average_us,
            max_us = snapshot.latency.max_us,
            high_pct = snapshot.latency.high_latency_percent,
            fps = snapshot.fps,
            rate = snapshot.deformability_rate,
            frames = snapshot.frames_processed,
            "Metrics sampled"
        );
        state.set_metrics(snapshot);
    }
    info!("Metrics sampler stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn stats_over_known_window() {
        let stats = latency_stats(&[100.0, 150.0, 250.0, 50.0], 200.0);
        assert_eq!(stats.average_us, 137.5);
        assert_eq!(stats.max_us, 250.0);
        assert_eq!(stats.min_us, 50.0);
        assert_eq!(stats.instant_us, 50.0);
        assert_eq!(stats.high_latency_percent, 25.0);
    }

    #[test]
    fn empty_window_is_all_zero() {
        assert_eq!(latency_stats(&[], 200.0), LatencyStats::default());
    }

    #[test]
    fn rate_estimator_tracks_counter_delta() {
        let mut est = RateEstimator::new();
        thread::sleep(Duration::from_millis(50));
        let rate = est.update(10);
        // 10 events over ~50ms: comfortably between 100/s and 400/s.
        assert!(rate > 100.0 && rate < 400.0, "rate {}", rate);
    }

    #[test]
    fn rate_estimator_survives_counter_reset() {
        let mut est = RateEstimator::new();
        thread::sleep(Duration::from_millis(10));
        est.update(100);
        thread::sleep(Duration::from_millis(10));
        assert_eq!(est.update(5), 0.0);
    }

    #[test]
    fn window_stats_reads_ring_without_draining() {
        let ring = RingBuffer::new(8);
        for v in [100.0, 150.0, 250.0, 50.0] {
            ring.push(v);
        }
        let stats = window_stats(&ring, 200.0);
        assert_eq!(stats.average_us, 137.5);
        assert_eq!(ring.size(), 4);
    }
}
