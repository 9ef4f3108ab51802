//! Shared state wiring the pipeline stages together.
//!
//! One [`PipelineState`] instance, held in an `Arc`, is the only channel
//! between the stage threads. The locking discipline is deliberately coarse
//! and uniform:
//!
//! - fast flags and counters are atomics,
//! - each work queue is a `Mutex<VecDeque<u64>>` paired with its own condvar,
//! - the double-buffered result bank is one mutex plus one condvar,
//! - everything else (ROI, live config, latest metrics) sits behind its own
//!   small mutex or rwlock with copy-out semantics.
//!
//! Shutdown is a single protocol: set `done`, then `notify_all` on every
//! condvar so no consumer stays parked on an empty queue. Every notify is
//! issued while holding the condvar's mutex, so a waiter sitting between its
//! predicate check and its `wait` cannot miss the wakeup.

use crate::config::{PipelineSettings, ProcessingConfig};
use crate::core::{AcquiredFrame, DeformabilitySample, FrameGeometry, Mask, QualifiedResult, Roi};
use crate::data::ring_buffer::RingBuffer;
use crate::metrics::MetricsSnapshot;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, RwLock};
use std::time::Duration;

/// One unit of work handed to a stage thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageWork {
    /// Analyze or display the frame with this id.
    Frame(u64),
    /// A control input (pause, cursor move, export request) needs servicing
    /// even though no new frame arrived.
    Control,
}

/// A frame-id queue with its own condvar. Producers push and wake one
/// consumer; consumers park while empty unless the pipeline is done.
pub struct WorkQueue {
    queue: Mutex<VecDeque<u64>>,
    cv: Condvar,
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            cv: Condvar::new(),
        }
    }

    /// Enqueue a frame id and wake one waiting consumer.
    pub fn push(&self, frame_id: u64) {
        let mut q = match self.queue.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        q.push_back(frame_id);
        self.cv.notify_one();
    }

    /// Block until there is work or `done` is set. A raised `control` flag
    /// takes priority over queued frames so control inputs are serviced
    /// promptly; the caller must consume the flag before waiting again.
    /// Returns `None` when done with nothing queued; a consumer that must
    /// exit promptly re-checks `done` between work items itself.
    pub fn pop_wait(&self, done: &AtomicBool, control: &AtomicBool) -> Option<StageWork> {
        let mut q = match self.queue.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        loop {
            if control.load(Ordering::Acquire) {
                return Some(StageWork::Control);
            }
            if let Some(id) = q.pop_front() {
                return Some(StageWork::Frame(id));
            }
            if done.load(Ordering::Acquire) {
                return None;
            }
            q = match self.cv.wait(q) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    /// Pop without blocking. Used by the display stage to skip to the
    /// newest queued frame.
    pub fn try_pop(&self) -> Option<u64> {
        let mut q = match self.queue.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        q.pop_front()
    }

    /// Current queue depth.
    pub fn len(&self) -> usize {
        match self.queue.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wake every waiter. The queue mutex is taken first so a consumer
    /// between its predicate check and its `wait` still receives this.
    fn notify_all(&self) {
        let _q = match self.queue.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.cv.notify_all();
    }
}

struct BankInner {
    buffers: [Vec<QualifiedResult>; 2],
    /// Index of the buffer currently accepting appends.
    active: usize,
    /// A swapped-out buffer is awaiting (or undergoing) persistence.
    saving: bool,
}

/// Everything the stage threads share.
pub struct PipelineState {
    /// Frame geometry, fixed for the run.
    pub geometry: FrameGeometry,

    // Control flags.
    done: AtomicBool,
    paused: AtomicBool,
    recording: AtomicBool,
    overlay_enabled: AtomicBool,
    background_requested: AtomicBool,
    export_requested: AtomicBool,
    display_needs_update: AtomicBool,
    processing_finished: AtomicBool,

    /// Review cursor while paused: offset back from the newest frame.
    current_frame_index: AtomicUsize,
    /// Latest FPS estimate, f64 bit pattern.
    current_fps_bits: AtomicU64,

    // Since-startup counters.
    frames_acquired: AtomicU64,
    frames_incomplete: AtomicU64,
    frames_duplicate: AtomicU64,
    frames_processed: AtomicU64,
    samples_qualified: AtomicU64,
    results_recorded: AtomicU64,
    processing_failures: AtomicU64,
    storage_failures: AtomicU64,

    /// The bounded frame store all consumers read from.
    pub frame_ring: RingBuffer<AcquiredFrame>,
    /// Frame ids awaiting analysis.
    pub processing_queue: WorkQueue,
    /// Frame ids awaiting display.
    pub display_queue: WorkQueue,

    /// Recent per-frame processing times, µs.
    pub processing_times: RingBuffer<f64>,
    /// Recent qualifying deformability/area samples, for live plots.
    pub deformability_ring: RingBuffer<DeformabilitySample>,

    roi: Mutex<Roi>,
    processing_config: RwLock<ProcessingConfig>,
    latest_metrics: Mutex<MetricsSnapshot>,
    latest_mask: Mutex<Option<Mask>>,
    save_times: Mutex<(Duration, Duration)>, // (total, last)

    bank: Mutex<BankInner>,
    save_cv: Condvar,
    batch_size: usize,

    /// High-latency threshold for metrics, µs.
    pub latency_threshold_us: f64,
}

impl PipelineState {
    /// Build the shared state from pipeline settings and the initial ROI.
    pub fn new(
        settings: &PipelineSettings,
        config: ProcessingConfig,
        geometry: FrameGeometry,
        roi: Roi,
    ) -> Self {
        Self {
            geometry,
            done: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            recording: AtomicBool::new(false),
            overlay_enabled: AtomicBool::new(false),
            background_requested: AtomicBool::new(false),
            export_requested: AtomicBool::new(false),
            display_needs_update: AtomicBool::new(false),
            processing_finished: AtomicBool::new(false),
            current_frame_index: AtomicUsize::new(0),
            current_fps_bits: AtomicU64::new(0f64.to_bits()),
            frames_acquired: AtomicU64::new(0),
            frames_incomplete: AtomicU64::new(0),
            frames_duplicate: AtomicU64::new(0),
            frames_processed: AtomicU64::new(0),
            samples_qualified: AtomicU64::new(0),
            results_recorded: AtomicU64::new(0),
            processing_failures: AtomicU64::new(0),
            storage_failures: AtomicU64::new(0),
            frame_ring: RingBuffer::new(settings.frame_buffer_count),
            processing_queue: WorkQueue::new(),
            display_queue: WorkQueue::new(),
            processing_times: RingBuffer::new(settings.metrics_buffer_count),
            deformability_ring: RingBuffer::new(settings.metrics_buffer_count),
            roi: Mutex::new(roi),
            processing_config: RwLock::new(config),
            latest_metrics: Mutex::new(MetricsSnapshot::default()),
            latest_mask: Mutex::new(None),
            save_times: Mutex::new((Duration::ZERO, Duration::ZERO)),
            bank: Mutex::new(BankInner {
                buffers: [Vec::new(), Vec::new()],
                active: 0,
                saving: false,
            }),
            save_cv: Condvar::new(),
            batch_size: settings.result_batch_size,
            latency_threshold_us: settings.latency_threshold_us,
        }
    }

    // --- shutdown -------------------------------------------------------

    /// Set the done flag and wake every parked consumer. Each notify is
    /// issued under the matching mutex so the wakeup cannot land in the gap
    /// between a waiter's done check and its wait.
    pub fn request_shutdown(&self) {
        self.done.store(true, Ordering::Release);
        self.processing_queue.notify_all();
        self.display_queue.notify_all();
        let _bank = match self.bank.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.save_cv.notify_all();
    }

    /// Whether shutdown has been requested.
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Block for the next unit of processing work; `None` means shut down.
    /// A pending export request surfaces as [`StageWork::Control`].
    pub fn wait_processing_work(&self) -> Option<StageWork> {
        self.processing_queue.pop_wait(&self.done, &self.export_requested)
    }

    /// Block for the next unit of display work; `None` means shut down.
    /// A dirty view surfaces as [`StageWork::Control`], so control inputs
    /// re-render even while acquisition is paused and no frames arrive.
    pub fn wait_display_work(&self) -> Option<StageWork> {
        self.display_queue.pop_wait(&self.done, &self.display_needs_update)
    }

    /// Mark the processing stage as having drained its queue and exited.
    /// Gates the persistence stage's final flush, so no result appended
    /// during shutdown can slip past it.
    pub fn mark_processing_finished(&self) {
        self.processing_finished.store(true, Ordering::Release);
    }

    /// Whether the processing stage has exited.
    pub fn processing_finished(&self) -> bool {
        self.processing_finished.load(Ordering::Acquire)
    }

    // --- control flags --------------------------------------------------

    /// Pause or resume the live view. Entering pause resets the review
    /// cursor to the newest frame.
    pub fn set_paused(&self, paused: bool) {
        if paused {
            self.current_frame_index.store(0, Ordering::Release);
        }
        self.paused.store(paused, Ordering::Release);
        self.mark_display_dirty();
    }

    /// Whether the live view is paused.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Enable or disable retention of qualified results.
    pub fn set_recording(&self, recording: bool) {
        self.recording.store(recording, Ordering::Release);
    }

    /// Whether qualified results are being retained.
    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    /// Toggle the foreground-mask overlay on the display.
    pub fn set_overlay(&self, enabled: bool) {
        self.overlay_enabled.store(enabled, Ordering::Release);
        self.mark_display_dirty();
    }

    /// Whether the mask overlay is enabled.
    pub fn overlay_enabled(&self) -> bool {
        self.overlay_enabled.load(Ordering::Acquire)
    }

    /// Ask the processing stage to adopt the latest frame as background.
    pub fn request_background_capture(&self) {
        self.background_requested.store(true, Ordering::Release);
    }

    /// Consume a pending background-capture request.
    pub fn take_background_request(&self) -> bool {
        self.background_requested.swap(false, Ordering::AcqRel)
    }

    /// Ask for a full frame-ring export and wake the processing stage in
    /// case it is parked on an empty queue.
    pub fn request_export(&self) {
        self.export_requested.store(true, Ordering::Release);
        self.processing_queue.notify_all();
    }

    /// Consume a pending export request.
    pub fn take_export_request(&self) -> bool {
        self.export_requested.swap(false, Ordering::AcqRel)
    }

    /// Flag the display for a redraw outside the normal frame flow and wake
    /// it in case it is parked on an empty queue.
    pub fn mark_display_dirty(&self) {
        self.display_needs_update.store(true, Ordering::Release);
        self.display_queue.notify_all();
    }

    /// Consume the display-dirty flag.
    pub fn take_display_dirty(&self) -> bool {
        self.display_needs_update.swap(false, Ordering::AcqRel)
    }

    // --- review cursor and fps -----------------------------------------

    /// Move the paused-review cursor; clamped to the ring size by readers.
    pub fn set_review_index(&self, index: usize) {
        self.current_frame_index.store(index, Ordering::Release);
        self.mark_display_dirty();
    }

    /// Current paused-review cursor (0 = newest).
    pub fn review_index(&self) -> usize {
        self.current_frame_index.load(Ordering::Acquire)
    }

    /// Publish a new FPS estimate.
    pub fn set_fps(&self, fps: f64) {
        self.current_fps_bits.store(fps.to_bits(), Ordering::Release);
    }

    /// Latest published FPS estimate.
    pub fn fps(&self) -> f64 {
        f64::from_bits(self.current_fps_bits.load(Ordering::Acquire))
    }

    // --- counters -------------------------------------------------------

    /// Count one frame accepted from the source.
    pub fn count_frame_acquired(&self) {
        self.frames_acquired.fetch_add(1, Ordering::Relaxed);
    }

    /// Frames accepted from the source since startup.
    pub fn frames_acquired(&self) -> u64 {
        self.frames_acquired.load(Ordering::Relaxed)
    }

    /// Count one incomplete-transfer skip.
    pub fn count_frame_incomplete(&self) {
        self.frames_incomplete.fetch_add(1, Ordering::Relaxed);
    }

    /// Incomplete frames skipped since startup.
    pub fn frames_incomplete(&self) -> u64 {
        self.frames_incomplete.load(Ordering::Relaxed)
    }

    /// Count one duplicate-delivery skip.
    pub fn count_frame_duplicate(&self) {
        self.frames_duplicate.fetch_add(1, Ordering::Relaxed);
    }

    /// Duplicate frames skipped since startup.
    pub fn frames_duplicate(&self) -> u64 {
        self.frames_duplicate.load(Ordering::Relaxed)
    }

    /// Count one analyzed frame.
    pub fn count_frame_processed(&self) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Frames analyzed since startup.
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::Relaxed)
    }

    /// Count one qualifying contour, recorded or not.
    pub fn count_sample_qualified(&self) {
        self.samples_qualified.fetch_add(1, Ordering::Relaxed);
    }

    /// Qualifying contours seen since startup, recorded or not.
    pub fn samples_qualified(&self) -> u64 {
        self.samples_qualified.load(Ordering::Relaxed)
    }

    /// Qualified results retained since startup.
    pub fn results_recorded(&self) -> u64 {
        self.results_recorded.load(Ordering::Relaxed)
    }

    /// Count one recoverable per-frame analysis failure.
    pub fn count_processing_failure(&self) {
        self.processing_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Analysis failures since startup.
    pub fn processing_failures(&self) -> u64 {
        self.processing_failures.load(Ordering::Relaxed)
    }

    /// Count one persistence write failure.
    pub fn count_storage_failure(&self) {
        self.storage_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Persistence failures since startup.
    pub fn storage_failures(&self) -> u64 {
        self.storage_failures.load(Ordering::Relaxed)
    }

    // --- roi / config / metrics (copy-out) ------------------------------

    /// Current region of interest.
    pub fn roi(&self) -> Roi {
        match self.roi.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Replace the region of interest.
    pub fn set_roi(&self, roi: Roi) {
        let mut guard = match self.roi.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = roi;
    }

    /// Copy of the live analysis config; pulled once per frame.
    pub fn processing_config(&self) -> ProcessingConfig {
        match self.processing_config.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Install a new analysis config; takes effect on the next frame.
    pub fn set_processing_config(&self, config: ProcessingConfig) {
        let mut guard = match self.processing_config.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = config;
    }

    /// Publish a metrics snapshot.
    pub fn set_metrics(&self, snapshot: MetricsSnapshot) {
        let mut guard = match self.latest_metrics.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = snapshot;
    }

    /// Copy of the latest metrics snapshot.
    pub fn metrics(&self) -> MetricsSnapshot {
        match self.latest_metrics.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Publish the foreground mask of the most recently analyzed frame.
    pub fn set_latest_mask(&self, mask: Mask) {
        let mut guard = match self.latest_mask.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(mask);
    }

    /// Copy of the most recent foreground mask, for the display overlay.
    pub fn latest_mask(&self) -> Option<Mask> {
        match self.latest_mask.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Record one persistence write's elapsed time.
    pub fn add_save_time(&self, elapsed: Duration) {
        let mut guard = match self.save_times.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.0 += elapsed;
        guard.1 = elapsed;
    }

    /// Total time spent in persistence writes.
    pub fn total_save_time(&self) -> Duration {
        match self.save_times.lock() {
            Ok(guard) => guard.0,
            Err(poisoned) => poisoned.into_inner().0,
        }
    }

    /// Duration of the most recent persistence write.
    pub fn last_save_time(&self) -> Duration {
        match self.save_times.lock() {
            Ok(guard) => guard.1,
            Err(poisoned) => poisoned.into_inner().1,
        }
    }

    // --- double-buffered result bank ------------------------------------

    /// Append one qualified result to the active buffer.
    ///
    /// When the active buffer reaches the batch size and no save is in
    /// flight, the buffers swap and the persistence thread is woken. If a
    /// save is still running the swap is deferred; the active buffer keeps
    /// growing and the check repeats on the next append, so no result is
    /// ever dropped or handed over twice.
    ///
    /// Returns true when this append triggered a swap.
    pub fn append_qualified(&self, result: QualifiedResult) -> bool {
        let mut bank = match self.bank.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let active = bank.active;
        bank.buffers[active].push(result);
        self.results_recorded.fetch_add(1, Ordering::Relaxed);

        if bank.buffers[active].len() >= self.batch_size && !bank.saving {
            bank.active = 1 - active;
            bank.saving = true;
            self.save_cv.notify_one();
            return true;
        }
        false
    }

    /// Block until a swapped-out batch is ready or shutdown is requested.
    ///
    /// Returns `Some(batch)` with the full buffer's contents; `None` when
    /// shutting down with no batch pending.
    pub fn wait_save_batch(&self) -> Option<Vec<QualifiedResult>> {
        let mut bank = match self.bank.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        loop {
            if bank.saving {
                let inactive = 1 - bank.active;
                return Some(std::mem::take(&mut bank.buffers[inactive]));
            }
            if self.is_done() {
                return None;
            }
            bank = match self.save_cv.wait(bank) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    /// Mark the in-flight save finished, re-enabling buffer swaps.
    pub fn finish_save(&self) {
        let mut bank = match self.bank.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        bank.saving = false;
    }

    /// Drain every result still held in the bank, active buffer included.
    /// Shutdown-only; ordinary saves go through [`Self::wait_save_batch`].
    pub fn drain_remaining_results(&self) -> Vec<QualifiedResult> {
        let mut bank = match self.bank.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        bank.saving = false;
        let mut out = std::mem::take(&mut bank.buffers[0]);
        out.append(&mut bank.buffers[1]);
        out
    }

    /// Number of results currently buffered (both banks).
    pub fn buffered_results(&self) -> usize {
        let bank = match self.bank.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        bank.buffers[0].len() + bank.buffers[1].len()
    }
}
