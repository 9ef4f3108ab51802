//! Pipeline launcher: spawns the stage threads and owns the join protocol.
//!
//! The launcher is the only place that knows about all five stages. It wires
//! the injected capabilities into their threads, hands out the shared state
//! for control surfaces (key handlers, signal hooks), and on join enforces
//! the shutdown order: once any stage exits, `done` is already set and every
//! condvar has been notified, so the remaining joins cannot hang.

use crate::config::Settings;
use crate::core::{DisplaySink, FrameSource, ImageOps, PersistenceSink, Roi};
use crate::error::{AppResult, CytoError};
use crate::metrics::{self, MetricsSnapshot};
use crate::pipeline::state::PipelineState;
use crate::pipeline::{acquisition, display, persistence, processing};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{error, info};

/// Handle to a running pipeline.
pub struct PipelineHandle {
    state: Arc<PipelineState>,
    threads: Vec<(&'static str, JoinHandle<AppResult<()>>)>,
}

impl PipelineHandle {
    /// Shared state, for control surfaces outside the stage threads.
    pub fn state(&self) -> Arc<PipelineState> {
        Arc::clone(&self.state)
    }

    /// Request shutdown without waiting.
    pub fn shutdown(&self) {
        self.state.request_shutdown();
    }

    /// Wait for every stage to finish and return the final metrics.
    ///
    /// The first stage error (in spawn order) wins; a panicked stage maps to
    /// a processing error so the caller still gets a typed result.
    pub fn join(self) -> AppResult<MetricsSnapshot> {
        let mut first_error = None;
        for (name, handle) in self.threads {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(stage = name, error = %e, "Stage exited with error");
                    first_error.get_or_insert(e);
                }
                Err(_) => {
                    error!(stage = name, "Stage panicked");
                    first_error
                        .get_or_insert_with(|| CytoError::Processing(format!("{name} stage panicked")));
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => {
                let mut snapshot = self.state.metrics();
                // Counters may have moved since the last sampler tick.
                snapshot.frames_acquired = self.state.frames_acquired();
                snapshot.frames_incomplete = self.state.frames_incomplete();
                snapshot.frames_duplicate = self.state.frames_duplicate();
                snapshot.frames_processed = self.state.frames_processed();
                snapshot.results_recorded = self.state.results_recorded();
                snapshot.processing_failures = self.state.processing_failures();
                snapshot.storage_failures = self.state.storage_failures();
                snapshot.total_save_time = self.state.total_save_time();
                snapshot.last_save_time = self.state.last_save_time();
                info!(
                    frames = snapshot.frames_processed,
                    results = snapshot.results_recorded,
                    "Pipeline stopped"
                );
                Ok(snapshot)
            }
        }
    }
}

/// Spawn all five stage threads against the given capabilities.
pub fn launch(
    settings: &Settings,
    initial_roi: Roi,
    source: Box<dyn FrameSource>,
    ops: Box<dyn ImageOps>,
    sink: Box<dyn PersistenceSink>,
    display_sink: Box<dyn DisplaySink>,
) -> AppResult<PipelineHandle> {
    let geometry = source.geometry();
    let state = Arc::new(PipelineState::new(
        &settings.pipeline,
        settings.image_processing.clone(),
        geometry,
        initial_roi,
    ));
    let output_dir = settings.storage.output_dir.clone();
    std::fs::create_dir_all(&output_dir)?;

    info!(
        width = geometry.width,
        height = geometry.height,
        frame_buffer = settings.pipeline.frame_buffer_count,
        batch_size = settings.pipeline.result_batch_size,
        "Launching pipeline"
    );

    let mut threads = Vec::with_capacity(5);

    let st = Arc::clone(&state);
    threads.push((
        "acquisition",
        spawn_stage("acquisition", move || acquisition::run(st, source))?,
    ));

    let st = Arc::clone(&state);
    let dir = output_dir.clone();
    threads.push((
        "processing",
        spawn_stage("processing", move || processing::run(st, ops, dir))?,
    ));

    let st = Arc::clone(&state);
    threads.push((
        "display",
        spawn_stage("display", move || display::run(st, display_sink))?,
    ));

    let st = Arc::clone(&state);
    threads.push((
        "persistence",
        spawn_stage("persistence", move || persistence::run(st, sink, output_dir))?,
    ));

    let st = Arc::clone(&state);
    let interval = settings.pipeline.metrics_interval;
    threads.push((
        "metrics",
        spawn_stage("metrics", move || metrics::run_sampler(st, interval))?,
    ));

    Ok(PipelineHandle { state, threads })
}

fn spawn_stage<F>(name: &str, f: F) -> AppResult<JoinHandle<AppResult<()>>>
where
    F: FnOnce() -> AppResult<()> + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map_err(CytoError::Io)
}
