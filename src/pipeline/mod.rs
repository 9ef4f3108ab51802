//! The multi-stage frame pipeline.
//!
//! One dedicated OS thread per stage, all communication through the shared
//! [`state::PipelineState`]:
//!
//! - [`acquisition`] — single producer; ring pushes and queue fan-out.
//! - [`processing`] — filter chain, contour qualification, result retention.
//! - [`display`] — paced consumer; live view and paused review.
//! - [`persistence`] — batch writes from the double-buffered result bank.
//! - the metrics sampler lives in [`crate::metrics`].
//!
//! [`runner::launch`] wires everything up; [`runner::PipelineHandle::join`]
//! tears it down.

pub mod acquisition;
pub mod display;
pub mod persistence;
pub mod processing;
pub mod runner;
pub mod state;
