//! Per-frame image analysis: filtering, contour extraction, shape metrics,
//! and the qualification policy that decides which contours are retained.
pub mod ops;
pub mod qualify;
pub mod shape;

pub use ops::CpuImageOps;
pub use qualify::{mask_touches_roi_border, qualifies};
pub use shape::{calculate_metrics, ShapeMetrics};
