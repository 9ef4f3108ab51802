//! Contour qualification policy.
//!
//! Border handling works at two levels. A frame whose foreground mask
//! reaches the ROI's left or right edge column is skipped outright before
//! contour extraction: the straddling object is only partially in view, and
//! flow moves cells along the channel axis, so anything sharing the frame
//! with it is suspect too. Per contour, retention then requires the point
//! count to lie inside the configured
//! `[contour_threshold_min, contour_threshold_max]` band (too few points is
//! noise, too many is a clump or smear) and no vertex on those same edge
//! columns.

use crate::config::ProcessingConfig;
use crate::core::{Contour, Mask, Roi};

/// Whether any foreground pixel sits on the ROI's left or right edge column.
/// A hit disqualifies the whole frame and skips contour extraction.
pub fn mask_touches_roi_border(mask: &Mask, roi: &Roi) -> bool {
    let left = roi.x;
    let right = roi.right_column();
    let y_end = (roi.y + roi.height).min(mask.height);
    (roi.y..y_end)
        .any(|y| mask.at(left, y) == Mask::FOREGROUND || mask.at(right, y) == Mask::FOREGROUND)
}

/// Whether any vertex lies on the ROI's left or right edge column.
pub fn touches_roi_border(contour: &Contour, roi: &Roi) -> bool {
    let left = roi.x as f64;
    let right = roi.right_column() as f64;
    contour.iter().any(|p| p.x <= left || p.x >= right)
}

/// Whether a contour passes the qualification policy.
pub fn qualifies(contour: &Contour, roi: &Roi, config: &ProcessingConfig) -> bool {
    let n = contour.len();
    if n < config.contour_threshold_min || n > config.contour_threshold_max {
        return false;
    }
    !touches_roi_border(contour, roi)
}
