//! Contour shape metrics.
//!
//! Deformability is defined from circularity:
//!
//! ```text
//! circularity   = 4π · area / perimeter²
//! deformability = 1 − circularity, clamped at 0
//! ```
//!
//! A perfect circle has circularity 1 and deformability 0; elongated or
//! irregular shapes score higher. Discretized circles can exceed circularity 1
//! slightly, hence the clamp.

use crate::core::{Contour, Point};

/// Shape metrics for one closed contour.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShapeMetrics {
    /// 1 − circularity, clamped at 0.
    pub deformability: f64,
    /// Enclosed area in square pixels (shoelace).
    pub area: f64,
    /// Boundary length in pixels.
    pub perimeter: f64,
}

/// Enclosed area of a closed contour via the shoelace formula.
/// Orientation-independent (absolute value).
pub fn polygon_area(contour: &Contour) -> f64 {
    if contour.len() < 3 {
        return 0.0;
    }
    let mut twice_area = 0.0;
    for (i, p) in contour.iter().enumerate() {
        let q = &contour[(i + 1) % contour.len()];
        twice_area += p.x * q.y - q.x * p.y;
    }
    (twice_area / 2.0).abs()
}

/// Boundary length of a closed contour, including the closing segment.
pub fn polygon_perimeter(contour: &Contour) -> f64 {
    if contour.len() < 2 {
        return 0.0;
    }
    let mut length = 0.0;
    for (i, p) in contour.iter().enumerate() {
        let q = &contour[(i + 1) % contour.len()];
        length += ((q.x - p.x).powi(2) + (q.y - p.y).powi(2)).sqrt();
    }
    length
}

/// Compute deformability, area, and perimeter for one contour.
///
/// Returns `None` for degenerate contours (fewer than 3 points, or zero
/// perimeter), which can never qualify anyway.
pub fn calculate_metrics(contour: &Contour) -> Option<ShapeMetrics> {
    if contour.len() < 3 {
        return None;
    }
    let area = polygon_area(contour);
    let perimeter = polygon_perimeter(contour);
    if perimeter <= f64::EPSILON {
        return None;
    }
    let circularity = 4.0 * std::f64::consts::PI * area / (perimeter * perimeter);
    Some(ShapeMetrics {
        deformability: (1.0 - circularity).max(0.0),
        area,
        perimeter,
    })
}

/// Analytic circle contour, used by tests and the synthetic frame source.
pub fn circle_contour(cx: f64, cy: f64, radius: f64, points: usize) -> Contour {
    (0..points)
        .map(|i| {
            let theta = 2.0 * std::f64::consts::PI * (i as f64) / (points as f64);
            Point {
                x: cx + radius * theta.cos(),
                y: cy + radius * theta.sin(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Circle stretched horizontally by (1 + d) and shrunk vertically by the
    /// same factor, keeping the area constant.
    fn stretched_circle(radius: f64, d: f64, points: usize) -> Contour {
        circle_contour(0.0, 0.0, radius, points)
            .into_iter()
            .map(|p| Point {
                x: p.x * (1.0 + d),
                y: p.y / (1.0 + d),
            })
            .collect()
    }

    #[test]
    fn circle_has_near_zero_deformability() {
        let contour = circle_contour(100.0, 100.0, 50.0, 360);
        let m = calculate_metrics(&contour).unwrap();

        assert!(
            m.deformability.abs() < 0.1,
            "deformability {} not near 0",
            m.deformability
        );
        let expected_area = std::f64::consts::PI * 50.0 * 50.0;
        assert!(
            (m.area - expected_area).abs() / expected_area < 0.10,
            "area {} vs expected {}",
            m.area,
            expected_area
        );
    }

    #[test]
    fn deformability_grows_with_stretch() {
        let mut previous = -1.0;
        for d in [0.0, 0.1, 0.2, 0.4, 0.8] {
            let m = calculate_metrics(&stretched_circle(50.0, d, 360)).unwrap();
            assert!(
                m.deformability >= previous,
                "deformability dropped at stretch {}: {} < {}",
                d,
                m.deformability,
                previous
            );
            previous = m.deformability;
        }
    }

    #[test]
    fn degenerate_contours_yield_nothing() {
        assert!(calculate_metrics(&vec![]).is_none());
        assert!(calculate_metrics(&vec![Point { x: 1.0, y: 1.0 }; 2]).is_none());
        // Three coincident points: zero perimeter.
        assert!(calculate_metrics(&vec![Point { x: 5.0, y: 5.0 }; 3]).is_none());
    }

    #[test]
    fn deformability_never_negative() {
        // A coarse discretized circle can push circularity past 1.
        let m = calculate_metrics(&circle_contour(0.0, 0.0, 3.0, 8)).unwrap();
        assert!(m.deformability >= 0.0);
    }

    #[test]
    fn square_area_and_perimeter_are_exact() {
        let square = vec![
            Point { x: 0.0, y: 0.0 },
            Point { x: 10.0, y: 0.0 },
            Point { x: 10.0, y: 10.0 },
            Point { x: 0.0, y: 10.0 },
        ];
        assert_eq!(polygon_area(&square), 100.0);
        assert_eq!(polygon_perimeter(&square), 40.0);
    }
}
