//! Cardinal spline through a sequence of points.
//!
//! Each pair of neighbours `p1 → p2` becomes one cubic Bézier segment with
//! control points derived from the surrounding points:
//!
//! ```text
//! cp1 = p1 + (p2 − p0) / 6 · tension
//! cp2 = p2 − (p3 − p1) / 6 · tension
//! ```
//!
//! At the ends the missing neighbour is the endpoint itself (`p0 = p1` on
//! the first segment, `p3 = p2` on the last).

use crate::point::Point;
use crate::render::Path;

/// One cubic Bézier segment ending at `to`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubicSegment {
    pub cp1: Point,
    pub cp2: Point,
    pub to: Point,
}

/// Segments joining consecutive `points`. Empty for fewer than two points.
#[must_use]
pub fn segments(points: &[Point], tension: f64) -> Vec<CubicSegment> {
    let Some(last) = points.len().checked_sub(1) else {
        return Vec::new();
    };

    (0..last)
        .map(|i| {
            let p0 = points[i.saturating_sub(1)];
            let p1 = points[i];
            let p2 = points[i + 1];
            let p3 = points[(i + 2).min(last)];

            CubicSegment {
                cp1: Point::new(
                    p1.x + (p2.x - p0.x) / 6.0 * tension,
                    p1.y + (p2.y - p0.y) / 6.0 * tension,
                ),
                cp2: Point::new(
                    p2.x - (p3.x - p1.x) / 6.0 * tension,
                    p2.y - (p3.y - p1.y) / 6.0 * tension,
                ),
                to: p2,
            }
        })
        .collect()
}

/// Open path starting at the first point and following the spline.
///
/// Returns `None` for fewer than two points; there is no curve to draw.
#[must_use]
pub fn curve_path(points: &[Point], tension: f64) -> Option<Path> {
    if points.len() < 2 {
        return None;
    }
    let mut path = Path::new();
    path.move_to(points[0]);
    for seg in segments(points, tension) {
        path.cubic_to(seg.cp1, seg.cp2, seg.to);
    }
    Some(path)
}

#[cfg(test)]
#[path = "spline_test.rs"]
mod spline_test;
