//! Sliding window of graph points.
//!
//! Points are kept in arrival order, which is also left-to-right order: every
//! new reading shifts all targets one spacing to the left and enters at the
//! right edge. Only targets jump; drawn positions ease toward them one
//! [`DAMPING`] step per frame, which is what makes the scroll smooth.
//!
//! The head is evicted once its drawn position has scrolled a full spacing
//! past the left edge, so the curve leaving the viewport never shows a gap.

use std::collections::VecDeque;

use crate::consts::{DAMPING, SCALE_Y, SPACING_X, VIEWPORT_HEIGHT, VIEWPORT_WIDTH};
use crate::point::Point;

/// Drawable area in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    #[must_use]
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self { width: VIEWPORT_WIDTH, height: VIEWPORT_HEIGHT }
    }
}

/// One reading on the graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphPoint {
    /// Where the point is drawn this frame.
    pub position: Point,
    /// Where the point is heading.
    pub target: Point,
}

impl GraphPoint {
    /// A point that starts at rest on its target.
    #[must_use]
    pub fn at(target: Point) -> Self {
        Self { position: target, target }
    }

    fn relax(&mut self, damping: f64) {
        self.position = self.position.approach(self.target, damping);
    }
}

#[derive(Debug, Clone, Default)]
pub struct Window {
    points: VecDeque<GraphPoint>,
    viewport: Viewport,
}

impl Window {
    #[must_use]
    pub fn new(viewport: Viewport) -> Self {
        Self { points: VecDeque::new(), viewport }
    }

    /// Shift every target left by one spacing and append `value` at the right edge.
    pub fn push_reading(&mut self, value: u8) {
        for point in &mut self.points {
            point.target = point.target.offset(-SPACING_X, 0.0);
        }
        let target = Point::new(self.viewport.width, f64::from(value) * SCALE_Y);
        self.points.push_back(GraphPoint::at(target));
    }

    /// Advance one frame: relax every point, then evict scrolled-off heads.
    ///
    /// Returns how many points were evicted.
    pub fn step(&mut self) -> usize {
        for point in &mut self.points {
            point.relax(DAMPING);
        }

        let mut evicted = 0;
        while self.points.front().is_some_and(|p| p.position.x < -SPACING_X) {
            self.points.pop_front();
            evicted += 1;
        }
        evicted
    }

    #[must_use]
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn points(&self) -> impl ExactSizeIterator<Item = &GraphPoint> {
        self.points.iter()
    }

    /// Drawn positions, left to right.
    #[must_use]
    pub fn positions(&self) -> Vec<Point> {
        self.points.iter().map(|p| p.position).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
#[path = "window_test.rs"]
mod window_test;
