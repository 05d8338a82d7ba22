//! Rendering: draws one frame of the graph onto a [`Surface`].
//!
//! [`draw_frame`] is the only place that advances the animation. Per frame,
//! in order: clear, relax and evict ([`Window::step`]), draw a dot per point,
//! then (with at least two points) fill the area under the spline with the
//! vertical gradient and stroke the spline itself.
//!
//! Surfaces are infallible sinks; a backend that can fail records the failure
//! itself and reports it when its output is collected.

use crate::consts::{GRADIENT_END_Y, GRADIENT_TOP_ALPHA, POINT_RADIUS, STROKE_WIDTH, TENSION};
use crate::point::Point;
use crate::spline;
use crate::window::{Viewport, Window};

// =============================================================================
// PAINT
// =============================================================================

/// Straight-alpha colour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    /// Opacity in `0.0..=1.0`.
    pub a: f64,
}

impl Rgba {
    pub const WHITE: Self = Self::new(255, 255, 255, 1.0);
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0.0);

    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8, a: f64) -> Self {
        Self { r, g, b, a }
    }
}

/// Linear gradient in viewport coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradient {
    pub from: Point,
    pub to: Point,
    /// `(offset, colour)` pairs, offsets in `0.0..=1.0`, ascending.
    pub stops: Vec<(f64, Rgba)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Paint {
    Solid(Rgba),
    Linear(Gradient),
}

/// Fill under the curve: translucent white fading to nothing.
#[must_use]
pub fn area_gradient() -> Gradient {
    Gradient {
        from: Point::new(0.0, 0.0),
        to: Point::new(0.0, GRADIENT_END_Y),
        stops: vec![(0.0, Rgba::new(255, 255, 255, GRADIENT_TOP_ALPHA)), (1.0, Rgba::TRANSPARENT)],
    }
}

// =============================================================================
// PATH
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathOp {
    MoveTo(Point),
    LineTo(Point),
    CubicTo { cp1: Point, cp2: Point, to: Point },
    Close,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Path {
    ops: Vec<PathOp>,
}

impl Path {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn move_to(&mut self, p: Point) {
        self.ops.push(PathOp::MoveTo(p));
    }

    pub fn line_to(&mut self, p: Point) {
        self.ops.push(PathOp::LineTo(p));
    }

    pub fn cubic_to(&mut self, cp1: Point, cp2: Point, to: Point) {
        self.ops.push(PathOp::CubicTo { cp1, cp2, to });
    }

    pub fn close(&mut self) {
        self.ops.push(PathOp::Close);
    }

    #[must_use]
    pub fn ops(&self) -> &[PathOp] {
        &self.ops
    }
}

// =============================================================================
// SURFACE
// =============================================================================

/// Drawing backend.
pub trait Surface {
    /// Start a new frame covering `viewport`.
    fn clear(&mut self, viewport: Viewport);
    fn fill_circle(&mut self, center: Point, radius: f64, color: Rgba);
    fn fill_path(&mut self, path: &Path, paint: &Paint);
    fn stroke_path(&mut self, path: &Path, color: Rgba, width: f64);
}

// =============================================================================
// FRAME
// =============================================================================

/// Advance the animation one frame and draw it.
pub fn draw_frame(window: &mut Window, surface: &mut impl Surface) {
    let viewport = window.viewport();
    surface.clear(viewport);
    window.step();

    let positions = window.positions();
    for &p in &positions {
        surface.fill_circle(p, POINT_RADIUS, Rgba::WHITE);
    }

    let Some(curve) = spline::curve_path(&positions, TENSION) else {
        return;
    };

    surface.fill_path(&area_path(&curve, &positions, viewport), &Paint::Linear(area_gradient()));
    surface.stroke_path(&curve, Rgba::WHITE, STROKE_WIDTH);
}

/// Close the curve down to the bottom edge: right corner, then under the first point.
fn area_path(curve: &Path, positions: &[Point], viewport: Viewport) -> Path {
    let mut area = curve.clone();
    area.line_to(Point::new(viewport.width, viewport.height));
    if let Some(first) = positions.first() {
        area.line_to(Point::new(first.x, viewport.height));
    }
    area.close();
    area
}

#[cfg(test)]
#[path = "render_test.rs"]
mod render_test;
