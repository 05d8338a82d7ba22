//! Test surface that records draw calls instead of producing pixels, so
//! tests here and in the viewer can assert on what a frame drew.

use crate::point::Point;
use crate::render::{Paint, Path, Rgba, Surface};
use crate::window::Viewport;

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCall {
    Clear(Viewport),
    Circle { center: Point, radius: f64, color: Rgba },
    Fill { path: Path, paint: Paint },
    Stroke { path: Path, color: Rgba, width: f64 },
}

#[derive(Debug, Clone, Default)]
pub struct Recorder {
    calls: Vec<DrawCall>,
    frames: usize,
}

impl Recorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls made since the most recent `clear`.
    #[must_use]
    pub fn calls(&self) -> &[DrawCall] {
        &self.calls
    }

    /// Number of frames started.
    #[must_use]
    pub fn frames(&self) -> usize {
        self.frames
    }

    #[must_use]
    pub fn circles(&self) -> Vec<Point> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                DrawCall::Circle { center, .. } => Some(*center),
                _ => None,
            })
            .collect()
    }
}

impl Surface for Recorder {
    fn clear(&mut self, viewport: Viewport) {
        self.calls.clear();
        self.calls.push(DrawCall::Clear(viewport));
        self.frames += 1;
    }

    fn fill_circle(&mut self, center: Point, radius: f64, color: Rgba) {
        self.calls.push(DrawCall::Circle { center, radius, color });
    }

    fn fill_path(&mut self, path: &Path, paint: &Paint) {
        self.calls.push(DrawCall::Fill { path: path.clone(), paint: paint.clone() });
    }

    fn stroke_path(&mut self, path: &Path, color: Rgba, width: f64) {
        self.calls.push(DrawCall::Stroke { path: path.clone(), color, width });
    }
}
