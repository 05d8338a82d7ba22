//! Shared numeric constants for the graph crate.

// ── Layout ──────────────────────────────────────────────────────

/// Horizontal distance between consecutive readings, in pixels.
pub const SPACING_X: f64 = 75.0;

/// Vertical pixels per reading unit.
pub const SCALE_Y: f64 = 4.0;

/// Default viewport width in pixels.
pub const VIEWPORT_WIDTH: f64 = 864.0;

/// Default viewport height in pixels.
pub const VIEWPORT_HEIGHT: f64 = 480.0;

// ── Animation ───────────────────────────────────────────────────

/// Fraction of the remaining distance a point covers each frame.
pub const DAMPING: f64 = 0.1;

/// Target frame interval for hosts driving the render loop (~60 fps).
pub const FRAME_INTERVAL_MS: u64 = 16;

// ── Drawing ─────────────────────────────────────────────────────

/// Cardinal spline tension. 1.0 is a Catmull-Rom curve.
pub const TENSION: f64 = 1.0;

/// Radius of the dot drawn at each point.
pub const POINT_RADIUS: f64 = 8.0;

/// Curve stroke width.
pub const STROKE_WIDTH: f64 = 4.0;

/// The fill gradient runs from y = 0 down to this y.
pub const GRADIENT_END_Y: f64 = 400.0;

/// Opacity at the top of the fill gradient.
pub const GRADIENT_TOP_ALPHA: f64 = 0.4;
