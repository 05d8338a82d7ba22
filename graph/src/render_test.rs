#![allow(clippy::float_cmp)]

use super::*;
use crate::recorder::{DrawCall, Recorder};

fn frame(window: &mut Window) -> Recorder {
    let mut rec = Recorder::new();
    draw_frame(window, &mut rec);
    rec
}

#[test]
fn empty_window_only_clears() {
    let mut w = Window::new(Viewport::default());
    let rec = frame(&mut w);
    assert_eq!(rec.calls(), &[DrawCall::Clear(Viewport::default())]);
}

#[test]
fn single_point_draws_dot_but_no_curve() {
    let mut w = Window::new(Viewport::default());
    w.push_reading(7);
    let rec = frame(&mut w);

    assert_eq!(rec.calls().len(), 2);
    assert!(matches!(
        rec.calls()[1],
        DrawCall::Circle { radius, color, .. } if radius == POINT_RADIUS && color == Rgba::WHITE
    ));
}

#[test]
fn frame_order_is_clear_dots_fill_stroke() {
    let mut w = Window::new(Viewport::default());
    for v in [3, 5, 2] {
        w.push_reading(v);
    }
    let rec = frame(&mut w);
    let calls = rec.calls();

    assert_eq!(calls.len(), 1 + 3 + 2);
    assert!(matches!(calls[0], DrawCall::Clear(_)));
    assert!(calls[1..4].iter().all(|c| matches!(c, DrawCall::Circle { .. })));
    assert!(matches!(calls[4], DrawCall::Fill { .. }));
    assert!(matches!(calls[5], DrawCall::Stroke { width, .. } if width == STROKE_WIDTH));
}

#[test]
fn three_reading_scenario_draws_relaxed_positions() {
    let mut w = Window::new(Viewport::default());
    for v in [3, 5, 2] {
        w.push_reading(v);
    }
    let rec = frame(&mut w);
    let dots = rec.circles();

    // Each point was created at the right edge; one frame closes 10% of its gap.
    let expected = [Point::new(864.0 - 15.0, 12.0), Point::new(864.0 - 7.5, 20.0), Point::new(864.0, 8.0)];
    for (dot, want) in dots.iter().zip(expected) {
        assert!((dot.x - want.x).abs() < 1e-9 && (dot.y - want.y).abs() < 1e-9, "{dot:?} != {want:?}");
    }
}

#[test]
fn fill_closes_to_bottom_edge_with_gradient() {
    let mut w = Window::new(Viewport::new(800.0, 300.0));
    w.push_reading(1);
    w.push_reading(2);
    let rec = frame(&mut w);

    let Some(DrawCall::Fill { path, paint }) = rec.calls().iter().find(|c| matches!(c, DrawCall::Fill { .. })) else {
        panic!("no fill call");
    };
    let ops = path.ops();
    let n = ops.len();
    let first_x = rec.circles()[0].x;

    assert_eq!(ops[n - 3], PathOp::LineTo(Point::new(800.0, 300.0)));
    assert_eq!(ops[n - 2], PathOp::LineTo(Point::new(first_x, 300.0)));
    assert_eq!(ops[n - 1], PathOp::Close);
    assert_eq!(paint, &Paint::Linear(area_gradient()));
}

#[test]
fn gradient_fades_from_translucent_white_to_transparent() {
    let g = area_gradient();
    assert_eq!(g.from, Point::new(0.0, 0.0));
    assert_eq!(g.to, Point::new(0.0, 400.0));
    assert_eq!(g.stops, vec![(0.0, Rgba::new(255, 255, 255, 0.4)), (1.0, Rgba::TRANSPARENT)]);
}

#[test]
fn stroke_path_is_open_curve() {
    let mut w = Window::new(Viewport::default());
    w.push_reading(1);
    w.push_reading(2);
    let rec = frame(&mut w);

    let Some(DrawCall::Stroke { path, .. }) = rec.calls().last() else {
        panic!("last call should be the stroke");
    };
    assert!(!path.ops().contains(&PathOp::Close));
}
