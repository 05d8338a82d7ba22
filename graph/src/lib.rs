//! Curve renderer for the live sensor graph.
//!
//! Readings arrive irregularly and at a low rate. This crate turns them into
//! a smooth, continuously scrolling curve drawn once per frame: each reading
//! becomes a [`window::GraphPoint`] whose drawn position eases toward its
//! target, the whole window slides left by one spacing per reading, and the
//! points are joined by a cardinal spline with a gradient fill underneath.
//!
//! Drawing is backend-agnostic. [`render::draw_frame`] talks to a
//! [`render::Surface`]; the crate ships an SVG surface and a recording
//! surface for tests.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`window`] | Sliding window of points, relaxation and eviction |
//! | [`spline`] | Cardinal spline through the window as cubic segments |
//! | [`render`] | `Surface` trait, paints, paths and the per-frame draw |
//! | [`svg`] | `Surface` that writes an SVG document |
//! | [`recorder`] | Test `Surface` that records draw calls |
//! | [`point`] | 2D point math |
//! | [`consts`] | Layout and animation constants |

pub mod consts;
pub mod point;
pub mod recorder;
pub mod render;
pub mod spline;
pub mod svg;
pub mod window;
