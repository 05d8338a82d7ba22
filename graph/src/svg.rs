//! Surface that renders a frame as a standalone SVG document.
//!
//! The surface keeps only the latest frame: `clear` starts a new document
//! body. Gradients are emitted as `<linearGradient>` definitions in user
//! space so they line up with the viewport the same way a canvas gradient
//! would.

use crate::point::Point;
use crate::render::{Gradient, Paint, Path, PathOp, Rgba, Surface};
use crate::window::Viewport;

#[derive(Debug, Clone, Default)]
pub struct SvgSurface {
    viewport: Viewport,
    defs: String,
    body: String,
    gradients: usize,
}

impl SvgSurface {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current frame as a complete SVG document.
    #[must_use]
    pub fn document(&self) -> String {
        let Viewport { width, height } = self.viewport;
        let mut out = format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">\n",
            w = num(width),
            h = num(height),
        );
        if !self.defs.is_empty() {
            out.push_str("<defs>\n");
            out.push_str(&self.defs);
            out.push_str("</defs>\n");
        }
        out.push_str(&self.body);
        out.push_str("</svg>\n");
        out
    }

    fn define_gradient(&mut self, gradient: &Gradient) -> String {
        self.gradients += 1;
        let id = format!("grad{}", self.gradients);
        self.defs.push_str(&format!(
            "<linearGradient id=\"{id}\" gradientUnits=\"userSpaceOnUse\" x1=\"{}\" y1=\"{}\" x2=\"{}\" y2=\"{}\">\n",
            num(gradient.from.x),
            num(gradient.from.y),
            num(gradient.to.x),
            num(gradient.to.y),
        ));
        for (offset, color) in &gradient.stops {
            self.defs.push_str(&format!(
                "<stop offset=\"{}\" stop-color=\"{}\" stop-opacity=\"{}\"/>\n",
                num(*offset),
                rgb(*color),
                num(color.a),
            ));
        }
        self.defs.push_str("</linearGradient>\n");
        id
    }
}

impl Surface for SvgSurface {
    fn clear(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.defs.clear();
        self.body.clear();
        self.gradients = 0;
    }

    fn fill_circle(&mut self, center: Point, radius: f64, color: Rgba) {
        self.body.push_str(&format!(
            "<circle cx=\"{}\" cy=\"{}\" r=\"{}\" fill=\"{}\" fill-opacity=\"{}\"/>\n",
            num(center.x),
            num(center.y),
            num(radius),
            rgb(color),
            num(color.a),
        ));
    }

    fn fill_path(&mut self, path: &Path, paint: &Paint) {
        let fill = match paint {
            Paint::Solid(color) => format!("fill=\"{}\" fill-opacity=\"{}\"", rgb(*color), num(color.a)),
            Paint::Linear(gradient) => format!("fill=\"url(#{})\"", self.define_gradient(gradient)),
        };
        self.body.push_str(&format!("<path d=\"{}\" {fill} stroke=\"none\"/>\n", path_data(path)));
    }

    fn stroke_path(&mut self, path: &Path, color: Rgba, width: f64) {
        self.body.push_str(&format!(
            "<path d=\"{}\" fill=\"none\" stroke=\"{}\" stroke-opacity=\"{}\" stroke-width=\"{}\"/>\n",
            path_data(path),
            rgb(color),
            num(color.a),
            num(width),
        ));
    }
}

/// SVG path `d` attribute for `path`.
#[must_use]
pub fn path_data(path: &Path) -> String {
    path.ops()
        .iter()
        .map(|op| match op {
            PathOp::MoveTo(p) => format!("M{} {}", num(p.x), num(p.y)),
            PathOp::LineTo(p) => format!("L{} {}", num(p.x), num(p.y)),
            PathOp::CubicTo { cp1, cp2, to } => format!(
                "C{} {} {} {} {} {}",
                num(cp1.x),
                num(cp1.y),
                num(cp2.x),
                num(cp2.y),
                num(to.x),
                num(to.y)
            ),
            PathOp::Close => "Z".to_owned(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn rgb(color: Rgba) -> String {
    format!("#{:02x}{:02x}{:02x}", color.r, color.g, color.b)
}

/// Two decimals, trailing zeros trimmed.
fn num(v: f64) -> String {
    let s = format!("{v:.2}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" { "0".to_owned() } else { s.to_owned() }
}

#[cfg(test)]
#[path = "svg_test.rs"]
mod svg_test;
