//! Gaze overlay drawn onto each captured frame: a fading trail of recent points,
//! a polyline through them, and a solid marker at the latest point.

use crate::config::OverlayConfig;
use crate::gaze::TrailSnapshot;
use image::{Pixel, Rgba, RgbaImage};

const RED: [u8; 3] = [0xff, 0, 0];
const MARKER_ALPHA: u8 = 255;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayStyle {
    pub marker_diameter: u32,
    pub trail_line_alpha: u8,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self::from(&OverlayConfig::default())
    }
}

impl From<&OverlayConfig> for OverlayStyle {
    fn from(config: &OverlayConfig) -> Self {
        Self {
            marker_diameter: config.marker_diameter,
            trail_line_alpha: config.trail_line_alpha,
        }
    }
}

fn red(alpha: u8) -> Rgba<u8> {
    Rgba([RED[0], RED[1], RED[2], alpha])
}

/// Opacity of the `index`-th trail dot, oldest first.
pub fn trail_alpha(index: usize, capacity: usize) -> u8 {
    (index * 245 / capacity.max(1) + 10).min(255) as u8
}

pub fn compose(canvas: &mut RgbaImage, trail: &TrailSnapshot, style: &OverlayStyle) {
    let points: Vec<(i64, i64)> = trail
        .points
        .iter()
        .map(|&(x, y)| (x as i64, y as i64))
        .collect();

    for (i, &(x, y)) in points.iter().enumerate() {
        fill_circle(canvas, x, y, style.marker_diameter, red(trail_alpha(i, trail.capacity)));
    }

    if points.len() > 2 {
        let pen = red(style.trail_line_alpha);
        for segment in points.windows(2) {
            if let [from, to] = segment {
                draw_line(canvas, *from, *to, pen);
            }
        }
    }

    let (cx, cy) = trail.current;
    fill_circle(canvas, cx as i64, cy as i64, style.marker_diameter, red(MARKER_ALPHA));
}

fn blend_pixel(canvas: &mut RgbaImage, x: i64, y: i64, color: Rgba<u8>) {
    if x < 0 || y < 0 || x >= i64::from(canvas.width()) || y >= i64::from(canvas.height()) {
        return;
    }
    canvas.get_pixel_mut(x as u32, y as u32).blend(&color);
}

/// Fills the circle inscribed in the `diameter`-sized square centred on `(cx, cy)`.
fn fill_circle(canvas: &mut RgbaImage, cx: i64, cy: i64, diameter: u32, color: Rgba<u8>) {
    let d = i64::from(diameter);
    let left = cx.saturating_sub(d / 2);
    let top = cy.saturating_sub(d / 2);
    let radius = d as f64 / 2.0;
    let (centre_x, centre_y) = (left as f64 + radius, top as f64 + radius);

    for py in top..top.saturating_add(d) {
        for px in left..left.saturating_add(d) {
            let dx = px as f64 + 0.5 - centre_x;
            let dy = py as f64 + 0.5 - centre_y;
            if dx * dx + dy * dy <= radius * radius {
                blend_pixel(canvas, px, py, color);
            }
        }
    }
}

/// One pixel wide Bresenham segment, clipped to the canvas first so that far
/// off-screen gaze points cost nothing.
fn draw_line(canvas: &mut RgbaImage, from: (i64, i64), to: (i64, i64), color: Rgba<u8>) {
    let bounds = (
        i64::from(canvas.width()) - 1,
        i64::from(canvas.height()) - 1,
    );
    let Some(((mut x0, mut y0), (x1, y1))) = clip_segment(from, to, bounds) else {
        return;
    };

    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        blend_pixel(canvas, x0, y0, color);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

/// Liang-Barsky clip against `[0, max_x] x [0, max_y]`.
fn clip_segment(
    from: (i64, i64),
    to: (i64, i64),
    (max_x, max_y): (i64, i64),
) -> Option<((i64, i64), (i64, i64))> {
    if max_x < 0 || max_y < 0 {
        return None;
    }
    let (x0, y0) = (from.0 as f64, from.1 as f64);
    let (dx, dy) = (to.0 as f64 - x0, to.1 as f64 - y0);
    let (mut t0, mut t1) = (0.0f64, 1.0f64);

    let edges = [
        (-dx, x0),
        (dx, max_x as f64 - x0),
        (-dy, y0),
        (dy, max_y as f64 - y0),
    ];
    for (p, q) in edges {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let t = q / p;
        if p < 0.0 {
            if t > t1 {
                return None;
            }
            t0 = t0.max(t);
        } else {
            if t < t0 {
                return None;
            }
            t1 = t1.min(t);
        }
    }

    let at = |t: f64| ((x0 + t * dx).round() as i64, (y0 + t * dy).round() as i64);
    Some((at(t0), at(t1)))
}
