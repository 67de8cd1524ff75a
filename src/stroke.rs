//! Stroke and dash generation.
//!
//! The second stage of the stroke pipeline: flattened contours come in,
//! closed outline polygons go out, ready for the cell rasterizer. Outlines
//! are produced by offsetting each side of the polyline by half the line
//! width; the inner side of a turn is left to the non-zero fill rule to
//! resolve, which is why stroke outlines are always rasterized with
//! [`crate::FillRule::NonZero`] regardless of the painter's fill rule.

use lyon::math::{vector, Point, Vector};

use crate::flatten::Contour;

/// Geometry applied to the ends of an open stroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineCap {
    #[default]
    Butt,
    Square,
    Round,
}

/// Geometry applied where two stroked segments meet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineJoin {
    #[default]
    Miter,
    Bevel,
    Round,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct StrokeStyle {
    pub(crate) width: f32,
    pub(crate) cap: LineCap,
    pub(crate) join: LineJoin,
    pub(crate) miter_limit: f32,
}

/// Angular step for round joins and caps, tuned to the flattening
/// tolerance at typical stroke widths.
const ROUND_STEP: f32 = 0.25;

/// Expands every input contour into closed outline polygons.
pub(crate) fn stroke_contours(input: &[Contour], style: &StrokeStyle, out: &mut Vec<Contour>) {
    out.clear();
    let hw = style.width * 0.5;
    if !(hw > 0.0) || !hw.is_finite() {
        return;
    }
    for contour in input {
        if contour.is_degenerate() {
            continue;
        }
        if contour.closed {
            let mut ring = contour.points.clone();
            ring.push(contour.points[0]);
            let mut outer = Vec::new();
            half_outline(&ring, hw, style, true, &mut outer);
            let mut reversed = ring.clone();
            reversed.reverse();
            let mut inner = Vec::new();
            half_outline(&reversed, hw, style, true, &mut inner);
            push_ring(out, outer);
            push_ring(out, inner);
        } else {
            let mut outline = Vec::new();
            half_outline(&contour.points, hw, style, false, &mut outline);
            let last = *contour.points.last().unwrap();
            let dir = segment_dir(&contour.points, contour.points.len() - 2);
            emit_cap(last, dir, hw, style.cap, &mut outline);
            let mut reversed = contour.points.clone();
            reversed.reverse();
            half_outline(&reversed, hw, style, false, &mut outline);
            let first = contour.points[0];
            let back_dir = segment_dir(&reversed, reversed.len() - 2);
            emit_cap(first, back_dir, hw, style.cap, &mut outline);
            push_ring(out, outline);
        }
    }
}

fn push_ring(out: &mut Vec<Contour>, points: Vec<Point>) {
    if points.len() >= 3 {
        out.push(Contour {
            points,
            closed: true,
        });
    }
}

fn segment_dir(pts: &[Point], i: usize) -> Vector {
    let d = pts[i + 1] - pts[i];
    let len = d.length();
    if len > 0.0 {
        d / len
    } else {
        vector(1.0, 0.0)
    }
}

/// Left-hand offset normal of a unit direction, in y-down device space.
#[inline]
fn left_normal(dir: Vector, hw: f32) -> Vector {
    vector(dir.y * hw, -dir.x * hw)
}

/// Walks `pts` forward, emitting the left-side offset polyline with joins.
/// For `closed` rings the caller passes the ring with its first point
/// repeated at the end; the join at the seam is emitted like any other.
fn half_outline(pts: &[Point], hw: f32, style: &StrokeStyle, closed: bool, out: &mut Vec<Point>) {
    let seg_count = pts.len() - 1;
    let mut dirs: Vec<Vector> = Vec::with_capacity(seg_count);
    for i in 0..seg_count {
        dirs.push(segment_dir(pts, i));
    }

    if !closed {
        out.push(pts[0] + left_normal(dirs[0], hw));
    }
    for i in 1..seg_count {
        emit_join(pts[i], dirs[i - 1], dirs[i], hw, style, out);
    }
    if closed {
        // Seam join between the last and first segment.
        emit_join(pts[0], dirs[seg_count - 1], dirs[0], hw, style, out);
    } else {
        out.push(pts[seg_count] + left_normal(dirs[seg_count - 1], hw));
    }
}

fn emit_join(
    v: Point,
    dir_in: Vector,
    dir_out: Vector,
    hw: f32,
    style: &StrokeStyle,
    out: &mut Vec<Point>,
) {
    let n_in = left_normal(dir_in, hw);
    let n_out = left_normal(dir_out, hw);
    let cross = dir_in.x * dir_out.y - dir_in.y * dir_out.x;

    // The left side is only the outside of a clockwise turn; on the inside
    // the two offsets simply connect and the overlap cancels under non-zero
    // winding.
    if cross <= 0.0 {
        out.push(v + n_in);
        out.push(v + n_out);
        return;
    }

    match style.join {
        LineJoin::Bevel => {
            out.push(v + n_in);
            out.push(v + n_out);
        }
        LineJoin::Miter => {
            let dot = (n_in.x * n_out.x + n_in.y * n_out.y) / (hw * hw);
            let denom = 1.0 + dot;
            // limit: 1/cos(θ/2) <= miter_limit  ⇔  denom >= 2/limit².
            let limit = style.miter_limit.max(1.0);
            if denom > f32::EPSILON && denom >= 2.0 / (limit * limit) {
                let m = vector((n_in.x + n_out.x) / denom, (n_in.y + n_out.y) / denom);
                out.push(v + m);
            } else {
                out.push(v + n_in);
                out.push(v + n_out);
            }
        }
        LineJoin::Round => {
            out.push(v + n_in);
            emit_arc(v, n_in, n_out, hw, out);
            out.push(v + n_out);
        }
    }
}

/// Emits intermediate points of the arc from `v + from` to `v + to`,
/// sweeping the short way.
fn emit_arc(v: Point, from: Vector, to: Vector, radius: f32, out: &mut Vec<Point>) {
    let a0 = from.y.atan2(from.x);
    let a1 = to.y.atan2(to.x);
    let mut sweep = a1 - a0;
    while sweep > std::f32::consts::PI {
        sweep -= 2.0 * std::f32::consts::PI;
    }
    while sweep < -std::f32::consts::PI {
        sweep += 2.0 * std::f32::consts::PI;
    }
    emit_arc_angles(v, a0, sweep, radius, out);
}

fn emit_arc_angles(v: Point, a0: f32, sweep: f32, radius: f32, out: &mut Vec<Point>) {
    let steps = (sweep.abs() / ROUND_STEP).ceil() as i32;
    for k in 1..steps {
        let a = a0 + sweep * (k as f32 / steps as f32);
        out.push(v + vector(a.cos() * radius, a.sin() * radius));
    }
}

fn emit_cap(end: Point, dir: Vector, hw: f32, cap: LineCap, out: &mut Vec<Point>) {
    let n = left_normal(dir, hw);
    match cap {
        LineCap::Butt => {}
        LineCap::Square => {
            let ext = vector(dir.x * hw, dir.y * hw);
            out.push(end + n + ext);
            out.push(end - n + ext);
        }
        LineCap::Round => {
            // Rotating the left normal counterclockwise by π passes through
            // the outward direction, so the cap always sweeps +π.
            emit_arc_angles(end, n.y.atan2(n.x), std::f32::consts::PI, hw, out);
        }
    }
}

/// Splits contours into on/off runs following the dash array.
///
/// Entries are consumed in order and cycled; `offset` advances the start
/// position inside the pattern. Off runs produce nothing; on runs become
/// open contours that are subsequently stroked.
pub(crate) fn dash_contours(
    input: &[Contour],
    dashes: &[f32],
    offset: f32,
    out: &mut Vec<Contour>,
) {
    out.clear();
    let total: f32 = dashes.iter().copied().filter(|d| *d > 0.0).sum();
    if dashes.is_empty() || total <= 0.0 {
        out.extend_from_slice(input);
        return;
    }

    for contour in input {
        if contour.is_degenerate() {
            continue;
        }
        let mut pts: Vec<Point> = contour.points.clone();
        if contour.closed {
            pts.push(pts[0]);
        }

        // Position inside the cyclic pattern.
        let mut phase = offset.rem_euclid(total);
        let mut index = 0usize;
        while phase >= dashes[index].max(0.0) {
            phase -= dashes[index].max(0.0);
            index = (index + 1) % dashes.len();
        }
        let mut on = index % 2 == 0;
        let mut remaining = dashes[index].max(0.0) - phase;
        let mut current = Contour {
            points: Vec::new(),
            closed: false,
        };

        for pair in pts.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let seg = b - a;
            let seg_len = seg.length();
            if seg_len <= 0.0 {
                continue;
            }
            let mut t = 0.0;
            while t < seg_len {
                let step = (seg_len - t).min(remaining);
                let p0 = a + seg * (t / seg_len);
                let p1 = a + seg * ((t + step) / seg_len);
                if on {
                    if current.points.is_empty() {
                        current.points.push(p0);
                    }
                    current.points.push(p1);
                }
                t += step;
                remaining -= step;
                if remaining <= 1e-6 {
                    if on && !current.is_degenerate() {
                        out.push(std::mem::take(&mut current));
                    } else if on {
                        current.points.clear();
                    }
                    index = (index + 1) % dashes.len();
                    remaining = dashes[index].max(0.0);
                    on = !on;
                }
            }
        }
        if on && !current.is_degenerate() {
            out.push(current);
        }
    }
}
