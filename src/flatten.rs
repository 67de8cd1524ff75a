//! Curve flattening: turns a `lyon` path into device-space polylines.
//!
//! This is the first stage of the fill/stroke pipeline
//! (flatten → dash → stroke → rasterize). Curves are subdivided by lyon's
//! flattening iterator; the optional affine transform is applied to the
//! control points before subdivision so the tolerance is honored in device
//! space.

use lyon::math::{Point, Transform};
use lyon::path::iterator::PathIterator;
use lyon::path::{Path, PathEvent};

/// Default flattening tolerance, in device pixels.
pub(crate) const FLATTEN_TOLERANCE: f32 = 0.25;

/// One flattened subpath. `closed` records whether the source contour was
/// explicitly closed; fills treat every contour as closed anyway, strokes
/// do not.
#[derive(Debug, Clone, Default)]
pub(crate) struct Contour {
    pub(crate) points: Vec<Point>,
    pub(crate) closed: bool,
}

impl Contour {
    pub(crate) fn is_degenerate(&self) -> bool {
        self.points.len() < 2
    }
}

/// Flattens `path`, optionally transformed, into polyline contours.
pub(crate) fn flatten_path(path: &Path, transform: Option<&Transform>, out: &mut Vec<Contour>) {
    out.clear();
    let transform = transform.copied().unwrap_or_else(Transform::identity);
    let mut current = Contour::default();
    for event in path.iter().transformed(&transform).flattened(FLATTEN_TOLERANCE) {
        match event {
            PathEvent::Begin { at } => {
                current.points.clear();
                current.closed = false;
                current.points.push(at);
            }
            PathEvent::Line { to, .. } => {
                push_if_moved(&mut current.points, to);
            }
            PathEvent::End { close, first, .. } => {
                if close {
                    // Drop a duplicated closing vertex; the contour flag
                    // carries the information instead.
                    if current.points.last() == Some(&first) && current.points.len() > 1 {
                        current.points.pop();
                    }
                    current.closed = true;
                }
                if !current.is_degenerate() {
                    out.push(std::mem::take(&mut current));
                } else {
                    current.points.clear();
                }
            }
            PathEvent::Quadratic { .. } | PathEvent::Cubic { .. } => {
                debug_assert!(false, "flattened iterator emitted a curve");
            }
        }
    }
}

#[inline]
fn push_if_moved(points: &mut Vec<Point>, to: Point) {
    if points.last().map_or(true, |last| {
        (last.x - to.x).abs() > 1e-6 || (last.y - to.y).abs() > 1e-6
    }) {
        points.push(to);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lyon::math::point;

    #[test]
    fn flattens_a_triangle_to_one_closed_contour() {
        let mut builder = Path::builder();
        builder.begin(point(0.0, 0.0));
        builder.line_to(point(10.0, 0.0));
        builder.line_to(point(10.0, 10.0));
        builder.close();
        let path = builder.build();

        let mut contours = Vec::new();
        flatten_path(&path, None, &mut contours);
        assert_eq!(contours.len(), 1);
        assert!(contours[0].closed);
        assert_eq!(contours[0].points.len(), 3);
    }

    #[test]
    fn transform_is_applied_to_points() {
        let mut builder = Path::builder();
        builder.begin(point(1.0, 0.0));
        builder.line_to(point(2.0, 0.0));
        builder.end(false);
        let path = builder.build();

        let transform = Transform::scale(10.0, 10.0);
        let mut contours = Vec::new();
        flatten_path(&path, Some(&transform), &mut contours);
        assert_eq!(contours[0].points[0], point(10.0, 0.0));
        assert_eq!(contours[0].points[1], point(20.0, 0.0));
    }

    #[test]
    fn degenerate_contours_are_dropped() {
        let mut builder = Path::builder();
        builder.begin(point(5.0, 5.0));
        builder.end(false);
        let path = builder.build();

        let mut contours = Vec::new();
        flatten_path(&path, None, &mut contours);
        assert!(contours.is_empty());
    }
}
