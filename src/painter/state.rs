//! Copy-on-write painter state snapshots.
//!
//! The painter's clip configuration and drawing capabilities live in two
//! immutable snapshot types shared through `Arc`. Every front-end setter
//! first calls [`detach`], which is `Arc::make_mut`: when the snapshot is
//! unshared the setter mutates in place (the common serial case), otherwise
//! the snapshot is cloned and the painter moves to the copy while in-flight
//! commands keep reading the frozen original.

use std::sync::Arc;

use lyon::math::Transform;
use smallvec::SmallVec;

use crate::compose::{span_ops, CompositeOp, SpanOps};
use crate::geom::{IntBox, IntPoint};
use crate::pattern::PatternSource;
use crate::pixel::PixelFormat;
use crate::raster::FillRule;
use crate::region::Region;
use crate::stroke::{LineCap, LineJoin};
use crate::Color;

/// Ensures the snapshot behind `handle` is uniquely owned, cloning it if
/// a command still references it, and returns the mutable view.
#[inline]
pub(crate) fn detach<T: Clone>(handle: &mut Arc<T>) -> &mut T {
    Arc::make_mut(handle)
}

/// Snapshot of the clip configuration.
///
/// `work_origin` is always `meta_origin + user_origin`; every derived
/// field (work region, simple flag, clip box) is recomputed only in
/// [`ClipState::update_work_region`]. All stored regions and boxes are in
/// device coordinates.
#[derive(Debug, Clone)]
pub(crate) struct ClipState {
    pub(crate) meta_origin: IntPoint,
    pub(crate) user_origin: IntPoint,
    pub(crate) work_origin: IntPoint,
    pub(crate) meta_region: Region,
    pub(crate) user_region: Region,
    pub(crate) work_region: Region,
    pub(crate) meta_region_used: bool,
    pub(crate) user_region_used: bool,
    pub(crate) work_region_used: bool,
    /// True when the whole clip reduces to `clip_box`.
    pub(crate) clip_simple: bool,
    pub(crate) clip_box: IntBox,
}

impl ClipState {
    pub(crate) fn new(raster_bounds: IntBox) -> Self {
        let mut state = Self {
            meta_origin: IntPoint::default(),
            user_origin: IntPoint::default(),
            work_origin: IntPoint::default(),
            meta_region: Region::new(),
            user_region: Region::new(),
            work_region: Region::new(),
            meta_region_used: false,
            user_region_used: false,
            work_region_used: false,
            clip_simple: true,
            clip_box: raster_bounds,
        };
        state.update_work_region(raster_bounds);
        state
    }

    /// Recomputes every derived clip field. The single place where
    /// `work_region`, `clip_simple` and `clip_box` change.
    ///
    /// The user region is expressed relative to the meta origin; the work
    /// region is the meta region restricted by it, clamped to the raster.
    pub(crate) fn update_work_region(&mut self, raster_bounds: IntBox) {
        self.work_origin = IntPoint::new(
            self.meta_origin.x + self.user_origin.x,
            self.meta_origin.y + self.user_origin.y,
        );

        if !self.meta_region_used && !self.user_region_used {
            self.work_region = Region::new();
            self.work_region_used = false;
            self.clip_simple = true;
            self.clip_box = raster_bounds;
            return;
        }

        let bounds = Region::from_box(raster_bounds);
        let mut combined = if self.meta_region_used {
            Region::intersect(&self.meta_region, &bounds)
        } else {
            bounds.clone()
        };
        if self.user_region_used {
            let user_dev = self
                .user_region
                .translated(self.meta_origin.x, self.meta_origin.y);
            combined = Region::intersect(&combined, &user_dev);
        }

        self.clip_box = combined.extents();
        self.clip_simple = combined.is_simple();
        if self.clip_simple {
            // The box is authoritative; drop the region.
            self.work_region = Region::new();
            self.work_region_used = false;
        } else {
            self.work_region = combined;
            self.work_region_used = true;
        }
    }
}

/// Snapshot of the drawing capabilities: operator, source, line style,
/// fill rule and transform, plus the kernel table resolved for the
/// current (surface format, operator) pair.
#[derive(Debug, Clone)]
pub(crate) struct CapsState {
    pub(crate) op: CompositeOp,
    /// Solid source in both encodings.
    pub(crate) solid_argb: u32,
    pub(crate) solid_prgb: u32,
    pub(crate) pattern: Option<PatternSource>,
    pub(crate) is_solid: bool,
    pub(crate) line_width: f32,
    pub(crate) line_cap: LineCap,
    pub(crate) line_join: LineJoin,
    pub(crate) dashes: SmallVec<[f32; 4]>,
    pub(crate) dash_offset: f32,
    pub(crate) miter_limit: f32,
    pub(crate) fill_rule: FillRule,
    pub(crate) transform: Transform,
    pub(crate) transforms_used: bool,
    /// Hairline without dashing; gates the integer stroke fast paths.
    pub(crate) line_is_simple: bool,
    pub(crate) ops: &'static SpanOps,
}

impl CapsState {
    pub(crate) fn new(format: PixelFormat) -> Self {
        let color = Color::BLACK;
        Self {
            op: CompositeOp::SrcOver,
            solid_argb: color.argb(),
            solid_prgb: color.premultiplied(),
            pattern: None,
            is_solid: true,
            line_width: 1.0,
            line_cap: LineCap::Butt,
            line_join: LineJoin::Miter,
            dashes: SmallVec::new(),
            dash_offset: 0.0,
            miter_limit: 4.0,
            fill_rule: FillRule::NonZero,
            transform: Transform::identity(),
            transforms_used: false,
            line_is_simple: true,
            ops: span_ops(format, CompositeOp::SrcOver),
        }
    }

    pub(crate) fn update_line_is_simple(&mut self) {
        self.line_is_simple = self.line_width == 1.0 && self.dashes.is_empty();
    }

    pub(crate) fn update_transforms_used(&mut self) {
        self.transforms_used = self.transform != Transform::identity();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> IntBox {
        IntBox::new(0, 0, 100, 80)
    }

    #[test]
    fn detach_of_unshared_state_keeps_the_allocation() {
        let mut handle = Arc::new(ClipState::new(bounds()));
        let before = Arc::as_ptr(&handle);
        detach(&mut handle).user_origin = IntPoint::new(3, 4);
        assert_eq!(Arc::as_ptr(&handle), before);
        assert_eq!(Arc::strong_count(&handle), 1);
    }

    #[test]
    fn detach_of_shared_state_clones_and_isolates() {
        let mut handle = Arc::new(CapsState::new(PixelFormat::Prgb32));
        let frozen = handle.clone();
        detach(&mut handle).line_width = 5.0;
        assert_eq!(frozen.line_width, 1.0);
        assert_eq!(handle.line_width, 5.0);
        assert_eq!(Arc::strong_count(&frozen), 1);
    }

    #[test]
    fn work_origin_is_the_sum_of_meta_and_user() {
        let mut clip = ClipState::new(bounds());
        clip.meta_origin = IntPoint::new(10, 20);
        clip.user_origin = IntPoint::new(-3, 5);
        clip.update_work_region(bounds());
        assert_eq!(clip.work_origin, IntPoint::new(7, 25));
        assert!(clip.clip_simple);
        assert_eq!(clip.clip_box, bounds());
    }

    #[test]
    fn single_rect_user_region_stays_simple() {
        let mut clip = ClipState::new(bounds());
        clip.user_region = Region::from_box(IntBox::new(10, 10, 50, 50));
        clip.user_region_used = true;
        clip.update_work_region(bounds());
        assert!(clip.clip_simple);
        assert!(!clip.work_region_used);
        assert!(clip.work_region.is_empty());
        assert_eq!(clip.clip_box, IntBox::new(10, 10, 50, 50));
    }

    #[test]
    fn multi_rect_region_engages_the_region_path() {
        let mut clip = ClipState::new(bounds());
        clip.user_region = Region::from_boxes([
            IntBox::new(0, 0, 10, 10),
            IntBox::new(20, 20, 30, 30),
        ]);
        clip.user_region_used = true;
        clip.update_work_region(bounds());
        assert!(!clip.clip_simple);
        assert!(clip.work_region_used);
        assert_eq!(clip.clip_box, IntBox::new(0, 0, 30, 30));
    }

    #[test]
    fn user_region_is_anchored_at_the_meta_origin() {
        let mut clip = ClipState::new(bounds());
        clip.meta_origin = IntPoint::new(5, 5);
        clip.user_region = Region::from_box(IntBox::new(0, 0, 10, 10));
        clip.user_region_used = true;
        clip.update_work_region(bounds());
        assert_eq!(clip.clip_box, IntBox::new(5, 5, 15, 15));
    }

    #[test]
    fn line_simplicity_tracks_width_and_dash() {
        let mut caps = CapsState::new(PixelFormat::Prgb32);
        assert!(caps.line_is_simple);
        caps.line_width = 3.0;
        caps.update_line_is_simple();
        assert!(!caps.line_is_simple);
        caps.line_width = 1.0;
        caps.dashes.push(4.0);
        caps.update_line_is_simple();
        assert!(!caps.line_is_simple);
    }
}
