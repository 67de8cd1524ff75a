//! The painter front-end.
//!
//! A [`Painter`] owns the drawing state for one attached [`Surface`] and
//! turns the public drawing API into renderer work. In single-threaded
//! mode every operation renders immediately; in multithreaded mode the
//! operation is recorded as a command referencing frozen state snapshots
//! and published to the worker ring, to be replayed by every worker on its
//! own scanline band. Either way the pixels are byte-identical.

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::Arc;

use lyon::math::{point, vector, Angle, Point, Transform, Vector};
use lyon::path::builder::BorderRadii;
use lyon::path::{Path, Winding};
use smallvec::SmallVec;

use crate::color::Color;
use crate::compose::{span_ops, CompositeOp};
use crate::error::{Error, Result};
use crate::flatten::{flatten_path, Contour};
use crate::geom::{IntBox, IntPoint};
use crate::glyph::{Glyph, GlyphSet, GlyphSource};
use crate::image::Image;
use crate::pattern::{PatternContext, PatternSource};
use crate::pixel::PixelFormat;
use crate::raster::{FillRule, Rasterizer};
use crate::region::Region;
use crate::stroke::{dash_contours, stroke_contours, LineCap, LineJoin, StrokeStyle};
use crate::surface::{RasterTarget, Surface};

mod command;
mod engine;
mod state;
mod worker;

use command::{
    BoxCommand, Command, CommandAllocator, CommandPayload, GlyphSetCommand, ImageCommand,
    PathCommand, MAX_BOXES_PER_COMMAND,
};
use engine::RenderContext;
use state::{detach, CapsState, ClipState};
use worker::{worker_main, MtShared, PoolThread, ThreadPool, RASTER_MAX_THREADS};

/// Surfaces at least this many pixels enable multithreading on attach.
pub(crate) const RASTER_MIN_SIZE_THRESHOLD: i64 = 262_144;

struct MtContext {
    shared: Arc<MtShared>,
    threads: Vec<PoolThread>,
}

/// An immediate-mode software painter over a caller-owned pixel buffer.
///
/// ```no_run
/// use lienzo::{Color, CompositeOp, IntBox, Painter, PixelFormat, Surface};
///
/// let mut pixels = vec![0u8; 256 * 256 * 4];
/// let surface = Surface::new(&mut pixels, 256, 256, 256 * 4, PixelFormat::Prgb32).unwrap();
/// let mut painter = Painter::new(surface).unwrap();
/// painter.set_source_rgba(Color::from_argb(0xFFFF0000));
/// painter.set_op(CompositeOp::SrcOver);
/// painter.fill_rect(IntBox::from_xywh(16, 16, 64, 64));
/// painter.flush().unwrap();
/// ```
pub struct Painter<'a> {
    target: RasterTarget,
    format: PixelFormat,
    clip: Arc<ClipState>,
    caps: Arc<CapsState>,
    pattern_ctx: Option<Arc<PatternContext>>,
    allocator: CommandAllocator,
    mt: Option<MtContext>,
    ctx: RenderContext,
    // Reusable path-pipeline scratch.
    contours: Vec<Contour>,
    dashed: Vec<Contour>,
    stroked: Vec<Contour>,
    box_scratch: Vec<IntBox>,
    _pixels: PhantomData<&'a mut [u8]>,
    // The painter is a single producer; keep it out of shared references.
    _not_sync: PhantomData<Cell<u8>>,
}

impl<'a> Painter<'a> {
    /// Attaches a painter to `surface`. Multithreading is enabled
    /// automatically for large surfaces.
    pub fn new(surface: Surface<'a>) -> Result<Self> {
        let target = surface.target();
        let format = surface.format();
        let bounds = target.bounds();
        let mut painter = Self {
            target,
            format,
            clip: Arc::new(ClipState::new(bounds)),
            caps: Arc::new(CapsState::new(format)),
            pattern_ctx: None,
            allocator: CommandAllocator::new(),
            mt: None,
            ctx: RenderContext::new(target, 0, 1),
            contours: Vec::new(),
            dashed: Vec::new(),
            stroked: Vec::new(),
            box_scratch: Vec::new(),
            _pixels: PhantomData,
            _not_sync: PhantomData,
        };
        let pixel_count = target.width as i64 * target.height as i64;
        if pixel_count >= RASTER_MIN_SIZE_THRESHOLD {
            painter.set_worker_count(RASTER_MAX_THREADS.min(num_cpus::get()));
        }
        Ok(painter)
    }

    pub fn width(&self) -> u32 {
        self.target.width as u32
    }

    pub fn height(&self) -> u32 {
        self.target.height as u32
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    // ── Properties ──────────────────────────────────────────────────────

    /// Recognized names: `"multithreaded"` (0 disables, nonzero enables
    /// with an automatic worker count) and `"threads"` (explicit worker
    /// count, 0 disables).
    pub fn set_property(&mut self, name: &str, value: u32) -> Result<()> {
        match name {
            "multithreaded" => {
                if value == 0 {
                    self.set_worker_count(0);
                } else {
                    self.set_worker_count(RASTER_MAX_THREADS.min(num_cpus::get()));
                }
                Ok(())
            }
            "threads" => {
                self.set_worker_count(value as usize);
                Ok(())
            }
            _ => Err(Error::InvalidProperty(name.to_string())),
        }
    }

    pub fn get_property(&self, name: &str) -> Result<u32> {
        match name {
            "multithreaded" => Ok(self.mt.is_some() as u32),
            "threads" => Ok(self.mt.as_ref().map_or(0, |mt| mt.shared.worker_count) as u32),
            _ => Err(Error::InvalidProperty(name.to_string())),
        }
    }

    pub fn multithreaded(&self) -> bool {
        self.mt.is_some()
    }

    fn set_worker_count(&mut self, count: usize) {
        let count = count.min(RASTER_MAX_THREADS);
        let active = self.mt.as_ref().map_or(0, |mt| mt.shared.worker_count);
        if active == count {
            return;
        }
        self.teardown_mt();
        if count == 0 {
            return;
        }
        let shared = MtShared::new(count, self.target);
        let pool = ThreadPool::global();
        let mut threads = Vec::with_capacity(count);
        for index in 0..count {
            let thread = pool.acquire();
            let task_shared = shared.clone();
            thread.post(move || worker_main(task_shared, index));
            threads.push(thread);
        }
        log::debug!("painter multithreading enabled with {count} workers");
        self.mt = Some(MtContext { shared, threads });
    }

    fn teardown_mt(&mut self) {
        if let Some(mt) = self.mt.take() {
            mt.shared.flush();
            mt.shared.quit();
            let pool = ThreadPool::global();
            for thread in mt.threads {
                pool.release(thread);
            }
            log::debug!("painter multithreading disabled");
        }
    }

    /// Blocks until every posted command has been rendered.
    pub fn flush(&mut self) -> Result<()> {
        if let Some(mt) = &self.mt {
            mt.shared.flush();
        }
        Ok(())
    }

    // ── Meta and user clip variables ────────────────────────────────────

    /// Sets the meta origin and region, and resets the user variables.
    /// Meant for window-system integration; user code should prefer the
    /// `user` family.
    pub fn set_meta_vars(&mut self, origin: IntPoint, region: Option<Region>) {
        let bounds = self.target.bounds();
        let clip = detach(&mut self.clip);
        clip.meta_origin = origin;
        clip.meta_region_used = region.is_some();
        clip.meta_region = region.unwrap_or_default();
        clip.user_origin = IntPoint::default();
        clip.user_region = Region::new();
        clip.user_region_used = false;
        clip.update_work_region(bounds);
    }

    pub fn reset_meta_vars(&mut self) {
        self.set_meta_vars(IntPoint::default(), None);
    }

    pub fn set_meta_origin(&mut self, origin: IntPoint) {
        let bounds = self.target.bounds();
        let clip = detach(&mut self.clip);
        clip.meta_origin = origin;
        clip.update_work_region(bounds);
    }

    pub fn set_user_origin(&mut self, origin: IntPoint) {
        let bounds = self.target.bounds();
        let clip = detach(&mut self.clip);
        clip.user_origin = origin;
        clip.update_work_region(bounds);
    }

    pub fn translate_meta_origin(&mut self, dx: i32, dy: i32) {
        let origin = self.clip.meta_origin.translated(dx, dy);
        self.set_meta_origin(origin);
    }

    pub fn translate_user_origin(&mut self, dx: i32, dy: i32) {
        let origin = self.clip.user_origin.translated(dx, dy);
        self.set_user_origin(origin);
    }

    /// Sets the user clip region, in coordinates relative to the meta
    /// origin. `None` removes the user clip.
    pub fn set_user_region(&mut self, region: Option<Region>) {
        let bounds = self.target.bounds();
        let clip = detach(&mut self.clip);
        clip.user_region_used = region.is_some();
        clip.user_region = region.unwrap_or_default();
        clip.update_work_region(bounds);
    }

    pub fn reset_user_vars(&mut self) {
        let bounds = self.target.bounds();
        let clip = detach(&mut self.clip);
        clip.user_origin = IntPoint::default();
        clip.user_region = Region::new();
        clip.user_region_used = false;
        clip.update_work_region(bounds);
    }

    pub fn meta_origin(&self) -> IntPoint {
        self.clip.meta_origin
    }

    pub fn user_origin(&self) -> IntPoint {
        self.clip.user_origin
    }

    // ── Source and operator ─────────────────────────────────────────────

    pub fn set_op(&mut self, op: CompositeOp) {
        let format = self.format;
        let caps = detach(&mut self.caps);
        caps.op = op;
        caps.ops = span_ops(format, op);
    }

    pub fn op(&self) -> CompositeOp {
        self.caps.op
    }

    pub fn set_source_rgba(&mut self, color: Color) {
        let caps = detach(&mut self.caps);
        caps.solid_argb = color.argb();
        caps.solid_prgb = color.premultiplied();
        caps.is_solid = true;
        caps.pattern = None;
        self.pattern_ctx = None;
    }

    pub fn source_rgba(&self) -> Color {
        Color::from_argb(self.caps.solid_argb)
    }

    /// Switches to a pattern source. If the pattern cannot be initialized
    /// the draw operations using it become no-ops until the source changes.
    pub fn set_source_pattern(&mut self, source: PatternSource) {
        self.pattern_ctx = match PatternContext::init(&source) {
            Ok(ctx) => Some(Arc::new(ctx)),
            Err(err) => {
                log::warn!("pattern source initialization failed: {err}");
                None
            }
        };
        let caps = detach(&mut self.caps);
        caps.is_solid = false;
        caps.pattern = Some(source);
    }

    // ── Line style ──────────────────────────────────────────────────────

    pub fn set_line_width(&mut self, width: f32) {
        if !(width >= 0.0) || !width.is_finite() {
            return;
        }
        let caps = detach(&mut self.caps);
        caps.line_width = width;
        caps.update_line_is_simple();
    }

    pub fn line_width(&self) -> f32 {
        self.caps.line_width
    }

    pub fn set_line_cap(&mut self, cap: LineCap) {
        detach(&mut self.caps).line_cap = cap;
    }

    pub fn set_line_join(&mut self, join: LineJoin) {
        detach(&mut self.caps).line_join = join;
    }

    /// Replaces the dash pattern; each entry is copied. An empty slice
    /// removes dashing.
    pub fn set_line_dash(&mut self, dashes: &[f32]) {
        let caps = detach(&mut self.caps);
        caps.dashes.clear();
        for i in 0..dashes.len() {
            caps.dashes.push(dashes[i]);
        }
        caps.update_line_is_simple();
    }

    pub fn set_dash_offset(&mut self, offset: f32) {
        if !offset.is_finite() {
            return;
        }
        detach(&mut self.caps).dash_offset = offset;
    }

    pub fn set_miter_limit(&mut self, limit: f32) {
        if !(limit >= 1.0) || !limit.is_finite() {
            return;
        }
        detach(&mut self.caps).miter_limit = limit;
    }

    pub fn set_fill_rule(&mut self, rule: FillRule) {
        detach(&mut self.caps).fill_rule = rule;
    }

    pub fn fill_rule(&self) -> FillRule {
        self.caps.fill_rule
    }

    // ── Transform ───────────────────────────────────────────────────────

    pub fn set_matrix(&mut self, matrix: Transform) {
        let caps = detach(&mut self.caps);
        caps.transform = matrix;
        caps.update_transforms_used();
    }

    pub fn reset_matrix(&mut self) {
        self.set_matrix(Transform::identity());
    }

    pub fn matrix(&self) -> Transform {
        self.caps.transform
    }

    /// Multiplies `matrix` into the current transform, applied to incoming
    /// geometry before the existing transform.
    pub fn affine(&mut self, matrix: &Transform) {
        let combined = matrix.then(&self.caps.transform);
        self.set_matrix(combined);
    }

    pub fn rotate(&mut self, radians: f32) {
        self.affine(&Transform::rotation(Angle::radians(radians)));
    }

    pub fn scale(&mut self, sx: f32, sy: f32) {
        self.affine(&Transform::scale(sx, sy));
    }

    pub fn skew(&mut self, sx: f32, sy: f32) {
        self.affine(&Transform::new(1.0, sy.tan(), sx.tan(), 1.0, 0.0, 0.0));
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.affine(&Transform::translation(dx, dy));
    }

    /// Multiplies in the affine map taking `src`'s corners to `p0` (top
    /// left), `p1` (top right) and `p2` (bottom left).
    pub fn parallelogram(&mut self, p0: Point, p1: Point, p2: Point, src: crate::MathRect) {
        let w = src.max.x - src.min.x;
        let h = src.max.y - src.min.y;
        if w == 0.0 || h == 0.0 {
            return;
        }
        let m11 = (p1.x - p0.x) / w;
        let m12 = (p1.y - p0.y) / w;
        let m21 = (p2.x - p0.x) / h;
        let m22 = (p2.y - p0.y) / h;
        let m31 = p0.x - src.min.x * m11 - src.min.y * m21;
        let m32 = p0.y - src.min.x * m12 - src.min.y * m22;
        self.affine(&Transform::new(m11, m12, m21, m22, m31, m32));
    }

    /// Multiplies in the map from the `world` rectangle onto the `screen`
    /// rectangle.
    pub fn viewport(&mut self, world: crate::MathRect, screen: crate::MathRect) {
        let ww = world.max.x - world.min.x;
        let wh = world.max.y - world.min.y;
        if ww == 0.0 || wh == 0.0 {
            return;
        }
        let sx = (screen.max.x - screen.min.x) / ww;
        let sy = (screen.max.y - screen.min.y) / wh;
        let tx = screen.min.x - world.min.x * sx;
        let ty = screen.min.y - world.min.y * sy;
        self.affine(&Transform::new(sx, 0.0, 0.0, sy, tx, ty));
    }

    /// User geometry to device pixels: the user transform followed by the
    /// work-origin translation.
    fn device_transform(&self) -> Transform {
        let origin = self.clip.work_origin;
        self.caps
            .transform
            .then_translate(vector(origin.x as f32, origin.y as f32))
    }

    // ── Box fills ───────────────────────────────────────────────────────

    /// Fills the whole clip with the current source through `Src`,
    /// regardless of the current operator.
    pub fn clear(&mut self) {
        let mut caps = (*self.caps).clone();
        caps.op = CompositeOp::Src;
        caps.ops = span_ops(self.format, CompositeOp::Src);
        let caps = Arc::new(caps);
        let mut boxes = std::mem::take(&mut self.box_scratch);
        boxes.clear();
        if self.clip.work_region_used {
            boxes.extend_from_slice(self.clip.work_region.boxes());
        } else if self.clip.clip_box.is_valid() {
            boxes.push(self.clip.clip_box);
        }
        self.dispatch_boxes(&boxes, caps);
        self.box_scratch = boxes;
    }

    pub fn fill_rect(&mut self, rect: IntBox) {
        if !rect.is_valid() {
            return;
        }
        if self.caps.transforms_used {
            let r = crate::MathRect::new(
                point(rect.x0 as f32, rect.y0 as f32),
                point(rect.x1 as f32, rect.y1 as f32),
            );
            let mut builder = Path::builder();
            builder.add_rectangle(&r, Winding::Positive);
            let path = builder.build();
            self.fill_path(&path);
            return;
        }
        let mut boxes = std::mem::take(&mut self.box_scratch);
        boxes.clear();
        self.clip_user_box(rect, &mut boxes);
        let caps = self.caps.clone();
        self.dispatch_boxes(&boxes, caps);
        self.box_scratch = boxes;
    }

    pub fn fill_rects(&mut self, rects: &[IntBox]) {
        if self.caps.transforms_used {
            for r in rects {
                self.fill_rect(*r);
            }
            return;
        }
        let mut boxes = std::mem::take(&mut self.box_scratch);
        boxes.clear();
        for r in rects {
            if r.is_valid() {
                self.clip_user_box(*r, &mut boxes);
            }
        }
        let caps = self.caps.clone();
        self.dispatch_boxes(&boxes, caps);
        self.box_scratch = boxes;
    }

    /// Outlines a rectangle. With a simple one-pixel line and no transform
    /// this decomposes into at most four clipped boxes.
    pub fn draw_rect(&mut self, rect: IntBox) {
        if !rect.is_valid() {
            return;
        }
        if self.caps.line_is_simple && !self.caps.transforms_used {
            let mut boxes = std::mem::take(&mut self.box_scratch);
            boxes.clear();
            if rect.width() <= 2 || rect.height() <= 2 {
                self.clip_user_box(rect, &mut boxes);
            } else {
                let parts = [
                    IntBox::new(rect.x0, rect.y0, rect.x1, rect.y0 + 1),
                    IntBox::new(rect.x0, rect.y1 - 1, rect.x1, rect.y1),
                    IntBox::new(rect.x0, rect.y0 + 1, rect.x0 + 1, rect.y1 - 1),
                    IntBox::new(rect.x1 - 1, rect.y0 + 1, rect.x1, rect.y1 - 1),
                ];
                for part in parts {
                    self.clip_user_box(part, &mut boxes);
                }
            }
            let caps = self.caps.clone();
            self.dispatch_boxes(&boxes, caps);
            self.box_scratch = boxes;
            return;
        }
        let r = crate::MathRect::new(
            point(rect.x0 as f32, rect.y0 as f32),
            point(rect.x1 as f32, rect.y1 as f32),
        );
        let mut builder = Path::builder();
        builder.add_rectangle(&r, Winding::Positive);
        let path = builder.build();
        self.draw_path(&path);
    }

    pub fn draw_rects(&mut self, rects: &[IntBox]) {
        for rect in rects {
            self.draw_rect(*rect);
        }
    }

    /// Translates a user-space box to device space and clips it against
    /// the active clip, appending the surviving pieces.
    fn clip_user_box(&self, rect: IntBox, out: &mut Vec<IntBox>) {
        let origin = self.clip.work_origin;
        let dev = rect.translated(origin.x, origin.y);
        if self.clip.work_region_used {
            self.clip.work_region.clip_box_into(&dev, out);
        } else {
            let clipped = dev.intersected(&self.clip.clip_box);
            if clipped.is_valid() {
                out.push(clipped);
            }
        }
    }

    fn dispatch_boxes(&mut self, boxes: &[IntBox], caps: Arc<CapsState>) {
        for chunk in boxes.chunks(MAX_BOXES_PER_COMMAND) {
            if chunk.is_empty() {
                continue;
            }
            let cmd = BoxCommand {
                boxes: SmallVec::from_slice(chunk),
            };
            self.dispatch(CommandPayload::Boxes(cmd), caps.clone());
        }
    }

    // ── Path fills and strokes ──────────────────────────────────────────

    pub fn fill_path(&mut self, path: &Path) {
        let transform = self.device_transform();
        let mut contours = std::mem::take(&mut self.contours);
        flatten_path(path, Some(&transform), &mut contours);
        self.fill_contours(&contours);
        self.contours = contours;
    }

    /// Fills a closed polygon given in user coordinates.
    pub fn fill_polygon(&mut self, points: &[Point]) {
        if points.len() < 3 {
            return;
        }
        let transform = self.device_transform();
        let contour = Contour {
            points: points.iter().map(|p| transform.transform_point(*p)).collect(),
            closed: true,
        };
        let contours = [contour];
        self.fill_contours(&contours);
    }

    pub fn fill_round(&mut self, rect: crate::MathRect, radius: f32) {
        let mut builder = Path::builder();
        builder.add_rounded_rectangle(&rect, &BorderRadii::new(radius), Winding::Positive);
        let path = builder.build();
        self.fill_path(&path);
    }

    pub fn fill_ellipse(&mut self, center: Point, radii: Vector) {
        let mut builder = Path::builder();
        builder.add_ellipse(center, radii, Angle::zero(), Winding::Positive);
        let path = builder.build();
        self.fill_path(&path);
    }

    /// Fills the chord-closed arc of an ellipse. Angles in radians.
    pub fn fill_arc(&mut self, center: Point, radii: Vector, start: f32, sweep: f32) {
        if let Some(path) = arc_path(center, radii, start, sweep, true) {
            self.fill_path(&path);
        }
    }

    pub fn draw_path(&mut self, path: &Path) {
        let mut contours = std::mem::take(&mut self.contours);
        flatten_path(path, None, &mut contours);
        self.stroke_and_fill_contours(&contours);
        self.contours = contours;
    }

    /// Fills the single pixel at `pt` with the current source.
    pub fn fill_pixel(&mut self, pt: IntPoint) {
        self.fill_rect(IntBox::new(pt.x, pt.y, pt.x + 1, pt.y + 1));
    }

    pub fn draw_point(&mut self, p: Point) {
        if self.caps.line_is_simple && !self.caps.transforms_used {
            let x = p.x.floor() as i32;
            let y = p.y.floor() as i32;
            self.fill_rect(IntBox::new(x, y, x + 1, y + 1));
            return;
        }
        self.draw_line(p, p);
    }

    pub fn draw_line(&mut self, a: Point, b: Point) {
        let contour = Contour {
            points: vec![a, b],
            closed: false,
        };
        let contours = [contour];
        self.stroke_and_fill_contours(&contours);
    }

    /// Outlines a closed polygon given in user coordinates.
    pub fn draw_polygon(&mut self, points: &[Point]) {
        if points.len() < 2 {
            return;
        }
        let contour = Contour {
            points: points.to_vec(),
            closed: true,
        };
        let contours = [contour];
        self.stroke_and_fill_contours(&contours);
    }

    pub fn draw_round(&mut self, rect: crate::MathRect, radius: f32) {
        let mut builder = Path::builder();
        builder.add_rounded_rectangle(&rect, &BorderRadii::new(radius), Winding::Positive);
        let path = builder.build();
        self.draw_path(&path);
    }

    pub fn draw_ellipse(&mut self, center: Point, radii: Vector) {
        let mut builder = Path::builder();
        builder.add_ellipse(center, radii, Angle::zero(), Winding::Positive);
        let path = builder.build();
        self.draw_path(&path);
    }

    /// Outlines an open elliptic arc. Angles in radians.
    pub fn draw_arc(&mut self, center: Point, radii: Vector, start: f32, sweep: f32) {
        if let Some(path) = arc_path(center, radii, start, sweep, false) {
            self.draw_path(&path);
        }
    }

    /// Rasterizes already-flattened device-space contours as a fill.
    fn fill_contours(&mut self, contours: &[Contour]) {
        let clip_box = self.clip.clip_box;
        if !clip_box.is_valid() {
            return;
        }
        let mut ras = Rasterizer::new();
        ras.reset(clip_box, self.caps.fill_rule);
        ras.add_contours(contours);
        ras.sort();
        if !ras.has_cells() {
            return;
        }
        let caps = self.caps.clone();
        self.dispatch(CommandPayload::Path(PathCommand { rasterizer: ras }), caps);
    }

    /// Runs the dash → stroke → transform pipeline over user-space
    /// contours, then rasterizes the outline with the non-zero rule.
    fn stroke_and_fill_contours(&mut self, contours: &[Contour]) {
        let clip_box = self.clip.clip_box;
        if !clip_box.is_valid() {
            return;
        }
        let caps = self.caps.clone();
        let style = StrokeStyle {
            width: caps.line_width,
            cap: caps.line_cap,
            join: caps.line_join,
            miter_limit: caps.miter_limit,
        };

        let mut dashed = std::mem::take(&mut self.dashed);
        let mut stroked = std::mem::take(&mut self.stroked);
        let source: &[Contour] = if caps.dashes.is_empty() {
            contours
        } else {
            dash_contours(contours, &caps.dashes, caps.dash_offset, &mut dashed);
            &dashed
        };
        stroke_contours(source, &style, &mut stroked);

        let transform = self.device_transform();
        for contour in &mut stroked {
            for p in &mut contour.points {
                *p = transform.transform_point(*p);
            }
        }

        let mut ras = Rasterizer::new();
        ras.reset(clip_box, FillRule::NonZero);
        ras.add_contours(&stroked);
        ras.sort();
        dashed.clear();
        stroked.clear();
        self.dashed = dashed;
        self.stroked = stroked;
        if !ras.has_cells() {
            return;
        }
        self.dispatch(CommandPayload::Path(PathCommand { rasterizer: ras }), caps);
    }

    // ── Images and glyphs ───────────────────────────────────────────────

    pub fn draw_image(&mut self, pt: IntPoint, image: &Image) {
        self.draw_image_rect(pt, image, image.bounds());
    }

    /// Blits `src` (a sub-rectangle of `image`) with its top-left corner
    /// at `pt`, composited with the current operator.
    pub fn draw_image_rect(&mut self, pt: IntPoint, image: &Image, src: IntBox) {
        let src = src.intersected(&image.bounds());
        if !src.is_valid() {
            return;
        }
        let origin = self.clip.work_origin;
        let dev = IntBox::from_xywh(
            pt.x + origin.x,
            pt.y + origin.y,
            src.width(),
            src.height(),
        );
        let mut pieces = std::mem::take(&mut self.box_scratch);
        pieces.clear();
        if self.clip.work_region_used {
            self.clip.work_region.clip_box_into(&dev, &mut pieces);
        } else {
            let clipped = dev.intersected(&self.clip.clip_box);
            if clipped.is_valid() {
                pieces.push(clipped);
            }
        }
        let caps = self.caps.clone();
        for piece in &pieces {
            let cmd = ImageCommand {
                dst: *piece,
                src_x: src.x0 + (piece.x0 - dev.x0),
                src_y: src.y0 + (piece.y0 - dev.y0),
                image: image.clone(),
            };
            self.dispatch(CommandPayload::Image(cmd), caps.clone());
        }
        self.box_scratch = pieces;
    }

    pub fn draw_glyph(&mut self, pt: IntPoint, glyph: &Glyph, clip: Option<IntBox>) {
        let mut set = GlyphSet::new();
        set.push(glyph.clone());
        self.draw_glyph_set(pt, &set, clip);
    }

    /// Blends a shaped glyph run with its pen origin at `pt`. `clip` is an
    /// optional extra rectangle in user coordinates.
    pub fn draw_glyph_set(&mut self, pt: IntPoint, set: &GlyphSet, clip: Option<IntBox>) {
        if set.is_empty() {
            return;
        }
        let origin = self.clip.work_origin;
        let pen = pt.translated(origin.x, origin.y);
        let mut bounds = set.bounding_box(pen.x, pen.y);
        if let Some(extra) = clip {
            bounds = bounds.intersected(&extra.translated(origin.x, origin.y));
        }
        if !bounds.is_valid() {
            return;
        }
        let glyphs = Arc::new(set.clone());
        let mut pieces = std::mem::take(&mut self.box_scratch);
        pieces.clear();
        if self.clip.work_region_used {
            self.clip.work_region.clip_box_into(&bounds, &mut pieces);
        } else {
            let clipped = bounds.intersected(&self.clip.clip_box);
            if clipped.is_valid() {
                pieces.push(clipped);
            }
        }
        let caps = self.caps.clone();
        for piece in &pieces {
            let cmd = GlyphSetCommand {
                glyphs: glyphs.clone(),
                pen,
                bounds: *piece,
            };
            self.dispatch(CommandPayload::GlyphSet(cmd), caps.clone());
        }
        self.box_scratch = pieces;
    }

    /// Shapes `text` through `source` with simple pen advancement and
    /// draws the resulting run.
    pub fn draw_text(
        &mut self,
        pt: IntPoint,
        text: &str,
        source: &impl GlyphSource,
        clip: Option<IntBox>,
    ) {
        let mut set = GlyphSet::new();
        for ch in text.chars() {
            if let Some(glyph) = source.glyph(ch) {
                set.push(glyph);
            }
        }
        self.draw_glyph_set(pt, &set, clip);
    }

    // ── Serialization ───────────────────────────────────────────────────

    /// Renders immediately in single-threaded mode, or records and
    /// publishes a command for the workers.
    fn dispatch(&mut self, payload: CommandPayload, caps: Arc<CapsState>) {
        let pattern = if caps.is_solid {
            None
        } else {
            self.pattern_ctx.clone()
        };
        if let Some(mt) = &self.mt {
            if mt.shared.is_full() {
                mt.shared.flush();
            }
            let cmd = Command::new(
                &mut self.allocator,
                self.clip.clone(),
                caps,
                pattern,
                payload,
            );
            mt.shared.publish(cmd);
        } else {
            match &payload {
                CommandPayload::Path(path) => self.ctx.render_path(
                    &caps,
                    &self.clip,
                    pattern.as_deref(),
                    &path.rasterizer,
                ),
                CommandPayload::Boxes(boxes) => {
                    self.ctx.render_boxes(&caps, pattern.as_deref(), boxes)
                }
                CommandPayload::Image(image) => self.ctx.render_image(&caps, image),
                CommandPayload::GlyphSet(glyphs) => {
                    self.ctx.render_glyph_set(&caps, pattern.as_deref(), glyphs)
                }
            }
        }
    }
}

impl Drop for Painter<'_> {
    fn drop(&mut self) {
        self.teardown_mt();
    }
}

/// Builds an elliptic arc path from quadratic segments; `None` for
/// degenerate geometry.
fn arc_path(center: Point, radii: Vector, start: f32, sweep: f32, close: bool) -> Option<Path> {
    if radii.x <= 0.0 || radii.y <= 0.0 || sweep == 0.0 {
        return None;
    }
    let arc = lyon::geom::Arc {
        center,
        radii,
        start_angle: Angle::radians(start),
        sweep_angle: Angle::radians(sweep),
        x_rotation: Angle::zero(),
    };
    let mut builder = Path::builder();
    builder.begin(arc.from());
    arc.for_each_quadratic_bezier(&mut |segment| {
        builder.quadratic_bezier_to(segment.ctrl, segment.to);
    });
    builder.end(close);
    Some(builder.build())
}
