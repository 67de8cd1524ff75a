//! The scanline edge rasterizer.
//!
//! Closed polygons go in as 24.8 fixed-point edges; what comes out is, per
//! destination scanline, a set of horizontal spans with 8-bit coverage.
//! Internally this is the classic coverage-cell scheme: every edge crossing
//! of a pixel cell accumulates a signed `cover` (vertical extent) and
//! `area` (cover weighted by horizontal position); after a single sort the
//! cells of one row can be swept into spans with any fill rule.
//!
//! A rasterizer is single-writer: the producer builds and sorts it, then it
//! is shared read-only. `sweep_scanline` takes `&self` and random-accesses
//! the row index, so workers sweep disjoint rows of the same rasterizer
//! concurrently without coordination.

use lyon::math::Point;

use crate::flatten::Contour;
use crate::geom::IntBox;

/// How self-overlapping geometry is filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillRule {
    #[default]
    NonZero,
    EvenOdd,
}

const SUB_SHIFT: i32 = 8;
const SUB_SCALE: i32 = 1 << SUB_SHIFT;
const SUB_MASK: i32 = SUB_SCALE - 1;

// Long nearly-horizontal edges overflow the incremental math; split them.
const DX_LIMIT: i32 = 16384 << SUB_SHIFT;

#[derive(Debug, Clone, Copy)]
struct Cell {
    x: i32,
    y: i32,
    cover: i32,
    area: i32,
}

/// One scanline worth of coverage spans.
///
/// `len > 0`: `len` pixels with per-pixel coverage starting at
/// `covers_start`. `len < 0`: a solid run of `-len` pixels whose single
/// coverage byte is at `covers_start`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Span {
    pub(crate) x: i32,
    pub(crate) len: i32,
    pub(crate) covers_start: u32,
}

#[derive(Debug, Default)]
pub(crate) struct Scanline {
    pub(crate) spans: Vec<Span>,
    pub(crate) covers: Vec<u8>,
}

impl Scanline {
    pub(crate) fn reset(&mut self) {
        self.spans.clear();
        self.covers.clear();
    }

    #[inline]
    fn push_cell(&mut self, x: i32, cover: u8) {
        if let Some(last) = self.spans.last_mut() {
            if last.len > 0 && last.x + last.len == x {
                last.len += 1;
                self.covers.push(cover);
                return;
            }
        }
        self.spans.push(Span {
            x,
            len: 1,
            covers_start: self.covers.len() as u32,
        });
        self.covers.push(cover);
    }

    #[inline]
    fn push_span(&mut self, x: i32, len: i32, cover: u8) {
        self.spans.push(Span {
            x,
            len: -len,
            covers_start: self.covers.len() as u32,
        });
        self.covers.push(cover);
    }
}

/// Cell-accumulating rasterizer with a post-sort row index.
#[derive(Debug)]
pub(crate) struct Rasterizer {
    cells: Vec<Cell>,
    cur: Cell,
    has_cur: bool,
    sorted: bool,
    fill_rule: FillRule,
    clip: IntBox,
    // Row index over the sorted cells, one entry per y in
    // [min_y, max_y] plus a terminator.
    row_starts: Vec<u32>,
    min_x: i32,
    min_y: i32,
    max_x: i32,
    max_y: i32,
    // Scratch for polygon clipping.
    clip_a: Vec<Point>,
    clip_b: Vec<Point>,
}

impl Rasterizer {
    pub(crate) fn new() -> Self {
        Self {
            cells: Vec::new(),
            cur: Cell {
                x: 0,
                y: 0,
                cover: 0,
                area: 0,
            },
            has_cur: false,
            sorted: false,
            fill_rule: FillRule::NonZero,
            clip: IntBox::default(),
            row_starts: Vec::new(),
            min_x: i32::MAX,
            min_y: i32::MAX,
            max_x: i32::MIN,
            max_y: i32::MIN,
            clip_a: Vec::new(),
            clip_b: Vec::new(),
        }
    }

    pub(crate) fn reset(&mut self, clip: IntBox, fill_rule: FillRule) {
        self.cells.clear();
        self.has_cur = false;
        self.sorted = false;
        self.fill_rule = fill_rule;
        self.clip = clip;
        self.row_starts.clear();
        self.min_x = i32::MAX;
        self.min_y = i32::MAX;
        self.max_x = i32::MIN;
        self.max_y = i32::MIN;
    }

    /// Adds a closed polygon, clipped to the clip box.
    pub(crate) fn add_polygon(&mut self, points: &[Point]) {
        if points.len() < 3 || !self.clip.is_valid() {
            return;
        }
        let mut a = std::mem::take(&mut self.clip_a);
        let mut b = std::mem::take(&mut self.clip_b);
        clip_polygon(points, &self.clip, &mut a, &mut b);
        if a.len() >= 3 {
            let mut prev = upscale(a[a.len() - 1]);
            for &p in a.iter() {
                let cur = upscale(p);
                self.render_line(prev.0, prev.1, cur.0, cur.1);
                prev = cur;
            }
        }
        a.clear();
        b.clear();
        self.clip_a = a;
        self.clip_b = b;
    }

    /// Adds every contour of a flattened path as a closed polygon.
    pub(crate) fn add_contours(&mut self, contours: &[Contour]) {
        for contour in contours {
            self.add_polygon(&contour.points);
        }
    }

    /// Sorts the cells and builds the row index. Must be called before the
    /// rasterizer is shared with sweepers.
    pub(crate) fn sort(&mut self) {
        if self.sorted {
            return;
        }
        self.flush_cur();
        self.cells.sort_unstable_by_key(|c| (c.y, c.x));
        for c in &self.cells {
            self.min_x = self.min_x.min(c.x);
            self.max_x = self.max_x.max(c.x);
            self.min_y = self.min_y.min(c.y);
            self.max_y = self.max_y.max(c.y);
        }
        self.row_starts.clear();
        if !self.cells.is_empty() {
            let rows = (self.max_y - self.min_y + 2) as usize;
            self.row_starts.reserve(rows);
            let mut i = 0u32;
            for y in self.min_y..=self.max_y {
                self.row_starts.push(i);
                while (i as usize) < self.cells.len() && self.cells[i as usize].y == y {
                    i += 1;
                }
            }
            self.row_starts.push(i);
        }
        self.sorted = true;
    }

    pub(crate) fn has_cells(&self) -> bool {
        debug_assert!(self.sorted);
        !self.cells.is_empty()
    }

    pub(crate) fn min_y(&self) -> i32 {
        self.min_y
    }

    pub(crate) fn max_y(&self) -> i32 {
        self.max_y
    }

    pub(crate) fn min_x(&self) -> i32 {
        self.min_x
    }

    pub(crate) fn max_x(&self) -> i32 {
        self.max_x
    }

    fn row_cells(&self, y: i32) -> &[Cell] {
        if y < self.min_y || y > self.max_y || self.cells.is_empty() {
            return &[];
        }
        let i = (y - self.min_y) as usize;
        let start = self.row_starts[i] as usize;
        let end = self.row_starts[i + 1] as usize;
        &self.cells[start..end]
    }

    /// Sweeps row `y` into `scanline`. Returns false when the row is empty.
    pub(crate) fn sweep_scanline(&self, scanline: &mut Scanline, y: i32) -> bool {
        debug_assert!(self.sorted);
        scanline.reset();
        let cells = self.row_cells(y);
        if cells.is_empty() {
            return false;
        }

        let mut cover = 0i32;
        let mut i = 0usize;
        while i < cells.len() {
            let x = cells[i].x;
            let mut area = 0i32;
            while i < cells.len() && cells[i].x == x {
                area += cells[i].area;
                cover += cells[i].cover;
                i += 1;
            }
            if area != 0 {
                let alpha = self.alpha((cover << (SUB_SHIFT + 1)) - area);
                if alpha != 0 {
                    scanline.push_cell(x, alpha);
                }
            }
            if i < cells.len() {
                let next_x = cells[i].x;
                let gap_start = if area != 0 { x + 1 } else { x };
                if next_x > gap_start {
                    let alpha = self.alpha(cover << (SUB_SHIFT + 1));
                    if alpha != 0 {
                        scanline.push_span(gap_start, next_x - gap_start, alpha);
                    }
                }
            }
        }
        !scanline.spans.is_empty()
    }

    #[inline]
    fn alpha(&self, area: i32) -> u8 {
        let mut cover = area >> (SUB_SHIFT * 2 + 1 - 8);
        if cover < 0 {
            cover = -cover;
        }
        if self.fill_rule == FillRule::EvenOdd {
            cover &= 511;
            if cover > 256 {
                cover = 512 - cover;
            }
        }
        cover.min(255) as u8
    }

    // ── Cell accumulation ────────────────────────────────────────────────

    #[inline]
    fn set_cur_cell(&mut self, x: i32, y: i32) {
        if !self.has_cur || self.cur.x != x || self.cur.y != y {
            self.flush_cur();
            self.cur = Cell {
                x,
                y,
                cover: 0,
                area: 0,
            };
            self.has_cur = true;
        }
    }

    #[inline]
    fn flush_cur(&mut self) {
        if self.has_cur && (self.cur.cover != 0 || self.cur.area != 0) {
            self.cells.push(self.cur);
        }
        self.has_cur = false;
    }

    fn render_hline(&mut self, ey: i32, x1: i32, y1: i32, x2: i32, y2: i32) {
        let ex1 = x1 >> SUB_SHIFT;
        let ex2 = x2 >> SUB_SHIFT;
        let fx1 = x1 & SUB_MASK;
        let fx2 = x2 & SUB_MASK;

        if y1 == y2 {
            self.set_cur_cell(ex2, ey);
            return;
        }

        if ex1 == ex2 {
            let delta = y2 - y1;
            self.cur.cover += delta;
            self.cur.area += (fx1 + fx2) * delta;
            return;
        }

        let mut p = (SUB_SCALE - fx1) * (y2 - y1);
        let mut first = SUB_SCALE;
        let mut incr = 1;
        let mut dx = x2 - x1;
        if dx < 0 {
            p = fx1 * (y2 - y1);
            first = 0;
            incr = -1;
            dx = -dx;
        }

        let mut delta = p / dx;
        let mut m = p % dx;
        if m < 0 {
            delta -= 1;
            m += dx;
        }
        self.cur.cover += delta;
        self.cur.area += (fx1 + first) * delta;

        let mut ex1 = ex1 + incr;
        self.set_cur_cell(ex1, ey);
        let mut y1 = y1 + delta;

        if ex1 != ex2 {
            let p = SUB_SCALE * (y2 - y1 + delta);
            let mut lift = p / dx;
            let mut rem = p % dx;
            if rem < 0 {
                lift -= 1;
                rem += dx;
            }
            m -= dx;
            while ex1 != ex2 {
                delta = lift;
                m += rem;
                if m >= 0 {
                    m -= dx;
                    delta += 1;
                }
                self.cur.cover += delta;
                self.cur.area += SUB_SCALE * delta;
                y1 += delta;
                ex1 += incr;
                self.set_cur_cell(ex1, ey);
            }
        }
        let delta = y2 - y1;
        self.cur.cover += delta;
        self.cur.area += (fx2 + SUB_SCALE - first) * delta;
    }

    fn render_line(&mut self, x1: i32, y1: i32, x2: i32, y2: i32) {
        let dx = x2 - x1;
        if dx >= DX_LIMIT || dx <= -DX_LIMIT {
            let cx = (x1 + x2) >> 1;
            let cy = (y1 + y2) >> 1;
            self.render_line(x1, y1, cx, cy);
            self.render_line(cx, cy, x2, y2);
            return;
        }

        let mut dy = y2 - y1;
        let ey1 = y1 >> SUB_SHIFT;
        let ey2 = y2 >> SUB_SHIFT;
        let fy1 = y1 & SUB_MASK;
        let fy2 = y2 & SUB_MASK;

        // Position the accumulator on the segment's start cell; edges of a
        // contour are contiguous but contours are not.
        self.set_cur_cell(x1 >> SUB_SHIFT, ey1);

        if ey1 == ey2 {
            self.render_hline(ey1, x1, fy1, x2, fy2);
            return;
        }

        let mut incr = 1;
        if dx == 0 {
            let ex = x1 >> SUB_SHIFT;
            let two_fx = (x1 - (ex << SUB_SHIFT)) << 1;
            let mut first = SUB_SCALE;
            if dy < 0 {
                first = 0;
                incr = -1;
            }
            let mut ey1 = ey1;
            let mut delta = first - fy1;
            self.cur.cover += delta;
            self.cur.area += two_fx * delta;
            ey1 += incr;
            self.set_cur_cell(ex, ey1);
            delta = first + first - SUB_SCALE;
            while ey1 != ey2 {
                self.cur.cover += delta;
                self.cur.area += two_fx * delta;
                ey1 += incr;
                self.set_cur_cell(ex, ey1);
            }
            let delta = fy2 - SUB_SCALE + first;
            self.cur.cover += delta;
            self.cur.area += two_fx * delta;
            return;
        }

        let mut p = (SUB_SCALE - fy1) * dx;
        let mut first = SUB_SCALE;
        if dy < 0 {
            p = fy1 * dx;
            first = 0;
            incr = -1;
            dy = -dy;
        }

        let mut delta = p / dy;
        let mut m = p % dy;
        if m < 0 {
            delta -= 1;
            m += dy;
        }

        let mut x_from = x1 + delta;
        self.render_hline(ey1, x1, fy1, x_from, first);
        let mut ey1 = ey1 + incr;
        self.set_cur_cell(x_from >> SUB_SHIFT, ey1);

        if ey1 != ey2 {
            let p = SUB_SCALE * dx;
            let mut lift = p / dy;
            let mut rem = p % dy;
            if rem < 0 {
                lift -= 1;
                rem += dy;
            }
            m -= dy;
            while ey1 != ey2 {
                delta = lift;
                m += rem;
                if m >= 0 {
                    m -= dy;
                    delta += 1;
                }
                let x_to = x_from + delta;
                self.render_hline(ey1, x_from, SUB_SCALE - first, x_to, first);
                x_from = x_to;
                ey1 += incr;
                self.set_cur_cell(x_from >> SUB_SHIFT, ey1);
            }
        }
        self.render_hline(ey1, x_from, SUB_SCALE - first, x2, fy2);
    }
}

#[inline]
fn upscale(p: Point) -> (i32, i32) {
    (
        (p.x * SUB_SCALE as f32).round() as i32,
        (p.y * SUB_SCALE as f32).round() as i32,
    )
}

/// Sutherland-Hodgman clip of a polygon against a box. Result in `out`;
/// `tmp` is scratch.
fn clip_polygon(points: &[Point], clip: &IntBox, out: &mut Vec<Point>, tmp: &mut Vec<Point>) {
    out.clear();
    tmp.clear();
    out.extend_from_slice(points);

    let edges: [(f32, bool, bool); 4] = [
        (clip.x0 as f32, true, false),  // x >= x0
        (clip.x1 as f32, true, true),   // x <= x1
        (clip.y0 as f32, false, false), // y >= y0
        (clip.y1 as f32, false, true),  // y <= y1
    ];

    for (bound, is_x, is_max) in edges {
        tmp.clear();
        let inside = |p: &Point| {
            let v = if is_x { p.x } else { p.y };
            if is_max {
                v <= bound
            } else {
                v >= bound
            }
        };
        let intersect = |a: &Point, b: &Point| -> Point {
            if is_x {
                let t = (bound - a.x) / (b.x - a.x);
                Point::new(bound, a.y + (b.y - a.y) * t)
            } else {
                let t = (bound - a.y) / (b.y - a.y);
                Point::new(a.x + (b.x - a.x) * t, bound)
            }
        };
        for i in 0..out.len() {
            let cur = out[i];
            let prev = out[(i + out.len() - 1) % out.len()];
            match (inside(&prev), inside(&cur)) {
                (true, true) => tmp.push(cur),
                (true, false) => tmp.push(intersect(&prev, &cur)),
                (false, true) => {
                    tmp.push(intersect(&prev, &cur));
                    tmp.push(cur);
                }
                (false, false) => {}
            }
        }
        std::mem::swap(out, tmp);
        if out.len() < 3 {
            out.clear();
            return;
        }
    }
}
