//! The renderer core, shared by the single-threaded path and the workers.
//!
//! Every render function walks destination rows on the lattice
//! `y ≡ offset (mod delta)`. Single-threaded rendering is the degenerate
//! lattice `(0, 1)`; in multithreaded mode worker `i` of `n` renders with
//! `(i, n)`, so adjacent workers never touch the same row and the final
//! pixels are independent of worker scheduling.

use crate::pattern::PatternContext;
use crate::raster::{Rasterizer, Scanline};
use crate::surface::RasterTarget;

use super::command::{
    BoxCommand, Command, CommandPayload, GlyphSetCommand, ImageCommand,
};
use super::state::{CapsState, ClipState};

/// Initial pattern/span scratch size, in bytes; grows by powers of two.
const SCRATCH_BYTES: usize = 8192;

/// Returns the least `y' >= y` with `y' ≡ offset (mod delta)`.
#[inline]
pub(crate) fn align_to_delta(y: i32, offset: i32, delta: i32) -> i32 {
    debug_assert!(delta > 0 && offset >= 0 && offset < delta);
    let m = (y - offset).rem_euclid(delta);
    if m == 0 {
        y
    } else {
        y + (delta - m)
    }
}

/// Per-renderer mutable state: the lattice assignment plus scratch buffers.
/// Workers each own one; nothing here is shared.
pub(crate) struct RenderContext {
    pub(crate) offset: i32,
    pub(crate) delta: i32,
    pub(crate) target: RasterTarget,
    scanline: Scanline,
    scratch: Vec<u32>,
    covers: Vec<u8>,
}

impl RenderContext {
    pub(crate) fn new(target: RasterTarget, offset: i32, delta: i32) -> Self {
        Self {
            offset,
            delta,
            target,
            scanline: Scanline::default(),
            scratch: vec![0; SCRATCH_BYTES / 4],
            covers: Vec::new(),
        }
    }

    pub(crate) fn render_command(&mut self, cmd: &Command) {
        let pattern = cmd.pattern.as_deref();
        match &cmd.payload {
            CommandPayload::Path(path) => {
                self.render_path(&cmd.caps, &cmd.clip, pattern, &path.rasterizer)
            }
            CommandPayload::Boxes(boxes) => self.render_boxes(&cmd.caps, pattern, boxes),
            CommandPayload::Image(image) => self.render_image(&cmd.caps, image),
            CommandPayload::GlyphSet(glyphs) => {
                self.render_glyph_set(&cmd.caps, pattern, glyphs)
            }
        }
    }

    /// Fills pre-clipped device boxes with the solid source or pattern.
    pub(crate) fn render_boxes(
        &mut self,
        caps: &CapsState,
        pattern: Option<&PatternContext>,
        cmd: &BoxCommand,
    ) {
        let ops = caps.ops;
        for b in &cmd.boxes {
            if !b.is_valid() {
                continue;
            }
            debug_assert!(self.target.bounds().subsumes(b));
            let w = b.width() as usize;
            let mut y = align_to_delta(b.y0, self.offset, self.delta);
            while y < b.y1 {
                let dst = unsafe { self.target.span_mut(b.x0, y, w) };
                if caps.is_solid {
                    (ops.solid_fill)(dst, caps.solid_prgb);
                } else if let Some(ctx) = pattern {
                    let src = ctx.fetch(&mut self.scratch, b.x0, y, w);
                    (ops.span)(dst, src);
                } else {
                    // Pattern source failed to initialize; skip the draw.
                    return;
                }
                y += self.delta;
            }
        }
    }

    /// Sweeps a sorted rasterizer into coverage spans and composites them.
    ///
    /// The rasterizer is already clipped to the clip box; when the clip is
    /// a multi-rectangle region the spans are additionally intersected
    /// with the region's rows here.
    pub(crate) fn render_path(
        &mut self,
        caps: &CapsState,
        clip: &ClipState,
        pattern: Option<&PatternContext>,
        ras: &Rasterizer,
    ) {
        if !ras.has_cells() {
            return;
        }
        if !caps.is_solid && pattern.is_none() {
            return;
        }
        debug_assert!(ras.min_x() >= 0 && ras.max_x() < self.target.width);
        let ops = caps.ops;
        let mut pieces: Vec<(i32, i32)> = Vec::new();
        let mut y = align_to_delta(ras.min_y(), self.offset, self.delta);
        while y <= ras.max_y() {
            if ras.sweep_scanline(&mut self.scanline, y) {
                let scanline = &self.scanline;
                for span in &scanline.spans {
                    let start = span.covers_start as usize;
                    let (x, len) = if span.len > 0 {
                        (span.x, span.len)
                    } else {
                        (span.x, -span.len)
                    };

                    pieces.clear();
                    if clip.work_region_used {
                        for b in clip.work_region.boxes() {
                            if y >= b.y0 && y < b.y1 {
                                let px0 = x.max(b.x0);
                                let px1 = (x + len).min(b.x1);
                                if px1 > px0 {
                                    pieces.push((px0, px1 - px0));
                                }
                            }
                        }
                    } else {
                        pieces.push((x, len));
                    }

                    for &(px, plen) in &pieces {
                        let plen = plen as usize;
                        let dst = unsafe { self.target.span_mut(px, y, plen) };
                        if span.len > 0 {
                            let cover_off = start + (px - span.x) as usize;
                            let covers = &scanline.covers[cover_off..cover_off + plen];
                            if caps.is_solid {
                                (ops.solid_mask)(dst, caps.solid_prgb, covers);
                            } else if let Some(ctx) = pattern {
                                let src = ctx.fetch(&mut self.scratch, px, y, plen);
                                (ops.span_mask)(dst, src, covers);
                            }
                        } else {
                            let cover = scanline.covers[start];
                            if cover == 255 {
                                if caps.is_solid {
                                    (ops.solid_fill)(dst, caps.solid_prgb);
                                } else if let Some(ctx) = pattern {
                                    let src = ctx.fetch(&mut self.scratch, px, y, plen);
                                    (ops.span)(dst, src);
                                }
                            } else {
                                if self.covers.len() < plen {
                                    self.covers.resize(plen.next_power_of_two(), 0);
                                }
                                self.covers[..plen].fill(cover);
                                if caps.is_solid {
                                    (ops.solid_mask)(dst, caps.solid_prgb, &self.covers[..plen]);
                                } else if let Some(ctx) = pattern {
                                    let src = ctx.fetch(&mut self.scratch, px, y, plen);
                                    (ops.span_mask)(dst, src, &self.covers[..plen]);
                                }
                            }
                        }
                    }
                }
            }
            y += self.delta;
        }
    }

    /// Blits a pre-clipped image rectangle; the source row walks the same
    /// lattice so alignment is preserved.
    pub(crate) fn render_image(&mut self, caps: &CapsState, cmd: &ImageCommand) {
        let dst = cmd.dst;
        if !dst.is_valid() {
            return;
        }
        debug_assert!(self.target.bounds().subsumes(&dst));
        let ops = caps.ops;
        let w = dst.width() as usize;
        if self.scratch.len() < w {
            self.scratch.resize(w.next_power_of_two(), 0);
        }
        let mut y = align_to_delta(dst.y0, self.offset, self.delta);
        while y < dst.y1 {
            let sy = cmd.src_y + (y - dst.y0);
            cmd.image.fetch_span(&mut self.scratch[..w], cmd.src_x, sy, w);
            let dst_bytes = unsafe { self.target.span_mut(dst.x0, y, w) };
            (ops.span)(dst_bytes, &self.scratch[..w]);
            y += self.delta;
        }
    }

    /// Blends glyph coverage masks, walking both the destination and the
    /// mask rows on the lattice.
    pub(crate) fn render_glyph_set(
        &mut self,
        caps: &CapsState,
        pattern: Option<&PatternContext>,
        cmd: &GlyphSetCommand,
    ) {
        if !cmd.bounds.is_valid() {
            return;
        }
        if !caps.is_solid && pattern.is_none() {
            return;
        }
        let ops = caps.ops;
        let mut pen_x = cmd.pen.x;
        for glyph in cmd.glyphs.glyphs() {
            let placed = glyph.placed_box(pen_x, cmd.pen.y);
            pen_x += glyph.advance;
            let clipped = placed.intersected(&cmd.bounds);
            if !clipped.is_valid() {
                continue;
            }
            let w = clipped.width() as usize;
            let gx = (clipped.x0 - placed.x0) as usize;
            let mut y = align_to_delta(clipped.y0, self.offset, self.delta);
            while y < clipped.y1 {
                let mask = glyph.coverage_row(y - placed.y0);
                let covers = &mask[gx..gx + w];
                let dst = unsafe { self.target.span_mut(clipped.x0, y, w) };
                if caps.is_solid {
                    (ops.solid_mask)(dst, caps.solid_prgb, covers);
                } else if let Some(ctx) = pattern {
                    let src = ctx.fetch(&mut self.scratch, clipped.x0, y, w);
                    (ops.span_mask)(dst, src, covers);
                }
                y += self.delta;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::align_to_delta;

    #[test]
    fn align_returns_least_solution_at_or_above_y() {
        for delta in 1..5 {
            for offset in 0..delta {
                for y in -10..10 {
                    let a = align_to_delta(y, offset, delta);
                    assert!(a >= y);
                    assert_eq!(a.rem_euclid(delta), offset);
                    assert!(a - y < delta, "least solution for y={y} o={offset} d={delta}");
                }
            }
        }
    }

    #[test]
    fn align_is_identity_on_the_lattice() {
        assert_eq!(align_to_delta(6, 0, 2), 6);
        assert_eq!(align_to_delta(7, 1, 2), 7);
        assert_eq!(align_to_delta(6, 1, 2), 7);
    }
}
