//! End-to-end pixel expectations for the painter.
//!
//! These tests attach a painter to a small in-memory surface, draw, flush,
//! and then validate bytes at specific positions, including the guarantee
//! that multithreaded rendering is byte-identical to single-threaded
//! rendering.

use lienzo::{
    Color, CompositeOp, ExtendMode, FillRule, Glyph, GlyphSet, GradientStop, Image, IntBox,
    IntPoint, MathRect, Painter, PatternSource, PixelFormat, Region, Surface,
};
use lienzo::lyon::math::{point, vector};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn prgb32_surface(pixels: &mut Vec<u8>, width: u32, height: u32) -> Surface<'_> {
    pixels.clear();
    pixels.resize((width * height * 4) as usize, 0);
    Surface::new(pixels, width, height, (width * 4) as usize, PixelFormat::Prgb32).unwrap()
}

fn pixel(buf: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
    let i = ((y * width + x) * 4) as usize;
    [buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]
}

#[test]
fn opaque_src_over_fill_covers_exactly_the_rect() {
    init_logging();
    let mut pixels = Vec::new();
    {
        let surface = prgb32_surface(&mut pixels, 16, 1);
        let mut painter = Painter::new(surface).unwrap();
        painter.set_source_rgba(Color::from_argb(0xFFFF0000));
        painter.set_op(CompositeOp::SrcOver);
        painter.fill_rect(IntBox::from_xywh(0, 0, 8, 1));
        painter.flush().unwrap();
    }
    for x in 0..8 {
        assert_eq!(pixel(&pixels, 16, x, 0), [0x00, 0x00, 0xFF, 0xFF], "x={x}");
    }
    for x in 8..16 {
        assert_eq!(pixel(&pixels, 16, x, 0), [0, 0, 0, 0], "x={x}");
    }
}

#[test]
fn half_alpha_fill_stores_premultiplied_pixels() {
    init_logging();
    let mut pixels = Vec::new();
    {
        let surface = prgb32_surface(&mut pixels, 4, 4);
        let mut painter = Painter::new(surface).unwrap();
        painter.set_source_rgba(Color::from_argb(0x80FF0000));
        painter.set_op(CompositeOp::SrcOver);
        painter.fill_rect(IntBox::from_xywh(1, 1, 2, 2));
        painter.flush().unwrap();
    }
    for y in 1..3 {
        for x in 1..3 {
            assert_eq!(pixel(&pixels, 4, x, y), [0x00, 0x00, 0x80, 0x80], "({x},{y})");
        }
    }
    for i in 0..4 {
        assert_eq!(pixel(&pixels, 4, i, 0), [0, 0, 0, 0]);
        assert_eq!(pixel(&pixels, 4, i, 3), [0, 0, 0, 0]);
        assert_eq!(pixel(&pixels, 4, 0, i), [0, 0, 0, 0]);
        assert_eq!(pixel(&pixels, 4, 3, i), [0, 0, 0, 0]);
    }
}

#[test]
fn two_worker_fill_reaches_every_scanline() {
    init_logging();
    let mut pixels = Vec::new();
    {
        let surface = prgb32_surface(&mut pixels, 256, 256);
        let mut painter = Painter::new(surface).unwrap();
        painter.set_property("threads", 2).unwrap();
        assert_eq!(painter.get_property("multithreaded").unwrap(), 1);
        painter.set_source_rgba(Color::from_argb(0xFF112233));
        painter.set_op(CompositeOp::SrcOver);
        painter.fill_rect(IntBox::from_xywh(0, 0, 256, 256));
        painter.flush().unwrap();
    }
    for y in 0..256 {
        for x in 0..256 {
            assert_eq!(pixel(&pixels, 256, x, y), [0x33, 0x22, 0x11, 0xFF], "({x},{y})");
        }
    }
}

#[test]
fn simple_rect_outline_respects_the_clip_box() {
    init_logging();
    let mut pixels = Vec::new();
    {
        let surface = prgb32_surface(&mut pixels, 16, 16);
        let mut painter = Painter::new(surface).unwrap();
        painter.set_user_region(Some(Region::from_box(IntBox::new(0, 0, 8, 8))));
        painter.set_source_rgba(Color::from_argb(0xFFFFFFFF));
        painter.draw_rect(IntBox::from_xywh(0, 0, 10, 10));
        painter.flush().unwrap();
    }
    let white = [0xFF; 4];
    let zero = [0u8; 4];
    // Top edge and left edge survive inside the clip.
    for x in 0..8 {
        assert_eq!(pixel(&pixels, 16, x, 0), white, "top x={x}");
    }
    for y in 1..8 {
        assert_eq!(pixel(&pixels, 16, 0, y), white, "left y={y}");
    }
    // The right/bottom edges at x=9/y=9 are outside the clip; nothing at
    // or beyond the clip boundary is modified.
    for y in 0..16 {
        for x in 0..16 {
            if x >= 8 || y >= 8 {
                assert_eq!(pixel(&pixels, 16, x, y), zero, "outside ({x},{y})");
            }
        }
    }
    // Interior untouched.
    assert_eq!(pixel(&pixels, 16, 4, 4), zero);
}

#[test]
fn glyph_mask_blends_premultiplied_solid_source() {
    init_logging();
    let mut pixels = Vec::new();
    {
        let surface = prgb32_surface(&mut pixels, 32, 32);
        let mut painter = Painter::new(surface).unwrap();
        painter.set_source_rgba(Color::from_argb(0xFF808080));
        painter.set_op(CompositeOp::SrcOver);
        let glyph = Glyph::new(vec![0xFF; 25], 5, 5, 0, 0, 5).unwrap();
        painter.draw_glyph(IntPoint::new(10, 10), &glyph, None);
        painter.flush().unwrap();
    }
    for y in 10..15 {
        for x in 10..15 {
            assert_eq!(pixel(&pixels, 32, x, y), [0x80, 0x80, 0x80, 0xFF], "({x},{y})");
        }
    }
    assert_eq!(pixel(&pixels, 32, 9, 10), [0, 0, 0, 0]);
    assert_eq!(pixel(&pixels, 32, 15, 14), [0, 0, 0, 0]);
}

#[test]
fn command_ring_overflow_flushes_and_keeps_painting() {
    init_logging();
    let mut pixels = Vec::new();
    {
        let surface = prgb32_surface(&mut pixels, 16, 4);
        let mut painter = Painter::new(surface).unwrap();
        painter.set_property("threads", 2).unwrap();
        painter.set_source_rgba(Color::from_argb(0xFF0000FF));
        for _ in 0..4097 {
            painter.fill_rect(IntBox::from_xywh(1, 1, 2, 2));
        }
        painter.flush().unwrap();
    }
    assert_eq!(pixel(&pixels, 16, 1, 1), [0xFF, 0x00, 0x00, 0xFF]);
    assert_eq!(pixel(&pixels, 16, 0, 0), [0, 0, 0, 0]);
}

#[test]
fn degenerate_rects_draw_nothing() {
    init_logging();
    let mut pixels = Vec::new();
    {
        let surface = prgb32_surface(&mut pixels, 8, 8);
        let mut painter = Painter::new(surface).unwrap();
        painter.set_source_rgba(Color::WHITE);
        painter.fill_rect(IntBox::from_xywh(2, 2, 0, 5));
        painter.fill_rect(IntBox::from_xywh(2, 2, 5, -1));
        painter.draw_rect(IntBox::from_xywh(1, 1, -3, 4));
        painter.flush().unwrap();
    }
    assert!(pixels.iter().all(|&b| b == 0));
}

#[test]
fn subsumed_rect_ignores_region_engagement() {
    init_logging();
    let fill = IntBox::from_xywh(2, 2, 4, 4);

    let mut plain = Vec::new();
    {
        let surface = prgb32_surface(&mut plain, 8, 8);
        let mut painter = Painter::new(surface).unwrap();
        painter.set_user_region(Some(Region::from_box(IntBox::new(0, 0, 8, 8))));
        painter.set_source_rgba(Color::WHITE);
        painter.fill_rect(fill);
        painter.flush().unwrap();
    }

    let mut banded = Vec::new();
    {
        let surface = prgb32_surface(&mut banded, 8, 8);
        let mut painter = Painter::new(surface).unwrap();
        // Two bands whose union is the same 8×8 area; engages the
        // region path instead of the clip-box fast path.
        painter.set_user_region(Some(Region::from_boxes([
            IntBox::new(0, 0, 8, 4),
            IntBox::new(0, 4, 8, 8),
        ])));
        painter.set_source_rgba(Color::WHITE);
        painter.fill_rect(fill);
        painter.flush().unwrap();
    }

    assert_eq!(plain, banded);
}

#[test]
fn opaque_source_over_equals_source() {
    init_logging();
    let mut over = Vec::new();
    {
        let surface = prgb32_surface(&mut over, 8, 8);
        let mut painter = Painter::new(surface).unwrap();
        painter.set_source_rgba(Color::from_argb(0xFF123456));
        painter.set_op(CompositeOp::SrcOver);
        painter.fill_rect(IntBox::from_xywh(0, 0, 8, 8));
        painter.flush().unwrap();
    }
    let mut src = Vec::new();
    {
        let surface = prgb32_surface(&mut src, 8, 8);
        let mut painter = Painter::new(surface).unwrap();
        painter.set_source_rgba(Color::from_argb(0xFF123456));
        painter.set_op(CompositeOp::Src);
        painter.fill_rect(IntBox::from_xywh(0, 0, 8, 8));
        painter.flush().unwrap();
    }
    assert_eq!(over, src);
}

#[test]
fn large_surfaces_enable_multithreading_automatically() {
    init_logging();
    let mut pixels = Vec::new();
    {
        let surface = prgb32_surface(&mut pixels, 512, 512);
        let mut painter = Painter::new(surface).unwrap();
        assert_eq!(painter.get_property("multithreaded").unwrap(), 1);
        painter.set_source_rgba(Color::from_argb(0xFFABCDEF));
        painter.fill_rect(IntBox::from_xywh(100, 200, 50, 50));
        painter.flush().unwrap();
    }
    assert_eq!(pixel(&pixels, 512, 125, 225), [0xEF, 0xCD, 0xAB, 0xFF]);
    assert_eq!(pixel(&pixels, 512, 99, 200), [0, 0, 0, 0]);
}

#[test]
fn unknown_properties_are_rejected() {
    init_logging();
    let mut pixels = Vec::new();
    let surface = prgb32_surface(&mut pixels, 8, 8);
    let mut painter = Painter::new(surface).unwrap();
    assert!(matches!(
        painter.set_property("turbo", 1),
        Err(lienzo::Error::InvalidProperty(_))
    ));
    assert!(painter.get_property("turbo").is_err());
    assert_eq!(painter.get_property("multithreaded").unwrap(), 0);
}

fn checkerboard_image() -> Image {
    let mut data = Vec::with_capacity(16 * 16 * 4);
    for y in 0..16u32 {
        for x in 0..16u32 {
            let on = (x / 4 + y / 4) % 2 == 0;
            let px: u32 = if on { 0xFF2060A0 } else { 0x8010_3050 };
            data.extend_from_slice(&px.to_le_bytes());
        }
    }
    Image::new(data, 16, 16, 64, PixelFormat::Prgb32).unwrap()
}

fn paint_reference_scene(painter: &mut Painter<'_>) {
    painter.set_source_rgba(Color::from_argb(0xFF204060));
    painter.set_op(CompositeOp::Src);
    painter.clear();

    // Gradient-filled ellipse.
    painter.set_op(CompositeOp::SrcOver);
    painter.set_source_pattern(PatternSource::LinearGradient {
        from: point(0.0, 0.0),
        to: point(96.0, 96.0),
        stops: vec![
            GradientStop::new(0.0, Color::from_argb(0xFFFF0000)),
            GradientStop::new(1.0, Color::from_argb(0xFF0000FF)),
        ],
        extend: ExtendMode::Pad,
    });
    painter.fill_ellipse(point(48.0, 40.0), vector(30.0, 22.0));

    // Dashed stroked diagonal.
    painter.set_source_rgba(Color::from_argb(0xC0FFFFFF));
    painter.set_line_width(3.0);
    painter.set_line_dash(&[6.0, 3.0]);
    painter.draw_line(point(4.0, 90.0), point(92.0, 6.0));
    painter.set_line_dash(&[]);

    // Semi-transparent boxes under different operators.
    painter.set_source_rgba(Color::from_argb(0x80FFD000));
    painter.set_op(CompositeOp::Add);
    painter.fill_rect(IntBox::from_xywh(8, 60, 30, 24));
    painter.set_op(CompositeOp::DstOut);
    painter.fill_rect(IntBox::from_xywh(50, 60, 30, 24));

    // Image blit.
    painter.set_op(CompositeOp::SrcOver);
    let image = checkerboard_image();
    painter.draw_image(IntPoint::new(60, 8), &image);

    // Glyph run under a translated user origin.
    painter.set_user_origin(IntPoint::new(10, 70));
    painter.set_source_rgba(Color::from_argb(0xFF00FF80));
    let glyph = Glyph::new(vec![0xA0; 36], 6, 6, 0, -6, 7).unwrap();
    let mut set = GlyphSet::new();
    set.push(glyph.clone());
    set.push(glyph);
    painter.draw_glyph_set(IntPoint::new(0, 10), &set, None);
    painter.reset_user_vars();

    // A transformed even-odd polygon.
    painter.set_fill_rule(FillRule::EvenOdd);
    painter.rotate(0.3);
    painter.fill_polygon(&[
        point(30.0, 20.0),
        point(70.0, 20.0),
        point(30.0, 50.0),
        point(70.0, 50.0),
    ]);
    painter.reset_matrix();
    painter.set_fill_rule(FillRule::NonZero);

    // Rounded outline with a viewport transform applied and removed.
    painter.viewport(
        MathRect::new(point(0.0, 0.0), point(96.0, 96.0)),
        MathRect::new(point(0.0, 0.0), point(48.0, 48.0)),
    );
    painter.set_line_width(2.0);
    painter.draw_round(
        MathRect::new(point(10.0, 10.0), point(80.0, 80.0)),
        8.0,
    );
    painter.reset_matrix();
}

#[test]
fn worker_counts_produce_identical_pixels() {
    init_logging();
    let mut reference = Vec::new();
    {
        let surface = prgb32_surface(&mut reference, 96, 96);
        let mut painter = Painter::new(surface).unwrap();
        paint_reference_scene(&mut painter);
        painter.flush().unwrap();
    }

    for workers in 1..=4u32 {
        let mut pixels = Vec::new();
        {
            let surface = prgb32_surface(&mut pixels, 96, 96);
            let mut painter = Painter::new(surface).unwrap();
            painter.set_property("threads", workers).unwrap();
            paint_reference_scene(&mut painter);
            painter.flush().unwrap();
        }
        assert_eq!(
            pixels, reference,
            "{workers}-worker rendering must match single-threaded output"
        );
    }
}

#[test]
fn texture_pattern_fills_repeat() {
    init_logging();
    let mut pixels = Vec::new();
    {
        let surface = prgb32_surface(&mut pixels, 32, 8);
        let mut painter = Painter::new(surface).unwrap();
        painter.set_source_pattern(PatternSource::Texture {
            image: checkerboard_image(),
            extend: ExtendMode::Repeat,
        });
        painter.set_op(CompositeOp::Src);
        painter.fill_rect(IntBox::from_xywh(0, 0, 32, 8));
        painter.flush().unwrap();
    }
    // The checkerboard has period 16 horizontally.
    for x in 0..16 {
        assert_eq!(
            pixel(&pixels, 32, x, 3),
            pixel(&pixels, 32, x + 16, 3),
            "x={x}"
        );
    }
    assert_eq!(pixel(&pixels, 32, 0, 0), [0xA0, 0x60, 0x20, 0xFF]);
}
