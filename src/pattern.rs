//! Pattern sources and the scanline fetcher.
//!
//! A pattern source describes where non-solid pixels come from; a
//! [`PatternContext`] is the initialized form the renderer actually reads:
//! it precomputes whatever the source needs (gradient color tables) and
//! then serves `fetch(scratch, x, y, len)` calls from any worker thread.
//! The context is immutable after init; each worker brings its own scratch
//! buffer, so concurrent fetches never contend.

use lyon::math::Point;

use crate::color::Color;
use crate::error::{Error, Result};
use crate::image::Image;
use crate::pixel::byte_interp;

/// How a pattern behaves outside its defining area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtendMode {
    #[default]
    Pad,
    Repeat,
    Reflect,
}

/// One gradient color stop; `offset` in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientStop {
    pub offset: f32,
    pub color: Color,
}

impl GradientStop {
    pub fn new(offset: f32, color: Color) -> Self {
        Self { offset, color }
    }
}

/// A non-solid pixel source for fills and strokes.
#[derive(Debug, Clone)]
pub enum PatternSource {
    /// Tiles or clamps an image anchored at the device origin.
    Texture { image: Image, extend: ExtendMode },
    LinearGradient {
        from: Point,
        to: Point,
        stops: Vec<GradientStop>,
        extend: ExtendMode,
    },
    RadialGradient {
        center: Point,
        radius: f32,
        stops: Vec<GradientStop>,
        extend: ExtendMode,
    },
}

const GRADIENT_LUT_SIZE: usize = 256;

/// An initialized, read-only pattern fetcher.
#[derive(Debug)]
pub(crate) struct PatternContext {
    kind: Fetcher,
}

#[derive(Debug)]
enum Fetcher {
    Texture {
        image: Image,
        extend: ExtendMode,
    },
    Linear {
        origin: Point,
        // Gradient direction scaled so that dot(d, p - origin) is already
        // the [0, 1] gradient parameter.
        dx: f32,
        dy: f32,
        lut: Box<[u32; GRADIENT_LUT_SIZE]>,
        extend: ExtendMode,
    },
    Radial {
        center: Point,
        inv_radius: f32,
        lut: Box<[u32; GRADIENT_LUT_SIZE]>,
        extend: ExtendMode,
    },
}

impl PatternContext {
    pub(crate) fn init(source: &PatternSource) -> Result<Self> {
        let kind = match source {
            PatternSource::Texture { image, extend } => Fetcher::Texture {
                image: image.clone(),
                extend: *extend,
            },
            PatternSource::LinearGradient {
                from,
                to,
                stops,
                extend,
            } => {
                let dx = to.x - from.x;
                let dy = to.y - from.y;
                let len2 = dx * dx + dy * dy;
                if !len2.is_finite() || len2 <= 0.0 {
                    return Err(Error::InvalidArgument("degenerate linear gradient axis"));
                }
                Fetcher::Linear {
                    origin: *from,
                    dx: dx / len2,
                    dy: dy / len2,
                    lut: build_gradient_lut(stops)?,
                    extend: *extend,
                }
            }
            PatternSource::RadialGradient {
                center,
                radius,
                stops,
                extend,
            } => {
                if !radius.is_finite() || *radius <= 0.0 {
                    return Err(Error::InvalidArgument("radial gradient radius must be positive"));
                }
                Fetcher::Radial {
                    center: *center,
                    inv_radius: 1.0 / radius,
                    lut: build_gradient_lut(stops)?,
                    extend: *extend,
                }
            }
        };
        Ok(Self { kind })
    }

    /// Produces `len` premultiplied pixels for the run starting at `(x, y)`.
    ///
    /// The returned slice is either `scratch` (filled here) or, for
    /// aligned PRGB32 texture rows fully inside the image, a zero-copy
    /// view of the texture itself.
    pub(crate) fn fetch<'a>(
        &'a self,
        scratch: &'a mut Vec<u32>,
        x: i32,
        y: i32,
        len: usize,
    ) -> &'a [u32] {
        if scratch.len() < len {
            scratch.resize(len.next_power_of_two(), 0);
        }
        match &self.kind {
            Fetcher::Texture { image, extend } => {
                let w = image.width() as i32;
                let h = image.height() as i32;
                if let Some(span) = direct_texture_span(image, *extend, x, y, len) {
                    return span;
                }
                let sy = extend_coord(y, h, *extend);
                let mut filled = 0;
                while filled < len {
                    let sx = extend_coord(x + filled as i32, w, *extend);
                    // Largest contiguous source run from sx; Reflect may be
                    // walking backwards, so fall back to one pixel at a time.
                    let run = match extend {
                        ExtendMode::Pad => {
                            if x + (filled as i32) < 0 || x + filled as i32 >= w {
                                1
                            } else {
                                (w - sx).min((len - filled) as i32).max(1) as usize
                            }
                        }
                        ExtendMode::Repeat => (w - sx).min((len - filled) as i32) as usize,
                        ExtendMode::Reflect => 1,
                    };
                    image.fetch_span(&mut scratch[filled..filled + run], sx, sy, run);
                    filled += run;
                }
                &scratch[..len]
            }
            Fetcher::Linear {
                origin,
                dx,
                dy,
                lut,
                extend,
            } => {
                let mut t = (x as f32 + 0.5 - origin.x) * dx + (y as f32 + 0.5 - origin.y) * dy;
                for out in scratch[..len].iter_mut() {
                    *out = lut[lut_index(t, *extend)];
                    t += dx;
                }
                &scratch[..len]
            }
            Fetcher::Radial {
                center,
                inv_radius,
                lut,
                extend,
            } => {
                let fy = y as f32 + 0.5 - center.y;
                let fy2 = fy * fy;
                for (i, out) in scratch[..len].iter_mut().enumerate() {
                    let fx = x as f32 + i as f32 + 0.5 - center.x;
                    let t = (fx * fx + fy2).sqrt() * inv_radius;
                    *out = lut[lut_index(t, *extend)];
                }
                &scratch[..len]
            }
        }
    }
}

/// Zero-copy fast path: a PRGB32 texture row that fully contains the run
/// and casts cleanly to words.
fn direct_texture_span(
    image: &Image,
    extend: ExtendMode,
    x: i32,
    y: i32,
    len: usize,
) -> Option<&[u32]> {
    if image.format() != crate::pixel::PixelFormat::Prgb32 {
        return None;
    }
    let w = image.width() as i32;
    let h = image.height() as i32;
    if x < 0 || y < 0 || y >= h || x as usize + len > w as usize {
        // Pad still resolves to an in-image row for clamped y.
        if !(extend == ExtendMode::Pad && x >= 0 && (x as usize + len) <= w as usize) {
            return None;
        }
    }
    let sy = extend_coord(y, h, extend);
    let row = image.row(sy);
    let words: &[u32] = bytemuck::try_cast_slice(row).ok()?;
    Some(&words[x as usize..x as usize + len])
}

#[inline]
fn extend_coord(v: i32, size: i32, extend: ExtendMode) -> i32 {
    match extend {
        ExtendMode::Pad => v.clamp(0, size - 1),
        ExtendMode::Repeat => v.rem_euclid(size),
        ExtendMode::Reflect => {
            let period = 2 * size;
            let m = v.rem_euclid(period);
            if m < size {
                m
            } else {
                period - 1 - m
            }
        }
    }
}

#[inline]
fn lut_index(t: f32, extend: ExtendMode) -> usize {
    let t = match extend {
        ExtendMode::Pad => t.clamp(0.0, 1.0),
        ExtendMode::Repeat => t.rem_euclid(1.0),
        ExtendMode::Reflect => {
            let m = t.rem_euclid(2.0);
            if m <= 1.0 {
                m
            } else {
                2.0 - m
            }
        }
    };
    ((t * (GRADIENT_LUT_SIZE - 1) as f32) + 0.5) as usize % GRADIENT_LUT_SIZE
}

fn build_gradient_lut(stops: &[GradientStop]) -> Result<Box<[u32; GRADIENT_LUT_SIZE]>> {
    if stops.is_empty() {
        return Err(Error::InvalidArgument("gradient needs at least one stop"));
    }
    let mut sorted: Vec<GradientStop> = stops.to_vec();
    sorted.sort_by(|a, b| a.offset.total_cmp(&b.offset));

    let mut lut = Box::new([0u32; GRADIENT_LUT_SIZE]);
    for (i, slot) in lut.iter_mut().enumerate() {
        let t = i as f32 / (GRADIENT_LUT_SIZE - 1) as f32;
        *slot = sample_stops(&sorted, t).premultiplied();
    }
    Ok(lut)
}

fn sample_stops(stops: &[GradientStop], t: f32) -> Color {
    let first = stops[0];
    if t <= first.offset {
        return first.color;
    }
    for pair in stops.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if t <= b.offset {
            let span = b.offset - a.offset;
            if span <= f32::EPSILON {
                return b.color;
            }
            let f = (((t - a.offset) / span) * 255.0 + 0.5) as u32;
            return Color(byte_interp(b.color.argb(), f, a.color.argb(), 255 - f.min(255)));
        }
    }
    stops[stops.len() - 1].color
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::PixelFormat;

    fn two_stop_linear() -> PatternContext {
        PatternContext::init(&PatternSource::LinearGradient {
            from: Point::new(0.0, 0.0),
            to: Point::new(256.0, 0.0),
            stops: vec![
                GradientStop::new(0.0, Color::from_argb(0xFF000000)),
                GradientStop::new(1.0, Color::from_argb(0xFFFFFFFF)),
            ],
            extend: ExtendMode::Pad,
        })
        .unwrap()
    }

    #[test]
    fn linear_gradient_ramps_along_its_axis() {
        let ctx = two_stop_linear();
        let mut scratch = Vec::new();
        let span = ctx.fetch(&mut scratch, 0, 0, 256).to_vec();
        assert!(span[0] & 0xFF_FFFF <= 0x010101);
        assert_eq!(span[255], 0xFFFF_FFFF);
        assert!(span.windows(2).all(|w| (w[0] & 0xFF) <= (w[1] & 0xFF)));
    }

    #[test]
    fn degenerate_gradient_axis_fails_init() {
        let result = PatternContext::init(&PatternSource::LinearGradient {
            from: Point::new(5.0, 5.0),
            to: Point::new(5.0, 5.0),
            stops: vec![GradientStop::new(0.0, Color::BLACK)],
            extend: ExtendMode::Pad,
        });
        assert!(result.is_err());
    }

    #[test]
    fn texture_repeat_wraps_both_axes() {
        let pixels: Vec<u8> = [0xFF000001u32, 0xFF000002]
            .iter()
            .flat_map(|p| p.to_le_bytes())
            .collect();
        let image = Image::new(pixels, 2, 1, 8, PixelFormat::Prgb32).unwrap();
        let ctx = PatternContext::init(&PatternSource::Texture {
            image,
            extend: ExtendMode::Repeat,
        })
        .unwrap();
        let mut scratch = Vec::new();
        let span = ctx.fetch(&mut scratch, 0, 3, 5);
        assert_eq!(span, &[0xFF000001, 0xFF000002, 0xFF000001, 0xFF000002, 0xFF000001]);
    }

    #[test]
    fn texture_pad_clamps_to_edges() {
        let pixels: Vec<u8> = [0xFF000001u32, 0xFF000002]
            .iter()
            .flat_map(|p| p.to_le_bytes())
            .collect();
        let image = Image::new(pixels, 2, 1, 8, PixelFormat::Prgb32).unwrap();
        let ctx = PatternContext::init(&PatternSource::Texture {
            image,
            extend: ExtendMode::Pad,
        })
        .unwrap();
        let mut scratch = Vec::new();
        let span = ctx.fetch(&mut scratch, -2, 0, 5);
        assert_eq!(span, &[0xFF000001, 0xFF000001, 0xFF000001, 0xFF000002, 0xFF000002]);
    }

    #[test]
    fn reflect_coordinates_fold_back() {
        assert_eq!(extend_coord(4, 4, ExtendMode::Reflect), 3);
        assert_eq!(extend_coord(7, 4, ExtendMode::Reflect), 0);
        assert_eq!(extend_coord(-1, 4, ExtendMode::Reflect), 0);
    }
}
