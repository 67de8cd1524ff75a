//! # Lienzo
//!
//! Lienzo is a software 2D raster painter engine: a CPU-only,
//! immediate-mode graphics backend that composites vector paths,
//! axis-aligned rectangles, glyph masks and source images into a pixel
//! buffer owned by the caller. Path geometry is built with the
//! [`lyon`](https://crates.io/crates/lyon) crate, which is re-exported.
//!
//! ## Features
//!
//! - **Vector paths**: anti-aliased fills and strokes (caps, joins, miter
//!   limit, dashing) with non-zero or even-odd fill rules.
//! - **Porter-Duff compositing**: the full operator family over
//!   premultiplied ARGB32, with `ARGB32`, `PRGB32`, `XRGB32` and `RGB24`
//!   destination surfaces.
//! - **Pattern sources**: textures with pad/repeat/reflect extension,
//!   linear and radial gradients.
//! - **Glyph runs and images**: `A8` coverage-mask blending and image
//!   blits, clipped and composited like every other primitive.
//! - **Transparent multithreading**: the painter can record draws as
//!   commands and replay them on a band-interleaved worker pool, producing
//!   pixels byte-identical to the single-threaded path.
//!
//! ## Basic usage
//!
//! ```
//! use lienzo::{Color, CompositeOp, IntBox, Painter, PixelFormat, Surface};
//!
//! // The painter draws into memory you own.
//! let (width, height) = (64u32, 64u32);
//! let mut pixels = vec![0u8; (width * height * 4) as usize];
//! let surface = Surface::new(
//!     &mut pixels,
//!     width,
//!     height,
//!     (width * 4) as usize,
//!     PixelFormat::Prgb32,
//! )
//! .unwrap();
//!
//! let mut painter = Painter::new(surface).unwrap();
//! painter.set_source_rgba(Color::from_argb(0xFFFF0000));
//! painter.set_op(CompositeOp::SrcOver);
//! painter.fill_rect(IntBox::from_xywh(8, 8, 48, 48));
//! painter.flush().unwrap();
//! ```

pub use lyon;

mod color;
mod compose;
mod error;
mod flatten;
mod geom;
mod glyph;
mod image;
mod painter;
mod pattern;
mod pixel;
mod raster;
mod region;
mod stroke;
mod surface;

/// Float rectangle used throughout the geometry API.
pub type MathRect = lyon::math::Box2D;

pub use color::Color;
pub use compose::CompositeOp;
pub use error::{Error, Result};
pub use geom::{IntBox, IntPoint};
pub use glyph::{Glyph, GlyphSet, GlyphSource};
pub use image::Image;
pub use painter::Painter;
pub use pattern::{ExtendMode, GradientStop, PatternSource};
pub use pixel::PixelFormat;
pub use raster::FillRule;
pub use region::Region;
pub use stroke::{LineCap, LineJoin};
pub use surface::Surface;
