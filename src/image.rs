//! Source images with shared, refcounted pixel storage.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::geom::IntBox;
use crate::pixel::{premultiply, PixelFormat};

/// An immutable source image.
///
/// Pixel data is reference counted: cloning an image (or capturing it in a
/// deferred draw command) shares the same storage.
#[derive(Debug, Clone)]
pub struct Image {
    data: Arc<[u8]>,
    width: i32,
    height: i32,
    stride: usize,
    format: PixelFormat,
}

impl Image {
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidArgument("image dimensions must be positive"));
        }
        let row_bytes = width as usize * format.bytes_per_pixel();
        if stride < row_bytes {
            return Err(Error::InvalidArgument("stride smaller than an image row"));
        }
        if data.len() < stride * (height as usize - 1) + row_bytes {
            return Err(Error::InvalidArgument("image buffer too small"));
        }
        Ok(Self {
            data: data.into(),
            width: width as i32,
            height: height as i32,
            stride,
            format,
        })
    }

    pub fn width(&self) -> u32 {
        self.width as u32
    }

    pub fn height(&self) -> u32 {
        self.height as u32
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub(crate) fn bounds(&self) -> IntBox {
        IntBox::new(0, 0, self.width, self.height)
    }

    #[inline]
    pub(crate) fn row(&self, y: i32) -> &[u8] {
        debug_assert!(y >= 0 && y < self.height);
        let start = y as usize * self.stride;
        &self.data[start..start + self.width as usize * self.format.bytes_per_pixel()]
    }

    /// Reads `len` pixels starting at `(x, y)` into `dst` as premultiplied
    /// ARGB32 words. This is the source-format dimension of the compositing
    /// dispatch: every source is normalized here before the span kernels see
    /// it.
    pub(crate) fn fetch_span(&self, dst: &mut [u32], x: i32, y: i32, len: usize) {
        debug_assert!(x >= 0 && x as usize + len <= self.width as usize);
        debug_assert_eq!(dst.len(), len);
        let row = self.row(y);
        match self.format {
            PixelFormat::Prgb32 => {
                for (out, px) in dst.iter_mut().zip(row[x as usize * 4..].chunks_exact(4)) {
                    *out = u32::from_le_bytes([px[0], px[1], px[2], px[3]]);
                }
            }
            PixelFormat::Argb32 => {
                for (out, px) in dst.iter_mut().zip(row[x as usize * 4..].chunks_exact(4)) {
                    *out = premultiply(u32::from_le_bytes([px[0], px[1], px[2], px[3]]));
                }
            }
            PixelFormat::Xrgb32 => {
                for (out, px) in dst.iter_mut().zip(row[x as usize * 4..].chunks_exact(4)) {
                    *out = u32::from_le_bytes([px[0], px[1], px[2], px[3]]) | 0xFF00_0000;
                }
            }
            PixelFormat::Rgb24 => {
                for (out, px) in dst.iter_mut().zip(row[x as usize * 3..].chunks_exact(3)) {
                    *out = 0xFF00_0000 | u32::from_le_bytes([px[0], px[1], px[2], 0]);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Image;
    use crate::pixel::PixelFormat;

    #[test]
    fn rejects_undersized_buffers() {
        assert!(Image::new(vec![0; 15], 2, 2, 8, PixelFormat::Prgb32).is_err());
        assert!(Image::new(vec![0; 16], 2, 2, 8, PixelFormat::Prgb32).is_ok());
    }

    #[test]
    fn fetch_span_premultiplies_argb32_sources() {
        let data = 0x80FF_0000u32.to_le_bytes().repeat(2);
        let image = Image::new(data, 2, 1, 8, PixelFormat::Argb32).unwrap();
        let mut out = [0u32; 2];
        image.fetch_span(&mut out, 0, 0, 2);
        assert_eq!(out, [0x8080_0000; 2]);
    }

    #[test]
    fn fetch_span_expands_rgb24_sources() {
        let image = Image::new(vec![0x33, 0x22, 0x11], 1, 1, 3, PixelFormat::Rgb24).unwrap();
        let mut out = [0u32; 1];
        image.fetch_span(&mut out, 0, 0, 1);
        assert_eq!(out, [0xFF11_2233]);
    }
}
