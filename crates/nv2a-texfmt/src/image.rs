//! Source images and pixel re-encoding.
//!
//! The loader normalizes whatever the decoder produces into one of two linear layouts
//! (`Abgr8888`, i.e. RGBA bytes, or `Rgb24`), and [`convert_encoding`] repacks a surface into any
//! [`PixelEncoding`]. Widening replicates the top bits into the new low bits, narrowing truncates.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::dma::align_up;
use crate::format::PixelEncoding;

/// Row alignment applied to every surface this module creates.
pub const PITCH_ALIGNMENT: usize = 4;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to load image {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: ::image::ImageError,
    },
}

/// A linear surface: `height` rows of `pitch` bytes, each holding `width` pixels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub pitch: usize,
    pub encoding: PixelEncoding,
    pub pixels: Vec<u8>,
}

impl Image {
    /// Wrap tightly packed RGBA8 bytes (`width * height * 4`).
    pub fn from_rgba8(width: u32, height: u32, rgba: Vec<u8>) -> Self {
        debug_assert_eq!(rgba.len(), width as usize * height as usize * 4);
        Self {
            width,
            height,
            pitch: width as usize * 4,
            encoding: PixelEncoding::Abgr8888,
            pixels: rgba,
        }
    }

    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = rgba.repeat(width as usize * height as usize);
        Self::from_rgba8(width, height, pixels)
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.encoding.bytes_per_pixel()
    }

    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.pitch;
        &self.pixels[start..start + self.width as usize * self.bytes_per_pixel()]
    }

    /// RGBA8 value of pixel `(x, y)`.
    pub fn pixel_rgba(&self, x: u32, y: u32) -> [u8; 4] {
        let bpp = self.bytes_per_pixel();
        let row = self.row(y);
        let at = x as usize * bpp;
        decode_pixel(self.encoding, &row[at..at + bpp])
    }
}

/// Image loading boundary.
pub trait ImageLoader {
    fn load(&self, path: &Path) -> Result<Image, LoadError>;
}

/// Loads PNG files through the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct PngLoader;

impl ImageLoader for PngLoader {
    fn load(&self, path: &Path) -> Result<Image, LoadError> {
        let decoded = ::image::open(path).map_err(|source| LoadError::Decode {
            path: path.to_path_buf(),
            source,
        })?;

        let image = match decoded {
            ::image::DynamicImage::ImageRgb8(rgb) => {
                let (width, height) = rgb.dimensions();
                let tight = rgb.into_raw();
                repitch(width, height, PixelEncoding::Rgb24, &tight)
            }
            other => {
                let rgba = other.to_rgba8();
                let (width, height) = rgba.dimensions();
                Image::from_rgba8(width, height, rgba.into_raw())
            }
        };

        tracing::debug!(
            path = %path.display(),
            width = image.width,
            height = image.height,
            encoding = %image.encoding,
            "loaded source image"
        );
        Ok(image)
    }
}

fn aligned_pitch(width: u32, encoding: PixelEncoding) -> usize {
    let row = width as usize * encoding.bytes_per_pixel();
    align_up(row as u64, PITCH_ALIGNMENT as u64) as usize
}

/// Copy tightly packed rows into a surface with an aligned pitch.
fn repitch(width: u32, height: u32, encoding: PixelEncoding, tight: &[u8]) -> Image {
    let row_bytes = width as usize * encoding.bytes_per_pixel();
    let pitch = aligned_pitch(width, encoding);
    let mut pixels = vec![0u8; pitch * height as usize];
    if row_bytes > 0 {
        for (src, dst) in tight.chunks_exact(row_bytes).zip(pixels.chunks_exact_mut(pitch)) {
            dst[..row_bytes].copy_from_slice(src);
        }
    }
    Image {
        width,
        height,
        pitch,
        encoding,
        pixels,
    }
}

/// Expand an `bits`-wide channel to 8 bits by replicating its top bits.
fn expand(value: u16, bits: u32) -> u8 {
    let v = u32::from(value);
    match bits {
        1 => {
            if v != 0 {
                0xFF
            } else {
                0
            }
        }
        8 => v as u8,
        _ => ((v << (8 - bits)) | (v >> (2 * bits - 8).min(bits))) as u8,
    }
}

fn decode_pixel(encoding: PixelEncoding, px: &[u8]) -> [u8; 4] {
    match encoding {
        PixelEncoding::Abgr8888 => [px[0], px[1], px[2], px[3]],
        PixelEncoding::Rgba8888 => [px[3], px[2], px[1], px[0]],
        PixelEncoding::Argb8888 => [px[2], px[1], px[0], px[3]],
        PixelEncoding::Bgra8888 => [px[1], px[2], px[3], px[0]],
        PixelEncoding::Rgb24 => [px[0], px[1], px[2], 0xFF],
        PixelEncoding::Argb1555 => {
            let c = u16::from_le_bytes([px[0], px[1]]);
            [
                expand((c >> 10) & 0x1F, 5),
                expand((c >> 5) & 0x1F, 5),
                expand(c & 0x1F, 5),
                expand(c >> 15, 1),
            ]
        }
        PixelEncoding::Argb4444 => {
            let c = u16::from_le_bytes([px[0], px[1]]);
            [
                expand((c >> 8) & 0xF, 4),
                expand((c >> 4) & 0xF, 4),
                expand(c & 0xF, 4),
                expand(c >> 12, 4),
            ]
        }
        PixelEncoding::Rgb565 => {
            let c = u16::from_le_bytes([px[0], px[1]]);
            [
                expand(c >> 11, 5),
                expand((c >> 5) & 0x3F, 6),
                expand(c & 0x1F, 5),
                0xFF,
            ]
        }
    }
}

fn encode_pixel(encoding: PixelEncoding, [r, g, b, a]: [u8; 4], out: &mut [u8]) {
    let (r16, g16, b16, a16) = (u16::from(r), u16::from(g), u16::from(b), u16::from(a));
    match encoding {
        PixelEncoding::Abgr8888 => out.copy_from_slice(&[r, g, b, a]),
        PixelEncoding::Rgba8888 => out.copy_from_slice(&[a, b, g, r]),
        PixelEncoding::Argb8888 => out.copy_from_slice(&[b, g, r, a]),
        PixelEncoding::Bgra8888 => out.copy_from_slice(&[a, r, g, b]),
        PixelEncoding::Rgb24 => out.copy_from_slice(&[r, g, b]),
        PixelEncoding::Argb1555 => {
            let c = ((a16 >> 7) << 15) | ((r16 >> 3) << 10) | ((g16 >> 3) << 5) | (b16 >> 3);
            out.copy_from_slice(&c.to_le_bytes());
        }
        PixelEncoding::Argb4444 => {
            let c = ((a16 >> 4) << 12) | ((r16 >> 4) << 8) | ((g16 >> 4) << 4) | (b16 >> 4);
            out.copy_from_slice(&c.to_le_bytes());
        }
        PixelEncoding::Rgb565 => {
            let c = ((r16 >> 3) << 11) | ((g16 >> 2) << 5) | (b16 >> 3);
            out.copy_from_slice(&c.to_le_bytes());
        }
    }
}

/// Re-encode `image` into `target`, producing a new surface with a 4-byte aligned pitch.
pub fn convert_encoding(image: &Image, target: PixelEncoding) -> Image {
    if image.encoding == target {
        return image.clone();
    }

    let src_bpp = image.bytes_per_pixel();
    let dst_bpp = target.bytes_per_pixel();
    let pitch = aligned_pitch(image.width, target);
    let mut pixels = vec![0u8; pitch * image.height as usize];

    for y in 0..image.height {
        let src_row = image.row(y);
        let dst_start = y as usize * pitch;
        let dst_row = &mut pixels[dst_start..dst_start + image.width as usize * dst_bpp];
        for (src_px, dst_px) in src_row
            .chunks_exact(src_bpp)
            .zip(dst_row.chunks_exact_mut(dst_bpp))
        {
            encode_pixel(target, decode_pixel(image.encoding, src_px), dst_px);
        }
    }

    Image {
        width: image.width,
        height: image.height,
        pitch,
        encoding: target,
        pixels,
    }
}
