//! Source image -> GPU-ready texture bytes.

use crate::command::TextureBinding;
use crate::config::LinearTexcoordScale;
use crate::dma::DmaBuffer;
use crate::error::{Result, TexFmtError};
use crate::format::FormatDescriptor;
use crate::image::{convert_encoding, Image};
use crate::mesh::VertexBuffer;
use crate::swizzle::{
    check_bytes_per_pixel, check_power_of_two, copy_rows, linear_len, swizzle_rect,
};

#[derive(Debug, Clone, Default)]
pub struct FormatConverter {
    linear_scale: LinearTexcoordScale,
}

impl FormatConverter {
    pub fn new(linear_scale: LinearTexcoordScale) -> Self {
        Self { linear_scale }
    }

    /// Re-encode `source` for `descriptor`, write it into `texture` and renormalize the mesh
    /// texture coordinates for the chosen addressing mode.
    ///
    /// Every check runs before `texture` or `vertices` is modified, so an error leaves both as
    /// they were.
    pub fn convert(
        &self,
        source: &Image,
        descriptor: &FormatDescriptor,
        texture: &mut DmaBuffer,
        vertices: &mut VertexBuffer,
    ) -> Result<TextureBinding> {
        let (width, height) = (source.width, source.height);
        check_power_of_two(width, height)?;
        check_source_len(source)?;
        // Linear surfaces take any pixel size; only the swizzle walk is limited.
        if descriptor.swizzled {
            check_bytes_per_pixel(descriptor.bytes_per_pixel())?;
        }

        if descriptor.requires_conversion {
            tracing::debug!(label = descriptor.label, "descriptor requests an extra conversion pass");
        }

        let encoded = convert_encoding(source, descriptor.source_encoding);
        let bpp = encoded.bytes_per_pixel();

        let binding = if descriptor.swizzled {
            swizzle_rect(
                &encoded.pixels,
                width,
                height,
                texture.as_bytes_mut(),
                encoded.pitch,
                bpp,
            )?;
            vertices.normalize_texcoords(1.0, 1.0);
            TextureBinding::Swizzled {
                log2_width: width.trailing_zeros() as u8,
                log2_height: height.trailing_zeros() as u8,
            }
        } else {
            copy_rows(
                &encoded.pixels,
                width,
                height,
                texture.as_bytes_mut(),
                encoded.pitch,
                bpp,
            )?;
            let (u, v) = self.linear_scale.resolve(width, height);
            vertices.normalize_texcoords(u, v);
            TextureBinding::Linear {
                pitch: encoded.pitch as u32,
                width,
                height,
            }
        };

        Ok(binding)
    }
}

/// `source.pixels` must hold every row at `source.pitch`.
fn check_source_len(source: &Image) -> Result<()> {
    let bpp = source.bytes_per_pixel();
    let row_bytes = (source.width as usize).checked_mul(bpp);
    let needed = linear_len(source.width, source.height, source.pitch, bpp);
    match (row_bytes, needed) {
        (Some(row_bytes), Some(needed))
            if source.pitch >= row_bytes && source.pixels.len() >= needed =>
        {
            Ok(())
        }
        _ => Err(TexFmtError::SourceTooSmall {
            needed: needed.unwrap_or(usize::MAX),
            available: source.pixels.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dma::{CacheMode, ContiguousMemory, DmaAllocator};
    use crate::format::{PixelEncoding, TextureColor};

    fn setup(w: u32, h: u32) -> (ContiguousMemory, DmaBuffer, VertexBuffer) {
        let mem = ContiguousMemory::default();
        let tex = mem
            .allocate(u64::from(w * h * 4), 0, CacheMode::WriteCombine)
            .unwrap();
        let vb = VertexBuffer::quad(&mem).unwrap();
        (mem, tex, vb)
    }

    #[test]
    fn swizzled_binding_carries_log2_sizes() {
        let (_mem, mut tex, mut vb) = setup(8, 4);
        let src = Image::solid(8, 4, [1, 2, 3, 4]);
        let desc = FormatDescriptor::new(
            PixelEncoding::Abgr8888,
            TextureColor::SzA8b8g8r8,
            true,
            "SZ_A8B8G8R8",
        );
        let binding = FormatConverter::default()
            .convert(&src, &desc, &mut tex, &mut vb)
            .unwrap();
        assert_eq!(
            binding,
            TextureBinding::Swizzled {
                log2_width: 3,
                log2_height: 2
            }
        );
        assert_eq!(&tex.as_bytes()[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn linear_binding_uses_surface_pitch() {
        let (_mem, mut tex, mut vb) = setup(2, 2);
        let src = Image::solid(2, 2, [0xFF, 0, 0, 0xFF]);
        let desc = FormatDescriptor::new(
            PixelEncoding::Rgb565,
            TextureColor::LuImageR5g6b5,
            false,
            "R5G6B5",
        );
        let binding = FormatConverter::default()
            .convert(&src, &desc, &mut tex, &mut vb)
            .unwrap();
        assert_eq!(
            binding,
            TextureBinding::Linear {
                pitch: 4,
                width: 2,
                height: 2
            }
        );
        assert_eq!(&tex.as_bytes()[..4], &[0x00, 0xF8, 0x00, 0xF8]);
        assert!(vb
            .vertices()
            .iter()
            .flat_map(|v| v.texcoord)
            .all(|c| c == 0.0 || c == 2.0));
    }

    #[test]
    fn unsupported_pixel_size_leaves_buffers_alone() {
        let (_mem, mut tex, mut vb) = setup(4, 4);
        tex.as_bytes_mut().fill(0xAB);
        let before: Vec<_> = vb.vertices().to_vec();

        let desc =
            FormatDescriptor::new(PixelEncoding::Rgb24, TextureColor::SzX8r8g8b8, true, "RGB24");
        let err = FormatConverter::default()
            .convert(&Image::solid(4, 4, [0; 4]), &desc, &mut tex, &mut vb)
            .unwrap_err();

        assert!(matches!(
            err,
            TexFmtError::UnsupportedPixelSize { bytes_per_pixel: 3 }
        ));
        assert!(tex.as_bytes().iter().all(|&b| b == 0xAB));
        assert_eq!(vb.vertices(), &before[..]);
    }

    #[test]
    fn short_source_pixels_are_rejected() {
        let (_mem, mut tex, mut vb) = setup(4, 4);
        tex.as_bytes_mut().fill(0xAB);
        let mut src = Image::solid(4, 4, [7; 4]);
        src.pixels.truncate(8);

        let desc = FormatDescriptor::new(
            PixelEncoding::Rgb565,
            TextureColor::LuImageR5g6b5,
            false,
            "R5G6B5",
        );
        let err = FormatConverter::default()
            .convert(&src, &desc, &mut tex, &mut vb)
            .unwrap_err();

        assert!(matches!(
            err,
            TexFmtError::SourceTooSmall {
                needed: 64,
                available: 8
            }
        ));
        assert!(tex.as_bytes().iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn linear_rgb24_is_copied_at_padded_pitch() {
        let (_mem, mut tex, mut vb) = setup(4, 4);
        let desc = FormatDescriptor::new(
            PixelEncoding::Rgb24,
            TextureColor::LuImageX8r8g8b8,
            false,
            "X8R8G8B8",
        );
        let binding = FormatConverter::default()
            .convert(&Image::solid(4, 4, [0; 4]), &desc, &mut tex, &mut vb)
            .unwrap();
        assert_eq!(
            binding,
            TextureBinding::Linear {
                pitch: 12,
                width: 4,
                height: 4
            }
        );
    }
}
