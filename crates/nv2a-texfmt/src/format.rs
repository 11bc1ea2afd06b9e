//! Texture format descriptors and the registry the demo cycles through.
//!
//! Each [`FormatDescriptor`] pairs the linear pixel layout the source image is re-encoded into with
//! the Kelvin `SET_TEXTURE_FORMAT.COLOR` code the texture unit samples it as. The `SZ_*` codes use
//! the swizzled (bit-interleaved) addressing path; the `LU_IMAGE_*` codes read a linear image with
//! an explicit pitch.

use std::fmt;

use thiserror::Error;

/// Channel order + bit depth of a linear surface.
///
/// Names follow the packed-integer convention: the first channel occupies the most significant
/// bits of the little-endian pixel word, so `Argb8888` is stored in memory as `B, G, R, A`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PixelEncoding {
    Abgr8888,
    Rgba8888,
    Argb8888,
    Bgra8888,
    Argb1555,
    Argb4444,
    Rgb565,
    /// Byte-ordered `R, G, B`; only produced by the loader for images without alpha.
    Rgb24,
}

impl PixelEncoding {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Abgr8888 | Self::Rgba8888 | Self::Argb8888 | Self::Bgra8888 => 4,
            Self::Argb1555 | Self::Argb4444 | Self::Rgb565 => 2,
            Self::Rgb24 => 3,
        }
    }

    pub const fn has_alpha(self) -> bool {
        !matches!(self, Self::Rgb565 | Self::Rgb24)
    }
}

impl fmt::Display for PixelEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Abgr8888 => "ABGR8888",
            Self::Rgba8888 => "RGBA8888",
            Self::Argb8888 => "ARGB8888",
            Self::Bgra8888 => "BGRA8888",
            Self::Argb1555 => "ARGB1555",
            Self::Argb4444 => "ARGB4444",
            Self::Rgb565 => "RGB565",
            Self::Rgb24 => "RGB24",
        };
        f.write_str(name)
    }
}

/// `NV097_SET_TEXTURE_FORMAT_COLOR_*` codes used by the registry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TextureColor {
    SzA1r5g5b5 = 0x02,
    SzX1r5g5b5 = 0x03,
    SzA4r4g4b4 = 0x04,
    SzR5g6b5 = 0x05,
    SzA8r8g8b8 = 0x06,
    SzX8r8g8b8 = 0x07,
    LuImageA1r5g5b5 = 0x10,
    LuImageR5g6b5 = 0x11,
    LuImageA8r8g8b8 = 0x12,
    LuImageX1r5g5b5 = 0x1C,
    LuImageA4r4g4b4 = 0x1D,
    LuImageX8r8g8b8 = 0x1E,
    SzA8b8g8r8 = 0x3A,
    SzB8g8r8a8 = 0x3B,
    SzR8g8b8a8 = 0x3C,
    LuImageA8b8g8r8 = 0x3F,
    LuImageB8g8r8a8 = 0x40,
    LuImageR8g8b8a8 = 0x41,
}

impl TextureColor {
    pub const fn code(self) -> u8 {
        self as u8
    }
}

/// One entry of the format registry. Immutable once constructed.
#[derive(Clone, Debug, PartialEq)]
pub struct FormatDescriptor {
    pub source_encoding: PixelEncoding,
    pub hardware_format: TextureColor,
    pub swizzled: bool,
    /// Reserved for encodings that need an extra transform pass. No active entry sets it.
    pub requires_conversion: bool,
    pub label: &'static str,
}

impl FormatDescriptor {
    pub const fn new(
        source_encoding: PixelEncoding,
        hardware_format: TextureColor,
        swizzled: bool,
        label: &'static str,
    ) -> Self {
        Self {
            source_encoding,
            hardware_format,
            swizzled,
            requires_conversion: false,
            label,
        }
    }

    pub const fn bytes_per_pixel(&self) -> usize {
        self.source_encoding.bytes_per_pixel()
    }
}

const STANDARD_FORMATS: &[FormatDescriptor] = &[
    // swizzled
    FormatDescriptor::new(PixelEncoding::Abgr8888, TextureColor::SzA8b8g8r8, true, "SZ_A8B8G8R8"),
    FormatDescriptor::new(PixelEncoding::Rgba8888, TextureColor::SzR8g8b8a8, true, "SZ_R8G8B8A8"),
    FormatDescriptor::new(PixelEncoding::Argb1555, TextureColor::SzA1r5g5b5, true, "SZ_A1R5G5B5"),
    FormatDescriptor::new(PixelEncoding::Argb1555, TextureColor::SzX1r5g5b5, true, "SZ_X1R5G5B5"),
    FormatDescriptor::new(PixelEncoding::Argb4444, TextureColor::SzA4r4g4b4, true, "SZ_A4R4G4B4"),
    FormatDescriptor::new(PixelEncoding::Rgb565, TextureColor::SzR5g6b5, true, "SZ_R5G6B5"),
    FormatDescriptor::new(PixelEncoding::Argb8888, TextureColor::SzA8r8g8b8, true, "SZ_A8R8G8B8"),
    FormatDescriptor::new(PixelEncoding::Argb8888, TextureColor::SzX8r8g8b8, true, "SZ_X8R8G8B8"),
    FormatDescriptor::new(PixelEncoding::Bgra8888, TextureColor::SzB8g8r8a8, true, "SZ_B8G8R8A8"),
    // linear
    FormatDescriptor::new(PixelEncoding::Argb1555, TextureColor::LuImageA1r5g5b5, false, "A1R5G5B5"),
    FormatDescriptor::new(PixelEncoding::Rgb565, TextureColor::LuImageR5g6b5, false, "R5G6B5"),
    FormatDescriptor::new(PixelEncoding::Argb8888, TextureColor::LuImageA8r8g8b8, false, "A8R8G8B8"),
    FormatDescriptor::new(PixelEncoding::Argb1555, TextureColor::LuImageX1r5g5b5, false, "X1R5G5B5"),
    FormatDescriptor::new(PixelEncoding::Argb4444, TextureColor::LuImageA4r4g4b4, false, "A4R4G4B4"),
    FormatDescriptor::new(PixelEncoding::Argb8888, TextureColor::LuImageX8r8g8b8, false, "X8R8G8B8"),
    FormatDescriptor::new(PixelEncoding::Abgr8888, TextureColor::LuImageA8b8g8r8, false, "A8B8G8R8"),
    FormatDescriptor::new(PixelEncoding::Bgra8888, TextureColor::LuImageB8g8r8a8, false, "B8G8R8A8"),
    FormatDescriptor::new(PixelEncoding::Rgba8888, TextureColor::LuImageR8g8b8a8, false, "R8G8B8A8"),
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("format registry must contain at least one entry")]
    Empty,
}

/// Ordered, non-empty table of format descriptors.
///
/// Indices handed to [`FormatRegistry::descriptor_at`] are reduced modulo [`FormatRegistry::count`],
/// so no index is ever out of range.
#[derive(Clone, Debug)]
pub struct FormatRegistry {
    entries: Vec<FormatDescriptor>,
}

impl FormatRegistry {
    pub fn new(entries: Vec<FormatDescriptor>) -> Result<Self, RegistryError> {
        if entries.is_empty() {
            return Err(RegistryError::Empty);
        }
        Ok(Self { entries })
    }

    /// The full table the demo cycles through: nine swizzled formats, then nine linear ones.
    pub fn standard() -> Self {
        Self {
            entries: STANDARD_FORMATS.to_vec(),
        }
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn descriptor_at(&self, index: usize) -> &FormatDescriptor {
        &self.entries[index % self.entries.len()]
    }

    pub fn next_index(&self, index: usize) -> usize {
        (index + 1) % self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FormatDescriptor> {
        self.entries.iter()
    }

    pub fn position_of(&self, label: &str) -> Option<usize> {
        self.entries.iter().position(|d| d.label == label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_registry_is_rejected() {
        assert_eq!(FormatRegistry::new(Vec::new()).unwrap_err(), RegistryError::Empty);
    }

    #[test]
    fn standard_registry_orders_swizzled_before_linear() {
        let registry = FormatRegistry::standard();
        assert_eq!(registry.count(), 18);
        assert!(registry.iter().take(9).all(|d| d.swizzled));
        assert!(registry.iter().skip(9).all(|d| !d.swizzled));
        assert!(registry.iter().all(|d| !d.requires_conversion));
    }

    #[test]
    fn bgra_swizzled_entry_uses_raw_code() {
        let registry = FormatRegistry::standard();
        let idx = registry.position_of("SZ_B8G8R8A8").unwrap();
        assert_eq!(registry.descriptor_at(idx).hardware_format.code(), 0x3B);
    }

    #[test]
    fn descriptor_at_wraps() {
        let registry = FormatRegistry::standard();
        assert_eq!(registry.descriptor_at(18), registry.descriptor_at(0));
        assert_eq!(registry.next_index(17), 0);
    }

    #[test]
    fn bytes_per_pixel_matches_encoding() {
        assert_eq!(PixelEncoding::Argb8888.bytes_per_pixel(), 4);
        assert_eq!(PixelEncoding::Rgb565.bytes_per_pixel(), 2);
        assert_eq!(PixelEncoding::Rgb24.bytes_per_pixel(), 3);
        assert!(!PixelEncoding::Rgb565.has_alpha());
    }
}
