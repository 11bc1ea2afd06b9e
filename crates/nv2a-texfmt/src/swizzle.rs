//! Linear → swizzled texel copy for the Kelvin texture unit.
//!
//! Swizzled textures store texel `(x, y)` at an element offset whose bits interleave the bits of
//! `x` and `y`, X taking the lowest free bit at each step. Once the shorter axis runs out of bits
//! the remaining bits of the longer axis are laid out contiguously. For a square texture this is
//! plain Morton order.

use crate::error::{Result, TexFmtError};

/// Bit masks selecting which element-offset bits belong to each axis.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SwizzleMasks {
    pub x: u32,
    pub y: u32,
}

impl SwizzleMasks {
    pub fn new(width: u32, height: u32) -> Self {
        let mut x = 0u32;
        let mut y = 0u32;
        let mut bit = 1u64;
        let mut mask_bit = 1u32;
        loop {
            let mut done = true;
            if bit < u64::from(width) {
                x |= mask_bit;
                mask_bit <<= 1;
                done = false;
            }
            if bit < u64::from(height) {
                y |= mask_bit;
                mask_bit <<= 1;
                done = false;
            }
            if done {
                break;
            }
            bit <<= 1;
        }
        Self { x, y }
    }

    /// Element offset (not byte offset) of texel `(x, y)`.
    pub fn offset(&self, x: u32, y: u32) -> u32 {
        deposit_bits(x, self.x) | deposit_bits(y, self.y)
    }
}

/// Scatter the low bits of `value` into the set bits of `mask` (a software `pdep`).
fn deposit_bits(mut value: u32, mask: u32) -> u32 {
    let mut out = 0u32;
    let mut m = mask;
    while m != 0 && value != 0 {
        let lowest = m & m.wrapping_neg();
        if value & 1 != 0 {
            out |= lowest;
        }
        value >>= 1;
        m &= m - 1;
    }
    out
}

/// Step an axis offset to the next coordinate without recomputing the deposit.
#[inline]
fn advance(offset: u32, mask: u32) -> u32 {
    offset.wrapping_sub(mask) & mask
}

pub(crate) fn check_bytes_per_pixel(bytes_per_pixel: usize) -> Result<()> {
    match bytes_per_pixel {
        1 | 2 | 4 => Ok(()),
        _ => Err(TexFmtError::UnsupportedPixelSize { bytes_per_pixel }),
    }
}

pub(crate) fn check_power_of_two(width: u32, height: u32) -> Result<()> {
    if width.is_power_of_two() && height.is_power_of_two() {
        Ok(())
    } else {
        Err(TexFmtError::PreconditionViolation { width, height })
    }
}

/// Minimum byte length of a linear surface with the given pitch, `None` if it overflows.
pub(crate) fn linear_len(
    width: u32,
    height: u32,
    pitch: usize,
    bytes_per_pixel: usize,
) -> Option<usize> {
    if height == 0 {
        return Some(0);
    }
    let row_bytes = (width as usize).checked_mul(bytes_per_pixel)?;
    (height as usize - 1)
        .checked_mul(pitch)?
        .checked_add(row_bytes)
}

/// `width * height * bytes_per_pixel`, saturating so an overflow fails every length check.
fn texel_bytes(width: u32, height: u32, bytes_per_pixel: usize) -> usize {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|texels| texels.checked_mul(bytes_per_pixel))
        .unwrap_or(usize::MAX)
}

/// Copy a linear row-major surface into swizzled order.
///
/// `dst` must hold at least `width * height * bytes_per_pixel` bytes. Every argument is validated
/// before the first byte is written, so an error leaves `dst` untouched.
pub fn swizzle_rect(
    src: &[u8],
    width: u32,
    height: u32,
    dst: &mut [u8],
    src_pitch: usize,
    bytes_per_pixel: usize,
) -> Result<()> {
    check_bytes_per_pixel(bytes_per_pixel)?;
    check_power_of_two(width, height)?;

    let needed = texel_bytes(width, height, bytes_per_pixel);
    if dst.len() < needed {
        return Err(TexFmtError::BufferTooSmall {
            needed,
            available: dst.len(),
        });
    }
    // Cannot overflow: `row_bytes * height == needed`.
    let row_bytes = width as usize * bytes_per_pixel;
    let src_needed = linear_len(width, height, src_pitch, bytes_per_pixel).unwrap_or(usize::MAX);
    if src.len() < src_needed || src_pitch < row_bytes {
        return Err(TexFmtError::SourceTooSmall {
            needed: src_needed,
            available: src.len(),
        });
    }

    let masks = SwizzleMasks::new(width, height);

    let mut off_y = 0u32;
    for row in src.chunks(src_pitch).take(height as usize) {
        let mut off_x = 0u32;
        for texel in row[..row_bytes].chunks_exact(bytes_per_pixel) {
            let at = (off_x | off_y) as usize * bytes_per_pixel;
            dst[at..at + bytes_per_pixel].copy_from_slice(texel);
            off_x = advance(off_x, masks.x);
        }
        off_y = advance(off_y, masks.y);
    }

    Ok(())
}

/// Copy a linear surface row by row into a tightly packed or pitched destination.
pub fn copy_rows(
    src: &[u8],
    width: u32,
    height: u32,
    dst: &mut [u8],
    pitch: usize,
    bytes_per_pixel: usize,
) -> Result<()> {
    let row_bytes = (width as usize)
        .checked_mul(bytes_per_pixel)
        .unwrap_or(usize::MAX);
    if row_bytes == 0 || height == 0 {
        return Ok(());
    }
    if pitch < row_bytes {
        return Err(TexFmtError::SourceTooSmall {
            needed: row_bytes,
            available: pitch,
        });
    }
    let needed = pitch.checked_mul(height as usize).unwrap_or(usize::MAX);
    if dst.len() < needed {
        return Err(TexFmtError::BufferTooSmall {
            needed,
            available: dst.len(),
        });
    }
    let src_needed = linear_len(width, height, pitch, bytes_per_pixel).unwrap_or(usize::MAX);
    if src.len() < src_needed {
        return Err(TexFmtError::SourceTooSmall {
            needed: src_needed,
            available: src.len(),
        });
    }

    for (src_row, dst_row) in src
        .chunks(pitch)
        .zip(dst.chunks_mut(pitch))
        .take(height as usize)
    {
        dst_row[..row_bytes].copy_from_slice(&src_row[..row_bytes]);
    }
    Ok(())
}
