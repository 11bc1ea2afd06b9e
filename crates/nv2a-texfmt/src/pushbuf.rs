//! Kelvin (NV097) push-buffer words.
//!
//! A push buffer is a flat stream of 32-bit words. Each packet starts with a method header
//! `(count << 18) | (subchannel << 13) | method` followed by `count` argument words, written to
//! `method`, `method + 4`, ... (incrementing methods).

use thiserror::Error;

/// Method addresses of the 3D class used by the demo.
pub mod method {
    pub const SET_FRONT_FACE: u32 = 0x0000_03B8;
    pub const SET_TRANSFORM_CONSTANT: u32 = 0x0000_0B80;
    pub const SET_VERTEX_DATA_ARRAY_OFFSET: u32 = 0x0000_1720;
    pub const SET_VERTEX_DATA_ARRAY_FORMAT: u32 = 0x0000_1760;
    pub const SET_BEGIN_END: u32 = 0x0000_17FC;
    pub const DRAW_ARRAYS: u32 = 0x0000_1810;
    pub const SET_TEXTURE_OFFSET: u32 = 0x0000_1B00;
    pub const SET_TEXTURE_FORMAT: u32 = 0x0000_1B04;
    pub const SET_TEXTURE_ADDRESS: u32 = 0x0000_1B08;
    pub const SET_TEXTURE_CONTROL0: u32 = 0x0000_1B0C;
    pub const SET_TEXTURE_CONTROL1: u32 = 0x0000_1B10;
    pub const SET_TEXTURE_IMAGE_RECT: u32 = 0x0000_1B1C;
    pub const SET_ZSTENCIL_CLEAR_VALUE: u32 = 0x0000_1D8C;
    pub const SET_COLOR_CLEAR_VALUE: u32 = 0x0000_1D90;
    pub const CLEAR_SURFACE: u32 = 0x0000_1D94;
    pub const SET_TRANSFORM_CONSTANT_LOAD: u32 = 0x0000_1EA4;

    /// Distance between the register blocks of consecutive texture stages.
    pub const TEXTURE_STAGE_STRIDE: u32 = 0x40;
    /// Number of `SET_TRANSFORM_CONSTANT` argument slots per packet.
    pub const TRANSFORM_CONSTANT_SLOTS: usize = 32;
}

/// Subchannel the 3D object is bound to.
pub const SUBCH_3D: u32 = 0;

pub const MAX_METHOD_COUNT: usize = 0x7FF;

const COUNT_SHIFT: u32 = 18;
const SUBCH_SHIFT: u32 = 13;
const METHOD_MASK: u32 = 0x1FFC;
const SUBCH_MASK: u32 = 0x7;
/// Bits 0-1 and 29-31 of a header select jumps, calls and non-incrementing packets, none of which
/// this codec emits.
const UNSUPPORTED_HEADER_BITS: u32 = 0xE000_0003;

pub fn method_header(subchannel: u32, method: u32, count: usize) -> u32 {
    debug_assert!(count <= MAX_METHOD_COUNT);
    debug_assert_eq!(method & !METHOD_MASK, 0);
    ((count as u32) << COUNT_SHIFT) | ((subchannel & SUBCH_MASK) << SUBCH_SHIFT) | method
}

/// Append-only push-buffer builder.
#[derive(Debug, Default, Clone)]
pub struct PushBufferWriter {
    words: Vec<u32>,
}

impl PushBufferWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish(self) -> Vec<u32> {
        self.words
    }

    /// Emit one incrementing packet on the 3D subchannel.
    pub fn push(&mut self, method: u32, args: &[u32]) {
        assert!(
            !args.is_empty() && args.len() <= MAX_METHOD_COUNT,
            "method 0x{method:04x}: packet must carry 1..={MAX_METHOD_COUNT} words"
        );
        self.words.push(method_header(SUBCH_3D, method, args.len()));
        self.words.extend_from_slice(args);
    }

    pub fn push1(&mut self, method: u32, arg: u32) {
        self.push(method, &[arg]);
    }
}

/// One decoded packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCall {
    pub subchannel: u32,
    pub method: u32,
    pub args: Vec<u32>,
}

impl MethodCall {
    /// `(register, value)` pairs written by this packet.
    pub fn register_writes(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.args
            .iter()
            .enumerate()
            .map(|(i, &v)| (self.method + 4 * i as u32, v))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PushBufferDecodeError {
    #[error("unsupported packet header 0x{header:08x} at word {offset}")]
    UnsupportedHeader { offset: usize, header: u32 },

    #[error("empty packet header 0x{header:08x} at word {offset}")]
    EmptyPacket { offset: usize, header: u32 },

    #[error("packet at word {offset} needs {count} arguments but only {available} remain")]
    Truncated {
        offset: usize,
        count: usize,
        available: usize,
    },
}

pub fn decode_push_buffer(words: &[u32]) -> Result<Vec<MethodCall>, PushBufferDecodeError> {
    let mut calls = Vec::new();
    let mut offset = 0usize;
    while offset < words.len() {
        let header = words[offset];
        if header & UNSUPPORTED_HEADER_BITS != 0 {
            return Err(PushBufferDecodeError::UnsupportedHeader { offset, header });
        }
        let count = ((header >> COUNT_SHIFT) & MAX_METHOD_COUNT as u32) as usize;
        if count == 0 {
            return Err(PushBufferDecodeError::EmptyPacket { offset, header });
        }
        let available = words.len() - offset - 1;
        if count > available {
            return Err(PushBufferDecodeError::Truncated {
                offset,
                count,
                available,
            });
        }
        calls.push(MethodCall {
            subchannel: (header >> SUBCH_SHIFT) & SUBCH_MASK,
            method: header & METHOD_MASK,
            args: words[offset + 1..offset + 1 + count].to_vec(),
        });
        offset += 1 + count;
    }
    Ok(calls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn header_packs_count_subchannel_and_method() {
        assert_eq!(method_header(0, method::SET_FRONT_FACE, 1), 0x0004_03B8);
        assert_eq!(method_header(3, 0x0100, 2), 0x0008_6100);
    }

    #[test]
    fn writer_output_decodes_back() {
        let mut w = PushBufferWriter::new();
        w.push1(method::SET_COLOR_CLEAR_VALUE, 0xFFFF_FFFF);
        w.push(method::SET_TRANSFORM_CONSTANT, &[1, 2, 3, 4]);
        let calls = decode_push_buffer(&w.finish()).unwrap();

        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].method, method::SET_COLOR_CLEAR_VALUE);
        assert_eq!(calls[0].args, vec![0xFFFF_FFFF]);
        assert_eq!(
            calls[1].register_writes().collect::<Vec<_>>(),
            vec![(0x0B80, 1), (0x0B84, 2), (0x0B88, 3), (0x0B8C, 4)]
        );
    }

    #[test]
    fn truncated_packet_is_rejected() {
        let words = [method_header(0, method::SET_TRANSFORM_CONSTANT, 4), 1, 2];
        assert_eq!(
            decode_push_buffer(&words).unwrap_err(),
            PushBufferDecodeError::Truncated {
                offset: 0,
                count: 4,
                available: 2
            }
        );
    }

    #[test]
    fn jump_and_empty_headers_are_rejected() {
        assert!(matches!(
            decode_push_buffer(&[0x2000_0001]).unwrap_err(),
            PushBufferDecodeError::UnsupportedHeader { .. }
        ));
        assert!(matches!(
            decode_push_buffer(&[method::SET_FRONT_FACE]).unwrap_err(),
            PushBufferDecodeError::EmptyPacket { .. }
        ));
    }
}
