//! Typed per-frame command stream and its push-buffer encoding.
//!
//! [`CommandStreamBuilder::build_frame`] produces a [`CommandSequence`] describing one complete
//! frame: clear, bind the converted texture on stage 0, upload the transform constants, point the
//! vertex attributes at the quad and draw it. [`CommandSequence::encode`] lowers the typed commands
//! into Kelvin method packets.

use bitflags::bitflags;

use crate::dma::DmaBuffer;
use crate::format::{FormatDescriptor, TextureColor};
use crate::math::{TransformSet, Vec4};
use crate::mesh::{Vertex, VertexBuffer};
use crate::pushbuf::{method, PushBufferWriter};

/// Number of vertex attribute slots.
pub const VERTEX_ATTRIBUTE_COUNT: u8 = 16;

pub const ATTR_POSITION: u8 = 0;
pub const ATTR_NORMAL: u8 = 2;
pub const ATTR_TEXCOORD0: u8 = 9;

/// Maximum vertex count of a single `DRAW_ARRAYS` word.
pub const MAX_DRAW_BATCH: u32 = 256;

/// First constant slot of the fixed transform block.
pub const TRANSFORM_CONSTANT_BASE: u32 = 96;

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u32 {
        const Z = 1 << 0;
        const STENCIL = 1 << 1;
        const COLOR_R = 1 << 4;
        const COLOR_G = 1 << 5;
        const COLOR_B = 1 << 6;
        const COLOR_A = 1 << 7;
        const COLOR = Self::COLOR_R.bits()
            | Self::COLOR_G.bits()
            | Self::COLOR_B.bits()
            | Self::COLOR_A.bits();
    }
}

#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FrontFace {
    Cw = 0x0900,
    Ccw = 0x0901,
}

#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Primitive {
    End = 0,
    Points = 1,
    Lines = 2,
    Triangles = 5,
    TriangleStrip = 6,
    Quads = 8,
}

#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VertexType {
    UbD3d = 0,
    S1 = 1,
    Float = 2,
    UbOgl = 4,
}

#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TextureBorder {
    Texture = 0,
    Color = 1,
}

#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AddressMode {
    Wrap = 1,
    Mirror = 2,
    ClampToEdge = 3,
    Border = 4,
}

/// `SET_TEXTURE_FORMAT` fields.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TextureFormat {
    pub context_dma: u8,
    pub cubemap: bool,
    pub border: TextureBorder,
    pub dimensionality: u8,
    pub color: TextureColor,
    pub mipmap_levels: u8,
    pub base_size_u: u8,
    pub base_size_v: u8,
    pub base_size_p: u8,
}

impl TextureFormat {
    /// 2D, single level, color border, sampled through DMA context 2.
    pub fn new_2d(color: TextureColor, log2_width: u8, log2_height: u8) -> Self {
        Self {
            context_dma: 2,
            cubemap: false,
            border: TextureBorder::Color,
            dimensionality: 2,
            color,
            mipmap_levels: 1,
            base_size_u: log2_width,
            base_size_v: log2_height,
            base_size_p: 0,
        }
    }

    pub fn bits(&self) -> u32 {
        (u32::from(self.context_dma) & 0x3)
            | (u32::from(self.cubemap) << 2)
            | ((self.border as u32) << 3)
            | ((u32::from(self.dimensionality) & 0xF) << 4)
            | (u32::from(self.color.code()) << 8)
            | ((u32::from(self.mipmap_levels) & 0xF) << 16)
            | ((u32::from(self.base_size_u) & 0xF) << 20)
            | ((u32::from(self.base_size_v) & 0xF) << 24)
            | ((u32::from(self.base_size_p) & 0xF) << 28)
    }
}

/// `SET_TEXTURE_ADDRESS` fields.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TextureAddress {
    pub u: AddressMode,
    pub v: AddressMode,
    pub p: AddressMode,
    pub cylwrap_u: bool,
    pub cylwrap_v: bool,
    pub cylwrap_p: bool,
    pub cylwrap_q: bool,
}

impl TextureAddress {
    pub fn clamp_to_edge() -> Self {
        Self {
            u: AddressMode::ClampToEdge,
            v: AddressMode::ClampToEdge,
            p: AddressMode::ClampToEdge,
            cylwrap_u: false,
            cylwrap_v: false,
            cylwrap_p: false,
            cylwrap_q: false,
        }
    }

    pub fn bits(&self) -> u32 {
        (self.u as u32)
            | (u32::from(self.cylwrap_u) << 4)
            | ((self.v as u32) << 8)
            | (u32::from(self.cylwrap_v) << 12)
            | ((self.p as u32) << 16)
            | (u32::from(self.cylwrap_p) << 20)
            | (u32::from(self.cylwrap_q) << 24)
    }
}

/// `SET_TEXTURE_CONTROL0` fields. LODs are 12-bit fixed point.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TextureControl0 {
    pub enable: bool,
    pub min_lod: u16,
    pub max_lod: u16,
}

impl TextureControl0 {
    pub const ENABLED: Self = Self {
        enable: true,
        min_lod: 0,
        max_lod: 0,
    };

    pub fn bits(&self) -> u32 {
        (u32::from(self.enable) << 30)
            | ((u32::from(self.min_lod) & 0xFFF) << 18)
            | ((u32::from(self.max_lod) & 0xFFF) << 6)
    }
}

/// `SET_VERTEX_DATA_ARRAY_FORMAT` fields. A size of zero disables the slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VertexArrayFormat {
    pub ty: VertexType,
    pub size: u8,
    pub stride: u32,
}

impl VertexArrayFormat {
    pub const DISABLED: Self = Self {
        ty: VertexType::Float,
        size: 0,
        stride: 0,
    };

    pub fn floats(size: u8, stride: u32) -> Self {
        Self {
            ty: VertexType::Float,
            size,
            stride,
        }
    }

    pub fn bits(&self) -> u32 {
        (self.ty as u32) | ((u32::from(self.size) & 0xF) << 4) | (self.stride << 8)
    }
}

/// How the converted texture is laid out in its buffer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TextureBinding {
    Swizzled { log2_width: u8, log2_height: u8 },
    Linear { pitch: u32, width: u32, height: u32 },
}

/// A texture buffer together with the layout its contents were written in.
#[derive(Debug, Copy, Clone)]
pub struct BoundTexture<'a> {
    pub buffer: &'a DmaBuffer,
    pub binding: TextureBinding,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetColorClearValue(u32),
    SetZStencilClearValue(u32),
    ClearSurface(ClearFlags),
    SetFrontFace(FrontFace),
    SetTextureOffset { stage: u8, offset: u32 },
    SetTextureFormat { stage: u8, format: TextureFormat },
    SetTextureAddress { stage: u8, address: TextureAddress },
    SetTextureControl0 { stage: u8, control: TextureControl0 },
    SetTextureControl1 { stage: u8, pitch: u32 },
    SetTextureImageRect { stage: u8, width: u32, height: u32 },
    SetTransformConstantLoad(u32),
    SetTransformConstant(Vec<Vec4>),
    SetVertexDataArrayFormat { slot: u8, format: VertexArrayFormat },
    SetVertexDataArrayOffset { slot: u8, offset: u32 },
    SetBeginEnd(Primitive),
    /// `count` must be in `1..=MAX_DRAW_BATCH`.
    DrawArrays { start: u32, count: u32 },
}

fn texture_method(base: u32, stage: u8) -> u32 {
    base + u32::from(stage) * method::TEXTURE_STAGE_STRIDE
}

fn vertex_method(base: u32, slot: u8) -> u32 {
    base + u32::from(slot) * 4
}

impl Command {
    pub fn encode_into(&self, w: &mut PushBufferWriter) {
        match self {
            Command::SetColorClearValue(v) => w.push1(method::SET_COLOR_CLEAR_VALUE, *v),
            Command::SetZStencilClearValue(v) => w.push1(method::SET_ZSTENCIL_CLEAR_VALUE, *v),
            Command::ClearSurface(flags) => w.push1(method::CLEAR_SURFACE, flags.bits()),
            Command::SetFrontFace(face) => w.push1(method::SET_FRONT_FACE, *face as u32),
            Command::SetTextureOffset { stage, offset } => {
                w.push1(texture_method(method::SET_TEXTURE_OFFSET, *stage), *offset)
            }
            Command::SetTextureFormat { stage, format } => w.push1(
                texture_method(method::SET_TEXTURE_FORMAT, *stage),
                format.bits(),
            ),
            Command::SetTextureAddress { stage, address } => w.push1(
                texture_method(method::SET_TEXTURE_ADDRESS, *stage),
                address.bits(),
            ),
            Command::SetTextureControl0 { stage, control } => w.push1(
                texture_method(method::SET_TEXTURE_CONTROL0, *stage),
                control.bits(),
            ),
            Command::SetTextureControl1 { stage, pitch } => w.push1(
                texture_method(method::SET_TEXTURE_CONTROL1, *stage),
                pitch << 16,
            ),
            Command::SetTextureImageRect {
                stage,
                width,
                height,
            } => w.push1(
                texture_method(method::SET_TEXTURE_IMAGE_RECT, *stage),
                (width << 16) | (height & 0xFFFF),
            ),
            Command::SetTransformConstantLoad(slot) => {
                w.push1(method::SET_TRANSFORM_CONSTANT_LOAD, *slot)
            }
            Command::SetTransformConstant(constants) => {
                // The load pointer auto-increments, so every packet restarts at the window base.
                let words: Vec<u32> = constants
                    .iter()
                    .flat_map(|c| c.to_array())
                    .map(f32::to_bits)
                    .collect();
                for chunk in words.chunks(method::TRANSFORM_CONSTANT_SLOTS) {
                    w.push(method::SET_TRANSFORM_CONSTANT, chunk);
                }
            }
            Command::SetVertexDataArrayFormat { slot, format } => w.push1(
                vertex_method(method::SET_VERTEX_DATA_ARRAY_FORMAT, *slot),
                format.bits(),
            ),
            Command::SetVertexDataArrayOffset { slot, offset } => w.push1(
                vertex_method(method::SET_VERTEX_DATA_ARRAY_OFFSET, *slot),
                *offset,
            ),
            Command::SetBeginEnd(primitive) => w.push1(method::SET_BEGIN_END, *primitive as u32),
            Command::DrawArrays { start, count } => {
                debug_assert!((1..=MAX_DRAW_BATCH).contains(count));
                w.push1(
                    method::DRAW_ARRAYS,
                    ((count - 1) << 24) | (start & 0x00FF_FFFF),
                )
            }
        }
    }
}

/// Ordered batch of commands submitted as one unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandSequence {
    pub commands: Vec<Command>,
}

impl CommandSequence {
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn encode(&self) -> Vec<u32> {
        let mut w = PushBufferWriter::new();
        for cmd in &self.commands {
            cmd.encode_into(&mut w);
        }
        w.finish()
    }
}

/// Builds the command sequence for one frame.
#[derive(Debug, Clone)]
pub struct CommandStreamBuilder {
    pub color_clear_value: u32,
    pub zstencil_clear_value: u32,
    pub clear_flags: ClearFlags,
}

impl Default for CommandStreamBuilder {
    fn default() -> Self {
        Self::new(0xFFFF_FFFF, 0xFFFF_FF00)
    }
}

impl CommandStreamBuilder {
    pub fn new(color_clear_value: u32, zstencil_clear_value: u32) -> Self {
        Self {
            color_clear_value,
            zstencil_clear_value,
            clear_flags: ClearFlags::Z | ClearFlags::STENCIL | ClearFlags::COLOR,
        }
    }

    pub fn build_frame(
        &self,
        descriptor: &FormatDescriptor,
        texture: BoundTexture<'_>,
        transforms: &TransformSet,
        vertices: &VertexBuffer,
    ) -> CommandSequence {
        let mut cmds = vec![
            Command::SetColorClearValue(self.color_clear_value),
            Command::SetZStencilClearValue(self.zstencil_clear_value),
            Command::ClearSurface(self.clear_flags),
            Command::SetFrontFace(FrontFace::Ccw),
        ];

        push_texture_stage(&mut cmds, 0, descriptor, texture);

        cmds.push(Command::SetTransformConstantLoad(TRANSFORM_CONSTANT_BASE));
        cmds.push(Command::SetTransformConstant(transforms.constants()));

        for slot in 0..VERTEX_ATTRIBUTE_COUNT {
            cmds.push(Command::SetVertexDataArrayFormat {
                slot,
                format: VertexArrayFormat::DISABLED,
            });
            cmds.push(Command::SetVertexDataArrayOffset { slot, offset: 0 });
        }
        let base = vertices.gpu_addr();
        for (slot, size, offset) in [
            (ATTR_POSITION, 3, Vertex::POS_OFFSET),
            (ATTR_TEXCOORD0, 2, Vertex::TEXCOORD_OFFSET),
            (ATTR_NORMAL, 3, Vertex::NORMAL_OFFSET),
        ] {
            cmds.push(Command::SetVertexDataArrayFormat {
                slot,
                format: VertexArrayFormat::floats(size, Vertex::STRIDE),
            });
            cmds.push(Command::SetVertexDataArrayOffset {
                slot,
                offset: base + offset,
            });
        }

        cmds.push(Command::SetBeginEnd(Primitive::Triangles));
        push_draw_batches(&mut cmds, 0, vertices.len() as u32);
        cmds.push(Command::SetBeginEnd(Primitive::End));

        CommandSequence { commands: cmds }
    }
}

fn push_texture_stage(
    cmds: &mut Vec<Command>,
    stage: u8,
    descriptor: &FormatDescriptor,
    texture: BoundTexture<'_>,
) {
    cmds.push(Command::SetTextureOffset {
        stage,
        offset: texture.buffer.gpu_addr(),
    });
    match texture.binding {
        TextureBinding::Swizzled {
            log2_width,
            log2_height,
        } => {
            cmds.push(Command::SetTextureFormat {
                stage,
                format: TextureFormat::new_2d(descriptor.hardware_format, log2_width, log2_height),
            });
            cmds.push(Command::SetTextureAddress {
                stage,
                address: TextureAddress::clamp_to_edge(),
            });
            cmds.push(Command::SetTextureControl0 {
                stage,
                control: TextureControl0::ENABLED,
            });
        }
        TextureBinding::Linear {
            pitch,
            width,
            height,
        } => {
            cmds.push(Command::SetTextureFormat {
                stage,
                format: TextureFormat::new_2d(descriptor.hardware_format, 0, 0),
            });
            cmds.push(Command::SetTextureControl0 {
                stage,
                control: TextureControl0::ENABLED,
            });
            cmds.push(Command::SetTextureControl1 { stage, pitch });
            cmds.push(Command::SetTextureImageRect {
                stage,
                width,
                height,
            });
        }
    }
}

fn push_draw_batches(cmds: &mut Vec<Command>, start: u32, count: u32) {
    let mut next = start;
    let end = start + count;
    while next < end {
        let batch = (end - next).min(MAX_DRAW_BATCH);
        cmds.push(Command::DrawArrays {
            start: next,
            count: batch,
        });
        next += batch;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dma::{CacheMode, ContiguousMemory, DmaAllocator};
    use crate::format::FormatRegistry;
    use pretty_assertions::assert_eq;

    #[test]
    fn texture_format_packs_fields() {
        let fmt = TextureFormat::new_2d(TextureColor::SzA8b8g8r8, 8, 8);
        assert_eq!(fmt.bits(), 0x0881_3A2A);
        assert_eq!(
            TextureFormat::new_2d(TextureColor::LuImageA8r8g8b8, 0, 0).bits(),
            0x0001_122A
        );
    }

    #[test]
    fn texture_address_clamps_every_axis() {
        assert_eq!(TextureAddress::clamp_to_edge().bits(), 0x0003_0303);
    }

    #[test]
    fn control_and_vertex_format_bits() {
        assert_eq!(TextureControl0::ENABLED.bits(), 0x4000_0000);
        assert_eq!(VertexArrayFormat::floats(3, 32).bits(), 0x0000_2032);
        assert_eq!(VertexArrayFormat::DISABLED.bits(), 0x0000_0002);
    }

    #[test]
    fn draw_arrays_is_split_into_batches() {
        let mut cmds = Vec::new();
        push_draw_batches(&mut cmds, 0, 600);
        assert_eq!(
            cmds,
            vec![
                Command::DrawArrays { start: 0, count: 256 },
                Command::DrawArrays { start: 256, count: 256 },
                Command::DrawArrays { start: 512, count: 88 },
            ]
        );

        let mut w = PushBufferWriter::new();
        cmds[2].encode_into(&mut w);
        assert_eq!(w.finish(), vec![0x0004_1810, (87 << 24) | 512]);
    }

    #[test]
    fn transform_constants_split_into_full_packets() {
        let seq = CommandSequence {
            commands: vec![Command::SetTransformConstant(vec![Vec4::ZERO; 15])],
        };
        let calls = crate::pushbuf::decode_push_buffer(&seq.encode()).unwrap();
        let sizes: Vec<usize> = calls.iter().map(|c| c.args.len()).collect();
        assert_eq!(sizes, vec![32, 28]);
        assert!(calls.iter().all(|c| c.method == method::SET_TRANSFORM_CONSTANT));
    }

    #[test]
    fn frame_binds_swizzled_texture_without_pitch() {
        let mem = ContiguousMemory::default();
        let vb = VertexBuffer::quad(&mem).unwrap();
        let tex = mem.allocate(256 * 256 * 4, 0, CacheMode::WriteCombine).unwrap();
        let registry = FormatRegistry::standard();
        let seq = CommandStreamBuilder::default().build_frame(
            registry.descriptor_at(0),
            BoundTexture {
                buffer: &tex,
                binding: TextureBinding::Swizzled {
                    log2_width: 8,
                    log2_height: 8,
                },
            },
            &TransformSet::new(640, 480, 60.0, 1.0, 10000.0),
            &vb,
        );

        assert_eq!(seq.commands[0], Command::SetColorClearValue(0xFFFF_FFFF));
        assert_eq!(seq.commands[1], Command::SetZStencilClearValue(0xFFFF_FF00));
        assert_eq!(
            seq.commands[2],
            Command::ClearSurface(ClearFlags::from_bits_truncate(0xF3))
        );
        assert_eq!(seq.commands[3], Command::SetFrontFace(FrontFace::Ccw));
        assert!(!seq
            .commands
            .iter()
            .any(|c| matches!(c, Command::SetTextureControl1 { .. })));
        assert_eq!(
            seq.commands.last(),
            Some(&Command::SetBeginEnd(Primitive::End))
        );
    }
}
