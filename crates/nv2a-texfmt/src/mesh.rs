use bytemuck::{Pod, Zeroable};

use crate::dma::{CacheMode, DmaAllocator, DmaBuffer, DmaError};

#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub texcoord: [f32; 2],
    pub normal: [f32; 3],
}

impl Vertex {
    pub const STRIDE: u32 = std::mem::size_of::<Vertex>() as u32;
    pub const POS_OFFSET: u32 = 0;
    pub const TEXCOORD_OFFSET: u32 = 12;
    pub const NORMAL_OFFSET: u32 = 20;

    const fn new(pos: [f32; 3], texcoord: [f32; 2]) -> Self {
        Self {
            pos,
            texcoord,
            normal: [0.0, 0.0, 1.0],
        }
    }
}

/// Unit quad facing +Z, two counter-clockwise triangles.
pub const QUAD_VERTICES: [Vertex; 6] = [
    Vertex::new([-1.0, -1.0, 0.0], [0.0, 1.0]),
    Vertex::new([1.0, -1.0, 0.0], [1.0, 1.0]),
    Vertex::new([1.0, 1.0, 0.0], [1.0, 0.0]),
    Vertex::new([-1.0, -1.0, 0.0], [0.0, 1.0]),
    Vertex::new([1.0, 1.0, 0.0], [1.0, 0.0]),
    Vertex::new([-1.0, 1.0, 0.0], [0.0, 0.0]),
];

/// Vertex array living in contiguous memory.
#[derive(Debug)]
pub struct VertexBuffer {
    buffer: DmaBuffer,
}

impl VertexBuffer {
    pub fn new(memory: &dyn DmaAllocator, vertices: &[Vertex]) -> Result<Self, DmaError> {
        let size = std::mem::size_of_val(vertices) as u64;
        let mut buffer = memory.allocate(size, 0, CacheMode::WriteCombine)?;
        buffer
            .as_bytes_mut()
            .copy_from_slice(bytemuck::cast_slice(vertices));
        Ok(Self { buffer })
    }

    pub fn quad(memory: &dyn DmaAllocator) -> Result<Self, DmaError> {
        Self::new(memory, &QUAD_VERTICES)
    }

    pub fn vertices(&self) -> &[Vertex] {
        // The buffer was sized from a `[Vertex]`, so the cast cannot fail.
        bytemuck::cast_slice(self.buffer.as_bytes())
    }

    pub fn vertices_mut(&mut self) -> &mut [Vertex] {
        bytemuck::cast_slice_mut(self.buffer.as_bytes_mut())
    }

    pub fn len(&self) -> usize {
        self.vertices().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn gpu_addr(&self) -> u32 {
        self.buffer.gpu_addr()
    }

    /// Replace every non-zero texcoord component with `scale_u` / `scale_v`.
    pub fn normalize_texcoords(&mut self, scale_u: f32, scale_v: f32) {
        for v in self.vertices_mut() {
            if v.texcoord[0] != 0.0 {
                v.texcoord[0] = scale_u;
            }
            if v.texcoord[1] != 0.0 {
                v.texcoord[1] = scale_v;
            }
        }
    }
}
