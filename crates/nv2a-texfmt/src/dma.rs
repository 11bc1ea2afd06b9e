//! Physically contiguous, GPU-visible memory.
//!
//! [`ContiguousMemory`] hands out [`DmaBuffer`]s from a fixed physical window using first-fit
//! placement. A buffer returns its range to the window when dropped, so every exit path (including
//! early returns on errors) releases what it acquired.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use bytemuck::Pod;
use thiserror::Error;

pub const PAGE_SIZE: u64 = 4096;

/// Exclusive upper bound of the window contiguous allocations are placed in.
pub const CONTIGUOUS_WINDOW_END: u64 = 0x03FF_B000;

/// The GPU sees physical addresses through this mask.
pub const GPU_ADDRESS_MASK: u64 = 0x03FF_FFFF;

/// Round `value` up to the nearest multiple of `alignment`.
///
/// `alignment` must be > 0.
pub(crate) fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment > 0);

    let add = alignment - 1;
    match value.checked_add(add) {
        Some(v) => v / alignment * alignment,
        None => u64::MAX / alignment * alignment,
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum CacheMode {
    Cached,
    Uncached,
    #[default]
    WriteCombine,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DmaError {
    #[error("out of contiguous memory: size={size} alignment={alignment} window=0x{window:x}")]
    OutOfMemory {
        size: u64,
        alignment: u64,
        window: u64,
    },

    #[error("zero-sized contiguous allocation")]
    ZeroSize,

    #[error("allocation size overflows: {width}x{height} at {bytes_per_pixel} bytes per pixel")]
    SizeOverflow {
        width: u32,
        height: u32,
        bytes_per_pixel: u64,
    },

    #[error("cannot view {len} bytes as elements of {elem_size} bytes")]
    Cast { len: usize, elem_size: usize },
}

/// Allocation boundary for DMA-visible memory.
pub trait DmaAllocator {
    fn allocate(&self, size: u64, alignment: u64, cache_mode: CacheMode)
        -> Result<DmaBuffer, DmaError>;

    /// Release `buffer` now. Dropping it has the same effect.
    fn free(&self, buffer: DmaBuffer) {
        drop(buffer);
    }
}

#[derive(Debug)]
struct Window {
    base: u64,
    end: u64,
    /// start -> end of every live allocation.
    live: BTreeMap<u64, u64>,
    peak_bytes: u64,
}

impl Window {
    fn live_bytes(&self) -> u64 {
        self.live.iter().map(|(start, end)| end - start).sum()
    }

    fn place(&mut self, size: u64, alignment: u64) -> Option<u64> {
        let mut candidate = align_up(self.base, alignment);
        for (&start, &end) in &self.live {
            if candidate.checked_add(size)? <= start {
                break;
            }
            candidate = candidate.max(align_up(end, alignment));
        }
        let end = candidate.checked_add(size)?;
        if end > self.end {
            return None;
        }
        self.live.insert(candidate, end);
        self.peak_bytes = self.peak_bytes.max(self.live_bytes());
        Some(candidate)
    }
}

/// First-fit allocator over a fixed physical window.
///
/// Cloning yields another handle to the same window.
#[derive(Clone)]
pub struct ContiguousMemory {
    window: Rc<RefCell<Window>>,
}

impl ContiguousMemory {
    /// Create an allocator for `[base, end)`.
    pub fn new(base: u64, end: u64) -> Self {
        Self {
            window: Rc::new(RefCell::new(Window {
                base,
                end,
                live: BTreeMap::new(),
                peak_bytes: 0,
            })),
        }
    }

    pub fn live_allocations(&self) -> usize {
        self.window.borrow().live.len()
    }

    pub fn live_bytes(&self) -> u64 {
        self.window.borrow().live_bytes()
    }

    pub fn peak_bytes(&self) -> u64 {
        self.window.borrow().peak_bytes
    }
}

impl Default for ContiguousMemory {
    fn default() -> Self {
        Self::new(0, CONTIGUOUS_WINDOW_END)
    }
}

impl fmt::Debug for ContiguousMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let window = self.window.borrow();
        f.debug_struct("ContiguousMemory")
            .field("base", &window.base)
            .field("end", &window.end)
            .field("live", &window.live.len())
            .finish()
    }
}

impl DmaAllocator for ContiguousMemory {
    fn allocate(
        &self,
        size: u64,
        alignment: u64,
        cache_mode: CacheMode,
    ) -> Result<DmaBuffer, DmaError> {
        if size == 0 {
            return Err(DmaError::ZeroSize);
        }
        // An alignment of zero means "page aligned".
        let alignment = if alignment == 0 { PAGE_SIZE } else { alignment };

        let mut window = self.window.borrow_mut();
        let phys = window
            .place(size, alignment)
            .ok_or(DmaError::OutOfMemory {
                size,
                alignment,
                window: window.end,
            })?;
        drop(window);

        let len = size as usize;
        tracing::debug!(phys = format_args!("0x{phys:08x}"), len, ?cache_mode, "contiguous alloc");

        Ok(DmaBuffer {
            phys,
            len,
            cache_mode,
            // Word-backed so the bytes can be viewed as `f32`/`u32` records without realignment.
            words: vec![0u32; len.div_ceil(4)].into_boxed_slice(),
            window: Rc::clone(&self.window),
        })
    }
}

/// A live contiguous allocation. Freed on drop.
pub struct DmaBuffer {
    phys: u64,
    len: usize,
    cache_mode: CacheMode,
    words: Box<[u32]>,
    window: Rc<RefCell<Window>>,
}

impl DmaBuffer {
    pub fn phys_addr(&self) -> u64 {
        self.phys
    }

    /// Address as programmed into GPU registers.
    pub fn gpu_addr(&self) -> u32 {
        (self.phys & GPU_ADDRESS_MASK) as u32
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn cache_mode(&self) -> CacheMode {
        self.cache_mode
    }

    pub fn as_bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<u32, u8>(&self.words[..])[..self.len]
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        let len = self.len;
        &mut bytemuck::cast_slice_mut::<u32, u8>(&mut self.words[..])[..len]
    }

    /// View the buffer as a slice of `T`. The length must be a whole number of elements.
    pub fn cast<T: Pod>(&self) -> Result<&[T], DmaError> {
        bytemuck::try_cast_slice(self.as_bytes()).map_err(|_| DmaError::Cast {
            len: self.len,
            elem_size: std::mem::size_of::<T>(),
        })
    }

    pub fn cast_mut<T: Pod>(&mut self) -> Result<&mut [T], DmaError> {
        let len = self.len;
        bytemuck::try_cast_slice_mut(self.as_bytes_mut()).map_err(|_| DmaError::Cast {
            len,
            elem_size: std::mem::size_of::<T>(),
        })
    }
}

impl Drop for DmaBuffer {
    fn drop(&mut self) {
        let removed = self.window.borrow_mut().live.remove(&self.phys);
        debug_assert!(removed.is_some(), "double free of 0x{:x}", self.phys);
        tracing::debug!(phys = format_args!("0x{:08x}", self.phys), "contiguous free");
    }
}

impl fmt::Debug for DmaBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DmaBuffer")
            .field("phys", &format_args!("0x{:08x}", self.phys))
            .field("len", &self.len)
            .field("cache_mode", &self.cache_mode)
            .finish()
    }
}
