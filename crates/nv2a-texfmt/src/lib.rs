//! Texture-format conversion and submission pipeline for the NV2A (Kelvin) 3D class.
//!
//! A source image is re-encoded into each entry of a [`FormatRegistry`], written into a
//! DMA-visible texture buffer (swizzled or linear), and drawn on a textured quad through a
//! per-frame [`CommandSequence`] of Kelvin methods. [`FrameDriver`] ties the pieces together and
//! cycles formats on input.

pub mod command;
pub mod config;
pub mod convert;
pub mod dma;
pub mod driver;
pub mod error;
pub mod format;
pub mod gpu;
pub mod image;
pub mod input;
pub mod math;
pub mod mesh;
pub mod pushbuf;
pub mod swizzle;

pub use command::{BoundTexture, Command, CommandSequence, CommandStreamBuilder, TextureBinding};
pub use config::{DemoConfig, LinearTexcoordScale};
pub use convert::FormatConverter;
pub use dma::{CacheMode, ContiguousMemory, DmaAllocator, DmaBuffer};
pub use driver::{DriverState, FrameDriver, RunSummary, TickOutcome};
pub use error::{Result, StartupError, TexFmtError};
pub use format::{FormatDescriptor, FormatRegistry, PixelEncoding, TextureColor};
pub use gpu::{GpuChannel, HeadlessGpu};
pub use image::{convert_encoding, Image, ImageLoader, PngLoader};
pub use input::{Control, EdgeLatch, InputSource, ScriptedInput};
pub use math::{Mat4, TransformSet, Vec4};
pub use mesh::{Vertex, VertexBuffer};
pub use swizzle::{copy_rows, swizzle_rect};
