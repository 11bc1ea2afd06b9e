//! The render loop.
//!
//! Each [`FrameDriver::tick`] polls input, switches to the next registry entry on a fresh press of
//! [`Control::AdvanceFormat`], then renders one frame: wait for vblank, wait for the GPU to go
//! idle, build and submit the frame, and wait for it to retire. Only one frame is ever in flight,
//! so the texture and vertex buffers are never rewritten while the GPU may still read them.

use crate::command::{BoundTexture, CommandStreamBuilder, TextureBinding};
use crate::config::DemoConfig;
use crate::convert::FormatConverter;
use crate::dma::{CacheMode, DmaAllocator, DmaBuffer, DmaError};
use crate::error::{Result, TexFmtError};
use crate::format::{FormatDescriptor, FormatRegistry};
use crate::gpu::GpuChannel;
use crate::image::Image;
use crate::input::{Control, EdgeLatch, InputSource};
use crate::math::TransformSet;
use crate::mesh::VertexBuffer;
use crate::swizzle::check_power_of_two;

/// Texture buffers are sized for the widest encoding so they never need reallocating.
const TEXTURE_BYTES_PER_PIXEL: u64 = 4;

/// Phase of the current tick. A phase that fails is left in place, so after an error
/// [`FrameDriver::state`] names the phase that failed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Advancing,
    Rendering,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Exit,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub format_switches: u64,
    pub final_index: usize,
}

pub struct FrameDriver<G, I> {
    registry: FormatRegistry,
    source: Image,
    converter: FormatConverter,
    builder: CommandStreamBuilder,
    transforms: TransformSet,
    texture: DmaBuffer,
    vertices: VertexBuffer,
    binding: TextureBinding,
    index: usize,
    state: DriverState,
    advance: EdgeLatch,
    gpu: G,
    input: I,
    frames: u64,
    format_switches: u64,
}

impl<G: GpuChannel, I: InputSource> FrameDriver<G, I> {
    pub fn new(
        config: &DemoConfig,
        registry: FormatRegistry,
        source: Image,
        memory: &dyn DmaAllocator,
        gpu: G,
        input: I,
    ) -> Result<Self> {
        config.validate()?;
        check_power_of_two(source.width, source.height)?;

        let mut vertices = VertexBuffer::quad(memory)?;
        let texture_size = u64::from(source.width)
            .checked_mul(u64::from(source.height))
            .and_then(|texels| texels.checked_mul(TEXTURE_BYTES_PER_PIXEL))
            .ok_or(DmaError::SizeOverflow {
                width: source.width,
                height: source.height,
                bytes_per_pixel: TEXTURE_BYTES_PER_PIXEL,
            })?;
        let mut texture = memory.allocate(texture_size, 0, CacheMode::WriteCombine)?;

        let converter = FormatConverter::new(config.linear_texcoord_scale);
        let start = config.initial_format % registry.count();
        let (index, binding) = select_format(
            &converter,
            &registry,
            &source,
            start,
            &mut texture,
            &mut vertices,
        )?
        .ok_or(TexFmtError::NoUsableFormat)?;

        Ok(Self {
            registry,
            source,
            converter,
            builder: CommandStreamBuilder::new(
                config.color_clear_value,
                config.zstencil_clear_value,
            ),
            transforms: TransformSet::new(
                config.display_width,
                config.display_height,
                config.fov_y_degrees,
                config.z_near,
                config.z_far,
            ),
            texture,
            vertices,
            binding,
            index,
            state: DriverState::Idle,
            advance: EdgeLatch::new(),
            gpu,
            input,
            frames: 0,
            format_switches: 0,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn descriptor(&self) -> &FormatDescriptor {
        self.registry.descriptor_at(self.index)
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn binding(&self) -> TextureBinding {
        self.binding
    }

    pub fn vertices(&self) -> &VertexBuffer {
        &self.vertices
    }

    pub fn texture(&self) -> &DmaBuffer {
        &self.texture
    }

    pub fn gpu(&self) -> &G {
        &self.gpu
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn tick(&mut self) -> Result<TickOutcome> {
        self.input.poll();
        if self.input.is_down(Control::Exit) {
            return Ok(TickOutcome::Exit);
        }

        if self.advance.update(self.input.is_down(Control::AdvanceFormat)) {
            self.enter(DriverState::Advancing, Self::advance_format)?;
        }
        self.enter(DriverState::Rendering, Self::render_frame)?;
        Ok(TickOutcome::Continue)
    }

    /// Tick until the exit control is pressed. Buffers are released when the driver is dropped
    /// on return, including on error.
    pub fn run(mut self) -> Result<RunSummary> {
        while self.tick()? == TickOutcome::Continue {}
        let summary = RunSummary {
            frames: self.frames,
            format_switches: self.format_switches,
            final_index: self.index,
        };
        tracing::info!(
            frames = summary.frames,
            format_switches = summary.format_switches,
            "render loop finished"
        );
        Ok(summary)
    }

    fn enter(&mut self, state: DriverState, phase: fn(&mut Self) -> Result<()>) -> Result<()> {
        let _span = tracing::debug_span!("driver", ?state, index = self.index).entered();
        self.state = state;
        phase(self)?;
        self.state = DriverState::Idle;
        Ok(())
    }

    fn advance_format(&mut self) -> Result<()> {
        let start = self.registry.next_index(self.index);
        match select_format(
            &self.converter,
            &self.registry,
            &self.source,
            start,
            &mut self.texture,
            &mut self.vertices,
        )? {
            Some((index, binding)) => {
                self.index = index;
                self.binding = binding;
                self.format_switches += 1;
            }
            None => tracing::warn!(
                index = self.index,
                "no other format could be converted; keeping the current one"
            ),
        }
        Ok(())
    }

    fn render_frame(&mut self) -> Result<()> {
        self.gpu.wait_vblank();
        self.wait_idle();

        let sequence = self.builder.build_frame(
            self.registry.descriptor_at(self.index),
            BoundTexture {
                buffer: &self.texture,
                binding: self.binding,
            },
            &self.transforms,
            &self.vertices,
        );
        self.gpu.submit(&sequence)?;
        self.wait_idle();

        self.frames += 1;
        tracing::debug!(frame = self.frames, commands = sequence.len(), "frame submitted");
        Ok(())
    }

    fn wait_idle(&mut self) {
        while self.gpu.busy() {}
        while !self.gpu.finished() {}
    }
}

/// Convert the first entry, starting at `start`, that the source can be expressed in.
///
/// Entries reporting [`TexFmtError::UnsupportedPixelSize`] are skipped; every entry is tried at
/// most once. Any other error is returned as is.
fn select_format(
    converter: &FormatConverter,
    registry: &FormatRegistry,
    source: &Image,
    start: usize,
    texture: &mut DmaBuffer,
    vertices: &mut VertexBuffer,
) -> Result<Option<(usize, TextureBinding)>> {
    for attempt in 0..registry.count() {
        let index = (start + attempt) % registry.count();
        let descriptor = registry.descriptor_at(index);
        match converter.convert(source, descriptor, texture, vertices) {
            Ok(binding) => {
                tracing::info!(
                    index,
                    label = descriptor.label,
                    swizzled = descriptor.swizzled,
                    bpp = descriptor.bytes_per_pixel(),
                    "texture format selected"
                );
                return Ok(Some((index, binding)));
            }
            Err(TexFmtError::UnsupportedPixelSize { bytes_per_pixel }) => {
                tracing::warn!(
                    index,
                    label = descriptor.label,
                    bytes_per_pixel,
                    "skipping format with unsupported pixel size"
                );
            }
            Err(err) => return Err(err),
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dma::ContiguousMemory;
    use crate::format::{PixelEncoding, TextureColor};
    use crate::command::CommandSequence;
    use crate::gpu::{HeadlessGpu, SubmitError};
    use crate::input::ScriptedInput;

    /// Accepts nothing.
    struct RejectingGpu;

    impl GpuChannel for RejectingGpu {
        fn submit(&mut self, _: &CommandSequence) -> std::result::Result<(), SubmitError> {
            Err(SubmitError::InFlight)
        }

        fn busy(&mut self) -> bool {
            false
        }

        fn finished(&mut self) -> bool {
            true
        }

        fn wait_vblank(&mut self) {}
    }

    fn rgb24_entry() -> FormatDescriptor {
        FormatDescriptor::new(PixelEncoding::Rgb24, TextureColor::SzX8r8g8b8, true, "RGB24")
    }

    #[test]
    fn unsupported_entries_are_skipped() {
        let registry = FormatRegistry::new(vec![
            rgb24_entry(),
            FormatDescriptor::new(PixelEncoding::Rgb565, TextureColor::SzR5g6b5, true, "SZ_R5G6B5"),
        ])
        .unwrap();
        let mem = ContiguousMemory::default();
        let driver = FrameDriver::new(
            &DemoConfig::default(),
            registry,
            Image::solid(4, 4, [0; 4]),
            &mem,
            HeadlessGpu::new(),
            ScriptedInput::default(),
        )
        .unwrap();
        assert_eq!(driver.index(), 1);
        assert_eq!(driver.state(), DriverState::Idle);
    }

    #[test]
    fn registry_without_usable_entry_fails_and_releases_memory() {
        let registry = FormatRegistry::new(vec![rgb24_entry()]).unwrap();
        let mem = ContiguousMemory::default();
        let result = FrameDriver::new(
            &DemoConfig::default(),
            registry,
            Image::solid(4, 4, [0; 4]),
            &mem,
            HeadlessGpu::new(),
            ScriptedInput::default(),
        );
        assert!(matches!(result, Err(TexFmtError::NoUsableFormat)));
        assert_eq!(mem.live_allocations(), 0);
    }

    #[test]
    fn exit_submits_nothing() {
        let mem = ContiguousMemory::default();
        let mut driver = FrameDriver::new(
            &DemoConfig::default(),
            FormatRegistry::standard(),
            Image::solid(2, 2, [0; 4]),
            &mem,
            HeadlessGpu::new(),
            ScriptedInput::new([vec![Control::Exit]]),
        )
        .unwrap();
        assert_eq!(driver.tick().unwrap(), TickOutcome::Exit);
        assert_eq!(driver.gpu().stats().submissions, 0);
    }

    #[test]
    fn failed_submission_leaves_rendering_state() {
        let mem = ContiguousMemory::default();
        let mut driver = FrameDriver::new(
            &DemoConfig::default(),
            FormatRegistry::standard(),
            Image::solid(2, 2, [0; 4]),
            &mem,
            RejectingGpu,
            ScriptedInput::new([vec![Control::AdvanceFormat]]),
        )
        .unwrap();
        assert_eq!(driver.state(), DriverState::Idle);

        let err = driver.tick().unwrap_err();
        assert!(matches!(err, TexFmtError::Submit(SubmitError::InFlight)));
        // The advance completed before the frame was built.
        assert_eq!(driver.index(), 1);
        assert_eq!(driver.state(), DriverState::Rendering);
        assert_eq!(driver.frames(), 0);
    }

    #[test]
    fn oversized_source_is_rejected_before_the_texture_allocation() {
        let mem = ContiguousMemory::default();
        let source = Image {
            width: 1 << 31,
            height: 1 << 31,
            pitch: 0,
            encoding: PixelEncoding::Abgr8888,
            pixels: Vec::new(),
        };
        let result = FrameDriver::new(
            &DemoConfig::default(),
            FormatRegistry::standard(),
            source,
            &mem,
            HeadlessGpu::new(),
            ScriptedInput::default(),
        );
        assert!(matches!(
            result,
            Err(TexFmtError::Dma(DmaError::SizeOverflow { .. }))
        ));
        assert_eq!(mem.live_allocations(), 0);
    }
}
