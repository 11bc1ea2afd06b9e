#![forbid(unsafe_code)]

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use nv2a_texfmt::{
    ContiguousMemory, DemoConfig, FormatRegistry, FrameDriver, HeadlessGpu, ImageLoader,
    PngLoader, RunSummary, ScriptedInput, StartupError, TexFmtError,
};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(about = "Cycle a texture through every NV2A texture format on a headless GPU")]
struct Args {
    /// Source texture (PNG, power-of-two dimensions). Relative paths resolve against
    /// `--media-root`.
    #[arg(long, default_value = "texture.png")]
    texture: PathBuf,

    /// Directory the texture volume is mounted from.
    #[arg(long, default_value = "media")]
    media_root: PathBuf,

    /// Number of frames to render before exiting.
    #[arg(long, default_value_t = 180)]
    frames: usize,

    /// Press the advance control every N frames (0 never advances).
    #[arg(long, default_value_t = 30)]
    advance_every: usize,

    /// Registry index of the first format (wraps around).
    #[arg(long, default_value_t = 0)]
    start_index: usize,

    /// Busy polls the headless GPU reports after each submission.
    #[arg(long, default_value_t = 0)]
    gpu_latency: u32,

    /// How long to keep the failure message up before exiting on a startup error.
    #[arg(long, default_value_t = 3000)]
    failure_delay_ms: u64,

    /// Print the format registry and exit.
    #[arg(long)]
    list_formats: bool,

    /// Display width in pixels.
    #[arg(long, default_value_t = 640)]
    width: u32,

    /// Display height in pixels.
    #[arg(long, default_value_t = 480)]
    height: u32,
}

impl Args {
    fn config(&self) -> DemoConfig {
        DemoConfig {
            display_width: self.width,
            display_height: self.height,
            initial_format: self.start_index,
            ..DemoConfig::default()
        }
    }
}

fn list_formats(registry: &FormatRegistry) -> anyhow::Result<()> {
    let mut out = io::stdout().lock();
    for (i, d) in registry.iter().enumerate() {
        writeln!(
            out,
            "{i:2} {:<12} {:<9} {} code=0x{:02x}",
            d.label,
            d.source_encoding.to_string(),
            if d.swizzled { "swizzled" } else { "linear  " },
            d.hardware_format.code()
        )
        .context("failed to write format list")?;
    }
    Ok(())
}

#[derive(Debug, Error)]
enum Failure {
    #[error(transparent)]
    Startup(StartupError),

    #[error(transparent)]
    RenderLoop(TexFmtError),
}

impl Failure {
    fn is_precondition_violation(&self) -> bool {
        match self {
            Failure::Startup(err) => err.is_precondition_violation(),
            Failure::RenderLoop(err) => err.is_precondition_violation(),
        }
    }

    /// Only startup failures keep their message up before exiting.
    fn exit_delay(&self, startup_delay: Duration) -> Duration {
        match self {
            Failure::Startup(_) => startup_delay,
            Failure::RenderLoop(_) => Duration::ZERO,
        }
    }

    fn report(&self) {
        match self {
            Failure::Startup(err) => tracing::error!(error = %err, "startup failed"),
            Failure::RenderLoop(err) => tracing::error!(error = %err, "render loop failed"),
        }
    }
}

fn start(
    args: &Args,
    memory: &ContiguousMemory,
) -> Result<FrameDriver<HeadlessGpu, ScriptedInput>, StartupError> {
    if !args.media_root.is_dir() {
        return Err(StartupError::Mount {
            path: args.media_root.clone(),
        });
    }
    let source = PngLoader.load(&args.media_root.join(&args.texture))?;

    Ok(FrameDriver::new(
        &args.config(),
        FormatRegistry::standard(),
        source,
        memory,
        HeadlessGpu::with_latency(args.gpu_latency),
        ScriptedInput::cycling(args.frames, args.advance_every),
    )?)
}

fn run(args: &Args) -> Result<RunSummary, Failure> {
    let memory = ContiguousMemory::default();
    let driver = start(args, &memory).map_err(Failure::Startup)?;
    let summary = driver.run().map_err(Failure::RenderLoop)?;
    tracing::debug!(peak_bytes = memory.peak_bytes(), "contiguous memory released");
    Ok(summary)
}

fn main() -> anyhow::Result<ExitCode> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .init();

    let args = Args::parse();

    if args.list_formats {
        list_formats(&FormatRegistry::standard())?;
        return Ok(ExitCode::SUCCESS);
    }

    match run(&args) {
        Ok(summary) => {
            tracing::info!(
                frames = summary.frames,
                format_switches = summary.format_switches,
                final_index = summary.final_index,
                "done"
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(failure) if failure.is_precondition_violation() => {
            // Everything owned by `run` has been dropped by now.
            tracing::error!(error = %failure, "precondition violated, aborting");
            std::process::abort();
        }
        Err(failure) => {
            failure.report();
            std::thread::sleep(failure.exit_delay(Duration::from_millis(args.failure_delay_ms)));
            Ok(ExitCode::FAILURE)
        }
    }
}
