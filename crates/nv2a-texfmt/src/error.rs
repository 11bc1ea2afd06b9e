use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::dma::DmaError;
use crate::gpu::SubmitError;
use crate::image::LoadError;

pub type Result<T> = std::result::Result<T, TexFmtError>;

/// Errors produced by the conversion and submission pipeline.
///
/// [`TexFmtError::PreconditionViolation`] is fatal for the demo (the caller is expected to abort),
/// while [`TexFmtError::UnsupportedPixelSize`] is recoverable: the offending format is skipped and
/// the texture buffer is left untouched.
#[derive(Debug, Error)]
pub enum TexFmtError {
    #[error("texture dimensions must be powers of two (got {width}x{height})")]
    PreconditionViolation { width: u32, height: u32 },

    #[error("unsupported pixel size: {bytes_per_pixel} bytes per pixel")]
    UnsupportedPixelSize { bytes_per_pixel: usize },

    #[error("destination buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("source buffer too small: need {needed} bytes, have {available}")]
    SourceTooSmall { needed: usize, available: usize },

    #[error("no registry entry could be converted for the source image")]
    NoUsableFormat,

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Dma(#[from] DmaError),

    #[error(transparent)]
    Submit(#[from] SubmitError),
}

impl TexFmtError {
    pub fn is_precondition_violation(&self) -> bool {
        matches!(self, TexFmtError::PreconditionViolation { .. })
    }
}

/// Failures that happen before the first frame is rendered.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to mount media volume {}", path.display())]
    Mount { path: PathBuf },

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Driver(#[from] TexFmtError),
}

impl StartupError {
    pub fn is_precondition_violation(&self) -> bool {
        matches!(self, StartupError::Driver(err) if err.is_precondition_violation())
    }
}
