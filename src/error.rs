use std::path::PathBuf;
use thiserror::Error;

/// Failure to turn a file on disk into an `AudioSample`.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("audio file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to open audio file {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported or unreadable audio in {}: {source}", path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: symphonia::core::errors::Error,
    },

    #[error("no audio track found in {}", .0.display())]
    NoTrack(PathBuf),

    #[error("unknown sample rate in {}", .0.display())]
    UnknownSampleRate(PathBuf),

    #[error("decoded zero samples from {}", .0.display())]
    Empty(PathBuf),

    #[error("failed to resample from {from} Hz to {to} Hz: {reason}")]
    Resample { from: u32, to: u32, reason: String },
}

/// Failure of a single feature computation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ComputeError {
    #[error("sample is empty")]
    EmptySample,

    #[error("sample is silent")]
    Silent,

    #[error("feature disabled")]
    Disabled,

    #[error("invalid analysis settings: {0}")]
    InvalidConfig(String),

    #[error("numeric failure: {0}")]
    Numeric(String),

    #[error("every feature failed, first error: {0}")]
    AllFailed(Box<ComputeError>),
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("plot backend error: {0}")]
    Backend(String),

    #[error("figure layout needs {expected} plots, got {got}")]
    PlotCount { expected: usize, got: usize },
}

/// Failure to persist the composed figure.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("cannot create output directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode PNG {}: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to move PNG into place at {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("figure buffer does not match {width}x{height}")]
    BufferSize { width: u32, height: u32 },

    #[error("cannot derive an output name from {}", .0.display())]
    NoFileName(PathBuf),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Compute(#[from] ComputeError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Write(#[from] WriteError),
}
