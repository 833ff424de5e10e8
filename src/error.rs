use std::path::PathBuf;

use thiserror::Error;

/// Result type for compression, decomposition, sonification and rendering.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the core. None of them are retried internally.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed cube input, mismatched array lengths, a degenerate
    /// normalization range or an out-of-domain MIDI identifier.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The sound bank or the synthesis backend could not be located.
    #[error("rendering unavailable: {what} not found at {path}")]
    RenderingUnavailable { what: &'static str, path: PathBuf },

    /// Pixel indices outside the cube's spatial extent.
    #[error("pixel ({x}, {y}) is outside the {width}x{height} cube")]
    CoordinateOutOfRange {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },

    /// The synthesis backend ran but exited with a failure status.
    #[error("synthesis backend exited with status {exit_code}: {stderr}")]
    RenderFailed { exit_code: i32, stderr: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }
}
