//! Error types for track and telemetry handling

use thiserror::Error;

/// Errors raised by the track and telemetry APIs.
///
/// The map view operations themselves never fail; only the helpers that
/// turn files and indices into paths do.
#[derive(Error, Debug)]
pub enum TrackError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid index {index}: track has {len} points")]
    InvalidIndex { index: usize, len: usize },

    #[error("Trackpoint {index} has no timestamp")]
    MissingTimestamp { index: usize },

    #[error("SRT line {line}: {reason}")]
    Srt { line: usize, reason: String },

    #[error("GPX error: {0}")]
    Gpx(#[from] gpx::errors::GpxError),

    #[error("Unsupported track file: {0}")]
    UnsupportedFormat(String),
}

/// Result type alias for track operations
pub type Result<T> = std::result::Result<T, TrackError>;
