//! Error types for pitch_vision

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionError {
    /// A required calibration artifact (color ranges) is not available.
    #[error("Calibration missing: {0}")]
    CalibrationMissing(String),

    /// The homogeneous divisor of a projected point was zero.
    #[error("Degenerate projection for point ({x}, {y}): homogeneous divisor is zero")]
    ProjectionDegenerate { x: f64, y: f64 },

    #[error("Unknown team index {team}: {teams} team(s) are calibrated")]
    UnknownTeam { team: usize, teams: usize },

    /// Open, read or write failure on the video streams.
    #[error("Stream I/O failure: {0}")]
    StreamIo(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, VisionError>;
