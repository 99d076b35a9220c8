use thiserror::Error;

/// Calibration error types
///
/// Every variant is a precondition violation at the boundary of the core.
/// A fit that stops on its time budget is not an error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("Offset/scale fit needs at least {required} points, have {available}")]
    InsufficientPoints { required: usize, available: usize },

    #[error("Rotation alignment needs at least one calibration point")]
    NoPoints,

    #[error("Channel group is empty")]
    EmptyGroup,

    #[error("Channel {channel} has {actual} points, expected {expected}")]
    MisalignedGroup {
        channel: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Got {samples} samples for {channels} channels")]
    GroupSize { channels: usize, samples: usize },

    #[error("Invalid bounds: {0}")]
    InvalidBounds(String),

    #[error("Sample for channel {channel} is not finite")]
    NonFiniteSample { channel: usize },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<toml::de::Error> for CalibrationError {
    fn from(e: toml::de::Error) -> Self {
        CalibrationError::Config(e.to_string())
    }
}

/// Result type for calibration operations
pub type Result<T> = std::result::Result<T, CalibrationError>;
