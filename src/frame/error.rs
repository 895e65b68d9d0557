//! Frame error types
//!
//! Errors raised while building, validating or loading frames.

use thiserror::Error;

/// Errors that can occur while constructing or loading a frame
#[derive(Error, Debug)]
pub enum FrameError {
    /// A field's length disagrees with the frame's row count
    #[error("Field '{field}' has {actual} values, expected {expected}")]
    LengthMismatch {
        field: String,
        expected: usize,
        actual: usize,
    },

    /// The time axis goes backwards
    #[error("Time axis is not sorted: timestamp at row {row} is earlier than row {}", .row - 1)]
    UnsortedTime { row: usize },

    /// CSV input could not be read
    #[error("CSV error: {0}")]
    Csv(String),

    /// A timestamp cell could not be parsed
    #[error("Could not parse timestamp: {0}")]
    Timestamp(String),

    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON decoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<csv::Error> for FrameError {
    fn from(err: csv::Error) -> Self {
        FrameError::Csv(err.to_string())
    }
}

/// Result type alias for frame operations
pub type FrameResult<T> = Result<T, FrameError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FrameError::LengthMismatch {
            field: "cpu".to_string(),
            expected: 3,
            actual: 2,
        };
        assert_eq!(err.to_string(), "Field 'cpu' has 2 values, expected 3");

        let err = FrameError::UnsortedTime { row: 4 };
        assert_eq!(
            err.to_string(),
            "Time axis is not sorted: timestamp at row 4 is earlier than row 3"
        );
    }
}
