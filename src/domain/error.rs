use std::time::Duration;
use thiserror::Error;

/// LinePort unified error type
#[derive(Error, Debug)]
pub enum LinePortError {
    #[error("Serial port is not open")]
    NotOpen,

    #[error("\"{name}\" is already open")]
    AlreadyOpen { name: String },

    #[error("Unable to open port \"{name}\": {source}")]
    TransportOpenFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Transport error on \"{name}\" during {operation}: {source}")]
    TransportIo {
        name: String,
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Timeout expired after {timeout:?} waiting for \"{pattern}\"")]
    Timeout { pattern: String, timeout: Duration },

    #[error("Receive buffer is empty")]
    BufferEmpty,

    #[error("No delimiter in receive buffer yet")]
    NoDelimiterYet,

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Output error: {0}")]
    Output(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl LinePortError {
    /// Whether the caller may retry the same operation with a fresh deadline
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LinePortError::Timeout { .. } | LinePortError::BufferEmpty | LinePortError::NoDelimiterYet
        )
    }
}

pub type LinePortResult<T> = Result<T, LinePortError>;
