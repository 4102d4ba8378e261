// Error types for the acquisition chain
//
// Protocol errors are per-line and recoverable. Everything the caller has to
// act on is a StreamError.

use thiserror::Error;

/// Result type for chain operations
pub type StreamResult<T> = Result<T, StreamError>;

/// Reasons a single protocol line is rejected
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    #[error("malformed line: expected {expected} tokens, got {actual}")]
    MalformedLength { expected: usize, actual: usize },

    #[error("invalid channel selector '{token}' (allowed 1..={max})")]
    InvalidSelector { token: String, max: usize },

    #[error("invalid sample rate token '{0}'")]
    InvalidRate(String),

    #[error("invalid sequence token '{0}'")]
    InvalidSequence(String),

    #[error("invalid sample '{token}' at position {position}")]
    InvalidSample { position: usize, token: String },

    #[error("line is not valid UTF-8")]
    Encoding,
}

/// Errors that can occur while acquiring or storing samples
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error(
        "Sample rate mismatch on {source_label}: chain runs at {expected} Hz, source reports {actual} Hz"
    )]
    ConfigurationInconsistency {
        source_label: String,
        expected: f64,
        actual: f64,
    },

    #[error("Source {index} ({label}) unavailable: {reason}")]
    SourceUnavailable {
        index: usize,
        label: String,
        reason: String,
    },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Channel {channel} out of range (bank holds {channels} channels)")]
    ChannelOutOfRange { channel: usize, channels: usize },

    #[error("Sample vector has {actual} values, expected {expected}")]
    WidthMismatch { expected: usize, actual: usize },
}

impl StreamError {
    /// Cross-source invariant violations; the chain must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StreamError::ConfigurationInconsistency { .. })
    }

    /// Per-source failures the caller may retry by reattaching the source.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StreamError::SourceUnavailable { .. } | StreamError::Connection(_)
        )
    }
}
