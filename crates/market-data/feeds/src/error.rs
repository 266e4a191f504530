//! Feed errors

use thiserror::Error;

/// Errors raised by feed transports and parsers
#[derive(Debug, Error)]
pub enum FeedError {
    /// Upstream could not be reached or rejected the handshake
    #[error("connection failed: {0}")]
    Connect(String),

    /// The socket closed or failed while sending
    #[error("send failed: {0}")]
    Send(String),

    /// The socket failed while receiving
    #[error("receive failed: {0}")]
    Receive(String),

    /// Bad ticker endpoint
    #[error("invalid ticker url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Outbound control message could not be encoded
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    /// Instrument master could not be read
    #[error("instrument master: {0}")]
    InstrumentMaster(#[from] csv::Error),
}

/// Result alias for feed operations
pub type FeedResult<T> = Result<T, FeedError>;
