//! Relay error types
//!
//! One `thiserror` enum covers the whole relay: registry conditions,
//! reassembly protocol violations, and channel failures.

use thiserror::Error;

use crate::protocol::CorrelationId;

/// Errors raised by the relay.
#[derive(Debug, Error)]
pub enum RelayError {
    /// An exchange was registered twice under one id. Ids are 128-bit
    /// random values, so this indicates a programming error rather than a
    /// recoverable condition.
    #[error("correlation id already registered: {0}")]
    DuplicateId(CorrelationId),

    /// An inbound response carried an id with no in-flight exchange. The
    /// expected, non-fatal case for stray or duplicate messages: log and
    /// drop.
    #[error("no in-flight exchange for correlation id: {0}")]
    UnknownId(CorrelationId),

    /// A search site message arrived before its header. Fatal to the
    /// affected exchange only.
    #[error("search item arrived before its header for correlation id: {0}")]
    MissingHeader(CorrelationId),

    /// A non-site message arrived inside a paginated collection. Fatal to
    /// the affected exchange only; delivering a shortened result list
    /// would be worse than failing.
    #[error("unexpected response inside a paginated collection for correlation id: {0}")]
    UnexpectedResponse(CorrelationId),

    /// A response was pushed into a collector that had already delivered.
    /// Unreachable while ids are never reused, but reported rather than
    /// silently swallowed.
    #[error("exchange already complete for correlation id: {0}")]
    AlreadyComplete(CorrelationId),

    /// The channel to the host is gone.
    #[error("channel to host disconnected")]
    ChannelDisconnected,

    /// A request could not be handed to the run loop. The exchange that
    /// triggered it is abandoned; no other exchange is affected.
    #[error("failed to send request to host")]
    SendFailure,

    /// The exchange's registration was torn down before a response was
    /// delivered.
    #[error("exchange abandoned before a response was delivered")]
    Abandoned,

    /// An inbound frame exceeded the message size limit.
    #[error("inbound message of {0} bytes exceeds the frame limit")]
    OversizedMessage(usize),

    /// IO error on the channel.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame did not parse as a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for convenience.
pub type Result<T> = std::result::Result<T, RelayError>;
