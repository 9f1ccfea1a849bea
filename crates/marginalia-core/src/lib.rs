//! Marginalia Core Library
//!
//! The relay layer between a save-and-search browser extension's UI
//! surfaces and its native messaging host. An unbounded number of
//! concurrent logical request/response exchanges are multiplexed over one
//! duplex channel to the host; responses carry the correlation id of the
//! request that caused them, and paginated results arrive as a header
//! followed by item messages that are reassembled before delivery.
//!
//! # Modules
//!
//! - [`protocol`] - message envelopes, correlation ids, response kinds
//! - [`transport`] - length-prefixed JSON framing over the host channel
//! - [`registry`] - correlation id to in-flight exchange lookup
//! - [`collector`] - per-exchange reassembly state machine
//! - [`dispatcher`] - request dispatch and the relay run loop
//! - [`events`] - observer trait for relay traffic
//! - [`error`] - error types

pub mod collector;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod protocol;
pub mod registry;
pub mod transport;

// Re-export commonly used types
pub use collector::{CollectorState, PushOutcome, Responder, ResponseCollector};
pub use dispatcher::{start, PendingResponse, RelayHandle};
pub use error::{RelayError, Result};
pub use events::{NoopObserver, RelayObserver, TracingObserver};
pub use protocol::{
    Action, CorrelationId, MessageVersion, Outcome, RemovePayload, Request, Response,
    ResponseAction, ResponseKind, SavePayload, SearchHeaderPayload, SearchPayload, SearchResults,
    SitePayload,
};
pub use registry::ExchangeRegistry;
pub use transport::{HostChannel, MAX_MESSAGE_LEN};
