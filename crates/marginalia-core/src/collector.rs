//! Response Collector
//!
//! Per-exchange reassembly state machine. Physical response messages are
//! accumulated until the logical response is complete, at which point the
//! result is delivered through the exchange's responder exactly once.
//!
//! The first response received fixes the completion policy: a singleton
//! kind completes the exchange immediately, a search header opens a
//! paginated collection that completes after `pageLength` site messages,
//! and a site message with no preceding header is a protocol violation.

use std::fmt;

use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{RelayError, Result};
use crate::protocol::{
    CorrelationId, Outcome, Response, ResponseAction, ResponseKind, SearchResults,
};

/// Delivery end of one exchange's continuation.
///
/// Sending consumes the handle, so at-most-once delivery holds by
/// construction.
pub type Responder = oneshot::Sender<Outcome>;

/// Lifecycle of a collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    /// No responses received yet.
    Empty,
    /// At least one response buffered, completion condition not yet met.
    Collecting,
    /// Result delivered; the collector is spent.
    Complete,
}

/// What a push accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// More responses are needed; keep the exchange registered.
    Pending,
    /// The logical response was delivered; retire the exchange.
    Collected,
}

/// Reassembly state for one exchange.
pub struct ResponseCollector {
    correlation_id: CorrelationId,
    state: CollectorState,
    responses: Vec<Response>,
    responder: Option<Responder>,
}

impl ResponseCollector {
    /// Create a collector bound to the exchange's responder.
    pub fn new(correlation_id: CorrelationId, responder: Responder) -> Self {
        ResponseCollector {
            correlation_id,
            state: CollectorState::Empty,
            responses: Vec::new(),
            responder: Some(responder),
        }
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn state(&self) -> CollectorState {
        self.state
    }

    /// Accumulate one physical response and deliver the logical result if
    /// it is now complete.
    ///
    /// Returns [`PushOutcome::Collected`] once the result has been handed
    /// to the responder; the caller must retire the exchange at that point.
    /// A site message arriving first is [`RelayError::MissingHeader`],
    /// fatal to this exchange only.
    pub fn push(&mut self, response: Response) -> Result<PushOutcome> {
        if self.state == CollectorState::Complete {
            return Err(RelayError::AlreadyComplete(self.correlation_id.clone()));
        }
        if let Some(head) = self.responses.first() {
            // Once a header opens a collection, only site messages belong
            // to this exchange.
            if matches!(head.kind(), ResponseKind::PaginatedHeader { .. })
                && response.kind() != ResponseKind::PaginatedItem
            {
                return Err(RelayError::UnexpectedResponse(self.correlation_id.clone()));
            }
        }
        debug!(
            correlation_id = %self.correlation_id,
            action = response.action.name(),
            "buffered response"
        );
        self.responses.push(response);
        self.state = CollectorState::Collecting;
        self.collect()
    }

    /// Check the completion condition against the buffered sequence.
    fn collect(&mut self) -> Result<PushOutcome> {
        // push() guarantees the buffer is non-empty here.
        let head_kind = match self.responses.first() {
            Some(head) => head.kind(),
            None => return Ok(PushOutcome::Pending),
        };
        match head_kind {
            ResponseKind::Singleton => {
                let response = self.responses.remove(0);
                self.deliver(Outcome::Singleton(response));
                Ok(PushOutcome::Collected)
            }
            ResponseKind::PaginatedHeader { expected } => {
                if self.responses.len() != expected + 1 {
                    return Ok(PushOutcome::Pending);
                }
                let inner = self
                    .responses
                    .drain(..)
                    .skip(1)
                    .filter_map(|response| match response.action {
                        ResponseAction::SearchResponseSite { payload } => Some(payload),
                        // push() rejects anything else after a header.
                        _ => None,
                    })
                    .collect();
                self.deliver(Outcome::Search(SearchResults { inner }));
                Ok(PushOutcome::Collected)
            }
            ResponseKind::PaginatedItem => {
                Err(RelayError::MissingHeader(self.correlation_id.clone()))
            }
        }
    }

    fn deliver(&mut self, outcome: Outcome) {
        self.state = CollectorState::Complete;
        if let Some(responder) = self.responder.take() {
            if responder.send(outcome).is_err() {
                debug!(
                    correlation_id = %self.correlation_id,
                    "caller went away before delivery"
                );
            }
        }
    }
}

impl fmt::Debug for ResponseCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseCollector")
            .field("correlation_id", &self.correlation_id)
            .field("state", &self.state)
            .field("buffered", &self.responses.len())
            .finish_non_exhaustive()
    }
}
