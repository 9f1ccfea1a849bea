//! Relay Observer
//!
//! Observation hooks for relay traffic, decoupled from any particular
//! frontend. The CLI prints events, tests record them, and embedders can
//! forward them wherever they like.

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::error::RelayError;
use crate::protocol::{CorrelationId, Request, Response};

/// Observer for relay traffic and failures.
///
/// Invoked from the relay's run loop; implementations should be cheap or
/// hand off to their own tasks.
#[async_trait]
pub trait RelayObserver: Send + Sync {
    /// A request was written to the host.
    async fn request_sent(&self, request: &Request);

    /// A physical response arrived from the host.
    async fn response_received(&self, response: &Response);

    /// An exchange completed and its result was delivered.
    async fn result_delivered(&self, correlation_id: &CorrelationId);

    /// A response arrived for an id with no in-flight exchange.
    async fn stray_response(&self, correlation_id: &CorrelationId);

    /// An exchange failed and was abandoned.
    async fn exchange_failed(&self, correlation_id: &CorrelationId, error: &RelayError);

    /// The host closed the channel.
    async fn host_disconnected(&self);
}

/// No-op observer for tests and embedders that only want results.
#[derive(Debug, Default, Clone)]
pub struct NoopObserver;

#[async_trait]
impl RelayObserver for NoopObserver {
    async fn request_sent(&self, _request: &Request) {}

    async fn response_received(&self, _response: &Response) {}

    async fn result_delivered(&self, _correlation_id: &CorrelationId) {}

    async fn stray_response(&self, _correlation_id: &CorrelationId) {}

    async fn exchange_failed(&self, _correlation_id: &CorrelationId, _error: &RelayError) {}

    async fn host_disconnected(&self) {}
}

/// Observer that reports through the `tracing` macros.
#[derive(Debug, Default, Clone)]
pub struct TracingObserver;

#[async_trait]
impl RelayObserver for TracingObserver {
    async fn request_sent(&self, request: &Request) {
        debug!(
            correlation_id = %request.correlation_id,
            action = request.action.name(),
            "request sent to host"
        );
    }

    async fn response_received(&self, response: &Response) {
        debug!(
            correlation_id = %response.correlation_id,
            action = response.action.name(),
            "response received from host"
        );
    }

    async fn result_delivered(&self, correlation_id: &CorrelationId) {
        debug!(%correlation_id, "result delivered");
    }

    async fn stray_response(&self, correlation_id: &CorrelationId) {
        warn!(%correlation_id, "dropping response with no in-flight exchange");
    }

    async fn exchange_failed(&self, correlation_id: &CorrelationId, error: &RelayError) {
        error!(%correlation_id, %error, "exchange abandoned");
    }

    async fn host_disconnected(&self) {
        warn!("host closed the channel");
    }
}
