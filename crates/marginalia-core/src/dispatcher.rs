//! Front-end Dispatcher
//!
//! Owns the host channel and the correlation registry. [`start`] spawns
//! the run loop; the returned [`RelayHandle`] is what UI surfaces use to
//! dispatch requests. Each dispatch stamps a fresh correlation id, parks a
//! collector in the registry, and queues the request for the loop; inbound
//! responses are routed back through the registry to their collector.
//!
//! All registry and collector mutation happens on the run loop or inside
//! short lock-held sections of `dispatch`, so exchanges interleave freely
//! without assuming anything about sibling ordering.

use std::fmt;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::collector::{PushOutcome, ResponseCollector};
use crate::error::{RelayError, Result};
use crate::events::RelayObserver;
use crate::protocol::{
    Action, CorrelationId, MessageVersion, Outcome, RemovePayload, Request, Response, SavePayload,
};
use crate::registry::ExchangeRegistry;
use crate::transport::{HostChannel, HostReader, HostWriter};

/// Outbound requests queued ahead of the channel writer.
const OUTBOUND_QUEUE_DEPTH: usize = 32;

/// Parsed inbound frames queued between the reader task and the run loop.
const INBOUND_QUEUE_DEPTH: usize = 32;

/// The eventual result of one dispatched exchange.
///
/// The continuation of the exchange, in future form: it resolves at most
/// once, with the fully reassembled logical response, and never with a
/// partial result. An exchange abandoned by a disconnect simply never
/// resolves while the relay handle is alive.
pub struct PendingResponse {
    correlation_id: CorrelationId,
    rx: oneshot::Receiver<Outcome>,
}

impl PendingResponse {
    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Wait for the logical response.
    ///
    /// [`RelayError::Abandoned`] means the exchange's registration was
    /// torn down without a delivery (protocol violation or relay
    /// teardown).
    pub async fn wait(self) -> Result<Outcome> {
        self.rx.await.map_err(|_| RelayError::Abandoned)
    }

    /// Poll for the logical response without blocking.
    pub fn try_outcome(&mut self) -> Result<Option<Outcome>> {
        match self.rx.try_recv() {
            Ok(outcome) => Ok(Some(outcome)),
            Err(oneshot::error::TryRecvError::Empty) => Ok(None),
            Err(oneshot::error::TryRecvError::Closed) => Err(RelayError::Abandoned),
        }
    }
}

impl fmt::Debug for PendingResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingResponse")
            .field("correlation_id", &self.correlation_id)
            .finish_non_exhaustive()
    }
}

/// Handle for dispatching requests to the host.
///
/// Cheap to clone; every UI surface gets one. Dropping all handles shuts
/// the run loop down once its queue drains.
#[derive(Clone)]
pub struct RelayHandle {
    registry: Arc<Mutex<ExchangeRegistry>>,
    outbound: mpsc::Sender<Request>,
}

impl RelayHandle {
    /// Dispatch one logical request.
    ///
    /// Generates a fresh correlation id, stamps it and the protocol
    /// version onto the request, registers a collector, and queues the
    /// send. Returns [`RelayError::SendFailure`] when the run loop is
    /// gone; the freshly registered exchange is left behind, never to
    /// complete.
    pub async fn dispatch(&self, action: Action) -> Result<PendingResponse> {
        let correlation_id = CorrelationId::fresh();
        let (tx, rx) = oneshot::channel();
        let collector = ResponseCollector::new(correlation_id.clone(), tx);
        self.registry
            .lock()
            .await
            .register(correlation_id.clone(), collector)?;

        let request = Request {
            version: MessageVersion::current(),
            action,
            correlation_id: correlation_id.clone(),
        };
        self.outbound
            .send(request)
            .await
            .map_err(|_| RelayError::SendFailure)?;

        Ok(PendingResponse { correlation_id, rx })
    }

    /// Bookmark-created side channel: synthesize a save request without a
    /// UI surface waiting on the result. The acknowledgement is awaited in
    /// a background task and logged.
    pub async fn bookmark_created(
        &self,
        url: String,
        title: String,
        inner_text: String,
    ) -> Result<()> {
        let pending = self
            .dispatch(Action::SaveRequest {
                payload: SavePayload {
                    url,
                    title,
                    inner_text,
                },
            })
            .await?;
        Self::log_side_channel("bookmark save", pending);
        Ok(())
    }

    /// Bookmark-removed side channel, mirroring [`Self::bookmark_created`].
    pub async fn bookmark_removed(&self, url: String) -> Result<()> {
        let pending = self
            .dispatch(Action::RemoveRequest {
                payload: RemovePayload { url },
            })
            .await?;
        Self::log_side_channel("bookmark removal", pending);
        Ok(())
    }

    fn log_side_channel(what: &'static str, pending: PendingResponse) {
        tokio::spawn(async move {
            let correlation_id = pending.correlation_id().clone();
            match pending.wait().await {
                Ok(_) => debug!(%correlation_id, "{what} acknowledged"),
                Err(e) => debug!(%correlation_id, %e, "{what} never resolved"),
            }
        });
    }

    /// Number of exchanges currently in flight.
    pub async fn in_flight(&self) -> usize {
        self.registry.lock().await.len()
    }
}

/// Start the relay over an established host channel.
///
/// Returns the dispatch handle and the run loop's join handle. The loop
/// exits when the host disconnects or every [`RelayHandle`] is dropped;
/// exchanges still registered at that point are abandoned, not failed.
pub fn start<R, W, O>(channel: HostChannel<R, W>, observer: O) -> (RelayHandle, JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
    O: RelayObserver + 'static,
{
    let registry = Arc::new(Mutex::new(ExchangeRegistry::new()));
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_DEPTH);
    let handle = RelayHandle {
        registry: Arc::clone(&registry),
        outbound: outbound_tx,
    };
    let (reader, writer) = channel.split();
    // Frame reads are not cancellation-safe, so they get their own task;
    // the run loop only ever selects over cancel-safe queue receives.
    tokio::spawn(read_frames(reader, inbound_tx));
    let join = tokio::spawn(run_loop(writer, outbound_rx, inbound_rx, registry, observer));
    (handle, join)
}

/// Drive the receive half of the channel, forwarding each parsed frame to
/// the run loop. Each `recv` runs to completion here, so a partially read
/// frame is never abandoned. Dropping the queue sender signals disconnect.
async fn read_frames<R>(mut reader: HostReader<R>, frames: mpsc::Sender<Result<Response>>)
where
    R: AsyncRead + Unpin,
{
    loop {
        match reader.recv().await {
            Ok(Some(response)) => {
                if frames.send(Ok(response)).await.is_err() {
                    break;
                }
            }
            // Orderly disconnect at a frame boundary.
            Ok(None) => break,
            Err(e @ RelayError::Serialization(_)) => {
                // The frame was consumed whole, so the stream is still
                // aligned; report the unparseable message and carry on.
                if frames.send(Err(e)).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                let _ = frames.send(Err(e)).await;
                break;
            }
        }
    }
    debug!("host reader finished");
}

/// The relay's delivery loop: multiplexes queued outbound requests and
/// inbound host frames over one channel.
async fn run_loop<W, O>(
    mut writer: HostWriter<W>,
    mut outbound: mpsc::Receiver<Request>,
    mut inbound: mpsc::Receiver<Result<Response>>,
    registry: Arc<Mutex<ExchangeRegistry>>,
    observer: O,
) where
    W: AsyncWrite + Unpin,
    O: RelayObserver,
{
    loop {
        tokio::select! {
            request = outbound.recv() => match request {
                Some(request) => {
                    observer.request_sent(&request).await;
                    if let Err(e) = writer.send(&request).await {
                        warn!(
                            correlation_id = %request.correlation_id,
                            %e,
                            "failed to send request, abandoning exchange"
                        );
                        observer.exchange_failed(&request.correlation_id, &e).await;
                    }
                }
                // Every handle is gone; nobody can dispatch.
                None => break,
            },
            frame = inbound.recv() => match frame {
                Some(Ok(response)) => {
                    route_response(&registry, &observer, response).await;
                }
                Some(Err(e @ RelayError::Serialization(_))) => {
                    warn!(%e, "dropping malformed frame from host");
                }
                Some(Err(e)) => {
                    warn!(%e, "host channel failed, treating as disconnect");
                    observer.host_disconnected().await;
                    break;
                }
                None => {
                    observer.host_disconnected().await;
                    break;
                }
            },
        }
    }
    debug!("relay run loop finished");
}

/// Look up the response's exchange and advance its collector.
async fn route_response<O: RelayObserver>(
    registry: &Arc<Mutex<ExchangeRegistry>>,
    observer: &O,
    response: Response,
) {
    if response.version != MessageVersion::current() {
        warn!(
            version = %response.version,
            correlation_id = %response.correlation_id,
            "response version differs from ours"
        );
    }
    observer.response_received(&response).await;

    let correlation_id = response.correlation_id.clone();
    let mut entries = registry.lock().await;
    let Some(collector) = entries.get_mut(&correlation_id) else {
        drop(entries);
        observer.stray_response(&correlation_id).await;
        return;
    };
    match collector.push(response) {
        Ok(PushOutcome::Pending) => {}
        Ok(PushOutcome::Collected) => {
            let _ = entries.take(&correlation_id);
            drop(entries);
            observer.result_delivered(&correlation_id).await;
        }
        Err(e) => {
            // Fatal to this exchange only; its collector (and the
            // continuation inside it) is dropped undelivered.
            let _ = entries.take(&correlation_id);
            drop(entries);
            observer.exchange_failed(&correlation_id, &e).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoopObserver;
    use crate::protocol::{
        ResponseAction, SearchHeaderPayload, SearchPayload, SitePayload,
    };
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

    /// Scripted stand-in for the host process on the far side of an
    /// in-memory duplex pipe.
    struct FakeHost {
        reader: ReadHalf<DuplexStream>,
        writer: WriteHalf<DuplexStream>,
    }

    impl FakeHost {
        async fn read_request(&mut self) -> Request {
            let mut length_bytes = [0u8; 4];
            self.reader.read_exact(&mut length_bytes).await.unwrap();
            let length = u32::from_ne_bytes(length_bytes) as usize;
            let mut frame = vec![0u8; length];
            self.reader.read_exact(&mut frame).await.unwrap();
            serde_json::from_slice(&frame).unwrap()
        }

        async fn write_response(&mut self, response: &Response) {
            let bytes = serde_json::to_vec(response).unwrap();
            let length = (bytes.len() as u32).to_ne_bytes();
            self.writer.write_all(&length).await.unwrap();
            self.writer.write_all(&bytes).await.unwrap();
        }
    }

    fn relay() -> (RelayHandle, JoinHandle<()>, FakeHost) {
        let (near, far) = tokio::io::duplex(64 * 1024);
        let (near_read, near_write) = tokio::io::split(near);
        let (far_read, far_write) = tokio::io::split(far);
        let channel = HostChannel::new(near_read, near_write);
        let (handle, join) = start(channel, NoopObserver);
        let host = FakeHost {
            reader: far_read,
            writer: far_write,
        };
        (handle, join, host)
    }

    fn save_ack(correlation_id: CorrelationId) -> Response {
        Response {
            version: MessageVersion::current(),
            action: ResponseAction::SaveResponse { payload: () },
            correlation_id,
        }
    }

    fn header(correlation_id: CorrelationId, page_length: u32) -> Response {
        Response {
            version: MessageVersion::current(),
            action: ResponseAction::SearchResponseHeader {
                payload: SearchHeaderPayload {
                    query: "foo".to_string(),
                    page_num: 0,
                    page_length,
                    has_more: false,
                },
            },
            correlation_id,
        }
    }

    fn site(correlation_id: CorrelationId, url: &str) -> Response {
        Response {
            version: MessageVersion::current(),
            action: ResponseAction::SearchResponseSite {
                payload: SitePayload {
                    url: url.to_string(),
                    title: url.to_string(),
                    snippet: "...".to_string(),
                },
            },
            correlation_id,
        }
    }

    fn save_action(url: &str) -> Action {
        Action::SaveRequest {
            payload: SavePayload {
                url: url.to_string(),
                title: url.to_string(),
                inner_text: String::new(),
            },
        }
    }

    fn search_action(query: &str, page_length: u32) -> Action {
        Action::SearchRequest {
            payload: SearchPayload {
                query: query.to_string(),
                page_num: 0,
                page_length,
            },
        }
    }

    #[tokio::test]
    async fn test_singleton_round_trip() {
        let (handle, _join, mut host) = relay();

        let pending = handle.dispatch(save_action("https://a")).await.unwrap();
        let request = host.read_request().await;
        assert_eq!(request.action.name(), "saveRequest");
        assert_eq!(&request.correlation_id, pending.correlation_id());
        assert_eq!(request.version, MessageVersion::current());

        host.write_response(&save_ack(request.correlation_id)).await;

        match pending.wait().await.unwrap() {
            Outcome::Singleton(response) => {
                assert_eq!(response.action.name(), "saveResponse");
            }
            Outcome::Search(_) => panic!("expected singleton outcome"),
        }
        assert_eq!(handle.in_flight().await, 0);
    }

    #[tokio::test]
    async fn test_paginated_round_trip() {
        let (handle, _join, mut host) = relay();

        let pending = handle.dispatch(search_action("foo", 2)).await.unwrap();
        let request = host.read_request().await;
        assert_eq!(request.action.name(), "searchRequest");

        let id = request.correlation_id;
        host.write_response(&header(id.clone(), 2)).await;
        host.write_response(&site(id.clone(), "https://a")).await;
        host.write_response(&site(id, "https://b")).await;

        match pending.wait().await.unwrap() {
            Outcome::Search(results) => {
                let urls: Vec<&str> = results.inner.iter().map(|s| s.url.as_str()).collect();
                assert_eq!(urls, vec!["https://a", "https://b"]);
            }
            Outcome::Singleton(_) => panic!("expected search outcome"),
        }
        assert_eq!(handle.in_flight().await, 0);
    }

    #[tokio::test]
    async fn test_under_delivery_never_resolves() {
        let (handle, join, mut host) = relay();

        let mut pending = handle.dispatch(search_action("foo", 3)).await.unwrap();
        let request = host.read_request().await;
        let id = request.correlation_id;

        host.write_response(&header(id.clone(), 3)).await;
        host.write_response(&site(id.clone(), "https://a")).await;
        host.write_response(&site(id, "https://b")).await;

        // Host dies two items in.
        drop(host);
        join.await.unwrap();

        // The exchange is abandoned, not failed: the leaked registry entry
        // keeps the continuation alive, so the caller just keeps waiting.
        assert!(pending.try_outcome().unwrap().is_none());
        assert_eq!(handle.in_flight().await, 1);
    }

    #[tokio::test]
    async fn test_stray_response_is_dropped() {
        let (handle, _join, mut host) = relay();

        host.write_response(&save_ack(CorrelationId::fresh())).await;

        // An unrelated exchange still completes normally afterwards.
        let pending = handle.dispatch(save_action("https://a")).await.unwrap();
        let request = host.read_request().await;
        host.write_response(&save_ack(request.correlation_id)).await;
        assert!(matches!(
            pending.wait().await.unwrap(),
            Outcome::Singleton(_)
        ));
    }

    #[tokio::test]
    async fn test_protocol_violation_is_isolated() {
        let (handle, _join, mut host) = relay();

        let violated = handle.dispatch(search_action("foo", 1)).await.unwrap();
        let healthy = handle.dispatch(save_action("https://b")).await.unwrap();

        let first = host.read_request().await;
        let second = host.read_request().await;
        assert_eq!(first.action.name(), "searchRequest");
        assert_eq!(second.action.name(), "saveRequest");

        // Item before header: fatal to the first exchange only.
        host.write_response(&site(first.correlation_id, "https://x"))
            .await;
        host.write_response(&save_ack(second.correlation_id)).await;

        assert!(matches!(
            healthy.wait().await.unwrap(),
            Outcome::Singleton(_)
        ));
        assert!(matches!(
            violated.wait().await.unwrap_err(),
            RelayError::Abandoned
        ));
        assert_eq!(handle.in_flight().await, 0);
    }

    #[tokio::test]
    async fn test_dispatch_after_shutdown_is_send_failure() {
        let (handle, join, host) = relay();

        drop(host);
        join.await.unwrap();

        let err = handle.dispatch(save_action("https://a")).await.unwrap_err();
        assert!(matches!(err, RelayError::SendFailure));
    }

    #[tokio::test]
    async fn test_concurrent_exchanges_interleave() {
        let (handle, _join, mut host) = relay();

        let search = handle.dispatch(search_action("foo", 2)).await.unwrap();
        let save = handle.dispatch(save_action("https://s")).await.unwrap();

        let first = host.read_request().await;
        let second = host.read_request().await;
        let search_id = first.correlation_id;
        let save_id = second.correlation_id;

        // Interleave the save ack between the search header and its items.
        host.write_response(&header(search_id.clone(), 2)).await;
        host.write_response(&save_ack(save_id)).await;
        host.write_response(&site(search_id.clone(), "https://a"))
            .await;
        host.write_response(&site(search_id, "https://b")).await;

        assert!(matches!(save.wait().await.unwrap(), Outcome::Singleton(_)));
        match search.wait().await.unwrap() {
            Outcome::Search(results) => assert_eq!(results.inner.len(), 2),
            Outcome::Singleton(_) => panic!("expected search outcome"),
        }
    }

    #[tokio::test]
    async fn test_bookmark_side_channel_uses_dispatch_path() {
        let (handle, _join, mut host) = relay();

        handle
            .bookmark_created(
                "https://a".to_string(),
                "A".to_string(),
                "text".to_string(),
            )
            .await
            .unwrap();
        let request = host.read_request().await;
        assert_eq!(request.action.name(), "saveRequest");
        assert_eq!(request.version, MessageVersion::current());
        host.write_response(&save_ack(request.correlation_id)).await;

        handle.bookmark_removed("https://a".to_string()).await.unwrap();
        let request = host.read_request().await;
        assert_eq!(request.action.name(), "removeRequest");
    }

    #[tokio::test]
    async fn test_partial_frame_survives_concurrent_dispatch() {
        let (handle, _join, mut host) = relay();

        let first = handle.dispatch(save_action("https://a")).await.unwrap();
        let first_request = host.read_request().await;

        // Write only half of the first ack's length prefix, then stall so
        // the relay is mid-frame when more dispatch traffic arrives.
        let ack = save_ack(first_request.correlation_id);
        let bytes = serde_json::to_vec(&ack).unwrap();
        let length = (bytes.len() as u32).to_ne_bytes();
        host.writer.write_all(&length[..2]).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let second = handle.dispatch(save_action("https://b")).await.unwrap();
        let second_request = host.read_request().await;

        // Complete the stalled frame, then ack the second exchange.
        host.writer.write_all(&length[2..]).await.unwrap();
        host.writer.write_all(&bytes).await.unwrap();
        host.write_response(&save_ack(second_request.correlation_id))
            .await;

        assert!(matches!(first.wait().await.unwrap(), Outcome::Singleton(_)));
        assert!(matches!(
            second.wait().await.unwrap(),
            Outcome::Singleton(_)
        ));
        assert_eq!(handle.in_flight().await, 0);
    }

    #[tokio::test]
    async fn test_pending_response_debug_names_exchange() {
        let (handle, _join, _host) = relay();

        let pending = handle.dispatch(save_action("https://a")).await.unwrap();
        let rendered = format!("{pending:?}");
        assert!(rendered.contains("PendingResponse"));
        assert!(rendered.contains(pending.correlation_id().as_str()));
    }

    #[tokio::test]
    async fn test_malformed_frame_does_not_kill_relay() {
        let (handle, _join, mut host) = relay();

        host.writer
            .write_all(&8u32.to_ne_bytes())
            .await
            .unwrap();
        host.writer.write_all(b"not json").await.unwrap();

        let pending = handle.dispatch(save_action("https://a")).await.unwrap();
        let request = host.read_request().await;
        host.write_response(&save_ack(request.correlation_id)).await;
        assert!(matches!(
            pending.wait().await.unwrap(),
            Outcome::Singleton(_)
        ));
    }
}
