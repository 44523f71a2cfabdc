//! Request/response correlation and event dispatch
//!
//! Pending requests live in a concurrent map keyed by id. Whoever removes
//! the entry first owns the completion: the inbound pipeline when a
//! response arrives, the requester when its deadline fires. A late
//! duplicate response finds no entry and is dropped.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Duration, Instant};
use tracing::{debug, trace, warn};

use crate::errors::RequestError;
use crate::protocol::chunking::{classify_inbound, InboundFrame, Reassembler};
use crate::protocol::envelope::{Command, Envelope, MessageType};
use crate::session::{ConnectionManager, SessionEvent};

pub struct ProtocolHandler {
    connection: Arc<ConnectionManager>,
    next_id: AtomicU32,
    pending: DashMap<u32, oneshot::Sender<Envelope>>,
    reassembler: Mutex<Reassembler>,
    events: broadcast::Sender<Envelope>,
    request_timeout: Duration,
    inbound_task: OnceLock<JoinHandle<()>>,
}

impl ProtocolHandler {
    /// Attach to a connection manager and start consuming its messages
    pub fn new(connection: Arc<ConnectionManager>) -> Arc<Self> {
        let request_timeout = connection.config().request_timeout;
        let (events, _) = broadcast::channel(connection.config().event_channel_capacity.max(1));
        let session_events = connection.subscribe();

        let handler = Arc::new(Self {
            connection,
            next_id: AtomicU32::new(1),
            pending: DashMap::new(),
            reassembler: Mutex::new(Reassembler::new()),
            events,
            request_timeout,
            inbound_task: OnceLock::new(),
        });

        // The loop upgrades its Weak per event, so the Arc must exist first
        let task = tokio::spawn(inbound_loop(Arc::downgrade(&handler), session_events));
        let _ = handler.inbound_task.set(task);
        handler
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub async fn device_name(&self) -> Option<String> {
        self.connection.device_name().await
    }

    /// Receive every inbound event envelope
    pub fn subscribe_events(&self) -> broadcast::Receiver<Envelope> {
        self.events.subscribe()
    }

    /// Number of requests awaiting a response
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    // ------------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------------

    /// Send `command` with an optional payload and await the response
    pub async fn send_request(
        &self,
        command: Command,
        payload: Option<Value>,
    ) -> Result<Envelope, RequestError> {
        let mut request = Envelope::request(command);
        request.payload = payload;
        self.request(request).await
    }

    /// Assign a fresh id to `request`, send it and await the response
    pub async fn request(&self, mut request: Envelope) -> Result<Envelope, RequestError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        request.id = id;
        request.message_type = MessageType::Request;

        let json = request
            .to_json()
            .map_err(|e| RequestError::Serialization(e.to_string()))?;

        let (slot, mut response) = oneshot::channel();
        self.pending.insert(id, slot);
        let _slot_guard = PendingSlot {
            pending: &self.pending,
            id,
        };

        let deadline = Instant::now() + self.request_timeout;
        debug!(
            "Request {} ({}) sent",
            id,
            request.command.as_ref().map(Command::as_str).unwrap_or("?")
        );

        if let Err(err) = self.connection.send(json.as_bytes()).await {
            debug!("Request {} failed to send: {}", id, err);
            return Err(err.into());
        }

        match timeout_at(deadline, &mut response).await {
            Ok(Ok(envelope)) => Ok(envelope),
            Ok(Err(_)) => Err(RequestError::Abandoned { id }),
            Err(_) => {
                if self.pending.remove(&id).is_some() {
                    warn!("Request {} timed out", id);
                    return Err(RequestError::Timeout {
                        id,
                        timeout_ms: self.request_timeout.as_millis() as u64,
                    });
                }
                // The response claimed the entry at the deadline
                response.await.map_err(|_| RequestError::Abandoned { id })
            }
        }
    }

    // ------------------------------------------------------------------------
    // Inbound Pipeline
    // ------------------------------------------------------------------------

    /// Process one raw inbound message. Malformed input is dropped.
    pub async fn handle_inbound(&self, text: &str) {
        let message = match classify_inbound(text) {
            Ok(InboundFrame::Message(message)) => message,
            Ok(InboundFrame::Chunk(frame)) => {
                let (index, total) = (frame.index, frame.total);
                match self.reassembler.lock().await.accept(frame) {
                    Ok(Some(message)) => {
                        debug!("Reassembled {} chunks ({} bytes)", total, message.len());
                        message
                    }
                    Ok(None) => {
                        trace!("Buffered chunk {}/{}", index + 1, total);
                        return;
                    }
                    Err(err) => {
                        debug!("Dropping chunk {}/{}: {}", index + 1, total, err);
                        return;
                    }
                }
            }
            Err(err) => {
                debug!("Dropping frame: {}", err);
                return;
            }
        };

        let envelope = match Envelope::from_json(&message) {
            Ok(envelope) => envelope,
            Err(err) => {
                debug!("Dropping message: {}", err);
                return;
            }
        };

        match envelope.message_type {
            MessageType::Response => self.complete(envelope),
            MessageType::Event => {
                debug!(
                    "Event {}",
                    envelope.event.as_ref().map(|e| e.as_str()).unwrap_or("?")
                );
                let _ = self.events.send(envelope);
            }
            MessageType::Request => debug!("Ignoring request {} from device", envelope.id),
        }
    }

    fn complete(&self, response: Envelope) {
        let id = response.id;
        match self.pending.remove(&id) {
            Some((_, slot)) => {
                if slot.send(response).is_err() {
                    debug!("Requester for {} went away", id);
                }
            }
            None => debug!("Dropping response for unknown request {}", id),
        }
    }

    async fn reset_reassembly(&self) {
        let mut reassembler = self.reassembler.lock().await;
        if let Some((received, total)) = reassembler.progress() {
            debug!("Discarding partial message ({}/{} chunks)", received, total);
        }
        reassembler.reset();
    }
}

/// Clears a pending entry when its requester goes away, including when the
/// request future is dropped before completing
struct PendingSlot<'a> {
    pending: &'a DashMap<u32, oneshot::Sender<Envelope>>,
    id: u32,
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        if self.pending.remove(&self.id).is_some() {
            debug!("Request {} abandoned before completion", self.id);
        }
    }
}

impl Drop for ProtocolHandler {
    fn drop(&mut self) {
        if let Some(task) = self.inbound_task.get() {
            task.abort();
        }
    }
}

async fn inbound_loop(
    handler: Weak<ProtocolHandler>,
    mut session_events: broadcast::Receiver<SessionEvent>,
) {
    loop {
        let event = match session_events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!("Inbound pipeline lagged, {} messages lost", skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let Some(strong) = handler.upgrade() else {
            break;
        };
        match event {
            SessionEvent::MessageReceived(text) => strong.handle_inbound(&text).await,
            // Chunks from a dead link never complete
            SessionEvent::Disconnected => strong.reset_reassembly().await,
            SessionEvent::Connected { .. } => {}
        }
    }
}
