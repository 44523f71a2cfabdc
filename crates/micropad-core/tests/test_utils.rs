//! Test utilities for the Micropad session layer
//!
//! [`MockTransport`] plays the device: it follows a script of connect
//! behaviours, records every write, answers requests through a responder
//! closure and can inject raw notifications or drop the link.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use micropad_core::protocol::chunking::{
    classify_inbound, split_into_frames, InboundFrame, Reassembler, DEFAULT_CHUNK_PAYLOAD_BUDGET,
    TRANSPORT_WRITE_LIMIT,
};
use micropad_core::{
    ConnectionManager, DeviceSession, DeviceTransport, Envelope, PairingOutcome, ProtocolHandler,
    SessionConfig, SessionSignal, TransportError,
};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;

pub const DEVICE_ID: &str = "AA:BB:CC:DD:EE:FF";
pub const DEVICE_NAME: &str = "Micropad";

// ----------------------------------------------------------------------------
// Connect Script
// ----------------------------------------------------------------------------

/// How the next `open_session` and the session it returns behave
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectBehavior {
    Succeed,
    Unreachable,
    RejectPairing,
    MissingService,
    /// `open_session` never completes
    Hang,
}

type Responder = Arc<dyn Fn(&Envelope) -> Option<Value> + Send + Sync>;

#[derive(Default)]
struct MockState {
    script: Mutex<VecDeque<ConnectBehavior>>,
    open_times: Mutex<Vec<Instant>>,
    written: Mutex<Vec<Vec<u8>>>,
    received_requests: Mutex<Vec<Envelope>>,
    sink: Mutex<Option<mpsc::UnboundedSender<SessionSignal>>>,
    responder: Mutex<Option<Responder>>,
    device_reassembler: Mutex<Reassembler>,
    paired: AtomicBool,
    closes: AtomicUsize,
    writes_allowed: Mutex<Option<usize>>,
}

// ----------------------------------------------------------------------------
// Mock Transport
// ----------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue behaviours for upcoming connect attempts; unscripted attempts succeed
    pub fn script(&self, behaviors: impl IntoIterator<Item = ConnectBehavior>) {
        self.state.script.lock().unwrap().extend(behaviors);
    }

    /// Answer every request with the payload returned by `responder`
    pub fn respond_with<F>(&self, responder: F)
    where
        F: Fn(&Envelope) -> Option<Value> + Send + Sync + 'static,
    {
        *self.state.responder.lock().unwrap() = Some(Arc::new(responder));
    }

    /// Let `count` more writes succeed, then fail every write
    pub fn fail_writes_after(&self, count: usize) {
        *self.state.writes_allowed.lock().unwrap() = Some(count);
    }

    pub fn set_paired(&self, paired: bool) {
        self.state.paired.store(paired, Ordering::SeqCst);
    }

    pub fn is_paired(&self) -> bool {
        self.state.paired.load(Ordering::SeqCst)
    }

    /// Deliver raw text as if notified by the device
    pub fn inject(&self, text: &str) {
        self.signal(SessionSignal::Data(text.as_bytes().to_vec()));
    }

    /// Simulate the link dropping
    pub fn drop_link(&self) {
        self.signal(SessionSignal::Disconnected);
    }

    pub fn open_count(&self) -> usize {
        self.state.open_times.lock().unwrap().len()
    }

    pub fn open_times(&self) -> Vec<Instant> {
        self.state.open_times.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    /// Every successful write, as text
    pub fn written(&self) -> Vec<String> {
        self.state
            .written
            .lock()
            .unwrap()
            .iter()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .collect()
    }

    /// Requests the device reassembled and parsed
    pub fn requests(&self) -> Vec<Envelope> {
        self.state.received_requests.lock().unwrap().clone()
    }

    fn signal(&self, signal: SessionSignal) {
        if let Some(sink) = self.state.sink.lock().unwrap().as_ref() {
            let _ = sink.send(signal);
        }
    }
}

#[async_trait]
impl DeviceTransport for MockTransport {
    async fn open_session(&self, _device_id: &str) -> Result<Box<dyn DeviceSession>, TransportError> {
        self.state.open_times.lock().unwrap().push(Instant::now());
        let behavior = self
            .state
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ConnectBehavior::Succeed);

        match behavior {
            ConnectBehavior::Unreachable => {
                Err(TransportError::unreachable(DEVICE_ID, "out of range"))
            }
            ConnectBehavior::Hang => std::future::pending().await,
            _ => Ok(Box::new(MockSession {
                state: self.state.clone(),
                behavior,
            })),
        }
    }
}

// ----------------------------------------------------------------------------
// Mock Session
// ----------------------------------------------------------------------------

struct MockSession {
    state: Arc<MockState>,
    behavior: ConnectBehavior,
}

impl MockSession {
    fn answer(&self, request: &Envelope) {
        self.state
            .received_requests
            .lock()
            .unwrap()
            .push(request.clone());

        let responder = self.state.responder.lock().unwrap().clone();
        let Some(payload) = responder.and_then(|respond| respond(request)) else {
            return;
        };

        let text = Envelope::response(request.id, payload).to_json().unwrap();
        let sink = self.state.sink.lock().unwrap().clone();
        let Some(sink) = sink else {
            return;
        };

        if text.len() <= TRANSPORT_WRITE_LIMIT {
            let _ = sink.send(SessionSignal::Data(text.into_bytes()));
        } else {
            for frame in split_into_frames(text.as_bytes(), DEFAULT_CHUNK_PAYLOAD_BUDGET).unwrap() {
                let _ = sink.send(SessionSignal::Data(frame.into_bytes()));
            }
        }
    }
}

#[async_trait]
impl DeviceSession for MockSession {
    fn device_name(&self) -> Option<String> {
        Some(DEVICE_NAME.to_string())
    }

    async fn is_paired(&self) -> Result<bool, TransportError> {
        Ok(self.state.paired.load(Ordering::SeqCst))
    }

    async fn pair(&self) -> Result<PairingOutcome, TransportError> {
        if self.behavior == ConnectBehavior::RejectPairing {
            return Err(TransportError::pairing_rejected("AuthenticationRejected"));
        }
        self.state.paired.store(true, Ordering::SeqCst);
        Ok(PairingOutcome::Paired)
    }

    async fn resolve_channels(&self) -> Result<(), TransportError> {
        if self.behavior == ConnectBehavior::MissingService {
            return Err(TransportError::ServiceMissing {
                service: "config".into(),
            });
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        sink: mpsc::UnboundedSender<SessionSignal>,
    ) -> Result<(), TransportError> {
        *self.state.sink.lock().unwrap() = Some(sink);
        Ok(())
    }

    async fn write(&self, data: &[u8]) -> Result<(), TransportError> {
        {
            let mut allowed = self.state.writes_allowed.lock().unwrap();
            if let Some(remaining) = allowed.as_mut() {
                if *remaining == 0 {
                    return Err(TransportError::WriteFailed("GATT write rejected".into()));
                }
                *remaining -= 1;
            }
        }
        self.state.written.lock().unwrap().push(data.to_vec());

        let text = String::from_utf8_lossy(data).into_owned();
        let message = match classify_inbound(&text) {
            Ok(InboundFrame::Message(message)) => Some(message),
            Ok(InboundFrame::Chunk(frame)) => self
                .state
                .device_reassembler
                .lock()
                .unwrap()
                .accept(frame)
                .unwrap(),
            Err(_) => None,
        };

        if let Some(request) = message.and_then(|m| Envelope::from_json(&m).ok()) {
            self.answer(&request);
        }
        Ok(())
    }

    async fn close(&self) {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        self.state.sink.lock().unwrap().take();
    }
}

// ----------------------------------------------------------------------------
// Setup Helpers
// ----------------------------------------------------------------------------

/// Default configuration without the pairing settle delay
pub fn test_config() -> SessionConfig {
    SessionConfig::default().with_settle_delay(Duration::ZERO)
}

pub fn manager(transport: &MockTransport, config: SessionConfig) -> Arc<ConnectionManager> {
    ConnectionManager::new(Arc::new(transport.clone()), config)
}

/// Connected manager and handler over a fresh mock device
pub async fn connected(config: SessionConfig) -> (MockTransport, Arc<ProtocolHandler>) {
    let transport = MockTransport::new();
    let handler = ProtocolHandler::new(manager(&transport, config));
    handler.connection().connect(DEVICE_ID).await.unwrap();
    (transport, handler)
}

/// Let spawned tasks drain their queues
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}
