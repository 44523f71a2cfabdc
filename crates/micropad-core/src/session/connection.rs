//! Connection manager owning the single device session
//!
//! Every `connect` and `disconnect` advances an epoch published on a
//! `watch` channel. Connect attempts and the reconnect loop race their
//! awaits against a change of that epoch, so a newer call cancels older
//! work promptly, including a backoff sleep in progress. A completed
//! attempt only installs its session if its epoch is still current when it
//! takes the state lock.

use std::future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::{broadcast, mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::errors::{ConnectError, SendError, TransportError};
use crate::protocol::chunking::{needs_chunking, split_into_frames};
use crate::session::state::{Backoff, ConnectionState, ReconnectStatus};
use crate::transport::{DeviceSession, DeviceTransport, PairingOutcome, SessionSignal};

// ----------------------------------------------------------------------------
// Session Events
// ----------------------------------------------------------------------------

/// Events published by the connection manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected { device_name: Option<String> },
    Disconnected,
    /// Raw inbound text, before chunk reassembly
    MessageReceived(String),
}

// ----------------------------------------------------------------------------
// Internal State
// ----------------------------------------------------------------------------

/// The installed session and the task pumping its signals
struct ActiveLink {
    session: Arc<dyn DeviceSession>,
    seq: u64,
    pump: JoinHandle<()>,
}

struct Inner {
    device_id: Option<String>,
    device_name: Option<String>,
    link: Option<ActiveLink>,
    backoff: Backoff,
    next_seq: u64,
}

// ----------------------------------------------------------------------------
// Connection Manager
// ----------------------------------------------------------------------------

pub struct ConnectionManager {
    transport: Arc<dyn DeviceTransport>,
    config: SessionConfig,
    inner: RwLock<Inner>,
    state: watch::Sender<ConnectionState>,
    epoch: watch::Sender<u64>,
    events: broadcast::Sender<SessionEvent>,
    auto_reconnect: AtomicBool,
    /// Keeps the chunks of one message contiguous on the wire
    write_lock: Mutex<()>,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn DeviceTransport>, config: SessionConfig) -> Arc<Self> {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (epoch, _) = watch::channel(0);
        let (events, _) = broadcast::channel(config.event_channel_capacity.max(1));

        Arc::new(Self {
            transport,
            inner: RwLock::new(Inner {
                device_id: None,
                device_name: None,
                link: None,
                backoff: Backoff::new(config.initial_backoff, config.max_backoff),
                next_seq: 0,
            }),
            state,
            epoch,
            events,
            auto_reconnect: AtomicBool::new(config.auto_reconnect),
            write_lock: Mutex::new(()),
            config,
        })
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Watch state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Receive `Connected`, `Disconnected` and `MessageReceived` events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Name reported by the current session
    pub async fn device_name(&self) -> Option<String> {
        self.inner.read().await.device_name.clone()
    }

    /// Last device id passed to `connect`
    pub async fn device_id(&self) -> Option<String> {
        self.inner.read().await.device_id.clone()
    }

    pub fn auto_reconnect(&self) -> bool {
        self.auto_reconnect.load(Ordering::SeqCst)
    }

    /// Takes effect at the next link loss or the next retry of a running loop
    pub fn set_auto_reconnect(&self, enabled: bool) {
        self.auto_reconnect.store(enabled, Ordering::SeqCst);
        debug!("Auto-reconnect {}", if enabled { "enabled" } else { "disabled" });
    }

    pub async fn reconnect_status(&self) -> ReconnectStatus {
        self.inner.read().await.backoff.status()
    }

    // ------------------------------------------------------------------------
    // Connect / Disconnect
    // ------------------------------------------------------------------------

    /// Connect to `device_id`, superseding any attempt or reconnect loop
    /// still in flight
    pub async fn connect(self: &Arc<Self>, device_id: &str) -> Result<(), ConnectError> {
        let (epoch, previous) = {
            let mut inner = self.inner.write().await;
            let epoch = self.bump_epoch();
            inner.device_id = Some(device_id.to_string());
            let previous = inner.link.take();
            if previous.is_some() {
                self.emit(SessionEvent::Disconnected);
            }
            self.set_state(ConnectionState::Connecting);
            (epoch, previous)
        };

        if let Some(link) = previous {
            self.release(link).await;
        }

        info!("Connecting to {}", device_id);
        match self.attempt(epoch, device_id).await {
            Ok(()) => Ok(()),
            Err(ConnectError::Cancelled) => {
                debug!("Connect to {} superseded", device_id);
                Err(ConnectError::Cancelled)
            }
            Err(err) => {
                warn!("Connect to {} failed ({:?}): {}", device_id, err.class(), err);
                let _inner = self.inner.write().await;
                if self.current_epoch() == epoch {
                    self.set_state(ConnectionState::Disconnected);
                }
                Err(err)
            }
        }
    }

    /// Tear down the session and cancel any reconnect. Idempotent.
    pub async fn disconnect(&self) {
        let link = {
            let mut inner = self.inner.write().await;
            self.bump_epoch();
            inner.backoff.reset();
            let link = inner.link.take();
            if link.is_some() {
                self.emit(SessionEvent::Disconnected);
            }
            if self.state() != ConnectionState::Disconnected {
                info!("Disconnecting");
            }
            self.set_state(ConnectionState::Disconnected);
            link
        };

        if let Some(link) = link {
            self.release(link).await;
        }
    }

    // ------------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------------

    /// Write a message, chunking it when it exceeds the write limit
    pub async fn send(&self, data: &[u8]) -> Result<(), SendError> {
        let session = {
            let inner = self.inner.read().await;
            match inner.link.as_ref() {
                Some(link) => link.session.clone(),
                None => return Err(SendError::NotConnected),
            }
        };

        let _writer = self.write_lock.lock().await;

        if !needs_chunking(data.len(), self.config.write_limit) {
            session.write(data).await?;
            return Ok(());
        }

        let frames = split_into_frames(data, self.config.chunk_payload_budget)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        debug!("Sending {} bytes as {} chunks", data.len(), frames.len());

        for (index, frame) in frames.iter().enumerate() {
            if index > 0 {
                sleep(self.config.inter_chunk_delay).await;
            }
            if let Err(err) = session.write(frame.as_bytes()).await {
                warn!(
                    "Chunk {}/{} failed, dropping rest of message: {}",
                    index + 1,
                    frames.len(),
                    err
                );
                return Err(err.into());
            }
        }

        Ok(())
    }

    // ------------------------------------------------------------------------
    // Connect Sequence
    // ------------------------------------------------------------------------

    /// Run the connect sequence once and install the session if `epoch` is
    /// still current
    async fn attempt(self: &Arc<Self>, epoch: u64, device_id: &str) -> Result<(), ConnectError> {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let mut opened = None;

        let outcome = tokio::select! {
            result = self.establish(device_id, &mut opened, signal_tx) => result,
            _ = superseded(self.epoch.subscribe(), epoch) => Err(ConnectError::Cancelled),
        };

        if let Err(err) = outcome {
            if let Some(session) = opened {
                session.close().await;
            }
            return Err(err);
        }

        let Some(session) = opened else {
            return Err(ConnectError::Cancelled);
        };
        self.commit(epoch, session, signal_rx).await
    }

    async fn establish(
        &self,
        device_id: &str,
        opened: &mut Option<Arc<dyn DeviceSession>>,
        sink: mpsc::UnboundedSender<SessionSignal>,
    ) -> Result<(), ConnectError> {
        let session: Arc<dyn DeviceSession> =
            Arc::from(self.transport.open_session(device_id).await?);
        *opened = Some(session.clone());

        if session.is_paired().await? {
            debug!("{} already paired", device_id);
        } else {
            info!("Pairing with {}", device_id);
            match session.pair().await? {
                PairingOutcome::Paired => info!("Paired with {}", device_id),
                PairingOutcome::AlreadyPaired => debug!("{} was paired concurrently", device_id),
            }
        }

        sleep(self.config.settle_delay).await;

        session.resolve_channels().await?;
        session.subscribe(sink).await?;
        Ok(())
    }

    async fn commit(
        self: &Arc<Self>,
        epoch: u64,
        session: Arc<dyn DeviceSession>,
        signals: mpsc::UnboundedReceiver<SessionSignal>,
    ) -> Result<(), ConnectError> {
        let mut inner = self.inner.write().await;
        if self.current_epoch() != epoch {
            drop(inner);
            session.close().await;
            return Err(ConnectError::Cancelled);
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;

        let device_name = session.device_name();
        let pump = tokio::spawn(pump_signals(Arc::downgrade(self), seq, signals));
        inner.link = Some(ActiveLink { session, seq, pump });
        inner.device_name = device_name.clone();
        inner.backoff.reset();

        info!(
            "Connected to {}",
            device_name
                .as_deref()
                .or(inner.device_id.as_deref())
                .unwrap_or("device")
        );
        self.set_state(ConnectionState::Connected);
        self.emit(SessionEvent::Connected { device_name });
        Ok(())
    }

    async fn release(&self, link: ActiveLink) {
        link.pump.abort();
        link.session.close().await;
    }

    // ------------------------------------------------------------------------
    // Link Loss and Reconnect
    // ------------------------------------------------------------------------

    async fn handle_link_lost(self: &Arc<Self>, seq: u64) {
        let (session, reconnect) = {
            let mut inner = self.inner.write().await;
            let link = match inner.link.take() {
                Some(link) if link.seq == seq => link,
                other => {
                    inner.link = other;
                    return;
                }
            };

            warn!("Link to {} lost", inner.device_id.as_deref().unwrap_or("device"));
            self.set_state(ConnectionState::Disconnected);
            self.emit(SessionEvent::Disconnected);

            let reconnect = match inner.device_id.clone() {
                Some(device_id) if self.auto_reconnect() => {
                    self.set_state(ConnectionState::Reconnecting);
                    Some((self.current_epoch(), device_id))
                }
                _ => None,
            };
            (link.session, reconnect)
        };

        // The pump task runs this; its handle is dropped, not aborted
        session.close().await;

        if let Some((epoch, device_id)) = reconnect {
            tokio::spawn(self.clone().reconnect_loop(epoch, device_id));
        }
    }

    fn reconnect_loop(self: Arc<Self>, epoch: u64, device_id: String) -> BoxFuture<'static, ()> {
        async move {
            loop {
                let (delay, attempt) = {
                    let mut inner = self.inner.write().await;
                    if self.current_epoch() != epoch {
                        return;
                    }
                    let delay = inner.backoff.next_delay();
                    (delay, inner.backoff.status().attempts)
                };

                info!(
                    "Reconnecting to {} in {:?} (attempt {})",
                    device_id, delay, attempt
                );

                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = superseded(self.epoch.subscribe(), epoch) => {
                        debug!("Reconnect to {} cancelled", device_id);
                        return;
                    }
                }

                if !self.auto_reconnect() {
                    let _inner = self.inner.write().await;
                    if self.current_epoch() == epoch {
                        info!("Auto-reconnect disabled, giving up on {}", device_id);
                        self.set_state(ConnectionState::Disconnected);
                    }
                    return;
                }

                match self.attempt(epoch, &device_id).await {
                    Ok(()) => return,
                    Err(ConnectError::Cancelled) => {
                        debug!("Reconnect to {} cancelled", device_id);
                        return;
                    }
                    Err(err) => warn!(
                        "Reconnect attempt {} to {} failed ({:?}): {}",
                        attempt,
                        device_id,
                        err.class(),
                        err
                    ),
                }
            }
        }
        .boxed()
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn bump_epoch(&self) -> u64 {
        let mut next = 0;
        self.epoch.send_modify(|epoch| {
            *epoch += 1;
            next = *epoch;
        });
        next
    }

    fn current_epoch(&self) -> u64 {
        *self.epoch.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("Connection state {} -> {}", previous, state);
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }
}

/// Forward session signals as events until the link drops
async fn pump_signals(
    manager: Weak<ConnectionManager>,
    seq: u64,
    mut signals: mpsc::UnboundedReceiver<SessionSignal>,
) {
    while let Some(signal) = signals.recv().await {
        let Some(strong) = manager.upgrade() else {
            return;
        };
        match signal {
            SessionSignal::Data(bytes) => {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                strong.emit(SessionEvent::MessageReceived(text));
            }
            SessionSignal::Disconnected => break,
        }
    }

    if let Some(strong) = manager.upgrade() {
        strong.handle_link_lost(seq).await;
    }
}

/// Resolve once the epoch moves past `current`
async fn superseded(mut epoch: watch::Receiver<u64>, current: u64) {
    while *epoch.borrow_and_update() == current {
        if epoch.changed().await.is_err() {
            future::pending::<()>().await;
        }
    }
}
