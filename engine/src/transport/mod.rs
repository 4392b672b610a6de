//! Simulator wire transport
//!
//! [`Transport`] owns the TCP connection to the simulator. Outbound batches
//! are framed by [`codec`] and tagged with a batch id; inbound frames are
//! decoded by a background receive loop and published to a pending-response
//! store keyed by correlation id. Callers block in [`Transport::await_response`]
//! on a [`Notify`] until their frame is published.
//!
//! A second background task, the liveness monitor, probes the socket every
//! `liveness_interval` and reconnects when the connection dropped. Each
//! successful connect starts a new *epoch*: batch ids, response sequence
//! numbers and the pending store are reset, and the previous receive loop is
//! aborted so at most one receiver exists at any time.
//!
//! # Examples
//!
//! ```no_run
//! use arena_engine::shutdown::Shutdown;
//! use arena_engine::transport::{Transport, TransportConfig};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), sdk::errors::EngineError> {
//! let transport = Transport::new(TransportConfig::default(), Shutdown::new());
//! transport.connect().await?;
//!
//! let batch_id = transport.send(&[json!({"commandNum": 0, "commandType": "Rotate"})]).await?;
//! let frame = transport.await_response(batch_id).await?;
//! println!("{:?}", frame.last_action_success());
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod frame;

pub use frame::{Frame, GoalProgress, LastAction};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use serde_json::Value;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::SimulatorConfig;
use crate::shutdown::Shutdown;
use sdk::errors::EngineError;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Connection lifecycle as seen by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Connection and retry settings
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub host: String,
    pub port: u16,
    pub connect_attempts: u32,
    pub connect_interval: Duration,
    pub send_retry_interval: Duration,
    pub response_timeout_ticks: u64,
    pub tick_interval: Duration,
    pub liveness_interval: Duration,
}

impl TransportConfig {
    /// Wall-clock budget for one response
    pub fn response_timeout(&self) -> Duration {
        self.tick_interval
            .saturating_mul(u32::try_from(self.response_timeout_ticks).unwrap_or(u32::MAX))
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::from(&SimulatorConfig::default())
    }
}

impl From<&SimulatorConfig> for TransportConfig {
    fn from(config: &SimulatorConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            connect_attempts: config.connect_attempts,
            connect_interval: config.connect_interval(),
            send_retry_interval: config.send_retry_interval(),
            response_timeout_ticks: config.response_timeout_ticks,
            tick_interval: config.tick_interval(),
            liveness_interval: config.liveness_interval(),
        }
    }
}

/// State shared between callers, the receive loop and the liveness monitor
struct Shared {
    config: TransportConfig,
    shutdown: Shutdown,
    state: watch::Sender<ConnectionState>,
    pending: StdMutex<HashMap<u64, Frame>>,
    arrived: Notify,
    next_batch: AtomicU64,
    next_response_seq: AtomicU64,
    epoch: AtomicU64,
    auto_reconnect: AtomicBool,
    writer: Mutex<Option<OwnedWriteHalf>>,
    receiver: StdMutex<Option<JoinHandle<()>>>,
    connecting: Mutex<()>,
}

/// Reliable request/response channel to the simulator
pub struct Transport {
    shared: Arc<Shared>,
    monitor: StdMutex<Option<JoinHandle<()>>>,
}

impl Transport {
    pub fn new(config: TransportConfig, shutdown: Shutdown) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            shared: Arc::new(Shared {
                config,
                shutdown,
                state,
                pending: StdMutex::new(HashMap::new()),
                arrived: Notify::new(),
                next_batch: AtomicU64::new(0),
                next_response_seq: AtomicU64::new(0),
                epoch: AtomicU64::new(0),
                auto_reconnect: AtomicBool::new(true),
                writer: Mutex::new(None),
                receiver: StdMutex::new(None),
                connecting: Mutex::new(()),
            }),
            monitor: StdMutex::new(None),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.shared.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Number of successful connects since creation
    pub fn epoch(&self) -> u64 {
        self.shared.epoch.load(Ordering::SeqCst)
    }

    /// Subscribe to connection state transitions
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Whether the liveness monitor task is running
    pub fn monitor_running(&self) -> bool {
        lock(&self.monitor)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Whether a receive loop task is running
    pub fn receiver_running(&self) -> bool {
        lock(&self.shared.receiver)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Connect to the simulator, retrying at a fixed interval.
    ///
    /// Exhausting the attempt budget disables auto-reconnect until
    /// [`Transport::restart`] is called and fails with
    /// `ConnectionUnavailable`.
    pub async fn connect(&self) -> Result<()> {
        self.shared.connect().await?;
        self.ensure_monitor();
        Ok(())
    }

    /// Drop the current connection and connect again with a fresh budget
    pub async fn restart(&self) -> Result<()> {
        info!("Restarting simulator transport");
        self.shared.disconnect().await;
        self.shared.auto_reconnect.store(true, Ordering::SeqCst);
        self.connect().await
    }

    /// Stop background tasks and close the socket
    pub async fn close(&self) {
        self.shared.auto_reconnect.store(false, Ordering::SeqCst);
        if let Some(handle) = lock(&self.monitor).take() {
            handle.abort();
        }
        self.shared.disconnect().await;
        debug!("Transport closed");
    }

    /// Send a command batch and return its batch id.
    ///
    /// While the connection is down the send is retried every
    /// `send_retry_interval`; the batch is never dropped. Fails with
    /// `ConnectionUnavailable` once auto-reconnect has been given up.
    pub async fn send(&self, batch: &[Value]) -> Result<u64> {
        let bytes = codec::encode(&Value::Array(batch.to_vec()))?;
        self.shared.write(&bytes, true).await
    }

    /// Send a document that expects no correlated response, such as a
    /// scene load. No batch id is consumed.
    pub async fn send_document(&self, document: &Value) -> Result<()> {
        let bytes = codec::encode(document)?;
        self.shared.write(&bytes, false).await.map(|_| ())
    }

    /// Wait for the frame correlated with `batch_id` using the configured
    /// tick budget
    pub async fn await_response(&self, batch_id: u64) -> Result<Frame> {
        let timeout = self.shared.config.response_timeout();
        self.await_response_within(batch_id, timeout).await
    }

    /// Wait for the frame correlated with `batch_id`, removing it from the
    /// pending store.
    ///
    /// Fails with `ConnectionLost` if the connection leaves the epoch the
    /// wait started in, and with `ResponseTimeout` once `timeout` elapses.
    pub async fn await_response_within(&self, batch_id: u64, timeout: Duration) -> Result<Frame> {
        let shared = &self.shared;
        let deadline = Instant::now() + timeout;
        let epoch = shared.epoch.load(Ordering::SeqCst);
        let mut state_rx = shared.state.subscribe();

        loop {
            let notified = shared.arrived.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(frame) = lock(&shared.pending).remove(&batch_id) {
                return Ok(frame);
            }

            let connected = *state_rx.borrow_and_update() == ConnectionState::Connected;
            if !connected || shared.epoch.load(Ordering::SeqCst) != epoch {
                warn!("Connection lost while waiting for batch {}", batch_id);
                return Err(EngineError::ConnectionLost { batch_id });
            }

            tokio::select! {
                _ = &mut notified => {}
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        return Err(EngineError::ConnectionLost { batch_id });
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    error!("Timed out waiting for batch {}", batch_id);
                    return Err(EngineError::ResponseTimeout { batch_id });
                }
                _ = shared.shutdown.cancelled() => {
                    return Err(EngineError::Cancelled);
                }
            }
        }
    }

    fn ensure_monitor(&self) {
        let mut monitor = lock(&self.monitor);
        if monitor.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        *monitor = Some(tokio::spawn(liveness_monitor(Arc::clone(&self.shared))));
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.monitor).take() {
            handle.abort();
        }
        if let Some(handle) = lock(&self.shared.receiver).take() {
            handle.abort();
        }
    }
}

impl Shared {
    async fn connect(self: &Arc<Self>) -> Result<()> {
        let _guard = self.connecting.lock().await;
        if *self.state.borrow() == ConnectionState::Connected {
            return Ok(());
        }

        let address = format!("{}:{}", self.config.host, self.config.port);
        let attempts = self.config.connect_attempts;
        info!("Connecting to simulator at {}", address);

        for attempt in 1..=attempts {
            if self.shutdown.is_triggered() {
                self.set_state(ConnectionState::Disconnected);
                return Err(EngineError::Cancelled);
            }
            self.set_state(ConnectionState::Connecting);

            match TcpStream::connect(&address).await {
                Ok(stream) => {
                    self.install(stream).await;
                    info!(
                        "Connected to simulator at {} (epoch {})",
                        address,
                        self.epoch.load(Ordering::SeqCst)
                    );
                    return Ok(());
                }
                Err(e) => {
                    debug!("Connect attempt {}/{} failed: {}", attempt, attempts, e);
                }
            }

            if attempt < attempts {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.connect_interval) => {}
                    _ = self.shutdown.cancelled() => {
                        self.set_state(ConnectionState::Disconnected);
                        return Err(EngineError::Cancelled);
                    }
                }
            }
        }

        error!(
            "Simulator unreachable after {} attempts. Disabling auto-reconnect",
            attempts
        );
        self.auto_reconnect.store(false, Ordering::SeqCst);
        self.set_state(ConnectionState::Disconnected);
        Err(EngineError::ConnectionUnavailable { attempts })
    }

    /// Start a new epoch on `stream`
    async fn install(self: &Arc<Self>, stream: TcpStream) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY: {}", e);
        }
        let (reader, writer) = stream.into_split();

        let mut writer_slot = self.writer.lock().await;
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.next_batch.store(0, Ordering::SeqCst);
        self.next_response_seq.store(0, Ordering::SeqCst);
        lock(&self.pending).clear();
        *writer_slot = Some(writer);

        {
            let mut receiver = lock(&self.receiver);
            if let Some(previous) = receiver.take() {
                previous.abort();
            }
            *receiver = Some(tokio::spawn(receive_loop(Arc::clone(self), reader, epoch)));
        }

        self.set_state(ConnectionState::Connected);
        drop(writer_slot);
        self.arrived.notify_waiters();
    }

    async fn disconnect(&self) {
        let mut writer = self.writer.lock().await;
        *writer = None;
        if let Some(handle) = lock(&self.receiver).take() {
            handle.abort();
        }
        self.set_state(ConnectionState::Disconnected);
    }

    async fn write(&self, bytes: &[u8], assign_batch_id: bool) -> Result<u64> {
        loop {
            if self.shutdown.is_triggered() {
                return Err(EngineError::Cancelled);
            }

            {
                let mut writer = self.writer.lock().await;
                let connected = *self.state.borrow() == ConnectionState::Connected;
                let stream = if connected { writer.as_mut() } else { None };
                if let Some(stream) = stream {
                    let epoch = self.epoch.load(Ordering::SeqCst);
                    match codec::write_frame(stream, bytes).await {
                        Ok(()) => {
                            let batch_id = if assign_batch_id {
                                self.next_batch.fetch_add(1, Ordering::SeqCst)
                            } else {
                                0
                            };
                            debug!("Sent {} bytes (batch {})", bytes.len(), batch_id);
                            return Ok(batch_id);
                        }
                        Err(e) => {
                            warn!("Send failed, marking connection closed: {}", e);
                            *writer = None;
                            self.mark_disconnected(epoch);
                        }
                    }
                }
            }

            if !self.auto_reconnect.load(Ordering::SeqCst) {
                return Err(EngineError::ConnectionUnavailable {
                    attempts: self.config.connect_attempts,
                });
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.send_retry_interval) => {}
                _ = self.shutdown.cancelled() => return Err(EngineError::Cancelled),
            }
        }
    }

    fn publish(&self, epoch: u64, payload: Value) {
        let mut pending = lock(&self.pending);
        if self.epoch.load(Ordering::SeqCst) != epoch {
            return;
        }
        let seq = self.next_response_seq.fetch_add(1, Ordering::SeqCst);
        let frame = Frame::new(seq, payload);
        debug!(
            "Received frame {} for batch {}",
            seq,
            frame.correlation_id()
        );
        pending.insert(frame.correlation_id(), frame);
        drop(pending);
        self.arrived.notify_waiters();
    }

    /// Flip to disconnected unless a newer epoch already replaced `epoch`
    fn mark_disconnected(&self, epoch: u64) {
        if self.epoch.load(Ordering::SeqCst) == epoch {
            self.set_state(ConnectionState::Disconnected);
        }
    }

    fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
    }
}

async fn receive_loop(shared: Arc<Shared>, mut reader: OwnedReadHalf, epoch: u64) {
    loop {
        match codec::read_frame(&mut reader).await {
            Ok(Some(body)) => match serde_json::from_slice::<Value>(&body) {
                Ok(payload) => shared.publish(epoch, payload),
                Err(e) => warn!("Dropping malformed frame of {} bytes: {}", body.len(), e),
            },
            Ok(None) => {
                warn!("Simulator closed the connection (epoch {})", epoch);
                shared.mark_disconnected(epoch);
                break;
            }
            Err(e) => {
                warn!("Receive failed (epoch {}): {}", epoch, e);
                shared.mark_disconnected(epoch);
                break;
            }
        }
    }
    debug!("Receive loop for epoch {} ended", epoch);
}

async fn liveness_monitor(shared: Arc<Shared>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(shared.config.liveness_interval) => {}
            _ = shared.shutdown.cancelled() => break,
        }

        if *shared.state.borrow() == ConnectionState::Connected {
            let writer = shared.writer.lock().await;
            let alive = writer
                .as_ref()
                .is_some_and(|stream| stream.peer_addr().is_ok());
            if !alive {
                warn!("Liveness probe failed");
                shared.mark_disconnected(shared.epoch.load(Ordering::SeqCst));
            }
        }

        let disconnected = *shared.state.borrow() == ConnectionState::Disconnected;
        if disconnected && shared.auto_reconnect.load(Ordering::SeqCst) {
            info!("Simulator connection down, reconnecting");
            if let Err(e) = shared.connect().await {
                error!("Reconnect failed: {}", e);
            }
        }
    }
    debug!("Liveness monitor stopped");
}

fn lock<T>(mutex: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_simulator_settings() {
        let config = TransportConfig::default();
        assert_eq!(config.port, 5000);
        assert_eq!(config.connect_attempts, 250);
        assert_eq!(config.response_timeout(), Duration::from_secs(600));
    }

    #[tokio::test]
    async fn test_connect_exhaustion_disables_reconnect() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let transport = Transport::new(
            TransportConfig {
                port,
                connect_attempts: 3,
                connect_interval: Duration::from_millis(5),
                ..TransportConfig::default()
            },
            Shutdown::new(),
        );

        let err = transport.connect().await.unwrap_err();
        assert!(matches!(err, EngineError::ConnectionUnavailable { attempts: 3 }));
        assert_eq!(transport.state(), ConnectionState::Disconnected);

        let err = transport.send(&[]).await.unwrap_err();
        assert!(matches!(err, EngineError::ConnectionUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_await_without_connection_is_lost() {
        let transport = Transport::new(TransportConfig::default(), Shutdown::new());
        let err = transport
            .await_response_within(0, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ConnectionLost { batch_id: 0 }));
    }

    #[tokio::test]
    async fn test_send_is_cancelled_by_shutdown() {
        let shutdown = Shutdown::new();
        let transport = Transport::new(TransportConfig::default(), shutdown.clone());
        shutdown.trigger();
        let err = transport.send(&[]).await.unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
    }
}
