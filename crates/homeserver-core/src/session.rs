// ── Session ──
//
// Lifecycle of one HomeServer connection: connect and log in, discover the
// device topology, then keep a monitor task reading pushed values until
// the session is disconnected. Writes go straight to the socket and never
// contend with the monitor's reads.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use strum::Display;
use tokio::sync::{Mutex, RwLock, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use homeserver_api::protocol::action;
use homeserver_api::{Command, Connection, Frame, ProjectClient};

use crate::config::SessionConfig;
use crate::convert;
use crate::error::CoreError;
use crate::model::{Device, DeviceKind, SlotUpdate};
use crate::store::{DeviceRegistry, ValueSource};
use crate::stream::{SlotUpdateStream, UpdateFilter};

/// Pause after a malformed frame before reading again.
const MALFORMED_FRAME_PAUSE: Duration = Duration::from_secs(1);

// ── ConnectionState ──────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    /// Socket open, login not yet complete.
    Connected,
    LoggedIn,
}

// ── Session ──────────────────────────────────────────────────────

/// A client session with one HomeServer.
///
/// Cheaply cloneable via `Arc<SessionInner>`. Create it with
/// [`new`](Self::new), then call [`connect`](Self::connect).
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: SessionConfig,
    registry: Arc<DeviceRegistry>,
    connection_state: watch::Sender<ConnectionState>,
    connection: RwLock<Option<Arc<Connection>>>,
    token: watch::Sender<Option<String>>,
    cancel: Mutex<CancellationToken>,
    monitor: Mutex<Option<JoinHandle<()>>>,
    retry: AtomicBool,
}

impl Session {
    /// Create a session. Does NOT connect.
    pub fn new(config: SessionConfig) -> Self {
        let (connection_state, _) = watch::channel(ConnectionState::Disconnected);
        let (token, _) = watch::channel(None);

        Self {
            inner: Arc::new(SessionInner {
                config,
                registry: Arc::new(DeviceRegistry::new()),
                connection_state,
                connection: RwLock::new(None),
                token,
                cancel: Mutex::new(CancellationToken::new()),
                monitor: Mutex::new(None),
                retry: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.inner.registry
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Connect, log in, discover devices and start the monitor task.
    ///
    /// With `retry`, failed attempts are repeated every
    /// [`retry_delay`](SessionConfig::retry_delay) until one succeeds or
    /// [`disconnect`](Self::disconnect) is called, and the monitor
    /// re-establishes the session if the socket drops later. Configuration
    /// errors are never retried. Calling this while the monitor is running
    /// does nothing.
    pub async fn connect(&self, retry: bool) -> Result<(), CoreError> {
        let mut monitor = self.inner.monitor.lock().await;
        if monitor.as_ref().is_some_and(|h| !h.is_finished()) {
            info!("session already running, ignoring connect");
            return Ok(());
        }

        let cancel = CancellationToken::new();
        *self.inner.cancel.lock().await = cancel.clone();
        self.inner.retry.store(retry, Ordering::Relaxed);

        self.establish(retry, &cancel).await?;

        *monitor = Some(tokio::spawn(monitor_task(self.clone(), cancel)));
        drop(monitor);

        if !self.request_all_values().await {
            warn!("could not request current values");
        }
        Ok(())
    }

    /// Stop the monitor, close the socket and forget all session state.
    ///
    /// Safe to call repeatedly and on a session that never connected.
    pub async fn disconnect(&self) {
        self.inner.cancel.lock().await.cancel();

        let handle = self.inner.monitor.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "monitor task ended abnormally");
            }
        }

        self.drop_connection().await;
        self.inner.registry.clear();
        self.set_state(ConnectionState::Disconnected);
        debug!("disconnected");
    }

    /// One-shot: connect without retry, run `f`, disconnect.
    ///
    /// The session is disconnected whether or not `f` succeeds.
    pub async fn oneshot<F, Fut, T, E>(config: SessionConfig, f: F) -> Result<T, E>
    where
        F: FnOnce(Session) -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: From<CoreError>,
    {
        let session = Session::new(config);
        session.connect(false).await?;
        let result = f(session.clone()).await;
        session.disconnect().await;
        result
    }

    /// Repeat connection attempts until one succeeds, retry is off, the
    /// error is not retryable, or `cancel` fires.
    async fn establish(&self, retry: bool, cancel: &CancellationToken) -> Result<(), CoreError> {
        let delay = self.inner.config.retry_delay;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => Err(CoreError::Cancelled),
                r = self.try_establish() => r,
            };

            let err = match result {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            self.drop_connection().await;
            self.set_state(ConnectionState::Disconnected);

            if !retry || !err.is_retryable() {
                return Err(err);
            }

            warn!(
                error = %err,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "connection attempt failed, retrying"
            );
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(CoreError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// One attempt: open, log in, discover.
    async fn try_establish(&self) -> Result<(), CoreError> {
        let config = &self.inner.config;

        let conn = Connection::open(&config.host, config.port, config.connect_timeout)
            .await
            .map_err(|e| match CoreError::from(e) {
                CoreError::ConnectionFailed { reason, .. } => CoreError::ConnectionFailed {
                    address: format!("{}:{}", config.host, config.port),
                    reason,
                },
                other => other,
            })?;
        let conn = Arc::new(conn);
        *self.inner.connection.write().await = Some(Arc::clone(&conn));
        self.set_state(ConnectionState::Connected);
        info!(host = %config.host, port = config.port, "connected");

        let outcome = tokio::time::timeout(
            config.login_timeout,
            conn.login(&config.username, &config.password),
        )
        .await
        .map_err(|_| CoreError::Timeout {
            operation: "login".into(),
            timeout_secs: config.login_timeout.as_secs(),
        })??;

        self.inner.token.send_replace(Some(outcome.token));
        self.set_state(ConnectionState::LoggedIn);
        info!(username = %config.username, "logged in");

        self.load_topology(outcome.initial_values).await?;
        Ok(())
    }

    /// Close and forget the socket and token.
    async fn drop_connection(&self) {
        let conn = self.inner.connection.write().await.take();
        if let Some(conn) = conn {
            if let Err(e) = conn.close().await {
                warn!(error = %e, "error while closing socket");
            }
        }
        self.inner.token.send_replace(None);
    }

    // ── Discovery ────────────────────────────────────────────────

    /// Re-download the project and replace the registry's devices.
    ///
    /// Current values are requested again afterwards. Returns the number
    /// of devices registered.
    pub async fn discover_devices(&self) -> Result<usize, CoreError> {
        let count = self.load_topology(HashMap::new()).await?;
        if !self.request_all_values().await {
            warn!("could not request current values after discovery");
        }
        Ok(count)
    }

    async fn load_topology(&self, initial_values: HashMap<String, String>) -> Result<usize, CoreError> {
        if self.state() != ConnectionState::LoggedIn {
            return Err(CoreError::NotLoggedIn);
        }
        let token = self.token().ok_or(CoreError::NotLoggedIn)?;
        let config = &self.inner.config;

        let client = ProjectClient::new(&config.host, config.effective_http_port(), config.http_timeout)?;
        let raw = client.fetch_devices(&token).await?;
        let devices = convert::classify(raw, &config.templates);

        let count = self.inner.registry.replace_all(devices);
        let applied = self
            .inner
            .registry
            .apply_values(initial_values, ValueSource::Bulk);
        info!(devices = count, initial_values = applied, "device discovery complete");
        Ok(count)
    }

    // ── Writes ───────────────────────────────────────────────────

    /// Write a value to a connection of a known device.
    ///
    /// On success the matching slot is updated locally. Returns `false`
    /// (and logs why) if not logged in, the device is unknown, or the
    /// write fails.
    pub async fn update_device_value(&self, device_id: &str, connection_id: &str, value: &str) -> bool {
        if self.state() != ConnectionState::LoggedIn {
            error!(device_id, "cannot update device value: not logged in");
            return false;
        }
        if !self.inner.registry.contains(device_id) {
            warn!(device_id, "cannot update unknown device");
            return false;
        }

        let command = Command::SetValue {
            connection_id: connection_id.to_owned(),
            value: value.to_owned(),
        };
        if !self.send(&command).await {
            return false;
        }

        if !self
            .inner
            .registry
            .set_value_by_connection(device_id, connection_id, value)
        {
            debug!(device_id, connection_id, "written connection is not bound to a slot");
        }
        true
    }

    /// Write a value to a device slot by its logical name.
    pub async fn set_slot(&self, device_id: &str, slot: &str, value: &str) -> bool {
        let Some(connection_id) = self.inner.registry.slot_id(device_id, slot) else {
            warn!(device_id, slot, "cannot set unknown slot");
            return false;
        };
        self.update_device_value(device_id, &connection_id, value).await
    }

    /// Ask the server to send every current value.
    pub async fn request_all_values(&self) -> bool {
        self.send(&Command::RequestAllValues).await
    }

    /// Legacy single-device poll.
    pub async fn poll_device(&self, device_id: &str) -> bool {
        self.send(&Command::PollDevice {
            device_id: device_id.to_owned(),
        })
        .await
    }

    /// Send a pre-encoded frame body as is.
    pub async fn send_raw(&self, body: &str) -> bool {
        self.send(&Command::Raw(body.to_owned())).await
    }

    async fn send(&self, command: &Command) -> bool {
        let Some(conn) = self.current_connection().await else {
            error!(command = %command, "cannot send: not connected");
            return false;
        };
        match conn.send(command).await {
            Ok(()) => true,
            Err(e) => {
                error!(command = %command, error = %e, "failed to send command");
                false
            }
        }
    }

    async fn current_connection(&self) -> Option<Arc<Connection>> {
        self.inner.connection.read().await.clone()
    }

    // ── Incoming frames ──────────────────────────────────────────

    fn handle_frame(&self, frame: &Frame) {
        match frame.action {
            action::VALUE_PUSH | action::VALUE_BULK => {
                let source = if frame.action == action::VALUE_PUSH {
                    ValueSource::Push
                } else {
                    ValueSource::Bulk
                };
                let notified = self
                    .inner
                    .registry
                    .apply_values(frame.messages().map(|m| (m.connection_id, m.value)), source);
                debug!(
                    action = frame.action,
                    messages = frame.message_count(),
                    notified,
                    "applied values"
                );
            }
            other => debug!(action = other, "ignoring frame"),
        }
    }

    // ── State observation ────────────────────────────────────────

    /// Subscribe to connection state changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.connection_state.borrow()
    }

    /// Token of the current login, if logged in.
    pub fn token(&self) -> Option<String> {
        self.inner.token.borrow().clone()
    }

    fn set_state(&self, state: ConnectionState) {
        self.inner.connection_state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                debug!(from = %current, to = %state, "connection state changed");
                *current = state;
                true
            }
        });
    }

    /// Receive a [`SlotUpdate`] for every pushed value and every changed
    /// bulk value.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<SlotUpdate>> {
        self.inner.registry.subscribe()
    }

    /// Slot updates as a `Stream`, narrowed by `filter`.
    pub fn updates(&self, filter: UpdateFilter) -> SlotUpdateStream {
        SlotUpdateStream::new(self.inner.registry.subscribe(), filter)
    }

    // ── Registry accessors ───────────────────────────────────────

    pub fn devices(&self, kind: Option<DeviceKind>) -> BTreeMap<String, Device> {
        self.inner.registry.devices(kind)
    }

    pub fn device(&self, device_id: &str) -> Option<Device> {
        self.inner.registry.device(device_id)
    }

    pub fn slot_id(&self, device_id: &str, slot: &str) -> Option<String> {
        self.inner.registry.slot_id(device_id, slot)
    }

    pub fn slot_value(&self, device_id: &str, slot: &str) -> Option<String> {
        self.inner.registry.slot_value(device_id, slot)
    }

    pub fn set_slot_value(&self, device_id: &str, slot: &str, value: &str) -> bool {
        self.inner.registry.set_slot_value(device_id, slot, value)
    }

    pub fn device_name(&self, device_id: &str) -> Option<String> {
        self.inner.registry.device_name(device_id)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.inner.config.host)
            .field("port", &self.inner.config.port)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ── Monitor task ─────────────────────────────────────────────────

/// Read frames until cancelled, applying pushed values to the registry.
///
/// A lost socket ends the task unless the session was connected with
/// retry, in which case it is re-established on the same token.
async fn monitor_task(session: Session, cancel: CancellationToken) {
    debug!("monitor started");

    loop {
        let result = match session.current_connection().await {
            Some(conn) => tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                r = conn.read_frame() => r,
            },
            None => Err(homeserver_api::Error::ConnectionClosed),
        };

        match result {
            Ok(frame) => session.handle_frame(&frame),
            Err(e) if e.is_fatal() => {
                warn!(error = %e, "session socket lost");
                session.drop_connection().await;
                session.set_state(ConnectionState::Disconnected);

                if !session.inner.retry.load(Ordering::Relaxed) {
                    break;
                }
                match session.establish(true, &cancel).await {
                    Ok(()) => {
                        info!("session re-established");
                        if !session.request_all_values().await {
                            warn!("could not request current values");
                        }
                    }
                    Err(CoreError::Cancelled) => break,
                    Err(e) => {
                        error!(error = %e, "giving up on session");
                        break;
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "skipping malformed frame");
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(MALFORMED_FRAME_PAUSE) => {}
                }
            }
        }
    }

    debug!("monitor stopped");
}
