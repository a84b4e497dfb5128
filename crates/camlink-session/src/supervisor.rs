use std::sync::{Arc, Mutex, PoisonError};

use camlink_transport::{Connector, DeviceHandle, TransportError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{BackoffPolicy, ReceiveConfig, DEFAULT_DEVICE_NAME};
use crate::detection::DetectionPipeline;
use crate::error::{Result, SessionError};
use crate::handshake::HandshakeConfig;
use crate::session::{ConnectionSession, OnDetection};
use crate::state::{ConnectionState, StatusSnapshot};

/// Retry bookkeeping for the device being supervised.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryContext {
    /// Failed attempts since the last successful handshake.
    pub attempt_count: u32,
    pub last_device: Option<DeviceHandle>,
}

struct ActiveLoop {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Keeps one device connected: connect, handshake, stream, and on any
/// failure back off and try again until told to stop.
///
/// At most one retry loop (and therefore one session) runs at a time.
pub struct ReconnectSupervisor<C: Connector> {
    connector: Arc<C>,
    pipeline: Arc<DetectionPipeline>,
    handshake_config: HandshakeConfig,
    receive_config: ReceiveConfig,
    backoff: BackoffPolicy,
    device_name: String,
    retry: Arc<Mutex<RetryContext>>,
    status: Arc<watch::Sender<StatusSnapshot>>,
    active: Option<ActiveLoop>,
}

impl<C: Connector> ReconnectSupervisor<C> {
    pub fn new(connector: C, pipeline: DetectionPipeline) -> Self {
        let (status, _) = watch::channel(StatusSnapshot::default());
        Self {
            connector: Arc::new(connector),
            pipeline: Arc::new(pipeline),
            handshake_config: HandshakeConfig::default(),
            receive_config: ReceiveConfig::default(),
            backoff: BackoffPolicy::default(),
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            retry: Arc::new(Mutex::new(RetryContext::default())),
            status: Arc::new(status),
            active: None,
        }
    }

    pub fn with_handshake_config(mut self, config: HandshakeConfig) -> Self {
        self.handshake_config = config;
        self
    }

    pub fn with_receive_config(mut self, config: ReceiveConfig) -> Self {
        self.receive_config = config;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Name used by [`connect_by_name`](Self::connect_by_name) when none is given.
    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = name.into();
        self
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Subscribe to status updates.
    pub fn status(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.subscribe()
    }

    /// Snapshot of the retry bookkeeping.
    pub fn retry_context(&self) -> RetryContext {
        lock(&self.retry).clone()
    }

    /// True while a retry loop is running.
    pub fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| !active.task.is_finished())
    }

    /// Start supervising `device`, replacing any loop already running.
    pub async fn connect(&mut self, device: DeviceHandle, on_detection: OnDetection) {
        self.stop().await;

        let attempt_count = {
            let mut retry = lock(&self.retry);
            if retry.last_device.as_ref() != Some(&device) {
                *retry = RetryContext {
                    attempt_count: 0,
                    last_device: Some(device.clone()),
                };
            }
            retry.attempt_count
        };

        self.status.send_modify(|s| {
            s.state = ConnectionState::Connecting;
            s.attempt_count = attempt_count;
        });

        let cancel = CancellationToken::new();
        let worker = RetryLoop {
            connector: Arc::clone(&self.connector),
            pipeline: Arc::clone(&self.pipeline),
            handshake_config: self.handshake_config.clone(),
            receive_config: self.receive_config.clone(),
            backoff: self.backoff,
            retry: Arc::clone(&self.retry),
            status: Arc::clone(&self.status),
        };
        info!(%device, "supervising device");
        let task = tokio::spawn(worker.run(device, on_detection, cancel.clone()));
        self.active = Some(ActiveLoop { cancel, task });
    }

    /// Discover devices and connect to the first one called `name`
    /// (the configured device name when `None`).
    pub async fn connect_by_name(
        &mut self,
        name: Option<&str>,
        on_detection: OnDetection,
    ) -> Result<DeviceHandle> {
        let name = name.unwrap_or(&self.device_name).to_string();
        self.stop().await;
        self.status
            .send_modify(|s| s.state = ConnectionState::Scanning);

        let devices = match self.connector.discover().await {
            Ok(devices) => devices,
            Err(err) => {
                self.set_state(ConnectionState::Disconnected(err.to_string()));
                return Err(err.into());
            }
        };
        debug!(found = devices.len(), %name, "discovery finished");

        let Some(device) = devices.into_iter().find(|d| d.name == name) else {
            let err = TransportError::NotFound(name);
            self.set_state(ConnectionState::Disconnected(err.to_string()));
            return Err(err.into());
        };

        self.connect(device.clone(), on_detection).await;
        Ok(device)
    }

    /// Stop supervising: cancel both tasks and close the transport now.
    ///
    /// The last device is remembered for [`reconnect_if_needed`](Self::reconnect_if_needed).
    pub async fn disconnect(&mut self) {
        self.stop().await;
        lock(&self.retry).attempt_count = 0;
        self.status.send_modify(|s| {
            s.state = ConnectionState::Idle;
            s.attempt_count = 0;
        });
        info!("disconnected");
    }

    /// Reconnect to the last device unless a connection is already live or
    /// being set up. Returns whether a new loop was started.
    pub async fn reconnect_if_needed(&mut self, on_detection: OnDetection) -> bool {
        if self.status.borrow().state.is_active() {
            return false;
        }
        let Some(device) = lock(&self.retry).last_device.clone() else {
            debug!("no device to reconnect to");
            return false;
        };
        self.connect(device, on_detection).await;
        true
    }

    async fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            if let Err(err) = active.task.await {
                warn!(error = %err, "retry loop ended abnormally");
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.status.send_modify(|s| s.state = state);
    }
}

impl<C: Connector> Drop for ReconnectSupervisor<C> {
    fn drop(&mut self) {
        if let Some(active) = &self.active {
            active.cancel.cancel();
        }
    }
}

impl<C: Connector> std::fmt::Debug for ReconnectSupervisor<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectSupervisor")
            .field("device_name", &self.device_name)
            .field("backoff", &self.backoff)
            .field("retry", &self.retry_context())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

/// State moved into the retry task.
struct RetryLoop<C: Connector> {
    connector: Arc<C>,
    pipeline: Arc<DetectionPipeline>,
    handshake_config: HandshakeConfig,
    receive_config: ReceiveConfig,
    backoff: BackoffPolicy,
    retry: Arc<Mutex<RetryContext>>,
    status: Arc<watch::Sender<StatusSnapshot>>,
}

impl<C: Connector> RetryLoop<C> {
    async fn run(self, device: DeviceHandle, on_detection: OnDetection, cancel: CancellationToken) {
        loop {
            let err = match self.attempt(&device, &on_detection, &cancel).await {
                Ok(()) | Err(SessionError::Cancelled) => break,
                Err(err) => err,
            };
            if cancel.is_cancelled() {
                break;
            }

            let attempt = {
                let mut retry = lock(&self.retry);
                retry.attempt_count = retry.attempt_count.saturating_add(1);
                retry.attempt_count
            };
            let delay = self.backoff.delay(attempt);
            self.status.send_modify(|s| {
                s.state = ConnectionState::Disconnected(err.to_string());
                s.attempt_count = attempt;
            });
            warn!(
                %device,
                error = %err,
                attempt,
                retry_in_ms = delay.as_millis() as u64,
                "connection attempt failed"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        debug!(%device, "retry loop stopped");
    }

    /// One connect, handshake and stream cycle.
    async fn attempt(
        &self,
        device: &DeviceHandle,
        on_detection: &OnDetection,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let attempt = lock(&self.retry).attempt_count;
        info!(%device, attempt = attempt + 1, "connecting");
        self.status
            .send_modify(|s| s.state = ConnectionState::Connecting);

        let transport = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SessionError::Cancelled),
            transport = self.connector.connect(device) => transport?,
        };

        let mut session = ConnectionSession::new(transport, Arc::clone(&self.pipeline))
            .with_handshake_config(self.handshake_config.clone())
            .with_receive_config(self.receive_config.clone())
            .with_status(Arc::clone(&self.status));

        let handshake = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = session.handshake() => Some(result),
        };
        match handshake {
            None => {
                session.close().await;
                return Err(SessionError::Cancelled);
            }
            Some(result) => result?,
        }

        lock(&self.retry).attempt_count = 0;
        self.status.send_modify(|s| s.attempt_count = 0);
        info!(%device, "streaming");

        let receive_cancel = cancel.child_token();
        let callback = Arc::clone(on_detection);
        let receive = tokio::spawn(async move {
            session.receive_loop(receive_cancel, callback).await
        });

        match receive.await {
            Ok(result) => result,
            Err(err) => Err(SessionError::TaskFailed(err.to_string())),
        }
    }
}

fn lock(retry: &Mutex<RetryContext>) -> std::sync::MutexGuard<'_, RetryContext> {
    retry.lock().unwrap_or_else(PoisonError::into_inner)
}
