use std::sync::Arc;
use std::time::Duration;

use camlink_frame::{AssemblerEvent, DiscardReason, Frame, FrameAssembler, HEADER_SIZE};
use camlink_transport::Transport;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ReceiveConfig;
use crate::detection::{DetectionPipeline, DetectionResult};
use crate::error::{Result, SessionError};
use crate::handshake::{perform_handshake_with_config, HandshakeConfig};
use crate::state::{ConnectionState, StatusSnapshot};

/// Callback invoked on the receive task for every confident detection.
pub type OnDetection = Arc<dyn Fn(&DetectionResult) + Send + Sync + 'static>;

/// One transport connection, from handshake to the end of the stream.
///
/// The session owns its transport and closes it exactly once, whichever way
/// the session ends. It never retries on its own; that is the supervisor's job.
pub struct ConnectionSession<T: Transport> {
    transport: T,
    assembler: FrameAssembler,
    pipeline: Arc<DetectionPipeline>,
    handshake_config: HandshakeConfig,
    config: ReceiveConfig,
    status: Arc<watch::Sender<StatusSnapshot>>,
    closed: bool,
}

impl<T: Transport> ConnectionSession<T> {
    pub fn new(transport: T, pipeline: Arc<DetectionPipeline>) -> Self {
        let (status, _) = watch::channel(StatusSnapshot::default());
        let status = Arc::new(status);
        let config = ReceiveConfig::default();
        Self {
            transport,
            assembler: FrameAssembler::with_config(config.frame.clone()),
            pipeline,
            handshake_config: HandshakeConfig::default(),
            config,
            status,
            closed: false,
        }
    }

    pub fn with_handshake_config(mut self, config: HandshakeConfig) -> Self {
        self.handshake_config = config;
        self
    }

    pub fn with_receive_config(mut self, config: ReceiveConfig) -> Self {
        self.assembler = FrameAssembler::with_config(config.frame.clone());
        self.config = config;
        self
    }

    /// Publish status updates through an existing channel.
    pub fn with_status(mut self, status: Arc<watch::Sender<StatusSnapshot>>) -> Self {
        self.status = status;
        self
    }

    /// Subscribe to status updates.
    pub fn status(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.subscribe()
    }

    pub fn is_open(&self) -> bool {
        !self.closed && self.transport.is_open()
    }

    /// Run the handshake. The transport is closed if it fails.
    pub async fn handshake(&mut self) -> Result<()> {
        self.set_state(ConnectionState::Handshaking);
        match perform_handshake_with_config(&mut self.transport, &self.handshake_config).await {
            Ok(()) => {
                self.set_state(ConnectionState::Streaming);
                Ok(())
            }
            Err(err) => Err(self.fail(err.into()).await),
        }
    }

    /// Read and process frames until the stream fails or `cancel` fires.
    ///
    /// Returns `Ok(())` only on cancellation. Read timeouts, transport errors
    /// and a run of misaligned headers end the session with an error. A run
    /// counts every header-sized window of skipped garbage, so a peer sending
    /// nothing but noise is dropped as well.
    pub async fn receive_loop(
        &mut self,
        cancel: CancellationToken,
        on_detection: OnDetection,
    ) -> Result<()> {
        let mut bad_magic_run = 0u32;

        loop {
            let timeout = self.read_timeout();
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                read = self.transport.read(self.config.read_chunk_size, timeout) => Some(read),
            };

            let Some(read) = read else {
                debug!("receive loop cancelled");
                self.close().await;
                return Ok(());
            };

            let chunk = match read {
                Ok(chunk) => chunk,
                Err(err) => return Err(self.fail(err.into()).await),
            };

            for event in self.assembler.feed(&chunk) {
                match event {
                    AssemblerEvent::Completed(frame) => {
                        bad_magic_run = 0;
                        if !self.process_frame(frame, &on_detection, &cancel).await {
                            debug!("receive loop cancelled during detection");
                            self.close().await;
                            return Ok(());
                        }
                    }
                    AssemblerEvent::Discarded(reason) => {
                        self.status.send_modify(|s| s.frames_discarded += 1);
                        match reason {
                            DiscardReason::BadMagic | DiscardReason::PayloadTooLarge { .. } => {
                                bad_magic_run += 1;
                                warn!(%reason, run = bad_magic_run, "misaligned frame header");
                                let max = self.config.max_bad_magic;
                                if max > 0 && bad_magic_run >= max {
                                    let err = SessionError::RepeatedBadMagic(bad_magic_run);
                                    return Err(self.fail(err).await);
                                }
                            }
                            DiscardReason::CrcMismatch { .. } => {
                                warn!(%reason, "dropping corrupted frame");
                            }
                        }
                    }
                }
            }

            let skipped_windows = self.assembler.misaligned_bytes() / HEADER_SIZE;
            let max = self.config.max_bad_magic;
            if max > 0 && skipped_windows >= max as usize {
                let run = u32::try_from(skipped_windows).unwrap_or(u32::MAX);
                warn!(
                    skipped_bytes = self.assembler.misaligned_bytes(),
                    "no frame header found in stream"
                );
                return Err(self.fail(SessionError::RepeatedBadMagic(run)).await);
            }
        }
    }

    /// Close the transport. Later calls are no-ops.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.assembler.reset();
        self.transport.close().await;
        debug!("session closed");
    }

    fn read_timeout(&self) -> Duration {
        if self.assembler.is_mid_frame() {
            self.config.payload_timeout
        } else {
            self.config.idle_timeout
        }
    }

    async fn fail(&mut self, err: SessionError) -> SessionError {
        warn!(error = %err, "session ended");
        self.close().await;
        self.set_state(ConnectionState::Disconnected(err.to_string()));
        err
    }

    fn set_state(&self, state: ConnectionState) {
        self.status.send_modify(|s| s.state = state);
    }

    /// Run detection for one frame. Returns `false` if `cancel` fired before
    /// the result came back; the result is then dropped.
    async fn process_frame(
        &mut self,
        frame: Frame,
        on_detection: &OnDetection,
        cancel: &CancellationToken,
    ) -> bool {
        let timestamp = frame.source_timestamp();
        let payload = frame.payload;
        let pipeline = Arc::clone(&self.pipeline);

        let started = Instant::now();
        let worker = tokio::task::spawn_blocking(move || pipeline.analyze(&payload, timestamp));
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return false,
            outcome = worker => outcome,
        };
        let latency = started.elapsed();

        let mut description = None;
        match outcome {
            Err(err) => warn!(error = %err, "detection worker failed"),
            Ok(Err(err)) => warn!(error = %err, timestamp, "frame could not be decoded"),
            Ok(Ok(None)) => debug!(timestamp, "no confident detection"),
            Ok(Ok(Some(result))) => {
                info!(
                    label = %result.label,
                    confidence = result.confidence,
                    latency_ms = latency.as_millis() as u64,
                    timestamp,
                    "detection"
                );
                on_detection(&result);
                if self.transport.has_back_channel() {
                    self.send_feedback(&result.description).await;
                }
                description = Some(result.description);
            }
        }

        let sla_exceeded = latency > self.config.latency_sla;
        if sla_exceeded {
            warn!(
                latency_ms = latency.as_millis() as u64,
                sla_ms = self.config.latency_sla.as_millis() as u64,
                "frame latency exceeds SLA"
            );
        }

        self.status.send_modify(|s| {
            s.frames_completed += 1;
            s.last_latency = Some(latency);
            s.sla_exceeded = sla_exceeded;
            if description.is_some() {
                s.last_description = description;
            }
        });
        true
    }

    async fn send_feedback(&mut self, description: &str) {
        let line = format!("{description}\n");
        if let Err(err) = self.transport.write(line.as_bytes()).await {
            warn!(error = %err, "failed to send feedback line");
        }
    }
}

impl<T: Transport> std::fmt::Debug for ConnectionSession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSession")
            .field("assembler", &self.assembler.state())
            .field("config", &self.config)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
