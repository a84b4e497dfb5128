use std::sync::Arc;
use std::time::Duration;

use camlink::probe::{JpegProbe, ProbeDetector};
use camlink_session::{
    ClientConfig, ConnectionState, DetectionPipeline, DetectionResult, OnDetection,
    ReconnectSupervisor,
};
use camlink_transport::{Connector, DeviceHandle, TcpConnector};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::cmd::MonitorArgs;
use crate::exit::{config_error, session_error, CliError, CliResult, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_detection, print_status, OutputFormat};

pub async fn run(args: MonitorArgs, format: OutputFormat) -> CliResult<i32> {
    let config = match &args.config {
        Some(path) => ClientConfig::from_json_file(path).map_err(config_error)?,
        None => ClientConfig::default(),
    };
    let name = args.name.clone().unwrap_or_else(|| config.device_name.clone());
    let device = DeviceHandle::new(name, args.address.clone());

    if args.unix {
        #[cfg(unix)]
        {
            let connector = camlink_transport::UnixConnector::new(vec![device.clone()]);
            return monitor(connector, &device, &config, &args, format).await;
        }
        #[cfg(not(unix))]
        {
            return Err(CliError::new(
                USAGE,
                "unix domain sockets are not supported on this platform",
            ));
        }
    }

    let connector = TcpConnector::new(vec![device.clone()]);
    monitor(connector, &device, &config, &args, format).await
}

async fn monitor<C: Connector>(
    connector: C,
    device: &DeviceHandle,
    config: &ClientConfig,
    args: &MonitorArgs,
    format: OutputFormat,
) -> CliResult<i32> {
    if args.count == Some(0) {
        return Err(CliError::new(USAGE, "--count must be at least 1"));
    }

    let pipeline = DetectionPipeline::new(JpegProbe, ProbeDetector::default())
        .with_descriptions(config.descriptions.clone())
        .with_score_threshold(config.score_threshold);

    let mut supervisor = ReconnectSupervisor::new(connector, pipeline)
        .with_handshake_config(config.handshake_config())
        .with_receive_config(config.receive_config())
        .with_backoff(config.backoff_policy())
        .with_device_name(device.name.clone());

    let (tx, mut rx) = mpsc::unbounded_channel::<DetectionResult>();
    let on_detection: OnDetection = Arc::new(move |result: &DetectionResult| {
        let _ = tx.send(result.clone());
    });

    supervisor
        .connect_by_name(None, on_detection)
        .await
        .map_err(|err| session_error("device lookup failed", err))?;

    let mut status = supervisor.status();
    let deadline = args
        .timeout
        .map(|ms| Instant::now() + Duration::from_millis(ms));
    let mut detections = 0u64;

    let outcome = loop {
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break Ok(SUCCESS);
            }
            _ = wait_until(deadline) => {
                break Err(CliError::new(
                    TIMEOUT,
                    format!("no {} detection(s) from {device} in time", args.count.unwrap_or(1)),
                ));
            }
            result = rx.recv() => {
                let Some(result) = result else {
                    break Ok(SUCCESS);
                };
                print_detection(&result, format);
                detections += 1;
                if args.count.is_some_and(|count| detections >= count) {
                    break Ok(SUCCESS);
                }
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break Ok(SUCCESS);
                }
                let snapshot = status.borrow_and_update().clone();
                match &snapshot.state {
                    ConnectionState::Disconnected(reason) => {
                        warn!(%reason, attempt = snapshot.attempt_count, "link down");
                    }
                    state => info!(%state, "connection state changed"),
                }
            }
        }
    };

    let snapshot = supervisor.status().borrow().clone();
    supervisor.disconnect().await;
    if outcome.is_ok() {
        print_status(&snapshot, detections, format);
    }
    outcome
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
