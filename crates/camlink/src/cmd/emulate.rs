use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use camlink::probe::synthetic_jpeg;
use camlink_frame::{CameraFrameCodec, Frame};
use camlink_session::{respond_to_handshake, HandshakeConfig};
use camlink_transport::StreamTransport;
use futures_util::SinkExt;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpListener;
use tokio::time::Instant;
use tokio_util::codec::FramedWrite;
use tracing::{debug, info, warn};

use crate::cmd::EmulateArgs;
use crate::exit::{
    frame_error, handshake_error, io_error, CliError, CliResult, SUCCESS, TRANSPORT_ERROR, USAGE,
};

const SYNTHETIC_WIDTH: u16 = 320;
const SYNTHETIC_HEIGHT: u16 = 240;

trait ClientStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<S> ClientStream for S where S: AsyncRead + AsyncWrite + Unpin + Send {}

enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(tokio::net::UnixListener, std::path::PathBuf),
}

impl Listener {
    async fn bind(args: &EmulateArgs) -> CliResult<Self> {
        let context = format!("failed to listen on {}", args.address);
        if args.unix {
            #[cfg(unix)]
            {
                let path = std::path::PathBuf::from(&args.address);
                let listener = tokio::net::UnixListener::bind(&path)
                    .map_err(|err| io_error(&context, err))?;
                return Ok(Self::Unix(listener, path));
            }
            #[cfg(not(unix))]
            {
                return Err(CliError::new(
                    USAGE,
                    "unix domain sockets are not supported on this platform",
                ));
            }
        }
        let listener = TcpListener::bind(args.address.as_str())
            .await
            .map_err(|err| io_error(&context, err))?;
        Ok(Self::Tcp(listener))
    }

    async fn accept(&self) -> std::io::Result<Box<dyn ClientStream>> {
        match self {
            Self::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                let _ = stream.set_nodelay(true);
                debug!(%peer, "client connected");
                Ok(Box::new(stream))
            }
            #[cfg(unix)]
            Self::Unix(listener, _) => {
                let (stream, _) = listener.accept().await?;
                debug!("client connected");
                Ok(Box::new(stream))
            }
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        match self {
            Self::Tcp(_) => {}
            #[cfg(unix)]
            Self::Unix(_, path) => {
                let _ = std::fs::remove_file(path);
            }
        }
    }
}

enum FrameSource {
    Synthetic,
    Files(Vec<Bytes>),
}

impl FrameSource {
    fn load(dir: Option<&Path>) -> CliResult<Self> {
        let Some(dir) = dir else {
            return Ok(Self::Synthetic);
        };
        let context = format!("failed reading {}", dir.display());
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(|err| io_error(&context, err))? {
            let path = entry.map_err(|err| io_error(&context, err))?.path();
            let is_jpeg = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"));
            if is_jpeg {
                paths.push(path);
            }
        }
        paths.sort();

        let mut frames = Vec::with_capacity(paths.len());
        for path in paths {
            let data = std::fs::read(&path)
                .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
            frames.push(Bytes::from(data));
        }
        if frames.is_empty() {
            return Err(CliError::new(
                USAGE,
                format!("no .jpg or .jpeg files in {}", dir.display()),
            ));
        }
        info!(count = frames.len(), dir = %dir.display(), "loaded frames");
        Ok(Self::Files(frames))
    }

    fn payload(&self, sequence: u64) -> Bytes {
        match self {
            Self::Synthetic => Bytes::from(synthetic_jpeg(
                sequence as u32,
                SYNTHETIC_WIDTH,
                SYNTHETIC_HEIGHT,
            )),
            Self::Files(frames) => frames[(sequence % frames.len() as u64) as usize].clone(),
        }
    }
}

pub async fn run(args: EmulateArgs) -> CliResult<i32> {
    if args.interval == 0 {
        return Err(CliError::new(USAGE, "--interval must be at least 1 ms"));
    }
    let source = FrameSource::load(args.dir.as_deref())?;
    let listener = Listener::bind(&args).await?;
    info!(address = %args.address, "emulator listening");

    loop {
        let stream = tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(SUCCESS),
            accepted = listener.accept() => {
                accepted.map_err(|err| io_error("accept failed", err))?
            }
        };

        let outcome = tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(SUCCESS),
            outcome = serve(stream, &source, &args) => outcome,
        };
        match outcome {
            Ok(sent) => info!(sent, "client finished"),
            Err(err) => warn!(error = %err, "client session failed"),
        }

        if args.frames.is_some() {
            return Ok(SUCCESS);
        }
    }
}

/// Handshake with one client, then stream frames until it hangs up.
async fn serve(
    stream: Box<dyn ClientStream>,
    source: &FrameSource,
    args: &EmulateArgs,
) -> CliResult<u64> {
    let mut transport = StreamTransport::new(stream);
    respond_to_handshake(&mut transport, &HandshakeConfig::default())
        .await
        .map_err(|err| handshake_error("handshake failed", err))?;
    let stream = transport
        .into_inner()
        .ok_or_else(|| CliError::new(TRANSPORT_ERROR, "client closed during handshake"))?;
    info!("handshake acknowledged, streaming");

    let (reader, writer) = tokio::io::split(stream);
    let mut frames = FramedWrite::new(writer, CameraFrameCodec::new());
    let mut feedback = BufReader::new(reader).lines();
    let mut ticker = tokio::time::interval(Duration::from_millis(args.interval));
    let started = Instant::now();
    let mut sent = 0u64;

    loop {
        let streaming = args.frames.is_none_or(|limit| sent < limit);
        tokio::select! {
            _ = ticker.tick(), if streaming => {
                let timestamp = started.elapsed().as_millis() as u32;
                let frame = Frame::new(timestamp, source.payload(sent))
                    .map_err(|err| frame_error("failed to build frame", err))?;
                if let Err(err) = frames.send(frame).await {
                    debug!(error = %err, "client stopped reading");
                    return Ok(sent);
                }
                sent += 1;
                debug!(sent, timestamp, "frame sent");
            }
            line = feedback.next_line() => match line {
                Ok(Some(line)) => info!(feedback = %line, "device feedback"),
                Ok(None) => return Ok(sent),
                Err(err) => {
                    debug!(error = %err, "feedback channel closed");
                    return Ok(sent);
                }
            }
        }
    }
}
