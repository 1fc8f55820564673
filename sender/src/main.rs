mod source;

use bytes::{BufMut, BytesMut};
use frame_relay_common::config::Config;
use frame_relay_common::frame::{FrameHeader, HEADER_SIZE};
use source::FrameSource;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum SenderError {
    #[error("TCP connect failed: {0}")]
    TcpConnect(std::io::Error),
    #[error("TCP write failed: {0}")]
    TcpWrite(std::io::Error),
    #[error("failed to read {0}: {1}")]
    ReadFrame(String, std::io::Error),
    #[error("no JPEG files in {0}")]
    NoFrames(String),
    #[error("failed to encode synthetic frame: {0}")]
    Encode(image::ImageError),
    #[error("frame of {0} bytes does not fit the length prefix")]
    TooLarge(usize),
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load_or_default(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        addr = config.sender.addr,
        fps = config.sender.fps,
        "starting frame-relay sender"
    );

    let mut source = match FrameSource::from_config(&config.sender) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to set up frame source");
            std::process::exit(1);
        }
    };

    let interval = config.sender.period();
    tokio::select! {
        _ = run_sender(&config.sender.addr, &mut source, interval) => {}
        _ = tokio::signal::ctrl_c() => info!("interrupted, stopping sender"),
    }
}

/// Reconnect delay: starts at `initial`, doubles per failed attempt up to
/// `max`, and drops back to `initial` once a connection is established.
#[derive(Debug)]
struct Backoff {
    current: Duration,
    initial: Duration,
    max: Duration,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Self {
            current: initial,
            initial,
            max,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Stream frames to the receiver, reconnecting with exponential backoff.
async fn run_sender(addr: &str, source: &mut FrameSource, interval: Duration) {
    let mut backoff = Backoff::new(Duration::from_secs(2), Duration::from_secs(30));

    loop {
        let err = connect_and_stream(addr, source, interval, &mut backoff).await;
        let delay = backoff.next_delay();
        error!(error = %err, "stream error, reconnecting in {:?}", delay);
        tokio::time::sleep(delay).await;
    }
}

/// One connection attempt plus the session it opens. The backoff is reset as
/// soon as the connection is up, so only consecutive connect failures grow it.
async fn connect_and_stream(
    addr: &str,
    source: &mut FrameSource,
    interval: Duration,
    backoff: &mut Backoff,
) -> SenderError {
    info!(addr, "connecting to receiver");
    let mut stream = match connect(addr).await {
        Ok(s) => s,
        Err(e) => return e,
    };
    info!(addr, "connected to receiver");
    backoff.reset();
    stream_frames(&mut stream, source, interval).await
}

async fn connect(addr: &str) -> Result<TcpStream, SenderError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(SenderError::TcpConnect)?;
    stream.set_nodelay(true).map_err(SenderError::TcpConnect)?;
    Ok(stream)
}

/// Send frames at `interval` until a write fails; returns that error.
async fn stream_frames<W: AsyncWrite + Unpin>(
    writer: &mut W,
    source: &mut FrameSource,
    interval: Duration,
) -> SenderError {
    let mut ticker = tokio::time::interval(interval);
    let mut seq: u64 = 0;
    loop {
        ticker.tick().await;

        let payload = match source.next_frame() {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "failed to produce frame, skipping");
                continue;
            }
        };
        debug!(seq, bytes = payload.len(), "sending frame");
        if let Err(e) = send_frame(writer, &payload).await {
            return e;
        }
        seq += 1;
    }
}

/// Write one length-prefixed frame.
async fn send_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), SenderError> {
    let len = u32::try_from(payload.len()).map_err(|_| SenderError::TooLarge(payload.len()))?;
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    buf.put_slice(&FrameHeader::new(len).to_bytes());
    buf.put_slice(payload);
    writer.write_all(&buf).await.map_err(SenderError::TcpWrite)?;
    writer.flush().await.map_err(SenderError::TcpWrite)
}
