use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use frame_relay_common::config::FramingConfig;
use frame_relay_common::frame::Frame;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::buffer::{FramePair, LatestFrameBuffer};
use crate::decoder::{self, DecodeError, DecodedImage};
use crate::hook::{ProcessedImage, ProcessingError, ProcessingHook};
use crate::stats::ReceiverStats;
use crate::stream::{FrameReader, StreamError};

/// Where the receive loop currently is.
///
/// Listening → Connected → Idle → Listening ... and Stopped once shutdown
/// completes. Only one connection is ever Connected; further clients wait in
/// the listen backlog until the current one goes away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Listening,
    Connected { peer: SocketAddr },
    Stopped,
}

#[derive(Debug, thiserror::Error)]
pub enum ReceiverError {
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },
}

/// Accepts one camera connection at a time, assembles its frames, decodes and
/// processes them, and publishes the result to a [`LatestFrameBuffer`].
pub struct Receiver {
    framing: FramingConfig,
    hook: Arc<dyn ProcessingHook>,
    buffer: Arc<LatestFrameBuffer>,
    stats: Arc<ReceiverStats>,
}

impl Receiver {
    pub fn new(
        framing: FramingConfig,
        hook: Arc<dyn ProcessingHook>,
        buffer: Arc<LatestFrameBuffer>,
    ) -> Self {
        Self {
            framing,
            hook,
            buffer,
            stats: Arc::new(ReceiverStats::new()),
        }
    }

    pub fn stats(&self) -> Arc<ReceiverStats> {
        Arc::clone(&self.stats)
    }

    /// Bind the listening socket and spawn the receive loop. A bind failure is
    /// returned here and the loop never starts.
    pub async fn start(self, bind_addr: &str) -> Result<ReceiverHandle, ReceiverError> {
        let bind_err = |source| ReceiverError::Bind {
            addr: bind_addr.to_string(),
            source,
        };
        let listener = TcpListener::bind(bind_addr).await.map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);

        info!(
            %local_addr,
            hook = self.hook.name(),
            max_frame_len = self.framing.max_frame_len,
            "listening for camera connections"
        );
        let task = tokio::spawn(self.run(listener, shutdown_rx, state_tx));

        Ok(ReceiverHandle {
            local_addr,
            shutdown: shutdown_tx,
            state: state_rx,
            task: Some(task),
        })
    }

    async fn run(
        self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
        state: watch::Sender<ConnectionState>,
    ) {
        loop {
            state.send_replace(ConnectionState::Listening);

            let accepted = tokio::select! {
                biased;
                _ = stop_requested(&mut shutdown) => break,
                accepted = listener.accept() => accepted,
            };
            let (stream, peer) = match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            };

            if let Err(e) = stream.set_nodelay(true) {
                debug!(error = %e, "failed to set TCP_NODELAY");
            }
            self.stats.record_connection();
            state.send_replace(ConnectionState::Connected { peer });
            info!(%peer, "camera connected");

            let stopping = self.serve_connection(stream, peer, &mut shutdown).await;
            state.send_replace(ConnectionState::Idle);
            info!(%peer, stats = ?self.stats.snapshot(), "connection closed");

            if stopping {
                break;
            }
        }

        drop(listener);
        state.send_replace(ConnectionState::Stopped);
        info!("receive loop stopped");
    }

    /// Serve one connection until it ends. Returns `true` if it ended because
    /// shutdown was requested.
    async fn serve_connection(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        let mut reader = FrameReader::new(stream, &self.framing);

        loop {
            let next = tokio::select! {
                biased;
                _ = stop_requested(shutdown) => {
                    info!(%peer, "shutdown requested, dropping connection");
                    return true;
                }
                next = reader.next_frame() => next,
            };

            match next {
                Ok(Some(frame)) => {
                    self.stats.record_frame_assembled();
                    self.handle_frame(frame).await;
                }
                Ok(None) => {
                    debug!(%peer, "peer closed the stream");
                    return false;
                }
                Err(StreamError::Protocol(e)) => {
                    self.stats.record_protocol_error();
                    warn!(%peer, error = %e, "protocol error, closing connection");
                    return false;
                }
                Err(e) => {
                    self.stats.record_transport_error();
                    warn!(%peer, error = %e, "transport error, closing connection");
                    return false;
                }
            }
        }
    }

    async fn handle_frame(&self, frame: Frame) {
        let frame_len = frame.len();
        let hook = Arc::clone(&self.hook);
        let outcome =
            tokio::task::spawn_blocking(move || decode_and_process(frame, hook.as_ref())).await;

        let (raw, processed) = match outcome {
            Ok(Ok(images)) => images,
            Ok(Err(e)) => {
                self.stats.record_decode_failure();
                warn!(error = %e, frame_len, "failed to decode frame, skipping");
                return;
            }
            Err(e) => {
                error!(error = %e, frame_len, "frame worker did not complete");
                return;
            }
        };

        let processed = match processed {
            Ok(img) => Some(img),
            Err(e) => {
                self.stats.record_processing_failure();
                warn!(
                    hook = self.hook.name(),
                    error = %e,
                    "processing failed, publishing raw frame only"
                );
                None
            }
        };

        let seq = self.buffer.publish(FramePair::new(raw, processed, frame_len));
        self.stats.record_frame_published();
        debug!(seq, frame_len, "published frame pair");
    }
}

fn decode_and_process(
    frame: Frame,
    hook: &dyn ProcessingHook,
) -> Result<(DecodedImage, Result<ProcessedImage, ProcessingError>), DecodeError> {
    let raw = decoder::decode(&frame)?;
    drop(frame);
    let processed = hook.process(&raw);
    Ok((raw, processed))
}

/// Resolves once a stop was requested or the handle went away.
async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Control handle for a running [`Receiver`].
///
/// Dropping the handle also signals shutdown, but only [`ReceiverHandle::stop`]
/// waits for the loop to finish.
pub struct ReceiverHandle {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    state: watch::Receiver<ConnectionState>,
    task: Option<JoinHandle<()>>,
}

impl ReceiverHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop accepting, close the active connection and wait for the receive
    /// loop to exit. No frame is published after this returns. Calling it
    /// again is a no-op.
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        info!(addr = %self.local_addr, "stopping receiver");
        self.shutdown.send_replace(true);
        if let Err(e) = task.await {
            error!(error = %e, "receive loop terminated abnormally");
        }
    }
}

impl Drop for ReceiverHandle {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}
