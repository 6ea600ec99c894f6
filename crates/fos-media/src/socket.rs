//! Socket frame source
//!
//! Receives still images pushed over a binary WebSocket. Each message is
//! decoded on the blocking pool, one at a time in arrival order, and handed
//! to the UI side over a bounded channel.

use crate::decode::decode_frame_blocking;
use crate::error::MediaError;
use fos_render::Frame;
use futures_util::{SinkExt, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

/// Socket connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
    Failed,
}

impl ConnectionState {
    /// Connecting or open
    pub fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }
}

/// Messages from the connection task to the owning source
#[derive(Debug)]
pub enum SocketEvent {
    State(ConnectionState),
    Frame(Frame),
    /// A message that could not be decoded; the connection stays up
    DecodeFailed(MediaError),
    /// Why the connection ended in `Failed`
    Failure(MediaError),
}

/// Frame source fed by a binary WebSocket
pub struct SocketFrameSource {
    url: Url,
    capacity: usize,
    runtime: Handle,
    state: ConnectionState,
    events: Option<mpsc::Receiver<SocketEvent>>,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
    decode_failures: u64,
}

impl SocketFrameSource {
    /// Create an idle source. `capacity` bounds the decoded frames waiting
    /// for the UI; once full the socket is not read until there is room.
    pub fn new(url: &str, capacity: usize, runtime: Handle) -> Result<Self, MediaError> {
        let parsed = Url::parse(url).map_err(|e| MediaError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        if parsed.scheme() != "ws" {
            return Err(MediaError::InvalidUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme `{}`", parsed.scheme()),
            });
        }

        Ok(Self {
            url: parsed,
            capacity: capacity.max(1),
            runtime,
            state: ConnectionState::Closed,
            events: None,
            cancel: None,
            task: None,
            decode_failures: 0,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Messages dropped because they failed to decode
    pub fn decode_failures(&self) -> u64 {
        self.decode_failures
    }

    /// Open the connection. No-op while connecting or open.
    pub fn start(&mut self) {
        if self.state.is_active() {
            return;
        }

        info!("Connecting to {}", self.url);

        let (tx, rx) = mpsc::channel(self.capacity);
        let token = CancellationToken::new();
        let task = self
            .runtime
            .spawn(run_connection(self.url.clone(), tx, token.clone()));

        self.state = ConnectionState::Connecting;
        self.events = Some(rx);
        self.cancel = Some(token);
        self.task = Some(task);
    }

    /// Close the connection and stop emitting frames. Idempotent.
    pub fn stop(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        self.events = None;
        self.task = None;

        if self.state.is_active() {
            info!("Closed connection to {}", self.url);
            self.state = ConnectionState::Closed;
        }
    }

    /// Drain everything the connection task has delivered so far
    pub fn poll(&mut self) -> Vec<SocketEvent> {
        let mut out = Vec::new();
        let Some(rx) = self.events.as_mut() else {
            return out;
        };

        loop {
            match rx.try_recv() {
                Ok(event) => {
                    match &event {
                        SocketEvent::State(state) => self.state = *state,
                        SocketEvent::DecodeFailed(_) => self.decode_failures += 1,
                        _ => {}
                    }
                    out.push(event);
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    if self.state.is_active() {
                        self.state = ConnectionState::Closed;
                        out.push(SocketEvent::State(ConnectionState::Closed));
                    }
                    self.events = None;
                    self.cancel = None;
                    self.task = None;
                    break;
                }
            }
        }

        out
    }
}

impl Drop for SocketFrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_connection(url: Url, tx: mpsc::Sender<SocketEvent>, token: CancellationToken) {
    let connect = tokio::select! {
        _ = token.cancelled() => return,
        result = connect_async(url.as_str()) => result,
    };

    let ws_stream = match connect {
        Ok((ws, _response)) => ws,
        Err(e) => {
            error!("WebSocket connect to {} failed: {}", url, e);
            let _ = tx.send(SocketEvent::Failure(MediaError::ConnectionFailure(e.to_string()))).await;
            let _ = tx.send(SocketEvent::State(ConnectionState::Failed)).await;
            return;
        }
    };

    info!("Connected to {}", url);
    if tx.send(SocketEvent::State(ConnectionState::Open)).await.is_err() {
        return;
    }

    let (mut write, mut read) = ws_stream.split();
    let mut received = 0u64;

    let end_state = loop {
        let msg = tokio::select! {
            _ = token.cancelled() => {
                let _ = write.send(WsMessage::Close(None)).await;
                debug!("Connection to {} cancelled after {} messages", url, received);
                return;
            }
            msg = read.next() => msg,
        };

        match msg {
            Some(Ok(WsMessage::Binary(data))) => {
                received += 1;
                let event = match decode_frame_blocking(data.to_vec()).await {
                    Ok(frame) => SocketEvent::Frame(frame),
                    Err(e) => {
                        warn!("Dropping message {}: {}", received, e);
                        SocketEvent::DecodeFailed(e)
                    }
                };
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            Some(Ok(WsMessage::Close(_))) | None => break ConnectionState::Closed,
            Some(Err(e)) => {
                error!("WebSocket error: {}", e);
                let _ = tx.send(SocketEvent::Failure(MediaError::ConnectionFailure(e.to_string()))).await;
                break ConnectionState::Failed;
            }
            // Text is ignored; ping/pong is answered by the transport
            _ => {}
        }
    };

    info!("Connection to {} ended ({:?})", url, end_state);
    let _ = tx.send(SocketEvent::State(end_state)).await;
}
