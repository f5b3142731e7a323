//! WebSocket transport for a single link generation.
//!
//! Every connect attempt spawns one transport task that owns the socket.
//! The task reports what happens to it through [`LinkReport`]s tagged with
//! its generation, so the manager can drop reports from links it has
//! already replaced.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use aera_protocol::constants::WS_MAX_MESSAGE_SIZE;

/// Outbound frames buffered per link before sends start failing.
const WRITE_BUFFER: usize = 32;

/// Errors from the connection layer.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("WebSocket error: {0}")]
    Transport(#[from] tungstenite::Error),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("send queue full")]
    SendQueueFull,

    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("controller went silent")]
    LivenessTimeout,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("connection manager is not running")]
    ManagerGone,
}

/// Opens sockets to the controller.
///
/// [`WsConnector`] is the production implementation; tests substitute an
/// in-memory socket.
pub trait Connector: Send + Sync + 'static {
    type Socket: Stream<Item = Result<Message, tungstenite::Error>>
        + Sink<Message, Error = tungstenite::Error>
        + Send
        + Unpin
        + 'static;

    fn connect(&self, url: &str) -> impl Future<Output = Result<Self::Socket, LinkError>> + Send;
}

/// Plain `ws://` connector backed by tokio-tungstenite.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn connect(&self, url: &str) -> Result<Self::Socket, LinkError> {
        let mut ws_config = tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);
        let (ws_stream, _) =
            tokio_tungstenite::connect_async_with_config(url, Some(ws_config), false).await?;
        Ok(ws_stream)
    }
}

/// Something that happened to a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LinkEvent {
    Opened,
    /// A text frame.
    Text(String),
    /// A binary or control frame. Proves liveness only.
    Activity,
    /// Connect, read or write failure. Always followed by `Closed`.
    Error(String),
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LinkReport {
    pub(crate) generation: u64,
    pub(crate) event: LinkEvent,
}

pub(crate) type ReportSender = mpsc::UnboundedSender<LinkReport>;

pub(crate) fn report(reports: &ReportSender, generation: u64, event: LinkEvent) {
    // The manager outlives every link; a closed channel means it is gone.
    let _ = reports.send(LinkReport { generation, event });
}

/// Handle to one link generation, owned by the manager.
///
/// Dropping the handle cancels the transport task, which then sends a
/// close frame and exits on its own.
pub(crate) struct Link {
    generation: u64,
    write_tx: mpsc::Sender<Message>,
    cancel: CancellationToken,
}

impl Link {
    /// Spawns the transport task for a new generation.
    pub(crate) fn spawn<C: Connector>(
        connector: Arc<C>,
        url: String,
        generation: u64,
        connect_timeout: Duration,
        reports: ReportSender,
    ) -> Self {
        let (write_tx, write_rx) = mpsc::channel(WRITE_BUFFER);
        let cancel = CancellationToken::new();
        tokio::spawn(run_link(
            connector,
            url,
            generation,
            connect_timeout,
            write_rx,
            reports,
            cancel.clone(),
        ));
        Self {
            generation,
            write_tx,
            cancel,
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Queues a text frame without waiting.
    pub(crate) fn send(&self, frame: &str) -> Result<(), LinkError> {
        self.write_tx
            .try_send(Message::Text(frame.to_owned().into()))
            .map_err(|e| match e {
                TrySendError::Full(_) => LinkError::SendQueueFull,
                TrySendError::Closed(_) => LinkError::ConnectionClosed,
            })
    }

    /// Closes the socket. Reports still in flight keep this generation and
    /// are ignored once the manager has dropped the handle.
    pub(crate) fn close(self) {
        self.cancel.cancel();
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_link<C: Connector>(
    connector: Arc<C>,
    url: String,
    generation: u64,
    connect_timeout: Duration,
    write_rx: mpsc::Receiver<Message>,
    reports: ReportSender,
    cancel: CancellationToken,
) {
    let connected = tokio::select! {
        _ = cancel.cancelled() => return,
        result = tokio::time::timeout(connect_timeout, connector.connect(&url)) => {
            result.unwrap_or(Err(LinkError::ConnectTimeout(connect_timeout)))
        }
    };

    let socket = match connected {
        Ok(socket) => socket,
        Err(e) => {
            warn!(generation, url = %url, error = %e, "connect failed");
            report(&reports, generation, LinkEvent::Error(e.to_string()));
            report(&reports, generation, LinkEvent::Closed);
            return;
        }
    };

    debug!(generation, url = %url, "socket open");
    report(&reports, generation, LinkEvent::Opened);

    let (write, read) = socket.split();
    let writer = tokio::spawn(crate::pumps::write::write_pump(
        write,
        write_rx,
        generation,
        reports.clone(),
        cancel.clone(),
    ));
    crate::pumps::read::read_pump(read, generation, &reports, &cancel).await;

    cancel.cancel();
    let _ = writer.await;
}
