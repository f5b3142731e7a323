//! In-memory sockets for driving the manager in tests.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::task::{Context, Poll};

use futures_util::{Sink, Stream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::link::{Connector, LinkError};

/// Client half of an in-memory socket.
pub(crate) struct MockSocket {
    inbound: mpsc::UnboundedReceiver<Result<Message, tungstenite::Error>>,
    outbound: mpsc::UnboundedSender<Message>,
}

impl Stream for MockSocket {
    type Item = Result<Message, tungstenite::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inbound.poll_recv(cx)
    }
}

impl Sink<Message> for MockSocket {
    type Error = tungstenite::Error;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), Self::Error> {
        self.outbound
            .send(item)
            .map_err(|_| tungstenite::Error::ConnectionClosed)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}

/// Controller half of an in-memory socket.
pub(crate) struct Peer {
    to_client: mpsc::UnboundedSender<Result<Message, tungstenite::Error>>,
    from_client: mpsc::UnboundedReceiver<Message>,
}

impl Peer {
    pub(crate) fn say(&self, text: &str) {
        let _ = self.to_client.send(Ok(Message::Text(text.to_owned().into())));
    }

    pub(crate) fn hang_up(&self) {
        let _ = self.to_client.send(Ok(Message::Close(None)));
    }

    pub(crate) fn fail(&self) {
        let reset = io::Error::from(io::ErrorKind::ConnectionReset);
        let _ = self.to_client.send(Err(tungstenite::Error::Io(reset)));
    }

    /// Text frames the client has written so far.
    pub(crate) fn sent(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(msg) = self.from_client.try_recv() {
            if let Message::Text(t) = msg {
                out.push(t.as_str().to_owned());
            }
        }
        out
    }

    pub(crate) async fn next_text(&mut self) -> Option<String> {
        while let Some(msg) = self.from_client.recv().await {
            if let Message::Text(t) = msg {
                return Some(t.as_str().to_owned());
            }
        }
        None
    }

    /// Waits for a close frame from the client.
    pub(crate) async fn wait_for_close(&mut self) -> bool {
        while let Some(msg) = self.from_client.recv().await {
            if matches!(msg, Message::Close(_)) {
                return true;
            }
        }
        false
    }
}

struct Inner {
    peers: mpsc::UnboundedSender<Peer>,
    attempts: AtomicU32,
    refuse: AtomicBool,
    hang: AtomicBool,
}

/// Connector handing out in-memory sockets. Each successful connect
/// delivers the controller half through the receiver from [`scripted`].
#[derive(Clone)]
pub(crate) struct ScriptedConnector {
    inner: Arc<Inner>,
}

pub(crate) fn scripted() -> (ScriptedConnector, mpsc::UnboundedReceiver<Peer>) {
    let (peers, rx) = mpsc::unbounded_channel();
    let connector = ScriptedConnector {
        inner: Arc::new(Inner {
            peers,
            attempts: AtomicU32::new(0),
            refuse: AtomicBool::new(false),
            hang: AtomicBool::new(false),
        }),
    };
    (connector, rx)
}

impl ScriptedConnector {
    pub(crate) fn attempts(&self) -> u32 {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn refuse(&self, refuse: bool) {
        self.inner.refuse.store(refuse, Ordering::SeqCst);
    }

    pub(crate) fn hang(&self, hang: bool) {
        self.inner.hang.store(hang, Ordering::SeqCst);
    }
}

impl Connector for ScriptedConnector {
    type Socket = MockSocket;

    async fn connect(&self, _url: &str) -> Result<MockSocket, LinkError> {
        self.inner.attempts.fetch_add(1, Ordering::SeqCst);
        if self.inner.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.inner.refuse.load(Ordering::SeqCst) {
            let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
            return Err(LinkError::Transport(tungstenite::Error::Io(refused)));
        }

        let (to_client, inbound) = mpsc::unbounded_channel();
        let (outbound, from_client) = mpsc::unbounded_channel();
        let _ = self.inner.peers.send(Peer {
            to_client,
            from_client,
        });
        Ok(MockSocket { inbound, outbound })
    }
}
