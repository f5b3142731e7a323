//! Simulator WebSocket server.
//!
//! Listens on a TCP port, upgrades every connection to WebSocket and runs
//! a controller session for it. All sessions share one actuator state,
//! the way several browser tabs share the one real controller.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, watch};
use tokio_tungstenite::accept_async_with_config;
use tokio_util::sync::CancellationToken;

use aera_protocol::constants::WS_MAX_MESSAGE_SIZE;

use crate::SimError;
use crate::session::{self, Controller};

/// Simulator configuration.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Address to bind.
    pub bind: IpAddr,
    /// TCP port to listen on (0 = OS-assigned).
    pub port: u16,
    /// Actuator state at startup.
    pub initial_on: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            initial_on: false,
        }
    }
}

/// The simulated controller.
pub struct ControllerSim {
    bind: SocketAddr,
    controller: Controller,
    cancel: CancellationToken,
    /// Child of `cancel`, replaced each time clients are dropped.
    clients: Mutex<CancellationToken>,
    local_addr: watch::Sender<Option<SocketAddr>>,
    running: AtomicBool,
    accepted: AtomicUsize,
    active: Arc<AtomicUsize>,
}

impl ControllerSim {
    pub fn new(config: SimConfig) -> Arc<Self> {
        let cancel = CancellationToken::new();
        let clients = cancel.child_token();
        Arc::new(Self {
            bind: SocketAddr::new(config.bind, config.port),
            controller: Controller::new(config.initial_on),
            cancel,
            clients: Mutex::new(clients),
            local_addr: watch::Sender::new(None),
            running: AtomicBool::new(false),
            accepted: AtomicUsize::new(0),
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Returns the local address the simulator is listening on.
    ///
    /// Only available after [`run`](Self::run) binds the socket.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.borrow()
    }

    /// Waits until [`run`](Self::run) has bound the socket.
    pub async fn bound(&self) -> Option<SocketAddr> {
        let mut rx = self.local_addr.subscribe();
        let addr = rx.wait_for(Option::is_some).await.ok()?;
        *addr
    }

    /// `ws://` URL clients should connect to, once bound.
    pub fn url(&self) -> Option<String> {
        self.local_addr().map(|a| format!("ws://{a}/"))
    }

    /// Current actuator state.
    pub fn is_on(&self) -> bool {
        self.controller.is_on()
    }

    /// Stops answering (and acting on) frames while keeping sockets open.
    pub fn set_silent(&self, silent: bool) {
        tracing::info!(silent, "silent mode");
        self.controller.set_silent(silent);
    }

    pub fn is_silent(&self) -> bool {
        self.controller.is_silent()
    }

    /// Connections accepted since startup.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Sessions currently running.
    pub fn active_clients(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Closes every connected client. The listener keeps accepting.
    pub async fn drop_clients(&self) {
        let mut clients = self.clients.lock().await;
        clients.cancel();
        *clients = self.cancel.child_token();
        tracing::info!("dropped all clients");
    }

    /// Gracefully shuts down the simulator and all sessions.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Runs the simulator until [`shutdown`](Self::shutdown).
    pub async fn run(self: &Arc<Self>) -> Result<(), SimError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SimError::AlreadyRunning);
        }

        let listener = TcpListener::bind(self.bind).await?;
        let local_addr = listener.local_addr()?;
        self.local_addr.send_replace(Some(local_addr));
        tracing::info!(on = self.is_on(), "controller simulator listening on {local_addr}");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("simulator shutting down");
                    break Ok(());
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let sim = Arc::clone(self);
                            tokio::spawn(async move {
                                if let Err(e) = sim.handle_connection(stream, peer_addr).await {
                                    tracing::warn!(%peer_addr, "session error: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("accept error: {e}");
                        }
                    }
                }
            }
        }
    }

    /// Upgrades one TCP connection to WebSocket and serves it.
    async fn handle_connection(
        self: &Arc<Self>,
        stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<(), SimError> {
        let mut ws_config = tokio_tungstenite::tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);
        let ws_stream = accept_async_with_config(stream, Some(ws_config)).await?;

        self.accepted.fetch_add(1, Ordering::SeqCst);
        tracing::info!(%peer_addr, "client connected");

        let cancel = self.clients.lock().await.clone();
        let _active = ActiveGuard::enter(&self.active);
        session::serve(ws_stream, peer_addr, &self.controller, cancel).await
    }
}

/// Counts a running session for as long as it lives.
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
