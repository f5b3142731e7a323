//! One simulated controller session per accepted client.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use aera_protocol::{Command, Reply};

use crate::SimError;

/// Actuator state shared by every client of one simulator.
#[derive(Debug, Default)]
pub(crate) struct Controller {
    power: AtomicBool,
    silent: AtomicBool,
}

impl Controller {
    pub(crate) fn new(on: bool) -> Self {
        Self {
            power: AtomicBool::new(on),
            silent: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_on(&self) -> bool {
        self.power.load(Ordering::SeqCst)
    }

    pub(crate) fn is_silent(&self) -> bool {
        self.silent.load(Ordering::SeqCst)
    }

    pub(crate) fn set_silent(&self, silent: bool) {
        self.silent.store(silent, Ordering::SeqCst);
    }

    /// Applies one inbound frame and returns the reply to send back.
    ///
    /// A silent controller swallows frames without acting on them, like
    /// firmware that is wedged but still holds the socket open.
    pub(crate) fn handle_frame(&self, frame: &str) -> Option<Reply> {
        if self.is_silent() {
            trace!(frame, "silent, frame ignored");
            return None;
        }

        let command = match frame.parse::<Command>() {
            Ok(c) => c,
            Err(e) => {
                warn!("{e}");
                return None;
            }
        };

        match command {
            Command::TurnOn | Command::TurnOff => {
                let on = command == Command::TurnOn;
                self.power.store(on, Ordering::SeqCst);
                info!(on, "actuator switched");
            }
            Command::Probe => trace!("probe"),
        }
        Some(Reply::for_command(command, self.is_on()))
    }
}

/// Serves one client until it leaves, fails, or `cancel` fires.
pub(crate) async fn serve(
    mut ws: WebSocketStream<TcpStream>,
    peer_addr: SocketAddr,
    controller: &Controller,
    cancel: CancellationToken,
) -> Result<(), SimError> {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(%peer_addr, "dropping client");
                let _ = ws.close(None).await;
                return Ok(());
            }

            msg = ws.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = controller.handle_frame(text.as_str()) {
                            ws.send(Message::Text(reply.as_wire().into())).await?;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(%peer_addr, "client left");
                        return Ok(());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                }
            }
        }
    }
}
