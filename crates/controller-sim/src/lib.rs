//! Simulated actuator controller.
//!
//! Serves the controller side of the wire protocol over WebSocket so the
//! connection manager can be exercised without hardware: `ON`/`OFF` are
//! answered with the resulting `STATUS:*`, `PING` with `PONG`. Test hooks
//! can silence replies or drop every client.

mod server;
mod session;

pub use server::{ControllerSim, SimConfig};

/// Errors produced by the simulator.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("simulator already running")]
    AlreadyRunning,
}
