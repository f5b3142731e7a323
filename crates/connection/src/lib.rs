//! Connection manager for the actuator controller.
//!
//! Keeps one WebSocket link to the controller alive: connects, probes it
//! with heartbeats, tears it down when it goes silent and reconnects after
//! a fixed delay. The last actuator state the controller confirmed is
//! published alongside the derived connectivity.

pub mod link;
pub mod manager;
pub(crate) mod pumps;
pub mod reconnection;
pub mod types;
pub mod watchdog;

#[cfg(test)]
mod test_support;

pub use link::{Connector, LinkError, WsConnector};
pub use manager::ConnectionManager;
pub use reconnection::ReconnectTimer;
pub use types::{
    CloseReason, ConnectionEvent, ConnectionState, Connectivity, ConnectivityStatus, Endpoint,
    LinkConfig, LinkSnapshot,
};
pub use watchdog::HeartbeatWatchdog;
