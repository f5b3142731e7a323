use std::time::Duration;

/// Outbound command: switch the actuator on.
pub const WIRE_ON: &str = "ON";

/// Outbound command: switch the actuator off.
pub const WIRE_OFF: &str = "OFF";

/// Outbound heartbeat probe.
pub const WIRE_PING: &str = "PING";

/// Controller reply to a heartbeat probe.
///
/// Clients never match on it: any inbound frame counts as liveness.
pub const WIRE_PONG: &str = "PONG";

/// Inbound confirmation that the actuator is on.
pub const WIRE_STATUS_ON: &str = "STATUS:ON";

/// Inbound confirmation that the actuator is off.
pub const WIRE_STATUS_OFF: &str = "STATUS:OFF";

/// How often the client probes the controller while the link is open.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1500);

/// Silence longer than this (no inbound frame of any kind) marks the
/// controller as dead. Must stay well above the heartbeat interval so one
/// or two late replies do not tear the link down.
pub const DEFAULT_DEAD_PEER_TIMEOUT: Duration = Duration::from_millis(4000);

/// Fixed wait between a close and the next connect attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// Minimum recommended ratio between dead-peer timeout and heartbeat interval.
pub const RECOMMENDED_TIMEOUT_RATIO: f64 = 2.5;

/// Static address the controller firmware assigns itself.
pub const DEFAULT_HOST: &str = "192.168.18.200";

/// Port the controller firmware serves WebSocket connections on.
pub const DEFAULT_PORT: u16 = 81;

/// Largest frame accepted from the controller. Real frames are a few bytes.
pub const WS_MAX_MESSAGE_SIZE: usize = 4 * 1024;
