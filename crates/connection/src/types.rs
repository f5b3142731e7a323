//! Public types for the connection manager.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use aera_protocol::constants::{
    DEFAULT_DEAD_PEER_TIMEOUT, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_HOST, DEFAULT_PORT,
    DEFAULT_RECONNECT_DELAY, RECOMMENDED_TIMEOUT_RATIO,
};

use crate::link::LinkError;

/// Lifecycle of the single link owned by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Not started, or stopped.
    Idle,
    /// WebSocket handshake in progress.
    Connecting,
    /// Handshake done, watchdog armed.
    Open,
    /// Link torn down; a reconnect is about to be scheduled.
    Closed,
    /// Waiting for the reconnect timer.
    ReconnectWait,
}

/// Connectivity as shown to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    Connecting,
    Online,
    Disconnected,
    Error,
}

pub const TEXT_CONNECTING: &str = "Connecting…";
pub const TEXT_ONLINE: &str = "Online";
pub const TEXT_RETRYING: &str = "Disconnected. Retrying…";
pub const TEXT_STOPPED: &str = "Disconnected";
pub const TEXT_ERROR: &str = "Error";

/// Connectivity plus its human-readable text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectivityStatus {
    pub state: Connectivity,
    pub text: &'static str,
}

impl ConnectivityStatus {
    /// The only place status text is derived.
    ///
    /// `errored` is set between a transport error and the close that always
    /// follows it.
    pub fn derive(state: ConnectionState, errored: bool) -> Self {
        let (state, text) = match state {
            ConnectionState::Connecting | ConnectionState::Open if errored => {
                (Connectivity::Error, TEXT_ERROR)
            }
            ConnectionState::Connecting => (Connectivity::Connecting, TEXT_CONNECTING),
            ConnectionState::Open => (Connectivity::Online, TEXT_ONLINE),
            ConnectionState::Closed | ConnectionState::ReconnectWait => {
                (Connectivity::Disconnected, TEXT_RETRYING)
            }
            ConnectionState::Idle => (Connectivity::Disconnected, TEXT_STOPPED),
        };
        Self { state, text }
    }
}

/// The observable fields a presentation layer renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinkSnapshot {
    pub connection_state: Connectivity,
    pub status_text: &'static str,
    /// Last power state confirmed by the controller.
    pub actuator_on: bool,
    /// Internal lifecycle state, for diagnostics.
    pub link_state: ConnectionState,
}

impl Default for LinkSnapshot {
    fn default() -> Self {
        let status = ConnectivityStatus::derive(ConnectionState::Idle, false);
        Self {
            connection_state: status.state,
            status_text: status.text,
            actuator_on: false,
            link_state: ConnectionState::Idle,
        }
    }
}

/// Why a link was torn down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The controller closed the stream or it ended cleanly.
    Remote,
    /// A connect, read or write failure.
    Transport(String),
    /// No inbound frame within the dead-peer timeout.
    LivenessTimeout,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote => f.write_str("closed by controller"),
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::LivenessTimeout => f.write_str("liveness timeout"),
        }
    }
}

/// Events emitted by the connection manager.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// The derived connectivity changed.
    StateChanged(ConnectivityStatus),
    /// The controller confirmed a new actuator power state.
    ActuatorChanged { on: bool },
    /// The link was torn down.
    Closed { reason: CloseReason },
    /// A reconnect attempt was scheduled.
    Reconnecting { attempt: u32, delay: Duration },
}

/// Address of the controller's WebSocket endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_host() -> String {
    DEFAULT_HOST.into()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_path() -> String {
    "/".into()
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            path: default_path(),
        }
    }
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            path: default_path(),
        }
    }

    /// `ws://` URL for this endpoint. IPv6 literals are bracketed.
    pub fn url(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("ws://[{}]:{}{}", self.host, self.port, self.path)
        } else {
            format!("ws://{}:{}{}", self.host, self.port, self.path)
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

/// Connection manager configuration. Durations are (de)serialized as
/// milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    #[serde(default)]
    pub endpoint: Endpoint,
    /// Period of the heartbeat probe while the link is open.
    #[serde(
        rename = "heartbeat_interval_ms",
        with = "millis",
        default = "default_heartbeat_interval"
    )]
    pub heartbeat_interval: Duration,
    /// Silence after which the controller is considered dead.
    #[serde(
        rename = "dead_peer_timeout_ms",
        with = "millis",
        default = "default_dead_peer_timeout"
    )]
    pub dead_peer_timeout: Duration,
    /// Fixed delay between a close and the next connect attempt.
    #[serde(
        rename = "reconnect_delay_ms",
        with = "millis",
        default = "default_reconnect_delay"
    )]
    pub reconnect_delay: Duration,
    /// Upper bound on a single connect attempt.
    #[serde(
        rename = "connect_timeout_ms",
        with = "millis",
        default = "default_connect_timeout"
    )]
    pub connect_timeout: Duration,
}

fn default_heartbeat_interval() -> Duration {
    DEFAULT_HEARTBEAT_INTERVAL
}

fn default_dead_peer_timeout() -> Duration {
    DEFAULT_DEAD_PEER_TIMEOUT
}

fn default_reconnect_delay() -> Duration {
    DEFAULT_RECONNECT_DELAY
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            heartbeat_interval: default_heartbeat_interval(),
            dead_peer_timeout: default_dead_peer_timeout(),
            reconnect_delay: default_reconnect_delay(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

impl LinkConfig {
    /// Default timings against the given endpoint.
    pub fn for_endpoint(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            ..Self::default()
        }
    }

    /// Rejects configurations the watchdog cannot work with.
    pub fn validate(&self) -> Result<(), LinkError> {
        let invalid = |msg: &str| -> Result<(), LinkError> {
            Err(LinkError::InvalidConfig(msg.into()))
        };

        if self.endpoint.host.trim().is_empty() {
            return invalid("endpoint host is empty");
        }
        if self.endpoint.port == 0 {
            return invalid("endpoint port must be non-zero");
        }
        if !self.endpoint.path.starts_with('/') {
            return invalid("endpoint path must start with '/'");
        }
        if self.heartbeat_interval.is_zero()
            || self.dead_peer_timeout.is_zero()
            || self.reconnect_delay.is_zero()
            || self.connect_timeout.is_zero()
        {
            return invalid("durations must be non-zero");
        }
        if self.dead_peer_timeout <= self.heartbeat_interval {
            return invalid("dead peer timeout must exceed the heartbeat interval");
        }

        let ratio = self.dead_peer_timeout.as_secs_f64() / self.heartbeat_interval.as_secs_f64();
        if ratio < RECOMMENDED_TIMEOUT_RATIO {
            tracing::warn!(
                ratio,
                "dead peer timeout is close to the heartbeat interval; expect false timeouts"
            );
        }
        Ok(())
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_text_per_state() {
        let cases = [
            (ConnectionState::Idle, Connectivity::Disconnected, "Disconnected"),
            (ConnectionState::Connecting, Connectivity::Connecting, "Connecting…"),
            (ConnectionState::Open, Connectivity::Online, "Online"),
            (ConnectionState::Closed, Connectivity::Disconnected, "Disconnected. Retrying…"),
            (
                ConnectionState::ReconnectWait,
                Connectivity::Disconnected,
                "Disconnected. Retrying…",
            ),
        ];
        for (state, connectivity, text) in cases {
            let status = ConnectivityStatus::derive(state, false);
            assert_eq!(status.state, connectivity, "{state:?}");
            assert_eq!(status.text, text, "{state:?}");
        }
    }

    #[test]
    fn error_only_shows_while_a_link_exists() {
        assert_eq!(
            ConnectivityStatus::derive(ConnectionState::Connecting, true).state,
            Connectivity::Error
        );
        assert_eq!(
            ConnectivityStatus::derive(ConnectionState::Open, true).text,
            "Error"
        );
        assert_eq!(
            ConnectivityStatus::derive(ConnectionState::ReconnectWait, true).state,
            Connectivity::Disconnected
        );
    }

    #[test]
    fn default_snapshot_is_stopped_and_off() {
        let snap = LinkSnapshot::default();
        assert_eq!(snap.connection_state, Connectivity::Disconnected);
        assert_eq!(snap.status_text, TEXT_STOPPED);
        assert!(!snap.actuator_on);
        assert_eq!(snap.link_state, ConnectionState::Idle);
    }

    #[test]
    fn endpoint_urls() {
        assert_eq!(Endpoint::default().url(), "ws://192.168.18.200:81/");
        assert_eq!(Endpoint::new("fan.local", 8081).url(), "ws://fan.local:8081/");
        assert_eq!(Endpoint::new("::1", 81).url(), "ws://[::1]:81/");
        let mut ep = Endpoint::new("10.0.0.2", 80);
        ep.path = "/ws".into();
        assert_eq!(ep.to_string(), "ws://10.0.0.2:80/ws");
    }

    #[test]
    fn config_defaults_match_protocol() {
        let config = LinkConfig::default();
        assert_eq!(config.heartbeat_interval, Duration::from_millis(1500));
        assert_eq!(config.dead_peer_timeout, Duration::from_millis(4000));
        assert_eq!(config.reconnect_delay, Duration::from_millis(3000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_rejects_timeout_below_interval() {
        let config = LinkConfig {
            heartbeat_interval: Duration::from_secs(2),
            dead_peer_timeout: Duration::from_secs(2),
            ..LinkConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, LinkError::InvalidConfig(_)));
        assert!(err.to_string().contains("heartbeat interval"));
    }

    #[test]
    fn config_rejects_bad_endpoint() {
        let mut config = LinkConfig::for_endpoint(Endpoint::new("", 81));
        assert!(config.validate().is_err());
        config.endpoint = Endpoint::new("host", 0);
        assert!(config.validate().is_err());
        config.endpoint = Endpoint::new("host", 81);
        config.endpoint.path = "ws".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_rejects_zero_durations() {
        let config = LinkConfig {
            reconnect_delay: Duration::ZERO,
            ..LinkConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_serde_uses_millis() {
        let config = LinkConfig::for_endpoint(Endpoint::new("10.1.1.1", 9000));
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["heartbeat_interval_ms"], 1500);
        assert_eq!(json["dead_peer_timeout_ms"], 4000);
        assert_eq!(json["reconnect_delay_ms"], 3000);
        assert_eq!(json["endpoint"]["port"], 9000);

        let parsed: LinkConfig = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn config_partial_uses_defaults() {
        let parsed: LinkConfig =
            serde_json::from_str(r#"{"endpoint": {"host": "fan"}, "reconnect_delay_ms": 500}"#)
                .unwrap();
        assert_eq!(parsed.endpoint.host, "fan");
        assert_eq!(parsed.endpoint.port, 81);
        assert_eq!(parsed.reconnect_delay, Duration::from_millis(500));
        assert_eq!(parsed.heartbeat_interval, Duration::from_millis(1500));
    }

    #[test]
    fn close_reason_display() {
        assert_eq!(CloseReason::LivenessTimeout.to_string(), "liveness timeout");
        assert!(CloseReason::Transport("reset".into()).to_string().contains("reset"));
    }
}
