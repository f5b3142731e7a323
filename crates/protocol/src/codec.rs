//! Encoding and decoding of the controller's text vocabulary.
//!
//! The transport frames messages, so every WebSocket text frame carries
//! exactly one word. Client commands and controller statuses are disjoint:
//! a command is never decoded as a status.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{
    WIRE_OFF, WIRE_ON, WIRE_PING, WIRE_PONG, WIRE_STATUS_OFF, WIRE_STATUS_ON,
};

/// An outbound intent from the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    TurnOn,
    TurnOff,
    /// Heartbeat probe.
    Probe,
}

impl Command {
    /// Command requesting the given power state.
    pub fn for_power(on: bool) -> Self {
        if on { Self::TurnOn } else { Self::TurnOff }
    }

    /// Wire representation of this command.
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::TurnOn => WIRE_ON,
            Self::TurnOff => WIRE_OFF,
            Self::Probe => WIRE_PING,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Error returned when a controller receives a word it does not know.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown command: {0:?}")]
pub struct UnknownCommand(pub String);

impl FromStr for Command {
    type Err = UnknownCommand;

    /// Parses a frame the way the controller firmware does: exact,
    /// case-sensitive match with no trimming.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            WIRE_ON => Ok(Self::TurnOn),
            WIRE_OFF => Ok(Self::TurnOff),
            WIRE_PING => Ok(Self::Probe),
            other => Err(UnknownCommand(other.to_string())),
        }
    }
}

/// Meaning of an inbound frame on the client side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    /// The controller confirmed the actuator power state.
    Status { on: bool },
    /// Anything else. Only proves the controller is alive.
    Liveness,
}

/// Encodes an outbound command.
pub fn encode(command: Command) -> &'static str {
    command.as_wire()
}

/// Decodes an inbound text frame. Exact match only, no trimming.
pub fn decode(frame: &str) -> Inbound {
    match frame {
        WIRE_STATUS_ON => Inbound::Status { on: true },
        WIRE_STATUS_OFF => Inbound::Status { on: false },
        _ => Inbound::Liveness,
    }
}

/// A frame sent by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Status { on: bool },
    Pong,
}

impl Reply {
    /// The reply the controller sends after handling `command`, given the
    /// actuator state it ends up in.
    pub fn for_command(command: Command, on: bool) -> Self {
        match command {
            Command::Probe => Self::Pong,
            Command::TurnOn | Command::TurnOff => Self::Status { on },
        }
    }

    pub fn as_wire(self) -> &'static str {
        match self {
            Self::Status { on: true } => WIRE_STATUS_ON,
            Self::Status { on: false } => WIRE_STATUS_OFF,
            Self::Pong => WIRE_PONG,
        }
    }
}
