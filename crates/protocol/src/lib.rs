//! Wire protocol between the Aera client and the actuator controller.

pub mod codec;
pub mod constants;

pub use codec::{Command, Inbound, Reply, UnknownCommand, decode, encode};
