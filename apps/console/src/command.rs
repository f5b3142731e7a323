//! Interactive commands read from stdin.

use std::str::FromStr;

/// A line typed at the console prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Toggle,
    On,
    Off,
    Status,
    Connect,
    Disconnect,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  toggle       invert the confirmed actuator state
  on | off     switch the actuator explicitly
  status       print the current link snapshot
  connect      connect now (skips a pending retry)
  disconnect   close the link and stop retrying
  help         show this list
  quit         exit";

impl FromStr for ConsoleCommand {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cmd = match s.trim().to_ascii_lowercase().as_str() {
            "toggle" | "t" => Self::Toggle,
            "on" => Self::On,
            "off" => Self::Off,
            "status" | "s" => Self::Status,
            "connect" => Self::Connect,
            "disconnect" => Self::Disconnect,
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            other => anyhow::bail!("unknown command {other:?}, try `help`"),
        };
        Ok(cmd)
    }
}
