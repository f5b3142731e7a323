//! Console loop: wires the connection manager to stdin and stdout.

use aera_connection::{ConnectionEvent, ConnectionManager, LinkSnapshot};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::command::{ConsoleCommand, HELP};
use crate::config::Config;

/// Runs the console until `quit`, end of input or Ctrl-C.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let manager = ConnectionManager::new(config.link.clone())?;

    if let Some(events) = manager.take_events().await {
        tokio::spawn(print_events(events));
    }

    if config.auto_connect {
        manager.start()?;
    } else {
        println!("not connected, type `connect` to start");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res?;
                tracing::info!("interrupted");
                break;
            }
            line = lines.next_line() => line?,
        };

        let Some(line) = line else {
            tracing::debug!("stdin closed");
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let command = match line.parse::<ConsoleCommand>() {
            Ok(c) => c,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };

        match command {
            ConsoleCommand::Toggle => manager.request_toggle(),
            ConsoleCommand::On => manager.request_power(true),
            ConsoleCommand::Off => manager.request_power(false),
            ConsoleCommand::Status => println!("{}", render_status(&manager.snapshot())?),
            ConsoleCommand::Connect => manager.start()?,
            ConsoleCommand::Disconnect => manager.stop().await?,
            ConsoleCommand::Help => println!("{HELP}"),
            ConsoleCommand::Quit => break,
        }
    }

    manager.shutdown().await;
    Ok(())
}

async fn print_events(mut events: mpsc::Receiver<ConnectionEvent>) {
    while let Some(event) = events.recv().await {
        if let Some(line) = describe(&event) {
            println!("{line}");
        }
    }
}

/// One line of user-facing output per event worth showing.
fn describe(event: &ConnectionEvent) -> Option<String> {
    match event {
        ConnectionEvent::StateChanged(status) => Some(format!("[link] {}", status.text)),
        ConnectionEvent::ActuatorChanged { on } => {
            Some(format!("[actuator] {}", if *on { "ON" } else { "OFF" }))
        }
        ConnectionEvent::Reconnecting { attempt, delay } => Some(format!(
            "[link] retry #{attempt} in {:.1}s",
            delay.as_secs_f64()
        )),
        ConnectionEvent::Closed { .. } => None,
    }
}

fn render_status(snapshot: &LinkSnapshot) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(snapshot)?)
}
