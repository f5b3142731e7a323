//! Aera console entry point.

mod app;
mod command;
mod config;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Terminal remote for the actuator controller.
#[derive(Debug, Parser)]
#[command(name = "aera-console", version)]
struct Args {
    /// Configuration file (defaults to the per-user location).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Controller host, overriding the configuration file.
    #[arg(long)]
    host: Option<String>,

    /// Controller port, overriding the configuration file.
    #[arg(long)]
    port: Option<u16>,
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they do not interleave with command output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting Aera console");

    let path = args.config.unwrap_or_else(config::config_path);
    let mut config = config::Config::load_from(&path)?;
    config.apply_overrides(args.host, args.port);
    config.link.validate()?;
    tracing::info!(
        path = %path.display(),
        endpoint = %config.link.endpoint,
        "configuration loaded"
    );

    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(app::run(config));
    // A pending stdin read sits on the blocking pool and would hold a plain drop.
    rt.shutdown_timeout(Duration::from_millis(500));
    result?;

    tracing::info!("console shut down cleanly");
    Ok(())
}
