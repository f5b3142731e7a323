//! Stand-in for the actuator controller, for local runs without hardware.

use std::net::IpAddr;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use aera_controller_sim::{ControllerSim, SimConfig};

#[derive(Debug, Parser)]
#[command(name = "aera-sim", version, about = "Simulated actuator controller")]
struct Args {
    /// Port to listen on.
    #[arg(long, default_value_t = 8081)]
    port: u16,

    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Start with the actuator switched on.
    #[arg(long)]
    on: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let sim = ControllerSim::new(SimConfig {
        bind: args.bind,
        port: args.port,
        initial_on: args.on,
    });

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let mut runner = {
            let sim = sim.clone();
            tokio::spawn(async move { sim.run().await })
        };

        tokio::select! {
            res = &mut runner => res??,
            res = tokio::signal::ctrl_c() => {
                res?;
                tracing::info!("interrupted");
                sim.shutdown();
                runner.await??;
            }
        }
        anyhow::Ok(())
    })?;

    tracing::info!("simulator stopped");
    Ok(())
}
