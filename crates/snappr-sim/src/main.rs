//! snappr-sim — run the ring workload and print a JSON report.
//!
//! Usage: `snappr-sim [config.toml]`. Without an argument the config is
//! resolved from `$SNAPPR_CONFIG` or the XDG config directory.

use std::path::Path;

use anyhow::{Context, Result};

use snappr_core::config::SimConfig;
use snappr_sim::{ring, Simulation};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            let path = Path::new(&path);
            if !path.exists() {
                anyhow::bail!("config file {} does not exist", path.display());
            }
            SimConfig::load_from(path)
                .with_context(|| format!("failed to load {}", path.display()))?
        }
        None => SimConfig::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load config, using defaults");
            SimConfig::default()
        }),
    };
    tracing::info!(
        endpoints = config.workload.endpoints,
        protocol = ?config.transport.protocol,
        packet_size = config.nic.packet_size,
        credits = config.nic.credits,
        send_credits = config.nic.send_credits,
        "snappr-sim starting"
    );

    let mut sim = Simulation::from_config(&config).context("invalid config")?;
    let workload = ring(&mut sim, &config.workload)?;
    sim.run().context("simulation aborted")?;

    let incomplete = workload.incomplete();
    if incomplete > 0 {
        tracing::warn!(incomplete, "requests never completed");
    }

    let report = sim.report();
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
