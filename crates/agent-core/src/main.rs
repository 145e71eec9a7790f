mod cli;
mod config;
mod lifecycle;
#[cfg(test)]
mod test_support;

use std::io::Write;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::Command;
use config::AgentConfig;
use lifecycle::{stdin_authorizer, AgentRuntime};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let command = Command::from_args(std::env::args().skip(1))?;
    let config = AgentConfig::load()?;
    let runtime = AgentRuntime::new(config)?;
    let authorizer = runtime.config().needs_confirmation().then(stdin_authorizer);

    info!(?command, "cisguard-agent started");
    match command {
        Command::Check => print_json(&runtime.check(authorizer)?)?,
        Command::Remediate => {
            let results = runtime.evaluate()?;
            print_json(&runtime.remediate(results, authorizer)?)?;
        }
        Command::AuditInventory => print_json(&runtime.audit_inventory())?,
    }
    info!("cisguard-agent finished");
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, value).context("failed writing JSON output")?;
    writeln!(out).context("failed writing JSON output")?;
    Ok(())
}
