//! pong - mixnet autoresponder
//!
//! Answers every message delivered to the first configured account with a
//! fixed reply, until interrupted.
//!
//! ```bash
//! pong -f katzenpost.toml
//! pong -g   # generate keys and exit
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use mailproxy_clients::autoresponder::Autoresponder;
use mailproxy_clients::supervisor::{shutdown_signal, supervise};
use mailproxy_clients::{Config, ProxyClient, SpawnError, logging};

#[derive(Parser, Debug)]
#[command(name = "pong")]
#[command(about = "Mixnet autoresponder")]
struct Cli {
    /// Path to the config file
    #[arg(short = 'f', value_name = "PATH", default_value = "katzenpost.toml")]
    config: PathBuf,

    /// Generate the keys and exit immediately
    #[arg(short = 'g')]
    generate_only: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = Config::load_file(&cli.config).with_context(|| {
        format!("Failed to load config file '{}'", cli.config.display())
    })?;
    logging::init(config.log_level());

    let account = config.primary_account()?.clone();

    tracing::info!("Starting pong for {}", account);
    let (proxy, events) = match ProxyClient::spawn(&config, cli.generate_only).await {
        Ok(spawned) => spawned,
        Err(SpawnError::GenerateOnly) => return Ok(ExitCode::SUCCESS),
        Err(e) => return Err(e).context("Failed to spawn proxy client"),
    };

    let outcome = supervise(
        Arc::new(proxy),
        events,
        Autoresponder::new(account),
        shutdown_signal(),
    )
    .await?;

    tracing::info!("pong stopped: {:?}", outcome);
    Ok(ExitCode::SUCCESS)
}
