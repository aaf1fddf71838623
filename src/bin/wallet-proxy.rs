//! wallet-proxy - submit a transaction through the mixnet
//!
//! Reads its configuration from the file named by `$WALLETCFG`, waits for
//! the proxy to connect, sends the transaction to the `zcash` service and
//! exits once the proxy has sent it.
//!
//! ```bash
//! WALLETCFG=wallet.toml wallet-proxy 0400008085202f89...
//! WALLETCFG=wallet.toml wallet-proxy -g   # generate keys and exit
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use mailproxy_clients::encoder::{RequestEncoder, ServiceRequest};
use mailproxy_clients::submitter::{self, Submitter, WALLET_CONFIG_ENV};
use mailproxy_clients::supervisor::{shutdown_signal, supervise};
use mailproxy_clients::{Config, Outcome, ProxyClient, SpawnError, logging};

#[derive(Parser, Debug)]
#[command(name = "wallet-proxy")]
#[command(about = "Submit a transaction to a mixnet service")]
struct Cli {
    /// Generate the keys and exit immediately
    #[arg(short = 'g')]
    generate_only: bool,

    /// Hex encoded transaction to submit
    #[arg(value_name = "TX_HEX", required_unless_present = "generate_only")]
    transaction: Option<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let path = std::env::var_os(WALLET_CONFIG_ENV)
        .map(PathBuf::from)
        .with_context(|| format!("{WALLET_CONFIG_ENV} must name the config file"))?;
    let config = Config::load_file(&path)
        .with_context(|| format!("Failed to load config file '{}'", path.display()))?;
    logging::init(config.log_level());

    if cli.generate_only {
        return match ProxyClient::spawn(&config, true).await {
            Ok(_) | Err(SpawnError::GenerateOnly) => Ok(ExitCode::SUCCESS),
            Err(e) => Err(e).context("Failed to generate keys"),
        };
    }

    let transaction = cli
        .transaction
        .context("must specify tx hex blob as the only argument")?;
    let request = ServiceRequest::from_hex(&transaction).context("invalid transaction")?;
    let submitter = Submitter::new(
        submitter::sender_account(),
        submitter::zcash_service(),
        &request,
        &RequestEncoder::new(),
    )?;

    let (proxy, events) = ProxyClient::spawn(&config, false)
        .await
        .context("Failed to spawn proxy client")?;

    let outcome = supervise(Arc::new(proxy), events, submitter, shutdown_signal()).await?;

    match outcome {
        Outcome::Finished => Ok(ExitCode::SUCCESS),
        Outcome::Cancelled => {
            tracing::warn!("Interrupted before the transaction was confirmed");
            Ok(ExitCode::FAILURE)
        }
        Outcome::Disconnected => {
            tracing::error!("Proxy went away before the transaction was confirmed");
            Ok(ExitCode::FAILURE)
        }
    }
}
