use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::sync::mpsc;

use btp_sdk::config::{load_config, SdkConfig};
use btp_sdk::events::{Event, EventListener};
use btp_sdk::observability::logging::init_tracing;
use btp_sdk::provider::{CallOpts, LogFilter, Params, WaitStatus};
use btp_sdk::BtpProvider;

#[derive(Parser)]
#[command(name = "btp-cli")]
#[command(about = "Command line client for a BTP gateway", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Gateway URL (overrides the configuration file)
    #[arg(short, long)]
    url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List networks served by the gateway
    Networks,
    /// List services and their networks
    Services,
    /// Invoke a read-only service method
    Call {
        network: String,
        service: String,
        method: String,
        /// Parameters as a JSON object
        #[arg(long, default_value = "{}")]
        params: String,
    },
    /// Fetch a transaction receipt
    Result {
        network: String,
        txid: String,
        /// Wait until the containing block is finalized
        #[arg(long)]
        finalized: bool,
        /// Give up waiting after this many milliseconds (0 waits forever)
        #[arg(long, default_value_t = 0)]
        timeout_ms: u64,
    },
    /// Ask whether a block is finalized
    Finality {
        network: String,
        id: String,
        height: u64,
    },
    /// Stream service events until interrupted
    Watch {
        network: String,
        service: String,
        event: String,
        /// Stop after the first event
        #[arg(long)]
        once: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => SdkConfig::default(),
    };
    if let Some(url) = cli.url {
        config.gateway.url = url;
    }
    init_tracing(&config.logging.filter)?;

    let provider = BtpProvider::from_config(&config);

    match cli.command {
        Commands::Networks => print_json(&provider.networks().await?)?,
        Commands::Services => print_json(&provider.services().await?)?,
        Commands::Call {
            network,
            service,
            method,
            params,
        } => {
            let params: Params = serde_json::from_str(&params)?;
            let value = provider
                .call(network, &service, &method, &params, CallOpts::default())
                .await?;
            print_json(&value)?;
        }
        Commands::Result {
            network,
            txid,
            finalized,
            timeout_ms,
        } => {
            let network = provider
                .networks()
                .await?
                .into_iter()
                .find(|n| n.name == network)
                .ok_or_else(|| format!("unknown network {network}"))?;
            let tx = provider.pending_transaction(network, &txid);
            let status = if finalized {
                WaitStatus::Finalized
            } else {
                WaitStatus::Created
            };
            let receipt = tx
                .wait(status, Some(Duration::from_millis(timeout_ms)))
                .await?;
            print_json(&receipt)?;
        }
        Commands::Finality {
            network,
            id,
            height,
        } => {
            let finalized = provider.get_block_finality(&network, &id, height).await?;
            print_json(&Value::Bool(finalized))?;
        }
        Commands::Watch {
            network,
            service,
            event,
            once,
        } => {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let filter = LogFilter::new(network, service, event);
            let listener: EventListener = Box::new(move |event| {
                let _ = tx.send(event);
            });
            let subscription = if once {
                provider.once(filter, listener).await?
            } else {
                provider.on(filter, listener).await?
            };

            loop {
                tokio::select! {
                    event = rx.recv() => match event {
                        Some(Ok(Event::Log(log))) => print_json(&log)?,
                        Some(Ok(other)) => eprintln!("Unexpected event: {:?}", other),
                        Some(Err(e)) => {
                            eprintln!("Error: {}", e);
                            break;
                        }
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => {
                        let _ = provider.off(subscription);
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
