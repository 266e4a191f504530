//! Market Watch Service binary
//!
//! Restores the tick cache, streams the default ticker channel, snapshots on a
//! timer and writes a final snapshot on Ctrl-C. The other subcommands operate
//! on the persisted groups and channels without connecting.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use feeds::{KiteTicker, parse_instruments_csv};
use market_watch::{MarketWatchService, ServiceConfig};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const STATS_INTERVAL_SECS: u64 = 30;

#[derive(Parser)]
#[command(name = "market-watch")]
#[command(about = "Real-time tick cache with rolling-window analytics")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Data directory (overrides the configuration file)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[derive(Subcommand, Clone)]
enum Commands {
    /// Restore, connect and stream until Ctrl-C
    Run {
        /// Channel to stream (defaults to the configured default channel)
        #[arg(long)]
        channel: Option<String>,
    },

    /// Merge a group's instruments into a ticker channel
    Subscribe {
        /// Instrument group
        #[arg(long)]
        group: String,

        /// Ticker channel
        #[arg(long)]
        channel: String,
    },

    /// Show how many instruments a channel holds
    TickerInfo {
        /// Ticker channel
        #[arg(long)]
        channel: String,
    },

    /// Empty a ticker channel
    Flush {
        /// Ticker channel
        #[arg(long)]
        channel: String,
    },

    /// Delete the tick cache snapshot
    ClearSnapshot,

    /// List instrument groups
    Groups,

    /// Add instruments from a Kite instrument dump to a group
    ImportInstruments {
        /// Instrument group
        #[arg(long)]
        group: String,

        /// Instrument master CSV
        #[arg(long)]
        csv: PathBuf,

        /// Only import these trading symbols (comma-separated)
        #[arg(long, value_delimiter = ',')]
        symbols: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::from_default_env()
            .add_directive("market_watch=debug".parse()?)
            .add_directive("feeds=debug".parse()?)
            .add_directive("storage=debug".parse()?)
    } else {
        EnvFilter::from_default_env()
            .add_directive("market_watch=info".parse()?)
            .add_directive("feeds=info".parse()?)
            .add_directive("storage=info".parse()?)
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let mut config = ServiceConfig::load(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir.clone() {
        config.data_dir = data_dir;
    }
    config.validate()?;

    let transport = Arc::new(KiteTicker::new(config.kite_ticker()));
    let service = MarketWatchService::open(config, transport).await?;

    let command = cli.command.unwrap_or(Commands::Run { channel: None });
    match command {
        Commands::Run { channel } => run_service(&service, channel).await?,

        Commands::Subscribe { group, channel } => {
            let summary = service.subscribe(&group, &channel).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Commands::TickerInfo { channel } => {
            println!("{}", service.ticker_info(&channel).await?);
        }

        Commands::Flush { channel } => {
            println!("{}", service.flush_persisted(&channel).await?);
        }

        Commands::ClearSnapshot => {
            println!("{}", service.clear_snapshot().await?);
        }

        Commands::Groups => {
            println!("{}", serde_json::to_string_pretty(&service.list_groups().await)?);
        }

        Commands::ImportInstruments {
            group,
            csv,
            symbols,
        } => {
            let file =
                File::open(&csv).with_context(|| format!("Failed to open {}", csv.display()))?;
            let today = chrono::Local::now().date_naive();
            let instruments: Vec<_> = parse_instruments_csv(file)?
                .into_iter()
                .filter(|inst| !inst.is_expired(today))
                .filter(|inst| symbols.is_empty() || symbols.contains(&inst.trading_symbol))
                .collect();

            let added = service.add_instruments(&group, instruments).await?;
            println!("Added {added} instruments to {group}");
        }
    }

    Ok(())
}

async fn run_service(service: &MarketWatchService, channel: Option<String>) -> Result<()> {
    let channel = channel.unwrap_or_else(|| service.config().default_channel.clone());
    info!("🚀 Market Watch Service");
    info!("Channel: {}", channel);

    // The cache must be warm before the first tick merges
    let restored = service.restore_snapshot().await;
    info!(restored, "Tick cache ready");

    service
        .connect(&channel)
        .await
        .with_context(|| format!("Failed to connect ticker channel {channel}"))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let snapshots = service.spawn_snapshots(shutdown_rx);

    let mut stats = tokio::time::interval(Duration::from_secs(STATS_INTERVAL_SECS));
    stats.tick().await;

    loop {
        tokio::select! {
            _ = stats.tick() => {
                let s = service.ingest_stats();
                info!(
                    state = ?service.ingest_state(),
                    ticks = s.ticks_merged,
                    malformed = s.malformed_ticks,
                    batches = s.batches,
                    reconnects = s.reconnect_attempts,
                    "Ingest stats"
                );
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                }
                break;
            }
        }
    }

    info!("Shutting down");
    service.disconnect().await;
    let _ = shutdown_tx.send(true);
    if let Err(e) = snapshots.await {
        error!("Snapshot task failed: {}", e);
    }
    Ok(())
}
