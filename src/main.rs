//! Fluid DEX sUSDe Price Monitor
//!
//! Main entry point for the price monitor.
//! Discovers every Fluid DEX pool holding sUSDe, then watches the pool-implied
//! price three ways at once:
//! - periodic: every pool on a fixed interval
//! - LogOperate at the liquidity layer: immediate + next-block check per swap
//! - per-pool events: a pool-event check after every log, plus a
//!   deposit/withdraw check for large liquidity moves
//!
//! Architecture:
//! - Two WS connections: one for contract reads, one dedicated to subscriptions
//! - All state lives in one `Monitor`, shared by the periodic task and listeners
//! - Every observation batch is appended to the CSV history
//! - SIGINT/SIGTERM stop all tasks; block subscription loss exits non-zero
//!   (restart via supervisor)
//!
//! Author: AI-Generated
//! Created: 2026-10-14

use alloy::providers::{ProviderBuilder, WsConnect};
use anyhow::{Context, Result};
use clap::Parser;
use fluid_price_monitor::chain::{ChainReader, RpcChainReader};
use fluid_price_monitor::config::{load_dotenv, MonitorConfig};
use fluid_price_monitor::monitor::Monitor;
use fluid_price_monitor::pool::PoolDiscovery;
use fluid_price_monitor::price_logger::PriceLogger;
use fluid_price_monitor::subscriptions::{spawn_event_listeners, verify_pools, watch_blocks};
use futures::StreamExt;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Fluid DEX sUSDe price monitor
#[derive(Parser)]
#[command(name = "fluid-price-monitor")]
struct Args {
    /// Mainnet WebSocket endpoint (ws:// or wss://)
    #[arg(long, env = "MAINNET_RPC_URL", hide_env_values = true)]
    rpc_url: Option<String>,

    /// Optional TOML file overriding addresses, timings and thresholds
    #[arg(long, env = "MONITOR_CONFIG")]
    config: Option<PathBuf>,

    /// CSV history file
    #[arg(long, env = "PRICE_CSV_PATH")]
    csv: Option<PathBuf>,

    /// Extra .env file to load before reading the environment
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Emit JSON log lines
    #[arg(long, env = "LOG_JSON")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv(None);
    let mut args = Args::parse();
    if let Some(env_file) = args.env_file.clone() {
        load_dotenv(Some(&env_file));
        // Re-read so variables from the extra file fill unset arguments
        args = Args::parse();
    }

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.json_logs {
        fmt().json().with_env_filter(filter).init();
    } else {
        fmt().with_env_filter(filter).with_target(false).init();
    }

    let config = MonitorConfig::new(args.rpc_url, args.csv, args.config.as_deref())?;
    let settings = &config.settings;
    let tracked_asset = settings.tracked_asset_address()?;
    let liquidity_layer = settings.liquidity_layer_address()?;
    let resolver = settings.reserves_resolver_address()?;

    info!("===========================================");
    info!("   Fluid DEX {} Price Monitor", settings.tracked_symbol);
    info!("===========================================");
    info!("Tracked asset:   {:?}", tracked_asset);
    info!("Liquidity layer: {:?}", liquidity_layer);
    info!("Resolver:        {:?}", resolver);
    info!("CSV history:     {}", config.csv_path.display());

    // Provider 1: contract reads. Provider 2: subscriptions only.
    info!("Connecting via WebSocket (reads + subscriptions)...");
    let provider = ProviderBuilder::new()
        .connect_ws(WsConnect::new(config.rpc_url.clone()))
        .await
        .context("Failed to connect to MAINNET_RPC_URL")?;
    let sub_provider = ProviderBuilder::new()
        .connect_ws(WsConnect::new(config.rpc_url.clone()))
        .await
        .context("Failed to open subscription connection")?;
    let sub_provider = Arc::new(sub_provider);

    let chain = Arc::new(RpcChainReader::new(Arc::new(provider), resolver, tracked_asset));
    let block = chain.block_number().await?;
    info!("Connected! Current block: {}", block);

    let pools = PoolDiscovery::new(chain.as_ref(), tracked_asset, &settings.tracked_symbol)
        .discover()
        .await?;
    if pools.is_empty() {
        warn!("No {} pools found; only the reference price will be recorded", settings.tracked_symbol);
    } else {
        info!("Monitoring {} pools:", pools.len());
        for pool in &pools {
            info!("  - {}", pool);
        }
    }
    let verified = verify_pools(chain.as_ref(), &pools).await;
    info!("Verified {}/{} pool contracts", verified, pools.len());

    let logger = PriceLogger::new(&config.csv_path, &settings.csv_headers())?;
    let monitor = Arc::new(Monitor::new(Arc::clone(&chain), pools, logger, settings, block));

    info!("Taking initial price snapshot...");
    monitor.startup().await;

    let mut block_task = tokio::spawn(watch_blocks(Arc::clone(&sub_provider), Arc::clone(&monitor)));
    let listeners = spawn_event_listeners(Arc::clone(&sub_provider), Arc::clone(&monitor), liquidity_layer);
    let periodic = tokio::spawn(Arc::clone(&monitor).run_periodic());

    let timing = monitor.timing();
    info!(
        "Monitor running: periodic every {:?}, next-block timeout {:?}",
        timing.price_check_interval, timing.next_block_timeout
    );

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let signals_handle = signals.handle();

    let result = tokio::select! {
        Some(sig) = signals.next() => {
            info!("Received signal {}, shutting down", sig);
            Ok(())
        }
        joined = &mut block_task => {
            match joined {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => {
                    error!("Block subscription failed: {:#}", e);
                    Err(e)
                }
                Err(e) => Err(anyhow::Error::new(e).context("Block subscription task panicked")),
            }
        }
    };

    // Rows are written without an await point, so aborting never splits one
    periodic.abort();
    for listener in listeners {
        listener.abort();
    }
    block_task.abort();
    signals_handle.close();

    info!("Price monitor stopped");
    result
}
