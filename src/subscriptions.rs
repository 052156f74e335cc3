//! WebSocket subscriptions
//!
//! Three independent push streams feed the monitor:
//! - new block headers → `BlockFeed`
//! - `LogOperate` at the liquidity layer, filtered to the tracked pools
//! - every log emitted by each tracked pool (Swap / Deposit / Withdraw / other)
//!
//! Each pool gets its own subscription task; one failing does not stop the rest.
//!
//! Author: AI-Generated
//! Created: 2026-10-14
//! Modified: 2026-10-14 - No LogOperate subscription without pools

use crate::chain::ChainReader;
use crate::contracts::IFluidDexT1::{Deposit, Swap, Withdraw};
use crate::contracts::IFluidLiquidity::LogOperate;
use crate::monitor::Monitor;
use crate::types::{LiquidityEvent, OperationEvent, Pool, PoolEvent, SwapEvent};
use alloy::primitives::{Address, B256};
use alloy::providers::Provider;
use alloy::rpc::types::{Filter, Log};
use alloy::sol_types::SolEvent;
use anyhow::{Context, Result};
use futures::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Decode a log emitted by a pool contract
pub fn decode_pool_log(log: &Log) -> PoolEvent {
    let pool = log.address();
    let block_number = log.block_number;
    let tx_hash = log.transaction_hash;
    let topic0 = log.topic0().copied();

    let decoded = match topic0 {
        Some(t) if t == Swap::SIGNATURE_HASH => log.log_decode::<Swap>().map(|l| {
            let e = l.inner.data;
            PoolEvent::Swap(SwapEvent {
                pool,
                user: e.user,
                swap0to1: e.swap0to1,
                amount_in: e.amountIn,
                amount_out: e.amountOut,
                to: e.to,
                block_number,
                tx_hash,
            })
        }),
        Some(t) if t == Deposit::SIGNATURE_HASH => log.log_decode::<Deposit>().map(|l| {
            let e = l.inner.data;
            PoolEvent::Deposit(LiquidityEvent {
                pool,
                user: e.user,
                shares: e.sharesMinted,
                token0_amount: e.token0Amount,
                token1_amount: e.token1Amount,
                block_number,
                tx_hash,
            })
        }),
        Some(t) if t == Withdraw::SIGNATURE_HASH => log.log_decode::<Withdraw>().map(|l| {
            let e = l.inner.data;
            PoolEvent::Withdraw(LiquidityEvent {
                pool,
                user: e.user,
                shares: e.sharesBurned,
                token0_amount: e.token0Amount,
                token1_amount: e.token1Amount,
                block_number,
                tx_hash,
            })
        }),
        _ => {
            return PoolEvent::Other {
                pool,
                topic0,
                tx_hash,
            }
        }
    };

    decoded.unwrap_or_else(|e| {
        debug!("Undecodable log from {:?}: {}", pool, e);
        PoolEvent::Other {
            pool,
            topic0,
            tx_hash,
        }
    })
}

/// Decode a liquidity-layer `LogOperate`
pub fn decode_operate_log(log: &Log) -> Option<OperationEvent> {
    if log.topic0() != Some(&LogOperate::SIGNATURE_HASH) {
        return None;
    }
    match log.log_decode::<LogOperate>() {
        Ok(decoded) => {
            let e = decoded.inner.data;
            Some(OperationEvent {
                user: e.user,
                token: e.token,
                supply_amount: e.supplyAmount,
                borrow_amount: e.borrowAmount,
                block_number: log.block_number.unwrap_or_default(),
                tx_hash: log.transaction_hash,
            })
        }
        Err(e) => {
            debug!("Undecodable LogOperate: {}", e);
            None
        }
    }
}

/// LogOperate filter at the liquidity layer, topic1 (`user`) restricted to the pools.
/// None without pools: an empty topic1 set would match every user.
pub fn operate_filter(liquidity_layer: Address, pools: &[Pool]) -> Option<Filter> {
    if pools.is_empty() {
        return None;
    }
    let users: Vec<B256> = pools.iter().map(|p| p.address.into_word()).collect();
    Some(
        Filter::new()
            .address(liquidity_layer)
            .event_signature(LogOperate::SIGNATURE_HASH)
            .topic1(users),
    )
}

/// Publish new block numbers until the stream ends
pub async fn watch_blocks<P, C>(provider: Arc<P>, monitor: Arc<Monitor<C>>) -> Result<()>
where
    P: Provider + 'static,
    C: ChainReader,
{
    let sub = provider
        .subscribe_blocks()
        .await
        .context("newHeads subscription failed")?;
    let mut stream = sub.into_stream();
    info!("WS block subscription active");

    while let Some(header) = stream.next().await {
        if !monitor.blocks().publish(header.number) {
            debug!("Skipping duplicate block {}", header.number);
        }
    }

    anyhow::bail!("Block subscription stream ended")
}

/// Forward tracked pools' `LogOperate` events to the monitor
pub async fn watch_operations<P, C>(
    provider: Arc<P>,
    monitor: Arc<Monitor<C>>,
    liquidity_layer: Address,
) -> Result<()>
where
    P: Provider + 'static,
    C: ChainReader,
{
    let Some(filter) = operate_filter(liquidity_layer, monitor.pools()) else {
        warn!("No pools to match, LogOperate listener not started");
        return Ok(());
    };
    let sub = provider
        .subscribe_logs(&filter)
        .await
        .context("LogOperate subscription failed")?;
    let mut stream = sub.into_stream();
    info!(
        "LogOperate listener active at {:?} ({} pools)",
        liquidity_layer,
        monitor.pools().len()
    );

    while let Some(log) = stream.next().await {
        if let Some(op) = decode_operate_log(&log) {
            monitor.handle_event(PoolEvent::Operation(op));
        }
    }

    anyhow::bail!("LogOperate stream ended")
}

/// Forward every log of one pool to the monitor
pub async fn watch_pool<P, C>(provider: Arc<P>, monitor: Arc<Monitor<C>>, pool: Pool) -> Result<()>
where
    P: Provider + 'static,
    C: ChainReader,
{
    let filter = Filter::new().address(pool.address);
    let sub = provider
        .subscribe_logs(&filter)
        .await
        .with_context(|| format!("Log subscription failed for {}", pool.pair))?;
    let mut stream = sub.into_stream();
    info!("Event listener active for {}", pool);

    while let Some(log) = stream.next().await {
        monitor.handle_event(decode_pool_log(&log));
    }

    anyhow::bail!("Event stream ended for {}", pool.pair)
}

/// Spawn the LogOperate task and one task per pool. Failures are logged per task.
/// Without pools nothing is spawned.
pub fn spawn_event_listeners<P, C>(
    provider: Arc<P>,
    monitor: Arc<Monitor<C>>,
    liquidity_layer: Address,
) -> Vec<JoinHandle<()>>
where
    P: Provider + 'static,
    C: ChainReader,
{
    let mut handles = Vec::with_capacity(monitor.pools().len() + 1);
    if monitor.pools().is_empty() {
        warn!("No pools discovered, event listeners not started");
        return handles;
    }

    {
        let provider = Arc::clone(&provider);
        let monitor = Arc::clone(&monitor);
        handles.push(tokio::spawn(async move {
            if let Err(e) = watch_operations(provider, monitor, liquidity_layer).await {
                error!("LogOperate listener stopped: {:#}", e);
            }
        }));
    }

    for pool in monitor.pools().iter().cloned() {
        let provider = Arc::clone(&provider);
        let monitor = Arc::clone(&monitor);
        handles.push(tokio::spawn(async move {
            let pair = pool.pair.clone();
            if let Err(e) = watch_pool(provider, monitor, pool).await {
                warn!("Listener for {} stopped: {:#}", pair, e);
            }
        }));
    }

    handles
}

/// Log each pool's `dexId`. Failures are logged and do not stop startup.
pub async fn verify_pools<C: ChainReader>(chain: &C, pools: &[Pool]) -> usize {
    let mut verified = 0;
    for pool in pools {
        match chain.dex_id(pool.address).await {
            Ok(dex_id) => {
                info!("Verified {} (dexId {})", pool.pair, dex_id);
                verified += 1;
            }
            Err(e) => warn!("Could not verify {}: {:#}", pool.pair, e),
        }
    }
    verified
}
