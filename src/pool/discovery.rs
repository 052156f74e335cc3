//! Pool Discovery
//!
//! Enumerates every pool registered with the reserves resolver and keeps the
//! ones with the tracked asset on either side. Each kept pool gets the other
//! side's symbol and both sides' decimals.
//!
//! Lookup policy:
//! - token pair lookup fails → pool skipped, discovery continues
//! - symbol lookup fails → "Unknown"
//! - decimals lookup fails → 18
//!
//! Author: AI-Generated
//! Created: 2026-10-14

use crate::chain::ChainReader;
use crate::types::Pool;
use alloy::primitives::Address;
use anyhow::{Context, Result};
use tracing::{debug, info, warn};

/// Symbol used when a token's `symbol()` call fails
pub const UNKNOWN_SYMBOL: &str = "Unknown";

/// Decimals assumed when a token's `decimals()` call fails
pub const DEFAULT_DECIMALS: u8 = 18;

pub struct PoolDiscovery<'a, C> {
    chain: &'a C,
    tracked_asset: Address,
    tracked_symbol: String,
}

impl<'a, C: ChainReader> PoolDiscovery<'a, C> {
    pub fn new(chain: &'a C, tracked_asset: Address, tracked_symbol: &str) -> Self {
        Self {
            chain,
            tracked_asset,
            tracked_symbol: tracked_symbol.to_string(),
        }
    }

    /// Discover all pools containing the tracked asset.
    /// Fails only if the registry itself cannot be read.
    pub async fn discover(&self) -> Result<Vec<Pool>> {
        info!("Discovering {} pools...", self.tracked_symbol);

        let all_pools = self
            .chain
            .pool_addresses()
            .await
            .context("Pool discovery: failed to list pools")?;
        debug!("Resolver lists {} pools", all_pools.len());

        let mut pools = Vec::new();
        for pool_address in all_pools {
            let (token0, token1) = match self.chain.pool_tokens(pool_address).await {
                Ok(tokens) => tokens,
                Err(e) => {
                    debug!("Skipping unreadable pool {:?}: {:#}", pool_address, e);
                    continue;
                }
            };

            let tracked_is_token0 = token0 == self.tracked_asset;
            if !tracked_is_token0 && token1 != self.tracked_asset {
                continue;
            }

            let pool = self.enrich(pool_address, token0, token1, tracked_is_token0).await;
            info!("Found {} pool: {} ({:?})", self.tracked_symbol, pool.pair, pool.address);
            pools.push(pool);
        }

        Ok(pools)
    }

    async fn enrich(
        &self,
        address: Address,
        token0: Address,
        token1: Address,
        tracked_is_token0: bool,
    ) -> Pool {
        let other = if tracked_is_token0 { token1 } else { token0 };
        let other_symbol = match self.chain.token_symbol(other).await {
            Ok(symbol) => symbol,
            Err(e) => {
                warn!("symbol() failed for {:?}, using '{}': {:#}", other, UNKNOWN_SYMBOL, e);
                UNKNOWN_SYMBOL.to_string()
            }
        };

        let (symbol0, symbol1) = if tracked_is_token0 {
            (self.tracked_symbol.clone(), other_symbol)
        } else {
            (other_symbol, self.tracked_symbol.clone())
        };

        Pool {
            address,
            token0,
            token1,
            pair: Pool::pair_label(&symbol0, &symbol1),
            symbol0,
            symbol1,
            token0_decimals: self.decimals_or_default(token0).await,
            token1_decimals: self.decimals_or_default(token1).await,
            tracked_is_token0,
        }
    }

    async fn decimals_or_default(&self, token: Address) -> u8 {
        match self.chain.token_decimals(token).await {
            Ok(d) => d,
            Err(e) => {
                debug!("decimals() failed for {:?}, assuming {}: {:#}", token, DEFAULT_DECIMALS, e);
                DEFAULT_DECIMALS
            }
        }
    }
}
