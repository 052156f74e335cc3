//! Read-only chain access
//!
//! `ChainReader` is the only surface the pricing pipeline needs from the node:
//! typed contract calls against the Fluid reserves resolver, pool contracts,
//! token contracts and the tracked asset's vault. `RpcChainReader` implements
//! it over any alloy `Provider`; tests use an in-memory mock.
//!
//! Author: AI-Generated
//! Created: 2026-10-14

use crate::contracts::{IDexReservesResolver, IERC20, IERC4626, IFluidDexT1};
use crate::types::ReserveSnapshot;
use alloy::primitives::{Address, U256};
use alloy::providers::Provider;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Vault accounting of the tracked asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultAccounting {
    pub total_assets: U256,
    pub total_supply: U256,
}

#[async_trait]
pub trait ChainReader: Send + Sync + 'static {
    /// Every pool registered with the resolver
    async fn pool_addresses(&self) -> Result<Vec<Address>>;

    /// (token0, token1) of a pool
    async fn pool_tokens(&self, pool: Address) -> Result<(Address, Address)>;

    async fn token_symbol(&self, token: Address) -> Result<String>;

    async fn token_decimals(&self, token: Address) -> Result<u8>;

    /// Adjusted collateral reserves (real + imaginary) of a pool
    async fn collateral_reserves(&self, pool: Address) -> Result<ReserveSnapshot>;

    /// totalAssets / totalSupply of the tracked asset
    async fn vault_accounting(&self) -> Result<VaultAccounting>;

    /// Pool's dexId from `constantsView()`, used to verify the contract
    async fn dex_id(&self, pool: Address) -> Result<U256>;

    async fn block_number(&self) -> Result<u64>;
}

/// `ChainReader` backed by alloy RPC calls
pub struct RpcChainReader<P> {
    provider: Arc<P>,
    resolver: Address,
    tracked_asset: Address,
}

impl<P: Provider + 'static> RpcChainReader<P> {
    pub fn new(provider: Arc<P>, resolver: Address, tracked_asset: Address) -> Self {
        Self {
            provider,
            resolver,
            tracked_asset,
        }
    }
}

#[async_trait]
impl<P: Provider + 'static> ChainReader for RpcChainReader<P> {
    async fn pool_addresses(&self) -> Result<Vec<Address>> {
        IDexReservesResolver::new(self.resolver, Arc::clone(&self.provider))
            .getAllPoolAddresses()
            .call()
            .await
            .context("getAllPoolAddresses failed")
    }

    async fn pool_tokens(&self, pool: Address) -> Result<(Address, Address)> {
        let tokens = IDexReservesResolver::new(self.resolver, Arc::clone(&self.provider))
            .getPoolTokens(pool)
            .call()
            .await
            .with_context(|| format!("getPoolTokens failed for {:?}", pool))?;
        Ok((tokens.token0_, tokens.token1_))
    }

    async fn token_symbol(&self, token: Address) -> Result<String> {
        IERC20::new(token, Arc::clone(&self.provider))
            .symbol()
            .call()
            .await
            .with_context(|| format!("symbol() failed for {:?}", token))
    }

    async fn token_decimals(&self, token: Address) -> Result<u8> {
        IERC20::new(token, Arc::clone(&self.provider))
            .decimals()
            .call()
            .await
            .with_context(|| format!("decimals() failed for {:?}", token))
    }

    async fn collateral_reserves(&self, pool: Address) -> Result<ReserveSnapshot> {
        let reserves = IDexReservesResolver::new(self.resolver, Arc::clone(&self.provider))
            .getDexCollateralReservesAdjusted(pool)
            .call()
            .await
            .with_context(|| format!("getDexCollateralReservesAdjusted failed for {:?}", pool))?;

        Ok(ReserveSnapshot {
            token0_real: reserves.token0RealReserves,
            token1_real: reserves.token1RealReserves,
            token0_imaginary: reserves.token0ImaginaryReserves,
            token1_imaginary: reserves.token1ImaginaryReserves,
        })
    }

    async fn vault_accounting(&self) -> Result<VaultAccounting> {
        let vault = IERC4626::new(self.tracked_asset, Arc::clone(&self.provider));
        let assets_call = vault.totalAssets();
        let supply_call = vault.totalSupply();
        let (assets, supply) = tokio::join!(assets_call.call(), supply_call.call());

        Ok(VaultAccounting {
            total_assets: assets.context("totalAssets failed")?,
            total_supply: supply.context("totalSupply failed")?,
        })
    }

    async fn dex_id(&self, pool: Address) -> Result<U256> {
        let constants = IFluidDexT1::new(pool, Arc::clone(&self.provider))
            .constantsView()
            .call()
            .await
            .with_context(|| format!("constantsView failed for {:?}", pool))?;
        Ok(constants.dexId)
    }

    async fn block_number(&self) -> Result<u64> {
        self.provider
            .get_block_number()
            .await
            .context("Failed to get block number")
    }
}
