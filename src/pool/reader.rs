//! Reserve Reader
//!
//! Turns resolver reserves into a tracked-asset price:
//!   price = opposite side imaginary reserve / tracked side imaginary reserve
//! and computes the vault reference price (totalAssets / totalSupply).
//!
//! Read failures never propagate: they are logged and surface as `None`,
//! meaning "price unavailable this cycle".
//!
//! Author: AI-Generated
//! Created: 2026-10-14

use crate::chain::ChainReader;
use crate::pool::calculator::PriceCalculator;
use crate::types::Pool;
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum PriceError {
    #[error("read failed: {0:#}")]
    Read(#[from] anyhow::Error),
    #[error("zero reserve (tracked={tracked}, opposite={opposite})")]
    ZeroReserve { tracked: String, opposite: String },
    #[error("price does not fit fixed-point range")]
    Overflow,
}

pub struct ReserveReader<C> {
    chain: Arc<C>,
}

impl<C> Clone for ReserveReader<C> {
    fn clone(&self) -> Self {
        Self {
            chain: Arc::clone(&self.chain),
        }
    }
}

impl<C: ChainReader> ReserveReader<C> {
    pub fn new(chain: Arc<C>) -> Self {
        Self { chain }
    }

    /// Current tracked-asset price in `pool`, or None if unavailable
    pub async fn get_price(&self, pool: &Pool) -> Option<Decimal> {
        match self.try_price(pool).await {
            Ok(price) => Some(price),
            Err(e) => {
                warn!("Error getting price for {}: {}", pool.pair, e);
                None
            }
        }
    }

    pub async fn try_price(&self, pool: &Pool) -> Result<Decimal, PriceError> {
        let reserves = self.chain.collateral_reserves(pool.address).await?;
        let (tracked, opposite) = reserves.imaginary_for(pool.tracked_is_token0);

        if tracked.is_zero() || opposite.is_zero() {
            return Err(PriceError::ZeroReserve {
                tracked: tracked.to_string(),
                opposite: opposite.to_string(),
            });
        }

        PriceCalculator::ratio(opposite, tracked).ok_or(PriceError::Overflow)
    }

    /// Vault "fair value" of the tracked asset, or None if unavailable
    pub async fn get_reference_price(&self) -> Option<Decimal> {
        match self.try_reference_price().await {
            Ok(price) => Some(price),
            Err(e) => {
                warn!("Error getting reference price: {}", e);
                None
            }
        }
    }

    pub async fn try_reference_price(&self) -> Result<Decimal, PriceError> {
        let accounting = self.chain.vault_accounting().await?;

        if accounting.total_assets.is_zero() || accounting.total_supply.is_zero() {
            return Err(PriceError::ZeroReserve {
                tracked: accounting.total_supply.to_string(),
                opposite: accounting.total_assets.to_string(),
            });
        }

        PriceCalculator::ratio(accounting.total_assets, accounting.total_supply)
            .ok_or(PriceError::Overflow)
    }
}
