//! Price History Store
//!
//! Thread-safe last-known price per pool using DashMap.
//! Entries live for the process lifetime; nothing is persisted.
//!
//! Author: AI-Generated
//! Created: 2026-10-14

use alloy::primitives::Address;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

/// Last observed price per pool address
///
/// Cloning shares the underlying map, so the periodic task and event
/// handlers all see the same history.
#[derive(Debug, Clone, Default)]
pub struct PriceHistory {
    prices: Arc<DashMap<Address, Decimal>>,
}

impl PriceHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last known price for a pool
    pub fn get(&self, pool: Address) -> Option<Decimal> {
        self.prices.get(&pool).map(|entry| *entry.value())
    }

    pub fn set(&self, pool: Address, price: Decimal) {
        self.replace(pool, price);
    }

    /// Store `price` and return the previous value in one step.
    /// The shard lock is held across read and write, so concurrent checks of
    /// the same pool never compare against the same stale value twice.
    pub fn replace(&self, pool: Address, price: Decimal) -> Option<Decimal> {
        let previous = self.prices.insert(pool, price);
        debug!("Price history: {:?} {:?} -> {}", pool, previous, price);
        previous
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}
