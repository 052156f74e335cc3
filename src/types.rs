// Core data structures shared by discovery, pricing and the monitor loop

use alloy::primitives::{Address, B256, I256, U256};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

/// A Fluid DEX pool that has the tracked asset on one side.
/// Built once during discovery, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pool {
    pub address: Address,
    pub token0: Address,
    pub token1: Address,
    pub symbol0: String,
    pub symbol1: String,
    pub token0_decimals: u8,
    pub token1_decimals: u8,
    /// True when token0 is the tracked asset
    pub tracked_is_token0: bool,
    /// Human-readable label, tracked side kept in its on-chain position (e.g. "sUSDe/USDT")
    pub pair: String,
}

impl Pool {
    /// Build the pair label the way the CSV columns expect it
    pub fn pair_label(symbol0: &str, symbol1: &str) -> String {
        format!("{}/{}", symbol0, symbol1)
    }

    pub fn tracked_token(&self) -> Address {
        if self.tracked_is_token0 {
            self.token0
        } else {
            self.token1
        }
    }

    pub fn other_token(&self) -> Address {
        if self.tracked_is_token0 {
            self.token1
        } else {
            self.token0
        }
    }

    /// Decimals of `token` if it is one of this pool's two sides
    pub fn decimals_of(&self, token: Address) -> Option<u8> {
        if token == self.token0 {
            Some(self.token0_decimals)
        } else if token == self.token1 {
            Some(self.token1_decimals)
        } else {
            None
        }
    }
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({:?})", self.pair, self.address)
    }
}

/// Collateral reserves for a pool at one point in time.
/// Imaginary reserves are the curve-adjusted values used for pricing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReserveSnapshot {
    pub token0_real: U256,
    pub token1_real: U256,
    pub token0_imaginary: U256,
    pub token1_imaginary: U256,
}

impl ReserveSnapshot {
    /// (tracked side, opposite side) imaginary reserves
    pub fn imaginary_for(&self, tracked_is_token0: bool) -> (U256, U256) {
        if tracked_is_token0 {
            (self.token0_imaginary, self.token1_imaginary)
        } else {
            (self.token1_imaginary, self.token0_imaginary)
        }
    }
}

/// Why a price check was performed. Governs the significance threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerContext {
    Periodic,
    Immediate,
    NextBlock,
    PoolEvent,
    Deposit,
    Withdraw,
    TimeoutFallback,
    Initial,
    Manual,
}

impl TriggerContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerContext::Periodic => "periodic",
            TriggerContext::Immediate => "immediate",
            TriggerContext::NextBlock => "next-block",
            TriggerContext::PoolEvent => "pool-event",
            TriggerContext::Deposit => "deposit",
            TriggerContext::Withdraw => "withdraw",
            TriggerContext::TimeoutFallback => "timeout-fallback",
            TriggerContext::Initial => "initial",
            TriggerContext::Manual => "manual",
        }
    }

    pub fn is_periodic(&self) -> bool {
        matches!(self, TriggerContext::Periodic)
    }
}

impl fmt::Display for TriggerContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `event_type` column of a CSV record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Startup,
    Periodic,
    SwapImmediate,
    SwapNextBlock,
    TimeoutFallback,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Startup => "startup",
            RecordKind::Periodic => "periodic",
            RecordKind::SwapImmediate => "swap-immediate",
            RecordKind::SwapNextBlock => "swap-next-block",
            RecordKind::TimeoutFallback => "timeout-fallback",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "startup" => Ok(RecordKind::Startup),
            "periodic" => Ok(RecordKind::Periodic),
            "swap-immediate" => Ok(RecordKind::SwapImmediate),
            "swap-next-block" => Ok(RecordKind::SwapNextBlock),
            "timeout-fallback" => Ok(RecordKind::TimeoutFallback),
            other => anyhow::bail!("Unknown record kind: '{}'", other),
        }
    }
}

/// One successful price read for a pool
#[derive(Debug, Clone, PartialEq)]
pub struct PriceObservation {
    pub pool: Address,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
    pub context: TriggerContext,
}

/// Balance-changing action reported by the liquidity layer (`LogOperate`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationEvent {
    /// Acting contract; equals the pool address for DEX operations
    pub user: Address,
    pub token: Address,
    pub supply_amount: I256,
    pub borrow_amount: I256,
    pub block_number: u64,
    pub tx_hash: Option<B256>,
}

/// Pool `Swap` event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapEvent {
    pub pool: Address,
    pub user: Address,
    pub swap0to1: bool,
    pub amount_in: U256,
    pub amount_out: U256,
    pub to: Address,
    pub block_number: Option<u64>,
    pub tx_hash: Option<B256>,
}

/// Pool `Deposit` / `Withdraw` event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidityEvent {
    pub pool: Address,
    pub user: Address,
    pub shares: U256,
    pub token0_amount: U256,
    pub token1_amount: U256,
    pub block_number: Option<u64>,
    pub tx_hash: Option<B256>,
}

/// Every on-chain event the monitor reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    Swap(SwapEvent),
    Deposit(LiquidityEvent),
    Withdraw(LiquidityEvent),
    Operation(OperationEvent),
    /// Unrecognised pool log, logged only
    Other {
        pool: Address,
        topic0: Option<B256>,
        tx_hash: Option<B256>,
    },
}

impl PoolEvent {
    /// Address of the pool this event concerns
    pub fn pool(&self) -> Address {
        match self {
            PoolEvent::Swap(e) => e.pool,
            PoolEvent::Deposit(e) | PoolEvent::Withdraw(e) => e.pool,
            PoolEvent::Operation(e) => e.user,
            PoolEvent::Other { pool, .. } => *pool,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PoolEvent::Swap(_) => "Swap",
            PoolEvent::Deposit(_) => "Deposit",
            PoolEvent::Withdraw(_) => "Withdraw",
            PoolEvent::Operation(_) => "LogOperate",
            PoolEvent::Other { .. } => "Other",
        }
    }
}
