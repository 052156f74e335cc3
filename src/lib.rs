//! Fluid DEX sUSDe Price Monitor Library
//!
//! Discovers the Fluid DEX pools holding sUSDe, tracks the pool-implied
//! price against the vault's own exchange rate, and correlates liquidity
//! layer operations with immediate and next-block price checks.
//! Every observation is appended to a CSV history.
//!
//! Author: AI-Generated
//! Created: 2026-10-14

pub mod chain;
pub mod config;
pub mod contracts;
pub mod monitor;
pub mod pool;
pub mod price_logger;
pub mod subscriptions;
pub mod types;

// Re-export commonly used types
pub use chain::{ChainReader, RpcChainReader};
pub use config::{MonitorConfig, MonitorSettings};
pub use monitor::Monitor;
pub use pool::{PoolDiscovery, PriceHistory, ReserveReader};
pub use price_logger::{CsvRecord, PriceLogger};
pub use types::{OperationEvent, Pool, PoolEvent, RecordKind, TriggerContext};
