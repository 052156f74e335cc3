//! Pool module for the price monitor
//!
//! Discovery of tracked-asset pools, reserve-based pricing and the
//! in-memory price history.
//!
//! Author: AI-Generated
//! Created: 2026-10-14

pub mod calculator;
pub mod discovery;
pub mod history;
pub mod reader;

pub use calculator::PriceCalculator;
pub use discovery::PoolDiscovery;
pub use history::PriceHistory;
pub use reader::{PriceError, ReserveReader};
