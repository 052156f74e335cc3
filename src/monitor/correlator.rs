//! Event Correlator
//!
//! Follows one material `LogOperate` through two price checks:
//!
//! ```text
//!   Detected ──immediate check + record──▶ ImmediateChecked
//!            ──watch next block──────────▶ AwaitingNextBlock
//!            ──block > detection block───▶ Resolved (next-block check + record + evolution)
//!            ──timeout──────────────────▶ Resolved (timeout-fallback check + record)
//! ```
//!
//! New block numbers flow through a `BlockFeed` (a `tokio::sync::watch`
//! holding the highest block seen). Each correlation owns a `NextBlockWatch`
//! receiver; waiting consumes it, so a watch resolves at most once and is
//! dropped on fire, timeout or cancellation without affecting the others.
//!
//! Author: AI-Generated
//! Created: 2026-10-14

use super::Monitor;
use crate::chain::ChainReader;
use crate::pool::PriceCalculator;
use crate::price_logger::format_fixed;
use crate::types::{OperationEvent, Pool, RecordKind, TriggerContext};
use rust_decimal::Decimal;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Latest block number, published by the block subscription
#[derive(Debug)]
pub struct BlockFeed {
    tx: watch::Sender<u64>,
}

impl BlockFeed {
    pub fn new(initial_block: u64) -> Self {
        let (tx, _rx) = watch::channel(initial_block);
        Self { tx }
    }

    /// Publish a block. Returns false (and notifies nobody) unless it is
    /// higher than every block published before, so duplicate or reordered
    /// notifications are no-ops.
    pub fn publish(&self, block: u64) -> bool {
        self.tx.send_if_modified(|latest| {
            if block > *latest {
                *latest = block;
                true
            } else {
                false
            }
        })
    }

    pub fn latest(&self) -> u64 {
        *self.tx.borrow()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// First block strictly after the watched one
    Fired(u64),
    TimedOut,
    /// Block feed dropped
    Closed,
}

/// One-shot wait for the first block after `after`
#[derive(Debug)]
pub struct NextBlockWatch {
    rx: watch::Receiver<u64>,
    after: u64,
}

impl NextBlockWatch {
    pub fn register(feed: &BlockFeed, after: u64) -> Self {
        Self {
            rx: feed.tx.subscribe(),
            after,
        }
    }

    pub fn after(&self) -> u64 {
        self.after
    }

    pub async fn wait(mut self, timeout: Duration) -> WatchOutcome {
        let after = self.after;
        match tokio::time::timeout(timeout, self.rx.wait_for(|block| *block > after)).await {
            Ok(Ok(block)) => WatchOutcome::Fired(*block),
            Ok(Err(_)) => WatchOutcome::Closed,
            Err(_) => WatchOutcome::TimedOut,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationState {
    Detected,
    ImmediateChecked,
    AwaitingNextBlock,
    Resolved,
}

/// Block-to-block price move around an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceEvolution {
    pub immediate: Decimal,
    pub next: Decimal,
    pub diff: Decimal,
    pub diff_percent: Decimal,
}

impl PriceEvolution {
    pub fn between(immediate: Decimal, next: Decimal) -> Self {
        Self {
            immediate,
            next,
            diff: next - immediate,
            diff_percent: PriceCalculator::change_percent(immediate, next).unwrap_or(Decimal::ZERO),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationOutcome {
    pub state: CorrelationState,
    pub immediate_price: Option<Decimal>,
    pub next_block: Option<u64>,
    pub next_price: Option<Decimal>,
    pub evolution: Option<PriceEvolution>,
    /// Row kinds handed to the recorder, in order
    pub records: Vec<RecordKind>,
}

/// Supply and borrow in the operated token's natural unit
pub fn operation_amounts(op: &OperationEvent, decimals: u8) -> (Option<Decimal>, Option<Decimal>) {
    (
        PriceCalculator::signed_token_amount(op.supply_amount, decimals),
        PriceCalculator::signed_token_amount(op.borrow_amount, decimals),
    )
}

/// Whether |supply| or |borrow| exceeds the floor. An amount too large for
/// `Decimal` counts as material.
pub fn is_material(op: &OperationEvent, decimals: u8, floor: Decimal) -> bool {
    let (supply, borrow) = operation_amounts(op, decimals);
    let exceeds = |amount: Option<Decimal>| amount.map_or(true, |a| a.abs() > floor);
    exceeds(supply) || exceeds(borrow)
}

fn swap_note(supply: Option<Decimal>, borrow: Option<Decimal>) -> String {
    let fmt = |amount: Option<Decimal>| match amount {
        Some(a) => format_fixed(a, 2),
        None => "overflow".to_string(),
    };
    format!("Swap detected: {} supply, {} borrow", fmt(supply), fmt(borrow))
}

impl<C: ChainReader> Monitor<C> {
    /// Run the immediate / next-block correlation for one material operation
    pub async fn correlate(&self, pool: &Pool, op: &OperationEvent) -> CorrelationOutcome {
        let mut state = CorrelationState::Detected;
        let mut records = Vec::with_capacity(2);

        // Registered before the immediate check so a block mined meanwhile still fires it
        let watch = NextBlockWatch::register(&self.blocks, op.block_number.max(self.blocks.latest()));
        let detection_block = watch.after();

        let decimals = pool.decimals_of(op.token).unwrap_or(crate::pool::discovery::DEFAULT_DECIMALS);
        let (supply, borrow) = operation_amounts(op, decimals);

        let immediate_price = self
            .check_price_impact(pool, TriggerContext::Immediate)
            .await
            .map(|check| check.price);
        self.record(RecordKind::SwapImmediate, &pool.pair, &swap_note(supply, borrow))
            .await;
        records.push(RecordKind::SwapImmediate);
        state = advance(pool, state, CorrelationState::ImmediateChecked);

        state = advance(pool, state, CorrelationState::AwaitingNextBlock);
        let outcome = watch.wait(self.timing.next_block_timeout).await;

        let (next_block, next_price, evolution) = match outcome {
            WatchOutcome::Fired(block) => {
                let check = self.check_price_impact(pool, TriggerContext::NextBlock).await;
                self.record(
                    RecordKind::SwapNextBlock,
                    &pool.pair,
                    &format!("Post-swap price after block {}", block),
                )
                .await;
                records.push(RecordKind::SwapNextBlock);

                let next_price = check.as_ref().map(|c| c.price);
                let evolution = match (immediate_price, next_price) {
                    (Some(immediate), Some(next)) => Some(PriceEvolution::between(immediate, next)),
                    _ => None,
                };

                match evolution {
                    Some(evo) => {
                        info!("PRICE EVOLUTION {}:", pool.pair);
                        info!("  Immediate:  {}", format_fixed(evo.immediate, 6));
                        info!("  Block {}: {}", block, format_fixed(evo.next, 6));
                        info!(
                            "  Block diff: {} ({}%)",
                            format_fixed(evo.diff, 8),
                            format_fixed(evo.diff_percent, 6)
                        );
                    }
                    None => warn!(
                        "{}: price evolution unavailable (immediate={:?}, next={:?})",
                        pool.pair, immediate_price, next_price
                    ),
                }

                if let Some(c) = check.filter(|c| c.classification.is_significant) {
                    info!(
                        "FINAL PRICE IMPACT {}: {}%",
                        pool.pair,
                        format_fixed(c.classification.change_percent, 6)
                    );
                }

                (Some(block), next_price, evolution)
            }
            WatchOutcome::TimedOut | WatchOutcome::Closed => {
                warn!(
                    "{}: no block after {} within {:?}, falling back",
                    pool.pair, detection_block, self.timing.next_block_timeout
                );
                let check = self
                    .check_price_impact(pool, TriggerContext::TimeoutFallback)
                    .await;
                self.record(
                    RecordKind::TimeoutFallback,
                    &pool.pair,
                    &format!("No block after {} within {:?}", detection_block, self.timing.next_block_timeout),
                )
                .await;
                records.push(RecordKind::TimeoutFallback);

                (None, check.map(|c| c.price), None)
            }
        };
        state = advance(pool, state, CorrelationState::Resolved);

        CorrelationOutcome {
            state,
            immediate_price,
            next_block,
            next_price,
            evolution,
            records,
        }
    }
}

fn advance(pool: &Pool, from: CorrelationState, to: CorrelationState) -> CorrelationState {
    debug!("{} correlation: {:?} -> {:?}", pool.pair, from, to);
    to
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::tests::{scenario, TRACKED};
    use crate::price_logger::CsvRecord;
    use alloy::primitives::{Address, I256};
    use rust_decimal_macros::dec;
    use std::fs;
    use std::sync::Arc;

    fn operation(pool: Address, token: Address, supply: i128, borrow: i128, block: u64) -> OperationEvent {
        OperationEvent {
            user: pool,
            token,
            supply_amount: I256::try_from(supply).unwrap(),
            borrow_amount: I256::try_from(borrow).unwrap(),
            block_number: block,
            tx_hash: None,
        }
    }

    const E18: i128 = 1_000_000_000_000_000_000;

    #[test]
    fn test_materiality_floor() {
        let floor = dec!(0.01);
        let pool = Address::repeat_byte(0xa1);

        // 0.005 / 0.005: below the floor
        let small = operation(pool, TRACKED, 5 * E18 / 1000, -5 * E18 / 1000, 1);
        assert!(!is_material(&small, 18, floor));

        // exactly the floor is not above it
        let at_floor = operation(pool, TRACKED, E18 / 100, 0, 1);
        assert!(!is_material(&at_floor, 18, floor));

        // negative borrow counts by magnitude
        let large = operation(pool, TRACKED, 0, -2 * E18, 1);
        assert!(is_material(&large, 18, floor));

        // 0.02 USDT at 6 decimals
        let usdt = operation(pool, TRACKED, 20_000, 0, 1);
        assert!(is_material(&usdt, 6, floor));
        assert!(!is_material(&usdt, 18, floor));
    }

    #[test]
    fn test_swap_note_format() {
        assert_eq!(
            swap_note(Some(dec!(1.5)), Some(dec!(-2.25))),
            "Swap detected: 1.50 supply, -2.25 borrow"
        );
    }

    #[test]
    fn test_swap_note_rounds_half_away_from_zero() {
        assert_eq!(
            swap_note(Some(dec!(1.005)), Some(dec!(2.675))),
            "Swap detected: 1.01 supply, 2.68 borrow"
        );
        // Just above the 0.01 floor must not print as the floor itself
        assert_eq!(
            swap_note(Some(dec!(0.019)), Some(dec!(-0.006))),
            "Swap detected: 0.02 supply, -0.01 borrow"
        );
        assert_eq!(swap_note(None, Some(Decimal::ZERO)), "Swap detected: overflow supply, 0.00 borrow");
    }

    #[test]
    fn test_price_evolution() {
        let evo = PriceEvolution::between(dec!(1.05), dec!(1.0605));
        assert_eq!(evo.diff, dec!(0.0105));
        assert_eq!(evo.diff_percent, dec!(1));
    }

    #[tokio::test]
    async fn test_block_feed_ignores_duplicates() {
        let feed = BlockFeed::new(100);
        assert!(!feed.publish(100));
        assert!(!feed.publish(99));
        assert!(feed.publish(101));
        assert!(!feed.publish(101));
        assert_eq!(feed.latest(), 101);
    }

    #[tokio::test]
    async fn test_watch_fires_only_after_detection_block() {
        let feed = BlockFeed::new(100);
        let watch = NextBlockWatch::register(&feed, 100);
        let handle = tokio::spawn(watch.wait(Duration::from_secs(5)));

        feed.publish(101);
        assert_eq!(handle.await.unwrap(), WatchOutcome::Fired(101));
    }

    #[tokio::test]
    async fn test_watch_times_out_without_block() {
        let feed = BlockFeed::new(100);
        let watch = NextBlockWatch::register(&feed, 100);
        feed.publish(100);
        assert_eq!(watch.wait(Duration::from_millis(20)).await, WatchOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_watches_are_independent() {
        let feed = BlockFeed::new(100);
        let early = NextBlockWatch::register(&feed, 100);
        let late = NextBlockWatch::register(&feed, 105);
        feed.publish(101);

        assert_eq!(early.wait(Duration::from_millis(50)).await, WatchOutcome::Fired(101));
        assert_eq!(late.wait(Duration::from_millis(20)).await, WatchOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_watch_closed_when_feed_dropped() {
        let feed = BlockFeed::new(1);
        let watch = NextBlockWatch::register(&feed, 1);
        drop(feed);
        assert_eq!(watch.wait(Duration::from_secs(5)).await, WatchOutcome::Closed);
    }

    #[tokio::test]
    async fn test_correlation_normal_path_records_two_rows() {
        let s = scenario(Duration::from_secs(5)).await;
        let monitor = Arc::clone(&s.monitor);
        let pool = monitor.pools()[0].clone();
        monitor.startup().await;

        let op = operation(pool.address, TRACKED, 3 * E18, 0, 100);
        let task = {
            let monitor = Arc::clone(&monitor);
            let pool = pool.clone();
            tokio::spawn(async move { monitor.correlate(&pool, &op).await })
        };

        // Wait for the immediate check and its row (1 + 2 reserve reads)
        let reads_before = s.chain.reserve_reads();
        while s.chain.reserve_reads() < reads_before + 3 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        s.chain.set_reserves(pool.address, 100, 106);
        monitor.blocks().publish(101);
        // Duplicate delivery must not produce extra work
        monitor.blocks().publish(101);

        let outcome = task.await.unwrap();
        assert_eq!(outcome.state, CorrelationState::Resolved);
        assert_eq!(outcome.records, vec![RecordKind::SwapImmediate, RecordKind::SwapNextBlock]);
        assert_eq!(outcome.next_block, Some(101));
        assert_eq!(outcome.immediate_price, Some(dec!(1.05)));
        assert_eq!(outcome.next_price, Some(dec!(1.06)));
        let evo = outcome.evolution.unwrap();
        assert_eq!(evo.diff, dec!(0.01));

        let contents = fs::read_to_string(&s.csv_path).unwrap();
        let rows: Vec<CsvRecord> = contents
            .lines()
            .skip(1)
            .map(|l| CsvRecord::parse_line(l, 2).unwrap())
            .collect();
        let kinds: Vec<&str> = rows.iter().map(|r| r.event_type.as_str()).collect();
        assert_eq!(kinds, vec!["startup", "swap-immediate", "swap-next-block"]);
        assert_eq!(rows[1].pool_affected, pool.pair);
        assert_eq!(rows[1].notes, "Swap detected: 3.00 supply; 0.00 borrow");
        assert_eq!(rows[2].notes, "Post-swap price after block 101");
    }

    #[tokio::test]
    async fn test_correlation_timeout_path() {
        let s = scenario(Duration::from_millis(30)).await;
        let monitor = Arc::clone(&s.monitor);
        let pool = monitor.pools()[1].clone();

        // A log from an older block waits for the first block after the latest seen
        let op = operation(pool.address, TRACKED, 0, -5 * E18, 90);
        let outcome = monitor.correlate(&pool, &op).await;

        assert_eq!(outcome.state, CorrelationState::Resolved);
        assert_eq!(outcome.records, vec![RecordKind::SwapImmediate, RecordKind::TimeoutFallback]);
        assert_eq!(outcome.next_block, None);
        assert_eq!(outcome.evolution, None);
        assert_eq!(outcome.next_price, Some(dec!(0.98)));

        let contents = fs::read_to_string(&s.csv_path).unwrap();
        let rows: Vec<CsvRecord> = contents
            .lines()
            .skip(1)
            .map(|l| CsvRecord::parse_line(l, monitor.recorder.logger().price_columns()).unwrap())
            .collect();
        let kinds: Vec<&str> = rows.iter().map(|r| r.event_type.as_str()).collect();
        assert_eq!(kinds, vec!["swap-immediate", "timeout-fallback"]);
        assert_eq!(rows[1].notes, "No block after 100 within 30ms");
    }

    #[tokio::test]
    async fn test_correlation_missing_immediate_price_skips_evolution() {
        let s = scenario(Duration::from_secs(5)).await;
        let monitor = Arc::clone(&s.monitor);
        let pool = monitor.pools()[0].clone();
        s.chain.remove_reserves(pool.address);

        let op = operation(pool.address, TRACKED, 3 * E18, 0, 100);
        let task = {
            let monitor = Arc::clone(&monitor);
            let pool = pool.clone();
            tokio::spawn(async move { monitor.correlate(&pool, &op).await })
        };

        let reads_before = s.chain.reserve_reads();
        while s.chain.reserve_reads() < reads_before + 3 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        s.chain.set_reserves(pool.address, 100, 105);
        // Re-delivery of the detection block must not fire the watch
        assert!(!monitor.blocks().publish(100));
        monitor.blocks().publish(101);

        let outcome = task.await.unwrap();
        assert_eq!(outcome.immediate_price, None);
        assert_eq!(outcome.next_price, Some(dec!(1.05)));
        assert_eq!(outcome.evolution, None);
        assert_eq!(outcome.next_block, Some(101));
        assert_eq!(outcome.records.len(), 2);
    }
}
