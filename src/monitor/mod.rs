//! Price monitor
//!
//! `Monitor` owns every piece of runtime state: the discovered pools, the
//! price history, the block feed and the CSV recorder. It is shared behind
//! an `Arc` between the periodic task and the subscription handlers, which
//! only meet through the history store.
//!
//! Author: AI-Generated
//! Created: 2026-10-14
//! Modified: 2026-10-14 - Every pool log gets a pool-event check

pub mod classifier;
pub mod correlator;
pub mod recorder;

pub use classifier::{ChangeClassifier, ChangeStatus, Classification};
pub use correlator::{BlockFeed, CorrelationOutcome, CorrelationState, NextBlockWatch, PriceEvolution};
pub use recorder::ObservationRecorder;

use crate::chain::ChainReader;
use crate::config::MonitorSettings;
use crate::pool::discovery::DEFAULT_DECIMALS;
use crate::pool::{PriceCalculator, PriceHistory, ReserveReader};
use crate::price_logger::{format_fixed, CsvRecord, PriceLogger};
use crate::types::{LiquidityEvent, Pool, PoolEvent, PriceObservation, RecordKind, TriggerContext};
use alloy::primitives::Address;
use chrono::Utc;
use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// `pool_affected` label for rows covering every pool
pub const ALL_POOLS: &str = "both";

/// Schedule of the monitor's timers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub price_check_interval: Duration,
    pub next_block_timeout: Duration,
    pub pool_event_delay: Duration,
    pub liquidity_event_delay: Duration,
}

impl Timing {
    pub fn from_settings(settings: &MonitorSettings) -> Self {
        Self {
            price_check_interval: settings.price_check_interval(),
            next_block_timeout: settings.next_block_timeout(),
            pool_event_delay: settings.pool_event_delay(),
            liquidity_event_delay: settings.liquidity_event_delay(),
        }
    }
}

/// Result of one successful price check
#[derive(Debug, Clone, PartialEq)]
pub struct PriceCheck {
    pub observation: PriceObservation,
    pub price: Decimal,
    pub classification: Classification,
}

pub struct Monitor<C> {
    pools: Vec<Pool>,
    reader: ReserveReader<C>,
    history: PriceHistory,
    classifier: ChangeClassifier,
    recorder: ObservationRecorder<C>,
    blocks: BlockFeed,
    timing: Timing,
    operation_floor: Decimal,
    liquidity_floor: Decimal,
}

impl<C: ChainReader> Monitor<C> {
    pub fn new(
        chain: Arc<C>,
        pools: Vec<Pool>,
        logger: PriceLogger,
        settings: &MonitorSettings,
        initial_block: u64,
    ) -> Self {
        let reader = ReserveReader::new(chain);
        Self {
            recorder: ObservationRecorder::new(reader.clone(), logger, settings.price_columns.clone()),
            reader,
            pools,
            history: PriceHistory::new(),
            classifier: ChangeClassifier::new(
                settings.periodic_threshold_percent,
                settings.event_threshold_percent,
            ),
            blocks: BlockFeed::new(initial_block),
            timing: Timing::from_settings(settings),
            operation_floor: settings.operation_floor,
            liquidity_floor: settings.liquidity_floor,
        }
    }

    /// Override the timers (shorter waits in tests)
    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    pub fn pools(&self) -> &[Pool] {
        &self.pools
    }

    pub fn pool_by_address(&self, address: Address) -> Option<&Pool> {
        self.pools.iter().find(|p| p.address == address)
    }

    pub fn history(&self) -> &PriceHistory {
        &self.history
    }

    pub fn blocks(&self) -> &BlockFeed {
        &self.blocks
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    /// Read, classify and report the current price of `pool`.
    /// None when the price is unavailable; history is then left untouched.
    pub async fn check_price_impact(&self, pool: &Pool, context: TriggerContext) -> Option<PriceCheck> {
        let price = match self.reader.get_price(pool).await {
            Some(price) => price,
            None => {
                warn!("Failed to get price for {} ({})", pool.pair, context);
                return None;
            }
        };

        let classification = self.classifier.classify(&self.history, pool.address, price, context);
        let change = classification.change_percent;

        match classification.status {
            ChangeStatus::Initial => {
                info!("INITIAL {} price: {} [{}]", pool.pair, format_fixed(price, 6), context);
                info!("   Pool: {:?}", pool.address);
            }
            ChangeStatus::Stable => {
                info!("STABLE {}: {} (no change)", pool.pair, format_fixed(price, 6));
            }
            ChangeStatus::Changed => {
                info!(
                    "PRICE CHANGE {} ({}): {} ({}%)",
                    pool.pair,
                    context,
                    format_fixed(price, 6),
                    signed(change, 6)
                );
                info!("   Pool: {:?}", pool.address);
            }
            ChangeStatus::Impact => {
                info!(
                    "PRICE IMPACT {} ({}): {} ({}%)",
                    pool.pair,
                    context,
                    format_fixed(price, 6),
                    signed(change, 4)
                );
                info!("   Pool: {:?}", pool.address);
            }
            ChangeStatus::Insignificant => {
                debug!(
                    "{} ({}): {}, change {}% below threshold",
                    pool.pair,
                    context,
                    format_fixed(price, 6),
                    format_fixed(change, 6)
                );
            }
        }

        Some(PriceCheck {
            observation: PriceObservation {
                pool: pool.address,
                price,
                timestamp: Utc::now(),
                context,
            },
            price,
            classification,
        })
    }

    /// Append a snapshot row of every pool
    pub async fn record(&self, kind: RecordKind, pool_affected: &str, notes: &str) -> Option<CsvRecord> {
        self.recorder.record(&self.pools, kind, pool_affected, notes).await
    }

    /// Initial check of every pool followed by the startup row
    pub async fn startup(&self) -> Option<CsvRecord> {
        if self.pools.is_empty() {
            warn!("No pools to monitor; recording reference price only");
        }
        for pool in &self.pools {
            self.check_price_impact(pool, TriggerContext::Initial).await;
        }
        self.record(RecordKind::Startup, ALL_POOLS, "Monitor started - initial prices")
            .await
    }

    /// One scheduled pass: every pool in turn, then the periodic row
    pub async fn periodic_cycle(&self) -> Vec<Option<PriceCheck>> {
        debug!("Periodic price check ({} pools)", self.pools.len());
        let mut checks = Vec::with_capacity(self.pools.len());
        for pool in &self.pools {
            checks.push(self.check_price_impact(pool, TriggerContext::Periodic).await);
        }
        self.record(RecordKind::Periodic, ALL_POOLS, "Scheduled periodic check")
            .await;
        checks
    }

    /// Periodic loop; runs until the task is aborted
    pub async fn run_periodic(self: Arc<Self>) {
        let mut ticker = interval(self.timing.price_check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Skip the first immediate tick; startup already checked every pool
        ticker.tick().await;

        loop {
            ticker.tick().await;
            self.periodic_cycle().await;
        }
    }

    /// Dispatch one decoded event. Returns the spawned follow-up tasks.
    ///
    /// Every log of a tracked pool gets a delayed `pool-event` check. Large
    /// Deposit/Withdraw events add their own `deposit`/`withdraw` check.
    pub fn handle_event(self: &Arc<Self>, event: PoolEvent) -> Vec<JoinHandle<()>> {
        match event {
            PoolEvent::Operation(op) => {
                let pool = match self.pool_by_address(op.user) {
                    Some(pool) => pool.clone(),
                    None => {
                        debug!("LogOperate from untracked user {:?}", op.user);
                        return Vec::new();
                    }
                };

                let decimals = pool.decimals_of(op.token).unwrap_or(DEFAULT_DECIMALS);
                if !correlator::is_material(&op, decimals, self.operation_floor) {
                    debug!(
                        "Small operation on {} (supply={}, borrow={}), skipped",
                        pool.pair, op.supply_amount, op.borrow_amount
                    );
                    return Vec::new();
                }

                info!(
                    "SWAP DETECTED on {} at block {} (tx {:?})",
                    pool.pair, op.block_number, op.tx_hash
                );
                let monitor = Arc::clone(self);
                vec![tokio::spawn(async move {
                    monitor.correlate(&pool, &op).await;
                })]
            }
            PoolEvent::Swap(swap) => {
                let Some(pool) = self.pool_by_address(swap.pool).cloned() else {
                    return Vec::new();
                };
                info!(
                    "Swap event on {} (0to1={}, in={}, out={}, block {:?})",
                    pool.pair, swap.swap0to1, swap.amount_in, swap.amount_out, swap.block_number
                );
                vec![self.spawn_pool_event_check(pool)]
            }
            PoolEvent::Deposit(event) => self.handle_liquidity(event, TriggerContext::Deposit),
            PoolEvent::Withdraw(event) => self.handle_liquidity(event, TriggerContext::Withdraw),
            PoolEvent::Other { pool, topic0, tx_hash } => {
                let Some(pool) = self.pool_by_address(pool).cloned() else {
                    debug!("Event from unknown contract {:?} (topic0={:?})", pool, topic0);
                    return Vec::new();
                };
                debug!("Unrecognized event on {} (topic0={:?}, tx={:?})", pool.pair, topic0, tx_hash);
                vec![self.spawn_pool_event_check(pool)]
            }
        }
    }

    fn handle_liquidity(self: &Arc<Self>, event: LiquidityEvent, context: TriggerContext) -> Vec<JoinHandle<()>> {
        let Some(pool) = self.pool_by_address(event.pool).cloned() else {
            return Vec::new();
        };
        let mut handles = vec![self.spawn_pool_event_check(pool.clone())];

        let amount0 = PriceCalculator::token_amount(event.token0_amount, pool.token0_decimals);
        let amount1 = PriceCalculator::token_amount(event.token1_amount, pool.token1_decimals);

        let floor = self.liquidity_floor;
        let large = [amount0, amount1]
            .iter()
            .any(|amount| amount.map_or(true, |a| a > floor));
        if !large {
            debug!("Small {} on {}, pool-event check only", context, pool.pair);
            return handles;
        }

        info!(
            "LARGE {} on {}: {} {} + {} {}",
            context.as_str().to_uppercase(),
            pool.pair,
            amount_or_raw(amount0, event.token0_amount),
            pool.symbol0,
            amount_or_raw(amount1, event.token1_amount),
            pool.symbol1
        );
        handles.push(self.spawn_delayed_check(pool, context, self.timing.liquidity_event_delay));
        handles
    }

    fn spawn_pool_event_check(self: &Arc<Self>, pool: Pool) -> JoinHandle<()> {
        self.spawn_delayed_check(pool, TriggerContext::PoolEvent, self.timing.pool_event_delay)
    }

    fn spawn_delayed_check(self: &Arc<Self>, pool: Pool, context: TriggerContext, delay: Duration) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            monitor.check_price_impact(&pool, context).await;
        })
    }
}

/// Percent with an explicit sign for positive moves
fn signed(value: Decimal, dp: u32) -> String {
    let rounded = value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
    if rounded > Decimal::ZERO {
        format!("+{}", format_fixed(rounded, dp))
    } else {
        format_fixed(rounded, dp)
    }
}

fn amount_or_raw(amount: Option<Decimal>, raw: alloy::primitives::U256) -> String {
    match amount {
        Some(a) => format_fixed(a, 2),
        None => raw.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::chain::mock::MockChain;
    use crate::pool::PoolDiscovery;
    use crate::types::{LiquidityEvent, OperationEvent, SwapEvent};
    use alloy::primitives::{I256, U256};
    use rust_decimal_macros::dec;
    use std::fs;
    use std::path::PathBuf;

    pub(crate) const TRACKED: Address = Address::repeat_byte(0x5e);
    pub(crate) const USDT: Address = Address::repeat_byte(0x07);
    pub(crate) const GHO: Address = Address::repeat_byte(0x06);
    pub(crate) const USDT_POOL: Address = Address::repeat_byte(0xa1);
    pub(crate) const GHO_POOL: Address = Address::repeat_byte(0xa2);

    pub(crate) struct Scenario {
        pub monitor: Arc<Monitor<MockChain>>,
        pub chain: Arc<MockChain>,
        pub csv_path: PathBuf,
        _dir: tempfile::TempDir,
    }

    /// Two discovered pools, `sUSDe/USDT` at 1.05 and `GHO/sUSDe` at 0.98,
    /// reference price 1.18, block 100.
    pub(crate) async fn scenario(next_block_timeout: Duration) -> Scenario {
        let chain = Arc::new(MockChain::new());
        chain.add_pool(USDT_POOL, TRACKED, USDT, 100, 105);
        chain.add_pool(GHO_POOL, GHO, TRACKED, 98, 100);
        chain.set_symbol(USDT, "USDT");
        chain.set_symbol(GHO, "GHO");
        chain.set_vault(118, 100);
        chain.set_block(100);

        let pools = PoolDiscovery::new(chain.as_ref(), TRACKED, "sUSDe")
            .discover()
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("susde_price_history.csv");
        let settings = MonitorSettings::default();
        let logger = PriceLogger::new(&csv_path, &settings.csv_headers()).unwrap();

        let timing = Timing {
            next_block_timeout,
            pool_event_delay: Duration::from_millis(1),
            liquidity_event_delay: Duration::from_millis(1),
            ..Timing::from_settings(&settings)
        };
        let monitor = Monitor::new(Arc::clone(&chain), pools, logger, &settings, 100).with_timing(timing);

        Scenario {
            monitor: Arc::new(monitor),
            chain,
            csv_path,
            _dir: dir,
        }
    }

    fn rows(path: &PathBuf) -> Vec<CsvRecord> {
        let columns = MonitorSettings::default().price_columns.len();
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .skip(1)
            .map(|l| CsvRecord::parse_line(l, columns).unwrap())
            .collect()
    }

    async fn join_all(handles: Vec<JoinHandle<()>>) {
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_startup_then_periodic_with_unchanged_reserves() {
        let s = scenario(Duration::from_secs(1)).await;

        let startup = s.monitor.startup().await.unwrap();
        assert_eq!(startup.prices, vec![Some(dec!(1.05)), Some(dec!(0.98))]);
        assert_eq!(startup.event_type, "startup");
        assert_eq!(s.monitor.history().get(USDT_POOL), Some(dec!(1.05)));
        assert_eq!(s.monitor.history().get(GHO_POOL), Some(dec!(0.98)));

        let checks = s.monitor.periodic_cycle().await;
        for check in &checks {
            let c = check.as_ref().unwrap().classification;
            assert!(!c.is_significant);
            assert!(!c.is_first_observation);
            assert_eq!(c.status, ChangeStatus::Stable);
        }

        let rows = rows(&s.csv_path);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].pool_affected, "both");
        assert_eq!(rows[0].notes, "Monitor started - initial prices");
        assert_eq!(rows[1].event_type, "periodic");
        assert_eq!(rows[1].notes, "Scheduled periodic check");
        assert_eq!(rows[1].prices, rows[0].prices);
        assert_eq!(rows[1].reference_price, Some(dec!(1.18)));
    }

    #[tokio::test]
    async fn test_zero_reserve_leaves_history_untouched() {
        let s = scenario(Duration::from_secs(1)).await;
        s.monitor.startup().await;

        s.chain.set_reserves(USDT_POOL, 0, 105);
        let pool = s.monitor.pool_by_address(USDT_POOL).unwrap().clone();
        assert!(s.monitor.check_price_impact(&pool, TriggerContext::Periodic).await.is_none());
        assert_eq!(s.monitor.history().get(USDT_POOL), Some(dec!(1.05)));
    }

    #[tokio::test]
    async fn test_recorded_change_matches_formula() {
        let s = scenario(Duration::from_secs(1)).await;
        let pool = s.monitor.pool_by_address(USDT_POOL).unwrap().clone();
        s.monitor.check_price_impact(&pool, TriggerContext::Initial).await;

        s.chain.set_reserves(USDT_POOL, 100, 107);
        let check = s.monitor.check_price_impact(&pool, TriggerContext::Periodic).await.unwrap();
        // (1.07 - 1.05) / 1.05 * 100
        let expected = (dec!(1.07) - dec!(1.05)) / dec!(1.05) * dec!(100);
        assert_eq!(check.classification.change_percent, expected);
        assert_eq!(check.classification.status, ChangeStatus::Changed);
        assert_eq!(check.observation.context, TriggerContext::Periodic);
        assert_eq!(s.monitor.history().get(USDT_POOL), Some(dec!(1.07)));
    }

    #[tokio::test]
    async fn test_no_pools_still_records_reference_price() {
        let chain = Arc::new(MockChain::new());
        chain.set_vault(118, 100);
        let dir = tempfile::tempdir().unwrap();
        let settings = MonitorSettings::default();
        let logger = PriceLogger::new(dir.path().join("p.csv"), &settings.csv_headers()).unwrap();
        let monitor = Monitor::new(chain, Vec::new(), logger, &settings, 1);

        let record = monitor.startup().await.unwrap();
        assert_eq!(record.prices, vec![None, None]);
        assert_eq!(record.reference_price, Some(dec!(1.18)));
    }

    fn operation(user: Address, supply: i128, borrow: i128) -> PoolEvent {
        PoolEvent::Operation(OperationEvent {
            user,
            token: TRACKED,
            supply_amount: I256::try_from(supply).unwrap(),
            borrow_amount: I256::try_from(borrow).unwrap(),
            block_number: 100,
            tx_hash: None,
        })
    }

    #[tokio::test]
    async fn test_small_operation_creates_no_correlation() {
        let s = scenario(Duration::from_millis(20)).await;
        let half_cent: i128 = 5_000_000_000_000_000;

        assert!(s.monitor.handle_event(operation(USDT_POOL, half_cent, -half_cent)).is_empty());
        assert_eq!(s.chain.reserve_reads(), 0);
        assert!(rows(&s.csv_path).is_empty());
    }

    #[tokio::test]
    async fn test_operation_from_untracked_user_ignored() {
        let s = scenario(Duration::from_millis(20)).await;
        let event = operation(Address::repeat_byte(0xee), 10i128.pow(20), 0);
        assert!(s.monitor.handle_event(event).is_empty());
    }

    #[tokio::test]
    async fn test_material_operation_yields_two_rows() {
        let s = scenario(Duration::from_millis(20)).await;
        let handles = s.monitor.handle_event(operation(GHO_POOL, 10i128.pow(19), 0));
        assert_eq!(handles.len(), 1);
        join_all(handles).await;

        let kinds: Vec<String> = rows(&s.csv_path).into_iter().map(|r| r.event_type).collect();
        assert_eq!(kinds, vec!["swap-immediate", "timeout-fallback"]);
    }

    #[tokio::test]
    async fn test_swap_event_triggers_pool_event_check() {
        let s = scenario(Duration::from_secs(1)).await;
        let event = PoolEvent::Swap(SwapEvent {
            pool: USDT_POOL,
            user: Address::repeat_byte(0x01),
            swap0to1: true,
            amount_in: U256::from(1u64),
            amount_out: U256::from(1u64),
            to: Address::repeat_byte(0x01),
            block_number: Some(100),
            tx_hash: None,
        });

        let handles = s.monitor.handle_event(event);
        assert_eq!(handles.len(), 1);
        join_all(handles).await;
        assert_eq!(s.monitor.history().get(USDT_POOL), Some(dec!(1.05)));
        // Pool-event checks do not write rows
        assert!(rows(&s.csv_path).is_empty());
    }

    fn liquidity(token0_units: u128, token1_units: u128) -> LiquidityEvent {
        let e18 = U256::from(10u64).pow(U256::from(18u64));
        LiquidityEvent {
            pool: GHO_POOL,
            user: Address::repeat_byte(0x01),
            shares: U256::from(1u64),
            token0_amount: U256::from(token0_units) * e18,
            token1_amount: U256::from(token1_units) * e18,
            block_number: Some(100),
            tx_hash: None,
        }
    }

    #[tokio::test]
    async fn test_small_liquidity_gets_pool_event_check_only() {
        let s = scenario(Duration::from_secs(1)).await;

        let handles = s.monitor.handle_event(PoolEvent::Deposit(liquidity(10_000, 5)));
        assert_eq!(handles.len(), 1);
        join_all(handles).await;
        assert_eq!(s.chain.reserve_reads(), 1);
        assert_eq!(s.monitor.history().get(GHO_POOL), Some(dec!(0.98)));
    }

    #[tokio::test]
    async fn test_large_liquidity_adds_its_own_check() {
        let s = scenario(Duration::from_secs(1)).await;

        let handles = s.monitor.handle_event(PoolEvent::Withdraw(liquidity(3, 10_001)));
        assert_eq!(handles.len(), 2);
        join_all(handles).await;
        assert_eq!(s.chain.reserve_reads(), 2);
        assert_eq!(s.monitor.history().get(GHO_POOL), Some(dec!(0.98)));
        // Liquidity checks do not write rows
        assert!(rows(&s.csv_path).is_empty());
    }

    #[tokio::test]
    async fn test_unrecognized_pool_log_gets_pool_event_check() {
        let s = scenario(Duration::from_secs(1)).await;
        let event = PoolEvent::Other {
            pool: USDT_POOL,
            topic0: Some(alloy::primitives::B256::repeat_byte(0x99)),
            tx_hash: None,
        };

        let handles = s.monitor.handle_event(event);
        assert_eq!(handles.len(), 1);
        join_all(handles).await;
        assert_eq!(s.chain.reserve_reads(), 1);
        assert_eq!(s.monitor.history().get(USDT_POOL), Some(dec!(1.05)));
    }

    #[tokio::test]
    async fn test_log_from_unknown_contract_ignored() {
        let s = scenario(Duration::from_secs(1)).await;
        let event = PoolEvent::Other {
            pool: Address::repeat_byte(0xee),
            topic0: None,
            tx_hash: None,
        };
        assert!(s.monitor.handle_event(event).is_empty());
        assert_eq!(s.chain.reserve_reads(), 0);
    }

    #[test]
    fn test_signed_percent() {
        assert_eq!(signed(dec!(0.5), 4), "+0.5000");
        assert_eq!(signed(dec!(-0.25), 4), "-0.2500");
        assert_eq!(signed(Decimal::ZERO, 6), "0.000000");
        assert_eq!(signed(dec!(0.00005), 4), "+0.0001");
        assert_eq!(signed(dec!(-1.23455), 4), "-1.2346");
    }
}
