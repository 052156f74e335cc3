//! Observation Recorder
//!
//! Snapshots every tracked pool plus the vault reference price into one CSV
//! row. Unavailable prices become `N/A`; a failed append is logged and the
//! caller carries on.
//!
//! Author: AI-Generated
//! Created: 2026-10-14

use crate::chain::ChainReader;
use crate::config::PriceColumn;
use crate::pool::ReserveReader;
use crate::price_logger::{CsvRecord, PriceLogger};
use crate::types::{Pool, RecordKind};
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

pub struct ObservationRecorder<C> {
    reader: ReserveReader<C>,
    logger: PriceLogger,
    columns: Vec<PriceColumn>,
}

impl<C: ChainReader> ObservationRecorder<C> {
    pub fn new(reader: ReserveReader<C>, logger: PriceLogger, columns: Vec<PriceColumn>) -> Self {
        if columns.len() != logger.price_columns() {
            warn!(
                "{} price columns configured but {} has {}",
                columns.len(),
                logger.path().display(),
                logger.price_columns()
            );
        }
        Self {
            reader,
            logger,
            columns,
        }
    }

    pub fn logger(&self) -> &PriceLogger {
        &self.logger
    }

    /// Append one row for `kind`. Returns the written record, or None if the
    /// append failed (already logged).
    pub async fn record(
        &self,
        pools: &[Pool],
        kind: RecordKind,
        pool_affected: &str,
        notes: &str,
    ) -> Option<CsvRecord> {
        let mut by_pair: HashMap<&str, Option<Decimal>> = HashMap::with_capacity(pools.len());
        for pool in pools {
            let price = self.reader.get_price(pool).await;
            // A failed read never hides a price another pool of the same pair produced
            let slot = by_pair.entry(pool.pair.as_str()).or_insert(None);
            if price.is_some() {
                *slot = price;
            }
        }
        let reference_price = self.reader.get_reference_price().await;

        let prices: Vec<Option<Decimal>> = self
            .columns
            .iter()
            .map(|column| by_pair.get(column.pair.as_str()).copied().flatten())
            .collect();

        for pair in by_pair.keys() {
            if !self.columns.iter().any(|c| c.pair == *pair) {
                debug!("{} has no CSV column, price not recorded", pair);
            }
        }

        let record = CsvRecord::new(
            Utc::now(),
            prices,
            reference_price,
            kind.as_str(),
            pool_affected,
            notes,
        );

        match self.logger.append(&record) {
            Ok(()) => {
                info!("Recorded {} row ({})", kind, pool_affected);
                Some(record)
            }
            Err(e) => {
                error!("Failed to record {} row: {}", kind, e);
                None
            }
        }
    }
}
