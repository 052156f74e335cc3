//! Change Classifier
//!
//! Compares a fresh price with the pool's last known price and bands the move:
//!
//! | trigger      | threshold (exclusive) | below threshold | above threshold |
//! |--------------|-----------------------|-----------------|-----------------|
//! | periodic     | 0.0001%               | Stable          | Changed         |
//! | anything else| 0.001%                | Insignificant   | Impact          |
//!
//! A pool with no history is an `Initial` observation with zero change.
//! History is updated with the new price regardless of the band.
//!
//! Author: AI-Generated
//! Created: 2026-10-14

use crate::pool::{PriceCalculator, PriceHistory};
use crate::types::TriggerContext;
use alloy::primitives::Address;
use rust_decimal::Decimal;

/// Severity band of a price move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeStatus {
    /// First price seen for this pool
    Initial,
    /// Periodic check, no material change
    Stable,
    /// Periodic check, change above the periodic threshold
    Changed,
    /// Event-driven check, change above the event threshold
    Impact,
    /// Event-driven check, change not worth reporting
    Insignificant,
}

impl ChangeStatus {
    /// Whether a status line is emitted for this band
    pub fn is_reported(&self) -> bool {
        !matches!(self, ChangeStatus::Insignificant)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub change_percent: Decimal,
    pub is_significant: bool,
    pub is_first_observation: bool,
    pub status: ChangeStatus,
    pub previous_price: Option<Decimal>,
}

#[derive(Debug, Clone, Copy)]
pub struct ChangeClassifier {
    periodic_threshold: Decimal,
    event_threshold: Decimal,
}

impl ChangeClassifier {
    pub fn new(periodic_threshold: Decimal, event_threshold: Decimal) -> Self {
        Self {
            periodic_threshold,
            event_threshold,
        }
    }

    pub fn threshold_for(&self, context: TriggerContext) -> Decimal {
        if context.is_periodic() {
            self.periodic_threshold
        } else {
            self.event_threshold
        }
    }

    /// Classify `new_price` against history and store it as the latest price
    pub fn classify(
        &self,
        history: &PriceHistory,
        pool: Address,
        new_price: Decimal,
        context: TriggerContext,
    ) -> Classification {
        let previous = history.replace(pool, new_price);
        self.evaluate(previous, new_price, context)
    }

    /// Pure classification given the previous price
    pub fn evaluate(
        &self,
        previous: Option<Decimal>,
        new_price: Decimal,
        context: TriggerContext,
    ) -> Classification {
        let last = match previous {
            Some(last) => last,
            None => {
                return Classification {
                    change_percent: Decimal::ZERO,
                    is_significant: false,
                    is_first_observation: true,
                    status: ChangeStatus::Initial,
                    previous_price: None,
                }
            }
        };

        // History never holds zero, so this only defaults on overflow
        let change_percent = PriceCalculator::change_percent(last, new_price).unwrap_or(Decimal::ZERO);
        let is_significant = change_percent.abs() > self.threshold_for(context);

        let status = match (context.is_periodic(), is_significant) {
            (true, true) => ChangeStatus::Changed,
            (true, false) => ChangeStatus::Stable,
            (false, true) => ChangeStatus::Impact,
            (false, false) => ChangeStatus::Insignificant,
        };

        Classification {
            change_percent,
            is_significant,
            is_first_observation: false,
            status,
            previous_price: Some(last),
        }
    }
}

impl Default for ChangeClassifier {
    fn default() -> Self {
        Self::new(Decimal::new(1, 4), Decimal::new(1, 3))
    }
}
