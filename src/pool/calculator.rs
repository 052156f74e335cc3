//! Fixed-Point Price Calculator
//!
//! Prices are computed in integer fixed point (27 fractional digits) from the
//! raw U256 reserves and only then converted to `Decimal`, so no float
//! rounding enters the pipeline. `Decimal` carries a 96-bit mantissa; when a
//! value does not fit at full scale, trailing fractional digits are dropped
//! until it does.
//!
//! Author: AI-Generated
//! Created: 2026-10-14

use alloy::primitives::{I256, U256};
use rust_decimal::Decimal;

/// Fractional digits of the fixed-point price (1e27 precision)
pub const PRICE_SCALE: u32 = 27;

/// Largest mantissa a `Decimal` can hold (2^96 - 1)
const DECIMAL_MAX_MANTISSA: u128 = (1u128 << 96) - 1;

/// Decimal's maximum scale
const DECIMAL_MAX_SCALE: u32 = 28;

/// Stateless fixed-point helpers
pub struct PriceCalculator;

impl PriceCalculator {
    /// `numerator / denominator` with `PRICE_SCALE` fractional digits.
    /// Returns None when either side is zero or the result cannot be represented.
    pub fn ratio(numerator: U256, denominator: U256) -> Option<Decimal> {
        if numerator.is_zero() || denominator.is_zero() {
            return None;
        }

        let scaled = numerator.checked_mul(U256::from(10u64).pow(U256::from(PRICE_SCALE)))?;
        Self::fixed_to_decimal(scaled / denominator, PRICE_SCALE)
    }

    /// Convert an unsigned fixed-point integer with `scale` fractional digits
    pub fn fixed_to_decimal(raw: U256, scale: u32) -> Option<Decimal> {
        let mut raw = raw;
        let mut scale = scale;
        let ten = U256::from(10u64);
        let max = U256::from(DECIMAL_MAX_MANTISSA);

        // Shed fractional digits until the mantissa fits
        while (raw > max || scale > DECIMAL_MAX_SCALE) && scale > 0 {
            raw /= ten;
            scale -= 1;
        }
        if raw > max {
            return None;
        }

        let mantissa = u128::try_from(raw).ok()?;
        Decimal::try_from_i128_with_scale(mantissa as i128, scale)
            .ok()
            .map(|d| d.normalize())
    }

    /// Token amount in its natural unit (e.g. wei → ether for 18 decimals)
    pub fn token_amount(raw: U256, decimals: u8) -> Option<Decimal> {
        Self::fixed_to_decimal(raw, decimals as u32)
    }

    /// Signed token amount in its natural unit
    pub fn signed_token_amount(raw: I256, decimals: u8) -> Option<Decimal> {
        let magnitude = Self::token_amount(raw.unsigned_abs(), decimals)?;
        if raw.is_negative() {
            Some(-magnitude)
        } else {
            Some(magnitude)
        }
    }

    /// `(new - old) / old * 100`. None when `old` is zero.
    pub fn change_percent(old: Decimal, new: Decimal) -> Option<Decimal> {
        if old.is_zero() {
            return None;
        }
        (new - old)
            .checked_div(old)?
            .checked_mul(Decimal::ONE_HUNDRED)
    }
}
