//! Fixed-point USD amounts.
//!
//! All monetary values in the core are [`Decimal`] rounded to [`USD_SCALE`]
//! places using banker's rounding (round-half-to-even), per spec §4.1. We
//! don't introduce a newtype wrapper (cf. the teacher's `Amount`) because,
//! unlike satoshis, ledger deltas are signed and the sign itself is
//! meaningful (TOPUP vs USAGE); a type that forbids negative values would
//! fight the domain instead of modeling it.

use rust_decimal::{Decimal, RoundingStrategy};

/// The fixed scale (number of decimal places) used for all persisted USD
/// amounts.
pub const USD_SCALE: u32 = 8;

/// Round `amount` to [`USD_SCALE`] places using round-half-to-even.
pub fn round_usd(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(USD_SCALE, RoundingStrategy::MidpointNearestEven)
}

/// Multiply a unit price by a quantity and round the result to [`USD_SCALE`]
/// places, as used by the usage tracker (spec §4.6 step 2).
pub fn price_times_units(price_per_unit: Decimal, units: Decimal) -> Decimal {
    round_usd(price_per_unit * units)
}

#[cfg(test)]
mod test {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn banker_rounding_rounds_half_to_even() {
        // 0.000000005 at the 9th place rounds to even (0.00000000), not up.
        assert_eq!(round_usd(dec!(0.000000005)), dec!(0.00000000));
        // 0.000000015 rounds to 0.00000002 (nearest even is 2).
        assert_eq!(round_usd(dec!(0.000000015)), dec!(0.00000002));
    }

    #[test]
    fn price_times_units_rounds() {
        let price = dec!(0.00000001);
        let units = dec!(3);
        assert_eq!(price_times_units(price, units), dec!(0.00000003));
    }

    use proptest::prelude::*;

    proptest! {
        /// Rounding never increases scale beyond `USD_SCALE` and is
        /// idempotent -- rounding an already-rounded amount is a no-op
        /// (spec §4.1 "all persisted decimals are exact").
        #[test]
        fn round_usd_is_idempotent(sign in any::<bool>(), mantissa in 0i64..i64::MAX, scale in 0u32..28u32) {
            let signed_mantissa = if sign { -(mantissa as i128) } else { mantissa as i128 };
            let amount = Decimal::from_i128_with_scale(signed_mantissa, scale);
            let once = round_usd(amount);
            prop_assert!(once.scale() <= USD_SCALE);
            prop_assert_eq!(round_usd(once), once);
        }
    }
}
