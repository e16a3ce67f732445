//! Money splitting and rating arithmetic.
//!
//! The split between platform fee and technician payout is computed once,
//! at budget time, and stored on the payment record; nothing downstream
//! ever recomputes it.

use serde::{Deserialize, Serialize};

use crate::types::{FeePercent, Money};

/// How a gross payment divides between the platform and the technician.
///
/// Rounding policy: the fee is rounded **half-up at cent precision**, and
/// the technician receives the exact remainder, so
/// `total == platform_fee + tech_receives` holds for every input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSplit {
    /// Gross amount the client pays.
    pub total: Money,
    /// The platform's cut.
    pub platform_fee: Money,
    /// The technician's payout.
    pub tech_receives: Money,
}

impl PaymentSplit {
    /// Computes the split of `total` at the given fee rate.
    #[must_use]
    pub const fn compute(total: Money, pct: FeePercent) -> Self {
        // u128 intermediate so cents * pct cannot overflow.
        let cents = total.as_cents() as u128;
        let fee = (cents * pct.as_u8() as u128 + 50) / 100;
        // fee <= cents because pct <= 100, so both casts and the
        // subtraction are exact.
        #[allow(clippy::cast_possible_truncation)]
        let platform_fee = Money::from_cents(fee as u64);
        let tech_receives = Money::from_cents(total.as_cents() - platform_fee.as_cents());
        Self {
            total,
            platform_fee,
            tech_receives,
        }
    }
}

/// Folds one more score into a technician's running average.
///
/// `new_avg = (old_avg * old_count + score) / (old_count + 1)`, with the
/// stored count incremented alongside.
#[must_use]
pub fn fold_rating(current: Option<f64>, total_ratings: u32, score: u8) -> (f64, u32) {
    let old_avg = current.unwrap_or(0.0);
    let new_count = total_ratings + 1;
    let new_avg = old_avg.mul_add(f64::from(total_ratings), f64::from(score)) / f64::from(new_count);
    (new_avg, new_count)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn standard_rate_on_round_amount() {
        let split = PaymentSplit::compute(Money::from_major(100), FeePercent::STANDARD);
        assert_eq!(split.platform_fee, Money::from_major(20));
        assert_eq!(split.tech_receives, Money::from_major(80));
        assert_eq!(split.total, Money::from_major(100));
    }

    #[test]
    fn fee_rounds_half_up_at_cents() {
        // 33.33 at 15% is 4.9995 -> 5.00 after half-up.
        let split = PaymentSplit::compute(Money::from_cents(3333), FeePercent::new(15).unwrap());
        assert_eq!(split.platform_fee, Money::from_cents(500));
        assert_eq!(split.tech_receives, Money::from_cents(2833));

        // 0.01 at 50% is 0.005 -> 0.01 after half-up; the tech gets nothing.
        let split = PaymentSplit::compute(Money::from_cents(1), FeePercent::new(50).unwrap());
        assert_eq!(split.platform_fee, Money::from_cents(1));
        assert_eq!(split.tech_receives, Money::ZERO);
    }

    #[test]
    fn extreme_rates() {
        let split = PaymentSplit::compute(Money::from_cents(999), FeePercent::new(0).unwrap());
        assert_eq!(split.platform_fee, Money::ZERO);
        assert_eq!(split.tech_receives, Money::from_cents(999));

        let split = PaymentSplit::compute(Money::from_cents(999), FeePercent::new(100).unwrap());
        assert_eq!(split.platform_fee, Money::from_cents(999));
        assert_eq!(split.tech_receives, Money::ZERO);
    }

    #[test]
    fn rating_running_average() {
        let (avg, count) = fold_rating(Some(4.0), 2, 5);
        assert!((avg - 4.333_333).abs() < 1e-5);
        assert_eq!(count, 3);

        let (avg, count) = fold_rating(None, 0, 4);
        assert!((avg - 4.0).abs() < f64::EPSILON);
        assert_eq!(count, 1);
    }

    proptest! {
        #[test]
        fn split_sums_exactly(cents in 0u64..=1_000_000_000_000, pct in 0u8..=100) {
            let total = Money::from_cents(cents);
            let rate = FeePercent::new(pct).unwrap();
            let split = PaymentSplit::compute(total, rate);

            prop_assert_eq!(
                split.platform_fee.checked_add(split.tech_receives),
                Some(total)
            );
            prop_assert!(split.platform_fee <= total);

            // Fee stays within half a cent of the exact product.
            let exact_hundredths = u128::from(cents) * u128::from(pct);
            let fee_hundredths = u128::from(split.platform_fee.as_cents()) * 100;
            let delta = fee_hundredths.abs_diff(exact_hundredths);
            prop_assert!(delta <= 50, "fee {} too far from exact {}", fee_hundredths, exact_hundredths);
        }
    }
}
