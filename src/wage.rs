//! Wage and amount calculator.
//!
//! Prices minute buckets with an hourly rate per bucket.  The same
//! functions price a single timesheet day and a payslip's aggregated
//! period buckets.

use serde::{Deserialize, Serialize};

use crate::country::CountryConfig;
use crate::models::{AmountBuckets, BucketRates, HourBuckets};

/// Rounds a monetary amount to two decimals.
pub fn round_amount(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Applies a percentage surcharge to a base rate.
fn surcharged(base: f64, percent: f64) -> f64 {
    base * (1.0 + percent / 100.0)
}

impl BucketRates {
    /// Derives the per-bucket rates from a base hourly rate and the
    /// country surcharges.  Normal minutes are paid at the base rate.
    pub fn from_base(base_rate: f64, config: &CountryConfig) -> Self {
        let base = base_rate.max(0.0);
        BucketRates {
            normal: base,
            overtime: surcharged(base, config.overtime_rate),
            night: surcharged(base, config.night_rate),
            sunday: surcharged(base, config.sunday_rate),
            holiday: surcharged(base, config.holiday_rate),
        }
    }
}

/// Result of pricing a set of buckets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PricedBuckets {
    pub rates: BucketRates,
    pub amounts: AmountBuckets,
    pub total: f64,
}

fn price(minutes: i64, rate: f64) -> f64 {
    round_amount(minutes as f64 / 60.0 * rate)
}

/// Prices `minutes` with explicit per-bucket rates.
pub fn price_with_rates(minutes: &HourBuckets, rates: &BucketRates) -> PricedBuckets {
    let amounts = AmountBuckets {
        normal: price(minutes.normal, rates.normal),
        overtime: price(minutes.overtime, rates.overtime),
        night: price(minutes.night, rates.night),
        sunday: price(minutes.sunday, rates.sunday),
        holiday: price(minutes.holiday, rates.holiday),
    };
    PricedBuckets {
        rates: *rates,
        amounts,
        total: round_amount(amounts.total()),
    }
}

/// Prices `minutes` from a base hourly rate and the country surcharges.
pub fn price_buckets(minutes: &HourBuckets, base_rate: f64, config: &CountryConfig) -> PricedBuckets {
    price_with_rates(minutes, &BucketRates::from_base(base_rate, config))
}
