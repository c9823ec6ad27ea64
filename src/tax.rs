//! Social charges and progressive income tax.
//!
//! Both are pure functions of a gross amount and a [`CountryConfig`].
//! Social charges are split into an employer and an employee portion,
//! each derived independently from gross.  Income tax integrates the
//! country's progressive brackets over the taxable base.

use serde::{Deserialize, Serialize};

use crate::country::{CountryConfig, TaxBracket};
use crate::wage::round_amount;

/// Social charges owed on a gross amount.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SocialCharges {
    pub total: f64,
    pub employer: f64,
    pub employee: f64,
}

pub fn social_charges(gross: f64, config: &CountryConfig) -> SocialCharges {
    let gross = gross.max(0.0);
    SocialCharges {
        total: round_amount(gross * config.social_charge_rate / 100.0),
        employer: round_amount(gross * config.employer_charge_rate / 100.0),
        employee: round_amount(gross * config.employee_charge_rate / 100.0),
    }
}

/// Tax owed inside one bracket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BracketShare {
    pub bracket: TaxBracket,
    pub taxed_amount: f64,
    pub tax: f64,
}

/// Per-bracket breakdown of the income tax on `taxable_base`.
///
/// Brackets are walked in ascending `min` order and the walk stops at
/// the first bracket starting at or above the base.
pub fn bracket_breakdown(brackets: &[TaxBracket], taxable_base: f64) -> Vec<BracketShare> {
    let mut ordered: Vec<&TaxBracket> = brackets.iter().collect();
    ordered.sort_by(|a, b| a.min.total_cmp(&b.min));

    let mut shares = Vec::new();
    for bracket in ordered {
        if bracket.min >= taxable_base {
            break;
        }
        let upper = bracket.max.map_or(taxable_base, |max| max.min(taxable_base));
        let taxed_amount = (upper - bracket.min).max(0.0);
        shares.push(BracketShare {
            bracket: *bracket,
            taxed_amount,
            tax: taxed_amount * bracket.rate / 100.0,
        });
    }
    shares
}

/// Progressive income tax on `taxable_base`.  Zero for a non-positive base.
pub fn progressive_income_tax(brackets: &[TaxBracket], taxable_base: f64) -> f64 {
    let tax: f64 = bracket_breakdown(brackets, taxable_base)
        .iter()
        .map(|share| share.tax)
        .sum();
    round_amount(tax)
}

/// Taxable base after the employee social charge.
pub fn taxable_base(gross: f64, employee_charge: f64) -> f64 {
    (gross - employee_charge).max(0.0)
}
