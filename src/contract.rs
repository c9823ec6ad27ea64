//! Contract derived fields.
//!
//! Net salary, hourly rate and trial-period end date are always
//! recomputed from the contract terms and the country rules; callers
//! never supply them.

use chrono::{Duration, NaiveDate};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::country::CountryConfig;
use crate::error::{EngineError, EngineResult, EntityKind};
use crate::models::{Contract, ContractTerms};
use crate::tax::{progressive_income_tax, social_charges, taxable_base};
use crate::wage::round_amount;

/// Longest trial period accepted on a contract, in days.
pub const MAX_TRIAL_PERIOD_DAYS: u32 = 365;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContractDerived {
    pub net_salary: f64,
    pub hourly_rate: f64,
    pub trial_end_date: NaiveDate,
}

/// Monthly net for a monthly gross: gross minus the employee social
/// charge and the income tax on what remains.
pub fn monthly_net_salary(gross: f64, config: &CountryConfig) -> f64 {
    let gross = gross.max(0.0);
    let employee_charge = social_charges(gross, config).employee;
    let tax = progressive_income_tax(&config.tax_brackets, taxable_base(gross, employee_charge));
    round_amount(gross - employee_charge - tax)
}

pub fn hourly_rate(gross: f64, config: &CountryConfig) -> f64 {
    let hours = config.monthly_hours();
    if hours <= 0.0 {
        return 0.0;
    }
    round_amount(gross.max(0.0) / hours)
}

/// End of the trial period, never past the contract end date.
pub fn trial_end_date(contract: &Contract, config: &CountryConfig) -> NaiveDate {
    let days = contract
        .trial_period_days
        .unwrap_or_else(|| config.trial_periods.for_type(contract.contract_type));
    let end = contract
        .start_date
        .checked_add_signed(Duration::days(i64::from(days)))
        .unwrap_or(NaiveDate::MAX);
    match contract.end_date {
        Some(contract_end) if contract_end < end => contract_end,
        _ => end,
    }
}

pub fn derive_contract_fields(contract: &Contract, config: &CountryConfig) -> ContractDerived {
    ContractDerived {
        net_salary: monthly_net_salary(contract.gross_salary, config),
        hourly_rate: hourly_rate(contract.gross_salary, config),
        trial_end_date: trial_end_date(contract, config),
    }
}

/// Recomputes the derived fields in place and pins `config`.
pub fn recompute_contract(contract: &mut Contract, config: &CountryConfig) {
    let derived = derive_contract_fields(contract, config);
    debug!("contract {} derived {:?}", contract.id, derived);
    contract.net_salary = derived.net_salary;
    contract.hourly_rate = derived.hourly_rate;
    contract.trial_end_date = Some(derived.trial_end_date);
    contract.config_snapshot = Some(config.clone());
}

pub fn is_below_minimum_wage(contract: &Contract, config: &CountryConfig) -> bool {
    contract.gross_salary < config.minimum_wage
}

/// Checks caller-supplied terms before they are applied.
pub fn validate_terms(contract_id: &str, terms: &ContractTerms) -> EngineResult<()> {
    let reject = |reason: &str| EngineError::Precondition {
        entity: EntityKind::Contract,
        id: contract_id.to_string(),
        reason: reason.to_string(),
    };
    if !terms.gross_salary.is_finite() || terms.gross_salary < 0.0 {
        return Err(reject("gross salary must be a non-negative amount"));
    }
    if let Some(end) = terms.end_date {
        if end <= terms.start_date {
            return Err(reject("end date must be after the start date"));
        }
    }
    if let Some(days) = terms.trial_period_days {
        if days > MAX_TRIAL_PERIOD_DAYS {
            return Err(reject(&format!(
                "trial period of {days} days exceeds {MAX_TRIAL_PERIOD_DAYS} days"
            )));
        }
    }
    Ok(())
}

/// Copies `terms` onto the contract.
pub fn apply_terms(contract: &mut Contract, terms: ContractTerms) {
    contract.contract_type = terms.contract_type;
    contract.start_date = terms.start_date;
    contract.end_date = terms.end_date;
    contract.gross_salary = terms.gross_salary;
    contract.trial_period_days = terms.trial_period_days;
    contract.job_id = terms.job_id;
}
