//! Contract and payslip numbering.
//!
//! Numbers look like `{prefix}-{seq4}` where the prefix groups numbers
//! per country, kind and month (`GA-CDI-202506`,
//! `GA-BULLETIN-202506`).  Sequences come from a [`SequenceStore`],
//! which hands out counters atomically; the allocated number is then
//! reserved against a uniqueness check and retried a bounded number
//! of times on collision.

use chrono::{Datelike, NaiveDate};
use log::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::models::ContractType;

/// Attempts made before giving up with a retryable error.
pub const MAX_NUMBER_ATTEMPTS: u32 = 5;

/// Atomic per-prefix counters plus a unique-number registry.
pub trait SequenceStore: Send + Sync {
    /// Next sequence for `prefix`, starting after the numbers already
    /// registered under it.  Must be atomic across callers.
    fn next_sequence(&self, prefix: &str) -> EngineResult<u32>;

    /// Registers `number`.  Returns `false` if it is already taken.
    fn reserve_number(&self, number: &str) -> EngineResult<bool>;
}

pub fn contract_number_prefix(country_code: &str, contract_type: ContractType, on: NaiveDate) -> String {
    format!(
        "{}-{}-{:04}{:02}",
        country_code.trim().to_ascii_uppercase(),
        contract_type.code(),
        on.year(),
        on.month()
    )
}

pub fn payslip_number_prefix(country_code: &str, period_start: NaiveDate) -> String {
    format!(
        "{}-BULLETIN-{:04}{:02}",
        country_code.trim().to_ascii_uppercase(),
        period_start.year(),
        period_start.month()
    )
}

pub fn format_number(prefix: &str, sequence: u32) -> String {
    format!("{prefix}-{sequence:04}")
}

/// Allocates and reserves the next free number under `prefix`.
pub fn allocate_number<S: SequenceStore + ?Sized>(store: &S, prefix: &str) -> EngineResult<String> {
    for attempt in 1..=MAX_NUMBER_ATTEMPTS {
        let number = format_number(prefix, store.next_sequence(prefix)?);
        if store.reserve_number(&number)? {
            debug!("allocated {number} on attempt {attempt}");
            return Ok(number);
        }
        warn!("number {number} already taken, retrying");
    }
    Err(EngineError::SequenceExhausted {
        prefix: prefix.to_string(),
        attempts: MAX_NUMBER_ATTEMPTS,
    })
}

pub fn generate_contract_number<S: SequenceStore + ?Sized>(
    store: &S,
    country_code: &str,
    contract_type: ContractType,
    on: NaiveDate,
) -> EngineResult<String> {
    allocate_number(store, &contract_number_prefix(country_code, contract_type, on))
}

pub fn generate_payslip_number<S: SequenceStore + ?Sized>(
    store: &S,
    country_code: &str,
    period_start: NaiveDate,
) -> EngineResult<String> {
    allocate_number(store, &payslip_number_prefix(country_code, period_start))
}
