//! Payroll computation engine.
//!
//! The `payroll` module turns a [`Payslip`]'s hour buckets (supplied
//! directly or summed from validated timesheets) into gross pay,
//! social charges, progressive income tax and net-to-pay.  Each step is
//! a separate idempotent function; [`recompute_all`] runs them in
//! order.  [`run_payroll`] uses the [`rayon`] crate to compute many
//! payslips across CPU cores.

use log::{debug, info};
use rayon::prelude::*;

use crate::country::{CountryConfig, CountryConfigProvider};
use crate::lifecycle::Lifecycle;
use crate::models::{AmountBuckets, HourBuckets, PayRunInput, PayRunResult, Payslip, Timesheet, TimesheetStatus};
use crate::tax::{progressive_income_tax, social_charges, taxable_base};
use crate::wage::{price_buckets, round_amount};

/// Whether `timesheet` may feed `payslip`: validated, same tenant and
/// worker, inside the period, and not consumed by another payslip.
pub fn is_eligible(payslip: &Payslip, timesheet: &Timesheet) -> bool {
    timesheet.status == TimesheetStatus::Validated
        && timesheet.tenant_id == payslip.tenant_id
        && timesheet.worker_id == payslip.worker_id
        && payslip.covers(timesheet.date)
        && timesheet
            .payslip_id
            .as_deref()
            .map_or(true, |owner| owner == payslip.id)
}

/// Replaces the payslip's buckets with the sum of the eligible
/// timesheets and records which ones were used.
pub fn aggregate_timesheets(payslip: &mut Payslip, timesheets: &[Timesheet]) {
    let mut minutes = HourBuckets::default();
    let mut amounts = AmountBuckets::default();
    let mut ids = Vec::new();
    for timesheet in timesheets.iter().filter(|ts| is_eligible(payslip, ts)) {
        minutes.add(&timesheet.minutes);
        amounts.add(&timesheet.amounts);
        ids.push(timesheet.id.clone());
    }
    debug!(
        "payslip {} aggregated {} timesheets: {:?}",
        payslip.id,
        ids.len(),
        minutes
    );
    payslip.minutes = minutes;
    payslip.amounts = AmountBuckets {
        normal: round_amount(amounts.normal),
        overtime: round_amount(amounts.overtime),
        night: round_amount(amounts.night),
        sunday: round_amount(amounts.sunday),
        holiday: round_amount(amounts.holiday),
    };
    payslip.timesheet_ids = ids;
}

/// Prices the payslip's minutes from its base hourly rate, if any.
pub fn price_hours(payslip: &mut Payslip, config: &CountryConfig) {
    if let Some(rate) = payslip.base_hourly_rate {
        payslip.amounts = price_buckets(&payslip.minutes, rate, config).amounts;
    }
}

/// Step 1: bucket amounts plus allowances and bonuses.
pub fn compute_gross(payslip: &mut Payslip) {
    payslip.gross_total = round_amount(payslip.amounts.total() + payslip.allowances + payslip.bonuses);
}

/// Step 2: total, employer and employee charges, each taken on gross.
pub fn compute_social_charges(payslip: &mut Payslip, config: &CountryConfig) {
    let charges = social_charges(payslip.gross_total, config);
    payslip.social_charges = charges.total;
    payslip.employer_charges = charges.employer;
    payslip.employee_charges = charges.employee;
}

/// Step 3: progressive tax on gross minus the employee charge.
pub fn compute_income_tax(payslip: &mut Payslip, config: &CountryConfig) {
    payslip.taxable_base = round_amount(taxable_base(payslip.gross_total, payslip.employee_charges));
    payslip.income_tax = progressive_income_tax(&config.tax_brackets, payslip.taxable_base);
}

/// Step 4.
pub fn compute_net_salary(payslip: &mut Payslip) {
    payslip.net_salary = round_amount(
        payslip.gross_total - payslip.employee_charges - payslip.income_tax - payslip.other_deductions,
    );
}

/// Step 5.
pub fn compute_net_to_pay(payslip: &mut Payslip) {
    payslip.net_to_pay = round_amount(payslip.net_salary - payslip.advances);
}

/// Runs every monetary step in order.
pub fn recompute_all(payslip: &mut Payslip, config: &CountryConfig) {
    compute_gross(payslip);
    compute_social_charges(payslip, config);
    compute_income_tax(payslip, config);
    compute_net_salary(payslip);
    compute_net_to_pay(payslip);
}

/// Fully derives a payslip.  When `source_timesheets` holds at least
/// one eligible timesheet the buckets are rebuilt from them; otherwise
/// the supplied minutes are priced (when a base rate is set) or the
/// supplied amounts are used as is.
pub fn recompute_payslip(
    payslip: &mut Payslip,
    source_timesheets: Option<&[Timesheet]>,
    config: &CountryConfig,
) {
    let current: &Payslip = payslip;
    let claimed = source_timesheets.filter(|ts| ts.iter().any(|t| is_eligible(current, t)));
    match claimed {
        Some(timesheets) => aggregate_timesheets(payslip, timesheets),
        None => {
            // Buckets that came from timesheets no longer available are stale.
            if !payslip.timesheet_ids.is_empty() {
                payslip.minutes = HourBuckets::default();
                payslip.amounts = AmountBuckets::default();
                payslip.timesheet_ids.clear();
            }
            price_hours(payslip, config);
        }
    }
    recompute_all(payslip, config);
    payslip.config_snapshot = Some(config.clone());
    debug!(
        "payslip {} gross={} tax={} net_to_pay={}",
        payslip.id, payslip.gross_total, payslip.income_tax, payslip.net_to_pay
    );
}

/// Config a payslip must be computed with: its pinned snapshot when it
/// has one for the same country, else a fresh resolution.
pub fn pinned_config(
    snapshot: Option<&CountryConfig>,
    country_code: &str,
    provider: &dyn CountryConfigProvider,
) -> CountryConfig {
    match snapshot {
        Some(config) if config.code.eq_ignore_ascii_case(country_code.trim()) => config.clone(),
        _ => provider.resolve(country_code),
    }
}

/// Computes a batch of payslips in parallel.
///
/// Only payslips that can still be modified are recomputed; the others
/// are returned untouched.  Timesheets from `input.timesheets` are
/// handed out in batch order: each one feeds the first eligible payslip
/// and is marked as owned by it, so no timesheet is counted twice.
/// Payslips that receive none keep their supplied buckets.
pub fn run_payroll(input: PayRunInput, provider: &dyn CountryConfigProvider) -> PayRunResult {
    let mut pool = input.timesheets;
    let claims: Vec<Vec<Timesheet>> = input
        .payslips
        .iter()
        .map(|payslip| {
            if !payslip.can_be_modified() {
                return Vec::new();
            }
            pool.iter_mut()
                .filter(|ts| is_eligible(payslip, ts))
                .map(|ts| {
                    ts.payslip_id = Some(payslip.id.clone());
                    ts.clone()
                })
                .collect()
        })
        .collect();

    let payslips: Vec<Payslip> = input
        .payslips
        .into_par_iter()
        .zip(claims)
        .map(|(mut payslip, claimed)| {
            if !payslip.can_be_modified() {
                return payslip;
            }
            let config = pinned_config(payslip.config_snapshot.as_ref(), &payslip.country_code, provider);
            recompute_payslip(&mut payslip, Some(claimed.as_slice()), &config);
            payslip
        })
        .collect();

    let gross_total = round_amount(payslips.iter().map(|p| p.gross_total).sum());
    let net_to_pay_total = round_amount(payslips.iter().map(|p| p.net_to_pay).sum());
    let employer_charges_total = round_amount(payslips.iter().map(|p| p.employer_charges).sum());
    info!(
        "payroll run computed {} payslips, gross {} net {}",
        payslips.len(),
        gross_total,
        net_to_pay_total
    );
    PayRunResult {
        payslips,
        gross_total,
        net_to_pay_total,
        employer_charges_total,
    }
}
