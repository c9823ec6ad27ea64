//! Data models for the payroll engine.
//!
//! The `models` module defines the serialisable entities the engine
//! works on (contracts, timesheets and payslips), the minute and
//! amount buckets they carry, and the actor context passed into every
//! mutating call.  Derived fields are always recomputed by the engine;
//! values supplied by callers for them are overwritten.

use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::country::CountryConfig;

/// Who is performing an operation.  Passed explicitly into every
/// engine call instead of being looked up from ambient state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorContext {
    pub tenant_id: String,
    pub user_id: String,
    pub role: ActorRole,
}

impl ActorContext {
    pub fn new(tenant_id: impl Into<String>, user_id: impl Into<String>, role: ActorRole) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
            role,
        }
    }

    /// Actor used by scheduled jobs.
    pub fn system(tenant_id: impl Into<String>) -> Self {
        Self::new(tenant_id, "system", ActorRole::System)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    Worker,
    Approver,
    Admin,
    System,
}

impl ActorRole {
    /// Approvers and admins may validate or reject timesheets.
    pub fn is_approver(self) -> bool {
        matches!(self, ActorRole::Approver | ActorRole::Admin)
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ActorRole::Worker => "worker",
            ActorRole::Approver => "approver",
            ActorRole::Admin => "admin",
            ActorRole::System => "system",
        })
    }
}

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Worked minutes per classification bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourBuckets {
    pub normal: i64,
    pub overtime: i64,
    pub night: i64,
    pub sunday: i64,
    pub holiday: i64,
}

impl HourBuckets {
    pub fn total(&self) -> i64 {
        self.normal + self.overtime + self.night + self.sunday + self.holiday
    }

    pub fn add(&mut self, other: &HourBuckets) {
        self.normal += other.normal;
        self.overtime += other.overtime;
        self.night += other.night;
        self.sunday += other.sunday;
        self.holiday += other.holiday;
    }
}

/// Hourly rate applied to each bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketRates {
    pub normal: f64,
    pub overtime: f64,
    pub night: f64,
    pub sunday: f64,
    pub holiday: f64,
}

/// Monetary amount per bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AmountBuckets {
    pub normal: f64,
    pub overtime: f64,
    pub night: f64,
    pub sunday: f64,
    pub holiday: f64,
}

impl AmountBuckets {
    pub fn total(&self) -> f64 {
        self.normal + self.overtime + self.night + self.sunday + self.holiday
    }

    pub fn add(&mut self, other: &AmountBuckets) {
        self.normal += other.normal;
        self.overtime += other.overtime;
        self.night += other.night;
        self.sunday += other.sunday;
        self.holiday += other.holiday;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractType {
    FixedTerm,
    OpenEnded,
    Assignment,
    Internship,
}

impl ContractType {
    /// Short code used in contract numbers.
    pub fn code(self) -> &'static str {
        match self {
            ContractType::FixedTerm => "CDD",
            ContractType::OpenEnded => "CDI",
            ContractType::Assignment => "MISSION",
            ContractType::Internship => "STAGE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractStatus {
    Draft,
    PendingSignature,
    Signed,
    Active,
    Suspended,
    Terminated,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimesheetStatus {
    Draft,
    PendingValidation,
    Validated,
    Rejected,
    Corrected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayslipStatus {
    Draft,
    Generated,
    Paid,
    Cancelled,
}

macro_rules! impl_status_display {
    ($ty:ty { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(match self {
                    $(Self::$variant => $name),+
                })
            }
        }
    };
}

impl_status_display!(ContractStatus {
    Draft => "DRAFT",
    PendingSignature => "PENDING_SIGNATURE",
    Signed => "SIGNED",
    Active => "ACTIVE",
    Suspended => "SUSPENDED",
    Terminated => "TERMINATED",
    Cancelled => "CANCELLED",
});

impl_status_display!(TimesheetStatus {
    Draft => "DRAFT",
    PendingValidation => "PENDING_VALIDATION",
    Validated => "VALIDATED",
    Rejected => "REJECTED",
    Corrected => "CORRECTED",
});

impl_status_display!(PayslipStatus {
    Draft => "DRAFT",
    Generated => "GENERATED",
    Paid => "PAID",
    Cancelled => "CANCELLED",
});

/// An employment contract between one worker and one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    pub id: String,
    pub tenant_id: String,
    pub worker_id: String,
    #[serde(default)]
    pub job_id: Option<String>,
    pub contract_type: ContractType,
    pub status: ContractStatus,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// Monthly gross salary.
    pub gross_salary: f64,
    /// Derived.
    #[serde(default)]
    pub net_salary: f64,
    /// Derived.
    #[serde(default)]
    pub hourly_rate: f64,
    /// Trial length in days; the country default applies when unset.
    #[serde(default)]
    pub trial_period_days: Option<u32>,
    /// Derived.
    #[serde(default)]
    pub trial_end_date: Option<NaiveDate>,
    pub country_code: String,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub employee_signed: bool,
    #[serde(default)]
    pub employer_signed: bool,
    #[serde(default)]
    pub termination_reason: Option<String>,
    /// Country parameters the derived fields were computed with.
    #[serde(default)]
    pub config_snapshot: Option<CountryConfig>,
}

impl Contract {
    pub fn new(
        id: impl Into<String>,
        tenant_id: impl Into<String>,
        worker_id: impl Into<String>,
        contract_type: ContractType,
        start_date: NaiveDate,
        gross_salary: f64,
        country_code: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            worker_id: worker_id.into(),
            job_id: None,
            contract_type,
            status: ContractStatus::Draft,
            start_date,
            end_date: None,
            gross_salary,
            net_salary: 0.0,
            hourly_rate: 0.0,
            trial_period_days: None,
            trial_end_date: None,
            country_code: country_code.into(),
            number: None,
            employee_signed: false,
            employer_signed: false,
            termination_reason: None,
            config_snapshot: None,
        }
    }
}

/// Caller-editable contract terms.  Derived fields are not part of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractTerms {
    pub contract_type: ContractType,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    pub gross_salary: f64,
    #[serde(default)]
    pub trial_period_days: Option<u32>,
    #[serde(default)]
    pub job_id: Option<String>,
}

/// One day of work for one worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timesheet {
    pub id: String,
    pub tenant_id: String,
    pub worker_id: String,
    #[serde(default)]
    pub contract_id: Option<String>,
    #[serde(default)]
    pub job_id: Option<String>,
    pub date: NaiveDate,
    #[serde(default)]
    pub start_time: Option<NaiveTime>,
    #[serde(default)]
    pub end_time: Option<NaiveTime>,
    #[serde(default)]
    pub break_start: Option<NaiveTime>,
    #[serde(default)]
    pub break_end: Option<NaiveTime>,
    #[serde(default)]
    pub break_minutes: Option<i64>,
    #[serde(default)]
    pub start_location: Option<GeoPoint>,
    #[serde(default)]
    pub end_location: Option<GeoPoint>,
    /// Derived.
    #[serde(default)]
    pub distance_km: f64,
    /// Derived.
    #[serde(default)]
    pub worked_minutes: i64,
    /// Derived.
    #[serde(default)]
    pub minutes: HourBuckets,
    /// Base hourly rate supplied directly; the contract rate is used
    /// when absent.
    #[serde(default)]
    pub base_hourly_rate: Option<f64>,
    /// Derived.
    #[serde(default)]
    pub rates: BucketRates,
    /// Derived.
    #[serde(default)]
    pub amounts: AmountBuckets,
    /// Derived.
    #[serde(default)]
    pub total_amount: f64,
    pub status: TimesheetStatus,
    pub country_code: String,
    #[serde(default)]
    pub config_snapshot: Option<CountryConfig>,
    /// Payslip that consumed this timesheet, if any.
    #[serde(default)]
    pub payslip_id: Option<String>,
    #[serde(default)]
    pub reviewed_by: Option<String>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
}

impl Timesheet {
    pub fn new(
        id: impl Into<String>,
        tenant_id: impl Into<String>,
        worker_id: impl Into<String>,
        date: NaiveDate,
        country_code: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            worker_id: worker_id.into(),
            contract_id: None,
            job_id: None,
            date,
            start_time: None,
            end_time: None,
            break_start: None,
            break_end: None,
            break_minutes: None,
            start_location: None,
            end_location: None,
            distance_km: 0.0,
            worked_minutes: 0,
            minutes: HourBuckets::default(),
            base_hourly_rate: None,
            rates: BucketRates::default(),
            amounts: AmountBuckets::default(),
            total_amount: 0.0,
            status: TimesheetStatus::Draft,
            country_code: country_code.into(),
            config_snapshot: None,
            payslip_id: None,
            reviewed_by: None,
            rejection_reason: None,
        }
    }
}

/// Caller-editable timesheet inputs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimesheetEntry {
    #[serde(default)]
    pub start_time: Option<NaiveTime>,
    #[serde(default)]
    pub end_time: Option<NaiveTime>,
    #[serde(default)]
    pub break_start: Option<NaiveTime>,
    #[serde(default)]
    pub break_end: Option<NaiveTime>,
    #[serde(default)]
    pub break_minutes: Option<i64>,
    #[serde(default)]
    pub start_location: Option<GeoPoint>,
    #[serde(default)]
    pub end_location: Option<GeoPoint>,
    #[serde(default)]
    pub base_hourly_rate: Option<f64>,
}

/// The payroll document for one worker and one period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payslip {
    pub id: String,
    pub tenant_id: String,
    pub worker_id: String,
    #[serde(default)]
    pub contract_id: Option<String>,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub country_code: String,
    #[serde(default)]
    pub number: Option<String>,
    pub status: PayslipStatus,
    /// Minutes per bucket; summed from timesheets when they are supplied.
    #[serde(default)]
    pub minutes: HourBuckets,
    /// Prices `minutes` when set and no timesheets are supplied.
    #[serde(default)]
    pub base_hourly_rate: Option<f64>,
    #[serde(default)]
    pub amounts: AmountBuckets,
    #[serde(default)]
    pub allowances: f64,
    #[serde(default)]
    pub bonuses: f64,
    #[serde(default)]
    pub advances: f64,
    #[serde(default)]
    pub other_deductions: f64,
    #[serde(default)]
    pub gross_total: f64,
    #[serde(default)]
    pub social_charges: f64,
    #[serde(default)]
    pub employer_charges: f64,
    #[serde(default)]
    pub employee_charges: f64,
    #[serde(default)]
    pub taxable_base: f64,
    #[serde(default)]
    pub income_tax: f64,
    #[serde(default)]
    pub net_salary: f64,
    #[serde(default)]
    pub net_to_pay: f64,
    #[serde(default)]
    pub payment_date: Option<NaiveDate>,
    #[serde(default)]
    pub timesheet_ids: Vec<String>,
    #[serde(default)]
    pub config_snapshot: Option<CountryConfig>,
}

impl Payslip {
    pub fn new(
        id: impl Into<String>,
        tenant_id: impl Into<String>,
        worker_id: impl Into<String>,
        period_start: NaiveDate,
        period_end: NaiveDate,
        country_code: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            worker_id: worker_id.into(),
            contract_id: None,
            period_start,
            period_end,
            country_code: country_code.into(),
            number: None,
            status: PayslipStatus::Draft,
            minutes: HourBuckets::default(),
            base_hourly_rate: None,
            amounts: AmountBuckets::default(),
            allowances: 0.0,
            bonuses: 0.0,
            advances: 0.0,
            other_deductions: 0.0,
            gross_total: 0.0,
            social_charges: 0.0,
            employer_charges: 0.0,
            employee_charges: 0.0,
            taxable_base: 0.0,
            income_tax: 0.0,
            net_salary: 0.0,
            net_to_pay: 0.0,
            payment_date: None,
            timesheet_ids: Vec::new(),
            config_snapshot: None,
        }
    }

    pub fn covers(&self, date: NaiveDate) -> bool {
        date >= self.period_start && date <= self.period_end
    }
}

/// Caller-editable payslip inputs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PayslipAdjustments {
    #[serde(default)]
    pub allowances: f64,
    #[serde(default)]
    pub bonuses: f64,
    #[serde(default)]
    pub advances: f64,
    #[serde(default)]
    pub other_deductions: f64,
}

/// Input to a batch payroll run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayRunInput {
    /// Draft payslips to compute.
    pub payslips: Vec<Payslip>,
    /// Candidate timesheets; each payslip only picks the validated ones
    /// of its own worker inside its period.
    #[serde(default)]
    pub timesheets: Vec<Timesheet>,
}

/// The aggregate result of a payroll run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayRunResult {
    pub payslips: Vec<Payslip>,
    pub gross_total: f64,
    pub net_to_pay_total: f64,
    pub employer_charges_total: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&ContractStatus::PendingSignature).unwrap();
        assert_eq!(json, "\"PENDING_SIGNATURE\"");
        assert_eq!(TimesheetStatus::PendingValidation.to_string(), "PENDING_VALIDATION");
    }

    #[test]
    fn test_bucket_totals() {
        let mut a = HourBuckets {
            normal: 60,
            overtime: 30,
            ..Default::default()
        };
        a.add(&HourBuckets {
            night: 15,
            ..Default::default()
        });
        assert_eq!(a.total(), 105);
    }

    #[test]
    fn test_timesheet_deserializes_with_defaults() {
        let ts: Timesheet = serde_json::from_value(serde_json::json!({
            "id": "t1",
            "tenant_id": "acme",
            "worker_id": "w1",
            "date": "2025-06-02",
            "start_time": "08:00:00",
            "end_time": "17:00:00",
            "status": "DRAFT",
            "country_code": "GA"
        }))
        .unwrap();
        assert_eq!(ts.worked_minutes, 0);
        assert!(ts.break_minutes.is_none());
        assert_eq!(ts.status, TimesheetStatus::Draft);
    }
}
