use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{NaiveDate, NaiveTime};
use payroll_engine::lifecycle::SignatureParty;
use payroll_engine::models::{
    ActorContext, ActorRole, Contract, ContractStatus, ContractType, PayslipAdjustments, Payslip,
    PayslipStatus, Timesheet, TimesheetStatus,
};
use payroll_engine::models::TimesheetEntry;
use payroll_engine::{
    CountryConfigProvider, EngineError, EngineOptions, MemoryStore, PayrollService, PayrollStore,
    StaticCountryRegistry,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn service() -> PayrollService<MemoryStore> {
    PayrollService::new(
        Arc::new(StaticCountryRegistry::builtin()),
        Arc::new(MemoryStore::new()),
        EngineOptions::default(),
    )
}

fn admin() -> ActorContext {
    ActorContext::new("acme", "hr", ActorRole::Admin)
}

fn approver() -> ActorContext {
    ActorContext::new("acme", "lead", ActorRole::Approver)
}

fn worker() -> ActorContext {
    ActorContext::new("acme", "w1", ActorRole::Worker)
}

fn active_contract(svc: &PayrollService<MemoryStore>) -> Contract {
    let contract = Contract::new("c1", "acme", "w1", ContractType::OpenEnded, date(2025, 6, 1), 150_000.0, "GA");
    let created = svc.create_contract(&admin(), contract).unwrap();
    assert_eq!(created.number.as_deref(), Some("GA-CDI-202506-0001"));
    assert_eq!(created.status, ContractStatus::Draft);

    svc.submit_contract_for_signature(&admin(), "c1").unwrap();
    let err = svc.sign_contract(&admin(), "c1").unwrap_err();
    assert!(matches!(err, EngineError::Precondition { .. }));

    svc.record_signature(&worker(), "c1", SignatureParty::Employee).unwrap();
    svc.record_signature(&admin(), "c1", SignatureParty::Employer).unwrap();
    svc.sign_contract(&admin(), "c1").unwrap();
    svc.activate_contract(&admin(), "c1").unwrap()
}

fn validated_day(svc: &PayrollService<MemoryStore>, id: &str, day: u32) -> Timesheet {
    let mut ts = Timesheet::new(id, "acme", "w1", date(2025, 6, day), "GA");
    ts.contract_id = Some("c1".to_string());
    ts.start_time = Some(time(8, 0));
    ts.end_time = Some(time(16, 0));
    ts.base_hourly_rate = Some(1000.0);
    svc.create_timesheet(&worker(), ts).unwrap();
    svc.submit_timesheet(&worker(), id).unwrap();
    svc.validate_timesheet(&approver(), id).unwrap()
}

#[test]
fn test_contract_to_paid_payslip() {
    let svc = service();
    let contract = active_contract(&svc);
    assert_eq!(contract.status, ContractStatus::Active);
    assert_eq!(contract.hourly_rate, 865.38);

    let first = validated_day(&svc, "ts1", 10);
    assert_eq!(first.status, TimesheetStatus::Validated);
    assert_eq!(first.reviewed_by.as_deref(), Some("lead"));
    assert_eq!(first.minutes.normal, 480);
    assert_eq!(first.total_amount, 8000.0);
    validated_day(&svc, "ts2", 11);

    let payslip = Payslip::new("p1", "acme", "w1", date(2025, 6, 1), date(2025, 6, 30), "GA");
    svc.create_payslip(&admin(), payslip).unwrap();
    svc.adjust_payslip(
        &admin(),
        "p1",
        PayslipAdjustments {
            advances: 1000.0,
            ..PayslipAdjustments::default()
        },
    )
    .unwrap();

    let generated = svc.generate_payslip(&admin(), "p1").unwrap();
    assert_eq!(generated.status, PayslipStatus::Generated);
    assert_eq!(generated.number.as_deref(), Some("GA-BULLETIN-202506-0001"));
    assert_eq!(generated.timesheet_ids, vec!["ts1".to_string(), "ts2".to_string()]);
    assert_eq!(generated.minutes.normal, 960);
    assert_eq!(generated.gross_total, 16000.0);
    assert_eq!(generated.social_charges, 4480.0);
    assert_eq!(generated.employer_charges, 3440.0);
    assert_eq!(generated.employee_charges, 1040.0);
    assert_eq!(generated.taxable_base, 14960.0);
    assert_eq!(generated.income_tax, 0.0);
    assert_eq!(generated.net_salary, 14960.0);
    assert_eq!(generated.net_to_pay, 13960.0);

    let ts = svc.store().timesheet("acme", "ts1").unwrap();
    assert_eq!(ts.payslip_id.as_deref(), Some("p1"));

    let err = svc.mark_payslip_paid(&worker(), "p1", date(2025, 7, 5)).unwrap_err();
    assert!(matches!(err, EngineError::Forbidden { .. }));
    let paid = svc.mark_payslip_paid(&admin(), "p1", date(2025, 7, 5)).unwrap();
    assert_eq!(paid.status, PayslipStatus::Paid);
    assert_eq!(paid.payment_date, Some(date(2025, 7, 5)));

    let err = svc
        .adjust_payslip(&admin(), "p1", PayslipAdjustments::default())
        .unwrap_err();
    assert!(matches!(err, EngineError::NotEditable { .. }));
}

#[test]
fn test_timesheets_feed_a_single_payslip() {
    let svc = service();
    active_contract(&svc);
    validated_day(&svc, "ts1", 10);
    validated_day(&svc, "ts2", 11);

    for id in ["p1", "p2"] {
        let payslip = Payslip::new(id, "acme", "w1", date(2025, 6, 1), date(2025, 6, 30), "GA");
        svc.create_payslip(&admin(), payslip).unwrap();
    }
    let first = svc.generate_payslip(&admin(), "p1").unwrap();
    assert_eq!(first.timesheet_ids.len(), 2);
    let second = svc.generate_payslip(&admin(), "p2").unwrap();
    assert!(second.timesheet_ids.is_empty());
    assert_eq!(second.gross_total, 0.0);
    assert_eq!(second.number.as_deref(), Some("GA-BULLETIN-202506-0002"));

    // A consumed timesheet cannot be reopened.
    let err = svc.reopen_timesheet(&approver(), "ts1").unwrap_err();
    assert!(matches!(err, EngineError::Precondition { .. }));

    let cancelled = svc.cancel_payslip(&admin(), "p1").unwrap();
    assert_eq!(cancelled.status, PayslipStatus::Cancelled);
    let ts = svc.store().timesheet("acme", "ts1").unwrap();
    assert_eq!(ts.payslip_id, None);

    let reopened = svc.reopen_timesheet(&approver(), "ts1").unwrap();
    assert_eq!(reopened.status, TimesheetStatus::Corrected);
}

#[test]
fn test_role_and_tenant_guards() {
    let svc = service();
    active_contract(&svc);

    let err = svc.suspend_contract(&worker(), "c1").unwrap_err();
    assert!(matches!(err, EngineError::Forbidden { .. }));

    let mut ts = Timesheet::new("ts1", "acme", "w1", date(2025, 6, 10), "GA");
    ts.contract_id = Some("c1".to_string());
    ts.start_time = Some(time(8, 0));
    ts.end_time = Some(time(12, 0));
    let created = svc.create_timesheet(&worker(), ts).unwrap();
    // Without its own rate the timesheet is priced at the contract rate.
    assert_eq!(created.rates.normal, 865.38);

    svc.submit_timesheet(&worker(), "ts1").unwrap();
    let err = svc.validate_timesheet(&worker(), "ts1").unwrap_err();
    assert!(matches!(err, EngineError::Forbidden { .. }));

    let outsider = ActorContext::new("globex", "hr", ActorRole::Admin);
    let err = svc.validate_timesheet(&outsider, "ts1").unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }));

    let rejected = svc.reject_timesheet(&approver(), "ts1", "missing badge").unwrap();
    assert_eq!(rejected.status, TimesheetStatus::Rejected);
    assert_eq!(rejected.rejection_reason.as_deref(), Some("missing badge"));
    let err = svc.delete_timesheet(&admin(), "ts1").unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));
}

#[test]
fn test_contract_termination_requires_reason() {
    let svc = service();
    active_contract(&svc);
    let err = svc
        .terminate_contract(&admin(), "c1", date(2025, 12, 31), "  ")
        .unwrap_err();
    assert!(matches!(err, EngineError::Precondition { .. }));
    let unchanged = svc.store().contract("acme", "c1").unwrap();
    assert_eq!(unchanged.status, ContractStatus::Active);
    assert_eq!(unchanged.end_date, None);

    let terminated = svc
        .terminate_contract(&admin(), "c1", date(2025, 12, 31), "end of project")
        .unwrap();
    assert_eq!(terminated.status, ContractStatus::Terminated);
    assert_eq!(terminated.end_date, Some(date(2025, 12, 31)));
}

#[test]
fn test_supplied_salary_payslip_is_generated_and_paid() {
    let svc = service();
    let mut payslip = Payslip::new("p1", "acme", "w9", date(2025, 6, 1), date(2025, 6, 30), "GA");
    payslip.amounts.normal = 150_000.0;
    let draft = svc.create_payslip(&admin(), payslip).unwrap();
    assert_eq!(draft.gross_total, 150_000.0);

    let generated = svc.generate_payslip(&admin(), "p1").unwrap();
    assert_eq!(generated.status, PayslipStatus::Generated);
    assert!(generated.timesheet_ids.is_empty());
    assert_eq!(generated.gross_total, 150_000.0);
    assert_eq!(generated.employee_charges, 9750.0);
    assert_eq!(generated.income_tax, 6525.0);
    assert_eq!(generated.net_to_pay, 133_725.0);

    let paid = svc.mark_payslip_paid(&admin(), "p1", date(2025, 7, 5)).unwrap();
    assert_eq!(paid.status, PayslipStatus::Paid);
    assert_eq!(paid.net_to_pay, 133_725.0);
}

#[test]
fn test_oversized_trial_period_is_rejected() {
    let svc = service();
    let mut contract = Contract::new("c1", "acme", "w1", ContractType::OpenEnded, date(2025, 6, 1), 150_000.0, "GA");
    contract.trial_period_days = Some(u32::MAX);
    let err = svc.create_contract(&admin(), contract).unwrap_err();
    assert!(matches!(err, EngineError::Precondition { .. }));
    assert!(svc.store().contract("acme", "c1").is_err());
}

#[test]
fn test_duplicate_contract_does_not_consume_a_number() {
    let svc = service();
    active_contract(&svc);
    let again = Contract::new("c1", "acme", "w1", ContractType::OpenEnded, date(2025, 6, 1), 150_000.0, "GA");
    let err = svc.create_contract(&admin(), again).unwrap_err();
    assert!(matches!(err, EngineError::Duplicate { .. }));

    let next = Contract::new("c2", "acme", "w2", ContractType::OpenEnded, date(2025, 6, 1), 150_000.0, "GA");
    let created = svc.create_contract(&admin(), next).unwrap();
    assert_eq!(created.number.as_deref(), Some("GA-CDI-202506-0002"));
}

#[test]
fn test_concurrent_transitions_have_one_winner() {
    let svc = service();
    active_contract(&svc);
    let mut ts = Timesheet::new("ts1", "acme", "w1", date(2025, 6, 10), "GA");
    ts.start_time = Some(time(8, 0));
    ts.end_time = Some(time(16, 0));
    svc.create_timesheet(&worker(), ts).unwrap();
    svc.submit_timesheet(&worker(), "ts1").unwrap();

    let barrier = Barrier::new(2);
    let validations: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..2)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    svc.validate_timesheet(&approver(), "ts1")
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert_eq!(validations.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(validations
        .iter()
        .any(|r| matches!(r, Err(EngineError::InvalidTransition { .. }))));

    let barrier = Barrier::new(2);
    let terminations: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = ["redundancy", "end of project"]
            .into_iter()
            .map(|reason| {
                let barrier = &barrier;
                let svc = &svc;
                scope.spawn(move || {
                    barrier.wait();
                    svc.terminate_contract(&admin(), "c1", date(2025, 12, 31), reason)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert_eq!(terminations.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(terminations
        .iter()
        .any(|r| matches!(r, Err(EngineError::InvalidTransition { .. }))));
    let stored = svc.store().contract("acme", "c1").unwrap();
    assert_eq!(stored.status, ContractStatus::Terminated);
    let winner = terminations.iter().find_map(|r| r.as_ref().ok()).unwrap();
    assert_eq!(stored.termination_reason, winner.termination_reason);
}

#[test]
fn test_timesheet_edit_keeps_its_pinned_country_config() {
    let mut short_days = StaticCountryRegistry::builtin().resolve("GA");
    short_days.daily_hours = 7.0;
    let store = Arc::new(MemoryStore::new());
    let before = PayrollService::new(
        Arc::new(StaticCountryRegistry::with_overrides("short-days", "GA", vec![short_days]).unwrap()),
        store.clone(),
        EngineOptions::default(),
    );
    let mut ts = Timesheet::new("ts1", "acme", "w1", date(2025, 6, 10), "GA");
    ts.start_time = Some(time(8, 0));
    ts.end_time = Some(time(16, 0));
    let created = before.create_timesheet(&worker(), ts).unwrap();
    assert_eq!(created.minutes.overtime, 60);

    // The registry changes but the stored timesheet keeps its snapshot.
    let after = PayrollService::new(Arc::new(StaticCountryRegistry::builtin()), store, EngineOptions::default());
    let edited = after
        .update_timesheet(
            &worker(),
            "ts1",
            TimesheetEntry {
                start_time: Some(time(8, 0)),
                end_time: Some(time(16, 30)),
                ..TimesheetEntry::default()
            },
        )
        .unwrap();
    assert_eq!(edited.worked_minutes, 510);
    assert_eq!(edited.minutes.overtime, 90);
    assert_eq!(edited.config_snapshot.map(|c| c.daily_hours), Some(7.0));
}
