//! Service layer.
//!
//! [`PayrollService`] ties the pure engine to a [`PayrollStore`]: every
//! mutating call takes an explicit [`ActorContext`], re-reads the
//! entity inside the store's critical section, applies the lifecycle
//! guard and recomputes derived fields before writing back.

use std::sync::Arc;

use chrono::NaiveDate;
use log::info;

use crate::contract::{apply_terms, recompute_contract, validate_terms};
use crate::country::{CountryConfig, CountryConfigProvider};
use crate::error::{EngineError, EngineResult, EntityKind};
use crate::lifecycle::{edit, ensure_same_tenant, transition, Lifecycle, SignatureParty};
use crate::models::{
    ActorContext, ActorRole, Contract, ContractStatus, ContractTerms, Payslip, PayslipAdjustments,
    PayslipStatus, Timesheet, TimesheetEntry, TimesheetStatus,
};
use crate::numbering::{generate_contract_number, generate_payslip_number};
use crate::payroll::{pinned_config, recompute_all, recompute_payslip};
use crate::store::PayrollStore;
use crate::timesheet::{recompute_timesheet, BucketPolicy};

/// Engine options taken from settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineOptions {
    pub policy: BucketPolicy,
    /// Reject unknown country codes instead of falling back.
    pub strict_country: bool,
}

pub struct PayrollService<S: PayrollStore> {
    provider: Arc<dyn CountryConfigProvider>,
    store: Arc<S>,
    options: EngineOptions,
}

fn forbidden(entity: EntityKind, actor: &ActorContext, operation: &str) -> EngineError {
    EngineError::Forbidden {
        entity,
        role: actor.role.to_string(),
        operation: operation.to_string(),
    }
}

fn ensure_not_worker(entity: EntityKind, actor: &ActorContext, operation: &str) -> EngineResult<()> {
    if actor.role == ActorRole::Worker {
        Err(forbidden(entity, actor, operation))
    } else {
        Ok(())
    }
}

impl<S: PayrollStore> PayrollService<S> {
    pub fn new(provider: Arc<dyn CountryConfigProvider>, store: Arc<S>, options: EngineOptions) -> Self {
        Self {
            provider,
            store,
            options,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn provider(&self) -> &dyn CountryConfigProvider {
        self.provider.as_ref()
    }

    /// Resolves a country for a new entity, honouring strict mode.
    pub fn resolve_country(&self, code: &str) -> EngineResult<CountryConfig> {
        if self.options.strict_country {
            self.provider.resolve_strict(code)
        } else {
            Ok(self.provider.resolve(code))
        }
    }

    // Contracts

    pub fn create_contract(&self, actor: &ActorContext, mut contract: Contract) -> EngineResult<Contract> {
        ensure_not_worker(EntityKind::Contract, actor, "create")?;
        let config = self.resolve_country(&contract.country_code)?;
        contract.tenant_id = actor.tenant_id.clone();
        contract.country_code = config.code.clone();
        contract.status = ContractStatus::Draft;
        contract.employee_signed = false;
        contract.employer_signed = false;
        contract.termination_reason = None;
        validate_terms(
            &contract.id,
            &ContractTerms {
                contract_type: contract.contract_type,
                start_date: contract.start_date,
                end_date: contract.end_date,
                gross_salary: contract.gross_salary,
                trial_period_days: contract.trial_period_days,
                job_id: contract.job_id.clone(),
            },
        )?;
        if self.store.contains_contract(&contract.id) {
            return Err(EngineError::Duplicate {
                entity: EntityKind::Contract,
                id: contract.id.clone(),
            });
        }
        recompute_contract(&mut contract, &config);
        contract.number = Some(generate_contract_number(
            self.store.as_ref(),
            &config.code,
            contract.contract_type,
            contract.start_date,
        )?);
        self.store.insert_contract(contract.clone())?;
        info!("contract {} created as {:?}", contract.id, contract.number);
        Ok(contract)
    }

    pub fn update_contract_terms(
        &self,
        actor: &ActorContext,
        id: &str,
        terms: ContractTerms,
    ) -> EngineResult<Contract> {
        ensure_not_worker(EntityKind::Contract, actor, "edit")?;
        validate_terms(id, &terms)?;
        self.store.update_contract(&actor.tenant_id, id, &mut |contract| {
            edit(contract, actor, |c| apply_terms(c, terms.clone()))?;
            let config = pinned_config(
                contract.config_snapshot.as_ref(),
                &contract.country_code,
                self.provider.as_ref(),
            );
            recompute_contract(contract, &config);
            Ok(())
        })
    }

    pub fn transition_contract(
        &self,
        actor: &ActorContext,
        id: &str,
        target: ContractStatus,
    ) -> EngineResult<Contract> {
        self.store
            .update_contract(&actor.tenant_id, id, &mut |contract| transition(contract, target, actor))
    }

    pub fn submit_contract_for_signature(&self, actor: &ActorContext, id: &str) -> EngineResult<Contract> {
        self.transition_contract(actor, id, ContractStatus::PendingSignature)
    }

    pub fn record_signature(
        &self,
        actor: &ActorContext,
        id: &str,
        party: SignatureParty,
    ) -> EngineResult<Contract> {
        self.store.update_contract(&actor.tenant_id, id, &mut |contract| {
            match party {
                SignatureParty::Employee
                    if actor.role == ActorRole::Worker && actor.user_id != contract.worker_id =>
                {
                    return Err(forbidden(EntityKind::Contract, actor, "sign for another worker"));
                }
                SignatureParty::Employer if actor.role == ActorRole::Worker => {
                    return Err(forbidden(EntityKind::Contract, actor, "sign as employer"));
                }
                _ => {}
            }
            contract.record_signature(party, actor)
        })
    }

    pub fn sign_contract(&self, actor: &ActorContext, id: &str) -> EngineResult<Contract> {
        self.transition_contract(actor, id, ContractStatus::Signed)
    }

    pub fn activate_contract(&self, actor: &ActorContext, id: &str) -> EngineResult<Contract> {
        self.transition_contract(actor, id, ContractStatus::Active)
    }

    pub fn suspend_contract(&self, actor: &ActorContext, id: &str) -> EngineResult<Contract> {
        self.transition_contract(actor, id, ContractStatus::Suspended)
    }

    pub fn resume_contract(&self, actor: &ActorContext, id: &str) -> EngineResult<Contract> {
        self.transition_contract(actor, id, ContractStatus::Active)
    }

    pub fn cancel_contract(&self, actor: &ActorContext, id: &str) -> EngineResult<Contract> {
        self.transition_contract(actor, id, ContractStatus::Cancelled)
    }

    pub fn terminate_contract(
        &self,
        actor: &ActorContext,
        id: &str,
        end_date: NaiveDate,
        reason: &str,
    ) -> EngineResult<Contract> {
        self.store.update_contract(&actor.tenant_id, id, &mut |contract| {
            contract.terminate(end_date, reason, actor)
        })
    }

    pub fn delete_contract(&self, actor: &ActorContext, id: &str) -> EngineResult<()> {
        ensure_not_worker(EntityKind::Contract, actor, "delete")?;
        self.store.delete_contract(&actor.tenant_id, id)
    }

    // Timesheets

    fn contract_rate(&self, tenant_id: &str, contract_id: Option<&str>) -> EngineResult<Option<f64>> {
        match contract_id {
            Some(id) => Ok(Some(self.store.contract(tenant_id, id)?.hourly_rate)),
            None => Ok(None),
        }
    }

    fn ensure_own_timesheet(&self, actor: &ActorContext, timesheet: &Timesheet) -> EngineResult<()> {
        if actor.role == ActorRole::Worker && actor.user_id != timesheet.worker_id {
            return Err(forbidden(EntityKind::Timesheet, actor, "edit another worker's timesheet"));
        }
        Ok(())
    }

    pub fn create_timesheet(&self, actor: &ActorContext, mut timesheet: Timesheet) -> EngineResult<Timesheet> {
        timesheet.tenant_id = actor.tenant_id.clone();
        self.ensure_own_timesheet(actor, &timesheet)?;
        let config = self.resolve_country(&timesheet.country_code)?;
        timesheet.country_code = config.code.clone();
        timesheet.status = TimesheetStatus::Draft;
        timesheet.payslip_id = None;
        timesheet.reviewed_by = None;
        timesheet.rejection_reason = None;
        let rate = self.contract_rate(&actor.tenant_id, timesheet.contract_id.as_deref())?;
        recompute_timesheet(&mut timesheet, &config, rate, self.options.policy);
        self.store.insert_timesheet(timesheet.clone())?;
        Ok(timesheet)
    }

    pub fn update_timesheet(
        &self,
        actor: &ActorContext,
        id: &str,
        entry: TimesheetEntry,
    ) -> EngineResult<Timesheet> {
        let current = self.store.timesheet(&actor.tenant_id, id)?;
        let rate = self.contract_rate(&actor.tenant_id, current.contract_id.as_deref())?;
        let policy = self.options.policy;
        self.store.update_timesheet(&actor.tenant_id, id, &mut |timesheet| {
            self.ensure_own_timesheet(actor, timesheet)?;
            edit(timesheet, actor, |ts| {
                ts.start_time = entry.start_time;
                ts.end_time = entry.end_time;
                ts.break_start = entry.break_start;
                ts.break_end = entry.break_end;
                ts.break_minutes = entry.break_minutes;
                ts.start_location = entry.start_location;
                ts.end_location = entry.end_location;
                ts.base_hourly_rate = entry.base_hourly_rate;
            })?;
            let config = pinned_config(
                timesheet.config_snapshot.as_ref(),
                &timesheet.country_code,
                self.provider.as_ref(),
            );
            recompute_timesheet(timesheet, &config, rate, policy);
            Ok(())
        })
    }

    pub fn transition_timesheet(
        &self,
        actor: &ActorContext,
        id: &str,
        target: TimesheetStatus,
    ) -> EngineResult<Timesheet> {
        self.store.update_timesheet(&actor.tenant_id, id, &mut |timesheet| {
            if target == TimesheetStatus::PendingValidation {
                self.ensure_own_timesheet(actor, timesheet)?;
            }
            transition(timesheet, target, actor)
        })
    }

    pub fn submit_timesheet(&self, actor: &ActorContext, id: &str) -> EngineResult<Timesheet> {
        self.transition_timesheet(actor, id, TimesheetStatus::PendingValidation)
    }

    pub fn validate_timesheet(&self, actor: &ActorContext, id: &str) -> EngineResult<Timesheet> {
        self.transition_timesheet(actor, id, TimesheetStatus::Validated)
    }

    pub fn reopen_timesheet(&self, actor: &ActorContext, id: &str) -> EngineResult<Timesheet> {
        self.transition_timesheet(actor, id, TimesheetStatus::Corrected)
    }

    pub fn reject_timesheet(&self, actor: &ActorContext, id: &str, reason: &str) -> EngineResult<Timesheet> {
        self.store
            .update_timesheet(&actor.tenant_id, id, &mut |timesheet| timesheet.reject(reason, actor))
    }

    pub fn delete_timesheet(&self, actor: &ActorContext, id: &str) -> EngineResult<()> {
        let timesheet = self.store.timesheet(&actor.tenant_id, id)?;
        self.ensure_own_timesheet(actor, &timesheet)?;
        self.store.delete_timesheet(&actor.tenant_id, id)
    }

    /// Timesheets of one worker between two dates, inclusive.
    pub fn worker_timesheets(
        &self,
        actor: &ActorContext,
        worker_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> EngineResult<Vec<Timesheet>> {
        if actor.role == ActorRole::Worker && actor.user_id != worker_id {
            return Err(forbidden(EntityKind::Timesheet, actor, "list another worker's timesheets"));
        }
        self.store.worker_timesheets(&actor.tenant_id, worker_id, from, to)
    }

    // Payslips

    /// Creates a draft payslip from supplied hours or amounts.
    pub fn create_payslip(&self, actor: &ActorContext, mut payslip: Payslip) -> EngineResult<Payslip> {
        ensure_not_worker(EntityKind::Payslip, actor, "create")?;
        if payslip.period_end < payslip.period_start {
            return Err(payslip.precondition("period end is before period start"));
        }
        let config = self.resolve_country(&payslip.country_code)?;
        payslip.tenant_id = actor.tenant_id.clone();
        payslip.country_code = config.code.clone();
        payslip.status = PayslipStatus::Draft;
        payslip.number = None;
        payslip.payment_date = None;
        payslip.timesheet_ids.clear();
        recompute_payslip(&mut payslip, None, &config);
        self.store.insert_payslip(payslip.clone())?;
        Ok(payslip)
    }

    /// Updates allowances, bonuses, advances and deductions and reruns
    /// the monetary steps with the payslip's pinned config.
    pub fn adjust_payslip(
        &self,
        actor: &ActorContext,
        id: &str,
        adjustments: PayslipAdjustments,
    ) -> EngineResult<Payslip> {
        ensure_not_worker(EntityKind::Payslip, actor, "edit")?;
        let provider = self.provider.as_ref();
        self.store.update_payslip(&actor.tenant_id, id, &mut |payslip| {
            edit(payslip, actor, |p| {
                p.allowances = adjustments.allowances;
                p.bonuses = adjustments.bonuses;
                p.advances = adjustments.advances;
                p.other_deductions = adjustments.other_deductions;
            })?;
            let config = pinned_config(payslip.config_snapshot.as_ref(), &payslip.country_code, provider);
            recompute_all(payslip, &config);
            payslip.config_snapshot = Some(config);
            Ok(())
        })
    }

    /// Pulls the validated timesheets of the period, computes every
    /// amount, numbers the payslip and moves it to `GENERATED`.
    pub fn generate_payslip(&self, actor: &ActorContext, id: &str) -> EngineResult<Payslip> {
        let store = self.store.as_ref();
        let provider = self.provider.as_ref();
        store.update_payslip(&actor.tenant_id, id, &mut |payslip| {
            ensure_same_tenant(&*payslip, actor)?;
            payslip.ensure_transition(PayslipStatus::Generated)?;
            let claimed = store.claim_timesheets(payslip)?;
            match generated_copy(payslip, &claimed, store, provider, actor) {
                Ok(next) => {
                    info!(
                        "payslip {} generated as {:?} from {} timesheets",
                        next.id,
                        next.number,
                        next.timesheet_ids.len()
                    );
                    *payslip = next;
                    Ok(())
                }
                Err(err) => {
                    store.release_timesheets(&payslip.tenant_id, &payslip.id)?;
                    Err(err)
                }
            }
        })
    }

    pub fn mark_payslip_paid(
        &self,
        actor: &ActorContext,
        id: &str,
        payment_date: NaiveDate,
    ) -> EngineResult<Payslip> {
        self.store
            .update_payslip(&actor.tenant_id, id, &mut |payslip| payslip.mark_paid(payment_date, actor))
    }

    /// Cancels a payslip and gives its timesheets back to the pool.
    pub fn cancel_payslip(&self, actor: &ActorContext, id: &str) -> EngineResult<Payslip> {
        let store = self.store.as_ref();
        store.update_payslip(&actor.tenant_id, id, &mut |payslip| {
            transition(payslip, PayslipStatus::Cancelled, actor)?;
            store.release_timesheets(&payslip.tenant_id, &payslip.id)?;
            Ok(())
        })
    }

    pub fn delete_payslip(&self, actor: &ActorContext, id: &str) -> EngineResult<()> {
        ensure_not_worker(EntityKind::Payslip, actor, "delete")?;
        self.store.delete_payslip(&actor.tenant_id, id)
    }
}

/// The generated version of a draft payslip, computed from the
/// timesheets it claimed.
fn generated_copy<S: PayrollStore>(
    payslip: &Payslip,
    claimed: &[Timesheet],
    store: &S,
    provider: &dyn CountryConfigProvider,
    actor: &ActorContext,
) -> EngineResult<Payslip> {
    let config = pinned_config(payslip.config_snapshot.as_ref(), &payslip.country_code, provider);
    let mut next = payslip.clone();
    recompute_payslip(&mut next, Some(claimed), &config);
    if next.number.is_none() {
        next.number = Some(generate_payslip_number(store, &config.code, next.period_start)?);
    }
    transition(&mut next, PayslipStatus::Generated, actor)?;
    Ok(next)
}
