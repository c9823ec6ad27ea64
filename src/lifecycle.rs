//! Lifecycle state machines for contracts, timesheets and payslips.
//!
//! Each entity declares its transition table and editable statuses via
//! the [`Lifecycle`] trait.  [`transition`] is the single mutation
//! path: it checks the table, the actor's tenant and role, and any
//! entity-specific precondition before touching the entity.  Guard
//! queries (`can_transition_to`, `can_be_modified`, ...) are pure.

use std::fmt;

use chrono::NaiveDate;
use log::info;

use crate::error::{EngineError, EngineResult, EntityKind};
use crate::models::{
    ActorContext, ActorRole, Contract, ContractStatus, Payslip, PayslipStatus, Timesheet,
    TimesheetStatus,
};

pub trait Lifecycle: Clone {
    type Status: Copy + Eq + fmt::Display + fmt::Debug + 'static;

    const KIND: EntityKind;

    fn id(&self) -> &str;
    fn tenant_id(&self) -> &str;
    fn status(&self) -> Self::Status;
    fn set_status(&mut self, status: Self::Status);

    /// Statuses reachable from `from` in one step.
    fn allowed_targets(from: Self::Status) -> &'static [Self::Status];
    fn editable_statuses() -> &'static [Self::Status];
    fn deletable_statuses() -> &'static [Self::Status];

    /// Role and data checks beyond the transition table.
    fn check_transition(&self, _target: Self::Status, _actor: &ActorContext) -> EngineResult<()> {
        Ok(())
    }

    /// Side effects applied once a transition is accepted.
    fn on_enter(&mut self, _status: Self::Status, _actor: &ActorContext) {}

    fn can_transition_to(&self, target: Self::Status) -> bool {
        Self::allowed_targets(self.status()).contains(&target)
    }

    fn can_be_modified(&self) -> bool {
        Self::editable_statuses().contains(&self.status())
    }

    fn can_be_deleted(&self) -> bool {
        Self::deletable_statuses().contains(&self.status())
    }

    fn ensure_modifiable(&self) -> EngineResult<()> {
        if self.can_be_modified() {
            Ok(())
        } else {
            Err(EngineError::NotEditable {
                entity: Self::KIND,
                id: self.id().to_string(),
                status: self.status().to_string(),
            })
        }
    }

    fn ensure_transition(&self, target: Self::Status) -> EngineResult<()> {
        if self.can_transition_to(target) {
            Ok(())
        } else {
            Err(invalid_transition(self, format!("move to {target}")))
        }
    }

    fn precondition(&self, reason: impl Into<String>) -> EngineError {
        EngineError::Precondition {
            entity: Self::KIND,
            id: self.id().to_string(),
            reason: reason.into(),
        }
    }
}

pub(crate) fn invalid_transition<E: Lifecycle>(entity: &E, operation: impl Into<String>) -> EngineError {
    EngineError::InvalidTransition {
        entity: E::KIND,
        id: entity.id().to_string(),
        status: entity.status().to_string(),
        operation: operation.into(),
    }
}

fn forbidden<E: Lifecycle>(actor: &ActorContext, operation: impl Into<String>) -> EngineError {
    EngineError::Forbidden {
        entity: E::KIND,
        role: actor.role.to_string(),
        operation: operation.into(),
    }
}

/// Ensures the actor belongs to the entity's tenant.
pub fn ensure_same_tenant<E: Lifecycle>(entity: &E, actor: &ActorContext) -> EngineResult<()> {
    if actor.tenant_id == entity.tenant_id() {
        Ok(())
    } else {
        Err(EngineError::NotFound {
            entity: E::KIND,
            id: entity.id().to_string(),
        })
    }
}

/// Moves `entity` to `target`.  On error the entity is left untouched.
///
/// Only the entity itself changes.  Store side effects, such as releasing
/// the timesheets of a cancelled payslip, are done by `PayrollService`.
pub fn transition<E: Lifecycle>(
    entity: &mut E,
    target: E::Status,
    actor: &ActorContext,
) -> EngineResult<()> {
    ensure_same_tenant(entity, actor)?;
    entity.ensure_transition(target)?;
    entity.check_transition(target, actor)?;
    let from = entity.status();
    entity.set_status(target);
    entity.on_enter(target, actor);
    info!(
        "{} {} moved {} -> {} by {} ({})",
        E::KIND,
        entity.id(),
        from,
        target,
        actor.user_id,
        actor.role
    );
    Ok(())
}

/// Applies `edit` to `entity` if its status allows edits.
pub fn edit<E, F>(entity: &mut E, actor: &ActorContext, edit: F) -> EngineResult<()>
where
    E: Lifecycle,
    F: FnOnce(&mut E),
{
    ensure_same_tenant(entity, actor)?;
    entity.ensure_modifiable()?;
    edit(entity);
    Ok(())
}

impl Lifecycle for Contract {
    type Status = ContractStatus;

    const KIND: EntityKind = EntityKind::Contract;

    fn id(&self) -> &str {
        &self.id
    }

    fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    fn status(&self) -> ContractStatus {
        self.status
    }

    fn set_status(&mut self, status: ContractStatus) {
        self.status = status;
    }

    fn allowed_targets(from: ContractStatus) -> &'static [ContractStatus] {
        use ContractStatus::*;
        match from {
            Draft => &[PendingSignature, Cancelled],
            PendingSignature => &[Signed, Cancelled],
            Signed => &[Active, Terminated],
            Active => &[Suspended, Terminated],
            Suspended => &[Active],
            Terminated | Cancelled => &[],
        }
    }

    fn editable_statuses() -> &'static [ContractStatus] {
        &[ContractStatus::Draft, ContractStatus::PendingSignature]
    }

    fn deletable_statuses() -> &'static [ContractStatus] {
        &[ContractStatus::Draft, ContractStatus::Cancelled]
    }

    fn check_transition(&self, target: ContractStatus, actor: &ActorContext) -> EngineResult<()> {
        if actor.role == ActorRole::Worker {
            return Err(forbidden::<Self>(actor, format!("move to {target}")));
        }
        match target {
            ContractStatus::Signed if !(self.employee_signed && self.employer_signed) => {
                Err(self.precondition("signing requires both employee and employer signatures"))
            }
            ContractStatus::Terminated => {
                match self.end_date {
                    Some(end) if end >= self.start_date => {}
                    Some(_) => return Err(self.precondition("end date is before the start date")),
                    None => return Err(self.precondition("termination requires an end date")),
                }
                match self.termination_reason.as_deref().map(str::trim) {
                    Some(reason) if !reason.is_empty() => Ok(()),
                    _ => Err(self.precondition("termination requires a reason")),
                }
            }
            _ => Ok(()),
        }
    }
}

/// Party recording a signature on a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureParty {
    Employee,
    Employer,
}

impl Contract {
    /// Ready to move to `SIGNED`.
    pub fn can_be_signed(&self) -> bool {
        self.status == ContractStatus::PendingSignature && self.employee_signed && self.employer_signed
    }

    pub fn can_be_activated(&self) -> bool {
        self.status == ContractStatus::Signed
    }

    pub fn can_be_terminated(&self) -> bool {
        self.can_transition_to(ContractStatus::Terminated)
    }

    /// Records one party's signature.  Only while pending signature.
    pub fn record_signature(&mut self, party: SignatureParty, actor: &ActorContext) -> EngineResult<()> {
        ensure_same_tenant(self, actor)?;
        if self.status != ContractStatus::PendingSignature {
            return Err(invalid_transition(self, "record a signature"));
        }
        match party {
            SignatureParty::Employee => self.employee_signed = true,
            SignatureParty::Employer => self.employer_signed = true,
        }
        Ok(())
    }

    /// Terminates the contract with an end date and reason.
    pub fn terminate(
        &mut self,
        end_date: NaiveDate,
        reason: impl Into<String>,
        actor: &ActorContext,
    ) -> EngineResult<()> {
        let mut next = self.clone();
        next.end_date = Some(end_date);
        next.termination_reason = Some(reason.into());
        transition(&mut next, ContractStatus::Terminated, actor)?;
        *self = next;
        Ok(())
    }
}

impl Lifecycle for Timesheet {
    type Status = TimesheetStatus;

    const KIND: EntityKind = EntityKind::Timesheet;

    fn id(&self) -> &str {
        &self.id
    }

    fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    fn status(&self) -> TimesheetStatus {
        self.status
    }

    fn set_status(&mut self, status: TimesheetStatus) {
        self.status = status;
    }

    fn allowed_targets(from: TimesheetStatus) -> &'static [TimesheetStatus] {
        use TimesheetStatus::*;
        match from {
            Draft => &[PendingValidation],
            PendingValidation => &[Validated, Rejected],
            Validated => &[Corrected],
            Corrected => &[PendingValidation],
            Rejected => &[],
        }
    }

    fn editable_statuses() -> &'static [TimesheetStatus] {
        &[
            TimesheetStatus::Draft,
            TimesheetStatus::PendingValidation,
            TimesheetStatus::Corrected,
        ]
    }

    fn deletable_statuses() -> &'static [TimesheetStatus] {
        &[TimesheetStatus::Draft]
    }

    fn check_transition(&self, target: TimesheetStatus, actor: &ActorContext) -> EngineResult<()> {
        match target {
            TimesheetStatus::Validated | TimesheetStatus::Rejected | TimesheetStatus::Corrected
                if !actor.role.is_approver() =>
            {
                Err(forbidden::<Self>(actor, format!("move to {target}")))
            }
            TimesheetStatus::Corrected if self.payslip_id.is_some() => {
                Err(self.precondition("already consumed by a payslip"))
            }
            _ => Ok(()),
        }
    }

    fn on_enter(&mut self, status: TimesheetStatus, actor: &ActorContext) {
        match status {
            TimesheetStatus::Validated | TimesheetStatus::Rejected => {
                self.reviewed_by = Some(actor.user_id.clone());
            }
            TimesheetStatus::PendingValidation => {
                self.reviewed_by = None;
                self.rejection_reason = None;
            }
            _ => {}
        }
    }
}

impl Timesheet {
    pub fn can_be_validated(&self) -> bool {
        self.status == TimesheetStatus::PendingValidation
    }

    /// Rejects a pending timesheet with a reason.
    pub fn reject(&mut self, reason: impl Into<String>, actor: &ActorContext) -> EngineResult<()> {
        let mut next = self.clone();
        transition(&mut next, TimesheetStatus::Rejected, actor)?;
        next.rejection_reason = Some(reason.into());
        *self = next;
        Ok(())
    }
}

impl Lifecycle for Payslip {
    type Status = PayslipStatus;

    const KIND: EntityKind = EntityKind::Payslip;

    fn id(&self) -> &str {
        &self.id
    }

    fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    fn status(&self) -> PayslipStatus {
        self.status
    }

    fn set_status(&mut self, status: PayslipStatus) {
        self.status = status;
    }

    fn allowed_targets(from: PayslipStatus) -> &'static [PayslipStatus] {
        use PayslipStatus::*;
        match from {
            Draft => &[Generated, Cancelled],
            Generated => &[Paid, Cancelled],
            Paid | Cancelled => &[],
        }
    }

    fn editable_statuses() -> &'static [PayslipStatus] {
        &[PayslipStatus::Draft, PayslipStatus::Generated]
    }

    fn deletable_statuses() -> &'static [PayslipStatus] {
        &[PayslipStatus::Draft, PayslipStatus::Cancelled]
    }

    fn check_transition(&self, target: PayslipStatus, actor: &ActorContext) -> EngineResult<()> {
        if actor.role == ActorRole::Worker {
            return Err(forbidden::<Self>(actor, format!("move to {target}")));
        }
        match target {
            PayslipStatus::Generated if self.number.is_none() => {
                Err(self.precondition("generation requires an allocated payslip number"))
            }
            PayslipStatus::Paid if self.payment_date.is_none() => {
                Err(self.precondition("marking paid requires a payment date"))
            }
            _ => Ok(()),
        }
    }
}

impl Payslip {
    pub fn can_be_generated(&self) -> bool {
        self.status == PayslipStatus::Draft
    }

    pub fn can_be_paid(&self) -> bool {
        self.status == PayslipStatus::Generated
    }

    pub fn mark_paid(&mut self, payment_date: NaiveDate, actor: &ActorContext) -> EngineResult<()> {
        let mut next = self.clone();
        next.payment_date = Some(payment_date);
        transition(&mut next, PayslipStatus::Paid, actor)?;
        *self = next;
        Ok(())
    }
}
