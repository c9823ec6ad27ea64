//! Persistence boundary.
//!
//! [`PayrollStore`] is what the service layer needs from a relational
//! store: tenant-scoped reads, atomic read-modify-write of one entity,
//! atomic sequence counters and a unique-number registry, and an atomic
//! claim of validated timesheets by a payslip.  [`MemoryStore`] is the
//! in-process implementation backed by mutex-guarded maps.
//!
//! Lock order is payslips before timesheets; no method takes them in the
//! opposite order.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::NaiveDate;
use log::debug;

use crate::error::{EngineError, EngineResult};
use crate::lifecycle::{invalid_transition, Lifecycle};
use crate::models::{Contract, Payslip, Timesheet};
use crate::numbering::SequenceStore;
use crate::payroll::is_eligible;

/// Closure applied to a fresh copy of an entity inside the store's
/// critical section.  The copy is written back only if it returns `Ok`.
pub type Mutation<'a, T> = &'a mut dyn FnMut(&mut T) -> EngineResult<()>;

pub trait PayrollStore: SequenceStore {
    fn insert_contract(&self, contract: Contract) -> EngineResult<()>;
    /// Whether a contract with this id exists in any tenant.  Ids are
    /// unique across the store, as `insert_contract` enforces.
    fn contains_contract(&self, id: &str) -> bool;
    fn contract(&self, tenant_id: &str, id: &str) -> EngineResult<Contract>;
    fn update_contract(&self, tenant_id: &str, id: &str, mutation: Mutation<'_, Contract>) -> EngineResult<Contract>;
    fn delete_contract(&self, tenant_id: &str, id: &str) -> EngineResult<()>;

    fn insert_timesheet(&self, timesheet: Timesheet) -> EngineResult<()>;
    fn timesheet(&self, tenant_id: &str, id: &str) -> EngineResult<Timesheet>;
    fn update_timesheet(&self, tenant_id: &str, id: &str, mutation: Mutation<'_, Timesheet>) -> EngineResult<Timesheet>;
    fn delete_timesheet(&self, tenant_id: &str, id: &str) -> EngineResult<()>;
    fn worker_timesheets(
        &self,
        tenant_id: &str,
        worker_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> EngineResult<Vec<Timesheet>>;

    fn insert_payslip(&self, payslip: Payslip) -> EngineResult<()>;
    fn payslip(&self, tenant_id: &str, id: &str) -> EngineResult<Payslip>;
    fn update_payslip(&self, tenant_id: &str, id: &str, mutation: Mutation<'_, Payslip>) -> EngineResult<Payslip>;
    fn delete_payslip(&self, tenant_id: &str, id: &str) -> EngineResult<()>;

    /// Atomically marks every timesheet eligible for `payslip` as owned
    /// by it and returns them.  Timesheets already owned by another
    /// payslip are skipped.
    fn claim_timesheets(&self, payslip: &Payslip) -> EngineResult<Vec<Timesheet>>;

    /// Releases the timesheets owned by a payslip.
    fn release_timesheets(&self, tenant_id: &str, payslip_id: &str) -> EngineResult<usize>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One entity table keyed by id.
struct Table<T> {
    rows: Mutex<HashMap<String, T>>,
}

impl<T: Lifecycle> Table<T> {
    fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
        }
    }

    fn not_found(id: &str) -> EngineError {
        EngineError::NotFound {
            entity: T::KIND,
            id: id.to_string(),
        }
    }

    fn insert(&self, row: T) -> EngineResult<()> {
        let mut rows = lock(&self.rows);
        if rows.contains_key(row.id()) {
            return Err(EngineError::Duplicate {
                entity: T::KIND,
                id: row.id().to_string(),
            });
        }
        rows.insert(row.id().to_string(), row);
        Ok(())
    }

    fn contains(&self, id: &str) -> bool {
        lock(&self.rows).contains_key(id)
    }

    fn get(&self, tenant_id: &str, id: &str) -> EngineResult<T> {
        lock(&self.rows)
            .get(id)
            .filter(|row| row.tenant_id() == tenant_id)
            .cloned()
            .ok_or_else(|| Self::not_found(id))
    }

    fn update(&self, tenant_id: &str, id: &str, mutation: Mutation<'_, T>) -> EngineResult<T> {
        let mut rows = lock(&self.rows);
        let current = rows
            .get(id)
            .filter(|row| row.tenant_id() == tenant_id)
            .ok_or_else(|| Self::not_found(id))?;
        let mut next = current.clone();
        mutation(&mut next)?;
        rows.insert(id.to_string(), next.clone());
        Ok(next)
    }

    fn delete(&self, tenant_id: &str, id: &str) -> EngineResult<()> {
        let mut rows = lock(&self.rows);
        let current = rows
            .get(id)
            .filter(|row| row.tenant_id() == tenant_id)
            .ok_or_else(|| Self::not_found(id))?;
        if !current.can_be_deleted() {
            return Err(invalid_transition(current, "delete"));
        }
        rows.remove(id);
        Ok(())
    }
}

/// In-memory [`PayrollStore`].
pub struct MemoryStore {
    contracts: Table<Contract>,
    timesheets: Table<Timesheet>,
    payslips: Table<Payslip>,
    sequences: Mutex<HashMap<String, u32>>,
    numbers: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            contracts: Table::new(),
            timesheets: Table::new(),
            payslips: Table::new(),
            sequences: Mutex::new(HashMap::new()),
            numbers: Mutex::new(HashSet::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceStore for MemoryStore {
    fn next_sequence(&self, prefix: &str) -> EngineResult<u32> {
        let mut sequences = lock(&self.sequences);
        let counter = sequences.entry(prefix.to_string()).or_insert_with(|| {
            let marker = format!("{prefix}-");
            lock(&self.numbers)
                .iter()
                .filter(|n| n.starts_with(&marker))
                .count() as u32
        });
        *counter += 1;
        Ok(*counter)
    }

    fn reserve_number(&self, number: &str) -> EngineResult<bool> {
        Ok(lock(&self.numbers).insert(number.to_string()))
    }
}

impl PayrollStore for MemoryStore {
    fn insert_contract(&self, contract: Contract) -> EngineResult<()> {
        self.contracts.insert(contract)
    }

    fn contains_contract(&self, id: &str) -> bool {
        self.contracts.contains(id)
    }

    fn contract(&self, tenant_id: &str, id: &str) -> EngineResult<Contract> {
        self.contracts.get(tenant_id, id)
    }

    fn update_contract(&self, tenant_id: &str, id: &str, mutation: Mutation<'_, Contract>) -> EngineResult<Contract> {
        self.contracts.update(tenant_id, id, mutation)
    }

    fn delete_contract(&self, tenant_id: &str, id: &str) -> EngineResult<()> {
        self.contracts.delete(tenant_id, id)
    }

    fn insert_timesheet(&self, timesheet: Timesheet) -> EngineResult<()> {
        self.timesheets.insert(timesheet)
    }

    fn timesheet(&self, tenant_id: &str, id: &str) -> EngineResult<Timesheet> {
        self.timesheets.get(tenant_id, id)
    }

    fn update_timesheet(&self, tenant_id: &str, id: &str, mutation: Mutation<'_, Timesheet>) -> EngineResult<Timesheet> {
        self.timesheets.update(tenant_id, id, mutation)
    }

    fn delete_timesheet(&self, tenant_id: &str, id: &str) -> EngineResult<()> {
        self.timesheets.delete(tenant_id, id)
    }

    fn worker_timesheets(
        &self,
        tenant_id: &str,
        worker_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> EngineResult<Vec<Timesheet>> {
        let mut found: Vec<Timesheet> = lock(&self.timesheets.rows)
            .values()
            .filter(|ts| {
                ts.tenant_id == tenant_id && ts.worker_id == worker_id && ts.date >= from && ts.date <= to
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
        Ok(found)
    }

    fn insert_payslip(&self, payslip: Payslip) -> EngineResult<()> {
        self.payslips.insert(payslip)
    }

    fn payslip(&self, tenant_id: &str, id: &str) -> EngineResult<Payslip> {
        self.payslips.get(tenant_id, id)
    }

    fn update_payslip(&self, tenant_id: &str, id: &str, mutation: Mutation<'_, Payslip>) -> EngineResult<Payslip> {
        self.payslips.update(tenant_id, id, mutation)
    }

    fn delete_payslip(&self, tenant_id: &str, id: &str) -> EngineResult<()> {
        self.payslips.delete(tenant_id, id)
    }

    fn claim_timesheets(&self, payslip: &Payslip) -> EngineResult<Vec<Timesheet>> {
        let mut rows = lock(&self.timesheets.rows);
        let mut claimed: Vec<Timesheet> = rows
            .values_mut()
            .filter(|ts| is_eligible(payslip, ts))
            .map(|ts| {
                ts.payslip_id = Some(payslip.id.clone());
                ts.clone()
            })
            .collect();
        claimed.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
        debug!("payslip {} claimed {} timesheets", payslip.id, claimed.len());
        Ok(claimed)
    }

    fn release_timesheets(&self, tenant_id: &str, payslip_id: &str) -> EngineResult<usize> {
        let mut rows = lock(&self.timesheets.rows);
        let mut released = 0;
        for ts in rows.values_mut() {
            if ts.tenant_id == tenant_id && ts.payslip_id.as_deref() == Some(payslip_id) {
                ts.payslip_id = None;
                released += 1;
            }
        }
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContractStatus, ContractType, TimesheetStatus};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn contract() -> Contract {
        Contract::new("c1", "acme", "w1", ContractType::OpenEnded, date(2025, 1, 1), 200_000.0, "GA")
    }

    #[test]
    fn test_insert_rejects_duplicate_id() {
        let store = MemoryStore::new();
        store.insert_contract(contract()).unwrap();
        let err = store.insert_contract(contract()).unwrap_err();
        assert!(matches!(err, EngineError::Duplicate { .. }));
        assert!(store.contains_contract("c1"));
        assert!(!store.contains_contract("c2"));
    }

    #[test]
    fn test_reads_are_tenant_scoped() {
        let store = MemoryStore::new();
        store.insert_contract(contract()).unwrap();
        assert!(store.contract("acme", "c1").is_ok());
        assert!(matches!(
            store.contract("globex", "c1"),
            Err(EngineError::NotFound { .. })
        ));
    }

    #[test]
    fn test_failed_mutation_is_not_written() {
        let store = MemoryStore::new();
        store.insert_contract(contract()).unwrap();
        let result = store.update_contract("acme", "c1", &mut |c| {
            c.gross_salary = 1.0;
            Err(EngineError::UnknownCountry("XX".into()))
        });
        assert!(result.is_err());
        assert_eq!(store.contract("acme", "c1").unwrap().gross_salary, 200_000.0);
    }

    #[test]
    fn test_delete_only_from_deletable_status() {
        let store = MemoryStore::new();
        let mut active = contract();
        active.status = ContractStatus::Active;
        store.insert_contract(active).unwrap();
        let err = store.delete_contract("acme", "c1").unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
        store
            .update_contract("acme", "c1", &mut |c| {
                c.status = ContractStatus::Cancelled;
                Ok(())
            })
            .unwrap();
        store.delete_contract("acme", "c1").unwrap();
    }

    #[test]
    fn test_claim_is_exclusive_between_payslips() {
        let store = MemoryStore::new();
        for (id, day) in [("t1", 2), ("t2", 3)] {
            let mut ts = Timesheet::new(id, "acme", "w1", date(2025, 6, day), "GA");
            ts.status = TimesheetStatus::Validated;
            store.insert_timesheet(ts).unwrap();
        }
        let first = Payslip::new("p1", "acme", "w1", date(2025, 6, 1), date(2025, 6, 30), "GA");
        let second = Payslip::new("p2", "acme", "w1", date(2025, 6, 1), date(2025, 6, 30), "GA");
        assert_eq!(store.claim_timesheets(&first).unwrap().len(), 2);
        assert!(store.claim_timesheets(&second).unwrap().is_empty());
        // Re-claiming by the owner is idempotent.
        assert_eq!(store.claim_timesheets(&first).unwrap().len(), 2);

        assert_eq!(store.release_timesheets("acme", "p1").unwrap(), 2);
        assert_eq!(store.claim_timesheets(&second).unwrap().len(), 2);
    }
}
