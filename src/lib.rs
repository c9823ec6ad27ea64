//! Payroll Engine library crate.
//!
//! This crate exposes the CEMAC payroll and timesheet engine as
//! reusable modules: the country parameter registry, the timesheet
//! decomposition, wage and payslip calculations, the contract,
//! timesheet and payslip lifecycles, and an HTTP API.  External
//! applications may depend on the `payroll_engine` crate and call
//! [`payroll::run_payroll`] or [`service::PayrollService`] directly,
//! or embed the API via [`api::build_router`].

pub mod api;
pub mod config;
pub mod contract;
pub mod country;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod numbering;
pub mod payroll;
pub mod service;
pub mod store;
pub mod tax;
pub mod timesheet;
pub mod wage;

pub use country::{CountryConfig, CountryConfigProvider, StaticCountryRegistry};
pub use error::{EngineError, EngineResult, EntityKind};
pub use lifecycle::Lifecycle;
pub use service::{EngineOptions, PayrollService};
pub use store::{MemoryStore, PayrollStore};
