//! HTTP API for the Payroll Engine.
//!
//! This module exposes a small REST API around the pure calculations
//! using the [`axum`](https://crates.io/crates/axum) framework.  Clients
//! can look up country parameters, decompose a worked day, compute a
//! single payslip or submit a whole payroll run and receive the results
//! in JSON.  The server is stateless: nothing is persisted.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::country::{CountryConfig, CountryConfigProvider};
use crate::error::{EngineError, EngineResult};
use crate::lifecycle::Lifecycle;
use crate::models::{AmountBuckets, BucketRates, HourBuckets, PayRunInput, PayRunResult, Payslip, Timesheet, TimesheetEntry};
use crate::payroll::{pinned_config, recompute_payslip, run_payroll};
use crate::service::EngineOptions;
use crate::timesheet::{decompose, displacement_km, BreakSpec, BucketPolicy};
use crate::wage::price_buckets;

/// Application state shared across requests.
pub struct AppState {
    pub provider: Arc<dyn CountryConfigProvider>,
    pub options: EngineOptions,
}

impl AppState {
    fn resolve(&self, code: &str) -> EngineResult<CountryConfig> {
        if self.options.strict_country {
            self.provider.resolve_strict(code)
        } else {
            Ok(self.provider.resolve(code))
        }
    }
}

/// Engine errors rendered as `{"error": ...}` with a matching status.
#[derive(Debug)]
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::NotFound { .. } | EngineError::UnknownCountry(_) => StatusCode::NOT_FOUND,
            EngineError::Forbidden { .. } => StatusCode::FORBIDDEN,
            EngineError::InvalidTransition { .. }
            | EngineError::NotEditable { .. }
            | EngineError::Duplicate { .. } => StatusCode::CONFLICT,
            EngineError::Precondition { .. } | EngineError::InvalidConfig { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            EngineError::SequenceExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
        };
        warn!("request failed: {}", self.0);
        let body = Json(serde_json::json!({"error": self.0.to_string()}));
        (status, body).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct CountryList {
    pub version: String,
    pub default_country: String,
    pub codes: Vec<String>,
}

/// A single worked day to split into buckets.
#[derive(Debug, Deserialize)]
pub struct DecomposeRequest {
    pub date: NaiveDate,
    pub country_code: String,
    #[serde(flatten)]
    pub entry: TimesheetEntry,
    /// Overrides the server's bucket policy for this request.
    #[serde(default)]
    pub policy: Option<BucketPolicy>,
}

#[derive(Debug, Serialize)]
pub struct DecomposeResponse {
    pub country_code: String,
    pub worked_minutes: i64,
    pub minutes: HourBuckets,
    pub distance_km: f64,
    pub rates: BucketRates,
    pub amounts: AmountBuckets,
    pub total_amount: f64,
}

#[derive(Debug, Deserialize)]
pub struct ComputePayslipRequest {
    pub payslip: Payslip,
    /// When present the payslip buckets are rebuilt from these.
    #[serde(default)]
    pub timesheets: Option<Vec<Timesheet>>,
}

/// Build the API router around the given state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/countries", get(list_countries_handler))
        .route("/api/countries/:code", get(country_handler))
        .route("/api/timesheets/decompose", post(decompose_handler))
        .route("/api/payslips/compute", post(compute_payslip_handler))
        .route("/api/payroll/run", post(run_payroll_handler))
        .with_state(state)
}

/// Build the API router and load the country registry described by the
/// settings.  Returns the router and a handle to the state.
pub fn build_router(settings: &Settings) -> Result<(Router, Arc<AppState>)> {
    let registry = settings.country_registry()?;
    let state = Arc::new(AppState {
        provider: Arc::new(registry),
        options: settings.engine_options(),
    });
    Ok((router(state.clone()), state))
}

/// Handler for GET /api/countries
async fn list_countries_handler(State(state): State<Arc<AppState>>) -> Json<CountryList> {
    Json(CountryList {
        version: state.provider.version().to_string(),
        default_country: state.provider.fallback().code.clone(),
        codes: state.provider.codes(),
    })
}

/// Handler for GET /api/countries/:code
async fn country_handler(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<CountryConfig>, ApiError> {
    Ok(Json(state.resolve(&code)?))
}

/// Handler for POST /api/timesheets/decompose
async fn decompose_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DecomposeRequest>,
) -> Result<Json<DecomposeResponse>, ApiError> {
    let config = state.resolve(&request.country_code)?;
    let entry = request.entry;
    let policy = request.policy.unwrap_or(state.options.policy);
    let break_spec = BreakSpec::from_parts(entry.break_start, entry.break_end, entry.break_minutes);
    let decomposition = decompose(
        request.date,
        entry.start_time,
        entry.end_time,
        break_spec,
        &config,
        policy,
    );
    let priced = price_buckets(
        &decomposition.minutes,
        entry.base_hourly_rate.unwrap_or(0.0),
        &config,
    );
    Ok(Json(DecomposeResponse {
        country_code: config.code,
        worked_minutes: decomposition.worked_minutes,
        minutes: decomposition.minutes,
        distance_km: displacement_km(entry.start_location, entry.end_location),
        rates: priced.rates,
        amounts: priced.amounts,
        total_amount: priced.total,
    }))
}

/// Handler for POST /api/payslips/compute
async fn compute_payslip_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ComputePayslipRequest>,
) -> Result<Json<Payslip>, ApiError> {
    let mut payslip = request.payslip;
    payslip.ensure_modifiable()?;
    if state.options.strict_country {
        state.provider.resolve_strict(&payslip.country_code)?;
    }
    let config = pinned_config(
        payslip.config_snapshot.as_ref(),
        &payslip.country_code,
        state.provider.as_ref(),
    );
    recompute_payslip(&mut payslip, request.timesheets.as_deref(), &config);
    Ok(Json(payslip))
}

/// Handler for POST /api/payroll/run
async fn run_payroll_handler(
    State(state): State<Arc<AppState>>,
    Json(input): Json<PayRunInput>,
) -> Result<Json<PayRunResult>, ApiError> {
    if state.options.strict_country {
        for payslip in &input.payslips {
            state.provider.resolve_strict(&payslip.country_code)?;
        }
    }
    Ok(Json(run_payroll(input, state.provider.as_ref())))
}

/// Launch the API server.  This function builds the router from the
/// settings and binds to the configured address.  It blocks until the
/// server terminates (e.g. when interrupted).
pub async fn serve(settings: Settings) -> Result<()> {
    let (router, _state) = build_router(&settings)?;
    let listener = tokio::net::TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind_addr))?;
    info!("server listening on {}", settings.bind_addr);
    axum::serve(listener, router).await.context("server error")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::country::StaticCountryRegistry;
    use crate::models::{PayslipStatus, TimesheetStatus};
    use chrono::NaiveTime;

    fn state(strict: bool) -> State<Arc<AppState>> {
        State(Arc::new(AppState {
            provider: Arc::new(StaticCountryRegistry::builtin()),
            options: EngineOptions {
                policy: BucketPolicy::Additive,
                strict_country: strict,
            },
        }))
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[tokio::test]
    async fn test_country_lookup_falls_back_unless_strict() {
        let Json(config) = country_handler(state(false), Path("zz".to_string())).await.unwrap();
        assert_eq!(config.code, "GA");
        let err = country_handler(state(true), Path("zz".to_string())).await.err().unwrap();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_decompose_night_shift() {
        let request = DecomposeRequest {
            date: date(2025, 6, 10),
            country_code: "GA".to_string(),
            entry: TimesheetEntry {
                start_time: Some(time(22, 0)),
                end_time: Some(time(6, 0)),
                break_minutes: Some(30),
                base_hourly_rate: Some(1000.0),
                ..TimesheetEntry::default()
            },
            policy: None,
        };
        let Json(response) = decompose_handler(state(false), Json(request)).await.unwrap();
        assert_eq!(response.worked_minutes, 450);
        assert_eq!(response.minutes.night, 420);
        assert_eq!(response.minutes.normal, 30);
        assert_eq!(response.rates.night, 1500.0);
    }

    #[tokio::test]
    async fn test_compute_payslip_from_timesheets() {
        let payslip = Payslip::new("p-1", "t-1", "w-1", date(2025, 6, 1), date(2025, 6, 30), "GA");
        let mut sheet = Timesheet::new("ts-1", "t-1", "w-1", date(2025, 6, 10), "GA");
        sheet.status = TimesheetStatus::Validated;
        sheet.minutes.normal = 480;
        sheet.amounts.normal = 8000.0;
        sheet.total_amount = 8000.0;
        let request = ComputePayslipRequest {
            payslip,
            timesheets: Some(vec![sheet]),
        };
        let Json(payslip) = compute_payslip_handler(state(false), Json(request)).await.unwrap();
        assert_eq!(payslip.minutes.normal, 480);
        assert_eq!(payslip.gross_total, 8000.0);
        assert_eq!(payslip.social_charges, 2240.0);
        assert_eq!(payslip.timesheet_ids, vec!["ts-1".to_string()]);
    }

    #[tokio::test]
    async fn test_compute_rejects_paid_payslip() {
        let mut payslip = Payslip::new("p-2", "t-1", "w-1", date(2025, 6, 1), date(2025, 6, 30), "GA");
        payslip.status = PayslipStatus::Paid;
        let request = ComputePayslipRequest {
            payslip,
            timesheets: None,
        };
        let err = compute_payslip_handler(state(false), Json(request)).await.err().unwrap();
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }
}
