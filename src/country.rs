//! Country configuration registry.
//!
//! Every calculation in the engine is parameterised by a
//! [`CountryConfig`]: working hours, surcharge percentages, social
//! charge rates, income tax brackets, minimum wage and fixed public
//! holidays.  Configs are served by a [`CountryConfigProvider`] so the
//! table can be swapped or versioned; [`StaticCountryRegistry`] ships
//! the CEMAC countries and can be extended from JSON files.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::models::ContractType;

/// Version stamped into the built-in table.
pub const BUILTIN_VERSION: &str = "cemac-2025.1";

/// Country used when an unknown code is resolved.
pub const DEFAULT_COUNTRY: &str = "GA";

/// A month/day pair, year independent.  Serialised as `"MM-DD"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MonthDay {
    pub month: u32,
    pub day: u32,
}

impl MonthDay {
    pub const fn new(month: u32, day: u32) -> Self {
        Self { month, day }
    }

    pub fn matches(&self, date: NaiveDate) -> bool {
        date.month() == self.month && date.day() == self.day
    }
}

impl TryFrom<String> for MonthDay {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        let (m, d) = value
            .split_once('-')
            .ok_or_else(|| format!("expected MM-DD, got {value:?}"))?;
        let month: u32 = m.parse().map_err(|_| format!("invalid month in {value:?}"))?;
        let day: u32 = d.parse().map_err(|_| format!("invalid day in {value:?}"))?;
        if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
            return Err(format!("out of range month/day {value:?}"));
        }
        Ok(MonthDay { month, day })
    }
}

impl From<MonthDay> for String {
    fn from(value: MonthDay) -> Self {
        value.to_string()
    }
}

impl fmt::Display for MonthDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}-{:02}", self.month, self.day)
    }
}

/// A progressive income tax band.  Income between `min` and `max` is
/// taxed at `rate` percent; `max == None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaxBracket {
    pub min: f64,
    #[serde(default)]
    pub max: Option<f64>,
    pub rate: f64,
}

impl TaxBracket {
    pub const fn new(min: f64, max: Option<f64>, rate: f64) -> Self {
        Self { min, max, rate }
    }
}

/// Default trial period length per contract type, in days.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrialPeriods {
    pub fixed_term: u32,
    pub open_ended: u32,
    pub assignment: u32,
    pub internship: u32,
}

impl TrialPeriods {
    pub fn for_type(&self, contract_type: ContractType) -> u32 {
        match contract_type {
            ContractType::FixedTerm => self.fixed_term,
            ContractType::OpenEnded => self.open_ended,
            ContractType::Assignment => self.assignment,
            ContractType::Internship => self.internship,
        }
    }
}

impl Default for TrialPeriods {
    fn default() -> Self {
        Self {
            fixed_term: 30,
            open_ended: 90,
            assignment: 15,
            internship: 30,
        }
    }
}

/// Payroll parameters for one country.  Percentages are expressed as
/// percent (e.g. `28.0` for 28%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryConfig {
    pub code: String,
    pub name: String,
    pub currency: String,
    /// Registry version this config was resolved from.
    #[serde(default)]
    pub version: String,
    pub weekly_hours: f64,
    /// Worked hours per day beyond which minutes count as overtime.
    pub daily_hours: f64,
    pub overtime_rate: f64,
    pub night_rate: f64,
    pub sunday_rate: f64,
    pub holiday_rate: f64,
    pub social_charge_rate: f64,
    pub employer_charge_rate: f64,
    pub employee_charge_rate: f64,
    /// Monthly minimum wage.
    pub minimum_wage: f64,
    #[serde(default = "default_night_start")]
    pub night_start_hour: u32,
    #[serde(default = "default_night_end")]
    pub night_end_hour: u32,
    #[serde(default)]
    pub holidays: Vec<MonthDay>,
    pub tax_brackets: Vec<TaxBracket>,
    #[serde(default)]
    pub trial_periods: TrialPeriods,
}

fn default_night_start() -> u32 {
    22
}

fn default_night_end() -> u32 {
    5
}

impl CountryConfig {
    /// Legal working minutes in one day.
    pub fn daily_threshold_minutes(&self) -> i64 {
        (self.daily_hours * 60.0).round() as i64
    }

    /// Paid hours in one month: weekly hours over 52 weeks / 12 months.
    pub fn monthly_hours(&self) -> f64 {
        self.weekly_hours * 52.0 / 12.0
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.iter().any(|h| h.matches(date))
    }

    /// Whether the given clock hour falls in the night window.  The
    /// window may wrap past midnight (22 -> 5).
    pub fn is_night_hour(&self, hour: u32) -> bool {
        let (start, end) = (self.night_start_hour, self.night_end_hour);
        if start == end {
            false
        } else if start < end {
            hour >= start && hour < end
        } else {
            hour >= start || hour < end
        }
    }

    /// Checks the invariants the calculations rely on.
    pub fn validate(&self) -> EngineResult<()> {
        let invalid = |reason: String| EngineError::InvalidConfig {
            code: self.code.clone(),
            reason,
        };
        if self.tax_brackets.is_empty() {
            return Err(invalid("no tax brackets".into()));
        }
        if self.tax_brackets[0].min != 0.0 {
            return Err(invalid("first tax bracket must start at 0".into()));
        }
        for pair in self.tax_brackets.windows(2) {
            match pair[0].max {
                Some(max) if max == pair[1].min && max > pair[0].min => {}
                Some(max) => {
                    return Err(invalid(format!(
                        "bracket ending at {max} is not contiguous with bracket starting at {}",
                        pair[1].min
                    )))
                }
                None => return Err(invalid("only the last bracket may be unbounded".into())),
            }
        }
        if let Some(last) = self.tax_brackets.last() {
            if last.max.is_some() {
                return Err(invalid("last tax bracket must be unbounded".into()));
            }
        }
        let split = self.employer_charge_rate + self.employee_charge_rate;
        if (split - self.social_charge_rate).abs() > 1e-9 {
            return Err(invalid(format!(
                "employer {}% + employee {}% != total {}%",
                self.employer_charge_rate, self.employee_charge_rate, self.social_charge_rate
            )));
        }
        if self.night_start_hour > 23 || self.night_end_hour > 23 {
            return Err(invalid("night window hours must be 0-23".into()));
        }
        Ok(())
    }
}

/// Source of country configurations.  Implementations must be cheap to
/// query and safe to share between threads.
pub trait CountryConfigProvider: Send + Sync {
    /// Version of the table, stamped on every resolved config.
    fn version(&self) -> &str;
    fn get(&self, code: &str) -> Option<&CountryConfig>;
    /// Config used for unknown codes.
    fn fallback(&self) -> &CountryConfig;
    fn codes(&self) -> Vec<String>;

    /// Resolves a code, falling back to the default country when it is
    /// unknown.  Never fails.
    fn resolve(&self, code: &str) -> CountryConfig {
        let normalized = code.trim().to_ascii_uppercase();
        match self.get(&normalized) {
            Some(config) => config.clone(),
            None => {
                warn!(
                    "unknown country code {:?}, falling back to {}",
                    code,
                    self.fallback().code
                );
                self.fallback().clone()
            }
        }
    }

    /// Like [`resolve`](Self::resolve) but rejects unknown codes.
    fn resolve_strict(&self, code: &str) -> EngineResult<CountryConfig> {
        let normalized = code.trim().to_ascii_uppercase();
        self.get(&normalized)
            .cloned()
            .ok_or_else(|| EngineError::UnknownCountry(code.to_string()))
    }
}

/// In-memory country table.
#[derive(Debug, Clone)]
pub struct StaticCountryRegistry {
    version: String,
    default_code: String,
    configs: BTreeMap<String, CountryConfig>,
}

impl StaticCountryRegistry {
    /// Builds a registry from a list of configs.  Every config is
    /// validated and the default code must be present.
    pub fn new(
        version: impl Into<String>,
        default_code: &str,
        configs: Vec<CountryConfig>,
    ) -> EngineResult<Self> {
        let version = version.into();
        let mut map = BTreeMap::new();
        for mut config in configs {
            config.code = config.code.trim().to_ascii_uppercase();
            config.version = version.clone();
            config.validate()?;
            map.insert(config.code.clone(), config);
        }
        let default_code = default_code.trim().to_ascii_uppercase();
        if !map.contains_key(&default_code) {
            return Err(EngineError::UnknownCountry(default_code));
        }
        Ok(Self {
            version,
            default_code,
            configs: map,
        })
    }

    /// The six CEMAC countries with their current parameters.
    pub fn builtin() -> Self {
        Self {
            version: BUILTIN_VERSION.to_string(),
            default_code: DEFAULT_COUNTRY.to_string(),
            configs: builtin_configs()
                .into_iter()
                .map(|mut c| {
                    c.version = BUILTIN_VERSION.to_string();
                    (c.code.clone(), c)
                })
                .collect(),
        }
    }

    /// Returns a copy of the built-in table with `overrides` added or
    /// replacing existing entries.
    pub fn with_overrides(
        version: impl Into<String>,
        default_code: &str,
        overrides: Vec<CountryConfig>,
    ) -> EngineResult<Self> {
        let mut configs: BTreeMap<String, CountryConfig> = builtin_configs()
            .into_iter()
            .map(|c| (c.code.clone(), c))
            .collect();
        for config in overrides {
            debug!("country override for {}", config.code);
            configs.insert(config.code.trim().to_ascii_uppercase(), config);
        }
        Self::new(version, default_code, configs.into_values().collect())
    }
}

impl CountryConfigProvider for StaticCountryRegistry {
    fn version(&self) -> &str {
        &self.version
    }

    fn get(&self, code: &str) -> Option<&CountryConfig> {
        self.configs.get(code)
    }

    fn fallback(&self) -> &CountryConfig {
        // `new` and `builtin` guarantee the default code is present.
        &self.configs[&self.default_code]
    }

    fn codes(&self) -> Vec<String> {
        self.configs.keys().cloned().collect()
    }
}

/// Load country configurations from every `.json` file in a directory.
///
/// Files that fail to parse are logged and skipped.  A missing
/// directory yields an empty list.
pub fn load_country_configs_from_dir(path: &Path) -> Result<Vec<CountryConfig>> {
    let mut configs = Vec::new();
    if !path.is_dir() {
        return Ok(configs);
    }
    for entry in std::fs::read_dir(path)
        .with_context(|| format!("failed to read country config directory {:?}", path))?
    {
        let entry = entry?;
        let file = entry.path();
        if !entry.file_type()?.is_file() || file.extension().map_or(true, |ext| ext != "json") {
            continue;
        }
        let data = std::fs::read_to_string(&file)
            .with_context(|| format!("failed to read {:?}", file))?;
        match serde_json::from_str::<CountryConfig>(&data) {
            Ok(config) => configs.push(config),
            Err(err) => warn!("failed to parse country config {:?}: {}", file, err),
        }
    }
    Ok(configs)
}

fn holidays(days: &[(u32, u32)]) -> Vec<MonthDay> {
    days.iter().map(|&(m, d)| MonthDay::new(m, d)).collect()
}

#[allow(clippy::too_many_arguments)]
fn base_config(
    code: &str,
    name: &str,
    weekly_hours: f64,
    surcharges: [f64; 4],
    charges: (f64, f64),
    minimum_wage: f64,
    holiday_days: &[(u32, u32)],
    tax_brackets: Vec<TaxBracket>,
) -> CountryConfig {
    let [overtime_rate, night_rate, sunday_rate, holiday_rate] = surcharges;
    let (employer, employee) = charges;
    CountryConfig {
        code: code.to_string(),
        name: name.to_string(),
        currency: "XAF".to_string(),
        version: String::new(),
        weekly_hours,
        daily_hours: weekly_hours / 5.0,
        overtime_rate,
        night_rate,
        sunday_rate,
        holiday_rate,
        social_charge_rate: employer + employee,
        employer_charge_rate: employer,
        employee_charge_rate: employee,
        minimum_wage,
        night_start_hour: default_night_start(),
        night_end_hour: default_night_end(),
        holidays: holidays(holiday_days),
        tax_brackets,
        trial_periods: TrialPeriods::default(),
    }
}

fn builtin_configs() -> Vec<CountryConfig> {
    vec![
        base_config(
            "CM",
            "Cameroun",
            40.0,
            [20.0, 35.0, 40.0, 100.0],
            (16.2, 4.2),
            41_875.0,
            &[(1, 1), (2, 11), (5, 1), (5, 20), (8, 15), (12, 25)],
            vec![
                TaxBracket::new(0.0, Some(62_000.0), 0.0),
                TaxBracket::new(62_000.0, Some(166_667.0), 10.0),
                TaxBracket::new(166_667.0, Some(250_000.0), 15.0),
                TaxBracket::new(250_000.0, Some(416_667.0), 25.0),
                TaxBracket::new(416_667.0, None, 35.0),
            ],
        ),
        base_config(
            "GA",
            "Gabon",
            40.0,
            [25.0, 50.0, 50.0, 100.0],
            (21.5, 6.5),
            150_000.0,
            &[(1, 1), (4, 17), (5, 1), (8, 16), (8, 17), (11, 1), (12, 25)],
            vec![
                TaxBracket::new(0.0, Some(50_000.0), 0.0),
                TaxBracket::new(50_000.0, Some(100_000.0), 5.0),
                TaxBracket::new(100_000.0, Some(300_000.0), 10.0),
                TaxBracket::new(300_000.0, Some(600_000.0), 15.0),
                TaxBracket::new(600_000.0, Some(1_200_000.0), 25.0),
                TaxBracket::new(1_200_000.0, None, 35.0),
            ],
        ),
        base_config(
            "CG",
            "Congo",
            40.0,
            [10.0, 50.0, 50.0, 100.0],
            (20.28, 4.0),
            90_000.0,
            &[(1, 1), (5, 1), (6, 10), (8, 15), (11, 1), (11, 28), (12, 25)],
            vec![
                TaxBracket::new(0.0, Some(40_000.0), 0.0),
                TaxBracket::new(40_000.0, Some(150_000.0), 10.0),
                TaxBracket::new(150_000.0, Some(300_000.0), 20.0),
                TaxBracket::new(300_000.0, Some(1_000_000.0), 30.0),
                TaxBracket::new(1_000_000.0, None, 40.0),
            ],
        ),
        base_config(
            "TD",
            "Tchad",
            39.0,
            [10.0, 50.0, 50.0, 100.0],
            (16.5, 3.5),
            60_000.0,
            &[(1, 1), (5, 1), (5, 25), (8, 11), (11, 28), (12, 1), (12, 25)],
            vec![
                TaxBracket::new(0.0, Some(66_667.0), 0.0),
                TaxBracket::new(66_667.0, Some(208_333.0), 10.0),
                TaxBracket::new(208_333.0, Some(416_667.0), 20.0),
                TaxBracket::new(416_667.0, Some(833_333.0), 30.0),
                TaxBracket::new(833_333.0, None, 35.0),
            ],
        ),
        base_config(
            "CF",
            "Centrafrique",
            40.0,
            [15.0, 50.0, 50.0, 100.0],
            (19.0, 3.0),
            35_000.0,
            &[(1, 1), (3, 29), (5, 1), (6, 30), (8, 13), (12, 1), (12, 25)],
            vec![
                TaxBracket::new(0.0, Some(41_667.0), 0.0),
                TaxBracket::new(41_667.0, Some(125_000.0), 10.0),
                TaxBracket::new(125_000.0, Some(250_000.0), 20.0),
                TaxBracket::new(250_000.0, None, 30.0),
            ],
        ),
        base_config(
            "GQ",
            "Guinée Équatoriale",
            40.0,
            [25.0, 50.0, 50.0, 100.0],
            (21.5, 4.5),
            129_000.0,
            &[(1, 1), (5, 1), (6, 5), (8, 3), (8, 15), (10, 12), (12, 8), (12, 25)],
            vec![
                TaxBracket::new(0.0, Some(83_333.0), 0.0),
                TaxBracket::new(83_333.0, Some(250_000.0), 10.0),
                TaxBracket::new(250_000.0, Some(500_000.0), 15.0),
                TaxBracket::new(500_000.0, Some(833_333.0), 20.0),
                TaxBracket::new(833_333.0, None, 35.0),
            ],
        ),
    ]
}
