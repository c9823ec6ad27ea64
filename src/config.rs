//! Runtime settings.
//!
//! Read from environment variables so the binary can be configured
//! without flags.  Every variable is optional.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use log::info;

use crate::country::{load_country_configs_from_dir, StaticCountryRegistry, BUILTIN_VERSION, DEFAULT_COUNTRY};
use crate::service::EngineOptions;
use crate::timesheet::BucketPolicy;

pub const ENV_BIND_ADDR: &str = "PAYROLL_BIND_ADDR";
pub const ENV_COUNTRY_DIR: &str = "PAYROLL_COUNTRY_DIR";
pub const ENV_DEFAULT_COUNTRY: &str = "PAYROLL_DEFAULT_COUNTRY";
pub const ENV_STRICT_COUNTRY: &str = "PAYROLL_STRICT_COUNTRY";
pub const ENV_BUCKET_POLICY: &str = "PAYROLL_BUCKET_POLICY";

#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: String,
    pub country_dir: Option<PathBuf>,
    pub default_country: String,
    pub strict_country: bool,
    pub bucket_policy: BucketPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".to_string(),
            country_dir: None,
            default_country: DEFAULT_COUNTRY.to_string(),
            strict_country: false,
            bucket_policy: BucketPolicy::Additive,
        }
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(anyhow!("{name}: expected a boolean, got {other:?}")),
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds settings from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();
        if let Some(addr) = lookup(ENV_BIND_ADDR) {
            settings.bind_addr = addr;
        }
        settings.country_dir = lookup(ENV_COUNTRY_DIR).map(PathBuf::from);
        if let Some(code) = lookup(ENV_DEFAULT_COUNTRY) {
            settings.default_country = code.trim().to_ascii_uppercase();
        }
        if let Some(strict) = lookup(ENV_STRICT_COUNTRY) {
            settings.strict_country = parse_bool(ENV_STRICT_COUNTRY, &strict)?;
        }
        if let Some(policy) = lookup(ENV_BUCKET_POLICY) {
            settings.bucket_policy = policy
                .parse::<BucketPolicy>()
                .map_err(|err: String| anyhow!(err))
                .with_context(|| format!("invalid {ENV_BUCKET_POLICY}"))?;
        }
        Ok(settings)
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            policy: self.bucket_policy,
            strict_country: self.strict_country,
        }
    }

    /// Built-in table plus any JSON overrides from `country_dir`.
    pub fn country_registry(&self) -> Result<StaticCountryRegistry> {
        let overrides = match &self.country_dir {
            Some(dir) => load_country_configs_from_dir(dir)?,
            None => Vec::new(),
        };
        let version = if overrides.is_empty() {
            BUILTIN_VERSION.to_string()
        } else {
            format!("{BUILTIN_VERSION}+{}", overrides.len())
        };
        info!(
            "country registry {} with {} override(s), default {}",
            version,
            overrides.len(),
            self.default_country
        );
        StaticCountryRegistry::with_overrides(version, &self.default_country, overrides)
            .context("invalid country configuration")
    }
}
