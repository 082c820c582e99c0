use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::Source;
use crate::error::KiraError;
use crate::source::RetryPolicy;

pub const DEFAULT_DELAY_SECS: f64 = 0.8;
pub const DEFAULT_RETRY_DELAY_SECS: f64 = 2.0;
pub const DELAY_ENV: &str = "SLEEP_SEC";
pub const MAX_HITS_ENV: &str = "MAX_HITS";

pub const DEFAULT_ENA_BASE_URL: &str = "https://www.ebi.ac.uk/ena/portal/api";
pub const DEFAULT_ENA_FIELDS: &[&str] = &[
    "study_accession",
    "secondary_study_accession",
    "sample_accession",
    "run_accession",
    "read_count",
    "base_count",
    "library_strategy",
    "library_source",
    "library_selection",
    "library_layout",
    "instrument_platform",
    "instrument_model",
    "scientific_name",
    "tax_id",
];

/// Optional JSON config file. Every field may be omitted.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct FetchConfig {
    #[serde(default)]
    pub delay_secs: Option<f64>,
    #[serde(default)]
    pub max_hits: Option<u64>,
    #[serde(default)]
    pub retries: Option<u32>,
    #[serde(default)]
    pub retry_delay_secs: Option<f64>,
    #[serde(default)]
    pub ena: EnaConfig,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct EnaConfig {
    #[serde(default)]
    pub fields: Option<Vec<String>>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Values given on the command line; they win over everything else.
#[derive(Debug, Clone, Default)]
pub struct FetchOverrides {
    pub delay_secs: Option<f64>,
    pub max_hits: Option<u64>,
    pub retries: Option<u32>,
    pub retry_delay_secs: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct EnaOverrides {
    pub fields: Option<Vec<String>>,
    pub limit: Option<u64>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub delay: Duration,
    pub max_hits: Option<u64>,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnaSettings {
    pub base_url: String,
    pub fields: Vec<String>,
    /// `0` asks the portal for all results.
    pub limit: u64,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load(path: Option<&Path>) -> Result<FetchConfig, KiraError> {
        let Some(path) = path else {
            return Ok(FetchConfig::default());
        };
        let content =
            fs::read_to_string(path).map_err(|_| KiraError::ConfigRead(path.to_path_buf()))?;
        serde_json::from_str(&content).map_err(|err| KiraError::ConfigParse(err.to_string()))
    }

    /// Precedence: command line, then environment, then config file, then
    /// the per-source default.
    pub fn resolve_run<E>(
        source: Source,
        config: &FetchConfig,
        overrides: &FetchOverrides,
        env: E,
    ) -> Result<RunSettings, KiraError>
    where
        E: Fn(&str) -> Option<String>,
    {
        let env_delay = env(DELAY_ENV)
            .map(|value| parse_env::<f64>(DELAY_ENV, &value))
            .transpose()?;
        let env_max_hits = env(MAX_HITS_ENV)
            .map(|value| parse_env::<u64>(MAX_HITS_ENV, &value))
            .transpose()?;

        let delay_secs = overrides
            .delay_secs
            .or(env_delay)
            .or(config.delay_secs)
            .unwrap_or(DEFAULT_DELAY_SECS);
        let retry_delay_secs = overrides
            .retry_delay_secs
            .or(config.retry_delay_secs)
            .unwrap_or(DEFAULT_RETRY_DELAY_SECS);

        Ok(RunSettings {
            delay: secs_to_duration("delay", delay_secs)?,
            max_hits: overrides.max_hits.or(env_max_hits).or(config.max_hits),
            retry: RetryPolicy {
                retries: overrides
                    .retries
                    .or(config.retries)
                    .unwrap_or_else(|| source.default_retries()),
                backoff: secs_to_duration("retry delay", retry_delay_secs)?,
            },
        })
    }

    pub fn resolve_ena(config: &EnaConfig, overrides: &EnaOverrides) -> EnaSettings {
        let fields = overrides
            .fields
            .clone()
            .or_else(|| config.fields.clone())
            .filter(|fields| !fields.is_empty())
            .unwrap_or_else(default_ena_fields);
        EnaSettings {
            base_url: overrides
                .base_url
                .clone()
                .or_else(|| config.base_url.clone())
                .unwrap_or_else(|| DEFAULT_ENA_BASE_URL.to_string()),
            fields,
            limit: overrides.limit.or(config.limit).unwrap_or(0),
        }
    }
}

pub fn default_ena_fields() -> Vec<String> {
    DEFAULT_ENA_FIELDS.iter().map(|field| field.to_string()).collect()
}

/// Reads a variable from the process environment, treating blank as unset.
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, KiraError> {
    value.trim().parse().map_err(|_| KiraError::InvalidSetting {
        name: name.to_string(),
        value: value.to_string(),
    })
}

fn secs_to_duration(name: &str, secs: f64) -> Result<Duration, KiraError> {
    Duration::try_from_secs_f64(secs).map_err(|_| KiraError::InvalidSetting {
        name: name.to_string(),
        value: secs.to_string(),
    })
}
