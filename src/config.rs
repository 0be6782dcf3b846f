use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::RunError;
use crate::retry::RetryPolicy;

const DEFAULT_EVENTS_BASE_URL: &str = "https://api.sofascore.com/api/v1/sport/tennis";
const DEFAULT_EVENT_BASE_URL: &str = "https://api.sofascore.com/api/v1";

/// What happens when a reference entity (category, tournament, season, team,
/// player) is seen again with different attributes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReferencePolicy {
    /// First write wins; later sightings never touch stored attributes.
    #[default]
    CreateOnce,
    /// Every sighting overwrites the stored attributes.
    AlwaysRefresh,
}

impl FromStr for ReferencePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "create-once" | "create_once" => Ok(Self::CreateOnce),
            "always-refresh" | "always_refresh" => Ok(Self::AlwaysRefresh),
            other => Err(anyhow!(
                "unknown reference policy '{}' (expected create-once or always-refresh)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Prefix of `/scheduled-events/{date}`
    pub events_base_url: String,
    /// Prefix of `/event/{id}/statistics`
    pub event_base_url: String,
    pub requests_per_minute: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            events_base_url: DEFAULT_EVENTS_BASE_URL.to_string(),
            event_base_url: DEFAULT_EVENT_BASE_URL.to_string(),
            requests_per_minute: 30,
        }
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub health_port: Option<u16>,
    pub api: ApiConfig,
    pub retry: RetryPolicy,
    pub max_range_days: u32,
    /// Keep only events whose tournament slug contains this (case-insensitive)
    pub tournament_filter: Option<String>,
    pub reference_policy: ReferencePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            redis_url: None,
            health_port: None,
            api: ApiConfig::default(),
            retry: RetryPolicy::default(),
            max_range_days: 31,
            tournament_filter: None,
            reference_policy: ReferencePolicy::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        // Set-but-blank is a deployment mistake, not "unset".
        let optional = |key: &str| -> Result<Option<String>> {
            match lookup(key) {
                Some(v) if v.trim().is_empty() => Err(anyhow!("{} is set but empty", key)),
                Some(v) => Ok(Some(v.trim().to_string())),
                None => Ok(None),
            }
        };
        let number = |key: &str, default: u64| -> u64 {
            lookup(key)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };

        let retry = RetryPolicy {
            max_retries: number("RETRY_MAX_RETRIES", defaults.retry.max_retries as u64) as u32,
            initial_delay: Duration::from_millis(number(
                "RETRY_INITIAL_DELAY_MS",
                defaults.retry.initial_delay.as_millis() as u64,
            )),
            max_delay: Duration::from_millis(number(
                "RETRY_MAX_DELAY_MS",
                defaults.retry.max_delay.as_millis() as u64,
            )),
            multiplier: defaults.retry.multiplier,
        };

        let reference_policy = match optional("REFERENCE_POLICY")? {
            Some(v) => v.parse()?,
            None => defaults.reference_policy,
        };

        Ok(Self {
            database_url: optional("DATABASE_URL")?,
            redis_url: optional("REDIS_URL")?,
            health_port: lookup("HEALTH_PORT").and_then(|v| v.trim().parse().ok()),
            api: ApiConfig {
                events_base_url: optional("SOFASCORE_BASE_URL")?
                    .unwrap_or(defaults.api.events_base_url),
                event_base_url: optional("SOFASCORE_EVENT_BASE_URL")?
                    .unwrap_or(defaults.api.event_base_url),
                requests_per_minute: number(
                    "REQUESTS_PER_MINUTE",
                    defaults.api.requests_per_minute as u64,
                ) as u32,
            },
            retry,
            max_range_days: number("MAX_RANGE_DAYS", defaults.max_range_days as u64) as u32,
            tournament_filter: optional("TOURNAMENT_FILTER")?.map(|f| f.to_lowercase()),
            reference_policy,
        })
    }

    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .ok_or_else(|| anyhow!("DATABASE_URL is not set (use --memory for a dry run)"))
    }
}

/// Parameters of one ingestion run over a closed date interval.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub retry: RetryPolicy,
}

impl RunConfig {
    pub fn new(
        start_date: NaiveDate,
        end_date: NaiveDate,
        retry: RetryPolicy,
        max_range_days: u32,
    ) -> Result<Self, RunError> {
        if start_date > end_date {
            return Err(RunError::InvalidRange(format!(
                "start {} is after end {}",
                start_date, end_date
            )));
        }

        let days = (end_date - start_date).num_days() + 1;
        if days > i64::from(max_range_days) {
            return Err(RunError::InvalidRange(format!(
                "{} days requested, at most {} allowed",
                days, max_range_days
            )));
        }

        Ok(Self {
            start_date,
            end_date,
            retry,
        })
    }

    /// Every date of the interval, both ends included.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start_date
            .iter_days()
            .take_while(move |d| *d <= self.end_date)
    }

    pub fn day_count(&self) -> usize {
        ((self.end_date - self.start_date).num_days() + 1) as usize
    }
}
