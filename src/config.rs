use anyhow::{anyhow, Context, Result};
use chrono_tz::Tz;
use std::env;
use std::str::FromStr;

use crate::constants::Constants;
use crate::time::parse_timezone;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub log_level: String,
    pub timezone: Tz,
    pub requests_page_size: usize,
    pub audit_page_size: usize,
    pub simulated_latency_ms: u64,
    pub read_retry_attempts: u32,
    pub read_retry_base_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite:./lab_reservation.db".to_string(),
            log_level: "info".to_string(),
            timezone: chrono_tz::Asia::Tokyo,
            requests_page_size: Constants::DEFAULT_REQUESTS_PAGE_SIZE,
            audit_page_size: Constants::DEFAULT_AUDIT_PAGE_SIZE,
            simulated_latency_ms: 0,
            read_retry_attempts: Constants::DEFAULT_READ_RETRY_ATTEMPTS,
            read_retry_base_delay_ms: Constants::DEFAULT_READ_RETRY_BASE_DELAY_MS,
        }
    }
}

fn env_number<T: FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow!("{} must be a number, got '{}'", name, raw)),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let database_url = env::var("DATABASE_URL").unwrap_or(defaults.database_url);

        let log_level = env::var("LOG_LEVEL").unwrap_or(defaults.log_level);

        let timezone_name =
            env::var("APP_TIMEZONE").unwrap_or_else(|_| Constants::DEFAULT_TIMEZONE.to_string());
        let timezone = parse_timezone(&timezone_name)
            .ok_or_else(|| anyhow!("APP_TIMEZONE '{}' is not a known timezone", timezone_name))?;

        let requests_page_size = env_number("REQUESTS_PAGE_SIZE", defaults.requests_page_size)?;
        let audit_page_size = env_number("AUDIT_PAGE_SIZE", defaults.audit_page_size)?;
        if requests_page_size == 0 || audit_page_size == 0 {
            return Err(anyhow!("page sizes must be greater than zero"));
        }

        let simulated_latency_ms =
            env_number("SIMULATED_LATENCY_MS", defaults.simulated_latency_ms)?;
        let read_retry_attempts = env_number("READ_RETRY_ATTEMPTS", defaults.read_retry_attempts)
            .context("invalid retry configuration")?;
        let read_retry_base_delay_ms =
            env_number("READ_RETRY_BASE_DELAY_MS", defaults.read_retry_base_delay_ms)
                .context("invalid retry configuration")?;

        Ok(Self {
            database_url,
            log_level,
            timezone,
            requests_page_size,
            audit_page_size,
            simulated_latency_ms,
            read_retry_attempts,
            read_retry_base_delay_ms,
        })
    }
}
