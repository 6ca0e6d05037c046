use std::time::Duration;

use crate::error::DashError;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3001";
const DEFAULT_REFRESH_INTERVAL_MS: u64 = 5_000;
const DEFAULT_JOB_POLL_INTERVAL_MS: u64 = 2_000;
const DEFAULT_HEALTH_INTERVAL_MS: u64 = 30_000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const ENV_BASE_URL: &str = "DASHSYNC_BASE_URL";
const ENV_REFRESH_INTERVAL_MS: &str = "DASHSYNC_REFRESH_INTERVAL_MS";
const ENV_JOB_POLL_INTERVAL_MS: &str = "DASHSYNC_JOB_POLL_INTERVAL_MS";
const ENV_HEALTH_INTERVAL_MS: &str = "DASHSYNC_HEALTH_INTERVAL_MS";
const ENV_REQUEST_TIMEOUT_SECS: &str = "DASHSYNC_REQUEST_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub base_url: String,
    pub refresh_interval: Duration,
    pub job_poll_interval: Duration,
    pub health_interval: Duration,
    /// `None` lets a request hang until the server answers.
    pub request_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            refresh_interval: Duration::from_millis(DEFAULT_REFRESH_INTERVAL_MS),
            job_poll_interval: Duration::from_millis(DEFAULT_JOB_POLL_INTERVAL_MS),
            health_interval: Duration::from_millis(DEFAULT_HEALTH_INTERVAL_MS),
            request_timeout: Some(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, DashError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolves every setting through `lookup`; blank values fall back to
    /// defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, DashError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let base_url = read(ENV_BASE_URL).unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());
        validate_base_url(&base_url)?;

        let request_timeout = match read(ENV_REQUEST_TIMEOUT_SECS) {
            None => Some(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)),
            Some(raw) => {
                let secs = raw.parse::<u64>().map_err(|_| {
                    DashError::Configuration(format!(
                        "{ENV_REQUEST_TIMEOUT_SECS} must be a whole number of seconds, got '{raw}'"
                    ))
                })?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
        };

        Ok(Self {
            base_url,
            refresh_interval: interval(
                read(ENV_REFRESH_INTERVAL_MS),
                ENV_REFRESH_INTERVAL_MS,
                DEFAULT_REFRESH_INTERVAL_MS,
            )?,
            job_poll_interval: interval(
                read(ENV_JOB_POLL_INTERVAL_MS),
                ENV_JOB_POLL_INTERVAL_MS,
                DEFAULT_JOB_POLL_INTERVAL_MS,
            )?,
            health_interval: interval(
                read(ENV_HEALTH_INTERVAL_MS),
                ENV_HEALTH_INTERVAL_MS,
                DEFAULT_HEALTH_INTERVAL_MS,
            )?,
            request_timeout,
        })
    }

    pub fn with_base_url(mut self, base_url: Option<String>) -> Result<Self, DashError> {
        if let Some(url) = base_url {
            validate_base_url(&url)?;
            self.base_url = url;
        }
        Ok(self)
    }
}

fn interval(raw: Option<String>, key: &str, default_ms: u64) -> Result<Duration, DashError> {
    let Some(raw) = raw else {
        return Ok(Duration::from_millis(default_ms));
    };
    match raw.parse::<u64>() {
        Ok(0) => Err(DashError::Configuration(format!(
            "{key} must be greater than zero"
        ))),
        Ok(ms) => Ok(Duration::from_millis(ms)),
        Err(_) => Err(DashError::Configuration(format!(
            "{key} must be a whole number of milliseconds, got '{raw}'"
        ))),
    }
}

fn validate_base_url(raw: &str) -> Result<(), DashError> {
    let url = reqwest::Url::parse(raw).map_err(|error| {
        DashError::Configuration(format!("base URL '{raw}' is invalid: {error}"))
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(DashError::Configuration(format!(
            "base URL '{raw}' must use http or https"
        )));
    }
    Ok(())
}
