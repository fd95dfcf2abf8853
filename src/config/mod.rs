//! Environment-variable configuration

use crate::error::ConfigError;
use std::fmt;
use std::time::Duration;

const DEFAULT_INFLUXDB_PORT: &str = "8086";
const DEFAULT_SPEEDTEST_BIN: &str = "speedtest";
const DEFAULT_MEASUREMENT_TIMEOUT_S: u64 = 60;
const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF_BASE_S: u64 = 1;
const DEFAULT_REQUEST_TIMEOUT_S: u64 = 10;

/// Backend credential. Debug/Display never reveal the value so it can
/// not leak through log output or error context.
#[derive(Clone)]
pub struct Token(String);

impl Token {
    pub fn reveal(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<hidden>")
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<hidden>")
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the InfluxDB write endpoint, e.g. "http://localhost:8086"
    pub influx_url: String,
    pub influx_org: String,
    pub influx_bucket: String,
    pub influx_token: Token,

    /// Command invoked to run the speed test
    pub speedtest_bin: String,
    /// Hard timeout for the speed test subprocess
    pub measurement_timeout: Duration,

    /// Upper bound on submission attempts
    pub max_retry_attempts: u32,
    /// Base delay for exponential backoff between attempts
    pub backoff_base: Duration,
    /// Per-attempt HTTP request timeout
    pub request_timeout: Duration,

    /// Log verbosity: DEBUG, INFO, WARN or ERROR
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary key lookup. Tests use
    /// this to avoid mutating the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let influx_url = match lookup("INFLUXDB_URL") {
            Some(url) => url,
            None => {
                // Compose the URL from SERVER_IP / INFLUXDB_PORT when no
                // explicit endpoint is given.
                let server_ip = lookup("SERVER_IP").ok_or(ConfigError::Missing("INFLUXDB_URL"))?;
                let port = lookup("INFLUXDB_PORT")
                    .unwrap_or_else(|| DEFAULT_INFLUXDB_PORT.to_string());
                format!("http://{}:{}", server_ip, port)
            }
        };

        let influx_org = required(&lookup, "INFLUXDB_ORG")?;
        let influx_bucket = required(&lookup, "INFLUXDB_BUCKET")?;
        let influx_token = Token(required(&lookup, "INFLUXDB_ADMIN_TOKEN")?);

        let speedtest_bin =
            lookup("SPEEDTEST_BIN").unwrap_or_else(|| DEFAULT_SPEEDTEST_BIN.to_string());

        let measurement_timeout = Duration::from_secs(parse_or(
            &lookup,
            "SPEEDTEST_TIMEOUT_SECONDS",
            DEFAULT_MEASUREMENT_TIMEOUT_S,
        )?);
        let max_retry_attempts =
            parse_or(&lookup, "MAX_RETRY_ATTEMPTS", DEFAULT_MAX_RETRY_ATTEMPTS)?;
        let backoff_base = Duration::from_secs(parse_or(
            &lookup,
            "RETRY_BACKOFF_BASE_SECONDS",
            DEFAULT_BACKOFF_BASE_S,
        )?);
        let request_timeout = Duration::from_secs(parse_or(
            &lookup,
            "REQUEST_TIMEOUT_SECONDS",
            DEFAULT_REQUEST_TIMEOUT_S,
        )?);

        let log_level = lookup("LOGLEVEL").unwrap_or_else(|| "INFO".to_string());

        if max_retry_attempts == 0 {
            return Err(ConfigError::Invalid {
                name: "MAX_RETRY_ATTEMPTS",
                value: "0".to_string(),
                cause: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            influx_url,
            influx_org,
            influx_bucket,
            influx_token,
            speedtest_bin,
            measurement_timeout,
            max_retry_attempts,
            backoff_base,
            request_timeout,
            log_level,
        })
    }
}

fn required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(name)),
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match lookup(name) {
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            value,
            cause: e.to_string(),
        }),
        None => Ok(default),
    }
}
