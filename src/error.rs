//! Error taxonomy for the measurement-and-ingestion cycle

use std::time::Duration;
use thiserror::Error;

/// Adapter-origin failures. Always fatal to the invocation; the next
/// scheduled run is the retry boundary.
#[derive(Error, Debug)]
pub enum MeasurementError {
    #[error("failed to launch speed test command '{command}': {source}")]
    Launch {
        command: String,
        source: std::io::Error,
    },

    #[error("speed test timed out after {timeout:?}")]
    TimedOut { timeout: Duration },

    #[error("speed test exited with {code}: {stderr}")]
    Failed { code: i32, stderr: String },

    #[error("malformed speed test output: {cause}")]
    Malformed { cause: String, raw: String },

    #[error("speed test reported negative {field}: {value}")]
    NegativeValue { field: &'static str, value: f64 },
}

impl MeasurementError {
    /// Raw adapter output, where any was captured before the failure.
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            Self::Malformed { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

/// Reporter-origin terminal failures. Transient failures are retried
/// internally and only surface here once the budget is spent.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("backend rejected the point (HTTP {status}): {cause}")]
    Rejected { status: u16, cause: String },

    #[error("gave up after {attempts} attempts: {last_cause}")]
    RetriesExhausted { attempts: u32, last_cause: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value '{value}' for {name}: {cause}")]
    Invalid {
        name: &'static str,
        value: String,
        cause: String,
    },
}
