//! Time-series reporter
//!
//! Turns a measurement record into one backend write, with bounded
//! retry and deterministic response classification. Submission
//! attempts are strictly sequential.

mod influx;
mod point;

pub use influx::{InfluxWriter, PointWriter, TransportError, WriteReply};
pub use point::Point;

use crate::error::ReportError;
use crate::speedtest::MeasurementRecord;
use rand::Rng;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Classification of one submission attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Success,
    Retryable {
        cause: String,
        retry_after: Option<Duration>,
    },
    Fatal {
        status: u16,
        cause: String,
    },
}

/// Map a backend reply onto an outcome class. Pure and deterministic:
/// the same status always classifies the same way.
pub fn classify_reply(reply: &WriteReply) -> AttemptOutcome {
    match reply.status {
        200..=299 => AttemptOutcome::Success,
        429 => AttemptOutcome::Retryable {
            cause: format!("rate limited (HTTP 429): {}", reply.body),
            retry_after: reply.retry_after,
        },
        500..=599 => AttemptOutcome::Retryable {
            cause: format!("backend error (HTTP {}): {}", reply.status, reply.body),
            retry_after: None,
        },
        // Auth and malformed-request errors are config defects;
        // retrying will not help.
        status => AttemptOutcome::Fatal {
            status,
            cause: reply.body.clone(),
        },
    }
}

/// Exponential backoff with jitter: base * 2^(n-1), capped, plus up
/// to half the exponential delay again. The jitter stays below the
/// next step, so delays strictly increase until the cap.
fn backoff_delay(attempt: u32, base: Duration) -> Duration {
    let exp = base
        .saturating_mul(1u32 << (attempt.saturating_sub(1)).min(31))
        .min(BACKOFF_CAP);
    let jitter = exp.mul_f64(rand::thread_rng().gen_range(0.0..=0.5));
    exp + jitter
}

#[derive(Debug)]
pub struct SubmitSummary {
    pub attempts: u32,
    pub elapsed: Duration,
}

pub struct Reporter<W: PointWriter> {
    writer: W,
    max_attempts: u32,
    backoff_base: Duration,
}

impl<W: PointWriter> Reporter<W> {
    pub fn new(writer: W, max_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            writer,
            max_attempts,
            backoff_base,
        }
    }

    /// Submit one record. Returns after the backend accepts the point
    /// or a fatal condition is reached; transient failures are retried
    /// up to the attempt budget.
    pub async fn submit(&self, record: &MeasurementRecord) -> Result<SubmitSummary, ReportError> {
        let line = Point::from_record(record).to_line_protocol();
        let started = Instant::now();
        let mut last_cause = String::new();

        for attempt in 1..=self.max_attempts {
            debug!("submission attempt {}/{}", attempt, self.max_attempts);

            let outcome = match self.writer.write_point(&line).await {
                Ok(reply) => classify_reply(&reply),
                Err(e) => AttemptOutcome::Retryable {
                    cause: e.to_string(),
                    retry_after: None,
                },
            };

            match outcome {
                AttemptOutcome::Success => {
                    let summary = SubmitSummary {
                        attempts: attempt,
                        elapsed: started.elapsed(),
                    };
                    info!(
                        "point accepted after {} attempt(s) in {:.2?}",
                        summary.attempts, summary.elapsed
                    );
                    return Ok(summary);
                }
                AttemptOutcome::Fatal { status, cause } => {
                    warn!(
                        "attempt {} rejected with HTTP {}, not retrying",
                        attempt, status
                    );
                    return Err(ReportError::Rejected { status, cause });
                }
                AttemptOutcome::Retryable { cause, retry_after } => {
                    warn!(
                        "attempt {}/{} failed: {}",
                        attempt, self.max_attempts, cause
                    );
                    last_cause = cause;
                    if attempt < self.max_attempts {
                        let delay =
                            retry_after.unwrap_or_else(|| backoff_delay(attempt, self.backoff_base));
                        debug!("retrying in {:.2?}", delay);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(ReportError::RetriesExhausted {
            attempts: self.max_attempts,
            last_cause,
        })
    }
}
