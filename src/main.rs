//! speedlog - one-shot internet speed measurement logged to InfluxDB
//!
//! Designed to be invoked on an interval by an external scheduler
//! (cron, systemd timer). Each run performs exactly one speed test,
//! writes one point to the backend, and exits.

mod config;
mod error;
mod logging;
mod reporter;
mod speedtest;

use clap::Parser;
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use config::Config;
use reporter::{InfluxWriter, Reporter};
use speedtest::SpeedtestRunner;

// Distinct exit codes: "could not measure" and "could not store" need
// different remediation, and the scheduler only sees the exit status.
const EXIT_CONFIG: u8 = 2;
const EXIT_MEASUREMENT: u8 = 3;
const EXIT_SUBMISSION: u8 = 4;

#[derive(Parser, Debug)]
#[command(name = "speedlog")]
#[command(version)]
#[command(about = "Measure internet speed and log it to a time-series backend", long_about = None)]
struct Args {
    /// Run the test against a specific speed test server
    #[arg(short = 's', long)]
    server_id: Option<u64>,

    /// Override the measurement timeout in seconds
    #[arg(long)]
    timeout_seconds: Option<u64>,

    /// Measure and print the record as JSON without submitting it
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            logging::init("INFO");
            error!("configuration error: {}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    logging::init(&config.log_level);
    debug!("loaded configuration: {:?}", config);

    run(&args, &config).await
}

async fn run(args: &Args, config: &Config) -> ExitCode {
    let started = Instant::now();
    info!("starting network speed test");

    let timeout = args
        .timeout_seconds
        .map(Duration::from_secs)
        .unwrap_or(config.measurement_timeout);
    let runner = SpeedtestRunner::new(config.speedtest_bin.as_str(), timeout, args.server_id);

    let record = match runner.run().await {
        Ok(record) => record,
        Err(e) => {
            if let Some(raw) = e.raw_output() {
                debug!("raw speedtest output: {}", raw);
            }
            error!("could not measure: {}", e);
            return ExitCode::from(EXIT_MEASUREMENT);
        }
    };

    if args.dry_run {
        match serde_json::to_string_pretty(&record) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("could not serialize record: {}", e);
                return ExitCode::from(EXIT_MEASUREMENT);
            }
        }
        info!("dry run, skipping submission");
        return ExitCode::SUCCESS;
    }

    let writer = match InfluxWriter::new(config) {
        Ok(writer) => writer,
        Err(e) => {
            error!("could not build backend client: {:#}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    let reporter = Reporter::new(writer, config.max_retry_attempts, config.backoff_base);

    match reporter.submit(&record).await {
        Ok(summary) => {
            info!(
                "recorded {:.1} Mbps down / {:.1} Mbps up / {:.1} ms ping at {} \
                 ({} attempt(s), {:.2?} total)",
                record.download_mbps,
                record.upload_mbps,
                record.ping_ms,
                record.timestamp.to_rfc3339(),
                summary.attempts,
                started.elapsed()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("could not store measurement: {}", e);
            // The point is gone once we exit; leave the raw result in
            // the log for manual recovery.
            warn!("unsubmitted measurement: {}", record.raw_payload);
            ExitCode::from(EXIT_SUBMISSION)
        }
    }
}
