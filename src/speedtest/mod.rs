//! Speed measurement adapter
//!
//! Wraps the external speed test CLI: one bounded subprocess per
//! invocation, structured JSON out, a complete [`MeasurementRecord`]
//! or a typed failure back. Retry policy belongs to the caller.

mod record;

pub use record::MeasurementRecord;

use crate::error::MeasurementError;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

pub struct SpeedtestRunner {
    command: String,
    timeout: Duration,
    server_id: Option<u64>,
}

impl SpeedtestRunner {
    pub fn new(command: impl Into<String>, timeout: Duration, server_id: Option<u64>) -> Self {
        Self {
            command: command.into(),
            timeout,
            server_id,
        }
    }

    /// Run exactly one speed test and parse its result.
    pub async fn run(&self) -> Result<MeasurementRecord, MeasurementError> {
        // The configured command may carry leading arguments, e.g.
        // "flatpak run com.ookla.speedtest".
        let mut parts = self.command.split_whitespace();
        let program = parts.next().ok_or_else(|| MeasurementError::Launch {
            command: self.command.clone(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "empty command"),
        })?;

        let mut cmd = Command::new(program);
        cmd.args(parts);
        cmd.args(["--accept-license", "--accept-gdpr", "-f", "json"]);
        if let Some(id) = self.server_id {
            cmd.arg("-s").arg(id.to_string());
        }
        cmd.stdin(Stdio::null());
        // Reap the child if the timeout fires while it is still running
        cmd.kill_on_drop(true);

        debug!("running speed test: {}", self.command);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(MeasurementError::Launch {
                    command: self.command.clone(),
                    source: e,
                });
            }
            Err(_) => {
                return Err(MeasurementError::TimedOut {
                    timeout: self.timeout,
                });
            }
        };

        if !output.status.success() {
            return Err(MeasurementError::Failed {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let raw = stdout.trim();
        debug!("raw speedtest output: {}", raw);

        let record = MeasurementRecord::from_json(raw)?;
        info!(
            "speed test completed: {:.1} Mbps down, {:.1} Mbps up, {:.1} ms ping",
            record.download_mbps, record.upload_mbps, record.ping_ms
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

    /// Write an executable shell script standing in for the speed test CLI
    fn fake_speedtest(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("speedtest");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "#!/bin/sh\n{}", body).unwrap();
        let mut perms = file.metadata().unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    fn runner(path: &PathBuf, timeout: Duration) -> SpeedtestRunner {
        SpeedtestRunner::new(path.to_string_lossy(), timeout, None)
    }

    #[tokio::test]
    async fn test_successful_run_produces_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = fake_speedtest(
            &dir,
            r#"echo '{"ping":{"latency":12.4},"download":{"bandwidth":56275000},"upload":{"bandwidth":2512500}}'"#,
        );
        let record = runner(&path, Duration::from_secs(5)).run().await.unwrap();
        assert_eq!(record.ping_ms, 12.4);
        assert!((record.download_mbps - 450.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_nonzero_exit_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = fake_speedtest(&dir, "echo 'no servers found' >&2\nexit 2");
        let err = runner(&path, Duration::from_secs(5)).run().await.unwrap_err();
        match err {
            MeasurementError::Failed { code, stderr } => {
                assert_eq!(code, 2);
                assert_eq!(stderr, "no servers found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_kills_subprocess() {
        let dir = tempfile::tempdir().unwrap();
        let path = fake_speedtest(&dir, "sleep 30");
        let err = runner(&path, Duration::from_millis(100))
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, MeasurementError::TimedOut { .. }));
    }

    #[tokio::test]
    async fn test_missing_binary_fails_to_launch() {
        let runner = SpeedtestRunner::new(
            "/nonexistent/speedtest-cli",
            Duration::from_secs(5),
            None,
        );
        let err = runner.run().await.unwrap_err();
        assert!(matches!(err, MeasurementError::Launch { .. }));
    }

    #[tokio::test]
    async fn test_garbage_output_fails_to_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = fake_speedtest(&dir, "echo 'warning: something went sideways'");
        let err = runner(&path, Duration::from_secs(5)).run().await.unwrap_err();
        assert!(matches!(err, MeasurementError::Malformed { .. }));
    }
}
