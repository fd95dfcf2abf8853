//! Measurement record and speed test payload parsing

use crate::error::MeasurementError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One complete speed measurement. Only ever constructed with all
/// three numeric results present and non-negative; a test that cannot
/// produce them fails as a [`MeasurementError`] instead.
#[derive(Debug, Clone, Serialize)]
pub struct MeasurementRecord {
    /// Instant the measurement was taken (UTC)
    pub timestamp: DateTime<Utc>,

    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub ping_ms: f64,

    pub ping_jitter_ms: Option<f64>,
    pub packet_loss_pct: Option<f64>,

    /// Test server metadata, descriptive only
    pub server_id: Option<String>,
    pub server_name: Option<String>,

    pub isp: Option<String>,
    pub external_ip: Option<String>,

    /// Unparsed adapter output, kept for diagnostic logging
    #[serde(skip)]
    pub raw_payload: String,
}

/// JSON shape emitted by `speedtest -f json` (Ookla CLI)
#[derive(Debug, Deserialize)]
struct SpeedtestPayload {
    timestamp: Option<String>,
    ping: PingSection,
    download: TransferSection,
    upload: TransferSection,
    #[serde(rename = "packetLoss")]
    packet_loss: Option<f64>,
    isp: Option<String>,
    server: Option<ServerSection>,
    interface: Option<InterfaceSection>,
}

#[derive(Debug, Deserialize)]
struct PingSection {
    latency: f64,
    jitter: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TransferSection {
    /// Bytes per second
    bandwidth: f64,
}

#[derive(Debug, Deserialize)]
struct ServerSection {
    id: Option<u64>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InterfaceSection {
    #[serde(rename = "externalIp")]
    external_ip: Option<String>,
}

impl MeasurementRecord {
    /// Parse raw speed test output into a complete record.
    pub fn from_json(raw: &str) -> Result<Self, MeasurementError> {
        let payload: SpeedtestPayload =
            serde_json::from_str(raw).map_err(|e| MeasurementError::Malformed {
                cause: e.to_string(),
                raw: raw.to_string(),
            })?;

        let download_mbps = bandwidth_to_mbps(payload.download.bandwidth);
        let upload_mbps = bandwidth_to_mbps(payload.upload.bandwidth);
        let ping_ms = payload.ping.latency;

        check_non_negative("download_mbps", download_mbps)?;
        check_non_negative("upload_mbps", upload_mbps)?;
        check_non_negative("ping_ms", ping_ms)?;

        // The CLI stamps its own result; fall back to the local clock
        // when the field is absent.
        let timestamp = match &payload.timestamp {
            Some(ts) => DateTime::parse_from_rfc3339(ts)
                .map_err(|e| MeasurementError::Malformed {
                    cause: format!("bad timestamp '{}': {}", ts, e),
                    raw: raw.to_string(),
                })?
                .with_timezone(&Utc),
            None => Utc::now(),
        };

        let (server_id, server_name) = match payload.server {
            Some(server) => (server.id.map(|id| id.to_string()), server.name),
            None => (None, None),
        };

        Ok(Self {
            timestamp,
            download_mbps,
            upload_mbps,
            ping_ms,
            ping_jitter_ms: payload.ping.jitter,
            packet_loss_pct: payload.packet_loss,
            server_id,
            server_name,
            isp: payload.isp,
            external_ip: payload.interface.and_then(|i| i.external_ip),
            raw_payload: raw.to_string(),
        })
    }
}

/// Ookla reports bandwidth in bytes per second
fn bandwidth_to_mbps(bytes_per_sec: f64) -> f64 {
    bytes_per_sec * 8.0 / 1_000_000.0
}

fn check_non_negative(field: &'static str, value: f64) -> Result<(), MeasurementError> {
    if value.is_nan() || value < 0.0 {
        return Err(MeasurementError::NegativeValue { field, value });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_PAYLOAD: &str = r#"{
        "type": "result",
        "timestamp": "2024-06-01T08:30:15Z",
        "ping": {"jitter": 0.85, "latency": 12.4},
        "download": {"bandwidth": 56275000, "bytes": 505252520},
        "upload": {"bandwidth": 2512500, "bytes": 22522552},
        "packetLoss": 0.0,
        "isp": "Example ISP",
        "interface": {"internalIp": "192.168.1.10", "name": "eth0",
                      "macAddr": "00:11:22:33:44:55", "isVpn": false,
                      "externalIp": "203.0.113.9"},
        "server": {"id": 21541, "host": "test.example.net", "port": 8080,
                   "name": "Example City", "location": "Somewhere",
                   "country": "Testland"}
    }"#;

    #[test]
    fn test_parse_full_payload() {
        let record = MeasurementRecord::from_json(FULL_PAYLOAD).unwrap();
        assert_eq!(record.download_mbps, 56275000.0 * 8.0 / 1_000_000.0);
        assert_eq!(record.upload_mbps, 2512500.0 * 8.0 / 1_000_000.0);
        assert_eq!(record.ping_ms, 12.4);
        assert_eq!(record.ping_jitter_ms, Some(0.85));
        assert_eq!(record.packet_loss_pct, Some(0.0));
        assert_eq!(record.server_id.as_deref(), Some("21541"));
        assert_eq!(record.server_name.as_deref(), Some("Example City"));
        assert_eq!(record.isp.as_deref(), Some("Example ISP"));
        assert_eq!(record.external_ip.as_deref(), Some("203.0.113.9"));
        assert_eq!(record.timestamp.to_rfc3339(), "2024-06-01T08:30:15+00:00");
        assert_eq!(record.raw_payload, FULL_PAYLOAD);
    }

    #[test]
    fn test_minimal_payload_parses() {
        let raw = r#"{"ping": {"latency": 5.0},
                      "download": {"bandwidth": 1000000},
                      "upload": {"bandwidth": 500000}}"#;
        let record = MeasurementRecord::from_json(raw).unwrap();
        assert_eq!(record.download_mbps, 8.0);
        assert_eq!(record.upload_mbps, 4.0);
        assert!(record.server_id.is_none());
        assert!(record.isp.is_none());
        assert!(record.ping_jitter_ms.is_none());
    }

    #[test]
    fn test_missing_upload_is_rejected() {
        let raw = r#"{"ping": {"latency": 5.0},
                      "download": {"bandwidth": 1000000}}"#;
        let err = MeasurementRecord::from_json(raw).unwrap_err();
        assert!(matches!(err, MeasurementError::Malformed { .. }));
        assert_eq!(err.raw_output(), Some(raw));
    }

    #[test]
    fn test_missing_latency_is_rejected() {
        let raw = r#"{"ping": {"jitter": 1.0},
                      "download": {"bandwidth": 1000000},
                      "upload": {"bandwidth": 500000}}"#;
        assert!(matches!(
            MeasurementRecord::from_json(raw),
            Err(MeasurementError::Malformed { .. })
        ));
    }

    #[test]
    fn test_negative_bandwidth_is_rejected() {
        let raw = r#"{"ping": {"latency": 5.0},
                      "download": {"bandwidth": -1.0},
                      "upload": {"bandwidth": 500000}}"#;
        let err = MeasurementRecord::from_json(raw).unwrap_err();
        assert!(matches!(
            err,
            MeasurementError::NegativeValue {
                field: "download_mbps",
                ..
            }
        ));
    }

    #[test]
    fn test_negative_latency_is_rejected() {
        let raw = r#"{"ping": {"latency": -0.1},
                      "download": {"bandwidth": 1000000},
                      "upload": {"bandwidth": 500000}}"#;
        assert!(matches!(
            MeasurementRecord::from_json(raw),
            Err(MeasurementError::NegativeValue { field: "ping_ms", .. })
        ));
    }

    #[test]
    fn test_garbage_output_is_rejected() {
        let err = MeasurementRecord::from_json("speedtest: command crashed").unwrap_err();
        assert!(matches!(err, MeasurementError::Malformed { .. }));
    }

    #[test]
    fn test_bad_timestamp_is_rejected() {
        let raw = r#"{"timestamp": "yesterday",
                      "ping": {"latency": 5.0},
                      "download": {"bandwidth": 1000000},
                      "upload": {"bandwidth": 500000}}"#;
        assert!(matches!(
            MeasurementRecord::from_json(raw),
            Err(MeasurementError::Malformed { .. })
        ));
    }

    #[test]
    fn test_missing_timestamp_uses_local_clock() {
        let raw = r#"{"ping": {"latency": 5.0},
                      "download": {"bandwidth": 1000000},
                      "upload": {"bandwidth": 500000}}"#;
        let before = Utc::now();
        let record = MeasurementRecord::from_json(raw).unwrap();
        let after = Utc::now();
        assert!(record.timestamp >= before && record.timestamp <= after);
    }
}
