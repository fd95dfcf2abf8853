//! Time-series point and InfluxDB line protocol encoding

use crate::speedtest::MeasurementRecord;
use chrono::{DateTime, Utc};

/// One timestamped point: measurement name, tag set, field set.
#[derive(Debug, Clone)]
pub struct Point {
    measurement: String,
    tags: Vec<(String, String)>,
    fields: Vec<(String, f64)>,
    timestamp: DateTime<Utc>,
}

impl Point {
    pub fn new(measurement: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: Vec::new(),
            fields: Vec::new(),
            timestamp,
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: f64) -> Self {
        self.fields.push((key.into(), value));
        self
    }

    /// Build the point submitted for each measurement.
    pub fn from_record(record: &MeasurementRecord) -> Self {
        let mut point = Point::new("network_speed", record.timestamp)
            .field("download_mbps", record.download_mbps)
            .field("upload_mbps", record.upload_mbps)
            .field("ping_ms", record.ping_ms);

        if let Some(jitter) = record.ping_jitter_ms {
            point = point.field("ping_jitter_ms", jitter);
        }
        if let Some(loss) = record.packet_loss_pct {
            point = point.field("packet_loss_pct", loss);
        }
        if let Some(server_id) = &record.server_id {
            point = point.tag("server_id", server_id.as_str());
        }
        if let Some(isp) = &record.isp {
            point = point.tag("isp", isp.as_str());
        }

        point
    }

    /// Render as a single line-protocol entry with nanosecond precision.
    pub fn to_line_protocol(&self) -> String {
        let mut line = escape_measurement(&self.measurement);

        for (key, value) in &self.tags {
            line.push(',');
            line.push_str(&escape_tag(key));
            line.push('=');
            line.push_str(&escape_tag(value));
        }

        line.push(' ');
        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|(key, value)| format!("{}={}", escape_tag(key), value))
            .collect();
        line.push_str(&fields.join(","));

        // i128 math avoids the i64 overflow of whole-nanosecond timestamps
        let ns = self.timestamp.timestamp() as i128 * 1_000_000_000
            + self.timestamp.timestamp_subsec_nanos() as i128;
        line.push(' ');
        line.push_str(&ns.to_string());

        line
    }
}

/// Measurement names escape commas and spaces
fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

/// Tag keys, tag values and field keys escape commas, equals and spaces
fn escape_tag(s: &str) -> String {
    s.replace(',', "\\,").replace('=', "\\=").replace(' ', "\\ ")
}
