//! InfluxDB v2 line-protocol points and writer.

use crate::probe::ProbeResult;
use eyre::{WrapErr, bail};
use jiff::Timestamp;
use std::fmt::Write as _;
use std::time::Duration;
use tracing::debug;
use url::Url;

const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
    String(String),
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

/// One measurement in the metrics store, rendered as a line-protocol line.
#[derive(Debug, Clone)]
pub struct Point {
    measurement: &'static str,
    tags: Vec<(String, String)>,
    fields: Vec<(String, FieldValue)>,
    timestamp: Timestamp,
}

impl Point {
    pub fn new(measurement: &'static str, timestamp: Timestamp) -> Self {
        Self {
            measurement,
            tags: Vec::new(),
            fields: Vec::new(),
            timestamp,
        }
    }

    pub fn tag(mut self, key: &str, value: &str) -> Self {
        self.tags.push((key.to_owned(), value.to_owned()));
        self
    }

    pub fn field(mut self, key: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.push((key.to_owned(), value.into()));
        self
    }

    /// Render in line protocol with a nanosecond timestamp.
    pub fn to_line(&self) -> String {
        let mut line = escape_measurement(self.measurement);
        for (key, value) in &self.tags {
            let _ = write!(line, ",{}={}", escape_tag(key), escape_tag(value));
        }
        for (i, (key, value)) in self.fields.iter().enumerate() {
            let separator = if i == 0 { ' ' } else { ',' };
            let _ = match value {
                FieldValue::Integer(v) => write!(line, "{separator}{}={v}i", escape_tag(key)),
                FieldValue::Float(v) => write!(line, "{separator}{}={v}", escape_tag(key)),
                FieldValue::String(v) => {
                    write!(line, "{separator}{}=\"{}\"", escape_tag(key), escape_string(v))
                }
            };
        }
        let _ = write!(line, " {}", self.timestamp.as_nanosecond());
        line
    }
}

fn escape_measurement(raw: &str) -> String {
    raw.replace(',', "\\,").replace(' ', "\\ ")
}

fn escape_tag(raw: &str) -> String {
    raw.replace(',', "\\,").replace('=', "\\=").replace(' ', "\\ ")
}

fn escape_string(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Build the point for one probe result.
///
/// Every result is written, healthy or not; failures simply carry no height
/// or divergence fields, so dashboards can plot gaps while alerting keys on
/// `exit_code`.
pub fn probe_point(
    result: &ProbeResult,
    divergence: Option<u64>,
    timestamp: Timestamp,
) -> Point {
    let mut point = Point::new("block_height_request", timestamp)
        .tag("chain", &result.endpoint.chain)
        .tag("url", result.endpoint.url.as_str())
        .tag("api", result.endpoint.api_class.as_str())
        .field("exit_code", i64::from(result.exit_code));
    if let Some(height) = result.latest_block_height {
        point = point.field("block_height", height as i64);
    }
    if let Some(diff) = divergence {
        point = point.field("block_height_diff", diff as i64);
    }
    if let Some(latency) = result.latency {
        point = point.field("request_time_total", latency.as_secs_f64());
    }
    if let Some(status) = result.http_status {
        point = point.field("http_code", i64::from(status));
    }
    if let Some(error) = &result.error {
        point = point.field("error", error.as_str());
    }
    point
}

/// Client for the InfluxDB v2 HTTP API.
///
/// A failed write is fatal for the whole process by design: a poller that
/// cannot persist telemetry is non-functional, and the supervisor is
/// expected to restart it.
pub struct InfluxWriter {
    client: reqwest::Client,
    url: Url,
    token: String,
    org: String,
    bucket: String,
}

impl InfluxWriter {
    pub fn new(
        client: reqwest::Client,
        url: Url,
        token: String,
        org: String,
        bucket: String,
    ) -> Self {
        Self {
            client,
            url,
            token,
            org,
            bucket,
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{path}", self.url.as_str().trim_end_matches('/'))
    }

    /// Startup health check against the store's ping route.
    pub async fn ping(&self) -> eyre::Result<()> {
        let response = self
            .client
            .get(self.api_url("ping"))
            .timeout(WRITE_TIMEOUT)
            .send()
            .await
            .wrap_err("failed to reach the metrics store")?;
        if !response.status().is_success() {
            bail!("metrics store ping returned status {}", response.status());
        }
        Ok(())
    }

    /// Write a batch of points with nanosecond precision.
    pub async fn write(&self, points: &[Point]) -> eyre::Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let body = points.iter().map(Point::to_line).collect::<Vec<_>>().join("\n");
        let response = self
            .client
            .post(self.api_url("api/v2/write"))
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header("Authorization", format!("Token {}", self.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .timeout(WRITE_TIMEOUT)
            .body(body)
            .send()
            .await
            .wrap_err("failed writing to the metrics store")?;
        if !response.status().is_success() {
            bail!("metrics store rejected write: status {}", response.status());
        }
        debug!(points = points.len(), "wrote batch to metrics store");
        Ok(())
    }
}
