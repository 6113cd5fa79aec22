//! Adapter for Aptos-style REST endpoints.

use super::{ProbeSample, ProtocolAdapter};
use crate::error::ProbeError;
use async_trait::async_trait;
use serde_json::Value;
use std::time::{Duration, Instant};
use url::Url;

/// Probes the ledger-info endpoint with a plain GET and reads
/// `block_height`. Live nodes return the field as a JSON string, older ones
/// as a number; both are accepted.
pub struct AptosAdapter {
    client: reqwest::Client,
}

impl AptosAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn decimal_height(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

#[async_trait]
impl ProtocolAdapter for AptosAdapter {
    async fn probe(&self, url: &Url, timeout: Duration) -> Result<ProbeSample, ProbeError> {
        let started = Instant::now();
        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ProbeError::from_reqwest(e, timeout))?;

        let status = response.status();
        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) if e.is_decode() => {
                return Err(ProbeError::malformed(e.to_string(), Some(status.as_u16())));
            }
            Err(e) => return Err(ProbeError::from_reqwest(e, timeout)),
        };
        let latency = started.elapsed();

        if !status.is_success() {
            return Err(ProbeError::malformed(
                format!("http status {status}"),
                Some(status.as_u16()),
            ));
        }

        let height = body
            .get("block_height")
            .and_then(decimal_height)
            .ok_or_else(|| {
                ProbeError::malformed("missing or non-decimal block_height", Some(status.as_u16()))
            })?;

        Ok(ProbeSample {
            height,
            latency,
            http_status: Some(status.as_u16()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn adapter() -> AptosAdapter {
        AptosAdapter::new(reqwest::Client::new())
    }

    #[tokio::test]
    async fn accepts_string_height() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET);
            then.status(200).json_body(serde_json::json!({
                "chain_id": 1,
                "ledger_version": "901",
                "block_height": "12345",
            }));
        });

        let url: Url = server.base_url().parse().unwrap();
        let sample = adapter().probe(&url, Duration::from_secs(1)).await.unwrap();
        assert_eq!(sample.height, 12345);
    }

    #[tokio::test]
    async fn accepts_integer_height() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET);
            then.status(200).json_body(serde_json::json!({"block_height": 42}));
        });

        let url: Url = server.base_url().parse().unwrap();
        let sample = adapter().probe(&url, Duration::from_secs(1)).await.unwrap();
        assert_eq!(sample.height, 42);
    }

    #[tokio::test]
    async fn missing_field_is_application_failure() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET);
            then.status(200).json_body(serde_json::json!({"ledger_version": "901"}));
        });

        let url: Url = server.base_url().parse().unwrap();
        let err = adapter().probe(&url, Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err.class(), "application");
        assert_eq!(err.http_status(), Some(200));
    }
}
