//! Adapter for Ethereum-family JSON-RPC endpoints.

use super::{ProbeSample, ProtocolAdapter, http_json_rpc, parse_hex_height};
use crate::error::ProbeError;
use async_trait::async_trait;
use std::time::Duration;
use url::Url;

/// Probes via `eth_blockNumber`; the result is a hex quantity string.
pub struct EthereumAdapter {
    client: reqwest::Client,
}

impl EthereumAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProtocolAdapter for EthereumAdapter {
    async fn probe(&self, url: &Url, timeout: Duration) -> Result<ProbeSample, ProbeError> {
        let (result, latency, status) =
            http_json_rpc(&self.client, url, "eth_blockNumber", timeout).await?;

        let raw = result
            .as_str()
            .ok_or_else(|| ProbeError::malformed("result is not a string", Some(status)))?;
        let height =
            parse_hex_height(raw).map_err(|reason| ProbeError::malformed(reason, Some(status)))?;

        Ok(ProbeSample {
            height,
            latency,
            http_status: Some(status),
        })
    }
}
