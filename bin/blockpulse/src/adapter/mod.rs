//! Per-chain-family probe adapters.
//!
//! Each adapter translates "what is your current height" into the family's
//! wire call and parses the family's response shape. Dispatch goes through a
//! registration table keyed by [`ApiClass`]; adapters share one injected
//! HTTP client.

mod aptos;
mod ethereum;
mod substrate;

pub use aptos::AptosAdapter;
pub use ethereum::EthereumAdapter;
pub use substrate::SubstrateAdapter;

use crate::{endpoint::ApiClass, error::ProbeError};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use url::Url;

/// One successful height observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeSample {
    pub height: u64,
    pub latency: Duration,
    pub http_status: Option<u16>,
}

#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    /// Fetch the current chain height from `url`, bounded by `timeout`.
    async fn probe(&self, url: &Url, timeout: Duration) -> Result<ProbeSample, ProbeError>;
}

/// Registration table mapping api classes to their adapters.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<ApiClass, Arc<dyn ProtocolAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All built-in adapters, sharing one HTTP client.
    pub fn with_defaults(client: reqwest::Client) -> Self {
        let mut registry = Self::new();
        registry.register(ApiClass::Ethereum, Arc::new(EthereumAdapter::new(client.clone())));
        registry.register(ApiClass::Substrate, Arc::new(SubstrateAdapter::new(client.clone())));
        registry.register(ApiClass::Aptos, Arc::new(AptosAdapter::new(client)));
        registry
    }

    pub fn register(&mut self, class: ApiClass, adapter: Arc<dyn ProtocolAdapter>) {
        self.adapters.insert(class, adapter);
    }

    pub fn get(&self, class: ApiClass) -> Option<Arc<dyn ProtocolAdapter>> {
        self.adapters.get(&class).cloned()
    }

    pub fn supports(&self, class: ApiClass) -> bool {
        self.adapters.contains_key(&class)
    }
}

#[derive(Serialize)]
pub(crate) struct RpcRequest<'a, P> {
    jsonrpc: &'a str,
    id: u64,
    method: &'a str,
    params: P,
}

impl<'a> RpcRequest<'a, [(); 0]> {
    /// A parameterless JSON-RPC 2.0 call.
    pub(crate) fn new(method: &'a str) -> Self {
        Self {
            jsonrpc: "2.0",
            id: 1,
            method,
            params: [],
        }
    }
}

/// POST a parameterless JSON-RPC call and return the `result` value, the
/// measured latency, and the HTTP status.
///
/// A JSON-RPC `error` object or a missing `result` is an application-level
/// failure with the real status attached; non-2xx statuses are rejected the
/// same way.
pub(crate) async fn http_json_rpc(
    client: &reqwest::Client,
    url: &Url,
    method: &str,
    timeout: Duration,
) -> Result<(Value, Duration, u16), ProbeError> {
    let started = Instant::now();
    let response = client
        .post(url.clone())
        .timeout(timeout)
        .json(&RpcRequest::new(method))
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
    if let Some(error) = body.get("error") {
        return Err(ProbeError::malformed(
            format!("rpc error: {error}"),
            Some(status.as_u16()),
        ));
    }

    let result = body
        .get("result")
        .ok_or_else(|| ProbeError::malformed("missing result in rpc response", Some(status.as_u16())))?
        .clone();

    Ok((result, latency, status.as_u16()))
}

/// Parse a hex block-height quantity, tolerating one leading `0x`.
pub(crate) fn parse_hex_height(raw: &str) -> Result<u64, String> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    u64::from_str_radix(digits, 16).map_err(|_| format!("not a hex quantity: {raw:?}"))
}
