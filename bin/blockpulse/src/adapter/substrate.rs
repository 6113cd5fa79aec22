//! Adapter for Substrate-family JSON-RPC endpoints.
//!
//! Speaks `chain_getHeader` over HTTP(S) POST, or over a WebSocket
//! connection for ws/wss URLs (one request frame, one response frame).

use super::{ProbeSample, ProtocolAdapter, http_json_rpc, parse_hex_height};
use crate::error::ProbeError;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

pub struct SubstrateAdapter {
    client: reqwest::Client,
}

impl SubstrateAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn probe_ws(&self, url: &Url, timeout: Duration) -> Result<ProbeSample, ProbeError> {
        let exchange = async {
            let started = Instant::now();
            let (mut stream, _) = connect_async(url.as_str())
                .await
                .map_err(|e| ProbeError::Transport(e.to_string()))?;

            let request = serde_json::json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "chain_getHeader",
                "params": [],
            });
            stream
                .send(Message::Text(request.to_string().into()))
                .await
                .map_err(|e| ProbeError::Transport(e.to_string()))?;

            let body = loop {
                match stream.next().await {
                    Some(Ok(Message::Text(text))) => {
                        break serde_json::from_str::<Value>(&text).map_err(|e| {
                            ProbeError::malformed(format!("invalid json: {e}"), None)
                        })?;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        return Err(ProbeError::Transport(
                            "connection closed before response".into(),
                        ));
                    }
                    // pings and binary frames
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(ProbeError::Transport(e.to_string())),
                }
            };
            let latency = started.elapsed();
            let _ = stream.close(None).await;

            if let Some(error) = body.get("error") {
                return Err(ProbeError::malformed(format!("rpc error: {error}"), None));
            }
            let result = body
                .get("result")
                .ok_or_else(|| ProbeError::malformed("missing result in rpc response", None))?;

            header_height(result, None).map(|height| ProbeSample {
                height,
                latency,
                http_status: None,
            })
        };

        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| ProbeError::Timeout(timeout))?
    }
}

/// Extract `number` from a chain header and parse it as hex.
fn header_height(result: &Value, http_status: Option<u16>) -> Result<u64, ProbeError> {
    let raw = result
        .get("number")
        .and_then(Value::as_str)
        .ok_or_else(|| ProbeError::malformed("header has no number field", http_status))?;
    parse_hex_height(raw).map_err(|reason| ProbeError::malformed(reason, http_status))
}

#[async_trait]
impl ProtocolAdapter for SubstrateAdapter {
    async fn probe(&self, url: &Url, timeout: Duration) -> Result<ProbeSample, ProbeError> {
        match url.scheme() {
            "ws" | "wss" => self.probe_ws(url, timeout).await,
            _ => {
                let (result, latency, status) =
                    http_json_rpc(&self.client, url, "chain_getHeader", timeout).await?;
                header_height(&result, Some(status)).map(|height| ProbeSample {
                    height,
                    latency,
                    http_status: Some(status),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn adapter() -> SubstrateAdapter {
        SubstrateAdapter::new(reqwest::Client::new())
    }

    #[tokio::test]
    async fn http_probe_parses_header_number() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .json_body(serde_json::json!({
                    "jsonrpc": "2.0", "id": 1, "method": "chain_getHeader", "params": [],
                }));
            then.status(200).json_body(serde_json::json!({
                "jsonrpc": "2.0", "id": 1,
                "result": {"number": "0x64", "parentHash": "0xabc"},
            }));
        });

        let url: Url = server.base_url().parse().unwrap();
        let sample = adapter().probe(&url, Duration::from_secs(1)).await.unwrap();
        mock.assert();
        assert_eq!(sample.height, 100);
        assert_eq!(sample.http_status, Some(200));
    }

    #[tokio::test]
    async fn header_without_number_is_application_failure() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST);
            then.status(200).json_body(serde_json::json!({
                "jsonrpc": "2.0", "id": 1, "result": {"parentHash": "0xabc"},
            }));
        });

        let url: Url = server.base_url().parse().unwrap();
        let err = adapter().probe(&url, Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err.class(), "application");
    }

    #[tokio::test]
    async fn ws_probe_parses_header_number() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let msg = ws.next().await.unwrap().unwrap();
            let request: Value = serde_json::from_str(msg.to_text().unwrap()).unwrap();
            assert_eq!(request["method"], "chain_getHeader");
            let reply = serde_json::json!({
                "jsonrpc": "2.0", "id": 1,
                "result": {"number": "0x64", "parentHash": "0xabc"},
            });
            ws.send(Message::Text(reply.to_string().into())).await.unwrap();
        });

        let url: Url = format!("ws://{addr}").parse().unwrap();
        let sample = adapter().probe(&url, Duration::from_secs(2)).await.unwrap();
        assert_eq!(sample.height, 100);
        assert_eq!(sample.http_status, None);
    }

    #[tokio::test]
    async fn ws_close_before_response_is_transport_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let _ = ws.next().await;
            let _ = ws.close(None).await;
        });

        let url: Url = format!("ws://{addr}").parse().unwrap();
        let err = adapter().probe(&url, Duration::from_secs(2)).await.unwrap_err();
        assert_eq!(err.class(), "transport");
    }
}
