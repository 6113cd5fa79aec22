//! Single-endpoint prober and its normalized result record.

use crate::{
    adapter::{AdapterRegistry, ProbeSample},
    endpoint::{ApiClass, Endpoint},
    error::ProbeError,
};
use metrics::counter;
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of one probe. Created fresh each round, never mutated.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub endpoint: Endpoint,
    pub latest_block_height: Option<u64>,
    pub latency: Option<Duration>,
    pub http_status: Option<u16>,
    /// 0 on success, 1 on any failure. Matches the schema the metrics
    /// store's dashboards key on.
    pub exit_code: i32,
    pub error: Option<String>,
}

impl ProbeResult {
    pub fn success(endpoint: Endpoint, sample: ProbeSample) -> Self {
        Self {
            endpoint,
            latest_block_height: Some(sample.height),
            latency: Some(sample.latency),
            http_status: sample.http_status,
            exit_code: 0,
            error: None,
        }
    }

    pub fn failure(endpoint: Endpoint, err: &ProbeError) -> Self {
        Self {
            endpoint,
            latest_block_height: None,
            latency: None,
            http_status: err.http_status(),
            exit_code: 1,
            error: Some(err.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Dispatches probes to the adapter matching each endpoint's api class.
///
/// This is the error containment boundary: every adapter failure, timeouts
/// included, becomes a failed [`ProbeResult`] here so that one misbehaving
/// endpoint can never abort a round.
pub struct Prober {
    adapters: AdapterRegistry,
    timeout: Duration,
}

impl Prober {
    pub fn new(adapters: AdapterRegistry, timeout: Duration) -> Self {
        Self { adapters, timeout }
    }

    pub fn supports(&self, class: ApiClass) -> bool {
        self.adapters.supports(class)
    }

    pub async fn probe_endpoint(&self, endpoint: &Endpoint) -> ProbeResult {
        let Some(adapter) = self.adapters.get(endpoint.api_class) else {
            // callers filter unsupported classes before a round; this is a
            // backstop for direct use
            let err = ProbeError::UnsupportedApiClass(endpoint.api_class);
            warn!(url = %endpoint.url, err = %err, "cannot probe endpoint");
            counter!("blockpulse_probe_failures", "class" => err.class()).increment(1);
            return ProbeResult::failure(endpoint.clone(), &err);
        };

        // the adapter bounds its own I/O; the outer timeout guarantees the
        // round is never held up longer than the per-request timeout
        let outcome = tokio::time::timeout(self.timeout, adapter.probe(&endpoint.url, self.timeout))
            .await
            .unwrap_or(Err(ProbeError::Timeout(self.timeout)));

        match outcome {
            Ok(sample) => {
                debug!(url = %endpoint.url, height = sample.height, "probe ok");
                ProbeResult::success(endpoint.clone(), sample)
            }
            Err(err) => {
                warn!(
                    url = %endpoint.url,
                    api = %endpoint.api_class,
                    class = err.class(),
                    err = %err,
                    "probe failed"
                );
                counter!("blockpulse_probe_failures", "class" => err.class()).increment(1);
                ProbeResult::failure(endpoint.clone(), &err)
            }
        }
    }
}
