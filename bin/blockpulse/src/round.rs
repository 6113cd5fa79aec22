//! Concurrent probe batch for one polling round.

use crate::{
    endpoint::Endpoint,
    probe::{ProbeResult, Prober},
};
use metrics::counter;
use std::sync::Arc;
use tracing::error;

/// Probe every endpoint concurrently and collect one result per supported
/// endpoint, in input order.
///
/// Endpoints whose api class has no registered adapter are a configuration
/// error: logged and skipped, contributing no result this round. Everything
/// else (timeouts, transport failures, even a panicking probe task) yields
/// a failed result without disturbing its siblings. Results are matched to
/// endpoints by position, never by completion order. No retries here; the
/// next round is the retry mechanism.
pub async fn run_round(prober: &Arc<Prober>, endpoints: &[Endpoint]) -> Vec<ProbeResult> {
    let mut handles = Vec::with_capacity(endpoints.len());
    for endpoint in endpoints {
        if !prober.supports(endpoint.api_class) {
            error!(
                url = %endpoint.url,
                api = %endpoint.api_class,
                "no adapter registered, skipping endpoint"
            );
            counter!("blockpulse_probe_failures", "class" => "config").increment(1);
            continue;
        }
        let prober = Arc::clone(prober);
        let endpoint = endpoint.clone();
        handles.push((
            endpoint.clone(),
            tokio::spawn(async move { prober.probe_endpoint(&endpoint).await }),
        ));
    }

    let mut results = Vec::with_capacity(handles.len());
    for (endpoint, handle) in handles {
        match handle.await {
            Ok(result) => results.push(result),
            Err(err) => {
                // a panicked probe must not abort the round
                error!(url = %endpoint.url, err = %err, "probe task failed");
                counter!("blockpulse_probe_failures", "class" => "panic").increment(1);
                results.push(ProbeResult {
                    endpoint,
                    latest_block_height: None,
                    latency: None,
                    http_status: None,
                    exit_code: 1,
                    error: Some(format!("probe task failed: {err}")),
                });
            }
        }
    }
    results
}
