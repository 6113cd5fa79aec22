//! The polling round loop.

use crate::{
    cache::EndpointCache,
    divergence::compute_divergence,
    endpoint::Endpoint,
    influx::{InfluxWriter, probe_point},
    probe::Prober,
    round::run_round,
};
use eyre::WrapErr;
use jiff::Timestamp;
use metrics::{counter, gauge, histogram};
use std::{sync::Arc, time::Duration};
use tracing::{error, info, instrument, warn};

pub struct Poller {
    cache: EndpointCache,
    prober: Arc<Prober>,
    writer: InfluxWriter,
    poll_interval: Duration,
}

impl Poller {
    pub fn new(
        cache: EndpointCache,
        prober: Arc<Prober>,
        writer: InfluxWriter,
        poll_interval: Duration,
    ) -> Self {
        Self {
            cache,
            prober,
            writer,
            poll_interval,
        }
    }

    /// Run rounds until aborted.
    ///
    /// A registry outage with no cached endpoint list skips the round and
    /// retries after the normal sleep. A metrics-store failure returns the
    /// error, which terminates the process.
    #[instrument(name = "poller::worker", skip(self))]
    pub async fn worker(&mut self) -> eyre::Result<()> {
        loop {
            let started = std::time::Instant::now();
            match self.cache.load().await {
                Ok(endpoints) => {
                    self.round(&endpoints).await?;
                    counter!("blockpulse_rounds_total").increment(1);
                    histogram!("blockpulse_round_duration_seconds")
                        .record(started.elapsed().as_secs_f64());
                }
                Err(err) => {
                    error!(err = %err, "no endpoint list available, skipping round");
                    counter!("blockpulse_rounds_skipped_total").increment(1);
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// One full pass: probe everything, derive divergence, persist.
    #[instrument(name = "poller::round", skip_all, fields(endpoints = endpoints.len()))]
    pub async fn round(&self, endpoints: &[Endpoint]) -> eyre::Result<()> {
        gauge!("blockpulse_endpoints").set(endpoints.len() as f64);

        let results = run_round(&self.prober, endpoints).await;
        let divergence = compute_divergence(&results);

        // one timestamp shared by every point so a round can be correlated
        // across endpoints in queries
        let timestamp = Timestamp::now();
        let mut points = Vec::with_capacity(results.len());
        let mut healthy = 0usize;
        for result in &results {
            if result.is_success() {
                healthy += 1;
            } else {
                warn!(
                    url = %result.endpoint.url,
                    err = result.error.as_deref().unwrap_or("unknown"),
                    "unhealthy endpoint, writing tagged result"
                );
            }
            let diff = divergence.get(result.endpoint.url.as_str()).copied();
            points.push(probe_point(result, diff, timestamp));
        }
        gauge!("blockpulse_healthy_endpoints").set(healthy as f64);

        self.writer
            .write(&points)
            .await
            .wrap_err("failed to persist round to the metrics store")?;
        info!(
            probed = results.len(),
            healthy,
            "round complete"
        );
        Ok(())
    }
}
