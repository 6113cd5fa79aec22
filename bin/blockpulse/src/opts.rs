//! CLI surface and daemon wiring.

use crate::{
    adapter::AdapterRegistry, cache::EndpointCache, config::Config, influx::InfluxWriter,
    poller::Poller, probe::Prober,
};
use clap::Parser;
use eyre::{Context, eyre};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use poem::{EndpointExt, Response, Route, Server, get, handler, listener::TcpListener};
use std::{path::PathBuf, sync::Arc};
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Poll blockchain RPC endpoints and record heights to InfluxDB", long_about = None)]
pub struct BlockpulseArgs {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "blockpulse.toml")]
    config: PathBuf,

    /// Port to expose Prometheus self-metrics on; omit to disable.
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the configured sleep between rounds, in seconds.
    #[arg(long)]
    poll_interval: Option<u64>,
}

#[handler]
async fn prometheus_metrics(handle: poem::web::Data<&PrometheusHandle>) -> Response {
    let metrics = handle.render();
    Response::builder()
        .header("content-type", "text/plain")
        .body(metrics)
}

fn describe_metrics() {
    describe_counter!("blockpulse_rounds_total", "Completed polling rounds");
    describe_counter!(
        "blockpulse_rounds_skipped_total",
        "Rounds skipped because no endpoint list was available"
    );
    describe_counter!("blockpulse_probe_failures", "Failed probes by failure class");
    describe_counter!(
        "blockpulse_registry_refresh_failures",
        "Failed refreshes of the endpoint registry"
    );
    describe_gauge!("blockpulse_endpoints", "Endpoints probed in the current round");
    describe_gauge!(
        "blockpulse_healthy_endpoints",
        "Endpoints that answered their probe in the current round"
    );
    describe_histogram!(
        "blockpulse_round_duration_seconds",
        "Wall-clock duration of a full polling round"
    );
}

impl BlockpulseArgs {
    pub async fn run(self) -> eyre::Result<()> {
        tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .init();

        let mut config = Config::load(&self.config)
            .wrap_err_with(|| format!("failed to load config from {}", self.config.display()))?;
        if let Some(secs) = self.poll_interval {
            config.poll_interval_secs = secs;
        }

        let metrics_server = if let Some(port) = self.port {
            let metrics_handle = PrometheusBuilder::new()
                .install_recorder()
                .context("failed to install recorder")?;
            describe_metrics();
            let app = Route::new().at(
                "/metrics",
                get(prometheus_metrics).data(metrics_handle.clone()),
            );
            let addr = format!("0.0.0.0:{port}");
            Some(tokio::spawn(async move {
                Server::new(TcpListener::bind(addr)).run(app).await
            }))
        } else {
            None
        };

        // one client shared by the registry, the adapters, and the writer
        let client = reqwest::Client::new();

        let writer = InfluxWriter::new(
            client.clone(),
            config.influx.url.clone(),
            config.influx.token.clone(),
            config.influx.org.clone(),
            config.influx.bucket.clone(),
        );
        // refuse to start when telemetry cannot be persisted
        writer
            .ping()
            .await
            .wrap_err("couldn't connect to the metrics store")?;

        let cache = EndpointCache::new(
            client.clone(),
            config.registry_url.clone(),
            config.cache_max_age(),
            config.cache_file.clone(),
        );
        let prober = Arc::new(Prober::new(
            AdapterRegistry::with_defaults(client),
            config.request_timeout(),
        ));
        let mut poller = Poller::new(cache, prober, writer, config.poll_interval());

        let mut worker = tokio::spawn(async move { poller.worker().await });

        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("failed to install SIGTERM handler")?;
        let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
            .context("failed to install SIGINT handler")?;

        tokio::select! {
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down gracefully"),
            _ = sigint.recv() => tracing::info!("Received SIGINT, shutting down gracefully"),
            outcome = &mut worker => {
                if let Some(server) = metrics_server {
                    server.abort();
                }
                return match outcome {
                    Ok(result) => result.wrap_err("poller exited"),
                    Err(err) => Err(eyre!("poller task failed: {err}")),
                };
            }
        }

        worker.abort();
        if let Some(server) = metrics_server {
            server.abort();
        }

        tracing::info!("Shutdown complete");
        Ok(())
    }
}
