use std::process::ExitCode;
use std::sync::Arc;

use tokio::sync::watch;

use pv_uplink::config::AgentConfig;
use pv_uplink::extract::Extractor;
use pv_uplink::network::ProxyRouter;
use pv_uplink::ops::telemetry;
use pv_uplink::publish::Publisher;
use pv_uplink::scheduler::{AgentCycle, Scheduler, SchedulerConfig};
use pv_uplink::session::SessionManager;

#[tokio::main]
async fn main() -> ExitCode {
    telemetry::init_tracing();

    // * Missing required configuration is the only fatal startup condition.
    let cfg = match AgentConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(error = %e, "startup aborted");
            return ExitCode::FAILURE;
        }
    };

    let router = match cfg
        .proxy_routes()
        .map_err(|e| e.to_string())
        .and_then(|rules| {
            ProxyRouter::new(rules, cfg.endpoint.request_timeout).map_err(|e| e.to_string())
        }) {
        Ok(router) => Arc::new(router),
        Err(e) => {
            tracing::error!(error = %e, "egress setup failed");
            return ExitCode::FAILURE;
        }
    };

    let session = SessionManager::new(
        cfg.dashboard.clone(),
        cfg.session_freshness,
        cfg.relogin_after,
    );
    let extractor = Extractor::new(&cfg.selectors);
    let publisher = Publisher::new(router, cfg.endpoint.clone());
    let cycle = AgentCycle::new(session, extractor, publisher);

    let metrics = telemetry::start_metrics_server(cfg.metrics_port).await;

    // * Cooperative shutdown: flip the watch channel on SIGINT and let the
    // * loop finish its in-flight iteration.
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            let _ = stop_tx.send(true);
        }
    });

    let scheduler = Scheduler::new(
        cycle,
        SchedulerConfig {
            interval: cfg.scrape_interval,
            iteration_timeout: cfg.iteration_timeout,
            max_consecutive_failures: cfg.max_consecutive_failures,
        },
    );
    scheduler.run(stop_rx).await;

    metrics.shutdown();
    ExitCode::SUCCESS
}
