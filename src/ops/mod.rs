// * Operations: production observability for the agent loop.
// * Structured logging plus the metrics/health endpoint.

pub mod telemetry;

// * Re-exports for convenient access
pub use telemetry::{
    get_metrics_string, init_tracing, init_tracing_pretty, observe_cycle_duration, record_cycle,
    record_extraction_failure, record_publish, record_session_recreate, set_consecutive_failures,
    start_metrics_server, start_metrics_server_default, MetricsServerHandle,
};
