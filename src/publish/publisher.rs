// * Delivery of one reading to the destination state-store API.
// *
// * The destination is only reachable over the overlay network, so every
// * request goes through the client the ProxyRouter selects for its host —
// * the router, not this module, decides the egress path. No retry here:
// * readings are live telemetry, and by the time a retry would land the
// * next cycle is already due.

use std::sync::Arc;

use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::EndpointConfig;
use crate::extract::{MetricKind, MetricReading};
use crate::network::{NetworkError, ProxyRouter};

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("publish of {metric} rejected with HTTP {status}")]
    Status { metric: MetricKind, status: u16 },

    #[error("publish of {metric} failed in transit: {source}")]
    Transport {
        metric: MetricKind,
        #[source]
        source: reqwest::Error,
    },

    #[error("publish of {metric} could not be routed: {source}")]
    Routing {
        metric: MetricKind,
        #[source]
        source: NetworkError,
    },
}

impl PublishError {
    pub fn metric(&self) -> MetricKind {
        match self {
            PublishError::Status { metric, .. }
            | PublishError::Transport { metric, .. }
            | PublishError::Routing { metric, .. } => *metric,
        }
    }
}

pub struct Publisher {
    router: Arc<ProxyRouter>,
    endpoint: EndpointConfig,
}

impl Publisher {
    pub fn new(router: Arc<ProxyRouter>, endpoint: EndpointConfig) -> Self {
        Self { router, endpoint }
    }

    // * Sends one reading as a state update. Success is a 2xx from the
    // * destination; anything else surfaces as a typed, metric-tagged error.
    pub async fn publish(&self, reading: &MetricReading) -> Result<(), PublishError> {
        let metric = reading.metric;
        let url = self.state_url(metric);
        let body = state_body(reading);

        let client = self.router.client_for(&url).map_err(|source| {
            PublishError::Routing { metric, source }
        })?;

        debug!(metric = %metric, url = %url, "publishing reading");
        let response = client
            .post(&url)
            .bearer_auth(&self.endpoint.token)
            .json(&body)
            .timeout(self.endpoint.request_timeout)
            .send()
            .await
            .map_err(|source| PublishError::Transport { metric, source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::Status {
                metric,
                status: status.as_u16(),
            });
        }

        info!(metric = %metric, value_w = reading.value_w, "reading published");
        Ok(())
    }

    fn state_url(&self, metric: MetricKind) -> String {
        format!(
            "{}/api/states/{}",
            self.endpoint.base_url.trim_end_matches('/'),
            self.entity_for(metric)
        )
    }

    fn entity_for(&self, metric: MetricKind) -> &str {
        match metric {
            MetricKind::PvProduction => &self.endpoint.entity_production,
            MetricKind::HouseConsumption => &self.endpoint.entity_consumption,
            MetricKind::GridFlow => &self.endpoint.entity_grid,
        }
    }
}

// * Wire body: integral watts as the state string plus the unit attribute.
fn state_body(reading: &MetricReading) -> serde_json::Value {
    json!({
        "state": format!("{}", reading.value_w.round() as i64),
        "attributes": {
            "unit_of_measurement": reading.unit,
        },
    })
}
