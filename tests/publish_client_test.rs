use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Response, Server};

use pv_uplink::config::EndpointConfig;
use pv_uplink::extract::{MetricKind, MetricReading};
use pv_uplink::network::{Egress, ProxyRouter, RouteRule};
use pv_uplink::publish::{PublishError, Publisher};

fn endpoint(base_url: &str) -> EndpointConfig {
    EndpointConfig {
        base_url: base_url.to_string(),
        token: "test-token".to_string(),
        entity_production: "sensor.pv_production".to_string(),
        entity_consumption: "sensor.house_consumption".to_string(),
        entity_grid: "sensor.grid_flow".to_string(),
        request_timeout: Duration::from_secs(2),
    }
}

// * Stub state-store: 503 for the grid entity, 200 for everything else.
async fn spawn_stub_api() -> SocketAddr {
    let make_svc = make_service_fn(|_conn| async {
        Ok::<_, Infallible>(service_fn(|req: hyper::Request<Body>| async move {
            let status = if req.uri().path().ends_with("sensor.grid_flow") {
                503
            } else {
                200
            };
            Ok::<_, Infallible>(
                Response::builder()
                    .status(status)
                    .body(Body::from("{}"))
                    .unwrap(),
            )
        }))
    });
    let server = Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0))).serve(make_svc);
    let addr = server.local_addr();
    tokio::spawn(async move {
        let _ = server.await;
    });
    addr
}

#[tokio::test]
async fn test_rejected_metric_fails_alone_and_others_proceed() {
    let addr = spawn_stub_api().await;
    let router = ProxyRouter::new(vec![], Duration::from_secs(2)).unwrap();
    let publisher = Publisher::new(Arc::new(router), endpoint(&format!("http://{addr}")));

    let production = MetricReading::new(MetricKind::PvProduction, 3420.0).unwrap();
    let consumption = MetricReading::new(MetricKind::HouseConsumption, 812.0).unwrap();
    let grid = MetricReading::new(MetricKind::GridFlow, -800.0).unwrap();

    assert!(publisher.publish(&production).await.is_ok());
    assert!(publisher.publish(&consumption).await.is_ok());

    let err = publisher.publish(&grid).await.unwrap_err();
    assert!(matches!(
        err,
        PublishError::Status { status: 503, .. }
    ));
    assert_eq!(err.metric(), MetricKind::GridFlow);
}

#[tokio::test]
async fn test_unreachable_destination_is_a_metric_tagged_transport_error() {
    // * Nothing listens on this port; the publish must fail in transit and
    // * name the metric it was carrying.
    let router = ProxyRouter::new(vec![], Duration::from_secs(2)).unwrap();
    let publisher = Publisher::new(Arc::new(router), endpoint("http://127.0.0.1:59997"));

    let reading = MetricReading::new(MetricKind::GridFlow, -800.0).unwrap();
    let err = publisher.publish(&reading).await.unwrap_err();

    assert!(matches!(err, PublishError::Transport { .. }));
    assert_eq!(err.metric(), MetricKind::GridFlow);
}

#[tokio::test]
async fn test_dead_tunnel_fails_only_the_tunneled_publish() {
    // * The destination host is pinned to a SOCKS5 endpoint nobody runs.
    let router = ProxyRouter::new(
        vec![RouteRule::new(
            "127.0.0.1",
            Egress::Socks5("127.0.0.1:59996".into()),
        )],
        Duration::from_secs(2),
    )
    .unwrap();
    let publisher = Publisher::new(Arc::new(router), endpoint("http://127.0.0.1:8123"));

    let reading = MetricReading::new(MetricKind::PvProduction, 3420.0).unwrap();
    let err = publisher.publish(&reading).await.unwrap_err();

    assert!(matches!(err, PublishError::Transport { .. }));
    assert_eq!(err.metric(), MetricKind::PvProduction);
}
