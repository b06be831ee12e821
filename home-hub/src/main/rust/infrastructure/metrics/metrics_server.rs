use std::future::Future;

use warp::Filter;

use super::PrometheusReporter;

/// Health check response structure
#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

pub fn metrics_routes() -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    // CORS configuration for browser access
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "OPTIONS"])
        .allow_headers(vec!["Content-Type"]);

    let metrics_route = warp::path("metrics").map(|| {
        let body = PrometheusReporter::gather_metrics();
        warp::reply::with_header(body, "content-type", "text/plain; version=0.0.4; charset=utf-8")
    });

    let health_route = warp::path("health").map(|| {
        let response = HealthResponse {
            status: "healthy",
            service: "home-hub",
            version: env!("CARGO_PKG_VERSION"),
        };
        warp::reply::json(&response)
    });

    // Liveness probe endpoint (minimal check - is the process running?)
    let liveness_route =
        warp::path("livez").map(|| warp::reply::with_status("OK", warp::http::StatusCode::OK));

    // Readiness probe endpoint (can the service accept traffic?)
    let readiness_route = warp::path("readyz").map(|| {
        let response = HealthResponse {
            status: "ready",
            service: "home-hub",
            version: env!("CARGO_PKG_VERSION"),
        };
        warp::reply::json(&response)
    });

    metrics_route
        .or(health_route)
        .or(liveness_route)
        .or(readiness_route)
        .with(cors)
}

/// Serve the metrics and probe endpoints until `shutdown` resolves
pub async fn serve_metrics(port: u16, shutdown: impl Future<Output = ()> + Send + 'static) {
    tracing::info!("Metrics server starting on port {}", port);

    let (_, server) =
        warp::serve(metrics_routes()).bind_with_graceful_shutdown(([0, 0, 0, 0], port), shutdown);
    server.await;
}
