use crate::api::{
    actuator_metrics, actuator_prometheus, echo_delete, echo_get, echo_post, echo_put, health,
    info, openapi_json,
};
use crate::middleware::metrics::MetricsLayer;
use crate::middleware::timeout::timeout_layer;
use crate::middleware::tracing::trace_layer;
use crate::state::AppState;
use axum::Router;
use axum::routing::get;
use tower::ServiceBuilder;

/// Assembles routes and the middleware stack around them.
pub fn build_app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(trace_layer())
        .layer(MetricsLayer::new(state.registry.clone()))
        .layer(timeout_layer(&state.config));

    Router::new()
        .route(
            "/api",
            get(echo_get).post(echo_post).put(echo_put).delete(echo_delete),
        )
        .route("/api/health", get(health))
        .route("/api/info", get(info))
        .route("/actuator/metrics", get(actuator_metrics))
        .route("/actuator/prometheus", get(actuator_prometheus))
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(middleware)
        .with_state(state)
}
