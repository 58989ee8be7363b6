use crate::echo::{EchoMethod, EchoRequest, EchoResponse};
use crate::error::EchoError;
use crate::metrics::{MetricsSummary, PROMETHEUS_CONTENT_TYPE, render_prometheus};
use crate::open_api::ApiDoc;
use crate::state::AppState;
use axum::Json;
use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::response::{IntoResponse, Response};
use chrono::{Local, NaiveDateTime};
use http::{StatusCode, header};
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use tracing::instrument;
use utoipa::{OpenApi, ToSchema};

pub const SERVICE_DESCRIPTION: &str = "A simple cloud-native API service";

#[derive(Serialize, ToSchema)]
pub struct Health {
    #[schema(example = "UP")]
    pub status: String,
    #[schema(value_type = String)]
    pub timestamp: NaiveDateTime,
    pub service: String,
    pub version: String,
}

#[derive(Serialize, ToSchema)]
pub struct Info {
    pub application: String,
    pub version: String,
    pub description: String,
    #[serde(rename = "build-time")]
    #[schema(value_type = String)]
    pub build_time: NaiveDateTime,
    pub endpoints: BTreeMap<String, String>,
}

async fn echo(state: &AppState, method: EchoMethod, request: Request) -> Json<EchoResponse> {
    tracing::info!(target: "service::echo", %method, "📥 received {} request to /api", method);
    state.registry.increment_api_calls(method);

    let echo_request = into_echo_request(method, request, state.config.body_limit).await;
    Json(EchoResponse::build(method, echo_request))
}

async fn into_echo_request(method: EchoMethod, request: Request, body_limit: usize) -> EchoRequest {
    let (parts, body) = request.into_parts();
    let remote_addr = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    // GET/DELETE 不读取 body
    let body = if method.accepts_body() {
        Some(read_body(body, body_limit).await)
    } else {
        None
    };

    EchoRequest {
        request_uri: Some(parts.uri.path().to_string()),
        query_string: parts.uri.query().map(str::to_string),
        headers: parts.headers,
        remote_addr,
        body,
    }
}

async fn read_body(body: Body, limit: usize) -> Result<String, EchoError> {
    let bytes = axum::body::to_bytes(body, limit)
        .await
        .map_err(|e| EchoError::Body(e.to_string()))?;
    String::from_utf8(bytes.to_vec()).map_err(|e| EchoError::Body(e.to_string()))
}

#[utoipa::path(
    get,
    path = "/api",
    responses(
        (status = 200, description = "Echo of the request line, headers and connection", body = EchoResponse)
    )
)]
#[instrument(skip(state, request), fields(layer = "api"), target = "service::echo")]
pub async fn echo_get(State(state): State<AppState>, request: Request) -> Json<EchoResponse> {
    echo(&state, EchoMethod::Get, request).await
}

#[utoipa::path(
    post,
    path = "/api",
    request_body(
        content = String,
        description = "Any payload. JSON is embedded as structure, other text is echoed verbatim",
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "Echo of the request including its body", body = EchoResponse)
    )
)]
#[instrument(skip(state, request), fields(layer = "api"), target = "service::echo")]
pub async fn echo_post(State(state): State<AppState>, request: Request) -> Json<EchoResponse> {
    echo(&state, EchoMethod::Post, request).await
}

#[utoipa::path(
    put,
    path = "/api",
    request_body(
        content = String,
        description = "Any payload. JSON is embedded as structure, other text is echoed verbatim",
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "Echo of the request including its body", body = EchoResponse)
    )
)]
#[instrument(skip(state, request), fields(layer = "api"), target = "service::echo")]
pub async fn echo_put(State(state): State<AppState>, request: Request) -> Json<EchoResponse> {
    echo(&state, EchoMethod::Put, request).await
}

#[utoipa::path(
    delete,
    path = "/api",
    responses(
        (status = 200, description = "Echo of the request line, headers and connection", body = EchoResponse)
    )
)]
#[instrument(skip(state, request), fields(layer = "api"), target = "service::echo")]
pub async fn echo_delete(State(state): State<AppState>, request: Request) -> Json<EchoResponse> {
    echo(&state, EchoMethod::Delete, request).await
}

#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is up", body = Health)
    )
)]
#[instrument(skip(state), fields(layer = "api"), target = "service::health")]
pub async fn health(State(state): State<AppState>) -> Json<Health> {
    tracing::debug!(target: "service::health", "health check");
    Json(Health {
        status: "UP".to_string(),
        timestamp: Local::now().naive_local(),
        service: state.config.service_name.clone(),
        version: state.config.service_version.clone(),
    })
}

#[utoipa::path(
    get,
    path = "/api/info",
    responses(
        (status = 200, description = "Application description and route map", body = Info)
    )
)]
#[instrument(skip(state), fields(layer = "api"), target = "service::info")]
pub async fn info(State(state): State<AppState>) -> Json<Info> {
    let endpoints = [
        ("api", "/api (GET, POST, PUT, DELETE)"),
        ("health", "/api/health"),
        ("info", "/api/info"),
        ("actuator", "/actuator/*"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    Json(Info {
        application: state.config.service_name.clone(),
        version: state.config.service_version.clone(),
        description: SERVICE_DESCRIPTION.to_string(),
        build_time: state.started_at,
        endpoints,
    })
}

#[utoipa::path(
    get,
    path = "/actuator/metrics",
    responses(
        (status = 200, description = "Snapshot of the process-wide counters", body = MetricsSummary)
    )
)]
pub async fn actuator_metrics(State(state): State<AppState>) -> Json<MetricsSummary> {
    Json(state.registry.metrics_summary())
}

#[utoipa::path(
    get,
    path = "/actuator/prometheus",
    responses(
        (status = 200, description = "Counters in Prometheus text exposition format", body = String, content_type = "text/plain"),
        (status = 500, description = "Exposition could not be encoded")
    )
)]
pub async fn actuator_prometheus(State(state): State<AppState>) -> Response {
    match render_prometheus(&state.registry) {
        Ok(text) => ([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], text).into_response(),
        Err(e) => {
            tracing::error!(target: "service::metrics", error = %e, "❌ failed to render prometheus exposition");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[tokio::test]
    async fn get_does_not_read_body() {
        let mut request = http::Request::builder()
            .uri("/api?x=1&y=2")
            .body(Body::from("ignored"))
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 7], 50123))));

        let echo = into_echo_request(EchoMethod::Get, request, 1024).await;
        assert!(echo.body.is_none());
        assert_eq!(echo.request_uri.as_deref(), Some("/api"));
        assert_eq!(echo.query_string.as_deref(), Some("x=1&y=2"));
        assert_eq!(echo.remote_addr.as_deref(), Some("10.0.0.7"));
    }

    #[tokio::test]
    async fn post_reads_body_as_text() {
        let request = http::Request::builder()
            .uri("/api")
            .header(header::USER_AGENT, HeaderValue::from_static("curl/8.0"))
            .body(Body::from("plain text"))
            .unwrap();

        let echo = into_echo_request(EchoMethod::Post, request, 1024).await;
        assert_eq!(echo.body.unwrap().unwrap(), "plain text");
        assert!(echo.remote_addr.is_none());
    }

    #[tokio::test]
    async fn oversized_or_binary_body_is_an_echo_error() {
        let request = http::Request::new(Body::from(vec![b'a'; 64]));
        let echo = into_echo_request(EchoMethod::Put, request, 16).await;
        assert!(matches!(echo.body, Some(Err(EchoError::Body(_)))));

        let request = http::Request::new(Body::from(vec![0xff, 0xfe, 0xfd]));
        let echo = into_echo_request(EchoMethod::Post, request, 1024).await;
        assert!(matches!(echo.body, Some(Err(EchoError::Body(_)))));
    }
}
