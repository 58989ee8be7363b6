use http::{Request, Response};
use std::time::Duration;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::{DefaultOnRequest, MakeSpan, OnResponse, TraceLayer};
use tracing::{Span, info_span};

/// One `request` span per call, carrying method and uri.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestSpan;

impl<B> MakeSpan<B> for RequestSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        info_span!("request", method = %request.method(), uri = %request.uri())
    }
}

/// Logs the outcome by status class: 4xx/5xx at WARN, the rest at INFO.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestOutcome;

impl<B> OnResponse<B> for RequestOutcome {
    fn on_response(self, response: &Response<B>, latency: Duration, _span: &Span) {
        let status = response.status().as_u16();
        let elapsed_ms = latency.as_secs_f64() * 1000.0;
        if response.status().is_server_error() || response.status().is_client_error() {
            tracing::warn!(target: "middleware::tracing", status, elapsed_ms, "Request failed");
        } else {
            tracing::info!(target: "middleware::tracing", status, elapsed_ms, "Request succeeded");
        }
    }
}

pub type RequestTraceLayer =
    TraceLayer<SharedClassifier<ServerErrorsAsFailures>, RequestSpan, DefaultOnRequest, RequestOutcome>;

pub fn trace_layer() -> RequestTraceLayer {
    TraceLayer::new_for_http()
        .make_span_with(RequestSpan)
        .on_response(RequestOutcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::body::Body;
    use axum::routing::get;
    use http::StatusCode;
    use tower::ServiceExt;

    #[tokio::test]
    async fn passes_responses_through_unchanged() {
        let app = Router::new()
            .route("/ok", get(|| async { "fine" }))
            .route("/boom", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
            .layer(trace_layer());

        let ok = app
            .clone()
            .oneshot(Request::builder().uri("/ok").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);

        let boom = app
            .oneshot(Request::builder().uri("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(boom.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
