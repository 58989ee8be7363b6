use crate::metrics::MetricsRegistry;
use http::{Method, Response};
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use std::time::Instant;
use tracing::{Level, event};

/// Holds one active connection for as long as it lives. Dropping it, whether
/// the request completed or was cancelled, gives the connection back.
pub(crate) struct InFlight {
    registry: Arc<MetricsRegistry>,
    started: Instant,
}

impl InFlight {
    pub(crate) fn enter(registry: Arc<MetricsRegistry>) -> Self {
        registry.increment_active_connections();
        Self {
            registry,
            started: Instant::now(),
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.registry.decrement_active_connections();
    }
}

pin_project! {
    /// Response future for [`MetricsService`].
    ///
    /// [`MetricsService`]: super::MetricsService
    pub struct MetricsResponseFuture<F> {
        #[pin]
        inner: F,
        method: Method,
        in_flight: InFlight,
    }
}

impl<F> MetricsResponseFuture<F> {
    pub(crate) fn new(future: F, method: Method, in_flight: InFlight) -> Self {
        Self {
            inner: future,
            method,
            in_flight,
        }
    }
}

impl<F, ResBody, E> Future for MetricsResponseFuture<F>
where
    F: Future<Output = Result<Response<ResBody>, E>>,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let res = ready!(this.inner.poll(cx));

        let elapsed = this.in_flight.started.elapsed();
        let registry = &this.in_flight.registry;
        registry.record_response_time(elapsed);

        let status = res.as_ref().ok().map(|r| r.status());
        if status.is_none_or(|s| s.is_server_error()) {
            registry.increment_errors();
        }

        let method = this.method.as_str();
        event!(
            target: "middleware::metrics",
            Level::DEBUG,
            %method,
            status = status.map(|s| s.as_u16()),
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "Request metrics recorded"
        );

        Poll::Ready(res)
    }
}
