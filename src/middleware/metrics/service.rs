use crate::metrics::MetricsRegistry;
use crate::middleware::metrics::future::{InFlight, MetricsResponseFuture};
use http::{Request, Response};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;

#[derive(Clone)]
pub struct MetricsService<S> {
    inner: S,
    registry: Arc<MetricsRegistry>,
}

impl<S> MetricsService<S> {
    pub fn new(inner: S, registry: Arc<MetricsRegistry>) -> Self {
        Self { inner, registry }
    }
}

impl<ReqBody, ResBody, S> Service<Request<ReqBody>> for MetricsService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = MetricsResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let in_flight = InFlight::enter(self.registry.clone());
        let method = req.method().clone();
        let fut = self.inner.call(req);
        MetricsResponseFuture::new(fut, method, in_flight)
    }
}
