use crate::metrics::MetricsRegistry;
use crate::middleware::metrics::service::MetricsService;
use std::sync::Arc;
use tower::Layer;

/// Wraps a service so every request is counted as an active connection while
/// in flight and timed on completion.
#[derive(Clone)]
pub struct MetricsLayer {
    registry: Arc<MetricsRegistry>,
}

impl MetricsLayer {
    pub fn new(registry: Arc<MetricsRegistry>) -> Self {
        Self { registry }
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService::new(inner, self.registry.clone())
    }
}
