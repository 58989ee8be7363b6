mod future;
mod layer;
mod service;

pub use future::MetricsResponseFuture;
pub use layer::MetricsLayer;
pub use service::MetricsService;
