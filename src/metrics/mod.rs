mod exposition;
mod register;
mod registry;

pub use exposition::{CONTENT_TYPE as PROMETHEUS_CONTENT_TYPE, render as render_prometheus};
pub use register::{Counter, Gauge, Timer, TimerSnapshot};
pub use registry::{
    CustomCounter, CustomMetric, CustomTimer, MetricInfo, MetricsRegistry, MetricsSummary,
    SERVICE_TAG, tag_pairs,
};
