//! Prometheus text exposition of the registry.
//!
//! Every scrape copies the registers into a fresh `prometheus::Registry` and
//! encodes it with `TextEncoder`; the atomics stay the only store.

use crate::echo::EchoMethod;
use crate::error::MetricsError;
use crate::metrics::register::TimerSnapshot;
use crate::metrics::registry::{
    ACTIVE_CONNECTIONS, API_CALLS, CustomMetric, ERRORS, MetricsRegistry, RESPONSE_TIME,
    SERVICE_TAG, TOTAL_REQUESTS, UPTIME,
};
use prometheus::{
    Counter, Encoder, Gauge, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::collections::HashMap;

pub const CONTENT_TYPE: &str = prometheus::TEXT_FORMAT;

type Labels = HashMap<String, String>;

/// `service` base label plus any extra tags. A tag named `service` overrides it.
fn labels<I>(tags: I) -> Labels
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut labels = Labels::from([(SERVICE_TAG.0.to_string(), SERVICE_TAG.1.to_string())]);
    labels.extend(tags);
    labels
}

fn opts(name: &str, help: &str, labels: &Labels) -> Opts {
    Opts::new(name, help).const_labels(labels.clone())
}

/// Metric names may only contain `[a-zA-Z0-9_:]` and must not start with a digit.
fn sanitize_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == ':' { c } else { '_' })
        .collect();
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Label names follow the metric name rule without `:`.
fn sanitize_label(name: &str) -> String {
    sanitize_name(name).replace(':', "_")
}

/// A timer is exposed micrometer-style: `_count`, `_sum` and `_max` in seconds.
fn register_timer(
    exposition: &Registry,
    name: &str,
    help: &str,
    labels: &Labels,
    snap: TimerSnapshot,
) -> Result<(), prometheus::Error> {
    let count = IntCounter::with_opts(opts(&format!("{name}_count"), help, labels))?;
    count.inc_by(snap.count);
    exposition.register(Box::new(count))?;

    let sum = Counter::with_opts(opts(&format!("{name}_sum"), help, labels))?;
    sum.inc_by(snap.total.as_secs_f64());
    exposition.register(Box::new(sum))?;

    let max = Gauge::with_opts(opts(&format!("{name}_max"), help, labels))?;
    max.set(snap.max.as_secs_f64());
    exposition.register(Box::new(max))
}

fn register_custom(exposition: &Registry, metric: &CustomMetric) -> Result<(), prometheus::Error> {
    let info = metric.info();
    let name = sanitize_name(&info.name);
    // prometheus rejects an empty help string
    let help = if info.description.is_empty() {
        info.name.as_str()
    } else {
        info.description.as_str()
    };
    let labels = labels(
        info.tags
            .iter()
            .map(|(k, v)| (sanitize_label(k), v.clone())),
    );
    match metric {
        CustomMetric::Counter(c) => {
            let counter = IntCounter::with_opts(opts(&name, help, &labels))?;
            counter.inc_by(c.count());
            exposition.register(Box::new(counter))
        }
        CustomMetric::Timer(t) => register_timer(exposition, &name, help, &labels, t.snapshot()),
    }
}

fn builtin(exposition: &Registry, registry: &MetricsRegistry) -> Result<(), prometheus::Error> {
    let base = labels(std::iter::empty());

    let api_calls = IntCounterVec::new(
        opts(API_CALLS, "Total number of API calls made to the service", &base),
        &["method"],
    )?;
    for method in EchoMethod::ALL {
        api_calls
            .with_label_values(&[method.as_str()])
            .inc_by(registry.api_calls(method));
    }
    exposition.register(Box::new(api_calls))?;

    let errors = IntCounter::with_opts(opts(ERRORS, "Total number of API errors", &base))?;
    errors.inc_by(registry.errors());
    exposition.register(Box::new(errors))?;

    register_timer(
        exposition,
        RESPONSE_TIME,
        "Response time for API calls",
        &base,
        registry.response_time(),
    )?;

    let active = IntGauge::with_opts(opts(ACTIVE_CONNECTIONS, "Number of active connections", &base))?;
    active.set(registry.active_connections());
    exposition.register(Box::new(active))?;

    let total = IntGauge::with_opts(opts(TOTAL_REQUESTS, "Total number of requests processed", &base))?;
    total.set(i64::try_from(registry.total_requests()).unwrap_or(i64::MAX));
    exposition.register(Box::new(total))?;

    let uptime = Gauge::with_opts(opts(UPTIME, "Application uptime in seconds", &base))?;
    uptime.set(registry.uptime().as_secs_f64());
    exposition.register(Box::new(uptime))
}

/// Renders every built-in and custom register. A custom metric whose name or
/// tags cannot be exposed is logged and left out.
pub fn render(registry: &MetricsRegistry) -> Result<String, MetricsError> {
    let exposition = Registry::new();
    builtin(&exposition, registry)?;

    for metric in registry.custom_metrics() {
        if let Err(e) = register_custom(&exposition, &metric) {
            tracing::warn!(target: "metrics::prometheus", name = %metric.info().name, error = %e, "custom metric left out of exposition");
        }
    }

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&exposition.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| MetricsError::Exposition(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn renders_builtin_registers() {
        let registry = MetricsRegistry::new();
        registry.increment_api_calls(EchoMethod::Post);
        registry.increment_errors();
        registry.record_response_time(Duration::from_millis(500));

        let text = render(&registry).unwrap();
        assert!(text.contains("# TYPE devops_api_calls_total counter"));
        assert!(text.contains(
            "devops_api_calls_total{method=\"POST\",service=\"devops-challenge\"} 1"
        ));
        assert!(text.contains(
            "devops_api_calls_total{method=\"GET\",service=\"devops-challenge\"} 0"
        ));
        assert!(text.contains("devops_api_errors_total{service=\"devops-challenge\"} 1"));
        assert!(text.contains("devops_api_response_time_seconds_count{service=\"devops-challenge\"} 1"));
        assert!(text.contains("devops_api_response_time_seconds_sum{service=\"devops-challenge\"} 0.5"));
        assert!(text.contains("devops_api_response_time_seconds_max{service=\"devops-challenge\"} 0.5"));
        assert!(text.contains("# TYPE devops_api_active_connections gauge"));
    }

    #[test]
    fn renders_custom_metrics_with_tags() {
        let registry = MetricsRegistry::new();
        registry
            .create_custom_counter("cache.hits", "Cache \"hits\"", &["zone", "eu\"1"])
            .unwrap()
            .add(7);
        registry
            .create_custom_timer("db.query", "", &[])
            .unwrap()
            .record(Duration::from_millis(250));

        let text = render(&registry).unwrap();
        assert!(text.contains("# HELP cache_hits Cache \"hits\""));
        assert!(text.contains("cache_hits{service=\"devops-challenge\",zone=\"eu\\\"1\"} 7"));
        assert!(text.contains("# HELP db_query_count db.query"));
        assert!(text.contains("db_query_sum{service=\"devops-challenge\"} 0.25"));
    }

    #[test]
    fn colliding_custom_metric_does_not_break_the_scrape() {
        let registry = MetricsRegistry::new();
        registry
            .create_custom_counter("jobs.done", "Jobs", &[])
            .unwrap()
            .increment();
        // sanitizes to the same exposition name as `jobs.done`
        registry
            .create_custom_counter("jobs_done", "Jobs", &[])
            .unwrap()
            .add(5);
        registry.increment_api_calls(EchoMethod::Get);

        let text = render(&registry).unwrap();
        assert!(text.contains("jobs_done{service=\"devops-challenge\"} 1"));
        assert!(!text.contains("jobs_done{service=\"devops-challenge\"} 5"));
        assert!(text.contains(
            "devops_api_calls_total{method=\"GET\",service=\"devops-challenge\"} 1"
        ));
    }

    #[test]
    fn names_are_sanitized() {
        assert_eq!(sanitize_name("http.requests-total"), "http_requests_total");
        assert_eq!(sanitize_name("9lives"), "_9lives");
        assert_eq!(sanitize_label("ns:zone"), "ns_zone");
    }
}
