use crate::echo::EchoMethod;
use crate::error::MetricsError;
use crate::metrics::register::{Counter, Gauge, Timer, TimerSnapshot};
use chrono::{Local, NaiveDateTime};
use dashmap::DashMap;
use opentelemetry::KeyValue;
use opentelemetry::metrics::{
    Histogram, Meter, ObservableCounter, ObservableGauge, ObservableUpDownCounter,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use utoipa::ToSchema;

pub(crate) const METER_NAME: &str = "echo-api";
pub const SERVICE_TAG: (&str, &str) = ("service", "devops-challenge");

pub const API_CALLS: &str = "devops_api_calls_total";
pub const ERRORS: &str = "devops_api_errors_total";
pub const RESPONSE_TIME: &str = "devops_api_response_time_seconds";
pub const ACTIVE_CONNECTIONS: &str = "devops_api_active_connections";
pub const TOTAL_REQUESTS: &str = "devops_api_total_requests";
pub const UPTIME: &str = "devops_api_uptime_seconds";

const BUILTIN_NAMES: [&str; 6] = [
    API_CALLS,
    ERRORS,
    RESPONSE_TIME,
    ACTIVE_CONNECTIONS,
    TOTAL_REQUESTS,
    UPTIME,
];

/// Process-wide counters. Built once by the composition root and shared
/// through `Arc`; every register is independently atomic.
pub struct MetricsRegistry {
    registers: Arc<Registers>,
    custom: DashMap<String, CustomMetric>,
    otel: Instruments,
}

/// The atomics themselves, shared with the OpenTelemetry callbacks.
struct Registers {
    started_at: Instant,
    api_calls: [Counter; 4],
    total_requests: Counter,
    errors: Counter,
    active_connections: Gauge,
    response_time: Timer,
}

/// OpenTelemetry view of the registers. Counters and gauges are observed
/// from the atomics at collection time, the histogram keeps its own buckets.
/// No-ops until a meter provider is installed.
struct Instruments {
    meter: Meter,
    response_time: Histogram<f64>,
    _api_calls: ObservableCounter<u64>,
    _total_requests: ObservableCounter<u64>,
    _errors: ObservableCounter<u64>,
    _active_connections: ObservableUpDownCounter<i64>,
    _uptime: ObservableGauge<f64>,
}

impl Instruments {
    fn new(registers: &Arc<Registers>) -> Self {
        let meter = opentelemetry::global::meter(METER_NAME);

        let regs = registers.clone();
        let api_calls = meter
            .u64_observable_counter(API_CALLS)
            .with_description("Total number of API calls made to the service")
            .with_callback(move |observer| {
                for method in EchoMethod::ALL {
                    observer.observe(
                        regs.api_calls[method.index()].get(),
                        &[service_kv(), KeyValue::new("method", method.as_str())],
                    );
                }
            })
            .build();
        let total_requests = observed_counter(
            &meter,
            TOTAL_REQUESTS,
            "Total number of requests processed",
            registers,
            |r| r.total_requests.get(),
        );
        let errors = observed_counter(
            &meter,
            ERRORS,
            "Total number of API errors",
            registers,
            |r| r.errors.get(),
        );

        let regs = registers.clone();
        let active_connections = meter
            .i64_observable_up_down_counter(ACTIVE_CONNECTIONS)
            .with_description("Number of active connections")
            .with_callback(move |observer| {
                observer.observe(regs.active_connections.get(), &[service_kv()])
            })
            .build();
        let response_time = meter
            .f64_histogram(RESPONSE_TIME)
            .with_description("Response time for API calls")
            .with_unit("s")
            .build();

        let started_at = registers.started_at;
        let uptime = meter
            .f64_observable_gauge(UPTIME)
            .with_description("Application uptime in seconds")
            .with_callback(move |observer| {
                observer.observe(started_at.elapsed().as_secs_f64(), &[service_kv()])
            })
            .build();

        Self {
            meter,
            response_time,
            _api_calls: api_calls,
            _total_requests: total_requests,
            _errors: errors,
            _active_connections: active_connections,
            _uptime: uptime,
        }
    }
}

fn observed_counter(
    meter: &Meter,
    name: &'static str,
    description: &'static str,
    registers: &Arc<Registers>,
    read: fn(&Registers) -> u64,
) -> ObservableCounter<u64> {
    let regs = registers.clone();
    meter
        .u64_observable_counter(name)
        .with_description(description)
        .with_callback(move |observer| observer.observe(read(&regs), &[service_kv()]))
        .build()
}

fn service_kv() -> KeyValue {
    KeyValue::new(SERVICE_TAG.0, SERVICE_TAG.1)
}

/// Point-in-time read of the registers. Fields are read one by one, so a
/// concurrent request may be reflected in some of them and not others.
#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub total_api_calls: u64,
    pub total_errors: u64,
    pub active_connections: i64,
    pub total_requests: u64,
    pub calls_by_method: BTreeMap<String, u64>,
    pub uptime_seconds: f64,
    #[schema(value_type = String)]
    pub timestamp: NaiveDateTime,
}

impl MetricsSummary {
    pub fn calls(&self, method: EchoMethod) -> u64 {
        self.calls_by_method
            .get(method.as_str())
            .copied()
            .unwrap_or_default()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let registers = Arc::new(Registers {
            started_at: Instant::now(),
            api_calls: Default::default(),
            total_requests: Counter::default(),
            errors: Counter::default(),
            active_connections: Gauge::default(),
            response_time: Timer::default(),
        });
        let otel = Instruments::new(&registers);
        tracing::info!(target: "metrics::registry", "📊 metrics registry initialized with custom metrics");
        Self {
            registers,
            custom: DashMap::new(),
            otel,
        }
    }

    /// One echo request: bumps the per-method call counter and the request total.
    pub fn increment_api_calls(&self, method: EchoMethod) {
        self.registers.api_calls[method.index()].inc();
        self.registers.total_requests.inc();
        debug!(target: "metrics::registry", %method, "API calls counter incremented");
    }

    pub fn increment_errors(&self) {
        self.registers.errors.inc();
        debug!(target: "metrics::registry", "Error counter incremented");
    }

    pub fn record_response_time(&self, duration: Duration) {
        self.registers.response_time.record(duration);
        self.otel
            .response_time
            .record(duration.as_secs_f64(), &[service_kv()]);
        debug!(target: "metrics::registry", elapsed_us = duration.as_micros(), "Response time recorded");
    }

    pub fn increment_active_connections(&self) {
        let now = self.registers.active_connections.inc();
        debug!(target: "metrics::registry", active = now, "Active connections incremented");
    }

    pub fn decrement_active_connections(&self) {
        let now = self.registers.active_connections.dec();
        debug!(target: "metrics::registry", active = now, "Active connections decremented");
    }

    pub fn api_calls(&self, method: EchoMethod) -> u64 {
        self.registers.api_calls[method.index()].get()
    }

    pub fn total_api_calls(&self) -> u64 {
        self.registers.api_calls.iter().map(Counter::get).sum()
    }

    pub fn total_requests(&self) -> u64 {
        self.registers.total_requests.get()
    }

    pub fn errors(&self) -> u64 {
        self.registers.errors.get()
    }

    pub fn active_connections(&self) -> i64 {
        self.registers.active_connections.get()
    }

    pub fn response_time(&self) -> TimerSnapshot {
        self.registers.response_time.snapshot()
    }

    /// Time elapsed since the registry was built.
    pub fn uptime(&self) -> Duration {
        self.registers.started_at.elapsed()
    }

    pub fn metrics_summary(&self) -> MetricsSummary {
        let calls_by_method: BTreeMap<String, u64> = EchoMethod::ALL
            .iter()
            .map(|m| (m.as_str().to_string(), self.api_calls(*m)))
            .collect();
        MetricsSummary {
            total_api_calls: calls_by_method.values().sum(),
            total_errors: self.errors(),
            active_connections: self.active_connections(),
            total_requests: self.total_requests(),
            calls_by_method,
            uptime_seconds: self.uptime().as_secs_f64(),
            timestamp: Local::now().naive_local(),
        }
    }

    /// Registers (or returns the already registered) counter `name`. `tags`
    /// is a flat key/value list; a trailing key without value is dropped.
    pub fn create_custom_counter(
        &self,
        name: &str,
        description: &str,
        tags: &[&str],
    ) -> Result<Arc<CustomCounter>, MetricsError> {
        self.ensure_not_builtin(name, "counter")?;
        let entry = self.custom.entry(name.to_string()).or_insert_with(|| {
            let info = MetricInfo::new(name, description, tag_pairs(tags));
            let value = Arc::new(Counter::default());
            let (observed, attributes) = (value.clone(), info.attributes.clone());
            let otel = self
                .otel
                .meter
                .u64_observable_counter(name.to_string())
                .with_description(description.to_string())
                .with_callback(move |observer| observer.observe(observed.get(), &attributes))
                .build();
            debug!(target: "metrics::registry", name, "custom counter registered");
            CustomMetric::Counter(Arc::new(CustomCounter {
                info,
                value,
                _otel: otel,
            }))
        });
        match entry.value() {
            CustomMetric::Counter(c) => Ok(c.clone()),
            other => Err(MetricsError::Conflict {
                name: name.to_string(),
                existing: other.kind(),
                requested: "counter",
            }),
        }
    }

    /// Timer counterpart of [`MetricsRegistry::create_custom_counter`].
    pub fn create_custom_timer(
        &self,
        name: &str,
        description: &str,
        tags: &[&str],
    ) -> Result<Arc<CustomTimer>, MetricsError> {
        self.ensure_not_builtin(name, "timer")?;
        let entry = self.custom.entry(name.to_string()).or_insert_with(|| {
            let tags = tag_pairs(tags);
            let otel = self
                .otel
                .meter
                .f64_histogram(name.to_string())
                .with_description(description.to_string())
                .with_unit("s")
                .build();
            debug!(target: "metrics::registry", name, "custom timer registered");
            CustomMetric::Timer(Arc::new(CustomTimer {
                info: MetricInfo::new(name, description, tags),
                value: Timer::default(),
                otel,
            }))
        });
        match entry.value() {
            CustomMetric::Timer(t) => Ok(t.clone()),
            other => Err(MetricsError::Conflict {
                name: name.to_string(),
                existing: other.kind(),
                requested: "timer",
            }),
        }
    }

    fn ensure_not_builtin(&self, name: &str, requested: &'static str) -> Result<(), MetricsError> {
        if BUILTIN_NAMES.contains(&name) {
            return Err(MetricsError::Conflict {
                name: name.to_string(),
                existing: "builtin",
                requested,
            });
        }
        Ok(())
    }

    /// Custom metrics sorted by name.
    pub fn custom_metrics(&self) -> Vec<CustomMetric> {
        let mut all: Vec<CustomMetric> = self.custom.iter().map(|r| r.value().clone()).collect();
        all.sort_by(|a, b| a.info().name.cmp(&b.info().name));
        all
    }
}

/// Pairs up a flat `[k1, v1, k2, v2, ...]` list.
pub fn tag_pairs(tags: &[&str]) -> Vec<(String, String)> {
    tags.chunks_exact(2)
        .map(|pair| (pair[0].to_string(), pair[1].to_string()))
        .collect()
}

#[derive(Debug, Clone)]
pub struct MetricInfo {
    pub name: String,
    pub description: String,
    pub tags: Vec<(String, String)>,
    attributes: Vec<KeyValue>,
}

impl MetricInfo {
    fn new(name: &str, description: &str, tags: Vec<(String, String)>) -> Self {
        let attributes = tags
            .iter()
            .map(|(k, v)| KeyValue::new(k.clone(), v.clone()))
            .collect();
        Self {
            name: name.to_string(),
            description: description.to_string(),
            tags,
            attributes,
        }
    }
}

#[derive(Clone)]
pub enum CustomMetric {
    Counter(Arc<CustomCounter>),
    Timer(Arc<CustomTimer>),
}

impl CustomMetric {
    pub fn kind(&self) -> &'static str {
        match self {
            CustomMetric::Counter(_) => "counter",
            CustomMetric::Timer(_) => "timer",
        }
    }

    pub fn info(&self) -> &MetricInfo {
        match self {
            CustomMetric::Counter(c) => &c.info,
            CustomMetric::Timer(t) => &t.info,
        }
    }
}

pub struct CustomCounter {
    info: MetricInfo,
    value: Arc<Counter>,
    _otel: ObservableCounter<u64>,
}

impl CustomCounter {
    pub fn increment(&self) {
        self.add(1);
    }

    pub fn add(&self, v: u64) {
        self.value.add(v);
    }

    pub fn count(&self) -> u64 {
        self.value.get()
    }

    pub fn info(&self) -> &MetricInfo {
        &self.info
    }
}

pub struct CustomTimer {
    info: MetricInfo,
    value: Timer,
    otel: Histogram<f64>,
}

impl CustomTimer {
    pub fn record(&self, duration: Duration) {
        self.value.record(duration);
        self.otel.record(duration.as_secs_f64(), &self.info.attributes);
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        self.value.snapshot()
    }

    pub fn info(&self) -> &MetricInfo {
        &self.info
    }
}
