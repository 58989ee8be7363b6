use crate::config::Config;
use crate::error::AppError;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

/// Keeps the OTLP providers alive; call [`Telemetry::shutdown`] before exit to
/// flush pending spans and metrics.
#[derive(Default)]
pub struct Telemetry {
    tracer_provider: Option<SdkTracerProvider>,
    meter_provider: Option<SdkMeterProvider>,
}

impl Telemetry {
    pub fn shutdown(self) {
        if let Some(provider) = self.tracer_provider {
            if let Err(e) = provider.shutdown() {
                tracing::warn!(target: "telemetry::shutdown", error = %e, "tracer provider shutdown failed");
            }
        }
        if let Some(provider) = self.meter_provider {
            if let Err(e) = provider.shutdown() {
                tracing::warn!(target: "telemetry::shutdown", error = %e, "meter provider shutdown failed");
            }
        }
    }
}

// 初始化 Tracing和OpenTelemetry
pub fn init_telemetry(config: &Config) -> Result<Telemetry, AppError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // 配置终端输出
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

    let Some(endpoint) = config.otlp_endpoint.as_deref() else {
        let subscriber = Registry::default().with(filter).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
        tracing::info!(
            target: "telemetry::init",
            telemetry_backend = "tracing",
            "Tracing initialized, OTLP export disabled"
        );
        return Ok(Telemetry::default());
    };

    let resource = Resource::builder()
        .with_service_name(config.service_name.clone())
        .build();

    // 配置 tracer的 OTLP 导出器
    let span_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| AppError::Telemetry(e.to_string()))?;
    let tracer_provider = SdkTracerProvider::builder()
        .with_batch_exporter(span_exporter)
        .with_resource(resource.clone())
        .build();
    let tracer = tracer_provider.tracer("echo-api");
    opentelemetry::global::set_tracer_provider(tracer_provider.clone());

    // 配置 Metrics 的 OTLP 导出器，registry 中的 instrument 通过全局 MeterProvider 导出
    let metric_exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| AppError::Telemetry(e.to_string()))?;
    let meter_provider = SdkMeterProvider::builder()
        .with_periodic_exporter(metric_exporter)
        .with_resource(resource)
        .build();
    opentelemetry::global::set_meter_provider(meter_provider.clone());

    let telemetry_layer = tracing_opentelemetry::layer().with_tracer(tracer);
    let subscriber = Registry::default()
        .with(filter)
        .with(fmt_layer) // 终端输出
        .with(telemetry_layer); // 导出到OTEL
    tracing::subscriber::set_global_default(subscriber)?;

    tracing::info!(
        target: "telemetry::init",
        exporter_backend = "opentelemetry",
        exporter_protocol = "otlp/grpc",
        exporter_endpoint = endpoint,
        "OTLP span and metric exporters initialized"
    );

    Ok(Telemetry {
        tracer_provider: Some(tracer_provider),
        meter_provider: Some(meter_provider),
    })
}
