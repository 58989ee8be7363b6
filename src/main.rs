use echo_api::telemetry::init_telemetry;
use echo_api::{AppError, AppState, Config, MetricsRegistry, build_app};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Echo API server
///
/// how to run:
/// ```bash
/// ECHO_BIND_ADDR=127.0.0.1:8080 cargo run
/// ```
///
/// test with curl:
/// ```bash
/// curl -X POST -H "Content-Type: application/json" -d '{"message":"Hello World"}' http://127.0.0.1:8080/api
/// curl http://127.0.0.1:8080/actuator/prometheus
/// ```
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Server error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    let config = Config::from_env()?;
    // telemetry 必须先于 registry 初始化，否则 instrument 绑定到 noop MeterProvider
    let telemetry = init_telemetry(&config)?;
    let registry = Arc::new(MetricsRegistry::new());

    let addr = config.bind_addr;
    let app = build_app(AppState::new(config, registry));

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(target: "server", %addr, "🚀 Listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!(target: "server", "server stopped");
    telemetry.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(target: "server", error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!(target: "server", "🛑 shutdown signal received");
}
