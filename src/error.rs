use thiserror::Error;

/// Process-level failures. Any of these aborts startup.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid configuration {key}={value:?}: {reason}")]
    Config {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Telemetry error: {0}")]
    Telemetry(String),
}

impl From<tracing::subscriber::SetGlobalDefaultError> for AppError {
    fn from(e: tracing::subscriber::SetGlobalDefaultError) -> Self {
        AppError::Telemetry(e.to_string())
    }
}

/// Failure while assembling an echo response. Never surfaces as a status code,
/// the handler folds it into the `error` field of the response.
#[derive(Error, Debug, Clone)]
pub enum EchoError {
    #[error("unreadable body: {0}")]
    Body(String),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MetricsError {
    #[error("metric {name} already registered as {existing}, cannot register as {requested}")]
    Conflict {
        name: String,
        existing: &'static str,
        requested: &'static str,
    },
    #[error("prometheus exposition failed: {0}")]
    Exposition(String),
}

impl From<prometheus::Error> for MetricsError {
    fn from(e: prometheus::Error) -> Self {
        MetricsError::Exposition(e.to_string())
    }
}
