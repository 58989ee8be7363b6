use crate::error::AppError;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_SERVICE_NAME: &str = "DevOps Challenge API";

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub service_name: String,
    pub service_version: String,
    pub request_timeout: Duration,
    pub body_limit: usize,
    /// OTLP/gRPC collector, e.g. `http://localhost:4317`. Export is off when unset.
    pub otlp_endpoint: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            request_timeout: Duration::from_millis(10_000),
            body_limit: 2 * 1024 * 1024,
            otlp_endpoint: None,
        }
    }
}

impl Config {
    /// Reads the process environment, after loading `.env` if one exists.
    pub fn from_env() -> Result<Self, AppError> {
        // .env 文件不存在时忽略
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let bind_addr = parse_or(&lookup, "ECHO_BIND_ADDR", defaults.bind_addr)?;
        let timeout_ms = parse_or(
            &lookup,
            "ECHO_REQUEST_TIMEOUT_MS",
            defaults.request_timeout.as_millis() as u64,
        )?;
        let body_limit = parse_or(&lookup, "ECHO_BODY_LIMIT_BYTES", defaults.body_limit)?;

        Ok(Self {
            bind_addr,
            service_name: non_empty(lookup("ECHO_SERVICE_NAME")).unwrap_or(defaults.service_name),
            service_version: non_empty(lookup("ECHO_SERVICE_VERSION"))
                .unwrap_or(defaults.service_version),
            request_timeout: Duration::from_millis(timeout_ms),
            body_limit,
            otlp_endpoint: non_empty(lookup("OTEL_EXPORTER_OTLP_ENDPOINT")),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty(lookup(key)) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| AppError::Config {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.bind_addr, SocketAddr::from(([0, 0, 0, 0], 8080)));
        assert_eq!(config.service_name, DEFAULT_SERVICE_NAME);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert!(config.otlp_endpoint.is_none());
    }

    #[test]
    fn overrides_are_applied() {
        let config = Config::from_lookup(lookup_from(&[
            ("ECHO_BIND_ADDR", "127.0.0.1:3000"),
            ("ECHO_REQUEST_TIMEOUT_MS", "250"),
            ("ECHO_BODY_LIMIT_BYTES", "1024"),
            ("OTEL_EXPORTER_OTLP_ENDPOINT", "http://localhost:4317"),
            ("ECHO_SERVICE_NAME", "  "),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr, SocketAddr::from(([127, 0, 0, 1], 3000)));
        assert_eq!(config.request_timeout, Duration::from_millis(250));
        assert_eq!(config.body_limit, 1024);
        assert_eq!(config.otlp_endpoint.as_deref(), Some("http://localhost:4317"));
        // blank values fall back to the default
        assert_eq!(config.service_name, DEFAULT_SERVICE_NAME);
    }

    #[test]
    fn bad_value_is_reported_with_its_key() {
        let err = Config::from_lookup(lookup_from(&[("ECHO_BIND_ADDR", "not-an-addr")]))
            .unwrap_err();
        match err {
            AppError::Config { key, value, .. } => {
                assert_eq!(key, "ECHO_BIND_ADDR");
                assert_eq!(value, "not-an-addr");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
