use crate::config::Config;
pub(crate) use tower_http::timeout::TimeoutLayer;

/// Requests still running after the configured budget get `408 Request Timeout`.
pub fn timeout_layer(config: &Config) -> TimeoutLayer {
    TimeoutLayer::new(config.request_timeout)
}
