use crate::config::Config;
use crate::metrics::MetricsRegistry;
use chrono::{Local, NaiveDateTime};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<MetricsRegistry>,
    /// When this application instance was assembled, reported by `/api/info`.
    pub started_at: NaiveDateTime,
}

impl AppState {
    pub fn new(config: Config, registry: Arc<MetricsRegistry>) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            started_at: Local::now().naive_local(),
        }
    }
}
