pub mod api;
pub mod app;
pub mod config;
pub mod echo;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod open_api;
pub mod state;
pub mod telemetry;

pub use app::build_app;
pub use config::Config;
pub use error::AppError;
pub use metrics::MetricsRegistry;
pub use state::AppState;
