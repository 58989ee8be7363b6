use crate::api::{Health, Info};
use crate::echo::{EchoMethod, EchoResponse};
use crate::metrics::MetricsSummary;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::echo_get,
        crate::api::echo_post,
        crate::api::echo_put,
        crate::api::echo_delete,
        crate::api::health,
        crate::api::info,
        crate::api::actuator_metrics,
        crate::api::actuator_prometheus
    ),
    components(schemas(EchoMethod, EchoResponse, Health, Info, MetricsSummary)),
    info(
        title = "DevOps Challenge API",
        version = "1.0.0",
        description = "Echoes requests back as JSON and exposes request counters"
    )
)]
pub struct ApiDoc;
