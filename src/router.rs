use crate::controller::ClusterStatus;
use crate::registry::ControllerRegistry;
use axum::{Router, extract::State as AxumState, response::Json, routing::get};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Serialize)]
struct HealthCheck {
    message: String,
}

pub fn new_router(registry: Arc<ControllerRegistry>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/clusters", get(clusters))
        .layer(TraceLayer::new_for_http())
        .with_state(registry)
}

async fn clusters(
    AxumState(registry): AxumState<Arc<ControllerRegistry>>,
) -> Json<Vec<ClusterStatus>> {
    Json(registry.statuses())
}

async fn healthz() -> Json<HealthCheck> {
    Json(HealthCheck {
        message: "ok".into(),
    })
}
