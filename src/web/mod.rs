use axum::{
    Json, Router,
    extract::FromRequestParts,
    http::{Method, request::Parts},
    routing::get,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::scheduler::SchedulerHandle;
use crate::server::core_services::MonitorService;
use crate::web::error::AppError;

pub mod error;
pub mod routes;

/// Header carrying the identity of the operator behind a request. Auth is
/// done upstream; this service only records who changed what.
pub const ACTOR_HEADER: &str = "x-actor-id";

#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<MonitorService>,
    pub scheduler: Option<Arc<SchedulerHandle>>,
}

/// Operator identity taken from [`ACTOR_HEADER`].
#[derive(Debug, Clone)]
pub struct Actor(pub String);

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(ACTOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Actor(v.to_string()))
            .ok_or_else(|| AppError::Unauthorized(format!("missing {ACTOR_HEADER} header")))
    }
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api/alerts", routes::alert_routes::create_alert_router())
        .nest("/api/sites", routes::site_routes::create_site_router())
        .nest("/api/tasks", routes::task_routes::create_task_router())
        .layer(cors)
        .with_state(app_state)
}
