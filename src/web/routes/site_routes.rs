use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::alerting::report::ReportPeriod;
use crate::db::models::{CheckResult, NewSite, Site, SiteUpdate};
use crate::monitoring::recorder::SiteMetrics;
use crate::server::core_services::SiteStatusSummary;
use crate::web::{Actor, AppError, AppState};

pub fn create_site_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_sites).post(register_site))
        .route("/summary", get(status_summary))
        .route("/{id}", get(get_site).patch(update_site).delete(delete_site))
        .route("/{id}/test", post(test_site))
        .route("/{id}/metrics", get(site_metrics))
        .route("/{id}/history", get(site_history))
}

#[derive(Deserialize)]
struct MetricsQuery {
    #[serde(default)]
    period: ReportPeriod,
}

/// Longest history window served, matching the 30d report period.
const MAX_HISTORY_HOURS: i64 = 24 * 30;

fn default_window_hours() -> i64 {
    24
}

#[derive(Deserialize)]
struct HistoryQuery {
    #[serde(default = "default_window_hours")]
    hours: i64,
    limit: Option<u64>,
}

async fn list_sites(State(app_state): State<Arc<AppState>>) -> Result<Json<Vec<Site>>, AppError> {
    Ok(Json(app_state.monitor.list_sites().await?))
}

async fn register_site(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<NewSite>,
) -> Result<(StatusCode, Json<Site>), AppError> {
    if payload.name.trim().is_empty() || payload.url.trim().is_empty() {
        return Err(AppError::InvalidInput("name and url are required".to_string()));
    }
    if payload.timeout_secs <= 0 || payload.check_interval_secs <= 0 {
        return Err(AppError::InvalidInput(
            "timeout_secs and check_interval_secs must be positive".to_string(),
        ));
    }
    let site = app_state.monitor.register_site(payload).await?;
    Ok((StatusCode::CREATED, Json(site)))
}

async fn status_summary(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<SiteStatusSummary>, AppError> {
    Ok(Json(app_state.monitor.get_site_status_summary().await?))
}

async fn get_site(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Site>, AppError> {
    Ok(Json(app_state.monitor.get_site(id).await?))
}

async fn update_site(
    State(app_state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<SiteUpdate>,
) -> Result<Json<Site>, AppError> {
    if payload.is_empty() {
        return Err(AppError::InvalidInput("no fields to update".to_string()));
    }
    let blank = |v: &Option<String>| v.as_deref().is_some_and(|v| v.trim().is_empty());
    if blank(&payload.name) || blank(&payload.url) || blank(&payload.endpoint_health) {
        return Err(AppError::InvalidInput(
            "name, url and endpoint_health cannot be blank".to_string(),
        ));
    }
    let non_positive = |v: Option<i32>| v.is_some_and(|v| v <= 0);
    if non_positive(payload.timeout_secs) || non_positive(payload.check_interval_secs) {
        return Err(AppError::InvalidInput(
            "timeout_secs and check_interval_secs must be positive".to_string(),
        ));
    }
    let site = app_state.monitor.update_site(id, payload, &actor).await?;
    info!(site_id = %id, actor = %actor, "Site updated via API.");
    Ok(Json(site))
}

async fn delete_site(
    State(app_state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    app_state.monitor.delete_site(id, &actor).await?;
    info!(site_id = %id, actor = %actor, "Site deleted via API.");
    Ok(StatusCode::NO_CONTENT)
}

async fn test_site(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CheckResult>, AppError> {
    Ok(Json(app_state.monitor.test_site_now(id).await?))
}

async fn site_metrics(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<MetricsQuery>,
) -> Result<Json<SiteMetrics>, AppError> {
    Ok(Json(app_state.monitor.site_metrics(id, query.period).await?))
}

async fn site_history(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<CheckResult>>, AppError> {
    if query.hours <= 0 || query.hours > MAX_HISTORY_HOURS {
        return Err(AppError::InvalidInput(format!(
            "hours must be between 1 and {MAX_HISTORY_HOURS}"
        )));
    }
    let checks = app_state
        .monitor
        .site_history(id, query.hours, query.limit)
        .await?;
    Ok(Json(checks))
}
