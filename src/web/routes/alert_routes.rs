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

use crate::alerting::report::{AlertReport, ReportPeriod};
use crate::db::models::Alert;
use crate::web::{Actor, AppError, AppState};

const DEFAULT_HISTORY_LIMIT: u64 = 50;
const MAX_HISTORY_LIMIT: u64 = 500;

pub fn create_alert_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_active_alerts))
        .route("/history", get(alert_history))
        .route("/report", get(alert_report))
        .route("/{id}", get(get_alert))
        .route("/{id}/resolve", post(resolve_alert))
}

#[derive(Deserialize)]
struct SiteFilter {
    site_id: Option<Uuid>,
}

#[derive(Deserialize)]
struct HistoryQuery {
    site_id: Option<Uuid>,
    limit: Option<u64>,
}

#[derive(Deserialize)]
struct ReportQuery {
    #[serde(default)]
    period: ReportPeriod,
}

async fn list_active_alerts(
    State(app_state): State<Arc<AppState>>,
    Query(filter): Query<SiteFilter>,
) -> Result<Json<Vec<Alert>>, AppError> {
    let alerts = app_state.monitor.get_active_alerts(filter.site_id).await?;
    Ok(Json(alerts))
}

async fn alert_history(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<Alert>>, AppError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let alerts = app_state
        .monitor
        .get_alert_history(query.site_id, limit)
        .await?;
    Ok(Json(alerts))
}

async fn alert_report(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<AlertReport>, AppError> {
    Ok(Json(app_state.monitor.get_report(query.period).await?))
}

async fn get_alert(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Alert>, AppError> {
    Ok(Json(app_state.monitor.get_alert(id).await?))
}

async fn resolve_alert(
    State(app_state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    app_state
        .monitor
        .resolve_alert(id, Some(actor.clone()))
        .await?;
    info!(alert_id = %id, actor = %actor, "Alert resolved via API.");
    Ok(StatusCode::NO_CONTENT)
}
