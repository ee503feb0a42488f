use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use std::sync::Arc;
use tracing::info;

use crate::scheduler::SchedulerError;
use crate::web::{AppError, AppState};

pub fn create_task_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_tasks))
        .route("/{name}/run", post(run_task))
}

async fn list_tasks(State(app_state): State<Arc<AppState>>) -> Json<Vec<String>> {
    let mut names: Vec<String> = app_state
        .scheduler
        .as_ref()
        .map(|s| s.task_names().into_iter().map(String::from).collect())
        .unwrap_or_default();
    names.sort();
    Json(names)
}

/// Runs a sweep out of schedule and waits for it to finish.
async fn run_task(
    State(app_state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let scheduler = app_state
        .scheduler
        .as_ref()
        .ok_or_else(|| AppError::NotFound("scheduler is not running".to_string()))?;
    match scheduler.run_now(&name).await {
        Ok(true) => {
            info!(task = %name, "Task run triggered via API.");
            Ok(Json(serde_json::json!({ "task": name, "ran": true })))
        }
        Ok(false) => Err(AppError::Conflict(format!("task {name} is already running"))),
        Err(e @ SchedulerError::UnknownTask(_)) => Err(AppError::NotFound(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use crate::web::routes::test_support::TestApp;
    use reqwest::StatusCode;

    #[tokio::test]
    async fn run_task_by_name() {
        let app = TestApp::spawn_with_scheduler().await;

        let names: Vec<String> = app
            .client
            .get(app.url("/api/tasks"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(names, vec!["escalation", "pending", "probe", "retention"]);

        let response = app
            .client
            .post(app.url("/api/tasks/retention/run"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .client
            .post(app.url("/api/tasks/nope/run"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
