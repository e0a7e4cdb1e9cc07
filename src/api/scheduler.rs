use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::middleware::{AppState, AuthUser};
use crate::models::{JobKind, JobReport, JobRun};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/jobs/:job/run", post(run_job))
        .route("/runs", get(list_runs))
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RunsQuery {
    pub limit: Option<i64>,
}

/// Запустить задачу вручную
///
/// Повторный запуск за тот же бизнес-день отклоняется, как и плановый.
#[utoipa::path(
    post,
    path = "/api/v1/scheduler/jobs/{job}/run",
    tag = "scheduler",
    security(("bearer_auth" = [])),
    params(
        ("job" = String, Path, description = "delivery_materialization | payment_reminders | overdue_transition")
    ),
    responses(
        (status = 200, description = "Итог выполнения", body = JobReport),
        (status = 403, description = "Только администратор"),
        (status = 404, description = "Неизвестная задача"),
        (status = 409, description = "Задача уже выполнена сегодня")
    )
)]
pub async fn run_job(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(job): Path<String>,
) -> AppResult<Json<JobReport>> {
    auth_user.require_admin()?;

    let job = JobKind::from_name(&job)
        .ok_or_else(|| AppError::NotFound(format!("Задача {} не найдена", job)))?;

    let report = state
        .scheduler()
        .run_job(job, Utc::now())
        .await?
        .ok_or_else(|| {
            AppError::Conflict(format!("Задача {} уже выполнена сегодня", job.name()))
        })?;

    Ok(Json(report))
}

/// Последние запуски фоновых задач
#[utoipa::path(
    get,
    path = "/api/v1/scheduler/runs",
    tag = "scheduler",
    security(("bearer_auth" = [])),
    params(RunsQuery),
    responses(
        (status = 200, description = "Запуски", body = Vec<JobRun>),
        (status = 403, description = "Только администратор")
    )
)]
pub async fn list_runs(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<RunsQuery>,
) -> AppResult<Json<Vec<JobRun>>> {
    auth_user.require_admin()?;
    let runs = state
        .scheduler()
        .recent_runs(query.limit.unwrap_or(50).clamp(1, 500))
        .await?;
    Ok(Json(runs))
}
