use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;

use crate::api::routes::{db, AuthBearer};
use crate::api::types::{GoalListQuery, GoalPayload, GoalProgressQuery};
use crate::errors::{AppError, Result};
use crate::models::goal::{GoalProgress, UserGoal};
use crate::services::goals;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list).post(create))
        .route("/progress", get(progress))
        .route("/:id", get(get_one).put(update).delete(delete))
}

fn not_found() -> AppError {
    AppError::NotFound("Goal not found".to_string())
}

#[utoipa::path(
    post,
    path = "/api/goals",
    request_body = GoalPayload,
    responses((status = 201, body = UserGoal), (status = 400, description = "Bad sphere/metric or active-goal cap reached"), (status = 401)),
    security(("bearer" = [])),
    tag = "goals"
)]
pub(crate) async fn create(
    AuthBearer(auth): AuthBearer,
    Json(payload): Json<GoalPayload>,
) -> Result<(StatusCode, Json<UserGoal>)> {
    let goal = UserGoal {
        id: 0,
        user_id: auth.user_id,
        sphere: payload.sphere,
        title: payload.title,
        target_value: payload.target_value,
        target_metric: payload.target_metric,
        deadline: payload.deadline,
        archived: payload.archived,
        created_at: Utc::now(),
    };
    let db = db()?;
    let stored = goals::create_goal(&db, &goal).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

#[utoipa::path(
    get,
    path = "/api/goals",
    params(("include_archived" = Option<bool>, Query, description = "Include archived goals")),
    responses((status = 200, body = [UserGoal]), (status = 401)),
    security(("bearer" = [])),
    tag = "goals"
)]
pub(crate) async fn list(
    AuthBearer(auth): AuthBearer,
    Query(query): Query<GoalListQuery>,
) -> Result<Json<Vec<UserGoal>>> {
    let goals = db()?.list_goals(auth.user_id, query.include_archived).await?;
    Ok(Json(goals))
}

#[utoipa::path(
    get,
    path = "/api/goals/progress",
    params(("period" = Option<String>, Query, description = "One of 7d, month, deadline")),
    responses((status = 200, body = [GoalProgress]), (status = 400), (status = 401)),
    security(("bearer" = [])),
    tag = "goals"
)]
pub(crate) async fn progress(
    AuthBearer(auth): AuthBearer,
    Query(query): Query<GoalProgressQuery>,
) -> Result<Json<Vec<GoalProgress>>> {
    let db = db()?;
    let progress = goals::goal_progress_for_user(&db, auth.user_id, &query.period).await?;
    Ok(Json(progress))
}

#[utoipa::path(
    get,
    path = "/api/goals/{id}",
    params(("id" = i64, Path, description = "Goal id")),
    responses((status = 200, body = UserGoal), (status = 404), (status = 401)),
    security(("bearer" = [])),
    tag = "goals"
)]
pub(crate) async fn get_one(AuthBearer(auth): AuthBearer, Path(id): Path<i64>) -> Result<Json<UserGoal>> {
    let goal = db()?.get_goal(id, auth.user_id).await?.ok_or_else(not_found)?;
    Ok(Json(goal))
}

#[utoipa::path(
    put,
    path = "/api/goals/{id}",
    params(("id" = i64, Path, description = "Goal id")),
    request_body = GoalPayload,
    responses((status = 200, body = UserGoal), (status = 404), (status = 400), (status = 401)),
    security(("bearer" = [])),
    tag = "goals"
)]
pub(crate) async fn update(
    AuthBearer(auth): AuthBearer,
    Path(id): Path<i64>,
    Json(payload): Json<GoalPayload>,
) -> Result<Json<UserGoal>> {
    let db = db()?;
    let existing = db.get_goal(id, auth.user_id).await?.ok_or_else(not_found)?;
    let goal = UserGoal {
        id,
        user_id: auth.user_id,
        sphere: payload.sphere,
        title: payload.title,
        target_value: payload.target_value,
        target_metric: payload.target_metric,
        deadline: payload.deadline,
        archived: payload.archived,
        created_at: existing.created_at,
    };
    let stored = goals::update_goal(&db, &goal).await?;
    Ok(Json(stored))
}

#[utoipa::path(
    delete,
    path = "/api/goals/{id}",
    params(("id" = i64, Path, description = "Goal id")),
    responses((status = 204), (status = 404), (status = 401)),
    security(("bearer" = [])),
    tag = "goals"
)]
pub(crate) async fn delete(AuthBearer(auth): AuthBearer, Path(id): Path<i64>) -> Result<StatusCode> {
    if !db()?.delete_goal(id, auth.user_id).await? {
        return Err(not_found());
    }
    Ok(StatusCode::NO_CONTENT)
}
