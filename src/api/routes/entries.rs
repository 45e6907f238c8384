use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::routes::{current_user, db, AuthBearer};
use crate::api::types::{
    FinanceEntryPayload, HealthEntryPayload, LearningEntryPayload, ListEntriesQuery,
    ProductivityEntryPayload,
};
use crate::errors::{AppError, Result};
use crate::models::entry::{FinanceEntry, HealthEntry, LearningEntry, ProductivityEntry};
use crate::services::cache;

pub fn router() -> Router {
    Router::new()
        .route("/health", get(list_health).post(create_health))
        .route(
            "/health/:id",
            get(get_health).put(update_health).delete(delete_health),
        )
        .route("/finance", get(list_finance).post(create_finance))
        .route(
            "/finance/:id",
            get(get_finance).put(update_finance).delete(delete_finance),
        )
        .route(
            "/productivity",
            get(list_productivity).post(create_productivity),
        )
        .route(
            "/productivity/:id",
            get(get_productivity)
                .put(update_productivity)
                .delete(delete_productivity),
        )
        .route("/learning", get(list_learning).post(create_learning))
        .route(
            "/learning/:id",
            get(get_learning).put(update_learning).delete(delete_learning),
        )
}

pub(crate) async fn fallback_timezone(auth: &crate::services::jwt::AuthenticatedUser) -> Result<Option<String>> {
    Ok(current_user(auth).await?.default_timezone)
}

fn not_found() -> AppError {
    AppError::NotFound("Entry not found".to_string())
}

// --- health ---

#[utoipa::path(
    post,
    path = "/api/entries/health",
    request_body = HealthEntryPayload,
    responses((status = 201, body = HealthEntry), (status = 400), (status = 401)),
    security(("bearer" = [])),
    tag = "entries"
)]
pub(crate) async fn create_health(
    AuthBearer(auth): AuthBearer,
    Json(payload): Json<HealthEntryPayload>,
) -> Result<(StatusCode, Json<HealthEntry>)> {
    let db = db()?;
    let tz = fallback_timezone(&auth).await?;
    let entry = payload.into_entry(0, auth.user_id, tz.as_deref())?;
    let id = db.insert_health(&entry).await?;
    cache::invalidate_user(auth.user_id);
    let stored = db.get_health(id, auth.user_id).await?.ok_or_else(not_found)?;
    Ok((StatusCode::CREATED, Json(stored)))
}

#[utoipa::path(
    get,
    path = "/api/entries/health",
    params(
        ("start_date" = Option<String>, Query, description = "Inclusive lower bound (YYYY-MM-DD)"),
        ("end_date" = Option<String>, Query, description = "Inclusive upper bound (YYYY-MM-DD)"),
        ("limit" = Option<i64>, Query, description = "Page size, capped at 1000"),
        ("offset" = Option<i64>, Query, description = "Rows to skip")
    ),
    responses((status = 200, body = [HealthEntry]), (status = 401)),
    security(("bearer" = [])),
    tag = "entries"
)]
pub(crate) async fn list_health(
    AuthBearer(auth): AuthBearer,
    Query(query): Query<ListEntriesQuery>,
) -> Result<Json<Vec<HealthEntry>>> {
    let entries = db()?.list_health(auth.user_id, query.into_filter()).await?;
    Ok(Json(entries))
}

#[utoipa::path(
    get,
    path = "/api/entries/health/{id}",
    params(("id" = i64, Path, description = "Entry id")),
    responses((status = 200, body = HealthEntry), (status = 404), (status = 401)),
    security(("bearer" = [])),
    tag = "entries"
)]
pub(crate) async fn get_health(
    AuthBearer(auth): AuthBearer,
    Path(id): Path<i64>,
) -> Result<Json<HealthEntry>> {
    let entry = db()?.get_health(id, auth.user_id).await?.ok_or_else(not_found)?;
    Ok(Json(entry))
}

#[utoipa::path(
    put,
    path = "/api/entries/health/{id}",
    params(("id" = i64, Path, description = "Entry id")),
    request_body = HealthEntryPayload,
    responses((status = 200, body = HealthEntry), (status = 404), (status = 400), (status = 401)),
    security(("bearer" = [])),
    tag = "entries"
)]
pub(crate) async fn update_health(
    AuthBearer(auth): AuthBearer,
    Path(id): Path<i64>,
    Json(payload): Json<HealthEntryPayload>,
) -> Result<Json<HealthEntry>> {
    let db = db()?;
    db.get_health(id, auth.user_id).await?.ok_or_else(not_found)?;
    let tz = fallback_timezone(&auth).await?;
    let entry = payload.into_entry(id, auth.user_id, tz.as_deref())?;
    db.update_health(&entry).await?;
    cache::invalidate_user(auth.user_id);
    let stored = db.get_health(id, auth.user_id).await?.ok_or_else(not_found)?;
    Ok(Json(stored))
}

#[utoipa::path(
    delete,
    path = "/api/entries/health/{id}",
    params(("id" = i64, Path, description = "Entry id")),
    responses((status = 204), (status = 404), (status = 401)),
    security(("bearer" = [])),
    tag = "entries"
)]
pub(crate) async fn delete_health(AuthBearer(auth): AuthBearer, Path(id): Path<i64>) -> Result<StatusCode> {
    if !db()?.delete_health(id, auth.user_id).await? {
        return Err(not_found());
    }
    cache::invalidate_user(auth.user_id);
    Ok(StatusCode::NO_CONTENT)
}

// --- finance ---

#[utoipa::path(
    post,
    path = "/api/entries/finance",
    request_body = FinanceEntryPayload,
    responses((status = 201, body = FinanceEntry), (status = 400), (status = 401)),
    security(("bearer" = [])),
    tag = "entries"
)]
pub(crate) async fn create_finance(
    AuthBearer(auth): AuthBearer,
    Json(payload): Json<FinanceEntryPayload>,
) -> Result<(StatusCode, Json<FinanceEntry>)> {
    let db = db()?;
    let tz = fallback_timezone(&auth).await?;
    let entry = payload.into_entry(0, auth.user_id, tz.as_deref())?;
    let id = db.insert_finance(&entry).await?;
    cache::invalidate_user(auth.user_id);
    let stored = db.get_finance(id, auth.user_id).await?.ok_or_else(not_found)?;
    Ok((StatusCode::CREATED, Json(stored)))
}

#[utoipa::path(
    get,
    path = "/api/entries/finance",
    responses((status = 200, body = [FinanceEntry]), (status = 401)),
    security(("bearer" = [])),
    tag = "entries"
)]
pub(crate) async fn list_finance(
    AuthBearer(auth): AuthBearer,
    Query(query): Query<ListEntriesQuery>,
) -> Result<Json<Vec<FinanceEntry>>> {
    let entries = db()?.list_finance(auth.user_id, query.into_filter()).await?;
    Ok(Json(entries))
}

#[utoipa::path(
    get,
    path = "/api/entries/finance/{id}",
    params(("id" = i64, Path, description = "Entry id")),
    responses((status = 200, body = FinanceEntry), (status = 404), (status = 401)),
    security(("bearer" = [])),
    tag = "entries"
)]
pub(crate) async fn get_finance(
    AuthBearer(auth): AuthBearer,
    Path(id): Path<i64>,
) -> Result<Json<FinanceEntry>> {
    let entry = db()?.get_finance(id, auth.user_id).await?.ok_or_else(not_found)?;
    Ok(Json(entry))
}

#[utoipa::path(
    put,
    path = "/api/entries/finance/{id}",
    params(("id" = i64, Path, description = "Entry id")),
    request_body = FinanceEntryPayload,
    responses((status = 200, body = FinanceEntry), (status = 404), (status = 400), (status = 401)),
    security(("bearer" = [])),
    tag = "entries"
)]
pub(crate) async fn update_finance(
    AuthBearer(auth): AuthBearer,
    Path(id): Path<i64>,
    Json(payload): Json<FinanceEntryPayload>,
) -> Result<Json<FinanceEntry>> {
    let db = db()?;
    db.get_finance(id, auth.user_id).await?.ok_or_else(not_found)?;
    let tz = fallback_timezone(&auth).await?;
    let entry = payload.into_entry(id, auth.user_id, tz.as_deref())?;
    db.update_finance(&entry).await?;
    cache::invalidate_user(auth.user_id);
    let stored = db.get_finance(id, auth.user_id).await?.ok_or_else(not_found)?;
    Ok(Json(stored))
}

#[utoipa::path(
    delete,
    path = "/api/entries/finance/{id}",
    params(("id" = i64, Path, description = "Entry id")),
    responses((status = 204), (status = 404), (status = 401)),
    security(("bearer" = [])),
    tag = "entries"
)]
pub(crate) async fn delete_finance(AuthBearer(auth): AuthBearer, Path(id): Path<i64>) -> Result<StatusCode> {
    if !db()?.delete_finance(id, auth.user_id).await? {
        return Err(not_found());
    }
    cache::invalidate_user(auth.user_id);
    Ok(StatusCode::NO_CONTENT)
}

// --- productivity ---

#[utoipa::path(
    post,
    path = "/api/entries/productivity",
    request_body = ProductivityEntryPayload,
    responses((status = 201, body = ProductivityEntry), (status = 400), (status = 401)),
    security(("bearer" = [])),
    tag = "entries"
)]
pub(crate) async fn create_productivity(
    AuthBearer(auth): AuthBearer,
    Json(payload): Json<ProductivityEntryPayload>,
) -> Result<(StatusCode, Json<ProductivityEntry>)> {
    let db = db()?;
    let tz = fallback_timezone(&auth).await?;
    let entry = payload.into_entry(0, auth.user_id, tz.as_deref())?;
    let id = db.insert_productivity(&entry).await?;
    cache::invalidate_user(auth.user_id);
    let stored = db
        .get_productivity(id, auth.user_id)
        .await?
        .ok_or_else(not_found)?;
    Ok((StatusCode::CREATED, Json(stored)))
}

#[utoipa::path(
    get,
    path = "/api/entries/productivity",
    responses((status = 200, body = [ProductivityEntry]), (status = 401)),
    security(("bearer" = [])),
    tag = "entries"
)]
pub(crate) async fn list_productivity(
    AuthBearer(auth): AuthBearer,
    Query(query): Query<ListEntriesQuery>,
) -> Result<Json<Vec<ProductivityEntry>>> {
    let entries = db()?
        .list_productivity(auth.user_id, query.into_filter())
        .await?;
    Ok(Json(entries))
}

#[utoipa::path(
    get,
    path = "/api/entries/productivity/{id}",
    params(("id" = i64, Path, description = "Entry id")),
    responses((status = 200, body = ProductivityEntry), (status = 404), (status = 401)),
    security(("bearer" = [])),
    tag = "entries"
)]
pub(crate) async fn get_productivity(
    AuthBearer(auth): AuthBearer,
    Path(id): Path<i64>,
) -> Result<Json<ProductivityEntry>> {
    let entry = db()?
        .get_productivity(id, auth.user_id)
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(entry))
}

#[utoipa::path(
    put,
    path = "/api/entries/productivity/{id}",
    params(("id" = i64, Path, description = "Entry id")),
    request_body = ProductivityEntryPayload,
    responses((status = 200, body = ProductivityEntry), (status = 404), (status = 400), (status = 401)),
    security(("bearer" = [])),
    tag = "entries"
)]
pub(crate) async fn update_productivity(
    AuthBearer(auth): AuthBearer,
    Path(id): Path<i64>,
    Json(payload): Json<ProductivityEntryPayload>,
) -> Result<Json<ProductivityEntry>> {
    let db = db()?;
    db.get_productivity(id, auth.user_id)
        .await?
        .ok_or_else(not_found)?;
    let tz = fallback_timezone(&auth).await?;
    let entry = payload.into_entry(id, auth.user_id, tz.as_deref())?;
    db.update_productivity(&entry).await?;
    cache::invalidate_user(auth.user_id);
    let stored = db
        .get_productivity(id, auth.user_id)
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(stored))
}

#[utoipa::path(
    delete,
    path = "/api/entries/productivity/{id}",
    params(("id" = i64, Path, description = "Entry id")),
    responses((status = 204), (status = 404), (status = 401)),
    security(("bearer" = [])),
    tag = "entries"
)]
pub(crate) async fn delete_productivity(
    AuthBearer(auth): AuthBearer,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    if !db()?.delete_productivity(id, auth.user_id).await? {
        return Err(not_found());
    }
    cache::invalidate_user(auth.user_id);
    Ok(StatusCode::NO_CONTENT)
}

// --- learning ---

#[utoipa::path(
    post,
    path = "/api/entries/learning",
    request_body = LearningEntryPayload,
    responses((status = 201, body = LearningEntry), (status = 400), (status = 401)),
    security(("bearer" = [])),
    tag = "entries"
)]
pub(crate) async fn create_learning(
    AuthBearer(auth): AuthBearer,
    Json(payload): Json<LearningEntryPayload>,
) -> Result<(StatusCode, Json<LearningEntry>)> {
    let db = db()?;
    let tz = fallback_timezone(&auth).await?;
    let entry = payload.into_entry(0, auth.user_id, tz.as_deref())?;
    let id = db.insert_learning(&entry).await?;
    cache::invalidate_user(auth.user_id);
    let stored = db.get_learning(id, auth.user_id).await?.ok_or_else(not_found)?;
    Ok((StatusCode::CREATED, Json(stored)))
}

#[utoipa::path(
    get,
    path = "/api/entries/learning",
    responses((status = 200, body = [LearningEntry]), (status = 401)),
    security(("bearer" = [])),
    tag = "entries"
)]
pub(crate) async fn list_learning(
    AuthBearer(auth): AuthBearer,
    Query(query): Query<ListEntriesQuery>,
) -> Result<Json<Vec<LearningEntry>>> {
    let entries = db()?.list_learning(auth.user_id, query.into_filter()).await?;
    Ok(Json(entries))
}

#[utoipa::path(
    get,
    path = "/api/entries/learning/{id}",
    params(("id" = i64, Path, description = "Entry id")),
    responses((status = 200, body = LearningEntry), (status = 404), (status = 401)),
    security(("bearer" = [])),
    tag = "entries"
)]
pub(crate) async fn get_learning(
    AuthBearer(auth): AuthBearer,
    Path(id): Path<i64>,
) -> Result<Json<LearningEntry>> {
    let entry = db()?.get_learning(id, auth.user_id).await?.ok_or_else(not_found)?;
    Ok(Json(entry))
}

#[utoipa::path(
    put,
    path = "/api/entries/learning/{id}",
    params(("id" = i64, Path, description = "Entry id")),
    request_body = LearningEntryPayload,
    responses((status = 200, body = LearningEntry), (status = 404), (status = 400), (status = 401)),
    security(("bearer" = [])),
    tag = "entries"
)]
pub(crate) async fn update_learning(
    AuthBearer(auth): AuthBearer,
    Path(id): Path<i64>,
    Json(payload): Json<LearningEntryPayload>,
) -> Result<Json<LearningEntry>> {
    let db = db()?;
    db.get_learning(id, auth.user_id).await?.ok_or_else(not_found)?;
    let tz = fallback_timezone(&auth).await?;
    let entry = payload.into_entry(id, auth.user_id, tz.as_deref())?;
    db.update_learning(&entry).await?;
    cache::invalidate_user(auth.user_id);
    let stored = db.get_learning(id, auth.user_id).await?.ok_or_else(not_found)?;
    Ok(Json(stored))
}

#[utoipa::path(
    delete,
    path = "/api/entries/learning/{id}",
    params(("id" = i64, Path, description = "Entry id")),
    responses((status = 204), (status = 404), (status = 401)),
    security(("bearer" = [])),
    tag = "entries"
)]
pub(crate) async fn delete_learning(AuthBearer(auth): AuthBearer, Path(id): Path<i64>) -> Result<StatusCode> {
    if !db()?.delete_learning(id, auth.user_id).await? {
        return Err(not_found());
    }
    cache::invalidate_user(auth.user_id);
    Ok(StatusCode::NO_CONTENT)
}
