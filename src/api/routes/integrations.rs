use axum::extract::{DefaultBodyLimit, Multipart, Path, Query};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::api::routes::{db, AuthBearer};
use crate::api::types::{GoogleFitConnectRequest, OauthUrlResponse};
use crate::errors::{AppError, Result};
use crate::integrations::apple_health::ImportStats;
use crate::integrations::{self, apple_health, google_fit, open_banking};
use crate::models::integration::{DataSource, SyncJob};
use crate::services::{cache, sync};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_sources))
        .route("/google-fit/authorize", get(google_fit_authorize))
        .route("/google-fit/connect", post(google_fit_connect))
        .route("/open-banking/connect", post(open_banking_connect))
        .route(
            "/apple-health/import",
            post(apple_health_import)
                .layer(DefaultBodyLimit::max(apple_health::MAX_IMPORT_BYTES)),
        )
        .route("/:provider/sync", post(trigger_sync))
        .route("/:provider/status", get(source_status))
        .route("/jobs", get(list_jobs))
        .route("/jobs/:id", get(get_job))
        .route("/:provider", axum::routing::delete(disconnect))
}

#[utoipa::path(
    get,
    path = "/api/integrations",
    responses((status = 200, description = "Connected sources and available providers"), (status = 401)),
    security(("bearer" = [])),
    tag = "integrations"
)]
pub(crate) async fn list_sources(AuthBearer(auth): AuthBearer) -> Result<Json<serde_json::Value>> {
    let sources = db()?.list_data_sources(auth.user_id).await?;
    Ok(Json(serde_json::json!({
        "sources": sources,
        "available": integrations::syncable_providers(),
    })))
}

#[utoipa::path(
    get,
    path = "/api/integrations/google-fit/authorize",
    responses(
        (status = 200, body = OauthUrlResponse),
        (status = 503, description = "Google OAuth credentials not configured"),
        (status = 401)
    ),
    security(("bearer" = [])),
    tag = "integrations"
)]
pub(crate) async fn google_fit_authorize(AuthBearer(auth): AuthBearer) -> Result<Json<OauthUrlResponse>> {
    let url = google_fit::oauth_url(&auth.user_id.to_string())?;
    Ok(Json(OauthUrlResponse { url }))
}

#[utoipa::path(
    post,
    path = "/api/integrations/google-fit/connect",
    request_body = GoogleFitConnectRequest,
    responses((status = 200, body = DataSource), (status = 503), (status = 401)),
    security(("bearer" = [])),
    tag = "integrations"
)]
pub(crate) async fn google_fit_connect(
    AuthBearer(auth): AuthBearer,
    Json(payload): Json<GoogleFitConnectRequest>,
) -> Result<Json<DataSource>> {
    let db = db()?;
    let source = google_fit::connect(&db, auth.user_id, &payload.code).await?;
    Ok(Json(source))
}

#[utoipa::path(
    post,
    path = "/api/integrations/open-banking/connect",
    responses((status = 200, body = DataSource), (status = 401)),
    security(("bearer" = [])),
    tag = "integrations"
)]
pub(crate) async fn open_banking_connect(AuthBearer(auth): AuthBearer) -> Result<Json<DataSource>> {
    let db = db()?;
    let source = open_banking::connect(&db, auth.user_id).await?;
    Ok(Json(source))
}

#[utoipa::path(
    post,
    path = "/api/integrations/apple-health/import",
    request_body(content = String, content_type = "multipart/form-data", description = "export.xml from the Health app"),
    responses((status = 200, body = ImportStats), (status = 400, description = "Malformed or empty export"), (status = 401)),
    security(("bearer" = [])),
    tag = "integrations"
)]
pub(crate) async fn apple_health_import(
    AuthBearer(auth): AuthBearer,
    mut multipart: Multipart,
) -> Result<Json<ImportStats>> {
    let mut xml = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::ValidationError(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::ValidationError(format!("Failed to read upload: {}", e)))?;
            xml = Some(String::from_utf8_lossy(&bytes).into_owned());
        }
    }
    let xml = xml.ok_or_else(|| {
        AppError::ValidationError("Multipart field 'file' is required".to_string())
    })?;

    let db = db()?;
    let stats = apple_health::import_export_xml(&db, auth.user_id, &xml).await?;
    db.upsert_data_source(
        auth.user_id,
        apple_health::PROVIDER_NAME,
        "connected",
        None,
        None,
        None,
        Some(&serde_json::json!({"last_import_days": stats.days_touched})),
    )
    .await?;
    if let Some(source) = db
        .get_data_source_by_provider(auth.user_id, apple_health::PROVIDER_NAME)
        .await?
    {
        db.touch_data_source_synced(source.id).await?;
    }
    cache::invalidate_user(auth.user_id);
    Ok(Json(stats))
}

#[utoipa::path(
    post,
    path = "/api/integrations/{provider}/sync",
    params(("provider" = String, Path, description = "google_fit or open_banking")),
    responses(
        (status = 202, body = SyncJob, description = "Queued (or the previous job when called inside the minimum interval)"),
        (status = 404, description = "Provider not connected"),
        (status = 401)
    ),
    security(("bearer" = [])),
    tag = "integrations"
)]
pub(crate) async fn trigger_sync(
    AuthBearer(auth): AuthBearer,
    Path(provider): Path<String>,
) -> Result<(StatusCode, Json<SyncJob>)> {
    let handler = integrations::provider_for(&provider).ok_or_else(|| {
        AppError::ValidationError(format!("Provider '{}' does not support sync", provider))
    })?;

    let db = db()?;
    let source = db
        .get_data_source_by_provider(auth.user_id, &provider)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Provider '{}' is not connected", provider)))?;

    cache::invalidate_user(auth.user_id);
    let job = sync::request_sync(db, handler, source).await?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

#[utoipa::path(
    get,
    path = "/api/integrations/{provider}/status",
    params(("provider" = String, Path, description = "Connected provider name")),
    responses(
        (status = 200, description = "Data source with its most recent sync job"),
        (status = 404, description = "Provider not connected"),
        (status = 401)
    ),
    security(("bearer" = [])),
    tag = "integrations"
)]
pub(crate) async fn source_status(
    AuthBearer(auth): AuthBearer,
    Path(provider): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let db = db()?;
    let source = db
        .get_data_source_by_provider(auth.user_id, &provider)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Provider '{}' is not connected", provider)))?;
    let last_job = db.last_sync_job_for_source(source.id).await?;
    Ok(Json(serde_json::json!({
        "source": source,
        "last_job": last_job,
    })))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct JobListQuery {
    #[serde(default = "default_job_limit")]
    pub limit: i64,
}

fn default_job_limit() -> i64 {
    20
}

#[utoipa::path(
    get,
    path = "/api/integrations/jobs",
    params(("limit" = Option<i64>, Query, description = "Max jobs to return, capped at 100")),
    responses((status = 200, body = [SyncJob]), (status = 401)),
    security(("bearer" = [])),
    tag = "integrations"
)]
pub(crate) async fn list_jobs(
    AuthBearer(auth): AuthBearer,
    Query(query): Query<JobListQuery>,
) -> Result<Json<Vec<SyncJob>>> {
    let jobs = db()?
        .list_sync_jobs(auth.user_id, query.limit.clamp(1, 100))
        .await?;
    Ok(Json(jobs))
}

#[utoipa::path(
    get,
    path = "/api/integrations/jobs/{id}",
    params(("id" = i64, Path, description = "Sync job id")),
    responses((status = 200, body = SyncJob), (status = 404), (status = 401)),
    security(("bearer" = [])),
    tag = "integrations"
)]
pub(crate) async fn get_job(AuthBearer(auth): AuthBearer, Path(id): Path<i64>) -> Result<Json<SyncJob>> {
    let job = db()?
        .get_sync_job(id)
        .await?
        .filter(|job| job.user_id == auth.user_id)
        .ok_or_else(|| AppError::NotFound("Sync job not found".to_string()))?;
    Ok(Json(job))
}

#[utoipa::path(
    delete,
    path = "/api/integrations/{provider}",
    params(("provider" = String, Path, description = "Connected provider name")),
    responses((status = 204), (status = 404), (status = 401)),
    security(("bearer" = [])),
    tag = "integrations"
)]
pub(crate) async fn disconnect(
    AuthBearer(auth): AuthBearer,
    Path(provider): Path<String>,
) -> Result<StatusCode> {
    let db = db()?;
    let source = db
        .get_data_source_by_provider(auth.user_id, &provider)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Provider '{}' is not connected", provider)))?;
    db.delete_data_source(source.id, auth.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::database::{SqliteDatabase, GLOBAL_DB};
    use crate::services::jwt::JwtManager;

    #[tokio::test]
    async fn import_accepts_bodies_beyond_the_default_http_limit() {
        std::env::set_var("JWT_SECRET", "test-secret");
        let db = Arc::new(SqliteDatabase::in_memory().await.unwrap());
        let user = db
            .create_user("me@example.com", "hash", None, "user")
            .await
            .unwrap();
        let _ = GLOBAL_DB.set(db);

        let token = JwtManager::new(crate::config::get_settings().jwt_secret.clone())
            .generate_token(&user)
            .unwrap();

        // 3 MB of comment padding pushes the upload past axum's stock
        // 2 MB body limit while keeping the XML valid.
        let padding = "x".repeat(3 * 1024 * 1024);
        let xml = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<HealthData><!--{}-->\n\
             <Record type=\"HKQuantityTypeIdentifierStepCount\" \
             startDate=\"2026-08-20 09:00:00 +0000\" \
             endDate=\"2026-08-20 10:00:00 +0000\" value=\"4200\"/>\n</HealthData>",
            padding
        );
        let boundary = "lifedash-import-test";
        let body = format!(
            "--{b}\r\ncontent-disposition: form-data; name=\"file\"; filename=\"export.xml\"\r\n\
             content-type: application/xml\r\n\r\n{xml}\r\n--{b}--\r\n",
            b = boundary,
            xml = xml
        );

        let request = Request::builder()
            .method("POST")
            .uri("/apple-health/import")
            .header("authorization", format!("Bearer {}", token))
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap();

        let response = router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
