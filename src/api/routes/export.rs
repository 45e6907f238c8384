use axum::extract::Query;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};

use crate::api::routes::{db, AuthBearer};
use crate::api::types::ExportQuery;
use crate::errors::Result;
use crate::etl::export::export_category;

pub fn router() -> Router {
    Router::new().route("/", get(export))
}

#[utoipa::path(
    get,
    path = "/api/export",
    params(("category" = Option<String>, Query, description = "health, finance, productivity, learning, daily or all")),
    responses(
        (status = 200, description = "CSV download for a single category, JSON bundle of files for 'all'"),
        (status = 400, description = "Unknown category"),
        (status = 401)
    ),
    security(("bearer" = [])),
    tag = "export"
)]
pub(crate) async fn export(AuthBearer(auth): AuthBearer, Query(query): Query<ExportQuery>) -> Result<Response> {
    let db = db()?;
    let files = export_category(&db, auth.user_id, &query.category).await?;

    if files.len() == 1 {
        let (filename, contents) = files.into_iter().next().unwrap_or_default();
        return Ok((
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/csv".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", filename),
                ),
            ],
            contents,
        )
            .into_response());
    }

    let bundle: serde_json::Map<String, serde_json::Value> = files
        .into_iter()
        .map(|(name, contents)| (name, serde_json::Value::String(contents)))
        .collect();
    Ok(Json(serde_json::json!({ "files": bundle })).into_response())
}
