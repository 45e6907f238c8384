use axum::extract::Path;
use axum::routing::{get, put};
use axum::{Json, Router};
use tracing::info;

use crate::api::routes::{db, require_admin, AuthBearer};
use crate::api::types::SetRoleRequest;
use crate::errors::{AppError, Result};
use crate::etl::{run_etl, EtlReport, Warehouse};
use crate::models::user::{UserResponse, ALLOWED_ROLES};

pub fn router() -> Router {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/:id/role", put(set_role))
        .route("/etl/run", axum::routing::post(trigger_etl))
}

#[utoipa::path(
    get,
    path = "/api/admin/users",
    responses((status = 200, body = [UserResponse]), (status = 403), (status = 401)),
    security(("bearer" = [])),
    tag = "admin"
)]
pub(crate) async fn list_users(AuthBearer(auth): AuthBearer) -> Result<Json<Vec<UserResponse>>> {
    require_admin(&auth)?;
    let users = db()?.list_users().await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

#[utoipa::path(
    put,
    path = "/api/admin/users/{id}/role",
    params(("id" = i64, Path, description = "User id")),
    request_body = SetRoleRequest,
    responses((status = 200, body = UserResponse), (status = 400), (status = 403), (status = 404), (status = 401)),
    security(("bearer" = [])),
    tag = "admin"
)]
pub(crate) async fn set_role(
    AuthBearer(auth): AuthBearer,
    Path(id): Path<i64>,
    Json(payload): Json<SetRoleRequest>,
) -> Result<Json<UserResponse>> {
    require_admin(&auth)?;
    if !ALLOWED_ROLES.contains(&payload.role.as_str()) {
        return Err(AppError::ValidationError(format!(
            "Role must be one of {}",
            ALLOWED_ROLES.join(", ")
        )));
    }

    let db = db()?;
    db.get_user_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    db.set_user_role(id, &payload.role).await?;

    info!(admin = auth.user_id, user_id = id, role = %payload.role, "role changed");
    let user = db
        .get_user_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    Ok(Json(user.into()))
}

#[utoipa::path(
    post,
    path = "/api/admin/etl/run",
    responses((status = 200, body = EtlReport), (status = 403), (status = 401)),
    security(("bearer" = [])),
    tag = "admin"
)]
pub(crate) async fn trigger_etl(AuthBearer(auth): AuthBearer) -> Result<Json<EtlReport>> {
    require_admin(&auth)?;
    let db = db()?;
    let warehouse = Warehouse::open(&crate::config::get_settings().warehouse_path).await?;
    let report = run_etl(&db, &warehouse).await?;
    Ok(Json(report))
}
