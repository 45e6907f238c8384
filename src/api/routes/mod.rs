use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::database::{SqliteDatabase, GLOBAL_DB};
use crate::errors::{AppError, Result};
use crate::models::user::User;
use crate::services::jwt::{AuthenticatedUser, JwtManager};

pub mod admin;
pub mod analytics;
pub mod auth;
pub mod entries;
pub mod export;
pub mod goals;
pub mod integrations;

/// Bearer-token extractor. Rejection renders through `AppError`, so
/// handlers just take `AuthBearer(user)` as an argument.
pub struct AuthBearer(pub AuthenticatedUser);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuthBearer {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                AppError::AuthenticationError("Missing Authorization header".to_string())
            })?;

        let token = header.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::AuthenticationError("Authorization header must be a Bearer token".to_string())
        })?;

        let manager = JwtManager::new(crate::config::get_settings().jwt_secret.clone());
        let data = manager.validate_token(token)?;
        Ok(AuthBearer(AuthenticatedUser::try_from(data.claims)?))
    }
}

pub fn db() -> Result<Arc<SqliteDatabase>> {
    GLOBAL_DB
        .get()
        .cloned()
        .ok_or_else(|| AppError::InternalError("Database is not initialized".to_string()))
}

pub async fn current_user(auth: &AuthenticatedUser) -> Result<User> {
    db()?
        .get_user_by_id(auth.user_id)
        .await?
        .ok_or_else(|| AppError::AuthenticationError("User no longer exists".to_string()))
}

pub fn require_admin(auth: &AuthenticatedUser) -> Result<()> {
    if auth.role == crate::models::user::ROLE_ADMIN {
        Ok(())
    } else {
        Err(AppError::Forbidden("Admin role required".to_string()))
    }
}
