use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::config::get_settings;
use crate::database::SqliteDatabase;
use crate::errors::{AppError, Result};
use crate::models::user::{User, ROLE_USER};
use crate::services::jwt::JwtManager;
use crate::utils::crypto::PasswordManager;
use crate::utils::validation::Validator;

pub struct AuthService {
    jwt_manager: JwtManager,
    database: Arc<SqliteDatabase>,
}

fn hash_reset_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl AuthService {
    pub fn new(database: Arc<SqliteDatabase>) -> Self {
        let jwt_secret = get_settings().jwt_secret.clone();
        Self {
            jwt_manager: JwtManager::new(jwt_secret),
            database,
        }
    }

    pub fn jwt_manager(&self) -> &JwtManager {
        &self.jwt_manager
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        full_name: Option<&str>,
    ) -> Result<User> {
        let email = email.trim().to_lowercase();
        Validator::validate_email(&email)?;
        Validator::validate_password(password)?;

        if self.database.get_user_by_email(&email).await?.is_some() {
            return Err(AppError::ValidationError(
                "Email already registered".to_string(),
            ));
        }

        let hashed = PasswordManager::hash_password(password)?;
        let user = self
            .database
            .create_user(&email, &hashed, full_name, ROLE_USER)
            .await?;

        info!(user_id = user.id, "registered new user");
        Ok(user)
    }

    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User> {
        let email = email.trim().to_lowercase();
        let user = self
            .database
            .get_user_by_email(&email)
            .await?
            .ok_or_else(|| AppError::AuthenticationError("Invalid login".to_string()))?;

        if !PasswordManager::verify_password(password, &user.hashed_password)? {
            return Err(AppError::AuthenticationError("Invalid login".to_string()));
        }

        Ok(user)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<String> {
        let user = self.authenticate(email, password).await?;
        self.jwt_manager.generate_token(&user)
    }

    pub async fn change_password(
        &self,
        user: &User,
        current_password: &str,
        new_password: &str,
    ) -> Result<()> {
        if !PasswordManager::verify_password(current_password, &user.hashed_password)? {
            return Err(AppError::ValidationError(
                "Current password is incorrect".to_string(),
            ));
        }
        Validator::validate_password(new_password)?;
        let hashed = PasswordManager::hash_password(new_password)?;
        self.database.update_user_password(user.id, &hashed).await
    }

    /// Issue a reset token for the account, if it exists. Returns the raw
    /// token; the database only ever sees its hash. Callers must not leak
    /// whether the email was known.
    pub async fn request_password_reset(&self, email: &str) -> Result<Option<String>> {
        let email = email.trim().to_lowercase();
        let Some(user) = self.database.get_user_by_email(&email).await? else {
            return Ok(None);
        };

        let mut raw = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut raw);
        let token = raw.iter().map(|b| format!("{:02x}", b)).collect::<String>();

        let expires_at = Utc::now() + Duration::hours(1);
        self.database
            .store_password_reset(user.id, &hash_reset_token(&token), expires_at)
            .await?;

        info!(user_id = user.id, "password reset requested");
        Ok(Some(token))
    }

    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<()> {
        Validator::validate_password(new_password)?;
        let user_id = self
            .database
            .consume_password_reset(&hash_reset_token(token))
            .await?
            .ok_or_else(|| {
                AppError::ValidationError("Invalid or expired reset token".to_string())
            })?;

        let hashed = PasswordManager::hash_password(new_password)?;
        self.database.update_user_password(user_id, &hashed).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_env() {
        std::env::set_var("JWT_SECRET", "test-secret");
    }

    async fn service() -> AuthService {
        init_env();
        let db = Arc::new(SqliteDatabase::in_memory().await.unwrap());
        AuthService::new(db)
    }

    #[tokio::test]
    async fn register_then_login() {
        let auth = service().await;
        let user = auth
            .register("Me@Example.com", "Str0ng!pass", Some("Me"))
            .await
            .unwrap();
        // Email is normalized to lowercase.
        assert_eq!(user.email, "me@example.com");

        let token = auth.login("me@example.com", "Str0ng!pass").await.unwrap();
        assert!(!token.is_empty());

        let err = auth.login("me@example.com", "wrong").await.unwrap_err();
        assert!(matches!(err, AppError::AuthenticationError(_)));
    }

    #[tokio::test]
    async fn duplicate_registration_fails() {
        let auth = service().await;
        auth.register("me@example.com", "Str0ng!pass", None).await.unwrap();
        let err = auth
            .register("me@example.com", "Str0ng!pass", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn reset_flow_changes_password() {
        let auth = service().await;
        auth.register("me@example.com", "Str0ng!pass", None).await.unwrap();

        let token = auth
            .request_password_reset("me@example.com")
            .await
            .unwrap()
            .expect("known email yields a token");
        auth.reset_password(&token, "N3w!password").await.unwrap();

        assert!(auth.login("me@example.com", "N3w!password").await.is_ok());
        assert!(auth.login("me@example.com", "Str0ng!pass").await.is_err());

        // Token is single-use.
        assert!(auth.reset_password(&token, "An0ther!pass").await.is_err());
    }

    #[tokio::test]
    async fn unknown_email_reset_is_silent() {
        let auth = service().await;
        assert!(auth
            .request_password_reset("ghost@example.com")
            .await
            .unwrap()
            .is_none());
    }
}
