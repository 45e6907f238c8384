use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{AppError, Result};
use crate::models::user::User;

pub const TOKEN_LIFETIME_HOURS: i64 = 24;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
}

pub struct JwtManager {
    secret: String,
}

impl JwtManager {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }

    pub fn generate_token(&self, user: &User) -> Result<String> {
        let now = Utc::now();
        let expiration = now + Duration::hours(TOKEN_LIFETIME_HOURS);
        let jti = Uuid::new_v4().to_string();

        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            role: user.role.clone(),
            exp: expiration.timestamp(),
            iat: now.timestamp(),
            jti,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_ref()),
        )
        .map_err(|e| AppError::AuthenticationError(format!("Failed to generate token: {}", e)))?;

        Ok(token)
    }

    pub fn validate_token(&self, token: &str) -> Result<TokenData<Claims>> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_ref()),
            &Validation::default(),
        )
        .map_err(|e| AppError::AuthenticationError(format!("Invalid token: {}", e)))?;

        Ok(token_data)
    }
}

/// Identity carried through request handling after token validation.
#[derive(Debug)]
pub struct AuthenticatedUser {
    pub user_id: i64,
    pub email: String,
    pub role: String,
    pub token_id: String,
}

impl TryFrom<Claims> for AuthenticatedUser {
    type Error = AppError;

    fn try_from(claims: Claims) -> Result<Self> {
        let user_id = claims
            .sub
            .parse::<i64>()
            .map_err(|e| AppError::ValidationError(format!("Invalid user ID in token: {}", e)))?;

        Ok(Self {
            user_id,
            email: claims.email,
            role: claims.role,
            token_id: claims.jti,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::ROLE_USER;

    fn test_user() -> User {
        User {
            id: 7,
            email: "me@example.com".to_string(),
            hashed_password: "x".to_string(),
            full_name: None,
            default_timezone: None,
            role: ROLE_USER.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn round_trip_claims() {
        let manager = JwtManager::new("test-secret".to_string());
        let token = manager.generate_token(&test_user()).unwrap();
        let data = manager.validate_token(&token).unwrap();
        let auth = AuthenticatedUser::try_from(data.claims).unwrap();
        assert_eq!(auth.user_id, 7);
        assert_eq!(auth.email, "me@example.com");
        assert_eq!(auth.role, "user");
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let manager = JwtManager::new("test-secret".to_string());
        let token = manager.generate_token(&test_user()).unwrap();
        let other = JwtManager::new("different-secret".to_string());
        assert!(other.validate_token(&token).is_err());
    }
}
