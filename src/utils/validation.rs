use crate::errors::{AppError, Result};
use regex::Regex;

pub struct Validator;

impl Validator {
    pub fn validate_email(email: &str) -> Result<()> {
        let email_regex = Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .map_err(|e| AppError::InternalError(format!("Regex error: {}", e)))?;

        if !email_regex.is_match(email) {
            return Err(AppError::ValidationError("Invalid email format".to_string()));
        }

        if email.len() > 254 {
            return Err(AppError::ValidationError("Email too long".to_string()));
        }

        Ok(())
    }

    pub fn validate_password(password: &str) -> Result<()> {
        if password.len() < 8 {
            return Err(AppError::ValidationError(
                "Password must be at least 8 characters long".to_string(),
            ));
        }

        if password.len() > 128 {
            return Err(AppError::ValidationError(
                "Password must be less than 128 characters".to_string(),
            ));
        }

        let has_uppercase = password.chars().any(|c| c.is_uppercase());
        let has_lowercase = password.chars().any(|c| c.is_lowercase());
        let has_digit = password.chars().any(|c| c.is_numeric());
        let has_special = password
            .chars()
            .any(|c| "!@#$%^&*()_+-=[]{}|;:,.<>?".contains(c));

        if !has_uppercase {
            return Err(AppError::ValidationError(
                "Password must contain at least one uppercase letter".to_string(),
            ));
        }

        if !has_lowercase {
            return Err(AppError::ValidationError(
                "Password must contain at least one lowercase letter".to_string(),
            ));
        }

        if !has_digit {
            return Err(AppError::ValidationError(
                "Password must contain at least one digit".to_string(),
            ));
        }

        if !has_special {
            return Err(AppError::ValidationError(
                "Password must contain at least one special character".to_string(),
            ));
        }

        Ok(())
    }

    /// Range check used by entry payload validation.
    pub fn validate_range(field: &str, value: f64, min: f64, max: f64) -> Result<()> {
        if !value.is_finite() || value < min || value > max {
            return Err(AppError::ValidationError(format!(
                "{} must be between {} and {}",
                field, min, max
            )));
        }
        Ok(())
    }

    pub fn validate_non_negative(field: &str, value: f64) -> Result<()> {
        if !value.is_finite() || value < 0.0 {
            return Err(AppError::ValidationError(format!(
                "{} must be non-negative",
                field
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_reasonable_emails() {
        assert!(Validator::validate_email("me@example.com").is_ok());
        assert!(Validator::validate_email("first.last+tag@sub.example.org").is_ok());
    }

    #[test]
    fn rejects_malformed_emails() {
        assert!(Validator::validate_email("not-an-email").is_err());
        assert!(Validator::validate_email("missing@tld").is_err());
        assert!(Validator::validate_email("@example.com").is_err());
    }

    #[test]
    fn password_policy() {
        assert!(Validator::validate_password("Str0ng!pass").is_ok());
        assert!(Validator::validate_password("short1!").is_err());
        assert!(Validator::validate_password("alllowercase1!").is_err());
        assert!(Validator::validate_password("NoDigits!!").is_err());
        assert!(Validator::validate_password("NoSpecial123").is_err());
    }

    #[test]
    fn range_checks() {
        assert!(Validator::validate_range("sleep_hours", 7.5, 0.0, 24.0).is_ok());
        assert!(Validator::validate_range("sleep_hours", 25.0, 0.0, 24.0).is_err());
        assert!(Validator::validate_range("sleep_hours", f64::NAN, 0.0, 24.0).is_err());
        assert!(Validator::validate_non_negative("income", -1.0).is_err());
    }
}
