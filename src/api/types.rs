use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::Result;
use crate::models::entry::{FinanceEntry, HealthEntry, LearningEntry, ProductivityEntry};
use crate::utils::time::{normalize_timestamp, NormalizedTimestamp};
use crate::utils::validation::Validator;

// --- auth ---

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub full_name: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

impl TokenResponse {
    pub fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub default_timezone: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetRoleRequest {
    pub role: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// --- entries ---

/// Common envelope for entry create/update payloads: the moment the
/// entry happened and the zone its calendar date belongs to.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct HealthEntryPayload {
    #[serde(default)]
    pub recorded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub timezone: Option<String>,
    pub sleep_hours: f64,
    pub energy_level: i64,
    pub wellbeing: i64,
    #[serde(default)]
    pub supplements: Option<String>,
    #[serde(default)]
    pub weight_kg: Option<f64>,
    #[serde(default)]
    pub steps: Option<i64>,
    #[serde(default)]
    pub heart_rate_avg: Option<i64>,
    #[serde(default)]
    pub workout_minutes: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl HealthEntryPayload {
    pub fn validate(&self) -> Result<()> {
        Validator::validate_range("sleep_hours", self.sleep_hours, 0.0, 24.0)?;
        Validator::validate_range("energy_level", self.energy_level as f64, 1.0, 10.0)?;
        Validator::validate_range("wellbeing", self.wellbeing as f64, 1.0, 10.0)?;
        if let Some(weight) = self.weight_kg {
            Validator::validate_range("weight_kg", weight, 0.0, 500.0)?;
        }
        if let Some(steps) = self.steps {
            Validator::validate_range("steps", steps as f64, 0.0, 100_000.0)?;
        }
        if let Some(hr) = self.heart_rate_avg {
            Validator::validate_range("heart_rate_avg", hr as f64, 30.0, 250.0)?;
        }
        if let Some(minutes) = self.workout_minutes {
            Validator::validate_range("workout_minutes", minutes as f64, 0.0, 1440.0)?;
        }
        Ok(())
    }

    pub fn into_entry(self, id: i64, user_id: i64, fallback_tz: Option<&str>) -> Result<HealthEntry> {
        self.validate()?;
        let tz = self.timezone.as_deref().or(fallback_tz);
        let NormalizedTimestamp {
            recorded_at,
            local_date,
            timezone,
        } = normalize_timestamp(self.recorded_at, tz)?;
        Ok(HealthEntry {
            id,
            user_id,
            recorded_at,
            local_date,
            timezone,
            sleep_hours: self.sleep_hours,
            energy_level: self.energy_level,
            wellbeing: self.wellbeing,
            supplements: self.supplements,
            weight_kg: self.weight_kg,
            steps: self.steps,
            heart_rate_avg: self.heart_rate_avg,
            workout_minutes: self.workout_minutes,
            notes: self.notes,
        })
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct FinanceEntryPayload {
    #[serde(default)]
    pub recorded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub income: f64,
    #[serde(default)]
    pub expense_food: f64,
    #[serde(default)]
    pub expense_transport: f64,
    #[serde(default)]
    pub expense_health: f64,
    #[serde(default)]
    pub expense_other: f64,
    #[serde(default)]
    pub notes: Option<String>,
}

impl FinanceEntryPayload {
    pub fn validate(&self) -> Result<()> {
        Validator::validate_non_negative("income", self.income)?;
        Validator::validate_non_negative("expense_food", self.expense_food)?;
        Validator::validate_non_negative("expense_transport", self.expense_transport)?;
        Validator::validate_non_negative("expense_health", self.expense_health)?;
        Validator::validate_non_negative("expense_other", self.expense_other)?;
        Ok(())
    }

    pub fn into_entry(self, id: i64, user_id: i64, fallback_tz: Option<&str>) -> Result<FinanceEntry> {
        self.validate()?;
        let tz = self.timezone.as_deref().or(fallback_tz);
        let NormalizedTimestamp {
            recorded_at,
            local_date,
            timezone,
        } = normalize_timestamp(self.recorded_at, tz)?;
        Ok(FinanceEntry {
            id,
            user_id,
            recorded_at,
            local_date,
            timezone,
            income: self.income,
            expense_food: self.expense_food,
            expense_transport: self.expense_transport,
            expense_health: self.expense_health,
            expense_other: self.expense_other,
            notes: self.notes,
        })
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ProductivityEntryPayload {
    #[serde(default)]
    pub recorded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub timezone: Option<String>,
    pub deep_work_hours: f64,
    #[serde(default)]
    pub tasks_completed: i64,
    pub focus_level: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ProductivityEntryPayload {
    pub fn validate(&self) -> Result<()> {
        Validator::validate_range("deep_work_hours", self.deep_work_hours, 0.0, 24.0)?;
        Validator::validate_range("tasks_completed", self.tasks_completed as f64, 0.0, 500.0)?;
        Validator::validate_range("focus_level", self.focus_level as f64, 1.0, 10.0)?;
        Ok(())
    }

    pub fn into_entry(
        self,
        id: i64,
        user_id: i64,
        fallback_tz: Option<&str>,
    ) -> Result<ProductivityEntry> {
        self.validate()?;
        let tz = self.timezone.as_deref().or(fallback_tz);
        let NormalizedTimestamp {
            recorded_at,
            local_date,
            timezone,
        } = normalize_timestamp(self.recorded_at, tz)?;
        Ok(ProductivityEntry {
            id,
            user_id,
            recorded_at,
            local_date,
            timezone,
            deep_work_hours: self.deep_work_hours,
            tasks_completed: self.tasks_completed,
            focus_level: self.focus_level,
            notes: self.notes,
        })
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LearningEntryPayload {
    #[serde(default)]
    pub recorded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub timezone: Option<String>,
    pub study_hours: f64,
    #[serde(default)]
    pub topics: Option<String>,
    #[serde(default)]
    pub projects: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl LearningEntryPayload {
    pub fn validate(&self) -> Result<()> {
        Validator::validate_range("study_hours", self.study_hours, 0.0, 24.0)
    }

    pub fn into_entry(self, id: i64, user_id: i64, fallback_tz: Option<&str>) -> Result<LearningEntry> {
        self.validate()?;
        let tz = self.timezone.as_deref().or(fallback_tz);
        let NormalizedTimestamp {
            recorded_at,
            local_date,
            timezone,
        } = normalize_timestamp(self.recorded_at, tz)?;
        Ok(LearningEntry {
            id,
            user_id,
            recorded_at,
            local_date,
            timezone,
            study_hours: self.study_hours,
            topics: self.topics,
            projects: self.projects,
            notes: self.notes,
        })
    }
}

/// Query string for entry listings.
#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
pub struct ListEntriesQuery {
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

impl ListEntriesQuery {
    pub fn into_filter(self) -> crate::database::entries::EntryFilter {
        crate::database::entries::EntryFilter {
            start_date: self.start_date,
            end_date: self.end_date,
            limit: self.limit.unwrap_or(100).clamp(1, 1000),
            offset: self.offset.unwrap_or(0).max(0),
        }
    }
}

// --- goals ---

#[derive(Debug, Deserialize, ToSchema)]
pub struct GoalPayload {
    pub sphere: String,
    pub title: String,
    #[serde(default)]
    pub target_value: Option<f64>,
    #[serde(default)]
    pub target_metric: Option<String>,
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
    #[serde(default)]
    pub archived: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GoalListQuery {
    #[serde(default)]
    pub include_archived: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GoalProgressQuery {
    #[serde(default = "default_period")]
    pub period: String,
}

fn default_period() -> String {
    "7d".to_string()
}

// --- integrations ---

#[derive(Debug, Deserialize, ToSchema)]
pub struct GoogleFitConnectRequest {
    pub code: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OauthUrlResponse {
    pub url: String,
}

// --- export ---

#[derive(Debug, Deserialize, ToSchema)]
pub struct ExportQuery {
    #[serde(default = "default_export_category")]
    pub category: String,
}

fn default_export_category() -> String {
    "all".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_payload_range_checks() {
        let payload = HealthEntryPayload {
            recorded_at: None,
            timezone: None,
            sleep_hours: 7.5,
            energy_level: 6,
            wellbeing: 7,
            supplements: None,
            weight_kg: None,
            steps: Some(12_000),
            heart_rate_avg: Some(61),
            workout_minutes: None,
            notes: None,
        };
        assert!(payload.validate().is_ok());

        let mut bad = payload.clone();
        bad.energy_level = 0;
        assert!(bad.validate().is_err());

        let mut bad = payload.clone();
        bad.steps = Some(200_000);
        assert!(bad.validate().is_err());

        // Fractional weights below 1 kg are legal.
        let mut light = payload.clone();
        light.weight_kg = Some(0.4);
        assert!(light.validate().is_ok());

        let mut bad = payload;
        bad.weight_kg = Some(-0.1);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn finance_payload_rejects_negative_amounts() {
        let payload = FinanceEntryPayload {
            recorded_at: None,
            timezone: None,
            income: 100.0,
            expense_food: -5.0,
            expense_transport: 0.0,
            expense_health: 0.0,
            expense_other: 0.0,
            notes: None,
        };
        assert!(payload.validate().is_err());
    }

    #[test]
    fn entry_conversion_applies_user_fallback_timezone() {
        let payload = LearningEntryPayload {
            recorded_at: Some(chrono::TimeZone::with_ymd_and_hms(&Utc, 2026, 3, 1, 23, 30, 0).unwrap()),
            timezone: None,
            study_hours: 1.5,
            topics: None,
            projects: None,
            notes: None,
        };
        let entry = payload.into_entry(0, 1, Some("Asia/Tokyo")).unwrap();
        assert_eq!(entry.timezone, "Asia/Tokyo");
        assert_eq!(entry.local_date, NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
    }

    #[test]
    fn list_query_clamps_pagination() {
        let query = ListEntriesQuery {
            start_date: None,
            end_date: None,
            limit: Some(100_000),
            offset: Some(-5),
        };
        let filter = query.into_filter();
        assert_eq!(filter.limit, 1000);
        assert_eq!(filter.offset, 0);
    }
}
