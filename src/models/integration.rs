use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DataSource {
    pub id: i64,
    pub user_id: i64,
    pub provider: String,
    pub status: String,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DataSource {
    pub fn token_expired(&self, now: DateTime<Utc>) -> bool {
        match self.token_expires_at {
            Some(expires_at) => expires_at <= now,
            None => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SyncJob {
    pub id: i64,
    pub user_id: i64,
    pub provider: String,
    pub data_source_id: Option<i64>,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub message: Option<String>,
    pub stats: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of one provider fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub status: String,
    pub message: Option<String>,
    pub stats: Option<serde_json::Value>,
}

impl SyncOutcome {
    pub fn success(message: impl Into<String>, stats: serde_json::Value) -> Self {
        Self {
            status: "success".to_string(),
            message: Some(message.into()),
            stats: Some(stats),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: "failed".to_string(),
            message: Some(message.into()),
            stats: None,
        }
    }

    pub fn skipped(message: impl Into<String>) -> Self {
        Self {
            status: "skipped".to_string(),
            message: Some(message.into()),
            stats: None,
        }
    }
}
