use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use utoipa::ToSchema;

pub const GOAL_PROGRESS_PERIODS: [&str; 3] = ["7d", "month", "deadline"];
pub const GOAL_MAX_ACTIVE: usize = 5;
pub const GOAL_MAX_PER_SPHERE: usize = 2;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserGoal {
    pub id: i64,
    pub user_id: i64,
    pub sphere: String,
    pub title: String,
    pub target_value: Option<f64>,
    pub target_metric: Option<String>,
    pub deadline: Option<NaiveDate>,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
}

/// Progress of one goal against recent aggregated entries.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GoalProgress {
    pub goal_id: i64,
    pub title: String,
    pub sphere: String,
    pub target_value: Option<f64>,
    pub target_metric: Option<String>,
    pub current_value: Option<f64>,
    pub progress_pct: Option<f64>,
    pub deadline: Option<NaiveDate>,
}
