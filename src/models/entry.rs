use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// The four life spheres a daily entry can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Sphere {
    Health,
    Finance,
    Productivity,
    Learning,
}

impl Sphere {
    pub const ALL: [Sphere; 4] = [
        Sphere::Health,
        Sphere::Finance,
        Sphere::Productivity,
        Sphere::Learning,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sphere::Health => "health",
            Sphere::Finance => "finance",
            Sphere::Productivity => "productivity",
            Sphere::Learning => "learning",
        }
    }

    pub fn parse(value: &str) -> Option<Sphere> {
        match value {
            "health" => Some(Sphere::Health),
            "finance" => Some(Sphere::Finance),
            "productivity" => Some(Sphere::Productivity),
            "learning" => Some(Sphere::Learning),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthEntry {
    pub id: i64,
    pub user_id: i64,
    pub recorded_at: DateTime<Utc>,
    pub local_date: NaiveDate,
    pub timezone: String,
    pub sleep_hours: f64,
    pub energy_level: i64,
    pub wellbeing: i64,
    pub supplements: Option<String>,
    pub weight_kg: Option<f64>,
    pub steps: Option<i64>,
    pub heart_rate_avg: Option<i64>,
    pub workout_minutes: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FinanceEntry {
    pub id: i64,
    pub user_id: i64,
    pub recorded_at: DateTime<Utc>,
    pub local_date: NaiveDate,
    pub timezone: String,
    pub income: f64,
    pub expense_food: f64,
    pub expense_transport: f64,
    pub expense_health: f64,
    pub expense_other: f64,
    pub notes: Option<String>,
}

impl FinanceEntry {
    pub fn total_expense(&self) -> f64 {
        self.expense_food + self.expense_transport + self.expense_health + self.expense_other
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProductivityEntry {
    pub id: i64,
    pub user_id: i64,
    pub recorded_at: DateTime<Utc>,
    pub local_date: NaiveDate,
    pub timezone: String,
    pub deep_work_hours: f64,
    pub tasks_completed: i64,
    pub focus_level: i64,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LearningEntry {
    pub id: i64,
    pub user_id: i64,
    pub recorded_at: DateTime<Utc>,
    pub local_date: NaiveDate,
    pub timezone: String,
    pub study_hours: f64,
    pub topics: Option<String>,
    pub projects: Option<String>,
    pub notes: Option<String>,
}
