use chrono::{Duration, NaiveDate, Utc};

use crate::database::SqliteDatabase;
use crate::errors::{AppError, Result};
use crate::models::entry::Sphere;
use crate::models::goal::{
    GoalProgress, UserGoal, GOAL_MAX_ACTIVE, GOAL_MAX_PER_SPHERE, GOAL_PROGRESS_PERIODS,
};
use crate::services::analytics::DailyFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rollup {
    Average,
    Sum,
    SumExpenses,
}

/// Metrics a goal may target, with how the window aggregates them.
const METRIC_SOURCES: [(&str, &str, Rollup); 9] = [
    ("health", "sleep_hours", Rollup::Average),
    ("health", "energy_level", Rollup::Average),
    ("health", "wellbeing", Rollup::Average),
    ("finance", "income", Rollup::Sum),
    ("finance", "expense_total", Rollup::SumExpenses),
    ("productivity", "deep_work_hours", Rollup::Sum),
    ("productivity", "tasks_completed", Rollup::Sum),
    ("productivity", "focus_level", Rollup::Average),
    ("learning", "study_hours", Rollup::Sum),
];

fn metric_rollup(sphere: &str, metric: &str) -> Option<Rollup> {
    METRIC_SOURCES
        .iter()
        .find(|(s, m, _)| *s == sphere && *m == metric)
        .map(|(_, _, r)| *r)
}

pub fn validate_period(period: &str) -> Result<()> {
    if GOAL_PROGRESS_PERIODS.contains(&period) {
        Ok(())
    } else {
        Err(AppError::ValidationError(format!(
            "Unknown progress period '{}'; expected one of {}",
            period,
            GOAL_PROGRESS_PERIODS.join(", ")
        )))
    }
}

fn validate_goal_fields(goal: &UserGoal) -> Result<()> {
    if Sphere::parse(&goal.sphere).is_none() {
        return Err(AppError::ValidationError(format!(
            "Unknown sphere '{}'",
            goal.sphere
        )));
    }
    if goal.title.trim().is_empty() {
        return Err(AppError::ValidationError("Goal title is required".to_string()));
    }
    if let Some(target) = goal.target_value {
        if target <= 0.0 {
            return Err(AppError::ValidationError(
                "Goal target_value must be positive".to_string(),
            ));
        }
    }
    if let Some(metric) = goal.target_metric.as_deref() {
        if metric_rollup(&goal.sphere, metric).is_none() {
            return Err(AppError::ValidationError(format!(
                "Metric '{}' cannot be tracked for sphere '{}'",
                metric, goal.sphere
            )));
        }
    }
    Ok(())
}

/// Create a goal, enforcing the active-goal caps.
pub async fn create_goal(db: &SqliteDatabase, goal: &UserGoal) -> Result<UserGoal> {
    validate_goal_fields(goal)?;

    let active = db.list_goals(goal.user_id, false).await?;
    if active.len() >= GOAL_MAX_ACTIVE {
        return Err(AppError::ValidationError(format!(
            "At most {} active goals are allowed",
            GOAL_MAX_ACTIVE
        )));
    }
    let per_sphere = db
        .count_active_goals_by_sphere(goal.user_id, &goal.sphere)
        .await?;
    if per_sphere >= GOAL_MAX_PER_SPHERE as i64 {
        return Err(AppError::ValidationError(format!(
            "At most {} active goals per sphere are allowed",
            GOAL_MAX_PER_SPHERE
        )));
    }

    let id = db.insert_goal(goal).await?;
    db.get_goal(id, goal.user_id)
        .await?
        .ok_or_else(|| AppError::DatabaseError("Goal vanished after insert".to_string()))
}

/// Update a goal in place. Un-archiving re-checks the active caps.
pub async fn update_goal(db: &SqliteDatabase, goal: &UserGoal) -> Result<UserGoal> {
    validate_goal_fields(goal)?;

    let existing = db
        .get_goal(goal.id, goal.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Goal not found".to_string()))?;

    if existing.archived && !goal.archived {
        let active = db.list_goals(goal.user_id, false).await?;
        if active.len() >= GOAL_MAX_ACTIVE {
            return Err(AppError::ValidationError(format!(
                "At most {} active goals are allowed",
                GOAL_MAX_ACTIVE
            )));
        }
        let per_sphere = db
            .count_active_goals_by_sphere(goal.user_id, &goal.sphere)
            .await?;
        if per_sphere >= GOAL_MAX_PER_SPHERE as i64 {
            return Err(AppError::ValidationError(format!(
                "At most {} active goals per sphere are allowed",
                GOAL_MAX_PER_SPHERE
            )));
        }
    }

    db.update_goal(goal).await?;
    db.get_goal(goal.id, goal.user_id)
        .await?
        .ok_or_else(|| AppError::DatabaseError("Goal vanished after update".to_string()))
}

fn progress_window(goal: &UserGoal, period: &str, today: NaiveDate) -> (NaiveDate, NaiveDate) {
    match period {
        "month" => (today - Duration::days(29), today),
        "deadline" => match goal.deadline {
            // Creation-to-deadline window when the goal has one.
            Some(deadline) => (goal.created_at.date_naive(), deadline),
            None => (today - Duration::days(6), today),
        },
        _ => (today - Duration::days(6), today),
    }
}

fn window_value(frame: &DailyFrame, metric: &str, rollup: Rollup) -> Option<f64> {
    match rollup {
        Rollup::SumExpenses => {
            let totals: Vec<f64> = frame.total_expense().into_iter().flatten().collect();
            (!totals.is_empty()).then(|| totals.iter().sum())
        }
        Rollup::Sum => {
            let values: Vec<f64> = frame.series(metric).into_iter().map(|(_, v)| v).collect();
            (!values.is_empty()).then(|| values.iter().sum())
        }
        Rollup::Average => {
            let values: Vec<f64> = frame.series(metric).into_iter().map(|(_, v)| v).collect();
            (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Progress of each active goal over the chosen period window.
pub fn goal_progress(
    goals: &[UserGoal],
    frame: &DailyFrame,
    period: &str,
    today: NaiveDate,
) -> Vec<GoalProgress> {
    goals
        .iter()
        .filter(|g| !g.archived)
        .map(|goal| {
            let current_value = goal.target_metric.as_deref().and_then(|metric| {
                let rollup = metric_rollup(&goal.sphere, metric)?;
                let (start, end) = progress_window(goal, period, today);
                let window = frame.restrict(start, end);
                window_value(&window, metric, rollup).map(round2)
            });

            let progress_pct = match (current_value, goal.target_value) {
                (Some(current), Some(target)) if target > 0.0 => {
                    Some(round2((current / target * 100.0).min(100.0)))
                }
                _ => None,
            };

            GoalProgress {
                goal_id: goal.id,
                title: goal.title.clone(),
                sphere: goal.sphere.clone(),
                target_value: goal.target_value,
                target_metric: goal.target_metric.clone(),
                current_value,
                progress_pct,
                deadline: goal.deadline,
            }
        })
        .collect()
}

/// Convenience wrapper: load goals and entries, then score them.
pub async fn goal_progress_for_user(
    db: &SqliteDatabase,
    user_id: i64,
    period: &str,
) -> Result<Vec<GoalProgress>> {
    validate_period(period)?;
    let goals = db.list_goals(user_id, false).await?;
    if goals.is_empty() {
        return Ok(Vec::new());
    }
    let frame = crate::services::analytics::build_daily_frame(db, user_id).await?;
    Ok(goal_progress(&goals, &frame, period, Utc::now().date_naive()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::entry::ProductivityEntry;
    use chrono::Utc;

    async fn test_db() -> SqliteDatabase {
        let db = SqliteDatabase::in_memory().await.unwrap();
        db.seed_users(1).await.unwrap();
        db
    }

    fn goal(sphere: &str, metric: &str, target: f64) -> UserGoal {
        UserGoal {
            id: 1,
            user_id: 1,
            sphere: sphere.to_string(),
            title: "Test goal".to_string(),
            target_value: Some(target),
            target_metric: Some(metric.to_string()),
            deadline: None,
            archived: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn period_validation() {
        assert!(validate_period("7d").is_ok());
        assert!(validate_period("month").is_ok());
        assert!(validate_period("deadline").is_ok());
        assert!(validate_period("year").is_err());
    }

    #[test]
    fn metric_must_match_sphere() {
        let mut g = goal("finance", "sleep_hours", 10.0);
        assert!(validate_goal_fields(&g).is_err());
        g.target_metric = Some("income".to_string());
        assert!(validate_goal_fields(&g).is_ok());
    }

    #[tokio::test]
    async fn active_goal_caps_are_enforced() {
        let db = test_db().await;

        let mut g = goal("health", "sleep_hours", 8.0);
        g.id = 0;
        create_goal(&db, &g).await.unwrap();
        create_goal(&db, &g).await.unwrap();

        // Third active health goal exceeds the per-sphere cap.
        let err = create_goal(&db, &g).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        let mut other = goal("learning", "study_hours", 10.0);
        other.id = 0;
        create_goal(&db, &other).await.unwrap();
    }

    #[tokio::test]
    async fn progress_sums_deep_work_over_last_week() {
        let db = test_db().await;
        let today = Utc::now().date_naive();

        for offset in 0..3 {
            db.insert_productivity(&ProductivityEntry {
                id: 0,
                user_id: 1,
                recorded_at: Utc::now(),
                local_date: today - Duration::days(offset),
                timezone: "UTC".to_string(),
                deep_work_hours: 2.0,
                tasks_completed: 4,
                focus_level: 7,
                notes: None,
            })
            .await
            .unwrap();
        }
        // Outside the 7-day window, must not count.
        db.insert_productivity(&ProductivityEntry {
            id: 0,
            user_id: 1,
            recorded_at: Utc::now(),
            local_date: today - Duration::days(20),
            timezone: "UTC".to_string(),
            deep_work_hours: 10.0,
            tasks_completed: 1,
            focus_level: 5,
            notes: None,
        })
        .await
        .unwrap();

        let mut g = goal("productivity", "deep_work_hours", 12.0);
        g.id = 0;
        create_goal(&db, &g).await.unwrap();

        let progress = goal_progress_for_user(&db, 1, "7d").await.unwrap();
        assert_eq!(progress.len(), 1);
        assert_eq!(progress[0].current_value, Some(6.0));
        assert_eq!(progress[0].progress_pct, Some(50.0));
    }

    #[test]
    fn empty_frame_yields_no_progress_value() {
        let goals = vec![goal("productivity", "tasks_completed", 1.0)];
        let progress = goal_progress(&goals, &DailyFrame::default(), "7d", Utc::now().date_naive());
        assert_eq!(progress[0].current_value, None);
        assert_eq!(progress[0].progress_pct, None);
    }

    #[tokio::test]
    async fn progress_pct_caps_at_100() {
        let db = test_db().await;
        let today = Utc::now().date_naive();
        db.insert_productivity(&ProductivityEntry {
            id: 0,
            user_id: 1,
            recorded_at: Utc::now(),
            local_date: today,
            timezone: "UTC".to_string(),
            deep_work_hours: 9.0,
            tasks_completed: 3,
            focus_level: 8,
            notes: None,
        })
        .await
        .unwrap();

        let mut g = goal("productivity", "deep_work_hours", 4.0);
        g.id = 0;
        create_goal(&db, &g).await.unwrap();

        let progress = goal_progress_for_user(&db, 1, "7d").await.unwrap();
        assert_eq!(progress[0].progress_pct, Some(100.0));
    }
}
