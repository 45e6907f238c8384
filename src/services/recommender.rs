use serde::Serialize;
use utoipa::ToSchema;

use crate::models::goal::GoalProgress;
use crate::services::analytics::{pearson, DailyFrame};

pub const MAX_RECOMMENDATIONS: usize = 5;

const MIN_SAMPLES: usize = 5;
const CORRELATION_GATE: f64 = 0.3;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Recommendation {
    pub message: String,
    pub severity: String,
}

impl Recommendation {
    fn info(message: String) -> Self {
        Self {
            message,
            severity: "info".to_string(),
        }
    }

    fn warning(message: String) -> Self {
        Self {
            message,
            severity: "warning".to_string(),
        }
    }
}

fn correlation(frame: &DailyFrame, a: &str, b: &str) -> Option<f64> {
    let pairs = frame.pairs(a, b);
    if pairs.len() < MIN_SAMPLES {
        return None;
    }
    pearson(&pairs)
}

fn sleep_energy(frame: &DailyFrame) -> Option<Recommendation> {
    let r = correlation(frame, "sleep_hours", "energy_level")?;
    if r <= CORRELATION_GATE {
        return None;
    }
    Some(Recommendation::info(format!(
        "Your energy tracks your sleep (r={:.2}). Protecting a consistent bedtime is the cheapest energy boost available.",
        r
    )))
}

fn deep_work_wellbeing(frame: &DailyFrame) -> Option<Recommendation> {
    let r = correlation(frame, "deep_work_hours", "wellbeing")?;
    if r >= -CORRELATION_GATE {
        return None;
    }
    Some(Recommendation::warning(format!(
        "Heavy deep-work days coincide with lower wellbeing (r={:.2}). Consider capping focus blocks and scheduling recovery time.",
        r
    )))
}

fn food_spend_wellbeing(frame: &DailyFrame) -> Option<Recommendation> {
    let r = correlation(frame, "expense_food", "wellbeing")?;
    if r >= -CORRELATION_GATE {
        return None;
    }
    Some(Recommendation::info(format!(
        "Higher food spending lines up with lower wellbeing (r={:.2}). Try planning meals ahead on stressful weeks.",
        r
    )))
}

fn goal_nudges(progress: &[GoalProgress]) -> Vec<Recommendation> {
    let mut out = Vec::new();
    for goal in progress {
        let Some(pct) = goal.progress_pct else { continue };
        if pct >= 100.0 {
            out.push(Recommendation::info(format!(
                "Goal '{}' is complete for this period. Consider raising the target or archiving it.",
                goal.title
            )));
        } else if pct < 50.0 {
            out.push(Recommendation::info(format!(
                "Goal '{}' sits at {:.0}% for this period. A small daily step in {} would close the gap.",
                goal.title, pct, goal.sphere
            )));
        }
    }
    out
}

/// Up to five recommendations blending cross-metric correlations with
/// goal progress. Always returns at least one message when the user has
/// any data at all.
pub fn generate_recommendations(
    frame: &DailyFrame,
    goal_progress: &[GoalProgress],
) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();

    for candidate in [sleep_energy(frame), deep_work_wellbeing(frame), food_spend_wellbeing(frame)]
    {
        if let Some(rec) = candidate {
            recommendations.push(rec);
        }
    }
    recommendations.extend(goal_nudges(goal_progress));
    recommendations.truncate(MAX_RECOMMENDATIONS);

    if recommendations.is_empty() && !frame.is_empty() {
        recommendations.push(Recommendation::info(
            "Log entries across all four spheres for a few more days to get tailored recommendations."
                .to_string(),
        ));
    }

    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::SqliteDatabase;
    use crate::models::entry::HealthEntry;
    use crate::services::analytics::build_daily_frame;
    use chrono::{Duration, Utc};

    async fn frame_with_sleep_energy_link() -> DailyFrame {
        let db = SqliteDatabase::in_memory().await.unwrap();
        db.seed_users(1).await.unwrap();
        let today = Utc::now().date_naive();
        for i in 0..8i64 {
            db.insert_health(&HealthEntry {
                id: 0,
                user_id: 1,
                recorded_at: Utc::now(),
                local_date: today - Duration::days(i),
                timezone: "UTC".to_string(),
                sleep_hours: 5.0 + i as f64 * 0.5,
                energy_level: 2 + i,
                wellbeing: 6,
                supplements: None,
                weight_kg: None,
                steps: None,
                heart_rate_avg: None,
                workout_minutes: None,
                notes: None,
            })
            .await
            .unwrap();
        }
        build_daily_frame(&db, 1).await.unwrap()
    }

    #[tokio::test]
    async fn sleep_energy_link_produces_recommendation() {
        let frame = frame_with_sleep_energy_link().await;
        let recs = generate_recommendations(&frame, &[]);
        assert!(recs.iter().any(|r| r.message.contains("energy tracks your sleep")));
    }

    #[test]
    fn empty_frame_yields_nothing() {
        assert!(generate_recommendations(&DailyFrame::default(), &[]).is_empty());
    }

    #[tokio::test]
    async fn goal_progress_drives_nudges_and_cap() {
        let frame = frame_with_sleep_energy_link().await;
        let progress: Vec<GoalProgress> = (0..6)
            .map(|i| GoalProgress {
                goal_id: i,
                title: format!("Goal {}", i),
                sphere: "health".to_string(),
                target_value: Some(10.0),
                target_metric: Some("sleep_hours".to_string()),
                current_value: Some(1.0),
                progress_pct: Some(10.0),
                deadline: None,
            })
            .collect();

        let recs = generate_recommendations(&frame, &progress);
        assert_eq!(recs.len(), MAX_RECOMMENDATIONS);
        assert!(recs.iter().any(|r| r.message.contains("Goal 0")));
    }

    #[test]
    fn completed_goal_gets_reinforcement() {
        let progress = vec![GoalProgress {
            goal_id: 1,
            title: "Deep work 12h".to_string(),
            sphere: "productivity".to_string(),
            target_value: Some(12.0),
            target_metric: Some("deep_work_hours".to_string()),
            current_value: Some(13.0),
            progress_pct: Some(100.0),
            deadline: None,
        }];
        let recs = goal_nudges(&progress);
        assert_eq!(recs.len(), 1);
        assert!(recs[0].message.contains("complete for this period"));
    }
}
