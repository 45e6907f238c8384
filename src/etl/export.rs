use crate::database::entries::EntryFilter;
use crate::database::SqliteDatabase;
use crate::errors::{AppError, Result};
use crate::services::analytics::build_daily_frame;

pub const EXPORT_CATEGORIES: [&str; 6] = [
    "health",
    "finance",
    "productivity",
    "learning",
    "daily",
    "all",
];

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn opt_num<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn opt_text(value: &Option<String>) -> String {
    value.as_deref().map(csv_escape).unwrap_or_default()
}

async fn health_csv(db: &SqliteDatabase, user_id: i64) -> Result<String> {
    let mut out = String::from(
        "local_date,recorded_at,timezone,sleep_hours,energy_level,wellbeing,supplements,weight_kg,steps,heart_rate_avg,workout_minutes,notes\n",
    );
    let mut entries = db.list_health(user_id, EntryFilter::range(None, None)).await?;
    entries.reverse(); // oldest first
    for e in entries {
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{},{},{},{},{}\n",
            e.local_date.format("%Y-%m-%d"),
            e.recorded_at.to_rfc3339(),
            csv_escape(&e.timezone),
            e.sleep_hours,
            e.energy_level,
            e.wellbeing,
            opt_text(&e.supplements),
            opt_num(e.weight_kg),
            opt_num(e.steps),
            opt_num(e.heart_rate_avg),
            opt_num(e.workout_minutes),
            opt_text(&e.notes),
        ));
    }
    Ok(out)
}

async fn finance_csv(db: &SqliteDatabase, user_id: i64) -> Result<String> {
    let mut out = String::from(
        "local_date,recorded_at,timezone,income,expense_food,expense_transport,expense_health,expense_other,expense_total,notes\n",
    );
    let mut entries = db.list_finance(user_id, EntryFilter::range(None, None)).await?;
    entries.reverse();
    for e in entries {
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{},{},{}\n",
            e.local_date.format("%Y-%m-%d"),
            e.recorded_at.to_rfc3339(),
            csv_escape(&e.timezone),
            e.income,
            e.expense_food,
            e.expense_transport,
            e.expense_health,
            e.expense_other,
            e.total_expense(),
            opt_text(&e.notes),
        ));
    }
    Ok(out)
}

async fn productivity_csv(db: &SqliteDatabase, user_id: i64) -> Result<String> {
    let mut out = String::from(
        "local_date,recorded_at,timezone,deep_work_hours,tasks_completed,focus_level,notes\n",
    );
    let mut entries = db
        .list_productivity(user_id, EntryFilter::range(None, None))
        .await?;
    entries.reverse();
    for e in entries {
        out.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            e.local_date.format("%Y-%m-%d"),
            e.recorded_at.to_rfc3339(),
            csv_escape(&e.timezone),
            e.deep_work_hours,
            e.tasks_completed,
            e.focus_level,
            opt_text(&e.notes),
        ));
    }
    Ok(out)
}

async fn learning_csv(db: &SqliteDatabase, user_id: i64) -> Result<String> {
    let mut out =
        String::from("local_date,recorded_at,timezone,study_hours,topics,projects,notes\n");
    let mut entries = db.list_learning(user_id, EntryFilter::range(None, None)).await?;
    entries.reverse();
    for e in entries {
        out.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            e.local_date.format("%Y-%m-%d"),
            e.recorded_at.to_rfc3339(),
            csv_escape(&e.timezone),
            e.study_hours,
            opt_text(&e.topics),
            opt_text(&e.projects),
            opt_text(&e.notes),
        ));
    }
    Ok(out)
}

async fn daily_csv(db: &SqliteDatabase, user_id: i64) -> Result<String> {
    let frame = build_daily_frame(db, user_id).await?;
    Ok(frame.to_csv())
}

/// CSV files for one export category as (filename, contents) pairs.
/// `all` bundles every sphere plus the joined daily table.
pub async fn export_category(
    db: &SqliteDatabase,
    user_id: i64,
    category: &str,
) -> Result<Vec<(String, String)>> {
    match category {
        "health" => Ok(vec![("health.csv".to_string(), health_csv(db, user_id).await?)]),
        "finance" => Ok(vec![("finance.csv".to_string(), finance_csv(db, user_id).await?)]),
        "productivity" => Ok(vec![(
            "productivity.csv".to_string(),
            productivity_csv(db, user_id).await?,
        )]),
        "learning" => Ok(vec![(
            "learning.csv".to_string(),
            learning_csv(db, user_id).await?,
        )]),
        "daily" => Ok(vec![("daily.csv".to_string(), daily_csv(db, user_id).await?)]),
        "all" => Ok(vec![
            ("health.csv".to_string(), health_csv(db, user_id).await?),
            ("finance.csv".to_string(), finance_csv(db, user_id).await?),
            (
                "productivity.csv".to_string(),
                productivity_csv(db, user_id).await?,
            ),
            ("learning.csv".to_string(), learning_csv(db, user_id).await?),
            ("daily.csv".to_string(), daily_csv(db, user_id).await?),
        ]),
        other => Err(AppError::ValidationError(format!(
            "Unknown export category '{}'; expected one of {}",
            other,
            EXPORT_CATEGORIES.join(", ")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::entry::{FinanceEntry, HealthEntry};
    use chrono::{NaiveDate, Utc};

    #[test]
    fn escaping_quotes_and_commas() {
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[tokio::test]
    async fn health_export_rows_are_oldest_first() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        db.seed_users(1).await.unwrap();
        for day in [2, 1] {
            db.insert_health(&HealthEntry {
                id: 0,
                user_id: 1,
                recorded_at: Utc::now(),
                local_date: NaiveDate::from_ymd_opt(2026, 8, day).unwrap(),
                timezone: "UTC".to_string(),
                sleep_hours: 7.0,
                energy_level: 6,
                wellbeing: 7,
                supplements: None,
                weight_kg: None,
                steps: None,
                heart_rate_avg: None,
                workout_minutes: None,
                notes: Some("slept well, finally".to_string()),
            })
            .await
            .unwrap();
        }

        let csv = health_csv(&db, 1).await.unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("2026-08-01"));
        assert!(lines[2].starts_with("2026-08-02"));
        // Comma in notes is quoted.
        assert!(lines[1].ends_with("\"slept well, finally\""));
    }

    #[tokio::test]
    async fn all_category_bundles_five_files() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        db.seed_users(1).await.unwrap();
        db.insert_finance(&FinanceEntry {
            id: 0,
            user_id: 1,
            recorded_at: Utc::now(),
            local_date: NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
            timezone: "UTC".to_string(),
            income: 100.0,
            expense_food: 5.0,
            expense_transport: 0.0,
            expense_health: 0.0,
            expense_other: 0.0,
            notes: None,
        })
        .await
        .unwrap();

        let files = export_category(&db, 1, "all").await.unwrap();
        assert_eq!(files.len(), 5);
        let finance = files.iter().find(|(name, _)| name == "finance.csv").unwrap();
        assert!(finance.1.contains("100,5,0,0,0,5"));

        assert!(export_category(&db, 1, "bogus").await.is_err());
    }
}
