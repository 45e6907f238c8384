use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::database::sqlite::{parse_date, parse_dt, SqliteDatabase};
use crate::errors::{AppError, Result};
use crate::models::entry::{FinanceEntry, HealthEntry, LearningEntry, ProductivityEntry};

/// Date-range and pagination filters shared by the entry list queries.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub limit: i64,
    pub offset: i64,
}

impl EntryFilter {
    pub fn range(start_date: Option<NaiveDate>, end_date: Option<NaiveDate>) -> Self {
        Self {
            start_date,
            end_date,
            limit: i64::MAX,
            offset: 0,
        }
    }
}

fn map_health(row: &SqliteRow) -> Result<HealthEntry> {
    Ok(HealthEntry {
        id: row.get("id"),
        user_id: row.get("user_id"),
        recorded_at: parse_dt(&row.get::<String, _>("recorded_at"))?,
        local_date: parse_date(&row.get::<String, _>("local_date"))?,
        timezone: row.get("timezone"),
        sleep_hours: row.get("sleep_hours"),
        energy_level: row.get("energy_level"),
        wellbeing: row.get("wellbeing"),
        supplements: row.get("supplements"),
        weight_kg: row.get("weight_kg"),
        steps: row.get("steps"),
        heart_rate_avg: row.get("heart_rate_avg"),
        workout_minutes: row.get("workout_minutes"),
        notes: row.get("notes"),
    })
}

fn map_finance(row: &SqliteRow) -> Result<FinanceEntry> {
    Ok(FinanceEntry {
        id: row.get("id"),
        user_id: row.get("user_id"),
        recorded_at: parse_dt(&row.get::<String, _>("recorded_at"))?,
        local_date: parse_date(&row.get::<String, _>("local_date"))?,
        timezone: row.get("timezone"),
        income: row.get("income"),
        expense_food: row.get("expense_food"),
        expense_transport: row.get("expense_transport"),
        expense_health: row.get("expense_health"),
        expense_other: row.get("expense_other"),
        notes: row.get("notes"),
    })
}

fn map_productivity(row: &SqliteRow) -> Result<ProductivityEntry> {
    Ok(ProductivityEntry {
        id: row.get("id"),
        user_id: row.get("user_id"),
        recorded_at: parse_dt(&row.get::<String, _>("recorded_at"))?,
        local_date: parse_date(&row.get::<String, _>("local_date"))?,
        timezone: row.get("timezone"),
        deep_work_hours: row.get("deep_work_hours"),
        tasks_completed: row.get("tasks_completed"),
        focus_level: row.get("focus_level"),
        notes: row.get("notes"),
    })
}

fn map_learning(row: &SqliteRow) -> Result<LearningEntry> {
    Ok(LearningEntry {
        id: row.get("id"),
        user_id: row.get("user_id"),
        recorded_at: parse_dt(&row.get::<String, _>("recorded_at"))?,
        local_date: parse_date(&row.get::<String, _>("local_date"))?,
        timezone: row.get("timezone"),
        study_hours: row.get("study_hours"),
        topics: row.get("topics"),
        projects: row.get("projects"),
        notes: row.get("notes"),
    })
}

/// Build the shared `WHERE user_id / local_date` clause. `?1` is always
/// the user id; start/end bind as `?2`/`?3` when present.
fn list_query(table: &str, filter: &EntryFilter) -> String {
    let mut sql = format!("SELECT * FROM {} WHERE user_id = ?1", table);
    let mut next = 2;
    if filter.start_date.is_some() {
        sql.push_str(&format!(" AND local_date >= ?{}", next));
        next += 1;
    }
    if filter.end_date.is_some() {
        sql.push_str(&format!(" AND local_date <= ?{}", next));
        next += 1;
    }
    sql.push_str(&format!(
        " ORDER BY local_date DESC, id DESC LIMIT ?{} OFFSET ?{}",
        next,
        next + 1
    ));
    sql
}

macro_rules! fetch_filtered {
    ($self:expr, $table:expr, $user_id:expr, $filter:expr, $mapper:expr) => {{
        let sql = list_query($table, &$filter);
        let mut query = sqlx::query(&sql).bind($user_id);
        if let Some(start) = $filter.start_date {
            query = query.bind(start.format("%Y-%m-%d").to_string());
        }
        if let Some(end) = $filter.end_date {
            query = query.bind(end.format("%Y-%m-%d").to_string());
        }
        let rows = query
            .bind($filter.limit)
            .bind($filter.offset)
            .fetch_all(&$self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to list entries: {}", e)))?;
        rows.iter().map($mapper).collect::<Result<Vec<_>>>()
    }};
}

impl SqliteDatabase {
    // --- health ---

    pub async fn insert_health(&self, entry: &HealthEntry) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO health_entries
                (user_id, recorded_at, local_date, timezone, sleep_hours, energy_level,
                 wellbeing, supplements, weight_kg, steps, heart_rate_avg, workout_minutes, notes)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(entry.user_id)
        .bind(entry.recorded_at.to_rfc3339())
        .bind(entry.local_date.format("%Y-%m-%d").to_string())
        .bind(&entry.timezone)
        .bind(entry.sleep_hours)
        .bind(entry.energy_level)
        .bind(entry.wellbeing)
        .bind(&entry.supplements)
        .bind(entry.weight_kg)
        .bind(entry.steps)
        .bind(entry.heart_rate_avg)
        .bind(entry.workout_minutes)
        .bind(&entry.notes)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to insert health entry: {}", e)))?;
        Ok(result.last_insert_rowid())
    }

    pub async fn update_health(&self, entry: &HealthEntry) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE health_entries SET
                recorded_at = ?1, local_date = ?2, timezone = ?3, sleep_hours = ?4,
                energy_level = ?5, wellbeing = ?6, supplements = ?7, weight_kg = ?8,
                steps = ?9, heart_rate_avg = ?10, workout_minutes = ?11, notes = ?12
            WHERE id = ?13 AND user_id = ?14
            "#,
        )
        .bind(entry.recorded_at.to_rfc3339())
        .bind(entry.local_date.format("%Y-%m-%d").to_string())
        .bind(&entry.timezone)
        .bind(entry.sleep_hours)
        .bind(entry.energy_level)
        .bind(entry.wellbeing)
        .bind(&entry.supplements)
        .bind(entry.weight_kg)
        .bind(entry.steps)
        .bind(entry.heart_rate_avg)
        .bind(entry.workout_minutes)
        .bind(&entry.notes)
        .bind(entry.id)
        .bind(entry.user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to update health entry: {}", e)))?;
        Ok(())
    }

    pub async fn get_health(&self, id: i64, user_id: i64) -> Result<Option<HealthEntry>> {
        let row = sqlx::query("SELECT * FROM health_entries WHERE id = ?1 AND user_id = ?2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch health entry: {}", e)))?;
        row.as_ref().map(map_health).transpose()
    }

    pub async fn get_health_by_date(
        &self,
        user_id: i64,
        local_date: NaiveDate,
    ) -> Result<Option<HealthEntry>> {
        let row = sqlx::query(
            "SELECT * FROM health_entries WHERE user_id = ?1 AND local_date = ?2 ORDER BY id ASC LIMIT 1",
        )
        .bind(user_id)
        .bind(local_date.format("%Y-%m-%d").to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to fetch health entry: {}", e)))?;
        row.as_ref().map(map_health).transpose()
    }

    pub async fn list_health(&self, user_id: i64, filter: EntryFilter) -> Result<Vec<HealthEntry>> {
        fetch_filtered!(self, "health_entries", user_id, filter, map_health)
    }

    pub async fn list_health_all(&self) -> Result<Vec<HealthEntry>> {
        let rows = sqlx::query("SELECT * FROM health_entries ORDER BY user_id, local_date")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to list health entries: {}", e)))?;
        rows.iter().map(map_health).collect()
    }

    pub async fn delete_health(&self, id: i64, user_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM health_entries WHERE id = ?1 AND user_id = ?2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to delete health entry: {}", e)))?;
        Ok(result.rows_affected() > 0)
    }

    // --- finance ---

    pub async fn insert_finance(&self, entry: &FinanceEntry) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO finance_entries
                (user_id, recorded_at, local_date, timezone, income, expense_food,
                 expense_transport, expense_health, expense_other, notes)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(entry.user_id)
        .bind(entry.recorded_at.to_rfc3339())
        .bind(entry.local_date.format("%Y-%m-%d").to_string())
        .bind(&entry.timezone)
        .bind(entry.income)
        .bind(entry.expense_food)
        .bind(entry.expense_transport)
        .bind(entry.expense_health)
        .bind(entry.expense_other)
        .bind(&entry.notes)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to insert finance entry: {}", e)))?;
        Ok(result.last_insert_rowid())
    }

    pub async fn update_finance(&self, entry: &FinanceEntry) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE finance_entries SET
                recorded_at = ?1, local_date = ?2, timezone = ?3, income = ?4,
                expense_food = ?5, expense_transport = ?6, expense_health = ?7,
                expense_other = ?8, notes = ?9
            WHERE id = ?10 AND user_id = ?11
            "#,
        )
        .bind(entry.recorded_at.to_rfc3339())
        .bind(entry.local_date.format("%Y-%m-%d").to_string())
        .bind(&entry.timezone)
        .bind(entry.income)
        .bind(entry.expense_food)
        .bind(entry.expense_transport)
        .bind(entry.expense_health)
        .bind(entry.expense_other)
        .bind(&entry.notes)
        .bind(entry.id)
        .bind(entry.user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to update finance entry: {}", e)))?;
        Ok(())
    }

    pub async fn get_finance(&self, id: i64, user_id: i64) -> Result<Option<FinanceEntry>> {
        let row = sqlx::query("SELECT * FROM finance_entries WHERE id = ?1 AND user_id = ?2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch finance entry: {}", e)))?;
        row.as_ref().map(map_finance).transpose()
    }

    pub async fn get_finance_by_date(
        &self,
        user_id: i64,
        local_date: NaiveDate,
    ) -> Result<Option<FinanceEntry>> {
        let row = sqlx::query(
            "SELECT * FROM finance_entries WHERE user_id = ?1 AND local_date = ?2 ORDER BY id ASC LIMIT 1",
        )
        .bind(user_id)
        .bind(local_date.format("%Y-%m-%d").to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to fetch finance entry: {}", e)))?;
        row.as_ref().map(map_finance).transpose()
    }

    pub async fn list_finance(&self, user_id: i64, filter: EntryFilter) -> Result<Vec<FinanceEntry>> {
        fetch_filtered!(self, "finance_entries", user_id, filter, map_finance)
    }

    pub async fn list_finance_all(&self) -> Result<Vec<FinanceEntry>> {
        let rows = sqlx::query("SELECT * FROM finance_entries ORDER BY user_id, local_date")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to list finance entries: {}", e)))?;
        rows.iter().map(map_finance).collect()
    }

    pub async fn delete_finance(&self, id: i64, user_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM finance_entries WHERE id = ?1 AND user_id = ?2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to delete finance entry: {}", e)))?;
        Ok(result.rows_affected() > 0)
    }

    // --- productivity ---

    pub async fn insert_productivity(&self, entry: &ProductivityEntry) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO productivity_entries
                (user_id, recorded_at, local_date, timezone, deep_work_hours,
                 tasks_completed, focus_level, notes)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(entry.user_id)
        .bind(entry.recorded_at.to_rfc3339())
        .bind(entry.local_date.format("%Y-%m-%d").to_string())
        .bind(&entry.timezone)
        .bind(entry.deep_work_hours)
        .bind(entry.tasks_completed)
        .bind(entry.focus_level)
        .bind(&entry.notes)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!("Failed to insert productivity entry: {}", e))
        })?;
        Ok(result.last_insert_rowid())
    }

    pub async fn update_productivity(&self, entry: &ProductivityEntry) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE productivity_entries SET
                recorded_at = ?1, local_date = ?2, timezone = ?3, deep_work_hours = ?4,
                tasks_completed = ?5, focus_level = ?6, notes = ?7
            WHERE id = ?8 AND user_id = ?9
            "#,
        )
        .bind(entry.recorded_at.to_rfc3339())
        .bind(entry.local_date.format("%Y-%m-%d").to_string())
        .bind(&entry.timezone)
        .bind(entry.deep_work_hours)
        .bind(entry.tasks_completed)
        .bind(entry.focus_level)
        .bind(&entry.notes)
        .bind(entry.id)
        .bind(entry.user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!("Failed to update productivity entry: {}", e))
        })?;
        Ok(())
    }

    pub async fn get_productivity(&self, id: i64, user_id: i64) -> Result<Option<ProductivityEntry>> {
        let row = sqlx::query("SELECT * FROM productivity_entries WHERE id = ?1 AND user_id = ?2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to fetch productivity entry: {}", e))
            })?;
        row.as_ref().map(map_productivity).transpose()
    }

    pub async fn list_productivity(
        &self,
        user_id: i64,
        filter: EntryFilter,
    ) -> Result<Vec<ProductivityEntry>> {
        fetch_filtered!(self, "productivity_entries", user_id, filter, map_productivity)
    }

    pub async fn list_productivity_all(&self) -> Result<Vec<ProductivityEntry>> {
        let rows = sqlx::query("SELECT * FROM productivity_entries ORDER BY user_id, local_date")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to list productivity entries: {}", e))
            })?;
        rows.iter().map(map_productivity).collect()
    }

    pub async fn delete_productivity(&self, id: i64, user_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM productivity_entries WHERE id = ?1 AND user_id = ?2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to delete productivity entry: {}", e))
            })?;
        Ok(result.rows_affected() > 0)
    }

    // --- learning ---

    pub async fn insert_learning(&self, entry: &LearningEntry) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO learning_entries
                (user_id, recorded_at, local_date, timezone, study_hours, topics, projects, notes)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(entry.user_id)
        .bind(entry.recorded_at.to_rfc3339())
        .bind(entry.local_date.format("%Y-%m-%d").to_string())
        .bind(&entry.timezone)
        .bind(entry.study_hours)
        .bind(&entry.topics)
        .bind(&entry.projects)
        .bind(&entry.notes)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to insert learning entry: {}", e)))?;
        Ok(result.last_insert_rowid())
    }

    pub async fn update_learning(&self, entry: &LearningEntry) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE learning_entries SET
                recorded_at = ?1, local_date = ?2, timezone = ?3, study_hours = ?4,
                topics = ?5, projects = ?6, notes = ?7
            WHERE id = ?8 AND user_id = ?9
            "#,
        )
        .bind(entry.recorded_at.to_rfc3339())
        .bind(entry.local_date.format("%Y-%m-%d").to_string())
        .bind(&entry.timezone)
        .bind(entry.study_hours)
        .bind(&entry.topics)
        .bind(&entry.projects)
        .bind(&entry.notes)
        .bind(entry.id)
        .bind(entry.user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to update learning entry: {}", e)))?;
        Ok(())
    }

    pub async fn get_learning(&self, id: i64, user_id: i64) -> Result<Option<LearningEntry>> {
        let row = sqlx::query("SELECT * FROM learning_entries WHERE id = ?1 AND user_id = ?2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch learning entry: {}", e)))?;
        row.as_ref().map(map_learning).transpose()
    }

    pub async fn list_learning(&self, user_id: i64, filter: EntryFilter) -> Result<Vec<LearningEntry>> {
        fetch_filtered!(self, "learning_entries", user_id, filter, map_learning)
    }

    pub async fn list_learning_all(&self) -> Result<Vec<LearningEntry>> {
        let rows = sqlx::query("SELECT * FROM learning_entries ORDER BY user_id, local_date")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to list learning entries: {}", e)))?;
        rows.iter().map(map_learning).collect()
    }

    pub async fn delete_learning(&self, id: i64, user_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM learning_entries WHERE id = ?1 AND user_id = ?2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to delete learning entry: {}", e)))?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    async fn test_db() -> SqliteDatabase {
        let db = SqliteDatabase::in_memory().await.unwrap();
        db.seed_users(2).await.unwrap();
        db
    }

    fn health(user_id: i64, date: NaiveDate, sleep: f64) -> HealthEntry {
        HealthEntry {
            id: 0,
            user_id,
            recorded_at: Utc::now(),
            local_date: date,
            timezone: "UTC".to_string(),
            sleep_hours: sleep,
            energy_level: 6,
            wellbeing: 7,
            supplements: None,
            weight_kg: None,
            steps: Some(8000),
            heart_rate_avg: None,
            workout_minutes: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn entries_require_a_registered_user() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        // No users table row for id 99: the foreign key rejects the insert.
        assert!(db.insert_health(&health(99, date, 7.0)).await.is_err());
    }

    #[tokio::test]
    async fn health_crud_is_user_scoped() {
        let db = test_db().await;
        let date = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        let id = db.insert_health(&health(1, date, 7.5)).await.unwrap();

        assert!(db.get_health(id, 1).await.unwrap().is_some());
        // Another user cannot see or delete the entry.
        assert!(db.get_health(id, 2).await.unwrap().is_none());
        assert!(!db.delete_health(id, 2).await.unwrap());
        assert!(db.delete_health(id, 1).await.unwrap());
    }

    #[tokio::test]
    async fn list_respects_date_range_and_order() {
        let db = test_db().await;
        for day in 1..=5 {
            let date = NaiveDate::from_ymd_opt(2026, 8, day).unwrap();
            db.insert_health(&health(1, date, 7.0)).await.unwrap();
        }

        let filter = EntryFilter {
            start_date: NaiveDate::from_ymd_opt(2026, 8, 2),
            end_date: NaiveDate::from_ymd_opt(2026, 8, 4),
            limit: 100,
            offset: 0,
        };
        let rows = db.list_health(1, filter).await.unwrap();
        assert_eq!(rows.len(), 3);
        // Newest first.
        assert_eq!(rows[0].local_date, NaiveDate::from_ymd_opt(2026, 8, 4).unwrap());
    }

    #[tokio::test]
    async fn update_replaces_fields() {
        let db = test_db().await;
        let date = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        let id = db.insert_health(&health(1, date, 6.0)).await.unwrap();

        let mut entry = db.get_health(id, 1).await.unwrap().unwrap();
        entry.sleep_hours = 8.0;
        entry.steps = Some(12000);
        db.update_health(&entry).await.unwrap();

        let updated = db.get_health(id, 1).await.unwrap().unwrap();
        assert_eq!(updated.sleep_hours, 8.0);
        assert_eq!(updated.steps, Some(12000));
    }
}

