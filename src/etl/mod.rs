use std::path::Path;

use chrono::{Datelike, NaiveDate, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;
use utoipa::ToSchema;

use crate::database::SqliteDatabase;
use crate::errors::{AppError, Result};
use crate::models::entry::{FinanceEntry, HealthEntry, LearningEntry, ProductivityEntry};

pub mod export;

/// Star-schema warehouse in its own SQLite file: one date dimension, one
/// user dimension, one fact table per sphere.
#[derive(Debug)]
pub struct Warehouse {
    pool: SqlitePool,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct EtlReport {
    pub users: usize,
    pub health_rows: usize,
    pub finance_rows: usize,
    pub productivity_rows: usize,
    pub learning_rows: usize,
}

fn date_key(date: NaiveDate) -> i64 {
    date.year() as i64 * 10_000 + date.month() as i64 * 100 + date.day() as i64
}

impl Warehouse {
    pub async fn open(path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::DatabaseError(format!("Failed to create warehouse directory: {}", e))
            })?;
        }
        if !Path::new(path).exists() {
            std::fs::File::create(path).map_err(|e| {
                AppError::DatabaseError(format!("Failed to create warehouse file: {}", e))
            })?;
        }

        let pool = SqlitePool::connect(&format!("sqlite:{}", path))
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to open warehouse: {}", e)))?;
        let warehouse = Self { pool };
        warehouse.create_schema().await?;

        info!(path, "warehouse opened");
        Ok(warehouse)
    }

    /// In-memory warehouse for tests.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to open warehouse: {}", e)))?;
        let warehouse = Self { pool };
        warehouse.create_schema().await?;
        Ok(warehouse)
    }

    async fn create_schema(&self) -> Result<()> {
        let query = r#"
            CREATE TABLE IF NOT EXISTS dim_date (
                date_key INTEGER PRIMARY KEY,
                date TEXT NOT NULL,
                year INTEGER NOT NULL,
                month INTEGER NOT NULL,
                day INTEGER NOT NULL,
                weekday INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS dim_user (
                user_key INTEGER PRIMARY KEY,
                email TEXT NOT NULL,
                full_name TEXT
            );

            CREATE TABLE IF NOT EXISTS fact_health (
                user_key INTEGER NOT NULL,
                date_key INTEGER NOT NULL,
                source_entry_id INTEGER NOT NULL,
                sleep_hours REAL NOT NULL,
                energy_level INTEGER NOT NULL,
                wellbeing INTEGER NOT NULL,
                weight_kg REAL,
                steps INTEGER,
                heart_rate_avg INTEGER,
                workout_minutes INTEGER,
                loaded_at TEXT NOT NULL,
                UNIQUE (user_key, source_entry_id)
            );

            CREATE TABLE IF NOT EXISTS fact_finance (
                user_key INTEGER NOT NULL,
                date_key INTEGER NOT NULL,
                source_entry_id INTEGER NOT NULL,
                income REAL NOT NULL,
                expense_food REAL NOT NULL,
                expense_transport REAL NOT NULL,
                expense_health REAL NOT NULL,
                expense_other REAL NOT NULL,
                expense_total REAL NOT NULL,
                loaded_at TEXT NOT NULL,
                UNIQUE (user_key, source_entry_id)
            );

            CREATE TABLE IF NOT EXISTS fact_productivity (
                user_key INTEGER NOT NULL,
                date_key INTEGER NOT NULL,
                source_entry_id INTEGER NOT NULL,
                deep_work_hours REAL NOT NULL,
                tasks_completed INTEGER NOT NULL,
                focus_level INTEGER NOT NULL,
                loaded_at TEXT NOT NULL,
                UNIQUE (user_key, source_entry_id)
            );

            CREATE TABLE IF NOT EXISTS fact_learning (
                user_key INTEGER NOT NULL,
                date_key INTEGER NOT NULL,
                source_entry_id INTEGER NOT NULL,
                study_hours REAL NOT NULL,
                loaded_at TEXT NOT NULL,
                UNIQUE (user_key, source_entry_id)
            );

            CREATE INDEX IF NOT EXISTS idx_fact_health_date ON fact_health (date_key);
            CREATE INDEX IF NOT EXISTS idx_fact_finance_date ON fact_finance (date_key);
            CREATE INDEX IF NOT EXISTS idx_fact_productivity_date ON fact_productivity (date_key);
            CREATE INDEX IF NOT EXISTS idx_fact_learning_date ON fact_learning (date_key);

            CREATE VIEW IF NOT EXISTS daily_overview AS
            SELECT
                d.date AS date,
                u.user_key AS user_id,
                h.sleep_hours,
                h.energy_level,
                h.wellbeing,
                h.steps,
                f.income,
                f.expense_total,
                p.deep_work_hours,
                p.tasks_completed,
                p.focus_level,
                l.study_hours
            FROM dim_user u
            JOIN dim_date d
            LEFT JOIN fact_health h
                ON h.user_key = u.user_key AND h.date_key = d.date_key
            LEFT JOIN fact_finance f
                ON f.user_key = u.user_key AND f.date_key = d.date_key
            LEFT JOIN fact_productivity p
                ON p.user_key = u.user_key AND p.date_key = d.date_key
            LEFT JOIN fact_learning l
                ON l.user_key = u.user_key AND l.date_key = d.date_key
            WHERE h.source_entry_id IS NOT NULL
               OR f.source_entry_id IS NOT NULL
               OR p.source_entry_id IS NOT NULL
               OR l.source_entry_id IS NOT NULL;

            CREATE VIEW IF NOT EXISTS monthly_user_rollup AS
            SELECT
                user_id,
                substr(date, 1, 7) AS month,
                COUNT(*) AS days_with_data,
                AVG(sleep_hours) AS sleep_avg,
                AVG(energy_level) AS energy_avg,
                AVG(wellbeing) AS wellbeing_avg,
                SUM(income) AS income_total,
                SUM(expense_total) AS expense_total,
                SUM(deep_work_hours) AS deep_work_total,
                SUM(tasks_completed) AS tasks_total,
                SUM(study_hours) AS study_total
            FROM daily_overview
            GROUP BY user_id, substr(date, 1, 7);
        "#;

        sqlx::query(query)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to create warehouse schema: {}", e)))?;
        Ok(())
    }

    async fn upsert_date(&self, date: NaiveDate) -> Result<i64> {
        let key = date_key(date);
        sqlx::query(
            r#"
            INSERT INTO dim_date (date_key, date, year, month, day, weekday)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (date_key) DO NOTHING
            "#,
        )
        .bind(key)
        .bind(date.format("%Y-%m-%d").to_string())
        .bind(date.year())
        .bind(date.month() as i64)
        .bind(date.day() as i64)
        .bind(date.weekday().num_days_from_monday() as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to upsert dim_date: {}", e)))?;
        Ok(key)
    }

    async fn upsert_user(&self, user_key: i64, email: &str, full_name: Option<&str>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO dim_user (user_key, email, full_name)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (user_key) DO UPDATE SET
                email = excluded.email,
                full_name = excluded.full_name
            "#,
        )
        .bind(user_key)
        .bind(email)
        .bind(full_name)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to upsert dim_user: {}", e)))?;
        Ok(())
    }

    async fn load_health(&self, entry: &HealthEntry, loaded_at: &str) -> Result<()> {
        let key = self.upsert_date(entry.local_date).await?;
        sqlx::query(
            r#"
            INSERT INTO fact_health
                (user_key, date_key, source_entry_id, sleep_hours, energy_level, wellbeing,
                 weight_kg, steps, heart_rate_avg, workout_minutes, loaded_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT (user_key, source_entry_id) DO UPDATE SET
                date_key = excluded.date_key,
                sleep_hours = excluded.sleep_hours,
                energy_level = excluded.energy_level,
                wellbeing = excluded.wellbeing,
                weight_kg = excluded.weight_kg,
                steps = excluded.steps,
                heart_rate_avg = excluded.heart_rate_avg,
                workout_minutes = excluded.workout_minutes,
                loaded_at = excluded.loaded_at
            "#,
        )
        .bind(entry.user_id)
        .bind(key)
        .bind(entry.id)
        .bind(entry.sleep_hours)
        .bind(entry.energy_level)
        .bind(entry.wellbeing)
        .bind(entry.weight_kg)
        .bind(entry.steps)
        .bind(entry.heart_rate_avg)
        .bind(entry.workout_minutes)
        .bind(loaded_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to load fact_health: {}", e)))?;
        Ok(())
    }

    async fn load_finance(&self, entry: &FinanceEntry, loaded_at: &str) -> Result<()> {
        let key = self.upsert_date(entry.local_date).await?;
        sqlx::query(
            r#"
            INSERT INTO fact_finance
                (user_key, date_key, source_entry_id, income, expense_food, expense_transport,
                 expense_health, expense_other, expense_total, loaded_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT (user_key, source_entry_id) DO UPDATE SET
                date_key = excluded.date_key,
                income = excluded.income,
                expense_food = excluded.expense_food,
                expense_transport = excluded.expense_transport,
                expense_health = excluded.expense_health,
                expense_other = excluded.expense_other,
                expense_total = excluded.expense_total,
                loaded_at = excluded.loaded_at
            "#,
        )
        .bind(entry.user_id)
        .bind(key)
        .bind(entry.id)
        .bind(entry.income)
        .bind(entry.expense_food)
        .bind(entry.expense_transport)
        .bind(entry.expense_health)
        .bind(entry.expense_other)
        .bind(entry.total_expense())
        .bind(loaded_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to load fact_finance: {}", e)))?;
        Ok(())
    }

    async fn load_productivity(&self, entry: &ProductivityEntry, loaded_at: &str) -> Result<()> {
        let key = self.upsert_date(entry.local_date).await?;
        sqlx::query(
            r#"
            INSERT INTO fact_productivity
                (user_key, date_key, source_entry_id, deep_work_hours, tasks_completed,
                 focus_level, loaded_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (user_key, source_entry_id) DO UPDATE SET
                date_key = excluded.date_key,
                deep_work_hours = excluded.deep_work_hours,
                tasks_completed = excluded.tasks_completed,
                focus_level = excluded.focus_level,
                loaded_at = excluded.loaded_at
            "#,
        )
        .bind(entry.user_id)
        .bind(key)
        .bind(entry.id)
        .bind(entry.deep_work_hours)
        .bind(entry.tasks_completed)
        .bind(entry.focus_level)
        .bind(loaded_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to load fact_productivity: {}", e)))?;
        Ok(())
    }

    async fn load_learning(&self, entry: &LearningEntry, loaded_at: &str) -> Result<()> {
        let key = self.upsert_date(entry.local_date).await?;
        sqlx::query(
            r#"
            INSERT INTO fact_learning
                (user_key, date_key, source_entry_id, study_hours, loaded_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (user_key, source_entry_id) DO UPDATE SET
                date_key = excluded.date_key,
                study_hours = excluded.study_hours,
                loaded_at = excluded.loaded_at
            "#,
        )
        .bind(entry.user_id)
        .bind(key)
        .bind(entry.id)
        .bind(entry.study_hours)
        .bind(loaded_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to load fact_learning: {}", e)))?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) async fn count(&self, table: &str) -> Result<i64> {
        use sqlx::Row;
        let row = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {}", table))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to count {}: {}", table, e)))?;
        Ok(row.get("n"))
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Full load from the operational database into the warehouse. Re-runs
/// are idempotent: facts key on (user, source entry).
pub async fn run_etl(db: &SqliteDatabase, warehouse: &Warehouse) -> Result<EtlReport> {
    let loaded_at = Utc::now().to_rfc3339();
    let mut report = EtlReport::default();

    for user in db.list_users().await? {
        warehouse
            .upsert_user(user.id, &user.email, user.full_name.as_deref())
            .await?;
        report.users += 1;
    }

    for entry in db.list_health_all().await? {
        warehouse.load_health(&entry, &loaded_at).await?;
        report.health_rows += 1;
    }
    for entry in db.list_finance_all().await? {
        warehouse.load_finance(&entry, &loaded_at).await?;
        report.finance_rows += 1;
    }
    for entry in db.list_productivity_all().await? {
        warehouse.load_productivity(&entry, &loaded_at).await?;
        report.productivity_rows += 1;
    }
    for entry in db.list_learning_all().await? {
        warehouse.load_learning(&entry, &loaded_at).await?;
        report.learning_rows += 1;
    }

    info!(
        users = report.users,
        health = report.health_rows,
        finance = report.finance_rows,
        productivity = report.productivity_rows,
        learning = report.learning_rows,
        "etl run finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn seeded_db() -> SqliteDatabase {
        let db = SqliteDatabase::in_memory().await.unwrap();
        let user = db
            .create_user("me@example.com", "hash", Some("Me"), "user")
            .await
            .unwrap();

        db.insert_health(&HealthEntry {
            id: 0,
            user_id: user.id,
            recorded_at: Utc::now(),
            local_date: date(2026, 8, 20),
            timezone: "UTC".to_string(),
            sleep_hours: 7.5,
            energy_level: 7,
            wellbeing: 8,
            supplements: None,
            weight_kg: Some(80.0),
            steps: Some(9000),
            heart_rate_avg: None,
            workout_minutes: None,
            notes: None,
        })
        .await
        .unwrap();
        db.insert_finance(&FinanceEntry {
            id: 0,
            user_id: user.id,
            recorded_at: Utc::now(),
            local_date: date(2026, 8, 20),
            timezone: "UTC".to_string(),
            income: 0.0,
            expense_food: 12.0,
            expense_transport: 3.0,
            expense_health: 0.0,
            expense_other: 5.0,
            notes: None,
        })
        .await
        .unwrap();
        db.insert_productivity(&ProductivityEntry {
            id: 0,
            user_id: user.id,
            recorded_at: Utc::now(),
            local_date: date(2026, 8, 21),
            timezone: "UTC".to_string(),
            deep_work_hours: 3.5,
            tasks_completed: 6,
            focus_level: 8,
            notes: None,
        })
        .await
        .unwrap();
        db
    }

    #[tokio::test]
    async fn open_creates_the_warehouse_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warehouse.db");

        let warehouse = Warehouse::open(path.to_str().unwrap()).await.unwrap();
        assert!(path.exists());
        assert_eq!(warehouse.count("dim_date").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn etl_loads_dims_and_facts() {
        let db = seeded_db().await;
        let warehouse = Warehouse::in_memory().await.unwrap();

        let report = run_etl(&db, &warehouse).await.unwrap();
        assert_eq!(report.users, 1);
        assert_eq!(report.health_rows, 1);
        assert_eq!(report.finance_rows, 1);
        assert_eq!(report.productivity_rows, 1);
        assert_eq!(report.learning_rows, 0);

        assert_eq!(warehouse.count("dim_user").await.unwrap(), 1);
        assert_eq!(warehouse.count("dim_date").await.unwrap(), 2);
        assert_eq!(warehouse.count("fact_health").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn etl_rerun_is_idempotent() {
        let db = seeded_db().await;
        let warehouse = Warehouse::in_memory().await.unwrap();

        run_etl(&db, &warehouse).await.unwrap();
        run_etl(&db, &warehouse).await.unwrap();

        assert_eq!(warehouse.count("fact_health").await.unwrap(), 1);
        assert_eq!(warehouse.count("fact_finance").await.unwrap(), 1);
        assert_eq!(warehouse.count("fact_productivity").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn daily_overview_joins_spheres_on_date() {
        let db = seeded_db().await;
        let warehouse = Warehouse::in_memory().await.unwrap();
        run_etl(&db, &warehouse).await.unwrap();

        let rows = sqlx::query("SELECT * FROM daily_overview ORDER BY date")
            .fetch_all(warehouse.pool())
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);

        let first = &rows[0];
        assert_eq!(first.get::<String, _>("date"), "2026-08-20");
        assert_eq!(first.get::<Option<f64>, _>("sleep_hours"), Some(7.5));
        assert_eq!(first.get::<Option<f64>, _>("expense_total"), Some(20.0));
        assert_eq!(first.get::<Option<f64>, _>("deep_work_hours"), None);

        let rollup = sqlx::query("SELECT * FROM monthly_user_rollup")
            .fetch_all(warehouse.pool())
            .await
            .unwrap();
        assert_eq!(rollup.len(), 1);
        assert_eq!(rollup[0].get::<String, _>("month"), "2026-08");
        assert_eq!(rollup[0].get::<i64, _>("days_with_data"), 2);
        assert_eq!(rollup[0].get::<Option<f64>, _>("deep_work_total"), Some(3.5));
    }
}
