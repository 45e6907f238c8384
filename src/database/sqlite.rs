use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::OnceCell;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::errors::{AppError, Result};
use crate::models::user::User;

pub static GLOBAL_DB: OnceCell<Arc<SqliteDatabase>> = OnceCell::new();

#[derive(Debug)]
pub struct SqliteDatabase {
    pub(crate) pool: SqlitePool,
}

pub(crate) fn parse_dt(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::DatabaseError(format!("Invalid timestamp '{}': {}", value, e)))
}

pub(crate) fn parse_dt_opt(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_dt).transpose()
}

pub(crate) fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| AppError::DatabaseError(format!("Invalid date '{}': {}", value, e)))
}

pub(crate) fn parse_json_opt(value: Option<String>) -> Result<Option<serde_json::Value>> {
    match value {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

fn map_user(row: &SqliteRow) -> Result<User> {
    Ok(User {
        id: row.get("id"),
        email: row.get("email"),
        hashed_password: row.get("hashed_password"),
        full_name: row.get("full_name"),
        default_timezone: row.get("default_timezone"),
        role: row.get("role"),
        created_at: parse_dt(&row.get::<String, _>("created_at"))?,
    })
}

impl SqliteDatabase {
    pub async fn new(database_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(database_path).parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::DatabaseError(format!("Failed to create database directory: {}", e))
            })?;
        }

        if !Path::new(database_path).exists() {
            std::fs::File::create(database_path).map_err(|e| {
                AppError::DatabaseError(format!("Failed to create database file: {}", e))
            })?;
        }

        let database_url = format!("sqlite:{}", database_path);
        let pool = SqlitePool::connect(&database_url)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to connect to database: {}", e)))?;

        let db = Self { pool };
        db.create_tables().await?;

        info!(path = database_path, "connected to sqlite database");
        Ok(db)
    }

    /// In-memory database for tests.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to open in-memory db: {}", e)))?;
        let db = Self { pool };
        db.create_tables().await?;
        Ok(db)
    }

    async fn create_tables(&self) -> Result<()> {
        let query = r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT UNIQUE NOT NULL,
                hashed_password TEXT NOT NULL,
                full_name TEXT,
                default_timezone TEXT DEFAULT 'UTC',
                role TEXT NOT NULL DEFAULT 'user',
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS password_resets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                token_hash TEXT UNIQUE NOT NULL,
                expires_at TEXT NOT NULL,
                used BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS health_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                recorded_at TEXT NOT NULL,
                local_date TEXT NOT NULL,
                timezone TEXT NOT NULL,
                sleep_hours REAL NOT NULL,
                energy_level INTEGER NOT NULL,
                wellbeing INTEGER NOT NULL,
                supplements TEXT,
                weight_kg REAL,
                steps INTEGER,
                heart_rate_avg INTEGER,
                workout_minutes INTEGER,
                notes TEXT,
                FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS finance_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                recorded_at TEXT NOT NULL,
                local_date TEXT NOT NULL,
                timezone TEXT NOT NULL,
                income REAL NOT NULL,
                expense_food REAL NOT NULL,
                expense_transport REAL NOT NULL,
                expense_health REAL NOT NULL,
                expense_other REAL NOT NULL,
                notes TEXT,
                FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS productivity_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                recorded_at TEXT NOT NULL,
                local_date TEXT NOT NULL,
                timezone TEXT NOT NULL,
                deep_work_hours REAL NOT NULL,
                tasks_completed INTEGER NOT NULL,
                focus_level INTEGER NOT NULL,
                notes TEXT,
                FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS learning_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                recorded_at TEXT NOT NULL,
                local_date TEXT NOT NULL,
                timezone TEXT NOT NULL,
                study_hours REAL NOT NULL,
                topics TEXT,
                projects TEXT,
                notes TEXT,
                FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS user_goals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                sphere TEXT NOT NULL,
                title TEXT NOT NULL,
                target_value REAL,
                target_metric TEXT,
                deadline TEXT,
                archived BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS data_sources (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                provider TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'connected',
                access_token TEXT,
                refresh_token TEXT,
                token_expires_at TEXT,
                last_synced_at TEXT,
                last_error TEXT,
                metadata TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(user_id, provider),
                FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS sync_jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                provider TEXT NOT NULL,
                data_source_id INTEGER,
                status TEXT NOT NULL DEFAULT 'queued',
                started_at TEXT,
                finished_at TEXT,
                message TEXT,
                stats TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);
            CREATE INDEX IF NOT EXISTS idx_resets_token ON password_resets(token_hash);
            CREATE INDEX IF NOT EXISTS idx_health_user_date ON health_entries(user_id, local_date);
            CREATE INDEX IF NOT EXISTS idx_finance_user_date ON finance_entries(user_id, local_date);
            CREATE INDEX IF NOT EXISTS idx_productivity_user_date ON productivity_entries(user_id, local_date);
            CREATE INDEX IF NOT EXISTS idx_learning_user_date ON learning_entries(user_id, local_date);
            CREATE INDEX IF NOT EXISTS idx_goals_user ON user_goals(user_id);
            CREATE INDEX IF NOT EXISTS idx_sources_user ON data_sources(user_id);
            CREATE INDEX IF NOT EXISTS idx_sync_jobs_user ON sync_jobs(user_id, created_at);
        "#;

        sqlx::query(query)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to create tables: {}", e)))?;

        Ok(())
    }

    pub async fn create_user(
        &self,
        email: &str,
        hashed_password: &str,
        full_name: Option<&str>,
        role: &str,
    ) -> Result<User> {
        let created_at = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO users (email, hashed_password, full_name, role, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(email)
        .bind(hashed_password)
        .bind(full_name)
        .bind(role)
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if e.to_string().contains("UNIQUE constraint failed") {
                AppError::ValidationError("Email already registered".to_string())
            } else {
                AppError::DatabaseError(format!("Failed to create user: {}", e))
            }
        })?;

        Ok(User {
            id: result.last_insert_rowid(),
            email: email.to_string(),
            hashed_password: hashed_password.to_string(),
            full_name: full_name.map(|s| s.to_string()),
            default_timezone: Some("UTC".to_string()),
            role: role.to_string(),
            created_at,
        })
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE email = ?1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch user by email: {}", e)))?;

        row.as_ref().map(map_user).transpose()
    }

    pub async fn get_user_by_id(&self, user_id: i64) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch user: {}", e)))?;

        row.as_ref().map(map_user).transpose()
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query("SELECT * FROM users ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to list users: {}", e)))?;

        rows.iter().map(map_user).collect()
    }

    pub async fn update_user_profile(
        &self,
        user_id: i64,
        full_name: Option<&str>,
        default_timezone: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET full_name = COALESCE(?1, full_name),
                default_timezone = COALESCE(?2, default_timezone)
            WHERE id = ?3
            "#,
        )
        .bind(full_name)
        .bind(default_timezone)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to update profile: {}", e)))?;
        Ok(())
    }

    pub async fn update_user_password(&self, user_id: i64, hashed_password: &str) -> Result<()> {
        sqlx::query("UPDATE users SET hashed_password = ?1 WHERE id = ?2")
            .bind(hashed_password)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to update password: {}", e)))?;
        Ok(())
    }

    pub async fn set_user_role(&self, user_id: i64, role: &str) -> Result<()> {
        sqlx::query("UPDATE users SET role = ?1 WHERE id = ?2")
            .bind(role)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to update role: {}", e)))?;
        Ok(())
    }

    pub async fn store_password_reset(
        &self,
        user_id: i64,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO password_resets (user_id, token_hash, expires_at, used, created_at)
            VALUES (?1, ?2, ?3, FALSE, ?4)
            "#,
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to store reset token: {}", e)))?;
        Ok(())
    }

    /// Look up an unused, unexpired reset token; returns the owning user id.
    pub async fn consume_password_reset(&self, token_hash: &str) -> Result<Option<i64>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, expires_at FROM password_resets
            WHERE token_hash = ?1 AND used = FALSE
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to fetch reset token: {}", e)))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let expires_at = parse_dt(&row.get::<String, _>("expires_at"))?;
        if expires_at <= Utc::now() {
            return Ok(None);
        }

        let reset_id: i64 = row.get("id");
        sqlx::query("UPDATE password_resets SET used = TRUE WHERE id = ?1")
            .bind(reset_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to mark token used: {}", e)))?;

        Ok(Some(row.get("user_id")))
    }

    /// Registers placeholder accounts so tests can reference user ids
    /// 1..=count in child rows without tripping the foreign keys.
    #[cfg(test)]
    pub(crate) async fn seed_users(&self, count: i64) -> Result<()> {
        for n in 1..=count {
            self.create_user(&format!("user{}@example.com", n), "hash", None, "user")
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_fetch_user() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        let user = db
            .create_user("me@example.com", "hash", Some("Me"), "user")
            .await
            .unwrap();
        assert_eq!(user.id, 1);

        let fetched = db.get_user_by_email("me@example.com").await.unwrap().unwrap();
        assert_eq!(fetched.full_name.as_deref(), Some("Me"));
        assert_eq!(fetched.role, "user");
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        db.create_user("me@example.com", "hash", None, "user")
            .await
            .unwrap();
        let err = db
            .create_user("me@example.com", "hash2", None, "user")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn reset_token_is_single_use() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        let user = db
            .create_user("me@example.com", "hash", None, "user")
            .await
            .unwrap();
        let expires = Utc::now() + chrono::Duration::hours(1);
        db.store_password_reset(user.id, "tokenhash", expires)
            .await
            .unwrap();

        assert_eq!(
            db.consume_password_reset("tokenhash").await.unwrap(),
            Some(user.id)
        );
        assert_eq!(db.consume_password_reset("tokenhash").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_reset_token_is_ignored() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        let user = db
            .create_user("me@example.com", "hash", None, "user")
            .await
            .unwrap();
        let expires = Utc::now() - chrono::Duration::minutes(1);
        db.store_password_reset(user.id, "stale", expires).await.unwrap();
        assert_eq!(db.consume_password_reset("stale").await.unwrap(), None);
    }
}
