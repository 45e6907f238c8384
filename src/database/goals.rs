use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::database::sqlite::{parse_date, parse_dt, parse_dt_opt, parse_json_opt, SqliteDatabase};
use crate::errors::{AppError, Result};
use crate::models::goal::UserGoal;
use crate::models::integration::{DataSource, SyncJob};

fn map_goal(row: &SqliteRow) -> Result<UserGoal> {
    Ok(UserGoal {
        id: row.get("id"),
        user_id: row.get("user_id"),
        sphere: row.get("sphere"),
        title: row.get("title"),
        target_value: row.get("target_value"),
        target_metric: row.get("target_metric"),
        deadline: row
            .get::<Option<String>, _>("deadline")
            .as_deref()
            .map(parse_date)
            .transpose()?,
        archived: row.get("archived"),
        created_at: parse_dt(&row.get::<String, _>("created_at"))?,
    })
}

fn map_source(row: &SqliteRow) -> Result<DataSource> {
    Ok(DataSource {
        id: row.get("id"),
        user_id: row.get("user_id"),
        provider: row.get("provider"),
        status: row.get("status"),
        access_token: row.get("access_token"),
        refresh_token: row.get("refresh_token"),
        token_expires_at: parse_dt_opt(row.get("token_expires_at"))?,
        last_synced_at: parse_dt_opt(row.get("last_synced_at"))?,
        last_error: row.get("last_error"),
        metadata: parse_json_opt(row.get("metadata"))?,
        created_at: parse_dt(&row.get::<String, _>("created_at"))?,
        updated_at: parse_dt(&row.get::<String, _>("updated_at"))?,
    })
}

fn map_job(row: &SqliteRow) -> Result<SyncJob> {
    Ok(SyncJob {
        id: row.get("id"),
        user_id: row.get("user_id"),
        provider: row.get("provider"),
        data_source_id: row.get("data_source_id"),
        status: row.get("status"),
        started_at: parse_dt_opt(row.get("started_at"))?,
        finished_at: parse_dt_opt(row.get("finished_at"))?,
        message: row.get("message"),
        stats: parse_json_opt(row.get("stats"))?,
        created_at: parse_dt(&row.get::<String, _>("created_at"))?,
    })
}

impl SqliteDatabase {
    // --- goals ---

    pub async fn insert_goal(&self, goal: &UserGoal) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_goals
                (user_id, sphere, title, target_value, target_metric, deadline, archived, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(goal.user_id)
        .bind(&goal.sphere)
        .bind(&goal.title)
        .bind(goal.target_value)
        .bind(&goal.target_metric)
        .bind(goal.deadline.map(|d| d.format("%Y-%m-%d").to_string()))
        .bind(goal.archived)
        .bind(goal.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to insert goal: {}", e)))?;
        Ok(result.last_insert_rowid())
    }

    pub async fn update_goal(&self, goal: &UserGoal) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE user_goals SET
                sphere = ?1, title = ?2, target_value = ?3, target_metric = ?4,
                deadline = ?5, archived = ?6
            WHERE id = ?7 AND user_id = ?8
            "#,
        )
        .bind(&goal.sphere)
        .bind(&goal.title)
        .bind(goal.target_value)
        .bind(&goal.target_metric)
        .bind(goal.deadline.map(|d| d.format("%Y-%m-%d").to_string()))
        .bind(goal.archived)
        .bind(goal.id)
        .bind(goal.user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to update goal: {}", e)))?;
        Ok(())
    }

    pub async fn get_goal(&self, id: i64, user_id: i64) -> Result<Option<UserGoal>> {
        let row = sqlx::query("SELECT * FROM user_goals WHERE id = ?1 AND user_id = ?2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch goal: {}", e)))?;
        row.as_ref().map(map_goal).transpose()
    }

    pub async fn list_goals(&self, user_id: i64, include_archived: bool) -> Result<Vec<UserGoal>> {
        let sql = if include_archived {
            "SELECT * FROM user_goals WHERE user_id = ?1 ORDER BY id ASC"
        } else {
            "SELECT * FROM user_goals WHERE user_id = ?1 AND archived = FALSE ORDER BY id ASC"
        };
        let rows = sqlx::query(sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to list goals: {}", e)))?;
        rows.iter().map(map_goal).collect()
    }

    pub async fn count_active_goals_by_sphere(&self, user_id: i64, sphere: &str) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM user_goals WHERE user_id = ?1 AND sphere = ?2 AND archived = FALSE",
        )
        .bind(user_id)
        .bind(sphere)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to count goals: {}", e)))?;
        Ok(row.get("n"))
    }

    pub async fn delete_goal(&self, id: i64, user_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM user_goals WHERE id = ?1 AND user_id = ?2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to delete goal: {}", e)))?;
        Ok(result.rows_affected() > 0)
    }

    // --- data sources ---

    pub async fn upsert_data_source(
        &self,
        user_id: i64,
        provider: &str,
        status: &str,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
        token_expires_at: Option<DateTime<Utc>>,
        metadata: Option<&serde_json::Value>,
    ) -> Result<DataSource> {
        let now = Utc::now().to_rfc3339();
        let metadata_raw = metadata.map(|m| m.to_string());
        sqlx::query(
            r#"
            INSERT INTO data_sources
                (user_id, provider, status, access_token, refresh_token, token_expires_at,
                 metadata, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            ON CONFLICT(user_id, provider) DO UPDATE SET
                status = excluded.status,
                access_token = COALESCE(excluded.access_token, access_token),
                refresh_token = COALESCE(excluded.refresh_token, refresh_token),
                token_expires_at = excluded.token_expires_at,
                metadata = COALESCE(excluded.metadata, metadata),
                last_error = NULL,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(provider)
        .bind(status)
        .bind(access_token)
        .bind(refresh_token)
        .bind(token_expires_at.map(|t| t.to_rfc3339()))
        .bind(metadata_raw)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to upsert data source: {}", e)))?;

        self.get_data_source_by_provider(user_id, provider)
            .await?
            .ok_or_else(|| AppError::DatabaseError("Data source vanished after upsert".to_string()))
    }

    pub async fn get_data_source(&self, id: i64, user_id: i64) -> Result<Option<DataSource>> {
        let row = sqlx::query("SELECT * FROM data_sources WHERE id = ?1 AND user_id = ?2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch data source: {}", e)))?;
        row.as_ref().map(map_source).transpose()
    }

    pub async fn get_data_source_by_provider(
        &self,
        user_id: i64,
        provider: &str,
    ) -> Result<Option<DataSource>> {
        let row = sqlx::query("SELECT * FROM data_sources WHERE user_id = ?1 AND provider = ?2")
            .bind(user_id)
            .bind(provider)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch data source: {}", e)))?;
        row.as_ref().map(map_source).transpose()
    }

    pub async fn list_data_sources(&self, user_id: i64) -> Result<Vec<DataSource>> {
        let rows = sqlx::query("SELECT * FROM data_sources WHERE user_id = ?1 ORDER BY id ASC")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to list data sources: {}", e)))?;
        rows.iter().map(map_source).collect()
    }

    pub async fn touch_data_source_synced(&self, id: i64) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE data_sources SET last_synced_at = ?1, last_error = NULL, updated_at = ?1 WHERE id = ?2",
        )
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to stamp data source: {}", e)))?;
        Ok(())
    }

    pub async fn set_data_source_error(&self, id: i64, error: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE data_sources SET last_error = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(error)
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to record source error: {}", e)))?;
        Ok(())
    }

    pub async fn update_data_source_tokens(
        &self,
        id: i64,
        access_token: &str,
        token_expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE data_sources SET access_token = ?1, token_expires_at = ?2, updated_at = ?3 WHERE id = ?4",
        )
        .bind(access_token)
        .bind(token_expires_at.map(|t| t.to_rfc3339()))
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to update source tokens: {}", e)))?;
        Ok(())
    }

    pub async fn delete_data_source(&self, id: i64, user_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM data_sources WHERE id = ?1 AND user_id = ?2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to delete data source: {}", e)))?;
        Ok(result.rows_affected() > 0)
    }

    // --- sync jobs ---

    pub async fn create_sync_job(
        &self,
        user_id: i64,
        provider: &str,
        data_source_id: Option<i64>,
    ) -> Result<SyncJob> {
        let created_at = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO sync_jobs (user_id, provider, data_source_id, status, created_at)
            VALUES (?1, ?2, ?3, 'queued', ?4)
            "#,
        )
        .bind(user_id)
        .bind(provider)
        .bind(data_source_id)
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create sync job: {}", e)))?;

        Ok(SyncJob {
            id: result.last_insert_rowid(),
            user_id,
            provider: provider.to_string(),
            data_source_id,
            status: "queued".to_string(),
            started_at: None,
            finished_at: None,
            message: None,
            stats: None,
            created_at,
        })
    }

    pub async fn mark_sync_job_started(&self, job_id: i64) -> Result<()> {
        sqlx::query("UPDATE sync_jobs SET status = 'running', started_at = ?1 WHERE id = ?2")
            .bind(Utc::now().to_rfc3339())
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to start sync job: {}", e)))?;
        Ok(())
    }

    pub async fn finish_sync_job(
        &self,
        job_id: i64,
        status: &str,
        message: Option<&str>,
        stats: Option<&serde_json::Value>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE sync_jobs SET status = ?1, message = ?2, stats = ?3, finished_at = ?4 WHERE id = ?5",
        )
        .bind(status)
        .bind(message)
        .bind(stats.map(|s| s.to_string()))
        .bind(Utc::now().to_rfc3339())
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to finish sync job: {}", e)))?;
        Ok(())
    }

    pub async fn get_sync_job(&self, job_id: i64) -> Result<Option<SyncJob>> {
        let row = sqlx::query("SELECT * FROM sync_jobs WHERE id = ?1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch sync job: {}", e)))?;
        row.as_ref().map(map_job).transpose()
    }

    pub async fn last_sync_job_for_source(&self, source_id: i64) -> Result<Option<SyncJob>> {
        let row = sqlx::query(
            "SELECT * FROM sync_jobs WHERE data_source_id = ?1 ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to fetch last sync job: {}", e)))?;
        row.as_ref().map(map_job).transpose()
    }

    pub async fn list_sync_jobs(&self, user_id: i64, limit: i64) -> Result<Vec<SyncJob>> {
        let rows = sqlx::query(
            "SELECT * FROM sync_jobs WHERE user_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to list sync jobs: {}", e)))?;
        rows.iter().map(map_job).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> SqliteDatabase {
        let db = SqliteDatabase::in_memory().await.unwrap();
        db.seed_users(1).await.unwrap();
        db
    }

    fn goal(user_id: i64, sphere: &str, title: &str) -> UserGoal {
        UserGoal {
            id: 0,
            user_id,
            sphere: sphere.to_string(),
            title: title.to_string(),
            target_value: Some(49.0),
            target_metric: Some("sleep_hours".to_string()),
            deadline: None,
            archived: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn goal_listing_skips_archived_by_default() {
        let db = test_db().await;
        let id = db.insert_goal(&goal(1, "health", "Sleep 49h/week")).await.unwrap();
        db.insert_goal(&goal(1, "learning", "Study more")).await.unwrap();

        let mut archived = db.get_goal(id, 1).await.unwrap().unwrap();
        archived.archived = true;
        db.update_goal(&archived).await.unwrap();

        assert_eq!(db.list_goals(1, false).await.unwrap().len(), 1);
        assert_eq!(db.list_goals(1, true).await.unwrap().len(), 2);
        assert_eq!(db.count_active_goals_by_sphere(1, "health").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn data_source_upsert_is_idempotent_per_provider() {
        let db = test_db().await;
        let first = db
            .upsert_data_source(1, "google_fit", "connected", Some("tok-a"), None, None, None)
            .await
            .unwrap();
        let second = db
            .upsert_data_source(1, "google_fit", "connected", Some("tok-b"), None, None, None)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.access_token.as_deref(), Some("tok-b"));
        assert_eq!(db.list_data_sources(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sync_job_lifecycle() {
        let db = test_db().await;
        let source = db
            .upsert_data_source(1, "open_banking", "connected", None, None, None, None)
            .await
            .unwrap();
        let job = db.create_sync_job(1, "open_banking", Some(source.id)).await.unwrap();
        assert_eq!(job.status, "queued");

        db.mark_sync_job_started(job.id).await.unwrap();
        db.finish_sync_job(job.id, "success", Some("OK"), Some(&serde_json::json!({"n": 3})))
            .await
            .unwrap();

        let done = db.get_sync_job(job.id).await.unwrap().unwrap();
        assert_eq!(done.status, "success");
        assert!(done.finished_at.is_some());
        assert_eq!(done.stats.unwrap()["n"], 3);

        let last = db.last_sync_job_for_source(source.id).await.unwrap().unwrap();
        assert_eq!(last.id, job.id);
    }
}
