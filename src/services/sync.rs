use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{error, info};

use crate::config::get_settings;
use crate::database::SqliteDatabase;
use crate::errors::Result;
use crate::integrations::IntegrationProvider;
use crate::models::integration::{DataSource, SyncJob};

/// Drive one sync job to a terminal state. Never returns an error to the
/// spawner; failures land on the job row and the data source instead.
pub async fn run_sync_job(
    db: Arc<SqliteDatabase>,
    provider: Arc<dyn IntegrationProvider>,
    source: DataSource,
    job_id: i64,
) {
    if let Err(e) = db.mark_sync_job_started(job_id).await {
        error!(job_id, error = %e, "could not mark sync job as running");
        return;
    }

    let outcome = match provider.sync(&db, &source).await {
        Ok(outcome) => outcome,
        Err(e) => crate::models::integration::SyncOutcome::failed(e.to_string()),
    };

    let finish = db
        .finish_sync_job(
            job_id,
            &outcome.status,
            outcome.message.as_deref(),
            outcome.stats.as_ref(),
        )
        .await;
    if let Err(e) = finish {
        error!(job_id, error = %e, "could not finish sync job");
        return;
    }

    let source_update = match outcome.status.as_str() {
        "success" => db.touch_data_source_synced(source.id).await,
        "failed" => {
            let message = outcome.message.as_deref().unwrap_or("sync failed");
            db.set_data_source_error(source.id, message).await
        }
        _ => Ok(()),
    };
    if let Err(e) = source_update {
        error!(job_id, source_id = source.id, error = %e, "could not stamp data source");
    }

    info!(
        job_id,
        provider = provider.name(),
        status = %outcome.status,
        "sync job finished"
    );
}

/// Queue a sync for a connected source, spawning the work in the
/// background. Requests inside the minimum interval return the previous
/// job instead of queueing a new one.
pub async fn request_sync(
    db: Arc<SqliteDatabase>,
    provider: Arc<dyn IntegrationProvider>,
    source: DataSource,
) -> Result<SyncJob> {
    let min_interval = Duration::seconds(get_settings().sync_min_interval_seconds as i64);
    if let Some(last_synced) = source.last_synced_at {
        if Utc::now() - last_synced < min_interval {
            if let Some(last_job) = db.last_sync_job_for_source(source.id).await? {
                info!(
                    source_id = source.id,
                    provider = provider.name(),
                    "sync requested inside minimum interval; returning previous job"
                );
                return Ok(last_job);
            }
        }
    }

    let job = db
        .create_sync_job(source.user_id, &source.provider, Some(source.id))
        .await?;

    let job_id = job.id;
    tokio::spawn(run_sync_job(db, provider, source, job_id));

    Ok(job)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::integration::SyncOutcome;
    use async_trait::async_trait;

    struct FixedOutcome(SyncOutcome);

    #[async_trait]
    impl IntegrationProvider for FixedOutcome {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn sync(&self, _db: &SqliteDatabase, _source: &DataSource) -> Result<SyncOutcome> {
            Ok(self.0.clone())
        }
    }

    fn init_env() {
        std::env::set_var("JWT_SECRET", "test-secret");
    }

    async fn setup() -> (Arc<SqliteDatabase>, DataSource) {
        init_env();
        let db = Arc::new(SqliteDatabase::in_memory().await.unwrap());
        db.seed_users(1).await.unwrap();
        let source = db
            .upsert_data_source(1, "fixed", "connected", None, None, None, None)
            .await
            .unwrap();
        (db, source)
    }

    #[tokio::test]
    async fn successful_run_stamps_source_and_job() {
        let (db, source) = setup().await;
        let provider = Arc::new(FixedOutcome(SyncOutcome::success(
            "Imported 3 days",
            serde_json::json!({"days": 3}),
        )));
        let job = db.create_sync_job(1, "fixed", Some(source.id)).await.unwrap();

        run_sync_job(db.clone(), provider, source.clone(), job.id).await;

        let done = db.get_sync_job(job.id).await.unwrap().unwrap();
        assert_eq!(done.status, "success");
        assert!(done.finished_at.is_some());

        let refreshed = db.get_data_source(source.id, 1).await.unwrap().unwrap();
        assert!(refreshed.last_synced_at.is_some());
        assert!(refreshed.last_error.is_none());
    }

    #[tokio::test]
    async fn failed_run_records_error_on_source() {
        let (db, source) = setup().await;
        let provider = Arc::new(FixedOutcome(SyncOutcome::failed("token expired")));
        let job = db.create_sync_job(1, "fixed", Some(source.id)).await.unwrap();

        run_sync_job(db.clone(), provider, source.clone(), job.id).await;

        let done = db.get_sync_job(job.id).await.unwrap().unwrap();
        assert_eq!(done.status, "failed");
        assert_eq!(done.message.as_deref(), Some("token expired"));

        let refreshed = db.get_data_source(source.id, 1).await.unwrap().unwrap();
        assert_eq!(refreshed.last_error.as_deref(), Some("token expired"));
    }

    #[tokio::test]
    async fn recent_sync_returns_previous_job() {
        let (db, source) = setup().await;
        let provider: Arc<dyn IntegrationProvider> =
            Arc::new(FixedOutcome(SyncOutcome::skipped("noop")));

        let previous = db.create_sync_job(1, "fixed", Some(source.id)).await.unwrap();
        db.touch_data_source_synced(source.id).await.unwrap();
        let fresh = db.get_data_source(source.id, 1).await.unwrap().unwrap();

        let job = request_sync(db.clone(), provider, fresh).await.unwrap();
        assert_eq!(job.id, previous.id);
    }
}
