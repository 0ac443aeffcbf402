//! `SQLite` implementation of the `JobRepository` trait.
//!
//! All status updates are single guarded UPDATE statements: the `WHERE`
//! clause encodes the admissible source states, so a stale writer affects
//! zero rows and is reported as an invalid transition instead of
//! clobbering a terminal record.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use cantus_core::domain::{Job, JobId, JobOutcome, JobStatus};
use cantus_core::error::RepositoryError;
use cantus_core::ports::{JobFilter, JobPage, JobRepository};

use super::row_mappers::{row_to_job, JOB_SELECT_COLUMNS};

/// Hard cap on `page_size`; larger requests are clamped.
const MAX_PAGE_SIZE: u32 = 100;

pub struct SqliteJobRepository {
    pool: SqlitePool,
}

impl SqliteJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn storage(e: sqlx::Error) -> RepositoryError {
        RepositoryError::Storage(e.to_string())
    }

    /// Distinguish "no such job" from "job exists but the transition is
    /// not admissible" after a guarded UPDATE touched zero rows.
    async fn explain_zero_rows(
        &self,
        id: &JobId,
        wanted: &str,
    ) -> RepositoryError {
        let status = sqlx::query_scalar::<_, String>("SELECT status FROM jobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await;
        match status {
            Ok(Some(current)) => RepositoryError::InvalidTransition(format!(
                "job {id}: {current} does not admit {wanted}"
            )),
            Ok(None) => RepositoryError::NotFound(format!("job {id}")),
            Err(e) => Self::storage(e),
        }
    }
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    async fn insert(&self, job: &Job) -> Result<(), RepositoryError> {
        let clone_request = job
            .clone_request
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepositoryError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"INSERT INTO jobs (
                id, kind, mode, text, source_language, target_language,
                voice_preset, voice_profile_id, quality_profile_id, clone_request,
                status, progress, artifact_path, voice_id, error_kind, error_message,
                created_at, started_at, completed_at, request_id, cancel_requested
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(job.id.to_string())
        .bind(job.kind.to_string())
        .bind(job.mode.map(|m| m.to_string()))
        .bind(&job.text)
        .bind(&job.source_language)
        .bind(&job.target_language)
        .bind(job.voice_preset.map(|p| p.to_string()))
        .bind(job.voice_profile_id.as_ref().map(ToString::to_string))
        .bind(&job.quality_profile_id)
        .bind(clone_request)
        .bind(job.status.to_string())
        .bind(job.progress)
        .bind(
            job.artifact_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
        )
        .bind(job.voice_id.as_ref().map(ToString::to_string))
        .bind(job.error_kind.map(|k| k.to_string()))
        .bind(&job.error_message)
        .bind(job.created_at.to_rfc3339())
        .bind(job.started_at.map(|t| t.to_rfc3339()))
        .bind(job.completed_at.map(|t| t.to_rfc3339()))
        .bind(&job.request_id)
        .bind(i64::from(job.cancel_requested))
        .execute(&self.pool)
        .await
        .map_err(Self::storage)?;

        Ok(())
    }

    async fn get(&self, id: &JobId) -> Result<Job, RepositoryError> {
        let query = format!("SELECT {JOB_SELECT_COLUMNS} FROM jobs WHERE id = ?");
        let row = sqlx::query(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::storage)?
            .ok_or_else(|| RepositoryError::NotFound(format!("job {id}")))?;

        row_to_job(&row)
    }

    async fn list(&self, filter: JobFilter) -> Result<JobPage, RepositoryError> {
        let page = filter.page.max(1);
        let page_size = filter.page_size.clamp(1, MAX_PAGE_SIZE);
        let offset = i64::from(page - 1) * i64::from(page_size);
        let status = filter.status.map(|s| s.to_string());

        let (total, rows) = if let Some(status) = &status {
            let total =
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM jobs WHERE status = ?")
                    .bind(status)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(Self::storage)?;
            let query = format!(
                "SELECT {JOB_SELECT_COLUMNS} FROM jobs WHERE status = ? \
                 ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
            );
            let rows = sqlx::query(&query)
                .bind(status)
                .bind(i64::from(page_size))
                .bind(offset)
                .fetch_all(&self.pool)
                .await
                .map_err(Self::storage)?;
            (total, rows)
        } else {
            let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM jobs")
                .fetch_one(&self.pool)
                .await
                .map_err(Self::storage)?;
            let query = format!(
                "SELECT {JOB_SELECT_COLUMNS} FROM jobs \
                 ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
            );
            let rows = sqlx::query(&query)
                .bind(i64::from(page_size))
                .bind(offset)
                .fetch_all(&self.pool)
                .await
                .map_err(Self::storage)?;
            (total, rows)
        };

        let items = rows.iter().map(row_to_job).collect::<Result<Vec<_>, _>>()?;

        Ok(JobPage {
            items,
            page,
            page_size,
            total: u64::try_from(total).unwrap_or(0),
        })
    }

    async fn delete(&self, id: &JobId) -> Result<Option<Job>, RepositoryError> {
        let job = match self.get(id).await {
            Ok(job) => job,
            Err(RepositoryError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let result = sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(Self::storage)?;

        Ok((result.rows_affected() > 0).then_some(job))
    }

    async fn mark_processing(&self, id: &JobId) -> Result<Job, RepositoryError> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'processing', started_at = ?, progress = 0 \
             WHERE id = ? AND status = 'queued'",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(Self::storage)?;

        if result.rows_affected() == 0 {
            return Err(self.explain_zero_rows(id, "processing").await);
        }
        self.get(id).await
    }

    async fn set_progress(&self, id: &JobId, progress: f64) -> Result<(), RepositoryError> {
        let clamped = progress.clamp(0.0, 1.0);
        // MAX() keeps the stored value monotonic even with a late writer.
        let result = sqlx::query(
            "UPDATE jobs SET progress = MAX(progress, ?) \
             WHERE id = ? AND status = 'processing'",
        )
        .bind(clamped)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(Self::storage)?;

        if result.rows_affected() == 0 {
            return Err(self.explain_zero_rows(id, "progress update").await);
        }
        Ok(())
    }

    async fn finish(&self, id: &JobId, outcome: &JobOutcome) -> Result<(), RepositoryError> {
        let now = Utc::now().to_rfc3339();
        let result = match outcome {
            JobOutcome::Completed { artifact_path } => sqlx::query(
                "UPDATE jobs SET status = 'completed', progress = 1.0, artifact_path = ?, \
                 completed_at = ? WHERE id = ? AND status = 'processing'",
            )
            .bind(artifact_path.to_string_lossy().into_owned())
            .bind(&now)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(Self::storage)?,

            JobOutcome::CompletedClone { voice_id } => sqlx::query(
                "UPDATE jobs SET status = 'completed', progress = 1.0, voice_id = ?, \
                 completed_at = ? WHERE id = ? AND status = 'processing'",
            )
            .bind(voice_id.to_string())
            .bind(&now)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(Self::storage)?,

            // queued → failed is admissible (validation at dequeue time).
            JobOutcome::Failed { kind, message } => sqlx::query(
                "UPDATE jobs SET status = 'failed', error_kind = ?, error_message = ?, \
                 completed_at = ? WHERE id = ? AND status IN ('queued', 'processing')",
            )
            .bind(kind.to_string())
            .bind(message)
            .bind(&now)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(Self::storage)?,
        };

        if result.rows_affected() == 0 {
            return Err(self.explain_zero_rows(id, "terminal outcome").await);
        }
        Ok(())
    }

    async fn requeue_interrupted(&self, id: &JobId) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'queued', started_at = NULL, progress = 0 \
             WHERE id = ? AND status = 'processing'",
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(Self::storage)?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        // Not processing (raced to terminal, or already queued): leave
        // the record as it is. Unknown id: not found.
        match self.get(id).await {
            Ok(_) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn request_cancel(&self, id: &JobId) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE jobs SET cancel_requested = 1 \
             WHERE id = ? AND status IN ('queued', 'processing')",
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(Self::storage)?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        // Terminal job: nothing to cancel. Unknown id: not found.
        match self.get(id).await {
            Ok(_) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn cancel_requested(&self, id: &JobId) -> Result<bool, RepositoryError> {
        sqlx::query_scalar::<_, i64>("SELECT cancel_requested FROM jobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::storage)?
            .map(|flag| flag != 0)
            .ok_or_else(|| RepositoryError::NotFound(format!("job {id}")))
    }

    async fn ids_by_status(&self, status: JobStatus) -> Result<Vec<JobId>, RepositoryError> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT id FROM jobs WHERE status = ? ORDER BY created_at ASC",
        )
        .bind(status.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(Self::storage)?;

        ids.iter()
            .map(|raw| {
                JobId::parse(raw).map_err(|e| RepositoryError::Serialization(e.to_string()))
            })
            .collect()
    }

    async fn recover_orphans(&self, grace: Duration) -> Result<Vec<JobId>, RepositoryError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(grace)
                .map_err(|e| RepositoryError::Storage(e.to_string()))?;

        let orphans = sqlx::query_scalar::<_, String>(
            "SELECT id FROM jobs WHERE status = 'processing' \
             AND (started_at IS NULL OR started_at < ?)",
        )
        .bind(cutoff.to_rfc3339())
        .fetch_all(&self.pool)
        .await
        .map_err(Self::storage)?;

        let now = Utc::now().to_rfc3339();
        let mut recovered = Vec::with_capacity(orphans.len());
        for raw in orphans {
            let result = sqlx::query(
                "UPDATE jobs SET status = 'failed', error_kind = 'abandoned', \
                 error_message = 'job was in flight when the service restarted', \
                 completed_at = ? WHERE id = ? AND status = 'processing'",
            )
            .bind(&now)
            .bind(&raw)
            .execute(&self.pool)
            .await
            .map_err(Self::storage)?;
            if result.rows_affected() > 0 {
                tracing::warn!(job_id = %raw, "recovered orphaned job as abandoned");
                recovered.push(
                    JobId::parse(&raw)
                        .map_err(|e| RepositoryError::Serialization(e.to_string()))?,
                );
            }
        }
        Ok(recovered)
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| ())
            .map_err(Self::storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::setup_test_database;
    use cantus_core::domain::{JobMode, SynthesisCommand, VoicePreset};
    use cantus_core::error::ErrorKind;

    fn sample_job() -> Job {
        Job::new_synthesis(
            SynthesisCommand {
                mode: JobMode::Preset,
                text: "One small step.".to_string(),
                source_language: "en".to_string(),
                target_language: "en".to_string(),
                voice_preset: Some(VoicePreset::MaleDeep),
                voice_profile_id: None,
                quality_profile_id: None,
            },
            "req-test".to_string(),
        )
    }

    async fn repo() -> SqliteJobRepository {
        SqliteJobRepository::new(setup_test_database().await.unwrap())
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let repo = repo().await;
        let job = sample_job();
        repo.insert(&job).await.unwrap();

        let loaded = repo.get(&job.id).await.unwrap();
        assert_eq!(loaded.id, job.id);
        assert_eq!(loaded.status, JobStatus::Queued);
        assert_eq!(loaded.text.as_deref(), Some("One small step."));
        assert_eq!(loaded.voice_preset, Some(VoicePreset::MaleDeep));
        assert_eq!(loaded.request_id, "req-test");
    }

    #[tokio::test]
    async fn get_unknown_is_not_found() {
        let repo = repo().await;
        let err = repo.get(&JobId::new()).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn lifecycle_queued_processing_completed() {
        let repo = repo().await;
        let job = sample_job();
        repo.insert(&job).await.unwrap();

        let processing = repo.mark_processing(&job.id).await.unwrap();
        assert_eq!(processing.status, JobStatus::Processing);
        assert!(processing.started_at.is_some());

        repo.set_progress(&job.id, 0.4).await.unwrap();
        repo.finish(
            &job.id,
            &JobOutcome::Completed {
                artifact_path: "/tmp/a.pcm24k".into(),
            },
        )
        .await
        .unwrap();

        let done = repo.get(&job.id).await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.progress, 1.0);
        assert!(done.completed_at.is_some());
        assert!(done.artifact_path.is_some());
    }

    #[tokio::test]
    async fn progress_is_monotonic() {
        let repo = repo().await;
        let job = sample_job();
        repo.insert(&job).await.unwrap();
        repo.mark_processing(&job.id).await.unwrap();

        repo.set_progress(&job.id, 0.6).await.unwrap();
        repo.set_progress(&job.id, 0.2).await.unwrap();

        let loaded = repo.get(&job.id).await.unwrap();
        assert_eq!(loaded.progress, 0.6);
    }

    #[tokio::test]
    async fn no_transition_out_of_terminal() {
        let repo = repo().await;
        let job = sample_job();
        repo.insert(&job).await.unwrap();
        repo.mark_processing(&job.id).await.unwrap();
        repo.finish(
            &job.id,
            &JobOutcome::Failed {
                kind: ErrorKind::Internal,
                message: "boom".to_string(),
            },
        )
        .await
        .unwrap();

        let err = repo.mark_processing(&job.id).await.unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidTransition(_)));

        // A second terminal outcome is also rejected, so a redelivered
        // broker task cannot rewrite history.
        let err = repo
            .finish(
                &job.id,
                &JobOutcome::Completed {
                    artifact_path: "/tmp/b.pcm24k".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn queued_to_failed_is_admissible() {
        let repo = repo().await;
        let job = sample_job();
        repo.insert(&job).await.unwrap();

        repo.finish(
            &job.id,
            &JobOutcome::Failed {
                kind: ErrorKind::ValidationError,
                message: "stale reference".to_string(),
            },
        )
        .await
        .unwrap();

        let loaded = repo.get(&job.id).await.unwrap();
        assert_eq!(loaded.status, JobStatus::Failed);
        assert_eq!(loaded.error_kind, Some(ErrorKind::ValidationError));
    }

    #[tokio::test]
    async fn cancel_tombstone() {
        let repo = repo().await;
        let job = sample_job();
        repo.insert(&job).await.unwrap();
        repo.mark_processing(&job.id).await.unwrap();

        assert!(repo.request_cancel(&job.id).await.unwrap());
        assert!(repo.cancel_requested(&job.id).await.unwrap());

        repo.finish(
            &job.id,
            &JobOutcome::Failed {
                kind: ErrorKind::Cancelled,
                message: "cancelled by client".to_string(),
            },
        )
        .await
        .unwrap();

        // Tombstoning a terminal job is a no-op.
        assert!(!repo.request_cancel(&job.id).await.unwrap());
    }

    #[tokio::test]
    async fn requeue_interrupted_returns_processing_to_queued() {
        let repo = repo().await;
        let job = sample_job();
        repo.insert(&job).await.unwrap();
        repo.mark_processing(&job.id).await.unwrap();
        repo.set_progress(&job.id, 0.5).await.unwrap();

        assert!(repo.requeue_interrupted(&job.id).await.unwrap());
        let loaded = repo.get(&job.id).await.unwrap();
        assert_eq!(loaded.status, JobStatus::Queued);
        assert_eq!(loaded.progress, 0.0);
        assert!(loaded.started_at.is_none());

        // Only processing rows are eligible; the requeued job can be
        // picked up again.
        assert!(!repo.requeue_interrupted(&job.id).await.unwrap());
        repo.mark_processing(&job.id).await.unwrap();
        repo.finish(
            &job.id,
            &JobOutcome::Completed {
                artifact_path: "/tmp/a.pcm24k".into(),
            },
        )
        .await
        .unwrap();
        assert!(!repo.requeue_interrupted(&job.id).await.unwrap());

        let err = repo.requeue_interrupted(&JobId::new()).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let repo = repo().await;
        let job = sample_job();
        repo.insert(&job).await.unwrap();

        assert!(repo.delete(&job.id).await.unwrap().is_some());
        assert!(repo.delete(&job.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_paginates_and_filters() {
        let repo = repo().await;
        for _ in 0..5 {
            repo.insert(&sample_job()).await.unwrap();
        }
        let extra = sample_job();
        repo.insert(&extra).await.unwrap();
        repo.mark_processing(&extra.id).await.unwrap();

        let page = repo
            .list(JobFilter {
                status: None,
                page: 1,
                page_size: 4,
            })
            .await
            .unwrap();
        assert_eq!(page.items.len(), 4);
        assert_eq!(page.total, 6);

        let processing = repo
            .list(JobFilter {
                status: Some(JobStatus::Processing),
                page: 1,
                page_size: 10,
            })
            .await
            .unwrap();
        assert_eq!(processing.items.len(), 1);
        assert_eq!(processing.items[0].id, extra.id);
    }

    #[tokio::test]
    async fn orphan_recovery_marks_abandoned() {
        let repo = repo().await;
        let job = sample_job();
        repo.insert(&job).await.unwrap();
        repo.mark_processing(&job.id).await.unwrap();

        // Zero grace: everything processing is an orphan.
        let recovered = repo.recover_orphans(Duration::ZERO).await.unwrap();
        assert_eq!(recovered, vec![job.id.clone()]);

        let loaded = repo.get(&job.id).await.unwrap();
        assert_eq!(loaded.status, JobStatus::Failed);
        assert_eq!(loaded.error_kind, Some(ErrorKind::Abandoned));
    }
}
