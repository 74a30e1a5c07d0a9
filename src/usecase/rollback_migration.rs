use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};

use crate::domain::entity::migration_job::{JobStateError, JobStatus, MigrationJob};
use crate::domain::repository::MigrationJobRepository;
use crate::infrastructure::metrics::MigrationMetrics;
use crate::infrastructure::record_processor::RecordProcessorRegistry;

/// RollbackMigrationError はロールバック操作のエラーを型安全に表現する。
#[derive(Debug, thiserror::Error)]
pub enum RollbackMigrationError {
    #[error("migration job not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    NotEligible(#[from] JobStateError),
    #[error("job is already being executed: {0}")]
    Conflict(String),
    #[error("compensation failed: {0}")]
    CompensationFailed(String),
    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

/// RollbackMigrationUseCase は完了済みジョブが書き込んだ内容を補償処理で取り消す。
/// ロールバックは一度きりで、成否にかかわらず資格は復元されない。
pub struct RollbackMigrationUseCase {
    job_repo: Arc<dyn MigrationJobRepository>,
    processors: Arc<RecordProcessorRegistry>,
    metrics: Arc<dyn MigrationMetrics>,
    node_id: String,
}

impl RollbackMigrationUseCase {
    pub fn new(
        job_repo: Arc<dyn MigrationJobRepository>,
        processors: Arc<RecordProcessorRegistry>,
        metrics: Arc<dyn MigrationMetrics>,
        node_id: String,
    ) -> Self {
        Self {
            job_repo,
            processors,
            metrics,
            node_id,
        }
    }

    /// ロールバックを実行し、最終状態のジョブを返す。
    pub async fn execute(
        &self,
        job_id: &str,
        reason: String,
        actor: String,
    ) -> Result<MigrationJob, RollbackMigrationError> {
        let mut job = self
            .job_repo
            .find_by_job_id(job_id)
            .await?
            .ok_or_else(|| RollbackMigrationError::NotFound(job_id.to_string()))?;

        let now = Utc::now();
        job.check_rollback_eligibility(now)?;
        let processor = self.processors.resolve(&job.target_entity)?;

        let claimed = self
            .job_repo
            .claim(
                job_id,
                &[JobStatus::Completed, JobStatus::CompletedWithErrors],
                &JobStatus::RollbackInProgress,
                &self.node_id,
            )
            .await?;
        if !claimed {
            return Err(RollbackMigrationError::Conflict(job_id.to_string()));
        }

        job.begin_rollback(now, reason, actor)?;
        job.processing_node = Some(self.node_id.clone());
        self.job_repo.update(&job).await?;
        info!(
            job_id = %job_id,
            actor = ?job.rolled_back_by,
            reason = ?job.rollback_reason,
            "rollback started"
        );

        match processor.compensate(&job).await {
            Ok(()) => {
                job.complete_rollback()?;
                self.job_repo.update(&job).await?;
                self.metrics
                    .record_rollback(&job.target_entity, &job.status.to_string());
                info!(job_id = %job_id, "rollback completed");
                Ok(job)
            }
            Err(e) => {
                let message = format!("compensation failed: {e:#}");
                job.fail_rollback(message);
                self.job_repo.update(&job).await?;
                self.metrics
                    .record_rollback(&job.target_entity, &job.status.to_string());
                error!(job_id = %job_id, error = %e, "rollback failed");
                Err(RollbackMigrationError::CompensationFailed(format!("{e:#}")))
            }
        }
    }
}
