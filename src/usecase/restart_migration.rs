use std::sync::Arc;

use tracing::{error, info};

use crate::domain::entity::migration_job::JobStatus;
use crate::domain::repository::MigrationJobRepository;
use crate::infrastructure::file_stage::FileStageManager;
use crate::infrastructure::worker_pool::MigrationWorkerPool;
use crate::usecase::ExecuteMigrationUseCase;

/// RestartMigrationError は再開操作のエラーを型安全に表現する。
#[derive(Debug, thiserror::Error)]
pub enum RestartMigrationError {
    #[error("migration job not found: {0}")]
    NotFound(String),
    #[error("job is not resumable (status: {status}, checkpoint: {checkpoint})")]
    NotResumable { status: String, checkpoint: i64 },
    #[error("staged file is missing: {0}")]
    StagedFileMissing(String),
    #[error("job is already being executed: {0}")]
    Conflict(String),
    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

/// RestartMigrationUseCase は PAUSED/FAILED のジョブを最後のチェックポイントから再開する。
pub struct RestartMigrationUseCase {
    job_repo: Arc<dyn MigrationJobRepository>,
    file_stage: Arc<dyn FileStageManager>,
    execute_uc: Arc<ExecuteMigrationUseCase>,
    worker_pool: MigrationWorkerPool,
    node_id: String,
}

impl RestartMigrationUseCase {
    pub fn new(
        job_repo: Arc<dyn MigrationJobRepository>,
        file_stage: Arc<dyn FileStageManager>,
        execute_uc: Arc<ExecuteMigrationUseCase>,
        worker_pool: MigrationWorkerPool,
        node_id: String,
    ) -> Self {
        Self {
            job_repo,
            file_stage,
            execute_uc,
            worker_pool,
            node_id,
        }
    }

    /// ジョブを再開する。再開不可の場合は即座にエラーを返す。
    pub async fn execute(&self, job_id: &str) -> Result<(), RestartMigrationError> {
        let mut job = self
            .job_repo
            .find_by_job_id(job_id)
            .await?
            .ok_or_else(|| RestartMigrationError::NotFound(job_id.to_string()))?;

        if !job.is_resumable() {
            return Err(RestartMigrationError::NotResumable {
                status: job.status.to_string(),
                checkpoint: job.checkpoint_position,
            });
        }
        if !self.file_stage.exists(&job.staged_file_path).await? {
            return Err(RestartMigrationError::StagedFileMissing(
                job.staged_file_path.clone(),
            ));
        }

        let claimed = self
            .job_repo
            .claim(
                job_id,
                &[JobStatus::Paused, JobStatus::Failed],
                &JobStatus::InProgress,
                &self.node_id,
            )
            .await?;
        if !claimed {
            return Err(RestartMigrationError::Conflict(job_id.to_string()));
        }

        job.resume().map_err(anyhow::Error::from)?;
        job.processing_node = Some(self.node_id.clone());
        self.job_repo.update(&job).await?;

        info!(
            job_id = %job_id,
            checkpoint = job.checkpoint_position,
            node = %self.node_id,
            "migration restarted, launching background execution"
        );

        let execute_uc = self.execute_uc.clone();
        let id = job_id.to_string();
        self.worker_pool.spawn(id.clone(), async move {
            if let Err(e) = execute_uc.resume_processing(&id).await {
                error!(job_id = %id, error = %e, "migration restart failed");
            }
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::domain::entity::file_type::FileType;
    use crate::domain::entity::migration_job::{MigrationJob, NewMigrationJob};
    use crate::domain::repository::migration_job_repository::MockMigrationJobRepository;
    use crate::infrastructure::file_stage::MockFileStageManager;
    use crate::infrastructure::metrics::NoopMigrationMetrics;
    use crate::infrastructure::pause_signal::MockPauseSignal;
    use crate::infrastructure::record_processor::RecordProcessorRegistry;

    fn make_paused_job() -> MigrationJob {
        let mut job = MigrationJob::new(NewMigrationJob {
            original_file_name: "contracts.csv".to_string(),
            staged_file_path: "/staging/contracts.csv".to_string(),
            file_size: 100,
            file_checksum: None,
            file_type: FileType::DelimitedText,
            source_system: "legacy-core".to_string(),
            target_entity: "contract".to_string(),
            initiated_by: "user-1".to_string(),
            processing_node: None,
            import_config: "{}".to_string(),
            validation_rules: "{}".to_string(),
            batch_size: 4,
            max_retries: 3,
            rollback_window: chrono::Duration::days(30),
        });
        job.begin_validation().unwrap();
        job.begin_processing(10).unwrap();
        job.apply_batch(4, 4, 0);
        job.record_retry();
        job.pause().unwrap();
        job
    }

    fn make_uc(
        repo: MockMigrationJobRepository,
        stage: MockFileStageManager,
    ) -> RestartMigrationUseCase {
        let mut exec_repo = MockMigrationJobRepository::new();
        exec_repo.expect_find_by_job_id().returning(|_| Ok(None));
        let execute_uc = Arc::new(ExecuteMigrationUseCase::new(
            Arc::new(exec_repo),
            Arc::new(RecordProcessorRegistry::new()),
            Arc::new(MockFileStageManager::new()),
            Arc::new(MockPauseSignal::new()),
            Arc::new(NoopMigrationMetrics),
            Duration::from_millis(1),
        ));
        RestartMigrationUseCase::new(
            Arc::new(repo),
            Arc::new(stage),
            execute_uc,
            MigrationWorkerPool::new(1),
            "node-b".to_string(),
        )
    }

    fn existing_file() -> MockFileStageManager {
        let mut stage = MockFileStageManager::new();
        stage.expect_exists().returning(|_| Ok(true));
        stage
    }

    #[tokio::test]
    async fn test_restart_paused_job() {
        let job = make_paused_job();
        let job_id = job.job_id.clone();

        let mut repo = MockMigrationJobRepository::new();
        repo.expect_find_by_job_id()
            .returning(move |_| Ok(Some(job.clone())));
        repo.expect_claim().times(1).returning(|_, _, _, _| Ok(true));
        repo.expect_update()
            .withf(|j| {
                j.status == JobStatus::InProgress
                    && j.retry_count == 0
                    && j.checkpoint_position == 4
                    && j.processing_node.as_deref() == Some("node-b")
            })
            .times(1)
            .returning(|_| Ok(()));

        let uc = make_uc(repo, existing_file());
        assert!(uc.execute(&job_id).await.is_ok());
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_restart_completed_job_is_rejected() {
        let mut job = make_paused_job();
        job.resume().unwrap();
        job.apply_batch(6, 6, 0);
        job.finalize();
        let job_id = job.job_id.clone();

        let mut repo = MockMigrationJobRepository::new();
        repo.expect_find_by_job_id()
            .returning(move |_| Ok(Some(job.clone())));

        let uc = make_uc(repo, MockFileStageManager::new());
        let result = uc.execute(&job_id).await;
        assert!(matches!(
            result,
            Err(RestartMigrationError::NotResumable { .. })
        ));
    }

    #[tokio::test]
    async fn test_restart_with_missing_file() {
        let job = make_paused_job();
        let job_id = job.job_id.clone();

        let mut repo = MockMigrationJobRepository::new();
        repo.expect_find_by_job_id()
            .returning(move |_| Ok(Some(job.clone())));
        let mut stage = MockFileStageManager::new();
        stage.expect_exists().returning(|_| Ok(false));

        let uc = make_uc(repo, stage);
        let result = uc.execute(&job_id).await;
        assert!(matches!(
            result,
            Err(RestartMigrationError::StagedFileMissing(_))
        ));
    }

    #[tokio::test]
    async fn test_restart_conflict_when_claim_lost() {
        let job = make_paused_job();
        let job_id = job.job_id.clone();

        let mut repo = MockMigrationJobRepository::new();
        repo.expect_find_by_job_id()
            .returning(move |_| Ok(Some(job.clone())));
        repo.expect_claim().returning(|_, _, _, _| Ok(false));

        let uc = make_uc(repo, existing_file());
        let result = uc.execute(&job_id).await;
        assert!(matches!(result, Err(RestartMigrationError::Conflict(_))));
    }
}
