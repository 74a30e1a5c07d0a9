use std::sync::Arc;

use tracing::info;

use crate::domain::entity::migration_job::JobStatus;
use crate::domain::repository::MigrationJobRepository;
use crate::infrastructure::pause_signal::ManualPauseRegistry;

/// PauseMigrationError は一時停止操作のエラーを型安全に表現する。
#[derive(Debug, thiserror::Error)]
pub enum PauseMigrationError {
    #[error("migration job not found: {0}")]
    NotFound(String),
    #[error("job is not running (status: {0})")]
    NotRunning(String),
    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

/// PauseMigrationUseCase は実行中ジョブへ協調的な一時停止を要求する。
/// 要求は処理中のバッチが完了し、チェックポイントが保存された後に反映される。
pub struct PauseMigrationUseCase {
    job_repo: Arc<dyn MigrationJobRepository>,
    manual_pause: Arc<ManualPauseRegistry>,
}

impl PauseMigrationUseCase {
    pub fn new(
        job_repo: Arc<dyn MigrationJobRepository>,
        manual_pause: Arc<ManualPauseRegistry>,
    ) -> Self {
        Self {
            job_repo,
            manual_pause,
        }
    }

    pub async fn execute(&self, job_id: &str) -> Result<(), PauseMigrationError> {
        let job = self
            .job_repo
            .find_by_job_id(job_id)
            .await?
            .ok_or_else(|| PauseMigrationError::NotFound(job_id.to_string()))?;

        if job.status != JobStatus::InProgress {
            return Err(PauseMigrationError::NotRunning(job.status.to_string()));
        }

        self.manual_pause.request(job_id).await;

        // 確認から要求登録までの間に終端・停止したジョブには要求を残さない
        let current = self.job_repo.find_by_job_id(job_id).await?;
        if let Some(status) = current
            .map(|j| j.status)
            .filter(|s| *s != JobStatus::InProgress)
        {
            self.manual_pause.clear(job_id).await;
            return Err(PauseMigrationError::NotRunning(status.to_string()));
        }

        info!(
            job_id = %job_id,
            checkpoint = job.checkpoint_position,
            "pause requested, will take effect after the current batch"
        );
        Ok(())
    }
}
