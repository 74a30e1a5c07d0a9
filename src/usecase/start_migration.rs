use std::sync::Arc;

use tracing::{error, info, warn};

use crate::domain::entity::migration_job::JobStatus;
use crate::domain::repository::MigrationJobRepository;
use crate::infrastructure::worker_pool::MigrationWorkerPool;
use crate::usecase::ExecuteMigrationUseCase;

/// StartMigrationError は開始操作のエラーを型安全に表現する。
#[derive(Debug, thiserror::Error)]
pub enum StartMigrationError {
    #[error("migration job not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

/// StartMigrationUseCase は PENDING のジョブの実行権を取得し、バックグラウンド実行を開始する。
pub struct StartMigrationUseCase {
    job_repo: Arc<dyn MigrationJobRepository>,
    execute_uc: Arc<ExecuteMigrationUseCase>,
    worker_pool: MigrationWorkerPool,
    node_id: String,
}

impl StartMigrationUseCase {
    pub fn new(
        job_repo: Arc<dyn MigrationJobRepository>,
        execute_uc: Arc<ExecuteMigrationUseCase>,
        worker_pool: MigrationWorkerPool,
        node_id: String,
    ) -> Self {
        Self {
            job_repo,
            execute_uc,
            worker_pool,
            node_id,
        }
    }

    /// ジョブを開始する。PENDING 以外のジョブに対しては警告を出して何もしない。
    /// 実行を開始した場合は true を返す。実行結果はジョブの状態として観測する。
    pub async fn execute(&self, job_id: &str) -> Result<bool, StartMigrationError> {
        let mut job = self
            .job_repo
            .find_by_job_id(job_id)
            .await?
            .ok_or_else(|| StartMigrationError::NotFound(job_id.to_string()))?;

        if job.status != JobStatus::Pending {
            warn!(job_id = %job_id, status = %job.status, "job is not pending, start ignored");
            return Ok(false);
        }

        let claimed = self
            .job_repo
            .claim(job_id, &[JobStatus::Pending], &JobStatus::Validating, &self.node_id)
            .await?;
        if !claimed {
            warn!(job_id = %job_id, "job was claimed by another execution, start ignored");
            return Ok(false);
        }

        job.begin_validation().map_err(anyhow::Error::from)?;
        job.processing_node = Some(self.node_id.clone());
        self.job_repo.update(&job).await?;

        info!(job_id = %job_id, node = %self.node_id, "migration started, launching background execution");

        let execute_uc = self.execute_uc.clone();
        let id = job_id.to_string();
        self.worker_pool.spawn(id.clone(), async move {
            if let Err(e) = execute_uc.run_initial(&id).await {
                error!(job_id = %id, error = %e, "migration execution failed");
            }
        });

        Ok(true)
    }
}
