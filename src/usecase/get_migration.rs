use std::sync::Arc;

use crate::domain::entity::migration_job::MigrationJob;
use crate::domain::repository::MigrationJobRepository;

/// GetMigrationUseCase はジョブ取得を担う。実行中でも状態と件数を参照できる。
pub struct GetMigrationUseCase {
    job_repo: Arc<dyn MigrationJobRepository>,
}

impl GetMigrationUseCase {
    pub fn new(job_repo: Arc<dyn MigrationJobRepository>) -> Self {
        Self { job_repo }
    }

    pub async fn execute(&self, job_id: &str) -> anyhow::Result<Option<MigrationJob>> {
        self.job_repo.find_by_job_id(job_id).await
    }
}
