use std::sync::Arc;

use crate::domain::entity::migration_job::MigrationJob;
use crate::domain::repository::{MigrationJobListParams, MigrationJobRepository};

/// ListMigrationsUseCase はジョブ一覧取得を担う。
pub struct ListMigrationsUseCase {
    job_repo: Arc<dyn MigrationJobRepository>,
}

impl ListMigrationsUseCase {
    pub fn new(job_repo: Arc<dyn MigrationJobRepository>) -> Self {
        Self { job_repo }
    }

    /// パラメータに基づいてジョブ一覧と総件数を取得する。
    pub async fn execute(
        &self,
        params: MigrationJobListParams,
    ) -> anyhow::Result<(Vec<MigrationJob>, i64)> {
        self.job_repo.list(&params).await
    }
}
