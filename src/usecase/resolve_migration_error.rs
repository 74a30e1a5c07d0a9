use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::domain::entity::migration_error::MigrationErrorRecord;
use crate::domain::repository::MigrationJobRepository;

/// ResolveMigrationErrorError はエラーレコード解決操作のエラーを型安全に表現する。
#[derive(Debug, thiserror::Error)]
pub enum ResolveMigrationErrorError {
    #[error("error record not found: {0}")]
    NotFound(Uuid),
    #[error("error record is already resolved: {0}")]
    AlreadyResolved(Uuid),
    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

/// ResolveMigrationErrorUseCase はエラーレコードを運用者が解決済みにする操作を担う。
/// エラーレコード自体は削除しない。
pub struct ResolveMigrationErrorUseCase {
    job_repo: Arc<dyn MigrationJobRepository>,
}

impl ResolveMigrationErrorUseCase {
    pub fn new(job_repo: Arc<dyn MigrationJobRepository>) -> Self {
        Self { job_repo }
    }

    pub async fn execute(
        &self,
        error_id: Uuid,
        resolved_by: String,
        notes: Option<String>,
    ) -> Result<MigrationErrorRecord, ResolveMigrationErrorError> {
        let mut record = self
            .job_repo
            .find_error_by_id(error_id)
            .await?
            .ok_or(ResolveMigrationErrorError::NotFound(error_id))?;

        if record.resolved {
            return Err(ResolveMigrationErrorError::AlreadyResolved(error_id));
        }

        record.resolve(resolved_by, notes);
        self.job_repo.update_error(&record).await?;

        info!(
            error_id = %error_id,
            job_id = %record.job_id,
            offset = record.record_offset,
            "error record resolved"
        );
        Ok(record)
    }
}
