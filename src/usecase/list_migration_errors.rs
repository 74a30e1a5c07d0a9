use std::sync::Arc;

use crate::domain::entity::migration_error::MigrationErrorRecord;
use crate::domain::repository::{ErrorRecordListParams, MigrationJobRepository};

/// ListMigrationErrorsUseCase はジョブのエラーレコード一覧取得を担う。
pub struct ListMigrationErrorsUseCase {
    job_repo: Arc<dyn MigrationJobRepository>,
}

impl ListMigrationErrorsUseCase {
    pub fn new(job_repo: Arc<dyn MigrationJobRepository>) -> Self {
        Self { job_repo }
    }

    /// エラーレコードをオフセット順に取得する。ジョブが存在しない場合は None を返す。
    pub async fn execute(
        &self,
        job_id: &str,
        params: ErrorRecordListParams,
    ) -> anyhow::Result<Option<(Vec<MigrationErrorRecord>, i64)>> {
        if self.job_repo.find_by_job_id(job_id).await?.is_none() {
            return Ok(None);
        }
        let page = self.job_repo.find_errors(job_id, &params).await?;
        Ok(Some(page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::migration_error::ErrorCategory;
    use crate::domain::repository::migration_job_repository::MockMigrationJobRepository;

    #[tokio::test]
    async fn test_list_errors_for_unknown_job() {
        let mut mock = MockMigrationJobRepository::new();
        mock.expect_find_by_job_id().returning(|_| Ok(None));
        mock.expect_find_errors().never();

        let uc = ListMigrationErrorsUseCase::new(Arc::new(mock));
        let result = uc
            .execute("MIG-NONE", ErrorRecordListParams::default())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_list_errors_passes_filters() {
        use crate::domain::entity::file_type::FileType;
        use crate::domain::entity::migration_job::{MigrationJob, NewMigrationJob};

        let job = MigrationJob::new(NewMigrationJob {
            original_file_name: "a.csv".to_string(),
            staged_file_path: "/staging/a.csv".to_string(),
            file_size: 1,
            file_checksum: None,
            file_type: FileType::DelimitedText,
            source_system: "legacy".to_string(),
            target_entity: "contract".to_string(),
            initiated_by: "user-1".to_string(),
            processing_node: None,
            import_config: "{}".to_string(),
            validation_rules: "{}".to_string(),
            batch_size: 10,
            max_retries: 3,
            rollback_window: chrono::Duration::days(30),
        });

        let mut mock = MockMigrationJobRepository::new();
        mock.expect_find_by_job_id()
            .returning(move |_| Ok(Some(job.clone())));
        mock.expect_find_errors()
            .withf(|_, p| p.category == Some(ErrorCategory::Validation) && p.resolved == Some(false))
            .returning(|_, _| Ok((vec![], 0)));

        let uc = ListMigrationErrorsUseCase::new(Arc::new(mock));
        let params = ErrorRecordListParams {
            category: Some(ErrorCategory::Validation),
            resolved: Some(false),
            page: 1,
            page_size: 50,
            ..Default::default()
        };
        let (errors, total) = uc.execute("MIG-1", params).await.unwrap().unwrap();
        assert!(errors.is_empty());
        assert_eq!(total, 0);
    }
}
