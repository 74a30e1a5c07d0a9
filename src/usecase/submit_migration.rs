use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::domain::entity::file_type::FileType;
use crate::domain::entity::migration_job::{MigrationJob, NewMigrationJob};
use crate::domain::repository::MigrationJobRepository;
use crate::infrastructure::config::MigrationConfig;
use crate::infrastructure::file_stage::FileStageManager;
use crate::infrastructure::metrics::MigrationMetrics;
use crate::infrastructure::record_processor::RecordProcessorRegistry;
use crate::infrastructure::validation_rules::ValidationRuleProvider;

/// ファイル形式推定に使う先頭バイト数。
const DETECTION_HEAD_BYTES: usize = 8192;

/// SubmitMigrationInput は取り込みファイルの登録要求。
#[derive(Debug, Clone, Default)]
pub struct SubmitMigrationInput {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    pub source_system: String,
    pub target_entity: String,
    pub initiated_by: String,
    /// Record Processor へ渡す自由形式の設定。`batch_size` と `max_retries` はエンジンも参照する。
    pub config: HashMap<String, serde_json::Value>,
}

/// SubmitMigrationError は登録操作のエラーを型安全に表現する。
#[derive(Debug, thiserror::Error)]
pub enum SubmitMigrationError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("no record processor for target entity: {0}")]
    UnsupportedTarget(String),
    #[error("failed to stage file: {0}")]
    Staging(#[source] anyhow::Error),
    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

/// SubmitMigrationUseCase はファイルをステージングし、PENDING のジョブを作成する。
pub struct SubmitMigrationUseCase {
    job_repo: Arc<dyn MigrationJobRepository>,
    file_stage: Arc<dyn FileStageManager>,
    processors: Arc<RecordProcessorRegistry>,
    rule_provider: Arc<dyn ValidationRuleProvider>,
    metrics: Arc<dyn MigrationMetrics>,
    config: MigrationConfig,
}

impl SubmitMigrationUseCase {
    pub fn new(
        job_repo: Arc<dyn MigrationJobRepository>,
        file_stage: Arc<dyn FileStageManager>,
        processors: Arc<RecordProcessorRegistry>,
        rule_provider: Arc<dyn ValidationRuleProvider>,
        metrics: Arc<dyn MigrationMetrics>,
        config: MigrationConfig,
    ) -> Self {
        Self {
            job_repo,
            file_stage,
            processors,
            rule_provider,
            metrics,
            config,
        }
    }

    /// ファイルを登録する。ファイル内容の検証は start まで行わない。
    pub async fn execute(
        &self,
        input: SubmitMigrationInput,
    ) -> Result<MigrationJob, SubmitMigrationError> {
        if input.file_name.trim().is_empty() {
            return Err(SubmitMigrationError::InvalidInput(
                "file name is required".to_string(),
            ));
        }
        if input.bytes.is_empty() {
            return Err(SubmitMigrationError::InvalidInput(
                "file is empty".to_string(),
            ));
        }
        if input.source_system.trim().is_empty() || input.initiated_by.trim().is_empty() {
            return Err(SubmitMigrationError::InvalidInput(
                "source system and initiator are required".to_string(),
            ));
        }
        if !self.processors.supports(&input.target_entity) {
            return Err(SubmitMigrationError::UnsupportedTarget(input.target_entity));
        }

        let head = &input.bytes[..input.bytes.len().min(DETECTION_HEAD_BYTES)];
        let file_type = FileType::detect(&input.file_name, input.content_type.as_deref(), head);

        let staged = self
            .file_stage
            .stage(&input.file_name, &input.bytes)
            .await
            .map_err(SubmitMigrationError::Staging)?;

        let batch_size = self.batch_size_for(&input.config);
        let max_retries = self.max_retries_for(&input.config);
        let import_config = serde_json::to_string(&input.config).map_err(anyhow::Error::from)?;
        let validation_rules = self
            .rule_provider
            .default_rules(&input.target_entity)
            .to_string();

        let job = MigrationJob::new(NewMigrationJob {
            original_file_name: input.file_name,
            staged_file_path: staged.path,
            file_size: staged.size,
            file_checksum: Some(staged.checksum_sha256),
            file_type,
            source_system: input.source_system,
            target_entity: input.target_entity,
            initiated_by: input.initiated_by,
            processing_node: Some(self.config.node_id.clone()),
            import_config,
            validation_rules,
            batch_size,
            max_retries,
            rollback_window: self.config.rollback_window(),
        });
        self.job_repo.create(&job).await?;
        self.metrics.record_job_submitted(&job.target_entity);

        info!(
            job_id = %job.job_id,
            file_name = %job.original_file_name,
            file_type = %job.file_type,
            target_entity = %job.target_entity,
            batch_size = job.batch_size,
            "migration job submitted"
        );
        Ok(job)
    }

    /// 設定マップの batch_size を [1, max_batch_size] に収めて返す。
    fn batch_size_for(&self, config: &HashMap<String, serde_json::Value>) -> i32 {
        let max = i64::from(self.config.max_batch_size.max(1));
        let requested = config
            .get("batch_size")
            .and_then(serde_json::Value::as_i64)
            .unwrap_or_else(|| i64::from(self.config.default_batch_size));
        i32::try_from(requested.clamp(1, max)).unwrap_or(self.config.default_batch_size)
    }

    fn max_retries_for(&self, config: &HashMap<String, serde_json::Value>) -> i32 {
        config
            .get("max_retries")
            .and_then(serde_json::Value::as_i64)
            .and_then(|n| i32::try_from(n).ok())
            .map_or(self.config.max_retries, |n| n.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::migration_job::JobStatus;
    use crate::domain::repository::migration_job_repository::MockMigrationJobRepository;
    use crate::infrastructure::file_stage::{MockFileStageManager, StagedFile};
    use crate::infrastructure::metrics::NoopMigrationMetrics;
    use crate::infrastructure::record_processor::MockRecordProcessor;
    use crate::infrastructure::validation_rules::MockValidationRuleProvider;

    fn make_input() -> SubmitMigrationInput {
        SubmitMigrationInput {
            file_name: "contracts.csv".to_string(),
            content_type: Some("text/csv".to_string()),
            bytes: b"policy_no,start\nP1,2024-01-01\n".to_vec(),
            source_system: "legacy-core".to_string(),
            target_entity: "contract".to_string(),
            initiated_by: "user-1".to_string(),
            config: HashMap::new(),
        }
    }

    fn staging_mock() -> MockFileStageManager {
        let mut stage = MockFileStageManager::new();
        stage.expect_stage().returning(|name, bytes| {
            Ok(StagedFile {
                path: format!("/staging/x-{name}"),
                size: i64::try_from(bytes.len()).unwrap(),
                checksum_sha256: "ab".repeat(32),
            })
        });
        stage
    }

    fn rules_mock() -> MockValidationRuleProvider {
        let mut rules = MockValidationRuleProvider::new();
        rules
            .expect_default_rules()
            .returning(|_| serde_json::json!({"required": ["policy_no"]}));
        rules
    }

    fn make_uc(
        repo: MockMigrationJobRepository,
        stage: MockFileStageManager,
    ) -> SubmitMigrationUseCase {
        let registry =
            RecordProcessorRegistry::new().register("contract", Arc::new(MockRecordProcessor::new()));
        let config = MigrationConfig {
            node_id: "node-a".to_string(),
            max_batch_size: 500,
            ..MigrationConfig::default()
        };
        SubmitMigrationUseCase::new(
            Arc::new(repo),
            Arc::new(stage),
            Arc::new(registry),
            Arc::new(rules_mock()),
            Arc::new(NoopMigrationMetrics),
            config,
        )
    }

    #[tokio::test]
    async fn test_submit_creates_pending_job() {
        let mut repo = MockMigrationJobRepository::new();
        repo.expect_create()
            .withf(|j| j.status == JobStatus::Pending)
            .times(1)
            .returning(|_| Ok(()));

        let uc = make_uc(repo, staging_mock());
        let job = uc.execute(make_input()).await.unwrap();

        assert!(job.job_id.starts_with("MIG-"));
        assert_eq!(job.file_type, FileType::DelimitedText);
        assert_eq!(job.staged_file_path, "/staging/x-contracts.csv");
        assert_eq!(job.file_checksum.as_deref().map(str::len), Some(64));
        assert_eq!(job.processing_node.as_deref(), Some("node-a"));
        assert_eq!(job.batch_size, 500);
        assert_eq!(job.max_retries, 3);
        assert_eq!(job.validation_rules, r#"{"required":["policy_no"]}"#);
        assert_eq!(
            job.rollback_deadline - job.audit.created_at,
            chrono::Duration::days(30)
        );
    }

    #[tokio::test]
    async fn test_submit_applies_config_overrides_with_clamp() {
        let mut repo = MockMigrationJobRepository::new();
        repo.expect_create().returning(|_| Ok(()));

        let uc = make_uc(repo, staging_mock());
        let mut input = make_input();
        input
            .config
            .insert("batch_size".to_string(), serde_json::json!(100_000));
        input
            .config
            .insert("max_retries".to_string(), serde_json::json!(5));
        let job = uc.execute(input).await.unwrap();
        assert_eq!(job.batch_size, 500);
        assert_eq!(job.max_retries, 5);
        assert!(job.import_config.contains("\"batch_size\":100000"));

        let mut repo = MockMigrationJobRepository::new();
        repo.expect_create().returning(|_| Ok(()));
        let uc = make_uc(repo, staging_mock());
        let mut input = make_input();
        input
            .config
            .insert("batch_size".to_string(), serde_json::json!(0));
        assert_eq!(uc.execute(input).await.unwrap().batch_size, 1);
    }

    #[tokio::test]
    async fn test_submit_unsupported_target() {
        let uc = make_uc(MockMigrationJobRepository::new(), MockFileStageManager::new());
        let mut input = make_input();
        input.target_entity = "agent".to_string();
        let result = uc.execute(input).await;
        assert!(matches!(result, Err(SubmitMigrationError::UnsupportedTarget(_))));
    }

    #[tokio::test]
    async fn test_submit_empty_file_is_rejected() {
        let uc = make_uc(MockMigrationJobRepository::new(), MockFileStageManager::new());
        let mut input = make_input();
        input.bytes.clear();
        let result = uc.execute(input).await;
        assert!(matches!(result, Err(SubmitMigrationError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_submit_staging_failure() {
        let mut stage = MockFileStageManager::new();
        stage
            .expect_stage()
            .returning(|_, _| Err(anyhow::anyhow!("disk full")));

        let uc = make_uc(MockMigrationJobRepository::new(), stage);
        let result = uc.execute(make_input()).await;
        match result {
            Err(SubmitMigrationError::Staging(e)) => assert!(e.to_string().contains("disk full")),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
