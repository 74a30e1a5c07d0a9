//! 移行エンジンの公開窓口。
//!
//! 各ユースケースを組み立て、ジョブ操作を一つの型から呼び出せるようにする。

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::adapter::repository::{InMemoryMigrationJobRepository, MigrationJobPostgresRepository};
use crate::domain::entity::migration_error::MigrationErrorRecord;
use crate::domain::entity::migration_job::{JobStatus, MigrationJob};
use crate::domain::repository::{
    ErrorRecordListParams, MigrationJobListParams, MigrationJobRepository,
};
use crate::infrastructure::config::{Config, MigrationConfig};
use crate::infrastructure::database;
use crate::infrastructure::error_report::{ErrorReportGenerator, JsonErrorReportGenerator};
use crate::infrastructure::file_stage::{FileStageManager, LocalFileStageManager};
use crate::infrastructure::metrics::MigrationMetrics;
use crate::infrastructure::pause_signal::{
    CompositePauseSignal, MaintenanceWindowSignal, ManualPauseRegistry, PauseSignal,
};
use crate::infrastructure::record_processor::RecordProcessorRegistry;
use crate::infrastructure::validation_rules::{
    ConfiguredValidationRuleProvider, ValidationRuleProvider,
};
use crate::infrastructure::worker_pool::MigrationWorkerPool;
use crate::usecase::{
    ExecuteMigrationUseCase, GetMigrationUseCase, ListMigrationErrorsUseCase,
    ListMigrationsUseCase, PauseMigrationError, PauseMigrationUseCase, RecoverMigrationsUseCase,
    RecoveryReport, ResolveMigrationErrorError, ResolveMigrationErrorUseCase,
    RestartMigrationError, RestartMigrationUseCase, RollbackMigrationError,
    RollbackMigrationUseCase, StartMigrationError, StartMigrationUseCase, SubmitMigrationError,
    SubmitMigrationInput, SubmitMigrationUseCase,
};

/// MigrationCollaborators はエンジンが利用する外部コンポーネントの集合。
pub struct MigrationCollaborators {
    pub job_repo: Arc<dyn MigrationJobRepository>,
    pub processors: Arc<RecordProcessorRegistry>,
    pub file_stage: Arc<dyn FileStageManager>,
    pub rule_provider: Arc<dyn ValidationRuleProvider>,
    pub metrics: Arc<dyn MigrationMetrics>,
    pub report_generator: Option<Arc<dyn ErrorReportGenerator>>,
    /// 手動停止・メンテナンス時間帯に加えて判定する一時停止シグナル。
    pub extra_pause_signals: Vec<Arc<dyn PauseSignal>>,
    pub maintenance_window: Option<(u32, u32)>,
}

/// MigrationOrchestrator は移行ジョブのライフサイクル操作をまとめて提供する。
pub struct MigrationOrchestrator {
    job_repo: Arc<dyn MigrationJobRepository>,
    worker_pool: MigrationWorkerPool,
    submit_uc: SubmitMigrationUseCase,
    start_uc: StartMigrationUseCase,
    restart_uc: Arc<RestartMigrationUseCase>,
    rollback_uc: RollbackMigrationUseCase,
    pause_uc: PauseMigrationUseCase,
    get_uc: GetMigrationUseCase,
    list_uc: ListMigrationsUseCase,
    list_errors_uc: ListMigrationErrorsUseCase,
    resolve_error_uc: ResolveMigrationErrorUseCase,
    recover_uc: RecoverMigrationsUseCase,
}

impl MigrationOrchestrator {
    pub fn new(collaborators: MigrationCollaborators, config: MigrationConfig) -> Self {
        let MigrationCollaborators {
            job_repo,
            processors,
            file_stage,
            rule_provider,
            metrics,
            report_generator,
            extra_pause_signals,
            maintenance_window,
        } = collaborators;

        let manual_pause = Arc::new(ManualPauseRegistry::new());
        let mut signals: Vec<Arc<dyn PauseSignal>> = Vec::new();
        signals.push(manual_pause.clone());
        if let Some((start_hour, end_hour)) = maintenance_window {
            signals.push(Arc::new(MaintenanceWindowSignal::new(start_hour, end_hour)));
        }
        signals.extend(extra_pause_signals);
        let pause_signal: Arc<dyn PauseSignal> = Arc::new(CompositePauseSignal::new(signals));

        let mut execute_uc = ExecuteMigrationUseCase::new(
            job_repo.clone(),
            processors.clone(),
            file_stage.clone(),
            pause_signal,
            metrics.clone(),
            config.retry_backoff_unit(),
        )
        .with_manual_pause(manual_pause.clone());
        if let Some(generator) = report_generator {
            execute_uc = execute_uc.with_report_generator(generator);
        }
        let execute_uc = Arc::new(execute_uc);

        let worker_pool = MigrationWorkerPool::new(config.max_concurrent_jobs);
        let node_id = config.node_id.clone();

        let restart_uc = Arc::new(RestartMigrationUseCase::new(
            job_repo.clone(),
            file_stage.clone(),
            execute_uc.clone(),
            worker_pool.clone(),
            node_id.clone(),
        ));

        Self {
            submit_uc: SubmitMigrationUseCase::new(
                job_repo.clone(),
                file_stage,
                processors.clone(),
                rule_provider,
                metrics.clone(),
                config.clone(),
            ),
            start_uc: StartMigrationUseCase::new(
                job_repo.clone(),
                execute_uc,
                worker_pool.clone(),
                node_id.clone(),
            ),
            rollback_uc: RollbackMigrationUseCase::new(
                job_repo.clone(),
                processors,
                metrics,
                node_id.clone(),
            ),
            pause_uc: PauseMigrationUseCase::new(job_repo.clone(), manual_pause),
            get_uc: GetMigrationUseCase::new(job_repo.clone()),
            list_uc: ListMigrationsUseCase::new(job_repo.clone()),
            list_errors_uc: ListMigrationErrorsUseCase::new(job_repo.clone()),
            resolve_error_uc: ResolveMigrationErrorUseCase::new(job_repo.clone()),
            recover_uc: RecoverMigrationsUseCase::new(
                job_repo.clone(),
                restart_uc.clone(),
                node_id,
                config.auto_resume_interrupted,
            ),
            restart_uc,
            worker_pool,
            job_repo,
        }
    }

    /// 設定ファイルからエンジンを構築する。
    ///
    /// `database` が設定されていれば PostgreSQL を使い、スキーマのマイグレーションを適用する。
    /// 未設定の場合はインメモリリポジトリで動作する。
    pub async fn from_config(
        cfg: &Config,
        processors: RecordProcessorRegistry,
        metrics: Arc<dyn MigrationMetrics>,
    ) -> anyhow::Result<Self> {
        let job_repo: Arc<dyn MigrationJobRepository> = if let Some(ref db_config) = cfg.database
        {
            let pool = database::connect(db_config).await?;
            database::run_migrations(&pool).await?;
            Arc::new(MigrationJobPostgresRepository::new(pool))
        } else {
            tracing::info!("no database configured, using in-memory migration job repository");
            Arc::new(InMemoryMigrationJobRepository::new())
        };

        let migration = &cfg.migration;
        let collaborators = MigrationCollaborators {
            job_repo,
            processors: Arc::new(processors),
            file_stage: Arc::new(LocalFileStageManager::new(
                &migration.staging_dir,
                &migration.archive_dir,
            )),
            rule_provider: Arc::new(ConfiguredValidationRuleProvider::new(
                cfg.validation_rules.clone(),
            )),
            metrics,
            report_generator: Some(Arc::new(JsonErrorReportGenerator::new(&migration.report_dir))),
            extra_pause_signals: Vec::new(),
            maintenance_window: cfg
                .maintenance
                .as_ref()
                .map(|window| (window.start_hour, window.end_hour)),
        };

        Ok(Self::new(collaborators, migration.clone()))
    }

    pub async fn submit(
        &self,
        input: SubmitMigrationInput,
    ) -> Result<MigrationJob, SubmitMigrationError> {
        self.submit_uc.execute(input).await
    }

    /// ジョブの実行をバックグラウンドで開始する。PENDING 以外のジョブでは false を返す。
    pub async fn start(&self, job_id: &str) -> Result<bool, StartMigrationError> {
        self.start_uc.execute(job_id).await
    }

    pub async fn restart(&self, job_id: &str) -> Result<(), RestartMigrationError> {
        self.restart_uc.execute(job_id).await
    }

    pub async fn rollback(
        &self,
        job_id: &str,
        reason: &str,
        actor: &str,
    ) -> Result<MigrationJob, RollbackMigrationError> {
        self.rollback_uc
            .execute(job_id, reason.to_string(), actor.to_string())
            .await
    }

    pub async fn pause(&self, job_id: &str) -> Result<(), PauseMigrationError> {
        self.pause_uc.execute(job_id).await
    }

    pub async fn get(&self, job_id: &str) -> anyhow::Result<Option<MigrationJob>> {
        self.get_uc.execute(job_id).await
    }

    pub async fn list(
        &self,
        params: MigrationJobListParams,
    ) -> anyhow::Result<(Vec<MigrationJob>, i64)> {
        self.list_uc.execute(params).await
    }

    pub async fn list_errors(
        &self,
        job_id: &str,
        params: ErrorRecordListParams,
    ) -> anyhow::Result<Option<(Vec<MigrationErrorRecord>, i64)>> {
        self.list_errors_uc.execute(job_id, params).await
    }

    pub async fn resolve_error(
        &self,
        error_id: Uuid,
        resolved_by: &str,
        notes: Option<String>,
    ) -> Result<MigrationErrorRecord, ResolveMigrationErrorError> {
        self.resolve_error_uc
            .execute(error_id, resolved_by.to_string(), notes)
            .await
    }

    /// 起動時リカバリを実行する。プロセス起動直後、ジョブ操作を受け付ける前に呼び出す。
    pub async fn recover(&self) -> anyhow::Result<RecoveryReport> {
        self.recover_uc.execute().await
    }

    /// 実行中のジョブ数を返す。
    pub fn running_jobs(&self) -> usize {
        self.worker_pool.running()
    }

    pub fn job_repository(&self) -> Arc<dyn MigrationJobRepository> {
        self.job_repo.clone()
    }

    /// ジョブが指定状態のいずれかに到達するまでポーリングで待機する。
    pub async fn wait_for_status(
        &self,
        job_id: &str,
        expected: &[JobStatus],
        timeout: Duration,
    ) -> anyhow::Result<MigrationJob> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let job = self
                .get(job_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("migration job not found: {}", job_id))?;
            if expected.contains(&job.status) {
                return Ok(job);
            }
            if tokio::time::Instant::now() >= deadline {
                anyhow::bail!(
                    "timed out waiting for job {} (current status: {})",
                    job_id,
                    job.status
                );
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
