use std::sync::Arc;

use tracing::{error, info, warn};

use crate::domain::entity::migration_job::JobStatus;
use crate::domain::repository::MigrationJobRepository;
use crate::usecase::RestartMigrationUseCase;

/// 起動時リカバリの結果。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// VALIDATING/IN_PROGRESS のまま残っていたため FAILED にしたジョブ数。
    pub interrupted: usize,
    /// ROLLBACK_IN_PROGRESS のまま残っていたため ROLLBACK_FAILED にしたジョブ数。
    pub rollback_failed: usize,
    /// 自動再開したジョブ数。
    pub resumed: usize,
}

/// RecoverMigrationsUseCase は起動時に、このノードで中断されたジョブを整理する。
///
/// 前回プロセスの実行主体は既に存在しないため、処理中のジョブは FAILED として
/// チェックポイントからの再開対象にする。補償処理は途中から再開できないため
/// ROLLBACK_IN_PROGRESS のジョブは ROLLBACK_FAILED にする。
pub struct RecoverMigrationsUseCase {
    job_repo: Arc<dyn MigrationJobRepository>,
    restart_uc: Arc<RestartMigrationUseCase>,
    node_id: String,
    auto_resume: bool,
}

impl RecoverMigrationsUseCase {
    pub fn new(
        job_repo: Arc<dyn MigrationJobRepository>,
        restart_uc: Arc<RestartMigrationUseCase>,
        node_id: String,
        auto_resume: bool,
    ) -> Self {
        Self {
            job_repo,
            restart_uc,
            node_id,
            auto_resume,
        }
    }

    pub async fn execute(&self) -> anyhow::Result<RecoveryReport> {
        let active = self.job_repo.find_active_by_node(&self.node_id).await?;
        let mut report = RecoveryReport::default();

        if active.is_empty() {
            info!(node = %self.node_id, "no interrupted migrations to recover");
            return Ok(report);
        }

        info!(node = %self.node_id, count = active.len(), "recovering interrupted migrations");

        for mut job in active {
            match job.status {
                JobStatus::Validating | JobStatus::InProgress => {
                    warn!(
                        job_id = %job.job_id,
                        status = %job.status,
                        checkpoint = job.checkpoint_position,
                        "migration was interrupted, marking as failed"
                    );
                    job.fail(format!(
                        "interrupted: processing node {} restarted during {}",
                        self.node_id, job.status
                    ));
                    self.job_repo.update(&job).await?;
                    report.interrupted += 1;

                    if self.auto_resume && job.is_resumable() {
                        match self.restart_uc.execute(&job.job_id).await {
                            Ok(()) => report.resumed += 1,
                            Err(e) => error!(
                                job_id = %job.job_id,
                                error = %e,
                                "failed to resume interrupted migration"
                            ),
                        }
                    }
                }
                JobStatus::RollbackInProgress => {
                    warn!(job_id = %job.job_id, "rollback was interrupted, marking as failed");
                    job.fail_rollback(format!(
                        "interrupted: processing node {} restarted during rollback",
                        self.node_id
                    ));
                    self.job_repo.update(&job).await?;
                    report.rollback_failed += 1;
                }
                _ => {}
            }
        }

        info!(
            interrupted = report.interrupted,
            rollback_failed = report.rollback_failed,
            resumed = report.resumed,
            "migration recovery finished"
        );
        Ok(report)
    }
}
