use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::entity::audit::AuditMetadata;
use crate::domain::entity::file_type::FileType;

/// JobStatus は移行ジョブの状態を表す。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Validating,
    InProgress,
    Paused,
    Completed,
    CompletedWithErrors,
    Failed,
    RollbackInProgress,
    RollbackCompleted,
    RollbackFailed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Validating => write!(f, "VALIDATING"),
            Self::InProgress => write!(f, "IN_PROGRESS"),
            Self::Paused => write!(f, "PAUSED"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::CompletedWithErrors => write!(f, "COMPLETED_WITH_ERRORS"),
            Self::Failed => write!(f, "FAILED"),
            Self::RollbackInProgress => write!(f, "ROLLBACK_IN_PROGRESS"),
            Self::RollbackCompleted => write!(f, "ROLLBACK_COMPLETED"),
            Self::RollbackFailed => write!(f, "ROLLBACK_FAILED"),
        }
    }
}

impl JobStatus {
    pub fn from_str_value(s: &str) -> anyhow::Result<Self> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "VALIDATING" => Ok(Self::Validating),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "PAUSED" => Ok(Self::Paused),
            "COMPLETED" => Ok(Self::Completed),
            "COMPLETED_WITH_ERRORS" => Ok(Self::CompletedWithErrors),
            "FAILED" => Ok(Self::Failed),
            "ROLLBACK_IN_PROGRESS" => Ok(Self::RollbackInProgress),
            "ROLLBACK_COMPLETED" => Ok(Self::RollbackCompleted),
            "ROLLBACK_FAILED" => Ok(Self::RollbackFailed),
            _ => anyhow::bail!("invalid job status: {}", s),
        }
    }

    /// 正常終了（エラー有無を問わない）状態かどうかを返す。
    pub fn is_terminal_success(&self) -> bool {
        matches!(self, Self::Completed | Self::CompletedWithErrors)
    }

    /// 実行主体が処理中である状態かどうかを返す。
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Validating | Self::InProgress | Self::RollbackInProgress
        )
    }

    /// 状態遷移が許可されているかどうかを返す。
    pub fn can_transition_to(&self, next: &JobStatus) -> bool {
        use JobStatus::{
            Completed, CompletedWithErrors, Failed, InProgress, Paused, Pending,
            RollbackCompleted, RollbackFailed, RollbackInProgress, Validating,
        };
        matches!(
            (self, next),
            (Pending, Validating)
                | (Validating, InProgress | Failed)
                | (
                    InProgress,
                    Paused | Completed | CompletedWithErrors | Failed
                )
                | (Paused | Failed, InProgress)
                | (Completed | CompletedWithErrors, RollbackInProgress)
                | (RollbackInProgress, RollbackCompleted | RollbackFailed)
        )
    }
}

/// JobStateError はジョブ状態機械の違反を表す。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobStateError {
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
    #[error("job is not resumable (status: {status}, checkpoint: {checkpoint})")]
    NotResumable { status: JobStatus, checkpoint: i64 },
    #[error("rollback is not allowed: {0}")]
    RollbackNotAllowed(String),
    #[error("rollback deadline has passed: {0}")]
    RollbackDeadlinePassed(DateTime<Utc>),
}

/// NewMigrationJob はジョブ作成時の入力。
#[derive(Debug, Clone)]
pub struct NewMigrationJob {
    pub original_file_name: String,
    pub staged_file_path: String,
    pub file_size: i64,
    pub file_checksum: Option<String>,
    pub file_type: FileType,
    pub source_system: String,
    pub target_entity: String,
    pub initiated_by: String,
    pub processing_node: Option<String>,
    pub import_config: String,
    pub validation_rules: String,
    pub batch_size: i32,
    pub max_retries: i32,
    pub rollback_window: Duration,
}

/// MigrationJob は1回の移行実行を表す。
///
/// `checkpoint_position` は次に処理すべきレコードのオフセットであり、再開位置の唯一の根拠となる。
/// 件数カウンタから再開位置を導出してはならない。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationJob {
    pub audit: AuditMetadata,
    pub job_id: String,

    pub original_file_name: String,
    pub staged_file_path: String,
    pub archived_file_path: Option<String>,
    pub file_size: i64,
    pub file_checksum: Option<String>,
    pub file_type: FileType,
    pub source_system: String,
    pub target_entity: String,
    pub initiated_by: String,
    pub processing_node: Option<String>,

    /// Record Processor のみが解釈する JSON 文字列。
    pub import_config: String,
    pub validation_rules: String,

    pub total_records: Option<i64>,
    pub processed_records: i64,
    pub successful_records: i64,
    pub failed_records: i64,
    pub batch_size: i32,
    pub checkpoint_position: i64,
    pub progress_percentage: f64,

    pub retry_count: i32,
    pub max_retries: i32,

    pub started_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    pub can_rollback: bool,
    pub rollback_deadline: DateTime<Utc>,
    pub rollback_reason: Option<String>,
    pub rolled_back_by: Option<String>,
    pub rolled_back_at: Option<DateTime<Utc>>,

    pub status: JobStatus,
    pub error_summary: Option<String>,
}

impl MigrationJob {
    /// PENDING 状態の新しいジョブを作成する。
    pub fn new(input: NewMigrationJob) -> Self {
        let audit = AuditMetadata::new();
        let rollback_deadline = audit.created_at + input.rollback_window;
        Self {
            job_id: generate_job_id(),
            audit,
            original_file_name: input.original_file_name,
            staged_file_path: input.staged_file_path,
            archived_file_path: None,
            file_size: input.file_size,
            file_checksum: input.file_checksum,
            file_type: input.file_type,
            source_system: input.source_system,
            target_entity: input.target_entity,
            initiated_by: input.initiated_by,
            processing_node: input.processing_node,
            import_config: input.import_config,
            validation_rules: input.validation_rules,
            total_records: None,
            processed_records: 0,
            successful_records: 0,
            failed_records: 0,
            batch_size: input.batch_size.max(1),
            checkpoint_position: 0,
            progress_percentage: 0.0,
            retry_count: 0,
            max_retries: input.max_retries.max(1),
            started_at: None,
            paused_at: None,
            completed_at: None,
            can_rollback: true,
            rollback_deadline,
            rollback_reason: None,
            rolled_back_by: None,
            rolled_back_at: None,
            status: JobStatus::Pending,
            error_summary: None,
        }
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), JobStateError> {
        if !self.status.can_transition_to(&next) {
            return Err(JobStateError::InvalidTransition {
                from: self.status.clone(),
                to: next,
            });
        }
        self.status = next;
        self.audit.touch();
        Ok(())
    }

    /// ファイル検証を開始する。
    pub fn begin_validation(&mut self) -> Result<(), JobStateError> {
        self.transition(JobStatus::Validating)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// 検証結果の総レコード数を記録し、バッチ処理を開始する。
    pub fn begin_processing(&mut self, total_records: i64) -> Result<(), JobStateError> {
        self.transition(JobStatus::InProgress)?;
        self.total_records = Some(total_records.max(0));
        self.recompute_progress();
        Ok(())
    }

    /// 完了したバッチの結果をチェックポイントに反映する。
    ///
    /// チェックポイントはバッチ長だけ前進し、processed_records はチェックポイントと一致する。
    pub fn apply_batch(&mut self, batch_len: i64, succeeded: i64, failed: i64) {
        self.checkpoint_position += batch_len.max(0);
        self.processed_records = self.checkpoint_position;
        self.successful_records += succeeded;
        self.failed_records += failed;
        self.recompute_progress();
        self.audit.touch();
    }

    /// バッチレベルの失敗を記録する。リトライ上限に達した場合は true を返す。
    pub fn record_retry(&mut self) -> bool {
        self.retry_count += 1;
        self.audit.touch();
        self.retry_count >= self.max_retries
    }

    /// 線形バックオフの待機時間（retry_count × unit）を返す。
    pub fn retry_delay(&self, unit: std::time::Duration) -> std::time::Duration {
        unit * u32::try_from(self.retry_count.max(0)).unwrap_or(u32::MAX)
    }

    /// バッチ間でジョブを一時停止する。
    pub fn pause(&mut self) -> Result<(), JobStateError> {
        self.transition(JobStatus::Paused)?;
        self.paused_at = Some(Utc::now());
        Ok(())
    }

    /// ジョブを失敗にする。チェックポイントはそのまま保持される。
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.error_summary = Some(message.into());
        self.audit.touch();
    }

    /// 再開可能かどうかを返す。
    ///
    /// PAUSED または FAILED で、総レコード数が確定しており、チェックポイントがその範囲内にあり、
    /// ステージングファイルがまだアーカイブされていない場合に限り再開できる。
    pub fn is_resumable(&self) -> bool {
        matches!(self.status, JobStatus::Paused | JobStatus::Failed)
            && self.archived_file_path.is_none()
            && self
                .total_records
                .is_some_and(|total| (0..=total).contains(&self.checkpoint_position))
    }

    /// 永続化済みチェックポイントから処理を再開する。
    pub fn resume(&mut self) -> Result<(), JobStateError> {
        if !self.is_resumable() {
            return Err(JobStateError::NotResumable {
                status: self.status.clone(),
                checkpoint: self.checkpoint_position,
            });
        }
        self.transition(JobStatus::InProgress)?;
        self.retry_count = 0;
        self.paused_at = None;
        self.error_summary = None;
        Ok(())
    }

    /// 終端状態を確定する。既に終端済みの場合は何もせず false を返す。
    pub fn finalize(&mut self) -> bool {
        if self.status != JobStatus::InProgress {
            return false;
        }
        self.completed_at = Some(Utc::now());
        self.recompute_progress();
        self.status = if self.failed_records == 0 {
            JobStatus::Completed
        } else {
            JobStatus::CompletedWithErrors
        };
        self.audit.touch();
        true
    }

    /// 派生する進捗値を再計算する。
    pub fn recompute_progress(&mut self) {
        #[allow(clippy::cast_precision_loss)]
        let percentage = match self.total_records {
            Some(total) if total > 0 => {
                (self.processed_records as f64 / total as f64 * 100.0).min(100.0)
            }
            Some(_) if self.status.is_terminal_success() || self.completed_at.is_some() => 100.0,
            _ => 0.0,
        };
        self.progress_percentage = percentage;
    }

    /// ロールバック可否を検証する。
    pub fn check_rollback_eligibility(&self, now: DateTime<Utc>) -> Result<(), JobStateError> {
        if !self.can_rollback {
            return Err(JobStateError::RollbackNotAllowed(
                "rollback eligibility has been revoked".to_string(),
            ));
        }
        if now >= self.rollback_deadline {
            return Err(JobStateError::RollbackDeadlinePassed(self.rollback_deadline));
        }
        if !self.status.is_terminal_success() {
            return Err(JobStateError::RollbackNotAllowed(format!(
                "job status is {}",
                self.status
            )));
        }
        Ok(())
    }

    /// ロールバックを開始する。
    pub fn begin_rollback(
        &mut self,
        now: DateTime<Utc>,
        reason: String,
        actor: String,
    ) -> Result<(), JobStateError> {
        self.check_rollback_eligibility(now)?;
        self.transition(JobStatus::RollbackInProgress)?;
        self.rollback_reason = Some(reason);
        self.rolled_back_by = Some(actor);
        Ok(())
    }

    /// ロールバックを完了する。ロールバック資格は恒久的に失われる。
    pub fn complete_rollback(&mut self) -> Result<(), JobStateError> {
        self.transition(JobStatus::RollbackCompleted)?;
        self.can_rollback = false;
        self.rolled_back_at = Some(Utc::now());
        Ok(())
    }

    /// ロールバックを失敗にする。ロールバックは一度きりのため資格は復元しない。
    pub fn fail_rollback(&mut self, message: impl Into<String>) {
        self.status = JobStatus::RollbackFailed;
        self.can_rollback = false;
        self.error_summary = Some(message.into());
        self.audit.touch();
    }
}

fn generate_job_id() -> String {
    format!("MIG-{}", Uuid::new_v4().simple()).to_uppercase()
}
