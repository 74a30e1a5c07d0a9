use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::domain::entity::migration_error::MigrationErrorRecord;
use crate::domain::entity::migration_job::{JobStatus, MigrationJob};
use crate::domain::repository::MigrationJobRepository;
use crate::infrastructure::error_report::ErrorReportGenerator;
use crate::infrastructure::file_stage::FileStageManager;
use crate::infrastructure::metrics::MigrationMetrics;
use crate::infrastructure::pause_signal::{ManualPauseRegistry, PauseSignal};
use crate::infrastructure::record_processor::{RecordProcessor, RecordProcessorRegistry};

/// 1バッチの処理結果。
enum BatchOutcome {
    EndOfFile,
    Processed {
        len: i64,
        succeeded: i64,
        errors: Vec<MigrationErrorRecord>,
    },
}

/// バッチループの終了理由。
#[derive(Debug, PartialEq, Eq)]
enum LoopExit {
    Exhausted,
    Paused,
}

/// ExecuteMigrationUseCase はファイル検証・バッチループ・リトライ・終端処理を担う。
///
/// 呼び出し元は事前に claim でジョブの実行権を取得していなければならない。
pub struct ExecuteMigrationUseCase {
    job_repo: Arc<dyn MigrationJobRepository>,
    processors: Arc<RecordProcessorRegistry>,
    file_stage: Arc<dyn FileStageManager>,
    pause_signal: Arc<dyn PauseSignal>,
    metrics: Arc<dyn MigrationMetrics>,
    retry_backoff_unit: Duration,
    manual_pause: Option<Arc<ManualPauseRegistry>>,
    report_generator: Option<Arc<dyn ErrorReportGenerator>>,
}

impl ExecuteMigrationUseCase {
    pub fn new(
        job_repo: Arc<dyn MigrationJobRepository>,
        processors: Arc<RecordProcessorRegistry>,
        file_stage: Arc<dyn FileStageManager>,
        pause_signal: Arc<dyn PauseSignal>,
        metrics: Arc<dyn MigrationMetrics>,
        retry_backoff_unit: Duration,
    ) -> Self {
        Self {
            job_repo,
            processors,
            file_stage,
            pause_signal,
            metrics,
            retry_backoff_unit,
            manual_pause: None,
            report_generator: None,
        }
    }

    /// 一時停止が反映されたときに手動停止要求を取り消すためのレジストリを設定する。
    pub fn with_manual_pause(mut self, manual_pause: Arc<ManualPauseRegistry>) -> Self {
        self.manual_pause = Some(manual_pause);
        self
    }

    pub fn with_report_generator(mut self, generator: Arc<dyn ErrorReportGenerator>) -> Self {
        self.report_generator = Some(generator);
        self
    }

    /// VALIDATING 状態のジョブを検証し、バッチ処理を経て終端状態まで進める。
    pub async fn run_initial(&self, job_id: &str) -> anyhow::Result<()> {
        let mut job = self.load(job_id).await?;
        if job.status != JobStatus::Validating {
            info!(job_id = %job_id, status = %job.status, "job is not validating, skipping");
            return Ok(());
        }

        if let Err(e) = self.validate_and_process(&mut job).await {
            self.fail_job(&mut job, &e).await?;
        }
        Ok(())
    }

    /// IN_PROGRESS 状態のジョブを永続化済みチェックポイントから再開する。
    pub async fn resume_processing(&self, job_id: &str) -> anyhow::Result<()> {
        let mut job = self.load(job_id).await?;
        if job.status != JobStatus::InProgress {
            info!(job_id = %job_id, status = %job.status, "job is not in progress, skipping");
            return Ok(());
        }

        info!(
            job_id = %job_id,
            checkpoint = job.checkpoint_position,
            "resuming migration from checkpoint"
        );
        if let Err(e) = self.process_and_finalize(&mut job).await {
            self.fail_job(&mut job, &e).await?;
        }
        Ok(())
    }

    async fn load(&self, job_id: &str) -> anyhow::Result<MigrationJob> {
        self.job_repo
            .find_by_job_id(job_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("migration job not found: {}", job_id))
    }

    async fn validate_and_process(&self, job: &mut MigrationJob) -> anyhow::Result<()> {
        let processor = self.processors.resolve(&job.target_entity)?;

        let valid = processor
            .validate_file_shape(&job.staged_file_path, job.file_type)
            .await?;
        if !valid {
            anyhow::bail!("file shape is invalid for declared type {}", job.file_type);
        }

        let total = processor
            .count_records(&job.staged_file_path, job.file_type)
            .await?;
        job.begin_processing(total)?;
        self.job_repo.update(job).await?;
        info!(
            job_id = %job.job_id,
            total_records = total,
            batch_size = job.batch_size,
            "file validated, starting batch processing"
        );

        self.run_and_finalize(job, processor.as_ref()).await
    }

    async fn process_and_finalize(&self, job: &mut MigrationJob) -> anyhow::Result<()> {
        let processor = self.processors.resolve(&job.target_entity)?;
        self.run_and_finalize(job, processor.as_ref()).await
    }

    async fn run_and_finalize(
        &self,
        job: &mut MigrationJob,
        processor: &dyn RecordProcessor,
    ) -> anyhow::Result<()> {
        match self.run_batches(job, processor).await? {
            LoopExit::Exhausted => self.finalize(job).await,
            LoopExit::Paused => Ok(()),
        }
    }

    /// チェックポイントからファイル終端・一時停止・リトライ上限のいずれかまでバッチを処理する。
    async fn run_batches(
        &self,
        job: &mut MigrationJob,
        processor: &dyn RecordProcessor,
    ) -> anyhow::Result<LoopExit> {
        loop {
            let offset = job.checkpoint_position;
            let started = Instant::now();

            match self.run_batch(job, processor, offset).await {
                Ok(BatchOutcome::EndOfFile) => {
                    debug!(job_id = %job.job_id, offset = offset, "end of file reached");
                    return Ok(LoopExit::Exhausted);
                }
                Ok(BatchOutcome::Processed {
                    len,
                    succeeded,
                    errors,
                }) => {
                    let failed = i64::try_from(errors.len())?;

                    // 保存に成功するまではメモリ上のジョブを進めない
                    let mut next = job.clone();
                    next.apply_batch(len, succeeded, failed);
                    self.job_repo.save_checkpoint(&next, &errors).await?;
                    *job = next;

                    self.metrics.record_records_processed(
                        &job.target_entity,
                        u64::try_from(succeeded).unwrap_or_default(),
                        u64::try_from(failed).unwrap_or_default(),
                    );
                    self.metrics
                        .record_batch_duration(&job.target_entity, started.elapsed().as_secs_f64());
                    info!(
                        job_id = %job.job_id,
                        offset = offset,
                        batch_size = len,
                        succeeded = succeeded,
                        failed = failed,
                        checkpoint = job.checkpoint_position,
                        "batch checkpointed"
                    );

                    if self.pause_signal.should_pause(job).await {
                        job.pause()?;
                        // 再開直後に古い停止要求が効かないよう、状態を保存する前に取り消す
                        self.clear_manual_pause(&job.job_id).await;
                        self.job_repo.update(job).await?;
                        self.metrics.record_job_paused(&job.target_entity);
                        info!(
                            job_id = %job.job_id,
                            checkpoint = job.checkpoint_position,
                            "migration paused between batches"
                        );
                        return Ok(LoopExit::Paused);
                    }
                }
                Err(e) => {
                    let exhausted = job.record_retry();
                    self.job_repo.update(job).await?;
                    self.metrics.record_batch_retry(&job.target_entity);

                    if exhausted {
                        error!(
                            job_id = %job.job_id,
                            offset = offset,
                            retry_count = job.retry_count,
                            error = %e,
                            "batch failed, retry limit reached"
                        );
                        anyhow::bail!(
                            "batch at offset {} failed after {} attempts: {}",
                            offset,
                            job.retry_count,
                            e
                        );
                    }

                    let delay = job.retry_delay(self.retry_backoff_unit);
                    warn!(
                        job_id = %job.job_id,
                        offset = offset,
                        retry_count = job.retry_count,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "batch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// 1バッチを読み込み、レコードを1件ずつ独立に処理する。
    ///
    /// レコード単位の失敗はエラーレコードとして返し、バッチを中断しない。
    /// 読み込み失敗とプロセッサ利用不能のみがバッチレベルのエラーになる。
    async fn run_batch(
        &self,
        job: &MigrationJob,
        processor: &dyn RecordProcessor,
        offset: i64,
    ) -> anyhow::Result<BatchOutcome> {
        let records = processor
            .read_batch(&job.staged_file_path, job.file_type, offset, job.batch_size)
            .await?;
        if records.is_empty() {
            return Ok(BatchOutcome::EndOfFile);
        }

        let mut succeeded = 0i64;
        let mut errors = Vec::new();
        for (index, record) in records.iter().enumerate() {
            let record_offset = offset + i64::try_from(index)?;
            match processor.process(record, job).await {
                Ok(()) => succeeded += 1,
                Err(e) if e.is_batch_level() => {
                    return Err(anyhow::Error::new(e)
                        .context(format!("record processor failed at offset {record_offset}")));
                }
                Err(e) => {
                    debug!(
                        job_id = %job.job_id,
                        offset = record_offset,
                        error = %e,
                        "record failed"
                    );
                    errors.push(MigrationErrorRecord::from_record_error(
                        &job.job_id,
                        record_offset,
                        record,
                        &e,
                    ));
                }
            }
        }

        Ok(BatchOutcome::Processed {
            len: i64::try_from(records.len())?,
            succeeded,
            errors,
        })
    }

    /// 終端状態を確定し、ファイルをアーカイブしてエラーレポートを生成する。
    /// 既に終端済みのジョブに対しては何もしない。
    async fn finalize(&self, job: &mut MigrationJob) -> anyhow::Result<()> {
        if !job.finalize() {
            info!(job_id = %job.job_id, status = %job.status, "job already finalized");
            return Ok(());
        }

        if job.archived_file_path.is_none() {
            match self
                .file_stage
                .archive(&job.staged_file_path, &job.job_id)
                .await
            {
                Ok(archived) => job.archived_file_path = Some(archived),
                Err(e) => warn!(
                    job_id = %job.job_id,
                    path = %job.staged_file_path,
                    error = %e,
                    "failed to archive staged file"
                ),
            }
        }

        self.job_repo.update(job).await?;
        self.clear_manual_pause(&job.job_id).await;
        self.metrics
            .record_job_finished(&job.target_entity, &job.status.to_string());
        info!(
            job_id = %job.job_id,
            status = %job.status,
            processed = job.processed_records,
            successful = job.successful_records,
            failed = job.failed_records,
            "migration finished"
        );

        if job.failed_records > 0 {
            self.generate_report(job).await;
        }
        Ok(())
    }

    async fn generate_report(&self, job: &MigrationJob) {
        let Some(ref generator) = self.report_generator else {
            return;
        };
        let errors = match self.job_repo.find_all_errors(&job.job_id).await {
            Ok(errors) => errors,
            Err(e) => {
                warn!(job_id = %job.job_id, error = %e, "failed to load error records for report");
                return;
            }
        };
        if let Err(e) = generator.generate(job, &errors).await {
            warn!(job_id = %job.job_id, error = %e, "failed to generate error report");
        }
    }

    /// 致命的エラーとしてジョブを FAILED にする。チェックポイントは保持される。
    async fn fail_job(&self, job: &mut MigrationJob, cause: &anyhow::Error) -> anyhow::Result<()> {
        error!(
            job_id = %job.job_id,
            status = %job.status,
            checkpoint = job.checkpoint_position,
            error = %cause,
            "migration failed"
        );
        job.fail(format!("{cause:#}"));
        self.job_repo.update(job).await?;
        self.clear_manual_pause(&job.job_id).await;
        self.metrics
            .record_job_finished(&job.target_entity, &job.status.to_string());
        Ok(())
    }

    async fn clear_manual_pause(&self, job_id: &str) {
        if let Some(ref manual) = self.manual_pause {
            manual.clear(job_id).await;
        }
    }
}
