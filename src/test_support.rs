//! テスト用のスクリプト化 Record Processor とヘルパー。
//! 統合テスト（tests/migration_engine_test.rs）から利用する。

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::entity::file_type::FileType;
use crate::domain::entity::migration_job::MigrationJob;
use crate::domain::entity::record_error::RecordError;
use crate::domain::repository::MigrationJobRepository;
use crate::infrastructure::config::MigrationConfig;
use crate::infrastructure::error_report::JsonErrorReportGenerator;
use crate::infrastructure::file_stage::LocalFileStageManager;
use crate::infrastructure::metrics::NoopMigrationMetrics;
use crate::infrastructure::pause_signal::PauseSignal;
use crate::infrastructure::record_processor::{RecordProcessor, RecordProcessorRegistry};
use crate::infrastructure::validation_rules::ConfiguredValidationRuleProvider;
use crate::orchestrator::{MigrationCollaborators, MigrationOrchestrator};

/// テストで使う対象エンティティ名。
pub const TEST_TARGET_ENTITY: &str = "contract";

/// テストで使うノードID。
pub const TEST_NODE_ID: &str = "test-node";

// ---------------------------------------------------------------------------
// ScriptedRecordProcessor
// ---------------------------------------------------------------------------

/// ScriptedRecordProcessor はメモリ上のレコード列を返し、失敗をスクリプトで制御できる RecordProcessor。
///
/// ステージング済みファイルの中身は読まず、コンストラクタで与えたレコードを返す。
pub struct ScriptedRecordProcessor {
    records: Vec<String>,
    invalid: HashSet<String>,
    shape_valid: bool,
    failing_reads: AtomicUsize,
    always_unavailable: bool,
    compensate_fails: bool,
    read_delay: Option<Duration>,
    read_calls: AtomicUsize,
    compensated: AtomicBool,
    processed: Mutex<Vec<String>>,
    batch_offsets: Mutex<Vec<i64>>,
}

impl ScriptedRecordProcessor {
    /// `row-0` から `row-{count-1}` までのレコードを持つプロセッサを作成する。
    pub fn with_records(count: usize) -> Self {
        Self {
            records: (0..count).map(|i| format!("row-{i},value-{i}")).collect(),
            invalid: HashSet::new(),
            shape_valid: true,
            failing_reads: AtomicUsize::new(0),
            always_unavailable: false,
            compensate_fails: false,
            read_delay: None,
            read_calls: AtomicUsize::new(0),
            compensated: AtomicBool::new(false),
            processed: Mutex::new(Vec::new()),
            batch_offsets: Mutex::new(Vec::new()),
        }
    }

    /// 指定位置（0始まり）のレコードを検証エラーにする。
    pub fn invalid_at(mut self, offsets: &[usize]) -> Self {
        self.invalid = offsets
            .iter()
            .filter_map(|&i| self.records.get(i).cloned())
            .collect();
        self
    }

    /// ファイル形式の検証を失敗させる。
    pub fn invalid_shape(mut self) -> Self {
        self.shape_valid = false;
        self
    }

    /// 先頭 n 回の read_batch を失敗させる。
    pub fn failing_reads(self, n: usize) -> Self {
        self.failing_reads.store(n, Ordering::SeqCst);
        self
    }

    /// すべてのレコード処理でプロセッサ利用不能を返す。
    pub fn always_unavailable(mut self) -> Self {
        self.always_unavailable = true;
        self
    }

    pub fn compensate_fails(mut self) -> Self {
        self.compensate_fails = true;
        self
    }

    /// read_batch ごとに待機を入れる。
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    pub fn compensated(&self) -> bool {
        self.compensated.load(Ordering::SeqCst)
    }

    /// 成功したレコードを処理順に返す。
    pub async fn processed(&self) -> Vec<String> {
        self.processed.lock().await.clone()
    }

    /// 空でないバッチの読み込み開始位置を返す。
    pub async fn batch_offsets(&self) -> Vec<i64> {
        self.batch_offsets.lock().await.clone()
    }
}

#[async_trait]
impl RecordProcessor for ScriptedRecordProcessor {
    async fn validate_file_shape(&self, _path: &str, _file_type: FileType) -> anyhow::Result<bool> {
        Ok(self.shape_valid)
    }

    async fn count_records(&self, _path: &str, _file_type: FileType) -> anyhow::Result<i64> {
        Ok(i64::try_from(self.records.len())?)
    }

    async fn read_batch(
        &self,
        _path: &str,
        _file_type: FileType,
        offset: i64,
        size: i32,
    ) -> anyhow::Result<Vec<String>> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.read_delay {
            tokio::time::sleep(delay).await;
        }

        let remaining = self.failing_reads.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_reads.store(remaining - 1, Ordering::SeqCst);
            anyhow::bail!("source read timed out at offset {offset}");
        }

        let start = usize::try_from(offset)?.min(self.records.len());
        let end = start
            .saturating_add(usize::try_from(size.max(0))?)
            .min(self.records.len());
        let batch = self.records[start..end].to_vec();
        if !batch.is_empty() {
            self.batch_offsets.lock().await.push(offset);
        }
        Ok(batch)
    }

    async fn process(&self, record: &str, _job: &MigrationJob) -> Result<(), RecordError> {
        if self.always_unavailable {
            return Err(RecordError::Unavailable("target store is down".to_string()));
        }
        if self.invalid.contains(record) {
            return Err(RecordError::InvalidInput {
                message: format!("value is malformed: {record}"),
                suggested_fix: Some("correct the value in the source file".to_string()),
            });
        }
        self.processed.lock().await.push(record.to_string());
        Ok(())
    }

    async fn compensate(&self, job: &MigrationJob) -> anyhow::Result<()> {
        if self.compensate_fails {
            anyhow::bail!("target store rejected compensation for {}", job.job_id);
        }
        self.compensated.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PauseAtCheckpoint
// ---------------------------------------------------------------------------

/// PauseAtCheckpoint はチェックポイントが指定位置に達したとき、一度だけ一時停止を要求する。
pub struct PauseAtCheckpoint {
    position: i64,
    fired: AtomicBool,
}

impl PauseAtCheckpoint {
    pub fn new(position: i64) -> Self {
        Self {
            position,
            fired: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl PauseSignal for PauseAtCheckpoint {
    async fn should_pause(&self, job: &MigrationJob) -> bool {
        job.checkpoint_position >= self.position && !self.fired.swap(true, Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// make_test_orchestrator
// ---------------------------------------------------------------------------

/// テスト用の移行設定。ディレクトリは base_dir 配下に作成され、バックオフは 1ms になる。
pub fn test_migration_config(base_dir: &Path) -> MigrationConfig {
    MigrationConfig {
        default_batch_size: 4,
        max_batch_size: 100,
        max_retries: 3,
        retry_backoff_ms: 1,
        rollback_window_days: 30,
        max_concurrent_jobs: 2,
        staging_dir: base_dir.join("staging").to_string_lossy().into_owned(),
        archive_dir: base_dir.join("archive").to_string_lossy().into_owned(),
        report_dir: base_dir.join("reports").to_string_lossy().into_owned(),
        node_id: TEST_NODE_ID.to_string(),
        auto_resume_interrupted: false,
    }
}

/// テスト用 MigrationOrchestrator を構築するヘルパー。
pub fn make_test_orchestrator(
    job_repo: Arc<dyn MigrationJobRepository>,
    processor: Arc<dyn RecordProcessor>,
    config: MigrationConfig,
    extra_pause_signals: Vec<Arc<dyn PauseSignal>>,
) -> MigrationOrchestrator {
    let processors = RecordProcessorRegistry::new().register(TEST_TARGET_ENTITY, processor);
    let collaborators = MigrationCollaborators {
        job_repo,
        processors: Arc::new(processors),
        file_stage: Arc::new(LocalFileStageManager::new(
            &config.staging_dir,
            &config.archive_dir,
        )),
        rule_provider: Arc::new(ConfiguredValidationRuleProvider::new(HashMap::new())),
        metrics: Arc::new(NoopMigrationMetrics),
        report_generator: Some(Arc::new(JsonErrorReportGenerator::new(&config.report_dir))),
        extra_pause_signals,
        maintenance_window: None,
    };
    MigrationOrchestrator::new(collaborators, config)
}
