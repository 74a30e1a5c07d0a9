use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

/// MigrationMetrics は移行エンジンのメトリクス記録を抽象化するトレイト。
#[cfg_attr(test, mockall::automock)]
pub trait MigrationMetrics: Send + Sync {
    fn record_job_submitted(&self, target_entity: &str);
    fn record_records_processed(&self, target_entity: &str, succeeded: u64, failed: u64);
    fn record_batch_duration(&self, target_entity: &str, duration_secs: f64);
    fn record_batch_retry(&self, target_entity: &str);
    /// 終端状態（COMPLETED / COMPLETED_WITH_ERRORS / FAILED）に到達したジョブを記録する。
    fn record_job_finished(&self, target_entity: &str, status: &str);
    /// バッチ間で一時停止したジョブを記録する。一時停止は終了には数えない。
    fn record_job_paused(&self, target_entity: &str);
    fn record_rollback(&self, target_entity: &str, status: &str);
}

/// バッチ処理時間用のヒストグラムバケット（秒）。
const BATCH_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

/// PrometheusMigrationMetrics は Prometheus レジストリへ記録する MigrationMetrics 実装。
pub struct PrometheusMigrationMetrics {
    jobs_submitted_total: IntCounterVec,
    records_processed_total: IntCounterVec,
    batch_duration: HistogramVec,
    batch_retries_total: IntCounterVec,
    jobs_finished_total: IntCounterVec,
    jobs_paused_total: IntCounterVec,
    rollbacks_total: IntCounterVec,
    registry: Registry,
}

impl PrometheusMigrationMetrics {
    /// new は Prometheus メトリクスを初期化して返す。
    /// service_name はメトリクスの service ラベルに使用される。
    pub fn new(service_name: &str) -> anyhow::Result<Self> {
        let registry = Registry::new();

        let jobs_submitted_total = IntCounterVec::new(
            Opts::new(
                "migration_jobs_submitted_total",
                "Total number of submitted migration jobs",
            )
            .const_label("service", service_name),
            &["target_entity"],
        )?;

        let records_processed_total = IntCounterVec::new(
            Opts::new(
                "migration_records_processed_total",
                "Total number of records processed by outcome",
            )
            .const_label("service", service_name),
            &["target_entity", "outcome"],
        )?;

        let batch_duration = HistogramVec::new(
            HistogramOpts::new(
                "migration_batch_duration_seconds",
                "Histogram of batch processing latency",
            )
            .const_label("service", service_name)
            .buckets(BATCH_BUCKETS.to_vec()),
            &["target_entity"],
        )?;

        let batch_retries_total = IntCounterVec::new(
            Opts::new(
                "migration_batch_retries_total",
                "Total number of batch-level retries",
            )
            .const_label("service", service_name),
            &["target_entity"],
        )?;

        let jobs_finished_total = IntCounterVec::new(
            Opts::new(
                "migration_jobs_finished_total",
                "Total number of migration jobs that reached a terminal status, by status",
            )
            .const_label("service", service_name),
            &["target_entity", "status"],
        )?;

        let jobs_paused_total = IntCounterVec::new(
            Opts::new(
                "migration_jobs_paused_total",
                "Total number of migration jobs paused between batches",
            )
            .const_label("service", service_name),
            &["target_entity"],
        )?;

        let rollbacks_total = IntCounterVec::new(
            Opts::new("migration_rollbacks_total", "Total number of rollbacks by result")
                .const_label("service", service_name),
            &["target_entity", "status"],
        )?;

        registry.register(Box::new(jobs_submitted_total.clone()))?;
        registry.register(Box::new(records_processed_total.clone()))?;
        registry.register(Box::new(batch_duration.clone()))?;
        registry.register(Box::new(batch_retries_total.clone()))?;
        registry.register(Box::new(jobs_finished_total.clone()))?;
        registry.register(Box::new(jobs_paused_total.clone()))?;
        registry.register(Box::new(rollbacks_total.clone()))?;

        Ok(Self {
            jobs_submitted_total,
            records_processed_total,
            batch_duration,
            batch_retries_total,
            jobs_finished_total,
            jobs_paused_total,
            rollbacks_total,
            registry,
        })
    }

    /// gather_metrics は Prometheus テキストフォーマットでメトリクスを返す。
    pub fn gather_metrics(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl MigrationMetrics for PrometheusMigrationMetrics {
    fn record_job_submitted(&self, target_entity: &str) {
        self.jobs_submitted_total
            .with_label_values(&[target_entity])
            .inc();
    }

    fn record_records_processed(&self, target_entity: &str, succeeded: u64, failed: u64) {
        self.records_processed_total
            .with_label_values(&[target_entity, "success"])
            .inc_by(succeeded);
        self.records_processed_total
            .with_label_values(&[target_entity, "failure"])
            .inc_by(failed);
    }

    fn record_batch_duration(&self, target_entity: &str, duration_secs: f64) {
        self.batch_duration
            .with_label_values(&[target_entity])
            .observe(duration_secs);
    }

    fn record_batch_retry(&self, target_entity: &str) {
        self.batch_retries_total
            .with_label_values(&[target_entity])
            .inc();
    }

    fn record_job_finished(&self, target_entity: &str, status: &str) {
        self.jobs_finished_total
            .with_label_values(&[target_entity, status])
            .inc();
    }

    fn record_job_paused(&self, target_entity: &str) {
        self.jobs_paused_total
            .with_label_values(&[target_entity])
            .inc();
    }

    fn record_rollback(&self, target_entity: &str, status: &str) {
        self.rollbacks_total
            .with_label_values(&[target_entity, status])
            .inc();
    }
}

/// NoopMigrationMetrics は何も記録しない実装。テストやメトリクス無効時に使う。
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMigrationMetrics;

impl MigrationMetrics for NoopMigrationMetrics {
    fn record_job_submitted(&self, _target_entity: &str) {}
    fn record_records_processed(&self, _target_entity: &str, _succeeded: u64, _failed: u64) {}
    fn record_batch_duration(&self, _target_entity: &str, _duration_secs: f64) {}
    fn record_batch_retry(&self, _target_entity: &str) {}
    fn record_job_finished(&self, _target_entity: &str, _status: &str) {}
    fn record_job_paused(&self, _target_entity: &str) {}
    fn record_rollback(&self, _target_entity: &str, _status: &str) {}
}
