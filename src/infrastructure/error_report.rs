use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::entity::migration_error::MigrationErrorRecord;
use crate::domain::entity::migration_job::MigrationJob;

/// ErrorReportGenerator はジョブ終了時のエラーレポートを生成するトレイト。
/// エラーが1件以上あるジョブに対してのみ呼び出される。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ErrorReportGenerator: Send + Sync {
    /// レポートを生成し、その保存先を返す。
    async fn generate(
        &self,
        job: &MigrationJob,
        errors: &[MigrationErrorRecord],
    ) -> anyhow::Result<String>;
}

#[derive(Debug, Serialize)]
struct ErrorReport<'a> {
    job_id: &'a str,
    original_file_name: &'a str,
    source_system: &'a str,
    target_entity: &'a str,
    status: String,
    total_records: Option<i64>,
    processed_records: i64,
    successful_records: i64,
    failed_records: i64,
    generated_at: chrono::DateTime<chrono::Utc>,
    errors_by_category: BTreeMap<String, usize>,
    errors_by_severity: BTreeMap<String, usize>,
    errors: &'a [MigrationErrorRecord],
}

/// JsonErrorReportGenerator はレポートディレクトリへ JSON ファイルとして出力する実装。
pub struct JsonErrorReportGenerator {
    report_dir: PathBuf,
}

impl JsonErrorReportGenerator {
    pub fn new(report_dir: impl Into<PathBuf>) -> Self {
        Self {
            report_dir: report_dir.into(),
        }
    }
}

#[async_trait]
impl ErrorReportGenerator for JsonErrorReportGenerator {
    async fn generate(
        &self,
        job: &MigrationJob,
        errors: &[MigrationErrorRecord],
    ) -> anyhow::Result<String> {
        let mut errors_by_category = BTreeMap::new();
        let mut errors_by_severity = BTreeMap::new();
        for error in errors {
            *errors_by_category
                .entry(error.category.to_string())
                .or_insert(0) += 1;
            *errors_by_severity
                .entry(error.severity.to_string())
                .or_insert(0) += 1;
        }

        let report = ErrorReport {
            job_id: &job.job_id,
            original_file_name: &job.original_file_name,
            source_system: &job.source_system,
            target_entity: &job.target_entity,
            status: job.status.to_string(),
            total_records: job.total_records,
            processed_records: job.processed_records,
            successful_records: job.successful_records,
            failed_records: job.failed_records,
            generated_at: chrono::Utc::now(),
            errors_by_category,
            errors_by_severity,
            errors,
        };

        tokio::fs::create_dir_all(&self.report_dir).await?;
        let path = self
            .report_dir
            .join(format!("{}-errors.json", job.job_id));
        let body = serde_json::to_vec_pretty(&report)?;
        tokio::fs::write(&path, body).await?;

        let location = path.to_string_lossy().into_owned();
        tracing::info!(
            job_id = %job.job_id,
            error_count = errors.len(),
            report = %location,
            "error report generated"
        );
        Ok(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::file_type::FileType;
    use crate::domain::entity::migration_job::NewMigrationJob;
    use crate::domain::entity::record_error::RecordError;

    fn make_job() -> MigrationJob {
        MigrationJob::new(NewMigrationJob {
            original_file_name: "contracts.csv".to_string(),
            staged_file_path: "/tmp/contracts.csv".to_string(),
            file_size: 10,
            file_checksum: None,
            file_type: FileType::DelimitedText,
            source_system: "legacy-core".to_string(),
            target_entity: "contract".to_string(),
            initiated_by: "user-1".to_string(),
            processing_node: None,
            import_config: "{}".to_string(),
            validation_rules: "{}".to_string(),
            batch_size: 4,
            max_retries: 3,
            rollback_window: chrono::Duration::days(30),
        })
    }

    #[tokio::test]
    async fn test_generate_writes_summary_and_errors() {
        let dir = tempfile::tempdir().unwrap();
        let generator = JsonErrorReportGenerator::new(dir.path());
        let job = make_job();
        let errors = vec![
            MigrationErrorRecord::from_record_error(
                &job.job_id,
                3,
                "3,,2024",
                &RecordError::invalid_input("policy_no is empty"),
            ),
            MigrationErrorRecord::from_record_error(
                &job.job_id,
                7,
                "7,X,2024",
                &RecordError::Duplicate("policy_no=X".to_string()),
            ),
        ];

        let location = generator.generate(&job, &errors).await.unwrap();
        assert!(location.ends_with(&format!("{}-errors.json", job.job_id)));

        let body: serde_json::Value =
            serde_json::from_slice(&tokio::fs::read(&location).await.unwrap()).unwrap();
        assert_eq!(body["job_id"], job.job_id.as_str());
        assert_eq!(body["errors_by_category"]["VALIDATION"], 1);
        assert_eq!(body["errors_by_category"]["DUPLICATE"], 1);
        assert_eq!(body["errors_by_severity"]["LOW"], 1);
        assert_eq!(body["errors"].as_array().unwrap().len(), 2);
        assert_eq!(body["errors"][1]["record_offset"], 7);
    }
}
