use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entity::audit::AuditMetadata;
use crate::domain::entity::file_type::FileType;
use crate::domain::entity::migration_error::{ErrorCategory, ErrorSeverity, MigrationErrorRecord};
use crate::domain::entity::migration_job::{JobStatus, MigrationJob};
use crate::domain::repository::{
    page_window, ErrorRecordListParams, MigrationJobListParams, MigrationJobRepository,
};

const JOB_COLUMNS: &str = "id, job_id, original_file_name, staged_file_path, archived_file_path, \
    file_size, file_checksum, file_type, source_system, target_entity, initiated_by, \
    processing_node, import_config, validation_rules, total_records, processed_records, \
    successful_records, failed_records, batch_size, checkpoint_position, progress_percentage, \
    retry_count, max_retries, started_at, paused_at, completed_at, can_rollback, \
    rollback_deadline, rollback_reason, rolled_back_by, rolled_back_at, status, error_summary, \
    created_at, updated_at";

const ERROR_COLUMNS: &str = "id, job_id, record_offset, error_type, category, severity, \
    error_message, raw_record, suggested_fix, resolved, resolved_by, resolution_notes, \
    resolved_at, created_at, updated_at";

/// MigrationJobPostgresRepository は PostgreSQL 実装の移行ジョブリポジトリ。
pub struct MigrationJobPostgresRepository {
    pool: PgPool,
}

impl MigrationJobPostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MigrationJobRepository for MigrationJobPostgresRepository {
    async fn create(&self, job: &MigrationJob) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO data_migration.migration_jobs
                (id, job_id, original_file_name, staged_file_path, archived_file_path,
                 file_size, file_checksum, file_type, source_system, target_entity, initiated_by,
                 processing_node, import_config, validation_rules, total_records, processed_records,
                 successful_records, failed_records, batch_size, checkpoint_position, progress_percentage,
                 retry_count, max_retries, started_at, paused_at, completed_at, can_rollback,
                 rollback_deadline, rollback_reason, rolled_back_by, rolled_back_at, status, error_summary,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18,
                    $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30, $31, $32, $33, $34, $35)
            "#,
        )
        .bind(job.audit.id)
        .bind(&job.job_id)
        .bind(&job.original_file_name)
        .bind(&job.staged_file_path)
        .bind(&job.archived_file_path)
        .bind(job.file_size)
        .bind(&job.file_checksum)
        .bind(job.file_type.to_string())
        .bind(&job.source_system)
        .bind(&job.target_entity)
        .bind(&job.initiated_by)
        .bind(&job.processing_node)
        .bind(&job.import_config)
        .bind(&job.validation_rules)
        .bind(job.total_records)
        .bind(job.processed_records)
        .bind(job.successful_records)
        .bind(job.failed_records)
        .bind(job.batch_size)
        .bind(job.checkpoint_position)
        .bind(job.progress_percentage)
        .bind(job.retry_count)
        .bind(job.max_retries)
        .bind(job.started_at)
        .bind(job.paused_at)
        .bind(job.completed_at)
        .bind(job.can_rollback)
        .bind(job.rollback_deadline)
        .bind(&job.rollback_reason)
        .bind(&job.rolled_back_by)
        .bind(job.rolled_back_at)
        .bind(job.status.to_string())
        .bind(&job.error_summary)
        .bind(job.audit.created_at)
        .bind(job.audit.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, job: &MigrationJob) -> anyhow::Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE data_migration.migration_jobs
            SET archived_file_path = $2, processing_node = $3, total_records = $4,
                processed_records = $5, successful_records = $6, failed_records = $7,
                batch_size = $8, checkpoint_position = $9, progress_percentage = $10,
                retry_count = $11, max_retries = $12, started_at = $13, paused_at = $14,
                completed_at = $15, can_rollback = $16, rollback_reason = $17,
                rolled_back_by = $18, rolled_back_at = $19, status = $20, error_summary = $21,
                updated_at = NOW()
            WHERE job_id = $1
            "#,
        )
        .bind(&job.job_id)
        .bind(&job.archived_file_path)
        .bind(&job.processing_node)
        .bind(job.total_records)
        .bind(job.processed_records)
        .bind(job.successful_records)
        .bind(job.failed_records)
        .bind(job.batch_size)
        .bind(job.checkpoint_position)
        .bind(job.progress_percentage)
        .bind(job.retry_count)
        .bind(job.max_retries)
        .bind(job.started_at)
        .bind(job.paused_at)
        .bind(job.completed_at)
        .bind(job.can_rollback)
        .bind(&job.rollback_reason)
        .bind(&job.rolled_back_by)
        .bind(job.rolled_back_at)
        .bind(job.status.to_string())
        .bind(&job.error_summary)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            anyhow::bail!("migration job not found: {}", job.job_id);
        }
        Ok(())
    }

    async fn save_checkpoint(
        &self,
        job: &MigrationJob,
        errors: &[MigrationErrorRecord],
    ) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        // チェックポイントが後退する更新は行わない
        let result = sqlx::query(
            r#"
            UPDATE data_migration.migration_jobs
            SET processed_records = $2, successful_records = $3, failed_records = $4,
                checkpoint_position = $5, progress_percentage = $6, retry_count = $7,
                updated_at = NOW()
            WHERE job_id = $1 AND checkpoint_position <= $5
            "#,
        )
        .bind(&job.job_id)
        .bind(job.processed_records)
        .bind(job.successful_records)
        .bind(job.failed_records)
        .bind(job.checkpoint_position)
        .bind(job.progress_percentage)
        .bind(job.retry_count)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            anyhow::bail!(
                "checkpoint rejected for job {} at offset {}",
                job.job_id,
                job.checkpoint_position
            );
        }

        for error in errors {
            sqlx::query(
                r#"
                INSERT INTO data_migration.migration_errors
                    (id, job_id, record_offset, error_type, category, severity, error_message,
                     raw_record, suggested_fix, resolved, resolved_by, resolution_notes, resolved_at,
                     created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                "#,
            )
            .bind(error.audit.id)
            .bind(&error.job_id)
            .bind(error.record_offset)
            .bind(&error.error_type)
            .bind(error.category.to_string())
            .bind(error.severity.to_string())
            .bind(&error.error_message)
            .bind(&error.raw_record)
            .bind(&error.suggested_fix)
            .bind(error.resolved)
            .bind(&error.resolved_by)
            .bind(&error.resolution_notes)
            .bind(error.resolved_at)
            .bind(error.audit.created_at)
            .bind(error.audit.updated_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    async fn claim(
        &self,
        job_id: &str,
        from: &[JobStatus],
        to: &JobStatus,
        node: &str,
    ) -> anyhow::Result<bool> {
        let from: Vec<String> = from.iter().map(ToString::to_string).collect();
        let result = sqlx::query(
            r#"
            UPDATE data_migration.migration_jobs
            SET status = $3, processing_node = $4, updated_at = NOW()
            WHERE job_id = $1 AND status = ANY($2)
            "#,
        )
        .bind(job_id)
        .bind(&from)
        .bind(to.to_string())
        .bind(node)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_by_job_id(&self, job_id: &str) -> anyhow::Result<Option<MigrationJob>> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM data_migration.migration_jobs WHERE job_id = $1"
        );
        let row = sqlx::query_as::<_, MigrationJobRow>(&sql)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list(
        &self,
        params: &MigrationJobListParams,
    ) -> anyhow::Result<(Vec<MigrationJob>, i64)> {
        let mut conditions = Vec::new();
        let mut bind_idx = 1u32;

        if params.status.is_some() {
            conditions.push(format!("status = ${bind_idx}"));
            bind_idx += 1;
        }
        if params.source_system.is_some() {
            conditions.push(format!("source_system = ${bind_idx}"));
            bind_idx += 1;
        }
        if params.target_entity.is_some() {
            conditions.push(format!("target_entity = ${bind_idx}"));
            bind_idx += 1;
        }
        if params.initiated_by.is_some() {
            conditions.push(format!("initiated_by = ${bind_idx}"));
            bind_idx += 1;
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!(
            "SELECT COUNT(*) as count FROM data_migration.migration_jobs {where_clause}"
        );
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(ref s) = params.status {
            count_query = count_query.bind(s.to_string());
        }
        if let Some(ref ss) = params.source_system {
            count_query = count_query.bind(ss);
        }
        if let Some(ref te) = params.target_entity {
            count_query = count_query.bind(te);
        }
        if let Some(ref ib) = params.initiated_by {
            count_query = count_query.bind(ib);
        }
        let total = count_query.fetch_one(&self.pool).await?;

        let (offset, limit) = page_window(params.page, params.page_size);
        let data_sql = format!(
            "SELECT {JOB_COLUMNS} FROM data_migration.migration_jobs {where_clause} ORDER BY created_at DESC LIMIT ${} OFFSET ${}",
            bind_idx,
            bind_idx + 1
        );

        let mut data_query = sqlx::query_as::<_, MigrationJobRow>(&data_sql);
        if let Some(ref s) = params.status {
            data_query = data_query.bind(s.to_string());
        }
        if let Some(ref ss) = params.source_system {
            data_query = data_query.bind(ss);
        }
        if let Some(ref te) = params.target_entity {
            data_query = data_query.bind(te);
        }
        if let Some(ref ib) = params.initiated_by {
            data_query = data_query.bind(ib);
        }
        data_query = data_query.bind(limit).bind(offset);

        let rows = data_query.fetch_all(&self.pool).await?;
        let jobs: anyhow::Result<Vec<MigrationJob>> =
            rows.into_iter().map(TryInto::try_into).collect();

        Ok((jobs?, total))
    }

    async fn find_active_by_node(&self, node: &str) -> anyhow::Result<Vec<MigrationJob>> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM data_migration.migration_jobs \
             WHERE processing_node = $1 AND status IN ('VALIDATING', 'IN_PROGRESS', 'ROLLBACK_IN_PROGRESS') \
             ORDER BY created_at"
        );
        let rows = sqlx::query_as::<_, MigrationJobRow>(&sql)
            .bind(node)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn find_errors(
        &self,
        job_id: &str,
        params: &ErrorRecordListParams,
    ) -> anyhow::Result<(Vec<MigrationErrorRecord>, i64)> {
        let mut conditions = vec!["job_id = $1".to_string()];
        let mut bind_idx = 2u32;

        if params.category.is_some() {
            conditions.push(format!("category = ${bind_idx}"));
            bind_idx += 1;
        }
        if params.severity.is_some() {
            conditions.push(format!("severity = ${bind_idx}"));
            bind_idx += 1;
        }
        if params.resolved.is_some() {
            conditions.push(format!("resolved = ${bind_idx}"));
            bind_idx += 1;
        }
        let where_clause = format!("WHERE {}", conditions.join(" AND "));

        let count_sql = format!(
            "SELECT COUNT(*) as count FROM data_migration.migration_errors {where_clause}"
        );
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql).bind(job_id);
        if let Some(c) = params.category {
            count_query = count_query.bind(c.to_string());
        }
        if let Some(s) = params.severity {
            count_query = count_query.bind(s.to_string());
        }
        if let Some(r) = params.resolved {
            count_query = count_query.bind(r);
        }
        let total = count_query.fetch_one(&self.pool).await?;

        let (offset, limit) = page_window(params.page, params.page_size);
        let data_sql = format!(
            "SELECT {ERROR_COLUMNS} FROM data_migration.migration_errors {where_clause} ORDER BY record_offset LIMIT ${} OFFSET ${}",
            bind_idx,
            bind_idx + 1
        );

        let mut data_query = sqlx::query_as::<_, MigrationErrorRow>(&data_sql).bind(job_id);
        if let Some(c) = params.category {
            data_query = data_query.bind(c.to_string());
        }
        if let Some(s) = params.severity {
            data_query = data_query.bind(s.to_string());
        }
        if let Some(r) = params.resolved {
            data_query = data_query.bind(r);
        }
        data_query = data_query.bind(limit).bind(offset);

        let rows = data_query.fetch_all(&self.pool).await?;
        let errors: anyhow::Result<Vec<MigrationErrorRecord>> =
            rows.into_iter().map(TryInto::try_into).collect();

        Ok((errors?, total))
    }

    async fn find_all_errors(&self, job_id: &str) -> anyhow::Result<Vec<MigrationErrorRecord>> {
        let sql = format!(
            "SELECT {ERROR_COLUMNS} FROM data_migration.migration_errors WHERE job_id = $1 ORDER BY record_offset"
        );
        let rows = sqlx::query_as::<_, MigrationErrorRow>(&sql)
            .bind(job_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn find_error_by_id(&self, id: Uuid) -> anyhow::Result<Option<MigrationErrorRecord>> {
        let sql = format!("SELECT {ERROR_COLUMNS} FROM data_migration.migration_errors WHERE id = $1");
        let row = sqlx::query_as::<_, MigrationErrorRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn update_error(&self, error: &MigrationErrorRecord) -> anyhow::Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE data_migration.migration_errors
            SET resolved = $2, resolved_by = $3, resolution_notes = $4, resolved_at = $5,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(error.audit.id)
        .bind(error.resolved)
        .bind(&error.resolved_by)
        .bind(&error.resolution_notes)
        .bind(error.resolved_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            anyhow::bail!("error record not found: {}", error.audit.id);
        }
        Ok(())
    }
}

/// MigrationJobRow はDB行からのマッピング用。
#[derive(sqlx::FromRow)]
struct MigrationJobRow {
    id: Uuid,
    job_id: String,
    original_file_name: String,
    staged_file_path: String,
    archived_file_path: Option<String>,
    file_size: i64,
    file_checksum: Option<String>,
    file_type: String,
    source_system: String,
    target_entity: String,
    initiated_by: String,
    processing_node: Option<String>,
    import_config: String,
    validation_rules: String,
    total_records: Option<i64>,
    processed_records: i64,
    successful_records: i64,
    failed_records: i64,
    batch_size: i32,
    checkpoint_position: i64,
    progress_percentage: f64,
    retry_count: i32,
    max_retries: i32,
    started_at: Option<DateTime<Utc>>,
    paused_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    can_rollback: bool,
    rollback_deadline: DateTime<Utc>,
    rollback_reason: Option<String>,
    rolled_back_by: Option<String>,
    rolled_back_at: Option<DateTime<Utc>>,
    status: String,
    error_summary: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MigrationJobRow> for MigrationJob {
    type Error = anyhow::Error;

    fn try_from(row: MigrationJobRow) -> anyhow::Result<Self> {
        Ok(MigrationJob {
            audit: AuditMetadata {
                id: row.id,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
            job_id: row.job_id,
            original_file_name: row.original_file_name,
            staged_file_path: row.staged_file_path,
            archived_file_path: row.archived_file_path,
            file_size: row.file_size,
            file_checksum: row.file_checksum,
            file_type: FileType::from_str_value(&row.file_type)?,
            source_system: row.source_system,
            target_entity: row.target_entity,
            initiated_by: row.initiated_by,
            processing_node: row.processing_node,
            import_config: row.import_config,
            validation_rules: row.validation_rules,
            total_records: row.total_records,
            processed_records: row.processed_records,
            successful_records: row.successful_records,
            failed_records: row.failed_records,
            batch_size: row.batch_size,
            checkpoint_position: row.checkpoint_position,
            progress_percentage: row.progress_percentage,
            retry_count: row.retry_count,
            max_retries: row.max_retries,
            started_at: row.started_at,
            paused_at: row.paused_at,
            completed_at: row.completed_at,
            can_rollback: row.can_rollback,
            rollback_deadline: row.rollback_deadline,
            rollback_reason: row.rollback_reason,
            rolled_back_by: row.rolled_back_by,
            rolled_back_at: row.rolled_back_at,
            status: JobStatus::from_str_value(&row.status)?,
            error_summary: row.error_summary,
        })
    }
}

/// MigrationErrorRow はDB行からのマッピング用。
#[derive(sqlx::FromRow)]
struct MigrationErrorRow {
    id: Uuid,
    job_id: String,
    record_offset: i64,
    error_type: String,
    category: String,
    severity: String,
    error_message: String,
    raw_record: Option<String>,
    suggested_fix: Option<String>,
    resolved: bool,
    resolved_by: Option<String>,
    resolution_notes: Option<String>,
    resolved_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MigrationErrorRow> for MigrationErrorRecord {
    type Error = anyhow::Error;

    fn try_from(row: MigrationErrorRow) -> anyhow::Result<Self> {
        Ok(MigrationErrorRecord {
            audit: AuditMetadata {
                id: row.id,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
            job_id: row.job_id,
            record_offset: row.record_offset,
            error_type: row.error_type,
            category: ErrorCategory::from_str_value(&row.category)?,
            severity: ErrorSeverity::from_str_value(&row.severity)?,
            error_message: row.error_message,
            raw_record: row.raw_record,
            suggested_fix: row.suggested_fix,
            resolved: row.resolved,
            resolved_by: row.resolved_by,
            resolution_notes: row.resolution_notes,
            resolved_at: row.resolved_at,
        })
    }
}
