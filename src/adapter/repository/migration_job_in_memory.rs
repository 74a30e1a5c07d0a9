use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::entity::migration_error::MigrationErrorRecord;
use crate::domain::entity::migration_job::{JobStatus, MigrationJob};
use crate::domain::repository::{
    page_window, ErrorRecordListParams, MigrationJobListParams, MigrationJobRepository,
};

/// InMemoryMigrationJobRepository はインメモリの移行ジョブリポジトリ。
/// データベース未設定時の開発モードと統合テストで使用する。
pub struct InMemoryMigrationJobRepository {
    jobs: RwLock<Vec<MigrationJob>>,
    errors: RwLock<Vec<MigrationErrorRecord>>,
}

impl InMemoryMigrationJobRepository {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(Vec::new()),
            errors: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryMigrationJobRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn paginate<T>(items: Vec<T>, page: i32, page_size: i32) -> Vec<T> {
    let (offset, limit) = page_window(page, page_size);
    let offset = usize::try_from(offset).unwrap_or(usize::MAX);
    let limit = usize::try_from(limit).unwrap_or_default();
    items.into_iter().skip(offset).take(limit).collect()
}

#[async_trait]
impl MigrationJobRepository for InMemoryMigrationJobRepository {
    async fn create(&self, job: &MigrationJob) -> anyhow::Result<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.iter().any(|j| j.job_id == job.job_id) {
            anyhow::bail!("migration job already exists: {}", job.job_id);
        }
        jobs.push(job.clone());
        Ok(())
    }

    async fn update(&self, job: &MigrationJob) -> anyhow::Result<()> {
        let mut jobs = self.jobs.write().await;
        let existing = jobs
            .iter_mut()
            .find(|j| j.job_id == job.job_id)
            .ok_or_else(|| anyhow::anyhow!("migration job not found: {}", job.job_id))?;
        *existing = job.clone();
        Ok(())
    }

    async fn save_checkpoint(
        &self,
        job: &MigrationJob,
        errors: &[MigrationErrorRecord],
    ) -> anyhow::Result<()> {
        // ジョブとエラーの両方のロックを保持したまま更新し、途中状態を見せない
        let mut jobs = self.jobs.write().await;
        let mut stored_errors = self.errors.write().await;
        let existing = jobs
            .iter_mut()
            .find(|j| j.job_id == job.job_id)
            .ok_or_else(|| anyhow::anyhow!("migration job not found: {}", job.job_id))?;
        if job.checkpoint_position < existing.checkpoint_position {
            anyhow::bail!(
                "checkpoint must not move backwards: {} -> {}",
                existing.checkpoint_position,
                job.checkpoint_position
            );
        }
        *existing = job.clone();
        stored_errors.extend_from_slice(errors);
        Ok(())
    }

    async fn claim(
        &self,
        job_id: &str,
        from: &[JobStatus],
        to: &JobStatus,
        node: &str,
    ) -> anyhow::Result<bool> {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.iter_mut().find(|j| j.job_id == job_id) else {
            return Ok(false);
        };
        if !from.contains(&job.status) {
            return Ok(false);
        }
        job.status = to.clone();
        job.processing_node = Some(node.to_string());
        job.audit.touch();
        Ok(true)
    }

    async fn find_by_job_id(&self, job_id: &str) -> anyhow::Result<Option<MigrationJob>> {
        let jobs = self.jobs.read().await;
        Ok(jobs.iter().find(|j| j.job_id == job_id).cloned())
    }

    async fn list(
        &self,
        params: &MigrationJobListParams,
    ) -> anyhow::Result<(Vec<MigrationJob>, i64)> {
        let jobs = self.jobs.read().await;
        let mut filtered: Vec<_> = jobs
            .iter()
            .filter(|j| {
                if let Some(ref status) = params.status {
                    if j.status != *status {
                        return false;
                    }
                }
                if let Some(ref source) = params.source_system {
                    if j.source_system != *source {
                        return false;
                    }
                }
                if let Some(ref target) = params.target_entity {
                    if j.target_entity != *target {
                        return false;
                    }
                }
                if let Some(ref initiator) = params.initiated_by {
                    if j.initiated_by != *initiator {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();
        filtered.sort_by(|a, b| b.audit.created_at.cmp(&a.audit.created_at));

        let total = i64::try_from(filtered.len())?;
        Ok((paginate(filtered, params.page, params.page_size), total))
    }

    async fn find_active_by_node(&self, node: &str) -> anyhow::Result<Vec<MigrationJob>> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .iter()
            .filter(|j| j.status.is_active() && j.processing_node.as_deref() == Some(node))
            .cloned()
            .collect())
    }

    async fn find_errors(
        &self,
        job_id: &str,
        params: &ErrorRecordListParams,
    ) -> anyhow::Result<(Vec<MigrationErrorRecord>, i64)> {
        let errors = self.errors.read().await;
        let mut filtered: Vec<_> = errors
            .iter()
            .filter(|e| {
                e.job_id == job_id
                    && params.category.is_none_or(|c| e.category == c)
                    && params.severity.is_none_or(|s| e.severity == s)
                    && params.resolved.is_none_or(|r| e.resolved == r)
            })
            .cloned()
            .collect();
        filtered.sort_by_key(|e| e.record_offset);

        let total = i64::try_from(filtered.len())?;
        Ok((paginate(filtered, params.page, params.page_size), total))
    }

    async fn find_all_errors(&self, job_id: &str) -> anyhow::Result<Vec<MigrationErrorRecord>> {
        let errors = self.errors.read().await;
        let mut found: Vec<_> = errors
            .iter()
            .filter(|e| e.job_id == job_id)
            .cloned()
            .collect();
        found.sort_by_key(|e| e.record_offset);
        Ok(found)
    }

    async fn find_error_by_id(&self, id: Uuid) -> anyhow::Result<Option<MigrationErrorRecord>> {
        let errors = self.errors.read().await;
        Ok(errors.iter().find(|e| e.audit.id == id).cloned())
    }

    async fn update_error(&self, error: &MigrationErrorRecord) -> anyhow::Result<()> {
        let mut errors = self.errors.write().await;
        let existing = errors
            .iter_mut()
            .find(|e| e.audit.id == error.audit.id)
            .ok_or_else(|| anyhow::anyhow!("error record not found: {}", error.audit.id))?;
        *existing = error.clone();
        Ok(())
    }
}
