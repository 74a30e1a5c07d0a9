use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::entity::migration_error::{ErrorCategory, ErrorSeverity, MigrationErrorRecord};
use crate::domain::entity::migration_job::{JobStatus, MigrationJob};

/// ページサイズ未指定（0以下）時の既定値。
pub const DEFAULT_PAGE_SIZE: i32 = 20;

/// page / page_size から (offset, limit) を求める。
/// page は 1 未満を 1 として扱い、page_size が 0 以下なら既定値を使う。
pub fn page_window(page: i32, page_size: i32) -> (i64, i64) {
    let page = i64::from(page.max(1));
    let page_size = if page_size > 0 {
        i64::from(page_size)
    } else {
        i64::from(DEFAULT_PAGE_SIZE)
    };
    ((page - 1) * page_size, page_size)
}

/// MigrationJobListParams はジョブ一覧取得のパラメータ。
#[derive(Debug, Clone)]
pub struct MigrationJobListParams {
    pub status: Option<JobStatus>,
    pub source_system: Option<String>,
    pub target_entity: Option<String>,
    pub initiated_by: Option<String>,
    pub page: i32,
    pub page_size: i32,
}

impl Default for MigrationJobListParams {
    fn default() -> Self {
        Self {
            status: None,
            source_system: None,
            target_entity: None,
            initiated_by: None,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// ErrorRecordListParams はエラーレコード一覧取得のパラメータ。
#[derive(Debug, Clone)]
pub struct ErrorRecordListParams {
    pub category: Option<ErrorCategory>,
    pub severity: Option<ErrorSeverity>,
    pub resolved: Option<bool>,
    pub page: i32,
    pub page_size: i32,
}

impl Default for ErrorRecordListParams {
    fn default() -> Self {
        Self {
            category: None,
            severity: None,
            resolved: None,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// MigrationJobRepository は移行ジョブとエラーレコード永続化のためのリポジトリトレイト。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MigrationJobRepository: Send + Sync {
    /// 新しいジョブを作成する。
    async fn create(&self, job: &MigrationJob) -> anyhow::Result<()>;

    /// ジョブ全体を上書き保存する。
    async fn update(&self, job: &MigrationJob) -> anyhow::Result<()>;

    /// チェックポイント・件数カウンタ・リトライ回数とバッチのエラーレコードを原子的に保存する。
    async fn save_checkpoint(
        &self,
        job: &MigrationJob,
        errors: &[MigrationErrorRecord],
    ) -> anyhow::Result<()>;

    /// 現在の状態が `from` のいずれかである場合に限り `to` へ遷移させる（compare-and-set）。
    /// 遷移できた場合は true を返す。
    async fn claim(
        &self,
        job_id: &str,
        from: &[JobStatus],
        to: &JobStatus,
        node: &str,
    ) -> anyhow::Result<bool>;

    /// ジョブIDで検索する。
    async fn find_by_job_id(&self, job_id: &str) -> anyhow::Result<Option<MigrationJob>>;

    /// ジョブ一覧を取得する。
    async fn list(&self, params: &MigrationJobListParams)
        -> anyhow::Result<(Vec<MigrationJob>, i64)>;

    /// 指定ノードで処理中のまま残っているジョブを検索する（起動時リカバリ用）。
    async fn find_active_by_node(&self, node: &str) -> anyhow::Result<Vec<MigrationJob>>;

    /// ジョブのエラーレコードを取得する。
    async fn find_errors(
        &self,
        job_id: &str,
        params: &ErrorRecordListParams,
    ) -> anyhow::Result<(Vec<MigrationErrorRecord>, i64)>;

    /// ジョブの全エラーレコードをオフセット順に取得する。
    async fn find_all_errors(&self, job_id: &str) -> anyhow::Result<Vec<MigrationErrorRecord>>;

    /// エラーレコードを内部IDで検索する。
    async fn find_error_by_id(&self, id: Uuid) -> anyhow::Result<Option<MigrationErrorRecord>>;

    /// エラーレコードの解決情報を保存する。
    async fn update_error(&self, error: &MigrationErrorRecord) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_use_first_page() {
        let jobs = MigrationJobListParams::default();
        assert_eq!((jobs.page, jobs.page_size), (1, DEFAULT_PAGE_SIZE));
        let errors = ErrorRecordListParams::default();
        assert_eq!((errors.page, errors.page_size), (1, DEFAULT_PAGE_SIZE));
    }

    #[test]
    fn test_page_window() {
        assert_eq!(page_window(1, 10), (0, 10));
        assert_eq!(page_window(3, 10), (20, 10));
        assert_eq!(page_window(0, 0), (0, i64::from(DEFAULT_PAGE_SIZE)));
        assert_eq!(page_window(2, -5), (20, 20));
    }
}
