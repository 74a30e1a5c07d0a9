use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::entity::file_type::FileType;
use crate::domain::entity::migration_job::MigrationJob;
use crate::domain::entity::record_error::RecordError;

/// RecordProcessor は対象エンティティごとのデコード・検証・永続化・補償を担うトレイト。
///
/// `process` は同一レコードが再処理されても安全（冪等）であることが期待される。
/// エンジンはチェックポイント以前のレコードを再処理しないが、チェックポイント保存前の障害では
/// 最大1バッチ分が再処理されうる。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordProcessor: Send + Sync {
    /// ファイルが宣言された形式として構造的に妥当かを返す。
    async fn validate_file_shape(&self, path: &str, file_type: FileType) -> anyhow::Result<bool>;

    /// ファイル内の総レコード数を返す。
    async fn count_records(&self, path: &str, file_type: FileType) -> anyhow::Result<i64>;

    /// offset から最大 size 件の生レコードを読み込む。空の場合はファイル終端を意味する。
    async fn read_batch(
        &self,
        path: &str,
        file_type: FileType,
        offset: i64,
        size: i32,
    ) -> anyhow::Result<Vec<String>>;

    /// 1レコードを検証・変換・永続化する。
    async fn process(&self, record: &str, job: &MigrationJob) -> Result<(), RecordError>;

    /// ジョブが書き込んだ内容をすべて取り消す。ジョブ単位で all-or-nothing として扱われる。
    async fn compensate(&self, job: &MigrationJob) -> anyhow::Result<()>;
}

/// RecordProcessorRegistry は対象エンティティ名から RecordProcessor を解決する。
#[derive(Default)]
pub struct RecordProcessorRegistry {
    processors: HashMap<String, Arc<dyn RecordProcessor>>,
}

impl RecordProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 対象エンティティのプロセッサを登録する。
    pub fn register(
        mut self,
        target_entity: impl Into<String>,
        processor: Arc<dyn RecordProcessor>,
    ) -> Self {
        self.processors.insert(target_entity.into(), processor);
        self
    }

    /// 対象エンティティのプロセッサを解決する。
    pub fn resolve(&self, target_entity: &str) -> anyhow::Result<Arc<dyn RecordProcessor>> {
        self.processors
            .get(target_entity)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no record processor for target entity: {}", target_entity))
    }

    pub fn supports(&self, target_entity: &str) -> bool {
        self.processors.contains_key(target_entity)
    }

    pub fn target_entities(&self) -> Vec<String> {
        let mut names: Vec<_> = self.processors.keys().cloned().collect();
        names.sort();
        names
    }
}
