use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// AuditMetadata は永続化エンティティ共通の監査情報（内部主キーと作成・更新時刻）を表す。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditMetadata {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AuditMetadata {
    /// 新しい監査情報を作成する。
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        }
    }

    /// 更新時刻を現在時刻にする。
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Default for AuditMetadata {
    fn default() -> Self {
        Self::new()
    }
}
