use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use tokio::sync::RwLock;

use crate::domain::entity::migration_job::MigrationJob;

/// PauseSignal はバッチ境界で実行中ジョブを一時停止すべきかを判定するトレイト。
/// 判定はチェックポイント保存の直後にのみ行われる。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PauseSignal: Send + Sync {
    async fn should_pause(&self, job: &MigrationJob) -> bool;
}

/// MaintenanceWindowSignal は毎日のメンテナンス時間帯（UTC）中に一時停止を要求する。
pub struct MaintenanceWindowSignal {
    start_hour: u32,
    end_hour: u32,
}

impl MaintenanceWindowSignal {
    pub fn new(start_hour: u32, end_hour: u32) -> Self {
        Self {
            start_hour: start_hour % 24,
            end_hour: end_hour % 24,
        }
    }

    /// 指定時刻がメンテナンス時間帯に含まれるかを返す。
    /// start_hour > end_hour の場合は日付をまたぐ時間帯として扱う。
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let hour = at.hour();
        if self.start_hour == self.end_hour {
            false
        } else if self.start_hour < self.end_hour {
            (self.start_hour..self.end_hour).contains(&hour)
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

#[async_trait]
impl PauseSignal for MaintenanceWindowSignal {
    async fn should_pause(&self, _job: &MigrationJob) -> bool {
        self.contains(Utc::now())
    }
}

/// ManualPauseRegistry は運用者からの一時停止要求を保持する。
#[derive(Default)]
pub struct ManualPauseRegistry {
    requested: RwLock<HashSet<String>>,
}

impl ManualPauseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn request(&self, job_id: &str) {
        self.requested.write().await.insert(job_id.to_string());
    }

    pub async fn clear(&self, job_id: &str) {
        self.requested.write().await.remove(job_id);
    }

    pub async fn is_requested(&self, job_id: &str) -> bool {
        self.requested.read().await.contains(job_id)
    }
}

#[async_trait]
impl PauseSignal for ManualPauseRegistry {
    async fn should_pause(&self, job: &MigrationJob) -> bool {
        self.is_requested(&job.job_id).await
    }
}

/// CompositePauseSignal はいずれかのシグナルが一時停止を要求した場合に一時停止する。
#[derive(Default)]
pub struct CompositePauseSignal {
    signals: Vec<Arc<dyn PauseSignal>>,
}

impl CompositePauseSignal {
    pub fn new(signals: Vec<Arc<dyn PauseSignal>>) -> Self {
        Self { signals }
    }
}

#[async_trait]
impl PauseSignal for CompositePauseSignal {
    async fn should_pause(&self, job: &MigrationJob) -> bool {
        for signal in &self.signals {
            if signal.should_pause(job).await {
                return true;
            }
        }
        false
    }
}
