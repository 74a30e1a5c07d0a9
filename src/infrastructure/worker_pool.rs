use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// MigrationWorkerPool は同時に実行される移行ジョブ数を制限する。
/// 上限を超えたジョブは空きが出るまで待機する。
#[derive(Clone)]
pub struct MigrationWorkerPool {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl MigrationWorkerPool {
    pub fn new(max_concurrent_jobs: usize) -> Self {
        let capacity = max_concurrent_jobs.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 現在実行中のジョブ数を返す。
    pub fn running(&self) -> usize {
        self.capacity - self.permits.available_permits()
    }

    /// タスクをバックグラウンドで実行する。パーミットはタスク内で取得し、完了時に解放する。
    pub fn spawn<F>(&self, job_id: String, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = self.permits.clone();
        tokio::spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    tracing::error!(job_id = %job_id, error = %e, "worker pool closed");
                    return;
                }
            };
            tracing::debug!(job_id = %job_id, "migration worker acquired");
            task.await;
        })
    }
}
