use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// StagedFile はステージング済みファイルの情報。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub path: String,
    pub size: i64,
    pub checksum_sha256: String,
}

/// FileStageManager は取り込みファイルのステージングとアーカイブを担うトレイト。
/// ステージング済みファイルは処理中に変更されない。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileStageManager: Send + Sync {
    /// ファイルをステージング領域に保存し、そのパスを返す。
    async fn stage(&self, file_name: &str, bytes: &[u8]) -> anyhow::Result<StagedFile>;

    /// ステージング済みファイルをアーカイブ領域へ移動し、移動先パスを返す。
    async fn archive(&self, path: &str, job_id: &str) -> anyhow::Result<String>;

    /// ステージング済みファイルが存在するかを返す。
    async fn exists(&self, path: &str) -> anyhow::Result<bool>;
}

/// LocalFileStageManager はローカルファイルシステム上の FileStageManager 実装。
pub struct LocalFileStageManager {
    staging_dir: PathBuf,
    archive_dir: PathBuf,
}

impl LocalFileStageManager {
    pub fn new(staging_dir: impl Into<PathBuf>, archive_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            archive_dir: archive_dir.into(),
        }
    }
}

#[async_trait]
impl FileStageManager for LocalFileStageManager {
    async fn stage(&self, file_name: &str, bytes: &[u8]) -> anyhow::Result<StagedFile> {
        tokio::fs::create_dir_all(&self.staging_dir).await?;
        let staged_name = format!("{}-{}", Uuid::new_v4().simple(), sanitize_file_name(file_name));
        let path = self.staging_dir.join(staged_name);
        tokio::fs::write(&path, bytes).await?;

        let staged = StagedFile {
            path: path.to_string_lossy().into_owned(),
            size: i64::try_from(bytes.len())?,
            checksum_sha256: hex::encode(Sha256::digest(bytes)),
        };
        tracing::debug!(path = %staged.path, size = staged.size, "file staged");
        Ok(staged)
    }

    async fn archive(&self, path: &str, job_id: &str) -> anyhow::Result<String> {
        tokio::fs::create_dir_all(&self.archive_dir).await?;
        let source = Path::new(path);
        let file_name = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow::anyhow!("invalid staged file path: {}", path))?;
        let timestamp = chrono::Utc::now().format("%Y%m%d%H%M%S");
        let target = self
            .archive_dir
            .join(format!("{job_id}-{timestamp}-{file_name}"));

        // rename はファイルシステムをまたぐと失敗するため copy + remove にフォールバックする
        if tokio::fs::rename(source, &target).await.is_err() {
            tokio::fs::copy(source, &target).await?;
            tokio::fs::remove_file(source).await?;
        }

        let archived = target.to_string_lossy().into_owned();
        tracing::info!(job_id = %job_id, archived_path = %archived, "staged file archived");
        Ok(archived)
    }

    async fn exists(&self, path: &str) -> anyhow::Result<bool> {
        Ok(tokio::fs::try_exists(path).await?)
    }
}

fn sanitize_file_name(file_name: &str) -> String {
    let base = Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");
    base.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_manager(dir: &tempfile::TempDir) -> LocalFileStageManager {
        LocalFileStageManager::new(dir.path().join("staging"), dir.path().join("archive"))
    }

    #[tokio::test]
    async fn test_stage_writes_file_with_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let manager = make_manager(&dir);

        let staged = manager.stage("contracts.csv", b"a,b\n1,2\n").await.unwrap();
        assert!(staged.path.ends_with("-contracts.csv"));
        assert_eq!(staged.size, 8);
        assert_eq!(staged.checksum_sha256.len(), 64);
        assert_eq!(tokio::fs::read(&staged.path).await.unwrap(), b"a,b\n1,2\n");
        assert!(manager.exists(&staged.path).await.unwrap());
    }

    #[tokio::test]
    async fn test_stage_sanitizes_path_components() {
        let dir = tempfile::tempdir().unwrap();
        let manager = make_manager(&dir);

        let staged = manager.stage("../../etc/pass wd.csv", b"x").await.unwrap();
        let staged_path = Path::new(&staged.path);
        assert_eq!(staged_path.parent().unwrap(), dir.path().join("staging"));
        assert!(staged.path.ends_with("pass_wd.csv"));
    }

    #[tokio::test]
    async fn test_archive_moves_file() {
        let dir = tempfile::tempdir().unwrap();
        let manager = make_manager(&dir);
        let staged = manager.stage("claims.xml", b"<claims/>").await.unwrap();

        let archived = manager.archive(&staged.path, "MIG-1").await.unwrap();
        assert!(!manager.exists(&staged.path).await.unwrap());
        assert!(Path::new(&archived).starts_with(dir.path().join("archive")));
        assert!(Path::new(&archived)
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("MIG-1-"));
        assert_eq!(tokio::fs::read(&archived).await.unwrap(), b"<claims/>");
    }

    #[tokio::test]
    async fn test_archive_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let manager = make_manager(&dir);
        let missing = dir.path().join("staging").join("missing.csv");
        assert!(manager
            .archive(missing.to_str().unwrap(), "MIG-1")
            .await
            .is_err());
    }
}
