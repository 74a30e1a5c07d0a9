use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::infrastructure::database::DatabaseConfig;

/// Config はアプリケーション全体の設定。
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub migration: MigrationConfig,
    #[serde(default)]
    pub maintenance: Option<MaintenanceWindowConfig>,
    /// 対象エンティティ名 → 既定の検証ルール（Record Processor のみが解釈する）。
    #[serde(default)]
    pub validation_rules: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// YAML ファイルから設定を読み込む。
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// `CONFIG_PATH`（既定: config/config.yaml）から設定を読み込む。
    pub fn load_from_env() -> anyhow::Result<Self> {
        let path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/config.yaml".to_string());
        Self::load(path)
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let cfg: Self = serde_yaml::from_str(content)?;
        cfg.migration.validate()?;
        Ok(cfg)
    }
}

/// AppConfig はアプリケーション設定。
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_environment() -> String {
    "dev".to_string()
}

/// MigrationConfig は移行エンジン固有の設定。
#[derive(Debug, Clone, Deserialize)]
pub struct MigrationConfig {
    #[serde(default = "default_batch_size")]
    pub default_batch_size: i32,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: i32,
    #[serde(default = "default_max_retries")]
    pub max_retries: i32,
    /// 線形バックオフの単位（retry_count × この値だけ待機する）。
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_rollback_window_days")]
    pub rollback_window_days: i64,
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    #[serde(default = "default_staging_dir")]
    pub staging_dir: String,
    #[serde(default = "default_archive_dir")]
    pub archive_dir: String,
    #[serde(default = "default_report_dir")]
    pub report_dir: String,
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub auto_resume_interrupted: bool,
}

fn default_batch_size() -> i32 {
    1000
}

fn default_max_batch_size() -> i32 {
    10_000
}

fn default_max_retries() -> i32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    5000
}

fn default_rollback_window_days() -> i64 {
    30
}

fn default_max_concurrent_jobs() -> usize {
    4
}

fn default_staging_dir() -> String {
    "data/staging".to_string()
}

fn default_archive_dir() -> String {
    "data/archive".to_string()
}

fn default_report_dir() -> String {
    "data/reports".to_string()
}

fn default_node_id() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            default_batch_size: default_batch_size(),
            max_batch_size: default_max_batch_size(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            rollback_window_days: default_rollback_window_days(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            staging_dir: default_staging_dir(),
            archive_dir: default_archive_dir(),
            report_dir: default_report_dir(),
            node_id: default_node_id(),
            auto_resume_interrupted: false,
        }
    }
}

impl MigrationConfig {
    /// 設定値の整合性を検証する。
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.default_batch_size < 1 {
            anyhow::bail!("migration.default_batch_size must be positive");
        }
        if self.max_batch_size < self.default_batch_size {
            anyhow::bail!("migration.max_batch_size must be >= default_batch_size");
        }
        if self.max_retries < 1 {
            anyhow::bail!("migration.max_retries must be at least 1");
        }
        if self.rollback_window_days < 0 {
            anyhow::bail!("migration.rollback_window_days must not be negative");
        }
        if self.max_concurrent_jobs == 0 {
            anyhow::bail!("migration.max_concurrent_jobs must be positive");
        }
        Ok(())
    }

    pub fn retry_backoff_unit(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn rollback_window(&self) -> chrono::Duration {
        chrono::Duration::days(self.rollback_window_days)
    }
}

/// MaintenanceWindowConfig は毎日のメンテナンス時間帯（UTC、時単位）を表す。
/// start_hour > end_hour の場合は日付をまたぐ時間帯として扱う。
#[derive(Debug, Clone, Deserialize)]
pub struct MaintenanceWindowConfig {
    pub start_hour: u32,
    pub end_hour: u32,
}

/// LoggingConfig はログ出力設定。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
        }
    }
}
