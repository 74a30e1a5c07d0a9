use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::entity::audit::AuditMetadata;
use crate::domain::entity::record_error::RecordError;

/// ErrorCategory はレコードエラーの分類を表す。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    Validation,
    Duplicate,
    Reference,
    Format,
    BusinessRule,
    System,
    Permission,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "VALIDATION"),
            Self::Duplicate => write!(f, "DUPLICATE"),
            Self::Reference => write!(f, "REFERENCE"),
            Self::Format => write!(f, "FORMAT"),
            Self::BusinessRule => write!(f, "BUSINESS_RULE"),
            Self::System => write!(f, "SYSTEM"),
            Self::Permission => write!(f, "PERMISSION"),
        }
    }
}

impl ErrorCategory {
    pub fn from_str_value(s: &str) -> anyhow::Result<Self> {
        match s {
            "VALIDATION" => Ok(Self::Validation),
            "DUPLICATE" => Ok(Self::Duplicate),
            "REFERENCE" => Ok(Self::Reference),
            "FORMAT" => Ok(Self::Format),
            "BUSINESS_RULE" => Ok(Self::BusinessRule),
            "SYSTEM" => Ok(Self::System),
            "PERMISSION" => Ok(Self::Permission),
            _ => anyhow::bail!("invalid error category: {}", s),
        }
    }
}

/// ErrorSeverity はレコードエラーの重大度を表す。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl ErrorSeverity {
    pub fn from_str_value(s: &str) -> anyhow::Result<Self> {
        match s {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            "CRITICAL" => Ok(Self::Critical),
            _ => anyhow::bail!("invalid error severity: {}", s),
        }
    }
}

/// ErrorClassification はレコードエラーの分類結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorClassification {
    pub error_type: &'static str,
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
}

impl ErrorClassification {
    /// レコードエラーを分類する。未知のエラーは必ず HIGH 以上に分類する。
    pub fn of(error: &RecordError) -> Self {
        let (error_type, category, severity) = match error {
            RecordError::InvalidInput { .. } => {
                ("VALIDATION_ERROR", ErrorCategory::Validation, ErrorSeverity::Medium)
            }
            RecordError::Duplicate(_) => {
                ("DUPLICATE_KEY", ErrorCategory::Duplicate, ErrorSeverity::Low)
            }
            RecordError::MissingReference(_) => {
                ("REFERENCE_ERROR", ErrorCategory::Reference, ErrorSeverity::Medium)
            }
            RecordError::Format(_) => ("FORMAT_ERROR", ErrorCategory::Format, ErrorSeverity::Medium),
            RecordError::BusinessRule(_) => (
                "BUSINESS_RULE_ERROR",
                ErrorCategory::BusinessRule,
                ErrorSeverity::Medium,
            ),
            RecordError::PermissionDenied(_) => {
                ("PERMISSION_ERROR", ErrorCategory::Permission, ErrorSeverity::High)
            }
            RecordError::Unavailable(_) => {
                ("PROCESSOR_UNAVAILABLE", ErrorCategory::System, ErrorSeverity::Critical)
            }
            RecordError::Other(e) if is_duplicate_key_message(&e.to_string()) => {
                ("DUPLICATE_KEY", ErrorCategory::Duplicate, ErrorSeverity::Low)
            }
            RecordError::Other(_) => {
                ("PROCESSING_ERROR", ErrorCategory::System, ErrorSeverity::High)
            }
        };
        Self {
            error_type,
            category,
            severity,
        }
    }
}

fn is_duplicate_key_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("duplicate key") || lower.contains("unique constraint")
}

/// MigrationErrorRecord はレコード単位の失敗を表す。処理中は追記のみで、エンジンは削除しない。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationErrorRecord {
    pub audit: AuditMetadata,
    pub job_id: String,
    pub record_offset: i64,
    pub error_type: String,
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub error_message: String,
    pub raw_record: Option<String>,
    pub suggested_fix: Option<String>,
    pub resolved: bool,
    pub resolved_by: Option<String>,
    pub resolution_notes: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl MigrationErrorRecord {
    /// 分類済みのエラーレコードを作成する。
    pub fn from_record_error(
        job_id: &str,
        record_offset: i64,
        raw_record: &str,
        error: &RecordError,
    ) -> Self {
        let classification = ErrorClassification::of(error);
        let suggested_fix = match error {
            RecordError::InvalidInput { suggested_fix, .. } => suggested_fix.clone(),
            RecordError::Duplicate(_) => {
                Some("record already exists in target; skip or update the source row".to_string())
            }
            RecordError::MissingReference(_) => {
                Some("import the referenced entity before this record".to_string())
            }
            _ => None,
        };
        Self {
            audit: AuditMetadata::new(),
            job_id: job_id.to_string(),
            record_offset,
            error_type: classification.error_type.to_string(),
            category: classification.category,
            severity: classification.severity,
            error_message: error.to_string(),
            raw_record: Some(raw_record.to_string()),
            suggested_fix,
            resolved: false,
            resolved_by: None,
            resolution_notes: None,
            resolved_at: None,
        }
    }

    /// 運用者の確認後、エンジン外で解決済みにする。
    pub fn resolve(&mut self, resolved_by: String, notes: Option<String>) {
        self.resolved = true;
        self.resolved_by = Some(resolved_by);
        self.resolution_notes = notes;
        self.resolved_at = Some(Utc::now());
        self.audit.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_input_is_validation_medium() {
        let c = ErrorClassification::of(&RecordError::invalid_input("policy_no is empty"));
        assert_eq!(c.category, ErrorCategory::Validation);
        assert_eq!(c.severity, ErrorSeverity::Medium);
        assert_eq!(c.error_type, "VALIDATION_ERROR");
    }

    #[test]
    fn test_duplicate_message_is_duplicate_low() {
        let err = RecordError::Other(anyhow::anyhow!(
            "ERROR: duplicate key value violates unique constraint \"contracts_pkey\""
        ));
        let c = ErrorClassification::of(&err);
        assert_eq!(c.category, ErrorCategory::Duplicate);
        assert_eq!(c.severity, ErrorSeverity::Low);
    }

    #[test]
    fn test_unknown_error_defaults_to_high() {
        let err = RecordError::Other(anyhow::anyhow!("connection reset by peer"));
        let c = ErrorClassification::of(&err);
        assert_eq!(c.error_type, "PROCESSING_ERROR");
        assert_eq!(c.category, ErrorCategory::System);
        assert!(c.severity >= ErrorSeverity::High);
    }

    #[test]
    fn test_from_record_error_keeps_payload_and_fix() {
        let err = RecordError::InvalidInput {
            message: "start_date after end_date".to_string(),
            suggested_fix: Some("swap the dates".to_string()),
        };
        let record = MigrationErrorRecord::from_record_error("MIG-1", 7, "7,ACME,2024-02-01", &err);
        assert_eq!(record.job_id, "MIG-1");
        assert_eq!(record.record_offset, 7);
        assert_eq!(record.raw_record.as_deref(), Some("7,ACME,2024-02-01"));
        assert_eq!(record.suggested_fix.as_deref(), Some("swap the dates"));
        assert!(!record.resolved);
    }

    #[test]
    fn test_resolve() {
        let err = RecordError::Format("unterminated quote".to_string());
        let mut record = MigrationErrorRecord::from_record_error("MIG-1", 0, "\"abc", &err);
        record.resolve("ops-1".to_string(), Some("fixed in source".to_string()));
        assert!(record.resolved);
        assert_eq!(record.resolved_by.as_deref(), Some("ops-1"));
        assert!(record.resolved_at.is_some());
    }

    #[test]
    fn test_category_and_severity_parse() {
        assert_eq!(
            ErrorCategory::from_str_value("BUSINESS_RULE").unwrap(),
            ErrorCategory::BusinessRule
        );
        assert_eq!(ErrorSeverity::from_str_value("CRITICAL").unwrap(), ErrorSeverity::Critical);
        assert!(ErrorCategory::from_str_value("PROCESSING").is_err());
        assert!(ErrorSeverity::from_str_value("SEVERE").is_err());
    }
}
