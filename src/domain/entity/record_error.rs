/// RecordError は Record Processor が1レコードの処理で返すエラー。
///
/// `Unavailable` 以外はレコード単位の失敗としてエラーレコードに記録され、バッチは継続する。
/// `Unavailable` はプロセッサ自体が利用不能であることを示し、バッチ全体のリトライ対象になる。
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("invalid input: {message}")]
    InvalidInput {
        message: String,
        suggested_fix: Option<String>,
    },
    #[error("duplicate key: {0}")]
    Duplicate(String),
    #[error("missing reference: {0}")]
    MissingReference(String),
    #[error("malformed record: {0}")]
    Format(String),
    #[error("business rule violated: {0}")]
    BusinessRule(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("record processor unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RecordError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            suggested_fix: None,
        }
    }

    /// バッチ全体のリトライを要するエラーかどうかを返す。
    pub fn is_batch_level(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
