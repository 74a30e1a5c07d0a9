use serde::{Deserialize, Serialize};

/// FileType は取り込みファイルの形式を表す。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileType {
    DelimitedText,
    StructuredMarkup,
    ObjectNotation,
    Spreadsheet,
    LegacyProprietary,
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DelimitedText => write!(f, "DELIMITED_TEXT"),
            Self::StructuredMarkup => write!(f, "STRUCTURED_MARKUP"),
            Self::ObjectNotation => write!(f, "OBJECT_NOTATION"),
            Self::Spreadsheet => write!(f, "SPREADSHEET"),
            Self::LegacyProprietary => write!(f, "LEGACY_PROPRIETARY"),
        }
    }
}

impl FileType {
    pub fn from_str_value(s: &str) -> anyhow::Result<Self> {
        match s {
            "DELIMITED_TEXT" => Ok(Self::DelimitedText),
            "STRUCTURED_MARKUP" => Ok(Self::StructuredMarkup),
            "OBJECT_NOTATION" => Ok(Self::ObjectNotation),
            "SPREADSHEET" => Ok(Self::Spreadsheet),
            "LEGACY_PROPRIETARY" => Ok(Self::LegacyProprietary),
            _ => anyhow::bail!("invalid file type: {}", s),
        }
    }

    /// ファイル名・Content-Type・先頭バイトから形式を推定する。
    ///
    /// 拡張子 → Content-Type → マジックバイトの順に判定し、いずれにも当てはまらない場合は
    /// レガシー独自形式として扱う。
    pub fn detect(file_name: &str, content_type: Option<&str>, head: &[u8]) -> Self {
        if let Some(file_type) = Self::from_extension(file_name) {
            return file_type;
        }
        if let Some(file_type) = content_type.and_then(Self::from_content_type) {
            return file_type;
        }
        if let Some(file_type) = infer::get(head).and_then(|t| Self::from_extension_str(t.extension()))
        {
            return file_type;
        }
        Self::LegacyProprietary
    }

    fn from_extension(file_name: &str) -> Option<Self> {
        let ext = std::path::Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())?
            .to_ascii_lowercase();
        Self::from_extension_str(&ext)
    }

    fn from_extension_str(ext: &str) -> Option<Self> {
        match ext {
            "csv" | "tsv" | "psv" => Some(Self::DelimitedText),
            "xml" => Some(Self::StructuredMarkup),
            "json" | "jsonl" | "ndjson" => Some(Self::ObjectNotation),
            "xlsx" | "xls" | "ods" => Some(Self::Spreadsheet),
            _ => None,
        }
    }

    fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match mime.as_str() {
            "text/csv" | "text/tab-separated-values" => Some(Self::DelimitedText),
            "application/xml" | "text/xml" => Some(Self::StructuredMarkup),
            "application/json" | "application/x-ndjson" => Some(Self::ObjectNotation),
            "application/vnd.ms-excel"
            | "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            | "application/vnd.oasis.opendocument.spreadsheet" => Some(Self::Spreadsheet),
            _ => None,
        }
    }
}
