use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("fetch failed for template '{template}': {reason}")]
    Fetch { template: String, reason: String },

    #[error("unknown query template '{0}'")]
    UnknownTemplate(String),

    #[error("missing column '{column}' (available: {available})")]
    MissingColumn { column: String, available: String },

    #[error("column '{column}' row {row}: '{value}' is not numeric")]
    NotNumeric {
        column: String,
        row: usize,
        value: String,
    },

    #[error("table is already in section layout")]
    AlreadySectioned,

    #[error("table already carries a '{0}' footer row")]
    TotalAlreadyPresent(String),

    #[error("metric '{0}' has no section assignment")]
    UnmappedMetric(String),

    #[error("layout maps '{metric}' / '{value_type}' more than once")]
    DuplicateCell { metric: String, value_type: String },

    #[error("pipeline step expected a {expected} table, got {found}")]
    StageMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("workbook error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
}

impl ReportError {
    pub fn missing_column<'a>(column: &str, available: impl IntoIterator<Item = &'a String>) -> Self {
        ReportError::MissingColumn {
            column: column.to_string(),
            available: available
                .into_iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReportError>;
