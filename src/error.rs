use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditError {
    /// Malformed or empty source file. Fatal, aborts the ingestion run.
    #[error("Parse error: {reason}")]
    Parse { reason: String },

    #[error("Unsupported file type: {0:?}")]
    UnsupportedFileType(String),

    /// Every row was skipped during normalization.
    #[error("No valid line items found in source file")]
    NoValidLineItems,

    /// Outbound dispatch failed. Non-fatal: the lifecycle mutation that
    /// triggered it has already been persisted.
    #[error("Notification dispatch failed: {0}")]
    NotificationDispatch(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AuditError>;
