use thiserror::Error;

pub type Result<T> = std::result::Result<T, AlmanacError>;

#[derive(Debug, Error)]
pub enum AlmanacError {
    #[error("Storage error: {0}")]
    Storage(#[from] redb::Error),

    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Storage operation error: {0}")]
    StorageOperation(#[from] redb::StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Anything else the store rejects: schema mismatch, corrupt rows, I/O.
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Invalid category: {0}")]
    InvalidCategory(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

impl AlmanacError {
    /// Stable, machine-readable code surfaced in failure envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            AlmanacError::InvalidCategory(_) => "INVALID_CATEGORY",
            AlmanacError::Provider(_) => "PROVIDER_ERROR",
            AlmanacError::Extraction(_) => "EXTRACTION_ERROR",
            AlmanacError::Validation(_) => "VALIDATION_ERROR",
            _ => "PERSISTENCE_ERROR",
        }
    }

    /// True when the caller, not the system, is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, AlmanacError::InvalidCategory(_))
    }

    /// True for every failure raised by the store layer.
    pub fn is_persistence(&self) -> bool {
        self.code() == "PERSISTENCE_ERROR"
    }

    /// Individual messages for the envelope's `errors` list.
    pub fn details(&self) -> Vec<String> {
        match self {
            AlmanacError::Validation(violations) => violations.clone(),
            other => vec![other.to_string()],
        }
    }
}

/// Why a provider payload could not be turned into a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("malformed json: {0}")]
    MalformedJson(String),

    #[error("empty content")]
    EmptyContent,

    #[error("empty interpretation")]
    EmptyInterpretation,
}

impl ExtractionError {
    pub fn reason(&self) -> &'static str {
        match self {
            ExtractionError::MalformedJson(_) => "malformed json",
            ExtractionError::EmptyContent => "empty content",
            ExtractionError::EmptyInterpretation => "empty interpretation",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(AlmanacError::InvalidCategory("x".into()).code(), "INVALID_CATEGORY");
        assert_eq!(AlmanacError::Provider("down".into()).code(), "PROVIDER_ERROR");
        assert_eq!(
            AlmanacError::from(ExtractionError::EmptyContent).code(),
            "EXTRACTION_ERROR"
        );
        assert_eq!(AlmanacError::Validation(vec![]).code(), "VALIDATION_ERROR");
        assert_eq!(AlmanacError::Persistence("disk".into()).code(), "PERSISTENCE_ERROR");
    }

    #[test]
    fn test_only_invalid_category_is_client_error() {
        assert!(AlmanacError::InvalidCategory("x".into()).is_client_error());
        assert!(!AlmanacError::Provider("x".into()).is_client_error());
        assert!(AlmanacError::Persistence("x".into()).is_persistence());
    }

    #[test]
    fn test_validation_lists_every_violation() {
        let err = AlmanacError::Validation(vec!["a".into(), "b".into()]);
        assert_eq!(err.details(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(err.to_string(), "Validation failed: a; b");
    }

    #[test]
    fn test_extraction_reasons() {
        assert_eq!(ExtractionError::MalformedJson("eof".into()).reason(), "malformed json");
        assert_eq!(ExtractionError::EmptyContent.reason(), "empty content");
        assert_eq!(ExtractionError::EmptyInterpretation.reason(), "empty interpretation");
    }
}
