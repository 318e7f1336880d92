use thiserror::Error;
use uuid::Uuid;

/// Event index error types
#[derive(Error, Debug)]
pub enum IndexError {
    /// Requested page size is negative
    #[error("Invalid limit: {0}")]
    InvalidLimit(i64),

    /// Saved search timeout below one second
    #[error("Invalid saved search timeout: {0}")]
    InvalidTimeout(i64),

    /// Sort field (or detail key) has no index mapping
    #[error("Unsupported sort field: {0}")]
    UnsupportedSortField(String),

    /// Filter references a detail key that is not indexed
    #[error("Unsupported filter field: {0}")]
    UnsupportedField(String),

    /// Search, remote request or relational lookup exceeded its time budget
    #[error("Search timed out: {0}")]
    SearchTimeout(String),

    /// Saved search handle is unknown or already expired
    #[error("Saved search not found: {0}")]
    SavedSearchNotFound(Uuid),

    /// Writer failed to add, delete or commit documents
    #[error("Index write failure: {0}")]
    IndexWriteFailure(String),

    /// Backend has not finished initializing
    #[error("Index backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Engine ran out of resources; the read path is poisoned
    #[error("Resource exhaustion: {0}")]
    ResourceExhaustion(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Malformed filter values
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Search engine errors
    #[error("Engine error: {0}")]
    Engine(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IndexError {
    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            IndexError::InvalidLimit(_) => "INVALID_LIMIT",
            IndexError::InvalidTimeout(_) => "INVALID_TIMEOUT",
            IndexError::UnsupportedSortField(_) => "UNSUPPORTED_SORT_FIELD",
            IndexError::UnsupportedField(_) => "UNSUPPORTED_FIELD",
            IndexError::SearchTimeout(_) => "SEARCH_TIMEOUT",
            IndexError::SavedSearchNotFound(_) => "SAVED_SEARCH_NOT_FOUND",
            IndexError::IndexWriteFailure(_) => "INDEX_WRITE_FAILURE",
            IndexError::BackendUnavailable(_) => "BACKEND_UNAVAILABLE",
            IndexError::ResourceExhaustion(_) => "RESOURCE_EXHAUSTION",
            IndexError::Configuration(_) => "CONFIGURATION_ERROR",
            IndexError::InvalidArgument(_) => "INVALID_ARGUMENT",
            IndexError::Serialization(_) => "SERIALIZATION_ERROR",
            IndexError::Engine(_) => "ENGINE_ERROR",
            IndexError::Io(_) => "IO_ERROR",
            IndexError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether this error should poison the snapshot pool
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self, IndexError::ResourceExhaustion(_))
    }
}

/// Conversion from tantivy::TantivyError
impl From<tantivy::TantivyError> for IndexError {
    fn from(err: tantivy::TantivyError) -> Self {
        use tantivy::TantivyError;
        match err {
            TantivyError::Poisoned => {
                IndexError::ResourceExhaustion("index lock poisoned".to_string())
            }
            TantivyError::ErrorInThread(msg) => IndexError::ResourceExhaustion(msg),
            TantivyError::IoError(io) if io.kind() == std::io::ErrorKind::OutOfMemory => {
                IndexError::ResourceExhaustion(io.to_string())
            }
            other => IndexError::Engine(other.to_string()),
        }
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for IndexError {
    fn from(err: serde_json::Error) -> Self {
        IndexError::Serialization(err.to_string())
    }
}

/// Conversion from reqwest::Error
impl From<reqwest::Error> for IndexError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            IndexError::SearchTimeout(err.to_string())
        } else if err.is_connect() {
            IndexError::BackendUnavailable(err.to_string())
        } else if err.is_decode() {
            IndexError::Serialization(err.to_string())
        } else {
            IndexError::Engine(err.to_string())
        }
    }
}

/// Conversion from config::ConfigError
impl From<config::ConfigError> for IndexError {
    fn from(err: config::ConfigError) -> Self {
        IndexError::Configuration(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, IndexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(IndexError::InvalidLimit(-1).error_code(), "INVALID_LIMIT");
        assert_eq!(IndexError::InvalidTimeout(0).error_code(), "INVALID_TIMEOUT");
        assert_eq!(
            IndexError::SavedSearchNotFound(Uuid::new_v4()).error_code(),
            "SAVED_SEARCH_NOT_FOUND"
        );
        assert_eq!(
            IndexError::BackendUnavailable("init".into()).error_code(),
            "BACKEND_UNAVAILABLE"
        );
    }

    #[test]
    fn test_tantivy_poisoned_maps_to_exhaustion() {
        let err: IndexError = tantivy::TantivyError::Poisoned.into();
        assert!(err.is_resource_exhaustion());

        let err: IndexError =
            tantivy::TantivyError::ErrorInThread("merge thread died".to_string()).into();
        assert!(err.is_resource_exhaustion());
    }

    #[test]
    fn test_tantivy_other_maps_to_engine() {
        let err: IndexError =
            tantivy::TantivyError::InvalidArgument("bad field".to_string()).into();
        assert_eq!(err.error_code(), "ENGINE_ERROR");
    }

    #[test]
    fn test_error_display() {
        let err = IndexError::UnsupportedSortField("detail:missing".to_string());
        assert_eq!(err.to_string(), "Unsupported sort field: detail:missing");
    }
}
