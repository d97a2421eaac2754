use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Variant not found: component {component_id} label {label}")]
    VariantNotFound {
        component_id: String,
        label: String,
    },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Errors from the variant-drafting API client
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generation API unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Generation is not configured (missing API key)")]
    NotConfigured,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors surfaced at the HTTP boundary.
///
/// Each variant maps to one status class; the mapping itself lives in the
/// server module so the core stays transport-free.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Validation failed: {field} - {reason}")]
    Validation { field: String, reason: String },

    #[error("Missing or invalid credentials")]
    Unauthorized,

    #[error("Not allowed to access this resource")]
    Forbidden,

    #[error("{resource} not found: {id}")]
    NotFound { resource: String, id: String },

    #[error("Service unavailable: {message}")]
    Unavailable { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ApiError {
    /// Validation error for a missing or malformed request field.
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ApiError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Not-found error for a resource type and id.
    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        ApiError::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Api(api) => api,
            AppError::Generation(GenerationError::NotConfigured) => ApiError::Unavailable {
                message: "variant generation is not configured".to_string(),
            },
            other => ApiError::Internal {
                message: other.to_string(),
            },
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::Internal {
            message: err.to_string(),
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for generation operations
pub type GenerationResult<T> = Result<T, GenerationError>;

/// Result type alias for HTTP-boundary operations
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config {
            message: "missing key".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: missing key");

        let err = AppError::Internal {
            message: "unexpected".to_string(),
        };
        assert_eq!(err.to_string(), "Internal error: unexpected");
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::Connection {
            message: "failed to connect".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Database connection failed: failed to connect"
        );

        let err = StorageError::SessionNotFound {
            session_id: "sess-123".to_string(),
        };
        assert_eq!(err.to_string(), "Session not found: sess-123");

        let err = StorageError::VariantNotFound {
            component_id: "c1".to_string(),
            label: "b".to_string(),
        };
        assert_eq!(err.to_string(), "Variant not found: component c1 label b");
    }

    #[test]
    fn test_api_error_display() {
        let err = ApiError::validation("sessionId", "is required");
        assert_eq!(err.to_string(), "Validation failed: sessionId - is required");

        let err = ApiError::not_found("landing page", "lp-9");
        assert_eq!(err.to_string(), "landing page not found: lp-9");
    }

    #[test]
    fn test_generation_error_display() {
        let err = GenerationError::Unavailable {
            message: "server down".to_string(),
            retries: 3,
        };
        assert_eq!(
            err.to_string(),
            "Generation API unavailable: server down (retries: 3)"
        );

        let err = GenerationError::Timeout { timeout_ms: 5000 };
        assert_eq!(err.to_string(), "Request timeout after 5000ms");
    }

    #[test]
    fn test_storage_error_conversion_to_app_error() {
        let storage_err = StorageError::SessionNotFound {
            session_id: "test-123".to_string(),
        };
        let app_err: AppError = storage_err.into();
        assert!(matches!(app_err, AppError::Storage(_)));
    }

    #[test]
    fn test_app_error_conversion_to_api_error() {
        let app_err: AppError = StorageError::Query {
            message: "boom".to_string(),
        }
        .into();
        let api_err: ApiError = app_err.into();
        assert!(matches!(api_err, ApiError::Internal { .. }));

        let app_err = AppError::Api(ApiError::Forbidden);
        let api_err: ApiError = app_err.into();
        assert!(matches!(api_err, ApiError::Forbidden));
    }

    #[test]
    fn test_unconfigured_generation_maps_to_unavailable() {
        let app_err: AppError = GenerationError::NotConfigured.into();
        let api_err: ApiError = app_err.into();
        assert!(matches!(api_err, ApiError::Unavailable { .. }));
    }
}
