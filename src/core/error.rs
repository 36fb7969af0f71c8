use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};

/// Application-wide Result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Main application error type
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    /// Malformed input rejected before anything is persisted
    #[error("Validation error: {0}")]
    Validation(String),

    /// Transition attempted from a disallowed source state, or a stale version
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Webhook signature did not verify
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Unknown enrollment, schedule entry, payment, plan or tenant
    #[error("Not found: {0}")]
    NotFound(String),

    /// Charge or refund call to the payment gateway failed
    #[error("Gateway error: {0}")]
    ExternalGateway(String),

    /// Settlement data that cannot be applied without manual review
    #[error("Reconciliation inconsistency: {0}")]
    ReconciliationInconsistency(String),

    /// Database operation errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// HTTP client errors
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();

        HttpResponse::build(status_code).json(serde_json::json!({
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
                "code": status_code.as_u16(),
            }
        }))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ExternalGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::ReconciliationInconsistency(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,
            AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Helper functions for common error scenarios
impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        AppError::Conflict(msg.into())
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        AppError::NotFound(resource.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        AppError::Unauthorized(msg.into())
    }

    pub fn gateway(msg: impl Into<String>) -> Self {
        AppError::ExternalGateway(msg.into())
    }

    pub fn inconsistency(msg: impl Into<String>) -> Self {
        AppError::ReconciliationInconsistency(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }

    /// Stable machine-readable error kind used in API responses
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::Conflict(_) => "conflict_error",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::NotFound(_) => "not_found_error",
            AppError::ExternalGateway(_) | AppError::HttpClient(_) => "external_gateway_error",
            AppError::ReconciliationInconsistency(_) => "reconciliation_inconsistency",
            AppError::Json(_) => "validation_error",
            AppError::Database(_) | AppError::Configuration(_) | AppError::Internal(_) => {
                "internal_error"
            }
        }
    }

    /// Whether a caller may retry the same request after re-reading state
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Conflict(_)
                | AppError::ExternalGateway(_)
                | AppError::HttpClient(_)
                | AppError::Database(_)
        )
    }
}
