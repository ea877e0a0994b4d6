use thiserror::Error;

// Import Axum types for HTTP response conversion
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// The custom error type for the application.
#[derive(Debug, Error)]
pub enum Error {
    /// An error originating from the sqlx library.
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// An error originating from IO operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A validation error (missing or ill-typed input).
    #[error("Validation error: {0}")]
    Validation(String),

    /// A not found error (resource does not exist).
    #[error("Not found: {0}")]
    NotFound(String),

    /// A forbidden error (user lacks permission).
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// An authentication error (missing or invalid credentials).
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// An internal server error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// A JSON serialization error.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// An upstream rate limit (Brave 429 or a provider pushing back).
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// An LLM or document-extractor failure after retries.
    #[error("Provider error: {0}")]
    Provider(String),

    /// A vector store or durable store failure.
    #[error("Store error: {0}")]
    Store(String),

    /// API key missing for a provider.
    #[error("API key not configured for provider '{0}'")]
    ApiKeyMissing(String),
}

/// A type alias for `Result<T, Error>` to simplify function signatures.
pub type Result<T> = std::result::Result<T, Error>;

/// Helper function to create standardized error response bodies
fn create_error_body(msg: String, code: &str) -> serde_json::Value {
    serde_json::json!({ "error": msg, "code": code })
}

/// Log error at appropriate level based on error type
/// Client-facing errors (4xx) are logged as warnings, server errors (5xx) as errors
fn log_error(error: &Error, error_code: &str, status_code: u16) {
    if status_code >= 500 {
        tracing::error!(
            error_code,
            error = %error,
            status_code,
            "Error returned to client"
        );
    } else {
        tracing::warn!(
            error_code,
            error = %error,
            status_code,
            "Error returned to client"
        );
    }
}

/// Convert custom Error to HTTP response
///
/// This implementation maps each error variant to an appropriate HTTP status code
/// and returns a JSON response with an error message and error code.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log the error before returning response using helper
        log_error(&self, self.error_code(), self.status_code());

        let (body, status) = match self {
            Error::Validation(msg) => (
                create_error_body(msg, "VALIDATION_ERROR"),
                StatusCode::BAD_REQUEST,
            ),
            Error::NotFound(msg) => (create_error_body(msg, "NOT_FOUND"), StatusCode::NOT_FOUND),
            Error::Forbidden(msg) => (create_error_body(msg, "FORBIDDEN"), StatusCode::FORBIDDEN),
            Error::Authentication(msg) => (
                create_error_body(msg, "AUTHENTICATION_FAILED"),
                StatusCode::UNAUTHORIZED,
            ),
            Error::Sqlx(_) => (
                create_error_body("Database error".to_string(), "INTERNAL_ERROR"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            Error::Internal(msg) => (
                create_error_body(msg, "INTERNAL_ERROR"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            Error::Config(_) => (
                create_error_body("Configuration error".to_string(), "CONFIG_ERROR"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            Error::Io(_) => (
                create_error_body("IO error".to_string(), "INTERNAL_ERROR"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            Error::Json(e) => (
                create_error_body(format!("Invalid JSON payload: {}", e), "VALIDATION_ERROR"),
                StatusCode::BAD_REQUEST,
            ),
            Error::RateLimited(msg) => (
                create_error_body(msg, "RATE_LIMITED"),
                StatusCode::TOO_MANY_REQUESTS,
            ),
            Error::Provider(msg) => (
                create_error_body(msg, "PROVIDER_ERROR"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            Error::Store(msg) => (
                create_error_body(msg, "STORE_ERROR"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            Error::ApiKeyMissing(provider) => (
                create_error_body(
                    format!("API key not configured for provider '{}'", provider),
                    "API_KEY_MISSING",
                ),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        };

        (status, Json(body)).into_response()
    }
}

impl Error {
    /// Helper method to get the HTTP status code for an error
    fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) | Error::Json(_) => 400,
            Error::NotFound(_) => 404,
            Error::Forbidden(_) => 403,
            Error::Authentication(_) => 401,
            Error::RateLimited(_) => 429,
            _ => 500,
        }
    }

    /// Helper method to get the error code for logging
    fn error_code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Forbidden(_) => "FORBIDDEN",
            Error::Authentication(_) => "AUTHENTICATION_FAILED",
            Error::Sqlx(_) => "INTERNAL_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Io(_) => "INTERNAL_ERROR",
            Error::Json(_) => "JSON_ERROR",
            Error::RateLimited(_) => "RATE_LIMITED",
            Error::Provider(_) => "PROVIDER_ERROR",
            Error::Store(_) => "STORE_ERROR",
            Error::ApiKeyMissing(_) => "API_KEY_MISSING",
        }
    }
}
