// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict
    Conflict(String),

    // 500 Internal Server Error
    InternalServerError(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::Conflict(_) => 409,
            ApiError::InternalServerError(_) => 500,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::InternalServerError(msg)
            | ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        json!({
            "error": true,
            "message": self.message(),
            "code": self.error_code()
        })
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

// Convert other error types to ApiError. Resolver and migration failures are
// surfaced to ordinary callers as generic access/availability conditions;
// internal schema names and SQL errors stay in the logs.
impl From<crate::database::manager::DatabaseError> for ApiError {
    fn from(err: crate::database::manager::DatabaseError) -> Self {
        match err {
            crate::database::manager::DatabaseError::Sqlx(sqlx_err) => {
                tracing::error!("SQLx error: {}", sqlx_err);
                ApiError::internal_server_error("Database error occurred")
            }
            other => {
                tracing::error!("Database configuration error: {}", other);
                ApiError::service_unavailable("Database temporarily unavailable")
            }
        }
    }
}

impl From<crate::services::resolver::ResolveError> for ApiError {
    fn from(err: crate::services::resolver::ResolveError) -> Self {
        use crate::services::resolver::ResolveError;
        match err {
            ResolveError::IncompleteIdentity => ApiError::forbidden("Access denied"),
            ResolveError::StoreNotFound(id) => {
                tracing::warn!("Resolution failed for store {}", id);
                ApiError::not_found("Store unavailable")
            }
            ResolveError::BadDescriptor(id) => {
                tracing::error!("Corrupt connection descriptor for store {}", id);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
            ResolveError::Database(e) => e.into(),
            ResolveError::Sqlx(e) => {
                tracing::error!("Resolver query error: {}", e);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
        }
    }
}

impl From<crate::services::migrator::MigrationError> for ApiError {
    fn from(err: crate::services::migrator::MigrationError) -> Self {
        use crate::services::migrator::MigrationError;
        match err {
            MigrationError::StoreNotFound(id) => {
                ApiError::not_found(format!("Store not found: {}", id))
            }
            MigrationError::InProgress(id) => {
                ApiError::conflict(format!("Migration already in progress for store {}", id))
            }
            other => {
                tracing::error!("Migration error: {}", other);
                ApiError::internal_server_error("Migration failed")
            }
        }
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::resolver::ResolveError;

    #[test]
    fn incomplete_identity_maps_to_generic_forbidden() {
        let err: ApiError = ResolveError::IncompleteIdentity.into();
        assert_eq!(err.status_code(), 403);
        assert_eq!(err.message(), "Access denied");
    }

    #[test]
    fn store_not_found_hides_internal_detail() {
        let err: ApiError = ResolveError::StoreNotFound(7).into();
        assert_eq!(err.status_code(), 404);
        assert!(!err.message().contains("schema"));
        assert!(!err.message().contains('7'));
    }

    #[test]
    fn error_body_shape() {
        let body = ApiError::conflict("Migration already in progress for store 5").to_json();
        assert_eq!(body["error"], true);
        assert_eq!(body["code"], "CONFLICT");
    }
}
