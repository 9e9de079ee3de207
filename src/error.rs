//! Error handling for the mvcontrol server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Connection refused, timeout, broken socket
    #[error("Transport error: {0}")]
    Transport(String),

    /// Device-reported error token or malformed reply
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Router rejected a switch because the output is locked
    #[error("Output {output} is locked")]
    OutputLocked { output: u32 },

    /// No device integration configured
    #[error("Not configured: {0}")]
    Configuration(String),

    /// Refresh already running
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Refresh attempted inside the cool-down window
    #[error("Throttled: retry in {retry_after_secs}s")]
    Throttled { retry_after_secs: i64 },

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// SQLx database error
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

impl Error {
    /// Stable machine-readable error code
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Transport(_) => "TRANSPORT_ERROR",
            Error::Protocol(_) => "PROTOCOL_ERROR",
            Error::OutputLocked { .. } => "OUTPUT_LOCKED",
            Error::Configuration(_) => "NOT_CONFIGURED",
            Error::Conflict(_) => "CONFLICT",
            Error::Throttled { .. } => "THROTTLED",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Database(_) | Error::Sqlx(_) => "DATABASE_ERROR",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Error::Transport(_) | Error::Protocol(_) => StatusCode::BAD_GATEWAY,
            Error::OutputLocked { .. } => StatusCode::LOCKED,
            Error::Configuration(_) => StatusCode::BAD_REQUEST,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Throttled { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Database(_)
            | Error::Sqlx(_)
            | Error::Serialization(_)
            | Error::Io(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_code = self.kind();
        let message = self.to_string();

        tracing::error!(
            status = %status,
            error_code = %error_code,
            message = %message,
            "Request error"
        );

        let body = Json(json!({
            "error_code": error_code,
            "message": message
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locked_output_is_distinct_from_generic_protocol_error() {
        let locked = Error::OutputLocked { output: 7 };
        let generic = Error::Protocol("switch failed".to_string());

        assert_eq!(locked.status(), StatusCode::LOCKED);
        assert_eq!(generic.status(), StatusCode::BAD_GATEWAY);
        assert_ne!(locked.kind(), generic.kind());
        assert_eq!(locked.to_string(), "Output 7 is locked");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            Error::Conflict("running".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            Error::Throttled { retry_after_secs: 5 }.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            Error::Configuration("none".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
