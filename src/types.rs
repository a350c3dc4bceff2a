//! Error types for claustro
//!
//! Every service operation fails with one of these kinds; the HTTP adapter
//! is the only layer that maps kinds to status codes and logs them.

use hyper::StatusCode;

/// Main error type for claustro operations
#[derive(Debug, thiserror::Error)]
pub enum ClaustroError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Multi-field validation failure; the adapter renders `{ errors: [..] }`.
    #[error("Bad request: {}", .0.join("; "))]
    BadRequestMany(Vec<String>),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Too many requests: {0}")]
    TooManyRequests(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClaustroError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::BadRequestMany(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The user-visible message list. Internal kinds are collapsed to a
    /// generic message so server details never leak into responses.
    pub fn public_messages(&self) -> Vec<String> {
        match self {
            Self::BadRequestMany(msgs) => msgs.clone(),
            Self::Database(_) | Self::Internal(_) | Self::Config(_) => {
                vec!["Error interno del servidor".to_string()]
            }
            other => vec![strip_prefix(&other.to_string())],
        }
    }
}

// The Display impl prefixes the kind; responses carry only the message.
fn strip_prefix(rendered: &str) -> String {
    match rendered.split_once(": ") {
        Some((_, msg)) => msg.to_string(),
        None => rendered.to_string(),
    }
}

impl From<std::io::Error> for ClaustroError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for ClaustroError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for ClaustroError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

impl From<mongodb::error::Error> for ClaustroError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for ClaustroError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Unauthorized(format!("JWT error: {}", err))
    }
}

/// Result type alias for claustro operations
pub type Result<T> = std::result::Result<T, ClaustroError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ClaustroError::Conflict("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ClaustroError::Forbidden("x".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ClaustroError::TooManyRequests("x".into()).status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ClaustroError::BadRequestMany(vec!["a".into()]).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_public_messages_hide_internals() {
        let err = ClaustroError::Database("connection refused 10.0.0.3".into());
        assert_eq!(err.public_messages(), vec!["Error interno del servidor"]);

        let err = ClaustroError::NotFound("Proyecto no encontrado".into());
        assert_eq!(err.public_messages(), vec!["Proyecto no encontrado"]);
    }

    #[test]
    fn test_multi_field_messages() {
        let err = ClaustroError::BadRequestMany(vec!["a".into(), "b".into()]);
        assert_eq!(err.public_messages(), vec!["a", "b"]);
    }
}
