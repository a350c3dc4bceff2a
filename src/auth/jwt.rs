//! JWT handling for sessions and password-reset tokens
//!
//! Tokens are signed with HS256. A session token is only valid while its
//! digest remains in the user's stored session set, so revocation is
//! immediate and local to the store.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::{ClaustroError, Result};

/// What a token is allowed to be used for. A reset token can never
/// authenticate a request and a session token can never reset a password.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenPurpose {
    Session,
    Reset,
}

/// Payload stored in a claustro JWT
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User document id (hex ObjectId)
    pub sub: String,
    /// Unique token id; its SHA-256 digest is what the user document stores
    pub jti: String,
    pub purpose: TokenPurpose,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// JWT validator and generator
#[derive(Clone)]
pub struct JwtValidator {
    secret: String,
    session_expiry_seconds: u64,
    reset_expiry_seconds: u64,
}

impl JwtValidator {
    /// Create a new JWT validator
    ///
    /// Returns an error if the secret is empty or too short.
    pub fn new(
        secret: String,
        session_expiry_seconds: u64,
        reset_expiry_seconds: u64,
    ) -> Result<Self> {
        if secret.is_empty() {
            return Err(ClaustroError::Config("JWT secret is required".into()));
        }
        if secret.len() < 32 {
            return Err(ClaustroError::Config(
                "JWT secret must be at least 32 characters".into(),
            ));
        }

        Ok(Self {
            secret,
            session_expiry_seconds,
            reset_expiry_seconds,
        })
    }

    /// Create a validator for dev mode (fixed insecure secret)
    pub fn new_dev() -> Self {
        Self {
            secret: "dev-mode-secret-not-for-production-use-123456".into(),
            session_expiry_seconds: 86400,
            reset_expiry_seconds: 3600,
        }
    }

    /// Sign a token for the given user and purpose. Returns the token string
    /// and its claims (the caller stores a digest of the token).
    pub fn issue(&self, user_id: &str, purpose: TokenPurpose) -> Result<(String, SessionClaims)> {
        let now = unix_now()?;
        let expiry = match purpose {
            TokenPurpose::Session => self.session_expiry_seconds,
            TokenPurpose::Reset => self.reset_expiry_seconds,
        };

        let claims = SessionClaims {
            sub: user_id.to_string(),
            jti: uuid::Uuid::new_v4().to_string(),
            purpose,
            iat: now,
            exp: now + expiry,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| ClaustroError::Auth(format!("Failed to sign token: {}", e)))?;

        Ok((token, claims))
    }

    /// Verify signature and expiry, and require the expected purpose.
    pub fn verify(&self, token: &str, expected: TokenPurpose) -> Result<SessionClaims> {
        let validation = Validation::default();

        let data = decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|err| {
            use jsonwebtoken::errors::ErrorKind;
            let msg = match err.kind() {
                ErrorKind::ExpiredSignature => "Token expirado",
                ErrorKind::InvalidSignature => "Firma inválida",
                _ => "Token inválido",
            };
            ClaustroError::Unauthorized(msg.to_string())
        })?;

        if data.claims.purpose != expected {
            return Err(ClaustroError::Unauthorized("Token inválido".into()));
        }

        Ok(data.claims)
    }
}

/// Extract token from an Authorization header.
/// Supports "Bearer <token>" format and raw tokens.
pub fn extract_token_from_header(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?;

    if let Some(token) = header.strip_prefix("Bearer ") {
        let token = token.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    if !header.contains(' ') {
        let token = header.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    None
}

fn unix_now() -> Result<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| ClaustroError::Internal(format!("System time error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_validator() -> JwtValidator {
        JwtValidator::new(
            "test-secret-that-is-at-least-32-characters-long".into(),
            3600,
            600,
        )
        .unwrap()
    }

    #[test]
    fn test_issue_and_verify_session() {
        let validator = test_validator();

        let (token, claims) = validator
            .issue("64f000000000000000000001", TokenPurpose::Session)
            .unwrap();
        assert!(!token.is_empty());

        let verified = validator.verify(&token, TokenPurpose::Session).unwrap();
        assert_eq!(verified.sub, "64f000000000000000000001");
        assert_eq!(verified.jti, claims.jti);
    }

    #[test]
    fn test_purpose_mismatch_rejected() {
        let validator = test_validator();
        let (token, _) = validator
            .issue("64f000000000000000000001", TokenPurpose::Reset)
            .unwrap();

        assert!(validator.verify(&token, TokenPurpose::Session).is_err());
        assert!(validator.verify(&token, TokenPurpose::Reset).is_ok());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let validator1 = test_validator();
        let validator2 = JwtValidator::new(
            "different-secret-that-is-at-least-32-chars".into(),
            3600,
            600,
        )
        .unwrap();

        let (token, _) = validator1
            .issue("64f000000000000000000001", TokenPurpose::Session)
            .unwrap();
        assert!(validator2.verify(&token, TokenPurpose::Session).is_err());
    }

    #[test]
    fn test_invalid_token_rejected() {
        let validator = test_validator();
        assert!(validator
            .verify("not-a-token", TokenPurpose::Session)
            .is_err());
    }

    #[test]
    fn test_secret_validation() {
        assert!(JwtValidator::new("short".into(), 3600, 600).is_err());
        assert!(JwtValidator::new("".into(), 3600, 600).is_err());
        assert!(
            JwtValidator::new("this-secret-is-at-least-32-chars-long".into(), 3600, 600).is_ok()
        );
    }

    #[test]
    fn test_extract_token_from_header() {
        assert_eq!(
            extract_token_from_header(Some("Bearer abc123")),
            Some("abc123")
        );
        assert_eq!(extract_token_from_header(Some("abc123")), Some("abc123"));
        assert_eq!(extract_token_from_header(None), None);
        assert_eq!(extract_token_from_header(Some("")), None);
        assert_eq!(extract_token_from_header(Some("Bearer ")), None);
        assert_eq!(extract_token_from_header(Some("Basic abc123")), None);
    }
}
