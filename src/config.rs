//! Configuration for claustro
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;

/// claustro - research management backend
#[derive(Parser, Debug, Clone)]
#[command(name = "claustro")]
#[command(about = "REST backend for institutional research management")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "claustro")]
    pub mongodb_db: String,

    /// JWT secret for token signing (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// Session token expiry in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "86400")]
    pub jwt_expiry_seconds: u64,

    /// Password reset token expiry in seconds
    #[arg(long, env = "RESET_EXPIRY_SECONDS", default_value = "3600")]
    pub reset_expiry_seconds: u64,

    /// Email verification token expiry in seconds
    #[arg(long, env = "VERIFICATION_EXPIRY_SECONDS", default_value = "86400")]
    pub verification_expiry_seconds: u64,

    /// Consecutive failed logins before the account locks
    #[arg(long, env = "LOGIN_MAX_FAILURES", default_value = "5")]
    pub login_max_failures: u32,

    /// Lockout window in seconds after too many failed logins
    #[arg(long, env = "LOGIN_LOCKOUT_SECONDS", default_value = "900")]
    pub login_lockout_seconds: u64,

    /// Enable development mode (permits a default JWT secret)
    #[arg(long, env = "DEV_MODE", default_value = "false", action = clap::ArgAction::Set)]
    pub dev_mode: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Get effective JWT secret (uses default in dev mode)
    pub fn jwt_secret(&self) -> String {
        if self.dev_mode {
            self.jwt_secret
                .clone()
                .unwrap_or_else(|| "dev-only-insecure-secret-not-for-production".to_string())
        } else {
            self.jwt_secret
                .clone()
                .expect("JWT_SECRET is required in production mode")
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode {
            match &self.jwt_secret {
                None => return Err("JWT_SECRET is required in production mode".to_string()),
                Some(s) if s.len() < 32 => {
                    return Err("JWT_SECRET must be at least 32 characters".to_string())
                }
                Some(_) => {}
            }
        }

        if self.login_max_failures == 0 {
            return Err("LOGIN_MAX_FAILURES must be at least 1".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args::parse_from(["claustro", "--dev-mode", "true"])
    }

    #[test]
    fn test_dev_mode_allows_missing_secret() {
        let args = base_args();
        assert!(args.validate().is_ok());
        assert!(!args.jwt_secret().is_empty());
    }

    #[test]
    fn test_production_requires_long_secret() {
        let mut args = Args::parse_from(["claustro"]);
        args.dev_mode = false;
        assert!(args.validate().is_err());

        args.jwt_secret = Some("short".into());
        assert!(args.validate().is_err());

        args.jwt_secret = Some("a-production-secret-that-is-long-enough-123".into());
        assert!(args.validate().is_ok());
    }
}
