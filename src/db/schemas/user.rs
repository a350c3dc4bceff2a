//! User document schema
//!
//! Stores identity, credentials and the revocable session set. Raw
//! passwords and raw tokens never land in the store; only argon2 hashes
//! and SHA-256 digests do.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth::Role;
use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for users
pub const USER_COLLECTION: &str = "users";

/// User document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UserDoc {
    /// MongoDB document ID
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    pub nombre: String,
    pub apellido: String,

    /// Login identifier, unique across the collection
    pub email: String,

    /// Argon2 PHC hash of the password
    pub password_hash: String,

    pub role: Role,

    pub especializacion: String,

    /// Institutional responsibilities; required to be non-empty at
    /// registration
    pub responsabilidades: Vec<String>,

    /// Blob reference to the profile photo (upload happens elsewhere)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foto_perfil: Option<String>,

    /// Administrators can lock an account out entirely
    #[serde(default)]
    pub is_disabled: bool,

    /// Set once the email verification token is redeemed
    #[serde(default)]
    pub is_verified: bool,

    /// SHA-256 digest of the outstanding email verification token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_expires_at: Option<DateTime>,

    /// SHA-256 digest of the outstanding password reset token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_expires_at: Option<DateTime>,

    /// SHA-256 digests of active session tokens. Removing a digest revokes
    /// that session immediately.
    #[serde(default)]
    pub session_digests: Vec<String>,

    /// Store-backed login throttling
    #[serde(default)]
    pub failed_login_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_until: Option<DateTime>,
}

impl UserDoc {
    pub fn new(
        nombre: String,
        apellido: String,
        email: String,
        password_hash: String,
        especializacion: String,
        responsabilidades: Vec<String>,
    ) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            nombre,
            apellido,
            email,
            password_hash,
            role: Role::Investigador,
            especializacion,
            responsabilidades,
            foto_perfil: None,
            is_disabled: false,
            is_verified: false,
            verification_digest: None,
            verification_expires_at: None,
            reset_digest: None,
            reset_expires_at: None,
            session_digests: Vec::new(),
            failed_login_attempts: 0,
            locked_until: None,
        }
    }

    /// Whether login throttling currently locks this account
    pub fn is_locked(&self, now: DateTime) -> bool {
        matches!(self.locked_until, Some(until) if until > now)
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.nombre, self.apellido)
    }

    /// Public projection: everything credential-related stays out.
    pub fn view(&self) -> UserView {
        UserView {
            id: self._id.map(|id| id.to_hex()).unwrap_or_default(),
            nombre: self.nombre.clone(),
            apellido: self.apellido.clone(),
            email: self.email.clone(),
            role: self.role,
            especializacion: self.especializacion.clone(),
            responsabilidades: self.responsabilidades.clone(),
            foto_perfil: self.foto_perfil.clone(),
            is_disabled: self.is_disabled,
            is_verified: self.is_verified,
        }
    }

    pub fn view_json(&self) -> Value {
        json!(self.view())
    }
}

/// Response-facing user projection
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub nombre: String,
    pub apellido: String,
    pub email: String,
    pub role: Role,
    pub especializacion: String,
    pub responsabilidades: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foto_perfil: Option<String>,
    pub is_disabled: bool,
    pub is_verified: bool,
}

impl IntoIndexes for UserDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "email": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("email_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "verificationDigest": 1 },
                Some(
                    IndexOptions::builder()
                        .sparse(true)
                        .name("verification_digest_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for UserDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> UserDoc {
        UserDoc::new(
            "Ana".into(),
            "Reyes".into(),
            "ana@uni.edu".into(),
            "$argon2id$fake".into(),
            "Biología".into(),
            vec!["Docencia".into()],
        )
    }

    #[test]
    fn test_new_user_defaults() {
        let user = sample();
        assert_eq!(user.role, Role::Investigador);
        assert!(!user.is_disabled);
        assert!(!user.is_verified);
        assert!(user.session_digests.is_empty());
    }

    #[test]
    fn test_view_hides_credentials() {
        let mut user = sample();
        user._id = Some(ObjectId::new());
        user.session_digests.push("digest".into());

        let rendered = serde_json::to_string(&user.view()).unwrap();
        assert!(!rendered.contains("passwordHash"));
        assert!(!rendered.contains("digest"));
        assert!(rendered.contains("ana@uni.edu"));
    }

    #[test]
    fn test_lockout_window() {
        let mut user = sample();
        let now = DateTime::now();
        assert!(!user.is_locked(now));

        user.locked_until = Some(DateTime::from_millis(now.timestamp_millis() + 60_000));
        assert!(user.is_locked(now));

        user.locked_until = Some(DateTime::from_millis(now.timestamp_millis() - 1_000));
        assert!(!user.is_locked(now));
    }
}
