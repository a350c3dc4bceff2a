//! Identity & credential management
//!
//! Registration, email verification, login/logout, password reset and the
//! administrator enable/disable gate. Session tokens are capability
//! bearing: a JWT authenticates only while its digest remains in the
//! user's stored session set, so revocation is immediate and local.

use bson::{doc, oid::ObjectId, DateTime};
use serde::Deserialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::auth::{
    hash_password, password_meets_policy, verify_password, JwtValidator, Operation, PolicyTable,
    Role, TokenPurpose,
};
use crate::config::Args;
use crate::db::schemas::{UserDoc, USER_COLLECTION};
use crate::db::{MongoClient, MongoCollection};
use crate::services::mailer::Mailer;
use crate::types::{ClaustroError, Result};
use crate::update::{USER_ADMIN_UPDATE, USER_SELF_UPDATE};

/// Registration payload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub nombre: String,
    pub apellido: String,
    pub email: String,
    pub password: String,
    pub especializacion: String,
    #[serde(default)]
    pub responsabilidades: Vec<String>,
    #[serde(default)]
    pub foto_perfil: Option<String>,
}

/// Outcome of redeeming a verification token
#[derive(Debug)]
pub struct VerifyOutcome {
    pub already_verified: bool,
    pub user: UserDoc,
}

pub struct IdentityService {
    mongo: MongoClient,
    jwt: JwtValidator,
    policy: Arc<PolicyTable>,
    mailer: Arc<dyn Mailer>,
    login_max_failures: u32,
    login_lockout_seconds: u64,
    verification_expiry_seconds: u64,
}

impl IdentityService {
    pub fn new(
        mongo: MongoClient,
        jwt: JwtValidator,
        policy: Arc<PolicyTable>,
        mailer: Arc<dyn Mailer>,
        args: &Args,
    ) -> Self {
        Self {
            mongo,
            jwt,
            policy,
            mailer,
            login_max_failures: args.login_max_failures,
            login_lockout_seconds: args.login_lockout_seconds,
            verification_expiry_seconds: args.verification_expiry_seconds,
        }
    }

    async fn users(&self) -> Result<MongoCollection<UserDoc>> {
        self.mongo.collection::<UserDoc>(USER_COLLECTION).await
    }

    /// Register a new user. Stores only the argon2 hash, never the raw
    /// password, and queues the verification email.
    pub async fn register(&self, data: NewUser) -> Result<UserDoc> {
        let errors = validate_registration(&data);
        if !errors.is_empty() {
            return Err(ClaustroError::BadRequestMany(errors));
        }

        let users = self.users().await?;

        // Email uniqueness spans deleted rows too; the unique index is the
        // backstop for concurrent registration.
        if users
            .find_one_any(doc! { "email": &data.email })
            .await?
            .is_some()
        {
            return Err(ClaustroError::Conflict("El email colocado ya existe.".into()));
        }

        let password_hash = hash_password(&data.password)?;
        let mut user = UserDoc::new(
            data.nombre,
            data.apellido,
            data.email,
            password_hash,
            data.especializacion,
            data.responsabilidades,
        );
        user.foto_perfil = data.foto_perfil;

        let token = new_one_time_token();
        user.verification_digest = Some(digest(&token));
        user.verification_expires_at = Some(after_seconds(self.verification_expiry_seconds));

        let id = users.insert_one(user.clone()).await?;
        user._id = Some(id);

        self.mailer
            .send_verification(&user.email, &user.nombre, &token)
            .await?;

        Ok(user)
    }

    /// Re-issue a verification token for an unverified account. Returns
    /// None for unknown or already-verified emails; the adapter answers
    /// uniformly so the endpoint leaks nothing about account state.
    pub async fn issue_verification_token(&self, email: &str) -> Result<Option<String>> {
        let users = self.users().await?;
        let Some(mut user) = users.find_one(doc! { "email": email }).await? else {
            return Ok(None);
        };
        if user.is_verified {
            return Ok(None);
        }

        let token = new_one_time_token();
        user.verification_digest = Some(digest(&token));
        user.verification_expires_at = Some(after_seconds(self.verification_expiry_seconds));

        let id = require_id(&user)?;
        users.replace_one(id, user.clone()).await?;

        self.mailer
            .send_verification(&user.email, &user.nombre, &token)
            .await?;

        Ok(Some(token))
    }

    /// Redeem an email verification token. Idempotent: a verified account
    /// presenting its token again is reported, not failed.
    pub async fn verify(&self, token: &str) -> Result<VerifyOutcome> {
        let users = self.users().await?;
        let mut user = users
            .find_one(doc! { "verificationDigest": digest(token) })
            .await?
            .ok_or_else(|| ClaustroError::BadRequest("Token inválido o expirado".into()))?;

        if user.is_verified {
            return Ok(VerifyOutcome {
                already_verified: true,
                user,
            });
        }

        match user.verification_expires_at {
            Some(expiry) if expiry > DateTime::now() => {}
            _ => return Err(ClaustroError::BadRequest("Token inválido o expirado".into())),
        }

        user.is_verified = true;
        let id = require_id(&user)?;
        users.replace_one(id, user.clone()).await?;

        Ok(VerifyOutcome {
            already_verified: false,
            user,
        })
    }

    /// Authenticate credentials and open a session.
    pub async fn login(&self, email: &str, password: &str) -> Result<(UserDoc, String)> {
        let users = self.users().await?;
        let mut user = users
            .find_one(doc! { "email": email })
            .await?
            .ok_or_else(|| ClaustroError::Unauthorized("Credenciales incorrectas".into()))?;

        if user.is_locked(DateTime::now()) {
            return Err(ClaustroError::TooManyRequests(
                "Demasiados intentos fallidos. Inténtalo más tarde.".into(),
            ));
        }

        if user.is_disabled {
            return Err(ClaustroError::Forbidden(
                "El usuario está deshabilitado, contacta al administrador.".into(),
            ));
        }

        if !verify_password(password, &user.password_hash)? {
            self.record_failed_login(&users, &mut user).await?;
            return Err(ClaustroError::Unauthorized("Credenciales incorrectas".into()));
        }

        if !user.is_verified {
            return Err(ClaustroError::Forbidden(
                "La cuenta no ha sido verificada. Revisa tu correo.".into(),
            ));
        }

        let id = require_id(&user)?;
        let (token, _claims) = self.jwt.issue(&id.to_hex(), TokenPurpose::Session)?;

        user.failed_login_attempts = 0;
        user.locked_until = None;
        user.session_digests.push(digest(&token));
        users.replace_one(id, user.clone()).await?;

        Ok((user, token))
    }

    async fn record_failed_login(
        &self,
        users: &MongoCollection<UserDoc>,
        user: &mut UserDoc,
    ) -> Result<()> {
        user.failed_login_attempts += 1;
        if user.failed_login_attempts >= self.login_max_failures {
            user.locked_until = Some(after_seconds(self.login_lockout_seconds));
            user.failed_login_attempts = 0;
        }
        let id = require_id(user)?;
        users.replace_one(id, user.clone()).await?;
        Ok(())
    }

    /// Resolve the caller behind a session token. Rejects tokens whose
    /// digest has been revoked and users that were disabled after login.
    pub async fn authenticate(&self, token: &str) -> Result<(UserDoc, Role)> {
        let claims = self.jwt.verify(token, TokenPurpose::Session)?;
        let id = ObjectId::parse_str(&claims.sub)
            .map_err(|_| ClaustroError::Unauthorized("Token inválido".into()))?;

        let users = self.users().await?;
        let user = users
            .find_one(doc! { "_id": id })
            .await?
            .ok_or_else(|| ClaustroError::Unauthorized("Por favor, autentíquese.".into()))?;

        if !user.session_digests.contains(&digest(token)) {
            return Err(ClaustroError::Unauthorized("Por favor, autentíquese.".into()));
        }

        if user.is_disabled {
            return Err(ClaustroError::Forbidden(
                "Este usuario está deshabilitado. Contacta al administrador.".into(),
            ));
        }

        let role = user.role;
        Ok((user, role))
    }

    /// Close exactly the session behind the presented token.
    pub async fn logout(&self, user_id: ObjectId, token: &str) -> Result<()> {
        let users = self.users().await?;
        users
            .update_one(
                doc! { "_id": user_id },
                doc! { "$pull": { "sessionDigests": digest(token) } },
            )
            .await?;
        Ok(())
    }

    /// Close every session of the user.
    pub async fn logout_all(&self, user_id: ObjectId) -> Result<()> {
        let users = self.users().await?;
        users
            .update_one(
                doc! { "_id": user_id },
                doc! { "$set": { "sessionDigests": [] } },
            )
            .await?;
        Ok(())
    }

    /// Issue a password-reset token. Returns None for unknown emails; the
    /// HTTP adapter answers identically either way so the endpoint cannot
    /// be used to enumerate accounts.
    pub async fn request_password_reset(&self, email: &str) -> Result<Option<String>> {
        let users = self.users().await?;
        let Some(mut user) = users.find_one(doc! { "email": email }).await? else {
            return Ok(None);
        };

        let id = require_id(&user)?;
        let (token, claims) = self.jwt.issue(&id.to_hex(), TokenPurpose::Reset)?;

        user.reset_digest = Some(digest(&token));
        user.reset_expires_at = Some(DateTime::from_millis(claims.exp as i64 * 1000));
        users.replace_one(id, user.clone()).await?;

        self.mailer
            .send_password_reset(&user.email, &user.nombre, &token)
            .await?;

        Ok(Some(token))
    }

    /// Redeem a reset token: signature, expiry and stored-digest match must
    /// all hold before the password changes. All sessions are revoked.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<UserDoc> {
        let claims = self
            .jwt
            .verify(token, TokenPurpose::Reset)
            .map_err(|_| ClaustroError::BadRequest("Token inválido o expirado".into()))?;
        let id = ObjectId::parse_str(&claims.sub)
            .map_err(|_| ClaustroError::BadRequest("Token inválido o expirado".into()))?;

        let users = self.users().await?;
        let mut user = users
            .find_one(doc! { "_id": id })
            .await?
            .ok_or_else(|| ClaustroError::BadRequest("Token inválido o expirado".into()))?;

        let stored_match = user.reset_digest.as_deref() == Some(digest(token).as_str())
            && matches!(user.reset_expires_at, Some(expiry) if expiry > DateTime::now());
        if !stored_match {
            return Err(ClaustroError::BadRequest("Token inválido o expirado".into()));
        }

        if !password_meets_policy(new_password) {
            return Err(ClaustroError::BadRequest(PASSWORD_POLICY_MESSAGE.into()));
        }

        user.password_hash = hash_password(new_password)?;
        user.reset_digest = None;
        user.reset_expires_at = None;
        user.session_digests.clear();
        users.replace_one(id, user.clone()).await?;

        Ok(user)
    }

    /// Self-service profile update.
    pub async fn update_self(&self, actor: &UserDoc, patch: Map<String, Value>) -> Result<UserDoc> {
        let users = self.users().await?;
        let mut user = actor.clone();
        self.apply_password_change(&mut user, &patch)?;
        self.apply_profile_patch(&users, &mut user, &patch, false).await?;

        let id = require_id(&user)?;
        users.replace_one(id, user.clone()).await?;
        Ok(user)
    }

    /// Administrator update of any user, including role changes.
    pub async fn update_user(
        &self,
        id: ObjectId,
        patch: Map<String, Value>,
        actor_role: Role,
    ) -> Result<UserDoc> {
        if !self.policy.allows(actor_role, false, Operation::UserAdminister) {
            return Err(ClaustroError::Forbidden(
                "No tienes permisos para actualizar este usuario.".into(),
            ));
        }

        let users = self.users().await?;
        let mut user = users
            .find_one(doc! { "_id": id })
            .await?
            .ok_or_else(|| ClaustroError::NotFound("Usuario no encontrado".into()))?;

        self.apply_password_change(&mut user, &patch)?;
        self.apply_profile_patch(&users, &mut user, &patch, true).await?;

        users.replace_one(id, user.clone()).await?;
        Ok(user)
    }

    fn apply_password_change(&self, user: &mut UserDoc, patch: &Map<String, Value>) -> Result<()> {
        let (Some(current), Some(new)) = (
            patch.get("currentPassword").and_then(Value::as_str),
            patch.get("newPassword").and_then(Value::as_str),
        ) else {
            return Ok(());
        };

        if !verify_password(current, &user.password_hash)? {
            return Err(ClaustroError::BadRequest("Contraseña incorrecta".into()));
        }
        if !password_meets_policy(new) {
            return Err(ClaustroError::BadRequest(PASSWORD_POLICY_MESSAGE.into()));
        }

        user.password_hash = hash_password(new)?;
        Ok(())
    }

    async fn apply_profile_patch(
        &self,
        users: &MongoCollection<UserDoc>,
        user: &mut UserDoc,
        patch: &Map<String, Value>,
        admin: bool,
    ) -> Result<()> {
        let schema = if admin { &USER_ADMIN_UPDATE } else { &USER_SELF_UPDATE };

        for key in schema.screen(patch)? {
            let value = &patch[key];
            match key {
                "nombre" => user.nombre = required_string(value, "nombre")?,
                "apellido" => user.apellido = required_string(value, "apellido")?,
                "email" => {
                    let email = required_string(value, "email")?;
                    if email != user.email {
                        let taken = users
                            .find_one_any(doc! { "email": &email, "_id": { "$ne": user._id } })
                            .await?
                            .is_some();
                        if taken {
                            return Err(ClaustroError::Conflict(
                                "El email proporcionado ya está en uso".into(),
                            ));
                        }
                        user.email = email;
                    }
                }
                "especializacion" => {
                    user.especializacion = required_string(value, "especializacion")?
                }
                "responsabilidades" => {
                    user.responsabilidades = parse_responsabilidades(value)?;
                }
                "fotoPerfil" => user.foto_perfil = value.as_str().map(str::to_string),
                "role" => {
                    let role: Role = value
                        .as_str()
                        .and_then(|s| s.parse().ok())
                        .ok_or_else(|| ClaustroError::BadRequest("Rol no válido".into()))?;
                    user.role = role;
                }
                _ => {}
            }
        }

        Ok(())
    }

    pub async fn get_user(&self, id: ObjectId) -> Result<UserDoc> {
        let users = self.users().await?;
        users
            .find_one(doc! { "_id": id })
            .await?
            .ok_or_else(|| ClaustroError::NotFound("Usuario no encontrado".into()))
    }

    pub async fn list_users(&self, actor_role: Role) -> Result<Vec<UserDoc>> {
        if !self.policy.allows(actor_role, false, Operation::UserAdminister) {
            return Err(ClaustroError::Forbidden(
                "No tienes permisos para listar usuarios.".into(),
            ));
        }
        let users = self.users().await?;
        users.find_many(doc! {}).await
    }

    pub async fn disable(&self, id: ObjectId, actor_role: Role) -> Result<()> {
        self.set_disabled(id, actor_role, true).await
    }

    pub async fn enable(&self, id: ObjectId, actor_role: Role) -> Result<()> {
        self.set_disabled(id, actor_role, false).await
    }

    async fn set_disabled(&self, id: ObjectId, actor_role: Role, disabled: bool) -> Result<()> {
        if !self.policy.allows(actor_role, false, Operation::UserAdminister) {
            let action = if disabled { "deshabilitar" } else { "habilitar" };
            return Err(ClaustroError::Forbidden(format!(
                "No tienes permisos para {} este usuario.",
                action
            )));
        }

        let users = self.users().await?;
        let mut user = users
            .find_one(doc! { "_id": id })
            .await?
            .ok_or_else(|| ClaustroError::NotFound("Usuario no encontrado".into()))?;

        if user.is_disabled == disabled {
            let state = if disabled { "deshabilitado" } else { "habilitado" };
            return Err(ClaustroError::BadRequest(format!(
                "Este usuario ya está {}.",
                state
            )));
        }

        user.is_disabled = disabled;
        if disabled {
            // A disabled account keeps no live sessions.
            user.session_digests.clear();
        }
        users.replace_one(id, user).await?;
        Ok(())
    }
}

const PASSWORD_POLICY_MESSAGE: &str = "La contraseña debe tener un mínimo de 8 caracteres, \
     incluyendo una letra mayúscula, una minúscula, un número y un símbolo";

/// Field-level registration validation; every failure is reported.
pub fn validate_registration(data: &NewUser) -> Vec<String> {
    let mut errors = Vec::new();

    if data.nombre.trim().is_empty() {
        errors.push("El nombre es requerido".to_string());
    }
    if data.apellido.trim().is_empty() {
        errors.push("El apellido es requerido".to_string());
    }
    if !looks_like_email(&data.email) {
        errors.push("Debe ser un email válido".to_string());
    }
    if data.especializacion.trim().is_empty() {
        errors.push("La especialización es requerida".to_string());
    }
    if data.responsabilidades.is_empty()
        || data.responsabilidades.iter().any(|r| r.trim().is_empty())
    {
        errors.push("Las responsabilidades deben ser una lista de textos no vacíos".to_string());
    }
    if !password_meets_policy(&data.password) {
        errors.push(PASSWORD_POLICY_MESSAGE.to_string());
    }

    errors
}

fn looks_like_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

fn parse_responsabilidades(value: &Value) -> Result<Vec<String>> {
    // A comma-separated string is accepted as shorthand for the list form.
    let items: Vec<String> = match value {
        Value::String(s) => s.split(',').map(|r| r.trim().to_string()).collect(),
        Value::Array(items) => items
            .iter()
            .map(|v| {
                v.as_str().map(str::to_string).ok_or_else(|| {
                    ClaustroError::BadRequest(
                        "Las responsabilidades deben ser una lista de textos".into(),
                    )
                })
            })
            .collect::<Result<_>>()?,
        _ => {
            return Err(ClaustroError::BadRequest(
                "Las responsabilidades deben ser una lista de textos".into(),
            ))
        }
    };

    if items.is_empty() || items.iter().any(|r| r.is_empty()) {
        return Err(ClaustroError::BadRequest(
            "Cada responsabilidad debe ser un texto no vacío".into(),
        ));
    }
    Ok(items)
}

fn required_string(value: &Value, field: &str) -> Result<String> {
    match value.as_str() {
        Some(s) if !s.trim().is_empty() => Ok(s.to_string()),
        _ => Err(ClaustroError::BadRequest(format!(
            "El campo {} no puede estar vacío",
            field
        ))),
    }
}

fn require_id(user: &UserDoc) -> Result<ObjectId> {
    user._id
        .ok_or_else(|| ClaustroError::Internal("User document without id".into()))
}

fn digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn new_one_time_token() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn after_seconds(seconds: u64) -> DateTime {
    DateTime::from_millis(DateTime::now().timestamp_millis() + (seconds as i64) * 1000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_registration() -> NewUser {
        NewUser {
            nombre: "Ana".into(),
            apellido: "Reyes".into(),
            email: "ana@uni.edu".into(),
            password: "Segura#2024".into(),
            especializacion: "Biología".into(),
            responsabilidades: vec!["Docencia".into()],
            foto_perfil: None,
        }
    }

    #[test]
    fn test_valid_registration_passes() {
        assert!(validate_registration(&valid_registration()).is_empty());
    }

    #[test]
    fn test_empty_responsibilities_rejected() {
        let mut data = valid_registration();
        data.responsabilidades = vec![];
        let errors = validate_registration(&data);
        assert!(errors.iter().any(|e| e.contains("responsabilidades")));
    }

    #[test]
    fn test_weak_password_rejected() {
        let mut data = valid_registration();
        data.password = "password".into();
        let errors = validate_registration(&data);
        assert!(errors.iter().any(|e| e.contains("contraseña")));
    }

    #[test]
    fn test_bad_email_rejected() {
        let mut data = valid_registration();
        data.email = "not-an-email".into();
        assert!(!validate_registration(&data).is_empty());

        data.email = "a@b.c".into();
        assert!(validate_registration(&data).is_empty());
    }

    #[test]
    fn test_every_failure_is_reported() {
        let data = NewUser {
            nombre: "".into(),
            apellido: "".into(),
            email: "x".into(),
            password: "weak".into(),
            especializacion: "".into(),
            responsabilidades: vec![],
            foto_perfil: None,
        };
        assert_eq!(validate_registration(&data).len(), 6);
    }

    #[test]
    fn test_token_digest_is_stable_and_opaque() {
        let token = "one-time-token";
        assert_eq!(digest(token), digest(token));
        assert_ne!(digest(token), token);
        assert_eq!(digest(token).len(), 64);
    }

    #[test]
    fn test_responsabilidades_string_shorthand() {
        let parsed = parse_responsabilidades(&json!("Docencia, Investigación")).unwrap();
        assert_eq!(parsed, vec!["Docencia", "Investigación"]);

        let parsed = parse_responsabilidades(&json!(["Docencia"])).unwrap();
        assert_eq!(parsed, vec!["Docencia"]);

        assert!(parse_responsabilidades(&json!([])).is_err());
        assert!(parse_responsabilidades(&json!(42)).is_err());
    }
}
