//! HTTP routes for authentication
//!
//! - POST /auth/register                 create an account (starts unverified)
//! - POST /auth/verify                   redeem an email verification token
//! - POST /auth/verify/request           re-issue a verification token
//! - POST /auth/login                    authenticate and open a session
//! - POST /auth/logout                   close the presented session
//! - POST /auth/logout-all               close every session
//! - GET  /auth/me                       current user from the session token
//! - POST /auth/password-reset/request   issue a reset token (uniform reply)
//! - POST /auth/password-reset/confirm   redeem a reset token

use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::routes::helpers::{
    authenticate, entity_response, error_response, json_response, message_response,
    parse_json_body, BoxBody,
};
use crate::server::AppState;
use crate::services::NewUser;
use crate::types::{ClaustroError, Result};

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct TokenRequest {
    token: String,
}

#[derive(Debug, Deserialize)]
struct ResetRequest {
    email: String,
}

#[derive(Debug, Deserialize)]
struct ResetConfirmRequest {
    token: String,
    password: String,
}

/// Dispatch /auth/* requests. Returns None when the path is not ours.
pub async fn handle(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match (method, path.as_str()) {
        (Method::POST, "/auth/register") => handle_register(req, state).await,
        (Method::POST, "/auth/verify") => handle_verify(req, state).await,
        (Method::POST, "/auth/verify/request") => handle_verify_request(req, state).await,
        (Method::POST, "/auth/login") => handle_login(req, state).await,
        (Method::POST, "/auth/logout") => handle_logout(req, state).await,
        (Method::POST, "/auth/logout-all") => handle_logout_all(req, state).await,
        (Method::GET, "/auth/me") => handle_me(req, state).await,
        (Method::POST, "/auth/password-reset/request") => {
            handle_reset_request(req, state).await
        }
        (Method::POST, "/auth/password-reset/confirm") => {
            handle_reset_confirm(req, state).await
        }
        _ => return None,
    };

    Some(response.unwrap_or_else(|e| error_response(&e)))
}

async fn handle_register(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody>> {
    let body: NewUser = parse_json_body(req).await?;
    let user = state.identity.register(body).await?;

    Ok(entity_response(
        StatusCode::CREATED,
        Some("Usuario registrado exitosamente. Revisa tu correo para verificar la cuenta."),
        "user",
        user.view_json(),
    ))
}

async fn handle_verify(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody>> {
    let body: TokenRequest = parse_json_body(req).await?;
    let outcome = state.identity.verify(&body.token).await?;

    let message = if outcome.already_verified {
        "La cuenta ya estaba verificada."
    } else {
        "Cuenta verificada exitosamente."
    };

    Ok(json_response(
        StatusCode::OK,
        &json!({
            "message": message,
            "alreadyVerified": outcome.already_verified,
            "user": outcome.user.view_json(),
        }),
    ))
}

/// Uniform reply whether the email is unknown, unverified or already
/// verified.
async fn handle_verify_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody>> {
    let body: ResetRequest = parse_json_body(req).await?;
    let _ = state.identity.issue_verification_token(&body.email).await?;

    Ok(message_response(
        StatusCode::OK,
        "Si el correo está registrado y pendiente de verificación, recibirás un nuevo enlace.",
    ))
}

async fn handle_login(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody>> {
    let body: LoginRequest = parse_json_body(req).await?;
    let (user, token) = state.identity.login(&body.email, &body.password).await?;

    Ok(json_response(
        StatusCode::OK,
        &json!({
            "message": "Inicio de sesión exitoso",
            "token": token,
            "user": user.view_json(),
        }),
    ))
}

async fn handle_logout(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody>> {
    let (user, _role, token) = authenticate(&state, &req).await?;
    let id = user
        ._id
        .ok_or_else(|| ClaustroError::Internal("User document without id".into()))?;

    state.identity.logout(id, &token).await?;
    Ok(message_response(StatusCode::OK, "Cierre de sesión exitoso"))
}

async fn handle_logout_all(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody>> {
    let (user, _role, _token) = authenticate(&state, &req).await?;
    let id = user
        ._id
        .ok_or_else(|| ClaustroError::Internal("User document without id".into()))?;

    state.identity.logout_all(id).await?;
    Ok(message_response(
        StatusCode::OK,
        "Todas las sesiones han sido cerradas exitosamente.",
    ))
}

async fn handle_me(req: Request<Incoming>, state: Arc<AppState>) -> Result<Response<BoxBody>> {
    let (user, _role, _token) = authenticate(&state, &req).await?;
    Ok(entity_response(StatusCode::OK, None, "user", user.view_json()))
}

/// The reply is identical whether or not the email exists, so this
/// endpoint cannot be used to enumerate accounts.
async fn handle_reset_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody>> {
    let body: ResetRequest = parse_json_body(req).await?;
    let _ = state.identity.request_password_reset(&body.email).await?;

    Ok(message_response(
        StatusCode::OK,
        "Si el correo está registrado, recibirás un enlace para restablecer la contraseña.",
    ))
}

async fn handle_reset_confirm(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody>> {
    let body: ResetConfirmRequest = parse_json_body(req).await?;
    state
        .identity
        .reset_password(&body.token, &body.password)
        .await?;

    Ok(message_response(
        StatusCode::OK,
        "Contraseña restablecida exitosamente. Inicia sesión nuevamente.",
    ))
}
