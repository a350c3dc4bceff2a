//! HTTP routes for user administration
//!
//! - GET   /users                administrator listing
//! - GET   /users/{id}           administrator lookup
//! - PATCH /users/me             self-service profile update
//! - PATCH /users/{id}           administrator update (including role)
//! - POST  /users/{id}/disable   administrator gate
//! - POST  /users/{id}/enable    administrator gate

use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::auth::Operation;
use crate::routes::helpers::{
    authenticate, entity_response, error_response, json_response, message_response,
    parse_json_body, parse_object_id, BoxBody,
};
use crate::server::AppState;
use crate::types::{ClaustroError, Result};

pub async fn handle(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match (method, path.as_str()) {
        (Method::GET, "/users") => handle_list(req, state).await,
        (Method::PATCH, "/users/me") => handle_update_self(req, state).await,
        (Method::GET, p) if is_user_path(p) => {
            let id = p.trim_start_matches("/users/").to_string();
            handle_get(req, state, &id).await
        }
        (Method::PATCH, p) if is_user_path(p) => {
            let id = p.trim_start_matches("/users/").to_string();
            handle_update(req, state, &id).await
        }
        (Method::POST, p) if p.starts_with("/users/") && p.ends_with("/disable") => {
            let id = strip_action(p, "/disable");
            handle_set_enabled(req, state, &id, false).await
        }
        (Method::POST, p) if p.starts_with("/users/") && p.ends_with("/enable") => {
            let id = strip_action(p, "/enable");
            handle_set_enabled(req, state, &id, true).await
        }
        _ => return None,
    };

    Some(response.unwrap_or_else(|e| error_response(&e)))
}

fn is_user_path(path: &str) -> bool {
    path.strip_prefix("/users/")
        .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
}

fn strip_action(path: &str, action: &str) -> String {
    path.trim_start_matches("/users/")
        .trim_end_matches(action)
        .to_string()
}

async fn handle_list(req: Request<Incoming>, state: Arc<AppState>) -> Result<Response<BoxBody>> {
    let (_user, role, _token) = authenticate(&state, &req).await?;
    let users = state.identity.list_users(role).await?;

    let rendered: Vec<Value> = users.iter().map(|u| u.view_json()).collect();
    Ok(json_response(StatusCode::OK, &json!({ "users": rendered })))
}

async fn handle_get(
    req: Request<Incoming>,
    state: Arc<AppState>,
    id: &str,
) -> Result<Response<BoxBody>> {
    let (_user, role, _token) = authenticate(&state, &req).await?;
    if !state.policy.allows(role, false, Operation::UserAdminister) {
        return Err(ClaustroError::Forbidden(
            "Acceso denegado. Usted no cumple con el rol requerido".into(),
        ));
    }

    let user = state.identity.get_user(parse_object_id(id)?).await?;
    Ok(entity_response(StatusCode::OK, None, "user", user.view_json()))
}

async fn handle_update_self(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody>> {
    let (user, _role, _token) = authenticate(&state, &req).await?;
    let patch: Map<String, Value> = parse_json_body(req).await?;

    let updated = state.identity.update_self(&user, patch).await?;
    Ok(entity_response(
        StatusCode::OK,
        Some("Usuario actualizado correctamente"),
        "user",
        updated.view_json(),
    ))
}

async fn handle_update(
    req: Request<Incoming>,
    state: Arc<AppState>,
    id: &str,
) -> Result<Response<BoxBody>> {
    let (_user, role, _token) = authenticate(&state, &req).await?;
    let target = parse_object_id(id)?;
    let patch: Map<String, Value> = parse_json_body(req).await?;

    let updated = state.identity.update_user(target, patch, role).await?;
    Ok(entity_response(
        StatusCode::OK,
        Some("Usuario actualizado correctamente"),
        "user",
        updated.view_json(),
    ))
}

async fn handle_set_enabled(
    req: Request<Incoming>,
    state: Arc<AppState>,
    id: &str,
    enabled: bool,
) -> Result<Response<BoxBody>> {
    let (_user, role, _token) = authenticate(&state, &req).await?;
    let target = parse_object_id(id)?;

    if enabled {
        state.identity.enable(target, role).await?;
        Ok(message_response(StatusCode::OK, "Usuario habilitado exitosamente."))
    } else {
        state.identity.disable(target, role).await?;
        Ok(message_response(StatusCode::OK, "Usuario deshabilitado exitosamente."))
    }
}
